use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cruise_inventory::schema::cabin_holds;
use cruise_shared::store::BookingStore;
use cruise_shared::{Booking, BookingStatus, StoreError, StoreResult};
use diesel::prelude::*;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use scoped_futures::ScopedFutureExt;
use uuid::Uuid;

use crate::models::BookingRow;
use crate::schema::bookings;

type DbPool = Pool<AsyncPgConnection>;

#[derive(Clone)]
pub struct PgBookingStore {
    pool: DbPool,
}

impl PgBookingStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> StoreResult<PooledConnection<'_, AsyncPgConnection>> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn insert_consuming_hold(&self, booking: &Booking) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let row = BookingRow::from(booking);

        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                let consumed = diesel::delete(
                    cabin_holds::table
                        .filter(cabin_holds::product_id.eq(row.product_id))
                        .filter(cabin_holds::customer_id.eq(row.customer_id)),
                )
                .execute(conn)
                .await?;
                if consumed == 0 {
                    return Ok(false);
                }

                diesel::insert_into(bookings::table)
                    .values(&row)
                    .execute(conn)
                    .await?;
                Ok(true)
            }
            .scope_boxed()
        })
        .await
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let mut conn = self.conn().await?;
        let row = bookings::table
            .find(id)
            .first::<BookingRow>(&mut conn)
            .await
            .optional()?;
        row.map(Booking::try_from).transpose()
    }

    async fn mark_paid(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let updated = diesel::update(
            bookings::table
                .filter(bookings::id.eq(id))
                .filter(bookings::status.eq(BookingStatus::Created.as_str())),
        )
        .set((
            bookings::status.eq(BookingStatus::Paid.as_str()),
            bookings::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .await?;
        Ok(updated == 1)
    }
}
