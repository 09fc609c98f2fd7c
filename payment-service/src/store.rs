use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cruise_shared::store::{PaymentStore, RefundInsert, RefundStore};
use cruise_shared::{BookingStatus, Payment, PaymentStatus, Refund, RefundStatus, StoreError, StoreResult};
use diesel::prelude::*;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use scoped_futures::ScopedFutureExt;
use uuid::Uuid;

use crate::models::*;
use crate::schema::*;

type DbPool = Pool<AsyncPgConnection>;

/// Postgres-backed payment and refund tables.
#[derive(Clone)]
pub struct PgPaymentStore {
    pool: DbPool,
}

impl PgPaymentStore {
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
impl PaymentStore for PgPaymentStore {
    async fn create(&self, payment: &Payment) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        diesel::insert_into(payments::table)
            .values(&PaymentRow::from(payment))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        let mut conn = self.conn().await?;
        let row = payments::table
            .find(id)
            .first::<PaymentRow>(&mut conn)
            .await
            .optional()?;
        row.map(Payment::try_from).transpose()
    }

    async fn find_by_trade_no(&self, provider: &str, trade_no: &str) -> StoreResult<Option<Payment>> {
        let mut conn = self.conn().await?;
        let row = payments::table
            .filter(payments::provider.eq(provider))
            .filter(payments::provider_trade_no.eq(trade_no))
            .first::<PaymentRow>(&mut conn)
            .await
            .optional()?;
        row.map(Payment::try_from).transpose()
    }

    async fn for_order(&self, order_id: Uuid) -> StoreResult<Vec<Payment>> {
        let mut conn = self.conn().await?;
        let rows = payments::table
            .filter(payments::order_id.eq(order_id))
            .order(payments::created_at.asc())
            .load::<PaymentRow>(&mut conn)
            .await?;
        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn mark_paid(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let updated = diesel::update(
            payments::table
                .filter(payments::id.eq(id))
                .filter(payments::status.eq(PaymentStatus::Pending.as_str())),
        )
        .set((
            payments::status.eq(PaymentStatus::Paid.as_str()),
            payments::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .await?;
        Ok(updated == 1)
    }

    async fn paid_with_unconfirmed_booking(&self, limit: i64) -> StoreResult<Vec<Payment>> {
        let mut conn = self.conn().await?;
        let unconfirmed = bookings::table
            .filter(bookings::status.eq(BookingStatus::Created.as_str()))
            .select(bookings::id);

        let rows = payments::table
            .filter(payments::status.eq(PaymentStatus::Paid.as_str()))
            .filter(payments::order_id.eq_any(unconfirmed))
            .order(payments::updated_at.asc())
            .limit(limit)
            .load::<PaymentRow>(&mut conn)
            .await?;
        rows.into_iter().map(Payment::try_from).collect()
    }
}

#[async_trait]
impl RefundStore for PgPaymentStore {
    async fn create_within_balance(&self, refund: &Refund) -> StoreResult<RefundInsert> {
        let mut conn = self.conn().await?;
        let row = RefundRow::from(refund);

        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                // SELECT amount FROM payments WHERE id = $1 FOR UPDATE
                let captured = payments::table
                    .find(row.payment_id)
                    .select(payments::amount)
                    .for_update()
                    .first::<i64>(conn)
                    .await?;

                let amounts = refunds::table
                    .filter(refunds::payment_id.eq(row.payment_id))
                    .filter(refunds::status.ne(RefundStatus::Cancelled.as_str()))
                    .select(refunds::amount)
                    .load::<i64>(conn)
                    .await?;
                let remaining = captured - amounts.into_iter().sum::<i64>();
                if row.amount > remaining {
                    return Ok(RefundInsert::ExceedsBalance { remaining });
                }

                diesel::insert_into(refunds::table)
                    .values(&row)
                    .execute(conn)
                    .await?;
                Ok(RefundInsert::Created {
                    remaining: remaining - row.amount,
                })
            }
            .scope_boxed()
        })
        .await
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Refund>> {
        let mut conn = self.conn().await?;
        let row = refunds::table
            .find(id)
            .first::<RefundRow>(&mut conn)
            .await
            .optional()?;
        row.map(Refund::try_from).transpose()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: RefundStatus,
        to: RefundStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let updated = diesel::update(
            refunds::table
                .filter(refunds::id.eq(id))
                .filter(refunds::status.eq(from.as_str())),
        )
        .set((refunds::status.eq(to.as_str()), refunds::updated_at.eq(now)))
        .execute(&mut conn)
        .await?;
        Ok(updated == 1)
    }
}
