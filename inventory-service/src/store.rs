use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cruise_shared::store::{HoldStore, InventoryStore, PriceStore};
use cruise_shared::{Hold, InventoryAuditEntry, InventoryRecord, PricePoint, StoreError, StoreResult};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::pooled_connection::bb8::PooledConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use scoped_futures::ScopedFutureExt;
use uuid::Uuid;

use crate::models::*;
use crate::schema::*;

pub type DbPool = bb8::Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

/// Postgres-backed inventory, hold and price tables.
#[derive(Clone)]
pub struct PgInventoryStore {
    pool: DbPool,
}

impl PgInventoryStore {
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
impl InventoryStore for PgInventoryStore {
    async fn publish(&self, product_id: Uuid, total: i32, now: DateTime<Utc>) -> StoreResult<InventoryRecord> {
        let mut conn = self.conn().await?;
        let row = InventoryRow {
            product_id,
            total,
            locked: 0,
            sold: 0,
            updated_at: now,
        };

        diesel::insert_into(inventories::table)
            .values(&row)
            .on_conflict(inventories::product_id)
            .do_nothing()
            .execute(&mut conn)
            .await?;

        let stored = inventories::table
            .find(product_id)
            .first::<InventoryRow>(&mut conn)
            .await?;
        Ok(stored.into())
    }

    async fn get(&self, product_id: Uuid) -> StoreResult<Option<InventoryRecord>> {
        let mut conn = self.conn().await?;
        let row = inventories::table
            .find(product_id)
            .first::<InventoryRow>(&mut conn)
            .await
            .optional()?;
        Ok(row.map(Into::into))
    }

    async fn adjust_total(&self, product_id: Uuid, delta: i32, now: DateTime<Utc>) -> StoreResult<Option<i32>> {
        let mut conn = self.conn().await?;

        // UPDATE inventories SET total = total + $delta
        //  WHERE product_id = $id AND total + $delta >= 0 RETURNING total
        let total = diesel::update(
            inventories::table
                .filter(inventories::product_id.eq(product_id))
                .filter((inventories::total + delta).ge(0)),
        )
        .set((
            inventories::total.eq(inventories::total + delta),
            inventories::updated_at.eq(now),
        ))
        .returning(inventories::total)
        .get_result::<i32>(&mut conn)
        .await
        .optional()?;

        Ok(total)
    }

    async fn append_audit(&self, entry: &InventoryAuditEntry) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        diesel::insert_into(inventory_audit_log::table)
            .values(&NewAuditRow {
                product_id: entry.product_id,
                change: entry.change,
                reason: &entry.reason,
                created_at: entry.created_at,
            })
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn audit_entries(&self, product_id: Uuid) -> StoreResult<Vec<InventoryAuditEntry>> {
        let mut conn = self.conn().await?;
        let rows = inventory_audit_log::table
            .filter(inventory_audit_log::product_id.eq(product_id))
            .order(inventory_audit_log::id.asc())
            .load::<AuditRow>(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl HoldStore for PgInventoryStore {
    async fn exists_active(&self, product_id: Uuid, customer_id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let count: i64 = cabin_holds::table
            .filter(cabin_holds::product_id.eq(product_id))
            .filter(cabin_holds::customer_id.eq(customer_id))
            .filter(cabin_holds::expires_at.gt(now))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count > 0)
    }

    async fn create(&self, hold: &Hold, now: DateTime<Utc>) -> StoreResult<Vec<Hold>> {
        let mut conn = self.conn().await?;
        let row = HoldRow::from(hold);

        // The unique (product_id, customer_id) index rejects the insert when
        // another instance already holds an active row for the pair.
        let purged = conn
            .transaction::<_, StoreError, _>(|conn| {
                async move {
                    let purged = diesel::delete(
                        cabin_holds::table
                            .filter(cabin_holds::product_id.eq(row.product_id))
                            .filter(cabin_holds::customer_id.eq(row.customer_id))
                            .filter(cabin_holds::expires_at.le(now)),
                    )
                    .returning(cabin_holds::all_columns)
                    .get_results::<HoldRow>(conn)
                    .await?;

                    diesel::insert_into(cabin_holds::table)
                        .values(&row)
                        .execute(conn)
                        .await?;

                    Ok(purged)
                }
                .scope_boxed()
            })
            .await?;

        Ok(purged.into_iter().map(Into::into).collect())
    }

    async fn release(&self, product_id: Uuid, customer_id: Uuid) -> StoreResult<Vec<Hold>> {
        let mut conn = self.conn().await?;
        let rows = diesel::delete(
            cabin_holds::table
                .filter(cabin_holds::product_id.eq(product_id))
                .filter(cabin_holds::customer_id.eq(customer_id)),
        )
        .returning(cabin_holds::all_columns)
        .get_results::<HoldRow>(&mut conn)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list(&self, product_id: Uuid, customer_id: Uuid) -> StoreResult<Vec<Hold>> {
        let mut conn = self.conn().await?;
        let rows = cabin_holds::table
            .filter(cabin_holds::product_id.eq(product_id))
            .filter(cabin_holds::customer_id.eq(customer_id))
            .order(cabin_holds::created_at.asc())
            .load::<HoldRow>(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn expired(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Hold>> {
        let mut conn = self.conn().await?;
        let rows = cabin_holds::table
            .filter(cabin_holds::expires_at.le(now))
            .order(cabin_holds::expires_at.asc())
            .limit(limit)
            .load::<HoldRow>(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_expired(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<Option<Hold>> {
        let mut conn = self.conn().await?;
        let row = diesel::delete(
            cabin_holds::table
                .filter(cabin_holds::id.eq(id))
                .filter(cabin_holds::expires_at.le(now)),
        )
        .returning(cabin_holds::all_columns)
        .get_result::<HoldRow>(&mut conn)
        .await
        .optional()?;
        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl PriceStore for PgInventoryStore {
    async fn list_by_product(&self, product_id: Uuid) -> StoreResult<Vec<PricePoint>> {
        let mut conn = self.conn().await?;
        let rows = cabin_prices::table
            .filter(cabin_prices::product_id.eq(product_id))
            .order(cabin_prices::calendar_date.asc())
            .load::<PriceRow>(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn upsert(&self, point: &PricePoint) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        diesel::insert_into(cabin_prices::table)
            .values(&NewPriceRow {
                product_id: point.product_id,
                calendar_date: point.calendar_date,
                occupancy: point.occupancy,
                unit_price: point.unit_price,
            })
            .on_conflict((
                cabin_prices::product_id,
                cabin_prices::calendar_date,
                cabin_prices::occupancy,
            ))
            .do_update()
            .set(cabin_prices::unit_price.eq(excluded(cabin_prices::unit_price)))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}
