//! Storage boundary. Every component talks to persistence through these
//! traits; the Postgres implementations live next to the component that owns
//! the tables and the in-memory ones live in `cruise-testing`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::{
    Booking, Hold, InventoryAuditEntry, InventoryRecord, Payment, PricePoint, Refund, RefundStatus,
};

#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Creates the record for a newly published product. An existing record
    /// is returned unchanged; later stock changes go through `adjust_total`.
    async fn publish(&self, product_id: Uuid, total: i32, now: DateTime<Utc>) -> StoreResult<InventoryRecord>;

    async fn get(&self, product_id: Uuid) -> StoreResult<Option<InventoryRecord>>;

    /// `total += delta` as one conditional write guarded by `total + delta >= 0`.
    /// Returns the new total, or `None` when no row matched the guard.
    async fn adjust_total(&self, product_id: Uuid, delta: i32, now: DateTime<Utc>) -> StoreResult<Option<i32>>;

    async fn append_audit(&self, entry: &InventoryAuditEntry) -> StoreResult<()>;

    async fn audit_entries(&self, product_id: Uuid) -> StoreResult<Vec<InventoryAuditEntry>>;
}

#[async_trait]
pub trait HoldStore: Send + Sync {
    async fn exists_active(&self, product_id: Uuid, customer_id: Uuid, now: DateTime<Utc>) -> StoreResult<bool>;

    /// Deletes the pair's expired holds, then inserts `hold`. Returns the rows
    /// that were purged so their quantity can be credited back.
    async fn create(&self, hold: &Hold, now: DateTime<Utc>) -> StoreResult<Vec<Hold>>;

    /// Deletes every hold of the pair and returns the deleted rows.
    async fn release(&self, product_id: Uuid, customer_id: Uuid) -> StoreResult<Vec<Hold>>;

    async fn list(&self, product_id: Uuid, customer_id: Uuid) -> StoreResult<Vec<Hold>>;

    async fn expired(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Hold>>;

    /// Deletes one hold only if it is still present and expired.
    async fn delete_expired(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<Option<Hold>>;
}

#[async_trait]
pub trait PriceStore: Send + Sync {
    async fn list_by_product(&self, product_id: Uuid) -> StoreResult<Vec<PricePoint>>;

    async fn upsert(&self, point: &PricePoint) -> StoreResult<()>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// In one transaction: delete the customer's hold on the product and insert
    /// the booking. Returns `false` with nothing written when the hold is gone.
    async fn insert_consuming_hold(&self, booking: &Booking) -> StoreResult<bool>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    /// Conditional `created -> paid`. Returns whether a row changed.
    async fn mark_paid(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create(&self, payment: &Payment) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Payment>>;

    async fn find_by_trade_no(&self, provider: &str, trade_no: &str) -> StoreResult<Option<Payment>>;

    /// Every payment opened for the booking, with any provider.
    async fn for_order(&self, order_id: Uuid) -> StoreResult<Vec<Payment>>;

    /// Conditional `pending -> paid`. Returns whether a row changed.
    async fn mark_paid(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool>;

    /// Paid payments whose booking is still `created`.
    async fn paid_with_unconfirmed_booking(&self, limit: i64) -> StoreResult<Vec<Payment>>;
}

/// Result of a balance-checked refund insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundInsert {
    /// Inserted; `remaining` is the balance left afterwards.
    Created { remaining: i64 },
    /// Nothing written; `remaining` is the balance that was available.
    ExceedsBalance { remaining: i64 },
}

#[async_trait]
pub trait RefundStore: Send + Sync {
    /// Inserts `refund` only if it fits into the payment's amount minus every
    /// refund against it that is not cancelled. The check and the insert are
    /// serialized per payment by the store, across processes.
    async fn create_within_balance(&self, refund: &Refund) -> StoreResult<RefundInsert>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Refund>>;

    /// Conditional status change. Returns whether a row changed.
    async fn transition(
        &self,
        id: Uuid,
        from: RefundStatus,
        to: RefundStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;
}
