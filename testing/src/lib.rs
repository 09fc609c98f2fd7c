//! In-memory storage and clocks for exercising the booking engine.
//!
//! [`InMemoryStore`] implements every storage trait over a single mutex, which
//! gives the same all-or-nothing behaviour as the conditional statements used
//! against Postgres. Individual operations can be armed to fail so the
//! compensation paths can be driven from tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use cruise_shared::store::{
    BookingStore, HoldStore, InventoryStore, PaymentStore, PriceStore, RefundInsert, RefundStore,
};
use cruise_shared::{
    Booking, BookingStatus, Clock, Hold, InventoryAuditEntry, InventoryRecord, Payment,
    PaymentStatus, PricePoint, Refund, RefundStatus, StoreError, StoreResult,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Store operations that can be armed to fail and whose successful writes
/// are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    InventoryAdjust,
    InventoryAudit,
    HoldCreate,
    HoldRelease,
    PriceList,
    BookingInsert,
    BookingMarkPaid,
    PaymentCreate,
    PaymentMarkPaid,
    RefundCreate,
}

#[derive(Debug, Default)]
struct State {
    inventory: HashMap<Uuid, InventoryRecord>,
    audit: Vec<InventoryAuditEntry>,
    holds: Vec<Hold>,
    prices: Vec<PricePoint>,
    bookings: HashMap<Uuid, Booking>,
    payments: HashMap<Uuid, Payment>,
    refunds: HashMap<Uuid, Refund>,
    armed: HashMap<Op, Arm>,
    writes: HashMap<Op, usize>,
}

/// Lets `skip` calls through, then fails the next `times`.
#[derive(Debug, Clone, Copy)]
struct Arm {
    skip: u32,
    times: u32,
}

impl State {
    fn check(&mut self, op: Op) -> StoreResult<()> {
        if let Some(arm) = self.armed.get_mut(&op) {
            if arm.skip > 0 {
                arm.skip -= 1;
            } else if arm.times > 0 {
                arm.times -= 1;
                return Err(StoreError::Unavailable(format!("{op:?} failure injected")));
            }
        }
        Ok(())
    }

    fn wrote(&mut self, op: Op) {
        *self.writes.entry(op).or_default() += 1;
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes every following call of `op` fail until [`heal`](Self::heal).
    pub fn fail(&self, op: Op) {
        self.state().armed.insert(op, Arm { skip: 0, times: u32::MAX });
    }

    /// Makes the next `times` calls of `op` fail.
    pub fn fail_times(&self, op: Op, times: u32) {
        self.state().armed.insert(op, Arm { skip: 0, times });
    }

    /// Lets the next `skip` calls of `op` succeed and fails every one after.
    pub fn fail_after(&self, op: Op, skip: u32) {
        self.state().armed.insert(op, Arm { skip, times: u32::MAX });
    }

    pub fn heal(&self, op: Op) {
        self.state().armed.remove(&op);
    }

    /// Number of successful writes performed by `op`.
    pub fn writes(&self, op: Op) -> usize {
        self.state().writes.get(&op).copied().unwrap_or(0)
    }

    pub fn seed_inventory(&self, product_id: Uuid, total: i32) {
        self.state()
            .inventory
            .insert(product_id, InventoryRecord::new(product_id, total, Utc::now()));
    }

    pub fn total(&self, product_id: Uuid) -> Option<i32> {
        self.state().inventory.get(&product_id).map(|r| r.total)
    }

    pub fn audit_log(&self) -> Vec<InventoryAuditEntry> {
        self.state().audit.clone()
    }

    pub fn holds(&self) -> Vec<Hold> {
        self.state().holds.clone()
    }

    pub fn seed_hold(&self, hold: Hold) {
        self.state().holds.push(hold);
    }

    pub fn seed_booking(&self, booking: Booking) {
        self.state().bookings.insert(booking.id, booking);
    }

    pub fn bookings(&self) -> Vec<Booking> {
        self.state().bookings.values().cloned().collect()
    }

    pub fn seed_payment(&self, payment: Payment) {
        self.state().payments.insert(payment.id, payment);
    }

    pub fn payment(&self, id: Uuid) -> Option<Payment> {
        self.state().payments.get(&id).cloned()
    }

    pub fn booking(&self, id: Uuid) -> Option<Booking> {
        self.state().bookings.get(&id).cloned()
    }

    pub fn seed_refund(&self, refund: Refund) {
        self.state().refunds.insert(refund.id, refund);
    }

    pub fn refunds_for(&self, payment_id: Uuid) -> Vec<Refund> {
        self.state()
            .refunds
            .values()
            .filter(|r| r.payment_id == payment_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn publish(&self, product_id: Uuid, total: i32, now: DateTime<Utc>) -> StoreResult<InventoryRecord> {
        let mut state = self.state();
        let record = state
            .inventory
            .entry(product_id)
            .or_insert_with(|| InventoryRecord::new(product_id, total, now))
            .clone();
        Ok(record)
    }

    async fn get(&self, product_id: Uuid) -> StoreResult<Option<InventoryRecord>> {
        Ok(self.state().inventory.get(&product_id).cloned())
    }

    async fn adjust_total(&self, product_id: Uuid, delta: i32, now: DateTime<Utc>) -> StoreResult<Option<i32>> {
        let mut state = self.state();
        state.check(Op::InventoryAdjust)?;
        let Some(record) = state.inventory.get_mut(&product_id) else {
            return Ok(None);
        };
        if record.total + delta < 0 {
            return Ok(None);
        }
        record.total += delta;
        record.updated_at = now;
        let total = record.total;
        state.wrote(Op::InventoryAdjust);
        Ok(Some(total))
    }

    async fn append_audit(&self, entry: &InventoryAuditEntry) -> StoreResult<()> {
        let mut state = self.state();
        state.check(Op::InventoryAudit)?;
        state.audit.push(entry.clone());
        state.wrote(Op::InventoryAudit);
        Ok(())
    }

    async fn audit_entries(&self, product_id: Uuid) -> StoreResult<Vec<InventoryAuditEntry>> {
        Ok(self
            .state()
            .audit
            .iter()
            .filter(|e| e.product_id == product_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl HoldStore for InMemoryStore {
    async fn exists_active(&self, product_id: Uuid, customer_id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        Ok(self
            .state()
            .holds
            .iter()
            .any(|h| h.product_id == product_id && h.customer_id == customer_id && h.is_active(now)))
    }

    async fn create(&self, hold: &Hold, now: DateTime<Utc>) -> StoreResult<Vec<Hold>> {
        let mut state = self.state();
        state.check(Op::HoldCreate)?;
        let (purged, kept): (Vec<Hold>, Vec<Hold>) = state.holds.drain(..).partition(|h| {
            h.product_id == hold.product_id && h.customer_id == hold.customer_id && !h.is_active(now)
        });
        // Mirrors the unique (product_id, customer_id) index on cabin_holds.
        if kept
            .iter()
            .any(|h| h.product_id == hold.product_id && h.customer_id == hold.customer_id)
        {
            state.holds = kept;
            state.holds.extend(purged);
            return Err(StoreError::Unavailable("duplicate hold for product and customer".into()));
        }
        state.holds = kept;
        state.holds.push(hold.clone());
        state.wrote(Op::HoldCreate);
        Ok(purged)
    }

    async fn release(&self, product_id: Uuid, customer_id: Uuid) -> StoreResult<Vec<Hold>> {
        let mut state = self.state();
        state.check(Op::HoldRelease)?;
        let (released, kept): (Vec<Hold>, Vec<Hold>) = state
            .holds
            .drain(..)
            .partition(|h| h.product_id == product_id && h.customer_id == customer_id);
        state.holds = kept;
        state.wrote(Op::HoldRelease);
        Ok(released)
    }

    async fn list(&self, product_id: Uuid, customer_id: Uuid) -> StoreResult<Vec<Hold>> {
        Ok(self
            .state()
            .holds
            .iter()
            .filter(|h| h.product_id == product_id && h.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn expired(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Hold>> {
        let mut expired: Vec<Hold> = self
            .state()
            .holds
            .iter()
            .filter(|h| !h.is_active(now))
            .cloned()
            .collect();
        expired.sort_by_key(|h| h.expires_at);
        expired.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(expired)
    }

    async fn delete_expired(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<Option<Hold>> {
        let mut state = self.state();
        let position = state.holds.iter().position(|h| h.id == id && !h.is_active(now));
        Ok(position.map(|i| state.holds.remove(i)))
    }
}

#[async_trait]
impl PriceStore for InMemoryStore {
    async fn list_by_product(&self, product_id: Uuid) -> StoreResult<Vec<PricePoint>> {
        let mut state = self.state();
        state.check(Op::PriceList)?;
        Ok(state
            .prices
            .iter()
            .filter(|p| p.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn upsert(&self, point: &PricePoint) -> StoreResult<()> {
        let mut state = self.state();
        state.prices.retain(|p| {
            !(p.product_id == point.product_id && p.day() == point.day() && p.occupancy == point.occupancy)
        });
        state.prices.push(point.clone());
        Ok(())
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn insert_consuming_hold(&self, booking: &Booking) -> StoreResult<bool> {
        let mut state = self.state();
        state.check(Op::BookingInsert)?;
        let before = state.holds.len();
        state
            .holds
            .retain(|h| !(h.product_id == booking.product_id && h.customer_id == booking.customer_id));
        if state.holds.len() == before {
            return Ok(false);
        }
        state.bookings.insert(booking.id, booking.clone());
        state.wrote(Op::BookingInsert);
        Ok(true)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.state().bookings.get(&id).cloned())
    }

    async fn mark_paid(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut state = self.state();
        state.check(Op::BookingMarkPaid)?;
        match state.bookings.get_mut(&id) {
            Some(booking) if booking.status == BookingStatus::Created => {
                booking.status = BookingStatus::Paid;
                booking.updated_at = now;
                state.wrote(Op::BookingMarkPaid);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn create(&self, payment: &Payment) -> StoreResult<()> {
        let mut state = self.state();
        state.check(Op::PaymentCreate)?;
        state.payments.insert(payment.id, payment.clone());
        state.wrote(Op::PaymentCreate);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.state().payments.get(&id).cloned())
    }

    async fn find_by_trade_no(&self, provider: &str, trade_no: &str) -> StoreResult<Option<Payment>> {
        Ok(self
            .state()
            .payments
            .values()
            .find(|p| p.provider == provider && p.provider_trade_no == trade_no)
            .cloned())
    }

    async fn for_order(&self, order_id: Uuid) -> StoreResult<Vec<Payment>> {
        let mut found: Vec<Payment> = self
            .state()
            .payments
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.created_at);
        Ok(found)
    }

    async fn mark_paid(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut state = self.state();
        state.check(Op::PaymentMarkPaid)?;
        match state.payments.get_mut(&id) {
            Some(payment) if payment.status == PaymentStatus::Pending => {
                payment.status = PaymentStatus::Paid;
                payment.updated_at = now;
                state.wrote(Op::PaymentMarkPaid);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn paid_with_unconfirmed_booking(&self, limit: i64) -> StoreResult<Vec<Payment>> {
        let state = self.state();
        let mut found: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| p.status == PaymentStatus::Paid)
            .filter(|p| {
                state
                    .bookings
                    .get(&p.order_id)
                    .is_some_and(|b| b.status == BookingStatus::Created)
            })
            .cloned()
            .collect();
        found.sort_by_key(|p| p.updated_at);
        found.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(found)
    }
}

#[async_trait]
impl RefundStore for InMemoryStore {
    async fn create_within_balance(&self, refund: &Refund) -> StoreResult<RefundInsert> {
        let mut state = self.state();
        state.check(Op::RefundCreate)?;
        let captured = state
            .payments
            .get(&refund.payment_id)
            .map(|p| p.amount)
            .ok_or_else(|| StoreError::Unavailable(format!("payment {} missing", refund.payment_id)))?;
        let refunded: i64 = state
            .refunds
            .values()
            .filter(|r| r.payment_id == refund.payment_id && r.status != RefundStatus::Cancelled)
            .map(|r| r.amount)
            .sum();
        let remaining = captured - refunded;
        if refund.amount > remaining {
            return Ok(RefundInsert::ExceedsBalance { remaining });
        }
        state.refunds.insert(refund.id, refund.clone());
        state.wrote(Op::RefundCreate);
        Ok(RefundInsert::Created {
            remaining: remaining - refund.amount,
        })
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Refund>> {
        Ok(self.state().refunds.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: RefundStatus,
        to: RefundStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.state();
        match state.refunds.get_mut(&id) {
            Some(refund) if refund.status == from => {
                refund.status = to;
                refund.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// 2026-05-01 00:00:00 UTC.
    pub fn fixed() -> Self {
        Self::new(Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).single().unwrap_or_else(Utc::now))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn adjust_guard_refuses_negative_total() {
        let store = InMemoryStore::new();
        let product = Uuid::new_v4();
        store.seed_inventory(product, 1);

        assert_eq!(store.adjust_total(product, -1, Utc::now()).await.unwrap(), Some(0));
        assert_eq!(store.adjust_total(product, -1, Utc::now()).await.unwrap(), None);
        assert_eq!(store.total(product), Some(0));
    }

    #[tokio::test]
    async fn armed_failure_fires_the_requested_number_of_times() {
        let store = InMemoryStore::new();
        let product = Uuid::new_v4();
        store.seed_inventory(product, 5);
        store.fail_times(Op::InventoryAdjust, 1);

        assert!(store.adjust_total(product, -1, Utc::now()).await.is_err());
        assert!(store.adjust_total(product, -1, Utc::now()).await.is_ok());
        assert_eq!(store.writes(Op::InventoryAdjust), 1);
    }

    #[tokio::test]
    async fn consuming_insert_requires_the_hold() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let booking = Booking::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 2, 100, now);

        assert!(!store.insert_consuming_hold(&booking).await.unwrap());
        store.seed_hold(Hold::new(booking.product_id, booking.customer_id, 1, now, Duration::minutes(15)));
        assert!(store.insert_consuming_hold(&booking).await.unwrap());
        assert!(store.holds().is_empty());
        assert_eq!(store.bookings().len(), 1);
    }
}
