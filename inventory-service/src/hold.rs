use cruise_shared::store::HoldStore;
use cruise_shared::{reason, Clock, Error, Hold, KeyedLocks, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ledger::InventoryLedger;

pub const DEFAULT_HOLD_TTL: Duration = Duration::from_secs(15 * 60);

/// Gives a customer an exclusive, time-bounded claim on inventory.
///
/// Calls for the same `(product, customer)` pair are serialized in-process.
/// Across processes the unique `(product_id, customer_id)` index on the hold
/// table makes a racing insert fail, which triggers the same rollback path.
#[derive(Clone)]
pub struct HoldManager {
    ledger: InventoryLedger,
    holds: Arc<dyn HoldStore>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    locks: KeyedLocks,
}

impl HoldManager {
    pub fn new(ledger: InventoryLedger, holds: Arc<dyn HoldStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        let ttl = if ttl.is_zero() { DEFAULT_HOLD_TTL } else { ttl };
        Self {
            ledger,
            holds,
            clock,
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(15)),
            locks: KeyedLocks::new(),
        }
    }


    fn lock_key(product_id: Uuid, customer_id: Uuid) -> String {
        format!("{product_id}:{customer_id}")
    }

    /// Returns `Ok(true)` when the customer holds the product afterwards,
    /// `Ok(false)` when stock is insufficient. A repeated call while a hold is
    /// active succeeds without debiting again.
    pub async fn hold(&self, product_id: Uuid, customer_id: Uuid, qty: i32) -> Result<bool> {
        if qty <= 0 {
            return Err(Error::Validation(format!("hold quantity must be positive, got {qty}")));
        }

        let _guard = self.locks.lock(Self::lock_key(product_id, customer_id)).await;
        let now = self.clock.now();

        if self.holds.exists_active(product_id, customer_id, now).await? {
            debug!(%product_id, %customer_id, "active hold already present");
            return Ok(true);
        }

        match self.ledger.adjust_atomic(product_id, -qty, reason::CABIN_HOLD).await {
            Ok(_) => {}
            Err(Error::InsufficientInventory { .. }) => {
                info!(%product_id, %customer_id, qty, "hold refused, insufficient inventory");
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        let hold = Hold::new(product_id, customer_id, qty, now, self.ttl);
        match self.holds.create(&hold, now).await {
            Ok(purged) => {
                self.reclaim_expired(product_id, &purged).await;
                info!(%product_id, %customer_id, qty, expires_at = %hold.expires_at, "hold created");
                Ok(true)
            }
            Err(e) => {
                let original = Error::from(e);
                warn!(%product_id, %customer_id, qty, error = %original, "hold not persisted, crediting inventory back");
                match self
                    .ledger
                    .adjust_atomic(product_id, qty, reason::CABIN_HOLD_ROLLBACK)
                    .await
                {
                    Ok(_) => Err(original),
                    Err(compensation) => {
                        error!(%product_id, %customer_id, qty, error = %compensation, "hold rollback failed, inventory needs manual reconciliation");
                        Err(Error::compensation(original, compensation))
                    }
                }
            }
        }
    }

    /// Deletes the pair's hold and credits its quantity back under `reason`.
    /// Returns the quantity credited.
    pub async fn release(&self, product_id: Uuid, customer_id: Uuid, reason: &str) -> Result<i32> {
        let _guard = self.locks.lock(Self::lock_key(product_id, customer_id)).await;

        let released = self.holds.release(product_id, customer_id).await?;
        let qty: i32 = released.iter().map(|h| h.qty).sum();
        if qty > 0 {
            self.ledger.adjust_atomic(product_id, qty, reason).await?;
        }
        info!(%product_id, %customer_id, qty, reason, "hold released");
        Ok(qty)
    }

    pub async fn holds_for(&self, product_id: Uuid, customer_id: Uuid) -> Result<Vec<Hold>> {
        Ok(self.holds.list(product_id, customer_id).await?)
    }

    async fn reclaim_expired(&self, product_id: Uuid, purged: &[Hold]) {
        let qty: i32 = purged.iter().map(|h| h.qty).sum();
        if qty == 0 {
            return;
        }
        if let Err(e) = self.ledger.adjust_atomic(product_id, qty, reason::HOLD_EXPIRED).await {
            self.ledger.record_uncredited(product_id, qty, &e).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cruise_testing::{InMemoryStore, ManualClock, Op};

    struct Fixture {
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        manager: HoldManager,
        product: Uuid,
    }

    fn fixture(total: i32) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::fixed());
        let product = Uuid::new_v4();
        store.seed_inventory(product, total);
        let ledger = InventoryLedger::new(store.clone(), clock.clone());
        let manager = HoldManager::new(ledger, store.clone(), clock.clone(), DEFAULT_HOLD_TTL);
        Fixture {
            store,
            clock,
            manager,
            product,
        }
    }

    #[tokio::test]
    async fn repeated_hold_debits_once() {
        let f = fixture(5);
        let customer = Uuid::new_v4();

        assert!(f.manager.hold(f.product, customer, 1).await.unwrap());
        assert!(f.manager.hold(f.product, customer, 1).await.unwrap());

        assert_eq!(f.store.total(f.product), Some(4));
        assert_eq!(f.store.holds().len(), 1);
    }

    #[tokio::test]
    async fn hold_expires_after_ttl() {
        let f = fixture(5);
        let customer = Uuid::new_v4();
        f.manager.hold(f.product, customer, 1).await.unwrap();

        let holds = f.store.holds();
        assert_eq!(holds[0].expires_at, f.clock.now() + chrono::Duration::minutes(15));
    }

    #[tokio::test]
    async fn insufficient_stock_returns_false() {
        let f = fixture(1);
        assert!(f.manager.hold(f.product, Uuid::new_v4(), 1).await.unwrap());
        assert!(!f.manager.hold(f.product, Uuid::new_v4(), 1).await.unwrap());
        assert_eq!(f.store.total(f.product), Some(0));
        assert_eq!(f.store.holds().len(), 1);
    }

    #[tokio::test]
    async fn non_positive_quantity_is_rejected() {
        let f = fixture(1);
        let err = f.manager.hold(f.product, Uuid::new_v4(), 0).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(f.store.total(f.product), Some(1));
    }

    #[tokio::test]
    async fn failed_persistence_credits_inventory_back() {
        let f = fixture(2);
        f.store.fail(Op::HoldCreate);

        let err = f.manager.hold(f.product, Uuid::new_v4(), 1).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(f.store.total(f.product), Some(2));

        let reasons: Vec<String> = f.store.audit_log().into_iter().map(|e| e.reason).collect();
        assert_eq!(reasons, vec![reason::CABIN_HOLD, reason::CABIN_HOLD_ROLLBACK]);
    }

    #[tokio::test]
    async fn failed_rollback_reports_both_errors() {
        let f = fixture(2);
        f.store.fail(Op::HoldCreate);
        // The debit goes through, the credit-back does not.
        f.store.fail_after(Op::InventoryAdjust, 1);

        let err = f.manager.hold(f.product, Uuid::new_v4(), 1).await.unwrap_err();
        match err {
            Error::Compensation { original, compensation } => {
                assert!(matches!(*original, Error::Storage(_)));
                assert!(matches!(*compensation, Error::Storage(_)));
            }
            other => panic!("expected compensation error, got {other:?}"),
        }
        assert_eq!(f.store.total(f.product), Some(1));
    }

    #[tokio::test]
    async fn expired_hold_is_purged_and_credited_on_next_hold() {
        let f = fixture(3);
        let customer = Uuid::new_v4();
        f.manager.hold(f.product, customer, 1).await.unwrap();
        assert_eq!(f.store.total(f.product), Some(2));

        f.clock.advance(chrono::Duration::minutes(16));
        assert!(f.manager.hold(f.product, customer, 1).await.unwrap());

        let holds = f.store.holds();
        assert_eq!(holds.len(), 1);
        assert!(holds[0].is_active(f.clock.now()));
        // Debited twice, the expired one credited back once.
        assert_eq!(f.store.total(f.product), Some(2));
        assert!(f
            .store
            .audit_log()
            .iter()
            .any(|e| e.reason == reason::HOLD_EXPIRED && e.change == 1));
    }

    #[tokio::test]
    async fn failed_expiry_credit_is_recorded_for_reconciliation() {
        let f = fixture(3);
        let customer = Uuid::new_v4();
        f.manager.hold(f.product, customer, 1).await.unwrap();

        f.clock.advance(chrono::Duration::minutes(16));
        // The new debit goes through, crediting the expired unit does not.
        f.store.fail_after(Op::InventoryAdjust, 1);
        assert!(f.manager.hold(f.product, customer, 1).await.unwrap());

        assert_eq!(f.store.total(f.product), Some(1));
        let owed: Vec<_> = f
            .store
            .audit_log()
            .into_iter()
            .filter(|e| e.reason == reason::HOLD_EXPIRED_UNCREDITED)
            .collect();
        assert_eq!(owed.len(), 1);
        assert_eq!(owed[0].change, 1);
        assert_eq!(owed[0].product_id, f.product);
    }

    #[tokio::test]
    async fn release_restores_inventory_and_removes_the_hold() {
        let f = fixture(1);
        let customer = Uuid::new_v4();
        f.manager.hold(f.product, customer, 1).await.unwrap();

        let credited = f.manager.release(f.product, customer, reason::BOOKING_ROLLBACK).await.unwrap();
        assert_eq!(credited, 1);
        assert_eq!(f.store.total(f.product), Some(1));
        assert!(f.manager.holds_for(f.product, customer).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_holds_for_one_pair_debit_once() {
        let f = fixture(10);
        let customer = Uuid::new_v4();

        let calls = (0..16).map(|_| {
            let manager = f.manager.clone();
            let product = f.product;
            tokio::spawn(async move { manager.hold(product, customer, 1).await })
        });
        for result in futures::future::join_all(calls).await {
            assert!(result.unwrap().unwrap());
        }

        assert_eq!(f.store.total(f.product), Some(9));
        assert_eq!(f.store.holds().len(), 1);
    }
}
