use cruise_shared::store::InventoryStore;
use cruise_shared::{reason, Clock, Error, InventoryAuditEntry, InventoryRecord, Result};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Result of a committed adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjustment {
    pub product_id: Uuid,
    pub delta: i32,
    pub total: i32,
    /// False when the adjustment committed but its audit entry could not be
    /// written.
    pub audited: bool,
}

/// Owns the authoritative `(total, locked, sold)` counters. All stock changes
/// go through [`adjust_atomic`](Self::adjust_atomic).
#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
}

impl InventoryLedger {
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn publish(&self, product_id: Uuid, total: i32) -> Result<InventoryRecord> {
        if total < 0 {
            return Err(Error::Validation(format!("total must not be negative, got {total}")));
        }
        let record = self.store.publish(product_id, total, self.clock.now()).await?;
        info!(%product_id, total = record.total, "inventory published");
        Ok(record)
    }

    /// Applies `total += delta` with a single conditional write. Fails with
    /// `InsufficientInventory` and touches nothing when the result would be
    /// negative.
    pub async fn adjust_atomic(&self, product_id: Uuid, delta: i32, reason: &str) -> Result<Adjustment> {
        let now = self.clock.now();

        if delta == 0 {
            let record = self.record(product_id).await?;
            return Ok(Adjustment {
                product_id,
                delta,
                total: record.total,
                audited: true,
            });
        }

        let Some(total) = self.store.adjust_total(product_id, delta, now).await? else {
            if self.store.get(product_id).await?.is_none() {
                return Err(Error::not_found("inventory", product_id));
            }
            debug!(%product_id, delta, reason, "inventory adjustment refused");
            return Err(Error::InsufficientInventory { product_id });
        };

        let entry = InventoryAuditEntry {
            product_id,
            change: delta,
            reason: reason.to_string(),
            created_at: now,
        };
        let audited = match self.append_audit(&entry).await {
            Ok(()) => true,
            Err(e) => {
                // The counter change is already committed and stays authoritative.
                error!(%product_id, delta, reason, total, error = %e, "inventory adjusted but audit entry was not written");
                false
            }
        };

        info!(%product_id, delta, reason, total, "inventory adjusted");
        Ok(Adjustment {
            product_id,
            delta,
            total,
            audited,
        })
    }

    pub async fn append_audit(&self, entry: &InventoryAuditEntry) -> Result<()> {
        self.store.append_audit(entry).await?;
        Ok(())
    }

    pub async fn audit_entries(&self, product_id: Uuid) -> Result<Vec<InventoryAuditEntry>> {
        Ok(self.store.audit_entries(product_id).await?)
    }

    /// Leaves a `hold_expired_uncredited` entry for units whose hold row is
    /// gone but whose credit-back failed. `total` is not touched.
    pub async fn record_uncredited(&self, product_id: Uuid, qty: i32, cause: &Error) {
        error!(%product_id, qty, error = %cause, "expired holds deleted but inventory was not credited back");
        let entry = InventoryAuditEntry {
            product_id,
            change: qty,
            reason: reason::HOLD_EXPIRED_UNCREDITED.to_string(),
            created_at: self.clock.now(),
        };
        if let Err(e) = self.append_audit(&entry).await {
            error!(%product_id, qty, error = %e, "uncredited hold units could not be recorded, inventory needs manual reconciliation");
        }
    }

    /// Advisory only. Decisions go through `adjust_atomic`.
    pub async fn get_available(&self, product_id: Uuid) -> Result<i32> {
        Ok(self.record(product_id).await?.available())
    }

    async fn record(&self, product_id: Uuid) -> Result<InventoryRecord> {
        self.store
            .get(product_id)
            .await?
            .ok_or_else(|| Error::not_found("inventory", product_id))
    }
}
