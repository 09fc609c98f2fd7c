use cruise_shared::store::HoldStore;
use cruise_shared::{reason, Clock, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info};

use crate::ledger::InventoryLedger;

const SWEEP_BATCH: i64 = 100;

/// Periodically deletes expired holds and credits their quantity back.
pub struct HoldSweeper {
    ledger: InventoryLedger,
    holds: Arc<dyn HoldStore>,
    clock: Arc<dyn Clock>,
}

impl HoldSweeper {
    pub fn new(ledger: InventoryLedger, holds: Arc<dyn HoldStore>, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, holds, clock }
    }

    pub async fn run(&self, every: Duration) {
        let mut interval = time::interval(every);

        loop {
            interval.tick().await;

            if let Err(e) = self.sweep_once().await {
                error!("Error sweeping expired holds: {}", e);
            }
        }
    }

    /// Reclaims one batch of expired holds and returns how many were credited.
    pub async fn sweep_once(&self) -> Result<usize> {
        let now = self.clock.now();
        let expired = self.holds.expired(now, SWEEP_BATCH).await?;
        let mut reclaimed = 0;

        for candidate in expired {
            // A concurrent lazy purge may have taken the row already; only
            // the caller whose delete matched credits it.
            let Some(hold) = self.holds.delete_expired(candidate.id, now).await? else {
                continue;
            };

            if let Err(e) = self
                .ledger
                .adjust_atomic(hold.product_id, hold.qty, reason::HOLD_EXPIRED)
                .await
            {
                self.ledger.record_uncredited(hold.product_id, hold.qty, &e).await;
                continue;
            }
            reclaimed += 1;
        }

        if reclaimed > 0 {
            info!("Reclaimed {} expired holds", reclaimed);
        }
        Ok(reclaimed)
    }
}
