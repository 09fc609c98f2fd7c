use cruise_shared::store::{BookingStore, PaymentStore};
use cruise_shared::{Clock, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info};

use crate::callback::confirm_booking;

const RECONCILE_BATCH: i64 = 100;

/// Confirms bookings whose payment settled while the booking update failed.
pub struct Reconciler {
    payments: Arc<dyn PaymentStore>,
    bookings: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    pub fn new(payments: Arc<dyn PaymentStore>, bookings: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            payments,
            bookings,
            clock,
        }
    }

    pub async fn run(&self, every: Duration) {
        let mut interval = time::interval(every);

        loop {
            interval.tick().await;

            if let Err(e) = self.reconcile_once().await {
                error!("Error reconciling paid bookings: {}", e);
            }
        }
    }

    /// Returns the number of bookings confirmed in this pass.
    pub async fn reconcile_once(&self) -> Result<usize> {
        let stranded = self.payments.paid_with_unconfirmed_booking(RECONCILE_BATCH).await?;
        let mut confirmed = 0;

        for payment in stranded {
            // confirm_booking logs its own failures; the next pass retries.
            if confirm_booking(self.bookings.as_ref(), &payment, self.clock.now()).await.is_ok() {
                confirmed += 1;
            }
        }

        if confirmed > 0 {
            info!("Reconciled {} paid bookings", confirmed);
        }
        Ok(confirmed)
    }
}
