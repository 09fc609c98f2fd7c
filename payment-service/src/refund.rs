use cruise_shared::store::{PaymentStore, RefundInsert, RefundStore};
use cruise_shared::{Clock, Error, KeyedLocks, PaymentStatus, Refund, RefundStatus, Result};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Keeps the sum of non-cancelled refunds within the captured amount.
///
/// The balance check and the insert happen in one store call that locks the
/// payment row. Creation is also serialized per payment in process so local
/// requests queue here instead of on the row lock.
#[derive(Clone)]
pub struct RefundProcessor {
    payments: Arc<dyn PaymentStore>,
    refunds: Arc<dyn RefundStore>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks,
}

impl RefundProcessor {
    pub fn new(payments: Arc<dyn PaymentStore>, refunds: Arc<dyn RefundStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            payments,
            refunds,
            clock,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn create_refund(&self, payment_id: Uuid, amount: i64, reason: &str) -> Result<Refund> {
        if amount <= 0 {
            return Err(Error::InvalidAmount(amount));
        }

        let _guard = self.locks.lock(payment_id.to_string()).await;

        let payment = self
            .payments
            .get(payment_id)
            .await?
            .ok_or_else(|| Error::not_found("payment", payment_id))?;
        if payment.status != PaymentStatus::Paid {
            return Err(Error::PaymentNotPaid {
                payment_id,
                status: payment.status,
            });
        }

        let refund = Refund::pending(payment_id, amount, reason, self.clock.now());
        match self.refunds.create_within_balance(&refund).await? {
            RefundInsert::Created { remaining } => {
                info!(refund_id = %refund.id, %payment_id, amount, remaining, "refund requested");
                Ok(refund)
            }
            RefundInsert::ExceedsBalance { remaining } => {
                warn!(%payment_id, amount, remaining, "refund exceeds remaining balance");
                Err(Error::RefundExceedsBalance {
                    requested: amount,
                    remaining,
                })
            }
        }
    }

    pub async fn approve(&self, refund_id: Uuid) -> Result<Refund> {
        self.review(refund_id, RefundStatus::Approved).await
    }

    /// Cancelled refunds no longer count against the payment's balance.
    pub async fn cancel(&self, refund_id: Uuid) -> Result<Refund> {
        self.review(refund_id, RefundStatus::Cancelled).await
    }

    async fn review(&self, refund_id: Uuid, to: RefundStatus) -> Result<Refund> {
        let now = self.clock.now();
        let changed = self
            .refunds
            .transition(refund_id, RefundStatus::Pending, to, now)
            .await?;

        let refund = self
            .refunds
            .get(refund_id)
            .await?
            .ok_or_else(|| Error::not_found("refund", refund_id))?;
        if !changed {
            return Err(Error::Validation(format!(
                "refund {refund_id} is {}, only pending refunds can be {to}",
                refund.status
            )));
        }

        info!(%refund_id, payment_id = %refund.payment_id, status = %to, "refund reviewed");
        Ok(refund)
    }
}
