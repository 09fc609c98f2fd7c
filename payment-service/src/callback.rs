use chrono::{DateTime, Utc};
use cruise_shared::store::{BookingStore, PaymentStore};
use cruise_shared::{BookingStatus, Clock, Error, Payment, PaymentStatus, Result};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Checks provider-signed callback bodies. Implementations must verify the
/// raw bytes before anything is parsed out of them.
pub trait PaymentVerifier: Send + Sync {
    fn verify(&self, body: &[u8], signature: &str) -> Result<()>;

    fn extract_trade_no(&self, body: &[u8]) -> Result<String>;
}

/// Hex-encoded HMAC-SHA256 over the raw body with a shared secret.
///
/// WeChat Pay v3 and Alipay sign with RSA in production; those verifiers plug
/// in behind the same trait.
#[derive(Clone)]
pub struct HmacVerifier {
    mac: HmacSha256,
}

#[derive(Deserialize)]
struct CallbackBody {
    #[serde(default)]
    trade_no: String,
}

impl HmacVerifier {
    pub fn new(secret: &[u8]) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| Error::Validation(format!("invalid callback secret: {e}")))?;
        Ok(Self { mac })
    }

    pub fn sign(&self, body: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }
}

impl PaymentVerifier for HmacVerifier {
    fn verify(&self, body: &[u8], signature: &str) -> Result<()> {
        let signature = signature.trim();
        if signature.is_empty() {
            return Err(Error::SignatureInvalid("missing signature".into()));
        }
        let expected = hex::decode(signature)
            .map_err(|_| Error::SignatureInvalid("signature is not hex encoded".into()))?;

        let mut mac = self.mac.clone();
        mac.update(body);
        // Constant-time comparison.
        mac.verify_slice(&expected)
            .map_err(|_| Error::SignatureInvalid("signature mismatch".into()))
    }

    fn extract_trade_no(&self, body: &[u8]) -> Result<String> {
        let payload: CallbackBody =
            serde_json::from_slice(body).map_err(|e| Error::MalformedCallback(e.to_string()))?;
        if payload.trade_no.is_empty() {
            return Err(Error::MalformedCallback("trade_no is required".into()));
        }
        Ok(payload.trade_no)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// This call moved the payment to paid and confirmed the booking.
    Confirmed,
    /// The payment was already paid; nothing changed.
    AlreadyPaid,
}

/// Consumes asynchronous settlement notifications from payment providers.
pub struct CallbackProcessor {
    verifiers: HashMap<String, Arc<dyn PaymentVerifier>>,
    payments: Arc<dyn PaymentStore>,
    bookings: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl CallbackProcessor {
    pub fn new(payments: Arc<dyn PaymentStore>, bookings: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            verifiers: HashMap::new(),
            payments,
            bookings,
            clock,
        }
    }

    pub fn with_verifier(mut self, provider: impl Into<String>, verifier: Arc<dyn PaymentVerifier>) -> Self {
        self.verifiers.insert(provider.into(), verifier);
        self
    }

    /// Safe to call any number of times for the same notification.
    pub async fn handle_callback(&self, provider: &str, body: &[u8], signature: &str) -> Result<CallbackOutcome> {
        let Some(verifier) = self.verifiers.get(provider) else {
            warn!(provider, "callback rejected: unknown provider");
            return Err(Error::UnknownProvider(provider.to_string()));
        };

        if let Err(e) = verifier.verify(body, signature) {
            warn!(provider, body_len = body.len(), error = %e, "callback rejected: signature verification failed");
            return Err(e);
        }

        let trade_no = verifier.extract_trade_no(body).map_err(|e| {
            warn!(provider, error = %e, "signed callback has no usable trade number");
            e
        })?;

        let Some(payment) = self.payments.find_by_trade_no(provider, &trade_no).await? else {
            warn!(provider, %trade_no, "callback for unknown trade number");
            return Err(Error::PaymentNotFound(trade_no));
        };

        if payment.status == PaymentStatus::Paid {
            info!(payment_id = %payment.id, %trade_no, "duplicate callback, payment already paid");
            return Ok(CallbackOutcome::AlreadyPaid);
        }

        let now = self.clock.now();
        if !self.payments.mark_paid(payment.id, now).await? {
            // Lost the pending -> paid race or the payment is in a state that
            // cannot be settled.
            let current = self.payments.get(payment.id).await?;
            return match current.map(|p| p.status) {
                Some(PaymentStatus::Paid) => {
                    info!(payment_id = %payment.id, %trade_no, "concurrent callback already settled the payment");
                    Ok(CallbackOutcome::AlreadyPaid)
                }
                Some(status) => Err(Error::Validation(format!(
                    "payment {} is {status} and cannot be settled",
                    payment.id
                ))),
                None => Err(Error::PaymentNotFound(trade_no)),
            };
        }
        info!(payment_id = %payment.id, order_id = %payment.order_id, %trade_no, "payment marked paid");

        confirm_booking(self.bookings.as_ref(), &payment, now).await?;
        Ok(CallbackOutcome::Confirmed)
    }
}

/// Moves the payment's booking to paid. A booking that is already paid counts
/// as confirmed.
pub(crate) async fn confirm_booking(bookings: &dyn BookingStore, payment: &Payment, now: DateTime<Utc>) -> Result<()> {
    let failed = |cause: Error| {
        error!(payment_id = %payment.id, booking_id = %payment.order_id, error = %cause, "payment is paid but booking confirmation failed");
        Error::BookingConfirmation {
            payment_id: payment.id,
            booking_id: payment.order_id,
            cause: Box::new(cause),
        }
    };

    match bookings.mark_paid(payment.order_id, now).await {
        Ok(true) => {
            info!(payment_id = %payment.id, booking_id = %payment.order_id, "booking confirmed");
            Ok(())
        }
        Ok(false) => match bookings.get(payment.order_id).await {
            Ok(Some(booking)) if booking.status == BookingStatus::Paid => Ok(()),
            Ok(Some(booking)) => Err(failed(Error::Validation(format!(
                "booking is {}",
                booking.status
            )))),
            Ok(None) => Err(failed(Error::not_found("booking", payment.order_id))),
            Err(e) => Err(failed(e.into())),
        },
        Err(e) => Err(failed(e.into())),
    }
}
