use chrono::NaiveDate;
use uuid::Uuid;

use crate::PaymentStatus;

pub type Result<T> = std::result::Result<T, Error>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures raised by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("invalid stored value: {0}")]
    Decode(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("insufficient inventory for product {product_id}")]
    InsufficientInventory { product_id: Uuid },

    #[error("cannot reserve product {product_id}")]
    CannotReserve { product_id: Uuid },

    #[error("no price configured for product {product_id} on {date} for {occupancy} guests")]
    PriceNotFound {
        product_id: Uuid,
        date: NaiveDate,
        occupancy: i32,
    },

    #[error("unknown payment provider: {0:?}")]
    UnknownProvider(String),

    #[error("callback verification failed: {0}")]
    SignatureInvalid(String),

    #[error("malformed callback payload: {0}")]
    MalformedCallback(String),

    #[error("no payment with trade number {0:?}")]
    PaymentNotFound(String),

    #[error("payment {payment_id} is {status}, only paid payments can be refunded")]
    PaymentNotPaid { payment_id: Uuid, status: PaymentStatus },

    #[error("refund of {requested} exceeds remaining refundable balance {remaining}")]
    RefundExceedsBalance { requested: i64, remaining: i64 },

    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("payment {payment_id} is paid but booking {booking_id} was not confirmed: {cause}")]
    BookingConfirmation {
        payment_id: Uuid,
        booking_id: Uuid,
        cause: Box<Error>,
    },

    #[error("{original}; compensation also failed: {compensation}")]
    Compensation {
        original: Box<Error>,
        compensation: Box<Error>,
    },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Pairs a failure with the failure of the action that tried to undo it.
    pub fn compensation(original: Error, compensation: Error) -> Self {
        Self::Compensation {
            original: Box::new(original),
            compensation: Box::new(compensation),
        }
    }

    /// Whether the caller caused the failure. Everything else is reported as
    /// a generic internal error.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::InsufficientInventory { .. }
            | Self::CannotReserve { .. }
            | Self::PriceNotFound { .. }
            | Self::UnknownProvider(_)
            | Self::SignatureInvalid(_)
            | Self::MalformedCallback(_)
            | Self::PaymentNotFound(_)
            | Self::PaymentNotPaid { .. }
            | Self::RefundExceedsBalance { .. }
            | Self::InvalidAmount(_)
            | Self::Validation(_)
            | Self::NotFound { .. } => true,
            Self::BookingConfirmation { .. } | Self::Compensation { .. } | Self::Storage(_) => false,
        }
    }
}
