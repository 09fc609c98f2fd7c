use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub mod clock;
pub mod error;
pub mod locks;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use error::{Error, Result, StoreError, StoreResult};
pub use locks::KeyedLocks;

/// Audit reasons recorded against inventory adjustments.
pub mod reason {
    pub const CABIN_HOLD: &str = "cabin_hold";
    pub const CABIN_HOLD_ROLLBACK: &str = "cabin_hold_rollback";
    pub const CABIN_HOLD_RELEASE: &str = "cabin_hold_release";
    pub const HOLD_EXPIRED: &str = "hold_expired";
    /// Expired hold units that were deleted but could not be credited back.
    /// The entry's `change` is owed to `total` and was not applied.
    pub const HOLD_EXPIRED_UNCREDITED: &str = "hold_expired_uncredited";
    pub const BOOKING_ROLLBACK: &str = "booking_rollback";
    pub const ADMIN_ADJUST: &str = "admin_adjust";
}

/// Counters for one sellable cabin SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub product_id: Uuid,
    pub total: i32,
    pub locked: i32,
    pub sold: i32,
    pub updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    pub fn new(product_id: Uuid, total: i32, now: DateTime<Utc>) -> Self {
        Self {
            product_id,
            total,
            locked: 0,
            sold: 0,
            updated_at: now,
        }
    }

    pub fn available(&self) -> i32 {
        self.total - self.locked - self.sold
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryAuditEntry {
    pub product_id: Uuid,
    pub change: i32,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// A customer's temporary claim on inventory that has already been debited
/// from `total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    pub id: Uuid,
    pub product_id: Uuid,
    pub customer_id: Uuid,
    pub qty: i32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Hold {
    pub fn new(product_id: Uuid, customer_id: Uuid, qty: i32, now: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            customer_id,
            qty,
            expires_at: now + ttl,
            created_at: now,
        }
    }

    /// A hold is active strictly before its expiry instant.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub product_id: Uuid,
    pub calendar_date: DateTime<Utc>,
    pub occupancy: i32,
    pub unit_price: i64,
}

impl PricePoint {
    /// The UTC calendar day this price applies to.
    pub fn day(&self) -> NaiveDate {
        self.calendar_date.date_naive()
    }
}

macro_rules! status_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = StoreError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(StoreError::Decode(format!(
                        "unknown {} {:?}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

status_enum!(BookingStatus {
    Created => "created",
    Paid => "paid",
    Cancelled => "cancelled",
});

status_enum!(PaymentStatus {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
});

status_enum!(RefundStatus {
    Pending => "pending",
    Approved => "approved",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub voyage_id: Uuid,
    pub product_id: Uuid,
    pub guests: i32,
    pub status: BookingStatus,
    pub total_amount: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        customer_id: Uuid,
        voyage_id: Uuid,
        product_id: Uuid,
        guests: i32,
        total_amount: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            voyage_id,
            product_id,
            guests,
            status: BookingStatus::Created,
            total_amount,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: String,
    pub provider_trade_no: String,
    pub amount: i64,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn pending(
        order_id: Uuid,
        provider: impl Into<String>,
        provider_trade_no: impl Into<String>,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            provider: provider.into(),
            provider_trade_no: provider_trade_no.into(),
            amount,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub amount: i64,
    pub reason: String,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Refund {
    pub fn pending(payment_id: Uuid, amount: i64, reason: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_id,
            amount,
            reason: reason.into(),
            status: RefundStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}
