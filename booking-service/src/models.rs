use chrono::{DateTime, Utc};
use cruise_shared::{Booking, StoreError};
use diesel::prelude::*;
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::bookings)]
pub struct BookingRow {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub voyage_id: Uuid,
    pub product_id: Uuid,
    pub guests: i32,
    pub status: String,
    pub total_amount: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Booking> for BookingRow {
    fn from(booking: &Booking) -> Self {
        Self {
            id: booking.id,
            customer_id: booking.customer_id,
            voyage_id: booking.voyage_id,
            product_id: booking.product_id,
            guests: booking.guests,
            status: booking.status.to_string(),
            total_amount: booking.total_amount,
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        }
    }
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            customer_id: row.customer_id,
            voyage_id: row.voyage_id,
            product_id: row.product_id,
            guests: row.guests,
            status: row.status.parse()?,
            total_amount: row.total_amount,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
