use cruise_inventory::{HoldManager, PricingLookup};
use cruise_shared::store::BookingStore;
use cruise_shared::{reason, Booking, Clock, Error, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Turns "customer wants N guests on product P" into a persisted booking.
///
/// The inventory debit happens first and outside the booking transaction, so
/// every failure after it releases the hold and credits the unit back.
#[derive(Clone)]
pub struct BookingOrchestrator {
    holds: HoldManager,
    pricing: PricingLookup,
    bookings: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl BookingOrchestrator {
    pub fn new(
        holds: HoldManager,
        pricing: PricingLookup,
        bookings: Arc<dyn BookingStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            holds,
            pricing,
            bookings,
            clock,
        }
    }

    pub async fn create_booking(
        &self,
        customer_id: Uuid,
        voyage_id: Uuid,
        product_id: Uuid,
        guests: i32,
    ) -> Result<Booking> {
        if guests < 1 {
            return Err(Error::Validation(format!("guests must be at least 1, got {guests}")));
        }

        match self.holds.hold(product_id, customer_id, 1).await {
            Ok(true) => {}
            Ok(false) => return Err(Error::CannotReserve { product_id }),
            // Inventory may be off by the held unit; surface both errors.
            Err(e @ Error::Compensation { .. }) => return Err(e),
            Err(e) => {
                warn!(%product_id, %customer_id, error = %e, "hold failed");
                return Err(Error::CannotReserve { product_id });
            }
        }

        match self.persist(customer_id, voyage_id, product_id, guests).await {
            Ok(booking) => {
                info!(booking_id = %booking.id, %customer_id, %product_id, guests, total_amount = booking.total_amount, "booking created");
                Ok(booking)
            }
            Err(original) => self.compensate(product_id, customer_id, original).await,
        }
    }

    pub async fn get_booking(&self, id: Uuid) -> Result<Booking> {
        self.bookings
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found("booking", id))
    }

    async fn persist(&self, customer_id: Uuid, voyage_id: Uuid, product_id: Uuid, guests: i32) -> Result<Booking> {
        let now = self.clock.now();
        let price = self
            .pricing
            .find_price(product_id, &now, guests)
            .await?
            .ok_or(Error::PriceNotFound {
                product_id,
                date: now.date_naive(),
                occupancy: guests,
            })?;

        let booking = Booking::new(customer_id, voyage_id, product_id, guests, price, now);
        // The hold is deleted in the same transaction as the insert. If it
        // is gone it expired and was already credited back.
        if !self.bookings.insert_consuming_hold(&booking).await? {
            return Err(Error::CannotReserve { product_id });
        }
        Ok(booking)
    }

    async fn compensate(&self, product_id: Uuid, customer_id: Uuid, original: Error) -> Result<Booking> {
        match self.holds.release(product_id, customer_id, reason::BOOKING_ROLLBACK).await {
            Ok(qty) => {
                warn!(%product_id, %customer_id, credited = qty, error = %original, "booking failed, hold released");
                Err(original)
            }
            Err(compensation) => {
                error!(%product_id, %customer_id, error = %original, compensation_error = %compensation, "booking failed and hold release failed, inventory needs manual reconciliation");
                Err(Error::compensation(original, compensation))
            }
        }
    }
}
