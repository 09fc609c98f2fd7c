use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use cruise_shared::store::PriceStore;
use cruise_shared::{Error, PricePoint, Result};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Resolves unit prices by product, UTC calendar day and occupancy.
#[derive(Clone)]
pub struct PricingLookup {
    store: Arc<dyn PriceStore>,
}

impl PricingLookup {
    pub fn new(store: Arc<dyn PriceStore>) -> Self {
        Self { store }
    }

    /// Looks up the price for the UTC day that contains `at`, whatever zone
    /// `at` is expressed in. `Ok(None)` means no price is configured; storage
    /// failures come back as `Err`.
    pub fn find_price<Tz: TimeZone>(
        &self,
        product_id: Uuid,
        at: &DateTime<Tz>,
        occupancy: i32,
    ) -> impl Future<Output = Result<Option<i64>>> + Send + '_ {
        let day = at.with_timezone(&Utc).date_naive();
        self.find_price_on(product_id, day, occupancy)
    }

    pub async fn find_price_on(&self, product_id: Uuid, day: NaiveDate, occupancy: i32) -> Result<Option<i64>> {
        let points = self.store.list_by_product(product_id).await?;
        let price = points
            .iter()
            .find(|p| p.day() == day && p.occupancy == occupancy)
            .map(|p| p.unit_price);

        if price.is_none() {
            debug!(%product_id, %day, occupancy, candidates = points.len(), "no matching price point");
        }
        Ok(price)
    }

    /// Stores the price for `day`, anchored at UTC midnight.
    pub async fn set_price(&self, product_id: Uuid, day: NaiveDate, occupancy: i32, unit_price: i64) -> Result<PricePoint> {
        if occupancy < 1 {
            return Err(Error::Validation(format!("occupancy must be at least 1, got {occupancy}")));
        }
        if unit_price < 0 {
            return Err(Error::InvalidAmount(unit_price));
        }

        let point = PricePoint {
            product_id,
            calendar_date: Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN)),
            occupancy,
            unit_price,
        };
        self.store.upsert(&point).await?;
        info!(%product_id, %day, occupancy, unit_price, "price point stored");
        Ok(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use cruise_testing::{InMemoryStore, Op};

    fn may_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 1).unwrap()
    }

    async fn lookup_with_price(product: Uuid) -> (PricingLookup, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let lookup = PricingLookup::new(store.clone());
        lookup.set_price(product, may_first(), 2, 129_900).await.unwrap();
        (lookup, store)
    }

    #[tokio::test]
    async fn matches_on_utc_calendar_day_not_wall_clock() {
        let product = Uuid::new_v4();
        let (lookup, _) = lookup_with_price(product).await;
        let shanghai = FixedOffset::east_opt(8 * 3600).unwrap();

        let same_day = shanghai.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        assert_eq!(lookup.find_price(product, &same_day, 2).await.unwrap(), Some(129_900));

        // 2026-04-30T16:00:00Z
        let previous_day = shanghai.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(lookup.find_price(product, &previous_day, 2).await.unwrap(), None);

        let utc_midnight = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(lookup.find_price(product, &utc_midnight, 2).await.unwrap(), Some(129_900));
    }

    #[tokio::test]
    async fn occupancy_must_match_exactly() {
        let product = Uuid::new_v4();
        let (lookup, _) = lookup_with_price(product).await;
        assert_eq!(lookup.find_price_on(product, may_first(), 3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn storage_failure_is_not_a_missing_price() {
        let product = Uuid::new_v4();
        let (lookup, store) = lookup_with_price(product).await;
        store.fail(Op::PriceList);

        let err = lookup.find_price_on(product, may_first(), 2).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[tokio::test]
    async fn set_price_replaces_the_same_day_and_occupancy() {
        let product = Uuid::new_v4();
        let (lookup, _) = lookup_with_price(product).await;
        lookup.set_price(product, may_first(), 2, 99_900).await.unwrap();

        assert_eq!(lookup.find_price_on(product, may_first(), 2).await.unwrap(), Some(99_900));
        assert!(lookup.set_price(product, may_first(), 0, 1).await.is_err());
        assert!(matches!(
            lookup.set_price(product, may_first(), 2, -1).await,
            Err(Error::InvalidAmount(-1))
        ));
    }
}
