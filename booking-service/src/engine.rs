use cruise_inventory::{HoldManager, HoldSweeper, InventoryLedger, PricingLookup};
use cruise_payment::{
    AlipayGateway, CallbackProcessor, PaymentService, PaymentVerifier, Reconciler, RefundProcessor, WechatGateway,
};
use cruise_shared::store::{BookingStore, HoldStore, InventoryStore, PaymentStore, PriceStore, RefundStore};
use cruise_shared::Clock;
use std::sync::Arc;
use std::time::Duration;

use crate::api::AppState;
use crate::orchestrator::BookingOrchestrator;
use crate::search::{SearchIndexer, SearchRetryQueue};

/// Storage backends for every component.
#[derive(Clone)]
pub struct Stores {
    pub inventory: Arc<dyn InventoryStore>,
    pub holds: Arc<dyn HoldStore>,
    pub prices: Arc<dyn PriceStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub refunds: Arc<dyn RefundStore>,
}

pub struct EngineConfig {
    pub hold_ttl: Duration,
    pub search_queue_size: usize,
    pub search_max_attempts: u32,
    pub search_backoff: Duration,
    pub verifiers: Vec<(String, Arc<dyn PaymentVerifier>)>,
}

/// The HTTP state plus the background workers that share its components.
pub struct Engine {
    pub state: AppState,
    pub sweeper: HoldSweeper,
    pub reconciler: Reconciler,
}

impl Engine {
    pub fn new(stores: Stores, clock: Arc<dyn Clock>, config: EngineConfig, indexer: Arc<dyn SearchIndexer>) -> Self {
        let ledger = InventoryLedger::new(stores.inventory.clone(), clock.clone());
        let holds = HoldManager::new(ledger.clone(), stores.holds.clone(), clock.clone(), config.hold_ttl);
        let pricing = PricingLookup::new(stores.prices.clone());
        let bookings = BookingOrchestrator::new(holds, pricing.clone(), stores.bookings.clone(), clock.clone());

        let payments = PaymentService::new(stores.payments.clone(), stores.bookings.clone(), clock.clone())
            .with_gateway(Arc::new(WechatGateway))
            .with_gateway(Arc::new(AlipayGateway));
        let callbacks = config.verifiers.into_iter().fold(
            CallbackProcessor::new(stores.payments.clone(), stores.bookings.clone(), clock.clone()),
            |processor, (provider, verifier)| processor.with_verifier(provider, verifier),
        );
        let refunds = RefundProcessor::new(stores.payments.clone(), stores.refunds.clone(), clock.clone());

        let state = AppState {
            bookings,
            ledger: ledger.clone(),
            pricing,
            payments: Arc::new(payments),
            callbacks: Arc::new(callbacks),
            refunds,
            search: SearchRetryQueue::new(
                indexer,
                config.search_queue_size,
                config.search_max_attempts,
                config.search_backoff,
            ),
        };

        Self {
            state,
            sweeper: HoldSweeper::new(ledger, stores.holds, clock.clone()),
            reconciler: Reconciler::new(stores.payments, stores.bookings, clock),
        }
    }
}
