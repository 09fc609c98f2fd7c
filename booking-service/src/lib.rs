//! Cruise booking engine: booking orchestration, the HTTP surface and process
//! wiring over the inventory and payment crates.

pub mod api;
pub mod engine;
pub mod models;
pub mod orchestrator;
pub mod schema;
pub mod search;
pub mod store;

pub use api::{create_router, AppState};
pub use engine::{Engine, EngineConfig, Stores};
pub use orchestrator::BookingOrchestrator;
pub use search::{ProductDocument, SearchIndexer, SearchRetryQueue, TracingIndexer};
pub use store::PgBookingStore;
