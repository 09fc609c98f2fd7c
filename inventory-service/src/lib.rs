//! Inventory side of the booking engine: the stock ledger, customer holds,
//! price lookup and the Postgres tables behind them.

pub mod hold;
pub mod ledger;
pub mod models;
pub mod pricing;
pub mod schema;
pub mod store;
pub mod sweeper;

pub use hold::{HoldManager, DEFAULT_HOLD_TTL};
pub use ledger::{Adjustment, InventoryLedger};
pub use pricing::PricingLookup;
pub use store::{DbPool, PgInventoryStore};
pub use sweeper::HoldSweeper;
