//! Payment side of the booking engine: opening provider payments, settling
//! them from signed callbacks, refunds and the paid-booking reconciler.

pub mod callback;
pub mod gateway;
pub mod models;
pub mod reconcile;
pub mod refund;
pub mod schema;
pub mod store;

pub use callback::{CallbackOutcome, CallbackProcessor, HmacVerifier, PaymentVerifier};
pub use gateway::{provider, AlipayGateway, GatewayOrder, PaymentGateway, PaymentInitiation, PaymentService, WechatGateway};
pub use reconcile::Reconciler;
pub use refund::RefundProcessor;
pub use store::PgPaymentStore;
