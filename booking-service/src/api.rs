use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use chrono::NaiveDate;
use cruise_inventory::{InventoryLedger, PricingLookup};
use cruise_payment::{CallbackProcessor, PaymentService, RefundProcessor};
use cruise_shared::{Booking, BookingStatus, Error, InventoryAuditEntry, InventoryRecord, PricePoint, Refund};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::orchestrator::BookingOrchestrator;
use crate::search::{ProductDocument, SearchRetryQueue};

pub const CUSTOMER_HEADER: &str = "x-customer-id";
pub const PROVIDER_HEADER: &str = "x-payment-provider";
pub const WECHAT_SIGNATURE_HEADER: &str = "wechatpay-signature";

#[derive(Clone)]
pub struct AppState {
    pub bookings: BookingOrchestrator,
    pub ledger: InventoryLedger,
    pub pricing: PricingLookup,
    pub payments: Arc<PaymentService>,
    pub callbacks: Arc<CallbackProcessor>,
    pub refunds: RefundProcessor,
    pub search: SearchRetryQueue,
}

#[derive(Debug)]
pub enum ApiError {
    Domain(Error),
    Unauthenticated(String),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self::Domain(e)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", msg.clone()),
            ApiError::Domain(err) => {
                let (status, code) = classify(err);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!(error = %err, "request failed");
                    (status, code, "An internal error occurred".to_string())
                } else {
                    (status, code, err.to_string())
                }
            }
        };

        (status, Json(ErrorResponse { code, message })).into_response()
    }
}

fn classify(err: &Error) -> (StatusCode, &'static str) {
    match err {
        Error::InsufficientInventory { .. } => (StatusCode::CONFLICT, "INSUFFICIENT_INVENTORY"),
        Error::CannotReserve { .. } => (StatusCode::CONFLICT, "CANNOT_RESERVE"),
        Error::PaymentNotPaid { .. } => (StatusCode::CONFLICT, "PAYMENT_NOT_PAID"),
        Error::PriceNotFound { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "PRICE_NOT_FOUND"),
        Error::RefundExceedsBalance { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "REFUND_EXCEEDS_BALANCE"),
        Error::InvalidAmount(_) | Error::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
        Error::UnknownProvider(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_PROVIDER"),
        Error::SignatureInvalid(_) | Error::MalformedCallback(_) => (StatusCode::BAD_REQUEST, "BAD_CALLBACK"),
        Error::NotFound { .. } | Error::PaymentNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        Error::BookingConfirmation { .. } | Error::Compensation { .. } | Error::Storage(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Customer identity placed on the request by the auth gateway.
pub struct CustomerId(pub Uuid);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CustomerId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(CUSTOMER_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated(format!("missing {CUSTOMER_HEADER} header")))?;
        let id = value
            .to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .ok_or_else(|| ApiError::Unauthenticated(format!("invalid {CUSTOMER_HEADER} header")))?;
        Ok(CustomerId(id))
    }
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/:id", get(get_booking))
        .route("/payments", post(create_payment))
        .route("/payments/callback", post(payment_callback))
        .route("/refunds", post(create_refund))
        .route("/refunds/:id/approve", post(approve_refund))
        .route("/refunds/:id/cancel", post(cancel_refund))
        .route("/admin/products/:id/inventory", post(publish_inventory))
        .route("/admin/products/:id/prices", put(set_price))
        .route("/admin/products/:id/audit", get(inventory_audit))
        .route("/products/:id/availability", get(availability));

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub voyage_id: Uuid,
    pub product_id: Uuid,
    pub guests: i32,
}

#[derive(Debug, Serialize)]
pub struct CreateBookingResponse {
    pub id: Uuid,
    pub status: BookingStatus,
    pub total_amount: i64,
}

pub async fn create_booking(
    State(state): State<AppState>,
    CustomerId(customer_id): CustomerId,
    Json(request): Json<CreateBookingRequest>,
) -> ApiResult<CreateBookingResponse> {
    let booking = state
        .bookings
        .create_booking(customer_id, request.voyage_id, request.product_id, request.guests)
        .await?;

    Ok(Json(CreateBookingResponse {
        id: booking.id,
        status: booking.status,
        total_amount: booking.total_amount,
    }))
}

pub async fn get_booking(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Booking> {
    Ok(Json(state.bookings.get_booking(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub booking_id: Uuid,
    pub provider: String,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    pub payment_id: Uuid,
    pub trade_no: String,
    pub pay_url: String,
}

pub async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentRequest>,
) -> ApiResult<CreatePaymentResponse> {
    let started = state.payments.initiate(request.booking_id, &request.provider).await?;
    Ok(Json(CreatePaymentResponse {
        payment_id: started.payment.id,
        trade_no: started.payment.provider_trade_no,
        pay_url: started.pay_url,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub provider: Option<String>,
    pub sign: Option<String>,
}

/// Always answers 200; the provider reads the outcome from the body and
/// redelivers on `FAIL`.
pub async fn payment_callback(
    State(state): State<AppState>,
    query: Option<Query<CallbackQuery>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<serde_json::Value> {
    // A malformed query string must not turn into a 400; providers only read the body.
    let query = query.map(|Query(q)| q).unwrap_or_default();
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned);

    let provider = query.provider.or_else(|| header(PROVIDER_HEADER)).unwrap_or_default();
    let signature = header(WECHAT_SIGNATURE_HEADER).or(query.sign).unwrap_or_default();

    match state.callbacks.handle_callback(&provider, &body, &signature).await {
        Ok(outcome) => {
            info!(provider = %provider, ?outcome, "payment callback acknowledged");
            Json(json!({ "code": "SUCCESS" }))
        }
        Err(e) => {
            let message = if e.is_client_error() {
                e.to_string()
            } else {
                "internal error".to_string()
            };
            warn!(provider = %provider, error = %e, "payment callback failed");
            Json(json!({ "code": "FAIL", "message": message }))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRefundRequest {
    pub payment_id: Uuid,
    pub amount: i64,
    #[serde(default)]
    pub reason: String,
}

pub async fn create_refund(
    State(state): State<AppState>,
    Json(request): Json<CreateRefundRequest>,
) -> ApiResult<Refund> {
    let refund = state
        .refunds
        .create_refund(request.payment_id, request.amount, &request.reason)
        .await?;
    Ok(Json(refund))
}

pub async fn approve_refund(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Refund> {
    Ok(Json(state.refunds.approve(id).await?))
}

pub async fn cancel_refund(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Refund> {
    Ok(Json(state.refunds.cancel(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct PublishInventoryRequest {
    pub total: i32,
}

pub async fn publish_inventory(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(request): Json<PublishInventoryRequest>,
) -> ApiResult<InventoryRecord> {
    let record = state.ledger.publish(product_id, request.total).await?;

    state.search.enqueue(ProductDocument {
        product_id,
        total: record.total,
        available: record.available(),
        updated_at: record.updated_at,
    });
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct SetPriceRequest {
    pub calendar_date: NaiveDate,
    pub occupancy: i32,
    pub unit_price: i64,
}

pub async fn set_price(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(request): Json<SetPriceRequest>,
) -> ApiResult<PricePoint> {
    let point = state
        .pricing
        .set_price(product_id, request.calendar_date, request.occupancy, request.unit_price)
        .await?;
    Ok(Json(point))
}

pub async fn inventory_audit(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> ApiResult<Vec<InventoryAuditEntry>> {
    Ok(Json(state.ledger.audit_entries(product_id).await?))
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub product_id: Uuid,
    pub available: i32,
}

pub async fn availability(State(state): State<AppState>, Path(product_id): Path<Uuid>) -> ApiResult<AvailabilityResponse> {
    let available = state.ledger.get_available(product_id).await?;
    Ok(Json(AvailabilityResponse { product_id, available }))
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
