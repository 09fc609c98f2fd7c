#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use cruise_booking::{Engine, EngineConfig, Stores, TracingIndexer};
use cruise_payment::{provider, HmacVerifier, PaymentVerifier};
use cruise_testing::{InMemoryStore, ManualClock};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

pub const WECHAT_SECRET: &[u8] = b"wechat-test-secret";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub signer: HmacVerifier,
}

pub fn setup_test_app() -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::fixed());
    let signer = HmacVerifier::new(WECHAT_SECRET).unwrap();

    let stores = Stores {
        inventory: store.clone(),
        holds: store.clone(),
        prices: store.clone(),
        bookings: store.clone(),
        payments: store.clone(),
        refunds: store.clone(),
    };
    let verifier: Arc<dyn PaymentVerifier> = Arc::new(signer.clone());
    let engine = Engine::new(
        stores,
        clock.clone(),
        EngineConfig {
            hold_ttl: Duration::from_secs(900),
            search_queue_size: 16,
            search_max_attempts: 3,
            search_backoff: Duration::from_millis(10),
            verifiers: vec![(provider::WECHAT.to_string(), verifier)],
        },
        Arc::new(TracingIndexer),
    );

    TestApp {
        router: cruise_booking::create_router(engine.state),
        store,
        clock,
        signer,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn put_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("PUT")
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn book(&self, customer: Uuid, product: Uuid, guests: i32) -> (StatusCode, Value) {
        let body = serde_json::json!({
            "voyage_id": Uuid::new_v4(),
            "product_id": product,
            "guests": guests,
        });
        self.send(
            Request::builder()
                .method("POST")
                .uri("/api/v1/bookings")
                .header("Content-Type", "application/json")
                .header("x-customer-id", customer.to_string())
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Publishes `total` cabins priced at `unit_price` for two guests on the
    /// clock's current day.
    pub async fn publish_product(&self, total: i32, unit_price: i64) -> Uuid {
        let product = Uuid::new_v4();
        let (status, _) = self
            .post_json(
                &format!("/api/v1/admin/products/{product}/inventory"),
                serde_json::json!({ "total": total }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = self
            .put_json(
                &format!("/api/v1/admin/products/{product}/prices"),
                serde_json::json!({
                    "calendar_date": "2026-05-01",
                    "occupancy": 2,
                    "unit_price": unit_price,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        product
    }

    pub async fn callback(&self, uri: &str, body: &str, signature: &str) -> Value {
        let (status, body) = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("Content-Type", "application/json")
                    .header("Wechatpay-Signature", signature)
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body
    }
}
