use axum::http::StatusCode;
use chrono::Duration;
use cruise_shared::store::InventoryStore;
use cruise_shared::{reason, BookingStatus, Clock, Hold, PaymentStatus};
use cruise_testing::Op;
use serde_json::{json, Value};
use uuid::Uuid;

mod common;
use common::*;

fn id(value: &Value, field: &str) -> Uuid {
    Uuid::parse_str(value[field].as_str().unwrap()).unwrap()
}

mod booking_tests {
    use super::*;

    #[tokio::test]
    async fn booking_debits_one_cabin_and_prices_the_stay() {
        let app = setup_test_app();
        let product = app.publish_product(4, 129_900).await;

        let (status, body) = app.book(Uuid::new_v4(), product, 2).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "created");
        assert_eq!(body["total_amount"], 129_900);

        let (status, availability) = app.get(&format!("/api/v1/products/{product}/availability")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(availability["available"], 3);
        // The hold is consumed by the booking, the debit stays as the sale.
        assert!(app.store.holds().is_empty());

        let booking_id = id(&body, "id");
        let (status, fetched) = app.get(&format!("/api/v1/bookings/{booking_id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["guests"], 2);
        assert_eq!(fetched["product_id"], product.to_string());
    }

    #[tokio::test]
    async fn last_cabin_goes_to_one_customer_and_returns_after_rollback() {
        let app = setup_test_app();
        let product = app.publish_product(1, 80_000).await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        app.store.fail(Op::BookingInsert);
        let (status, body) = app.book(alice, product, 2).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert_eq!(body["message"], "An internal error occurred");
        assert_eq!(app.store.total(product), Some(1));
        assert!(app.store.holds().is_empty());

        app.store.heal(Op::BookingInsert);
        let (status, _) = app.book(bob, product, 2).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app.book(alice, product, 2).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "CANNOT_RESERVE");
        assert_eq!(app.store.total(product), Some(0));

        let reasons: Vec<String> = app.store.audit_log().into_iter().map(|e| e.reason).collect();
        assert!(reasons.iter().any(|r| r == reason::BOOKING_ROLLBACK));
    }

    #[tokio::test]
    async fn missing_price_is_a_validation_failure_and_restores_inventory() {
        let app = setup_test_app();
        let product = app.publish_product(2, 50_000).await;

        let (status, body) = app.book(Uuid::new_v4(), product, 3).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "PRICE_NOT_FOUND");
        assert_eq!(app.store.total(product), Some(2));
        assert!(app.store.bookings().is_empty());
    }

    #[tokio::test]
    async fn zero_guests_is_rejected_before_touching_inventory() {
        let app = setup_test_app();
        let product = app.publish_product(2, 50_000).await;

        let (status, body) = app.book(Uuid::new_v4(), product, 0).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(app.store.writes(Op::InventoryAdjust), 0);
    }

    #[tokio::test]
    async fn booking_requires_a_customer_identity() {
        let app = setup_test_app();
        let product = app.publish_product(2, 50_000).await;

        let (status, body) = app
            .post_json(
                "/api/v1/bookings",
                json!({ "voyage_id": Uuid::new_v4(), "product_id": product, "guests": 2 }),
            )
            .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn expired_hold_is_credited_back_when_the_customer_books_again() {
        let app = setup_test_app();
        let product = app.publish_product(2, 50_000).await;
        let customer = Uuid::new_v4();
        let stale = Hold::new(product, customer, 1, app.clock.now(), Duration::minutes(15));
        app.store.seed_hold(stale);
        app.store.adjust_total(product, -1, app.clock.now()).await.unwrap();

        app.clock.advance(Duration::minutes(16));
        let (status, _) = app.book(customer, product, 2).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.store.total(product), Some(1));
        assert!(app
            .store
            .audit_log()
            .iter()
            .any(|e| e.reason == reason::HOLD_EXPIRED && e.change == 1));
    }

    #[tokio::test]
    async fn audit_route_shows_expired_units_that_were_not_credited() {
        let app = setup_test_app();
        let product = app.publish_product(2, 50_000).await;
        let customer = Uuid::new_v4();
        let stale = Hold::new(product, customer, 1, app.clock.now(), Duration::minutes(15));
        app.store.seed_hold(stale);
        app.store.adjust_total(product, -1, app.clock.now()).await.unwrap();

        app.clock.advance(Duration::minutes(16));
        app.store.fail_after(Op::InventoryAdjust, 1);
        let (status, _) = app.book(customer, product, 2).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.store.total(product), Some(0));

        let (status, body) = app.get(&format!("/api/v1/admin/products/{product}/audit")).await;

        assert_eq!(status, StatusCode::OK);
        let entries = body.as_array().unwrap();
        assert!(entries
            .iter()
            .any(|e| e["reason"] == reason::HOLD_EXPIRED_UNCREDITED && e["change"] == 1));
        assert!(entries.iter().any(|e| e["reason"] == reason::CABIN_HOLD && e["change"] == -1));
    }

    #[tokio::test]
    async fn unknown_booking_is_not_found() {
        let app = setup_test_app();

        let (status, body) = app.get(&format!("/api/v1/bookings/{}", Uuid::new_v4())).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }
}

mod payment_tests {
    use super::*;

    struct Initiated {
        booking_id: Uuid,
        payment_id: Uuid,
        trade_no: String,
    }

    async fn booked_and_initiated(app: &TestApp) -> Initiated {
        let product = app.publish_product(3, 10_000).await;
        let (_, booking) = app.book(Uuid::new_v4(), product, 2).await;
        let booking_id = id(&booking, "id");

        let (status, payment) = app
            .post_json("/api/v1/payments", json!({ "booking_id": booking_id, "provider": "wechat" }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(payment["pay_url"].as_str().unwrap().starts_with("weixin://"));
        Initiated {
            booking_id,
            payment_id: id(&payment, "payment_id"),
            trade_no: payment["trade_no"].as_str().unwrap().to_string(),
        }
    }

    #[tokio::test]
    async fn signed_callback_settles_payment_and_booking_once() {
        let app = setup_test_app();
        let started = booked_and_initiated(&app).await;
        let body = json!({ "trade_no": started.trade_no, "trade_state": "SUCCESS" }).to_string();
        let signature = app.signer.sign(body.as_bytes());

        let first = app.callback("/api/v1/payments/callback?provider=wechat", &body, &signature).await;
        let second = app.callback("/api/v1/payments/callback?provider=wechat", &body, &signature).await;

        assert_eq!(first["code"], "SUCCESS");
        assert_eq!(second["code"], "SUCCESS");
        assert_eq!(app.store.writes(Op::PaymentMarkPaid), 1);
        assert_eq!(app.store.writes(Op::BookingMarkPaid), 1);
        assert_eq!(app.store.booking(started.booking_id).unwrap().status, BookingStatus::Paid);
        assert_eq!(app.store.payment(started.payment_id).unwrap().status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn tampered_callback_is_acknowledged_with_fail_and_changes_nothing() {
        let app = setup_test_app();
        let started = booked_and_initiated(&app).await;
        let body = json!({ "trade_no": started.trade_no }).to_string();
        let signature = app.signer.sign(body.as_bytes());
        let tampered = body.replace('}', ",\"amount\":1}");

        let response = app
            .callback("/api/v1/payments/callback?provider=wechat", &tampered, &signature)
            .await;

        assert_eq!(response["code"], "FAIL");
        assert_eq!(app.store.writes(Op::PaymentMarkPaid), 0);
        assert_eq!(app.store.booking(started.booking_id).unwrap().status, BookingStatus::Created);
    }

    #[tokio::test]
    async fn duplicated_provider_parameter_still_gets_fail_body() {
        let app = setup_test_app();
        let started = booked_and_initiated(&app).await;
        let body = json!({ "trade_no": started.trade_no, "trade_state": "SUCCESS" }).to_string();
        let signature = app.signer.sign(body.as_bytes());

        let response = app
            .callback("/api/v1/payments/callback?provider=wechat&provider=wechat", &body, &signature)
            .await;

        assert_eq!(response["code"], "FAIL");
        assert_eq!(app.store.writes(Op::PaymentMarkPaid), 0);
        assert_eq!(app.store.booking(started.booking_id).unwrap().status, BookingStatus::Created);
    }

    #[tokio::test]
    async fn callback_from_unconfigured_provider_fails() {
        let app = setup_test_app();
        let started = booked_and_initiated(&app).await;
        let body = json!({ "trade_no": started.trade_no }).to_string();
        let signature = app.signer.sign(body.as_bytes());

        let response = app
            .callback("/api/v1/payments/callback?provider=alipay", &body, &signature)
            .await;

        assert_eq!(response["code"], "FAIL");
        assert_eq!(app.store.writes(Op::PaymentMarkPaid), 0);
    }

    #[tokio::test]
    async fn unsupported_payment_provider_is_a_bad_request() {
        let app = setup_test_app();
        let product = app.publish_product(1, 10_000).await;
        let (_, booking) = app.book(Uuid::new_v4(), product, 2).await;

        let (status, body) = app
            .post_json(
                "/api/v1/payments",
                json!({ "booking_id": id(&booking, "id"), "provider": "paypal" }),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "UNKNOWN_PROVIDER");
    }

    #[tokio::test]
    async fn refunds_are_capped_at_the_paid_amount() {
        let app = setup_test_app();
        let started = booked_and_initiated(&app).await;
        let body = json!({ "trade_no": started.trade_no }).to_string();
        let signature = app.signer.sign(body.as_bytes());
        app.callback("/api/v1/payments/callback?provider=wechat", &body, &signature)
            .await;
        let payment_id = started.payment_id;

        let (status, first) = app
            .post_json(
                "/api/v1/refunds",
                json!({ "payment_id": payment_id, "amount": 7_000, "reason": "cabin downgrade" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let first_id = id(&first, "id");
        let (status, approved) = app
            .post_json(&format!("/api/v1/refunds/{first_id}/approve"), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["status"], "approved");

        let (status, remainder) = app
            .post_json("/api/v1/refunds", json!({ "payment_id": payment_id, "amount": 3_000 }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(remainder["status"], "pending");

        let (status, body) = app
            .post_json("/api/v1/refunds", json!({ "payment_id": payment_id, "amount": 1 }))
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "REFUND_EXCEEDS_BALANCE");

        let remainder_id = id(&remainder, "id");
        let (status, cancelled) = app
            .post_json(&format!("/api/v1/refunds/{remainder_id}/cancel"), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cancelled["status"], "cancelled");

        let (status, _) = app
            .post_json("/api/v1/refunds", json!({ "payment_id": payment_id, "amount": 1 }))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn refund_of_an_unpaid_payment_conflicts() {
        let app = setup_test_app();
        let started = booked_and_initiated(&app).await;

        let (status, body) = app
            .post_json(
                "/api/v1/refunds",
                json!({ "payment_id": started.payment_id, "amount": 100 }),
            )
            .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "PAYMENT_NOT_PAID");
    }
}

#[tokio::test]
async fn health_check_reports_ok() {
    let app = setup_test_app();

    let (status, body) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
