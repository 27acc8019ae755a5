//! HTTP surface: authentication, status codes and response shapes.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{TestApp, json_body};
use storefront::api::middleware::REQUEST_ID_HEADER;
use storefront::api::routes::create_router;
use storefront::models::Role;

fn order_body(product_id: i32, qty: i32, method: &str) -> Value {
    json!({
        "orderItems": [{ "productId": product_id, "qty": qty, "price": "10.00" }],
        "shippingAddress": { "address": "1 Main St", "city": "Springfield" },
        "shippingPhone": "555-0100",
        "paymentMethod": method,
        "totalAmount": "20.00"
    })
}

async fn place(app: &TestApp, method: &str) -> Value {
    let response = app
        .request_as(
            &app.customer,
            Method::POST,
            "/api/orders",
            Some(order_body(app.widget, 2, method)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

#[tokio::test]
async fn place_order_returns_created_order_with_items() {
    let app = TestApp::new().await;

    let body = place(&app, "paypal").await;

    assert_eq!(body["total_amount"], "20.00");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["payment_status"], "pending");
    assert_eq!(body["payment_method"], "paypal");
    assert_eq!(body["shipping_address"]["street"], "1 Main St");
    assert_eq!(body["shipping_address"]["city"], "Springfield");
    assert!(body["order_number"].as_str().unwrap().starts_with("ORD-"));

    let items = body["order_items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["total"], "20.00");
    assert_eq!(items[0]["name"], "Widget");
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::POST, "/api/orders", Some(order_body(app.widget, 1, "paypal")), None)
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    let body = json_body(response).await;
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn token_signed_with_another_secret_is_rejected() {
    let app = TestApp::new().await;
    let forged = storefront::utils::jwt::generate_access_token(
        app.admin.user_id,
        "root@example.com".to_string(),
        Role::Admin,
        "some-other-secret-0123456789abcdef",
        1,
    )
    .unwrap();

    let response = app
        .request(Method::GET, "/api/orders", None, Some(&forged))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_cart_is_bad_request() {
    let app = TestApp::new().await;
    let body = json!({
        "orderItems": [],
        "shippingAddress": { "street": "1 Main St" },
        "shippingPhone": "555-0100",
        "paymentMethod": "stripe"
    });

    let response = app
        .request_as(&app.customer, Method::POST, "/api/orders", Some(body))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn overlong_phone_is_bad_request() {
    let app = TestApp::new().await;
    let mut body = order_body(app.widget, 1, "paypal");
    body["shippingPhone"] = json!("5".repeat(33));

    let response = app
        .request_as(&app.customer, Method::POST, "/api/orders", Some(body))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "VALIDATION_ERROR");
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn prices_the_money_columns_cannot_hold_are_bad_requests() {
    let app = TestApp::new().await;

    for price in ["0.005", "10000000000.00"] {
        let mut body = order_body(app.widget, 1, "paypal");
        body["orderItems"][0]["price"] = json!(price);

        let response = app
            .request_as(&app.customer, Method::POST, "/api/orders", Some(body))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{price}");
        let body = json_body(response).await;
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn stored_totals_match_the_sum_of_stored_lines() {
    let app = TestApp::new().await;
    let body = json!({
        "orderItems": [
            { "productId": app.widget, "qty": 3, "price": "1.5" },
            { "productId": app.gadget, "qty": 1, "price": "0.25" }
        ],
        "shippingAddress": { "street": "1 Main St" },
        "shippingPhone": "555-0100",
        "paymentMethod": "stripe"
    });

    let response = app
        .request_as(&app.customer, Method::POST, "/api/orders", Some(body))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["total_amount"], "4.75");
    let totals: Vec<&str> = body["order_items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["total"].as_str().unwrap())
        .collect();
    assert!(totals.contains(&"4.50"));
    assert!(totals.contains(&"0.25"));
}

#[tokio::test]
async fn injected_line_failure_returns_server_error_without_leaking_driver_text() {
    let app = TestApp::new().await;
    app.store.inject_fault("insert_order_item", 1);

    let response = app
        .request_as(
            &app.customer,
            Method::POST,
            "/api/orders",
            Some(order_body(app.widget, 1, "stripe")),
        )
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["code"], "DATABASE_ERROR");
    assert!(!body["message"].as_str().unwrap().contains("injected"));
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn read_back_failure_reports_the_created_order() {
    let app = TestApp::new().await;
    app.store.inject_fault("find_order_lines", 1);

    let response = app
        .request_as(
            &app.customer,
            Method::POST,
            "/api/orders",
            Some(order_body(app.widget, 1, "stripe")),
        )
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["code"], "ORDER_CREATED_READ_FAILED");
    assert!(body["details"]["order_id"].is_number());
    assert!(body["details"]["order_number"].as_str().unwrap().starts_with("ORD-"));
    assert_eq!(app.store.order_count().await, 1);
}

#[tokio::test]
async fn pay_twice_conflicts() {
    let app = TestApp::new().await;
    let id = place(&app, "paypal").await["id"].as_i64().unwrap();
    let uri = format!("/api/orders/{id}/pay");
    let payment = json!({ "paymentId": "PAY-9", "payerEmail": "alice@example.com" });

    let response = app
        .request_as(&app.customer, Method::PUT, &uri, Some(payment.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["payment_status"], "paid");
    assert_eq!(body["payment_details"]["paymentId"], "PAY-9");

    let response = app
        .request_as(&app.customer, Method::PUT, &uri, Some(payment))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn payment_requires_a_valid_email() {
    let app = TestApp::new().await;
    let id = place(&app, "paypal").await["id"].as_i64().unwrap();

    let response = app
        .request_as(
            &app.customer,
            Method::PUT,
            &format!("/api/orders/{id}/pay"),
            Some(json!({ "paymentId": "PAY-9", "payerEmail": "not-an-email" })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delivery_rules_over_http() {
    let app = TestApp::new().await;
    let cod = place(&app, "cash_on_delivery").await["id"].as_i64().unwrap();
    let card = place(&app, "stripe").await["id"].as_i64().unwrap();

    let response = app
        .request_as(&app.customer, Method::PUT, &format!("/api/orders/{cod}/deliver"), None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request_as(&app.admin, Method::PUT, &format!("/api/orders/{card}/deliver"), None)
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .request_as(&app.admin, Method::PUT, &format!("/api/orders/{cod}/deliver"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "delivered");
    assert_eq!(body["payment_status"], "pending");
}

#[tokio::test]
async fn order_visibility_and_admin_listing() {
    let app = TestApp::new().await;
    let id = place(&app, "paypal").await["id"].as_i64().unwrap();
    let stranger = storefront::services::AuthUser {
        user_id: app.store.add_user("mallory", Role::Customer, true).await,
        role: Role::Customer,
    };

    let response = app
        .request_as(&stranger, Method::GET, &format!("/api/orders/{id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request_as(&app.admin, Method::GET, &format!("/api/orders/{id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request_as(&app.admin, Method::GET, "/api/orders/999", None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request_as(&app.customer, Method::GET, "/api/orders", None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request_as(&app.admin, Method::GET, "/api/orders", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let all = json_body(response).await;
    assert_eq!(all.as_array().unwrap().len(), 1);
    assert_eq!(all[0]["user"]["username"], "alice");

    let response = app
        .request_as(&app.customer, Method::GET, "/api/orders/myorders", None)
        .await;
    let mine = json_body(response).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    assert_eq!(mine[0]["id"], id);
}

#[tokio::test]
async fn health_and_openapi_are_public() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["pool"]["backend"], "memory");

    let response = app.request(Method::GET, "/health/live", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(Method::GET, "/api-docs/openapi.json", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let doc = json_body(response).await;
    assert!(doc["paths"]["/api/orders"]["post"].is_object());
    assert!(doc["components"]["securitySchemes"]["bearerAuth"].is_object());
}

#[tokio::test]
async fn slow_request_times_out_with_json_error() {
    let app = TestApp::with_pool(1, Duration::from_secs(5)).await;
    let router = create_router(app.state.clone(), Duration::from_millis(50));
    let _held = app.state.db_pool.acquire().await.unwrap();

    let request = Request::builder()
        .uri("/api/orders/myorders")
        .header("authorization", format!("Bearer {}", app.token_for(&app.customer)))
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert_eq!(json_body(response).await["code"], "REQUEST_TIMEOUT");
}

#[tokio::test]
async fn unknown_route_gets_json_error() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/nope", None, None).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "NOT_FOUND");
}
