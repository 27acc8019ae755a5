//! Order placement against the in-memory store: atomicity, pool pressure and
//! transaction failure paths.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::{TestApp, decimal};
use storefront::error::AppError;
use storefront::models::{OrderStatus, PaymentMethod, PaymentStatus};
use storefront::services::{CartItem, PaymentInfo, PlaceOrder, ShippingAddress};

fn cart(items: &[(i32, i32, &str)], method: PaymentMethod) -> PlaceOrder {
    PlaceOrder {
        items: items
            .iter()
            .map(|(product_id, quantity, price)| CartItem {
                product_id: *product_id,
                quantity: *quantity,
                price: decimal(price),
            })
            .collect(),
        shipping_address: ShippingAddress {
            street: "1 Main St".to_string(),
            city: Some("Springfield".to_string()),
            ..Default::default()
        },
        shipping_phone: "555-0100".to_string(),
        payment_method: method,
        client_total: None,
        notes: None,
    }
}

#[tokio::test]
async fn failed_line_insert_leaves_no_rows_behind() {
    let app = TestApp::new().await;
    app.store.inject_fault("insert_order_item", 2);

    let request = cart(
        &[(app.widget, 1, "10.00"), (app.gadget, 2, "4.50")],
        PaymentMethod::Stripe,
    );
    let result = app
        .state
        .services
        .orders
        .place_order(&app.customer, request)
        .await;

    assert!(matches!(result, Err(AppError::Database { .. })), "{result:?}");
    assert_eq!(app.store.order_count().await, 0);
    assert_eq!(app.store.item_count().await, 0);
    assert_eq!(app.store.stats().rollbacks, 1);
    assert_eq!(app.store.stats().commits, 0);
}

#[tokio::test]
async fn multi_line_order_is_priced_server_side() {
    let app = TestApp::new().await;
    let mut request = cart(
        &[(app.widget, 2, "10.00"), (app.gadget, 3, "4.50")],
        PaymentMethod::Paypal,
    );
    request.client_total = Some(decimal("1.00"));

    let details = app
        .state
        .services
        .orders
        .place_order(&app.customer, request)
        .await
        .unwrap();

    assert_eq!(details.order.total_amount, decimal("33.50"));
    assert_eq!(details.lines.len(), 2);
    let totals: Vec<_> = details.lines.iter().map(|l| l.item.total.clone()).collect();
    assert!(totals.contains(&decimal("20.00")));
    assert!(totals.contains(&decimal("13.50")));
    assert_eq!(app.store.item_count().await, 2);
}

#[tokio::test]
async fn single_connection_pool_serves_concurrent_orders() {
    let app = TestApp::with_pool(1, Duration::from_secs(2)).await;
    let orders = &app.state.services.orders;

    let (first, second) = tokio::join!(
        orders.place_order(&app.customer, cart(&[(app.widget, 1, "10.00")], PaymentMethod::Paypal)),
        orders.place_order(&app.customer, cart(&[(app.gadget, 1, "4.50")], PaymentMethod::Paypal)),
    );

    let first = first.unwrap();
    let second = second.unwrap();
    assert_ne!(first.order.id, second.order.id);
    assert_ne!(first.order.order_number, second.order.order_number);
    assert_eq!(app.store.order_count().await, 2);
    assert_eq!(app.state.db_pool.status().max_size, 1);
}

#[tokio::test]
async fn exhausted_pool_reports_acquire_timeout() {
    let app = TestApp::with_pool(1, Duration::from_millis(100)).await;
    let held = app.state.db_pool.acquire().await.unwrap();

    let result = app
        .state
        .services
        .orders
        .place_order(&app.customer, cart(&[(app.widget, 1, "10.00")], PaymentMethod::Stripe))
        .await;
    assert!(matches!(result, Err(AppError::AcquireTimeout { .. })), "{result:?}");
    assert_eq!(app.store.order_count().await, 0);

    drop(held);
    let placed = app
        .state
        .services
        .orders
        .place_order(&app.customer, cart(&[(app.widget, 1, "10.00")], PaymentMethod::Stripe))
        .await;
    assert!(placed.is_ok(), "{placed:?}");
}

#[tokio::test]
async fn failed_rollback_reports_both_causes() {
    let app = TestApp::new().await;
    app.store.inject_fault("insert_order_item", 1);
    app.store.fail_next_rollback();

    let result = app
        .state
        .services
        .orders
        .place_order(&app.customer, cart(&[(app.widget, 1, "10.00")], PaymentMethod::Stripe))
        .await;

    match result {
        Err(AppError::RollbackFailed { cause, rollback }) => {
            assert!(matches!(*cause, AppError::Database { .. }));
            assert!(matches!(*rollback, AppError::Database { .. }));
        }
        other => panic!("Expected RollbackFailed, got {other:?}"),
    }
    // The broken connection is discarded and its snapshot restored.
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn failed_commit_keeps_store_unchanged() {
    let app = TestApp::new().await;
    app.store.fail_next_commit();

    let result = app
        .state
        .services
        .orders
        .place_order(&app.customer, cart(&[(app.widget, 1, "10.00")], PaymentMethod::Stripe))
        .await;

    assert!(result.is_err());
    assert_eq!(app.store.order_count().await, 0);
    assert_eq!(app.store.item_count().await, 0);
}

#[tokio::test]
async fn read_back_failure_keeps_the_committed_order() {
    let app = TestApp::new().await;
    app.store.inject_fault("find_order", 1);

    let result = app
        .state
        .services
        .orders
        .place_order(&app.customer, cart(&[(app.widget, 2, "10.00")], PaymentMethod::Paypal))
        .await;

    let (order_id, order_number) = match result {
        Err(AppError::PartialSuccess {
            order_id,
            order_number,
            ..
        }) => (order_id, order_number),
        other => panic!("Expected PartialSuccess, got {other:?}"),
    };
    let details = app
        .state
        .services
        .orders
        .get_order_by_id(&app.customer, order_id)
        .await
        .unwrap();
    assert_eq!(details.order.order_number, order_number);
    assert_eq!(details.order.total_amount, decimal("20.00"));
}

#[tokio::test]
async fn order_numbers_stay_unique_under_load() {
    let app = TestApp::with_pool(4, Duration::from_secs(5)).await;

    let mut tasks = Vec::new();
    for _ in 0..25 {
        let orders = app.state.services.orders.clone();
        let actor = app.customer;
        let request = cart(&[(app.widget, 1, "10.00")], PaymentMethod::CashOnDelivery);
        tasks.push(tokio::spawn(async move { orders.place_order(&actor, request).await }));
    }

    let mut numbers = HashSet::new();
    for task in tasks {
        let details = task.await.unwrap().unwrap();
        assert!(numbers.insert(details.order.order_number));
    }
    assert_eq!(numbers.len(), 25);
    assert_eq!(app.store.order_count().await, 25);
}

#[tokio::test]
async fn full_lifecycle_pay_then_deliver() {
    let app = TestApp::new().await;
    let orders = &app.state.services.orders;
    let id = orders
        .place_order(&app.customer, cart(&[(app.widget, 1, "10.00")], PaymentMethod::Paypal))
        .await
        .unwrap()
        .order
        .id;

    let paid = orders
        .mark_paid(
            id,
            &app.customer,
            PaymentInfo {
                payment_id: "PAY-1".to_string(),
                payer_email: "alice@example.com".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert!(paid.payment_details.is_some());

    let delivered = orders.mark_delivered(id, &app.admin).await.unwrap();
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert_eq!(delivered.payment_status, PaymentStatus::Paid);
}
