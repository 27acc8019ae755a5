//! Order endpoints.
//!
//! Every route here sits behind `auth_middleware`, which puts the resolved
//! [`AuthUser`] into the request extensions.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::api::doc::ORDER_TAG;
use crate::api::dto::{
    AdminOrderResponse, ErrorResponse, OrderDetailsResponse, OrderResponse, PaymentRequest,
    PlaceOrderRequest,
};
use crate::error::AppResult;
use crate::services::AuthUser;
use crate::state::AppState;
use crate::utils::validate::ValidatedJson;

/// # Routes
/// - `POST /api/orders` - place an order
/// - `GET /api/orders` - all orders (admin)
/// - `GET /api/orders/myorders` - the caller's orders
/// - `GET /api/orders/{id}` - one order with its items
/// - `PUT /api/orders/{id}/pay` - record payment
/// - `PUT /api/orders/{id}/deliver` - mark delivered (admin)
pub fn order_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(place_order, list_orders))
        .routes(routes!(list_my_orders))
        .routes(routes!(get_order))
        .routes(routes!(mark_paid))
        .routes(routes!(mark_delivered))
}

/// Place an order from the submitted cart.
///
/// Line totals and the order total are computed server-side; a client
/// `totalAmount` that disagrees is ignored.
#[utoipa::path(
    post,
    path = "/api/orders",
    tag = ORDER_TAG,
    request_body = PlaceOrderRequest,
    responses(
        (status = 201, description = "Order created", body = OrderDetailsResponse),
        (status = 400, description = "Invalid cart", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 500, description = "Order created but could not be read back", body = ErrorResponse),
        (status = 503, description = "No database connection available", body = ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
async fn place_order(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    ValidatedJson(payload): ValidatedJson<PlaceOrderRequest>,
) -> AppResult<(StatusCode, Json<OrderDetailsResponse>)> {
    let details = state.services.orders.place_order(&actor, payload.into()).await?;
    Ok((StatusCode::CREATED, Json(details.into())))
}

/// List every order with its owner, newest first.
#[utoipa::path(
    get,
    path = "/api/orders",
    tag = ORDER_TAG,
    responses(
        (status = 200, description = "All orders", body = [AdminOrderResponse]),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
async fn list_orders(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
) -> AppResult<Json<Vec<AdminOrderResponse>>> {
    let orders = state.services.orders.list_orders(&actor).await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// List the caller's orders, newest first.
#[utoipa::path(
    get,
    path = "/api/orders/myorders",
    tag = ORDER_TAG,
    responses(
        (status = 200, description = "The caller's orders", body = [OrderResponse])
    ),
    security(("bearerAuth" = []))
)]
async fn list_my_orders(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
) -> AppResult<Json<Vec<OrderResponse>>> {
    let orders = state.services.orders.list_my_orders(&actor).await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// Get one order with its items. Visible to its owner and to admins.
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    tag = ORDER_TAG,
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "The order", body = OrderDetailsResponse),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "No such order", body = ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
async fn get_order(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> AppResult<Json<OrderDetailsResponse>> {
    let details = state.services.orders.get_order_by_id(&actor, id).await?;
    Ok(Json(details.into()))
}

/// Record the payment of an order. Only its owner may pay.
#[utoipa::path(
    put,
    path = "/api/orders/{id}/pay",
    tag = ORDER_TAG,
    params(("id" = i32, Path, description = "Order id")),
    request_body = PaymentRequest,
    responses(
        (status = 200, description = "Order marked paid", body = OrderResponse),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "No such order", body = ErrorResponse),
        (status = 409, description = "Already paid", body = ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
async fn mark_paid(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    Path(id): Path<i32>,
    ValidatedJson(payload): ValidatedJson<PaymentRequest>,
) -> AppResult<Json<OrderResponse>> {
    let order = state
        .services
        .orders
        .mark_paid(id, &actor, payload.into())
        .await?;
    Ok(Json(order.into()))
}

/// Mark an order delivered. Requires payment unless it is cash on delivery.
#[utoipa::path(
    put,
    path = "/api/orders/{id}/deliver",
    tag = ORDER_TAG,
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order marked delivered", body = OrderResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 404, description = "No such order", body = ErrorResponse),
        (status = 409, description = "Already delivered, or unpaid and not cash on delivery", body = ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
async fn mark_delivered(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> AppResult<Json<OrderResponse>> {
    let order = state.services.orders.mark_delivered(id, &actor).await?;
    Ok(Json(order.into()))
}
