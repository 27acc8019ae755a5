//! Router assembly.

use std::time::Duration;

use axum::{Router, http::StatusCode, middleware};
use tower_http::timeout::TimeoutLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::doc::ApiDoc;
use crate::api::handlers;
use crate::api::middleware::{
    auth_middleware, global_error_handler, logging_middleware, request_id_middleware,
};
use crate::state::AppState;

pub const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

/// Builds the application router.
///
/// # Middleware order (outermost first)
/// 1. request id
/// 2. request span and logging
/// 3. JSON rewriting of bare error responses
/// 4. request timeout
/// 5. bearer authentication, on the order routes only
pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    let (router, openapi) = api_router(state.clone()).split_for_parts();

    router
        .merge(SwaggerUi::new("/swagger-ui").url(OPENAPI_JSON_PATH, openapi))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(middleware::from_fn(global_error_handler))
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

fn api_router(state: AppState) -> OpenApiRouter<AppState> {
    let orders = handlers::orders::order_routes()
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(orders)
        .merge(handlers::health::health_routes())
}
