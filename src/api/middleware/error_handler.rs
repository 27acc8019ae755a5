//! Converts [`AppError`] into HTTP responses.
//!
//! The status code comes from the error's [`ErrorClass`]; the body is an
//! [`ErrorResponse`]. Internal details (driver messages, sources) are logged
//! and never sent to the client.

use axum::{
    Json,
    extract::Request,
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::api::dto::ErrorResponse;
use crate::error::{AppError, ErrorClass};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_code(self.class());

        if status.is_server_error() {
            tracing::error!(error = %self, source = ?std::error::Error::source(&self), "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        (status, Json(error_body(&self))).into_response()
    }
}

pub fn status_code(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::BadRequest => StatusCode::BAD_REQUEST,
        ErrorClass::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorClass::Forbidden => StatusCode::FORBIDDEN,
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        ErrorClass::Conflict => StatusCode::CONFLICT,
        ErrorClass::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_code(error: &AppError) -> &'static str {
    match error {
        AppError::NotFound { .. } => "NOT_FOUND",
        AppError::Duplicate { .. } => "DUPLICATE_ENTRY",
        AppError::Validation { .. } | AppError::ValidationErrors { .. } => "VALIDATION_ERROR",
        AppError::BadRequest { .. } => "BAD_REQUEST",
        AppError::Unauthorized { .. } => "UNAUTHORIZED",
        AppError::Forbidden { .. } => "FORBIDDEN",
        AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
        AppError::Database { .. } => "DATABASE_ERROR",
        AppError::RollbackFailed { .. } => "DATABASE_ERROR",
        AppError::PartialSuccess { .. } => "ORDER_CREATED_READ_FAILED",
        AppError::AcquireTimeout { .. } => "POOL_EXHAUSTED",
        AppError::ConnectionPool { .. } => "SERVICE_UNAVAILABLE",
        AppError::Configuration { .. } => "CONFIGURATION_ERROR",
        AppError::Internal { .. } => "INTERNAL_ERROR",
    }
}

fn error_body(error: &AppError) -> ErrorResponse {
    let code = error_code(error);
    match error {
        AppError::NotFound {
            entity,
            field,
            value,
        } => ErrorResponse::new(code, format!("{entity} not found"))
            .with_details(json!({ "entity": entity, "field": field, "value": value })),
        AppError::Duplicate {
            entity,
            field,
            value,
        } => ErrorResponse::new(code, format!("{entity} with this {field} already exists"))
            .with_details(json!({ "entity": entity, "field": field, "value": value })),
        AppError::Validation { field, reason } => ErrorResponse::new(code, reason.clone())
            .with_details(json!({ "errors": [{ "field": field, "message": reason }] })),
        AppError::ValidationErrors { errors } => {
            ErrorResponse::new(code, "Request validation failed")
                .with_details(json!({ "errors": errors }))
        }
        AppError::BadRequest { message }
        | AppError::Unauthorized { message }
        | AppError::Forbidden { message } => ErrorResponse::new(code, message.clone()),
        AppError::InvalidTransition { order_id, reason } => {
            ErrorResponse::new(code, reason.clone()).with_details(json!({ "order_id": order_id }))
        }
        AppError::PartialSuccess {
            order_id,
            order_number,
            ..
        } => ErrorResponse::new(
            code,
            "The order was created but could not be read back",
        )
        .with_details(json!({ "order_id": order_id, "order_number": order_number })),
        AppError::AcquireTimeout { waited_ms } => {
            ErrorResponse::new(code, "No database connection became available in time")
                .with_details(json!({ "waited_ms": waited_ms, "retryable": true }))
        }
        AppError::ConnectionPool { .. } => {
            ErrorResponse::new(code, "Database connection unavailable")
                .with_details(json!({ "retryable": true }))
        }
        AppError::Database { operation, .. } => {
            ErrorResponse::new(code, format!("Database operation failed: {operation}"))
        }
        AppError::RollbackFailed { .. } => {
            ErrorResponse::new(code, "Database operation failed and could not be rolled back")
        }
        AppError::Configuration { .. } | AppError::Internal { .. } => {
            ErrorResponse::new(code, "An internal error occurred")
        }
    }
}

/// Rewrites error responses produced outside the handlers (unknown routes,
/// method mismatches, request timeouts) into the [`ErrorResponse`] format.
pub async fn global_error_handler(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let status = response.status();

    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));
    if is_json {
        return response;
    }

    let (code, message) = match status {
        StatusCode::NOT_FOUND => ("NOT_FOUND", "The requested resource was not found"),
        StatusCode::METHOD_NOT_ALLOWED => {
            ("METHOD_NOT_ALLOWED", "HTTP method not allowed for this endpoint")
        }
        StatusCode::UNSUPPORTED_MEDIA_TYPE => ("UNSUPPORTED_MEDIA_TYPE", "Unsupported media type"),
        StatusCode::REQUEST_TIMEOUT => ("REQUEST_TIMEOUT", "Request timed out"),
        StatusCode::PAYLOAD_TOO_LARGE => ("PAYLOAD_TOO_LARGE", "Request payload too large"),
        s if s.is_server_error() => ("INTERNAL_ERROR", "An internal error occurred"),
        _ => ("BAD_REQUEST", "Bad request"),
    };

    (status, Json(ErrorResponse::new(code, message))).into_response()
}
