use crate::error::DatabaseErrorConverter;
use thiserror::Error;

/// Application-wide error type that represents all possible errors in the system.
///
/// Every variant maps to a stable [`ErrorClass`]; the HTTP status is chosen
/// from that class at the response boundary only.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found error with entity, field, and value information
    #[error("Resource not found: {entity} with {field}={value}")]
    NotFound {
        entity: String,
        field: String,
        value: String,
    },

    /// Duplicate entry error for unique constraint violations
    #[error("Duplicate entry: {entity}.{field} = '{value}' already exists")]
    Duplicate {
        entity: String,
        field: String,
        value: String,
    },

    /// Validation error with field-specific details
    #[error("Validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Several field validation failures reported together
    #[error("Validation failed for {} field(s)", errors.len())]
    ValidationErrors { errors: Vec<ValidationFieldError> },

    /// Bad request error with descriptive message
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// Unauthorized access error with authentication message
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Forbidden access error with authorization message
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// A state-machine precondition did not hold for the requested change
    #[error("Invalid transition for order {order_id}: {reason}")]
    InvalidTransition { order_id: i32, reason: String },

    /// Database operation error with operation context
    #[error("Database operation failed: {operation}")]
    Database {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    /// The unit of work failed and rolling it back failed as well
    #[error("Transaction rollback failed after: {cause}")]
    RollbackFailed {
        cause: Box<AppError>,
        #[source]
        rollback: Box<AppError>,
    },

    /// The order was committed but reading it back failed
    #[error("Order {order_number} (id {order_id}) was created but could not be read back")]
    PartialSuccess {
        order_id: i32,
        order_number: String,
        #[source]
        source: Box<AppError>,
    },

    /// No pooled connection became available within the acquisition timeout
    #[error("Timed out after {waited_ms}ms waiting for a database connection")]
    AcquireTimeout { waited_ms: u64 },

    /// Configuration error with key information
    #[error("Configuration error: {key}")]
    Configuration {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Connection pool error
    #[error("Connection pool error")]
    ConnectionPool {
        #[source]
        source: anyhow::Error,
    },

    /// Internal error for unexpected failures
    #[error("Internal error")]
    Internal {
        #[source]
        source: anyhow::Error,
    },
}

/// A single failed field from request validation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ValidationFieldError {
    pub field: String,
    pub message: String,
}

/// Transport-independent status class carried by every [`AppError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    BadRequest,
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    Unavailable,
    Internal,
}

impl AppError {
    /// Returns the status class the boundary layer uses to pick a response code.
    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::Validation { .. }
            | AppError::ValidationErrors { .. }
            | AppError::BadRequest { .. } => ErrorClass::BadRequest,
            AppError::Unauthorized { .. } => ErrorClass::Unauthenticated,
            AppError::Forbidden { .. } => ErrorClass::Forbidden,
            AppError::NotFound { .. } => ErrorClass::NotFound,
            AppError::Duplicate { .. } | AppError::InvalidTransition { .. } => ErrorClass::Conflict,
            AppError::AcquireTimeout { .. } | AppError::ConnectionPool { .. } => {
                ErrorClass::Unavailable
            }
            AppError::Database { .. }
            | AppError::RollbackFailed { .. }
            | AppError::PartialSuccess { .. }
            | AppError::Configuration { .. }
            | AppError::Internal { .. } => ErrorClass::Internal,
        }
    }

    /// Whether a caller may retry the same request after backing off.
    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Unavailable)
    }

    pub(crate) fn not_found(entity: &str, field: &str, value: impl ToString) -> Self {
        AppError::NotFound {
            entity: entity.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub(crate) fn validation(field: &str, reason: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_transition(order_id: i32, reason: impl Into<String>) -> Self {
        AppError::InvalidTransition {
            order_id,
            reason: reason.into(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal { source: error }
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(error: diesel::result::Error) -> Self {
        DatabaseErrorConverter::convert_diesel_error(error, "database operation")
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<ValidationFieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |err| ValidationFieldError {
                    field: field.to_string(),
                    message: err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value ({})", err.code)),
                })
            })
            .collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        AppError::ValidationErrors { errors: fields }
    }
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        AppError::BadRequest {
            message: rejection.body_text(),
        }
    }
}

impl From<crate::config::error::ConfigError> for AppError {
    fn from(error: crate::config::error::ConfigError) -> Self {
        let key = match &error {
            crate::config::error::ConfigError::ValidationError { field, .. } => field.clone(),
            _ => "configuration".to_string(),
        };
        AppError::Configuration {
            key,
            source: anyhow::Error::new(error),
        }
    }
}

/// Type alias for Result with AppError to simplify function signatures
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(
            AppError::validation("orderItems", "empty").class(),
            ErrorClass::BadRequest
        );
        assert_eq!(
            AppError::not_found("order", "id", 3).class(),
            ErrorClass::NotFound
        );
        assert_eq!(
            AppError::invalid_transition(3, "already paid").class(),
            ErrorClass::Conflict
        );
        assert_eq!(
            AppError::AcquireTimeout { waited_ms: 10 }.class(),
            ErrorClass::Unavailable
        );
        assert_eq!(
            AppError::Forbidden {
                message: "nope".to_string()
            }
            .class(),
            ErrorClass::Forbidden
        );
    }

    #[test]
    fn test_partial_success_is_not_a_creation_failure() {
        let error = AppError::PartialSuccess {
            order_id: 9,
            order_number: "ORD-260101-000000-1234".to_string(),
            source: Box::new(AppError::Internal {
                source: anyhow::anyhow!("read failed"),
            }),
        };
        assert_eq!(error.class(), ErrorClass::Internal);
        assert!(error.to_string().contains("was created"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_rollback_failure_keeps_both_causes() {
        let error = AppError::RollbackFailed {
            cause: Box::new(AppError::validation("product_id", "unknown product")),
            rollback: Box::new(AppError::Internal {
                source: anyhow::anyhow!("connection reset"),
            }),
        };
        assert!(error.to_string().contains("product_id"));
        let source = std::error::Error::source(&error).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Internal error"));
    }

    #[test]
    fn test_pool_pressure_is_retryable() {
        assert!(AppError::AcquireTimeout { waited_ms: 5 }.is_retryable());
        assert!(!AppError::not_found("order", "id", 1).is_retryable());
    }
}
