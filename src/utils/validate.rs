use crate::error::{AppError, AppResult};
use axum::Json;
use axum::extract::{FromRequest, Request, rejection::JsonRejection};
use serde::de::DeserializeOwned;
use validator::Validate;

/// JSON body extractor that runs `validator` rules before the handler sees
/// the value. Malformed JSON becomes `BadRequest`, rule failures become
/// `ValidationErrors`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> AppResult<Self> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, header};
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    #[serde(rename_all = "camelCase")]
    struct TestPayment {
        #[validate(length(min = 1, max = 128, message = "Payment id is required"))]
        payment_id: String,
        #[validate(email(message = "Invalid email format"))]
        payer_email: String,
    }

    fn json_request(body: &str) -> Request {
        Request::builder()
            .method(Method::PUT)
            .uri("/test")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_body() {
        let request = json_request(r#"{"paymentId":"PAY-1","payerEmail":"a@example.com"}"#);

        let ValidatedJson(payment) = ValidatedJson::<TestPayment>::from_request(request, &())
            .await
            .unwrap();

        assert_eq!(payment.payment_id, "PAY-1");
        assert_eq!(payment.payer_email, "a@example.com");
    }

    #[tokio::test]
    async fn test_rule_failures_are_reported_per_field() {
        let request = json_request(r#"{"paymentId":"","payerEmail":"nope"}"#);

        let error = ValidatedJson::<TestPayment>::from_request(request, &())
            .await
            .unwrap_err();

        match error {
            AppError::ValidationErrors { errors } => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0].field, "payer_email");
                assert_eq!(errors[1].field, "payment_id");
                assert_eq!(errors[1].message, "Payment id is required");
            }
            other => panic!("Expected ValidationErrors, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let request = json_request(r#"{"paymentId": "#);

        let error = ValidatedJson::<TestPayment>::from_request(request, &())
            .await
            .unwrap_err();

        assert!(matches!(error, AppError::BadRequest { .. }));
    }
}
