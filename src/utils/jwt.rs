//! HS256 access tokens shared with the account service.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::Role;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    /// Only the account service accepts these
    Refresh,
}

/// Claims carried by every token.
///
/// The role claim is informational; the middleware takes the effective role
/// from the users table.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User id as a decimal string
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    pub token_type: TokenType,
    /// Unix seconds
    pub iat: i64,
    /// Unix seconds
    pub exp: i64,
}

impl Claims {
    pub fn new(
        user_id: i32,
        email: String,
        role: Role,
        token_type: TokenType,
        expiration_hours: i64,
    ) -> Self {
        let now = jiff::Timestamp::now().as_second();
        Self {
            sub: user_id.to_string(),
            email,
            role,
            token_type,
            iat: now,
            exp: now + expiration_hours * 3600,
        }
    }

    /// Parses the subject as a user id.
    pub fn user_id(&self) -> AppResult<i32> {
        self.sub.parse().map_err(|_| AppError::Unauthorized {
            message: "Invalid token subject".to_string(),
        })
    }
}

/// Signs an HS256 token for a user.
///
/// Tokens are normally issued by the account service; this exists for tooling
/// and tests that need a token the middleware accepts.
pub fn generate_token(
    user_id: i32,
    email: String,
    role: Role,
    token_type: TokenType,
    secret: &str,
    expiration_hours: i64,
) -> AppResult<String> {
    let claims = Claims::new(user_id, email, role, token_type, expiration_hours);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&Header::new(Algorithm::HS256), &claims, &key).map_err(|e| AppError::Internal {
        source: anyhow::Error::new(e).context("failed to sign access token"),
    })
}

pub fn generate_access_token(
    user_id: i32,
    email: String,
    role: Role,
    secret: &str,
    expiration_hours: i64,
) -> AppResult<String> {
    generate_token(user_id, email, role, TokenType::Access, secret, expiration_hours)
}

/// Verifies signature and expiry, then checks the token is of `expected` type.
pub fn validate_token(token: &str, secret: &str, expected: TokenType) -> AppResult<Claims> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let claims = decode::<Claims>(token, &key, &Validation::new(Algorithm::HS256))
        .map(|data| data.claims)
        .map_err(|e| rejected(e.kind()))?;

    if claims.token_type != expected {
        return Err(AppError::Unauthorized {
            message: format!(
                "Invalid token type: expected {expected:?}, got {:?}",
                claims.token_type
            ),
        });
    }
    Ok(claims)
}

pub fn validate_access_token(token: &str, secret: &str) -> AppResult<Claims> {
    validate_token(token, secret, TokenType::Access)
}

fn rejected(kind: &ErrorKind) -> AppError {
    let message = match kind {
        ErrorKind::ExpiredSignature => "Token has expired",
        ErrorKind::InvalidSignature => "Invalid token signature",
        ErrorKind::InvalidAlgorithm => "Unsupported token algorithm",
        _ => "Invalid token",
    };
    AppError::Unauthorized {
        message: message.to_string(),
    }
}
