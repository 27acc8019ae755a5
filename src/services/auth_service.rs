//! Resolves bearer tokens to the user a request acts for.

use crate::error::{AppError, AppResult};
use crate::models::Role;
use crate::repositories::UserRepository;
use crate::utils::jwt;

/// The authenticated caller, as the workflows see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i32,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

#[derive(Clone)]
pub struct AuthService {
    users: UserRepository,
    secret: String,
}

impl AuthService {
    pub fn new(users: UserRepository, secret: impl Into<String>) -> Self {
        Self {
            users,
            secret: secret.into(),
        }
    }

    /// Validates an access token and loads the active user it names.
    ///
    /// The role is taken from the users table, not from the token, so a
    /// demoted or deactivated account loses access on its next request.
    pub async fn authenticate(&self, token: &str) -> AppResult<AuthUser> {
        let claims = jwt::validate_access_token(token, &self.secret)?;
        let user_id = claims.user_id()?;

        let principal = self
            .users
            .find_active(user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized {
                message: "User not found or inactive".to_string(),
            })?;

        Ok(AuthUser {
            user_id: principal.id,
            role: principal.role,
        })
    }
}
