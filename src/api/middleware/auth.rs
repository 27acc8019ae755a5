//! Bearer token authentication for the order routes.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Resolves the caller to an active user and stores the resulting
/// [`AuthUser`](crate::services::AuthUser) in the request extensions. The
/// user id is also recorded on the request span.
///
/// Mounted with `route_layer`, so unknown paths still answer 404 rather
/// than 401.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())?;
    let actor = state.services.auth.authenticate(token).await?;

    tracing::Span::current().record("user_id", actor.user_id);
    request.extensions_mut().insert(actor);

    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> AppResult<&str> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| unauthorized("Missing authorization header"))?
        .to_str()
        .map_err(|_| unauthorized("Authorization header is not valid text"))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(unauthorized(
            "Invalid authorization header format. Expected: Bearer <token>",
        )),
    }
}

fn unauthorized(message: &str) -> AppError {
    AppError::Unauthorized {
        message: message.to_string(),
    }
}
