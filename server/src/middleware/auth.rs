use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use crate::routes::AppState;
use crate::utils::{AppError, AppResult};

/// Caller resolved from a bearer token by user-service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
}

fn bearer_token(request: &Request) -> Option<&str> {
    let value = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let token = bearer_token(&request)
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))?
        .to_string();

    let validation = state.collaborators.validate_token(&token).await?;
    debug!(user_id = validation.user_id, "Caller authenticated");

    request.extensions_mut().insert(AuthUser {
        user_id: validation.user_id,
        email: validation.email,
    });
    Ok(next.run(request).await)
}
