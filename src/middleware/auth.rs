use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::errors::{AppError, Result};
use crate::state::AppState;

/// Requires a valid `Authorization: Bearer <session token>` and puts its
/// claims into the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let token = headers
        .get("authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or(AppError::AuthError)?;

    let claims = state.tokens.decode(token)?;
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}
