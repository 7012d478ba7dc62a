use axum::{extract::State, response::Json, Extension};

use crate::dtos::auth_dtos::{AuthResponse, LoginPasswordRequest, SignupOtpResponse, SignupRequest};
use crate::errors::{AppError, Result};
use crate::handlers::AppJson;
use crate::models::user::{Claims, UserResponse};
use crate::state::AppState;

pub async fn signup(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SignupRequest>,
) -> Result<Json<SignupOtpResponse>> {
    let response = state
        .signup
        .request_signup(payload, state.clock.now())
        .await?;
    Ok(Json(response))
}

pub async fn login_with_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginPasswordRequest>,
) -> Result<Json<AuthResponse>> {
    let response = state
        .login
        .login_with_password(payload, state.clock.now())
        .await?;
    Ok(Json(response))
}

/// Profile of the session holder.
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserResponse>> {
    let user = state
        .store
        .find_user(&claims.email)
        .await?
        .filter(|user| user.user_id == claims.sub)
        .ok_or(AppError::AuthError)?;

    Ok(Json(user.to_response()))
}
