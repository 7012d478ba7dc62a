use axum::{extract::State, response::Json};

use crate::dtos::auth_dtos::{
    AuthResponse, LoginOtpRequest, LoginOtpResponse, ResendSignupOtpRequest, SignupOtpResponse,
    VerifyLoginOtpRequest, VerifySignupOtpRequest,
};
use crate::errors::Result;
use crate::handlers::AppJson;
use crate::state::AppState;

pub async fn resend_signup_otp(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ResendSignupOtpRequest>,
) -> Result<Json<SignupOtpResponse>> {
    Ok(Json(
        state
            .signup
            .resend_signup_otp(payload, state.clock.now())
            .await?,
    ))
}

pub async fn verify_signup_otp(
    State(state): State<AppState>,
    AppJson(payload): AppJson<VerifySignupOtpRequest>,
) -> Result<Json<AuthResponse>> {
    Ok(Json(
        state
            .signup
            .verify_signup_otp(payload, state.clock.now())
            .await?,
    ))
}

pub async fn request_login_otp(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginOtpRequest>,
) -> Result<Json<LoginOtpResponse>> {
    Ok(Json(
        state
            .login
            .request_login_otp(payload, state.clock.now())
            .await?,
    ))
}

pub async fn resend_login_otp(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginOtpRequest>,
) -> Result<Json<LoginOtpResponse>> {
    Ok(Json(
        state
            .login
            .resend_login_otp(payload, state.clock.now())
            .await?,
    ))
}

pub async fn verify_login_otp(
    State(state): State<AppState>,
    AppJson(payload): AppJson<VerifyLoginOtpRequest>,
) -> Result<Json<AuthResponse>> {
    Ok(Json(
        state
            .login
            .verify_login_otp(payload, state.clock.now())
            .await?,
    ))
}
