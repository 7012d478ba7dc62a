use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::handlers::{auth, auth_otp};
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let session = Router::new()
        .route("/me", get(auth::me))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        // Signup
        .route("/signup", post(auth::signup))
        .route("/resend-signup-otp", post(auth_otp::resend_signup_otp))
        .route("/verify-otp", post(auth_otp::verify_signup_otp))
        // Login
        .route("/login-password", post(auth::login_with_password))
        .route("/request-login-otp", post(auth_otp::request_login_otp))
        .route("/resend-login-otp", post(auth_otp::resend_login_otp))
        .route("/login-verify", post(auth_otp::verify_login_otp))
        .merge(session)
}
