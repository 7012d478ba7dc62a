// src/errors.rs
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::models::throttle::Ledger;

/// Which gate produced a `Locked` rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    /// The shared block of a pending signup (OTP send + OTP verify).
    Signup,
    /// The account-wide login lockout (password, OTP send, OTP verify).
    Account,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("MongoDB error: {0}")]
    MongoDB(#[from] mongodb::error::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("An account with this email already exists. Please login or reset your password")]
    AlreadyRegistered,

    #[error("Invalid or expired signup session")]
    InvalidSession,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is not verified")]
    NotVerified,

    #[error("Please wait {retry_in} seconds before trying again")]
    RateLimited {
        ledger: Ledger,
        retry_in: u64,
        attempts_left: u32,
    },

    #[error("Too many attempts. Try again in {remaining_block_seconds} seconds")]
    Locked {
        scope: LockScope,
        remaining_block_seconds: u64,
    },

    #[error("OTP expired")]
    OtpExpired,

    #[error("{}", .ledger.failure_message())]
    Unauthorized {
        ledger: Ledger,
        attempts_left: u32,
        remaining_block_seconds: Option<u64>,
    },

    #[error("Authentication error")]
    AuthError,

    #[error("Record was modified concurrently")]
    Conflict,

    #[error("Token error: {0}")]
    TokenError(#[from] jsonwebtoken::errors::Error),

    #[error("Password hashing error: {0}")]
    HashingError(#[from] bcrypt::BcryptError),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("External API error: {0}")]
    ExternalApi(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_)
            | AppError::InvalidSession
            | AppError::InvalidCredentials
            | AppError::OtpExpired
            | AppError::Unauthorized { .. } => StatusCode::BAD_REQUEST,
            AppError::AuthError => StatusCode::UNAUTHORIZED,
            AppError::NotVerified => StatusCode::FORBIDDEN,
            AppError::AlreadyRegistered | AppError::Conflict => StatusCode::CONFLICT,
            AppError::RateLimited { .. } | AppError::Locked { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::ExternalApi(_) => StatusCode::BAD_GATEWAY,
            AppError::MongoDB(_)
            | AppError::TokenError(_)
            | AppError::HashingError(_)
            | AppError::ConfigurationError(_)
            | AppError::ServiceError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "Validation failed",
            AppError::AlreadyRegistered => "Already registered",
            AppError::InvalidSession | AppError::InvalidCredentials => "Invalid request",
            AppError::NotVerified => "Not verified",
            AppError::RateLimited { .. } => "Rate limited",
            AppError::Locked { .. } => "Locked",
            AppError::OtpExpired => "Expired",
            AppError::Unauthorized { .. } => "Unauthorized",
            AppError::AuthError => "Authentication failed",
            AppError::Conflict => "Conflict",
            AppError::MongoDB(_) => "Database error",
            AppError::TokenError(_) => "Token error",
            AppError::HashingError(_) => "Hashing error",
            AppError::ConfigurationError(_) => "Configuration error",
            AppError::ServiceError(_) => "Service error",
            AppError::ExternalApi(_) => "External API error",
        }
    }

    /// Message shown to clients. Infrastructure failures never leak details.
    fn public_message(&self) -> String {
        match self.status() {
            StatusCode::INTERNAL_SERVER_ERROR | StatusCode::BAD_GATEWAY => {
                "Something went wrong, please try again".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Structured throttle fields so clients can render countdowns.
    fn details(&self) -> Map<String, Value> {
        let mut extra = Map::new();
        match self {
            AppError::RateLimited {
                ledger,
                retry_in,
                attempts_left,
            } => {
                extra.insert("retryIn".into(), json!(retry_in));
                extra.insert(ledger.attempts_field().into(), json!(attempts_left));
            }
            AppError::Locked {
                scope,
                remaining_block_seconds,
            } => {
                extra.insert(
                    "remainingBlockSeconds".into(),
                    json!(remaining_block_seconds),
                );
                let ledgers: &[Ledger] = match scope {
                    LockScope::Signup => &[Ledger::SignupSend],
                    LockScope::Account => {
                        &[Ledger::Password, Ledger::LoginOtpSend, Ledger::LoginOtpVerify]
                    }
                };
                for ledger in ledgers {
                    extra.insert(ledger.attempts_field().into(), json!(0));
                }
            }
            AppError::Unauthorized {
                ledger,
                attempts_left,
                remaining_block_seconds,
            } => {
                extra.insert(ledger.attempts_field().into(), json!(attempts_left));
                if let Some(seconds) = remaining_block_seconds {
                    extra.insert("remainingBlockSeconds".into(), json!(seconds));
                }
            }
            _ => {}
        }
        extra
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }

        let mut body = Map::new();
        body.insert("success".into(), json!(false));
        body.insert("error".into(), json!(self.label()));
        body.insert("message".into(), json!(self.public_message()));
        body.insert(
            "timestamp".into(),
            json!(chrono::Utc::now().to_rfc3339()),
        );
        body.extend(self.details());

        (status, Json(Value::Object(body))).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalApi(format!("HTTP request failed: {}", err))
    }
}

// Helper conversion functions
impl AppError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::ConfigurationError(msg.into())
    }

    pub fn service(msg: impl Into<String>) -> Self {
        AppError::ServiceError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: AppError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn rate_limited_carries_retry_and_attempts() {
        let (status, body) = body_of(AppError::RateLimited {
            ledger: Ledger::LoginOtpSend,
            retry_in: 42,
            attempts_left: 1,
        })
        .await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["retryIn"], 42);
        assert_eq!(body["otpAttemptsLeft"], 1);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn account_lock_reports_every_login_ledger() {
        let (status, body) = body_of(AppError::Locked {
            scope: LockScope::Account,
            remaining_block_seconds: 300,
        })
        .await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["remainingBlockSeconds"], 300);
        assert_eq!(body["passwordAttemptsLeft"], 0);
        assert_eq!(body["otpAttemptsLeft"], 0);
        assert_eq!(body["otpVerifyAttemptsLeft"], 0);
    }

    #[tokio::test]
    async fn wrong_password_reports_remaining_attempts() {
        let (status, body) = body_of(AppError::Unauthorized {
            ledger: Ledger::Password,
            attempts_left: 0,
            remaining_block_seconds: Some(300),
        })
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Incorrect password");
        assert_eq!(body["passwordAttemptsLeft"], 0);
        assert_eq!(body["remainingBlockSeconds"], 300);
    }

    #[tokio::test]
    async fn infrastructure_errors_are_opaque() {
        let (status, body) = body_of(AppError::service("pool exhausted")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body["message"].as_str().unwrap().contains("pool"));
    }
}
