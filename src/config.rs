// config.rs
use chrono::Duration;
use std::env;
use std::str::FromStr;

use crate::errors::{AppError, Result};
use crate::services::attempt_ledger::ThrottlePolicy;

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub session_ttl: Duration,
    pub database_url: Option<String>,
    pub database_name: String,
    pub host: String,
    pub port: u16,
    pub bcrypt_cost: u32,
    pub email: Option<EmailConfig>,
    pub policy: AuthPolicy,
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parsed<T: FromStr>(key: &str, default: T) -> Result<T> {
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::configuration(format!("{} must be a number", key))),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = optional("JWT_SECRET")
            .ok_or_else(|| AppError::configuration("JWT_SECRET must be set"))?;

        let email = match (
            optional("EMAIL_API_URL"),
            optional("EMAIL_API_KEY"),
            optional("EMAIL_FROM"),
        ) {
            (Some(api_url), Some(api_key), Some(from)) => Some(EmailConfig {
                api_url,
                api_key,
                from,
            }),
            (None, None, None) => None,
            _ => {
                return Err(AppError::configuration(
                    "EMAIL_API_URL, EMAIL_API_KEY and EMAIL_FROM must be set together",
                ))
            }
        };

        Ok(AppConfig {
            jwt_secret,
            session_ttl: Duration::hours(parsed("SESSION_TTL_HOURS", 24)?),
            database_url: optional("DATABASE_URL"),
            database_name: optional("DATABASE_NAME").unwrap_or_else(|| "staffing".to_string()),
            host: optional("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed("PORT", 8080)?,
            bcrypt_cost: parsed("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
            email,
            policy: AuthPolicy::from_env()?,
        })
    }
}

/// Throttle constants for both flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthPolicy {
    pub otp_validity: Duration,
    pub signup_send: ThrottlePolicy,
    pub signup_verify: ThrottlePolicy,
    pub password: ThrottlePolicy,
    pub login_send: ThrottlePolicy,
    pub login_verify: ThrottlePolicy,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self::with_timings(Duration::seconds(60), Duration::seconds(60), Duration::minutes(5))
    }
}

impl AuthPolicy {
    pub fn with_timings(otp_validity: Duration, cooldown: Duration, block: Duration) -> Self {
        AuthPolicy {
            otp_validity,
            signup_send: ThrottlePolicy::requests(3, cooldown, block),
            signup_verify: ThrottlePolicy::failures(3, block),
            password: ThrottlePolicy::failures(5, block),
            login_send: ThrottlePolicy::requests(3, cooldown, block),
            login_verify: ThrottlePolicy::failures(3, block),
        }
    }

    pub fn from_env() -> Result<Self> {
        let otp_ttl = parsed("AUTH_OTP_TTL_SECS", 60i64)?;
        let cooldown = parsed("AUTH_RESEND_COOLDOWN_SECS", 60i64)?;
        let block = parsed("AUTH_BLOCK_SECS", 300i64)?;

        if otp_ttl <= 0 || cooldown < 0 || block <= 0 {
            return Err(AppError::configuration(
                "OTP validity and block duration must be positive",
            ));
        }

        Ok(Self::with_timings(
            Duration::seconds(otp_ttl),
            Duration::seconds(cooldown),
            Duration::seconds(block),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::attempt_ledger::Escalation;

    #[test]
    fn default_policy_matches_platform_constants() {
        let policy = AuthPolicy::default();
        assert_eq!(policy.otp_validity, Duration::seconds(60));
        assert_eq!(policy.signup_send.limit, 3);
        assert_eq!(policy.signup_send.cooldown, Duration::seconds(60));
        assert_eq!(policy.signup_send.escalation, Escalation::OnExcess);
        assert_eq!(policy.signup_verify.limit, 3);
        assert_eq!(policy.password.limit, 5);
        assert_eq!(policy.password.escalation, Escalation::OnExhaustion);
        assert_eq!(policy.login_verify.block, Duration::minutes(5));
        assert_eq!(policy.login_send.cooldown, Duration::seconds(60));
    }

    #[test]
    fn verify_budgets_have_no_cooldown() {
        let policy = AuthPolicy::default();
        assert_eq!(policy.signup_verify.cooldown, Duration::zero());
        assert_eq!(policy.password.cooldown, Duration::zero());
        assert_eq!(policy.login_verify.cooldown, Duration::zero());
    }
}
