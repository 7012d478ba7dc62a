//! Login: password and OTP paths into one account lockout.

use bcrypt::{hash, verify};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::dtos::auth_dtos::{
    normalize_email, AuthResponse, LoginOtpRequest, LoginOtpResponse, LoginPasswordRequest,
    VerifyLoginOtpRequest,
};
use crate::errors::{AppError, LockScope, Result};
use crate::models::throttle::{Ledger, LoginAction};
use crate::models::user::User;
use crate::services::attempt_ledger::{seconds_until, Recorded, ThrottlePolicy};
use crate::services::email_service::{dispatch, OtpPurpose, OutgoingEmail};
use crate::services::otp_service::{OtpCheck, OtpService};
use crate::services::AuthContext;

#[derive(Clone)]
pub struct LoginFlow {
    ctx: AuthContext,
    otp: OtpService,
    /// Hash of a random secret, checked when the email is unknown.
    dummy_hash: String,
}

impl LoginFlow {
    pub fn new(ctx: AuthContext) -> Self {
        let otp = OtpService::new(ctx.policy.otp_validity);
        let dummy_hash = hash(Uuid::new_v4().to_string(), ctx.bcrypt_cost).unwrap_or_else(|e| {
            tracing::warn!("Failed to prepare dummy password hash: {}", e);
            String::new()
        });
        Self {
            ctx,
            otp,
            dummy_hash,
        }
    }

    pub async fn login_with_password(
        &self,
        mut input: LoginPasswordRequest,
        now: DateTime<Utc>,
    ) -> Result<AuthResponse> {
        input.email = normalize_email(&input.email);
        input.validate()?;

        let _guard = self.ctx.locks.lock(&input.email).await;
        let mut user = match self.load(&input.email, now).await {
            Err(AppError::InvalidCredentials) => {
                // Same bcrypt work as for a real account.
                let _ = verify(&input.password, &self.dummy_hash);
                return Err(AppError::InvalidCredentials);
            }
            loaded => loaded?,
        };
        self.ensure_unlocked(&user, LoginAction::Password, &self.ctx.policy.password, now)?;

        if !user.verified {
            return Err(AppError::NotVerified);
        }

        if !verify(&input.password, &user.password_hash)? {
            user.last_failed_login_at = Some(now);
            let err = self
                .record_failure(&mut user, LoginAction::Password, &self.ctx.policy.password, now)
                .await?;
            tracing::info!(email = %user.email, "password login failed");
            return Err(err);
        }

        self.complete(user, now, "Login successful").await
    }

    pub async fn request_login_otp(
        &self,
        mut input: LoginOtpRequest,
        now: DateTime<Utc>,
    ) -> Result<LoginOtpResponse> {
        input.email = normalize_email(&input.email);
        input.validate()?;

        let _guard = self.ctx.locks.lock(&input.email).await;
        let mut user = self.load(&input.email, now).await?;

        let policy = self.ctx.policy.login_send;
        let eval = user.lockout.evaluate(LoginAction::OtpSend, &policy, now);
        if eval.is_blocked() {
            return Err(AppError::Locked {
                scope: LockScope::Account,
                remaining_block_seconds: eval.block_remaining_seconds,
            });
        }
        if eval.is_cooling_down() {
            return Err(AppError::RateLimited {
                ledger: Ledger::LoginOtpSend,
                retry_in: eval.retry_in_seconds,
                attempts_left: eval.attempts_left,
            });
        }

        if !user.verified {
            return Err(AppError::NotVerified);
        }

        if let Recorded::Tripped {
            block_remaining_seconds,
        } = user.lockout.record_attempt(LoginAction::OtpSend, &policy, now)
        {
            user.updated_at = now;
            self.ctx.store.save_user(&mut user).await?;
            tracing::warn!(email = %user.email, "login OTP sends blocked, account locked");
            return Err(AppError::Locked {
                scope: LockScope::Account,
                remaining_block_seconds: block_remaining_seconds,
            });
        }

        let challenge = self.otp.issue(now);
        let expires_at = challenge.expires_at;
        dispatch(
            self.ctx.mailer.clone(),
            OutgoingEmail::otp(
                &user.email,
                &challenge.code,
                OtpPurpose::Login,
                self.otp.validity().num_seconds(),
            ),
        );

        user.otp = Some(challenge);
        user.lockout.reset(LoginAction::OtpVerify);
        user.last_otp_sent = Some(now);
        user.updated_at = now;
        self.ctx.store.save_user(&mut user).await?;

        let after = user.lockout.evaluate(LoginAction::OtpSend, &policy, now);
        Ok(LoginOtpResponse {
            success: true,
            message: "OTP sent to your email".to_string(),
            otp_expires_in: seconds_until(expires_at, now),
            retry_in: after.retry_in_seconds,
            otp_attempts_left: after.attempts_left,
        })
    }

    /// Same contract as `request_login_otp`.
    pub async fn resend_login_otp(
        &self,
        input: LoginOtpRequest,
        now: DateTime<Utc>,
    ) -> Result<LoginOtpResponse> {
        self.request_login_otp(input, now).await
    }

    pub async fn verify_login_otp(
        &self,
        mut input: VerifyLoginOtpRequest,
        now: DateTime<Utc>,
    ) -> Result<AuthResponse> {
        input.email = normalize_email(&input.email);
        input.validate()?;

        let _guard = self.ctx.locks.lock(&input.email).await;
        let mut user = self.load(&input.email, now).await?;
        let policy = self.ctx.policy.login_verify;
        self.ensure_unlocked(&user, LoginAction::OtpVerify, &policy, now)?;

        if !user.verified {
            return Err(AppError::NotVerified);
        }

        match OtpService::check(&input.otp, user.otp.as_ref(), now) {
            OtpCheck::Expired => {
                user.otp = None;
                user.updated_at = now;
                self.ctx.store.save_user(&mut user).await?;
                Err(AppError::OtpExpired)
            }
            OtpCheck::Mismatch => Err(self
                .record_failure(&mut user, LoginAction::OtpVerify, &policy, now)
                .await?),
            OtpCheck::Valid => self.complete(user, now, "OTP verified").await,
        }
    }

    /// Unknown emails get the same answer as a wrong password.
    async fn load(&self, email: &str, now: DateTime<Utc>) -> Result<User> {
        let mut user = self
            .ctx
            .store
            .find_user(email)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if user.lockout.refresh(now) {
            tracing::info!(email = %user.email, "account lockout expired, login ledgers reset");
        }
        Ok(user)
    }

    fn ensure_unlocked(
        &self,
        user: &User,
        action: LoginAction,
        policy: &ThrottlePolicy,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let eval = user.lockout.evaluate(action, policy, now);
        if eval.is_blocked() {
            return Err(AppError::Locked {
                scope: LockScope::Account,
                remaining_block_seconds: eval.block_remaining_seconds,
            });
        }
        Ok(())
    }

    /// Counts a failed check, persists it, and returns the error to report.
    async fn record_failure(
        &self,
        user: &mut User,
        action: LoginAction,
        policy: &ThrottlePolicy,
        now: DateTime<Utc>,
    ) -> Result<AppError> {
        let recorded = user.lockout.record_attempt(action, policy, now);
        user.updated_at = now;
        self.ctx.store.save_user(user).await?;

        let ledger = Ledger::from(action);
        Ok(match recorded {
            Recorded::Tripped {
                block_remaining_seconds,
            } => {
                tracing::warn!(email = %user.email, ledger = ledger.name(), "account locked");
                AppError::Unauthorized {
                    ledger,
                    attempts_left: 0,
                    remaining_block_seconds: Some(block_remaining_seconds),
                }
            }
            Recorded::Counted { attempts_left } => AppError::Unauthorized {
                ledger,
                attempts_left,
                remaining_block_seconds: None,
            },
        })
    }

    /// Any successful authentication clears the whole lockout.
    async fn complete(
        &self,
        mut user: User,
        now: DateTime<Utc>,
        message: &str,
    ) -> Result<AuthResponse> {
        user.lockout.record_success();
        user.otp = None;
        user.last_failed_login_at = None;
        user.updated_at = now;
        self.ctx.store.save_user(&mut user).await?;

        tracing::info!(email = %user.email, user_id = %user.user_id, "login succeeded");

        Ok(AuthResponse {
            success: true,
            message: message.to_string(),
            session_token: self.ctx.tokens.issue(&user, now)?,
            user: user.to_response(),
        })
    }
}
