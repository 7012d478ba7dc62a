//! Signup: pending registration, OTP resend, and promotion to a user.

use bcrypt::hash;
use chrono::{DateTime, Utc};
use subtle::ConstantTimeEq;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::auth_dtos::{
    normalize_email, AuthResponse, ResendSignupOtpRequest, SignupOtpResponse, SignupRequest,
    VerifySignupOtpRequest,
};
use crate::errors::{AppError, LockScope, Result};
use crate::models::pending_signup::PendingSignup;
use crate::models::throttle::{AccountLockout, Ledger, SignupAction};
use crate::models::user::User;
use crate::services::attempt_ledger::{seconds_until, Recorded};
use crate::services::email_service::{dispatch, OtpPurpose, OutgoingEmail};
use crate::services::otp_service::{OtpCheck, OtpService};
use crate::services::AuthContext;

#[derive(Clone)]
pub struct SignupFlow {
    ctx: AuthContext,
    otp: OtpService,
}

fn token_matches(stored: &str, submitted: &str) -> bool {
    stored.as_bytes().ct_eq(submitted.as_bytes()).into()
}

impl SignupFlow {
    pub fn new(ctx: AuthContext) -> Self {
        let otp = OtpService::new(ctx.policy.otp_validity);
        Self { ctx, otp }
    }

    pub async fn request_signup(
        &self,
        mut input: SignupRequest,
        now: DateTime<Utc>,
    ) -> Result<SignupOtpResponse> {
        input.email = normalize_email(&input.email);
        input.validate()?;

        let _guard = self.ctx.locks.lock(&input.email).await;

        if self.ctx.store.find_user(&input.email).await?.is_some() {
            tracing::info!(email = %input.email, "signup rejected, account already exists");
            return Err(AppError::AlreadyRegistered);
        }

        match self.ctx.store.find_pending(&input.email).await? {
            None => self.start(input, now).await,
            Some(pending) => self.send_again(pending, Some(input), now).await,
        }
    }

    pub async fn resend_signup_otp(
        &self,
        mut input: ResendSignupOtpRequest,
        now: DateTime<Utc>,
    ) -> Result<SignupOtpResponse> {
        input.email = normalize_email(&input.email);
        input.validate()?;

        let _guard = self.ctx.locks.lock(&input.email).await;

        let pending = match self.ctx.store.find_pending(&input.email).await? {
            Some(pending) if token_matches(&pending.temp_token, &input.temp_token) => pending,
            _ => return Err(AppError::InvalidSession),
        };

        self.send_again(pending, None, now).await
    }

    pub async fn verify_signup_otp(
        &self,
        mut input: VerifySignupOtpRequest,
        now: DateTime<Utc>,
    ) -> Result<AuthResponse> {
        input.email = normalize_email(&input.email);
        input.validate()?;

        let _guard = self.ctx.locks.lock(&input.email).await;

        let mut pending = self
            .ctx
            .store
            .find_pending(&input.email)
            .await?
            .ok_or(AppError::InvalidSession)?;

        let policy = self.ctx.policy.signup_verify;
        pending.throttle.refresh(now);
        let eval = pending.throttle.evaluate(SignupAction::OtpVerify, &policy, now);
        if eval.is_blocked() {
            return Err(AppError::Locked {
                scope: LockScope::Signup,
                remaining_block_seconds: eval.block_remaining_seconds,
            });
        }

        if !token_matches(&pending.temp_token, &input.temp_token) {
            return Err(AppError::InvalidSession);
        }

        match OtpService::check(&input.otp, pending.otp.as_ref(), now) {
            OtpCheck::Expired => {
                // An expired code ends this signup attempt.
                self.ctx.store.delete_pending(&pending.email).await?;
                tracing::info!(email = %pending.email, "signup OTP expired, pending signup removed");
                Err(AppError::OtpExpired)
            }
            OtpCheck::Mismatch => {
                let recorded = pending
                    .throttle
                    .record_attempt(SignupAction::OtpVerify, &policy, now);
                self.ctx.store.save_pending(&mut pending).await?;

                Err(match recorded {
                    Recorded::Tripped {
                        block_remaining_seconds,
                    } => {
                        tracing::warn!(email = %pending.email, "signup OTP verification blocked");
                        AppError::Unauthorized {
                            ledger: Ledger::SignupVerify,
                            attempts_left: 0,
                            remaining_block_seconds: Some(block_remaining_seconds),
                        }
                    }
                    Recorded::Counted { attempts_left } => AppError::Unauthorized {
                        ledger: Ledger::SignupVerify,
                        attempts_left,
                        remaining_block_seconds: None,
                    },
                })
            }
            OtpCheck::Valid => self.promote(pending, now).await,
        }
    }

    async fn start(&self, input: SignupRequest, now: DateTime<Utc>) -> Result<SignupOtpResponse> {
        let mut throttle = AccountLockout::default();
        throttle.record_attempt(SignupAction::OtpSend, &self.ctx.policy.signup_send, now);

        let mut pending = PendingSignup {
            _id: None,
            email: input.email,
            temp_token: Uuid::new_v4().to_string(),
            name: input.name.trim().to_string(),
            password_hash: hash(&input.password, self.ctx.bcrypt_cost)?,
            role: input.role,
            resume: input.resume,
            otp: Some(self.otp.issue(now)),
            throttle,
            version: 0,
            created_at: now,
        };
        self.ctx.store.save_pending(&mut pending).await?;

        tracing::info!(email = %pending.email, "pending signup created");
        self.deliver(&pending);
        Ok(self.response(&pending, now))
    }

    /// Shared by a repeated signup request and an explicit resend.
    async fn send_again(
        &self,
        mut pending: PendingSignup,
        profile: Option<SignupRequest>,
        now: DateTime<Utc>,
    ) -> Result<SignupOtpResponse> {
        let policy = self.ctx.policy.signup_send;
        pending.throttle.refresh(now);

        let eval = pending.throttle.evaluate(SignupAction::OtpSend, &policy, now);
        if eval.is_blocked() {
            return Err(AppError::Locked {
                scope: LockScope::Signup,
                remaining_block_seconds: eval.block_remaining_seconds,
            });
        }
        if eval.is_cooling_down() {
            return Err(AppError::RateLimited {
                ledger: Ledger::SignupSend,
                retry_in: eval.retry_in_seconds,
                attempts_left: eval.attempts_left,
            });
        }

        if let Recorded::Tripped {
            block_remaining_seconds,
        } = pending.throttle.record_attempt(SignupAction::OtpSend, &policy, now)
        {
            self.ctx.store.save_pending(&mut pending).await?;
            tracing::warn!(email = %pending.email, "signup OTP sends blocked");
            return Err(AppError::Locked {
                scope: LockScope::Signup,
                remaining_block_seconds: block_remaining_seconds,
            });
        }

        // The latest signup request owns the pending registration.
        if let Some(profile) = profile {
            pending.name = profile.name.trim().to_string();
            pending.password_hash = hash(&profile.password, self.ctx.bcrypt_cost)?;
            pending.role = profile.role;
            pending.resume = profile.resume;
            pending.temp_token = Uuid::new_v4().to_string();
        }

        pending.otp = Some(self.otp.issue(now));
        pending.throttle.reset(SignupAction::OtpVerify);
        self.ctx.store.save_pending(&mut pending).await?;

        self.deliver(&pending);
        Ok(self.response(&pending, now))
    }

    async fn promote(&self, pending: PendingSignup, now: DateTime<Utc>) -> Result<AuthResponse> {
        if self.ctx.store.find_user(&pending.email).await?.is_some() {
            self.ctx.store.delete_pending(&pending.email).await?;
            return Err(AppError::AlreadyRegistered);
        }

        let sequence = self.ctx.store.next_user_sequence(pending.role).await?;
        let user = User {
            _id: None,
            user_id: pending.role.format_user_id(sequence),
            name: pending.name,
            email: pending.email,
            role: pending.role,
            password_hash: pending.password_hash,
            resume: pending.resume,
            verified: true,
            lockout: AccountLockout::default(),
            otp: None,
            last_otp_sent: None,
            last_failed_login_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.ctx.store.insert_user(&user).await?;
        self.ctx.store.delete_pending(&user.email).await?;

        tracing::info!(email = %user.email, user_id = %user.user_id, "signup verified");

        Ok(AuthResponse {
            success: true,
            message: "Signup successful".to_string(),
            session_token: self.ctx.tokens.issue(&user, now)?,
            user: user.to_response(),
        })
    }

    fn deliver(&self, pending: &PendingSignup) {
        if let Some(otp) = &pending.otp {
            dispatch(
                self.ctx.mailer.clone(),
                OutgoingEmail::otp(
                    &pending.email,
                    &otp.code,
                    OtpPurpose::Signup,
                    self.otp.validity().num_seconds(),
                ),
            );
        }
    }

    fn response(&self, pending: &PendingSignup, now: DateTime<Utc>) -> SignupOtpResponse {
        let policy = &self.ctx.policy;
        let send = pending
            .throttle
            .evaluate(SignupAction::OtpSend, &policy.signup_send, now);
        let verify = pending
            .throttle
            .evaluate(SignupAction::OtpVerify, &policy.signup_verify, now);

        SignupOtpResponse {
            success: true,
            message: "OTP sent to your email".to_string(),
            temp_token: pending.temp_token.clone(),
            otp_expires_in: pending
                .otp
                .as_ref()
                .map(|otp| seconds_until(otp.expires_at, now))
                .unwrap_or(0),
            retry_in: send.retry_in_seconds,
            attempts_left: send.attempts_left,
            verify_attempts_left: verify.attempts_left,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::store::AuthStore;
    use crate::models::user::Role;
    use crate::services::test_support::{t0, TestHarness};
    use chrono::Duration;

    fn signup_input(email: &str) -> SignupRequest {
        SignupRequest {
            name: "Grace Hopper".to_string(),
            email: email.to_string(),
            password: "s3cure-password".to_string(),
            role: Role::Hr,
            resume: None,
        }
    }

    fn resend(email: &str, token: &str) -> ResendSignupOtpRequest {
        ResendSignupOtpRequest {
            email: email.to_string(),
            temp_token: token.to_string(),
        }
    }

    fn verify(email: &str, token: &str, otp: &str) -> VerifySignupOtpRequest {
        VerifySignupOtpRequest {
            email: email.to_string(),
            temp_token: token.to_string(),
            otp: otp.to_string(),
        }
    }

    async fn stored_code(h: &TestHarness, email: &str) -> String {
        h.store
            .find_pending(email)
            .await
            .unwrap()
            .unwrap()
            .otp
            .unwrap()
            .code
    }

    fn wrong_code(code: &str) -> String {
        if code == "000000" {
            "111111".to_string()
        } else {
            "000000".to_string()
        }
    }

    #[tokio::test]
    async fn first_request_creates_pending_signup() {
        let h = TestHarness::new();
        let flow = SignupFlow::new(h.ctx.clone());

        let res = flow
            .request_signup(signup_input(" Grace@Example.com "), t0())
            .await
            .unwrap();

        assert_eq!(res.otp_expires_in, 60);
        assert_eq!(res.retry_in, 60);
        assert_eq!(res.attempts_left, 2);
        assert_eq!(res.verify_attempts_left, 3);

        let pending = h.store.find_pending("grace@example.com").await.unwrap().unwrap();
        assert_eq!(pending.temp_token, res.temp_token);
        assert_eq!(pending.throttle.ledgers.otp_attempts.attempt_count, 1);
        assert_ne!(pending.password_hash, "s3cure-password");
    }

    #[tokio::test]
    async fn invalid_input_touches_nothing() {
        let h = TestHarness::new();
        let flow = SignupFlow::new(h.ctx.clone());
        let mut input = signup_input("grace@example.com");
        input.role = Role::Jobseeker;

        let err = flow.request_signup(input, t0()).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert!(h.store.find_pending("grace@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blank_name_touches_nothing() {
        let h = TestHarness::new();
        let flow = SignupFlow::new(h.ctx.clone());
        let mut input = signup_input("grace@example.com");
        input.name = "   ".to_string();

        let err = flow.request_signup(input, t0()).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert!(h.store.find_pending("grace@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resend_throttle_escalates_to_block() {
        let h = TestHarness::new();
        let flow = SignupFlow::new(h.ctx.clone());
        let email = "grace@example.com";
        let token = flow
            .request_signup(signup_input(email), t0())
            .await
            .unwrap()
            .temp_token;

        for offset in [5, 30] {
            let err = flow
                .resend_signup_otp(resend(email, &token), t0() + Duration::seconds(offset))
                .await
                .unwrap_err();
            match err {
                AppError::RateLimited { retry_in, .. } => assert_eq!(retry_in, 60 - offset as u64),
                other => panic!("expected rate limit, got {other:?}"),
            }
        }

        let second = flow
            .resend_signup_otp(resend(email, &token), t0() + Duration::seconds(61))
            .await
            .unwrap();
        assert_eq!(second.attempts_left, 1);

        let third = flow
            .resend_signup_otp(resend(email, &token), t0() + Duration::seconds(122))
            .await
            .unwrap();
        assert_eq!(third.attempts_left, 0);

        let fourth_at = t0() + Duration::seconds(183);
        let err = flow
            .resend_signup_otp(resend(email, &token), fourth_at)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Locked {
                scope: LockScope::Signup,
                remaining_block_seconds: 300
            }
        ));

        // The shared block also covers verification.
        let code = stored_code(&h, email).await;
        let err = flow
            .verify_signup_otp(verify(email, &token, &code), fourth_at + Duration::seconds(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Locked { .. }));
    }

    #[tokio::test]
    async fn block_expiry_restores_a_fresh_budget() {
        let h = TestHarness::new();
        let flow = SignupFlow::new(h.ctx.clone());
        let email = "grace@example.com";
        let token = flow
            .request_signup(signup_input(email), t0())
            .await
            .unwrap()
            .temp_token;

        let mut now = t0();
        for _ in 0..3 {
            now += Duration::seconds(61);
            let _ = flow.resend_signup_otp(resend(email, &token), now).await;
        }
        assert!(h
            .store
            .find_pending(email)
            .await
            .unwrap()
            .unwrap()
            .throttle
            .is_locked(now));

        let res = flow
            .resend_signup_otp(resend(email, &token), now + Duration::seconds(300))
            .await
            .unwrap();
        assert_eq!(res.attempts_left, 2);
    }

    #[tokio::test]
    async fn resend_with_wrong_token_is_generic() {
        let h = TestHarness::new();
        let flow = SignupFlow::new(h.ctx.clone());
        flow.request_signup(signup_input("grace@example.com"), t0())
            .await
            .unwrap();

        let wrong = flow
            .resend_signup_otp(resend("grace@example.com", "nope"), t0() + Duration::seconds(90))
            .await
            .unwrap_err();
        let missing = flow
            .resend_signup_otp(resend("other@example.com", "nope"), t0() + Duration::seconds(90))
            .await
            .unwrap_err();

        assert!(matches!(wrong, AppError::InvalidSession));
        assert!(matches!(missing, AppError::InvalidSession));
    }

    #[tokio::test]
    async fn repeated_signup_request_rotates_token_and_resets_verify_budget() {
        let h = TestHarness::new();
        let flow = SignupFlow::new(h.ctx.clone());
        let email = "grace@example.com";
        let first = flow.request_signup(signup_input(email), t0()).await.unwrap();

        let code = stored_code(&h, email).await;
        let _ = flow
            .verify_signup_otp(verify(email, &first.temp_token, &wrong_code(&code)), t0())
            .await;

        let again = flow
            .request_signup(signup_input(email), t0() + Duration::seconds(60))
            .await
            .unwrap();
        assert_ne!(again.temp_token, first.temp_token);
        assert_eq!(again.verify_attempts_left, 3);
        assert_eq!(again.attempts_left, 1);
    }

    #[tokio::test]
    async fn expired_code_deletes_pending_signup() {
        let h = TestHarness::new();
        let flow = SignupFlow::new(h.ctx.clone());
        let email = "grace@example.com";
        let token = flow
            .request_signup(signup_input(email), t0())
            .await
            .unwrap()
            .temp_token;
        let code = stored_code(&h, email).await;

        let err = flow
            .verify_signup_otp(verify(email, &token, &code), t0() + Duration::seconds(61))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::OtpExpired));
        assert!(h.store.find_pending(email).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn wrong_codes_trip_the_shared_block() {
        let h = TestHarness::new();
        let flow = SignupFlow::new(h.ctx.clone());
        let email = "grace@example.com";
        let token = flow
            .request_signup(signup_input(email), t0())
            .await
            .unwrap()
            .temp_token;
        let wrong = wrong_code(&stored_code(&h, email).await);

        let mut left = Vec::new();
        for _ in 0..3 {
            match flow
                .verify_signup_otp(verify(email, &token, &wrong), t0())
                .await
                .unwrap_err()
            {
                AppError::Unauthorized {
                    attempts_left,
                    remaining_block_seconds,
                    ..
                } => left.push((attempts_left, remaining_block_seconds)),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(left, vec![(2, None), (1, None), (0, Some(300))]);

        // Sending is blocked too, even after the cooldown.
        let err = flow
            .resend_signup_otp(resend(email, &token), t0() + Duration::seconds(90))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Locked { .. }));
    }

    #[tokio::test]
    async fn valid_code_promotes_to_user() {
        let h = TestHarness::new();
        let flow = SignupFlow::new(h.ctx.clone());
        let email = "grace@example.com";
        let token = flow
            .request_signup(signup_input(email), t0())
            .await
            .unwrap()
            .temp_token;
        let code = stored_code(&h, email).await;

        let res = flow
            .verify_signup_otp(verify(email, &token, &code), t0() + Duration::seconds(30))
            .await
            .unwrap();

        assert_eq!(res.user.id, "HR00001");
        assert_eq!(res.user.email, email);
        assert!(h.store.find_pending(email).await.unwrap().is_none());
        let user = h.store.find_user(email).await.unwrap().unwrap();
        assert!(user.verified);
        assert_eq!(user.user_id, "HR00001");
        assert!(!res.session_token.is_empty());

        let err = flow
            .request_signup(signup_input(email), t0() + Duration::seconds(40))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyRegistered));
    }

    #[tokio::test]
    async fn otp_is_emailed() {
        let h = TestHarness::new();
        let flow = SignupFlow::new(h.ctx.clone());
        flow.request_signup(signup_input("grace@example.com"), t0())
            .await
            .unwrap();

        let code = stored_code(&h, "grace@example.com").await;
        let sent = h.wait_for_mail(1).await;
        assert_eq!(sent[0].to, "grace@example.com");
        assert!(sent[0].text.contains(&code));
    }

    #[tokio::test]
    async fn failed_delivery_still_counts_the_send() {
        let h = TestHarness::with_failing_mailer();
        let flow = SignupFlow::new(h.ctx.clone());
        let res = flow
            .request_signup(signup_input("grace@example.com"), t0())
            .await
            .unwrap();

        assert_eq!(res.attempts_left, 2);
        tokio::task::yield_now().await;
        let pending = h.store.find_pending("grace@example.com").await.unwrap().unwrap();
        assert_eq!(pending.throttle.ledgers.otp_attempts.attempt_count, 1);
    }
}
