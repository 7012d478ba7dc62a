pub mod attempt_ledger;
pub mod clock;
pub mod email_service;
pub mod key_lock;
pub mod login_flow;
pub mod otp_service;
pub mod signup_flow;
pub mod token_service;

use std::sync::Arc;

use crate::config::AuthPolicy;
use crate::database::store::AuthStore;
use email_service::Mailer;
use key_lock::KeyLocks;
use token_service::TokenService;

/// Collaborators shared by the signup and login flows.
#[derive(Clone)]
pub struct AuthContext {
    pub store: Arc<dyn AuthStore>,
    pub mailer: Arc<dyn Mailer>,
    pub tokens: TokenService,
    pub locks: KeyLocks,
    pub policy: AuthPolicy,
    pub bcrypt_cost: u32,
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::models::throttle::AccountLockout;
    use crate::models::user::{Role, User};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use email_service::testing::{FailingMailer, RecordingMailer};
    use email_service::OutgoingEmail;

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    pub struct TestHarness {
        pub ctx: AuthContext,
        pub store: Arc<MemoryStore>,
        pub mailer: Arc<RecordingMailer>,
    }

    impl TestHarness {
        pub fn new() -> Self {
            let mailer = Arc::new(RecordingMailer::default());
            Self::build(mailer.clone(), mailer)
        }

        pub fn with_failing_mailer() -> Self {
            Self::build(Arc::new(FailingMailer), Arc::new(RecordingMailer::default()))
        }

        fn build(mailer: Arc<dyn Mailer>, recorder: Arc<RecordingMailer>) -> Self {
            let store = Arc::new(MemoryStore::new());
            let ctx = AuthContext {
                store: store.clone(),
                mailer,
                tokens: TokenService::new("test-secret", Duration::hours(24)),
                locks: KeyLocks::new(),
                policy: AuthPolicy::default(),
                bcrypt_cost: 4,
            };
            Self {
                ctx,
                store,
                mailer: recorder,
            }
        }

        /// Waits for background deliveries to land.
        pub async fn wait_for_mail(&self, count: usize) -> Vec<OutgoingEmail> {
            for _ in 0..100 {
                if self.mailer.sent.lock().unwrap().len() >= count {
                    break;
                }
                tokio::task::yield_now().await;
            }
            self.mailer.sent.lock().unwrap().clone()
        }

        pub async fn seed_user(&self, email: &str, password: &str, verified: bool) -> User {
            let user = User {
                _id: None,
                user_id: Role::Jobseeker.format_user_id(1),
                name: "Ada Lovelace".to_string(),
                email: email.to_string(),
                role: Role::Jobseeker,
                password_hash: bcrypt::hash(password, 4).unwrap(),
                resume: Some("uploads/ada.pdf".to_string()),
                verified,
                lockout: AccountLockout::default(),
                otp: None,
                last_otp_sent: None,
                last_failed_login_at: None,
                version: 0,
                created_at: t0(),
                updated_at: t0(),
            };
            self.store.insert_user(&user).await.unwrap();
            user
        }
    }
}
