use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attempt counter for one throttled action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleState {
    pub attempt_count: u32,

    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_action_at: Option<DateTime<Utc>>,

    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub blocked_until: Option<DateTime<Utc>>,
}

/// Every throttled action tracked by the auth flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ledger {
    SignupSend,
    SignupVerify,
    Password,
    LoginOtpSend,
    LoginOtpVerify,
}

impl Ledger {
    pub fn name(&self) -> &'static str {
        match self {
            Ledger::SignupSend => "signup_otp_send",
            Ledger::SignupVerify => "signup_otp_verify",
            Ledger::Password => "password",
            Ledger::LoginOtpSend => "login_otp_send",
            Ledger::LoginOtpVerify => "login_otp_verify",
        }
    }

    /// JSON key used when reporting remaining attempts for this ledger.
    pub fn attempts_field(&self) -> &'static str {
        match self {
            Ledger::SignupSend | Ledger::SignupVerify => "attemptsLeft",
            Ledger::Password => "passwordAttemptsLeft",
            Ledger::LoginOtpSend => "otpAttemptsLeft",
            Ledger::LoginOtpVerify => "otpVerifyAttemptsLeft",
        }
    }

    pub fn failure_message(&self) -> &'static str {
        match self {
            Ledger::Password => "Incorrect password",
            Ledger::SignupVerify | Ledger::LoginOtpVerify => "Invalid OTP",
            Ledger::SignupSend | Ledger::LoginOtpSend => "OTP request rejected",
        }
    }
}

/// A fixed group of ledgers that share one lockout gate.
pub trait LedgerSet {
    type Key: Copy + Into<Ledger>;

    fn ledger(&self, key: Self::Key) -> &ThrottleState;
    fn ledger_mut(&mut self, key: Self::Key) -> &mut ThrottleState;
    fn reset_all(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignupAction {
    OtpSend,
    OtpVerify,
}

impl From<SignupAction> for Ledger {
    fn from(action: SignupAction) -> Self {
        match action {
            SignupAction::OtpSend => Ledger::SignupSend,
            SignupAction::OtpVerify => Ledger::SignupVerify,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginAction {
    Password,
    OtpSend,
    OtpVerify,
}

impl From<LoginAction> for Ledger {
    fn from(action: LoginAction) -> Self {
        match action {
            LoginAction::Password => Ledger::Password,
            LoginAction::OtpSend => Ledger::LoginOtpSend,
            LoginAction::OtpVerify => Ledger::LoginOtpVerify,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupLedgers {
    pub otp_attempts: ThrottleState,
    pub otp_verify_attempts: ThrottleState,
}

impl LedgerSet for SignupLedgers {
    type Key = SignupAction;

    fn ledger(&self, key: SignupAction) -> &ThrottleState {
        match key {
            SignupAction::OtpSend => &self.otp_attempts,
            SignupAction::OtpVerify => &self.otp_verify_attempts,
        }
    }

    fn ledger_mut(&mut self, key: SignupAction) -> &mut ThrottleState {
        match key {
            SignupAction::OtpSend => &mut self.otp_attempts,
            SignupAction::OtpVerify => &mut self.otp_verify_attempts,
        }
    }

    fn reset_all(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginLedgers {
    pub password_attempts: ThrottleState,
    pub otp_attempts: ThrottleState,
    pub otp_verify_attempts: ThrottleState,
}

impl LedgerSet for LoginLedgers {
    type Key = LoginAction;

    fn ledger(&self, key: LoginAction) -> &ThrottleState {
        match key {
            LoginAction::Password => &self.password_attempts,
            LoginAction::OtpSend => &self.otp_attempts,
            LoginAction::OtpVerify => &self.otp_verify_attempts,
        }
    }

    fn ledger_mut(&mut self, key: LoginAction) -> &mut ThrottleState {
        match key {
            LoginAction::Password => &mut self.password_attempts,
            LoginAction::OtpSend => &mut self.otp_attempts,
            LoginAction::OtpVerify => &mut self.otp_verify_attempts,
        }
    }

    fn reset_all(&mut self) {
        *self = Self::default();
    }
}

/// Account-level lockout gate wrapping a set of ledgers.
///
/// Member ledgers never carry their own `blocked_until`; the gate owns the
/// single block timestamp and any ledger tripping its limit writes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLockout<L> {
    pub ledgers: L,

    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub locked_until: Option<DateTime<Utc>>,
}
