use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, Rng};
use subtle::ConstantTimeEq;

use crate::models::otp::OtpChallenge;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpCheck {
    Valid,
    Expired,
    Mismatch,
}

#[derive(Debug, Clone, Copy)]
pub struct OtpService {
    validity: Duration,
}

impl OtpService {
    pub fn new(validity: Duration) -> Self {
        Self { validity }
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    // Generate 6-digit OTP
    pub fn generate_otp() -> String {
        format!("{:06}", OsRng.gen_range(0..1_000_000))
    }

    pub fn issue(&self, now: DateTime<Utc>) -> OtpChallenge {
        OtpChallenge {
            code: Self::generate_otp(),
            expires_at: now + self.validity,
        }
    }

    /// Expiry wins over a matching code; codes are compared in constant time.
    pub fn verify(
        submitted: &str,
        stored: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> OtpCheck {
        if now >= expires_at {
            return OtpCheck::Expired;
        }
        if bool::from(submitted.as_bytes().ct_eq(stored.as_bytes())) {
            OtpCheck::Valid
        } else {
            OtpCheck::Mismatch
        }
    }

    /// A challenge that was already cleared counts as expired.
    pub fn check(submitted: &str, challenge: Option<&OtpChallenge>, now: DateTime<Utc>) -> OtpCheck {
        match challenge {
            Some(challenge) => Self::verify(submitted, &challenge.code, challenge.expires_at, now),
            None => OtpCheck::Expired,
        }
    }
}
