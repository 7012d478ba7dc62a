use chrono::{DateTime, Utc};
use mongodb::bson;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::models::otp::OtpChallenge;
use crate::models::throttle::{AccountLockout, SignupLedgers};
use crate::models::user::Role;

/// Registration waiting for OTP confirmation. One per email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSignup {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub email: String,
    pub temp_token: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
    #[serde(default)]
    pub resume: Option<String>,

    #[serde(default)]
    pub otp: Option<OtpChallenge>,

    /// OTP-send and OTP-verify ledgers sharing one block.
    #[serde(default)]
    pub throttle: AccountLockout<SignupLedgers>,

    #[serde(default)]
    pub version: u64,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}
