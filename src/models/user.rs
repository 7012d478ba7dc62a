use chrono::{DateTime, Utc};
use mongodb::bson;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::models::otp::OtpChallenge;
use crate::models::throttle::{AccountLockout, LoginLedgers};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Hr,
    Jobseeker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Hr => "hr",
            Role::Jobseeker => "jobseeker",
        }
    }

    /// Prefix of the human-readable user id, e.g. `HR00042`.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Role::Hr => "HR",
            Role::Jobseeker => "JS",
        }
    }

    pub fn format_user_id(&self, sequence: u64) -> String {
        format!("{}{:05}", self.id_prefix(), sequence)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub password_hash: String,
    #[serde(default)]
    pub resume: Option<String>,
    pub verified: bool,

    /// Password, OTP-send and OTP-verify ledgers behind one account lockout.
    #[serde(default)]
    pub lockout: AccountLockout<LoginLedgers>,

    #[serde(default)]
    pub otp: Option<OtpChallenge>,

    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_otp_sent: Option<DateTime<Utc>>,

    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_failed_login_at: Option<DateTime<Utc>>,

    /// Bumped on every successful save; used for compare-and-swap.
    #[serde(default)]
    pub version: u64,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn to_response(&self) -> UserResponse {
        UserResponse {
            id: self.user_id.clone(),
            email: self.email.clone(),
            role: self.role,
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
}
