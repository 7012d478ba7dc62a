use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::user::{Role, UserResponse};

/// Emails are matched case-insensitively and without surrounding blanks.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn validate_otp_digits(otp: &str) -> Result<(), ValidationError> {
    if otp.len() == 6 && otp.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("otp_format").with_message("OTP must be 6 digits".into()))
    }
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    let len = name.trim().chars().count();
    if (1..=100).contains(&len) {
        Ok(())
    } else {
        Err(ValidationError::new("name_length")
            .with_message("Name must be 1 to 100 characters".into()))
    }
}

fn validate_resume_for_role(req: &SignupRequest) -> Result<(), ValidationError> {
    let has_resume = req
        .resume
        .as_deref()
        .is_some_and(|resume| !resume.trim().is_empty());
    if req.role == Role::Jobseeker && !has_resume {
        return Err(ValidationError::new("resume_required")
            .with_message("Resume is required for job seekers".into()));
    }
    Ok(())
}

// Request DTOs
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_resume_for_role"))]
pub struct SignupRequest {
    #[validate(custom(function = "validate_name"))]
    pub name: String,

    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    pub role: Role,

    /// Reference to an already uploaded resume.
    pub resume: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResendSignupOtpRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(length(min = 1, message = "Missing signup token"))]
    pub temp_token: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifySignupOtpRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(length(min = 1, message = "Missing signup token"))]
    pub temp_token: String,

    #[validate(custom(function = "validate_otp_digits"))]
    pub otp: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginPasswordRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginOtpRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyLoginOtpRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(custom(function = "validate_otp_digits"))]
    pub otp: String,
}

// Response DTOs
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignupOtpResponse {
    pub success: bool,
    pub message: String,
    pub temp_token: String,
    pub otp_expires_in: u64,
    pub retry_in: u64,
    pub attempts_left: u32,
    pub verify_attempts_left: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoginOtpResponse {
    pub success: bool,
    pub message: String,
    pub otp_expires_in: u64,
    pub retry_in: u64,
    pub otp_attempts_left: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    pub session_token: String,
    pub user: UserResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(role: Role, resume: Option<&str>) -> SignupRequest {
        SignupRequest {
            name: "Grace".to_string(),
            email: "grace@example.com".to_string(),
            password: "correct horse".to_string(),
            role,
            resume: resume.map(str::to_string),
        }
    }

    #[test]
    fn jobseeker_needs_resume() {
        assert!(signup(Role::Jobseeker, None).validate().is_err());
        assert!(signup(Role::Jobseeker, Some("  ")).validate().is_err());
        assert!(signup(Role::Jobseeker, Some("uploads/cv.pdf")).validate().is_ok());
        assert!(signup(Role::Hr, None).validate().is_ok());
    }

    #[test]
    fn blank_name_is_rejected() {
        let mut req = signup(Role::Hr, None);
        req.name = "   ".to_string();
        assert!(req.validate().is_err());

        req.name = format!("  {}  ", "a".repeat(100));
        assert!(req.validate().is_ok());
        req.name = "a".repeat(101);
        assert!(req.validate().is_err());
    }

    #[test]
    fn short_password_is_rejected() {
        let mut req = signup(Role::Hr, None);
        req.password = "short".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn otp_must_be_six_digits() {
        let req = |otp: &str| VerifyLoginOtpRequest {
            email: "a@example.com".to_string(),
            otp: otp.to_string(),
        };
        assert!(req("123456").validate().is_ok());
        assert!(req("12345").validate().is_err());
        assert!(req("12345a").validate().is_err());
    }

    #[test]
    fn signup_request_reads_camel_case() {
        let req: ResendSignupOtpRequest =
            serde_json::from_str(r#"{"email":"a@example.com","tempToken":"abc"}"#).unwrap();
        assert_eq!(req.temp_token, "abc");
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }
}
