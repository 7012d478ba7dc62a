pub mod otp;
pub mod pending_signup;
pub mod throttle;
pub mod user;
