use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::errors::{AppError, Result};
use crate::models::user::{Claims, User};

/// Issues and checks HS256 session tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, user: &User, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            sub: user.user_id.clone(),
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp() as usize,
            exp: (now + self.ttl).timestamp() as usize,
        };

        encode(&Header::default(), &claims, &self.encoding).map_err(AppError::from)
    }

    pub fn decode(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|_| AppError::AuthError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::throttle::AccountLockout;
    use crate::models::user::Role;

    fn user() -> User {
        User {
            _id: None,
            user_id: "HR00001".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            role: Role::Hr,
            password_hash: String::new(),
            resume: None,
            verified: true,
            lockout: AccountLockout::default(),
            otp: None,
            last_otp_sent: None,
            last_failed_login_at: None,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn issued_token_round_trips_claims() {
        let tokens = TokenService::new("test-secret", Duration::hours(24));
        let token = tokens.issue(&user(), Utc::now()).unwrap();
        let claims = tokens.decode(&token).unwrap();

        assert_eq!(claims.sub, "HR00001");
        assert_eq!(claims.email, "ada@example.com");
        assert_eq!(claims.role, Role::Hr);
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let issuer = TokenService::new("one", Duration::hours(1));
        let checker = TokenService::new("two", Duration::hours(1));
        let token = issuer.issue(&user(), Utc::now()).unwrap();

        assert!(matches!(checker.decode(&token), Err(AppError::AuthError)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = TokenService::new("secret", Duration::hours(1));
        let token = tokens
            .issue(&user(), Utc::now() - Duration::hours(3))
            .unwrap();

        assert!(tokens.decode(&token).is_err());
    }
}
