//! Platform session tokens.
//!
//! The engine hands callers an opaque string identifying a User. How that
//! string is minted lives behind [`SessionIssuer`]; the default
//! implementation signs an HS256 JWT whose `sub` is the user id.

use crate::AreaError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Mints and verifies session tokens.
pub trait SessionIssuer: Send + Sync {
    fn issue(&self, user_id: i64) -> Result<String, AreaError>;

    /// Returns the user id the token was issued for.
    fn verify(&self, token: &str) -> Result<i64, AreaError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

pub struct JwtSessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl JwtSessionIssuer {
    pub fn new(secret: &str) -> Self {
        Self::with_lifetime(secret, Duration::days(30))
    }

    pub fn with_lifetime(secret: &str, lifetime: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime,
        }
    }
}

impl SessionIssuer for JwtSessionIssuer {
    fn issue(&self, user_id: i64) -> Result<String, AreaError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AreaError::Storage(anyhow::anyhow!("Failed to sign session token: {}", e)))
    }

    fn verify(&self, token: &str) -> Result<i64, AreaError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|e| AreaError::Unauthorized(format!("invalid session token: {}", e)))?;
        data.claims
            .sub
            .parse()
            .map_err(|_| AreaError::Unauthorized("malformed session subject".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_then_verify() {
        let issuer = JwtSessionIssuer::new("test-secret");
        let token = issuer.issue(42).unwrap();
        assert_eq!(issuer.verify(&token).unwrap(), 42);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = JwtSessionIssuer::new("secret-a").issue(1).unwrap();
        let err = JwtSessionIssuer::new("secret-b").verify(&token).unwrap_err();
        assert!(matches!(err, AreaError::Unauthorized(_)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = JwtSessionIssuer::with_lifetime("secret", Duration::hours(-2));
        let token = issuer.issue(1).unwrap();
        assert!(matches!(issuer.verify(&token), Err(AreaError::Unauthorized(_))));
    }

    #[test]
    fn test_garbage_rejected() {
        let issuer = JwtSessionIssuer::new("secret");
        assert!(issuer.verify("not-a-jwt").is_err());
    }
}
