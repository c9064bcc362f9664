//! Manage json web tokens.
//!
//! Tokens are issued by the platform login service and signed with a shared
//! HMAC secret.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::account::Requester;

pub const DEFAULT_AUDIENCE: &str = "accounts";
pub const EXPIRATION_TIME: u64 = 60 * 15; // 15 minutes.

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid JWT: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("system time is before Unix epoch")]
    Time(#[from] std::time::SystemTimeError),
}

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Claims {
    /// Recipients that the JWT is intended for.
    pub aud: String,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    pub exp: u64,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Identifies the organization that issued the JWT.
    pub iss: String,
    /// Username.
    pub sub: String,
    /// Whether the user is a staff member.
    #[serde(default)]
    pub staff: bool,
}

impl From<Claims> for Requester {
    fn from(claims: Claims) -> Self {
        Requester {
            username: claims.sub,
            is_staff: claims.staff,
        }
    }
}

/// Check JWT tokens issued by the login service.
#[derive(Clone)]
pub struct TokenManager {
    algorithm: Algorithm,
    decoding_key: DecodingKey,
    audience: String,
}

impl TokenManager {
    /// Create a new [`TokenManager`] instance.
    pub fn new(secret: &str) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            audience: DEFAULT_AUDIENCE.to_string(),
        }
    }

    /// Set expected `audience` field on JWT.
    pub fn audience(&mut self, audience: &str) {
        self.audience = audience.to_owned();
    }

    /// Decode and check a token.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_audience(&[&self.audience]);

        Ok(decode::<Claims>(token, &self.decoding_key, &validation)?.claims)
    }
}

/// Sign a token the way the login service does.
#[cfg(test)]
pub fn sign(
    secret: &str,
    audience: &str,
    username: &str,
    staff: bool,
) -> Result<String, TokenError> {
    use std::time::{SystemTime, UNIX_EPOCH};

    use jsonwebtoken::{EncodingKey, Header, encode};

    let time = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let claims = Claims {
        aud: audience.to_owned(),
        exp: time + EXPIRATION_TIME,
        iat: time,
        iss: "https://learn.example.com/".to_owned(),
        sub: username.to_owned(),
        staff,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode() {
        let manager = TokenManager::new("secret");
        let token = sign("secret", DEFAULT_AUDIENCE, "alice", true).unwrap();

        let claims = manager.decode(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert!(claims.staff);
        assert_eq!(claims.iss, "https://learn.example.com/");

        let requester = Requester::from(claims);
        assert_eq!(requester, Requester::staff("alice"));
    }

    #[test]
    fn test_rejects_foreign_tokens() {
        let manager = TokenManager::new("secret");
        let token =
            sign("other-secret", DEFAULT_AUDIENCE, "alice", false).unwrap();
        assert!(manager.decode(&token).is_err());

        let token = sign("secret", "forum", "alice", false).unwrap();
        assert!(manager.decode(&token).is_err());

        let mut forum = TokenManager::new("secret");
        forum.audience("forum");
        assert_eq!(forum.decode(&token).unwrap().sub, "alice");
    }
}
