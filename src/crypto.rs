//! Password hashing, activation keys and signed reset tokens.

use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::{Argon2, Params, Version};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::config::Argon2 as ArgonConfig;
use crate::user::User;

const ACTIVATION_KEY_BYTES: usize = 16;
const ANONYMIZATION_SALT_BYTES: usize = 16;
const ANONYMIZED_USERNAME_LENGTH: usize = 32;
const RESET_SIGNATURE_LENGTH: usize = 20;

type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
    #[error("invalid hmac key: {0}")]
    Hmac(String),
}

/// Cryptographic manager.
pub struct Crypto {
    pub pwd: PasswordManager,
    pub reset: ResetTokenGenerator,
}

impl Crypto {
    /// Create a new [`Crypto`].
    pub fn new(
        config: Option<ArgonConfig>,
        secret_key: impl AsRef<[u8]>,
    ) -> Result<Self> {
        Ok(Self {
            pwd: PasswordManager::new(config)?,
            reset: ResetTokenGenerator::new(secret_key),
        })
    }
}

/// Password manager that uses Argon2id and PHC string format for hashing.
pub struct PasswordManager {
    params: Params,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        Ok(Self { params })
    }

    /// Hash password using Argon2id.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let argon2 = Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        );
        let salt = SaltString::generate(&mut OsRng);
        let hash = argon2
            .hash_password(password.as_ref(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(hash.to_string())
    }
}

pub struct Hasher(Zeroizing<Vec<u8>>);

impl Hasher {
    /// Create a new [`Hasher`].
    pub fn new(salt: impl AsRef<[u8]>) -> Self {
        Self(Zeroizing::new(salt.as_ref().to_vec()))
    }

    /// Digest data into SHA256.
    pub fn digest(&self, data: impl AsRef<[u8]>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.0);
        hasher.update(&data);
        let hash = hasher.finalize();

        hex::encode(hash)
    }
}

fn random_hex(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Opaque single-use key sent with activation and email change links.
pub fn activation_key() -> String {
    random_hex(ACTIVATION_KEY_BYTES)
}

/// One-way replacement for the username of a deleted account.
pub fn anonymize_username(username: &str) -> String {
    let salt = random_hex(ANONYMIZATION_SALT_BYTES);
    let mut hash = Hasher::new(salt).digest(username);
    hash.truncate(ANONYMIZED_USERNAME_LENGTH);
    hash
}

/// Encode `value` in lowercase base 36.
pub fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_owned();
    }

    let mut encoded = Vec::new();
    while value > 0 {
        encoded.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    encoded.reverse();
    String::from_utf8_lossy(&encoded).into_owned()
}

/// Signs password reset tokens.
///
/// A token embeds the password hash of the account, so it stops being valid
/// as soon as the password changes.
pub struct ResetTokenGenerator {
    key: Zeroizing<Vec<u8>>,
}

impl ResetTokenGenerator {
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self {
            key: Zeroizing::new(key.as_ref().to_vec()),
        }
    }

    fn signature(&self, user: &User, timestamp: u64) -> Result<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .map_err(|err| CryptoError::Hmac(err.to_string()))?;
        mac.update(user.id.to_string().as_bytes());
        mac.update(user.password.as_bytes());
        mac.update(timestamp.to_string().as_bytes());

        let mut signature = hex::encode(mac.finalize().into_bytes());
        signature.truncate(RESET_SIGNATURE_LENGTH);
        Ok(signature)
    }

    /// Create a reset token for `user`, issued at `now`.
    pub fn make_token(&self, user: &User, now: DateTime<Utc>) -> Result<String> {
        let timestamp = now.timestamp().max(0) as u64;
        Ok(format!(
            "{}-{}",
            to_base36(timestamp),
            self.signature(user, timestamp)?
        ))
    }
}

#[cfg(test)]
mod tests {
    use argon2::password_hash::PasswordHash;
    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn test_sha2() {
        let salt = [0x42; 16];
        let hasher = Hasher::new(salt);

        let plaintext = b"super_secret_data";
        let excepted =
            "ec0797340f6163ddc7398d7eafba6e05a8cb041a3935bbdaef99088917cc8933";

        let hash = hasher.digest(plaintext);
        assert_eq!(hash, excepted)
    }

    #[test]
    fn test_argon2() {
        let pwd = PasswordManager::new(Some(ArgonConfig {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        }))
        .unwrap();

        let phc = pwd.hash_password("validpass123").unwrap();
        let parsed = PasswordHash::new(&phc).unwrap();
        assert_eq!(parsed.algorithm.as_str(), "argon2id");
        assert_ne!(phc, pwd.hash_password("validpass123").unwrap());
    }

    #[test]
    fn test_anonymize_username() {
        let first = anonymize_username("gooduser");
        let second = anonymize_username("gooduser");

        assert_eq!(first.len(), ANONYMIZED_USERNAME_LENGTH);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        // Salted, so not reproducible.
        assert_ne!(first, second);
    }

    #[test]
    fn test_activation_key() {
        let key = activation_key();
        assert_eq!(key.len(), ACTIVATION_KEY_BYTES * 2);
        assert_ne!(key, activation_key());
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(
            u64::from_str_radix(&to_base36(1_717_200_000), 36),
            Ok(1_717_200_000)
        );
    }

    #[test]
    fn test_reset_token() {
        let generator = ResetTokenGenerator::new("secret");
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut user = User {
            id: 7,
            password: "$argon2id$v=19$first".into(),
            ..Default::default()
        };

        let token = generator.make_token(&user, now).unwrap();
        let (timestamp, signature) = token.split_once('-').unwrap();
        assert_eq!(timestamp, to_base36(now.timestamp() as u64));
        assert_eq!(signature.len(), RESET_SIGNATURE_LENGTH);
        assert_eq!(generator.make_token(&user, now).unwrap(), token);
        assert_ne!(
            generator.make_token(&user, now + Duration::days(1)).unwrap(),
            token
        );
        assert_ne!(
            ResetTokenGenerator::new("other").make_token(&user, now).unwrap(),
            token
        );

        user.password = "$argon2id$v=19$second".into();
        assert_ne!(generator.make_token(&user, now).unwrap(), token);
    }
}
