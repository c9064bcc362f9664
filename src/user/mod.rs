//! Records owned by the account store.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix marking a password hash that can never match.
pub const UNUSABLE_PASSWORD_PREFIX: char = '!';
/// Age up to which a learner needs parental consent.
pub const PARENTAL_CONSENT_AGE_LIMIT: i32 = 13;

/// User as saved on database.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow,
)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
}

impl User {
    /// Whether a password reset may be issued for this account.
    pub fn has_usable_password(&self) -> bool {
        !self.password.is_empty()
            && !self.password.starts_with(UNUSABLE_PASSWORD_PREFIX)
    }
}

/// Values needed to insert a [`User`].
#[derive(Clone, Debug, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

/// Language spoken by a learner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageProficiency {
    pub code: String,
}

/// Profile attached 1:1 to a [`User`].
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow,
)]
pub struct Profile {
    pub user_id: i64,
    pub name: String,
    #[sqlx(json)]
    pub meta: Map<String, Value>,
    pub gender: Option<String>,
    pub year_of_birth: Option<i32>,
    pub level_of_education: Option<String>,
    pub country: Option<String>,
    pub goals: Option<String>,
    pub mailing_address: Option<String>,
    pub bio: Option<String>,
    pub profile_image_uploaded_at: Option<DateTime<Utc>>,
    #[sqlx(json)]
    pub language_proficiencies: Vec<LanguageProficiency>,
}

impl Profile {
    /// Profile with default values for a freshly created user.
    pub fn empty(user_id: i64) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    /// Learners whose age is unknown are treated as needing consent.
    pub fn requires_parental_consent(&self, now: DateTime<Utc>) -> bool {
        match self.year_of_birth {
            Some(year) => now.year() - year <= PARENTAL_CONSENT_AGE_LIMIT,
            None => true,
        }
    }
}

/// Tracks the activation of a newly created account.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow,
)]
pub struct Registration {
    pub user_id: i64,
    pub activation_key: String,
    pub activated: bool,
}

impl Registration {
    /// Create a new, not yet consumed, [`Registration`].
    pub fn new(user_id: i64, activation_key: String) -> Self {
        Self {
            user_id,
            activation_key,
            activated: false,
        }
    }
}

/// Email change waiting for the owner of the new address to confirm it.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow,
)]
pub struct PendingEmailChange {
    pub user_id: i64,
    pub new_email: String,
    pub activation_key: String,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_parental_consent() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut profile = Profile::empty(1);
        assert!(profile.requires_parental_consent(now));

        profile.year_of_birth = Some(2011);
        assert!(profile.requires_parental_consent(now));

        profile.year_of_birth = Some(1990);
        assert!(!profile.requires_parental_consent(now));
    }

    #[test]
    fn test_usable_password() {
        let mut user = User {
            password: "$argon2id$v=19$...".into(),
            ..Default::default()
        };
        assert!(user.has_usable_password());

        user.password = "!unusable".into();
        assert!(!user.has_usable_password());
    }
}
