//! Which account fields a requester may see.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user::Profile;

/// Preference holding the [`Visibility`] chosen by a user.
pub const ACCOUNT_PRIVACY: &str = "account_privacy";

/// Who may see the shareable part of a profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Private,
    AllUsers,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::AllUsers => "all_users",
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "private" => Ok(Visibility::Private),
            "all_users" => Ok(Visibility::AllUsers),
            _ => Err(format!("Invalid visibility '{value}'.")),
        }
    }
}

/// Requested shape of an account view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    /// Full view when the requester owns the account or is staff.
    #[default]
    Default,
    /// What any other user would see.
    Shared,
}

/// Field lists per audience.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityConfiguration {
    /// Applies when a user never chose an `account_privacy`.
    pub default_visibility: Visibility,
    /// Fields shown to everyone when the profile is `all_users`.
    pub shareable_fields: Vec<String>,
    /// Fields shown to everyone when the profile is `private`.
    pub public_fields: Vec<String>,
    /// Fields shown to the owner and to staff.
    pub admin_fields: Vec<String>,
}

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_owned()).collect()
}

impl Default for VisibilityConfiguration {
    fn default() -> Self {
        Self {
            default_visibility: Visibility::AllUsers,
            shareable_fields: fields(&[
                ACCOUNT_PRIVACY,
                "bio",
                "country",
                "date_joined",
                "language_proficiencies",
                "name",
                "profile_image",
                "requires_parental_consent",
                "username",
            ]),
            public_fields: fields(&[
                ACCOUNT_PRIVACY,
                "profile_image",
                "username",
            ]),
            admin_fields: fields(&[
                ACCOUNT_PRIVACY,
                "bio",
                "country",
                "date_joined",
                "email",
                "gender",
                "goals",
                "is_active",
                "language_proficiencies",
                "level_of_education",
                "mailing_address",
                "name",
                "profile_image",
                "requires_parental_consent",
                "username",
                "year_of_birth",
            ]),
        }
    }
}

/// Effective visibility of a profile.
///
/// Learners needing parental consent are always private; a removed profile
/// is private too.
pub fn profile_visibility(
    profile: Option<&Profile>,
    account_privacy: Option<Visibility>,
    configuration: &VisibilityConfiguration,
    now: DateTime<Utc>,
) -> Visibility {
    match profile {
        Some(profile) if !profile.requires_parental_consent(now) => {
            account_privacy.unwrap_or(configuration.default_visibility)
        },
        _ => Visibility::Private,
    }
}

/// Fields other users may see for a profile with `visibility`.
pub fn visible_fields(
    visibility: Visibility,
    configuration: &VisibilityConfiguration,
) -> &[String] {
    match visibility {
        Visibility::AllUsers => &configuration.shareable_fields,
        Visibility::Private => &configuration.public_fields,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_minor_is_always_private() {
        let config = VisibilityConfiguration::default();
        let mut profile = Profile::empty(1);
        profile.year_of_birth = Some(2015);

        assert_eq!(
            profile_visibility(
                Some(&profile),
                Some(Visibility::AllUsers),
                &config,
                now()
            ),
            Visibility::Private
        );
    }

    #[test]
    fn test_preference_then_default() {
        let config = VisibilityConfiguration::default();
        let mut profile = Profile::empty(1);
        profile.year_of_birth = Some(1990);

        assert_eq!(
            profile_visibility(
                Some(&profile),
                Some(Visibility::Private),
                &config,
                now()
            ),
            Visibility::Private
        );
        assert_eq!(
            profile_visibility(Some(&profile), None, &config, now()),
            config.default_visibility
        );
        assert_eq!(
            profile_visibility(None, None, &config, now()),
            Visibility::Private
        );
    }

    #[test]
    fn test_visible_fields() {
        let config = VisibilityConfiguration::default();
        let public = visible_fields(Visibility::Private, &config);
        assert!(public.contains(&"username".to_owned()));
        assert!(!public.contains(&"bio".to_owned()));

        let shared = visible_fields(Visibility::AllUsers, &config);
        assert!(shared.contains(&"bio".to_owned()));
        assert!(!shared.contains(&"email".to_owned()));
    }

    #[test]
    fn test_parse_visibility() {
        assert_eq!("all_users".parse(), Ok(Visibility::AllUsers));
        assert!("friends".parse::<Visibility>().is_err());
    }
}
