//! Field schemas of the user and profile records.
//!
//! Each schema maps an update key to its access rule: read-only keys are
//! rejected, writable keys carry a validator and a writer.

use chrono::{DateTime, Datelike, Utc};
use serde_json::Value;

use crate::error::FieldError;
use crate::user::{LanguageProficiency, Profile, User};

const NAME_MIN_LENGTH: usize = 2;
const NAME_MAX_LENGTH: usize = 255;
const BIO_MAX_LENGTH: usize = 300;
const MIN_YEAR_OF_BIRTH: i64 = 1900;

const GENDERS: &[&str] = &["m", "f", "o"];
const LEVELS_OF_EDUCATION: &[&str] =
    &["p", "m", "b", "a", "hs", "jhs", "el", "none", "other"];

/// Checks a raw value; the error is a user-facing message.
pub type Check = fn(&Value, DateTime<Utc>) -> Result<(), String>;

/// Access rule of a single field.
pub enum Access<T: 'static> {
    ReadOnly,
    Writable {
        validate: Check,
        /// Only called with values accepted by `validate`.
        write: fn(&mut T, &Value),
    },
}

/// Named field of a record `T`.
pub struct FieldSpec<T: 'static> {
    pub name: &'static str,
    pub access: Access<T>,
}

/// Set of fields of one record.
pub struct Schema<T: 'static> {
    fields: &'static [FieldSpec<T>],
}

impl<T> Schema<T> {
    pub fn get(&self, name: &str) -> Option<&'static FieldSpec<T>> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn is_read_only(&self, name: &str) -> bool {
        matches!(
            self.get(name),
            Some(FieldSpec {
                access: Access::ReadOnly,
                ..
            })
        )
    }
}

impl<T> FieldSpec<T> {
    /// Validate `value`, formatting a rejection as a [`FieldError`].
    pub fn check(
        &self,
        value: &Value,
        now: DateTime<Utc>,
    ) -> Result<(), FieldError> {
        match &self.access {
            Access::ReadOnly => Err(FieldError::read_only(self.name)),
            Access::Writable { validate, .. } => {
                validate(value, now).map_err(|message| {
                    FieldError::new(
                        format!(
                            "Value '{}' is not valid for field '{}': {message}",
                            display(value),
                            self.name
                        ),
                        message,
                    )
                })
            },
        }
    }

    /// Write an already validated `value` into `record`.
    pub fn apply(&self, record: &mut T, value: &Value) {
        if let Access::Writable { write, .. } = &self.access {
            write(record, value);
        }
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Fields of [`User`] exposed through the account API.
pub static USER_FIELDS: Schema<User> = Schema {
    fields: &[
        FieldSpec {
            name: "username",
            access: Access::ReadOnly,
        },
        FieldSpec {
            name: "email",
            access: Access::ReadOnly,
        },
        FieldSpec {
            name: "date_joined",
            access: Access::ReadOnly,
        },
        FieldSpec {
            name: "is_active",
            access: Access::ReadOnly,
        },
    ],
};

/// Fields of [`Profile`] exposed through the account API.
pub static PROFILE_FIELDS: Schema<Profile> = Schema {
    fields: &[
        FieldSpec {
            name: "name",
            access: Access::Writable {
                validate: validate_name,
                write: |profile, value| {
                    profile.name =
                        value.as_str().unwrap_or_default().trim().to_owned()
                },
            },
        },
        FieldSpec {
            name: "gender",
            access: Access::Writable {
                validate: |value, _| choice(value, GENDERS),
                write: |profile, value| profile.gender = optional_string(value),
            },
        },
        FieldSpec {
            name: "level_of_education",
            access: Access::Writable {
                validate: |value, _| choice(value, LEVELS_OF_EDUCATION),
                write: |profile, value| {
                    profile.level_of_education = optional_string(value)
                },
            },
        },
        FieldSpec {
            name: "country",
            access: Access::Writable {
                validate: validate_country,
                write: |profile, value| profile.country = optional_string(value),
            },
        },
        FieldSpec {
            name: "year_of_birth",
            access: Access::Writable {
                validate: validate_year_of_birth,
                write: |profile, value| {
                    profile.year_of_birth =
                        value.as_i64().and_then(|year| i32::try_from(year).ok())
                },
            },
        },
        FieldSpec {
            name: "goals",
            access: Access::Writable {
                validate: |value, _| text(value, None),
                write: |profile, value| profile.goals = optional_string(value),
            },
        },
        FieldSpec {
            name: "mailing_address",
            access: Access::Writable {
                validate: |value, _| text(value, None),
                write: |profile, value| {
                    profile.mailing_address = optional_string(value)
                },
            },
        },
        FieldSpec {
            name: "bio",
            access: Access::Writable {
                validate: |value, _| text(value, Some(BIO_MAX_LENGTH)),
                write: |profile, value| profile.bio = optional_string(value),
            },
        },
        FieldSpec {
            name: "language_proficiencies",
            access: Access::Writable {
                validate: validate_language_proficiencies,
                write: |profile, value| {
                    profile.language_proficiencies = language_codes(value)
                        .into_iter()
                        .map(|code| LanguageProficiency {
                            code: code.to_owned(),
                        })
                        .collect()
                },
            },
        },
        FieldSpec {
            name: "profile_image",
            access: Access::ReadOnly,
        },
        FieldSpec {
            name: "requires_parental_consent",
            access: Access::ReadOnly,
        },
    ],
};

fn optional_string(value: &Value) -> Option<String> {
    value.as_str().map(ToOwned::to_owned)
}

fn text(value: &Value, max: Option<usize>) -> Result<(), String> {
    match value {
        Value::Null => Ok(()),
        Value::String(text) => match max {
            Some(max) if text.chars().count() > max => Err(format!(
                "Ensure this field has no more than {max} characters."
            )),
            _ => Ok(()),
        },
        _ => Err("Not a valid string.".to_owned()),
    }
}

fn choice(value: &Value, choices: &[&str]) -> Result<(), String> {
    match value {
        Value::Null => Ok(()),
        Value::String(choice) if choices.contains(&choice.as_str()) => Ok(()),
        other => Err(format!("\"{}\" is not a valid choice.", display(other))),
    }
}

fn validate_name(value: &Value, _: DateTime<Utc>) -> Result<(), String> {
    let Some(name) = value.as_str() else {
        return Err("Not a valid string.".to_owned());
    };

    let length = name.trim().chars().count();
    if length < NAME_MIN_LENGTH {
        return Err(format!(
            "The name field must be at least {NAME_MIN_LENGTH} characters long."
        ));
    }
    if length > NAME_MAX_LENGTH {
        return Err(format!(
            "The name field must be at most {NAME_MAX_LENGTH} characters long."
        ));
    }

    Ok(())
}

fn validate_country(value: &Value, _: DateTime<Utc>) -> Result<(), String> {
    match value {
        Value::Null => Ok(()),
        Value::String(code)
            if code.len() == 2
                && code.chars().all(|c| c.is_ascii_uppercase()) =>
        {
            Ok(())
        },
        other => Err(format!("\"{}\" is not a valid choice.", display(other))),
    }
}

fn validate_year_of_birth(
    value: &Value,
    now: DateTime<Utc>,
) -> Result<(), String> {
    match value {
        Value::Null => Ok(()),
        Value::Number(number) => match number.as_i64() {
            Some(year)
                if (MIN_YEAR_OF_BIRTH..=i64::from(now.year()))
                    .contains(&year) =>
            {
                Ok(())
            },
            _ => Err(format!("\"{number}\" is not a valid year of birth.")),
        },
        _ => Err("A valid integer is required.".to_owned()),
    }
}

fn language_codes(value: &Value) -> Vec<&str> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("code").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

fn validate_language_proficiencies(
    value: &Value,
    _: DateTime<Utc>,
) -> Result<(), String> {
    let Some(items) = value.as_array() else {
        return Err("Expected a list of items.".to_owned());
    };

    let codes = language_codes(value);
    if codes.len() != items.len() || codes.iter().any(|code| code.is_empty())
    {
        return Err("Every language proficiency needs a code.".to_owned());
    }

    let mut seen = std::collections::HashSet::new();
    if !codes.iter().all(|code| seen.insert(*code)) {
        return Err(
            "The language_proficiencies field must consist of unique languages."
                .to_owned(),
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn check(name: &str, value: Value) -> Result<(), FieldError> {
        PROFILE_FIELDS
            .get(name)
            .map(|field| field.check(&value, now()))
            .unwrap_or(Ok(()))
    }

    #[test]
    fn test_read_only_fields() {
        assert!(USER_FIELDS.is_read_only("username"));
        assert!(USER_FIELDS.is_read_only("date_joined"));
        assert!(PROFILE_FIELDS.is_read_only("profile_image"));
        assert!(!PROFILE_FIELDS.is_read_only("bio"));
        assert!(!PROFILE_FIELDS.is_read_only("unknown"));
    }

    #[test]
    fn test_profile_validators() {
        assert!(check("name", json!("Ada Lovelace")).is_ok());
        assert!(check("name", json!("A")).is_err());
        assert!(check("name", Value::Null).is_err());

        assert!(check("gender", json!("f")).is_ok());
        assert!(check("gender", Value::Null).is_ok());
        assert!(check("gender", json!("x")).is_err());

        assert!(check("level_of_education", json!("hs")).is_ok());
        assert!(check("level_of_education", json!("phd")).is_err());

        assert!(check("country", json!("FR")).is_ok());
        assert!(check("country", json!("fr")).is_err());
        assert!(check("country", json!("FRA")).is_err());

        assert!(check("year_of_birth", json!(1990)).is_ok());
        assert!(check("year_of_birth", json!(1850)).is_err());
        assert!(check("year_of_birth", json!(2030)).is_err());
        assert!(check("year_of_birth", json!("1990")).is_err());

        assert!(check("bio", json!("x".repeat(BIO_MAX_LENGTH))).is_ok());
        assert!(check("bio", json!("x".repeat(BIO_MAX_LENGTH + 1))).is_err());
        assert!(check("goals", json!(42)).is_err());
    }

    #[test]
    fn test_language_proficiencies() {
        assert!(
            check(
                "language_proficiencies",
                json!([{"code": "en"}, {"code": "fr"}])
            )
            .is_ok()
        );
        assert!(
            check(
                "language_proficiencies",
                json!([{"code": "en"}, {"code": "en"}])
            )
            .is_err()
        );
        assert!(check("language_proficiencies", json!([{"code": ""}])).is_err());
        assert!(check("language_proficiencies", json!("en")).is_err());
    }

    #[test]
    fn test_error_messages() {
        let err = check("gender", json!("x")).unwrap_err();
        assert_eq!(
            err.developer_message,
            "Value 'x' is not valid for field 'gender': \"x\" is not a valid choice."
        );
        assert_eq!(err.user_message, "\"x\" is not a valid choice.");
    }

    #[test]
    fn test_apply() {
        let mut profile = Profile::empty(1);
        let field = PROFILE_FIELDS.get("language_proficiencies").unwrap();
        field.apply(&mut profile, &json!([{"code": "en"}]));
        assert_eq!(profile.language_proficiencies[0].code, "en");

        let field = PROFILE_FIELDS.get("country").unwrap();
        field.apply(&mut profile, &json!("FR"));
        assert_eq!(profile.country.as_deref(), Some("FR"));
        field.apply(&mut profile, &Value::Null);
        assert_eq!(profile.country, None);
    }

    #[test]
    fn test_apply_trims_name() {
        let padded = format!("  Ada{}", " ".repeat(NAME_MAX_LENGTH));
        assert!(check("name", json!(padded)).is_ok());

        let mut profile = Profile::empty(1);
        let field = PROFILE_FIELDS.get("name").unwrap();
        field.apply(&mut profile, &json!(padded));
        assert_eq!(profile.name, "Ada");
    }
}
