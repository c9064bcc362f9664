//! Preferences kept in the account store.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::account::Requester;
use crate::account::visibility::{ACCOUNT_PRIVACY, Visibility};
use crate::error::{FieldError, FieldErrors};
use crate::ports::{AccountTransaction, PreferenceError, PreferenceService};
use crate::user::User;

const PREFERENCE_KEY_MAX_LENGTH: usize = 255;

/// Check one preference, returning the value to store (`None` deletes it).
fn check(key: &str, value: &Value) -> Result<Option<String>, FieldError> {
    if key.is_empty() || key.len() > PREFERENCE_KEY_MAX_LENGTH {
        return Err(FieldError::new(
            format!("Preference key '{key}' is not valid"),
            format!("Preference '{key}' is not a valid preference name."),
        ));
    }

    let value = match value {
        Value::Null => return Ok(None),
        Value::String(value) => value,
        other => {
            return Err(FieldError::new(
                format!("Preference '{key}' must be a string, got '{other}'"),
                format!("Value '{other}' is not valid for preference '{key}'."),
            ));
        },
    };

    if key == ACCOUNT_PRIVACY {
        value.parse::<Visibility>().map_err(|message| {
            FieldError::new(
                format!(
                    "Value '{value}' not valid for preference '{key}': {message}"
                ),
                format!("Value '{value}' is not a valid account privacy setting."),
            )
        })?;
    }

    Ok(Some(value.clone()))
}

/// Preference service writing through the caller's transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorePreferences;

#[async_trait]
impl PreferenceService for StorePreferences {
    async fn get(
        &self,
        tx: &mut dyn AccountTransaction,
        user: &User,
        key: &str,
    ) -> Result<Option<String>, PreferenceError> {
        Ok(tx.get_preference(user.id, key).await?)
    }

    async fn update(
        &self,
        tx: &mut dyn AccountTransaction,
        requester: &Requester,
        updates: &Map<String, Value>,
        target: &User,
    ) -> Result<(), PreferenceError> {
        if requester.username != target.username {
            return Err(PreferenceError::NotAuthorized);
        }

        let mut errors = FieldErrors::new();
        let mut changes = Vec::with_capacity(updates.len());
        for (key, value) in updates {
            match check(key, value) {
                Ok(value) => changes.push((key, value)),
                Err(error) => errors.add(key.clone(), error),
            }
        }
        if !errors.is_empty() {
            return Err(PreferenceError::Validation(errors));
        }

        for (key, value) in changes {
            match value {
                Some(value) => tx.set_preference(target.id, key, &value).await?,
                None => tx.delete_preference(target.id, key).await?,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::adapters::MemoryStore;
    use crate::ports::AccountStore;
    use crate::user::NewUser;

    fn updates(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    async fn alice(tx: &mut dyn AccountTransaction) -> User {
        tx.insert_user(&NewUser {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password: "!".into(),
            is_active: true,
            date_joined: crate::account::testing::now(),
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_check() {
        assert_eq!(
            check(ACCOUNT_PRIVACY, &json!("all_users")).unwrap().as_deref(),
            Some("all_users")
        );
        assert_eq!(check(ACCOUNT_PRIVACY, &Value::Null).unwrap(), None);
        assert!(check(ACCOUNT_PRIVACY, &json!("friends")).is_err());
        assert!(check("pref-lang", &json!(12)).is_err());
        assert!(check("", &json!("x")).is_err());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let user = alice(tx.as_mut()).await;
        let requester = Requester::new("alice");

        StorePreferences
            .update(
                tx.as_mut(),
                &requester,
                &updates(json!({"account_privacy": "private", "pref-lang": "fr"})),
                &user,
            )
            .await
            .unwrap();
        assert_eq!(
            StorePreferences
                .get(tx.as_mut(), &user, ACCOUNT_PRIVACY)
                .await
                .unwrap()
                .as_deref(),
            Some("private")
        );

        StorePreferences
            .update(
                tx.as_mut(),
                &requester,
                &updates(json!({"account_privacy": null})),
                &user,
            )
            .await
            .unwrap();
        assert_eq!(
            StorePreferences
                .get(tx.as_mut(), &user, ACCOUNT_PRIVACY)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_other_requester() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let user = alice(tx.as_mut()).await;

        let err = StorePreferences
            .update(
                tx.as_mut(),
                &Requester::staff("admin"),
                &updates(json!({"account_privacy": "private"})),
                &user,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PreferenceError::NotAuthorized));
    }

    #[tokio::test]
    async fn test_invalid_value_writes_nothing() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let user = alice(tx.as_mut()).await;

        let err = StorePreferences
            .update(
                tx.as_mut(),
                &Requester::new("alice"),
                &updates(json!({"pref-lang": "fr", "account_privacy": "friends"})),
                &user,
            )
            .await
            .unwrap_err();

        let PreferenceError::Validation(errors) = err else {
            panic!("expected a validation error");
        };
        assert!(errors.contains(ACCOUNT_PRIVACY));
        assert_eq!(tx.get_preference(user.id, "pref-lang").await.unwrap(), None);
    }
}
