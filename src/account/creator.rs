use serde::Serialize;

use crate::account::AccountService;
use crate::account::validators::{
    validate_email, validate_password, validate_username,
};
use crate::crypto::activation_key;
use crate::error::{AccountError, Result, ToInternal};
use crate::ports::StoreError;
use crate::telemetry::observe;
use crate::user::{NewUser, Profile, Registration};

/// Identity field already used by another account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictField {
    Email,
    Username,
}

/// The store enforces uniqueness; a conflict means a concurrent sign-up won.
fn conflict(err: StoreError) -> AccountError {
    match err {
        StoreError::Conflict(constraint) => {
            tracing::debug!(%constraint, "account creation conflict");
            AccountError::UserAlreadyExists
        },
        err => AccountError::internal(err),
    }
}

impl AccountService {
    /// Create an inactive account and return its activation key.
    ///
    /// The user, its registration and an empty profile are written in one
    /// transaction.
    pub async fn create_account(
        &self,
        username: &str,
        password: &str,
        email: &str,
    ) -> Result<String> {
        let result = self.create(username, password, email).await;
        observe("create_account", &result);
        result
    }

    async fn create(
        &self,
        username: &str,
        password: &str,
        email: &str,
    ) -> Result<String> {
        validate_username(username)?;
        validate_password(password, username)?;
        validate_email(email)?;

        let password = self.crypto.pwd.hash_password(password).catch()?;

        let mut tx = self.begin().await?;
        let user = tx
            .insert_user(&NewUser {
                username: username.to_owned(),
                email: email.to_owned(),
                password,
                is_active: false,
                date_joined: self.clock.now(),
            })
            .await
            .map_err(conflict)?;

        let key = activation_key();
        tx.insert_registration(&Registration::new(user.id, key.clone()))
            .await
            .map_err(conflict)?;
        tx.insert_profile(&Profile::empty(user.id))
            .await
            .map_err(conflict)?;
        tx.commit().await.map_err(conflict)?;

        tracing::info!(user_id = user.id, "account created");
        Ok(key)
    }

    /// Fields among `username` and `email` already used by an account.
    pub async fn check_account_exists(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Vec<ConflictField>> {
        let result = self.conflicts(username, email).await;
        observe("check_account_exists", &result);
        result
    }

    async fn conflicts(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Vec<ConflictField>> {
        let mut tx = self.begin().await?;
        let mut conflicts = Vec::new();

        if let Some(email) = email {
            if tx.email_exists(email).await.catch()? {
                conflicts.push(ConflictField::Email);
            }
        }

        if let Some(username) = username {
            if tx.username_exists(username).await.catch()? {
                conflicts.push(ConflictField::Username);
            }
        }

        Ok(conflicts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::testing::{Harness, now};

    #[tokio::test]
    async fn test_invalid_input() {
        let harness = Harness::new();

        assert!(matches!(
            harness
                .service
                .create_account("ab", "validpass123", "a@b.com")
                .await,
            Err(AccountError::UsernameInvalid(_))
        ));
        assert!(matches!(
            harness
                .service
                .create_account("gooduser", "gooduser", "a@b.com")
                .await,
            Err(AccountError::PasswordInvalid(_))
        ));
        assert!(matches!(
            harness
                .service
                .create_account("gooduser", "validpass123", "not-an-email")
                .await,
            Err(AccountError::EmailInvalid(_))
        ));

        assert!(harness.find("gooduser").await.is_none());
    }

    #[tokio::test]
    async fn test_create_account() {
        let harness = Harness::new();

        let key = harness
            .service
            .create_account("gooduser", "validpass123", "a@b.com")
            .await
            .unwrap();
        assert!(!key.is_empty());

        let (user, profile) = harness.find("gooduser").await.unwrap();
        assert!(!user.is_active);
        assert_eq!(user.email, "a@b.com");
        assert!(user.password.starts_with("$argon2id$"));
        assert_eq!(user.date_joined, now());
        assert_eq!(profile.unwrap(), Profile::empty(user.id));

        let mut tx = harness.store_tx().await;
        let registration = tx.find_registration(&key).await.unwrap().unwrap();
        assert_eq!(registration.user_id, user.id);
        assert!(!registration.activated);
    }

    #[tokio::test]
    async fn test_duplicate_account() {
        let harness = Harness::new();

        harness
            .service
            .create_account("gooduser", "validpass123", "a@b.com")
            .await
            .unwrap();
        let err = harness
            .service
            .create_account("gooduser", "validpass123", "a@b.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::UserAlreadyExists));

        let err = harness
            .service
            .create_account("otheruser", "validpass123", "a@b.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::UserAlreadyExists));
        assert!(harness.find("otheruser").await.is_none());
    }

    #[tokio::test]
    async fn test_check_account_exists() {
        let harness = Harness::new();

        assert!(
            harness
                .service
                .check_account_exists(Some("x_user"), None)
                .await
                .unwrap()
                .is_empty()
        );

        harness.user("x_user", "x@example.com").await;

        assert_eq!(
            harness
                .service
                .check_account_exists(Some("x_user"), None)
                .await
                .unwrap(),
            vec![ConflictField::Username]
        );
        assert_eq!(
            harness
                .service
                .check_account_exists(Some("x_user"), Some("x@example.com"))
                .await
                .unwrap(),
            vec![ConflictField::Email, ConflictField::Username]
        );
        assert_eq!(
            harness
                .service
                .check_account_exists(Some("free"), Some("free@example.com"))
                .await
                .unwrap(),
            vec![]
        );
    }
}
