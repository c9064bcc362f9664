//! Account store port.
//!
//! Every read and write goes through an [`AccountTransaction`]. Dropping a
//! transaction without calling [`AccountTransaction::commit`] discards its
//! writes.

use async_trait::async_trait;

use crate::user::{NewUser, PendingEmailChange, Profile, Registration, User};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by account store adapters.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated on `{0}`")]
    Conflict(String),
    #[error("SQL request failed: {0}")]
    Sql(sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return StoreError::Conflict(
                    db_err.constraint().unwrap_or("unique").to_owned(),
                );
            }
        }
        StoreError::Sql(err)
    }
}

/// Port for opening units of work on the account store.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Start a new transaction.
    async fn begin(&self) -> StoreResult<Box<dyn AccountTransaction>>;
}

/// A unit of work on user, profile, registration and linked records.
#[async_trait]
pub trait AccountTransaction: Send {
    async fn find_user_by_id(&mut self, id: i64) -> StoreResult<Option<User>>;

    async fn find_user_by_username(
        &mut self,
        username: &str,
    ) -> StoreResult<Option<User>>;

    /// Users whose username is in `usernames`, ordered by id.
    async fn find_users_by_username(
        &mut self,
        usernames: &[String],
    ) -> StoreResult<Vec<User>>;

    /// Users whose email matches `email`, ignoring case.
    async fn find_users_by_email(
        &mut self,
        email: &str,
    ) -> StoreResult<Vec<User>>;

    /// Whether an account uses exactly `email`.
    async fn email_exists(&mut self, email: &str) -> StoreResult<bool>;

    /// Whether an account uses exactly `username`.
    async fn username_exists(&mut self, username: &str) -> StoreResult<bool>;

    /// Insert a user. A taken username or email yields
    /// [`StoreError::Conflict`].
    async fn insert_user(&mut self, user: &NewUser) -> StoreResult<User>;

    async fn update_user(&mut self, user: &User) -> StoreResult<()>;

    async fn find_profile(
        &mut self,
        user_id: i64,
    ) -> StoreResult<Option<Profile>>;

    async fn insert_profile(&mut self, profile: &Profile) -> StoreResult<()>;

    async fn update_profile(&mut self, profile: &Profile) -> StoreResult<()>;

    /// Returns `false` when there was no profile to delete.
    async fn delete_profile(&mut self, user_id: i64) -> StoreResult<bool>;

    async fn insert_registration(
        &mut self,
        registration: &Registration,
    ) -> StoreResult<()>;

    async fn find_registration(
        &mut self,
        activation_key: &str,
    ) -> StoreResult<Option<Registration>>;

    async fn update_registration(
        &mut self,
        registration: &Registration,
    ) -> StoreResult<()>;

    /// Returns `false` when the user had no registration.
    async fn delete_registration(&mut self, user_id: i64) -> StoreResult<bool>;

    /// Delete every social-auth link of a user, returning how many existed.
    async fn delete_social_auth_links(
        &mut self,
        user_id: i64,
    ) -> StoreResult<u64>;

    /// Returns `false` when the user had no provider mapping.
    async fn delete_social_auth_mapping(
        &mut self,
        user_id: i64,
    ) -> StoreResult<bool>;

    async fn get_preference(
        &mut self,
        user_id: i64,
        key: &str,
    ) -> StoreResult<Option<String>>;

    async fn set_preference(
        &mut self,
        user_id: i64,
        key: &str,
        value: &str,
    ) -> StoreResult<()>;

    async fn delete_preference(
        &mut self,
        user_id: i64,
        key: &str,
    ) -> StoreResult<()>;

    /// Replace the pending email change of a user.
    async fn upsert_pending_email_change(
        &mut self,
        change: &PendingEmailChange,
    ) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
