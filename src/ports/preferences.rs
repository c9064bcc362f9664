//! User preference port.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::account::Requester;
use crate::error::FieldErrors;
use crate::ports::store::{AccountTransaction, StoreError};
use crate::user::User;

#[derive(Debug, thiserror::Error)]
pub enum PreferenceError {
    #[error("preference validation failed")]
    Validation(FieldErrors),
    #[error("requester cannot change preferences of this user")]
    NotAuthorized,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Port for reading and updating user preferences.
///
/// Writes join the caller's transaction.
#[async_trait]
pub trait PreferenceService: Send + Sync {
    async fn get(
        &self,
        tx: &mut dyn AccountTransaction,
        user: &User,
        key: &str,
    ) -> Result<Option<String>, PreferenceError>;

    /// Apply `updates` to the preferences of `target`. A `null` value removes
    /// the preference.
    async fn update(
        &self,
        tx: &mut dyn AccountTransaction,
        requester: &Requester,
        updates: &Map<String, Value>,
        target: &User,
    ) -> Result<(), PreferenceError>;
}
