//! Two-phase email change port.

use async_trait::async_trait;

use crate::ports::mailer::MailError;
use crate::ports::store::{AccountTransaction, StoreError};
use crate::user::User;

#[derive(Debug, thiserror::Error)]
pub enum EmailChangeError {
    /// The new address cannot be used. The message is user-facing.
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Port for the confirmation-link email change workflow.
#[async_trait]
pub trait EmailChangeService: Send + Sync {
    /// Check that `user` may move to `new_email`.
    async fn validate(
        &self,
        tx: &mut dyn AccountTransaction,
        user: &User,
        new_email: &str,
    ) -> Result<(), EmailChangeError>;

    /// Record the pending change and send the confirmation link.
    async fn initiate(
        &self,
        tx: &mut dyn AccountTransaction,
        user: &User,
        new_email: &str,
    ) -> Result<(), EmailChangeError>;
}
