//! Interface for email operations.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

/// Variables rendered into a mail template.
pub type MailContext = BTreeMap<String, String>;

/// Mail templates known by the mail renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    /// Activation link for a new account.
    Activation,
    /// Confirmation link sent to a requested new address.
    EmailChangeConfirmation,
    /// Notice sent to both addresses when an email is replaced at once.
    EmailChangeNotice,
    /// Single-use password reset link.
    PasswordReset,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail broker error: {0}")]
    Broker(#[from] lapin::Error),
    #[error("invalid broker address: {0}")]
    Address(String),
    #[error("failed to encode mail event: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("mail rejected: {0}")]
    Rejected(String),
}

/// Port for sending emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send `template` rendered with `context` from `from` to `to`.
    async fn send(
        &self,
        template: Template,
        from: &str,
        to: &str,
        context: &MailContext,
    ) -> Result<(), MailError>;
}
