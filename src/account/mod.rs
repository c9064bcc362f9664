//! Account management entry points.
//!
//! Every public operation is a method of [`AccountService`], which owns the
//! ports it talks to and the configuration snapshot read on each call.

mod activation;
mod creator;
mod deleter;
pub mod discussion;
pub mod fields;
mod password_reset;
mod reader;
mod updater;
pub mod validators;
pub mod visibility;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use creator::ConflictField;
pub use password_reset::PasswordResetForm;
pub use reader::AccountView;

use crate::config::Configuration;
use crate::crypto::Crypto;
use crate::error::{AccountError, Result, ToInternal};
use crate::ports::{
    AccountStore, AccountTransaction, Clock, CourseCatalog, DiscussionService,
    EmailChangeService, EventEmitter, Mailer, PreferenceService,
};
use crate::user::{Profile, User};

/// Identity on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub username: String,
    pub is_staff: bool,
}

impl Requester {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_staff: false,
        }
    }

    pub fn staff(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_staff: true,
        }
    }
}

/// Outside services an [`AccountService`] depends on.
pub struct Collaborators {
    pub store: Arc<dyn AccountStore>,
    pub preferences: Arc<dyn PreferenceService>,
    pub email_change: Arc<dyn EmailChangeService>,
    pub mailer: Arc<dyn Mailer>,
    pub discussion: Arc<dyn DiscussionService>,
    pub courses: Arc<dyn CourseCatalog>,
    pub events: Arc<dyn EventEmitter>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct AccountService {
    config: Arc<Configuration>,
    crypto: Arc<Crypto>,
    store: Arc<dyn AccountStore>,
    preferences: Arc<dyn PreferenceService>,
    email_change: Arc<dyn EmailChangeService>,
    mailer: Arc<dyn Mailer>,
    discussion: Arc<dyn DiscussionService>,
    courses: Arc<dyn CourseCatalog>,
    events: Arc<dyn EventEmitter>,
    clock: Arc<dyn Clock>,
}

impl AccountService {
    /// Create a new [`AccountService`].
    pub fn new(
        config: Arc<Configuration>,
        crypto: Arc<Crypto>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            config,
            crypto,
            store: collaborators.store,
            preferences: collaborators.preferences,
            email_change: collaborators.email_change,
            mailer: collaborators.mailer,
            discussion: collaborators.discussion,
            courses: collaborators.courses,
            events: collaborators.events,
            clock: collaborators.clock,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn mailer(&self) -> &dyn Mailer {
        self.mailer.as_ref()
    }

    async fn begin(&self) -> Result<Box<dyn AccountTransaction>> {
        self.store.begin().await.catch()
    }
}

/// Find a user by username with its profile, if it still has one.
async fn user_and_profile(
    tx: &mut dyn AccountTransaction,
    username: &str,
) -> Result<(User, Option<Profile>)> {
    let user = tx
        .find_user_by_username(username)
        .await
        .catch()?
        .ok_or(AccountError::NotFound)?;
    let profile = tx.find_profile(user.id).await.catch()?;

    Ok((user, profile))
}
