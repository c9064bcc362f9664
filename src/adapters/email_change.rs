//! Confirmation-link email change.
//!
//! The new address only replaces the current one once its owner follows the
//! link sent to it; until then the change stays pending.

use std::sync::Arc;

use async_trait::async_trait;

use crate::account::validators::validate_email;
use crate::config::Configuration;
use crate::crypto::activation_key;
use crate::ports::{
    AccountTransaction, EmailChangeError, EmailChangeService, MailContext,
    Mailer, Template,
};
use crate::user::{PendingEmailChange, User};

const SAME_EMAIL: &str = "Old email is the same as the new email.";
const INVALID_EMAIL: &str = "Valid e-mail address required.";
const EMAIL_TAKEN: &str = "An account with this e-mail already exists.";

pub struct ConfirmationEmailChange {
    config: Arc<Configuration>,
    mailer: Arc<dyn Mailer>,
}

impl ConfirmationEmailChange {
    pub fn new(config: Arc<Configuration>, mailer: Arc<dyn Mailer>) -> Self {
        Self { config, mailer }
    }

    fn confirmation_link(&self, key: &str) -> String {
        let protocol = if self.config.is_secure() { "https" } else { "http" };
        format!("{protocol}://{}/email_confirm/{key}", self.config.domain())
    }
}

#[async_trait]
impl EmailChangeService for ConfirmationEmailChange {
    async fn validate(
        &self,
        tx: &mut dyn AccountTransaction,
        user: &User,
        new_email: &str,
    ) -> Result<(), EmailChangeError> {
        if user.email == new_email {
            return Err(EmailChangeError::Rejected(SAME_EMAIL.to_owned()));
        }
        if validate_email(new_email).is_err() {
            return Err(EmailChangeError::Rejected(INVALID_EMAIL.to_owned()));
        }
        if tx.email_exists(new_email).await? {
            return Err(EmailChangeError::Rejected(EMAIL_TAKEN.to_owned()));
        }

        Ok(())
    }

    async fn initiate(
        &self,
        tx: &mut dyn AccountTransaction,
        user: &User,
        new_email: &str,
    ) -> Result<(), EmailChangeError> {
        self.validate(tx, user, new_email).await?;

        let change = PendingEmailChange {
            user_id: user.id,
            new_email: new_email.to_owned(),
            activation_key: activation_key(),
        };
        tx.upsert_pending_email_change(&change).await?;

        let context = MailContext::from([
            ("key".to_owned(), change.activation_key.clone()),
            ("old_email".to_owned(), user.email.clone()),
            ("new_email".to_owned(), change.new_email.clone()),
            ("site_name".to_owned(), self.config.name.clone()),
            (
                "confirm_link".to_owned(),
                self.confirmation_link(&change.activation_key),
            ),
        ]);
        self.mailer
            .send(
                Template::EmailChangeConfirmation,
                &self.config.email_from_address,
                new_email,
                &context,
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::testing::RecordingMailer;
    use crate::adapters::MemoryStore;
    use crate::ports::AccountStore;
    use crate::user::NewUser;

    async fn setup() -> (MemoryStore, Arc<RecordingMailer>, ConfirmationEmailChange, User)
    {
        let store = MemoryStore::new();
        let mailer = Arc::new(RecordingMailer::default());
        let mut config = Configuration::default();
        config.url = "https://learn.example.com/".into();
        let service = ConfirmationEmailChange::new(Arc::new(config), mailer.clone());

        let mut tx = store.begin().await.unwrap();
        let user = tx
            .insert_user(&NewUser {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password: "!".into(),
                is_active: true,
                date_joined: crate::account::testing::now(),
            })
            .await
            .unwrap();
        tx.insert_user(&NewUser {
            username: "bob".into(),
            email: "bob@example.com".into(),
            password: "!".into(),
            is_active: true,
            date_joined: crate::account::testing::now(),
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        (store, mailer, service, user)
    }

    fn rejection(result: Result<(), EmailChangeError>) -> String {
        match result {
            Err(EmailChangeError::Rejected(message)) => message,
            other => panic!("expected a rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_validate() {
        let (store, _, service, user) = setup().await;
        let mut tx = store.begin().await.unwrap();

        assert_eq!(
            rejection(service.validate(tx.as_mut(), &user, "alice@example.com").await),
            SAME_EMAIL
        );
        assert_eq!(
            rejection(service.validate(tx.as_mut(), &user, "not-an-email").await),
            INVALID_EMAIL
        );
        assert_eq!(
            rejection(service.validate(tx.as_mut(), &user, "bob@example.com").await),
            EMAIL_TAKEN
        );
        service
            .validate(tx.as_mut(), &user, "alice@new.example.com")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_initiate() {
        let (store, mailer, service, user) = setup().await;
        let mut tx = store.begin().await.unwrap();

        service
            .initiate(tx.as_mut(), &user, "alice@new.example.com")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let pending = store.pending_email_change(user.id).await.unwrap();
        assert_eq!(pending.new_email, "alice@new.example.com");
        assert_eq!(pending.activation_key.len(), 32);

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "alice@new.example.com");
        assert_eq!(
            sent[0].context["confirm_link"],
            format!("https://learn.example.com/email_confirm/{}", pending.activation_key)
        );
    }
}
