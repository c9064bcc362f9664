use crate::account::AccountService;
use crate::crypto::to_base36;
use crate::error::{AccountError, Result, ToInternal};
use crate::ports::{AccountTransaction, MailContext, Template};
use crate::telemetry::observe;
use crate::user::User;

/// Password reset request bound to an email address.
#[derive(Debug, Clone)]
pub struct PasswordResetForm {
    email: String,
    users: Vec<User>,
}

impl PasswordResetForm {
    /// Bind the form to `email`, loading every account using it.
    pub async fn bind(
        tx: &mut dyn AccountTransaction,
        email: &str,
    ) -> Result<Self> {
        let users = tx.find_users_by_email(email).await.catch()?;

        Ok(Self {
            email: email.to_owned(),
            users,
        })
    }

    /// An address is valid when it belongs to at least one account and none
    /// of those accounts has an unusable password.
    pub fn is_valid(&self) -> bool {
        !self.users.is_empty()
            && self.users.iter().all(User::has_usable_password)
    }

    /// Send one reset link per matching account.
    async fn save(&self, service: &AccountService, is_secure: bool) -> Result<()> {
        let protocol = if is_secure { "https" } else { "http" };
        let domain = service.config.domain();
        let now = service.clock.now();

        for user in &self.users {
            let uid = to_base36(user.id.max(0) as u64);
            let token = service.crypto.reset.make_token(user, now).catch()?;
            let link = format!(
                "{protocol}://{domain}/password_reset_confirm/{uid}-{token}/"
            );

            let context = MailContext::from([
                ("email".to_owned(), user.email.clone()),
                ("domain".to_owned(), domain.clone()),
                ("site_name".to_owned(), service.config.name.clone()),
                ("uid".to_owned(), uid),
                ("token".to_owned(), token),
                ("protocol".to_owned(), protocol.to_owned()),
                ("reset_link".to_owned(), link),
                ("username".to_owned(), user.username.clone()),
            ]);

            service
                .mailer
                .send(
                    Template::PasswordReset,
                    &service.config.email_from_address,
                    &self.email,
                    &context,
                )
                .await
                .catch()?;

            tracing::info!(user_id = user.id, "password reset link sent");
        }

        Ok(())
    }
}

impl AccountService {
    /// Email a password reset link to the accounts using `email`.
    pub async fn request_password_change(
        &self,
        email: &str,
        is_secure: bool,
    ) -> Result<()> {
        let result = self.reset_password(email, is_secure).await;
        observe("request_password_change", &result);
        result
    }

    async fn reset_password(&self, email: &str, is_secure: bool) -> Result<()> {
        let form = {
            let mut tx = self.begin().await?;
            PasswordResetForm::bind(tx.as_mut(), email).await?
        };

        if !form.is_valid() {
            return Err(AccountError::NotFound);
        }

        form.save(self, is_secure).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::testing::{Harness, now};
    use crate::config::Configuration;

    fn config() -> Configuration {
        let mut config = Configuration::default();
        config.name = "Learning".into();
        config.url = "https://learn.example.com/".into();
        config.email_from_address = "no-reply@learn.example.com".into();
        config
    }

    #[tokio::test]
    async fn test_reset_link() {
        let harness = Harness::with_config(config());
        let alice = harness.user("alice", "alice@example.com").await;

        harness
            .service
            .request_password_change("Alice@Example.com", true)
            .await
            .unwrap();

        let sent = harness.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template, Template::PasswordReset);
        assert_eq!(sent[0].from, "no-reply@learn.example.com");

        let context = &sent[0].context;
        assert_eq!(context["uid"], to_base36(alice.id as u64));
        assert!(context["reset_link"].starts_with(
            "https://learn.example.com/password_reset_confirm/"
        ));
        assert_eq!(
            context["token"],
            harness.service.crypto.reset.make_token(&alice, now()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_insecure_link() {
        let harness = Harness::with_config(config());
        harness.user("alice", "alice@example.com").await;

        harness
            .service
            .request_password_change("alice@example.com", false)
            .await
            .unwrap();

        assert_eq!(harness.mailer.sent()[0].context["protocol"], "http");
    }

    #[tokio::test]
    async fn test_unknown_email() {
        let harness = Harness::new();

        let err = harness
            .service
            .request_password_change("nobody@example.com", true)
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::NotFound));
        assert!(harness.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unusable_password() {
        let harness = Harness::new();
        let alice = harness.user("alice", "alice@example.com").await;
        {
            let mut tx = harness.store_tx().await;
            let mut user = tx.find_user_by_id(alice.id).await.unwrap().unwrap();
            user.password = "!disabled".into();
            tx.update_user(&user).await.unwrap();
            tx.commit().await.unwrap();
        }

        let err = harness
            .service
            .request_password_change("alice@example.com", true)
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::NotFound));
    }
}
