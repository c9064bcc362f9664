use crate::account::AccountService;
use crate::error::{AccountError, Result, ToInternal};
use crate::telemetry::observe;

impl AccountService {
    /// Consume `activation_key` and mark its account active.
    ///
    /// Activating an already active account is a no-op. A consumed key never
    /// brings a deactivated account back.
    pub async fn activate_account(&self, activation_key: &str) -> Result<()> {
        let result = self.activate(activation_key).await;
        observe("activate_account", &result);
        result
    }

    async fn activate(&self, activation_key: &str) -> Result<()> {
        let mut tx = self.begin().await?;

        let mut registration = tx
            .find_registration(activation_key)
            .await
            .catch()?
            .ok_or(AccountError::NotAuthorized)?;
        let mut user = tx
            .find_user_by_id(registration.user_id)
            .await
            .catch()?
            .ok_or(AccountError::NotAuthorized)?;

        if registration.activated && !user.is_active {
            tracing::debug!(user_id = user.id, "consumed key for an inactive account");
            return Err(AccountError::NotAuthorized);
        }

        if !registration.activated {
            registration.activated = true;
            tx.update_registration(&registration).await.catch()?;
        }
        if !user.is_active {
            user.is_active = true;
            tx.update_user(&user).await.catch()?;
        }

        tx.commit().await.catch()?;

        tracing::info!(user_id = user.id, "account activated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::testing::Harness;

    #[tokio::test]
    async fn test_unknown_key() {
        let harness = Harness::new();

        let err = harness
            .service
            .activate_account("0123456789abcdef0123456789abcdef")
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::NotAuthorized));
    }

    #[tokio::test]
    async fn test_activate_account() {
        let harness = Harness::new();
        let key = harness
            .service
            .create_account("gooduser", "validpass123", "a@b.com")
            .await
            .unwrap();

        harness.service.activate_account(&key).await.unwrap();

        let (user, _) = harness.find("gooduser").await.unwrap();
        assert!(user.is_active);

        let mut tx = harness.store_tx().await;
        assert!(tx.find_registration(&key).await.unwrap().unwrap().activated);
        drop(tx);

        // Repeating is harmless.
        harness.service.activate_account(&key).await.unwrap();
        let (user, _) = harness.find("gooduser").await.unwrap();
        assert!(user.is_active);
    }

    #[tokio::test]
    async fn test_consumed_key_on_inactive_account() {
        let harness = Harness::new();
        let key = harness
            .service
            .create_account("gooduser", "validpass123", "a@b.com")
            .await
            .unwrap();
        harness.service.activate_account(&key).await.unwrap();

        let (mut user, _) = harness.find("gooduser").await.unwrap();
        user.is_active = false;
        let mut tx = harness.store_tx().await;
        tx.update_user(&user).await.unwrap();
        tx.commit().await.unwrap();

        let err = harness.service.activate_account(&key).await.unwrap_err();
        assert!(matches!(err, AccountError::NotAuthorized));

        let (user, _) = harness.find("gooduser").await.unwrap();
        assert!(!user.is_active);
    }
}
