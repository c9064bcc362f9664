use crate::account::{AccountService, user_and_profile};
use crate::account::discussion::anonymize_discussions;
use crate::crypto::anonymize_username;
use crate::error::{AccountError, Result, ToInternal};
use crate::telemetry::observe;

pub const DELETED_EMAIL_DOMAIN: &str = "deleteduser.com";
pub const DELETED_FIRST_NAME: &str = "first_deleted";
pub const DELETED_LAST_NAME: &str = "last_deleted";

impl AccountService {
    /// Soft-delete the account of `username`.
    ///
    /// The profile, registration and social-auth records are removed and the
    /// identity is overwritten with anonymized values, then the forum history
    /// is scrubbed on a best-effort basis. Not reversible: an account without
    /// a profile is already deleted and yields [`AccountError::NotFound`].
    pub async fn delete_user_account(&self, username: &str) -> Result<bool> {
        let result = self.delete(username).await;
        observe("delete_user_account", &result);
        result
    }

    async fn delete(&self, username: &str) -> Result<bool> {
        let mut tx = self.begin().await?;

        let (mut user, profile) = user_and_profile(tx.as_mut(), username).await?;
        profile.ok_or(AccountError::NotFound)?;

        tx.delete_profile(user.id).await.catch()?;
        if !tx.delete_registration(user.id).await.catch()? {
            tracing::debug!(user_id = user.id, "no registration to delete");
        }

        let links = tx.delete_social_auth_links(user.id).await.catch()?;
        if !tx.delete_social_auth_mapping(user.id).await.catch()? {
            tracing::debug!(user_id = user.id, "no social auth mapping to delete");
        }

        let old_username = std::mem::take(&mut user.username);
        user.username = anonymize_username(&old_username);
        user.email = format!("{}@{DELETED_EMAIL_DOMAIN}", user.username);
        user.first_name = DELETED_FIRST_NAME.to_owned();
        user.last_name = DELETED_LAST_NAME.to_owned();
        user.is_active = false;
        user.is_staff = false;

        tx.update_user(&user).await.catch()?;
        tx.commit().await.catch()?;

        tracing::info!(
            user_id = user.id,
            social_auth_links = links,
            "account deleted"
        );

        match anonymize_discussions(
            self.discussion.as_ref(),
            self.courses.as_ref(),
            &user,
            &old_username,
        )
        .await
        {
            Ok(threads) => {
                tracing::info!(user_id = user.id, threads, "discussions anonymized")
            },
            Err(err) => tracing::warn!(
                user_id = user.id,
                error = %err,
                "failed to anonymize discussions"
            ),
        }

        Ok(true)
    }
}
