use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use crate::account::fields::{FieldSpec, PROFILE_FIELDS, USER_FIELDS};
use crate::account::visibility::ACCOUNT_PRIVACY;
use crate::account::{AccountService, Requester, user_and_profile};
use crate::error::{AccountError, FieldError, FieldErrors, Result, ToInternal};
use crate::ports::{
    AccountTransaction, EmailChangeError, MailContext, PreferenceError,
    SettingChanged, StoreError, Template,
};
use crate::telemetry::observe;
use crate::user::{Profile, User};

/// Profile metadata key holding previous names.
pub const NAME_HISTORY_KEY: &str = "old_names";
const MIGRATION_COMPLETED: &str = "completed";
const PROFILE_TABLE: &str = "auth_userprofile";

fn saving_error(err: impl Display) -> AccountError {
    AccountError::update(
        format!("Error thrown when saving account updates: '{err}'"),
        "Your account settings could not be saved.",
    )
}

fn notice_error(address: &str, err: impl Display) -> AccountError {
    AccountError::update(
        format!(
            "Error thrown from sending email change notice to '{address}': '{err}'"
        ),
        format!("Unable to send email change notice to {address}."),
    )
}

/// A store conflict while moving to a new email means someone took it first.
fn forced_update_error(err: StoreError) -> AccountError {
    match err {
        StoreError::Conflict(_) => AccountError::UserAlreadyExists,
        err => saving_error(err),
    }
}

impl AccountService {
    /// Validate then apply `updates` to the account of `username`, the
    /// requester's own account by default.
    ///
    /// Field errors are collected across every key before anything is
    /// written. An `email` key starts the email change workflow once the other
    /// fields are saved.
    pub async fn update_account_settings(
        &self,
        requester: &Requester,
        updates: &Map<String, Value>,
        username: Option<&str>,
        force_email_update: bool,
    ) -> Result<()> {
        let result = self
            .update_account(requester, updates, username, force_email_update)
            .await;
        observe("update_account_settings", &result);
        result
    }

    async fn update_account(
        &self,
        requester: &Requester,
        updates: &Map<String, Value>,
        username: Option<&str>,
        force_email_update: bool,
    ) -> Result<()> {
        let username = username.unwrap_or(&requester.username);
        let now = self.clock.now();
        let mut tx = self.begin().await?;

        let (mut user, profile) = user_and_profile(tx.as_mut(), username).await?;
        let mut profile = profile.ok_or(AccountError::NotFound)?;

        if requester.username != user.username {
            return Err(AccountError::NotAuthorized);
        }

        let mut updates = updates.clone();
        let new_email = updates.remove("email");
        let privacy = updates.remove(ACCOUNT_PRIVACY);
        let old_name = updates
            .contains_key("name")
            .then(|| profile.name.clone());

        let mut errors = FieldErrors::new();
        let mut user_changes: Vec<(&FieldSpec<User>, &Value)> = Vec::new();
        let mut profile_changes: Vec<(&FieldSpec<Profile>, &Value)> =
            Vec::new();

        for (field, value) in &updates {
            if USER_FIELDS.is_read_only(field)
                || PROFILE_FIELDS.is_read_only(field)
            {
                errors.add(field.clone(), FieldError::read_only(field));
            } else if let Some(spec) = USER_FIELDS.get(field) {
                match spec.check(value, now) {
                    Ok(()) => user_changes.push((spec, value)),
                    Err(error) => errors.add(field.clone(), error),
                }
            } else if let Some(spec) = PROFILE_FIELDS.get(field) {
                match spec.check(value, now) {
                    Ok(()) => profile_changes.push((spec, value)),
                    Err(error) => errors.add(field.clone(), error),
                }
            } else {
                tracing::debug!(%field, "ignoring unknown account field");
            }
        }

        let new_email = match new_email {
            None => None,
            Some(Value::String(email)) => {
                match self.email_change.validate(tx.as_mut(), &user, &email).await
                {
                    Ok(()) => {},
                    Err(EmailChangeError::Rejected(message)) => errors.add(
                        "email",
                        FieldError::new(
                            format!(
                                "Error thrown from validate_new_email: '{message}'"
                            ),
                            message,
                        ),
                    ),
                    Err(err) => return Err(AccountError::internal(err)),
                }
                Some(email)
            },
            Some(other) => {
                errors.add(
                    "email",
                    FieldError::new(
                        format!(
                            "Value '{other}' is not valid for field 'email': Not a valid string."
                        ),
                        "Not a valid string.",
                    ),
                );
                None
            },
        };

        if !errors.is_empty() {
            tracing::debug!(
                user_id = user.id,
                fields = errors.len(),
                "account update rejected"
            );
            return Err(AccountError::Validation(errors));
        }

        let old_languages = profile.language_proficiencies.clone();
        let user_changed = !user_changes.is_empty();
        let profile_changed =
            !profile_changes.is_empty() || old_name.is_some();

        for (spec, value) in user_changes {
            spec.apply(&mut user, value);
        }
        for (spec, value) in profile_changes {
            spec.apply(&mut profile, value);
        }
        if let Some(old_name) = old_name.filter(|old| *old != profile.name) {
            record_name_change(&mut profile, old_name, requester, now);
        }

        if user_changed {
            tx.update_user(&user).await.map_err(saving_error)?;
        }
        if profile_changed {
            tx.update_profile(&profile).await.map_err(saving_error)?;
        }

        if let Some(privacy) = privacy {
            let mut preferences = Map::new();
            preferences.insert(ACCOUNT_PRIVACY.to_owned(), privacy);

            // Dropping the transaction discards the field writes above.
            match self
                .preferences
                .update(tx.as_mut(), requester, &preferences, &user)
                .await
            {
                Ok(()) => {},
                Err(PreferenceError::Validation(errors)) => {
                    return Err(AccountError::Validation(errors));
                },
                Err(PreferenceError::NotAuthorized) => {
                    return Err(AccountError::NotAuthorized);
                },
                Err(PreferenceError::Store(err)) => {
                    return Err(saving_error(err));
                },
            }
        }

        tx.commit().await.map_err(saving_error)?;

        if profile.language_proficiencies != old_languages {
            self.events.setting_changed(&SettingChanged {
                user_id: user.id,
                table: PROFILE_TABLE,
                setting: "language_proficiencies",
                old_value: json!(old_languages),
                new_value: json!(profile.language_proficiencies),
            });
        }

        tracing::info!(user_id = user.id, "account settings updated");

        let forced = force_email_update && self.config.enable_msa_migration;
        match new_email {
            Some(new_email) if forced => {
                self.force_email_update(&user, &new_email).await
            },
            Some(new_email) => self.request_email_change(&user, &new_email).await,
            None if forced => self.mark_migration_completed(&user).await,
            None => Ok(()),
        }
    }

    /// Hand the change to the confirmation-link workflow.
    async fn request_email_change(
        &self,
        user: &User,
        new_email: &str,
    ) -> Result<()> {
        let mut tx = self.begin().await?;

        if let Err(err) =
            self.email_change.initiate(tx.as_mut(), user, new_email).await
        {
            let user_message = match &err {
                EmailChangeError::Rejected(message) => message.clone(),
                _ => "Your email change request could not be processed."
                    .to_owned(),
            };
            return Err(AccountError::update(
                format!("Error thrown from do_email_change_request: '{err}'"),
                user_message,
            ));
        }

        tx.commit().await.map_err(saving_error)?;
        tracing::info!(user_id = user.id, "email change requested");
        Ok(())
    }

    /// Replace the email at once, notifying both addresses.
    ///
    /// Runs as one unit of work: any failure drops the transaction, leaving
    /// the email and activation state untouched.
    async fn force_email_update(&self, user: &User, new_email: &str) -> Result<()> {
        let mut tx = self.begin().await?;

        let mut user = tx
            .find_user_by_id(user.id)
            .await
            .catch()?
            .ok_or(AccountError::NotFound)?;

        if tx.email_exists(new_email).await.catch()? {
            return Err(AccountError::UserAlreadyExists);
        }

        let old_email = std::mem::replace(&mut user.email, new_email.to_owned());
        let context = MailContext::from([
            ("username".to_owned(), user.username.clone()),
            ("old_email".to_owned(), old_email.clone()),
            ("new_email".to_owned(), new_email.to_owned()),
            ("platform_name".to_owned(), self.config.name.clone()),
        ]);
        let from = &self.config.email_from_address;

        self.mailer
            .send(Template::EmailChangeNotice, from, &old_email, &context)
            .await
            .map_err(|err| notice_error(&old_email, err))?;

        user.is_active = true;
        tx.update_user(&user).await.map_err(forced_update_error)?;

        self.mailer
            .send(Template::EmailChangeNotice, from, new_email, &context)
            .await
            .map_err(|err| notice_error(new_email, err))?;

        self.set_migration_flag(tx.as_mut(), user.id).await?;
        tx.commit().await.map_err(forced_update_error)?;

        tracing::info!(user_id = user.id, "email replaced without confirmation");
        Ok(())
    }

    async fn mark_migration_completed(&self, user: &User) -> Result<()> {
        let mut tx = self.begin().await?;
        self.set_migration_flag(tx.as_mut(), user.id).await?;
        tx.commit().await.map_err(saving_error)
    }

    async fn set_migration_flag(
        &self,
        tx: &mut dyn AccountTransaction,
        user_id: i64,
    ) -> Result<()> {
        let mut profile = tx
            .find_profile(user_id)
            .await
            .catch()?
            .ok_or(AccountError::NotFound)?;
        profile.meta.insert(
            self.config.msa_migration_status_key.clone(),
            json!(MIGRATION_COMPLETED),
        );
        tx.update_profile(&profile).await.map_err(saving_error)
    }
}

/// Append `[old_name, actor, timestamp]` to the name history.
fn record_name_change(
    profile: &mut Profile,
    old_name: String,
    requester: &Requester,
    now: DateTime<Utc>,
) {
    let entry = json!([
        old_name,
        format!(
            "Name change requested through account API by {}",
            requester.username
        ),
        now.to_rfc3339(),
    ]);

    match profile.meta.get_mut(NAME_HISTORY_KEY) {
        Some(Value::Array(history)) => history.push(entry),
        _ => {
            profile
                .meta
                .insert(NAME_HISTORY_KEY.to_owned(), json!([entry]));
        },
    }
}
