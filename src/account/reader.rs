use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use crate::account::visibility::{
    ACCOUNT_PRIVACY, View, VisibilityConfiguration, profile_visibility,
    visible_fields,
};
use crate::account::{AccountService, Requester};
use crate::error::{AccountError, Result, ToInternal};
use crate::telemetry::observe;
use crate::user::{Profile, User};

const IMAGE_SIZE_FULL: u32 = 500;
const IMAGE_SIZE_SMALL: u32 = 30;

/// Serialized account, restricted to the fields the requester may see.
pub type AccountView = Map<String, Value>;

impl AccountService {
    /// Views of the accounts named by `usernames`, the requester's own
    /// account by default.
    pub async fn get_account_settings(
        &self,
        requester: &Requester,
        usernames: Option<&[String]>,
        configuration: Option<&VisibilityConfiguration>,
        view: View,
    ) -> Result<Vec<AccountView>> {
        let result = self
            .read_accounts(requester, usernames, configuration, view)
            .await;
        observe("get_account_settings", &result);
        result
    }

    async fn read_accounts(
        &self,
        requester: &Requester,
        usernames: Option<&[String]>,
        configuration: Option<&VisibilityConfiguration>,
        view: View,
    ) -> Result<Vec<AccountView>> {
        let usernames = match usernames {
            Some(usernames) if !usernames.is_empty() => usernames.to_vec(),
            _ => vec![requester.username.clone()],
        };
        let configuration =
            configuration.unwrap_or(&self.config.account_visibility);
        let now = self.clock.now();

        let mut tx = self.begin().await?;
        let users = tx.find_users_by_username(&usernames).await.catch()?;
        if users.is_empty() {
            return Err(AccountError::NotFound);
        }

        let mut views = Vec::with_capacity(users.len());
        for user in users {
            let profile = tx.find_profile(user.id).await.catch()?;
            let privacy = self
                .preferences
                .get(tx.as_mut(), &user, ACCOUNT_PRIVACY)
                .await
                .catch()?;
            let visibility = profile_visibility(
                profile.as_ref(),
                privacy.as_deref().and_then(|value| value.parse().ok()),
                configuration,
                now,
            );

            let is_owner_or_staff =
                requester.username == user.username || requester.is_staff;
            let fields = if is_owner_or_staff && view != View::Shared {
                &configuration.admin_fields[..]
            } else {
                visible_fields(visibility, configuration)
            };

            let mut account =
                self.serialize(&user, profile.as_ref(), privacy, now);
            account.retain(|field, _| fields.contains(field));
            views.push(account);
        }

        tracing::debug!(
            requester = %requester.username,
            count = views.len(),
            "account settings read"
        );

        Ok(views)
    }

    fn serialize(
        &self,
        user: &User,
        profile: Option<&Profile>,
        privacy: Option<String>,
        now: DateTime<Utc>,
    ) -> AccountView {
        let mut account = Map::new();
        account.insert("username".into(), json!(user.username));
        account.insert("email".into(), json!(user.email));
        account.insert("date_joined".into(), json!(user.date_joined));
        account.insert("is_active".into(), json!(user.is_active));
        account.insert(
            "profile_image".into(),
            self.profile_image(user, profile),
        );
        account.insert(ACCOUNT_PRIVACY.into(), json!(privacy));

        match profile {
            Some(profile) => {
                account.insert("name".into(), json!(profile.name));
                account.insert("bio".into(), json!(profile.bio));
                account.insert("country".into(), json!(profile.country));
                account.insert("gender".into(), json!(profile.gender));
                account.insert("goals".into(), json!(profile.goals));
                account.insert(
                    "level_of_education".into(),
                    json!(profile.level_of_education),
                );
                account.insert(
                    "mailing_address".into(),
                    json!(profile.mailing_address),
                );
                account.insert(
                    "year_of_birth".into(),
                    json!(profile.year_of_birth),
                );
                account.insert(
                    "language_proficiencies".into(),
                    json!(profile.language_proficiencies),
                );
                account.insert(
                    "requires_parental_consent".into(),
                    json!(profile.requires_parental_consent(now)),
                );
            },
            None => {
                for field in [
                    "name",
                    "bio",
                    "country",
                    "gender",
                    "goals",
                    "level_of_education",
                    "mailing_address",
                    "year_of_birth",
                    "language_proficiencies",
                    "requires_parental_consent",
                ] {
                    account.insert(field.into(), Value::Null);
                }
            },
        }

        account
    }

    fn profile_image(&self, user: &User, profile: Option<&Profile>) -> Value {
        let base = if self.config.url.is_empty() {
            "/".to_owned()
        } else {
            self.config.url.clone()
        };

        match profile.and_then(|profile| profile.profile_image_uploaded_at) {
            Some(uploaded_at) => {
                let version = uploaded_at.timestamp();
                json!({
                    "has_image": true,
                    "image_url_full": format!("{base}media/profile-images/{}_{IMAGE_SIZE_FULL}.jpg?v={version}", user.username),
                    "image_url_small": format!("{base}media/profile-images/{}_{IMAGE_SIZE_SMALL}.jpg?v={version}", user.username),
                })
            },
            None => json!({
                "has_image": false,
                "image_url_full": format!("{base}static/images/profiles/default_{IMAGE_SIZE_FULL}.png"),
                "image_url_small": format!("{base}static/images/profiles/default_{IMAGE_SIZE_SMALL}.png"),
            }),
        }
    }
}
