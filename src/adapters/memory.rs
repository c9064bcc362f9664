//! In-memory account store.
//!
//! A transaction holds the store lock for its whole lifetime and works on a
//! copy of the tables, which replaces the shared tables on commit.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::ports::{AccountStore, AccountTransaction, StoreError, StoreResult};
use crate::user::{NewUser, PendingEmailChange, Profile, Registration, User};

#[derive(Debug, Clone, Default)]
struct Tables {
    last_id: i64,
    users: BTreeMap<i64, User>,
    profiles: BTreeMap<i64, Profile>,
    registrations: BTreeMap<String, Registration>,
    social_auth_links: Vec<(i64, String)>,
    social_auth_mappings: BTreeMap<i64, String>,
    preferences: BTreeMap<(i64, String), String>,
    pending_email_changes: BTreeMap<i64, PendingEmailChange>,
}

impl Tables {
    /// Reject `username` or `email` already used by another user than `id`.
    fn check_unique(
        &self,
        id: Option<i64>,
        username: &str,
        email: &str,
    ) -> StoreResult<()> {
        for user in self.users.values().filter(|user| Some(user.id) != id) {
            if user.username == username {
                return Err(StoreError::Conflict("auth_user_username_key".into()));
            }
            if user.email == email {
                return Err(StoreError::Conflict("auth_user_email_key".into()));
            }
        }
        Ok(())
    }
}

/// Account store kept in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl MemoryStore {
    pub async fn pending_email_change(
        &self,
        user_id: i64,
    ) -> Option<PendingEmailChange> {
        self.tables
            .lock()
            .await
            .pending_email_changes
            .get(&user_id)
            .cloned()
    }

    pub async fn link_social_auth(&self, user_id: i64, provider: &str) {
        self.tables
            .lock()
            .await
            .social_auth_links
            .push((user_id, provider.to_owned()));
    }

    pub async fn map_social_auth(&self, user_id: i64, provider_id: &str) {
        self.tables
            .lock()
            .await
            .social_auth_mappings
            .insert(user_id, provider_id.to_owned());
    }

    pub async fn social_auth_links(&self, user_id: i64) -> usize {
        self.tables
            .lock()
            .await
            .social_auth_links
            .iter()
            .filter(|(id, _)| *id == user_id)
            .count()
    }

    pub async fn has_social_auth_mapping(&self, user_id: i64) -> bool {
        self.tables
            .lock()
            .await
            .social_auth_mappings
            .contains_key(&user_id)
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn AccountTransaction>> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();

        Ok(Box::new(MemoryTransaction { guard, working }))
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl AccountTransaction for MemoryTransaction {
    async fn find_user_by_id(&mut self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn find_user_by_username(
        &mut self,
        username: &str,
    ) -> StoreResult<Option<User>> {
        Ok(self
            .working
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn find_users_by_username(
        &mut self,
        usernames: &[String],
    ) -> StoreResult<Vec<User>> {
        Ok(self
            .working
            .users
            .values()
            .filter(|user| usernames.contains(&user.username))
            .cloned()
            .collect())
    }

    async fn find_users_by_email(
        &mut self,
        email: &str,
    ) -> StoreResult<Vec<User>> {
        let email = email.to_lowercase();
        Ok(self
            .working
            .users
            .values()
            .filter(|user| user.email.to_lowercase() == email)
            .cloned()
            .collect())
    }

    async fn email_exists(&mut self, email: &str) -> StoreResult<bool> {
        Ok(self.working.users.values().any(|user| user.email == email))
    }

    async fn username_exists(&mut self, username: &str) -> StoreResult<bool> {
        Ok(self
            .working
            .users
            .values()
            .any(|user| user.username == username))
    }

    async fn insert_user(&mut self, user: &NewUser) -> StoreResult<User> {
        self.working.check_unique(None, &user.username, &user.email)?;

        self.working.last_id += 1;
        let user = User {
            id: self.working.last_id,
            username: user.username.clone(),
            email: user.email.clone(),
            password: user.password.clone(),
            is_active: user.is_active,
            date_joined: user.date_joined,
            ..Default::default()
        };
        self.working.users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn update_user(&mut self, user: &User) -> StoreResult<()> {
        self.working
            .check_unique(Some(user.id), &user.username, &user.email)?;

        if let Some(stored) = self.working.users.get_mut(&user.id) {
            *stored = user.clone();
        }
        Ok(())
    }

    async fn find_profile(
        &mut self,
        user_id: i64,
    ) -> StoreResult<Option<Profile>> {
        Ok(self.working.profiles.get(&user_id).cloned())
    }

    async fn insert_profile(&mut self, profile: &Profile) -> StoreResult<()> {
        if self.working.profiles.contains_key(&profile.user_id) {
            return Err(StoreError::Conflict("auth_userprofile_pkey".into()));
        }
        self.working.profiles.insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn update_profile(&mut self, profile: &Profile) -> StoreResult<()> {
        if let Some(stored) = self.working.profiles.get_mut(&profile.user_id) {
            *stored = profile.clone();
        }
        Ok(())
    }

    async fn delete_profile(&mut self, user_id: i64) -> StoreResult<bool> {
        Ok(self.working.profiles.remove(&user_id).is_some())
    }

    async fn insert_registration(
        &mut self,
        registration: &Registration,
    ) -> StoreResult<()> {
        if self
            .working
            .registrations
            .contains_key(&registration.activation_key)
        {
            return Err(StoreError::Conflict(
                "auth_registration_activation_key_key".into(),
            ));
        }
        self.working
            .registrations
            .insert(registration.activation_key.clone(), registration.clone());
        Ok(())
    }

    async fn find_registration(
        &mut self,
        activation_key: &str,
    ) -> StoreResult<Option<Registration>> {
        Ok(self.working.registrations.get(activation_key).cloned())
    }

    async fn update_registration(
        &mut self,
        registration: &Registration,
    ) -> StoreResult<()> {
        if let Some(stored) = self
            .working
            .registrations
            .get_mut(&registration.activation_key)
        {
            *stored = registration.clone();
        }
        Ok(())
    }

    async fn delete_registration(&mut self, user_id: i64) -> StoreResult<bool> {
        let before = self.working.registrations.len();
        self.working
            .registrations
            .retain(|_, registration| registration.user_id != user_id);

        Ok(self.working.registrations.len() < before)
    }

    async fn delete_social_auth_links(
        &mut self,
        user_id: i64,
    ) -> StoreResult<u64> {
        let before = self.working.social_auth_links.len();
        self.working
            .social_auth_links
            .retain(|(id, _)| *id != user_id);

        Ok((before - self.working.social_auth_links.len()) as u64)
    }

    async fn delete_social_auth_mapping(
        &mut self,
        user_id: i64,
    ) -> StoreResult<bool> {
        Ok(self.working.social_auth_mappings.remove(&user_id).is_some())
    }

    async fn get_preference(
        &mut self,
        user_id: i64,
        key: &str,
    ) -> StoreResult<Option<String>> {
        Ok(self
            .working
            .preferences
            .get(&(user_id, key.to_owned()))
            .cloned())
    }

    async fn set_preference(
        &mut self,
        user_id: i64,
        key: &str,
        value: &str,
    ) -> StoreResult<()> {
        self.working
            .preferences
            .insert((user_id, key.to_owned()), value.to_owned());
        Ok(())
    }

    async fn delete_preference(
        &mut self,
        user_id: i64,
        key: &str,
    ) -> StoreResult<()> {
        self.working.preferences.remove(&(user_id, key.to_owned()));
        Ok(())
    }

    async fn upsert_pending_email_change(
        &mut self,
        change: &PendingEmailChange,
    ) -> StoreResult<()> {
        self.working
            .pending_email_changes
            .insert(change.user_id, change.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
