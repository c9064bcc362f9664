//! PostgreSQL implementation of the account store.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use crate::ports::{AccountStore, AccountTransaction, StoreResult};
use crate::user::{NewUser, PendingEmailChange, Profile, Registration, User};

const USER_COLUMNS: &str = r#"
    id, username, email, password, first_name, last_name,
    is_active, is_staff, date_joined
"#;

const PROFILE_COLUMNS: &str = r#"
    user_id, name, meta, gender, year_of_birth, level_of_education,
    country, goals, mailing_address, bio, profile_image_uploaded_at,
    language_proficiencies
"#;

/// PostgreSQL account store.
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    /// Create a new [`PgAccountStore`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn begin(&self) -> StoreResult<Box<dyn AccountTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgAccountTransaction { tx }))
    }
}

pub struct PgAccountTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl AccountTransaction for PgAccountTransaction {
    async fn find_user_by_id(&mut self, id: i64) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM auth_user WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn find_user_by_username(
        &mut self,
        username: &str,
    ) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM auth_user WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn find_users_by_username(
        &mut self,
        usernames: &[String],
    ) -> StoreResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM auth_user WHERE username = ANY($1) ORDER BY id"
        ))
        .bind(usernames)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(users)
    }

    async fn find_users_by_email(
        &mut self,
        email: &str,
    ) -> StoreResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM auth_user WHERE LOWER(email) = LOWER($1) ORDER BY id"
        ))
        .bind(email)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(users)
    }

    async fn email_exists(&mut self, email: &str) -> StoreResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM auth_user WHERE email = $1)",
        )
        .bind(email)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(exists)
    }

    async fn username_exists(&mut self, username: &str) -> StoreResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM auth_user WHERE username = $1)",
        )
        .bind(username)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(exists)
    }

    async fn insert_user(&mut self, user: &NewUser) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO auth_user (username, email, password, is_active, date_joined)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password)
        .bind(user.is_active)
        .bind(user.date_joined)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn update_user(&mut self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE auth_user
            SET
                username = $2,
                email = $3,
                password = $4,
                first_name = $5,
                last_name = $6,
                is_active = $7,
                is_staff = $8
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_active)
        .bind(user.is_staff)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_profile(
        &mut self,
        user_id: i64,
    ) -> StoreResult<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM auth_userprofile WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(profile)
    }

    async fn insert_profile(&mut self, profile: &Profile) -> StoreResult<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO auth_userprofile ({PROFILE_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#
        ))
        .bind(profile.user_id)
        .bind(&profile.name)
        .bind(Json(&profile.meta))
        .bind(&profile.gender)
        .bind(profile.year_of_birth)
        .bind(&profile.level_of_education)
        .bind(&profile.country)
        .bind(&profile.goals)
        .bind(&profile.mailing_address)
        .bind(&profile.bio)
        .bind(profile.profile_image_uploaded_at)
        .bind(Json(&profile.language_proficiencies))
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_profile(&mut self, profile: &Profile) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE auth_userprofile
            SET
                name = $2,
                meta = $3,
                gender = $4,
                year_of_birth = $5,
                level_of_education = $6,
                country = $7,
                goals = $8,
                mailing_address = $9,
                bio = $10,
                profile_image_uploaded_at = $11,
                language_proficiencies = $12
            WHERE user_id = $1
            "#,
        )
        .bind(profile.user_id)
        .bind(&profile.name)
        .bind(Json(&profile.meta))
        .bind(&profile.gender)
        .bind(profile.year_of_birth)
        .bind(&profile.level_of_education)
        .bind(&profile.country)
        .bind(&profile.goals)
        .bind(&profile.mailing_address)
        .bind(&profile.bio)
        .bind(profile.profile_image_uploaded_at)
        .bind(Json(&profile.language_proficiencies))
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn delete_profile(&mut self, user_id: i64) -> StoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM auth_userprofile WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *self.tx)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_registration(
        &mut self,
        registration: &Registration,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO auth_registration (user_id, activation_key, activated)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(registration.user_id)
        .bind(&registration.activation_key)
        .bind(registration.activated)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_registration(
        &mut self,
        activation_key: &str,
    ) -> StoreResult<Option<Registration>> {
        let registration = sqlx::query_as::<_, Registration>(
            r#"
            SELECT user_id, activation_key, activated
            FROM auth_registration
            WHERE activation_key = $1
            "#,
        )
        .bind(activation_key)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(registration)
    }

    async fn update_registration(
        &mut self,
        registration: &Registration,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE auth_registration SET activated = $2 WHERE activation_key = $1",
        )
        .bind(&registration.activation_key)
        .bind(registration.activated)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn delete_registration(&mut self, user_id: i64) -> StoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM auth_registration WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *self.tx)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_social_auth_links(
        &mut self,
        user_id: i64,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM social_auth_usersocialauth WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_social_auth_mapping(
        &mut self,
        user_id: i64,
    ) -> StoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM social_auth_mapping WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *self.tx)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_preference(
        &mut self,
        user_id: i64,
        key: &str,
    ) -> StoreResult<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM user_preferences WHERE user_id = $1 AND key = $2",
        )
        .bind(user_id)
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(value)
    }

    async fn set_preference(
        &mut self,
        user_id: i64,
        key: &str,
        value: &str,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, key, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(user_id)
        .bind(key)
        .bind(value)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn delete_preference(
        &mut self,
        user_id: i64,
        key: &str,
    ) -> StoreResult<()> {
        sqlx::query(
            "DELETE FROM user_preferences WHERE user_id = $1 AND key = $2",
        )
        .bind(user_id)
        .bind(key)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn upsert_pending_email_change(
        &mut self,
        change: &PendingEmailChange,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pending_email_changes (user_id, new_email, activation_key)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET new_email = EXCLUDED.new_email,
                activation_key = EXCLUDED.activation_key
            "#,
        )
        .bind(change.user_id)
        .bind(&change.new_email)
        .bind(&change.activation_key)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Map, Value, json};

    use super::*;
    use crate::account::Requester;
    use crate::account::testing::{now, service};
    use crate::account::visibility::ACCOUNT_PRIVACY;
    use crate::error::AccountError;

    /// User inserted by the `accounts.sql` fixture.
    const ALICE: i64 = 1;

    fn updates(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    async fn user(store: &PgAccountStore, id: i64) -> User {
        let mut tx = store.begin().await.unwrap();
        tx.find_user_by_id(id).await.unwrap().unwrap()
    }

    #[sqlx::test]
    async fn test_create_and_activate(pool: PgPool) {
        let store = Arc::new(PgAccountStore::new(pool));
        let service = service(store.clone());

        let key = service
            .create_account("gooduser", "validpass123", "gooduser@example.com")
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        let created = tx.find_user_by_username("gooduser").await.unwrap().unwrap();
        assert!(!created.is_active);
        assert_eq!(created.date_joined, now());
        assert!(created.password.starts_with("$argon2id$"));
        assert_eq!(
            tx.find_profile(created.id).await.unwrap(),
            Some(Profile::empty(created.id))
        );
        let registration = tx.find_registration(&key).await.unwrap().unwrap();
        assert_eq!(registration.user_id, created.id);
        assert!(!registration.activated);
        drop(tx);

        let err = service
            .create_account("gooduser", "validpass123", "other@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::UserAlreadyExists));

        service.activate_account(&key).await.unwrap();
        assert!(user(&store, created.id).await.is_active);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_registration(&key).await.unwrap().unwrap().activated);
    }

    #[sqlx::test(fixtures("../../fixtures/accounts.sql"))]
    async fn test_update_account_settings(pool: PgPool) {
        let store = Arc::new(PgAccountStore::new(pool.clone()));
        let service = service(store.clone());

        service
            .update_account_settings(
                &Requester::new("alice"),
                &updates(json!({
                    "name": "Alice Pleasance",
                    "bio": "Curiouser and curiouser.",
                    "language_proficiencies": [{"code": "en"}],
                    "account_privacy": "all_users",
                    "email": "alice@wonderland.example.com",
                })),
                None,
                false,
            )
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        let profile = tx.find_profile(ALICE).await.unwrap().unwrap();
        assert_eq!(profile.name, "Alice Pleasance");
        assert_eq!(profile.bio.as_deref(), Some("Curiouser and curiouser."));
        assert_eq!(profile.language_proficiencies[0].code, "en");
        assert_eq!(
            profile.meta["old_names"][0][0],
            json!("Alice Liddell")
        );
        assert_eq!(
            tx.get_preference(ALICE, ACCOUNT_PRIVACY)
                .await
                .unwrap()
                .as_deref(),
            Some("all_users")
        );

        // The new address waits for confirmation.
        let current = tx.find_user_by_id(ALICE).await.unwrap().unwrap();
        assert_eq!(current.email, "alice@example.com");
        drop(tx);

        let pending = sqlx::query_scalar::<_, String>(
            "SELECT new_email FROM pending_email_changes WHERE user_id = $1",
        )
        .bind(ALICE)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(pending, "alice@wonderland.example.com");
    }

    #[sqlx::test(fixtures("../../fixtures/accounts.sql"))]
    async fn test_update_rejects_read_only_field(pool: PgPool) {
        let store = Arc::new(PgAccountStore::new(pool));
        let service = service(store.clone());

        let err = service
            .update_account_settings(
                &Requester::new("alice"),
                &updates(json!({"username": "mallory", "bio": "Hello"})),
                None,
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Validation(_)));

        let mut tx = store.begin().await.unwrap();
        let profile = tx.find_profile(ALICE).await.unwrap().unwrap();
        assert_eq!(profile.bio.as_deref(), Some("Down the rabbit hole."));
    }

    #[sqlx::test(fixtures("../../fixtures/accounts.sql"))]
    async fn test_delete_user_account(pool: PgPool) {
        let store = Arc::new(PgAccountStore::new(pool.clone()));
        let service = service(store.clone());

        assert!(service.delete_user_account("alice").await.unwrap());

        let deleted = user(&store, ALICE).await;
        assert_eq!(deleted.username.len(), 32);
        assert_eq!(
            deleted.email,
            format!("{}@deleteduser.com", deleted.username)
        );
        assert_eq!(deleted.first_name, "first_deleted");
        assert_eq!(deleted.last_name, "last_deleted");
        assert!(!deleted.is_active);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_profile(ALICE).await.unwrap().is_none());
        assert!(
            tx.find_registration("0123456789abcdef0123456789abcdef")
                .await
                .unwrap()
                .is_none()
        );
        drop(tx);

        let links = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM social_auth_usersocialauth WHERE user_id = $1",
        )
        .bind(ALICE)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(links, 0);

        let err = service
            .delete_user_account(&deleted.username)
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::NotFound));
        assert_eq!(user(&store, ALICE).await, deleted);
    }

    #[sqlx::test(fixtures("../../fixtures/accounts.sql"))]
    async fn test_deleted_account_cannot_be_reactivated(pool: PgPool) {
        let store = Arc::new(PgAccountStore::new(pool));
        let service = service(store.clone());

        service.delete_user_account("alice").await.unwrap();

        let err = service
            .activate_account("0123456789abcdef0123456789abcdef")
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::NotAuthorized));
        assert!(!user(&store, ALICE).await.is_active);
    }

    #[sqlx::test]
    async fn test_drop_discards_writes(pool: PgPool) {
        let store = PgAccountStore::new(pool);

        let mut tx = store.begin().await.unwrap();
        tx.insert_user(&NewUser {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password: "!".into(),
            is_active: true,
            date_joined: now(),
        })
        .await
        .unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(!tx.username_exists("alice").await.unwrap());
    }
}
