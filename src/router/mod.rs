//! HTTP API over [`AccountService`](crate::account::AccountService).
pub mod accounts;
pub mod create;
pub mod password;
pub mod status;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::AppState;
use crate::account::Requester;
use crate::error::{AccountError, Result};

const BEARER: &str = "Bearer ";

/// JSON body validated with [`validator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = AccountError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Custom middleware for authentification.
///
/// Inserts the [`Requester`] named by the bearer token.
pub async fn auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or(AccountError::Unauthenticated)?;
    let token = token.strip_prefix(BEARER).unwrap_or(token);

    let claims = state.token.decode(token).map_err(|err| {
        tracing::debug!(error = %err, "bearer token rejected");
        AccountError::Unauthenticated
    })?;

    req.extensions_mut().insert(Requester::from(claims));
    Ok(next.run(req).await)
}

/// Secret of the bearer tokens accepted by test states.
#[cfg(test)]
pub const SECRET: &str = "secret";

/// Application state wired to the in-memory store.
#[cfg(test)]
pub fn state() -> AppState {
    state_with(std::sync::Arc::new(crate::adapters::MemoryStore::new()))
}

/// Application state wired to PostgreSQL.
#[cfg(test)]
pub fn pg_state(pool: sqlx::PgPool) -> AppState {
    state_with(std::sync::Arc::new(crate::adapters::PgAccountStore::new(pool)))
}

#[cfg(test)]
fn state_with(store: std::sync::Arc<dyn crate::ports::AccountStore>) -> AppState {
    use std::sync::Arc;

    use crate::account::{AccountService, Collaborators};
    use crate::adapters::{
        ConfirmationEmailChange, DisabledDiscussion, RabbitMqMailer,
        StaticCourseCatalog, StorePreferences, SystemClock, TracingEvents,
    };
    use crate::config::{Argon2, Configuration};
    use crate::crypto::Crypto;
    use crate::token::TokenManager;

    let config = Arc::new(Configuration::default());
    let mailer = Arc::new(RabbitMqMailer::default());
    let crypto = Crypto::new(
        Some(Argon2 {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        }),
        SECRET,
    )
    .unwrap();

    let service = AccountService::new(
        Arc::clone(&config),
        Arc::new(crypto),
        Collaborators {
            store,
            preferences: Arc::new(StorePreferences),
            email_change: Arc::new(ConfirmationEmailChange::new(
                Arc::clone(&config),
                mailer.clone(),
            )),
            mailer,
            discussion: Arc::new(DisabledDiscussion),
            courses: Arc::new(StaticCourseCatalog::default()),
            events: Arc::new(TracingEvents),
            clock: Arc::new(SystemClock),
        },
    );

    AppState {
        token: TokenManager::new(SECRET),
        config,
        service,
        metrics: None,
    }
}
