//! Account settings HTTP API.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router, middleware};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::AppState;
use crate::account::visibility::View;
use crate::account::{AccountView, ConflictField, Requester};
use crate::error::{AccountError, Result};

#[derive(Debug, Default, Deserialize)]
pub struct ReadQuery {
    /// Comma-separated usernames.
    usernames: Option<String>,
    #[serde(default)]
    view: View,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateQuery {
    #[serde(default)]
    force_email_update: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExistsQuery {
    username: Option<String>,
    email: Option<String>,
}

/// `GET /accounts`.
pub async fn read(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<Vec<AccountView>>> {
    let usernames = query.usernames.map(|usernames| {
        usernames
            .split(',')
            .map(str::trim)
            .filter(|username| !username.is_empty())
            .map(ToOwned::to_owned)
            .collect::<Vec<_>>()
    });

    let views = state
        .service
        .get_account_settings(&requester, usernames.as_deref(), None, query.view)
        .await?;

    Ok(Json(views))
}

/// `PATCH /accounts/{username}`.
pub async fn update(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(username): Path<String>,
    Query(query): Query<UpdateQuery>,
    body: std::result::Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<StatusCode> {
    let Json(updates) = body?;

    state
        .service
        .update_account_settings(
            &requester,
            &updates,
            Some(&username),
            query.force_email_update,
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /accounts/{username}`. Staff may delete any account, users only
/// their own.
pub async fn delete(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(username): Path<String>,
) -> Result<StatusCode> {
    if !requester.is_staff && requester.username != username {
        return Err(AccountError::NotAuthorized);
    }

    state.service.delete_user_account(&username).await?;
    tracing::info!(requester = %requester.username, "account deletion requested");

    Ok(StatusCode::NO_CONTENT)
}

/// `GET /accounts/exists`.
pub async fn exists(
    State(state): State<AppState>,
    Query(query): Query<ExistsQuery>,
) -> Result<Json<Vec<ConflictField>>> {
    let conflicts = state
        .service
        .check_account_exists(query.username.as_deref(), query.email.as_deref())
        .await?;

    Ok(Json(conflicts))
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `GET /accounts` lists account views. Authorization required.
        .route("/", get(read))
        // `PATCH` and `DELETE /accounts/{username}`. Authorization required.
        .route(
            "/{username}",
            axum::routing::patch(update).delete(delete),
        )
        .route_layer(middleware::from_fn_with_state(state, super::auth))
        // `POST /accounts` creates an inactive account.
        .route("/", axum::routing::post(super::create::handler))
        // `GET /accounts/exists` is public.
        .route("/exists", get(exists))
        // `POST /accounts/activate/{key}` is public.
        .route(
            "/activate/{key}",
            axum::routing::post(super::create::activate),
        )
}
