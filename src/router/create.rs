use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::AppState;
use crate::error::Result;
use crate::ports::{MailContext, Template};
use crate::router::Valid;

#[derive(Debug, Serialize, Deserialize, Validate, Zeroize, ZeroizeOnDrop)]
pub struct Body {
    #[validate(length(min = 1, message = "Username is required."))]
    pub username: String,
    #[validate(length(min = 1, message = "Email is required."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub username: String,
    pub is_active: bool,
}

/// Handler to create an account and send its activation link.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<Response>)> {
    let key = state
        .service
        .create_account(&body.username, &body.password, &body.email)
        .await?;

    let config = state.service.config();
    let protocol = if config.is_secure() { "https" } else { "http" };
    let context = MailContext::from([
        ("username".to_owned(), body.username.clone()),
        ("key".to_owned(), key.clone()),
        ("site_name".to_owned(), config.name.clone()),
        (
            "activation_link".to_owned(),
            format!("{protocol}://{}/activate/{key}", config.domain()),
        ),
    ]);

    if let Err(err) = state
        .service
        .mailer()
        .send(
            Template::Activation,
            &config.email_from_address,
            &body.email,
            &context,
        )
        .await
    {
        tracing::error!(error = %err, "activation mail not sent");
    }

    Ok((
        StatusCode::CREATED,
        Json(Response {
            username: body.username.clone(),
            is_active: false,
        }),
    ))
}

/// `POST /accounts/activate/{key}`.
pub async fn activate(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode> {
    state.service.activate_account(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}
