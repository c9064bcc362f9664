//! Error taxonomy of the account API.

use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::ValidationErrors;

pub type Result<T> = std::result::Result<T, AccountError>;

/// Error attached to a single account field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub developer_message: String,
    pub user_message: String,
}

impl FieldError {
    /// Create a new [`FieldError`].
    pub fn new(
        developer_message: impl Into<String>,
        user_message: impl Into<String>,
    ) -> Self {
        Self {
            developer_message: developer_message.into(),
            user_message: user_message.into(),
        }
    }

    /// Error reported when a caller tries to edit a read-only field.
    pub fn read_only(field: &str) -> Self {
        Self::new(
            "This field is not editable via this API",
            format!("The '{field}' field cannot be edited."),
        )
    }
}

/// Field-level errors, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error for `field`. A later error replaces an earlier one.
    pub fn add(&mut self, field: impl Into<String>, error: FieldError) {
        self.0.insert(field.into(), error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&FieldError> {
        self.0.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldError)> {
        self.0.iter()
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        for (field, issues) in errors.field_errors() {
            if let Some(issue) = issues.first() {
                let message = issue
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| issue.code.to_string());
                fields.add(
                    field.to_string(),
                    FieldError::new(issue.to_string(), message),
                );
            }
        }
        fields
    }
}

/// Enum representing account API errors.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("user not found")]
    NotFound,

    #[error("requester is not authorized to access this account")]
    NotAuthorized,

    #[error("missing or invalid bearer token")]
    Unauthenticated,

    #[error("validation error occurred")]
    Validation(FieldErrors),

    #[error("an account with this username or email already exists")]
    UserAlreadyExists,

    #[error("{0}")]
    UsernameInvalid(String),
    #[error("{0}")]
    PasswordInvalid(String),
    #[error("{0}")]
    EmailInvalid(String),

    #[error("{developer_message}")]
    Update {
        developer_message: String,
        user_message: String,
    },

    #[error("malformed request: {0}")]
    Request(String),

    #[error("internal server error")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl AccountError {
    pub fn internal<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal(Box::new(err))
    }

    /// Create an [`AccountError::Update`].
    pub fn update(
        developer_message: impl Into<String>,
        user_message: impl Into<String>,
    ) -> Self {
        Self::Update {
            developer_message: developer_message.into(),
            user_message: user_message.into(),
        }
    }

    /// Message intended for API integrators.
    pub fn developer_message(&self) -> String {
        match self {
            Self::Internal(source) => format!("internal server error: {source}"),
            _ => self.to_string(),
        }
    }

    /// Message safe to display to the end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound => "The requested account does not exist.".into(),
            Self::NotAuthorized => {
                "You are not allowed to access this account.".into()
            },
            Self::Unauthenticated => {
                "Authentication credentials were not provided.".into()
            },
            Self::Validation(_) => {
                "There were validation errors with your request.".into()
            },
            Self::UserAlreadyExists => {
                "An account with this username or email already exists."
                    .into()
            },
            Self::UsernameInvalid(message)
            | Self::PasswordInvalid(message)
            | Self::EmailInvalid(message) => message.clone(),
            Self::Update { user_message, .. } => user_message.clone(),
            Self::Request(_) => "The request could not be understood.".into(),
            Self::Internal(_) => "Something went wrong.".into(),
        }
    }

    /// Short, stable label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::NotAuthorized => "not_authorized",
            Self::Unauthenticated => "unauthenticated",
            Self::Validation(_) => "validation",
            Self::UserAlreadyExists => "already_exists",
            Self::UsernameInvalid(_) => "username_invalid",
            Self::PasswordInvalid(_) => "password_invalid",
            Self::EmailInvalid(_) => "email_invalid",
            Self::Update { .. } => "update",
            Self::Request(_) => "request",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<ValidationErrors> for AccountError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors.into())
    }
}

impl From<JsonRejection> for AccountError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Request(rejection.body_text())
    }
}

/// Wrap any foreign error into [`AccountError::Internal`].
pub trait ToInternal<T> {
    fn catch(self) -> Result<T>;
}

impl<T, E> ToInternal<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn catch(self) -> Result<T> {
        self.map_err(AccountError::internal)
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<FieldErrors>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Attach field errors.
    pub fn errors(mut self, errors: &FieldErrors) -> Self {
        self.errors = Some(errors.clone());
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .title(&self.user_message())
            .details(&self.developer_message());

        let response = match &self {
            AccountError::NotFound => response.status(StatusCode::NOT_FOUND),
            AccountError::NotAuthorized => {
                response.status(StatusCode::FORBIDDEN)
            },
            AccountError::Unauthenticated => {
                response.status(StatusCode::UNAUTHORIZED)
            },
            AccountError::Validation(errors) => {
                response.status(StatusCode::BAD_REQUEST).errors(errors)
            },
            AccountError::UsernameInvalid(_)
            | AccountError::PasswordInvalid(_)
            | AccountError::EmailInvalid(_)
            | AccountError::Request(_) => {
                response.status(StatusCode::BAD_REQUEST)
            },
            AccountError::UserAlreadyExists => {
                response.status(StatusCode::CONFLICT)
            },
            AccountError::Update { .. } => {
                response.status(StatusCode::BAD_REQUEST)
            },
            AccountError::Internal(source) => {
                tracing::error!(error = %source, "server returned 500 status");

                ResponseError::default()
            },
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
