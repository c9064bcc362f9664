//! Password reset requests.

use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
}

/// `POST /password` mails a reset link to every account using the address.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<StatusCode> {
    let is_secure = state.config.is_secure();
    state
        .service
        .request_password_change(&body.email, is_secure)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::*;

    #[tokio::test]
    async fn test_password_handler() {
        let state = router::state();
        state
            .service
            .create_account("gooduser", "validpass123", "gooduser@example.com")
            .await
            .unwrap();
        let app = app(state);

        let response = make_request(
            None,
            app.clone(),
            Method::POST,
            "/password",
            json!({"email": "gooduser@example.com"}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = make_request(
            None,
            app.clone(),
            Method::POST,
            "/password",
            json!({"email": "nobody@example.com"}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = make_request(
            None,
            app,
            Method::POST,
            "/password",
            json!({"email": "nobody"}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
