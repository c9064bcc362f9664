//! Account management API for a learning platform.
#![forbid(unsafe_code)]

pub mod account;
pub mod adapters;
pub mod config;
pub mod crypto;
mod database;
pub mod error;
pub mod ports;
mod router;
pub mod telemetry;
pub mod token;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::account::{AccountService, Collaborators};
use crate::adapters::{
    ConfirmationEmailChange, DisabledDiscussion, HttpDiscussionService,
    MemoryStore, PgAccountStore, RabbitMqMailer, StaticCourseCatalog,
    StorePreferences, SystemClock, TracingEvents,
};
use crate::ports::{AccountStore, CourseCatalog, DiscussionService, Mailer};

/// Environment variable holding the key of password reset tokens.
const SECRET_KEY: &str = "SECRET_KEY";

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    auth: Option<(&AppState, &str, bool)>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");

    if let Some((_, username, staff)) = auth {
        let token =
            token::sign(router::SECRET, token::DEFAULT_AUDIENCE, username, staff)
                .expect("cannot create JWT");
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub service: AccountService,
    pub token: token::TokenManager,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        // `GET /metrics` exposes Prometheus metrics.
        .route("/metrics", get(router::status::metrics))
        // `POST /password` sends a password reset link.
        .route("/password", post(router::password::handler))
        .nest("/accounts", router::accounts::router(state.clone()))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state(
    config: Arc<config::Configuration>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let secret = std::env::var(SECRET_KEY)
        .map_err(|_| format!("missing `{SECRET_KEY}` environnement variable"))?;
    let crypto = Arc::new(crypto::Crypto::new(config.argon2.clone(), &secret)?);

    let store: Arc<dyn AccountStore> = match &config.postgres {
        Some(postgres) => {
            Arc::new(PgAccountStore::new(database::connect(postgres).await?))
        },
        None => {
            tracing::warn!(
                "missing `postgres` entry on `config.yaml` file, accounts are kept in memory"
            );
            Arc::new(MemoryStore::new())
        },
    };

    // handle mail sender.
    let mailer: Arc<dyn Mailer> = match &config.mail {
        Some(cfg) => Arc::new(RabbitMqMailer::new(cfg).await?),
        None => Arc::new(RabbitMqMailer::default()),
    };

    let (discussion, courses): (Arc<dyn DiscussionService>, Arc<dyn CourseCatalog>) =
        match &config.discussion {
            Some(cfg) => (
                Arc::new(HttpDiscussionService::new(cfg)?),
                Arc::new(StaticCourseCatalog::new(cfg.courses.clone())),
            ),
            None => (
                Arc::new(DisabledDiscussion),
                Arc::new(StaticCourseCatalog::default()),
            ),
        };

    // handle jwt.
    let Some(cfg) = &config.token else {
        return Err("missing `token` entry on `config.yaml` file".into());
    };
    let mut token = token::TokenManager::new(&cfg.secret);
    if let Some(audience) = &cfg.audience {
        token.audience(audience);
    }

    let service = AccountService::new(
        Arc::clone(&config),
        crypto,
        Collaborators {
            store,
            preferences: Arc::new(StorePreferences),
            email_change: Arc::new(ConfirmationEmailChange::new(
                Arc::clone(&config),
                Arc::clone(&mailer),
            )),
            mailer,
            discussion,
            courses,
            events: Arc::new(TracingEvents),
            clock: Arc::new(SystemClock),
        },
    );

    Ok(AppState {
        config,
        service,
        token,
        metrics: None,
    })
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use super::*;

    #[tokio::test]
    async fn test_metrics_disabled() {
        let state = router::state();
        let app = app(state);

        let response =
            make_request(None, app, Method::GET, "/metrics", String::default())
                .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let state = router::state();
        let app = app(state);

        let response =
            make_request(None, app, Method::GET, "/users/@me", String::default())
                .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
