use std::net::{Ipv4Addr, SocketAddr};

use opentelemetry::global;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_LOG_LEVEL: &str = "info";

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("received SIGINT, shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // read configuration file. let it in memory.
    let config = accounts::config::Configuration::default().read()?;
    let telemetry = config.telemetry.clone().unwrap_or_default();

    // `RUST_LOG` wins over the configured level.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(telemetry.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL))
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let tracer = match telemetry.otlp_endpoint.as_deref() {
        Some(endpoint) => {
            let provider = accounts::telemetry::setup_tracer(endpoint)?;
            global::set_tracer_provider(provider.clone());
            Some(provider)
        },
        None => None,
    };

    let mut state = accounts::initialize_state(config).await?;
    state.metrics = match accounts::telemetry::setup_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!(error = %err, "prometheus recorder not installed");
            None
        },
    };

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, state.config.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, version = state.config.version(), "server started");

    axum::serve(listener, accounts::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(provider) = tracer {
        provider.shutdown()?;
    }

    Ok(())
}
