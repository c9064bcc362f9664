//! Configuration manager.
//!
//! The configuration is read once at start and shared as an immutable
//! snapshot; every account operation reads site flags from it.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;
use crate::account::visibility::VisibilityConfiguration;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_FROM_ADDRESS: &str = "registration@localhost";
const DEFAULT_MIGRATION_STATUS_KEY: &str = "msa_migration_status";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Domain name of current instance.
    pub url: String,
    /// Listening port of the HTTP server.
    pub port: u16,
    /// Sender of every account mail.
    pub email_from_address: String,
    /// Allows immediate (non confirmation-link) email updates.
    pub enable_msa_migration: bool,
    /// Profile metadata key flagging a finished account migration.
    pub msa_migration_status_key: String,
    /// Which account fields can be shared with other users.
    pub account_visibility: VisibilityConfiguration,
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Related to automatic mail sending.
    #[serde(skip_serializing)]
    pub mail: Option<Mail>,
    /// Related to the discussion (forum) service.
    #[serde(skip_serializing)]
    pub discussion: Option<Discussion>,
    /// Related to JsonWebToken configuration.
    #[serde(skip_serializing)]
    pub token: Option<Token>,
    /// Related to traces export.
    #[serde(skip_serializing)]
    pub telemetry: Option<Telemetry>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: String::default(),
            url: String::default(),
            port: DEFAULT_PORT,
            email_from_address: DEFAULT_FROM_ADDRESS.to_owned(),
            enable_msa_migration: false,
            msa_migration_status_key: DEFAULT_MIGRATION_STATUS_KEY.to_owned(),
            account_visibility: VisibilityConfiguration::default(),
            version: VERSION.to_owned(),
            path: PathBuf::default(),
            postgres: None,
            argon2: None,
            mail: None,
            discussion: None,
            token: None,
            telemetry: None,
        }
    }
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Mail queue (RabbitMQ) configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mail {
    /// Hostname:(?port) for RabbitMQ instance.
    pub address: String,
    /// RabbitMQ default vhost.
    pub vhost: Option<String>,
    /// RabbitMQ username to access queue.
    pub username: String,
    /// RabbitMQ password to access queue.
    pub password: String,
    /// Max channel connections.
    pub pool: Option<u16>,
    /// Queue name to send mailing events.
    pub queue: String,
}

/// Discussion service configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discussion {
    /// Base URL of the comments service.
    pub address: String,
    /// Value of the API key header.
    pub api_key: Option<String>,
    /// Courses whose forums are scrubbed on account deletion.
    #[serde(default)]
    pub courses: Vec<String>,
    /// Request timeout, in seconds.
    pub timeout: Option<u64>,
}

/// Json Web Token configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Token {
    /// Shared HMAC secret of the platform login service.
    pub secret: String,
    /// Expected `aud` claim.
    pub audience: Option<String>,
}

/// OpenTelemetry configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Telemetry {
    /// OTLP gRPC endpoint receiving spans.
    pub otlp_endpoint: Option<String>,
    /// `tracing` filter directive, `info` by default.
    pub log_level: Option<String>,
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Domain part of the instance URL.
    pub fn domain(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(ToOwned::to_owned))
            .unwrap_or_else(|| self.url.clone())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Whether the instance is served over HTTPS.
    pub fn is_secure(&self) -> bool {
        self.url.starts_with("https://")
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            self.path.clone()
        } else {
            Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(&file_path) {
            Ok(file) => {
                let mut config: Configuration =
                    match serde_yaml::from_reader(file) {
                        Ok(config) => config,
                        Err(err) => {
                            return Ok(Arc::new(self.error(err)));
                        },
                    };

                config.version = VERSION.to_owned();
                config.path = file_path;

                if !config.url.is_empty() {
                    config.url = self.normalize_url(&config.url)?;
                }
                if let Some(discussion) = config.discussion.as_mut() {
                    discussion.address =
                        self.normalize_url(&discussion.address)?;
                }

                Ok(Arc::new(config))
            },
            Err(err) => Ok(Arc::new(self.error(err))),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found or invalid");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::visibility::Visibility;

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
name: Learning
url: learn.example.com
email_from_address: no-reply@learn.example.com
enable_msa_migration: true
account_visibility:
  default_visibility: private
  shareable_fields: [username, bio]
  public_fields: [username]
  admin_fields: [username, email, bio]
discussion:
  address: http://forum.local:4567
  courses: ["course-v1:Org+Demo+2024"]
"#;
        let config: Configuration = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.enable_msa_migration);
        assert_eq!(config.msa_migration_status_key, DEFAULT_MIGRATION_STATUS_KEY);
        assert_eq!(
            config.account_visibility.default_visibility,
            Visibility::Private
        );
        assert_eq!(config.discussion.unwrap().courses.len(), 1);
    }

    #[test]
    fn test_normalize_url() {
        let config = Configuration::default();
        assert_eq!(
            config.normalize_url("learn.example.com").unwrap(),
            "https://learn.example.com/"
        );
        assert_eq!(
            config.normalize_url("http://localhost:8000").unwrap(),
            "http://localhost:8000/"
        );
    }

    #[test]
    fn test_default_keeps_version() {
        let mut config = Configuration::default();
        config.url = "https://learn.example.com/".into();

        assert_eq!(config.version(), VERSION);
        assert!(config.is_secure());
        assert_eq!(config.domain(), "learn.example.com");
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let config = Configuration::default()
            .path(PathBuf::from("/nonexistent/config.yaml"))
            .read()
            .unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(!config.enable_msa_migration);
    }
}
