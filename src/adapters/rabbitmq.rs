//! Mailer publishing cloudevents to a RabbitMQ queue.
//!
//! A separate consumer renders the templates and delivers the mails.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::{
    AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo,
};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use serde::Serialize;
use url::Url;

use crate::config::Mail;
use crate::ports::{MailContext, MailError, Mailer, Template};

const DEFAULT_AMPQ_HOST: &str = "localhost";
const DEFAULT_AMPQ_PORT: u16 = 5672;
const DEFAULT_AMPQ_VHOST: &str = "/";

const CONTENT_ENCODING: &str = "utf8";
const CONTENT_TYPE: &str = "application/cloudevents+json";
const DATA_CONTENT_TYPE: &str = "application/json";
const CLOUDEVENT_VERSION: &str = "1.0";
const EVENT_TYPE: &str = "org.accounts.email";
const EVENT_SOURCE: &str = "org.accounts.api";
const ID_LENGTH: usize = 12;

#[derive(Debug, Serialize)]
struct Cloudevent<'a> {
    specversion: &'static str,
    r#type: &'static str,
    source: &'static str,
    id: String,
    time: String,
    datacontenttype: &'static str,
    data: Content<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    template: Template,
    from: &'a str,
    to: &'a str,
    context: &'a MailContext,
}

/// RabbitMQ-based mailer.
///
/// Without a connection, mails are only logged.
#[derive(Debug, Clone, Default)]
pub struct RabbitMqMailer {
    queue: String,
    conn: Option<Arc<Connection>>,
}

impl RabbitMqMailer {
    /// Connect a new [`RabbitMqMailer`].
    pub async fn new(config: &Mail) -> Result<Self, MailError> {
        let addr = Url::parse(&config.address)
            .map_err(|err| MailError::Address(err.to_string()))?;
        let uri = AMQPUri {
            scheme: AMQPScheme::from_str(addr.scheme()).map_err(|_| {
                MailError::Address(format!("unsupported scheme `{}`", addr.scheme()))
            })?,
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: config.username.clone(),
                    password: config.password.clone(),
                },
                host: addr.host_str().unwrap_or(DEFAULT_AMPQ_HOST).into(),
                port: addr.port().unwrap_or(DEFAULT_AMPQ_PORT),
            },
            vhost: config
                .vhost
                .clone()
                .unwrap_or(DEFAULT_AMPQ_VHOST.to_string()),
            query: AMQPQueryString {
                channel_max: config.pool,
                ..Default::default()
            },
        };

        let conn_config = ConnectionProperties::default()
            .with_connection_name("accounts_mail_client".into());
        let conn = Connection::connect_uri(uri, conn_config).await?;

        tracing::info!(%addr, queue = config.queue, "rabbitmq connected");

        Ok(Self {
            queue: config.queue.clone(),
            conn: Some(Arc::new(conn)),
        })
    }

    async fn create_channel(
        conn: Arc<Connection>,
        queue: &str,
    ) -> Result<Channel, MailError> {
        let channel = conn.create_channel().await?;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(channel)
    }

    fn create_event(data: Content) -> Cloudevent {
        let id = Alphanumeric.sample_string(&mut OsRng, ID_LENGTH);
        Cloudevent {
            specversion: CLOUDEVENT_VERSION,
            r#type: EVENT_TYPE,
            source: EVENT_SOURCE,
            id,
            time: Utc::now().to_rfc3339(),
            datacontenttype: DATA_CONTENT_TYPE,
            data,
        }
    }
}

#[async_trait]
impl Mailer for RabbitMqMailer {
    async fn send(
        &self,
        template: Template,
        from: &str,
        to: &str,
        context: &MailContext,
    ) -> Result<(), MailError> {
        let Some(conn) = &self.conn else {
            tracing::debug!(?template, "no mail broker, mail dropped");
            return Ok(());
        };
        let channel = Self::create_channel(Arc::clone(conn), &self.queue).await?;

        let payload = Self::create_event(Content {
            template,
            from,
            to,
            context,
        });
        let payload = serde_json::to_vec(&payload)?;

        channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_encoding(CONTENT_ENCODING.into())
                    .with_content_type(CONTENT_TYPE.into()),
            )
            .await?;

        tracing::trace!(?template, "mail event published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_cloudevent_shape() {
        let context = MailContext::from([("key".to_owned(), "abc".to_owned())]);
        let event = RabbitMqMailer::create_event(Content {
            template: Template::EmailChangeConfirmation,
            from: "registration@localhost",
            to: "alice@example.com",
            context: &context,
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["specversion"], json!("1.0"));
        assert_eq!(value["id"].as_str().unwrap().len(), ID_LENGTH);
        assert_eq!(value["data"]["template"], json!("email_change_confirmation"));
        assert_eq!(value["data"]["to"], json!("alice@example.com"));
        assert_eq!(value["data"]["context"]["key"], json!("abc"));
    }

    #[tokio::test]
    async fn test_unconnected_mailer() {
        let mailer = RabbitMqMailer::default();
        mailer
            .send(
                Template::Activation,
                "registration@localhost",
                "alice@example.com",
                &MailContext::new(),
            )
            .await
            .unwrap();
    }
}
