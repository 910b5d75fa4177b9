use serde::{Deserialize, Serialize};
use std::env;

const DEFAULT_EXCHANGE: &str = "kart.ratings";
const DEFAULT_ROUTING_KEY: &str = "ratings.history.refreshed";

/// Connection and routing settings for history refresh notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RabbitMqConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Virtual host (default: "/")
    pub vhost: String,
    /// Fanout exchange the refresh events are published to
    pub exchange: String,
    pub routing_key: String
}

impl RabbitMqConfig {
    /// Reads `RABBITMQ_*` variables. Credentials are required; everything else has a default.
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            host: env::var("RABBITMQ_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("RABBITMQ_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5672),
            username: env::var("RABBITMQ_USERNAME")?,
            password: env::var("RABBITMQ_PASSWORD")?,
            vhost: env::var("RABBITMQ_VHOST").unwrap_or_else(|_| "/".to_string()),
            exchange: env::var("RABBITMQ_EXCHANGE").unwrap_or_else(|_| DEFAULT_EXCHANGE.to_string()),
            routing_key: env::var("RABBITMQ_ROUTING_KEY").unwrap_or_else(|_| DEFAULT_ROUTING_KEY.to_string())
        })
    }

    /// AMQP URL with the vhost percent-encoded
    pub fn connection_url(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.username,
            self.password,
            self.host,
            self.port,
            self.vhost.replace('/', "%2F")
        )
    }
}

impl Default for RabbitMqConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            exchange: DEFAULT_EXCHANGE.to_string(),
            routing_key: DEFAULT_ROUTING_KEY.to_string()
        }
    }
}
