use crate::{messaging::config::RabbitMqConfig, model::structures::run_mode::RunMode, pipeline::RunSummary};
use chrono::{DateTime, Utc};
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("Failed to connect to RabbitMQ: {0}")]
    ConnectionError(#[from] lapin::Error),

    #[error("Failed to serialize message: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Publisher not initialized")]
    NotInitialized
}

/// Sent after a run has committed new rating history, so chart consumers can refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingHistoryRefreshedMessage {
    pub mode: RunMode,
    pub matches_processed: usize,
    pub rows_written: usize,
    pub processed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>
}

impl RatingHistoryRefreshedMessage {
    pub fn new(mode: RunMode, summary: &RunSummary, correlation_id: Option<String>) -> Self {
        Self {
            mode,
            matches_processed: summary.matches_processed,
            rows_written: summary.rows_written,
            processed_at: Utc::now(),
            correlation_id
        }
    }
}

/// Publishes rating history events to a durable fanout exchange
pub struct RabbitMqPublisher {
    connection: Option<Connection>,
    channel: Option<Channel>,
    exchange: String,
    routing_key: String
}

impl RabbitMqPublisher {
    pub fn new(exchange: String, routing_key: String) -> Self {
        Self {
            connection: None,
            channel: None,
            exchange,
            routing_key
        }
    }

    pub async fn connect_from_config(config: &RabbitMqConfig) -> Result<Self, PublisherError> {
        let mut publisher = Self::new(config.exchange.clone(), config.routing_key.clone());
        publisher.connect(&config.connection_url()).await?;
        Ok(publisher)
    }

    pub async fn connect(&mut self, rabbitmq_url: &str) -> Result<(), PublisherError> {
        let connection = Connection::connect(rabbitmq_url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .exchange_declare(
                &self.exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default()
            )
            .await?;

        self.connection = Some(connection);
        self.channel = Some(channel);

        info!("Connected to RabbitMQ, exchange '{}' declared", self.exchange);
        Ok(())
    }

    pub async fn publish(&self, message: &RatingHistoryRefreshedMessage) -> Result<(), PublisherError> {
        let channel = self.channel.as_ref().ok_or(PublisherError::NotInitialized)?;
        let payload = serde_json::to_vec(message)?;

        channel
            .basic_publish(
                &self.exchange,
                &self.routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_message_id(Uuid::new_v4().to_string().into())
                    .with_timestamp(message.processed_at.timestamp() as u64)
            )
            .await?;

        debug!(
            "Published history refresh ({} mode, {} rows) to '{}'",
            message.mode, message.rows_written, self.exchange
        );

        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some() && self.channel.is_some()
    }

    pub async fn close(&mut self) -> Result<(), PublisherError> {
        if let Some(channel) = self.channel.take() {
            channel.close(200, "Normal shutdown").await?;
        }

        if let Some(connection) = self.connection.take() {
            connection.close(200, "Normal shutdown").await?;
        }

        info!("RabbitMQ connection closed");
        Ok(())
    }
}

impl Drop for RabbitMqPublisher {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("RabbitMQ publisher dropped without proper closure");
        }
    }
}
