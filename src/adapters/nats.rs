use crate::config::toml_config::EventsConfig;
use crate::domain::ports::EventSource;
use crate::utils::error::{NovaError, Result};
use async_nats::ConnectOptions;
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;

/// NATS queue-group 訂閱：subject 對應 topic，queue group 對應 consumer group
pub struct NatsEventSource {
    _client: async_nats::Client,
    subscriber: async_nats::Subscriber,
}

impl NatsEventSource {
    pub async fn connect(settings: &EventsConfig) -> Result<Self> {
        let options = ConnectOptions::default()
            .connection_timeout(Duration::from_secs(5))
            .name("nova");

        let client = async_nats::connect_with_options(settings.broker.as_str(), options)
            .await
            .map_err(|e| NovaError::EventStreamError {
                message: format!("connect {}: {}", settings.broker, e),
            })?;

        let subscriber = client
            .queue_subscribe(settings.topic.clone(), settings.group.clone())
            .await
            .map_err(|e| NovaError::EventStreamError {
                message: format!("subscribe {}: {}", settings.topic, e),
            })?;

        tracing::info!(
            "📡 Subscribed to '{}' (group '{}') on {}",
            settings.topic,
            settings.group,
            settings.broker
        );
        Ok(Self {
            _client: client,
            subscriber,
        })
    }
}

#[async_trait]
impl EventSource for NatsEventSource {
    async fn recv(&mut self) -> Option<Vec<u8>> {
        self.subscriber.next().await.map(|message| message.payload.to_vec())
    }
}
