//! Redis pub/sub relay so every worker process sees every topic publish.

use crate::error::{AppError, AppResult};
use crate::repositories::TopicRelay;
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const TOPIC_PREFIX: &str = "courier:topic:";

fn topic_key(topic: &str) -> String {
    format!("{}{}", TOPIC_PREFIX, topic)
}

/// Redis-backed bus: PUBLISH over one shared managed connection, one SUBSCRIBE
/// connection per forwarded topic.
#[derive(Clone)]
pub struct RedisRepository {
    client: redis::Client,
    publisher: ConnectionManager,
}

impl RedisRepository {
    /// Open the client and establish the publishing connection.
    pub async fn connect(redis_url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url)?;
        let publisher = client.get_connection_manager().await?;
        info!("redis connected");
        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl TopicRelay for RedisRepository {
    async fn publish(&self, topic: &str, message: &str) -> AppResult<usize> {
        let mut conn = self.publisher.clone();
        let count: usize = conn.publish(topic_key(topic), message).await?;
        debug!(topic = %topic, count, "published");
        Ok(count)
    }

    async fn forward(
        &self,
        topic: &str,
        sink: broadcast::Sender<String>,
    ) -> AppResult<JoinHandle<()>> {
        let conn = self.client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();
        pubsub.subscribe(topic_key(topic)).await?;
        info!(topic = %topic, "subscribed to redis topic");

        let mut stream = pubsub.into_on_message();
        let topic = topic.to_string();
        Ok(tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                if let Ok(payload) = msg.get_payload::<String>() {
                    // no local receivers right now; the topic owner prunes us
                    let _ = sink.send(payload);
                }
            }
            debug!(topic = %topic, "redis subscription closed");
        }))
    }
}
