//! Topic fan-out: one local broadcast sender per topic, optionally relayed through Redis.

use crate::error::AppResult;
use crate::models::event::WsEvent;
use crate::models::topic::Topic;
use crate::repositories::{RedisRepository, TopicRelay};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

const TOPIC_CAPACITY: usize = 256;

struct TopicEntry {
    tx: broadcast::Sender<String>,
    /// Relay subscription feeding `tx`; aborting it releases the subscription.
    relay: Option<JoinHandle<()>>,
}

/// Subscription registry keyed by topic.
///
/// Without a relay, publishes go straight to local receivers. With a relay, publishes
/// go to the relay and every process (this one included) forwards them to its own
/// receivers, so subscribers on other workers see them too.
#[derive(Clone)]
pub struct BroadcastService {
    relay: Option<Arc<dyn TopicRelay>>,
    topics: Arc<RwLock<HashMap<Topic, TopicEntry>>>,
}

impl BroadcastService {
    /// Process-local bus.
    pub fn local() -> Self {
        Self {
            relay: None,
            topics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Bus relayed through Redis pub/sub.
    pub fn with_redis(repo: RedisRepository) -> Self {
        Self::with_relay(Arc::new(repo))
    }

    pub fn with_relay(relay: Arc<dyn TopicRelay>) -> Self {
        Self {
            relay: Some(relay),
            topics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get a receiver for the topic. Multiple callers share one sender (and one relay subscription).
    pub async fn subscribe(&self, topic: &Topic) -> AppResult<broadcast::Receiver<String>> {
        let mut topics = self.topics.write().await;
        if let Some(entry) = topics.get(topic) {
            return Ok(entry.tx.subscribe());
        }

        let (tx, rx) = broadcast::channel(TOPIC_CAPACITY);
        let relay = match &self.relay {
            Some(relay) => Some(relay.forward(&topic.name(), tx.clone()).await?),
            None => None,
        };
        topics.insert(topic.clone(), TopicEntry { tx, relay });
        debug!(topic = %topic, "topic created");
        Ok(rx)
    }

    /// Publish an event to a topic. Returns local receivers reached, or Redis subscribers when relayed.
    pub async fn publish(&self, topic: &Topic, event: &WsEvent) -> AppResult<usize> {
        let payload = event.to_text()?;
        let count = match &self.relay {
            Some(relay) => relay.publish(&topic.name(), &payload).await?,
            None => {
                let topics = self.topics.read().await;
                topics
                    .get(topic)
                    .and_then(|entry| entry.tx.send(payload).ok())
                    .unwrap_or(0)
            }
        };
        info!(topic = %topic, event = %event.event, count, "broadcast");
        Ok(count)
    }

    /// Drop the topic once nobody listens, releasing its relay subscription.
    pub async fn prune(&self, topic: &Topic) {
        let mut topics = self.topics.write().await;
        if !topics
            .get(topic)
            .is_some_and(|entry| entry.tx.receiver_count() == 0)
        {
            return;
        }
        if let Some(entry) = topics.remove(topic) {
            if let Some(relay) = entry.relay {
                relay.abort();
            }
            debug!(topic = %topic, "topic pruned");
        }
    }

    /// Local receivers currently attached to a topic.
    pub async fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map(|entry| entry.tx.receiver_count())
            .unwrap_or(0)
    }
}
