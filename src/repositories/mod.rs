//! External message bus access.

pub mod redis_repo;

pub use redis_repo::RedisRepository;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::AppResult;

/// Cross-process pub/sub the topic bus relays through.
#[async_trait]
pub trait TopicRelay: Send + Sync {
    /// Publish to every process subscribed to `topic`. Returns how many were reached.
    async fn publish(&self, topic: &str, message: &str) -> AppResult<usize>;

    /// Forward every message on `topic` into `sink`. The subscription lives as long
    /// as the returned task; aborting it releases the subscription.
    async fn forward(
        &self,
        topic: &str,
        sink: broadcast::Sender<String>,
    ) -> AppResult<JoinHandle<()>>;
}
