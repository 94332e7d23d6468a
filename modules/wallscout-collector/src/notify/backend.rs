use async_trait::async_trait;

use wallscout_common::NotifyMessage;

/// Outbound notification queue producer.
#[async_trait]
pub trait NotifyPublisher: Send + Sync {
    async fn publish(&self, message: &NotifyMessage) -> anyhow::Result<()>;
}
