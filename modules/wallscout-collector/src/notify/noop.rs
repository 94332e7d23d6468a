use async_trait::async_trait;

use wallscout_common::NotifyMessage;

use super::backend::NotifyPublisher;

/// Drops every notification. For deployments without a notify queue.
pub struct NoopPublisher;

#[async_trait]
impl NotifyPublisher for NoopPublisher {
    async fn publish(&self, message: &NotifyMessage) -> anyhow::Result<()> {
        tracing::debug!(note_id = %message.note.id, "Notification dropped (no publisher configured)");
        Ok(())
    }
}
