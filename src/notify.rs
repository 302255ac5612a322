//! Notification collaborator
//!
//! Delivery is fire-and-forget: callers log failures and move on.

use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to publish notification: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: Uuid, payload: &serde_json::Value) -> Result<(), NotifyError>;
}

/// Publishes to `<prefix>.<user_id>` on NATS.
pub struct NatsNotifier { client: async_nats::Client, subject_prefix: String }

impl NatsNotifier {
    pub fn new(client: async_nats::Client, subject_prefix: impl Into<String>) -> Self {
        Self { client, subject_prefix: subject_prefix.into() }
    }

    pub fn subject_for(&self, user_id: Uuid) -> String { format!("{}.{}", self.subject_prefix, user_id) }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn notify(&self, user_id: Uuid, payload: &serde_json::Value) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(payload)?;
        self.client
            .publish(self.subject_for(user_id), body.into())
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))
    }
}

/// Used when no broker is configured.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, user_id: Uuid, payload: &serde_json::Value) -> Result<(), NotifyError> {
        tracing::info!(%user_id, %payload, "notification");
        Ok(())
    }
}
