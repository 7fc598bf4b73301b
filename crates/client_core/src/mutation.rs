use std::sync::Arc;

use shared::domain::{DiscussionId, Identity, MessageId};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    error::{MutationOutcome, MutationRejection, TransportError},
    thread::MessageThreadCache,
    transport::ChatTransport,
    ChatEvent,
};

/// Send, edit and delete. Nothing is patched locally: a successful mutation
/// invalidates the thread and the reload carries the server's state.
pub struct MutationPipeline {
    transport: Arc<dyn ChatTransport>,
    thread: Arc<MessageThreadCache>,
    events: broadcast::Sender<ChatEvent>,
}

impl MutationPipeline {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        thread: Arc<MessageThreadCache>,
        events: broadcast::Sender<ChatEvent>,
    ) -> Self {
        Self {
            transport,
            thread,
            events,
        }
    }

    pub async fn send_message(
        &self,
        discussion_id: &DiscussionId,
        sender: &Identity,
        content: &str,
    ) -> MutationOutcome {
        if content.trim().is_empty() {
            debug!("mutation: ignoring empty message for discussion={discussion_id}");
            return MutationOutcome::Rejected(MutationRejection::EmptyContent);
        }

        let active = self.thread.active().await;
        let result = self
            .transport
            .send_message(discussion_id, sender, content)
            .await;
        self.finish("send message", active, result).await
    }

    pub async fn update_message(&self, message_id: &MessageId, content: &str) -> MutationOutcome {
        let active = self.thread.active().await;
        let result = self.transport.update_message(message_id, content).await;
        self.finish("update message", active, result).await
    }

    pub async fn delete_message(&self, message_id: &MessageId) -> MutationOutcome {
        let active = self.thread.active().await;
        let result = self.transport.delete_message(message_id).await;
        self.finish("delete message", active, result).await
    }

    /// On success, reloads the discussion that was active when the mutation
    /// was issued; if the user has switched away since, that switch already
    /// loaded a fresh thread.
    async fn finish(
        &self,
        operation: &'static str,
        active: Option<DiscussionId>,
        result: Result<(), TransportError>,
    ) -> MutationOutcome {
        match result {
            Ok(()) => {
                if let Some(discussion_id) = active {
                    self.thread.invalidate_if_active(&discussion_id).await;
                }
                MutationOutcome::Applied
            }
            Err(err) => {
                warn!("mutation: {operation} failed: {err}");
                let _ = self.events.send(ChatEvent::SyncFailed {
                    operation,
                    error: err.clone(),
                });
                MutationOutcome::Failed(err)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/mutation_tests.rs"]
mod tests;
