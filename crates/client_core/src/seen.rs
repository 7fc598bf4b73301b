use std::sync::Arc;

use shared::domain::{DiscussionId, Identity};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    error::TransportError, registry::DiscussionRegistry, transport::ChatTransport, ChatEvent,
};

pub struct SeenReconciler {
    transport: Arc<dyn ChatTransport>,
    registry: Arc<DiscussionRegistry>,
    optimistic: bool,
    events: broadcast::Sender<ChatEvent>,
}

impl SeenReconciler {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        registry: Arc<DiscussionRegistry>,
        optimistic: bool,
        events: broadcast::Sender<ChatEvent>,
    ) -> Self {
        Self {
            transport,
            registry,
            optimistic,
            events,
        }
    }

    /// Tells the backend `identity` has read `discussion_id`. With optimistic
    /// updates the local unread count is zeroed once the backend acknowledges;
    /// otherwise it waits for the next accepted discussion refresh.
    pub async fn mark_seen(
        &self,
        discussion_id: &DiscussionId,
        identity: &Identity,
    ) -> Result<(), TransportError> {
        if let Err(err) = self.transport.mark_seen(discussion_id, identity).await {
            warn!("seen: mark seen failed discussion={discussion_id}: {err}");
            let _ = self.events.send(ChatEvent::SyncFailed {
                operation: "mark seen",
                error: err.clone(),
            });
            return Err(err);
        }

        if self.optimistic && self.registry.mark_seen_locally(discussion_id).await {
            debug!("seen: cleared unread count locally discussion={discussion_id}");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/seen_tests.rs"]
mod tests;
