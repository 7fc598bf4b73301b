use std::{sync::Arc, time::Duration};

use shared::{
    domain::{DiscussionId, Identity},
    protocol::DiscussionSummary,
};
use tokio::{
    sync::{broadcast, Mutex},
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{error::RefreshOutcome, transport::ChatTransport, ChatEvent};

/// Ordered discussion summaries for the signed-in identity, refreshed through a
/// time gate: a call inside the cooldown of the last accepted call issues no request.
pub struct DiscussionRegistry {
    transport: Arc<dyn ChatTransport>,
    cooldown: Duration,
    state: Mutex<RegistryState>,
    events: broadcast::Sender<ChatEvent>,
}

struct RegistryState {
    discussions: Arc<Vec<DiscussionSummary>>,
    last_accepted: Option<Instant>,
    generation: u64,
}

impl DiscussionRegistry {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        cooldown: Duration,
        events: broadcast::Sender<ChatEvent>,
    ) -> Self {
        Self {
            transport,
            cooldown,
            state: Mutex::new(RegistryState {
                discussions: Arc::new(Vec::new()),
                last_accepted: None,
                generation: 0,
            }),
            events,
        }
    }

    pub async fn refresh(&self, identity: &Identity) -> RefreshOutcome {
        let generation = {
            let mut guard = self.state.lock().await;
            let now = Instant::now();
            if let Some(last) = guard.last_accepted {
                if now.duration_since(last) < self.cooldown {
                    debug!("discussions: refresh throttled identity={identity}");
                    return RefreshOutcome::Throttled(Arc::clone(&guard.discussions));
                }
            }
            guard.last_accepted = Some(now);
            guard.generation += 1;
            guard.generation
        };

        let result = self.transport.list_discussions(identity).await;

        let mut guard = self.state.lock().await;
        if guard.generation != generation {
            debug!("discussions: dropping superseded refresh identity={identity}");
            return RefreshOutcome::Stale;
        }

        match result {
            Ok(mut discussions) => {
                sort_by_recency(&mut discussions);
                let discussions = Arc::new(discussions);
                guard.discussions = Arc::clone(&discussions);
                drop(guard);
                info!(
                    "discussions: refreshed identity={identity} count={}",
                    discussions.len()
                );
                let _ = self
                    .events
                    .send(ChatEvent::DiscussionsUpdated(Arc::clone(&discussions)));
                RefreshOutcome::Fetched(discussions)
            }
            Err(err) => {
                let empty = Arc::new(Vec::new());
                guard.discussions = Arc::clone(&empty);
                drop(guard);
                warn!("discussions: refresh failed identity={identity}: {err}");
                let _ = self.events.send(ChatEvent::SyncFailed {
                    operation: "list discussions",
                    error: err.clone(),
                });
                let _ = self.events.send(ChatEvent::DiscussionsUpdated(empty));
                RefreshOutcome::Failed(err)
            }
        }
    }

    pub async fn discussions(&self) -> Arc<Vec<DiscussionSummary>> {
        Arc::clone(&self.state.lock().await.discussions)
    }

    pub async fn get(&self, discussion_id: &DiscussionId) -> Option<DiscussionSummary> {
        self.state
            .lock()
            .await
            .discussions
            .iter()
            .find(|summary| &summary.id == discussion_id)
            .cloned()
    }

    pub async fn unread_count(&self, discussion_id: &DiscussionId) -> u32 {
        self.get(discussion_id)
            .await
            .map(|summary| summary.unread_count)
            .unwrap_or(0)
    }

    pub async fn total_unread(&self) -> u32 {
        self.state
            .lock()
            .await
            .discussions
            .iter()
            .map(|summary| summary.unread_count)
            .sum()
    }

    /// Zeroes the unread count of one discussion without a round trip.
    /// Returns whether anything changed.
    pub async fn mark_seen_locally(&self, discussion_id: &DiscussionId) -> bool {
        let mut guard = self.state.lock().await;
        let needs_update = guard.discussions.iter().any(|summary| {
            &summary.id == discussion_id && (summary.unread_count > 0 || !summary.seen)
        });
        if !needs_update {
            return false;
        }

        let updated: Vec<DiscussionSummary> = guard
            .discussions
            .iter()
            .cloned()
            .map(|mut summary| {
                if &summary.id == discussion_id {
                    summary.unread_count = 0;
                    summary.seen = true;
                }
                summary
            })
            .collect();
        let updated = Arc::new(updated);
        guard.discussions = Arc::clone(&updated);
        drop(guard);

        let _ = self.events.send(ChatEvent::DiscussionsUpdated(updated));
        true
    }

    /// Drops all discussions and the throttle state; in-flight refreshes are discarded.
    pub async fn clear(&self) {
        let mut guard = self.state.lock().await;
        guard.discussions = Arc::new(Vec::new());
        guard.last_accepted = None;
        guard.generation += 1;
        let empty = Arc::clone(&guard.discussions);
        drop(guard);
        let _ = self.events.send(ChatEvent::DiscussionsUpdated(empty));
    }
}

/// Most recent first. Stable, so equal timestamps keep backend order.
pub fn sort_by_recency(discussions: &mut [DiscussionSummary]) {
    discussions.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
