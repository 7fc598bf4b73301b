use std::sync::Arc;

use shared::{domain::DiscussionId, protocol::Message};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{error::ThreadLoad, transport::ChatTransport, ChatEvent};

/// Messages of the single active discussion. Every load replaces the whole
/// thread; messages keep the order the backend returned them in.
pub struct MessageThreadCache {
    transport: Arc<dyn ChatTransport>,
    state: Mutex<ThreadState>,
    events: broadcast::Sender<ChatEvent>,
}

struct ThreadState {
    active: Option<DiscussionId>,
    messages: Arc<Vec<Message>>,
    refresh_token: bool,
    generation: u64,
    closed: bool,
}

impl MessageThreadCache {
    pub fn new(transport: Arc<dyn ChatTransport>, events: broadcast::Sender<ChatEvent>) -> Self {
        Self {
            transport,
            state: Mutex::new(ThreadState {
                active: None,
                messages: Arc::new(Vec::new()),
                refresh_token: false,
                generation: 0,
                closed: false,
            }),
            events,
        }
    }

    pub async fn active(&self) -> Option<DiscussionId> {
        self.state.lock().await.active.clone()
    }

    pub async fn messages(&self) -> Arc<Vec<Message>> {
        Arc::clone(&self.state.lock().await.messages)
    }

    pub async fn refresh_token(&self) -> bool {
        self.state.lock().await.refresh_token
    }

    /// Makes `discussion_id` the active discussion. Switching to a different
    /// discussion empties the thread until the next load lands. Refused once
    /// the cache has been cleared.
    pub async fn activate(&self, discussion_id: DiscussionId) -> bool {
        let mut guard = self.state.lock().await;
        if guard.closed || guard.active.as_ref() == Some(&discussion_id) {
            return false;
        }
        info!(
            "thread: switching from={} to={discussion_id}",
            guard
                .active
                .as_ref()
                .map(DiscussionId::as_str)
                .unwrap_or("none")
        );
        guard.active = Some(discussion_id.clone());
        guard.messages = Arc::new(Vec::new());
        drop(guard);

        let _ = self
            .events
            .send(ChatEvent::ActiveDiscussionChanged(Some(discussion_id)));
        true
    }

    /// Reloads the active thread. A no-op without an active discussion.
    pub async fn load(&self) -> ThreadLoad {
        let (discussion_id, generation) = {
            let mut guard = self.state.lock().await;
            let Some(discussion_id) = guard.active.clone() else {
                return ThreadLoad::Skipped;
            };
            guard.generation += 1;
            (discussion_id, guard.generation)
        };

        let result = self.transport.list_messages(&discussion_id).await;

        let mut guard = self.state.lock().await;
        if guard.generation != generation || guard.active.as_ref() != Some(&discussion_id) {
            debug!("thread: dropping superseded load discussion={discussion_id}");
            return ThreadLoad::Stale;
        }

        match result {
            Ok(messages) => {
                let messages = Arc::new(messages);
                guard.messages = Arc::clone(&messages);
                drop(guard);
                debug!(
                    "thread: loaded discussion={discussion_id} count={}",
                    messages.len()
                );
                let _ = self.events.send(ChatEvent::ThreadUpdated {
                    discussion_id,
                    messages: Arc::clone(&messages),
                });
                ThreadLoad::Loaded(messages)
            }
            Err(err) => {
                drop(guard);
                warn!("thread: load failed discussion={discussion_id}: {err}");
                let _ = self.events.send(ChatEvent::SyncFailed {
                    operation: "list messages",
                    error: err.clone(),
                });
                ThreadLoad::Failed(err)
            }
        }
    }

    /// Toggles the refresh token and reloads the active thread.
    pub async fn invalidate(&self) -> ThreadLoad {
        {
            let mut guard = self.state.lock().await;
            guard.refresh_token = !guard.refresh_token;
        }
        self.load().await
    }

    /// Like [`Self::invalidate`], but only while `discussion_id` is still the
    /// active discussion.
    pub async fn invalidate_if_active(&self, discussion_id: &DiscussionId) -> ThreadLoad {
        {
            let mut guard = self.state.lock().await;
            if guard.active.as_ref() != Some(discussion_id) {
                debug!("thread: skipping reload, discussion={discussion_id} no longer active");
                return ThreadLoad::Skipped;
            }
            guard.refresh_token = !guard.refresh_token;
        }
        self.load().await
    }

    /// Empties the cache for good: later activations are refused.
    pub async fn clear(&self) {
        let mut guard = self.state.lock().await;
        guard.closed = true;
        let had_active = guard.active.take().is_some();
        guard.messages = Arc::new(Vec::new());
        guard.generation += 1;
        drop(guard);

        if had_active {
            let _ = self.events.send(ChatEvent::ActiveDiscussionChanged(None));
        }
    }
}

#[cfg(test)]
#[path = "tests/thread_tests.rs"]
mod tests;
