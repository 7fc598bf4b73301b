use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Weak,
};

use shared::{
    domain::{DiscussionId, Identity, MessageId},
    protocol::{DiscussionDescriptor, DiscussionSummary, Message},
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use crate::{
    config::ChatSettings,
    error::{MutationOutcome, MutationRejection, RefreshOutcome, ThreadLoad, TransportError},
    mutation::MutationPipeline,
    registry::DiscussionRegistry,
    seen::SeenReconciler,
    thread::MessageThreadCache,
    transport::ChatTransport,
    ChatEvent, EVENT_CHANNEL_CAPACITY,
};

#[derive(Debug, Clone, Error)]
pub enum StartDiscussionError {
    #[error("session is signed out")]
    SignedOut,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Chat state for one signed-in identity. The identity is fixed for the
/// lifetime of the session; signing out empties every piece of state.
pub struct ChatSession {
    identity: Identity,
    settings: ChatSettings,
    transport: Arc<dyn ChatTransport>,
    registry: Arc<DiscussionRegistry>,
    thread: Arc<MessageThreadCache>,
    mutations: MutationPipeline,
    seen: SeenReconciler,
    signed_out: AtomicBool,
    poller: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<ChatEvent>,
}

impl ChatSession {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        identity: Identity,
        settings: ChatSettings,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let registry = Arc::new(DiscussionRegistry::new(
            Arc::clone(&transport),
            settings.refresh_cooldown(),
            events.clone(),
        ));
        let thread = Arc::new(MessageThreadCache::new(
            Arc::clone(&transport),
            events.clone(),
        ));
        let mutations =
            MutationPipeline::new(Arc::clone(&transport), Arc::clone(&thread), events.clone());
        let seen = SeenReconciler::new(
            Arc::clone(&transport),
            Arc::clone(&registry),
            settings.optimistic_seen,
            events.clone(),
        );

        Arc::new(Self {
            identity,
            settings,
            transport,
            registry,
            thread,
            mutations,
            seen,
            signed_out: AtomicBool::new(false),
            poller: Mutex::new(None),
            events,
        })
    }

    /// Builds the session and performs the initial discussion refresh.
    pub async fn connect(
        transport: Arc<dyn ChatTransport>,
        identity: Identity,
        settings: ChatSettings,
    ) -> Arc<Self> {
        let session = Self::new(transport, identity, settings);
        info!("chat: session started identity={}", session.identity);
        session.refresh_discussions().await;
        session
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn is_signed_out(&self) -> bool {
        self.signed_out.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub async fn discussions(&self) -> Arc<Vec<DiscussionSummary>> {
        self.registry.discussions().await
    }

    pub async fn discussion(&self, discussion_id: &DiscussionId) -> Option<DiscussionSummary> {
        self.registry.get(discussion_id).await
    }

    pub async fn total_unread(&self) -> u32 {
        self.registry.total_unread().await
    }

    pub async fn active_discussion(&self) -> Option<DiscussionId> {
        self.thread.active().await
    }

    pub async fn messages(&self) -> Arc<Vec<Message>> {
        self.thread.messages().await
    }

    pub async fn refresh_discussions(&self) -> RefreshOutcome {
        if self.is_signed_out() {
            return RefreshOutcome::Skipped;
        }
        self.registry.refresh(&self.identity).await
    }

    /// Reloads the active thread, e.g. after an external change notification.
    pub async fn reload_thread(&self) -> ThreadLoad {
        if self.is_signed_out() {
            return ThreadLoad::Skipped;
        }
        self.thread.load().await
    }

    /// Opens `discussion_id`: reconciles unread messages first when there are
    /// any, then switches the active discussion and loads its thread. The load
    /// happens whether or not the seen call succeeded.
    pub async fn open_discussion(&self, discussion_id: &DiscussionId) -> ThreadLoad {
        if self.is_signed_out() {
            return ThreadLoad::Skipped;
        }

        if self.registry.unread_count(discussion_id).await > 0 {
            let _ = self.seen.mark_seen(discussion_id, &self.identity).await;
            if self.is_signed_out() {
                debug!("chat: signed out while opening discussion={discussion_id}");
                return ThreadLoad::Skipped;
            }
        }

        self.thread.activate(discussion_id.clone()).await;
        self.thread.load().await
    }

    pub async fn send_message(&self, content: &str) -> MutationOutcome {
        if self.is_signed_out() {
            return MutationOutcome::Rejected(MutationRejection::SignedOut);
        }
        let Some(discussion_id) = self.thread.active().await else {
            debug!("chat: send ignored, no discussion open");
            return MutationOutcome::Rejected(MutationRejection::NoActiveDiscussion);
        };
        self.mutations
            .send_message(&discussion_id, &self.identity, content)
            .await
    }

    pub async fn edit_message(&self, message_id: &MessageId, content: &str) -> MutationOutcome {
        if self.is_signed_out() {
            return MutationOutcome::Rejected(MutationRejection::SignedOut);
        }
        self.mutations.update_message(message_id, content).await
    }

    pub async fn delete_message(&self, message_id: &MessageId) -> MutationOutcome {
        if self.is_signed_out() {
            return MutationOutcome::Rejected(MutationRejection::SignedOut);
        }
        self.mutations.delete_message(message_id).await
    }

    /// Finds or creates the discussion with `peer`. Does not open it.
    pub async fn start_discussion(
        &self,
        peer: &Identity,
    ) -> Result<DiscussionDescriptor, StartDiscussionError> {
        if self.is_signed_out() {
            return Err(StartDiscussionError::SignedOut);
        }
        match self.transport.start_discussion(&self.identity, peer).await {
            Ok(descriptor) => {
                info!(
                    "chat: discussion ready id={} peer={peer} created={}",
                    descriptor.id, descriptor.created
                );
                Ok(descriptor)
            }
            Err(err) => {
                warn!("chat: start discussion failed peer={peer}: {err}");
                let _ = self.events.send(ChatEvent::SyncFailed {
                    operation: "start discussion",
                    error: err.clone(),
                });
                Err(err.into())
            }
        }
    }

    /// Periodically refreshes the discussion list and the active thread.
    /// Replaces any poller already running.
    pub async fn spawn_poller(self: &Arc<Self>) {
        let session: Weak<Self> = Arc::downgrade(self);
        let period = self.settings.poll_interval();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(session) = session.upgrade() else {
                    break;
                };
                if session.is_signed_out() {
                    break;
                }
                session.refresh_discussions().await;
                session.thread.load().await;
            }
        });

        let previous = self.poller.lock().await.replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub async fn stop_poller(&self) {
        if let Some(task) = self.poller.lock().await.take() {
            task.abort();
        }
    }

    pub async fn sign_out(&self) {
        if self.signed_out.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_poller().await;
        self.thread.clear().await;
        self.registry.clear().await;
        info!("chat: signed out identity={}", self.identity);
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
