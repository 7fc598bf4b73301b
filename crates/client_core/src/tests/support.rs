use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    domain::{DiscussionId, Identity, MessageId},
    protocol::{DiscussionDescriptor, DiscussionSummary, Message},
};
use tokio::sync::{Mutex, Notify};

use crate::{error::TransportError, transport::ChatTransport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListDiscussions(Identity),
    ListMessages(DiscussionId),
    StartDiscussion(Identity, Identity),
    SendMessage(DiscussionId, Identity, String),
    UpdateMessage(MessageId, String),
    DeleteMessage(MessageId),
    MarkSeen(DiscussionId, Identity),
}

/// In-memory backend that records every call in order.
#[derive(Default)]
pub struct FakeTransport {
    pub calls: Mutex<Vec<Call>>,
    pub discussions: Mutex<Vec<DiscussionSummary>>,
    pub threads: Mutex<HashMap<DiscussionId, Vec<Message>>>,
    pub failing: Mutex<HashSet<&'static str>>,
    pub gates: Mutex<HashMap<DiscussionId, Arc<Notify>>>,
    pub delays: Mutex<HashMap<&'static str, Duration>>,
    next_message: Mutex<u64>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn with_discussions(
        self: Arc<Self>,
        discussions: Vec<DiscussionSummary>,
    ) -> Arc<Self> {
        *self.discussions.lock().await = discussions;
        self
    }

    pub async fn with_thread(
        self: Arc<Self>,
        discussion_id: &str,
        messages: Vec<Message>,
    ) -> Arc<Self> {
        self.threads
            .lock()
            .await
            .insert(DiscussionId::new(discussion_id), messages);
        self
    }

    pub async fn fail(&self, operation: &'static str) {
        self.failing.lock().await.insert(operation);
    }

    pub async fn recover(&self, operation: &'static str) {
        self.failing.lock().await.remove(operation);
    }

    /// Makes `operation` take `delay` before it answers.
    pub async fn delay(&self, operation: &'static str, delay: Duration) {
        self.delays.lock().await.insert(operation, delay);
    }

    /// Holds `list_messages` for a discussion until the returned handle is notified.
    pub async fn gate(&self, discussion_id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .await
            .insert(DiscussionId::new(discussion_id), Arc::clone(&gate));
        gate
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    pub async fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|&call| predicate(call))
            .count()
    }

    async fn record(&self, call: Call, operation: &'static str) -> Result<(), TransportError> {
        self.calls.lock().await.push(call);
        let delay = self.delays.lock().await.get(operation).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().await.contains(operation) {
            return Err(TransportError::Status { status: 500 });
        }
        Ok(())
    }

    async fn find_message(&self, message_id: &MessageId) -> Option<(DiscussionId, usize)> {
        let threads = self.threads.lock().await;
        threads.iter().find_map(|(discussion_id, messages)| {
            messages
                .iter()
                .position(|message| &message.id == message_id)
                .map(|index| (discussion_id.clone(), index))
        })
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn list_discussions(
        &self,
        identity: &Identity,
    ) -> Result<Vec<DiscussionSummary>, TransportError> {
        self.record(Call::ListDiscussions(identity.clone()), "list_discussions")
            .await?;
        Ok(self.discussions.lock().await.clone())
    }

    async fn list_messages(
        &self,
        discussion_id: &DiscussionId,
    ) -> Result<Vec<Message>, TransportError> {
        self.calls
            .lock()
            .await
            .push(Call::ListMessages(discussion_id.clone()));
        let gate = self.gates.lock().await.get(discussion_id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.failing.lock().await.contains("list_messages") {
            return Err(TransportError::Request("connection reset".to_string()));
        }
        Ok(self
            .threads
            .lock()
            .await
            .get(discussion_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn start_discussion(
        &self,
        identity_a: &Identity,
        identity_b: &Identity,
    ) -> Result<DiscussionDescriptor, TransportError> {
        self.record(
            Call::StartDiscussion(identity_a.clone(), identity_b.clone()),
            "start_discussion",
        )
        .await?;
        Ok(DiscussionDescriptor {
            id: DiscussionId::new(format!("{identity_a}:{identity_b}")),
            participants: vec![identity_a.clone(), identity_b.clone()],
            created: true,
        })
    }

    async fn send_message(
        &self,
        discussion_id: &DiscussionId,
        sender: &Identity,
        content: &str,
    ) -> Result<(), TransportError> {
        self.record(
            Call::SendMessage(discussion_id.clone(), sender.clone(), content.to_string()),
            "send_message",
        )
        .await?;
        let id = {
            let mut next = self.next_message.lock().await;
            *next += 1;
            MessageId::new(format!("sent-{next}"))
        };
        self.threads
            .lock()
            .await
            .entry(discussion_id.clone())
            .or_default()
            .push(Message {
                id,
                discussion_id: discussion_id.clone(),
                sender_identity: sender.clone(),
                content: content.to_string(),
                timestamp: at(10_000),
            });
        Ok(())
    }

    async fn update_message(
        &self,
        message_id: &MessageId,
        content: &str,
    ) -> Result<(), TransportError> {
        self.record(
            Call::UpdateMessage(message_id.clone(), content.to_string()),
            "update_message",
        )
        .await?;
        let Some((discussion_id, index)) = self.find_message(message_id).await else {
            return Err(TransportError::Status { status: 404 });
        };
        if let Some(messages) = self.threads.lock().await.get_mut(&discussion_id) {
            messages[index].content = content.to_string();
        }
        Ok(())
    }

    async fn delete_message(&self, message_id: &MessageId) -> Result<(), TransportError> {
        self.record(Call::DeleteMessage(message_id.clone()), "delete_message")
            .await?;
        let Some((discussion_id, index)) = self.find_message(message_id).await else {
            return Err(TransportError::Status { status: 404 });
        };
        if let Some(messages) = self.threads.lock().await.get_mut(&discussion_id) {
            messages.remove(index);
        }
        Ok(())
    }

    async fn mark_seen(
        &self,
        discussion_id: &DiscussionId,
        identity: &Identity,
    ) -> Result<(), TransportError> {
        self.record(
            Call::MarkSeen(discussion_id.clone(), identity.clone()),
            "mark_seen",
        )
        .await
    }
}

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).expect("timestamp")
}

pub fn summary(
    id: &str,
    peer: &str,
    last_message_secs: i64,
    unread_count: u32,
) -> DiscussionSummary {
    DiscussionSummary {
        id: DiscussionId::new(id),
        peer_identity: Identity::new(peer),
        peer_display_name: peer.split('@').next().unwrap_or(peer).to_string(),
        peer_role: "artist".to_string(),
        last_message_preview: format!("latest in {id}"),
        last_message_time: at(last_message_secs),
        unread_count,
        seen: unread_count == 0,
    }
}

pub fn message(
    id: &str,
    discussion_id: &str,
    sender: &str,
    content: &str,
    secs: i64,
) -> Message {
    Message {
        id: MessageId::new(id),
        discussion_id: DiscussionId::new(discussion_id),
        sender_identity: Identity::new(sender),
        content: content.to_string(),
        timestamp: at(secs),
    }
}
