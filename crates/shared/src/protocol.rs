use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DiscussionId, Identity, MessageId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionSummary {
    pub id: DiscussionId,
    pub peer_identity: Identity,
    pub peer_display_name: String,
    #[serde(default)]
    pub peer_role: String,
    #[serde(default)]
    pub last_message_preview: String,
    pub last_message_time: DateTime<Utc>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub seen: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub discussion_id: DiscussionId,
    pub sender_identity: Identity,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Result of a find-or-create between two identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionDescriptor {
    pub id: DiscussionId,
    #[serde(default)]
    pub participants: Vec<Identity>,
    #[serde(default)]
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartDiscussionRequest {
    pub identity_a: Identity,
    pub identity_b: Identity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub sender_identity: Identity,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkSeenRequest {
    pub identity: Identity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    /// Interprets the body of a 2xx response. An empty body or any JSON object
    /// acknowledges the request unless it carries a falsy `success`; falsy
    /// scalars (`false`, `null`, `0`, `""`) are refusals.
    pub fn from_body(body: &str) -> Self {
        let body = body.trim();
        if body.is_empty() {
            return Self { success: true };
        }
        let success = match serde_json::from_str::<serde_json::Value>(body) {
            Ok(serde_json::Value::Object(map)) => map.get("success").map_or(true, is_truthy),
            Ok(value) => is_truthy(&value),
            Err(_) => true,
        };
        Self { success }
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(flag) => *flag,
        serde_json::Value::Number(number) => number.as_f64().map_or(true, |n| n != 0.0),
        serde_json::Value::String(text) => !text.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    }
}
