use std::sync::Arc;

use shared::{
    error::ErrorCode,
    protocol::{DiscussionSummary, Message},
};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("server returned status {status}")]
    Status { status: u16 },
    #[error("server returned status {status} ({code:?}): {message}")]
    Api {
        status: u16,
        code: ErrorCode,
        message: String,
    },
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("server refused {operation}")]
    Rejected { operation: &'static str },
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            return Self::Decode(value.to_string());
        }
        match value.status() {
            Some(status) => Self::Status {
                status: status.as_u16(),
            },
            None => Self::Request(value.to_string()),
        }
    }
}

impl From<url::ParseError> for TransportError {
    fn from(value: url::ParseError) -> Self {
        Self::InvalidUrl(value.to_string())
    }
}

/// Result of a discussion-list refresh.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Fetched(Arc<Vec<DiscussionSummary>>),
    /// Inside the cooldown window; no request was issued.
    Throttled(Arc<Vec<DiscussionSummary>>),
    /// A newer accepted refresh replaced this one before it completed.
    Stale,
    /// The session is signed out.
    Skipped,
    Failed(TransportError),
}

impl RefreshOutcome {
    pub fn discussions(&self) -> Option<&Arc<Vec<DiscussionSummary>>> {
        match self {
            Self::Fetched(list) | Self::Throttled(list) => Some(list),
            Self::Stale | Self::Skipped | Self::Failed(_) => None,
        }
    }

    pub fn issued_request(&self) -> bool {
        !matches!(self, Self::Throttled(_) | Self::Skipped)
    }
}

/// Result of a thread (re)load.
#[derive(Debug, Clone)]
pub enum ThreadLoad {
    Loaded(Arc<Vec<Message>>),
    /// No discussion is active.
    Skipped,
    /// Superseded by a newer load or a discussion switch; response discarded.
    Stale,
    Failed(TransportError),
}

impl ThreadLoad {
    pub fn messages(&self) -> Option<&Arc<Vec<Message>>> {
        match self {
            Self::Loaded(messages) => Some(messages),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MutationRejection {
    #[error("message content is empty")]
    EmptyContent,
    #[error("no discussion is open")]
    NoActiveDiscussion,
    #[error("session is signed out")]
    SignedOut,
}

#[derive(Debug, Clone)]
pub enum MutationOutcome {
    Applied,
    Rejected(MutationRejection),
    Failed(TransportError),
}

impl MutationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Applied)
    }
}
