//! Chat synchronization engine: discussion list, the open thread, and the
//! mutations and seen-state reconciliation layered over a polling REST backend.

use std::sync::Arc;

use shared::{
    domain::DiscussionId,
    protocol::{DiscussionSummary, Message},
};

pub mod config;
pub mod error;
pub mod mutation;
pub mod registry;
pub mod seen;
pub mod session;
pub mod thread;
pub mod transport;

pub use config::{load_settings, ChatSettings};
pub use error::{
    MutationOutcome, MutationRejection, RefreshOutcome, ThreadLoad, TransportError,
};
pub use mutation::MutationPipeline;
pub use registry::DiscussionRegistry;
pub use seen::SeenReconciler;
pub use session::{ChatSession, StartDiscussionError};
pub use thread::MessageThreadCache;
pub use transport::{ChatTransport, HttpTransport};

pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// State changes published to observers (the UI layer).
#[derive(Debug, Clone)]
pub enum ChatEvent {
    DiscussionsUpdated(Arc<Vec<DiscussionSummary>>),
    ActiveDiscussionChanged(Option<DiscussionId>),
    ThreadUpdated {
        discussion_id: DiscussionId,
        messages: Arc<Vec<Message>>,
    },
    SyncFailed {
        operation: &'static str,
        error: TransportError,
    },
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
