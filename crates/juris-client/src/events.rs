//! Session event types

use crate::conversation::ChatMessage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Non-fatal conditions worth telling the user about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// The answer was cut short and only part of it is shown
    PartialResponse,
}

/// Events emitted while a message is exchanged
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// The assistant placeholder was created
    MessageStart { id: Uuid },

    /// A fragment appended to the live message
    MessageUpdate { id: Uuid, delta: String },

    /// The message reached a kept terminal state
    MessageEnd { message: ChatMessage },

    Warning { kind: WarningKind, message: String },

    /// Something failed and nothing was kept
    Error { message: String },
}

impl ClientEvent {
    /// Check if this event ends the exchange
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClientEvent::MessageEnd { .. } | ClientEvent::Error { .. })
    }
}
