//! Conversation state: chat messages and their lifecycle

use chrono::{DateTime, Utc};
use juris_ai::{ChatMode, Role, WireMessage};
use juris_document::DisplayMetrics;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a single message.
///
/// `Pending -> Streaming -> {Finalized | PartialFinalized | Discarded}`.
/// Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Placeholder created, no bytes yet
    Pending,
    /// Frames are being applied
    Streaming,
    /// Stream ended normally
    Finalized,
    /// Stream was cut short but enough content arrived to keep
    PartialFinalized,
    /// Stream was cut short with nothing worth keeping
    Discarded,
}

impl MessageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MessageStatus::Finalized | MessageStatus::PartialFinalized | MessageStatus::Discarded
        )
    }

    /// Whether moving to `next` is a legal transition
    pub fn can_transition_to(&self, next: MessageStatus) -> bool {
        match self {
            MessageStatus::Pending => next != MessageStatus::Pending,
            MessageStatus::Streaming => next.is_terminal(),
            _ => false,
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub is_streaming: bool,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<DisplayMetrics>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// A submitted user message; user messages are final from the start
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content: content.into(),
            is_streaming: false,
            status: MessageStatus::Finalized,
            metrics: None,
            timestamp: Utc::now(),
        }
    }

    /// An empty assistant message waiting for the stream
    pub fn assistant_placeholder() -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content: String::new(),
            is_streaming: true,
            status: MessageStatus::Pending,
            metrics: None,
            timestamp: Utc::now(),
        }
    }

    /// Move to `next`, refusing illegal transitions
    pub fn transition(&mut self, next: MessageStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::warn!(id = %self.id, from = ?self.status, to = ?next, "ignoring illegal status transition");
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.is_streaming = false;
        }
        true
    }

    /// Whether this message should be sent back as conversation history
    pub fn is_history(&self) -> bool {
        matches!(
            self.status,
            MessageStatus::Finalized | MessageStatus::PartialFinalized
        ) && !self.content.trim().is_empty()
    }
}

/// The owned list of messages for one chat
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    pub messages: Vec<ChatMessage>,
    pub mode: ChatMode,
}

impl Conversation {
    pub fn new(mode: ChatMode) -> Self {
        Self {
            messages: Vec::new(),
            mode,
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn get(&self, id: Uuid) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Remove a message from the list, returning it
    pub fn remove(&mut self, id: Uuid) -> Option<ChatMessage> {
        let idx = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(idx))
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Drop every message
    pub fn reset(&mut self) {
        self.messages.clear();
    }

    /// Switch mode, resetting the conversation when it actually changes.
    /// Returns whether a reset happened.
    pub fn set_mode(&mut self, mode: ChatMode) -> bool {
        if self.mode == mode {
            return false;
        }
        self.mode = mode;
        self.reset();
        true
    }

    /// Messages to send as history, in order
    pub fn history(&self) -> Vec<WireMessage> {
        self.messages
            .iter()
            .filter(|m| m.is_history())
            .map(|m| WireMessage {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }

    /// Whether any message is still streaming
    pub fn is_streaming(&self) -> bool {
        self.messages.iter().any(|m| m.is_streaming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use MessageStatus::*;
        assert!(Pending.can_transition_to(Streaming));
        assert!(Pending.can_transition_to(Discarded));
        assert!(Streaming.can_transition_to(PartialFinalized));
        assert!(!Streaming.can_transition_to(Pending));
        for terminal in [Finalized, PartialFinalized, Discarded] {
            assert!(terminal.is_terminal());
            for next in [Pending, Streaming, Finalized, PartialFinalized, Discarded] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_terminal_transition_clears_streaming_flag() {
        let mut msg = ChatMessage::assistant_placeholder();
        assert!(msg.is_streaming);
        assert!(msg.transition(MessageStatus::Streaming));
        assert!(msg.transition(MessageStatus::Finalized));
        assert!(!msg.is_streaming);
        assert!(!msg.transition(MessageStatus::Discarded));
        assert_eq!(msg.status, MessageStatus::Finalized);
    }

    #[test]
    fn test_history_skips_unfinished_messages() {
        let mut conv = Conversation::default();
        conv.push(ChatMessage::user("O que é dolo?"));
        let mut answer = ChatMessage::assistant_placeholder();
        answer.content = "Dolo é".to_string();
        conv.push(answer);

        let history = conv.history();
        assert_eq!(history, vec![WireMessage::user("O que é dolo?")]);
        assert!(conv.is_streaming());
    }

    #[test]
    fn test_set_mode_resets_only_on_change() {
        let mut conv = Conversation::new(ChatMode::Chat);
        conv.push(ChatMessage::user("oi"));
        assert!(!conv.set_mode(ChatMode::Chat));
        assert_eq!(conv.messages.len(), 1);
        assert!(conv.set_mode(ChatMode::Study));
        assert!(conv.messages.is_empty());
        assert_eq!(conv.mode, ChatMode::Study);
    }

    #[test]
    fn test_remove() {
        let mut conv = Conversation::default();
        let msg = ChatMessage::user("x");
        let id = msg.id;
        conv.push(msg);
        assert!(conv.remove(id).is_some());
        assert!(conv.get(id).is_none());
    }
}
