//! juris-client: consumer side of the chat relay
//!
//! A [`ChatSession`] owns the conversation, posts each user turn to the
//! bridge and applies the streamed `data:` frames to a live assistant
//! message. Every request carries a [`StreamHandle`] whose watchdog aborts
//! the request when the server never answers or goes quiet, and whose token
//! lets the user cancel. Interrupted answers are kept as partial messages
//! when enough text arrived, otherwise discarded.

pub mod conversation;
pub mod error;
pub mod events;
pub mod handle;
pub mod session;
pub mod watchdog;

pub use conversation::{ChatMessage, Conversation, MessageStatus};
pub use error::{ClientError, Result};
pub use events::{ClientEvent, WarningKind};
pub use handle::StreamHandle;
pub use session::{ChatSession, ClientConfig, Interruption, MIN_PARTIAL_CHARS, StreamOutcome};
pub use watchdog::{AbortReason, WatchdogConfig, WatchdogState};
