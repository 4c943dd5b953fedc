//! juris-ai: wire format, prompt templates and upstream provider
//!
//! This crate holds everything the chat relay shares between the server-side
//! bridge and the client-side consumer: the request/response types, the
//! `data:` line frame codec, the incremental JSON object framer used to
//! reassemble the upstream stream, the system prompt templates and the
//! Gemini provider.

pub mod error;
pub mod framer;
pub mod prompt;
pub mod providers;
pub mod types;
pub mod wire;

pub use error::{Error, Result};
pub use framer::JsonObjectFramer;
pub use types::*;
pub use wire::{LineBuffer, StreamFrame};
