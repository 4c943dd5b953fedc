//! juris-bridge: HTTP relay between chat clients and Gemini
//!
//! Exposes `POST /api/chat`, which answers either with one JSON body or with
//! a `text/event-stream` of `data:` frames ending in `data: [DONE]`.

pub mod config;
pub mod error;
pub mod server;

pub use config::Config;
pub use error::{ApiError, BridgeError, Result};
pub use server::{AppState, BridgeServer, create_router};
