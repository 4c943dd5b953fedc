//! juris-document: structured view of assistant text
//!
//! Assistant answers embed bracket-tagged widget blocks such as
//! `[COMPARAÇÃO: Título]{"cards":[...]}[/COMPARAÇÃO]`. This crate parses
//! such text into [`Node`]s in one pass, validates each payload against its
//! schema, closes truncated blocks once a stream ends and computes the
//! display metrics shown under a finished message.

pub mod autoclose;
pub mod metrics;
pub mod node;
pub mod payload;
pub mod render;
pub mod tag;
pub mod tokenizer;

pub use autoclose::auto_close;
pub use metrics::{DisplayMetrics, compute};
pub use node::{Node, Widget};
pub use payload::{PayloadError, WidgetPayload};
pub use render::render;
pub use tag::WidgetKind;
pub use tokenizer::tokenize;
