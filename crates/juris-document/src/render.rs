//! Rendering entry point for live and finished messages

use crate::autoclose::auto_close;
use crate::node::{Node, NodeBuilder};
use crate::tag::parse_tag_at;
use crate::tokenizer::{tokenize, tokenize_with_tail};

/// Nodes to display for a message.
///
/// While `streaming`, an open block shows as [`Node::Pending`]. Once the
/// stream is over, truncated JSON blocks are auto-closed first; an opener
/// that still has no closer is shown as plain text and tokenizing resumes
/// right after it, so nothing after a broken block is lost.
pub fn render(text: &str, streaming: bool) -> Vec<Node> {
    if streaming {
        return tokenize(text);
    }

    let closed = auto_close(text);
    let text = closed.as_ref();

    let mut out = NodeBuilder::default();
    let mut pos = 0;
    while pos < text.len() {
        let (nodes, tail) = tokenize_with_tail(&text[pos..]);
        for node in nodes {
            if !node.is_pending() {
                out.push_node(node);
            }
        }
        let Some(tail) = tail else {
            break;
        };

        let opener_start = pos + tail;
        let opener_end = parse_tag_at(text, opener_start)
            .map(|(_, end)| end)
            .unwrap_or(text.len());
        out.push_text(&text[opener_start..opener_end]);
        pos = opener_end;
    }
    out.finish()
}
