//! Single-pass tokenizer for bracket-tagged assistant text

use crate::node::{Node, NodeBuilder, Widget};
use crate::payload::WidgetPayload;
use crate::tag::{TagToken, find_closer, parse_tag_at, partial_opener_at};
use tracing::debug;

/// Split assistant text into text, widget and pending nodes.
///
/// A block whose closer has not arrived yet becomes [`Node::Pending`] and
/// everything after its opener is withheld, so half-written JSON is never
/// shown. So does an opener cut off mid-name at the end of the text. A block whose body fails its schema is kept verbatim as text.
pub fn tokenize(text: &str) -> Vec<Node> {
    tokenize_with_tail(text).0
}

/// Like [`tokenize`], also returning the byte offset of a pending opener
pub(crate) fn tokenize_with_tail(text: &str) -> (Vec<Node>, Option<usize>) {
    let mut out = NodeBuilder::default();
    let mut pos = 0;

    while pos < text.len() {
        let Some(offset) = text[pos..].find('[') else {
            out.push_text(&text[pos..]);
            break;
        };
        let start = pos + offset;
        out.push_text(&text[pos..start]);

        let Some((TagToken::Open { kind, title }, open_end)) = parse_tag_at(text, start) else {
            if let Some(kind) = partial_opener_at(text, start) {
                out.push_node(Node::Pending { kind, title: None });
                return (out.finish(), Some(start));
            }
            // Unknown brackets and stray closers are plain text
            out.push_text("[");
            pos = start + 1;
            continue;
        };

        let Some((close_start, close_end)) = find_closer(text, open_end, kind) else {
            out.push_node(Node::Pending { kind, title });
            return (out.finish(), Some(start));
        };

        match WidgetPayload::decode(kind, &text[open_end..close_start]) {
            Ok(payload) => out.push_node(Node::Widget(Widget {
                kind,
                title,
                payload,
            })),
            Err(e) => {
                debug!(error = %e, "keeping malformed widget block as text");
                out.push_text(&text[start..close_end]);
            }
        }
        pos = close_end;
    }

    (out.finish(), None)
}
