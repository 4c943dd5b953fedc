//! Document nodes produced by the tokenizer

use crate::payload::WidgetPayload;
use crate::tag::WidgetKind;
use serde::Serialize;

/// A fully closed widget block with a validated payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Widget {
    pub kind: WidgetKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub payload: WidgetPayload,
}

/// One span of assistant text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Node {
    /// Plain markdown text
    Text(String),
    /// A closed and validated widget block
    Widget(Widget),
    /// A block that opened but has not closed yet
    Pending {
        kind: WidgetKind,
        title: Option<String>,
    },
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(text.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Node::Pending { .. })
    }
}

/// Appends nodes, merging adjacent text
#[derive(Debug, Default)]
pub(crate) struct NodeBuilder {
    nodes: Vec<Node>,
    text: String,
}

impl NodeBuilder {
    pub(crate) fn push_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    pub(crate) fn push_node(&mut self, node: Node) {
        if let Node::Text(text) = node {
            self.text.push_str(&text);
            return;
        }
        self.flush();
        self.nodes.push(node);
    }

    fn flush(&mut self) {
        if !self.text.is_empty() {
            self.nodes.push(Node::Text(std::mem::take(&mut self.text)));
        }
    }

    pub(crate) fn finish(mut self) -> Vec<Node> {
        self.flush();
        self.nodes
    }
}
