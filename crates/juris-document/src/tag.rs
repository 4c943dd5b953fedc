//! Bracket tag vocabulary
//!
//! Tags look like `[NAME]`, `[NAME: Title]` and `[/NAME]`. The set of names
//! is closed; anything else in brackets is ordinary text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest bracketed span considered as a tag
const MAX_TAG_LEN: usize = 160;

/// Widget kinds understood by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKind {
    Comparison,
    Carousel,
    Infographic,
    Statistics,
    ProcessFlow,
    Tabs,
    Accordion,
    Slides,
    Attention,
    Tip,
    Important,
    Note,
    Example,
}

impl WidgetKind {
    pub const ALL: [WidgetKind; 13] = [
        WidgetKind::Comparison,
        WidgetKind::Carousel,
        WidgetKind::Infographic,
        WidgetKind::Statistics,
        WidgetKind::ProcessFlow,
        WidgetKind::Tabs,
        WidgetKind::Accordion,
        WidgetKind::Slides,
        WidgetKind::Attention,
        WidgetKind::Tip,
        WidgetKind::Important,
        WidgetKind::Note,
        WidgetKind::Example,
    ];

    /// Canonical tag name as written by the model
    pub fn tag_name(&self) -> &'static str {
        match self {
            WidgetKind::Comparison => "COMPARAÇÃO",
            WidgetKind::Carousel => "CARROSSEL",
            WidgetKind::Infographic => "INFOGRÁFICO",
            WidgetKind::Statistics => "ESTATÍSTICAS",
            WidgetKind::ProcessFlow => "PASSO-A-PASSO",
            WidgetKind::Tabs => "ABAS",
            WidgetKind::Accordion => "ACORDEÃO",
            WidgetKind::Slides => "SLIDES",
            WidgetKind::Attention => "ATENÇÃO",
            WidgetKind::Tip => "DICA",
            WidgetKind::Important => "IMPORTANTE",
            WidgetKind::Note => "NOTA",
            WidgetKind::Example => "EXEMPLO",
        }
    }

    /// Look up a tag name, accepting case and accent variations
    pub fn from_tag_name(name: &str) -> Option<Self> {
        let folded = fold(name);
        FOLDED_NAMES
            .iter()
            .find(|(known, _)| *known == folded)
            .map(|&(_, kind)| kind)
    }

    /// Whether the block body is a JSON payload (as opposed to callout text)
    pub fn has_json_payload(&self) -> bool {
        !self.is_callout()
    }

    pub fn is_callout(&self) -> bool {
        matches!(
            self,
            WidgetKind::Attention
                | WidgetKind::Tip
                | WidgetKind::Important
                | WidgetKind::Note
                | WidgetKind::Example
        )
    }

    /// The closing tag for this kind, e.g. `[/COMPARAÇÃO]`
    pub fn closer(&self) -> String {
        format!("[/{}]", self.tag_name())
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_name())
    }
}

/// Folded spellings accepted for each kind
const FOLDED_NAMES: [(&str, WidgetKind); 17] = [
    ("COMPARACAO", WidgetKind::Comparison),
    ("COMPARATIVO", WidgetKind::Comparison),
    ("CARROSSEL", WidgetKind::Carousel),
    ("CARROSEL", WidgetKind::Carousel),
    ("INFOGRAFICO", WidgetKind::Infographic),
    ("ESTATISTICAS", WidgetKind::Statistics),
    ("ESTATISTICA", WidgetKind::Statistics),
    ("PASSO-A-PASSO", WidgetKind::ProcessFlow),
    ("FLUXO", WidgetKind::ProcessFlow),
    ("ABAS", WidgetKind::Tabs),
    ("ACORDEAO", WidgetKind::Accordion),
    ("SLIDES", WidgetKind::Slides),
    ("ATENCAO", WidgetKind::Attention),
    ("DICA", WidgetKind::Tip),
    ("IMPORTANTE", WidgetKind::Important),
    ("NOTA", WidgetKind::Note),
    ("EXEMPLO", WidgetKind::Example),
];

/// Uppercase, strip Portuguese accents and normalize separators
fn fold(name: &str) -> String {
    name.trim()
        .chars()
        .flat_map(char::to_uppercase)
        .map(|c| match c {
            'Á' | 'À' | 'Â' | 'Ã' => 'A',
            'É' | 'Ê' => 'E',
            'Í' => 'I',
            'Ó' | 'Ô' | 'Õ' => 'O',
            'Ú' | 'Ü' => 'U',
            'Ç' => 'C',
            ' ' | '_' => '-',
            other => other,
        })
        .collect()
}

/// A tag recognized at some byte offset of the text
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TagToken {
    Open { kind: WidgetKind, title: Option<String> },
    Close { kind: WidgetKind },
}

/// Try to read a known tag starting at `start`, which must point at `[`.
///
/// Returns the token and the byte offset just past its `]`.
pub(crate) fn parse_tag_at(text: &str, start: usize) -> Option<(TagToken, usize)> {
    let rest = text.get(start..)?.strip_prefix('[')?;
    let window = &rest[..floor_char_boundary(rest, MAX_TAG_LEN)];
    let close = window.find(']')?;
    let inner = &window[..close];
    if inner.contains('\n') || inner.contains('[') {
        return None;
    }
    let end = start + 1 + close + 1;

    if let Some(name) = inner.strip_prefix('/') {
        let kind = WidgetKind::from_tag_name(name)?;
        return Some((TagToken::Close { kind }, end));
    }

    let (name, title) = match inner.split_once(':') {
        Some((name, title)) => {
            let title = title.trim();
            (name, (!title.is_empty()).then(|| title.to_string()))
        }
        None => (inner, None),
    };
    let kind = WidgetKind::from_tag_name(name)?;
    Some((TagToken::Open { kind, title }, end))
}

/// An opener cut off by the end of the text, such as `[COMPARA` or
/// `[ABAS: Pen`, that may still become a known tag.
///
/// Returns the first kind it could turn into.
pub(crate) fn partial_opener_at(text: &str, start: usize) -> Option<WidgetKind> {
    let rest = text.get(start..)?.strip_prefix('[')?;
    if rest.len() >= MAX_TAG_LEN || rest.contains([']', '[', '\n']) || rest.starts_with('/') {
        return None;
    }
    if let Some((name, _)) = rest.split_once(':') {
        return WidgetKind::from_tag_name(name);
    }
    let folded = fold(rest.trim_start());
    if folded.is_empty() {
        return None;
    }
    // a trailing space may be the start of a separator, as in `PASSO A`
    let folded = if rest.ends_with(' ') { format!("{folded}-") } else { folded };
    FOLDED_NAMES
        .iter()
        .find(|(known, _)| known.starts_with(&folded))
        .map(|&(_, kind)| kind)
}

/// Locate the next closer for `kind` at or after `from`.
///
/// Returns the byte range of the closer.
pub(crate) fn find_closer(text: &str, from: usize, kind: WidgetKind) -> Option<(usize, usize)> {
    let mut search = from;
    while let Some(offset) = text.get(search..)?.find("[/") {
        let start = search + offset;
        if let Some((TagToken::Close { kind: found }, end)) = parse_tag_at(text, start) {
            if found == kind {
                return Some((start, end));
            }
        }
        search = start + 2;
    }
    None
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut idx = max;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
