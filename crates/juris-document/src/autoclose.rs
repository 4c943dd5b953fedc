//! Best-effort closing of truncated widget blocks
//!
//! Generation sometimes stops before the model writes a closer. For JSON
//! blocks the payload itself tells where the block should end: the closer is
//! inserted right after the payload's braces balance. When they never
//! balance the text is returned untouched and the block stays inert text.

use crate::tag::{TagToken, find_closer, parse_tag_at};
use std::borrow::Cow;

/// Insert missing closers after balanced JSON payloads
pub fn auto_close(text: &str) -> Cow<'_, str> {
    let mut insertions: Vec<(usize, String)> = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find('[') {
        let start = pos + offset;
        let Some((TagToken::Open { kind, .. }, open_end)) = parse_tag_at(text, start) else {
            pos = start + 1;
            continue;
        };

        if let Some((_, close_end)) = find_closer(text, open_end, kind) {
            pos = close_end;
            continue;
        }

        pos = open_end;
        if kind.has_json_payload() {
            if let Some(end) = balanced_payload_end(text, open_end) {
                insertions.push((end, kind.closer()));
                pos = end;
            }
        }
    }

    if insertions.is_empty() {
        return Cow::Borrowed(text);
    }

    let extra: usize = insertions.iter().map(|(_, closer)| closer.len()).sum();
    let mut closed = String::with_capacity(text.len() + extra);
    let mut copied = 0;
    for (at, closer) in insertions {
        closed.push_str(&text[copied..at]);
        closed.push_str(&closer);
        copied = at;
    }
    closed.push_str(&text[copied..]);
    Cow::Owned(closed)
}

/// Offset of the payload's first `{` or `[`. Only whitespace and an
/// optional code fence line may sit between the opener and the payload.
fn payload_start(text: &str, from: usize) -> Option<usize> {
    let mut rest = text[from..].trim_start();
    if let Some(fenced) = rest.strip_prefix("```") {
        let (lang, body) = fenced.split_once('\n')?;
        if !lang.trim().chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        rest = body.trim_start();
    }
    rest.starts_with(['{', '[']).then(|| text.len() - rest.len())
}

/// Byte offset just past the JSON value that opens the payload, tracking
/// string literals so quoted brackets are ignored
fn balanced_payload_end(text: &str, from: usize) -> Option<usize> {
    let json_start = payload_start(text, from)?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, &byte) in text.as_bytes()[json_start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(json_start + idx + 1);
                }
            }
            _ => {}
        }
    }
    None
}
