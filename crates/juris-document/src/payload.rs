//! Typed payload schemas for JSON widget blocks
//!
//! Each JSON widget kind has one record type. A body that does not match
//! its schema is rejected and the caller keeps the raw tagged text.

use crate::tag::WidgetKind;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Why a widget body was rejected
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("invalid {kind} payload: {source}")]
    Json {
        kind: WidgetKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} payload has no entries")]
    Empty { kind: WidgetKind },

    #[error("{kind} block has no body")]
    MissingBody { kind: WidgetKind },
}

/// Card used by comparison, carousel and infographic blocks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub title: String,
    #[serde(default, alias = "description", alias = "text")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Titled section used by steps, tabs and accordions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    #[serde(default, alias = "description", alias = "text")]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    #[serde(deserialize_with = "string_or_number")]
    pub value: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slide {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bullets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonPayload {
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarouselPayload {
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfographicPayload {
    pub items: Vec<Card>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsPayload {
    pub stats: Vec<Stat>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessFlowPayload {
    pub steps: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabsPayload {
    pub tabs: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccordionPayload {
    pub items: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlidesPayload {
    pub slides: Vec<Slide>,
}

/// Decoded body of a widget block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WidgetPayload {
    Comparison(ComparisonPayload),
    Carousel(CarouselPayload),
    Infographic(InfographicPayload),
    Statistics(StatisticsPayload),
    ProcessFlow(ProcessFlowPayload),
    Tabs(TabsPayload),
    Accordion(AccordionPayload),
    Slides(SlidesPayload),
    /// Inline callout text
    Callout(String),
}

impl WidgetPayload {
    /// Decode and validate the body found between a block's tags
    pub fn decode(kind: WidgetKind, body: &str) -> Result<Self, PayloadError> {
        let json = if kind.is_callout() {
            body.trim()
        } else {
            strip_code_fence(body)
        };
        if json.is_empty() {
            return Err(PayloadError::MissingBody { kind });
        }

        let payload = match kind {
            WidgetKind::Comparison => WidgetPayload::Comparison(parse(kind, json)?),
            WidgetKind::Carousel => WidgetPayload::Carousel(parse(kind, json)?),
            WidgetKind::Infographic => WidgetPayload::Infographic(parse(kind, json)?),
            WidgetKind::Statistics => WidgetPayload::Statistics(parse(kind, json)?),
            WidgetKind::ProcessFlow => WidgetPayload::ProcessFlow(parse(kind, json)?),
            WidgetKind::Tabs => WidgetPayload::Tabs(parse(kind, json)?),
            WidgetKind::Accordion => WidgetPayload::Accordion(parse(kind, json)?),
            WidgetKind::Slides => WidgetPayload::Slides(parse(kind, json)?),
            WidgetKind::Attention
            | WidgetKind::Tip
            | WidgetKind::Important
            | WidgetKind::Note
            | WidgetKind::Example => WidgetPayload::Callout(json.to_string()),
        };

        if payload.entry_count() == 0 {
            return Err(PayloadError::Empty { kind });
        }
        Ok(payload)
    }

    /// Number of cards, steps, tabs... in the payload
    pub fn entry_count(&self) -> usize {
        match self {
            WidgetPayload::Comparison(p) => p.cards.len(),
            WidgetPayload::Carousel(p) => p.cards.len(),
            WidgetPayload::Infographic(p) => p.items.len(),
            WidgetPayload::Statistics(p) => p.stats.len(),
            WidgetPayload::ProcessFlow(p) => p.steps.len(),
            WidgetPayload::Tabs(p) => p.tabs.len(),
            WidgetPayload::Accordion(p) => p.items.len(),
            WidgetPayload::Slides(p) => p.slides.len(),
            WidgetPayload::Callout(_) => 1,
        }
    }
}

fn parse<T: for<'de> Deserialize<'de>>(kind: WidgetKind, json: &str) -> Result<T, PayloadError> {
    serde_json::from_str(json).map_err(|source| PayloadError::Json { kind, source })
}

/// Models sometimes wrap the payload in a ```json fence
fn strip_code_fence(body: &str) -> &str {
    let trimmed = body.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_decodes() {
        let body = r#"{"cards":[{"title":"Dolo","content":"Intenção"},{"title":"Culpa","description":"Negligência"}]}"#;
        let WidgetPayload::Comparison(p) = WidgetPayload::decode(WidgetKind::Comparison, body).unwrap()
        else {
            panic!("wrong payload variant");
        };
        assert_eq!(p.cards.len(), 2);
        assert_eq!(p.cards[1].content, "Negligência");
    }

    #[test]
    fn test_schema_mismatch_is_rejected() {
        // steps instead of cards
        let err = WidgetPayload::decode(WidgetKind::Comparison, r#"{"steps":[]}"#).unwrap_err();
        assert!(matches!(err, PayloadError::Json { kind: WidgetKind::Comparison, .. }));

        let err = WidgetPayload::decode(WidgetKind::Tabs, r#"{"tabs":[]}"#).unwrap_err();
        assert!(matches!(err, PayloadError::Empty { .. }));

        let err = WidgetPayload::decode(WidgetKind::Slides, "  ").unwrap_err();
        assert!(matches!(err, PayloadError::MissingBody { .. }));
    }

    #[test]
    fn test_stat_value_accepts_numbers() {
        let body = r#"{"stats":[{"value":87,"label":"aprovação"},{"value":"1,2 mi","label":"processos"}]}"#;
        let WidgetPayload::Statistics(p) = WidgetPayload::decode(WidgetKind::Statistics, body).unwrap()
        else {
            panic!("wrong payload variant");
        };
        assert_eq!(p.stats[0].value, "87");
        assert_eq!(p.stats[1].value, "1,2 mi");
    }

    #[test]
    fn test_code_fence_is_stripped() {
        let body = "\n```json\n{\"steps\":[{\"title\":\"Petição\",\"content\":\"inicial\"}]}\n```\n";
        let payload = WidgetPayload::decode(WidgetKind::ProcessFlow, body).unwrap();
        assert_eq!(payload.entry_count(), 1);
    }

    #[test]
    fn test_callout_keeps_trimmed_text() {
        let payload = WidgetPayload::decode(WidgetKind::Tip, "  Leia o art. 18 do CP.\n").unwrap();
        assert_eq!(payload, WidgetPayload::Callout("Leia o art. 18 do CP.".to_string()));
    }
}
