//! Core types shared by the bridge and the consumer

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Get the role as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A prior conversation entry as sent over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl WireMessage {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A file attached to a chat turn, already base64 encoded by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    /// Base64 payload
    pub data: String,
    /// Declared MIME type
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Original file name
    #[serde(default)]
    pub name: String,
}

impl FileAttachment {
    /// Create an attachment from raw bytes
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            data: STANDARD.encode(bytes),
            mime_type: mime_type.into(),
            name: name.into(),
        }
    }

    /// Whether the declared MIME type is a textual format
    pub fn is_text(&self) -> bool {
        let mime = self.mime_type.to_ascii_lowercase();
        mime.starts_with("text/") || mime == "application/json" || mime == "application/xml"
    }

    /// Decoded text of a textual attachment; `None` for binary or undecodable data
    pub fn decoded_text(&self) -> Option<String> {
        if !self.is_text() {
            return None;
        }
        let bytes = STANDARD.decode(self.data.trim()).ok()?;
        String::from_utf8(bytes).ok()
    }
}

/// How deep the answer should go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseLevel {
    Basic,
    #[default]
    Complete,
    Deep,
}

impl ResponseLevel {
    /// Parse from a loose string (CLI, query params)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "basic" | "basico" | "básico" => Some(ResponseLevel::Basic),
            "complete" | "completo" => Some(ResponseLevel::Complete),
            "deep" | "profundo" => Some(ResponseLevel::Deep),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseLevel::Basic => "basic",
            ResponseLevel::Complete => "complete",
            ResponseLevel::Deep => "deep",
        }
    }
}

/// Conversation mode; selects the system prompt template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChatMode {
    /// Free conversation with the assistant
    #[default]
    Chat,
    /// Guided study of a topic
    Study,
    /// Structured lesson
    Lesson,
    /// Analysis of an attached document
    Analysis,
    /// Study material recommendations
    Recommendation,
    /// Simulated courtroom
    Simulation,
}

impl ChatMode {
    /// Map the free-form mode string onto a template. Unknown values fall
    /// back to `Chat`.
    pub fn parse(mode: &str) -> Self {
        match mode.trim().to_lowercase().as_str() {
            "study" | "estudo" | "estudar" => ChatMode::Study,
            "lesson" | "aula" => ChatMode::Lesson,
            "analysis" | "analyze" | "document" | "analise" | "análise" => ChatMode::Analysis,
            "recommendation" | "recomendacao" | "recomendação" => ChatMode::Recommendation,
            "simulation" | "juri" | "júri" | "simulacao" | "simulação" => ChatMode::Simulation,
            _ => ChatMode::Chat,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Chat => "chat",
            ChatMode::Study => "study",
            ChatMode::Lesson => "lesson",
            ChatMode::Analysis => "analysis",
            ChatMode::Recommendation => "recommendation",
            ChatMode::Simulation => "simulation",
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a chat request from the consumer to the bridge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub files: Vec<FileAttachment>,
    #[serde(default)]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_level: Option<ResponseLevel>,
}

impl ChatRequest {
    /// Parsed conversation mode
    pub fn chat_mode(&self) -> ChatMode {
        ChatMode::parse(&self.mode)
    }

    /// Response level after applying the `deepMode` override
    pub fn effective_level(&self) -> ResponseLevel {
        if self.deep_mode == Some(true) {
            return ResponseLevel::Deep;
        }
        self.response_level.unwrap_or_default()
    }

    /// Content of the most recent user message
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Text available from attachments: the client-extracted text plus any
    /// textual file decoded here
    pub fn attached_text(&self) -> Option<String> {
        let mut parts: Vec<String> = Vec::new();
        if let Some(text) = self.extracted_text.as_deref() {
            if !text.trim().is_empty() {
                parts.push(text.to_string());
            }
        }
        for file in &self.files {
            if let Some(text) = file.decoded_text() {
                parts.push(format!("--- {} ---\n{}", file.name, text));
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

/// Single-JSON success response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub data: String,
}

/// Error response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
