//! Upstream model providers

pub mod google;

use crate::{Error, FileAttachment, Result, WireMessage};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

pub use google::GoogleProvider;

/// Ordered text fragments produced by a streaming generation
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// One generation request: system prompt, history and attachments
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub system_prompt: Option<String>,
    pub messages: Vec<WireMessage>,
    pub files: Vec<FileAttachment>,
}

impl GenerateRequest {
    pub fn new(messages: Vec<WireMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_files(mut self, files: Vec<FileAttachment>) -> Self {
        self.files = files;
        self
    }
}

/// Trait for upstream text generators
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate the whole answer in one response
    async fn generate(&self, request: &GenerateRequest) -> Result<String>;

    /// Stream the answer as it is produced.
    ///
    /// Upstream rejections are returned as `Err` before the stream exists.
    async fn stream(&self, request: &GenerateRequest) -> Result<TextStream>;
}

/// Get an API key from a provided value or the first set environment variable
pub fn get_api_key(provided: Option<&str>, env_vars: &[&str]) -> Result<String> {
    if let Some(key) = provided.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }

    env_vars
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
        .ok_or(Error::MissingCredential)
}
