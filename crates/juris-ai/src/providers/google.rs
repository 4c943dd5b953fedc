//! Google Generative AI (Gemini) provider
//!
//! Streaming uses `:streamGenerateContent` without `alt=sse`, which answers
//! with one JSON array written incrementally. The body is reassembled into
//! response objects by [`JsonObjectFramer`] rather than by line splitting.

use super::{GenerateRequest, LlmProvider, TextStream, get_api_key};
use crate::{
    error::{Error, Result},
    framer::JsonObjectFramer,
    types::{FileAttachment, Role, WireMessage},
};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8192;

/// The key travels in a header so it never appears in request URLs
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Environment variables consulted for the API key, in order
pub const API_KEY_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Gemini client
#[derive(Debug, Clone)]
pub struct GoogleProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_output_tokens: u32,
}

impl GoogleProvider {
    /// Create a new Google provider with an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    /// Create from `GEMINI_API_KEY`, falling back to `GOOGLE_API_KEY`
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(get_api_key(None, API_KEY_ENV_VARS)?))
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, self.model, method)
    }

    fn build_request(&self, request: &GenerateRequest) -> GeminiRequest {
        let mut contents: Vec<GeminiContent> = request
            .messages
            .iter()
            // Gemini requires the conversation to open with a user turn
            .skip_while(|m| m.role != Role::User)
            .filter(|m| !m.content.trim().is_empty())
            .map(convert_message)
            .collect();

        let inline: Vec<GeminiPart> = request
            .files
            .iter()
            .filter(|f| !f.is_text())
            .map(convert_attachment)
            .collect();
        if !inline.is_empty() {
            match contents.iter_mut().rev().find(|c| c.role.as_deref() == Some("user")) {
                Some(last_user) => last_user.parts.extend(inline),
                None => contents.push(GeminiContent {
                    role: Some("user".to_string()),
                    parts: inline,
                }),
            }
        }

        let system_instruction = request.system_prompt.as_ref().map(|prompt| GeminiContent {
            role: None,
            parts: vec![GeminiPart::Text {
                text: prompt.clone(),
            }],
        });

        GeminiRequest {
            contents,
            system_instruction,
            generation_config: Some(GeminiGenerationConfig {
                max_output_tokens: Some(self.max_output_tokens),
                temperature: None,
            }),
        }
    }

    async fn post(&self, method: &str, request: &GenerateRequest) -> Result<reqwest::Response> {
        let body = self.build_request(request);
        debug!(model = %self.model, method, turns = body.contents.len(), "calling gemini");

        let response = self
            .client
            .post(self.endpoint(method))
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = response.text().await.unwrap_or_default();
        let error = Error::from_upstream(status.as_u16(), &text, retry_after);
        warn!(status = status.as_u16(), error = %error, "gemini rejected request");
        Err(error)
    }
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let response = self.post("generateContent", request).await?;
        let body = response.text().await?;
        let parsed: GeminiResponse = serde_json::from_str(&body)?;

        if parsed.candidates.is_empty() {
            let reason = parsed
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates".to_string());
            return Err(Error::UnexpectedResponse(reason));
        }

        Ok(parsed.texts().collect())
    }

    async fn stream(&self, request: &GenerateRequest) -> Result<TextStream> {
        let response = self.post("streamGenerateContent", request).await?;
        Ok(Box::pin(create_stream(response.bytes_stream())))
    }
}

fn create_stream<S, B>(bytes: S) -> impl futures::Stream<Item = Result<String>>
where
    S: futures::Stream<Item = reqwest::Result<B>>,
    B: AsRef<[u8]>,
{
    stream! {
        let mut bytes = Box::pin(bytes);
        let mut framer = JsonObjectFramer::new();
        let mut objects = 0usize;

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(Error::from(e));
                    return;
                }
            };

            for candidate in framer.push(chunk.as_ref()) {
                objects += 1;
                match serde_json::from_str::<GeminiResponse>(&candidate) {
                    Ok(response) => {
                        if let Some(error) = response.error {
                            yield Err(Error::api(error.code.unwrap_or(500), error.message));
                            return;
                        }
                        for text in response.texts() {
                            if !text.is_empty() {
                                yield Ok(text.to_string());
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, len = candidate.len(), "dropping malformed upstream object");
                    }
                }
            }
        }

        if !framer.is_idle() {
            warn!(pending = framer.pending(), "upstream ended inside an object");
        }
        debug!(objects, "upstream stream finished");
    }
}

fn convert_message(msg: &WireMessage) -> GeminiContent {
    let role = match msg.role {
        Role::User => "user",
        Role::Assistant => "model",
    };
    GeminiContent {
        role: Some(role.to_string()),
        parts: vec![GeminiPart::Text {
            text: msg.content.clone(),
        }],
    }
}

fn convert_attachment(file: &FileAttachment) -> GeminiPart {
    GeminiPart::InlineData {
        inline_data: GeminiBlob {
            mime_type: file.mime_type.clone(),
            data: file.data.clone(),
        },
    }
}

// Request types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiBlob,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiBlob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

// Response types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
    #[serde(default)]
    error: Option<GeminiError>,
}

impl GeminiResponse {
    /// Text parts of the first candidate, in order
    fn texts(&self) -> impl Iterator<Item = &str> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|content| content.parts.iter())
            .filter_map(|part| part.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn text_object(text: &str) -> String {
        serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
        })
        .to_string()
    }

    fn provider(server: &MockServer) -> GoogleProvider {
        GoogleProvider::new("test-key").with_base_url(server.uri())
    }

    #[test]
    fn test_build_request_maps_roles_and_files() {
        let provider = GoogleProvider::new("k");
        let request = GenerateRequest::new(vec![
            WireMessage::assistant("Olá! Como posso ajudar?"),
            WireMessage::user("Resuma o documento"),
            WireMessage::assistant("Claro."),
            WireMessage::user("Agora com exemplos"),
        ])
        .with_system_prompt("sistema")
        .with_files(vec![
            FileAttachment::from_bytes(b"%PDF", "application/pdf", "peticao.pdf"),
            FileAttachment::from_bytes(b"texto", "text/plain", "nota.txt"),
        ]);

        let json = serde_json::to_value(provider.build_request(&request)).unwrap();
        let contents = json["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        let last_parts = contents[2]["parts"].as_array().unwrap();
        assert_eq!(last_parts.len(), 2);
        assert_eq!(last_parts[1]["inlineData"]["mimeType"], "application/pdf");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "sistema");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 8192);
    }

    #[tokio::test]
    async fn test_stream_reassembles_split_objects() {
        let body = format!("[{}\r\n,\r\n{}]", text_object("Dolo é a"), text_object(" intenção"));
        // split mid-object and possibly mid-character
        let (first, second) = body.as_bytes().split_at(body.len() / 2);
        let chunks: Vec<reqwest::Result<Vec<u8>>> = vec![Ok(first.to_vec()), Ok(second.to_vec())];

        let texts: Vec<String> = create_stream(stream::iter(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(texts, vec!["Dolo é a", " intenção"]);
    }

    #[tokio::test]
    async fn test_stream_drops_malformed_and_continues() {
        let body = format!("[{{\"candidates\": oops}},{}]", text_object("ok"));
        let chunks: Vec<reqwest::Result<Vec<u8>>> = vec![Ok(body.into_bytes())];
        let texts: Vec<String> = create_stream(stream::iter(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(texts, vec!["ok"]);
    }

    #[tokio::test]
    async fn test_stream_error_object_ends_stream() {
        let body = format!(
            "[{},{{\"error\":{{\"code\":503,\"message\":\"overloaded\"}}}},{}]",
            text_object("a"),
            text_object("never")
        );
        let chunks: Vec<reqwest::Result<Vec<u8>>> = vec![Ok(body.into_bytes())];
        let items: Vec<Result<String>> = create_stream(stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "a");
        assert!(matches!(items[1], Err(Error::Api { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_stream_over_http() {
        let server = MockServer::start().await;
        let body = format!("[{},{}]", text_object("Olá"), text_object(", aluno"));
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:streamGenerateContent"))
            .and(header(API_KEY_HEADER, "test-key"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": "oi"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let request = GenerateRequest::new(vec![WireMessage::user("oi")]);
        let stream = provider(&server).stream(&request).await.unwrap();
        let text: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(text.concat(), "Olá, aluno");
    }

    #[tokio::test]
    async fn test_generate_joins_parts() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "Dolo é "}, {"text": "intenção."}]}}]
        });
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let request = GenerateRequest::new(vec![WireMessage::user("O que é dolo?")]);
        let text = provider(&server).generate(&request).await.unwrap();
        assert_eq!(text, "Dolo é intenção.");
    }

    #[tokio::test]
    async fn test_generate_malformed_body_is_json_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let request = GenerateRequest::new(vec![WireMessage::user("oi")]);
        let err = provider(&server).generate(&request).await.unwrap_err();
        assert!(matches!(err, Error::Json(_)));
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn test_rejection_is_classified_before_streaming() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"code": 400, "message": "API key not valid. Please pass a valid API key."}
            })))
            .mount(&server)
            .await;

        let request = GenerateRequest::new(vec![WireMessage::user("oi")]);
        let err = provider(&server).stream(&request).await.err().unwrap();
        assert!(matches!(err, Error::InvalidApiKey { status: 400 }));
    }

    #[tokio::test]
    async fn test_rate_limit_reads_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "12"))
            .mount(&server)
            .await;

        let request = GenerateRequest::new(vec![WireMessage::user("oi")]);
        let err = provider(&server).generate(&request).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited { retry_after: Some(12) }));
    }
}
