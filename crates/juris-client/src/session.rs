//! Chat session: sends a turn to the bridge and consumes the streamed answer

use crate::conversation::{ChatMessage, Conversation, MessageStatus};
use crate::error::{ClientError, Result};
use crate::events::{ClientEvent, WarningKind};
use crate::handle::StreamHandle;
use crate::watchdog::{AbortReason, WatchdogConfig};
use futures::{Stream, StreamExt};
use juris_ai::wire::{StreamFrame, decode_line};
use juris_ai::{ChatMode, ChatRequest, ErrorBody, FileAttachment, LineBuffer, ResponseLevel};
use std::fmt::Display;
use std::future::Future;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Interrupted answers shorter than this (trimmed, in chars) are discarded
pub const MIN_PARTIAL_CHARS: usize = 20;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8787/api/chat";

pub const PARTIAL_RESPONSE_MESSAGE: &str =
    "A resposta foi interrompida e pode estar incompleta. Você pode pedir para continuar.";

/// Session configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bridge chat endpoint
    pub endpoint: String,
    pub watchdog: WatchdogConfig,
    pub level: ResponseLevel,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            watchdog: WatchdogConfig::default(),
            level: ResponseLevel::default(),
        }
    }
}

/// Why a stream stopped before its natural end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interruption {
    Aborted(AbortReason),
    Transport(String),
}

impl Interruption {
    /// User-facing message used when nothing could be kept
    pub fn message(&self) -> String {
        match self {
            Interruption::Aborted(reason) => reason.message().to_string(),
            Interruption::Transport(e) => format!("A conexão foi interrompida: {e}"),
        }
    }
}

/// How one exchange ended
#[derive(Debug, Clone)]
pub enum StreamOutcome {
    /// The stream ended normally
    Completed(ChatMessage),
    /// The stream was cut short; the partial answer was kept
    Partial {
        message: ChatMessage,
        cause: Interruption,
    },
    /// The stream was cut short and the placeholder removed
    Discarded { cause: Interruption },
}

impl StreamOutcome {
    pub fn message(&self) -> Option<&ChatMessage> {
        match self {
            StreamOutcome::Completed(message) | StreamOutcome::Partial { message, .. } => Some(message),
            StreamOutcome::Discarded { .. } => None,
        }
    }
}

enum StreamEnd {
    Done,
    Eof,
    Interrupted(Interruption),
}

/// Owns the conversation and drives one streamed exchange at a time
pub struct ChatSession {
    config: ClientConfig,
    conversation: Conversation,
    client: reqwest::Client,
    event_tx: broadcast::Sender<ClientEvent>,
    live_tx: watch::Sender<String>,
}

impl ChatSession {
    pub fn new(config: ClientConfig, mode: ChatMode) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let (live_tx, _) = watch::channel(String::new());
        Self {
            config,
            conversation: Conversation::new(mode),
            client: reqwest::Client::new(),
            event_tx,
            live_tx,
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }

    /// Latest content of the live message.
    ///
    /// Only the newest value is kept, so a slow painter skips intermediate
    /// snapshots and the read loop never waits for it.
    pub fn live_content(&self) -> watch::Receiver<String> {
        self.live_tx.subscribe()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.conversation.messages
    }

    /// Change mode; the conversation is reset if the mode differs
    pub fn set_mode(&mut self, mode: ChatMode) -> bool {
        self.conversation.set_mode(mode)
    }

    pub fn set_level(&mut self, level: ResponseLevel) {
        self.config.level = level;
    }

    /// Clear all messages
    pub fn reset(&mut self) {
        self.conversation.reset();
        self.live_tx.send_replace(String::new());
    }

    /// Send a user turn and stream the answer into the conversation.
    ///
    /// Rejections by the bridge come back as `Err`; everything that happens
    /// once the stream is open (including aborts) is reported through the
    /// returned [`StreamOutcome`].
    pub async fn send_message(
        &mut self,
        input: &str,
        files: Vec<FileAttachment>,
        handle: &StreamHandle,
    ) -> Result<StreamOutcome> {
        self.conversation.push(ChatMessage::user(input));
        let request = ChatRequest {
            messages: self.conversation.history(),
            files,
            mode: self.conversation.mode.as_str().to_string(),
            extracted_text: None,
            deep_mode: None,
            response_level: Some(self.config.level),
        };

        handle.start_watchdog(Instant::now());
        info!(
            endpoint = %self.config.endpoint,
            mode = %self.conversation.mode,
            turns = request.messages.len(),
            "sending chat turn"
        );

        let send = self
            .client
            .post(&self.config.endpoint)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&request)
            .send();

        let response = match self.race_watchdog(handle, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let error = ClientError::from(e);
                self.emit(ClientEvent::Error {
                    message: error.user_message(),
                });
                return Err(error);
            }
            Err(reason) => {
                let cause = Interruption::Aborted(reason);
                warn!(%reason, "request aborted before response");
                self.emit(ClientEvent::Error {
                    message: cause.message(),
                });
                return Ok(StreamOutcome::Discarded { cause });
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or_else(|_| {
                    format!(
                        "Erro do servidor ({}). Tente novamente.",
                        status.canonical_reason().unwrap_or("desconhecido")
                    )
                });
            warn!(status = status.as_u16(), %message, "bridge rejected request");
            self.emit(ClientEvent::Error {
                message: message.clone(),
            });
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(self.consume_stream(response.bytes_stream(), handle).await)
    }

    /// Consume a frame stream into a new assistant message.
    ///
    /// Creates the placeholder, applies frames until `[DONE]`, end of
    /// stream, an abort or a transport error, and finalizes the message
    /// exactly once.
    pub async fn consume_stream<S, B, E>(&mut self, stream: S, handle: &StreamHandle) -> StreamOutcome
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
    {
        let placeholder = ChatMessage::assistant_placeholder();
        let id = placeholder.id;
        self.conversation.push(placeholder);
        self.live_tx.send_replace(String::new());
        self.emit(ClientEvent::MessageStart { id });

        let mut bytes = std::pin::pin!(stream);
        let mut lines = LineBuffer::new();
        let mut ticker = self.ticker();
        let mut frames = 0usize;

        let end = loop {
            tokio::select! {
                biased;

                _ = handle.cancelled() => {
                    let reason = handle.reason().unwrap_or(AbortReason::User);
                    break StreamEnd::Interrupted(Interruption::Aborted(reason));
                }
                _ = ticker.tick() => {
                    handle.check_watchdog(Instant::now(), &self.config.watchdog);
                }
                chunk = bytes.next() => match chunk {
                    Some(Ok(chunk)) => {
                        let chunk = chunk.as_ref();
                        if chunk.is_empty() {
                            continue;
                        }
                        handle.mark_chunk(Instant::now());
                        self.begin_streaming(id);

                        let mut done = false;
                        for line in lines.push(chunk) {
                            frames += 1;
                            if self.apply_line(id, &line) {
                                done = true;
                                break;
                            }
                        }
                        if done {
                            break StreamEnd::Done;
                        }
                    }
                    Some(Err(e)) => {
                        break StreamEnd::Interrupted(Interruption::Transport(e.to_string()));
                    }
                    None => {
                        if let Some(tail) = lines.finish() {
                            self.apply_line(id, &tail);
                        }
                        break StreamEnd::Eof;
                    }
                },
            }
        };

        debug!(frames, "stream loop finished");
        self.finish(id, end)
    }

    /// Await `fut` while honouring cancellation and the watchdog
    async fn race_watchdog<F: Future>(
        &self,
        handle: &StreamHandle,
        fut: F,
    ) -> std::result::Result<F::Output, AbortReason> {
        let mut fut = std::pin::pin!(fut);
        let mut ticker = self.ticker();
        loop {
            tokio::select! {
                biased;

                _ = handle.cancelled() => {
                    return Err(handle.reason().unwrap_or(AbortReason::User));
                }
                _ = ticker.tick() => {
                    handle.check_watchdog(Instant::now(), &self.config.watchdog);
                }
                out = &mut fut => return Ok(out),
            }
        }
    }

    fn ticker(&self) -> Interval {
        let mut ticker = tokio::time::interval(self.config.watchdog.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event);
    }

    fn begin_streaming(&mut self, id: Uuid) {
        if let Some(message) = self.conversation.get_mut(id) {
            if message.status == MessageStatus::Pending {
                message.transition(MessageStatus::Streaming);
            }
        }
    }

    /// Apply one line; returns true on the end sentinel
    fn apply_line(&mut self, id: Uuid, line: &str) -> bool {
        match decode_line(line) {
            StreamFrame::Done => return true,
            StreamFrame::Empty => {}
            StreamFrame::Delta(text) => self.append(id, &text),
            StreamFrame::Raw(text) => {
                debug!(len = text.len(), "frame is not JSON, appending as text");
                self.append(id, &text);
            }
        }
        false
    }

    fn append(&mut self, id: Uuid, fragment: &str) {
        let Some(message) = self.conversation.get_mut(id) else {
            return;
        };
        message.content.push_str(fragment);
        self.live_tx.send_modify(|live| live.push_str(fragment));
        self.emit(ClientEvent::MessageUpdate {
            id,
            delta: fragment.to_string(),
        });
    }

    fn finish(&mut self, id: Uuid, end: StreamEnd) -> StreamOutcome {
        let cause = match end {
            StreamEnd::Done | StreamEnd::Eof => {
                return match self.finalize(id, MessageStatus::Finalized) {
                    Some(message) => StreamOutcome::Completed(message),
                    None => StreamOutcome::Discarded {
                        cause: Interruption::Aborted(AbortReason::User),
                    },
                };
            }
            StreamEnd::Interrupted(cause) => cause,
        };

        let kept_chars = self
            .conversation
            .get(id)
            .map(|m| m.content.trim().chars().count())
            .unwrap_or(0);

        if kept_chars >= MIN_PARTIAL_CHARS {
            if let Some(message) = self.finalize(id, MessageStatus::PartialFinalized) {
                warn!(?cause, chars = kept_chars, "keeping partial response");
                self.emit(ClientEvent::Warning {
                    kind: WarningKind::PartialResponse,
                    message: PARTIAL_RESPONSE_MESSAGE.to_string(),
                });
                return StreamOutcome::Partial { message, cause };
            }
        }

        warn!(?cause, chars = kept_chars, "discarding response");
        self.discard(id);
        self.emit(ClientEvent::Error {
            message: cause.message(),
        });
        StreamOutcome::Discarded { cause }
    }

    /// Move the message to a kept terminal state and compute its metrics.
    /// A message that is already terminal is returned unchanged.
    fn finalize(&mut self, id: Uuid, status: MessageStatus) -> Option<ChatMessage> {
        let message = self.conversation.get_mut(id)?;
        if message.status.is_terminal() {
            return Some(message.clone());
        }
        message.transition(status);
        message.metrics = Some(juris_document::compute(&message.content));
        let message = message.clone();

        info!(%id, status = ?message.status, chars = message.content.len(), "message finalized");
        self.emit(ClientEvent::MessageEnd {
            message: message.clone(),
        });
        Some(message)
    }

    fn discard(&mut self, id: Uuid) {
        if let Some(message) = self.conversation.get_mut(id) {
            message.transition(MessageStatus::Discarded);
        }
        self.conversation.remove(id);
        self.live_tx.send_replace(String::new());
    }
}
