//! Streaming Gemini client: `streamGenerateContent` over server-sent events.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use shared::{
    domain::ImageAttachment,
    error::ModelError,
    protocol::{
        ApiErrorEnvelope, Blob, Content, ContentRole, GenerateContentRequest,
        GenerateContentResponse, GenerationConfig, Part,
    },
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::model::{DeltaStream, GenerativeModel};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const API_KEY_HEADER: &str = "x-goog-api-key";
const DELTA_CHANNEL_CAPACITY: usize = 64;
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub generation: GenerationConfig,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            generation: GenerationConfig::default(),
        }
    }
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("generation", &self.generation)
            .finish()
    }
}

pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self::with_http_client(Client::new(), config)
    }

    pub fn with_http_client(http: Client, config: GeminiConfig) -> Self {
        Self { http, config }
    }

    pub fn endpoint(&self) -> String {
        let model = self.config.model.trim();
        let model_path = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        format!(
            "{}/{}:streamGenerateContent",
            self.config.api_base.trim().trim_end_matches('/'),
            model_path
        )
    }

    /// Images first, then the prompt text, all inside one user content.
    pub fn build_request(&self, prompt: &str, images: &[ImageAttachment]) -> GenerateContentRequest {
        let mut parts: Vec<Part> = images
            .iter()
            .map(|image| Part::InlineData {
                inline_data: Blob {
                    mime_type: image.mime_type.clone(),
                    data: STANDARD.encode(image.bytes()),
                },
            })
            .collect();
        parts.push(Part::Text {
            text: prompt.to_string(),
        });

        let generation = &self.config.generation;
        GenerateContentRequest {
            contents: vec![Content {
                role: Some(ContentRole::User),
                parts,
            }],
            generation_config: (!generation.is_empty()).then(|| generation.clone()),
        }
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate_stream(
        &self,
        prompt: &str,
        images: &[ImageAttachment],
    ) -> Result<DeltaStream, ModelError> {
        let endpoint = self.endpoint();
        debug!(%endpoint, image_count = images.len(), "opening gemini stream");

        let response = self
            .http
            .post(&endpoint)
            .query(&[("alt", "sse")])
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&self.build_request(prompt, images))
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(err) => {
                    warn!(error = %err, %status, "failed to read gemini error body");
                    String::new()
                }
            };
            return Err(api_error(status, &body));
        }

        let (tx, rx) = mpsc::channel(DELTA_CHANNEL_CAPACITY);
        tokio::spawn(pump_events(response.bytes_stream(), tx));
        Ok(ReceiverStream::new(rx).boxed())
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

async fn pump_events<S, B>(body: S, tx: mpsc::Sender<Result<String, ModelError>>)
where
    S: Stream<Item = reqwest::Result<B>>,
    B: AsRef<[u8]>,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = SseDecoder::default();
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                let _ = tx.send(Err(network_error(err))).await;
                return;
            }
        };
        for payload in decoder.push(chunk.as_ref()) {
            if !forward_event(&tx, &payload).await {
                return;
            }
        }
    }
    for payload in decoder.finish() {
        if !forward_event(&tx, &payload).await {
            return;
        }
    }
}

/// Returns false once the stream should stop: the consumer went away or the
/// event was a terminal error.
pub(crate) async fn forward_event(
    tx: &mpsc::Sender<Result<String, ModelError>>,
    payload: &str,
) -> bool {
    match parse_event(payload) {
        Ok(Some(delta)) => tx.send(Ok(delta)).await.is_ok(),
        Ok(None) => !tx.is_closed(),
        Err(err) => {
            warn!(error = %err, "gemini stream reported an error");
            let _ = tx.send(Err(err)).await;
            false
        }
    }
}

/// Interprets one SSE `data` payload. `Ok(None)` means the event carried no
/// text (usage metadata, a bare finish reason, the `[DONE]` marker).
pub(crate) fn parse_event(payload: &str) -> Result<Option<String>, ModelError> {
    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return Ok(None);
    }

    if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(payload) {
        return Err(ModelError::Api {
            status: envelope.error.code.unwrap_or_default(),
            message: envelope.error.message,
        });
    }

    let response: GenerateContentResponse = serde_json::from_str(payload)
        .map_err(|err| ModelError::InvalidResponse(err.to_string()))?;

    if let Some(reason) = response.block_reason() {
        return Err(ModelError::Blocked {
            reason: reason.to_string(),
        });
    }

    match response.text() {
        Some(text) => Ok(Some(text)),
        None => match response.finish_reason() {
            Some(reason) if BLOCKING_FINISH_REASONS.contains(&reason) => {
                Err(ModelError::Blocked {
                    reason: reason.to_string(),
                })
            }
            _ => Ok(None),
        },
    }
}

fn api_error(status: StatusCode, body: &str) -> ModelError {
    let message = serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_string());
    let message = if message.trim().is_empty() {
        status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()))
    } else {
        message
    };
    ModelError::Api {
        status: status.as_u16(),
        message,
    }
}

fn network_error(err: reqwest::Error) -> ModelError {
    ModelError::Network(err.to_string())
}

/// Line-oriented server-sent-events framing. Bytes are buffered until a full
/// line is available so multi-byte characters split across chunks survive.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feeds a chunk and returns the payloads of every event it completed.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            self.take_line(line.trim_end_matches(['\n', '\r']), &mut events);
        }
        events
    }

    /// Flushes a trailing event that was not terminated by a blank line.
    pub(crate) fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let line = String::from_utf8_lossy(&self.buffer).into_owned();
            self.buffer.clear();
            self.take_line(line.trim_end_matches('\r'), &mut events);
        }
        self.take_line("", &mut events);
        events
    }

    fn take_line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            if !self.data.is_empty() {
                events.push(self.data.join("\n"));
                self.data.clear();
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
    }
}

#[cfg(test)]
#[path = "tests/gemini_tests.rs"]
mod tests;
