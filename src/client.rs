//! OpenAI-compatible chat completions client with SSE streaming
//!
//! Two calls are made against `/chat/completions`: a tiny non-streaming
//! request to check a credential, and the streaming generation request.
//! No retries; a failed call is reported once.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::conversation::Message;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const CONNECT_TIMEOUT_SECS: u64 = 10;
const CHANNEL_CAPACITY: usize = 256;

/// Content of the throwaway message used to check a credential
pub const VALIDATION_MESSAGE: &str = "Test";

/// Errors produced by the completion client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The HTTP request failed before a response arrived.
    #[error("API request failed: {0}")]
    Request(String),

    /// The API returned a non-success status.
    #[error("API error {status}: {body}")]
    Response { status: u16, body: String },

    /// A response could not be decoded.
    #[error("API response parse failed: {0}")]
    Parse(String),
}

/// Sampling parameters sent with every generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sampling {
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub max_tokens: u32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            max_tokens: 1500,
        }
    }
}

/// A streaming chat completion request
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(flatten)]
    pub sampling: Sampling,
    pub stream: bool,
}

impl ChatRequest {
    pub fn streaming(model: &str, messages: &[Message], sampling: &Sampling) -> Self {
        Self {
            model: model.to_string(),
            messages: messages.to_vec(),
            sampling: sampling.clone(),
            stream: true,
        }
    }
}

/// Stream events from the API
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment of generated text
    Token(String),
    /// Upstream finished; carries the finish reason when one was sent
    Done(Option<String>),
    /// The stream broke off
    Error(String),
}

/// The seam between the form controller and the completion API
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Issue one cheap request to find out whether `credential` is accepted
    async fn validate(&self, credential: &str, model: &str) -> Result<(), ClientError>;

    /// Start a streaming completion. Events arrive on the returned channel,
    /// ending with exactly one `Done` or `Error`.
    async fn stream_chat(
        &self,
        credential: &str,
        request: &ChatRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, ClientError>;
}

// ═══════════════════════════════════════════════════════════════
// HTTP client
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ClientError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn post(&self, credential: &str, body: &impl Serialize) -> Result<reqwest::Response, ClientError> {
        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(credential)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Response { status, body });
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    async fn validate(&self, credential: &str, model: &str) -> Result<(), ClientError> {
        let body = ValidationRequest {
            model,
            messages: vec![Message::system(VALIDATION_MESSAGE)],
        };
        self.post(credential, &body).await?;
        Ok(())
    }

    async fn stream_chat(
        &self,
        credential: &str,
        request: &ChatRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, ClientError> {
        let response = self.post(credential, request).await?;
        tracing::debug!(model = %request.model, messages = request.messages.len(), "completion stream opened");

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            match forward_stream(response, &tx).await {
                Ok(reason) => {
                    let _ = tx.send(StreamEvent::Done(reason)).await;
                }
                Err(e) => {
                    let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                }
            }
        });

        Ok(rx)
    }
}

/// Read the SSE body and forward text fragments until upstream finishes.
/// Returns the finish reason, if upstream sent one.
async fn forward_stream(
    response: reqwest::Response,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<Option<String>, ClientError> {
    let mut decoder = SseDecoder::default();
    let mut bytes_stream = response.bytes_stream();

    while let Some(chunk) = bytes_stream.next().await {
        let chunk = chunk.map_err(|e| ClientError::Request(format!("stream read error: {}", e)))?;
        for line in decoder.push(&chunk) {
            if let Some(finished) = handle_line(&line, tx).await? {
                return Ok(finished);
            }
        }
    }

    if let Some(line) = decoder.finish() {
        if let Some(finished) = handle_line(&line, tx).await? {
            return Ok(finished);
        }
    }

    // Body ended without a finish marker
    Ok(None)
}

/// Returns `Some(reason)` once the stream is finished
async fn handle_line(
    line: &str,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<Option<Option<String>>, ClientError> {
    match parse_sse_line(line)? {
        None => Ok(None),
        Some(SseLine::Done) => Ok(Some(None)),
        Some(SseLine::Chunk { content, finish_reason }) => {
            if let Some(content) = content {
                if !content.is_empty() && tx.send(StreamEvent::Token(content)).await.is_err() {
                    // Receiver is gone; nobody is listening anymore
                    return Ok(Some(None));
                }
            }
            Ok(finish_reason.map(Some))
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// SSE decoding
// ═══════════════════════════════════════════════════════════════

/// Splits a byte stream into complete lines.
///
/// Bytes are held until a newline arrives, so a UTF-8 sequence split across
/// network chunks is decoded whole.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Whatever is left once the body has ended
    pub fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.buffer).trim().to_string();
        self.buffer.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

/// One meaningful SSE line
#[derive(Debug, PartialEq)]
pub enum SseLine {
    Chunk {
        content: Option<String>,
        finish_reason: Option<String>,
    },
    Done,
}

/// Parse one SSE line. Comments, other fields and unparseable payloads are
/// skipped; an `error` payload is reported.
pub fn parse_sse_line(line: &str) -> Result<Option<SseLine>, ClientError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(Some(SseLine::Done));
    }

    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::debug!(error = %e, "skipping unparseable stream chunk");
            return Ok(None);
        }
    };

    if let Some(err) = chunk.error {
        return Err(ClientError::Parse(format!("stream error: {}", err.message)));
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(None);
    };

    Ok(Some(SseLine::Chunk {
        content: choice.delta.and_then(|d| d.content),
        finish_reason: choice.finish_reason,
    }))
}

// ═══════════════════════════════════════════════════════════════
// API Types
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct ValidationRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}
