//! Streaming access to the generative API.
//!
//! [`GenerativeService`] is the seam the studio talks to; [`GeminiClient`] is
//! the HTTP implementation speaking server-sent events.

use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use memchr::memchr;
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use tracing::debug;

use crate::api::{GenerateContentRequest, GenerateContentResponse};

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub type ChunkStream =
    Pin<Box<dyn Stream<Item = Result<GenerateContentResponse, ApiError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request never produced a response (DNS, TLS, connection reset).
    Transport(String),
    /// The service answered with an error status or an in-stream error body.
    /// Holds the already formatted message.
    Api(String),
    /// A chunk could not be decoded.
    Decode(String),
}

impl ApiError {
    pub fn detail(&self) -> &str {
        match self {
            ApiError::Transport(detail) | ApiError::Api(detail) | ApiError::Decode(detail) => {
                detail
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Transport(detail) => write!(f, "Request failed: {detail}"),
            ApiError::Api(detail) => write!(f, "{detail}"),
            ApiError::Decode(detail) => write!(f, "Unreadable response chunk: {detail}"),
        }
    }
}

impl std::error::Error for ApiError {}

#[async_trait]
/// Submits one request and yields its response chunks as they arrive.
pub trait GenerativeService: Send + Sync {
    async fn submit_stream(
        &self,
        credential: &str,
        model: &str,
        request: GenerateContentRequest,
    ) -> Result<ChunkStream, ApiError>;
}

#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// `{base}/models/{model}:streamGenerateContent?alt=sse`, tolerating a
    /// trailing slash on the base and a `models/` prefix on the model name.
    pub fn stream_endpoint(&self, model: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let model = model.trim().trim_start_matches("models/");
        format!("{base}/models/{model}:streamGenerateContent?alt=sse")
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new(reqwest::Client::new(), DEFAULT_API_BASE_URL)
    }
}

#[async_trait]
impl GenerativeService for GeminiClient {
    async fn submit_stream(
        &self,
        credential: &str,
        model: &str,
        request: GenerateContentRequest,
    ) -> Result<ChunkStream, ApiError> {
        let url = self.stream_endpoint(model);
        debug!(%model, parts = request.user_parts().len(), "submitting streaming request");

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", credential)
            .json(&request)
            .send()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            debug!(%status, "streaming request rejected");
            return Err(ApiError::Api(format_api_error(&error_text)));
        }

        Ok(decode_sse_stream(response.bytes_stream()))
    }
}

/// Incremental splitter for `text/event-stream` bodies.
///
/// Bytes are buffered until a newline; each complete `data:` line is decoded
/// into a chunk. Other SSE fields (`event:`, `id:`, comments) are ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<GenerateContentResponse, ApiError>> {
        self.buffer.extend_from_slice(bytes);
        let mut decoded = Vec::new();
        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            match std::str::from_utf8(&self.buffer[..newline_pos]) {
                Ok(line) => {
                    if let Some(item) = process_sse_line(line.trim()) {
                        decoded.push(item);
                    }
                }
                Err(err) => decoded.push(Err(ApiError::Decode(format!(
                    "invalid UTF-8 in stream: {err}"
                )))),
            }
            self.buffer.drain(..=newline_pos);
        }
        decoded
    }

    /// Flushes a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<Result<GenerateContentResponse, ApiError>> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let mut rest = std::mem::take(&mut self.buffer);
        rest.push(b'\n');
        self.push(&rest)
    }
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn process_sse_line(line: &str) -> Option<Result<GenerateContentResponse, ApiError>> {
    let payload = extract_data_payload(line)?;
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    Some(decode_chunk(payload))
}

fn decode_chunk(payload: &str) -> Result<GenerateContentResponse, ApiError> {
    let value: serde_json::Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(_) => return Err(ApiError::Api(format_api_error(payload))),
    };
    if value.get("error").is_some() {
        return Err(ApiError::Api(format_api_error(payload)));
    }
    serde_json::from_value(value).map_err(|err| ApiError::Decode(err.to_string()))
}

struct SseState<S> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<GenerateContentResponse, ApiError>>,
    done: bool,
}

/// Adapts a raw byte stream into a stream of decoded chunks. The stream ends
/// after the first error.
pub fn decode_sse_stream<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let state = SseState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.pending.clear();
                    state.done = true;
                }
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => state.pending.extend(state.decoder.push(chunk.as_ref())),
                Some(Err(err)) => {
                    state.done = true;
                    state
                        .pending
                        .push_back(Err(ApiError::Transport(err.to_string())));
                }
                None => {
                    state.done = true;
                    state.pending.extend(state.decoder.finish());
                }
            }
        }
    }))
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

/// Renders an error body for display, pretty-printing JSON when possible.
///
/// The API returns errors both as a top-level array and as a bare object; the
/// first element of an array is used for the summary line.
pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error: <empty response>".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let summary_source = match &json_value {
            serde_json::Value::Array(items) => items.first().unwrap_or(&json_value),
            other => other,
        };
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            if let Some(summary) = extract_error_summary(summary_source) {
                if !summary.is_empty() {
                    return format!("API Error: {summary}\n{pretty_json}");
                }
            }
            return format!("API Error:\n{pretty_json}");
        }
    }

    format!("API Error: {trimmed}")
}
