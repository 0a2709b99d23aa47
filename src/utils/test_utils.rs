use crate::api::{GenerateContentRequest, GenerateContentResponse, Part};
use crate::core::gen_stream::{ApiError, ChunkStream, GenerativeService};
use crate::core::output::OutputItem;
use crate::core::store::{KeyValueStore, MemoryStore, StoreError};
use crate::core::studio::{
    DefaultBlobFetcher, ModelSelection, RenderSink, Studio, StudioParams, StudioView,
};
use async_trait::async_trait;
use futures_util::stream;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub type ChunkResult = Result<GenerateContentResponse, ApiError>;

pub fn text_chunk(text: &str) -> ChunkResult {
    Ok(GenerateContentResponse::from_parts(vec![Part::text(text)]))
}

pub fn image_chunk(mime_type: &str, data: &str) -> ChunkResult {
    Ok(GenerateContentResponse::from_parts(vec![Part::inline(
        mime_type, data,
    )]))
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub credential: String,
    pub model: String,
    pub request: GenerateContentRequest,
}

/// Replays canned responses in call order: each entry is either a submit
/// failure or the full list of chunks for one stream.
#[derive(Default)]
pub struct ScriptedService {
    scripts: Mutex<VecDeque<Result<Vec<ChunkResult>, ApiError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedService {
    pub fn new(scripts: Vec<Result<Vec<ChunkResult>, ApiError>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeService for ScriptedService {
    async fn submit_stream(
        &self,
        credential: &str,
        model: &str,
        request: GenerateContentRequest,
    ) -> Result<ChunkStream, ApiError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            credential: credential.to_string(),
            model: model.to_string(),
            request,
        });
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted response left");
        let chunks = script?;
        Ok(Box::pin(stream::iter(chunks)))
    }
}

/// Streams whatever the test pushes into the matching sender; the stream ends
/// when the sender is dropped.
pub struct ChannelService {
    receivers: Mutex<VecDeque<mpsc::UnboundedReceiver<ChunkResult>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ChannelService {
    pub fn new(count: usize) -> (Self, Vec<mpsc::UnboundedSender<ChunkResult>>) {
        let mut senders = Vec::new();
        let mut receivers = VecDeque::new();
        for _ in 0..count {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            receivers.push_back(rx);
        }
        let service = Self {
            receivers: Mutex::new(receivers),
            requests: Mutex::new(Vec::new()),
        };
        (service, senders)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeService for ChannelService {
    async fn submit_stream(
        &self,
        credential: &str,
        model: &str,
        request: GenerateContentRequest,
    ) -> Result<ChunkStream, ApiError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            credential: credential.to_string(),
            model: model.to_string(),
            request,
        });
        let rx = self
            .receivers
            .lock()
            .unwrap()
            .pop_front()
            .expect("no channel left");
        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }
}

/// Keeps a copy of the output list from every redraw.
#[derive(Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<Vec<OutputItem>>>,
    message_counts: Mutex<Vec<usize>>,
}

impl RecordingSink {
    pub fn redraws(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn message_counts(&self) -> Vec<usize> {
        self.message_counts.lock().unwrap().clone()
    }

    /// States of one output across redraws, consecutive duplicates removed.
    pub fn history(&self, output_id: &str) -> Vec<OutputItem> {
        let mut history: Vec<OutputItem> = Vec::new();
        for frame in self.frames.lock().unwrap().iter() {
            if let Some(item) = frame.iter().find(|item| item.id == output_id) {
                if history.last() != Some(item) {
                    history.push(item.clone());
                }
            }
        }
        history
    }
}

impl RenderSink for RecordingSink {
    fn redraw(&self, view: &StudioView<'_>) {
        self.frames.lock().unwrap().push(view.outputs.to_vec());
        self.message_counts
            .lock()
            .unwrap()
            .push(view.messages.len());
    }
}

/// Store whose writes always fail.
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryStore,
}

impl KeyValueStore for FailingStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, _key: &str, _value: Value) -> Result<(), StoreError> {
        Err(StoreError::Write {
            path: PathBuf::from("/read-only/session.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    }
}

pub fn test_models() -> ModelSelection {
    ModelSelection {
        image_model: "test-image-model".to_string(),
        text_model: "test-text-model".to_string(),
    }
}

pub fn studio_with(
    store: Arc<dyn KeyValueStore>,
    service: Arc<dyn GenerativeService>,
    sink: Arc<dyn RenderSink>,
) -> Studio {
    Studio::new(StudioParams {
        store,
        service,
        fetcher: Arc::new(DefaultBlobFetcher::default()),
        sink,
        models: test_models(),
    })
}

/// A PNG signature, enough for anything that only looks at bytes and MIME.
pub const PNG_BYTES: [u8; 4] = [0x89, 0x50, 0x4e, 0x47];

#[derive(Debug, Clone)]
pub struct CapturedHttpRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedHttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A client that never routes loopback traffic through an ambient proxy.
pub fn local_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("http client should build")
}

pub fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Accepts one connection on a loopback port, answers it with `response` and
/// hands back what the client sent. Returns the `http://host:port` base.
pub async fn serve_once(response: String) -> (String, JoinHandle<Result<CapturedHttpRequest, String>>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("local addr should resolve");
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.map_err(|err| err.to_string())?;
        let captured = read_http_request(&mut stream).await?;
        stream
            .write_all(response.as_bytes())
            .await
            .map_err(|err| err.to_string())?;
        stream.shutdown().await.map_err(|err| err.to_string())?;
        Ok(captured)
    });
    (format!("http://{addr}"), server)
}

async fn read_http_request(stream: &mut TcpStream) -> Result<CapturedHttpRequest, String> {
    let mut buffer = Vec::new();
    let mut header_end = None;
    while header_end.is_none() {
        let mut chunk = [0_u8; 1024];
        let read = stream.read(&mut chunk).await.map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        header_end = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4);
    }
    let header_end = header_end.expect("header end should exist");
    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?
        .to_string();

    let mut headers = Vec::new();
    let mut content_length = 0_usize;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
        headers.push((name.to_string(), value));
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length - body.len()];
        let read = stream.read(&mut chunk).await.map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(CapturedHttpRequest {
        request_line,
        headers,
        body,
    })
}
