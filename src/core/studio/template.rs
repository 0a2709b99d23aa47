//! Replacing the message list with a prepared template.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use super::Studio;
use crate::core::blob::{decode_data_url, is_image_mime, BlobError, ImagePayload};
use crate::utils::mime::{mime_for_path, mime_from_content_type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateEntry {
    pub role: TemplateRole,
    #[serde(default)]
    pub text: String,
    /// `data:` URL, `http(s)` URL or local path of an image for this entry.
    #[serde(
        rename = "imageDataRef",
        alias = "image",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub image_data_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub messages: Vec<TemplateEntry>,
}

impl Template {
    pub fn from_json(raw: &str) -> Result<Self, TemplateError> {
        serde_json::from_str(raw).map_err(|err| TemplateError::Parse(err.to_string()))
    }

    /// Text of the first system entry; later system entries are ignored.
    pub fn system_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|entry| entry.role == TemplateRole::System)
            .map(|entry| entry.text.as_str())
    }

    pub fn user_entries(&self) -> impl Iterator<Item = &TemplateEntry> {
        self.messages
            .iter()
            .filter(|entry| entry.role != TemplateRole::System)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    Parse(String),
    /// The image behind an entry could not be retrieved.
    Fetch {
        entry: usize,
        reference: String,
        detail: String,
    },
    /// The retrieved bytes could not be turned into an image payload.
    Decode { entry: usize, source: BlobError },
    NotAnImage { entry: usize, mime_type: String },
    UnknownBuiltin(String),
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::Parse(detail) => write!(f, "Invalid template: {detail}"),
            TemplateError::Fetch {
                entry,
                reference,
                detail,
            } => write!(
                f,
                "Failed to load template: image for message {} ({}) could not be fetched: {}",
                entry + 1,
                abbreviate(reference),
                detail
            ),
            TemplateError::Decode { entry, source } => write!(
                f,
                "Failed to load template: image for message {} could not be decoded: {}",
                entry + 1,
                source
            ),
            TemplateError::NotAnImage { entry, mime_type } => write!(
                f,
                "Failed to load template: message {} references {} which is not an image",
                entry + 1,
                mime_type
            ),
            TemplateError::UnknownBuiltin(id) => write!(f, "Unknown template: {id}"),
        }
    }
}

impl std::error::Error for TemplateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TemplateError::Decode { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Data URLs can be megabytes long; keep error messages readable.
fn abbreviate(reference: &str) -> String {
    const LIMIT: usize = 64;
    match reference.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}…", &reference[..cut]),
        None => reference.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[async_trait]
/// Resolves template image references into bytes.
pub trait BlobFetcher: Send + Sync {
    async fn fetch(&self, entry: usize, reference: &str) -> Result<FetchedBlob, TemplateError>;
}

/// Handles `data:` URLs in place, `http(s)` URLs over the network and anything
/// else as a local file path.
#[derive(Clone, Default)]
pub struct DefaultBlobFetcher {
    client: reqwest::Client,
}

impl DefaultBlobFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_http(&self, entry: usize, reference: &str) -> Result<FetchedBlob, TemplateError> {
        let fetch_err = |detail: String| TemplateError::Fetch {
            entry,
            reference: reference.to_string(),
            detail,
        };
        let response = self
            .client
            .get(reference)
            .send()
            .await
            .map_err(|err| fetch_err(err.to_string()))?;
        if !response.status().is_success() {
            return Err(fetch_err(format!("HTTP {}", response.status())));
        }
        let header_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(mime_from_content_type);
        let mime_type = header_mime
            .or_else(|| mime_for_path(Path::new(reference)).map(str::to_string))
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|err| fetch_err(err.to_string()))?;
        Ok(FetchedBlob {
            bytes: bytes.to_vec(),
            mime_type,
        })
    }
}

#[async_trait]
impl BlobFetcher for DefaultBlobFetcher {
    async fn fetch(&self, entry: usize, reference: &str) -> Result<FetchedBlob, TemplateError> {
        let trimmed = reference.trim();
        if trimmed.starts_with("data:") {
            let (mime_type, bytes) = decode_data_url(trimmed)
                .map_err(|source| TemplateError::Decode { entry, source })?;
            return Ok(FetchedBlob { bytes, mime_type });
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return self.fetch_http(entry, trimmed).await;
        }

        let path = Path::new(trimmed);
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| TemplateError::Fetch {
                entry,
                reference: trimmed.to_string(),
                detail: err.to_string(),
            })?;
        let mime_type = mime_for_path(path)
            .unwrap_or("application/octet-stream")
            .to_string();
        Ok(FetchedBlob { bytes, mime_type })
    }
}

impl Studio {
    /// Replaces the message list with `template`'s entries.
    ///
    /// The list is cleared and the system message applied before any image is
    /// fetched. If an image fails, none of the template's entries are added and
    /// the list stays empty; the new system message is kept.
    pub async fn load_template(&self, template: &Template) -> Result<usize, TemplateError> {
        self.delete_all_messages();
        self.set_system_message(template.system_text().unwrap_or_default());

        let mut staged = Vec::new();
        for (entry, item) in template.user_entries().enumerate() {
            let image = match item.image_data_ref.as_deref() {
                Some(reference) if !reference.trim().is_empty() => {
                    match self.fetch_image(entry, reference).await {
                        Ok(image) => Some(image),
                        Err(err) => {
                            warn!(entry, error = %err, "template load aborted");
                            return Err(err);
                        }
                    }
                }
                _ => None,
            };
            staged.push((item.text.clone(), image));
        }

        let count = staged.len();
        self.mutate_messages(|messages| {
            for (text, image) in staged {
                messages.push(text, image);
            }
            true
        });
        info!(
            template = template.id.as_deref().unwrap_or("<unnamed>"),
            messages = count,
            "template loaded"
        );
        Ok(count)
    }

    async fn fetch_image(&self, entry: usize, reference: &str) -> Result<ImagePayload, TemplateError> {
        let blob = self.fetcher.fetch(entry, reference).await?;
        debug!(entry, mime_type = %blob.mime_type, bytes = blob.bytes.len(), "fetched template image");
        if !is_image_mime(&blob.mime_type) {
            return Err(TemplateError::NotAnImage {
                entry,
                mime_type: blob.mime_type,
            });
        }
        Ok(ImagePayload::new(blob.bytes, blob.mime_type))
    }
}
