//! Conversions between raw image bytes, base64 and `data:` references.

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Image data attached to a message item.
///
/// The bytes are the only stored representation; [`ImagePayload::display_ref`]
/// derives the displayable reference from them every time it is asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    #[serde(rename = "data", with = "base64_bytes")]
    raw_data: Vec<u8>,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

impl ImagePayload {
    pub fn new(raw_data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            raw_data,
            mime_type: mime_type.into(),
        }
    }

    pub fn raw_data(&self) -> &[u8] {
        &self.raw_data
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn to_base64(&self) -> String {
        encode_base64(&self.raw_data)
    }

    pub fn display_ref(&self) -> String {
        data_url(&self.mime_type, &self.raw_data)
    }

    pub fn from_data_url(reference: &str) -> Result<Self, BlobError> {
        let (mime_type, raw_data) = decode_data_url(reference)?;
        Ok(Self::new(raw_data, mime_type))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobError {
    /// The reference does not start with `data:` or lacks the `,` separator.
    NotADataUrl,
    /// Only base64 payloads are produced by this crate and accepted back.
    NotBase64Encoded,
    InvalidBase64(String),
}

impl fmt::Display for BlobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobError::NotADataUrl => write!(f, "not a data URL"),
            BlobError::NotBase64Encoded => write!(f, "data URL is not base64 encoded"),
            BlobError::InvalidBase64(err) => write!(f, "invalid base64 payload: {err}"),
        }
    }
}

impl std::error::Error for BlobError {}

pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}

pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, BlobError> {
    BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|err| BlobError::InvalidBase64(err.to_string()))
}

pub fn data_url(mime_type: &str, bytes: &[u8]) -> String {
    data_url_from_base64(mime_type, &encode_base64(bytes))
}

/// Builds a `data:` reference from an already encoded payload, as returned by
/// the API's inline-binary parts.
pub fn data_url_from_base64(mime_type: &str, encoded: &str) -> String {
    format!("data:{mime_type};base64,{encoded}")
}

/// Splits a `data:<mime>;base64,<payload>` reference into its MIME type and
/// decoded bytes. A missing MIME type defaults to `application/octet-stream`.
pub fn decode_data_url(reference: &str) -> Result<(String, Vec<u8>), BlobError> {
    let rest = reference
        .trim()
        .strip_prefix("data:")
        .ok_or(BlobError::NotADataUrl)?;
    let (header, payload) = rest.split_once(',').ok_or(BlobError::NotADataUrl)?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or(BlobError::NotBase64Encoded)?;
    let mime_type = if mime_type.is_empty() {
        "application/octet-stream"
    } else {
        mime_type
    };
    Ok((mime_type.to_string(), decode_base64(payload)?))
}

pub fn is_image_mime(mime_type: &str) -> bool {
    mime_type
        .trim()
        .to_ascii_lowercase()
        .strip_prefix("image/")
        .is_some_and(|subtype| !subtype.is_empty())
}

mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_base64(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        super::decode_base64(&encoded).map_err(serde::de::Error::custom)
    }
}
