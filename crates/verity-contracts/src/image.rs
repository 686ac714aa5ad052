use serde::{Deserialize, Serialize};

/// Uploads above this byte count are rejected before encoding.
pub const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

pub const ALLOWED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/webp"];

pub fn is_allowed_mime(mime_type: &str) -> bool {
    let normalized = mime_type.trim().to_ascii_lowercase();
    normalized.starts_with("image/")
        && ALLOWED_MIME_TYPES
            .iter()
            .any(|allowed| *allowed == normalized)
}

/// A validated upload in transportable form.
///
/// The `data_url` is self-describing (`data:<mime>;base64,<payload>`): it can
/// be handed to a renderer for preview as-is, and the raw payload can be
/// pulled back out for transmission. Replaced wholesale on each new upload,
/// never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub mime_type: String,
    pub byte_len: u64,
    pub sha256: String,
    pub width: u32,
    pub height: u32,
    pub data_url: String,
}

impl EncodedImage {
    /// The base64 payload after the `base64,` delimiter, if the encoded form
    /// carries one.
    pub fn payload_base64(&self) -> Option<&str> {
        let (_, payload) = self.data_url.split_once("base64,")?;
        if payload.is_empty() {
            return None;
        }
        Some(payload)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestError {
    InvalidType(String),
    TooLarge(u64),
    Read(String),
    SampleUnavailable(String),
}

impl IngestError {
    /// Stable copy surfaced to the person who triggered the upload.
    pub fn user_message(&self) -> &'static str {
        match self {
            IngestError::InvalidType(_) => "Please upload a valid image file",
            IngestError::TooLarge(_) => "Image size should be less than 20MB",
            IngestError::Read(_) => "Failed to read the image file. Please try again.",
            IngestError::SampleUnavailable(_) => "Failed to load default image",
        }
    }
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::InvalidType(declared) => {
                write!(f, "unsupported image type '{declared}'")
            }
            IngestError::TooLarge(byte_len) => {
                write!(f, "image is {byte_len} bytes; limit is {MAX_IMAGE_BYTES}")
            }
            IngestError::Read(detail) => write!(f, "image read failed: {detail}"),
            IngestError::SampleUnavailable(detail) => {
                write!(f, "bundled sample unavailable: {detail}")
            }
        }
    }
}

impl std::error::Error for IngestError {}
