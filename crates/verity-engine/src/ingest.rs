use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use verity_contracts::image::{is_allowed_mime, EncodedImage, IngestError, MAX_IMAGE_BYTES};

pub const SAMPLE_IMAGE_BYTES: &[u8] = include_bytes!("../resources/sample_image.png");
pub const SAMPLE_IMAGE_MIME_TYPE: &str = "image/png";

/// Fixed report paired with the bundled sample image on the bootstrap path.
pub const SAMPLE_REPORT: &str = include_str!("../resources/sample_report.md");

/// Declared MIME type for a path, from its extension. The upload surface
/// hands over plain paths, so the extension plays the role a browser's
/// `file.type` would.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Validates and encodes an on-disk upload.
///
/// The declared-type check runs before anything is read, and the size check
/// runs against metadata before the bytes are pulled in, so rejected uploads
/// never reach the encoder.
pub fn ingest_file(path: &Path) -> Result<EncodedImage, IngestError> {
    let mime_type = mime_for_path(path)
        .ok_or_else(|| IngestError::InvalidType(path.display().to_string()))?;
    let metadata = fs::metadata(path).map_err(|err| IngestError::Read(err.to_string()))?;
    if metadata.len() > MAX_IMAGE_BYTES {
        return Err(IngestError::TooLarge(metadata.len()));
    }
    let bytes = fs::read(path).map_err(|err| IngestError::Read(err.to_string()))?;
    ingest_bytes(mime_type, &bytes)
}

/// Validates and encodes in-memory image bytes under a declared MIME type.
pub fn ingest_bytes(mime_type: &str, bytes: &[u8]) -> Result<EncodedImage, IngestError> {
    if !is_allowed_mime(mime_type) {
        return Err(IngestError::InvalidType(mime_type.to_string()));
    }
    if bytes.len() as u64 > MAX_IMAGE_BYTES {
        return Err(IngestError::TooLarge(bytes.len() as u64));
    }
    // The decode probe catches truncated or corrupt streams that a plain
    // read would pass through, and yields the preview dimensions.
    let decoded =
        image::load_from_memory(bytes).map_err(|err| IngestError::Read(err.to_string()))?;
    Ok(encode_image(mime_type, bytes, decoded.width(), decoded.height()))
}

/// Encodes the compiled-in sample image. Failures here are sample problems,
/// never analysis problems.
pub fn load_bundled_sample() -> Result<EncodedImage, IngestError> {
    ingest_bytes(SAMPLE_IMAGE_MIME_TYPE, SAMPLE_IMAGE_BYTES)
        .map_err(|err| IngestError::SampleUnavailable(err.to_string()))
}

fn encode_image(mime_type: &str, bytes: &[u8], width: u32, height: u32) -> EncodedImage {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let sha256 = hex::encode(hasher.finalize());
    let data_url = format!("data:{};base64,{}", mime_type, BASE64.encode(bytes));
    EncodedImage {
        mime_type: mime_type.to_string(),
        byte_len: bytes.len() as u64,
        sha256,
        width,
        height,
        data_url,
    }
}

#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    use std::io::Cursor;

    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 40) as u8, (y * 40) as u8, 128])
    });
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .expect("png encode");
    buf.into_inner()
}
