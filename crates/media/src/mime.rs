use {async_trait::async_trait, image::ImageFormat};

use crate::Result;

/// Fallback MIME type when nothing better is known.
pub const OCTET_STREAM: &str = "application/octet-stream";

const PDF_MIME: &str = "application/pdf";
const PDF_MAGIC: &[u8] = b"%PDF-";

/// A MIME sniffing capability. Hosts may provide several; callers try them
/// in order and take the first usable answer.
#[async_trait]
pub trait MimeDetector: Send + Sync {
    async fn detect(&self, bytes: &[u8]) -> Result<Option<String>>;
}

/// Detects image formats known to the `image` crate, plus PDF documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct MagicBytesDetector;

#[async_trait]
impl MimeDetector for MagicBytesDetector {
    async fn detect(&self, bytes: &[u8]) -> Result<Option<String>> {
        Ok(sniff_mime(bytes).map(str::to_string))
    }
}

/// Guess a MIME type from the leading bytes of a buffer.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if let Ok(format) = image::guess_format(bytes) {
        return Some(format.to_mime_type());
    }
    bytes.starts_with(PDF_MAGIC).then_some(PDF_MIME)
}

/// File extension for a MIME type, ignoring parameters such as `charset`.
pub fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        PDF_MIME => "pdf",
        "text/plain" => "txt",
        "image/jpg" => "jpg",
        other => ImageFormat::from_mime_type(other)
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or("bin"),
    }
}
