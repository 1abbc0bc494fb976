//! Image content-type detection
//!
//! Resolution order: a caller-provided `image/*` type, then magic-byte
//! sniffing, then the file name's extension, then the generic binary type.

use tracing::{debug, warn};

/// Generic binary fallback; never accepted as a detected image type
pub const OCTET_STREAM: &str = "application/octet-stream";

const IMAGE_PREFIX: &str = "image/";

#[derive(Debug, Clone, Copy, Default)]
pub struct ContentTypeDetector;

impl ContentTypeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the content type for `content` stored under `file_name`.
    pub fn detect(&self, content: &[u8], provided: Option<&str>, file_name: &str) -> String {
        if let Some(provided) = provided.map(str::trim).filter(|p| is_valid_image_content_type(p)) {
            debug!("Using provided content type '{}' for '{}'", provided, file_name);
            return provided.to_string();
        }

        if let Some(sniffed) = self.sniff(content) {
            debug!("Detected content type '{}' from content for '{}'", sniffed, file_name);
            return sniffed.to_string();
        }

        let from_name = mime_guess::from_path(file_name).first_or_octet_stream();
        if is_valid_image_content_type(from_name.essence_str()) {
            debug!("Detected content type '{}' from file name '{}'", from_name, file_name);
            return from_name.essence_str().to_string();
        }

        warn!("Could not determine image content type for '{}', using default", file_name);
        OCTET_STREAM.to_string()
    }

    /// Content-only detection with no hints
    pub fn detect_content(&self, content: &[u8]) -> String {
        self.detect(content, None, "unknown")
    }

    /// True when the bytes sniff as an `image/*` type
    pub fn is_image(&self, content: &[u8]) -> bool {
        self.sniff(content).is_some()
    }

    fn sniff(&self, content: &[u8]) -> Option<&'static str> {
        infer::get(content)
            .map(|kind| kind.mime_type())
            .filter(|mime| is_valid_image_content_type(mime))
    }
}

/// Non-blank, not the generic binary type, well-formed, and `image/*`
pub fn is_valid_image_content_type(content_type: &str) -> bool {
    let content_type = content_type.trim();
    !content_type.is_empty()
        && content_type != OCTET_STREAM
        && content_type.starts_with(IMAGE_PREFIX)
        && content_type.parse::<mime_guess::mime::Mime>().is_ok()
}
