//! Inline image uploads
//!
//! Avatars, icons and emoji images are sent as base64 data URIs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Serialize, Serializer};

/// Image encoded as `data:{content_type};base64,{data}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    content_type: &'static str,
    encoded: String,
}

impl ImageData {
    /// Encode raw image bytes; the type is sniffed from the file signature
    ///
    /// Returns `None` for formats the platform does not accept.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let content_type = sniff_content_type(bytes)?;
        Some(Self {
            content_type,
            encoded: STANDARD.encode(bytes),
        })
    }

    #[must_use]
    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    /// The full data URI
    #[must_use]
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.content_type, self.encoded)
    }
}

impl Serialize for ImageData {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_data_uri())
    }
}

fn sniff_content_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}
