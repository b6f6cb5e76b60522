//! Image format detection from magic bytes.
//!
//! Only the leading bytes of a buffer are inspected; nothing is decoded.

use serde::{Deserialize, Serialize};
use std::fmt;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const GIF87A: &[u8; 6] = b"GIF87a";
const GIF89A: &[u8; 6] = b"GIF89a";

/// Image container format detected from a binary payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageFormat {
    /// Portable Network Graphics
    Png,
    /// JPEG (JFIF, EXIF or raw SOI stream)
    Jpeg,
    /// Graphics Interchange Format
    Gif,
    /// Anything else, including empty or truncated buffers
    Unknown,
}

impl ImageFormat {
    /// Whether images of this format can be attached to a report
    #[must_use]
    pub const fn is_attachable(self) -> bool {
        matches!(self, Self::Png | Self::Jpeg)
    }

    /// Upper-case display name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
            Self::Gif => "GIF",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Check for the 8-byte PNG signature
#[must_use]
pub fn is_png(data: &[u8]) -> bool {
    data.starts_with(&PNG_SIGNATURE)
}

/// Check for the JPEG start-of-image marker.
///
/// The byte after `FF D8` is the next marker (APP0 for JFIF, APP1 for EXIF,
/// DQT for raw encoders), so it is deliberately not inspected.
#[must_use]
pub fn is_jpeg(data: &[u8]) -> bool {
    data.starts_with(&JPEG_SOI)
}

/// Check for either GIF signature
#[must_use]
pub fn is_gif(data: &[u8]) -> bool {
    data.starts_with(GIF87A) || data.starts_with(GIF89A)
}

/// Detect the image format of a buffer. Never fails.
#[must_use]
pub fn detect_format(data: &[u8]) -> ImageFormat {
    if is_png(data) {
        ImageFormat::Png
    } else if is_jpeg(data) {
        ImageFormat::Jpeg
    } else if is_gif(data) {
        ImageFormat::Gif
    } else {
        ImageFormat::Unknown
    }
}
