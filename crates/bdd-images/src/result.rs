//! Result and error types for bdd-images.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for bdd-images operations
pub type ImagesResult<T> = Result<T, ImagesError>;

/// Errors that can occur while capturing, storing or rendering images
#[derive(Debug, Error)]
pub enum ImagesError {
    /// Binary payload is not a PNG or JPEG image
    #[error("The provided binary data is not a valid PNG or JPG image (detected {format})")]
    UnsupportedFormat {
        /// Format reported by the sniffer
        format: String,
    },

    /// File extension is not `.png` or `.jpg`
    #[error("Unsupported file extension for {path}: only PNG and JPG files can be attached")]
    UnsupportedExtension {
        /// Offending path
        path: PathBuf,
    },

    /// Image file does not exist
    #[error("The provided file cannot be found at the specified path: {path}")]
    FileNotFound {
        /// Missing path
        path: PathBuf,
    },

    /// Image data could not be decoded
    #[error("Image decode failed: {message}")]
    Decode {
        /// Error message
        message: String,
    },

    /// Image data could not be re-encoded as PNG
    #[error("Image encode failed: {message}")]
    Encode {
        /// Error message
        message: String,
    },

    /// No destination folder is known for the current scenario
    #[error("No destination folder configured for scenario images")]
    NoDestination,

    /// Two hashes of different grid sizes were compared
    #[error("Image hashes must be of the same shape: {left}x{left} vs {right}x{right}")]
    HashShapeMismatch {
        /// Grid size of the left operand
        left: usize,
        /// Grid size of the right operand
        right: usize,
    },

    /// Host framework version string could not be parsed
    #[error("Invalid host framework version: {version}")]
    InvalidVersion {
        /// Raw version string
        version: String,
    },

    /// A lifecycle handler failed
    #[error("Hook '{hook}' failed: {message}")]
    Hook {
        /// Hook name
        hook: String,
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ImagesError {
    /// Create a decode error
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create an encode error
    #[must_use]
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Create a hook error
    #[must_use]
    pub fn hook(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            hook: hook.into(),
            message: message.into(),
        }
    }
}

impl From<image::ImageError> for ImagesError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Encoding(e) => Self::encode(e.to_string()),
            other => Self::decode(other.to_string()),
        }
    }
}
