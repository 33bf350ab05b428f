//! Error types for the encoder module.

use thiserror::Error;

/// Errors that can occur during encoding operations.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// Invalid input data.
    #[error("Invalid input data: {0}")]
    InvalidInput(String),

    /// Codec failure.
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl From<image::ImageError> for EncoderError {
    fn from(err: image::ImageError) -> Self {
        Self::Encoding(err.to_string())
    }
}
