//! Error types for document extraction.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// Missing credential or unusable backend; no document can succeed.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("extraction service error: {0}")]
    Service(String),

    #[error("extraction service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed extraction payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The PDF has no usable text layer (corrupt, or scanned pages).
    #[error("unreadable document: {0}")]
    Unreadable(String),

    #[error("output error: {0}")]
    Output(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    /// Fatal errors abort a whole batch; everything else is confined to the
    /// document that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExtractError::Config(_) | ExtractError::Output(_) | ExtractError::Io(_)
        )
    }
}
