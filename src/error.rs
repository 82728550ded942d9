//! Error types for the video output pipeline

/// Video output error type
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("video output is closed")]
    Closed,

    #[error("no active video frame; format negotiation has not happened yet")]
    NoActiveFrame,
}

pub type OutputResult<T> = Result<T, OutputError>;
