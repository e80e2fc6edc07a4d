//! Error taxonomy
//!
//! Only configuration and resource failures are modeled as `Result::Err`.
//! Packet loss, stream interruption and missing detections are not errors —
//! they are values (`GapEvent`, `Option<ToneDetection>`, an abstaining vote)
//! handled in `types.rs` and by each component directly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
