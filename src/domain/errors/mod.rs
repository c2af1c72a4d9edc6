// Domain errors - Error types for the domain layer

use thiserror::Error;

/// Domain-specific error types.
///
/// Variants map onto the pipeline's error taxonomy: `BadArgs`, `InputNotFound`,
/// `ScanConflict` and `InvalidUrl` are synchronous input rejections; `OcrFail`
/// is transient (logged, the tick is skipped); `TrimFail` is a per-interval
/// failure; the rest are job-fatal.
#[derive(Error, Debug)]
pub enum DomainError {
    /// Invalid arguments provided
    #[error("bad arguments: {0}")]
    BadArgs(String),

    /// Input file does not exist or is unreadable
    #[error("input not found: {0}")]
    InputNotFound(String),

    /// A scan is already active for the requested source
    #[error("scan already active for source: {0}")]
    ScanConflict(String),

    /// Frame source became permanently unavailable
    #[error("frame source lost: {0}")]
    SourceLost(String),

    /// OCR backend failed to initialize
    #[error("OCR backend failed to initialize: {0}")]
    OcrInit(String),

    /// A single OCR invocation failed
    #[error("OCR call failed: {0}")]
    OcrFail(String),

    /// Trimming tool failed for one interval
    #[error("trim failed: {0}")]
    TrimFail(String),

    /// Remote fetch tool failed
    #[error("download failed: {0}")]
    FetchFail(String),

    /// Remote URL does not match the accepted shape
    #[error("invalid download URL: {0}")]
    InvalidUrl(String),

    /// Bookmark log could not be written or parsed
    #[error("session log error: {0}")]
    SessionIo(String),

    /// Unknown job identifier
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Operation was cancelled cooperatively
    #[error("operation cancelled")]
    Cancelled,
}

impl DomainError {
    /// Transient errors do not change job state; the current tick is skipped.
    pub fn is_transient(&self) -> bool {
        matches!(self, DomainError::OcrFail(_))
    }
}
