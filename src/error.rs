use thiserror::Error;

/// Error kinds surfaced at the file-collaborator boundary.
///
/// Every other operation in the crate (pin/unpin, skip-list Search/Insert/
/// Update/Delete, table Read) reports failure as `Option`/`bool` per the
/// error taxonomy in the spec: Not-found and Duplicate-key are never
/// exceptional. Only I/O, resource exhaustion and malformed arguments
/// surface here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("I/O failure: {0}")]
    Io(String),
}
