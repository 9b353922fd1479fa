/// Error types for vigrep.
///
/// Errors fall into three groups, which matter to the scan driver:
///
/// 1. **Recovered locally**: [`VigrepError::SectionDecode`] and
///    [`VigrepError::TextDecode`] never escape a single file's pipeline. The
///    section is marked as failed, or the heap object is skipped, and the
///    error is kept as a warning.
/// 2. **Per-file failures**: [`VigrepError::MalformedContainer`],
///    [`VigrepError::TruncatedRead`], [`VigrepError::SanityCheckFailed`] and
///    plain I/O errors abort one file. The scan driver turns them into a
///    failed [`crate::results::FileOutcome`] and moves on.
/// 3. **Fatal**: [`VigrepError::Interrupted`], [`VigrepError::ConfigError`] and
///    [`VigrepError::InvalidPattern`] stop the whole scan.
///
/// ```rust,ignore
/// match extract_from_path(path, &options, &metrics) {
///     Ok(extraction) => // search extraction.text,
///     Err(VigrepError::MalformedContainer(_)) => // count and skip,
///     Err(e) => // other per-file failure
/// }
/// ```
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for vigrep operations
pub type VigrepResult<T> = Result<T, VigrepError>;

/// Errors that can occur while scanning VI files
#[derive(Error, Debug)]
pub enum VigrepError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Malformed container: {0}")]
    MalformedContainer(String),
    #[error("Truncated read at offset {offset}: expected {expected} bytes, found {found}")]
    TruncatedRead {
        offset: u64,
        expected: u64,
        found: u64,
    },
    #[error("Section {section} of block {block} failed to decode: {reason}")]
    SectionDecode {
        block: String,
        section: i32,
        reason: String,
    },
    #[error("Sanity check failed: {0}")]
    SanityCheckFailed(String),
    #[error("Text in block {block} section {section} is not valid {encoding} ({length} bytes)")]
    TextDecode {
        block: String,
        section: i32,
        encoding: &'static str,
        length: usize,
    },
    #[error("Scan interrupted")]
    Interrupted,
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

impl VigrepError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedContainer(msg.into())
    }

    pub fn truncated(offset: u64, expected: u64, found: u64) -> Self {
        Self::TruncatedRead {
            offset,
            expected,
            found,
        }
    }

    pub fn section_decode(block: impl Into<String>, section: i32, reason: impl Into<String>) -> Self {
        Self::SectionDecode {
            block: block.into(),
            section,
            reason: reason.into(),
        }
    }

    pub fn sanity(msg: impl Into<String>) -> Self {
        Self::SanityCheckFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid_pattern(pattern: impl Into<String>) -> Self {
        Self::InvalidPattern(pattern.into())
    }

    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound(path.into())
    }

    /// Maps an I/O error from opening `path` to the most specific variant.
    pub fn from_open(path: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::file_not_found(path),
            _ => Self::IoError(err),
        }
    }
}
