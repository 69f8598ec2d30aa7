//! Scanner error types and process exit codes.

use thiserror::Error;

// ── Exit codes ──────────────────────────────────────────────────────────────

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_GENERAL: i32 = 1;
pub const EXIT_INSUFFICIENT: i32 = 2;
pub const EXIT_KEYS: i32 = 3;
pub const EXIT_EXTERNAL_TOOL: i32 = 4;

// ── ScanError enum ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ScanError {
    /// A network block literal could not be parsed. Callers skip the block.
    #[error("invalid range `{literal}`: {reason}")]
    Validation { literal: String, reason: String },

    /// A probe result row was malformed; the whole attempt is discarded.
    #[error("malformed probe result at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("found {found} clean endpoints, at least {required} required")]
    InsufficientCandidates { found: usize, required: usize },

    #[error("external tool `{tool}` failed: {reason}")]
    ExternalTool { tool: String, reason: String },

    #[error("invalid key material: {0}")]
    KeyValidation(String),

    #[error("no key source produced a usable keypair")]
    KeyAcquisition,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScanError {
    pub(crate) fn validation(literal: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            literal: literal.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn external(tool: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::ExternalTool {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }

    /// Map this error to the process exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            ScanError::InsufficientCandidates { .. } => EXIT_INSUFFICIENT,
            ScanError::KeyValidation(_) | ScanError::KeyAcquisition => EXIT_KEYS,
            ScanError::ExternalTool { .. } => EXIT_EXTERNAL_TOOL,
            ScanError::Validation { .. }
            | ScanError::Parse { .. }
            | ScanError::Config(_)
            | ScanError::Io(_)
            | ScanError::Http(_)
            | ScanError::Json(_) => EXIT_GENERAL,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
