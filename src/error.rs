//! Error types for the sketch2gif pipeline.
//!
//! Every pipeline failure is classified into exactly one [`ConvertError`]
//! variant at the stage where it occurs. The variants carry full diagnostics
//! (captured tool output, store error text, offending paths) for the operator
//! log, while [`ConvertError::client_message`] reduces each class to the
//! short, fixed string the HTTP layer returns — tool stdout/stderr and store
//! internals are never echoed back to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// All failures the conversion pipeline can report.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Request failed validation before a job was created. The reason is
    /// safe to show to the caller.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// Uploaded file exceeds the configured size cap.
    #[error("upload exceeds the {limit_mib} MiB limit")]
    PayloadTooLarge { limit_mib: u64 },

    // ── Staging errors ────────────────────────────────────────────────────
    /// Could not write the upload or its auxiliary files to the staging area.
    #[error("failed to stage '{path}': {source}")]
    StagingFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Tool errors ───────────────────────────────────────────────────────
    /// The conversion tool ran past its wall-clock deadline and was killed.
    /// Distinct from [`ConvertError::ToolFailure`]: the tool never got to
    /// report an exit status of its own.
    #[error("conversion tool exceeded the {secs}s deadline")]
    ToolTimeout { secs: u64 },

    /// The conversion tool exited abnormally. Captured output is retained
    /// for diagnostics.
    #[error("conversion tool failed ({status})")]
    ToolFailure {
        status: String,
        stdout: String,
        stderr: String,
    },

    /// The tool exited zero but the contractual artifact is not on disk.
    /// A zero exit is not trusted as proof the output exists.
    #[error("conversion tool exited cleanly but no artifact at '{path}'")]
    MissingArtifact { path: PathBuf },

    // ── Publish errors ────────────────────────────────────────────────────
    /// The object store rejected or failed the upload.
    #[error("artifact upload failed: {detail}")]
    PublishFailure { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error. Always logged in full, never silently
    /// dropped.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// The generic message returned to the HTTP caller for this error class.
    ///
    /// Only [`ConvertError::InvalidInput`] exposes its detail: validation
    /// reasons describe the caller's own request. Everything else collapses
    /// to a fixed string; the detail stays in the log.
    pub fn client_message(&self) -> String {
        match self {
            ConvertError::InvalidInput { reason } => reason.clone(),
            ConvertError::PayloadTooLarge { limit_mib } => {
                format!("File size exceeds limit ({limit_mib}MB)")
            }
            ConvertError::ToolTimeout { .. } => "Animation generation timed out".to_string(),
            ConvertError::ToolFailure { .. } | ConvertError::MissingArtifact { .. } => {
                "Animation generation failed".to_string()
            }
            ConvertError::PublishFailure { .. } => "File upload failed".to_string(),
            ConvertError::StagingFailed { .. }
            | ConvertError::InvalidConfig(_)
            | ConvertError::Internal(_) => "Internal server error".to_string(),
        }
    }
}
