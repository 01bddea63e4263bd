//! Artifact verification: confirm the tool honoured its output contract.
//!
//! The tool's exit code is not trusted as a proxy for "artifact present" —
//! a script can exit zero after an internal encoder failure. Checking the
//! contractual path before upload turns that case into a distinct,
//! reportable [`ConvertError::MissingArtifact`] instead of an attempt to
//! publish a nonexistent file.

use crate::error::ConvertError;
use std::path::Path;

/// Check that the expected artifact exists as a regular file.
///
/// Called strictly after a zero-exit, non-timeout tool run.
pub fn verify_artifact(path: &Path) -> Result<(), ConvertError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ConvertError::MissingArtifact {
            path: path.to_path_buf(),
        })
    }
}
