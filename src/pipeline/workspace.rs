//! Workspace management: per-job staging allocation and guaranteed release.
//!
//! ## Why a guard instead of try/finally?
//!
//! Every exit path of the pipeline — success, classified failure, or the
//! request future being dropped mid-flight — must delete the staged input
//! and the job's output directory. [`JobWorkspace`] owns both paths and
//! releases them in `Drop`, so no call site can forget cleanup. The
//! orchestrator still calls [`JobWorkspace::release`] explicitly on its
//! normal path; release is idempotent, so the `Drop` backstop then does
//! nothing.
//!
//! Deletion errors are logged and swallowed: cleanup is best-effort hygiene
//! and must never mask the pipeline's primary result.

use crate::config::ServiceConfig;
use crate::error::ConvertError;
use crate::job::{ConversionJob, JobStage, SKELETON_FILENAME};
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

/// Owns one job's staging state on disk.
pub struct JobWorkspace {
    job: ConversionJob,
    released: bool,
}

impl JobWorkspace {
    /// Allocate a fresh workspace for an upload.
    ///
    /// Generates the job id, derives the collision-free input path and the
    /// job-owned output directory, and ensures the shared staging directory
    /// exists. Nothing job-specific is written to disk yet.
    pub fn allocate(
        config: &ServiceConfig,
        original_filename: &str,
        index: Option<i64>,
    ) -> Result<Self, ConvertError> {
        let id = Uuid::new_v4().to_string();

        std::fs::create_dir_all(&config.staging_dir).map_err(|source| {
            ConvertError::StagingFailed {
                path: config.staging_dir.clone(),
                source,
            }
        })?;

        let safe_name = sanitize_filename(original_filename);
        let input_path = config.staging_dir.join(format!("{id}_{safe_name}"));
        let output_dir = config.data_dir.join(&id);

        debug!(job_id = %id, input = %input_path.display(), "workspace allocated");

        Ok(Self {
            job: ConversionJob {
                id,
                input_path,
                output_dir,
                index,
                skeleton_path: None,
                stage: JobStage::Created,
            },
            released: false,
        })
    }

    pub fn job(&self) -> &ConversionJob {
        &self.job
    }

    pub fn job_mut(&mut self) -> &mut ConversionJob {
        &mut self.job
    }

    /// Write the uploaded image to the staged input path and create the
    /// job's output directory.
    ///
    /// The tool is also permitted to create the output directory lazily;
    /// creating it here keeps skeleton staging order-independent.
    pub async fn stage_input(&mut self, bytes: &[u8]) -> Result<(), ConvertError> {
        tokio::fs::write(&self.job.input_path, bytes)
            .await
            .map_err(|source| ConvertError::StagingFailed {
                path: self.job.input_path.clone(),
                source,
            })?;

        tokio::fs::create_dir_all(&self.job.output_dir)
            .await
            .map_err(|source| ConvertError::StagingFailed {
                path: self.job.output_dir.clone(),
                source,
            })?;

        self.job.stage = JobStage::Staged;
        debug!(job_id = %self.job.id, bytes = bytes.len(), "input staged");
        Ok(())
    }

    /// Stage a skeleton descriptor inside the output directory, switching
    /// the job to the skeleton-aware tool variant.
    pub async fn stage_skeleton(&mut self, bytes: &[u8]) -> Result<(), ConvertError> {
        let path = self.job.output_dir.join(SKELETON_FILENAME);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| ConvertError::StagingFailed {
                path: path.clone(),
                source,
            })?;

        debug!(job_id = %self.job.id, skeleton = %path.display(), "skeleton staged");
        self.job.skeleton_path = Some(path);
        Ok(())
    }

    /// Delete the staged input file and the output directory.
    ///
    /// Idempotent: the second and later calls are no-ops. Absent paths are
    /// fine — an early validation reject may never have staged anything.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        remove_path(&self.job.input_path);
        remove_path(&self.job.output_dir);
        self.job.stage = JobStage::Cleaned;
        debug!(job_id = %self.job.id, "workspace released");
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        self.release();
    }
}

/// Best-effort removal of a file or directory tree.
fn remove_path(path: &Path) {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else if path.is_file() {
        std::fs::remove_file(path)
    } else {
        return;
    };

    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "failed to clean up path");
    }
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Strips any directory part, maps everything outside `[A-Za-z0-9._-]` to
/// `_`, and refuses to produce a hidden or empty name. The result is only
/// ever used as a suffix after the job id, so uniqueness does not depend
/// on it.
pub fn sanitize_filename(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let mut safe: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    while safe.starts_with('.') {
        safe.remove(0);
    }

    if safe.is_empty() {
        "upload".to_string()
    } else {
        safe
    }
}
