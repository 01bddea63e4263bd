//! Per-request conversion job model.
//!
//! One [`ConversionJob`] exists per accepted upload. Its `id` partitions
//! every shared namespace the pipeline touches — the staging directory, the
//! per-job output directory, and the object-store key prefix — which is the
//! sole concurrency-safety mechanism: no two live jobs ever reference the
//! same path, so no locking is needed anywhere in the pipeline.

use std::fmt;
use std::path::PathBuf;

/// Filename the conversion tool must write inside the job's output
/// directory before exiting zero. This is a contract with the tool, not a
/// discovered value; the publisher reuses it as the final key segment.
pub const ARTIFACT_FILENAME: &str = "video.gif";

/// Filename a staged skeleton descriptor is written under.
pub const SKELETON_FILENAME: &str = "skeleton.json";

/// Lifecycle of a single conversion job.
///
/// Advances strictly forward; `Cleaned` is terminal and always reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Created,
    Staged,
    ToolRunning,
    ToolDone,
    Verified,
    Published,
    Failed,
    Cleaned,
}

impl JobStage {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStage::Created => "created",
            JobStage::Staged => "staged",
            JobStage::ToolRunning => "tool_running",
            JobStage::ToolDone => "tool_done",
            JobStage::Verified => "verified",
            JobStage::Published => "published",
            JobStage::Failed => "failed",
            JobStage::Cleaned => "cleaned",
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request's conversion attempt.
#[derive(Debug)]
pub struct ConversionJob {
    /// Unique identifier; doubles as output-directory name and store key
    /// prefix.
    pub id: String,

    /// Staged copy of the upload. Named `{id}_{sanitised_name}` so two jobs
    /// with identical original filenames never collide.
    pub input_path: PathBuf,

    /// Directory owned exclusively by this job; the tool writes its
    /// artifact here.
    pub output_dir: PathBuf,

    /// Animation index passed through to the tool, unvalidated beyond
    /// integer parseability.
    pub index: Option<i64>,

    /// Staged skeleton descriptor, when the caller supplied one. Presence
    /// selects the skeleton-aware tool variant.
    pub skeleton_path: Option<PathBuf>,

    /// Current lifecycle stage, for logging.
    pub stage: JobStage,
}

impl ConversionJob {
    /// Where the tool is contractually obliged to leave the artifact.
    pub fn artifact_path(&self) -> PathBuf {
        self.output_dir.join(ARTIFACT_FILENAME)
    }

    /// Deterministic object-store key for the published artifact.
    pub fn object_key(&self) -> String {
        format!("{}/{}", self.id, ARTIFACT_FILENAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str) -> ConversionJob {
        ConversionJob {
            id: id.to_string(),
            input_path: PathBuf::from(format!("/tmp/drawings/{id}_cat.png")),
            output_dir: PathBuf::from(format!("/tmp/{id}")),
            index: Some(0),
            skeleton_path: None,
            stage: JobStage::Created,
        }
    }

    #[test]
    fn artifact_path_is_fixed_inside_output_dir() {
        let j = job("abc");
        assert_eq!(j.artifact_path(), PathBuf::from("/tmp/abc/video.gif"));
    }

    #[test]
    fn object_key_is_id_prefixed() {
        assert_eq!(job("abc").object_key(), "abc/video.gif");
    }

    #[test]
    fn stage_names_match_wire_form() {
        assert_eq!(JobStage::ToolRunning.to_string(), "tool_running");
        assert_eq!(JobStage::Cleaned.to_string(), "cleaned");
    }
}
