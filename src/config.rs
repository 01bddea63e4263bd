//! Service configuration.
//!
//! All pipeline behaviour is controlled through [`ServiceConfig`], built via
//! its [`ServiceConfigBuilder`]. Keeping every knob in one immutable struct
//! makes it trivial to share across request handlers behind an `Arc` — the
//! config is injected at startup and never mutated afterwards, so concurrent
//! jobs need no synchronisation around it.

use crate::error::ConvertError;
use std::path::{Path, PathBuf};

/// File extensions accepted for the uploaded image, lower-case.
pub const ALLOWED_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Configuration for the conversion service.
///
/// Built via [`ServiceConfig::builder()`].
///
/// # Example
/// ```rust
/// use sketch2gif::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .bucket("drawings-prod")
///     .tool_deadline_secs(300)
///     .build()
///     .unwrap();
/// assert!(config.public_base_url.starts_with("https://drawings-prod"));
/// ```
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base directory for per-job output directories; also the working
    /// directory the conversion tool runs in. Default: `"."`.
    pub data_dir: PathBuf,

    /// Directory staged uploads are written to. Default: `{data_dir}/drawings`.
    pub staging_dir: PathBuf,

    /// Interpreter used to launch the conversion scripts. Default: `"python"`.
    pub python_bin: String,

    /// Conversion script for plain image input, resolved relative to
    /// `data_dir` when not absolute. Default: `image_to_animation.py`.
    pub animate_script: PathBuf,

    /// Conversion script used when a skeleton descriptor accompanies the
    /// image. Default: `image_to_animation_custom.py`.
    pub skeleton_script: PathBuf,

    /// Wall-clock budget for one tool invocation, in seconds. Default: 300.
    ///
    /// The tool renders and encodes an animation, so minutes-long runs are
    /// normal; past this bound the child process is killed and the job is
    /// reported as timed out rather than left to run unattended.
    pub tool_deadline_secs: u64,

    /// Bound on the store upload, in seconds. Default: 120.
    ///
    /// The underlying SDK has its own retry/timeout machinery, but a
    /// multi-megabyte PUT over a degraded link can still hang for far longer
    /// than any caller waits. This cap turns that into a reportable
    /// publish failure.
    pub upload_timeout_secs: u64,

    /// Maximum accepted upload size in bytes. Default: 16 MiB.
    pub max_upload_bytes: u64,

    /// Object-store bucket receiving published artifacts. Required.
    pub bucket: String,

    /// Public base address artifacts are served from. Defaults to the
    /// bucket's virtual-hosted S3 address. The published URL is
    /// `{public_base_url}/{job_id}/{artifact}` — derived, never read back
    /// from the store.
    pub public_base_url: String,
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Resolve a conversion-script path against `data_dir`.
    pub fn script_path(&self, script: &Path) -> PathBuf {
        if script.is_absolute() {
            script.to_path_buf()
        } else {
            self.data_dir.join(script)
        }
    }

    /// The public URL for an uploaded object key.
    pub fn artifact_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), key)
    }

    /// The configured size cap in whole MiB, for client-facing messages.
    pub fn max_upload_mib(&self) -> u64 {
        self.max_upload_bytes / (1024 * 1024)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    data_dir: Option<PathBuf>,
    staging_dir: Option<PathBuf>,
    python_bin: Option<String>,
    animate_script: Option<PathBuf>,
    skeleton_script: Option<PathBuf>,
    tool_deadline_secs: Option<u64>,
    upload_timeout_secs: Option<u64>,
    max_upload_bytes: Option<u64>,
    bucket: Option<String>,
    public_base_url: Option<String>,
}

impl ServiceConfigBuilder {
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub fn python_bin(mut self, bin: impl Into<String>) -> Self {
        self.python_bin = Some(bin.into());
        self
    }

    pub fn animate_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.animate_script = Some(script.into());
        self
    }

    pub fn skeleton_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.skeleton_script = Some(script.into());
        self
    }

    pub fn tool_deadline_secs(mut self, secs: u64) -> Self {
        self.tool_deadline_secs = Some(secs);
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.upload_timeout_secs = Some(secs);
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = Some(bytes);
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, ConvertError> {
        let bucket = self
            .bucket
            .filter(|b| !b.is_empty())
            .ok_or_else(|| ConvertError::InvalidConfig("bucket name is required".into()))?;

        let tool_deadline_secs = self.tool_deadline_secs.unwrap_or(300);
        if tool_deadline_secs == 0 {
            return Err(ConvertError::InvalidConfig(
                "tool deadline must be ≥ 1 second".into(),
            ));
        }

        let max_upload_bytes = self.max_upload_bytes.unwrap_or(16 * 1024 * 1024);
        if max_upload_bytes == 0 {
            return Err(ConvertError::InvalidConfig(
                "upload size cap must be ≥ 1 byte".into(),
            ));
        }

        let data_dir = self.data_dir.unwrap_or_else(|| PathBuf::from("."));
        let staging_dir = self
            .staging_dir
            .unwrap_or_else(|| data_dir.join("drawings"));
        let public_base_url = self
            .public_base_url
            .unwrap_or_else(|| format!("https://{bucket}.s3.amazonaws.com"));

        Ok(ServiceConfig {
            data_dir,
            staging_dir,
            python_bin: self.python_bin.unwrap_or_else(|| "python".to_string()),
            animate_script: self
                .animate_script
                .unwrap_or_else(|| PathBuf::from("image_to_animation.py")),
            skeleton_script: self
                .skeleton_script
                .unwrap_or_else(|| PathBuf::from("image_to_animation_custom.py")),
            tool_deadline_secs,
            upload_timeout_secs: self.upload_timeout_secs.unwrap_or(120),
            max_upload_bytes,
            bucket,
            public_base_url,
        })
    }
}
