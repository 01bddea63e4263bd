//! The conversion pipeline orchestrator.
//!
//! [`convert`] drives one validated upload through the fixed stage order —
//! stage input, run the tool, verify the artifact, publish — and maps every
//! failure to exactly one [`ConvertError`] class. Whatever happens, the
//! job's workspace is released exactly once before the result is returned;
//! if the request future is dropped mid-flight, the workspace guard's
//! `Drop` performs the same release.
//!
//! No stage is retried: the first failure is terminal for the job and later
//! stages are never attempted. Resubmission is the caller's decision.

use crate::config::ServiceConfig;
use crate::error::ConvertError;
use crate::job::JobStage;
use crate::pipeline::publish::ArtifactStore;
use crate::pipeline::tool::{ToolInvocation, ToolRunner};
use crate::pipeline::verify::verify_artifact;
use crate::pipeline::workspace::JobWorkspace;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A validated upload, ready for conversion.
///
/// Produced by the HTTP layer after input gating; the pipeline performs no
/// further validation of these fields.
#[derive(Debug)]
pub struct ConversionRequest {
    /// Client-supplied filename, sanitised during staging.
    pub original_filename: String,
    /// Raw bytes of the uploaded image.
    pub image: Vec<u8>,
    /// Animation index forwarded to the tool.
    pub index: i64,
    /// Optional pose descriptor; presence selects the skeleton-aware tool.
    pub skeleton: Option<Vec<u8>>,
}

/// Convert one upload into a published GIF URL.
///
/// # Returns
/// The public artifact URL on success.
///
/// # Errors
/// Exactly one classified [`ConvertError`] for whichever stage failed
/// first; in every case the job's staging directory and input file are
/// gone by the time this returns.
pub async fn convert(
    request: ConversionRequest,
    config: &ServiceConfig,
    runner: &dyn ToolRunner,
    store: &dyn ArtifactStore,
) -> Result<String, ConvertError> {
    let mut workspace =
        JobWorkspace::allocate(config, &request.original_filename, Some(request.index))?;
    let job_id = workspace.job().id.clone();
    info!(%job_id, filename = %request.original_filename, "conversion started");

    let result = run_stages(&mut workspace, &request, config, runner, store).await;

    match &result {
        Ok(url) => info!(%job_id, %url, "conversion complete"),
        Err(e) => {
            let stage = workspace.job().stage;
            workspace.job_mut().stage = JobStage::Failed;
            warn!(%job_id, %stage, error = %e, "conversion failed");
        }
    }

    // Exactly one deliberate release per job; the guard's Drop is only a
    // backstop for aborted requests.
    workspace.release();

    result
}

/// The stage sequence proper. Any `?` here short-circuits to the caller's
/// release.
async fn run_stages(
    workspace: &mut JobWorkspace,
    request: &ConversionRequest,
    config: &ServiceConfig,
    runner: &dyn ToolRunner,
    store: &dyn ArtifactStore,
) -> Result<String, ConvertError> {
    // ── Stage 1: stage input ─────────────────────────────────────────────
    workspace.stage_input(&request.image).await?;
    if let Some(ref skeleton) = request.skeleton {
        workspace.stage_skeleton(skeleton).await?;
    }

    // ── Stage 2: run the conversion tool ─────────────────────────────────
    let invocation = ToolInvocation::for_job(workspace.job(), config);
    let job_id = workspace.job().id.clone();
    debug!(
        %job_id,
        program = %invocation.program,
        args = ?invocation.args,
        "invoking conversion tool"
    );
    workspace.job_mut().stage = JobStage::ToolRunning;

    let output = runner
        .run(&invocation, Duration::from_secs(config.tool_deadline_secs))
        .await?;
    workspace.job_mut().stage = JobStage::ToolDone;

    if !output.stdout.is_empty() {
        debug!(%job_id, stdout = %output.stdout, "tool stdout");
    }
    if !output.stderr.is_empty() {
        warn!(%job_id, stderr = %output.stderr, "tool stderr");
    }

    // ── Stage 3: verify the artifact contract ────────────────────────────
    let artifact_path = workspace.job().artifact_path();
    verify_artifact(&artifact_path)?;
    workspace.job_mut().stage = JobStage::Verified;

    // ── Stage 4: publish ─────────────────────────────────────────────────
    let key = workspace.job().object_key();
    let url = tokio::time::timeout(
        Duration::from_secs(config.upload_timeout_secs),
        store.publish(&artifact_path, &key),
    )
    .await
    .map_err(|_| ConvertError::PublishFailure {
        detail: format!("upload timed out after {}s", config.upload_timeout_secs),
    })??;
    workspace.job_mut().stage = JobStage::Published;

    Ok(url)
}
