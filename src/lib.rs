//! # sketch2gif
//!
//! Accept a still drawing over HTTP and return the URL of a generated
//! animated GIF, produced by an external conversion tool and published to
//! durable object storage.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Gate       multipart validation (field presence, extension, size)
//!  ├─ 2. Workspace  unique per-job staging dir + input file
//!  ├─ 3. Tool       child process under a hard wall-clock deadline
//!  ├─ 4. Verify     contractual artifact exists on disk
//!  ├─ 5. Publish    S3 PUT under {job_id}/video.gif → deterministic URL
//!  └─ 6. Release    staging state deleted on every exit path
//! ```
//!
//! Each request is an independent job keyed by a random UUID; the id
//! partitions the staging directory and the store key space, so concurrent
//! jobs share nothing mutable and need no locks. Whatever a job's outcome —
//! success or any classified failure — its staging state is gone by the
//! time the response is written.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sketch2gif::{app_router, AppState, ProcessToolRunner, S3ArtifactStore, ServiceConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder().bucket("drawings-prod").build()?;
//!     let store =
//!         S3ArtifactStore::connect(config.bucket.clone(), config.public_base_url.clone()).await;
//!     let state = AppState {
//!         config: Arc::new(config),
//!         runner: Arc::new(ProcessToolRunner),
//!         store: Arc::new(store),
//!     };
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:5000").await?;
//!     axum::serve(listener, app_router(state)).await?;
//!     Ok(())
//! }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServiceConfig, ServiceConfigBuilder, ALLOWED_EXTENSIONS};
pub use convert::{convert, ConversionRequest};
pub use error::ConvertError;
pub use job::{ConversionJob, JobStage, ARTIFACT_FILENAME, SKELETON_FILENAME};
pub use pipeline::publish::{ArtifactStore, S3ArtifactStore};
pub use pipeline::tool::{ProcessToolRunner, ToolInvocation, ToolOutput, ToolRunner};
pub use pipeline::workspace::JobWorkspace;
pub use server::{app_router, AppState};
