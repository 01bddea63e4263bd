//! HTTP surface: multipart input gating in front of the conversion pipeline.
//!
//! This layer is pure gating — field presence, extension whitelist, size
//! cap, index parseability. Anything that passes becomes a
//! [`ConversionRequest`] handed to [`crate::convert::convert`]; the
//! pipeline owns everything after that, including cleanup. Rejections here
//! happen before any job exists, so there is never staging state to undo.

use crate::config::{ServiceConfig, ALLOWED_EXTENSIONS};
use crate::convert::{convert, ConversionRequest};
use crate::error::ConvertError;
use crate::pipeline::publish::ArtifactStore;
use crate::pipeline::tool::ToolRunner;
use axum::extract::multipart::Field;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;

/// Shared, immutable service dependencies.
///
/// Constructed once at startup and cloned per request; nothing in here is
/// mutated after boot.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub runner: Arc<dyn ToolRunner>,
    pub store: Arc<dyn ArtifactStore>,
}

#[derive(Serialize)]
struct GifResponse {
    gif_url: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Pipeline error adapted to an HTTP response.
///
/// The body carries only [`ConvertError::client_message`]; diagnostics were
/// already logged at the point of failure.
pub struct ApiError(ConvertError);

impl From<ConvertError> for ApiError {
    fn from(e: ConvertError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ConvertError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            ConvertError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ConvertError::ToolTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorResponse {
            error: self.0.client_message(),
        });
        (status, body).into_response()
    }
}

/// Build the service router.
pub fn app_router(state: AppState) -> Router {
    // The outer body cap is deliberately looser than the image cap: the
    // per-field counter in `read_field_capped` is what produces the 413,
    // with the exact limit in its message. The outer bound only guards
    // against grossly oversized requests.
    let body_limit = (state.config.max_upload_bytes as usize)
        .saturating_mul(2)
        .saturating_add(64 * 1024);

    Router::new()
        .route("/gif/inside", post(generate_gif_inside))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

async fn generate_gif_inside(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<GifResponse>, ApiError> {
    let mut image: Option<(String, Vec<u8>)> = None;
    let mut skeleton: Option<Vec<u8>> = None;
    let mut index_raw: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| invalid("Malformed multipart body"))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = read_field_capped(field, state.config.max_upload_bytes).await?;
                image = Some((filename, data));
            }
            Some("skeleton_json") => {
                skeleton = Some(read_field_capped(field, state.config.max_upload_bytes).await?);
            }
            Some("index") => {
                index_raw = Some(
                    field
                        .text()
                        .await
                        .map_err(|_| invalid("Malformed multipart body"))?,
                );
            }
            _ => {}
        }
    }

    let (filename, data) = image.ok_or_else(|| invalid("No image file provided"))?;

    let index_raw = index_raw.ok_or_else(|| invalid("No index provided"))?;
    let index: i64 = index_raw
        .trim()
        .parse()
        .map_err(|_| invalid("Index must be an integer"))?;

    if filename.is_empty() {
        return Err(invalid("No file selected"));
    }

    if !allowed_file(&filename) {
        return Err(invalid(&format!(
            "Invalid file type. Allowed types: {}",
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }

    let request = ConversionRequest {
        original_filename: filename,
        image: data,
        index,
        skeleton,
    };

    let gif_url = convert(
        request,
        &state.config,
        state.runner.as_ref(),
        state.store.as_ref(),
    )
    .await?;

    Ok(Json(GifResponse { gif_url }))
}

fn invalid(reason: &str) -> ApiError {
    ApiError(ConvertError::InvalidInput {
        reason: reason.to_string(),
    })
}

/// Accumulate a multipart field, rejecting it the moment it exceeds `cap`.
///
/// Rejecting mid-stream keeps oversize uploads from ever reaching job
/// allocation — the size scenario fails before any staging state exists.
async fn read_field_capped(mut field: Field<'_>, cap: u64) -> Result<Vec<u8>, ApiError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|_| invalid("Malformed multipart body"))?
    {
        if (buf.len() + chunk.len()) as u64 > cap {
            return Err(ApiError(ConvertError::PayloadTooLarge {
                limit_mib: cap / (1024 * 1024),
            }));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Extension whitelist check on the client-supplied filename.
fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertError;
    use crate::job::ARTIFACT_FILENAME;
    use crate::pipeline::publish::public_url;
    use crate::pipeline::tool::{ToolInvocation, ToolOutput};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    /// Runner that honours the tool contract: writes the artifact into
    /// `<cwd>/<job_id>/` and exits cleanly.
    struct ContractRunner;

    #[async_trait]
    impl ToolRunner for ContractRunner {
        async fn run(
            &self,
            invocation: &ToolInvocation,
            _deadline: Duration,
        ) -> Result<ToolOutput, ConvertError> {
            let job_id = invocation.args.get(2).cloned().unwrap_or_default();
            let dir = invocation.current_dir.join(&job_id);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(ARTIFACT_FILENAME), b"GIF89a").unwrap();
            Ok(ToolOutput::default())
        }
    }

    struct StaticStore;

    #[async_trait]
    impl ArtifactStore for StaticStore {
        async fn publish(&self, _local: &Path, key: &str) -> Result<String, ConvertError> {
            Ok(public_url("https://b.example", key))
        }

        async fn health_check(&self) -> Result<(), ConvertError> {
            Ok(())
        }
    }

    fn state(root: &TempDir, max_upload_bytes: u64) -> AppState {
        let config = ServiceConfig::builder()
            .bucket("b")
            .public_base_url("https://b.example")
            .data_dir(root.path())
            .max_upload_bytes(max_upload_bytes)
            .build()
            .unwrap();
        AppState {
            config: Arc::new(config),
            runner: Arc::new(ContractRunner),
            store: Arc::new(StaticStore),
        }
    }

    // ── Multipart body construction ──────────────────────────────────────

    const BOUNDARY: &str = "sketch2gif-test-boundary";

    fn form(parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, filename, content) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match filename {
                Some(f) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/gif/inside")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Entries left under `data_dir` after a request; "drawings" is the
    /// shared staging dir and is allowed to exist (empty).
    fn leftover_job_dirs(root: &TempDir) -> Vec<String> {
        std::fs::read_dir(root.path())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .filter(|name| name != "drawings")
                    .collect()
            })
            .unwrap_or_default()
    }

    // ── Tests ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn health_reports_healthy() {
        let root = TempDir::new().unwrap();
        let app = app_router(state(&root, 16 * 1024 * 1024));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn missing_image_field_is_rejected() {
        let root = TempDir::new().unwrap();
        let app = app_router(state(&root, 16 * 1024 * 1024));

        let response = app
            .oneshot(form(&[("index", None, b"0")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "No image file provided");
    }

    #[tokio::test]
    async fn missing_index_is_rejected() {
        let root = TempDir::new().unwrap();
        let app = app_router(state(&root, 16 * 1024 * 1024));

        let response = app
            .oneshot(form(&[("image", Some("cat.png"), b"png")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "No index provided");
    }

    #[tokio::test]
    async fn non_integer_index_is_rejected() {
        let root = TempDir::new().unwrap();
        let app = app_router(state(&root, 16 * 1024 * 1024));

        let response = app
            .oneshot(form(&[
                ("image", Some("cat.png"), b"png"),
                ("index", None, b"first"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Index must be an integer");
    }

    #[tokio::test]
    async fn disallowed_extension_is_rejected() {
        let root = TempDir::new().unwrap();
        let app = app_router(state(&root, 16 * 1024 * 1024));

        let response = app
            .oneshot(form(&[
                ("image", Some("cat.pdf"), b"%PDF"),
                ("index", None, b"0"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid file type"));
    }

    #[tokio::test]
    async fn oversize_upload_is_413_before_any_job_exists() {
        let root = TempDir::new().unwrap();
        let app = app_router(state(&root, 1024));

        let big = vec![0u8; 4096];
        let response = app
            .oneshot(form(&[
                ("image", Some("cat.png"), big.as_slice()),
                ("index", None, b"0"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        // nothing was ever staged
        assert!(leftover_job_dirs(&root).is_empty());
    }

    #[tokio::test]
    async fn valid_upload_returns_url_and_leaves_no_staging_state() {
        let root = TempDir::new().unwrap();
        let app = app_router(state(&root, 16 * 1024 * 1024));

        let response = app
            .oneshot(form(&[
                ("image", Some("cat.png"), b"pretend png".as_slice()),
                ("index", None, b"0"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let url = body["gif_url"].as_str().unwrap();
        assert!(url.starts_with("https://b.example/"));
        assert!(url.ends_with("/video.gif"));

        assert!(leftover_job_dirs(&root).is_empty(), "job dir survived");
        let staged: Vec<_> = std::fs::read_dir(root.path().join("drawings"))
            .unwrap()
            .collect();
        assert!(staged.is_empty(), "staged input survived");
    }

    #[test]
    fn extension_whitelist() {
        assert!(allowed_file("cat.png"));
        assert!(allowed_file("cat.PNG"));
        assert!(allowed_file("archive.tar.webp"));
        assert!(!allowed_file("cat.pdf"));
        assert!(!allowed_file("noextension"));
        assert!(!allowed_file("trailingdot."));
    }
}
