//! HTTP surface: `POST /fuse` with multipart fields `car1` and `car2`.
//!
//! Uploads are staged into the working directory and handed to the [`Fuser`], which
//! owns and deletes them. Responses follow the pipeline's terminal state: `200` JSON,
//! `400` text for preprocessing failures, `500` text for fusion failures.
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tracing::{error, info, warn};

use crate::api::{FuseFailure, Fuser};
use crate::client::ImageGenerator;
use crate::core::artifacts::ArtifactGuard;
use crate::error::Error;
use crate::io::upload::{UploadedImage, stage_bytes};
use crate::types::{FusionResult, Slot};

/// Default request body limit for the two uploads together.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub struct AppState<G> {
    pub fuser: Fuser<G>,
}

impl<G: ImageGenerator> AppState<G> {
    pub fn new(fuser: Fuser<G>) -> Self {
        Self { fuser }
    }

    fn upload_dir(&self) -> PathBuf {
        self.fuser.params().work_dir.clone()
    }
}

pub fn router<G>(state: Arc<AppState<G>>, max_upload_bytes: usize) -> Router
where
    G: ImageGenerator + 'static,
{
    Router::new()
        .route("/fuse", post(fuse_handler::<G>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve<G>(
    state: Arc<AppState<G>>,
    addr: std::net::SocketAddr,
    max_upload_bytes: usize,
) -> std::io::Result<()>
where
    G: ImageGenerator + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running on {}", listener.local_addr()?);
    axum::serve(listener, router(state, max_upload_bytes)).await
}

/// Runs the request on its own task so a client disconnect cannot cancel it midway.
async fn fuse_handler<G>(
    State(state): State<Arc<AppState<G>>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response
where
    G: ImageGenerator + 'static,
{
    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            let e = Error::Validation(format!("invalid upload: {}", rejection.body_text()));
            warn!("Upload rejected: {}", e);
            return FuseFailure::Preprocess(e).into_response();
        }
    };

    match tokio::spawn(handle_fuse(state, multipart)).await {
        Ok(response) => response,
        Err(e) => {
            error!("Fuse task failed: {}", e);
            FuseFailure::Fusion(Error::Processing(format!("request task failed: {e}")))
                .into_response()
        }
    }
}

async fn handle_fuse<G>(state: Arc<AppState<G>>, multipart: Multipart) -> Response
where
    G: ImageGenerator + 'static,
{
    let (car1, car2) = match collect_uploads(multipart, state.upload_dir()).await {
        Ok(pair) => pair,
        Err(e) => {
            warn!("Upload rejected: {}", e);
            return FuseFailure::Preprocess(e).into_response();
        }
    };

    match state.fuser.fuse(car1, car2).await {
        Ok(result) => result.into_response(),
        Err(failure) => failure.into_response(),
    }
}

/// Stage the first `car1` and `car2` file fields; other fields are ignored. If either
/// is missing or the body is broken, everything staged so far is deleted.
async fn collect_uploads(
    mut multipart: Multipart,
    dir: PathBuf,
) -> Result<(UploadedImage, UploadedImage), Error> {
    let mut car1: Option<UploadedImage> = None;
    let mut car2: Option<UploadedImage> = None;
    let mut staged = ArtifactGuard::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(Error::Validation(format!("invalid upload: {}", e.body_text()))),
        };

        let Some(slot) = field.name().and_then(Slot::from_field_name) else {
            continue;
        };
        let taken = match slot {
            Slot::Car1 => car1.is_some(),
            Slot::Car2 => car2.is_some(),
        };
        if taken {
            continue;
        }

        let original_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| Error::Validation(format!("invalid upload: {}", e.body_text())))?;
        let upload = stage_bytes(&dir, &original_name, &bytes).await?;
        staged.register(&upload.path);

        match slot {
            Slot::Car1 => car1 = Some(upload),
            Slot::Car2 => car2 = Some(upload),
        }
    }

    match (car1, car2) {
        (Some(car1), Some(car2)) => {
            // Ownership passes to the fuser, which registers the uploads itself
            staged.disarm();
            Ok((car1, car2))
        }
        (None, _) => Err(Error::Validation("missing file field car1".to_string())),
        (_, None) => Err(Error::Validation("missing file field car2".to_string())),
    }
}

impl IntoResponse for FuseFailure {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, self.to_string()).into_response()
    }
}

impl IntoResponse for FusionResult {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
