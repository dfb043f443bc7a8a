//! Route table and handlers

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::pipeline::FrameUpdate;
use crate::session::{Session, SessionStatus};
use crate::state::AppState;

const DASHBOARD_HTML: &str = include_str!("../../static/dashboard.html");
const UPLOAD_FIELD: &str = "video";
const CSV_FILE_NAME: &str = "vehicle_counts.csv";

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.server.max_upload_mb * 1024 * 1024;

    Router::new()
        .route("/", get(dashboard))
        .route("/health", get(super::health_check))
        .route("/api/upload", post(upload_video))
        .route("/api/session", get(session_status))
        .route("/api/session/preview.jpg", get(preview_frame))
        .route("/api/session/vehicle_counts.csv", get(download_csv))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

#[derive(Debug, Serialize)]
pub struct UploadAccepted {
    pub session_id: Uuid,
    pub file_name: String,
}

/// POST /api/upload
async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadAccepted>)> {
    if state.session.read().await.as_ref().is_some_and(Session::is_running) {
        return Err(ApiError::Conflict("An analysis is already running".to_string()));
    }

    let mut upload: Option<(String, NamedTempFile)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .map(display_name)
            .ok_or_else(|| ApiError::BadRequest("Upload has no file name".to_string()))?;
        let ext = Path::new(&file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        if !state.config.is_allowed_extension(ext) {
            return Err(ApiError::BadRequest(format!(
                "Unsupported video type '{}', expected one of: {}",
                file_name,
                state.config.video.allowed_extensions.join(", ")
            )));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        if data.is_empty() {
            return Err(ApiError::BadRequest("Uploaded video is empty".to_string()));
        }

        let temp = tempfile::Builder::new()
            .prefix("traffic-upload-")
            .suffix(&format!(".{}", ext.to_ascii_lowercase()))
            .tempfile()?;
        tokio::fs::write(temp.path(), &data).await?;

        info!(file = %file_name, bytes = data.len(), "📤 Video uploaded");
        upload = Some((file_name, temp));
        break;
    }

    let (file_name, temp) = upload.ok_or_else(|| {
        ApiError::BadRequest(format!("Missing '{}' file field", UPLOAD_FIELD))
    })?;

    let session_id = {
        let mut slot = state.session.write().await;
        if slot.as_ref().is_some_and(Session::is_running) {
            return Err(ApiError::Conflict("An analysis is already running".to_string()));
        }
        let session = Session::start(file_name.clone());
        let id = session.id;
        *slot = Some(session);
        id
    };

    let worker_state = state.clone();
    let handle = tokio::task::spawn_blocking(move || run_session(worker_state, session_id, temp));

    // A panicking worker must not leave the session stuck in Running
    let watcher_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = handle.await {
            error!(session = %session_id, error = %e, "Analysis worker crashed");
            let mut slot = watcher_state.session.write().await;
            if let Some(session) = slot.as_mut().filter(|s| s.id == session_id) {
                session.fail("Analysis worker crashed".to_string());
            }
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadAccepted {
            session_id,
            file_name,
        }),
    ))
}

/// Blocking: runs the whole video through the analyzer on this thread.
fn run_session(state: AppState, session_id: Uuid, upload: NamedTempFile) {
    let slot = state.session.clone();
    let mut on_frame = |update: FrameUpdate| {
        let mut guard = slot.blocking_write();
        if let Some(session) = guard.as_mut().filter(|s| s.id == session_id) {
            session.apply_update(update);
        }
    };

    let result = state.analyzer.analyze(upload.path(), &mut on_frame);

    // Upload is gone by the time the session leaves Running
    if let Err(e) = upload.close() {
        warn!("Failed to remove uploaded file: {}", e);
    }

    if let (Ok(report), Some(dir)) = (&result, &state.config.export.output_dir) {
        match export_csv(Path::new(dir), &report.to_csv()) {
            Ok(path) => info!("💾 Counts written to {}", path.display()),
            Err(e) => warn!("Failed to export CSV to {}: {}", dir, e),
        }
    }

    let mut guard = state.session.blocking_write();
    let Some(session) = guard.as_mut().filter(|s| s.id == session_id) else {
        return;
    };

    match result {
        Ok(report) => {
            info!(
                session = %session_id,
                frames = report.frames_processed,
                action = report.decision.action,
                "✓ Analysis complete"
            );
            session.complete(report);
        }
        Err(e) => {
            error!(session = %session_id, "Analysis failed: {:#}", e);
            session.fail(format!("{:#}", e));
        }
    }
}

fn export_csv(dir: &Path, csv: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(CSV_FILE_NAME);
    std::fs::write(&path, csv)?;
    Ok(path)
}

/// Last path component only; browsers may send full client paths.
fn display_name(raw: &str) -> String {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw).to_string()
}

/// GET /api/session
async fn session_status(State(state): State<AppState>) -> Json<SessionStatus> {
    let slot = state.session.read().await;
    Json(slot.as_ref().map_or_else(SessionStatus::idle, Session::status))
}

/// GET /api/session/preview.jpg
async fn preview_frame(State(state): State<AppState>) -> ApiResult<Response> {
    let slot = state.session.read().await;
    let jpeg = slot
        .as_ref()
        .and_then(|s| s.preview_jpeg.clone())
        .ok_or_else(|| ApiError::NotFound("No frame rendered yet".to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        jpeg,
    )
        .into_response())
}

/// GET /api/session/vehicle_counts.csv
async fn download_csv(State(state): State<AppState>) -> ApiResult<Response> {
    let slot = state.session.read().await;
    let session = slot
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("No video has been analyzed".to_string()))?;
    let csv = session
        .csv()
        .ok_or_else(|| ApiError::Conflict("Analysis has not completed".to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"vehicle_counts.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}
