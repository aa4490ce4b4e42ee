/// API Request Handlers
/// Thin wrappers over `BackupService`

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::AppState;
use crate::core::{
    ArtifactListing, BackupArtifact, BackupError, BackupKind, DatabaseSnapshot, RestorePhase,
    RestoreResult, RestoreSource, RuntimeEnvironment,
};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    fn error(err: &BackupError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            code: Some(err.code()),
        }
    }
}

/// A `BackupError` on its way out as an HTTP response
pub struct ApiError(BackupError);

impl From<BackupError> for ApiError {
    fn from(err: BackupError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "request failed");
        }
        (status, Json(ApiResponse::<()>::error(&self.0))).into_response()
    }
}

pub fn status_for(err: &BackupError) -> StatusCode {
    match err {
        BackupError::InvalidFormat(_) | BackupError::InvalidFilename(_) => StatusCode::BAD_REQUEST,
        BackupError::ArtifactNotFound(_) => StatusCode::NOT_FOUND,
        BackupError::OperationInProgress => StatusCode::CONFLICT,
        BackupError::RestoreUnsupportedInRestrictedEnv => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Serialize)]
pub struct CreatedBackupInfo {
    artifact: BackupArtifact,
    /// Inline snapshot for environments without a backups directory
    #[serde(skip_serializing_if = "Option::is_none")]
    backup: Option<DatabaseSnapshot>,
}

#[derive(Deserialize, Default)]
pub struct CreateQuery {
    #[serde(default)]
    format: Option<String>,
}

#[derive(Deserialize)]
pub struct RestoreRequest {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    backup: Option<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    busy: bool,
    last_restore_phase: RestorePhase,
    environment: RuntimeEnvironment,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentInfo {
    environment: RuntimeEnvironment,
    restricted: bool,
    backup_dir: String,
    native_available: bool,
}

// ============================================================================
// Backup Handlers
// ============================================================================

pub async fn list_backups(State(state): State<AppState>) -> ApiResult<ArtifactListing> {
    Ok(Json(ApiResponse::ok(state.service.list().await?)))
}

pub async fn create_backup(
    State(state): State<AppState>,
    Query(query): Query<CreateQuery>,
) -> ApiResult<CreatedBackupInfo> {
    let kind = match query.format.as_deref() {
        Some("json") => BackupKind::Json,
        _ => BackupKind::Native,
    };

    let created = state.service.create_backup_of_kind(kind).await?;
    Ok(Json(ApiResponse::ok(CreatedBackupInfo {
        artifact: created.artifact,
        backup: created.snapshot,
    })))
}

/// Full JSON snapshot served as a download
pub async fn export_backup(State(state): State<AppState>) -> Result<Response, ApiError> {
    let snapshot = state.service.export_snapshot().await?;
    let body = snapshot.to_json_pretty()?;
    let filename = crate::utils::artifact_name(snapshot.metadata.created_at, BackupKind::Json.extension());

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response())
}

pub async fn delete_backup(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<String> {
    state.service.delete(&name).await?;
    Ok(Json(ApiResponse::ok(format!("Backup {} deleted", name))))
}

pub async fn restore_backup(
    State(state): State<AppState>,
    request: Result<Json<RestoreRequest>, JsonRejection>,
) -> ApiResult<RestoreResult> {
    let Json(request) = request.map_err(|rejection| BackupError::InvalidFormat(rejection.body_text()))?;
    let source = match (request.filename, request.backup) {
        (Some(name), None) => RestoreSource::Stored { name },
        (None, Some(document)) => RestoreSource::Inline(document),
        _ => {
            return Err(BackupError::InvalidFormat(
                "expected exactly one of \"filename\" or \"backup\"".to_string(),
            )
            .into())
        }
    };

    Ok(Json(ApiResponse::ok(state.service.restore(source).await?)))
}

pub async fn operation_status(State(state): State<AppState>) -> ApiResult<OperationStatus> {
    Ok(Json(ApiResponse::ok(OperationStatus {
        busy: state.service.is_busy(),
        last_restore_phase: state.service.last_phase(),
        environment: state.service.environment(),
    })))
}

// ============================================================================
// Environment and Health
// ============================================================================

pub async fn get_environment(State(state): State<AppState>) -> ApiResult<EnvironmentInfo> {
    let environment = state.service.environment();
    let settings = state.service.settings();

    Ok(Json(ApiResponse::ok(EnvironmentInfo {
        environment,
        restricted: environment.is_restricted(),
        backup_dir: settings.backup_dir().display().to_string(),
        native_available: !environment.is_restricted() && settings.direct_url().is_some(),
    })))
}

pub async fn health_check() -> (StatusCode, Json<ApiResponse<Value>>) {
    (
        StatusCode::OK,
        Json(ApiResponse::ok(serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "build": env!("BUILD_TIMESTAMP"),
        }))),
    )
}
