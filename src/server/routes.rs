/// API Routes definition

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::auth;
use super::handlers;
use super::AppState;
use crate::utils::MAX_RESTORE_BODY_BYTES;

pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    // Protected routes (require authentication)
    let protected_routes = Router::new()
        .route("/api/backups", post(handlers::create_backup))
        .route("/api/backups/:name", delete(handlers::delete_backup))
        .route(
            "/api/backups/restore",
            post(handlers::restore_backup).layer(DefaultBodyLimit::max(MAX_RESTORE_BODY_BYTES)),
        )
        .route("/api/backups/export", get(handlers::export_backup))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_middleware));

    // Public routes (read-only, no auth required)
    let public_routes = Router::new()
        .route("/api/backups", get(handlers::list_backups))
        .route("/api/backups/status", get(handlers::operation_status))
        .route("/api/environment", get(handlers::get_environment))
        .route("/api/health", get(handlers::health_check));

    let mut app = Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if enable_cors {
        app = app.layer(CorsLayer::permissive());
    }

    app
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{ADMIN_TOKEN, BACKUP_DIR};
    use crate::core::native::MockNativeDumper;
    use crate::core::snapshot::tests::sample_document;
    use crate::core::{snapshot, BackupService, MemoryStore, Settings};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const TOKEN: &str = "test-token";

    fn app(settings: Settings) -> (Router, Arc<MemoryStore>) {
        let entities = snapshot::decode(sample_document()).unwrap().entities;
        let store = Arc::new(MemoryStore::with_entities(&entities).unwrap());
        let mut dumper = MockNativeDumper::new();
        dumper.expect_dump().never();
        dumper.expect_restore().never();

        let state = AppState::new(
            Arc::new(BackupService::new(settings, store.clone(), Arc::new(dumper))),
        );
        (create_router(state, false), store)
    }

    fn settings(dir: &std::path::Path) -> Settings {
        Settings::from_vars([
            (BACKUP_DIR, dir.display().to_string()),
            (ADMIN_TOKEN, TOKEN.to_string()),
        ])
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn authed(method: &str, uri: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {}", TOKEN))
            .header("Content-Type", "application/json")
            .body(body)
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(settings(dir.path()));

        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "ok");
    }

    #[tokio::test]
    async fn test_mutating_routes_need_token() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(settings(dir.path()));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/backups")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_restricted_create_returns_inline_backup() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(settings(dir.path()).with("VERCEL", "1"));

        let response = app
            .oneshot(authed("POST", "/api/backups", Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["artifact"]["kind"], "json-backup");
        assert_eq!(body["data"]["backup"]["metadata"]["type"], "json-backup");
        assert_eq!(body["data"]["backup"]["data"]["users"][0]["id"], "u1");
    }

    #[tokio::test]
    async fn test_restore_inline_document() {
        let dir = tempfile::tempdir().unwrap();
        let (app, store) = app(settings(dir.path()));
        let request = json!({ "backup": sample_document() });

        let response = app
            .oneshot(authed(
                "POST",
                "/api/backups/restore",
                Body::from(request.to_string()),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["totalRecords"], 5);
        assert_eq!(body["data"]["perEntityCounts"]["services"], 0);
        assert_eq!(body["data"]["source"], "inline");
        assert_eq!(store.count(crate::core::EntityKind::Bookings).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_restore_error_maps_status() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(settings(dir.path()).with("VERCEL", "1"));
        let request = json!({ "filename": "vtc-backup-2024-06-01T00-00-00-000Z.bak" });

        let response = app
            .oneshot(authed(
                "POST",
                "/api/backups/restore",
                Body::from(request.to_string()),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "RESTORE_UNSUPPORTED_IN_RESTRICTED_ENV");
    }

    #[tokio::test]
    async fn test_delete_rejects_bad_name() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(settings(dir.path()));

        let response = app
            .oneshot(authed("DELETE", "/api/backups/notes.txt", Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "INVALID_FILENAME");
    }

    #[tokio::test]
    async fn test_export_is_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(settings(dir.path()));

        let response = app
            .oneshot(authed("GET", "/api/backups/export", Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response
            .headers()
            .get("content-disposition")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=\"vtc-backup-"));

        let body = body_json(response).await;
        assert_eq!(body["metadata"]["tables"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_status_and_environment() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(settings(dir.path()));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/backups/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["data"]["busy"], false);
        assert_eq!(body["data"]["lastRestorePhase"], "IDLE");

        let response = app
            .oneshot(Request::builder().uri("/api/environment").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["data"]["environment"], "unrestricted");
        assert_eq!(body["data"]["nativeAvailable"], false);
    }

    #[tokio::test]
    async fn test_restore_accepts_large_inline_document() {
        let dir = tempfile::tempdir().unwrap();
        let (app, store) = app(settings(dir.path()));

        let mut document = sample_document();
        let users = document["data"]["users"].as_array_mut().unwrap();
        let bio = "x".repeat(1_000);
        for i in 0..2_500 {
            users.push(json!({
                "id": format!("bulk-user-{:05}", i),
                "email": format!("bulk-user-{:05}@example.com", i),
                "bio": bio,
                "createdAt": "2024-01-02T09:00:00.000Z"
            }));
        }
        let body = json!({ "backup": document }).to_string();
        assert!(body.len() > 2 * 1024 * 1024);

        let response = app
            .oneshot(authed("POST", "/api/backups/restore", Body::from(body)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["perEntityCounts"]["users"], 2_501);
        assert_eq!(store.count(crate::core::EntityKind::Users).unwrap(), 2_501);
    }

    #[tokio::test]
    async fn test_malformed_restore_body_uses_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(settings(dir.path()));

        let response = app
            .oneshot(authed("POST", "/api/backups/restore", Body::from("{\"backup\": ")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "INVALID_FORMAT");
    }
}
