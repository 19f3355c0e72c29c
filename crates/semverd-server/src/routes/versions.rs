//! Project version routes: `/v1/*`.
//!
//! Paths:
//! - `GET    /v1` — liveness, answers `ok`
//! - `GET    /v1/new?version=` — create a project
//! - `GET    /v1/{id}` — current version
//! - `POST   /v1/{id}` — set version from form field `version`
//! - `DELETE /v1/{id}` — delete project
//! - `GET    /v1/{id}/bump?type=major|minor|patch` — bump
//! - `GET    /v1/{id}/history` — archived versions

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Router};
use serde::Deserialize;
use tower::limit::ConcurrencyLimitLayer;

use super::OutputFormat;
use crate::service::BumpKind;
use crate::state::AppState;

/// Build the `/v1` router.
///
/// Project creation loops until it finds an unused id, so it runs under its
/// own concurrency limit.
pub fn router(create_concurrency: usize) -> Router<Arc<AppState>> {
    let create = Router::new()
        .route("/v1/new", get(create_project))
        .layer(ConcurrencyLimitLayer::new(create_concurrency));

    Router::new()
        .route("/v1", get(health))
        .route("/v1/", get(health))
        .route(
            "/v1/{id}",
            get(current_version).post(set_version).delete(delete_project),
        )
        .route("/v1/{id}/bump", get(bump_version))
        .route("/v1/{id}/history", get(history))
        .merge(create)
}

// ── Request types ────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct OutputParams {
    pub output: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateParams {
    pub version: Option<String>,
    pub output: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BumpParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub output: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VersionForm {
    #[serde(default)]
    pub version: String,
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn health() -> &'static str {
    "ok"
}

/// Create a project with a fresh id.
async fn create_project(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CreateParams>,
) -> Response {
    let format = OutputFormat::from_query(params.output.as_deref());
    format.respond(state.versions.create(params.version.as_deref()).await)
}

/// Read the current version.
async fn current_version(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<OutputParams>,
) -> Response {
    let format = OutputFormat::from_query(params.output.as_deref());
    format.respond(state.versions.current(&id).await)
}

/// Replace the current version.
async fn set_version(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<OutputParams>,
    Form(form): Form<VersionForm>,
) -> Response {
    let format = OutputFormat::from_query(params.output.as_deref());
    format.respond(state.versions.set(&id, &form.version).await)
}

/// Bump major, minor, or patch.
async fn bump_version(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<BumpParams>,
) -> Response {
    let format = OutputFormat::from_query(params.output.as_deref());
    let kind = BumpKind::from_query(params.kind.as_deref());
    format.respond(state.versions.bump(&id, kind).await)
}

/// List every archived version.
async fn history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<OutputParams>,
) -> Response {
    let format = OutputFormat::from_query(params.output.as_deref());
    format.respond(state.versions.history(&id).await)
}

/// Delete a project and its history.
async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<OutputParams>,
) -> Response {
    match state.versions.delete(&id).await {
        Ok(()) => "ok".into_response(),
        Err(e) => OutputFormat::from_query(params.output.as_deref()).respond::<String>(Err(e)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use semverd_storage::{Manager, MemoryBackend};
    use tower::ServiceExt;

    use super::*;
    use crate::routes::build_router;

    fn app() -> Router {
        build_router(Arc::new(AppState::new(Manager::new(MemoryBackend::new()))), 4)
    }

    async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        read(app.clone().oneshot(request).await.unwrap()).await
    }

    async fn read(response: Response) -> (StatusCode, String) {
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let app = app();
        assert_eq!(send(&app, Method::GET, "/v1").await, (StatusCode::OK, "ok".to_owned()));
        assert_eq!(send(&app, Method::GET, "/v1/").await.1, "ok");
    }

    #[tokio::test]
    async fn create_bump_history_flow() {
        let app = app();
        let (status, id) = send(&app, Method::GET, "/v1/new?version=1.0.0").await;
        assert_eq!(status, StatusCode::OK);

        let (_, current) = send(&app, Method::GET, &format!("/v1/{id}")).await;
        assert_eq!(current, "1.0.0");

        let (status, body) =
            send(&app, Method::GET, &format!("/v1/{id}/bump?type=minor&output=json")).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["version"], "1.1.0");
        assert_eq!(json["minor"], 1);
        assert!(json.get("project").is_none());

        let (_, history) = send(&app, Method::GET, &format!("/v1/{id}/history")).await;
        assert_eq!(history, "1.0.0\n1.1.0\n");

        let (_, body) =
            send(&app, Method::GET, &format!("/v1/{id}/history?output=json")).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["versions"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn create_json_includes_project_id() {
        let app = app();
        let (status, body) = send(&app, Method::GET, "/v1/new?output=json").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["version"], "0.0.1");
        assert!(json["project"].as_str().is_some());
    }

    #[tokio::test]
    async fn xml_output_for_results_and_errors() {
        let app = app();
        let request = Request::builder()
            .uri("/v1/new?version=1.2.3&output=xml")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/xml");
        let (status, body) = read(response).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("<Versioning><project>"));
        assert!(body.contains("<version>1.2.3</version><major>1</major><minor>2</minor><patch>3</patch>"));

        let (_, id) = send(&app, Method::GET, "/v1/new?version=1.0.0").await;
        let (_, body) = send(&app, Method::GET, &format!("/v1/{id}/history?output=xml")).await;
        assert!(body.starts_with("<Archive><versions>"));
        assert!(body.contains("<version>1.0.0</version>"));

        let (status, body) = send(&app, Method::GET, "/v1/not-a-uuid?output=xml").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            "<error><error>bad_request</error><message>invalid uuid</message></error>"
        );
    }

    #[tokio::test]
    async fn post_sets_version_from_form() {
        let app = app();
        let (_, id) = send(&app, Method::GET, "/v1/new").await;

        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/v1/{id}"))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("version=2.0.0-rc.1"))
            .unwrap();
        let (status, body) = read(app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "2.0.0-rc.1");

        let (_, bumped) = send(&app, Method::GET, &format!("/v1/{id}/bump")).await;
        assert_eq!(bumped, "2.0.1");
    }

    #[tokio::test]
    async fn errors_map_to_status_codes() {
        let app = app();
        let (status, body) = send(&app, Method::GET, "/v1/not-a-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "invalid uuid");

        let unknown = "6f1c1b8e-2f0a-4a51-9d43-1d2f0f5b7c11";
        let (status, body) =
            send(&app, Method::GET, &format!("/v1/{unknown}?output=json")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"], "not_found");

        let (status, _) = send(&app, Method::GET, "/v1/new?version=banana").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_removes_project() {
        let app = app();
        let (_, id) = send(&app, Method::GET, "/v1/new").await;

        let (status, body) = send(&app, Method::DELETE, &format!("/v1/{id}")).await;
        assert_eq!((status, body.as_str()), (StatusCode::OK, "ok"));

        let (status, _) = send(&app, Method::GET, &format!("/v1/{id}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, Method::DELETE, &format!("/v1/{id}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn responses_carry_security_headers() {
        let request = Request::builder().uri("/v1").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    }
}
