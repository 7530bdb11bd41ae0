use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::engine::{RunId, RunStatus};
use crate::errors::AppError;
use crate::models::{CustomizationRequest, OwnerId};
use crate::routes::owner_from;
use crate::state::AppState;
use crate::store::PermanentArtifactHandle;

#[derive(Debug, Default, Deserialize)]
pub struct SubmitParams {
    /// Block until the run finishes instead of returning 202 right away.
    #[serde(default)]
    pub wait: bool,
}

fn parse_run_id(raw: &str) -> Result<RunId, AppError> {
    raw.parse()
        .map_err(|_| AppError::NotFound(format!("Run {raw} not found")))
}

/// Status of `run_id`, hidden from anyone but its owner.
fn owned_status(state: &AppState, owner: &OwnerId, run_id: RunId) -> Result<RunStatus, AppError> {
    let status = state.engine.status(run_id)?;
    if &status.owner != owner {
        return Err(AppError::NotFound(format!("Run {run_id} not found")));
    }
    Ok(status)
}

/// POST /api/v1/customizations
/// A body that does not deserialize (unknown section, intensity outside 0..=255)
/// is reported as a validation error like any other malformed request.
pub async fn handle_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SubmitParams>,
    payload: Result<Json<CustomizationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RunStatus>), AppError> {
    let owner = owner_from(&headers)?;
    let Json(req) = payload?;
    let run_id = state.engine.submit(owner, req)?;

    if params.wait {
        let status = state.engine.wait(run_id).await?;
        return Ok((StatusCode::OK, Json(status)));
    }
    Ok((StatusCode::ACCEPTED, Json(state.engine.status(run_id)?)))
}

/// GET /api/v1/customizations/:run_id
pub async fn handle_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
) -> Result<Json<RunStatus>, AppError> {
    let owner = owner_from(&headers)?;
    let run_id = parse_run_id(&run_id)?;
    Ok(Json(owned_status(&state, &owner, run_id)?))
}

/// DELETE /api/v1/customizations/:run_id
pub async fn handle_cancel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
) -> Result<Json<RunStatus>, AppError> {
    let owner = owner_from(&headers)?;
    let run_id = parse_run_id(&run_id)?;
    owned_status(&state, &owner, run_id)?;
    Ok(Json(state.engine.cancel(run_id)?))
}

/// GET /api/v1/artifact
pub async fn handle_fetch_artifact(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let owner = owner_from(&headers)?;
    let artifact = state.engine.fetch_artifact(&owner)?;

    let mut response = artifact.bytes.clone().into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("inline; filename=\"document.pdf\""),
    );
    if let Ok(id) = HeaderValue::from_str(&artifact.artifact_id.to_string()) {
        headers.insert("x-artifact-id", id);
    }
    Ok(response)
}

/// POST /api/v1/artifact/promote
pub async fn handle_promote(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PermanentArtifactHandle>, AppError> {
    let owner = owner_from(&headers)?;
    Ok(Json(state.engine.promote(&owner).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::backends::{BackendDescriptor, BackendKind, BackendRegistry};
    use crate::engine::{EngineSettings, Orchestrator};
    use crate::generation::GenerationClient;
    use crate::render::{RenderClient, RenderPipeline};
    use crate::resilience::RetryPolicy;
    use crate::routes::build_router;
    use crate::store::{InMemoryPermanentStore, TempArtifactStore};
    use crate::testing::{pdf, ScriptedGenerator, ScriptedRenderer, SAMPLE_LATEX};

    fn app() -> axum::Router {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            max_jitter: Duration::ZERO,
        };
        let registry = Arc::new(
            BackendRegistry::new([
                BackendDescriptor::new("claude", "Claude Sonnet", BackendKind::Generation, true),
                BackendDescriptor::new("gemini", "Google Gemini Flash", BackendKind::Generation, false),
                BackendDescriptor::new("pdflatex", "Local pdflatex", BackendKind::Render, true),
            ])
            .unwrap(),
        );
        let mut generators: HashMap<String, Arc<dyn GenerationClient>> = HashMap::new();
        generators.insert(
            "claude".to_string(),
            ScriptedGenerator::always(Ok(SAMPLE_LATEX.to_string())),
        );
        let mut renderers: HashMap<String, Arc<dyn RenderClient>> = HashMap::new();
        renderers.insert(
            "pdflatex".to_string(),
            ScriptedRenderer::always(pdf(b"%PDF-1.7 test")),
        );
        let pipeline =
            RenderPipeline::new(&registry, renderers, policy, Duration::from_secs(5)).unwrap();
        let store = Arc::new(TempArtifactStore::new(
            Arc::new(InMemoryPermanentStore::default()),
            1024,
        ));
        let engine = Orchestrator::new(
            registry,
            generators,
            pipeline,
            store,
            EngineSettings {
                generation_policy: policy,
                generation_timeout: Duration::from_secs(5),
                run_retention: Duration::from_secs(60),
            },
        );
        build_router(AppState {
            engine: Arc::new(engine),
        })
    }

    fn submit_body(backend_id: &str, intensity: u8) -> Body {
        Body::from(
            serde_json::json!({
                "source_document": SAMPLE_LATEX,
                "target_description": "Platform engineer",
                "sections": ["experience", "skills"],
                "intensity": intensity,
                "backend_id": backend_id
            })
            .to_string(),
        )
    }

    fn post(uri: &str, owner: Option<&str>, body: Body) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(owner) = owner {
            builder = builder.header("x-user-id", owner);
        }
        builder.body(body).unwrap()
    }

    fn get(uri: &str, owner: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-user-id", owner)
            .body(Body::empty())
            .unwrap()
    }

    async fn json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_submit_wait_then_fetch_and_promote() {
        let app = app();

        let response = app
            .clone()
            .oneshot(post(
                "/api/v1/customizations?wait=true",
                Some("alice"),
                submit_body("claude", 40),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status = json(response).await;
        assert_eq!(status["state"], "PUBLISHED");
        assert_eq!(status["render_backend"], "pdflatex");
        let run_id = status["run_id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(get(&format!("/api/v1/customizations/{run_id}"), "alice"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Runs are private to their owner.
        let response = app
            .clone()
            .oneshot(get(&format!("/api/v1/customizations/{run_id}"), "mallory"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(get("/api/v1/artifact", "alice"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/pdf"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"%PDF-1.7 test");

        let response = app
            .clone()
            .oneshot(post("/api/v1/artifact/promote", Some("alice"), Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(json(response).await["document_id"].is_string());

        let response = app
            .oneshot(get("/api/v1/artifact", "alice"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_requests() {
        let app = app();

        let response = app
            .clone()
            .oneshot(post(
                "/api/v1/customizations",
                Some("alice"),
                submit_body("claude", 5),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"]["code"], "VALIDATION_ERROR");

        let response = app
            .clone()
            .oneshot(post(
                "/api/v1/customizations",
                Some("alice"),
                submit_body("gpt-5", 40),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post(
                "/api/v1/customizations",
                None,
                submit_body("claude", 40),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_undecodable_submissions_use_the_error_envelope() {
        let bodies = [
            serde_json::json!({
                "source_document": SAMPLE_LATEX,
                "target_description": "Platform engineer",
                "sections": ["experience"],
                "intensity": 300,
                "backend_id": "claude"
            }),
            serde_json::json!({
                "source_document": SAMPLE_LATEX,
                "target_description": "Platform engineer",
                "sections": ["experience"],
                "intensity": -1,
                "backend_id": "claude"
            }),
            serde_json::json!({
                "source_document": SAMPLE_LATEX,
                "target_description": "Platform engineer",
                "sections": ["hobbies"],
                "intensity": 40,
                "backend_id": "claude"
            }),
        ];

        for body in bodies {
            let response = app()
                .oneshot(post(
                    "/api/v1/customizations",
                    Some("alice"),
                    Body::from(body.to_string()),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
            let error = json(response).await;
            assert_eq!(error["error"]["code"], "VALIDATION_ERROR", "{body}");
            assert!(error["error"]["message"].is_string());
        }
    }

    #[tokio::test]
    async fn test_unavailable_generation_backend_fails_the_run() {
        let response = app()
            .oneshot(post(
                "/api/v1/customizations",
                Some("alice"),
                submit_body("gemini", 40),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let status = json(response).await;
        assert_eq!(status["state"], "FAILED");
        assert_eq!(status["reason"]["code"], "NO_BACKEND_AVAILABLE");
    }

    #[tokio::test]
    async fn test_list_backends_by_kind() {
        let response = app()
            .oneshot(get("/api/v1/backends?kind=generation", "alice"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json(response).await,
            serde_json::json!([
                {"id": "claude", "display_name": "Claude Sonnet", "kind": "generation", "is_available": true},
                {"id": "gemini", "display_name": "Google Gemini Flash", "kind": "generation", "is_available": false}
            ])
        );

        let response = app().oneshot(get("/api/v1/backends", "alice")).await.unwrap();
        let all = json(response).await;
        assert_eq!(all.as_array().unwrap().len(), 3);
        assert_eq!(all[2]["id"], "pdflatex");
    }

    #[tokio::test]
    async fn test_unknown_run_is_not_found() {
        let response = app()
            .oneshot(get("/api/v1/customizations/not-a-run", "alice"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
