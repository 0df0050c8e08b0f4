use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use include_dir::{include_dir, Dir};
use serde_json::{json, Value};
use std::{path::PathBuf, sync::Arc};
use thiserror::Error;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};

use crate::{
    llm::LlmError,
    models::{GenerationResult, ProductInput},
    pipeline::{Pipeline, PipelineError},
    session::SessionLog,
};

static STATIC_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/static");

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Root for per-request session logs; `None` turns logging off.
    pub session_dir: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("{0}")]
    Validation(String),
}

impl ApiError {
    fn status_and_detail(&self) -> (StatusCode, Value) {
        match self {
            ApiError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, json!(msg)),
            ApiError::Pipeline(PipelineError::InvalidProfileFormat(e)) => (StatusCode::INTERNAL_SERVER_ERROR, json!(e.to_string())),
            ApiError::Pipeline(PipelineError::Llm(e)) => match e {
                LlmError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, json!(e.to_string())),
                LlmError::UpstreamHttp { status, detail } => {
                    (StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY), detail.clone())
                }
                LlmError::MalformedResponse(_) => (StatusCode::INTERNAL_SERVER_ERROR, json!(e.to_string())),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = self.status_and_detail();
        tracing::error!("❌ Request failed with {}: {}", status, detail);
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(serve_homepage))
        .route("/static/*path", get(serve_static))
        .route("/v1/generate_ai_customer_data", post(generate_ai_customer_data))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

pub async fn generate_ai_customer_data(
    State(state): State<AppState>,
    payload: Result<Json<ProductInput>, JsonRejection>,
) -> Result<Json<GenerationResult>, ApiError> {
    let Json(input) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    input.validate().map_err(ApiError::Validation)?;

    tracing::info!(
        "🚀 Generating {} profiles x {} questions for product ({} chars)",
        input.num_customer_profiles,
        input.num_questions_per_profile,
        input.product_document.len()
    );

    let session = state.session_dir.as_deref().map(SessionLog::start);
    if let Some(log) = &session {
        tracing::info!("📝 Session {}", log.session_id());
        log.record_input(&input).await;
    }

    let result = state.pipeline.run(&input).await?;

    if let Some(log) = &session {
        log.record_output(&result).await;
    }
    tracing::info!("✅ Generated {} customer profiles", result.customer_profiles.len());
    Ok(Json(result))
}

pub async fn serve_homepage() -> Response {
    match STATIC_DIR.get_file("index.html").and_then(|f| f.contents_utf8()) {
        Some(html) => Html(html).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn serve_static(Path(path): Path<String>) -> Response {
    let Some(file) = STATIC_DIR.get_file(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let mime = match std::path::Path::new(&path).extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "application/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    };
    ([(header::CONTENT_TYPE, mime)], file.contents()).into_response()
}
