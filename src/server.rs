//! HTTP surface: an axum router over a shared [`ReportOrchestrator`].
//!
//! | Method | Path                      | Purpose                              |
//! |--------|---------------------------|--------------------------------------|
//! | POST   | `/validate-trade-finance` | multipart `files` (1–2) + `question` |
//! | POST   | `/process-pdfs`           | alias of the above                   |
//! | GET    | `/health`                 | liveness and cache occupancy         |
//! | GET    | `/openapi.json`           | OpenAPI 3 document                   |
//! | GET    | `/api-docs`               | Swagger UI                           |
//!
//! Successful responses carry `x-cache` (`hit`, `miss` or `coalesced`) and
//! `x-fingerprint`. Errors are always JSON: `{"error", "message",
//! "rawResponse"?}`.

use crate::error::VerifyError;
use crate::input::InputFile;
use crate::orchestrator::ReportOrchestrator;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

/// Default request body limit: 50 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ReportOrchestrator>,
}

/// Build the router.
pub fn app(orchestrator: ReportOrchestrator, body_limit: usize) -> Router {
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
    };
    Router::new()
        .route("/validate-trade-finance", post(validate_trade_finance))
        .route("/process-pdfs", post(validate_trade_finance))
        .route("/health", get(health))
        .route("/openapi.json", get(openapi))
        .route("/api-docs", get(swagger_ui))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Errors ───────────────────────────────────────────────────────────────

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Stable error code.
    pub error: String,
    /// Human-readable message.
    pub message: String,
    /// Raw backend text, for replies that could not be parsed.
    #[serde(rename = "rawResponse", skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// Handler error: a [`VerifyError`] rendered as JSON.
#[derive(Debug)]
pub struct ApiError(pub VerifyError);

impl From<VerifyError> for ApiError {
    fn from(e: VerifyError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self.0 {
            VerifyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            VerifyError::Rasterization { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.0.code(), "Request failed: {}", self.0);
        } else {
            warn!(code = self.0.code(), "Request rejected: {}", self.0);
        }
        let body = ErrorResponse {
            error: self.0.code().to_string(),
            message: self.0.to_string(),
            raw_response: self
                .0
                .raw_response()
                .filter(|raw| !raw.is_empty())
                .map(str::to_string),
        };
        (status, Json(body)).into_response()
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn validate_trade_finance(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let (files, question) = read_upload(multipart).await?;
    debug!(
        "Upload: {} file(s), question: {}",
        files.len(),
        question.is_some()
    );

    let output = state.orchestrator.verify(files, question).await?;

    let headers = [
        ("x-cache", output.outcome.as_str().to_string()),
        ("x-fingerprint", output.fingerprint.to_string()),
    ];
    Ok((StatusCode::OK, headers, Json(output.report)).into_response())
}

/// Collect `files` parts and an optional `question` part.
async fn read_upload(
    mut multipart: Multipart,
) -> Result<(Vec<InputFile>, Option<String>), VerifyError> {
    let mut files = Vec::new();
    let mut question = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| VerifyError::InvalidRequest(format!("Malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("files") | Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("upload-{}", files.len() + 1));
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(|e| {
                    VerifyError::InvalidRequest(format!("Could not read '{}': {}", filename, e))
                })?;
                files.push(InputFile::new(filename, content_type, data.to_vec()));
            }
            Some("question") => {
                let text = field.text().await.map_err(|e| {
                    VerifyError::InvalidRequest(format!("Could not read question: {}", e))
                })?;
                question = Some(text).filter(|q| !q.trim().is_empty());
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    Ok((files, question))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let cache = state.orchestrator.cache();
    Json(json!({
        "status": "ok",
        "backend": state.orchestrator.backend_name(),
        "cache_entries": cache.len(),
        "in_flight": cache.in_flight(),
    }))
}

async fn openapi() -> Json<Value> {
    Json(openapi_document())
}

async fn swagger_ui() -> Html<&'static str> {
    Html(SWAGGER_HTML)
}

/// OpenAPI 3 description of the HTTP surface.
pub fn openapi_document() -> Value {
    let upload = json!({
        "requestBody": {
            "required": true,
            "content": {
                "multipart/form-data": {
                    "schema": {
                        "type": "object",
                        "required": ["files"],
                        "properties": {
                            "files": {
                                "type": "array",
                                "minItems": 1,
                                "maxItems": 2,
                                "items": { "type": "string", "format": "binary" }
                            },
                            "question": { "type": "string" }
                        }
                    }
                }
            }
        },
        "responses": {
            "200": {
                "description": "Verification report",
                "headers": {
                    "x-cache": { "schema": { "type": "string", "enum": ["hit", "miss", "coalesced"] } },
                    "x-fingerprint": { "schema": { "type": "string" } }
                },
                "content": { "application/json": { "schema": { "type": "object" } } }
            },
            "400": { "$ref": "#/components/responses/Error" },
            "422": { "$ref": "#/components/responses/Error" },
            "500": { "$ref": "#/components/responses/Error" }
        }
    });

    let mut validate = upload.clone();
    validate["summary"] = json!("Verify trade-finance documents");
    let mut process = upload;
    process["summary"] = json!("Alias of /validate-trade-finance");

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "tradedoc-verify",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Trade-finance document verification with cached, coalesced LLM generation"
        },
        "paths": {
            "/validate-trade-finance": { "post": validate },
            "/process-pdfs": { "post": process },
            "/health": {
                "get": {
                    "summary": "Liveness and cache occupancy",
                    "responses": { "200": { "description": "Service is up" } }
                }
            }
        },
        "components": {
            "responses": {
                "Error": {
                    "description": "Error",
                    "content": {
                        "application/json": {
                            "schema": {
                                "type": "object",
                                "required": ["error", "message"],
                                "properties": {
                                    "error": { "type": "string" },
                                    "message": { "type": "string" },
                                    "rawResponse": { "type": "string" }
                                }
                            }
                        }
                    }
                }
            }
        }
    })
}

const SWAGGER_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>tradedoc-verify API</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: "/openapi.json", dom_id: "#swagger-ui" });
    };
  </script>
</body>
</html>
"##;
