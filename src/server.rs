//! Chat HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/messages/` | Ask a question; returns `{"response": ...}` |
//! | `GET`  | `/messages/` | Full transcript, oldest first |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `/messages` (no trailing slash) is served by the same handlers.
//!
//! # Error Contract
//!
//! Every failure, including an unparseable request body, is a 500 with
//! the message in `detail`:
//!
//! ```json
//! { "detail": "answer generation failed: ..." }
//! ```
//!
//! A failed turn is not recorded in the transcript.
//!
//! # CORS
//!
//! Origins, methods, and headers are mirrored from the request and
//! credentials are allowed. Suitable for local and demo use only.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::models::Message;
use crate::service::AnswerService;
use crate::transcript::TranscriptStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub answers: Arc<dyn AnswerService>,
    pub transcript: Arc<TranscriptStore>,
}

impl AppState {
    pub fn new(answers: Arc<dyn AnswerService>) -> Self {
        Self {
            answers,
            transcript: Arc::new(TranscriptStore::new()),
        }
    }
}

/// Build the router with all routes and the CORS layer.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/messages/",
            get(handle_list_messages).post(handle_create_message),
        )
        .route(
            "/messages",
            get(handle_list_messages).post(handle_create_message),
        )
        .route("/health", get(handle_health))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Bind to `bind_addr` and serve until the process is terminated.
pub async fn run_server(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("chat server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

fn internal(detail: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        detail: detail.into(),
    }
}

// ============ POST /messages/ ============

#[derive(Serialize)]
struct CreateMessageResponse {
    response: String,
}

/// Handler for `POST /messages/`.
///
/// Any string `message`, including an empty one, goes to the answer
/// service unchanged. A missing or non-string `message` is a 500.
async fn handle_create_message(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CreateMessageResponse>, AppError> {
    let data: Value = serde_json::from_slice(&body).map_err(|e| {
        tracing::error!(error = %e, "invalid request body");
        internal(e.to_string())
    })?;
    tracing::info!(payload = %data, "received message");

    let Some(user_query) = data.get("message").and_then(Value::as_str) else {
        tracing::error!("request body has no string 'message' field");
        return Err(internal("missing or non-string 'message' field"));
    };
    let user_query = user_query.to_string();

    match state.answers.generate_answer(&user_query).await {
        Ok(bot_response) => {
            tracing::info!(response = %bot_response, "generated answer");
            state
                .transcript
                .record_exchange(Message::user(user_query), Message::bot(bot_response.clone()));
            Ok(Json(CreateMessageResponse {
                response: bot_response,
            }))
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to process message");
            Err(internal(e.to_string()))
        }
    }
}

// ============ GET /messages/ ============

async fn handle_list_messages(State(state): State<AppState>) -> Json<Vec<Message>> {
    Json(state.transcript.list())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
