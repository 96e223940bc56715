//! Curator HTTP API.
//!
//! A local JSON API over the catalog and the curation state, used by the
//! curator UI to reorder items and toggle exclusions.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/items` | Catalog items in title order |
//! | `GET`  | `/api/order` | Saved order document |
//! | `GET`  | `/api/message-exclusions` | Saved exclusions document |
//! | `GET`  | `/api/messages?file=ID` | Per-message summaries of a thread |
//! | `GET`  | `/api/preview?file=ID&controls=true` | HTML fragment of an item |
//! | `POST` | `/api/save-order` | Replace the order document |
//! | `POST` | `/api/save-message-exclusions` | Replace the exclusions document |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/images/*` | Stored images |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "missing 'file' parameter" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `corrupt_state` (500),
//! `internal` (500). A rejected save never touches the state file.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::assemble::Assembler;
use crate::catalog::{Catalog, ContentSource};
use crate::config::Config;
use crate::error::BookError;
use crate::model::content::{ContentItem, ItemKind};
use crate::model::curation::{
    CurationEntry, ExclusionsDocument, MessageExclusion, OrderDocument,
};
use crate::normalize::html::plain_text;
use crate::store::curation::CurationStore;
use crate::store::images::IMAGES_DIR_NAME;

/// Characters of plain text kept in a message preview.
const PREVIEW_CHARS: usize = 200;

/// Shared state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
}

impl AppState {
    fn catalog(&self) -> Catalog {
        Catalog::from_config(&self.config.paths)
    }

    fn state(&self) -> CurationStore {
        CurationStore::from_config(&self.config.paths)
    }
}

/// Build the API router for `config`.
pub fn router(config: &Config) -> Router {
    let state = AppState {
        config: Arc::new(config.clone()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/items", get(handle_items))
        .route("/api/order", get(handle_order))
        .route("/api/message-exclusions", get(handle_exclusions))
        .route("/api/messages", get(handle_messages))
        .route("/api/preview", get(handle_preview))
        .route("/api/save-order", post(handle_save_order))
        .route(
            "/api/save-message-exclusions",
            post(handle_save_exclusions),
        )
        .route("/health", get(handle_health))
        .nest_service(
            &format!("/{IMAGES_DIR_NAME}"),
            ServeDir::new(config.paths.images_dir()),
        )
        .layer(cors)
        .with_state(state)
}

/// Serve the curator API on `[server].bind` until the process is stopped.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(config);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "Curator API listening");
    println!("Curator API listening on http://{bind_addr}");

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into a JSON HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<BookError> for AppError {
    fn from(err: BookError) -> Self {
        let code = match err {
            BookError::CorruptState { .. } => "corrupt_state",
            _ => "internal",
        };
        error!(error = %err, "Request failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

// ============ Queries and bodies ============

#[derive(Debug, Deserialize)]
struct ItemQuery {
    file: Option<String>,
    controls: Option<String>,
}

impl ItemQuery {
    fn file(&self) -> Result<&str, AppError> {
        self.file
            .as_deref()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| bad_request("missing 'file' parameter"))
    }

    fn controls(&self) -> bool {
        matches!(self.controls.as_deref(), Some("true" | "1" | "yes"))
    }
}

/// `POST /api/save-order` body. `items` is required so an empty object
/// cannot wipe the order by accident.
#[derive(Debug, Deserialize)]
struct SaveOrderRequest {
    items: Vec<CurationEntry>,
}

#[derive(Debug, Deserialize)]
struct SaveExclusionsRequest {
    exclusions: Vec<MessageExclusion>,
}

#[derive(Serialize)]
struct SaveResponse {
    success: bool,
    message: String,
}

#[derive(Serialize)]
struct MessagesResponse {
    messages: Vec<MessageSummary>,
}

#[derive(Serialize)]
struct MessageSummary {
    index: usize,
    date: String,
    key: String,
    preview: String,
    filename: String,
}

// ============ GET handlers ============

async fn handle_items(State(state): State<AppState>) -> Result<Json<Vec<ContentItem>>, AppError> {
    Ok(Json(state.catalog().list_items()?))
}

async fn handle_order(State(state): State<AppState>) -> Result<Json<OrderDocument>, AppError> {
    let items = state.state().load()?;
    Ok(Json(OrderDocument { items }))
}

async fn handle_exclusions(
    State(state): State<AppState>,
) -> Result<Json<ExclusionsDocument>, AppError> {
    let exclusions = state.state().load_exclusions()?;
    Ok(Json(ExclusionsDocument { exclusions }))
}

async fn handle_messages(
    State(state): State<AppState>,
    Query(query): Query<ItemQuery>,
) -> Result<Json<MessagesResponse>, AppError> {
    let file = query.file()?;
    let thread = state
        .catalog()
        .thread(file)?
        .ok_or_else(|| not_found(format!("no thread named '{file}'")))?;

    let messages = thread
        .messages
        .iter()
        .enumerate()
        .map(|(index, message)| MessageSummary {
            index,
            date: message.date.clone(),
            key: message.key.clone(),
            preview: preview_text(&message.body),
            filename: file.to_string(),
        })
        .collect();
    Ok(Json(MessagesResponse { messages }))
}

async fn handle_preview(
    State(state): State<AppState>,
    Query(query): Query<ItemQuery>,
) -> Result<Html<String>, AppError> {
    let file = query.file()?;
    let catalog = state.catalog();
    let exclusions = state.state().load_exclusions()?;
    let html = Assembler::new(&catalog, &state.config.publish)
        .preview(file, &exclusions, query.controls())?
        .ok_or_else(|| not_found(format!("no content item '{file}'")))?;
    Ok(Html(html))
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ============ POST handlers ============

async fn handle_save_order(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SaveResponse>, AppError> {
    let request: SaveOrderRequest = serde_json::from_slice(&body)
        .map_err(|e| bad_request(format!("invalid order document: {e}")))?;
    let notes = request
        .items
        .iter()
        .filter(|e| e.kind == Some(ItemKind::Note))
        .count();
    state.state().save(&request.items)?;
    info!(items = request.items.len(), notes, "Order replaced");
    Ok(Json(SaveResponse {
        success: true,
        message: "Order saved successfully".to_string(),
    }))
}

async fn handle_save_exclusions(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SaveResponse>, AppError> {
    let request: SaveExclusionsRequest = serde_json::from_slice(&body)
        .map_err(|e| bad_request(format!("invalid exclusions document: {e}")))?;
    state.state().save_exclusions(&request.exclusions)?;
    Ok(Json(SaveResponse {
        success: true,
        message: "Message exclusions saved".to_string(),
    }))
}

/// First [`PREVIEW_CHARS`] characters of the body text, with `...` when cut.
fn preview_text(body: &str) -> String {
    let text = plain_text(body);
    if text.chars().count() > PREVIEW_CHARS {
        let cut: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_text_truncates_on_chars() {
        let body = format!("<p>{}</p>", "é".repeat(250));
        let preview = preview_text(&body);
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
        assert!(preview.ends_with("..."));
        assert_eq!(preview_text("<b>short</b>"), "short");
    }

    #[test]
    fn test_controls_flag() {
        let q = |c: Option<&str>| ItemQuery {
            file: Some("a.json".to_string()),
            controls: c.map(str::to_string),
        };
        assert!(q(Some("true")).controls());
        assert!(q(Some("1")).controls());
        assert!(!q(Some("false")).controls());
        assert!(!q(None).controls());
    }
}
