//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/api/login` | Verify credentials |
//! | `POST`   | `/api/register` | Create an account |
//! | `GET`    | `/api/users?username=` | List accounts (admin only) |
//! | `DELETE` | `/api/users/{id}` | Delete an account (admin only) |
//! | `POST`   | `/api/chat` | Ask the assistant |
//! | `GET`    | `/api/chat-logs` | Raw chat log lines |
//! | `GET`    | `/api/chat/history?day=` | One day of chat turns |
//! | `GET`    | `/api/products` | Catalog listing with filters |
//! | `GET`    | `/api/encerrados` | Discontinued records |
//! | `POST`   | `/api/upload-psd` | Replace the catalog from a spreadsheet (admin only) |
//! | `GET`    | `/api/backups` | Archived uploads |
//! | `GET`    | `/api/backups/{filename}` | Download an archived upload |
//! | `POST`   | `/api/comparar-datasheets` | Compare two datasheets |
//! | `GET`    | `/api/analise` | Last analytics report |
//! | `POST`   | `/api/executar-analise` | Regenerate the analytics report (admin only) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `forbidden` (403),
//! `not_found` (404), `conflict` (409), `model_unavailable` (500),
//! `internal` (500). Internal errors carry a generic message; the cause is
//! logged.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser front end
//! can be served from a different origin.

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use salesdesk_core::models::ProductStatus;

use crate::accounts::{AccountError, Accounts};
use crate::analytics;
use crate::assistant::Assistant;
use crate::catalog::{BrowseFilter, CatalogStore};
use crate::chat_log::ChatLog;
use crate::compare::{Comparator, Datasheet};
use crate::config::Config;
use crate::ingest::{self, SheetError};
use crate::knowledge::{self, KnowledgeSource};
use crate::llm::{ChatModel, OpenAiChat};
use crate::{db, migrate};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    accounts: Accounts,
    catalog: Arc<CatalogStore>,
    chat_log: Arc<ChatLog>,
    assistant: Arc<Assistant>,
    comparator: Arc<Comparator>,
}

impl AppState {
    /// Opens the database (running migrations), loads the catalog and chat
    /// log, and wires the upstream clients named in `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool, config).await?;
        let knowledge = knowledge::from_config(&config.knowledge)?;
        let model: Arc<dyn ChatModel> = Arc::new(OpenAiChat::new(&config.llm)?);
        Self::assemble(config, pool, knowledge, model)
    }

    /// Builds the state around an already-migrated pool and the given
    /// upstream clients.
    pub fn assemble(
        config: &Config,
        pool: SqlitePool,
        knowledge: Arc<dyn KnowledgeSource>,
        model: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        let catalog = Arc::new(CatalogStore::load(&config.catalog));
        let chat_log = Arc::new(ChatLog::open(config.logs.chat_log.clone()));
        let assistant = Arc::new(Assistant::new(
            catalog.clone(),
            knowledge,
            model.clone(),
            chat_log.clone(),
            &config.llm,
        ));
        let comparator = Arc::new(Comparator::new(config, model)?);

        Ok(Self {
            config: Arc::new(config.clone()),
            accounts: Accounts::new(pool, config.admin.seed_username.clone()),
            catalog,
            chat_log,
            assistant,
            comparator,
        })
    }
}

/// All routes with CORS, request tracing and the upload size limit applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/login", post(handle_login))
        .route("/api/register", post(handle_register))
        .route("/api/users", get(handle_list_users))
        .route("/api/users/{id}", delete(handle_delete_user))
        .route("/api/chat", post(handle_chat))
        .route("/api/chat-logs", get(handle_chat_logs))
        .route("/api/chat/history", get(handle_chat_history))
        .route("/api/products", get(handle_products))
        .route("/api/encerrados", get(handle_discontinued))
        .route("/api/upload-psd", post(handle_upload))
        .route("/api/backups", get(handle_list_backups))
        .route("/api/backups/{filename}", get(handle_download_backup))
        .route("/api/comparar-datasheets", post(handle_compare))
        .route("/api/analise", get(handle_get_analysis))
        .route("/api/executar-analise", post(handle_run_analysis))
        .layer(DefaultBodyLimit::max(state.config.server.body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> Result<()> {
    let state = AppState::from_config(config).await?;
    let bind_addr = config.server.bind.clone();
    let app = router(state);

    tracing::info!(bind = %bind_addr, "salesdesk listening");
    println!("salesdesk listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
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
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
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

fn error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn forbidden(message: impl Into<String>) -> AppError {
    error(StatusCode::FORBIDDEN, "forbidden", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    error(StatusCode::NOT_FOUND, "not_found", message)
}

/// Logs `err` and returns a 500 that does not leak it.
fn internal(context: &str, err: impl std::fmt::Display) -> AppError {
    tracing::error!(error = %err, "{}", context);
    error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal",
        "internal server error",
    )
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::MissingFields => bad_request(err.to_string()),
            AccountError::DuplicateUsername(_) => {
                error(StatusCode::CONFLICT, "conflict", err.to_string())
            }
            AccountError::InvalidCredentials => {
                error(StatusCode::UNAUTHORIZED, "unauthorized", err.to_string())
            }
            AccountError::Forbidden(_) => forbidden(err.to_string()),
            AccountError::NotFound(_) => not_found(err.to_string()),
            AccountError::Hash(_) | AccountError::Database(_) => internal("account store", err),
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        bad_request(format!("invalid multipart body: {}", err))
    }
}

fn require_admin(state: &AppState, username: Option<&str>) -> Result<(), AppError> {
    match username {
        Some(u) if state.accounts.is_privileged(u) => Ok(()),
        _ => Err(forbidden("access denied")),
    }
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

// ============ Accounts ============

#[derive(Deserialize)]
struct CredentialsRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
struct ActorRequest {
    #[serde(default)]
    username: Option<String>,
}

async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(AccountError::MissingFields.into());
    }
    let outcome = state.accounts.login(req.username.trim(), &req.password).await?;
    Ok(Json(json!({
        "success": true,
        "isAdmin": outcome.is_admin,
        "username": outcome.username,
    })))
}

async fn handle_register(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let id = state.accounts.register(&req.username, &req.password).await?;
    tracing::info!(id, "account registered");
    Ok((StatusCode::CREATED, Json(json!({ "success": true }))))
}

async fn handle_list_users(
    State(state): State<AppState>,
    Query(actor): Query<ActorRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let users = state
        .accounts
        .list(actor.username.as_deref().unwrap_or(""))
        .await?;
    Ok(Json(json!({ "success": true, "users": users })))
}

async fn handle_delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(actor): Json<ActorRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .accounts
        .delete(actor.username.as_deref().unwrap_or(""), id)
        .await?;
    tracing::info!(id, "account deleted");
    Ok(Json(json!({ "success": true })))
}

// ============ Chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    username: Option<String>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, AppError> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let reply = state
        .assistant
        .answer(message, req.username.as_deref())
        .await
        .map_err(|e| internal("chat log append failed", e))?;

    if reply.degraded {
        let body = json!({
            "error": { "code": "model_unavailable", "message": "language model unavailable" },
            "reply": reply.reply,
            "origem": reply.source,
        });
        return Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response());
    }

    Ok(Json(json!({ "reply": reply.reply, "origem": reply.source })).into_response())
}

async fn handle_chat_logs(
    State(state): State<AppState>,
) -> Result<Json<Vec<serde_json::Value>>, AppError> {
    match state.chat_log.read_all() {
        Ok(Some(lines)) => Ok(Json(lines)),
        Ok(None) => Err(not_found("no chat log yet")),
        Err(e) => Err(internal("chat log read failed", e)),
    }
}

#[derive(Deserialize)]
struct HistoryQuery {
    day: Option<String>,
}

async fn handle_chat_history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let day = match q.day.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map_err(|_| bad_request(format!("invalid day '{}', expected YYYY-MM-DD", d)))?,
        None => Utc::now().date_naive(),
    };
    Ok(Json(json!({ "history": state.chat_log.history(day) })))
}

// ============ Catalog ============

#[derive(Deserialize)]
struct ProductsQuery {
    q: Option<String>,
    segment: Option<String>,
    status: Option<String>,
}

async fn handle_products(
    State(state): State<AppState>,
    Query(q): Query<ProductsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let status = match q.status.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(s) => Some(
            ProductStatus::parse(s)
                .ok_or_else(|| bad_request(format!("unknown status '{}'", s)))?,
        ),
        None => None,
    };
    let filter = BrowseFilter {
        query: q.q,
        segment: q.segment.filter(|s| !s.trim().is_empty()),
        status,
    };
    Ok(Json(json!(state.catalog.browse(&filter))))
}

async fn handle_discontinued(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!(state.catalog.discontinued()))
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut username: Option<String> = None;
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("username") => username = Some(field.text().await?),
            Some("file") => {
                let name = field.file_name().unwrap_or("upload.csv").to_string();
                upload = Some((name, field.bytes().await?.to_vec()));
            }
            _ => {}
        }
    }

    require_admin(&state, username.as_deref().map(str::trim))?;
    let Some((file_name, bytes)) = upload else {
        return Err(bad_request("missing 'file' field"));
    };

    let summary = ingest::import_sheet(
        &state.catalog,
        &state.config.uploads.backup_dir(),
        &file_name,
        &bytes,
    )
    .await
    .map_err(|e| match e.downcast_ref::<SheetError>() {
        Some(sheet) => bad_request(sheet.to_string()),
        None => internal("catalog upload failed", e),
    })?;

    Ok(Json(json!({
        "success": true,
        "total": summary.total,
        "backup": summary.backup,
    })))
}

async fn handle_list_backups(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let backups = ingest::list_backups(&state.config.uploads.backup_dir())
        .map_err(|e| internal("backup listing failed", e))?;
    Ok(Json(json!(backups)))
}

async fn handle_download_backup(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let path = ingest::backup_path(&state.config.uploads.backup_dir(), &filename)
        .ok_or_else(|| bad_request("invalid backup name"))?;
    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(not_found(format!("backup not found: {}", filename)))
        }
        Err(e) => return Err(internal("backup read failed", e)),
    };

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response())
}

// ============ Datasheet comparison ============

async fn handle_compare(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut first: Option<Datasheet> = None;
    let mut second: Option<Datasheet> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        let slot = match name.as_deref() {
            Some("datasheet1") => &mut first,
            Some("datasheet2") => &mut second,
            _ => continue,
        };
        let file_name = field.file_name().unwrap_or("datasheet.pdf").to_string();
        let bytes = field.bytes().await?.to_vec();
        *slot = Some(Datasheet { file_name, bytes });
    }

    let (Some(first), Some(second)) = (first, second) else {
        return Err(bad_request("two PDF files are required: datasheet1 and datasheet2"));
    };

    let comparison = state
        .comparator
        .compare(first, second)
        .await
        .map_err(|e| internal("datasheet comparison failed", e))?;
    Ok(Json(json!({ "comparison": comparison })))
}

// ============ Analytics ============

async fn handle_get_analysis(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    match analytics::read_report(&state.config.logs.analysis_path) {
        Ok(Some(report)) => Ok(Json(report)),
        Ok(None) => Err(not_found("analysis has not been run yet")),
        Err(e) => Err(internal("analysis read failed", e)),
    }
}

async fn handle_run_analysis(
    State(state): State<AppState>,
    Json(actor): Json<ActorRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&state, actor.username.as_deref())?;
    let report = analytics::run_analysis(state.chat_log.path(), &state.config.logs.analysis_path)
        .await
        .map_err(|e| internal("analysis failed", e))?;
    Ok(Json(json!({ "success": true, "total": report.total_messages })))
}
