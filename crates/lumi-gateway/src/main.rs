//! Lumi Gateway: chat relay, journal analysis, and habit endpoints over one sled store.
//! Bare metal, listens on `LumiConfig::bind_addr` (127.0.0.1:8001 by default).

use axum::{
    body::Body,
    extract::{Query, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use lumi_core::{
    is_valid_user_id, ChatMemory, ChatMessage, ChatResponse, HabitRecord, HttpRagRelay, JournalAnalyzer,
    JournalEntryResponse, LumiChat, LumiConfig, LumiStore, WatsonxGenerator,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const NO_ENTRIES_FOR_DATE: &str = "No journal entries found for the specified date.";

type ApiError = (StatusCode, Json<Value>);

struct AppState {
    chat: LumiChat,
    journal: JournalAnalyzer,
    store: Arc<LumiStore>,
    config: LumiConfig,
}

impl AppState {
    /// Request user id, or the demo user when absent or blank. Ids containing `/` are rejected.
    fn user_or_default(&self, user_id: Option<&str>) -> Result<String, ApiError> {
        let user_id = user_id
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(self.config.demo_user_id.as_str());
        if !is_valid_user_id(user_id) {
            return Err(bad_request("user_id must not contain '/'."));
        }
        Ok(user_id.to_string())
    }
}

#[derive(Deserialize, Default)]
struct ResetMemoryRequest {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct JournalEntryRequest {
    text: String,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct ByDateQuery {
    date: String,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct UserQuery {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct HabitRequest {
    habit_name: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_active() -> bool {
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = LumiConfig::load()?;
    let store = Arc::new(LumiStore::open(Some(&config.storage_path))?);
    let relay = Arc::new(HttpRagRelay::new(
        config.rag_base(),
        Duration::from_secs(config.rag_timeout_secs),
    )?);
    let generator = Arc::new(WatsonxGenerator::from_config(&config)?);
    let memory = Arc::new(ChatMemory::with_session_cap(
        config.memory_exchanges,
        config.memory_sessions,
    ));

    tracing::info!(
        version = lumi_core::version(),
        storage = %config.storage_path,
        rag = %relay.base_url(),
        model = %config.watsonx_model_id,
        "[LUMI] gateway starting"
    );

    let state = Arc::new(AppState {
        chat: LumiChat::new(Arc::clone(&store), memory, relay, config.demo_user_id.clone()),
        journal: JournalAnalyzer::new(Arc::clone(&store), generator, config.history_limit),
        store: Arc::clone(&store),
        config: config.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(addr = %config.bind_addr(), "[LUMI] listening");
    axum::serve(listener, app(state)).await?;

    store.flush()?;
    Ok(())
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat_handler))
        .route("/reset-memory", post(reset_memory_handler))
        .route("/journal-entry", post(journal_entry_handler))
        .route("/journal-entry/by-date", get(journal_by_date_handler))
        .route("/journal-entries", get(journal_entries_handler))
        .route("/habits", post(register_habit_handler).get(list_habits_handler))
        .with_state(state)
        .layer(axum::middleware::from_fn(log_requests))
}

async fn log_requests(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    tracing::info!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "[LUMI] request"
    );
    response
}

fn bad_request(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "detail": message })))
}

fn retrieval_error(e: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %e, "error retrieving journal entries");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": format!("Error retrieving journal entries: {}", e) })),
    )
}

async fn health() -> &'static str {
    "OK"
}

/// Chat never fails on relay trouble; the reply carries a fixed apology instead.
async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(message): Json<ChatMessage>,
) -> Result<Json<ChatResponse>, ApiError> {
    state.user_or_default(message.user_id.as_deref())?;
    Ok(Json(state.chat.respond(&message).await))
}

/// Body is optional; an absent body resets the default user's session.
async fn reset_memory_handler(
    State(state): State<Arc<AppState>>,
    body: Option<Json<ResetMemoryRequest>>,
) -> Result<Json<Value>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let user_id = state.user_or_default(request.user_id.as_deref())?;
    state.chat.reset(Some(&user_id));
    Ok(Json(json!({ "status": "memory cleared" })))
}

async fn journal_entry_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JournalEntryRequest>,
) -> Result<Json<JournalEntryResponse>, ApiError> {
    let text = request.text.trim();
    if text.is_empty() {
        return Err(bad_request("Journal entry text must not be empty."));
    }
    let user_id = state.user_or_default(request.user_id.as_deref())?;
    Ok(Json(state.journal.record_entry(&user_id, text).await))
}

async fn journal_by_date_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ByDateQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_id = state.user_or_default(query.user_id.as_deref())?;
    let date = query.date.trim();
    if date.is_empty() {
        return Err(bad_request("Query parameter 'date' must not be empty."));
    }
    let latest = state
        .store
        .latest_journal_entry_on(&user_id, date)
        .map_err(retrieval_error)?;
    match latest {
        Some(entry) => {
            let body = serde_json::to_value(entry.to_response()).map_err(retrieval_error)?;
            Ok(Json(body))
        }
        None => Ok(Json(json!({ "message": NO_ENTRIES_FOR_DATE }))),
    }
}

async fn journal_entries_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<JournalEntryResponse>>, ApiError> {
    let user_id = state.user_or_default(query.user_id.as_deref())?;
    let entries = state.store.journal_entries(&user_id).map_err(retrieval_error)?;
    Ok(Json(entries.iter().map(|e| e.to_response()).collect()))
}

async fn register_habit_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<HabitRequest>,
) -> Result<(StatusCode, Json<HabitRecord>), ApiError> {
    let name = request.habit_name.trim();
    if name.is_empty() {
        return Err(bad_request("Habit name must not be empty."));
    }
    let user_id = state.user_or_default(request.user_id.as_deref())?;
    let habit = state
        .store
        .register_habit(&user_id, name, request.is_active)
        .map_err(|e| {
            tracing::error!(error = %e, "error saving habit");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": format!("Error saving habit: {}", e) })),
            )
        })?;
    Ok((StatusCode::CREATED, Json(habit)))
}

async fn list_habits_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<HabitRecord>>, ApiError> {
    let user_id = state.user_or_default(query.user_id.as_deref())?;
    let habits = state.store.habits(&user_id).map_err(|e| {
        tracing::error!(error = %e, "error retrieving habits");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": format!("Error retrieving habits: {}", e) })),
        )
    })?;
    Ok(Json(habits))
}
