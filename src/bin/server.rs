//! Cortex HTTP + WebSocket server: the `/api/*` REST surface consumed by
//! the visualization UI and hook scripts, plus `/ws/events` streaming the
//! event bus verbatim (spec §6).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cortex::embedding::{self, EmbeddingWorker};
use cortex::error::CortexError;
use cortex::intelligence::query_api;
use cortex::realtime::{RealtimeEvent, RealtimeServer};
use cortex::search::search_blocking as hybrid_search_blocking;
use cortex::storage::queries;
use cortex::types::{
    Category, CreateMemoryInput, MemoryId, MemoryType, SearchOptions, StorageConfig,
};
use cortex::{MemoryEngine, Storage};

#[derive(Parser, Debug)]
#[command(name = "cortex-server")]
#[command(about = "Cortex HTTP + WebSocket memory server")]
struct Args {
    /// Database path
    #[arg(long, env = "CLAUDE_MEMORY_DB")]
    db_path: Option<String>,

    /// Default project, used when a request doesn't specify one
    #[arg(long, env = "CORTEX_PROJECT")]
    project: Option<String>,

    /// HTTP/WebSocket listen port
    #[arg(long, env = "CORTEX_HTTP_PORT", default_value = "8765")]
    port: u16,

    /// Light consolidation tick interval, seconds (spec §4.7)
    #[arg(long, env = "CORTEX_LIGHT_TICK_SECONDS", default_value = "60")]
    light_tick_seconds: u64,

    /// Medium consolidation tick interval, seconds (spec §4.7)
    #[arg(long, env = "CORTEX_MEDIUM_TICK_SECONDS", default_value = "300")]
    medium_tick_seconds: u64,
}

/// `~/.claude-cortex/memories.db`, honoring the legacy `~/.claude-memory/`
/// path if present (spec §6).
fn resolve_db_path(explicit: Option<String>) -> String {
    if let Some(path) = explicit {
        return shellexpand::tilde(&path).to_string();
    }
    let legacy = shellexpand::tilde("~/.claude-memory/memories.db").to_string();
    if std::path::Path::new(&legacy).exists() {
        return legacy;
    }
    shellexpand::tilde("~/.claude-cortex/memories.db").to_string()
}

fn resolve_project(explicit: Option<String>) -> Option<String> {
    explicit.or_else(|| std::env::var("CLAUDE_MEMORY_PROJECT").ok())
}

#[derive(Clone)]
struct AppState {
    engine: Arc<MemoryEngine>,
    default_project: Option<String>,
}

fn error_response(err: CortexError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        CortexError::Validation(_) => StatusCode::BAD_REQUEST,
        CortexError::NotFound(_) => StatusCode::NOT_FOUND,
        CortexError::Paused => StatusCode::CONFLICT,
        CortexError::OverCapacity(_) => StatusCode::PAYLOAD_TOO_LARGE,
        CortexError::Contention(_) => StatusCode::SERVICE_UNAVAILABLE,
        CortexError::Duplicate { .. } => StatusCode::CONFLICT,
        CortexError::Degraded(_) => StatusCode::OK,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({ "success": false, "error": err.to_string(), "kind": err.kind() })),
    )
}

#[derive(Debug, Deserialize, Default)]
struct MemoriesQuery {
    project: Option<String>,
    #[serde(rename = "type")]
    memory_type: Option<String>,
    category: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
    mode: Option<String>,
    query: Option<String>,
}

const DEFAULT_PAGE_LIMIT: i64 = 20;

/// `GET /api/memories?{project,type,category,limit,offset,mode,query}`
/// (spec §6). `mode` selects the listing strategy: `recent` (default),
/// `important`, or `search` (requires `query`, runs the hybrid ranker).
async fn list_memories(State(state): State<AppState>, Query(q): Query<MemoriesQuery>) -> impl IntoResponse {
    let limit = q.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, 200);
    let offset = q.offset.unwrap_or(0).max(0);
    let project = q.project.clone().or_else(|| state.default_project.clone());
    let memory_type: Option<MemoryType> = q.memory_type.as_deref().and_then(|s| s.parse().ok());
    let category: Option<Category> = q.category.as_deref().and_then(|s| s.parse().ok());
    let mode = q.mode.as_deref().unwrap_or("recent");
    let has_query = q.query.as_deref().is_some_and(|s| !s.trim().is_empty());
    let embedder = if mode == "search" && has_query { embedding::pipeline().await } else { None };

    let result = state.engine.storage.with_connection(|conn| {
        if mode == "search" {
            let options = SearchOptions {
                query: q.query.clone(),
                project: project.clone(),
                memory_type,
                category,
                limit: Some(offset + limit),
                include_global: true,
                ..Default::default()
            };
            let results = hybrid_search_blocking(conn, &options, embedder)?;
            let memories: Vec<_> = results
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .map(|r| r.memory)
                .collect();
            Ok((memories, None))
        } else {
            let fetch = offset + limit;
            let mut rows = if mode == "important" {
                queries::high_priority(conn, fetch, project.as_deref())?
            } else {
                queries::recent(conn, fetch, project.as_deref())?
            };
            rows.retain(|m| memory_type.map_or(true, |t| m.memory_type == t));
            rows.retain(|m| category.map_or(true, |c| m.category == c));
            let total = rows.len() as i64;
            let page: Vec<_> = rows.into_iter().skip(offset as usize).take(limit as usize).collect();
            Ok((page, Some(total)))
        }
    });

    match result {
        Ok((memories, total_hint)) => {
            let total = total_hint.unwrap_or(memories.len() as i64 + offset);
            let has_more = offset + memories.len() as i64 < total;
            (
                StatusCode::OK,
                Json(json!({
                    "memories": memories,
                    "pagination": {
                        "offset": offset,
                        "limit": limit,
                        "total": total,
                        "hasMore": has_more,
                    }
                })),
            )
                .into_response()
        }
        Err(e) => error_response(e).into_response(),
    }
}

async fn get_memory(State(state): State<AppState>, Path(id): Path<MemoryId>) -> impl IntoResponse {
    match state.engine.get(id) {
        Ok(memory) => (StatusCode::OK, Json(json!({ "memory": memory }))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn create_memory(State(state): State<AppState>, Json(mut input): Json<CreateMemoryInput>) -> impl IntoResponse {
    if input.project.is_none() {
        input.project = state.default_project.clone();
    }
    match state.engine.add(input) {
        Ok(memory) => (StatusCode::CREATED, Json(json!({ "memory": memory }))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn delete_memory(State(state): State<AppState>, Path(id): Path<MemoryId>) -> impl IntoResponse {
    match state.engine.delete(id) {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn access_memory(State(state): State<AppState>, Path(id): Path<MemoryId>) -> impl IntoResponse {
    match state.engine.access(id) {
        Ok(memory) => (StatusCode::OK, Json(json!({ "memory": memory }))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Debug, Deserialize, Default)]
struct ProjectQuery {
    project: Option<String>,
}

async fn stats(State(state): State<AppState>, Query(q): Query<ProjectQuery>) -> impl IntoResponse {
    let project = q.project.or_else(|| state.default_project.clone());
    let result = state
        .engine
        .storage
        .with_connection(|conn| query_api::stats(conn, project.as_deref()));
    match result {
        Ok(stats) => (StatusCode::OK, Json(json!({ "stats": stats }))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Debug, Deserialize, Default)]
struct LinksQuery {
    project: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

async fn links(State(state): State<AppState>, Query(q): Query<LinksQuery>) -> impl IntoResponse {
    let project = q.project.or_else(|| state.default_project.clone());
    let limit = q.limit.unwrap_or(100).clamp(1, 1000);
    let result = state
        .engine
        .storage
        .with_connection(|conn| queries::links(conn, project.as_deref(), limit));
    match result {
        Ok(links) => (StatusCode::OK, Json(json!({ "links": links }))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn consolidate(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.medium_tick() {
        Ok(result) => (StatusCode::OK, Json(json!({ "result": result }))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Debug, Deserialize, Default)]
struct ContextQuery {
    project: Option<String>,
    format: Option<String>,
}

async fn context(State(state): State<AppState>, Query(q): Query<ContextQuery>) -> impl IntoResponse {
    let project = q.project.or_else(|| state.default_project.clone());
    let result = state
        .engine
        .storage
        .with_connection(|conn| query_api::context_summary(conn, project.as_deref(), 10));
    match result {
        Ok(summary) => {
            if q.format.as_deref() == Some("markdown") {
                (StatusCode::OK, query_api::context_markdown(&summary)).into_response()
            } else {
                (
                    StatusCode::OK,
                    Json(json!({
                        "project": summary.project,
                        "stats": summary.stats,
                        "top_memories": summary.top_memories,
                    })),
                )
                    .into_response()
            }
        }
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Debug, Deserialize, Default)]
struct SuggestionsQuery {
    q: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

async fn suggestions(State(state): State<AppState>, Query(q): Query<SuggestionsQuery>) -> impl IntoResponse {
    let query = q.q.unwrap_or_default();
    let limit = q.limit.unwrap_or(10).clamp(1, 100);
    let result = state
        .engine
        .storage
        .with_connection(|conn| query_api::suggestions(conn, &query, limit));
    match result {
        Ok(suggestions) => (StatusCode::OK, Json(json!({ "suggestions": suggestions }))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let size = state.engine.storage.size_info().ok();
    Json(json!({
        "status": "ok",
        "paused": state.engine.control.is_paused(),
        "uptime": state.engine.control.uptime_human(),
        "size": size,
        "clients": state.engine.events.client_count(),
    }))
}

fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/memories", get(list_memories).post(create_memory))
        .route("/api/memories/:id", get(get_memory).delete(delete_memory))
        .route("/api/memories/:id/access", post(access_memory))
        .route("/api/stats", get(stats))
        .route("/api/links", get(links))
        .route("/api/consolidate", post(consolidate))
        .route("/api/context", get(context))
        .route("/api/suggestions", get(suggestions))
        .with_state(state)
}

/// `initial_state` frame sent to every new `/ws/events` connection (spec
/// §4.8/§6): current stats plus the most recent memories.
fn build_initial_state(engine: Arc<MemoryEngine>) -> RealtimeEvent {
    let snapshot = engine.storage.with_connection(|conn| {
        let stats = query_api::stats(conn, None)?;
        let memories = query_api::recent(conn, None, 50)?;
        Ok((stats, memories))
    });
    match snapshot {
        Ok((stats, memories)) => RealtimeEvent::initial_state(&stats, &memories),
        Err(e) => {
            tracing::warn!(error = %e, "failed to build initial_state snapshot");
            RealtimeEvent::initial_state(&Default::default(), &[])
        }
    }
}

#[tokio::main]
async fn main() -> cortex::error::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let db_path = resolve_db_path(args.db_path);
    let project = resolve_project(args.project);

    let storage = Storage::open(StorageConfig { db_path })?;
    let engine = Arc::new(MemoryEngine::new(storage));
    if let Err(e) = engine.start_session(project.as_deref()) {
        tracing::warn!(error = %e, "failed to start work session");
    }

    {
        let engine = engine.clone();
        tokio::spawn(async move {
            let Some(embedder) = cortex::embedding::pipeline().await else {
                tracing::warn!("embedder pipeline failed to load; embedding worker disabled");
                return;
            };
            let worker = EmbeddingWorker::new(embedder, engine.embedding_queue.clone(), engine.storage.conn_handle());
            worker.run().await;
        });
    }

    {
        let engine = engine.clone();
        let period = std::time::Duration::from_secs(args.light_tick_seconds.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = engine.light_tick() {
                    tracing::warn!(error = %e, "light consolidation tick failed");
                }
            }
        });
    }
    {
        let engine = engine.clone();
        let period = std::time::Duration::from_secs(args.medium_tick_seconds.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match engine.medium_tick() {
                    Ok(result) => tracing::info!(?result, "medium consolidation tick"),
                    Err(e) => tracing::warn!(error = %e, "medium consolidation tick failed"),
                }
            }
        });
    }

    let state = AppState {
        engine: engine.clone(),
        default_project: project,
    };

    let initial_state_engine = engine.clone();
    let initial_state: cortex::realtime::InitialStateFn =
        Arc::new(move || build_initial_state(initial_state_engine.clone()));
    let ws_router = RealtimeServer::router(engine.events.clone(), initial_state);

    let app = api_router(state)
        .merge(ws_router)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    tracing::info!(%addr, "cortex-server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown_engine = engine.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            if let Err(e) = shutdown_engine.end_session(Some("server shutdown")) {
                tracing::warn!(error = %e, "failed to close work session on shutdown");
            }
        })
        .await?;
    Ok(())
}
