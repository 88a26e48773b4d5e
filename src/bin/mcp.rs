//! Stdio MCP server binary: wires `cortex::MemoryEngine` to the JSON-RPC
//! tool surface over stdin/stdout.

use std::sync::Arc;

use clap::Parser;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cortex::embedding::EmbeddingWorker;
use cortex::error::{CortexError, Result};
use cortex::mcp::{
    methods, InitializeResult, McpHandler, McpRequest, McpResponse, McpServer, ToolCallResult,
};
use cortex::storage::entity_queries;
use cortex::types::{CreateMemoryInput, SearchOptions, StorageConfig};
use cortex::{graph, intelligence, search, MemoryEngine, Storage};

#[derive(Parser, Debug)]
#[command(name = "cortex-mcp")]
#[command(about = "Persistent memory MCP server")]
struct Args {
    #[arg(long, env = "CLAUDE_MEMORY_DB")]
    db_path: Option<String>,

    #[arg(long, env = "CORTEX_PROJECT")]
    project: Option<String>,
}

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

struct CortexHandler {
    engine: Arc<MemoryEngine>,
    project: Mutex<Option<String>>,
}

impl CortexHandler {
    fn new(engine: Arc<MemoryEngine>, project: Option<String>) -> Self {
        Self {
            engine,
            project: Mutex::new(project),
        }
    }

    fn current_project(&self) -> Option<String> {
        self.project.lock().clone()
    }

    fn tool_remember(&self, args: &Value) -> Value {
        let mut input: CreateMemoryInput = match serde_json::from_value(args.clone()) {
            Ok(i) => i,
            Err(e) => return json!({"success": false, "error": format!("invalid input: {e}")}),
        };
        if input.project.is_none() {
            input.project = self.current_project();
        }
        match self.engine.add(input) {
            Ok(memory) => json!({"success": true, "memory": memory}),
            Err(e) => error_json(e),
        }
    }

    fn tool_recall(&self, args: &Value) -> Value {
        let mut options: SearchOptions = match serde_json::from_value(args.clone()) {
            Ok(o) => o,
            Err(e) => return json!({"success": false, "error": format!("invalid input: {e}")}),
        };
        if options.project.is_none() {
            options.project = self.current_project();
        }
        let result = self
            .engine
            .storage
            .with_connection(|conn| futures::executor::block_on(search::search(conn, &options)));
        match result {
            Ok(results) => json!({"success": true, "results": results}),
            Err(e) => error_json(e),
        }
    }

    fn tool_forget(&self, args: &Value) -> Value {
        if let Some(id) = args.get("id").and_then(|v| v.as_i64()) {
            return match self.engine.delete(id) {
                Ok(()) => json!({"success": true, "deleted": 1}),
                Err(e) => error_json(e),
            };
        }
        let Some(query) = args.get("query").and_then(|v| v.as_str()) else {
            return json!({"success": false, "error": "forget requires id or query"});
        };
        let options = SearchOptions {
            query: Some(query.to_string()),
            project: self.current_project(),
            include_decayed: true,
            limit: Some(100),
            ..Default::default()
        };
        let matches = self
            .engine
            .storage
            .with_connection(|conn| futures::executor::block_on(search::search(conn, &options)));
        let matches = match matches {
            Ok(m) => m,
            Err(e) => return error_json(e),
        };
        let mut deleted = 0;
        for result in &matches {
            if self.engine.delete(result.memory.id).is_ok() {
                deleted += 1;
            }
        }
        json!({"success": true, "deleted": deleted})
    }

    fn tool_get_context(&self, args: &Value) -> Value {
        let project = args
            .get("project")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| self.current_project());
        let result = self
            .engine
            .storage
            .with_connection(|conn| intelligence::query_api::context_summary(conn, project.as_deref(), 10));
        match result {
            Ok(summary) => {
                if args.get("format").and_then(|v| v.as_str()) == Some("text") {
                    let lines: Vec<String> = summary
                        .top_memories
                        .iter()
                        .map(|m| format!("- {}", m.preview))
                        .collect();
                    json!({"success": true, "text": format!("Project: {}\nTotal memories: {}\n{}",
                        summary.project.as_deref().unwrap_or("(none)"), summary.stats.total, lines.join("\n"))})
                } else {
                    json!({"success": true, "context": {
                        "project": summary.project,
                        "stats": summary.stats,
                        "top_memories": summary.top_memories,
                    }})
                }
            }
            Err(e) => error_json(e),
        }
    }

    fn tool_set_project(&self, args: &Value) -> Value {
        let Some(name) = args.get("name").and_then(|v| v.as_str()) else {
            return json!({"success": false, "error": "name is required"});
        };
        *self.project.lock() = Some(name.to_string());
        json!({"success": true, "project": name})
    }

    fn tool_get_project(&self) -> Value {
        json!({"success": true, "project": self.current_project()})
    }

    fn tool_graph_query(&self, args: &Value) -> Value {
        let Some(entity_name) = args.get("entity").and_then(|v| v.as_str()) else {
            return json!({"success": false, "error": "entity is required"});
        };
        let depth = args.get("depth").and_then(|v| v.as_u64()).unwrap_or(2) as usize;
        let result = self.engine.storage.with_connection(|conn| {
            let matches = entity_queries::search_entities(conn, entity_name, 1)?;
            let Some(entity) = matches.into_iter().next() else {
                return Err(CortexError::Validation(format!("no entity named {entity_name}")));
            };
            graph::query(conn, entity.id, depth, 200)
        });
        match result {
            Ok(graph_result) => json!({"success": true, "graph": graph_result}),
            Err(e) => error_json(e),
        }
    }

    fn tool_graph_entities(&self, args: &Value) -> Value {
        let entity_type = args
            .get("type")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok());
        let min_mentions = args.get("min_mentions").and_then(|v| v.as_i64()).unwrap_or(0);
        let limit = args.get("limit").and_then(|v| v.as_i64()).unwrap_or(50);
        let result = self
            .engine
            .storage
            .with_connection(|conn| graph::entities(conn, entity_type, min_mentions, limit));
        match result {
            Ok(entities) => json!({"success": true, "entities": entities}),
            Err(e) => error_json(e),
        }
    }

    fn tool_graph_explain(&self, args: &Value) -> Value {
        let (Some(from), Some(to)) = (
            args.get("from").and_then(|v| v.as_str()),
            args.get("to").and_then(|v| v.as_str()),
        ) else {
            return json!({"success": false, "error": "from and to are required"});
        };
        let result = self.engine.storage.with_connection(|conn| {
            let from_entity = entity_queries::search_entities(conn, from, 1)?
                .into_iter()
                .next()
                .ok_or_else(|| CortexError::Validation(format!("no entity named {from}")))?;
            let to_entity = entity_queries::search_entities(conn, to, 1)?
                .into_iter()
                .next()
                .ok_or_else(|| CortexError::Validation(format!("no entity named {to}")))?;
            graph::explain(conn, from_entity.id, to_entity.id)
        });
        match result {
            Ok(Some(path)) => json!({"success": true, "path": path}),
            Ok(None) => json!({"success": true, "path": null}),
            Err(e) => error_json(e),
        }
    }
}

fn error_json(err: CortexError) -> Value {
    json!({"success": false, "error": err.to_string(), "kind": err.kind()})
}

impl McpHandler for CortexHandler {
    fn handle_request(&self, request: McpRequest) -> McpResponse {
        match request.method.as_str() {
            methods::INITIALIZE => {
                let result = InitializeResult::default();
                McpResponse::success(request.id, serde_json::to_value(result).unwrap_or_default())
            }
            methods::INITIALIZED => McpResponse::success(request.id, json!({})),
            methods::LIST_TOOLS => {
                let tools = cortex::mcp::get_tool_definitions();
                McpResponse::success(request.id, json!({"tools": tools}))
            }
            methods::CALL_TOOL => {
                let name = request
                    .params
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let args = request
                    .params
                    .get("arguments")
                    .cloned()
                    .unwrap_or_else(|| json!({}));

                let value = match name {
                    "remember" => self.tool_remember(&args),
                    "recall" => self.tool_recall(&args),
                    "forget" => self.tool_forget(&args),
                    "get_context" => self.tool_get_context(&args),
                    "set_project" => self.tool_set_project(&args),
                    "get_project" => self.tool_get_project(),
                    "graph_query" => self.tool_graph_query(&args),
                    "graph_entities" => self.tool_graph_entities(&args),
                    "graph_explain" => self.tool_graph_explain(&args),
                    other => json!({"success": false, "error": format!("unknown tool: {other}")}),
                };

                let result = ToolCallResult::json(&value);
                McpResponse::success(request.id, serde_json::to_value(result).unwrap_or_default())
            }
            other => McpResponse::error(request.id, -32601, format!("method not found: {other}")),
        }
    }
}

fn main() -> Result<()> {
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

    let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
    {
        let engine = engine.clone();
        std::thread::spawn(move || {
            rt.block_on(async move {
                let embedder = cortex::embedding::pipeline().await.expect("embedder pipeline init");
                let worker = EmbeddingWorker::new(embedder, engine.embedding_queue.clone(), engine.storage.conn_handle());
                worker.run().await;
            });
        });
    }

    {
        let engine = engine.clone();
        std::thread::spawn(move || loop {
            std::thread::sleep(std::time::Duration::from_secs(60));
            if let Err(e) = engine.light_tick() {
                tracing::warn!(error = %e, "light consolidation tick failed");
            }
        });
    }
    {
        let engine = engine.clone();
        std::thread::spawn(move || loop {
            std::thread::sleep(std::time::Duration::from_secs(600));
            if let Err(e) = engine.medium_tick() {
                tracing::warn!(error = %e, "medium consolidation tick failed");
            }
        });
    }

    tracing::info!("cortex-mcp starting");
    let handler = CortexHandler::new(engine.clone(), project);
    let result = McpServer::new(handler).run();
    if let Err(e) = engine.end_session(Some("mcp stdio loop closed")) {
        tracing::warn!(error = %e, "failed to close work session on shutdown");
    }
    result?;
    Ok(())
}
