//! WebSocket fan-out for the event bus (spec §4.8/§6): one broadcast
//! channel, one task per connection, drop-oldest on a lagging subscriber.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::events::{RealtimeEvent, SubscriptionFilter};

pub type ConnectionId = String;

/// Broadcast hub plus the per-connection filter table. `tokio::broadcast`'s
/// bounded ring buffer already gives every subscriber drop-oldest-on-lag
/// semantics without the publisher ever blocking.
pub struct RealtimeManager {
    tx: broadcast::Sender<RealtimeEvent>,
    clients: Arc<RwLock<HashMap<ConnectionId, SubscriptionFilter>>>,
}

impl RealtimeManager {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000);
        Self {
            tx,
            clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn publish(&self, event: RealtimeEvent) {
        let _ = self.tx.send(event);
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.tx.subscribe()
    }

    pub fn register_client(&self, id: ConnectionId, filter: SubscriptionFilter) {
        self.clients.write().insert(id, filter);
    }

    pub fn unregister_client(&self, id: &str) {
        self.clients.write().remove(id);
    }

    pub fn get_client_filter(&self, id: &str) -> Option<SubscriptionFilter> {
        self.clients.read().get(id).cloned()
    }
}

impl Default for RealtimeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RealtimeManager {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            clients: self.clients.clone(),
        }
    }
}

/// Snapshot handed to a just-connected socket for its `initial_state` frame.
pub type InitialStateFn = Arc<dyn Fn() -> RealtimeEvent + Send + Sync>;

#[derive(Clone)]
struct WsState {
    manager: RealtimeManager,
    initial_state: InitialStateFn,
}

pub struct RealtimeServer {
    manager: RealtimeManager,
    initial_state: InitialStateFn,
    addr: SocketAddr,
}

impl RealtimeServer {
    pub fn new(manager: RealtimeManager, initial_state: InitialStateFn, port: u16) -> Self {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        Self {
            manager,
            initial_state,
            addr,
        }
    }

    /// `/ws/events`: sends one `initial_state` frame on connect, then
    /// streams bus events verbatim (spec §6).
    pub fn router(manager: RealtimeManager, initial_state: InitialStateFn) -> Router {
        let state = WsState {
            manager,
            initial_state,
        };
        Router::new()
            .route("/ws/events", get(ws_handler))
            .route("/health", get(health_handler))
            .with_state(state)
    }

    pub async fn start(self) -> std::io::Result<()> {
        let app = Self::router(self.manager, self.initial_state);
        tracing::info!("realtime server listening on {}", self.addr);
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}

async fn health_handler(State(state): State<WsState>) -> impl IntoResponse {
    serde_json::json!({ "status": "ok", "clients": state.manager.client_count() }).to_string()
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let connection_id = Uuid::new_v4().to_string();
    state
        .manager
        .register_client(connection_id.clone(), SubscriptionFilter::default());
    tracing::info!(connection_id, "client connected");

    let (mut sender, mut receiver) = socket.split();

    let initial = (state.initial_state)();
    if let Ok(json) = serde_json::to_string(&initial) {
        let _ = sender.send(Message::Text(json)).await;
    }

    let mut rx = state.manager.subscribe();
    let conn_id = connection_id.clone();
    let mgr = state.manager.clone();
    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(filter) = mgr.get_client_filter(&conn_id) {
                        if filter.matches(&event) {
                            let json = serde_json::to_string(&event).unwrap_or_default();
                            if sender.send(Message::Text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(connection_id = %conn_id, skipped, "subscriber lagged, dropped oldest events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let conn_id = connection_id.clone();
    let mgr = state.manager.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Ok(new_filter) = serde_json::from_str::<SubscriptionFilter>(&text) {
                        mgr.register_client(conn_id.clone(), new_filter);
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    state.manager.unregister_client(&connection_id);
    tracing::info!(connection_id, "client disconnected");
}
