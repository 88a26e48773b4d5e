//! Process-local event bus: a closed set of event kinds broadcast to
//! WebSocket subscribers over `/ws/events` (spec §4.8).

mod events;
mod server;

pub use events::{EventKind, RealtimeEvent, SubscriptionFilter};
pub use server::{ConnectionId, InitialStateFn, RealtimeManager, RealtimeServer};
