//! Event bus payload shape (spec §4.8): a closed set of event kinds, each
//! carrying `{type, timestamp, data}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::MemoryId;

/// Closed set of publishable event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MemoryCreated,
    MemoryAccessed,
    MemoryUpdated,
    MemoryDeleted,
    ConsolidationComplete,
    DecayTick,
    LinkDiscovered,
    InitialState,
    WorkerLightTick,
    WorkerMediumTick,
    UpdateStarted,
    UpdateComplete,
    UpdateFailed,
    ServerRestarting,
}

/// `{type, timestamp, data}` — the one shape every event takes on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl RealtimeEvent {
    pub fn new(kind: EventKind, data: serde_json::Value) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn memory_created(id: MemoryId, preview: &str) -> Self {
        Self::new(
            EventKind::MemoryCreated,
            serde_json::json!({ "memory_id": id, "preview": truncate(preview, 100) }),
        )
    }

    pub fn memory_accessed(id: MemoryId, salience: f32) -> Self {
        Self::new(
            EventKind::MemoryAccessed,
            serde_json::json!({ "memory_id": id, "salience": salience }),
        )
    }

    pub fn memory_updated(id: MemoryId, changes: &[&str]) -> Self {
        Self::new(
            EventKind::MemoryUpdated,
            serde_json::json!({ "memory_id": id, "changes": changes }),
        )
    }

    pub fn memory_deleted(id: MemoryId) -> Self {
        Self::new(EventKind::MemoryDeleted, serde_json::json!({ "memory_id": id }))
    }

    pub fn consolidation_complete(result: &crate::types::ConsolidationResult) -> Self {
        Self::new(EventKind::ConsolidationComplete, serde_json::json!(result))
    }

    pub fn decay_tick(result: &crate::types::DecayTickResult) -> Self {
        Self::new(EventKind::DecayTick, serde_json::json!(result))
    }

    pub fn link_discovered(source_id: MemoryId, target_id: MemoryId, relationship: &str) -> Self {
        Self::new(
            EventKind::LinkDiscovered,
            serde_json::json!({ "source_id": source_id, "target_id": target_id, "relationship": relationship }),
        )
    }

    pub fn initial_state(stats: &crate::types::MemoryStats, memories: &[crate::types::Memory]) -> Self {
        Self::new(
            EventKind::InitialState,
            serde_json::json!({ "stats": stats, "memories": memories }),
        )
    }

    pub fn server_restarting() -> Self {
        Self::new(EventKind::ServerRestarting, serde_json::json!({}))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

/// Per-subscriber filter; an empty filter matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    pub memory_ids: Option<Vec<MemoryId>>,
    pub event_kinds: Option<Vec<EventKind>>,
}

impl SubscriptionFilter {
    pub fn matches(&self, event: &RealtimeEvent) -> bool {
        if let Some(ref kinds) = self.event_kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        if let Some(ref ids) = self.memory_ids {
            let event_id = event.data.get("memory_id").and_then(|v| v.as_i64());
            if let Some(event_id) = event_id {
                if !ids.contains(&event_id) {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches_by_event_kind() {
        let filter = SubscriptionFilter {
            event_kinds: Some(vec![EventKind::MemoryCreated]),
            memory_ids: None,
        };
        assert!(filter.matches(&RealtimeEvent::memory_created(1, "hello")));
        assert!(!filter.matches(&RealtimeEvent::memory_deleted(1)));
    }

    #[test]
    fn filter_matches_by_memory_id() {
        let filter = SubscriptionFilter {
            event_kinds: None,
            memory_ids: Some(vec![42]),
        };
        assert!(filter.matches(&RealtimeEvent::memory_deleted(42)));
        assert!(!filter.matches(&RealtimeEvent::memory_deleted(7)));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = SubscriptionFilter::default();
        assert!(filter.matches(&RealtimeEvent::server_restarting()));
    }
}
