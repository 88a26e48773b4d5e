//! Knowledge graph surface exposed to MCP tools: bounded BFS traversal,
//! entity listing, and path explanation over `storage::graph_queries`.

use crate::error::Result;
use crate::storage::{entity_queries, graph_queries};
use crate::types::{Entity, EntityId, EntityType, Triple};

pub use graph_queries::{GraphEdge, GraphNode, GraphResult, MAX_TRAVERSAL_DEPTH};

/// `graph_query` MCP tool: BFS from one entity, depth-capped.
pub fn query(conn: &rusqlite::Connection, start: EntityId, depth: usize, limit: usize) -> Result<GraphResult> {
    graph_queries::graph_query(conn, start, depth, limit)
}

/// `graph_explain` MCP tool: the predicate chain connecting two entities, if any.
pub fn explain(conn: &rusqlite::Connection, from: EntityId, to: EntityId) -> Result<Option<Vec<Triple>>> {
    graph_queries::graph_explain(conn, from, to)
}

/// `graph_entities` MCP tool: entities ordered by mention count, optionally
/// filtered by type and a minimum mention floor.
pub fn entities(
    conn: &rusqlite::Connection,
    entity_type: Option<EntityType>,
    min_mentions: i64,
    limit: i64,
) -> Result<Vec<Entity>> {
    let all = entity_queries::list_entities(conn, entity_type, limit.max(1) * 4)?;
    Ok(all
        .into_iter()
        .filter(|e| e.memory_count >= min_mentions)
        .take(limit.max(1) as usize)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::entity_queries::{add_triple, create_entity};
    use crate::storage::{queries, Storage};
    use crate::types::CreateMemoryInput;

    fn seed_memory(conn: &rusqlite::Connection) -> crate::types::MemoryId {
        queries::create(
            conn,
            &CreateMemoryInput {
                title: "seed".into(),
                content: "seed memory for triple source_memory_id".into(),
                ..Default::default()
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn entities_filters_by_min_mentions() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let a = create_entity(conn, "A", EntityType::Concept)?;
                let _b = create_entity(conn, "B", EntityType::Concept)?;
                // bump A's memory_count via a fake link
                conn.execute(
                    "UPDATE entities SET memory_count = 5 WHERE id = ?1",
                    rusqlite::params![a],
                )?;
                let found = entities(conn, None, 1, 10)?;
                assert_eq!(found.len(), 1);
                assert_eq!(found[0].id, a);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn query_delegates_to_storage_bfs() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let a = create_entity(conn, "A", EntityType::Concept)?;
                let b = create_entity(conn, "B", EntityType::Concept)?;
                let memory_id = seed_memory(conn);
                add_triple(conn, a, "relates_to", b, memory_id)?;
                let result = query(conn, a, 2, 10)?;
                assert!(result.nodes.iter().any(|n| n.entity.id == b));
                Ok(())
            })
            .unwrap();
    }
}
