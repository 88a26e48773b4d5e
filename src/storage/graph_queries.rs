//! BFS traversal over the entity graph (`entities` connected through
//! shared `memory_entities` mentions and `triples`), depth-capped.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

use crate::error::Result;
use crate::storage::entity_queries::{get_entity, triples_for_entity};
use crate::types::{Entity, EntityId, Triple};

pub const MAX_TRAVERSAL_DEPTH: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub entity: Entity,
    pub depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub subject_id: EntityId,
    pub predicate: String,
    pub object_id: EntityId,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraphResult {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Entities that co-occur with `entity_id` in at least one memory, used
/// to extend traversal beyond explicit triples.
fn co_mentioned(conn: &Connection, entity_id: EntityId) -> Result<Vec<EntityId>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT me2.entity_id
         FROM memory_entities me1
         JOIN memory_entities me2 ON me1.memory_id = me2.memory_id
         WHERE me1.entity_id = ?1 AND me2.entity_id != ?1",
    )?;
    let rows = stmt
        .query_map(params![entity_id], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// Breadth-first walk from `start`, capped at `depth` hops (max
/// [`MAX_TRAVERSAL_DEPTH`]) and `limit` nodes. Edges are explicit triples
/// discovered along the way; co-mentions extend the frontier without
/// themselves becoming edges.
pub fn graph_query(conn: &Connection, start: EntityId, depth: usize, limit: usize) -> Result<GraphResult> {
    let depth = depth.min(MAX_TRAVERSAL_DEPTH);
    let mut visited: HashSet<EntityId> = HashSet::new();
    let mut queue: VecDeque<(EntityId, usize)> = VecDeque::new();
    let mut nodes = Vec::new();
    let mut edges: Vec<GraphEdge> = Vec::new();
    let mut seen_edges: HashSet<(EntityId, String, EntityId)> = HashSet::new();

    queue.push_back((start, 0));
    visited.insert(start);

    while let Some((current, current_depth)) = queue.pop_front() {
        if nodes.len() >= limit {
            break;
        }
        let entity = match get_entity(conn, current) {
            Ok(e) => e,
            Err(_) => continue,
        };
        nodes.push(GraphNode {
            entity,
            depth: current_depth,
        });

        if current_depth >= depth {
            continue;
        }

        for triple in triples_for_entity(conn, current)? {
            let key = (triple.subject_id, triple.predicate.clone(), triple.object_id);
            if seen_edges.insert(key) {
                edges.push(GraphEdge {
                    subject_id: triple.subject_id,
                    predicate: triple.predicate.clone(),
                    object_id: triple.object_id,
                });
            }
            let neighbor = if triple.subject_id == current {
                triple.object_id
            } else {
                triple.subject_id
            };
            if visited.insert(neighbor) {
                queue.push_back((neighbor, current_depth + 1));
            }
        }

        for neighbor in co_mentioned(conn, current)? {
            if visited.insert(neighbor) {
                queue.push_back((neighbor, current_depth + 1));
            }
        }
    }

    Ok(GraphResult { nodes, edges })
}

/// Human-readable path explanation: the chain of predicates connecting
/// `from` to `to`, found via the same bounded BFS.
pub fn graph_explain(conn: &Connection, from: EntityId, to: EntityId) -> Result<Option<Vec<Triple>>> {
    let mut visited: HashSet<EntityId> = HashSet::new();
    let mut queue: VecDeque<(EntityId, Vec<Triple>)> = VecDeque::new();
    queue.push_back((from, Vec::new()));
    visited.insert(from);

    while let Some((current, path)) = queue.pop_front() {
        if current == to {
            return Ok(Some(path));
        }
        if path.len() >= MAX_TRAVERSAL_DEPTH {
            continue;
        }
        for triple in triples_for_entity(conn, current)? {
            let neighbor = if triple.subject_id == current {
                triple.object_id
            } else {
                triple.subject_id
            };
            if visited.insert(neighbor) {
                let mut next_path = path.clone();
                next_path.push(triple.clone());
                queue.push_back((neighbor, next_path));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::entity_queries::{add_triple, create_entity};
    use crate::storage::{queries, Storage};
    use crate::types::{CreateMemoryInput, EntityType};

    fn seed_memory(conn: &Connection) -> crate::types::MemoryId {
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
    fn graph_query_respects_depth_cap() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let a = create_entity(conn, "A", EntityType::Concept)?;
                let b = create_entity(conn, "B", EntityType::Concept)?;
                let c = create_entity(conn, "C", EntityType::Concept)?;
                let memory_id = seed_memory(conn);
                add_triple(conn, a, "relates_to", b, memory_id)?;
                add_triple(conn, b, "relates_to", c, memory_id)?;

                let result = graph_query(conn, a, 1, 50)?;
                let ids: Vec<_> = result.nodes.iter().map(|n| n.entity.id).collect();
                assert!(ids.contains(&a));
                assert!(ids.contains(&b));
                assert!(!ids.contains(&c));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn graph_explain_finds_path() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let a = create_entity(conn, "A", EntityType::Concept)?;
                let b = create_entity(conn, "B", EntityType::Concept)?;
                let c = create_entity(conn, "C", EntityType::Concept)?;
                let memory_id = seed_memory(conn);
                add_triple(conn, a, "depends_on", b, memory_id)?;
                add_triple(conn, b, "depends_on", c, memory_id)?;

                let path = graph_explain(conn, a, c)?.expect("path should exist");
                assert_eq!(path.len(), 2);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn graph_explain_returns_none_when_disconnected() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let a = create_entity(conn, "A", EntityType::Concept)?;
                let b = create_entity(conn, "B", EntityType::Concept)?;
                assert!(graph_explain(conn, a, b)?.is_none());
                Ok(())
            })
            .unwrap();
    }
}
