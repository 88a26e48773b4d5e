//! Database queries for entities, triples, and the memory/entity junction.

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;

use crate::error::{CortexError, Result};
use crate::types::{Entity, EntityId, EntityType, MemoryId, Triple};

fn entity_from_row(row: &Row) -> rusqlite::Result<Entity> {
    let entity_type: String = row.get("type")?;
    let aliases: String = row.get("aliases")?;
    Ok(Entity {
        id: row.get("id")?,
        name: row.get("name")?,
        entity_type: entity_type.parse().unwrap_or_default(),
        aliases: serde_json::from_str(&aliases).unwrap_or_default(),
        memory_count: row.get("memory_count")?,
    })
}

fn triple_from_row(row: &Row) -> rusqlite::Result<Triple> {
    Ok(Triple {
        id: row.get("id")?,
        subject_id: row.get("subject_id")?,
        predicate: row.get("predicate")?,
        object_id: row.get("object_id")?,
        source_memory_id: row.get("source_memory_id")?,
    })
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Resolve a mention to an entity id, in order: (1) exact name+type match,
/// (2) case-insensitive name+type match, (3) alias match within type,
/// (4) case-insensitive name match across any type, (5) create new.
pub fn resolve_entity(conn: &Connection, name: &str, entity_type: EntityType) -> Result<EntityId> {
    if let Some(id) = conn
        .query_row(
            "SELECT id FROM entities WHERE name = ?1 AND type = ?2",
            params![name, entity_type.as_str()],
            |row| row.get(0),
        )
        .optional()?
    {
        return Ok(id);
    }

    let normalized = normalize(name);
    let mut stmt =
        conn.prepare("SELECT id, name, type, aliases, memory_count FROM entities WHERE type = ?1")?;
    let candidates: Vec<Entity> = stmt
        .query_map(params![entity_type.as_str()], entity_from_row)?
        .filter_map(|r| r.ok())
        .collect();

    if let Some(hit) = candidates.iter().find(|e| normalize(&e.name) == normalized) {
        return Ok(hit.id);
    }
    if let Some(hit) = candidates
        .iter()
        .find(|e| e.aliases.iter().any(|a| normalize(a) == normalized))
    {
        add_alias(conn, hit.id, name)?;
        return Ok(hit.id);
    }

    if let Some(id) = conn
        .query_row(
            "SELECT id FROM entities WHERE lower(name) = ?1",
            params![normalized],
            |row| row.get(0),
        )
        .optional()?
    {
        return Ok(id);
    }

    if normalized.len() > 5 {
        let mut stmt = conn.prepare("SELECT id, name, type, aliases, memory_count FROM entities")?;
        let all: Vec<Entity> = stmt
            .query_map([], entity_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        if let Some(hit) = all.iter().find(|e| {
            let other = normalize(&e.name);
            other.len().abs_diff(normalized.len()) <= 2
                && levenshtein::levenshtein(&normalized, &other) <= 2
        }) {
            add_alias(conn, hit.id, name)?;
            return Ok(hit.id);
        }
    }

    create_entity(conn, name, entity_type)
}

/// Appends `alias` to an entity's stored aliases set, preserving the
/// incoming casing (spec §4.6 step 3/4: "on hit, append as alias").
fn add_alias(conn: &Connection, id: EntityId, alias: &str) -> Result<()> {
    let aliases_json: String = conn.query_row(
        "SELECT aliases FROM entities WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    let mut aliases: Vec<String> = serde_json::from_str(&aliases_json).unwrap_or_default();
    if !aliases.iter().any(|a| normalize(a) == normalize(alias)) {
        aliases.push(alias.to_string());
        conn.execute(
            "UPDATE entities SET aliases = ?1 WHERE id = ?2",
            params![serde_json::to_string(&aliases)?, id],
        )?;
    }
    Ok(())
}

pub fn create_entity(conn: &Connection, name: &str, entity_type: EntityType) -> Result<EntityId> {
    conn.execute(
        "INSERT INTO entities (name, type, aliases, memory_count) VALUES (?1, ?2, '[]', 0)",
        params![name, entity_type.as_str()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_entity(conn: &Connection, id: EntityId) -> Result<Entity> {
    conn.query_row(
        "SELECT id, name, type, aliases, memory_count FROM entities WHERE id = ?1",
        params![id],
        entity_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => CortexError::NotFound(id),
        other => CortexError::from(other),
    })
}

pub fn list_entities(conn: &Connection, entity_type: Option<EntityType>, limit: i64) -> Result<Vec<Entity>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, type, aliases, memory_count FROM entities
         WHERE (?1 IS NULL OR type = ?1)
         ORDER BY memory_count DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![entity_type.map(|t| t.as_str()), limit], entity_from_row)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

pub fn search_entities(conn: &Connection, query: &str, limit: i64) -> Result<Vec<Entity>> {
    let pattern = format!("%{}%", normalize(query));
    let mut stmt = conn.prepare(
        "SELECT id, name, type, aliases, memory_count FROM entities
         WHERE lower(name) LIKE ?1 ORDER BY memory_count DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![pattern, limit], entity_from_row)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// Link an entity mention to a memory, bumping `memory_count` once per
/// distinct (memory, entity) pair (`INSERT OR IGNORE` on the composite key).
pub fn link_entity_to_memory(
    conn: &Connection,
    memory_id: MemoryId,
    entity_id: EntityId,
    role: &str,
) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO memory_entities (memory_id, entity_id, role) VALUES (?1, ?2, ?3)",
        params![memory_id, entity_id, role],
    )? > 0;
    if inserted {
        conn.execute(
            "UPDATE entities SET memory_count = memory_count + 1 WHERE id = ?1",
            params![entity_id],
        )?;
    }
    Ok(inserted)
}

pub fn entities_for_memory(conn: &Connection, memory_id: MemoryId) -> Result<Vec<(Entity, String)>> {
    let mut stmt = conn.prepare(
        "SELECT e.id, e.name, e.type, e.aliases, e.memory_count, me.role
         FROM entities e JOIN memory_entities me ON e.id = me.entity_id
         WHERE me.memory_id = ?1",
    )?;
    let rows = stmt
        .query_map(params![memory_id], |row| {
            let entity = entity_from_row(row)?;
            let role: String = row.get("role")?;
            Ok((entity, role))
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

pub fn memories_for_entity(conn: &Connection, entity_id: EntityId) -> Result<Vec<MemoryId>> {
    let mut stmt = conn.prepare("SELECT memory_id FROM memory_entities WHERE entity_id = ?1")?;
    let rows = stmt
        .query_map(params![entity_id], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// Insert a (subject, predicate, object) fact, ignoring exact duplicates.
pub fn add_triple(
    conn: &Connection,
    subject_id: EntityId,
    predicate: &str,
    object_id: EntityId,
    source_memory_id: MemoryId,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO triples (subject_id, predicate, object_id, source_memory_id)
         VALUES (?1, ?2, ?3, ?4)",
        params![subject_id, predicate, object_id, source_memory_id],
    )?;
    Ok(())
}

pub fn triples_for_entity(conn: &Connection, entity_id: EntityId) -> Result<Vec<Triple>> {
    let mut stmt = conn.prepare(
        "SELECT id, subject_id, predicate, object_id, source_memory_id FROM triples
         WHERE subject_id = ?1 OR object_id = ?1",
    )?;
    let rows = stmt
        .query_map(params![entity_id], triple_from_row)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// Merge `remove_id` into `keep_id`: repoint links and triples, fold
/// aliases, and delete the now-empty entity. Caller is expected to run
/// this inside a transaction.
pub fn merge_entities(conn: &Connection, keep_id: EntityId, remove_id: EntityId) -> Result<()> {
    if keep_id == remove_id {
        return Ok(());
    }
    let removed = get_entity(conn, remove_id)?;

    conn.execute(
        "INSERT OR IGNORE INTO memory_entities (memory_id, entity_id, role)
         SELECT memory_id, ?1, role FROM memory_entities WHERE entity_id = ?2",
        params![keep_id, remove_id],
    )?;
    conn.execute(
        "DELETE FROM memory_entities WHERE entity_id = ?1",
        params![remove_id],
    )?;
    conn.execute(
        "UPDATE OR IGNORE triples SET subject_id = ?1 WHERE subject_id = ?2",
        params![keep_id, remove_id],
    )?;
    conn.execute(
        "UPDATE OR IGNORE triples SET object_id = ?1 WHERE object_id = ?2",
        params![keep_id, remove_id],
    )?;
    conn.execute(
        "DELETE FROM triples WHERE subject_id = ?1 AND object_id = ?1",
        params![remove_id],
    )?;

    let keep = get_entity(conn, keep_id)?;
    let mut aliases = keep.aliases.clone();
    if !aliases.iter().any(|a| normalize(a) == normalize(&removed.name)) {
        aliases.push(removed.name.clone());
    }
    for alias in removed.aliases {
        if !aliases.iter().any(|a| normalize(a) == normalize(&alias)) {
            aliases.push(alias);
        }
    }

    let recount: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memory_entities WHERE entity_id = ?1",
        params![keep_id],
        |row| row.get(0),
    )?;
    conn.execute(
        "UPDATE entities SET aliases = ?1, memory_count = ?2 WHERE id = ?3",
        params![serde_json::to_string(&aliases)?, recount, keep_id],
    )?;
    conn.execute("DELETE FROM entities WHERE id = ?1", params![remove_id])?;
    Ok(())
}

pub fn delete_entity(conn: &Connection, id: EntityId) -> Result<()> {
    let affected = conn.execute("DELETE FROM entities WHERE id = ?1", params![id])?;
    if affected == 0 {
        return Err(CortexError::NotFound(id));
    }
    Ok(())
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EntityStats {
    pub total_entities: i64,
    pub total_triples: i64,
    pub by_type: HashMap<String, i64>,
}

pub fn entity_stats(conn: &Connection) -> Result<EntityStats> {
    let total_entities: i64 = conn.query_row("SELECT COUNT(*) FROM entities", [], |r| r.get(0))?;
    let total_triples: i64 = conn.query_row("SELECT COUNT(*) FROM triples", [], |r| r.get(0))?;
    let mut stmt = conn.prepare("SELECT type, COUNT(*) FROM entities GROUP BY type")?;
    let by_type: HashMap<String, i64> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(EntityStats {
        total_entities,
        total_triples,
        by_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    #[test]
    fn resolve_entity_creates_then_reuses() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let id1 = resolve_entity(conn, "Anthropic", EntityType::Organization)?;
                let id2 = resolve_entity(conn, "anthropic", EntityType::Organization)?;
                assert_eq!(id1, id2);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn resolve_entity_matches_alias() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let id = resolve_entity(conn, "Postgres", EntityType::System)?;
                conn.execute(
                    "UPDATE entities SET aliases = '[\"PostgreSQL\"]' WHERE id = ?1",
                    params![id],
                )?;
                let resolved = resolve_entity(conn, "PostgreSQL", EntityType::System)?;
                assert_eq!(id, resolved);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn resolve_entity_fuzzy_matches_within_distance_two() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let id = resolve_entity(conn, "Kubernetes", EntityType::System)?;
                let resolved = resolve_entity(conn, "Kubernettes", EntityType::System)?;
                assert_eq!(id, resolved);
                let entity = get_entity(conn, id)?;
                assert!(entity.aliases.iter().any(|a| a == "Kubernettes"));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn resolve_entity_does_not_fuzzy_match_short_names() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let id = resolve_entity(conn, "Go", EntityType::Library)?;
                let other = resolve_entity(conn, "Gol", EntityType::Library)?;
                assert_ne!(id, other);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn link_entity_increments_memory_count_once() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                use crate::storage::queries::create;
                use crate::types::CreateMemoryInput;

                let memory = create(
                    conn,
                    &CreateMemoryInput {
                        title: "t".into(),
                        content: "Anthropic builds Claude".into(),
                        ..Default::default()
                    },
                )?;
                let entity_id = resolve_entity(conn, "Anthropic", EntityType::Organization)?;
                assert!(link_entity_to_memory(conn, memory.id, entity_id, "subject")?);
                assert!(!link_entity_to_memory(conn, memory.id, entity_id, "subject")?);
                let entity = get_entity(conn, entity_id)?;
                assert_eq!(entity.memory_count, 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn merge_entities_repoints_links_and_aliases() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                use crate::storage::queries::create;
                use crate::types::CreateMemoryInput;

                let memory = create(
                    conn,
                    &CreateMemoryInput {
                        title: "t".into(),
                        content: "c".into(),
                        ..Default::default()
                    },
                )?;
                let keep = create_entity(conn, "Postgres", EntityType::System)?;
                let remove = create_entity(conn, "PostgreSQL", EntityType::System)?;
                link_entity_to_memory(conn, memory.id, remove, "mention")?;

                merge_entities(conn, keep, remove)?;

                assert!(get_entity(conn, remove).is_err());
                let kept = get_entity(conn, keep)?;
                assert_eq!(kept.memory_count, 1);
                assert!(kept.aliases.iter().any(|a| a == "PostgreSQL"));
                Ok(())
            })
            .unwrap();
    }
}
