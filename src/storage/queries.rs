//! CRUD surface over the `memories` table: create, fetch, update, delete,
//! access (reinforcement), and the listing queries the ranking and stats
//! layers build on.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};

use crate::error::{CortexError, Result};
use crate::intelligence::salience;
use crate::types::{
    Category, CreateMemoryInput, Memory, MemoryId, MemoryType, Scope, UpdateMemoryInput,
    MAX_CONTENT_BYTES, TRUNCATION_MARKER,
};

fn row_to_memory(row: &Row) -> rusqlite::Result<Memory> {
    let memory_type: String = row.get("type")?;
    let category: String = row.get("category")?;
    let project: Option<String> = row.get("project")?;
    let scope: String = row.get("scope")?;
    let tags: String = row.get("tags")?;
    let last_accessed: String = row.get("last_accessed")?;
    let created_at: String = row.get("created_at")?;
    let metadata: String = row.get("metadata")?;
    let embedding: Option<Vec<u8>> = row.get("embedding")?;

    Ok(Memory {
        id: row.get("id")?,
        memory_type: memory_type.parse().unwrap_or_default(),
        category: category.parse().unwrap_or_default(),
        title: row.get("title")?,
        content: row.get("content")?,
        project,
        scope: scope.parse().unwrap_or_default(),
        transferable: row.get::<_, i64>("transferable")? != 0,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        salience: row.get("salience")?,
        decayed_score: row.get("decayed_score")?,
        access_count: row.get("access_count")?,
        last_accessed: parse_dt(&last_accessed),
        created_at: parse_dt(&created_at),
        embedding: embedding.and_then(|b| decode_embedding(&b)),
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
    })
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn decode_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
            .collect(),
    )
}

/// Truncate content to the stored limit, appending a visible marker.
fn truncate_content(content: &str) -> String {
    if content.len() <= MAX_CONTENT_BYTES {
        return content.to_string();
    }
    let mut end = MAX_CONTENT_BYTES;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &content[..end], TRUNCATION_MARKER)
}

/// Infer scope from category defaults and explicit markers in tags.
fn infer_scope(input: &CreateMemoryInput, category: Category) -> Scope {
    if let Some(scope) = input.scope {
        return scope;
    }
    if input.tags.iter().any(|t| t.eq_ignore_ascii_case("global")) {
        return Scope::Global;
    }
    if category.defaults_to_global() {
        return Scope::Global;
    }
    Scope::Project
}

/// Relevance gate for near-duplicate detection (spec: "title+project match
/// with relevance > 0.9"): word-level Jaccard overlap between the
/// candidate's title and content combined, same measure the teacher's
/// dedup pass uses since it needs no embedding to run at insert time.
const NEAR_DUPLICATE_RELEVANCE_THRESHOLD: f64 = 0.9;

fn relevance(a_title: &str, a_content: &str, b_title: &str, b_content: &str) -> f64 {
    let a: HashSet<String> = format!("{a_title} {a_content}")
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    let b: HashSet<String> = format!("{b_title} {b_content}")
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Find a near-duplicate: same title within the same project whose content
/// overlaps the incoming content with relevance > 0.9. Candidates are
/// gathered by the cheap title+project index lookup first (no embedding
/// required at insert time), then filtered by the relevance gate so two
/// memories that merely share a title but say unrelated things still both
/// get stored.
pub fn find_near_duplicate(
    conn: &Connection,
    title: &str,
    project: Option<&str>,
    content: &str,
) -> Result<Option<MemoryId>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, content FROM memories WHERE title = ?1 AND project IS ?2",
    )?;
    let candidates: Vec<(MemoryId, String, String)> = stmt
        .query_map(params![title, project], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .filter_map(|r| r.ok())
        .collect();

    Ok(candidates
        .into_iter()
        .find(|(_, existing_title, existing_content)| {
            relevance(title, content, existing_title, existing_content) > NEAR_DUPLICATE_RELEVANCE_THRESHOLD
        })
        .map(|(id, _, _)| id))
}

/// Insert a new memory, inferring category/salience/type/scope where the
/// caller left them unset. Returns the freshly-stored row.
pub fn create(conn: &Connection, input: &CreateMemoryInput) -> Result<Memory> {
    if input.title.trim().is_empty() {
        return Err(CortexError::Validation("title must not be empty".into()));
    }
    if input.content.trim().is_empty() {
        return Err(CortexError::Validation("content must not be empty".into()));
    }

    let content = truncate_content(&input.content);
    let category = input
        .category
        .unwrap_or_else(|| salience::suggest_category(&input.title, &content));
    let computed_salience = salience::calculate(&input.title, &content);
    let salience_value = input.importance.unwrap_or(computed_salience).clamp(0.0, 1.0);
    let memory_type = input.memory_type.unwrap_or_else(|| {
        if salience_value >= crate::types::CONSOLIDATION_THRESHOLD {
            MemoryType::LongTerm
        } else {
            MemoryType::ShortTerm
        }
    });
    let scope = infer_scope(input, category);
    let transferable = input.transferable.unwrap_or(scope == Scope::Global);

    let mut tags = input.tags.clone();
    for tag in salience::extract_tags(&input.title, &content) {
        if !tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
            tags.push(tag);
        }
    }

    let now = Utc::now();
    let now_str = now.to_rfc3339();
    let tags_json = serde_json::to_string(&tags)?;

    conn.execute(
        "INSERT INTO memories
            (type, category, title, content, project, tags, salience, access_count,
             last_accessed, created_at, metadata, scope, transferable, decayed_score)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, '{}', ?10, ?11, ?12)",
        params![
            memory_type.as_str(),
            category.as_str(),
            input.title,
            content,
            input.project,
            tags_json,
            salience_value,
            now_str,
            now_str,
            scope.as_str(),
            transferable as i64,
            salience_value,
        ],
    )?;

    get(conn, conn.last_insert_rowid())
}

pub fn get(conn: &Connection, id: MemoryId) -> Result<Memory> {
    conn.query_row(
        "SELECT * FROM memories WHERE id = ?1",
        params![id],
        row_to_memory,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => CortexError::NotFound(id),
        other => CortexError::from(other),
    })
}

pub fn update(conn: &Connection, id: MemoryId, input: &UpdateMemoryInput) -> Result<Memory> {
    let existing = get(conn, id)?;

    let title = input.title.clone().unwrap_or(existing.title);
    let content = input
        .content
        .as_ref()
        .map(|c| truncate_content(c))
        .unwrap_or(existing.content);
    let category = input.category.unwrap_or(existing.category);
    let memory_type = input.memory_type.unwrap_or(existing.memory_type);
    let project = if input.project.is_some() {
        input.project.clone()
    } else {
        existing.project
    };
    let tags = input.tags.clone().unwrap_or(existing.tags);
    let salience_value = input.salience.unwrap_or(existing.salience).clamp(0.0, 1.0);
    let scope = input.scope.unwrap_or(existing.scope);
    let transferable = input.transferable.unwrap_or(existing.transferable);
    let metadata = input.metadata.clone().unwrap_or(existing.metadata);

    conn.execute(
        "UPDATE memories SET type=?1, category=?2, title=?3, content=?4, project=?5,
            tags=?6, salience=?7, scope=?8, transferable=?9, metadata=?10
         WHERE id=?11",
        params![
            memory_type.as_str(),
            category.as_str(),
            title,
            content,
            project,
            serde_json::to_string(&tags)?,
            salience_value,
            scope.as_str(),
            transferable as i64,
            serde_json::to_string(&metadata)?,
            id,
        ],
    )?;

    get(conn, id)
}

pub fn delete(conn: &Connection, id: MemoryId) -> Result<()> {
    let affected = conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
    if affected == 0 {
        return Err(CortexError::NotFound(id));
    }
    Ok(())
}

/// Increment access count, bump `last_accessed`, and apply the
/// reinforcement boost, all inside the caller's transaction.
pub fn access(conn: &Connection, id: MemoryId) -> Result<Memory> {
    let existing = get(conn, id)?;
    let now = Utc::now();
    let new_access_count = existing.access_count + 1;
    let new_salience = salience::reinforce(existing.salience, existing.memory_type, existing.access_count);

    conn.execute(
        "UPDATE memories SET access_count=?1, last_accessed=?2, salience=?3 WHERE id=?4",
        params![new_access_count, now.to_rfc3339(), new_salience, id],
    )?;

    get(conn, id)
}

pub fn recent(conn: &Connection, limit: i64, project: Option<&str>) -> Result<Vec<Memory>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM memories WHERE (?1 IS NULL OR project = ?1 OR scope = 'global')
         ORDER BY created_at DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![project, limit], row_to_memory)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// Top memories by the composite priority score, computed in-process
/// since it depends on current time.
pub fn high_priority(conn: &Connection, limit: i64, project: Option<&str>) -> Result<Vec<Memory>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM memories WHERE (?1 IS NULL OR project = ?1 OR scope = 'global')",
    )?;
    let now = Utc::now();
    let mut all: Vec<Memory> = stmt
        .query_map(params![project], row_to_memory)?
        .filter_map(|r| r.ok())
        .collect();
    all.sort_by(|a, b| {
        salience::priority(b, now)
            .partial_cmp(&salience::priority(a, now))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    all.truncate(limit.max(0) as usize);
    Ok(all)
}

pub fn by_type(conn: &Connection, memory_type: MemoryType, limit: i64) -> Result<Vec<Memory>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM memories WHERE type = ?1 ORDER BY last_accessed DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![memory_type.as_str(), limit], row_to_memory)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

pub fn project_memories(conn: &Connection, project: &str) -> Result<Vec<Memory>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM memories WHERE project = ?1 ORDER BY created_at DESC",
    )?;
    let rows = stmt
        .query_map(params![project], row_to_memory)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// Sweep a bounded window of the least-recently-touched rows and persist
/// their recomputed decayed score (the light consolidation tick).
pub fn update_decay_scores(conn: &Connection, batch_size: i64) -> Result<i64> {
    let mut stmt = conn.prepare(
        "SELECT id, salience, type, last_accessed FROM memories
         ORDER BY last_accessed ASC LIMIT ?1",
    )?;
    let now = Utc::now();
    let candidates: Vec<(MemoryId, f32, MemoryType, DateTime<Utc>)> = stmt
        .query_map(params![batch_size], |row| {
            let t: String = row.get(2)?;
            let la: String = row.get(3)?;
            Ok((
                row.get(0)?,
                row.get(1)?,
                t.parse().unwrap_or_default(),
                parse_dt(&la),
            ))
        })?
        .filter_map(|r| r.ok())
        .collect();

    let mut updated = 0i64;
    for (id, sal, mtype, last_accessed) in candidates {
        let decayed = salience::decayed_score(sal, mtype, last_accessed, now);
        conn.execute(
            "UPDATE memories SET decayed_score = ?1 WHERE id = ?2",
            params![decayed, id],
        )?;
        updated += 1;
    }
    Ok(updated)
}

/// Delete short-term memories whose decayed score has fallen below the
/// eviction threshold. Returns the number of rows removed.
pub fn cleanup_decayed(conn: &Connection, threshold: f32) -> Result<i64> {
    let affected = conn.execute(
        "DELETE FROM memories WHERE type = 'short_term' AND decayed_score < ?1",
        params![threshold],
    )?;
    Ok(affected as i64)
}

/// Candidates eligible for short_term -> long_term promotion.
pub fn promotion_candidates(conn: &Connection, threshold: f32) -> Result<Vec<Memory>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM memories WHERE type = 'short_term' AND salience >= ?1",
    )?;
    let rows = stmt
        .query_map(params![threshold], row_to_memory)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// Promote to long_term and bump salience by [`crate::types::PROMOTION_SALIENCE_BUMP`],
/// capped at 1.0 (spec §4.7, e2e scenario 4).
pub fn promote(conn: &Connection, id: MemoryId) -> Result<()> {
    conn.execute(
        "UPDATE memories SET type = 'long_term',
            salience = MIN(1.0, salience + ?1)
         WHERE id = ?2",
        params![crate::types::PROMOTION_SALIENCE_BUMP, id],
    )?;
    Ok(())
}

/// STM memories accessed at least `min_accesses` times whose most recent
/// access falls after `since` — the predictive-consolidation early-promotion
/// pass (spec §4.7: "memories with two or more accesses in the past N hours
/// are promoted early").
pub fn predictive_promotion_candidates(
    conn: &Connection,
    min_accesses: i64,
    since: DateTime<Utc>,
) -> Result<Vec<Memory>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM memories WHERE type = 'short_term' AND access_count >= ?1 AND last_accessed >= ?2",
    )?;
    let rows = stmt
        .query_map(params![min_accesses, since.to_rfc3339()], row_to_memory)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// Totals, per-type and per-category breakdowns, and the decay-band
/// distribution (spec §4.10), optionally scoped to one project.
pub fn stats(conn: &Connection, project: Option<&str>) -> Result<crate::types::MemoryStats> {
    use crate::types::{DecayDistribution, MemoryStats};

    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memories WHERE ?1 IS NULL OR project = ?1",
        params![project],
        |r| r.get(0),
    )?;

    let mut by_type = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT type, COUNT(*) FROM memories WHERE ?1 IS NULL OR project = ?1 GROUP BY type",
        )?;
        let rows: Vec<(String, i64)> = stmt
            .query_map(params![project], |r| Ok((r.get(0)?, r.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        by_type.extend(rows);
    }

    let mut by_category = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT category, COUNT(*) FROM memories WHERE ?1 IS NULL OR project = ?1 GROUP BY category",
        )?;
        let rows: Vec<(String, i64)> = stmt
            .query_map(params![project], |r| Ok((r.get(0)?, r.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        by_category.extend(rows);
    }

    let average_salience: f32 = conn
        .query_row(
            "SELECT AVG(salience) FROM memories WHERE ?1 IS NULL OR project = ?1",
            params![project],
            |r| r.get(0),
        )
        .unwrap_or(0.0);

    use crate::types::{DECAY_FADING_FLOOR, DECAY_HEALTHY_THRESHOLD};

    let healthy: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memories WHERE decayed_score > ?1 AND (?2 IS NULL OR project = ?2)",
        params![DECAY_HEALTHY_THRESHOLD, project],
        |r| r.get(0),
    )?;
    let fading: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memories WHERE decayed_score <= ?1 AND decayed_score >= ?2 AND (?3 IS NULL OR project = ?3)",
        params![DECAY_HEALTHY_THRESHOLD, DECAY_FADING_FLOOR, project],
        |r| r.get(0),
    )?;
    let critical: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memories WHERE decayed_score < ?1 AND (?2 IS NULL OR project = ?2)",
        params![DECAY_FADING_FLOOR, project],
        |r| r.get(0),
    )?;

    Ok(MemoryStats {
        total,
        by_type,
        by_category,
        average_salience,
        decay_distribution: DecayDistribution {
            healthy,
            fading,
            critical,
        },
    })
}

fn link_from_row(row: &Row) -> rusqlite::Result<crate::types::MemoryLink> {
    let created_at: String = row.get("created_at")?;
    Ok(crate::types::MemoryLink {
        id: row.get("id")?,
        source_id: row.get("source_id")?,
        target_id: row.get("target_id")?,
        relationship: row.get("relationship")?,
        strength: row.get("strength")?,
        created_at: parse_dt(&created_at),
    })
}

/// Links touching any memory in `project` (or every link, if unset).
pub fn links(conn: &Connection, project: Option<&str>, limit: i64) -> Result<Vec<crate::types::MemoryLink>> {
    let mut stmt = conn.prepare(
        "SELECT l.id, l.source_id, l.target_id, l.relationship, l.strength, l.created_at
         FROM memory_links l
         JOIN memories m ON m.id = l.source_id
         WHERE ?1 IS NULL OR m.project = ?1
         ORDER BY l.created_at DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![project, limit], link_from_row)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// Prefix/substring matches over titles, categories, and projects, each
/// with a hit count, for the `/api/suggestions` / `suggestions` surface
/// (spec §4.10).
pub fn suggestions(conn: &Connection, q: &str, limit: i64) -> Result<Vec<crate::types::Suggestion>> {
    use crate::types::{Suggestion, SuggestionKind};

    let needle = format!("%{}%", q.to_lowercase());
    let mut out = Vec::new();

    let mut title_stmt = conn.prepare(
        "SELECT title, COUNT(*) FROM memories WHERE LOWER(title) LIKE ?1 GROUP BY title ORDER BY COUNT(*) DESC LIMIT ?2",
    )?;
    out.extend(
        title_stmt
            .query_map(params![needle, limit], |row| {
                Ok(Suggestion {
                    kind: SuggestionKind::Title,
                    value: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .filter_map(|r| r.ok()),
    );

    let mut category_stmt = conn.prepare(
        "SELECT category, COUNT(*) FROM memories WHERE LOWER(category) LIKE ?1 GROUP BY category ORDER BY COUNT(*) DESC LIMIT ?2",
    )?;
    out.extend(
        category_stmt
            .query_map(params![needle, limit], |row| {
                Ok(Suggestion {
                    kind: SuggestionKind::Category,
                    value: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .filter_map(|r| r.ok()),
    );

    let mut project_stmt = conn.prepare(
        "SELECT project, COUNT(*) FROM memories WHERE project IS NOT NULL AND LOWER(project) LIKE ?1
         GROUP BY project ORDER BY COUNT(*) DESC LIMIT ?2",
    )?;
    out.extend(
        project_stmt
            .query_map(params![needle, limit], |row| {
                Ok(Suggestion {
                    kind: SuggestionKind::Project,
                    value: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .filter_map(|r| r.ok()),
    );

    out.truncate(limit.max(0) as usize);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use crate::types::DECAY_FLOOR;

    fn sample_input(title: &str) -> CreateMemoryInput {
        CreateMemoryInput {
            title: title.to_string(),
            content: "We decided to use PostgreSQL for the schema".to_string(),
            project: Some("demo".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn create_infers_salience_and_type() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let memory = create(conn, &sample_input("db choice"))?;
                assert!(memory.salience > 0.2);
                assert_eq!(memory.memory_type, MemoryType::ShortTerm);
                assert_eq!(memory.category, Category::Architecture);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn high_importance_promotes_to_long_term() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let mut input = sample_input("override");
                input.importance = Some(0.9);
                let memory = create(conn, &input)?;
                assert_eq!(memory.memory_type, MemoryType::LongTerm);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn content_over_limit_is_truncated() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let mut input = sample_input("big");
                input.content = "x".repeat(MAX_CONTENT_BYTES + 500);
                let original_len = input.content.len();
                let memory = create(conn, &input)?;
                assert!(memory.content.ends_with(TRUNCATION_MARKER));
                assert!(memory.content.len() < original_len);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn access_reinforces_and_bumps_count() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let memory = create(conn, &sample_input("x"))?;
                let accessed = access(conn, memory.id)?;
                assert_eq!(accessed.access_count, 1);
                assert!(accessed.salience >= memory.salience);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn delete_missing_returns_not_found() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let err = delete(conn, 999).unwrap_err();
                assert_eq!(err.kind(), "not_found");
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn near_duplicate_detected_by_title_project_and_relevance() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let memory = create(conn, &sample_input("dup title"))?;
                let found = find_near_duplicate(
                    conn,
                    "dup title",
                    Some("demo"),
                    "We decided to use PostgreSQL for the schema",
                )?;
                assert_eq!(found, Some(memory.id));

                let wrong_project = find_near_duplicate(
                    conn,
                    "dup title",
                    Some("other"),
                    "We decided to use PostgreSQL for the schema",
                )?;
                assert_eq!(wrong_project, None);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn same_title_but_unrelated_content_is_not_a_duplicate() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                create(conn, &sample_input("weekly notes"))?;
                let found = find_near_duplicate(
                    conn,
                    "weekly notes",
                    Some("demo"),
                    "completely unrelated content about a different topic entirely",
                )?;
                assert_eq!(found, None);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn promote_bumps_salience_and_caps_at_one() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let mut input = sample_input("promote");
                input.importance = Some(0.95);
                let memory = create(conn, &input)?;
                promote(conn, memory.id)?;
                let promoted = get(conn, memory.id)?;
                assert_eq!(promoted.memory_type, MemoryType::LongTerm);
                assert!(promoted.salience <= 1.0);
                assert!(promoted.salience >= memory.salience);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn cleanup_decayed_removes_only_short_term_below_threshold() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let memory = create(conn, &sample_input("stale"))?;
                conn.execute(
                    "UPDATE memories SET decayed_score = 0.01 WHERE id = ?1",
                    params![memory.id],
                )?;
                let removed = cleanup_decayed(conn, DECAY_FLOOR)?;
                assert_eq!(removed, 1);
                assert!(get(conn, memory.id).is_err());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn links_lists_only_the_requested_project() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let a = create(conn, &sample_input("a"))?;
                let b = create(conn, &sample_input("b"))?;
                conn.execute(
                    "INSERT INTO memory_links (source_id, target_id, relationship, strength, created_at)
                     VALUES (?1, ?2, 'related', 0.5, ?3)",
                    params![a.id, b.id, Utc::now().to_rfc3339()],
                )?;
                let found = links(conn, Some("demo"), 10)?;
                assert_eq!(found.len(), 1);
                let none = links(conn, Some("other-project"), 10)?;
                assert!(none.is_empty());
                Ok(())
            })
            .unwrap();
    }
}
