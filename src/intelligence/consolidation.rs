//! Background consolidation: a light tick that keeps decay scores fresh
//! and a medium tick that promotes, links, and evicts.

use chrono::{Duration, Utc};
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::storage::queries;
use crate::types::{
    ConsolidationResult, DecayTickResult, MemoryId, CONSOLIDATION_THRESHOLD, DECAY_FLOOR,
    PREDICTIVE_ACCESS_THRESHOLD, PREDICTIVE_WINDOW_HOURS, RELATED_RELATIONSHIP,
};

/// How many of the least-recently-touched rows the light tick refreshes
/// per call, bounding its cost regardless of store size.
const LIGHT_TICK_BATCH: i64 = 500;

/// Recompute and persist decayed scores for a bounded window of rows.
/// Intended to run roughly every 60s (spec §4.7).
pub fn light_tick(conn: &Connection) -> Result<DecayTickResult> {
    let updated = queries::update_decay_scores(conn, LIGHT_TICK_BATCH)?;
    Ok(DecayTickResult { updated })
}

/// Promote salient short-term memories, discover tag/category overlap
/// links, and evict anything decayed past the floor. Intended to run
/// roughly every 5 minutes (spec §4.7), inside a single immediate
/// transaction so it serializes with concurrent writers.
pub fn medium_tick(conn: &Connection) -> Result<ConsolidationResult> {
    let mut result = ConsolidationResult::default();

    for candidate in queries::promotion_candidates(conn, CONSOLIDATION_THRESHOLD)? {
        queries::promote(conn, candidate.id)?;
        result.consolidated += 1;
    }

    result.consolidated += predictive_promote(conn)?;

    result.links_discovered = discover_links(conn)?;

    let decayed_count = queries::update_decay_scores(conn, i64::MAX)?;
    result.decayed = decayed_count;

    result.deleted = queries::cleanup_decayed(conn, DECAY_FLOOR)?;

    Ok(result)
}

/// Promote STM memories with at least [`PREDICTIVE_ACCESS_THRESHOLD`]
/// accesses in the past [`PREDICTIVE_WINDOW_HOURS`] hours ahead of their
/// normal salience-threshold promotion (spec §4.7 "predictive
/// consolidation"): repeated recent recall is itself a salience signal the
/// threshold check alone wouldn't catch before the next light tick.
fn predictive_promote(conn: &Connection) -> Result<i64> {
    let since = Utc::now() - Duration::hours(PREDICTIVE_WINDOW_HOURS);
    let mut promoted = 0i64;
    for candidate in queries::predictive_promotion_candidates(conn, PREDICTIVE_ACCESS_THRESHOLD, since)? {
        queries::promote(conn, candidate.id)?;
        promoted += 1;
    }
    Ok(promoted)
}

/// Find pairs of memories in the same project sharing a tag or category
/// that aren't already linked, and record a `related` edge between them.
/// Quadratic in the per-project memory count; a bounded recency window
/// keeps this affordable at the scale a local memory store reaches.
fn discover_links(conn: &Connection) -> Result<i64> {
    let mut stmt = conn.prepare(
        "SELECT id, project, category, tags FROM memories ORDER BY last_accessed DESC LIMIT 300",
    )?;
    let rows: Vec<(MemoryId, Option<String>, String, Vec<String>)> = stmt
        .query_map([], |row| {
            let tags: String = row.get(3)?;
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                serde_json::from_str(&tags).unwrap_or_default(),
            ))
        })?
        .filter_map(|r| r.ok())
        .collect();

    let mut discovered = 0i64;
    for i in 0..rows.len() {
        for j in (i + 1)..rows.len() {
            let (id_a, project_a, category_a, tags_a) = &rows[i];
            let (id_b, project_b, category_b, tags_b) = &rows[j];
            if project_a != project_b {
                continue;
            }
            let shares_category = category_a == category_b;
            let shares_tag = tags_a.iter().any(|t| tags_b.iter().any(|u| t.eq_ignore_ascii_case(u)));
            if !shares_category && !shares_tag {
                continue;
            }
            if link_exists(conn, *id_a, *id_b)? {
                continue;
            }
            create_link(conn, *id_a, *id_b, RELATED_RELATIONSHIP, 0.5)?;
            discovered += 1;
        }
    }
    Ok(discovered)
}

fn link_exists(conn: &Connection, source: MemoryId, target: MemoryId) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM memory_links WHERE
            (source_id = ?1 AND target_id = ?2) OR (source_id = ?2 AND target_id = ?1))",
        params![source, target],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn create_link(
    conn: &Connection,
    source: MemoryId,
    target: MemoryId,
    relationship: &str,
    strength: f32,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO memory_links (source_id, target_id, relationship, strength, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![source, target, relationship, strength, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}
