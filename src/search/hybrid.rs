//! Hybrid search (spec §4.5): FTS candidate generation, an optional vector
//! pass, linear score fusion, contradiction annotation, and a deterministic
//! tie-break sort.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, Connection};

use super::aggregation::{fuse, ScoredSignal};
use crate::embedding::{self, Embedder};
use crate::error::Result;
use crate::intelligence::salience;
use crate::storage::filter::MemoryFilter;
use crate::storage::queries;
use crate::types::{
    Contradiction, Memory, MemoryId, SearchOptions, SearchResult, CONTRADICTS_RELATIONSHIP,
    DECAY_FLOOR, DEFAULT_SEARCH_LIMIT,
};

const FUSION_FTS_WEIGHT: f32 = 0.30;
const FUSION_VECTOR_WEIGHT: f32 = 0.30;
const FUSION_DECAY_WEIGHT: f32 = 0.25;
const FUSION_PRIORITY_WEIGHT: f32 = 0.10;
const FUSION_TAG_CATEGORY_WEIGHT: f32 = 0.05;

/// Escape FTS5 operator characters by quoting each token individually
/// (spec §4.5 step 1 / boundary behavior: `"foo-bar"` must never raise a
/// parser error).
fn escape_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| {
            let cleaned: String = token.chars().filter(|c| *c != '"').collect();
            format!("\"{cleaned}\"*")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

struct Candidate {
    memory: Memory,
    fts_norm: f32,
}

fn fts_candidates(conn: &Connection, query: &str, fetch: i64) -> Result<Vec<Candidate>> {
    let escaped = escape_fts_query(query);
    if escaped.is_empty() {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(
        "SELECT rowid, bm25(memories_fts) AS rank FROM memories_fts
         WHERE memories_fts MATCH ?1 ORDER BY rank LIMIT ?2",
    )?;
    let rows: Vec<(MemoryId, f64)> = stmt
        .query_map(params![escaped, fetch], |row| Ok((row.get(0)?, row.get(1)?)))?
        .filter_map(|r| r.ok())
        .collect();

    let mut out = Vec::with_capacity(rows.len());
    for (id, rank) in rows {
        let memory = queries::get(conn, id)?;
        out.push(Candidate {
            memory,
            fts_norm: ((rank.abs() / 100.0) as f32).clamp(0.0, 1.0),
        });
    }
    Ok(out)
}

fn unfiltered_candidates(conn: &Connection, fetch: i64) -> Result<Vec<Candidate>> {
    let mut stmt =
        conn.prepare("SELECT id FROM memories ORDER BY salience DESC, last_accessed DESC LIMIT ?1")?;
    let ids: Vec<MemoryId> = stmt
        .query_map(params![fetch], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        out.push(Candidate {
            memory: queries::get(conn, id)?,
            fts_norm: 0.0,
        });
    }
    Ok(out)
}

fn tag_category_boost(memory: &Memory, options: &SearchOptions) -> f32 {
    let mut boost = 0.0;
    if let Some(category) = options.category {
        if memory.category == category {
            boost += 0.5;
        }
    }
    if !options.tags.is_empty() {
        let hits = options
            .tags
            .iter()
            .filter(|t| memory.tags.iter().any(|mt| mt.eq_ignore_ascii_case(t)))
            .count();
        boost += hits as f32 / options.tags.len() as f32;
    }
    boost.clamp(0.0, 1.0)
}

fn contradictions_for(conn: &Connection, memory_id: MemoryId) -> Result<Vec<Contradiction>> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.title, l.strength FROM memory_links l
         JOIN memories m ON m.id = (CASE WHEN l.source_id = ?1 THEN l.target_id ELSE l.source_id END)
         WHERE l.relationship = ?2 AND (l.source_id = ?1 OR l.target_id = ?1)",
    )?;
    let rows = stmt
        .query_map(params![memory_id, CONTRADICTS_RELATIONSHIP], |row| {
            Ok(Contradiction {
                memory_id: row.get(0)?,
                title: row.get(1)?,
                score: row.get(2)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// `search(options) -> [SearchResult]` (spec §4.5). Resolves the embedder
/// singleton (the only actual async step) before doing any connection
/// work, then hands off to the synchronous core — so a caller already
/// holding the storage lock on a blocking thread can call
/// [`search_blocking`] directly instead of driving this future there.
/// Degrades to FTS+decay-only when no embedder is available, never
/// erroring the caller.
pub async fn search(conn: &Connection, options: &SearchOptions) -> Result<Vec<SearchResult>> {
    let has_query = options.query.as_deref().is_some_and(|q| !q.trim().is_empty());
    let embedder = if has_query { embedding::pipeline().await } else { None };
    search_blocking(conn, options, embedder)
}

/// Synchronous core of [`search`], taking an already-resolved embedder.
/// Safe to call from a `spawn_blocking` task or any other non-async
/// context that already has a connection in hand.
pub fn search_blocking(
    conn: &Connection,
    options: &SearchOptions,
    embedder: Option<Arc<dyn Embedder>>,
) -> Result<Vec<SearchResult>> {
    let limit = options.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).max(1);
    let fetch = (limit * 3).max(60);

    let has_query = options.query.as_deref().is_some_and(|q| !q.trim().is_empty());
    let candidates = if has_query {
        fts_candidates(conn, options.query.as_deref().unwrap(), fetch)?
    } else {
        unfiltered_candidates(conn, fetch)?
    };

    let filter = MemoryFilter {
        project: options.project.clone(),
        category: options.category,
        memory_type: options.memory_type,
        min_salience: options.min_salience,
        tags_any: options.tags.clone(),
        include_global: options.include_global,
    };

    let query_vector = if has_query {
        match embedder {
            Some(embedder) => Some(embedder.embed(options.query.as_deref().unwrap())?),
            None => {
                tracing::warn!("embedder unavailable, degrading to FTS+decay-only search");
                None
            }
        }
    } else {
        None
    };

    let now = Utc::now();
    let mut results: Vec<SearchResult> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let memory = candidate.memory;
        let decayed = salience::decayed_score(memory.salience, memory.memory_type, memory.last_accessed, now);

        if !filter.matches(&memory) {
            continue;
        }
        if !options.include_decayed && decayed < DECAY_FLOOR {
            continue;
        }

        let vector_similarity = match (&query_vector, &memory.embedding) {
            (Some(qv), Some(mv)) => embedding::cosine_similarity(qv, mv),
            _ => 0.0,
        };
        if query_vector.is_some() && memory.embedding.is_some() && vector_similarity < 0.3 {
            continue;
        }

        let priority = salience::priority(&memory, now);
        let boost = tag_category_boost(&memory, options);

        let score = fuse(&[
            ScoredSignal::new("fts", FUSION_FTS_WEIGHT, candidate.fts_norm),
            ScoredSignal::new("vector", FUSION_VECTOR_WEIGHT, vector_similarity),
            ScoredSignal::new("decay", FUSION_DECAY_WEIGHT, decayed),
            ScoredSignal::new("priority", FUSION_PRIORITY_WEIGHT, priority),
            ScoredSignal::new("tag_category", FUSION_TAG_CATEGORY_WEIGHT, boost),
        ]);

        let contradictions = contradictions_for(conn, memory.id)?;

        results.push(SearchResult {
            score,
            fts_norm: candidate.fts_norm,
            vector_similarity,
            decayed_score: decayed,
            priority,
            tag_category_boost: boost,
            contradictions,
            memory,
        });
    }

    // Deterministic tie-break: score desc, salience desc, last_accessed desc, id asc.
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.memory
                    .salience
                    .partial_cmp(&a.memory.salience)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| b.memory.last_accessed.cmp(&a.memory.last_accessed))
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });
    results.truncate(limit as usize);
    Ok(results)
}
