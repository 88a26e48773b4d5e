//! Read-side projections over the store: stats, recency, importance, and
//! a compact "what do I know about this project" summary.

use rusqlite::Connection;

use crate::error::Result;
use crate::intelligence::content_utils::CompactMemory;
use crate::storage::queries;
use crate::types::{Category, Memory, MemoryStats, MemoryType};

pub fn stats(conn: &Connection, project: Option<&str>) -> Result<MemoryStats> {
    queries::stats(conn, project)
}

pub fn recent(conn: &Connection, project: Option<&str>, limit: i64) -> Result<Vec<Memory>> {
    queries::recent(conn, limit, project)
}

pub fn important(conn: &Connection, project: Option<&str>, limit: i64) -> Result<Vec<Memory>> {
    queries::high_priority(conn, limit, project)
}

pub fn by_category(conn: &Connection, category: Category, limit: i64) -> Result<Vec<Memory>> {
    Ok(queries::by_type(conn, MemoryType::LongTerm, limit)?
        .into_iter()
        .chain(queries::by_type(conn, MemoryType::ShortTerm, limit)?)
        .chain(queries::by_type(conn, MemoryType::Episodic, limit)?)
        .filter(|m| m.category == category)
        .take(limit.max(0) as usize)
        .collect())
}

/// A short, human-readable digest of what's known about a project: the
/// top few memories by priority plus the stats breakdown, the shape
/// `get_context` hands back to a caller who just switched projects.
#[derive(serde::Serialize)]
pub struct ContextSummary {
    pub project: Option<String>,
    pub top_memories: Vec<CompactMemory>,
    pub stats: MemoryStats,
}

pub fn context_summary(conn: &Connection, project: Option<&str>, top_n: i64) -> Result<ContextSummary> {
    let top_memories = queries::high_priority(conn, top_n, project)?
        .iter()
        .map(|m| CompactMemory::from_memory(m, 160))
        .collect();
    Ok(ContextSummary {
        project: project.map(str::to_string),
        top_memories,
        stats: queries::stats(conn, project)?,
    })
}

/// Renders a [`ContextSummary`] as Markdown grouped by category (spec
/// §4.10: `context_summary` "formats the top-N memories as grouped
/// Markdown for client injection").
pub fn context_markdown(summary: &ContextSummary) -> String {
    use std::collections::BTreeMap;

    let mut out = String::new();
    out.push_str(&format!(
        "# Context: {}\n\n{} memories total, average salience {:.2}\n",
        summary.project.as_deref().unwrap_or("(global)"),
        summary.stats.total,
        summary.stats.average_salience
    ));

    let mut by_category: BTreeMap<String, Vec<&CompactMemory>> = BTreeMap::new();
    for memory in &summary.top_memories {
        by_category.entry(memory.category.clone()).or_default().push(memory);
    }

    for (category, memories) in by_category {
        out.push_str(&format!("\n## {category}\n"));
        for memory in memories {
            out.push_str(&format!("- {}\n", memory.preview));
        }
    }
    out
}

/// `suggestions(q, limit)` (spec §4.10): prefix/substring matches over
/// titles, categories, and projects, each with a hit count.
pub fn suggestions(conn: &Connection, q: &str, limit: i64) -> Result<Vec<crate::types::Suggestion>> {
    queries::suggestions(conn, q, limit)
}

/// Nudges toward consolidation or cleanup based on the current decay
/// distribution, rather than leaving the store to silently bloat.
pub fn consolidation_hints(stats: &MemoryStats) -> Vec<String> {
    let mut out = Vec::new();
    if stats.decay_distribution.critical > 0 {
        out.push(format!(
            "{} memories have decayed past the eviction floor; consolidation will clean these up on its next tick",
            stats.decay_distribution.critical
        ));
    }
    if stats.total > 0 && stats.average_salience < 0.3 {
        out.push("average salience is low; most stored memories may be noise".to_string());
    }
    out
}
