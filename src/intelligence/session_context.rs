//! Minimal work-session bookkeeping: start, bump counters, end.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{CortexError, Result};
use crate::types::Session;

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn session_from_row(row: &Row) -> rusqlite::Result<Session> {
    let started_at: String = row.get("started_at")?;
    let ended_at: Option<String> = row.get("ended_at")?;
    Ok(Session {
        id: row.get("id")?,
        project: row.get("project")?,
        started_at: parse_dt(&started_at),
        ended_at: ended_at.map(|s| parse_dt(&s)),
        summary: row.get("summary")?,
        memories_created: row.get("memories_created")?,
        memories_accessed: row.get("memories_accessed")?,
    })
}

pub fn start_session(conn: &Connection, project: Option<&str>) -> Result<Session> {
    conn.execute(
        "INSERT INTO sessions (project, started_at, memories_created, memories_accessed)
         VALUES (?1, ?2, 0, 0)",
        params![project, Utc::now().to_rfc3339()],
    )?;
    get_session(conn, conn.last_insert_rowid())
}

pub fn get_session(conn: &Connection, id: i64) -> Result<Session> {
    conn.query_row(
        "SELECT * FROM sessions WHERE id = ?1",
        params![id],
        session_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => CortexError::NotFound(id),
        other => CortexError::from(other),
    })
}

pub fn record_memory_created(conn: &Connection, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET memories_created = memories_created + 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

pub fn record_memory_accessed(conn: &Connection, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET memories_accessed = memories_accessed + 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

pub fn end_session(conn: &Connection, id: i64, summary: Option<&str>) -> Result<Session> {
    conn.execute(
        "UPDATE sessions SET ended_at = ?1, summary = COALESCE(?2, summary) WHERE id = ?3",
        params![Utc::now().to_rfc3339(), summary, id],
    )?;
    get_session(conn, id)
}

pub fn active_session_for_project(conn: &Connection, project: Option<&str>) -> Result<Option<Session>> {
    let row = conn
        .query_row(
            "SELECT * FROM sessions WHERE project IS ?1 AND ended_at IS NULL
             ORDER BY started_at DESC LIMIT 1",
            params![project],
            session_from_row,
        )
        .optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    #[test]
    fn start_and_end_session_roundtrip() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let session = start_session(conn, Some("demo"))?;
                assert!(session.ended_at.is_none());
                record_memory_created(conn, session.id)?;
                let ended = end_session(conn, session.id, Some("wrapped up"))?;
                assert!(ended.ended_at.is_some());
                assert_eq!(ended.memories_created, 1);
                assert_eq!(ended.summary.as_deref(), Some("wrapped up"));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn active_session_excludes_ended() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let session = start_session(conn, Some("demo"))?;
                end_session(conn, session.id, None)?;
                assert!(active_session_for_project(conn, Some("demo"))?.is_none());
                Ok(())
            })
            .unwrap();
    }
}
