//! Bounded embedding work queue with drop-oldest backpressure (spec §9).
//!
//! `add()` publishes a job `{memory_id, text}`; one or more workers
//! consume, compute, and `UPDATE memories SET embedding=? WHERE id=?`.
//! Stale jobs are harmless — the latest insert for a given id wins.

use async_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use super::{Embedder, EmbeddingCache};
use crate::error::Result;
use crate::types::MemoryId;

/// Hash the (truncated) content a job was queued with, so repeated or
/// templated text reuses a cached embedding instead of re-encoding.
fn content_key(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Queue capacity; once exceeded, the oldest queued job is dropped to make
/// room for the new one rather than blocking the writer.
pub const QUEUE_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
pub struct EmbeddingRequest {
    pub memory_id: MemoryId,
    pub content: String,
}

pub struct EmbeddingQueue {
    sender: Sender<EmbeddingRequest>,
    receiver: Receiver<EmbeddingRequest>,
}

impl EmbeddingQueue {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(QUEUE_CAPACITY);
        Self { sender, receiver }
    }

    /// Enqueue a job, dropping the oldest queued job first if the queue is
    /// full (drop-oldest overflow policy).
    pub fn enqueue(&self, memory_id: MemoryId, content: String) {
        let request = EmbeddingRequest { memory_id, content };
        match self.sender.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(request)) => {
                let _ = self.receiver.try_recv();
                if self.sender.try_send(request).is_err() {
                    tracing::warn!(memory_id, "embedding queue full, dropping job");
                }
            }
            Err(TrySendError::Closed(_)) => {
                tracing::error!("embedding queue closed");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    fn receiver(&self) -> Receiver<EmbeddingRequest> {
        self.receiver.clone()
    }
}

impl Default for EmbeddingQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EmbeddingQueue {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
        }
    }
}

/// Background worker draining the queue and writing embeddings back.
pub struct EmbeddingWorker {
    embedder: Arc<dyn Embedder>,
    queue: EmbeddingQueue,
    conn: Arc<Mutex<Connection>>,
    batch_size: usize,
    batch_timeout: Duration,
    cache: EmbeddingCache,
}

impl EmbeddingWorker {
    pub fn new(embedder: Arc<dyn Embedder>, queue: EmbeddingQueue, conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            embedder,
            queue,
            conn,
            batch_size: 32,
            batch_timeout: Duration::from_secs(5),
            cache: EmbeddingCache::default_capacity(),
        }
    }

    /// Cache hit/miss counters, exposed for `/api/stats`-style introspection.
    pub fn cache_stats(&self) -> super::EmbeddingCacheStats {
        self.cache.stats()
    }

    /// Drive the queue until cancelled. A cancelled/failed job simply
    /// leaves `embedding` NULL; the next insert for that id will retry.
    pub async fn run(&self) {
        let receiver = self.queue.receiver();
        let mut batch: Vec<EmbeddingRequest> = Vec::with_capacity(self.batch_size);
        let mut ticker = interval(self.batch_timeout);

        loop {
            tokio::select! {
                Ok(request) = receiver.recv() => {
                    batch.push(request);
                    if batch.len() >= self.batch_size {
                        self.process_batch(&mut batch);
                    }
                }
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.process_batch(&mut batch);
                    }
                }
            }
        }
    }

    fn process_batch(&self, batch: &mut Vec<EmbeddingRequest>) {
        if batch.is_empty() {
            return;
        }
        let truncated: Vec<&str> = batch
            .iter()
            .map(|r| super::truncate_for_embedding(&r.content))
            .collect();
        let keys: Vec<String> = truncated.iter().map(|c| content_key(c)).collect();

        let mut embeddings: Vec<Option<Arc<[f32]>>> = keys.iter().map(|k| self.cache.get(k)).collect();
        let misses: Vec<usize> = embeddings
            .iter()
            .enumerate()
            .filter_map(|(i, e)| if e.is_none() { Some(i) } else { None })
            .collect();

        if !misses.is_empty() {
            let miss_contents: Vec<&str> = misses.iter().map(|&i| truncated[i]).collect();
            match self.embedder.embed_batch(&miss_contents) {
                Ok(computed) => {
                    for (&i, embedding) in misses.iter().zip(computed.into_iter()) {
                        self.cache.put(keys[i].clone(), embedding.clone());
                        embeddings[i] = Some(embedding.into());
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "embedding batch failed, jobs left unembedded for retry");
                }
            }
        }

        let conn = self.conn.lock();
        for (request, embedding) in batch.iter().zip(embeddings.iter()) {
            let Some(embedding) = embedding else { continue };
            if let Err(e) = store_embedding(&conn, request.memory_id, embedding) {
                tracing::warn!(memory_id = request.memory_id, error = %e, "failed to persist embedding");
            }
        }
        tracing::info!(count = batch.len(), misses = misses.len(), "processed embedding batch");
        batch.clear();
    }
}

fn encode(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
            .collect(),
    )
}

pub fn store_embedding(conn: &Connection, memory_id: MemoryId, embedding: &[f32]) -> Result<()> {
    conn.execute(
        "UPDATE memories SET embedding = ?1 WHERE id = ?2",
        params![encode(embedding), memory_id],
    )?;
    Ok(())
}

pub fn get_embedding(conn: &Connection, memory_id: MemoryId) -> Result<Option<Vec<f32>>> {
    let bytes: Option<Vec<u8>> = conn.query_row(
        "SELECT embedding FROM memories WHERE id = ?1",
        params![memory_id],
        |row| row.get(0),
    )?;
    Ok(bytes.and_then(|b| decode(&b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_reports_length() {
        let queue = EmbeddingQueue::new();
        queue.enqueue(1, "hello".to_string());
        queue.enqueue(2, "world".to_string());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn store_and_get_embedding_roundtrip() {
        let conn = Connection::open_in_memory().unwrap();
        crate::storage::migrations::run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO memories (type, category, title, content, tags, salience, last_accessed, created_at, scope, decayed_score) \
             VALUES ('short_term','note','t','c','[]',0.5,'2024-01-01','2024-01-01','project',0.5)",
            [],
        )
        .unwrap();
        let id = conn.last_insert_rowid();
        store_embedding(&conn, id, &[1.0, 2.0, 3.0]).unwrap();
        let got = get_embedding(&conn, id).unwrap().unwrap();
        assert_eq!(got, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn get_embedding_absent_returns_none() {
        let conn = Connection::open_in_memory().unwrap();
        crate::storage::migrations::run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO memories (type, category, title, content, tags, salience, last_accessed, created_at, scope, decayed_score) \
             VALUES ('short_term','note','t','c','[]',0.5,'2024-01-01','2024-01-01','project',0.5)",
            [],
        )
        .unwrap();
        let id = conn.last_insert_rowid();
        assert!(get_embedding(&conn, id).unwrap().is_none());
    }
}
