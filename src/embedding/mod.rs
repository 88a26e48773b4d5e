//! Lazily-initialized text→vector pipeline and cosine similarity (spec §4.2).
//!
//! The model is treated as a black box upstream of this crate; only the
//! local reference encoder (hashed TF-IDF) ships here. Concurrent first
//! callers coalesce onto a single load future via `tokio::sync::OnceCell`.

mod cache;
mod queue;
mod tfidf;

pub use cache::{EmbeddingCache, EmbeddingCacheStats};
pub use queue::{EmbeddingQueue, EmbeddingRequest, EmbeddingWorker};
pub use tfidf::TfIdfEmbedder;

use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::Result;

/// Reference dimensionality (spec §4.2).
pub const EMBEDDING_DIMENSIONS: usize = 384;
/// Inputs longer than this are truncated before encoding.
pub const MAX_EMBED_INPUT_BYTES: usize = 2 * 1024;

pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize;
    fn model_name(&self) -> &str;
}

/// Truncate oversized input before encoding (spec §4.2).
pub fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_INPUT_BYTES {
        return text;
    }
    let mut end = MAX_EMBED_INPUT_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

static PIPELINE: OnceCell<Arc<dyn Embedder>> = OnceCell::const_new();

/// Lazy-initialized singleton embedder. First caller's init future is
/// awaited by every concurrent caller (single-flight); failure to load is
/// never a crash — callers observe `None` and fall back to FTS-only.
pub async fn pipeline() -> Option<Arc<dyn Embedder>> {
    PIPELINE
        .get_or_try_init(|| async {
            Ok::<_, ()>(Arc::new(TfIdfEmbedder::new(EMBEDDING_DIMENSIONS)) as Arc<dyn Embedder>)
        })
        .await
        .ok()
        .cloned()
}

/// Cosine similarity, clamped to `[0,1]` for ranking (spec §4.2).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}
