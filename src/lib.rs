//! Cortex - persistent memory store for LLM coding assistants.
//!
//! Hybrid lexical+vector search over a single embedded SQLite file, biased
//! by a time-decayed salience score, with background consolidation and a
//! knowledge-graph side pipeline.

pub mod control;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod graph;
pub mod intelligence;
pub mod mcp;
pub mod realtime;
pub mod search;
pub mod storage;
pub mod types;

pub use engine::MemoryEngine;
pub use error::{CortexError, Result};
pub use storage::Storage;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
