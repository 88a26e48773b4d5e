//! Hybrid lexical+vector search: FTS5 candidate generation, linear signal
//! fusion, and contradiction annotation.

mod aggregation;
mod hybrid;

pub use aggregation::{fuse, ScoredSignal};
pub use hybrid::{search, search_blocking};
