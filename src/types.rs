//! Core data model for the memory engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable numeric identity for a memory row.
pub type MemoryId = i64;
pub type EntityId = i64;

/// Content longer than this is truncated with a visible marker.
pub const MAX_CONTENT_BYTES: usize = 10 * 1024;
pub const TRUNCATION_MARKER: &str = "\n…[truncated]";

/// Decay floor: scores below this mark a memory eligible for eviction.
pub const DECAY_FLOOR: f32 = 0.1;
/// Salience at/above this promotes short_term → long_term on consolidation.
pub const CONSOLIDATION_THRESHOLD: f32 = 0.7;
/// Decay-band cutoffs for `stats().decay_distribution`: healthy above this,
/// fading between this and `DECAY_FADING_FLOOR`, critical below that.
pub const DECAY_HEALTHY_THRESHOLD: f32 = 0.7;
pub const DECAY_FADING_FLOOR: f32 = 0.4;
/// Salience increment applied on promotion to long_term, capped at 1.0.
pub const PROMOTION_SALIENCE_BUMP: f32 = 0.1;
/// Predictive consolidation: an STM memory accessed at least this many
/// times within `PREDICTIVE_WINDOW_HOURS` is promoted early.
pub const PREDICTIVE_ACCESS_THRESHOLD: i64 = 2;
pub const PREDICTIVE_WINDOW_HOURS: i64 = 24;

/// The primary record. STM is the default landing zone; LTM is the
/// consolidated tier; episodic is time-bound narrative context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: MemoryId,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub category: Category,
    pub title: String,
    pub content: String,
    /// `None` = cross-project.
    pub project: Option<String>,
    pub scope: Scope,
    pub transferable: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    pub salience: f32,
    pub decayed_score: f32,
    pub access_count: i64,
    pub last_accessed: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Absent until the embedder produces it. Unit-norm, length `D`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// STM is the default landing zone; LTM is the consolidated tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    #[default]
    ShortTerm,
    LongTerm,
    Episodic,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::ShortTerm => "short_term",
            MemoryType::LongTerm => "long_term",
            MemoryType::Episodic => "episodic",
        }
    }

    /// Per-hour decay rate `r` in `decayed(t) = salience * r^dh`.
    pub fn decay_rate(&self) -> f64 {
        match self {
            MemoryType::ShortTerm => 0.995,
            MemoryType::Episodic => 0.998,
            MemoryType::LongTerm => 0.9995,
        }
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "short_term" | "stm" => Ok(MemoryType::ShortTerm),
            "long_term" | "ltm" => Ok(MemoryType::LongTerm),
            "episodic" => Ok(MemoryType::Episodic),
            _ => Err(format!("unknown memory type: {s}")),
        }
    }
}

/// Fixed closed set of memory categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Architecture,
    Pattern,
    Preference,
    Error,
    Context,
    Learning,
    Todo,
    #[default]
    Note,
    Relationship,
    Custom,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Architecture => "architecture",
            Category::Pattern => "pattern",
            Category::Preference => "preference",
            Category::Error => "error",
            Category::Context => "context",
            Category::Learning => "learning",
            Category::Todo => "todo",
            Category::Note => "note",
            Category::Relationship => "relationship",
            Category::Custom => "custom",
        }
    }

    pub fn all() -> &'static [Category] {
        &[
            Category::Architecture,
            Category::Pattern,
            Category::Preference,
            Category::Error,
            Category::Context,
            Category::Learning,
            Category::Todo,
            Category::Note,
            Category::Relationship,
            Category::Custom,
        ]
    }

    /// Categories whose memories infer global scope by default.
    pub fn defaults_to_global(&self) -> bool {
        matches!(self, Category::Pattern | Category::Preference | Category::Learning)
    }
}

impl std::str::FromStr for Category {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "architecture" => Ok(Category::Architecture),
            "pattern" => Ok(Category::Pattern),
            "preference" => Ok(Category::Preference),
            "error" => Ok(Category::Error),
            "context" => Ok(Category::Context),
            "learning" => Ok(Category::Learning),
            "todo" => Ok(Category::Todo),
            "note" => Ok(Category::Note),
            "relationship" => Ok(Category::Relationship),
            "custom" => Ok(Category::Custom),
            _ => Err(format!("unknown category: {s}")),
        }
    }
}

/// Whether a memory is visible only under its owning project, or globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    Project,
    Global,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Project => "project",
            Scope::Global => "global",
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "project" => Ok(Scope::Project),
            "global" => Ok(Scope::Global),
            _ => Err(format!("unknown scope: {s}")),
        }
    }
}

/// Directed edge between two memories. `(source,target)` unique, `source != target`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryLink {
    pub id: i64,
    pub source_id: MemoryId,
    pub target_id: MemoryId,
    pub relationship: String,
    pub strength: f32,
    pub created_at: DateTime<Utc>,
}

/// A relationship label reserved for contradiction annotation (spec §4.5 step 5).
pub const CONTRADICTS_RELATIONSHIP: &str = "contradicts";
/// Relationship label used by consolidation's link-discovery pass.
pub const RELATED_RELATIONSHIP: &str = "related";

/// A named thing mentioned across memories. Names are case-preserving but
/// matched case-insensitively; aliases are append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub memory_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    System,
    Library,
    Person,
    #[default]
    Concept,
    Organization,
    Location,
    Other,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::System => "system",
            EntityType::Library => "library",
            EntityType::Person => "person",
            EntityType::Concept => "concept",
            EntityType::Organization => "organization",
            EntityType::Location => "location",
            EntityType::Other => "other",
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(EntityType::System),
            "library" => Ok(EntityType::Library),
            "person" => Ok(EntityType::Person),
            "concept" => Ok(EntityType::Concept),
            "organization" => Ok(EntityType::Organization),
            "location" => Ok(EntityType::Location),
            "other" => Ok(EntityType::Other),
            _ => Err(format!("unknown entity type: {s}")),
        }
    }
}

/// `(subject, predicate, object)`, provenance-tracked to a source memory.
/// Unique on the full tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Triple {
    pub id: i64,
    pub subject_id: EntityId,
    pub predicate: String,
    pub object_id: EntityId,
    pub source_memory_id: MemoryId,
}

/// Junction linking an entity mention back to its memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntity {
    pub memory_id: MemoryId,
    pub entity_id: EntityId,
    pub role: String,
}

/// Optional bookkeeping record for a work session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub project: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub memories_created: i64,
    pub memories_accessed: i64,
}

/// Entities/triple extracted from a memory's text, pre-resolution.
#[derive(Debug, Clone, Default)]
pub struct ExtractedEntity {
    pub name: String,
    pub entity_type: EntityType,
}

#[derive(Debug, Clone)]
pub struct ExtractedTriple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub entities: Vec<ExtractedEntity>,
    pub triples: Vec<ExtractedTriple>,
}

/// Input for `MemoryStore::add`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateMemoryInput {
    pub title: String,
    pub content: String,
    pub category: Option<Category>,
    #[serde(rename = "type")]
    pub memory_type: Option<MemoryType>,
    pub project: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Explicit salience override; if absent, computed from text.
    pub importance: Option<f32>,
    pub scope: Option<Scope>,
    pub transferable: Option<bool>,
}

/// Input for `MemoryStore::update`. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMemoryInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<Category>,
    #[serde(rename = "type")]
    pub memory_type: Option<MemoryType>,
    pub project: Option<String>,
    pub tags: Option<Vec<String>>,
    pub salience: Option<f32>,
    pub scope: Option<Scope>,
    pub transferable: Option<bool>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Query parameters for `HybridSearch::search`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    pub query: Option<String>,
    pub project: Option<String>,
    #[serde(rename = "type")]
    pub memory_type: Option<MemoryType>,
    pub category: Option<Category>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub min_salience: Option<f32>,
    #[serde(default)]
    pub include_decayed: bool,
    #[serde(default)]
    pub include_global: bool,
    pub limit: Option<i64>,
}

pub const DEFAULT_SEARCH_LIMIT: i64 = 10;

/// A contradiction annotation attached to a search result (spec §4.5 step 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub memory_id: MemoryId,
    pub title: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub memory: Memory,
    pub score: f32,
    pub fts_norm: f32,
    pub vector_similarity: f32,
    pub decayed_score: f32,
    pub priority: f32,
    pub tag_category_boost: f32,
    #[serde(default)]
    pub contradictions: Vec<Contradiction>,
}

/// Per-type/per-category/decay-band breakdown used by the stats projection.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemoryStats {
    pub total: i64,
    pub by_type: HashMap<String, i64>,
    pub by_category: HashMap<String, i64>,
    pub average_salience: f32,
    pub decay_distribution: DecayDistribution,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DecayDistribution {
    pub healthy: i64,
    pub fading: i64,
    pub critical: i64,
}

/// Result of one consolidation medium tick.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConsolidationResult {
    pub consolidated: i64,
    pub decayed: i64,
    pub deleted: i64,
    pub links_discovered: i64,
}

/// Result of one decay-persistor light tick.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DecayTickResult {
    pub updated: i64,
}

/// Storage engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: ":memory:".to_string(),
        }
    }
}

/// Database size guard thresholds (spec §4.1/§6).
pub const DB_SIZE_WARN_BYTES: i64 = 50 * 1024 * 1024;
pub const DB_SIZE_HARD_CAP_BYTES: i64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeInfo {
    pub bytes: i64,
    pub warn: bool,
    pub blocked: bool,
}

/// A single `suggestions` hit: prefix/substring match over titles,
/// categories, or projects, with its occurrence count (spec §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub value: String,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Title,
    Category,
    Project,
}
