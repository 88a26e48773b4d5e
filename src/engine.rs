//! The engine value spec §9 calls for: one process-wide owner of the
//! connection, the event bus, the embedding queue, and control state, so
//! tests can instantiate independent engines against temp databases
//! instead of reaching for global statics.

use parking_lot::Mutex;

use crate::control::ControlState;
use crate::embedding::EmbeddingQueue;
use crate::error::{CortexError, Result};
use crate::intelligence::{consolidation, entities, session_context};
use crate::realtime::{RealtimeEvent, RealtimeManager};
use crate::storage::{entity_queries, queries, Storage};
use crate::types::{
    ConsolidationResult, CreateMemoryInput, DecayTickResult, Memory, MemoryId, Session,
    UpdateMemoryInput,
};

pub struct MemoryEngine {
    pub storage: Storage,
    pub control: ControlState,
    pub events: RealtimeManager,
    pub embedding_queue: EmbeddingQueue,
    active_session: Mutex<Option<i64>>,
}

impl MemoryEngine {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            control: ControlState::new(),
            events: RealtimeManager::new(),
            embedding_queue: EmbeddingQueue::new(),
            active_session: Mutex::new(None),
        }
    }

    /// Start a work session for `project` (spec.md data model's optional
    /// session bookkeeping). Subsequent `add`/`access` calls bump its
    /// counters until `end_session` is called or a new session replaces it.
    pub fn start_session(&self, project: Option<&str>) -> Result<Session> {
        let session = self.storage.with_connection(|conn| session_context::start_session(conn, project))?;
        *self.active_session.lock() = Some(session.id);
        Ok(session)
    }

    /// Close the active session, if any, recording `summary`.
    pub fn end_session(&self, summary: Option<&str>) -> Result<Option<Session>> {
        let id = self.active_session.lock().take();
        match id {
            Some(id) => {
                let session = self.storage.with_connection(|conn| session_context::end_session(conn, id, summary))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// `add()` per spec §4.4: dedup on title+project, infer fields, insert,
    /// publish `memory_created`, enqueue embedding + KG extraction.
    pub fn add(&self, input: CreateMemoryInput) -> Result<Memory> {
        if self.control.is_paused() {
            return Err(CortexError::Paused);
        }
        self.storage.check_capacity()?;

        let session_id = *self.active_session.lock();
        let memory = self.storage.with_transaction(|conn| {
            if let Some(existing_id) =
                queries::find_near_duplicate(conn, &input.title, input.project.as_deref(), &input.content)?
            {
                return queries::get(conn, existing_id);
            }
            let created = queries::create(conn, &input)?;
            if let Some(session_id) = session_id {
                session_context::record_memory_created(conn, session_id)?;
            }
            Ok(created)
        })?;

        self.embedding_queue.enqueue(memory.id, memory.content.clone());
        self.extract_knowledge(&memory)?;
        self.events.publish(RealtimeEvent::memory_created(memory.id, &memory.content));
        Ok(memory)
    }

    pub fn get(&self, id: MemoryId) -> Result<Memory> {
        self.storage.with_connection(|conn| queries::get(conn, id))
    }

    pub fn update(&self, id: MemoryId, input: UpdateMemoryInput) -> Result<Memory> {
        if self.control.is_paused() {
            return Err(CortexError::Paused);
        }
        let changed = changed_fields(&input);
        let memory = self.storage.with_transaction(|conn| queries::update(conn, id, &input))?;
        self.embedding_queue.enqueue(memory.id, memory.content.clone());
        self.extract_knowledge(&memory)?;
        self.events.publish(RealtimeEvent::memory_updated(id, &changed));
        Ok(memory)
    }

    pub fn delete(&self, id: MemoryId) -> Result<()> {
        if self.control.is_paused() {
            return Err(CortexError::Paused);
        }
        self.storage.with_transaction(|conn| queries::delete(conn, id))?;
        self.events.publish(RealtimeEvent::memory_deleted(id));
        Ok(())
    }

    /// `access()` per spec §4.4: increments count, bumps `last_accessed`,
    /// reinforces salience, all inside one transaction, then publishes.
    pub fn access(&self, id: MemoryId) -> Result<Memory> {
        let session_id = *self.active_session.lock();
        let memory = self.storage.with_transaction(|conn| {
            let memory = queries::access(conn, id)?;
            if let Some(session_id) = session_id {
                session_context::record_memory_accessed(conn, session_id)?;
            }
            Ok(memory)
        })?;
        self.events.publish(RealtimeEvent::memory_accessed(id, memory.salience));
        Ok(memory)
    }

    /// Pattern-based extraction runs synchronously after every insert/update
    /// (spec §4.6) — it's regex work, not a model call, so unlike embedding
    /// it doesn't need the async queue. Entities are resolved first so their
    /// ids are on hand to resolve the co-occurrence triples against.
    fn extract_knowledge(&self, memory: &Memory) -> Result<()> {
        let extracted = entities::extract_with_relations(&format!("{} {}", memory.title, memory.content));
        if extracted.entities.is_empty() {
            return Ok(());
        }
        self.storage.with_transaction(|conn| {
            let mut ids: std::collections::HashMap<String, crate::types::EntityId> =
                std::collections::HashMap::new();
            for entity in &extracted.entities {
                let entity_id = entity_queries::resolve_entity(conn, &entity.name, entity.entity_type)?;
                entity_queries::link_entity_to_memory(conn, memory.id, entity_id, "mention")?;
                ids.insert(entity.name.trim().to_lowercase(), entity_id);
            }
            for triple in &extracted.triples {
                let subject_id = ids.get(&triple.subject.trim().to_lowercase());
                let object_id = ids.get(&triple.object.trim().to_lowercase());
                if let (Some(&subject_id), Some(&object_id)) = (subject_id, object_id) {
                    entity_queries::add_triple(conn, subject_id, &triple.predicate, object_id, memory.id)?;
                }
            }
            Ok(())
        })
    }

    pub fn light_tick(&self) -> Result<DecayTickResult> {
        let result = self.storage.with_connection(consolidation::light_tick)?;
        self.events.publish(RealtimeEvent::decay_tick(&result));
        Ok(result)
    }

    pub fn medium_tick(&self) -> Result<ConsolidationResult> {
        if self.control.is_paused() {
            return Err(CortexError::Paused);
        }
        let result = self.storage.with_immediate_transaction(consolidation::medium_tick)?;
        self.events.publish(RealtimeEvent::consolidation_complete(&result));
        Ok(result)
    }
}

fn changed_fields(input: &UpdateMemoryInput) -> Vec<&'static str> {
    let mut out = Vec::new();
    if input.title.is_some() {
        out.push("title");
    }
    if input.content.is_some() {
        out.push("content");
    }
    if input.category.is_some() {
        out.push("category");
    }
    if input.memory_type.is_some() {
        out.push("type");
    }
    if input.project.is_some() {
        out.push("project");
    }
    if input.tags.is_some() {
        out.push("tags");
    }
    if input.salience.is_some() {
        out.push("salience");
    }
    if input.scope.is_some() {
        out.push("scope");
    }
    if input.transferable.is_some() {
        out.push("transferable");
    }
    if input.metadata.is_some() {
        out.push("metadata");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(title: &str) -> CreateMemoryInput {
        CreateMemoryInput {
            title: title.to_string(),
            content: "We decided to use PostgreSQL for the schema".to_string(),
            project: Some("demo".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn add_twice_returns_same_id_and_leaves_access_count_at_zero() {
        let engine = MemoryEngine::new(Storage::open_in_memory().unwrap());
        let first = engine.add(sample("Use PostgreSQL")).unwrap();
        let second = engine.add(sample("Use PostgreSQL")).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.access_count, 0);
    }

    #[test]
    fn access_publishes_event_and_reinforces() {
        let engine = MemoryEngine::new(Storage::open_in_memory().unwrap());
        let mut rx = engine.events.subscribe();
        let memory = engine.add(sample("x")).unwrap();
        let accessed = engine.access(memory.id).unwrap();
        assert_eq!(accessed.access_count, 1);
        assert!(accessed.salience >= memory.salience);
        // drain: memory_created then memory_accessed
        let _ = rx.try_recv();
        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, crate::realtime::EventKind::MemoryAccessed);
    }

    #[test]
    fn paused_engine_refuses_add() {
        let engine = MemoryEngine::new(Storage::open_in_memory().unwrap());
        engine.control.pause();
        let err = engine.add(sample("x")).unwrap_err();
        assert_eq!(err.kind(), "paused");
    }

    #[test]
    fn active_session_counters_bump_on_add_and_access() {
        let engine = MemoryEngine::new(Storage::open_in_memory().unwrap());
        let session = engine.start_session(Some("demo")).unwrap();
        let memory = engine.add(sample("tracked")).unwrap();
        engine.access(memory.id).unwrap();

        let ended = engine.end_session(Some("done")).unwrap().unwrap();
        assert_eq!(ended.id, session.id);
        assert_eq!(ended.memories_created, 1);
        assert_eq!(ended.memories_accessed, 1);
        assert!(ended.ended_at.is_some());

        assert!(engine.end_session(None).unwrap().is_none());
    }

    #[test]
    fn add_extracts_known_entities() {
        let engine = MemoryEngine::new(Storage::open_in_memory().unwrap());
        let memory = engine
            .add(CreateMemoryInput {
                title: "Rust decision".into(),
                content: "We decided to use Rust and PostgreSQL together".into(),
                project: Some("demo".into()),
                ..Default::default()
            })
            .unwrap();
        let entities = engine
            .storage
            .with_connection(|conn| entity_queries::entities_for_memory(conn, memory.id))
            .unwrap();
        assert!(!entities.is_empty());
    }

    #[test]
    fn add_persists_a_triple_between_co_mentioned_entities() {
        let engine = MemoryEngine::new(Storage::open_in_memory().unwrap());
        let memory = engine
            .add(CreateMemoryInput {
                title: "Cache backend".into(),
                content: "PostgreSQL depends on Redis for caching.".into(),
                project: Some("demo".into()),
                ..Default::default()
            })
            .unwrap();
        let entities = engine
            .storage
            .with_connection(|conn| entity_queries::entities_for_memory(conn, memory.id))
            .unwrap();
        let postgres_id = entities
            .iter()
            .find(|(e, _)| e.name.eq_ignore_ascii_case("postgresql"))
            .unwrap()
            .0
            .id;
        let triples = engine
            .storage
            .with_connection(|conn| entity_queries::triples_for_entity(conn, postgres_id))
            .unwrap();
        assert!(
            triples.iter().any(|t| t.predicate == "depends_on"),
            "expected a depends_on triple, got {:?}",
            triples
        );
    }
}
