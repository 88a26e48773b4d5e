//! Pattern-based entity extraction: people, organizations, libraries and
//! systems, and known technical concepts. Fast, dependency-free NER good
//! enough to seed the knowledge graph without an LLM round-trip.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::types::{EntityType, ExtractedEntity, ExtractedTriple, ExtractionResult};

static PERSON_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        @[\w-]+
        |(?:Mr\.|Mrs\.|Ms\.|Dr\.|Prof\.)\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?
        |[A-Z][a-z]+\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?
        ",
    )
    .unwrap()
});

static ORG_SUFFIX_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[A-Z][A-Za-z]*(?:\s+[A-Z][A-Za-z]*)*\s+(?:Inc\.?|Corp\.?|LLC|Ltd\.?|Co\.?|Labs?)",
    )
    .unwrap()
});

static SYSTEM_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        \b[a-z][a-z0-9]*(?:-[a-z0-9]+)+\b
        |\b[a-z][a-z0-9]*(?:_[a-z0-9]+)+\b
        |\b[A-Z][a-z]+(?:[A-Z][a-z]+)+\b
        ",
    )
    .unwrap()
});

static KNOWN_ORGANIZATIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "anthropic", "openai", "google", "microsoft", "meta", "amazon", "apple", "github",
        "gitlab", "vercel", "cloudflare", "stripe", "supabase", "neon", "planetscale",
    ]
    .into_iter()
    .collect()
});

static KNOWN_SYSTEMS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "postgresql", "postgres", "sqlite", "mongodb", "redis", "kubernetes", "docker", "aws",
        "azure", "gcp",
    ]
    .into_iter()
    .collect()
});

static KNOWN_CONCEPTS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "machine learning",
        "deep learning",
        "neural network",
        "transformer",
        "embedding",
        "vector database",
        "semantic search",
        "rag",
        "llm",
        "microservices",
        "ci/cd",
        "devops",
        "authentication",
        "authorization",
        "oauth",
        "jwt",
    ]
    .into_iter()
    .collect()
});

static RELATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(depends on|integrates with|runs on|built with|relies on|migrated to|connects to|replaced|uses)\b",
    )
    .unwrap()
});

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Extract candidate entities from free text, deduplicated by normalized
/// name + type. Confidence is not modeled here; resolution happens
/// purely on name/type match (see `storage::entity_queries::resolve_entity`).
pub fn extract(text: &str) -> Vec<ExtractedEntity> {
    let mut seen: HashSet<(String, EntityType)> = HashSet::new();
    let mut out = Vec::new();
    let text_lower = text.to_lowercase();

    let mut push = |name: &str, entity_type: EntityType, out: &mut Vec<ExtractedEntity>| {
        let key = (normalize(name), entity_type);
        if seen.insert(key) {
            out.push(ExtractedEntity {
                name: name.to_string(),
                entity_type,
            });
        }
    };

    for cap in PERSON_PATTERN.find_iter(text) {
        push(cap.as_str(), EntityType::Person, &mut out);
    }

    for cap in ORG_SUFFIX_PATTERN.find_iter(text) {
        push(cap.as_str(), EntityType::Organization, &mut out);
    }
    for org in KNOWN_ORGANIZATIONS.iter() {
        if let Some(pos) = text_lower.find(org) {
            push(&text[pos..pos + org.len()], EntityType::Organization, &mut out);
        }
    }

    for sys in KNOWN_SYSTEMS.iter() {
        if let Some(pos) = text_lower.find(sys) {
            push(&text[pos..pos + sys.len()], EntityType::System, &mut out);
        }
    }
    for cap in SYSTEM_NAME_PATTERN.find_iter(text) {
        push(cap.as_str(), EntityType::Library, &mut out);
    }

    for concept in KNOWN_CONCEPTS.iter() {
        if let Some(pos) = text_lower.find(concept) {
            push(&text[pos..pos + concept.len()], EntityType::Concept, &mut out);
        }
    }

    out
}

/// Sentence-scoped co-occurrence relation extraction: for each sentence
/// mentioning two or more extracted entities, emit a triple between the
/// first two (in reading order), using a connector phrase (`depends on`,
/// `uses`, ...) as the predicate if one appears in the sentence, falling
/// back to the generic `relates_to` co-occurrence predicate otherwise.
fn extract_relations(text: &str, entities: &[ExtractedEntity]) -> Vec<ExtractedTriple> {
    let mut triples = Vec::new();
    let mut seen: HashSet<(String, String, String)> = HashSet::new();

    for sentence in text.split(['.', '!', '?', '\n']) {
        let sentence_lower = sentence.to_lowercase();

        let mut mentioned: Vec<&ExtractedEntity> = entities
            .iter()
            .filter(|e| sentence_lower.contains(&normalize(&e.name)))
            .collect();
        if mentioned.len() < 2 {
            continue;
        }
        mentioned.sort_by_key(|e| sentence_lower.find(&normalize(&e.name)).unwrap_or(usize::MAX));

        let subject = mentioned[0];
        let object = mentioned
            .iter()
            .find(|e| normalize(&e.name) != normalize(&subject.name));
        let Some(object) = object else { continue };

        let predicate = RELATION_PATTERN
            .find(&sentence_lower)
            .map(|m| m.as_str().replace(' ', "_"))
            .unwrap_or_else(|| "relates_to".to_string());

        let key = (normalize(&subject.name), predicate.clone(), normalize(&object.name));
        if seen.insert(key) {
            triples.push(ExtractedTriple {
                subject: subject.name.clone(),
                predicate,
                object: object.name.clone(),
            });
        }
    }

    triples
}

/// Extract both entities and the relations between co-mentioned entities
/// in the same text, per spec §4.6's `{entities, triples}` extractor
/// contract.
pub fn extract_with_relations(text: &str) -> ExtractionResult {
    let entities = extract(text);
    let triples = extract_relations(text, &entities);
    ExtractionResult { entities, triples }
}
