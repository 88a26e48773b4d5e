//! Property-based tests for the memory engine.
//!
//! These verify invariants that must hold for all inputs:
//! - Extraction and scoring never panic
//! - Scores stay within their documented bounds
//! - Type round-trips through their wire representation
//!
//! Run with: cargo test --test property_tests

use proptest::prelude::*;

// ============================================================================
// ENTITY EXTRACTION
// ============================================================================

mod extraction_tests {
    use super::*;
    use cortex::intelligence::entities::extract;

    proptest! {
        /// Extraction never panics on arbitrary text.
        #[test]
        fn never_panics(s in "\\PC{0,1000}") {
            let _ = extract(&s);
        }

        /// Empty input yields no entities.
        #[test]
        fn empty_input_empty_result(s in "\\s*") {
            prop_assert!(extract(&s).is_empty());
        }

        /// Every extracted entity has non-empty mention text.
        #[test]
        fn entities_have_non_empty_names(s in "\\PC{0,500}") {
            for entity in extract(&s) {
                prop_assert!(!entity.name.is_empty());
            }
        }
    }
}

// ============================================================================
// SALIENCE SCORING
// ============================================================================

mod salience_tests {
    use super::*;
    use chrono::{Duration, Utc};
    use cortex::intelligence::salience;
    use cortex::types::MemoryType;

    proptest! {
        /// calculate() never panics and stays within its documented
        /// clamp range [0.2, 1.0] regardless of input text.
        #[test]
        fn calculate_is_bounded(title in "\\PC{0,200}", content in "\\PC{0,2000}") {
            let score = salience::calculate(&title, &content);
            prop_assert!((0.2..=1.0).contains(&score));
        }

        /// decayed_score never exceeds the original salience and never
        /// goes negative, for any elapsed time.
        #[test]
        fn decayed_score_is_bounded(salience_val in 0.2f32..1.0, hours in 0i64..100_000) {
            let now = Utc::now();
            let last_accessed = now - Duration::hours(hours);
            for memory_type in [MemoryType::ShortTerm, MemoryType::Episodic, MemoryType::LongTerm] {
                let decayed = salience::decayed_score(salience_val, memory_type, last_accessed, now);
                prop_assert!(decayed >= 0.0);
                prop_assert!(decayed <= salience_val + 1e-6);
            }
        }

        /// Decay is monotonically non-increasing as elapsed time grows.
        #[test]
        fn decay_is_monotonic_in_elapsed_time(salience_val in 0.2f32..1.0, h1 in 0i64..1000, h2 in 0i64..1000) {
            let now = Utc::now();
            let (early, late) = if h1 <= h2 { (h1, h2) } else { (h2, h1) };
            let earlier = now - Duration::hours(early);
            let later = now - Duration::hours(late);
            let decayed_earlier = salience::decayed_score(salience_val, MemoryType::ShortTerm, earlier, now);
            let decayed_later = salience::decayed_score(salience_val, MemoryType::ShortTerm, later, now);
            prop_assert!(decayed_later <= decayed_earlier + 1e-6);
        }

        /// reinforcement_boost never pushes salience outside [0, 1].
        #[test]
        fn reinforce_is_bounded(salience_val in 0.0f32..1.0, access_count in 0i64..10_000) {
            for memory_type in [MemoryType::ShortTerm, MemoryType::Episodic, MemoryType::LongTerm] {
                let boosted = salience::reinforce(salience_val, memory_type, access_count);
                prop_assert!((0.0..=1.0).contains(&boosted));
            }
        }
    }
}

// ============================================================================
// SCORE FUSION
// ============================================================================

mod fusion_tests {
    use super::*;
    use cortex::search::{fuse, ScoredSignal};

    proptest! {
        /// Fusing signals whose weights sum to <= 1 and whose scores are
        /// each within [0, 1] never produces a result outside [0, 1].
        #[test]
        fn fuse_of_normalized_signals_stays_in_unit_range(
            a in 0.0f32..1.0, b in 0.0f32..1.0, c in 0.0f32..1.0
        ) {
            let signals = [
                ScoredSignal::new("a", 0.4, a),
                ScoredSignal::new("b", 0.3, b),
                ScoredSignal::new("c", 0.3, c),
            ];
            let score = fuse(&signals);
            prop_assert!((0.0..=1.0).contains(&score));
        }

        /// Fusion is order-independent (plain weighted sum).
        #[test]
        fn fuse_is_order_independent(a in 0.0f32..1.0, b in 0.0f32..1.0) {
            let forward = fuse(&[ScoredSignal::new("a", 0.5, a), ScoredSignal::new("b", 0.5, b)]);
            let reversed = fuse(&[ScoredSignal::new("b", 0.5, b), ScoredSignal::new("a", 0.5, a)]);
            prop_assert!((forward - reversed).abs() < 1e-6);
        }
    }
}

// ============================================================================
// MEMORY TYPE / CATEGORY / SCOPE / ENTITY TYPE ROUND-TRIPS
// ============================================================================

mod memory_type_tests {
    use super::*;
    use cortex::types::MemoryType;
    use std::str::FromStr;

    proptest! {
        #[test]
        fn roundtrip(memory_type in prop_oneof![
            Just(MemoryType::ShortTerm),
            Just(MemoryType::LongTerm),
            Just(MemoryType::Episodic),
        ]) {
            let s = memory_type.as_str();
            let parsed = MemoryType::from_str(s).unwrap();
            prop_assert_eq!(parsed.as_str(), memory_type.as_str());
        }
    }
}

mod category_tests {
    use super::*;
    use cortex::types::Category;
    use std::str::FromStr;

    proptest! {
        #[test]
        fn roundtrip(category in prop_oneof![
            Just(Category::Architecture),
            Just(Category::Pattern),
            Just(Category::Preference),
            Just(Category::Error),
            Just(Category::Context),
            Just(Category::Learning),
            Just(Category::Todo),
            Just(Category::Note),
            Just(Category::Relationship),
            Just(Category::Custom),
        ]) {
            let s = category.as_str();
            let parsed = Category::from_str(s).unwrap();
            prop_assert_eq!(parsed.as_str(), category.as_str());
        }

        #[test]
        fn unknown_category_fails(s in "[a-z]{5,20}") {
            let known = Category::all().iter().map(|c| c.as_str()).collect::<Vec<_>>();
            if !known.contains(&s.as_str()) {
                prop_assert!(Category::from_str(&s).is_err());
            }
        }
    }
}

mod scope_tests {
    use super::*;
    use cortex::types::Scope;
    use std::str::FromStr;

    proptest! {
        #[test]
        fn roundtrip(scope in prop_oneof![Just(Scope::Project), Just(Scope::Global)]) {
            let s = scope.as_str();
            let parsed = Scope::from_str(s).unwrap();
            prop_assert_eq!(parsed, scope);
        }
    }
}

mod entity_type_tests {
    use super::*;
    use cortex::types::EntityType;
    use std::str::FromStr;

    proptest! {
        #[test]
        fn roundtrip(entity_type in prop_oneof![
            Just(EntityType::System),
            Just(EntityType::Library),
            Just(EntityType::Person),
            Just(EntityType::Concept),
            Just(EntityType::Organization),
            Just(EntityType::Location),
            Just(EntityType::Other),
        ]) {
            let s = entity_type.as_str();
            let parsed = EntityType::from_str(s).unwrap();
            prop_assert_eq!(parsed.as_str(), entity_type.as_str());
        }
    }
}

// ============================================================================
// MEMORY STORE ROUND-TRIP (create -> get preserves fields)
// ============================================================================

mod store_roundtrip_tests {
    use super::*;
    use cortex::storage::{queries, Storage};
    use cortex::types::CreateMemoryInput;

    proptest! {
        /// Creating a memory and fetching it back preserves title/content,
        /// regardless of their exact text (short of the truncation cap).
        #[test]
        fn create_then_get_preserves_title_and_content(
            title in "[ -~]{1,80}", content in "[ -~]{1,500}"
        ) {
            prop_assume!(!title.trim().is_empty());
            prop_assume!(!content.trim().is_empty());
            let storage = Storage::open_in_memory().unwrap();
            storage
                .with_connection(|conn| {
                    let created = queries::create(
                        conn,
                        &CreateMemoryInput {
                            title: title.clone(),
                            content: content.clone(),
                            ..Default::default()
                        },
                    )?;
                    let fetched = queries::get(conn, created.id)?;
                    assert_eq!(fetched.title, title);
                    assert_eq!(fetched.content, content);
                    Ok(())
                })
                .unwrap();
        }
    }
}
