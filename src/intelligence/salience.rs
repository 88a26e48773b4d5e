//! Static salience scoring, time-decay, and reinforcement (spec §4.3).

use chrono::{DateTime, Utc};

use crate::types::{Memory, MemoryType, Category, DECAY_FLOOR};

/// Additive keyword-dictionary weights. A memory's static salience starts
/// at the floor and accumulates one weight per dictionary that matches
/// title+content, clamped to `[0.2, 1.0]`.
const DICTIONARIES: &[(&str, f32, &[&str])] = &[
    (
        "architecture",
        0.18,
        &["architecture", "design", "schema", "structure", "module"],
    ),
    (
        "error",
        0.2,
        &["error", "bug", "crash", "panic", "failure", "broken"],
    ),
    (
        "decision",
        0.2,
        &["decided", "decision", "chose", "chosen", "will use", "going with"],
    ),
    (
        "learning",
        0.15,
        &["learned", "turns out", "note that", "important:", "gotcha"],
    ),
    (
        "preference",
        0.12,
        &["prefer", "always", "never", "best practice", "convention"],
    ),
    (
        "pattern",
        0.12,
        &["pattern", "idiom", "approach", "technique"],
    ),
    (
        "importance",
        0.15,
        &["critical", "important", "must", "required", "essential"],
    ),
];

const BASE_SALIENCE: f32 = 0.2;
const MAX_SALIENCE: f32 = 1.0;

/// Compute static salience for new memory text.
pub fn calculate(title: &str, content: &str) -> f32 {
    let haystack = format!("{} {}", title, content).to_lowercase();
    let mut score = BASE_SALIENCE;
    for (_, weight, keywords) in DICTIONARIES {
        if keywords.iter().any(|kw| haystack.contains(kw)) {
            score += weight;
        }
    }
    score.clamp(0.2, MAX_SALIENCE)
}

/// Human-readable explanation of which dictionaries fired.
pub fn explain(title: &str, content: &str) -> String {
    let haystack = format!("{} {}", title, content).to_lowercase();
    let matched: Vec<&str> = DICTIONARIES
        .iter()
        .filter(|(_, _, keywords)| keywords.iter().any(|kw| haystack.contains(kw)))
        .map(|(name, _, _)| *name)
        .collect();
    if matched.is_empty() {
        format!("base salience {BASE_SALIENCE} (no dictionary matched)")
    } else {
        format!(
            "base {BASE_SALIENCE} + matched dictionaries: {}",
            matched.join(", ")
        )
    }
}

/// Suggest a category from matched dictionaries; falls back to `Note`.
pub fn suggest_category(title: &str, content: &str) -> Category {
    let haystack = format!("{} {}", title, content).to_lowercase();
    let checks: &[(Category, &[&str])] = &[
        (Category::Architecture, &["architecture", "design", "schema"]),
        (Category::Error, &["error", "bug", "crash", "panic"]),
        (Category::Learning, &["learned", "turns out", "gotcha"]),
        (Category::Preference, &["prefer", "always", "never", "best practice"]),
        (Category::Pattern, &["pattern", "idiom", "approach"]),
        (Category::Todo, &["todo", "fixme", "need to"]),
    ];
    for (category, keywords) in checks {
        if keywords.iter().any(|kw| haystack.contains(kw)) {
            return *category;
        }
    }
    Category::Note
}

/// Extract short tag candidates from matched dictionary names.
pub fn extract_tags(title: &str, content: &str) -> Vec<String> {
    let haystack = format!("{} {}", title, content).to_lowercase();
    DICTIONARIES
        .iter()
        .filter(|(_, _, keywords)| keywords.iter().any(|kw| haystack.contains(kw)))
        .map(|(name, _, _)| name.to_string())
        .collect()
}

/// `decayed(t) = salience * r^dh` where `dh` is hours since `last_accessed`
/// and `r` is the type-specific decay rate (spec §4.3).
pub fn decayed_score(salience: f32, memory_type: MemoryType, last_accessed: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    let dh = now.signed_duration_since(last_accessed).num_seconds() as f64 / 3600.0;
    let dh = dh.max(0.0);
    let r = memory_type.decay_rate();
    let decayed = salience as f64 * r.powf(dh);
    decayed.clamp(0.0, salience as f64) as f32
}

/// Whether a decayed score is below the eviction floor.
pub fn is_evictable(decayed: f32) -> bool {
    decayed < DECAY_FLOOR
}

/// Reinforcement boost on access: larger for STM than LTM, shrinking with
/// access count (diminishing returns).
pub fn reinforcement_boost(memory_type: MemoryType, access_count: i64) -> f32 {
    let base = match memory_type {
        MemoryType::ShortTerm => 0.05,
        MemoryType::Episodic => 0.035,
        MemoryType::LongTerm => 0.02,
    };
    let damping = 1.0 / (1.0 + access_count as f32 * 0.15);
    base * damping
}

/// New salience after an access, bounded at 1.0, never decreasing.
pub fn reinforce(salience: f32, memory_type: MemoryType, access_count: i64) -> f32 {
    (salience + reinforcement_boost(memory_type, access_count)).min(MAX_SALIENCE)
}

/// Bounded composite used as a ranking term when no query is given
/// (spec §4.3): `0.4*decayed + 0.3*salience + 0.2*log1p(accessCount)/k + 0.1*type_weight`.
pub fn priority(memory: &Memory, now: DateTime<Utc>) -> f32 {
    const K: f32 = 4.0; // log1p(accessCount) saturates toward 1.0 around accessCount≈50
    let decayed = decayed_score(memory.salience, memory.memory_type, memory.last_accessed, now);
    let frequency_term = ((memory.access_count as f32 + 1.0).ln() / K).min(1.0);
    let type_weight = match memory.memory_type {
        MemoryType::LongTerm => 1.0,
        MemoryType::Episodic => 0.6,
        MemoryType::ShortTerm => 0.4,
    };
    (0.4 * decayed + 0.3 * memory.salience + 0.2 * frequency_term + 0.1 * type_weight).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calculate_matches_dictionaries() {
        let s = calculate("Decided to use PostgreSQL", "We chose PostgreSQL for the schema");
        assert!(s > BASE_SALIENCE);
        assert!(s <= 1.0);
    }

    #[test]
    fn calculate_floor_for_plain_text() {
        let s = calculate("grocery list", "milk eggs bread");
        assert_eq!(s, 0.2);
    }

    #[test]
    fn decay_rate_ordering() {
        assert!(MemoryType::ShortTerm.decay_rate() < MemoryType::Episodic.decay_rate());
        assert!(MemoryType::Episodic.decay_rate() < MemoryType::LongTerm.decay_rate());
    }

    #[test]
    fn decayed_score_monotonic_in_time() {
        let now = Utc::now();
        let earlier = now - chrono::Duration::hours(100);
        let at_now = decayed_score(0.8, MemoryType::ShortTerm, now, now);
        let at_later = decayed_score(0.8, MemoryType::ShortTerm, earlier, now);
        assert!(at_later < at_now);
        assert!(at_later >= 0.0);
    }

    #[test]
    fn decayed_score_never_exceeds_salience() {
        let now = Utc::now();
        let d = decayed_score(0.5, MemoryType::LongTerm, now, now);
        assert!(d <= 0.5 + 1e-6);
    }

    #[test]
    fn reinforcement_never_decreases() {
        let s1 = reinforce(0.4, MemoryType::ShortTerm, 0);
        assert!(s1 > 0.4);
        let s2 = reinforce(s1, MemoryType::ShortTerm, 1);
        assert!(s2 >= s1);
    }

    #[test]
    fn reinforcement_boost_shrinks_with_access_count() {
        let b0 = reinforcement_boost(MemoryType::ShortTerm, 0);
        let b10 = reinforcement_boost(MemoryType::ShortTerm, 10);
        assert!(b10 < b0);
    }

    #[test]
    fn reinforcement_capped_at_one() {
        let s = reinforce(0.999, MemoryType::ShortTerm, 0);
        assert!(s <= 1.0);
    }

    #[test]
    fn stm_reinforcement_larger_than_ltm() {
        assert!(reinforcement_boost(MemoryType::ShortTerm, 1) > reinforcement_boost(MemoryType::LongTerm, 1));
    }

    #[test]
    fn is_evictable_below_floor() {
        assert!(is_evictable(0.05));
        assert!(!is_evictable(0.5));
    }
}
