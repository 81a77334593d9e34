//! Sentiment heuristic behind relationship stat updates.
//!
//! Best-effort flavor only: a keyword polarity count over the user's words.
//! It knows nothing about negation, sarcasm or context and must never drive
//! anything that needs to be correct.

use persona_sheet::StatDelta;

/// Smallest and largest affection delta one message can produce.
pub const AFFECTION_RANGE: (i8, i8) = (-2, 3);

/// Smallest and largest energy delta one message can produce.
pub const ENERGY_RANGE: (i8, i8) = (-2, 2);

const WARM: &[&str] = &[
    "love", "like", "thanks", "thank", "appreciate", "beautiful", "cute", "sweet", "kind",
    "wonderful", "amazing", "great", "happy", "glad", "miss", "hug", "adore", "friend",
];

const COLD: &[&str] = &[
    "hate", "stupid", "idiot", "annoying", "ugly", "boring", "shut", "awful", "terrible",
    "useless", "dumb", "leave", "angry", "disgusting",
];

const LIVELY: &[&str] = &[
    "fun", "exciting", "excited", "adventure", "play", "party", "dance", "celebrate", "coffee",
];

const DRAINING: &[&str] = &[
    "tired", "exhausted", "sleep", "sleepy", "late", "work", "long", "sick", "rest",
];

/// Score `text` into small affection and energy deltas.
pub fn analyze_sentiment(text: &str) -> StatDelta {
    let lowered = text.to_lowercase();
    let mut affection = 0i32;
    let mut energy = 0i32;

    for word in lowered
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty())
    {
        if WARM.contains(&word) {
            affection += 1;
        } else if COLD.contains(&word) {
            affection -= 1;
        }
        if LIVELY.contains(&word) {
            energy += 1;
        } else if DRAINING.contains(&word) {
            energy -= 1;
        }
    }

    StatDelta::new(clamp(affection, AFFECTION_RANGE), clamp(energy, ENERGY_RANGE))
}

fn clamp(value: i32, (low, high): (i8, i8)) -> i8 {
    // Bounds are i8, so the clamped value always fits.
    value.clamp(i32::from(low), i32::from(high)) as i8
}
