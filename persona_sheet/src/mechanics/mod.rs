//! Persona mechanics: mood labels, stat deltas and times of day.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entities::NEUTRAL_MOOD;

/// A normalized mood label (lowercase, trimmed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mood(String);

impl Mood {
    /// Normalize a raw label. Blank labels become `neutral`.
    pub fn new(label: impl AsRef<str>) -> Self {
        let label = label.as_ref().trim().to_lowercase();
        if label.is_empty() {
            Self::neutral()
        } else {
            Self(label)
        }
    }

    pub fn neutral() -> Self {
        Self(NEUTRAL_MOOD.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_neutral(&self) -> bool {
        self.0 == NEUTRAL_MOOD
    }
}

impl Default for Mood {
    fn default() -> Self {
        Self::neutral()
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A signed change to persona stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatDelta {
    pub affection: i8,
    pub energy: i8,
}

impl StatDelta {
    pub fn new(affection: i8, energy: i8) -> Self {
        Self { affection, energy }
    }

    pub fn is_zero(&self) -> bool {
        self.affection == 0 && self.energy == 0
    }
}

/// Coarse in-world time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeOfDay {
    /// 21:00 - 04:59.
    Night,
    /// 05:00 - 11:59.
    Morning,
    /// 12:00 - 16:59.
    Afternoon,
    /// 17:00 - 20:59.
    Evening,
}

impl TimeOfDay {
    pub fn from_hour(hour: u8) -> Self {
        match hour % 24 {
            5..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=20 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeOfDay::Night => "night",
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
