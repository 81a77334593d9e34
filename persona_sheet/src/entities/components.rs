//! Component definitions for personas.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::mechanics::StatDelta;
use crate::ordered_map::{self, KeyedPair};

/// Upper bound shared by every persona stat.
pub const STAT_MAX: u8 = 100;

/// Glyph shown when a persona has no avatar for a mood.
pub const DEFAULT_AVATAR: &str = "\u{1F464}";

/// Mood key used as the avatar fallback.
pub const NEUTRAL_MOOD: &str = "neutral";

/// Mutable relationship stats, each kept in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaStats {
    pub affection: u8,
    pub energy: u8,
}

impl Default for PersonaStats {
    fn default() -> Self {
        Self {
            affection: 50,
            energy: STAT_MAX,
        }
    }
}

impl PersonaStats {
    /// Create stats, clamping both values into range.
    pub fn new(affection: u8, energy: u8) -> Self {
        Self {
            affection: affection.min(STAT_MAX),
            energy: energy.min(STAT_MAX),
        }
    }

    /// Apply a delta, saturating at both ends of the range.
    pub fn apply(&mut self, delta: StatDelta) {
        self.affection = shift(self.affection, delta.affection);
        self.energy = shift(self.energy, delta.energy);
    }
}

fn shift(value: u8, delta: i8) -> u8 {
    (i16::from(value) + i16::from(delta)).clamp(0, i16::from(STAT_MAX)) as u8
}

/// A keyword-triggered world fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoreEntry {
    pub keyword: String,
    pub fact: String,
}

impl LoreEntry {
    pub fn new(keyword: impl Into<String>, fact: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            fact: fact.into(),
        }
    }
}

impl KeyedPair for LoreEntry {
    fn key(&self) -> &str {
        &self.keyword
    }

    fn value(&self) -> &str {
        &self.fact
    }

    fn from_pair(key: String, value: String) -> Self {
        Self::new(key, value)
    }
}

/// One mood to avatar asset mapping. The asset is an emoji or an image file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarEntry {
    pub mood: String,
    pub asset: String,
}

impl KeyedPair for AvatarEntry {
    fn key(&self) -> &str {
        &self.mood
    }

    fn value(&self) -> &str {
        &self.asset
    }

    fn from_pair(key: String, value: String) -> Self {
        Self {
            mood: key,
            asset: value,
        }
    }
}

/// Mood to avatar mapping, kept in the order the card author wrote it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvatarMap {
    entries: Vec<AvatarEntry>,
}

impl Serialize for AvatarMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ordered_map::serialize(&self.entries, serializer)
    }
}

impl<'de> Deserialize<'de> for AvatarMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self {
            entries: ordered_map::deserialize(deserializer)?,
        })
    }
}

impl AvatarMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the asset for a mood. Replacing keeps the original position.
    pub fn insert(&mut self, mood: impl Into<String>, asset: impl Into<String>) {
        let mood = mood.into();
        let asset = asset.into();
        match self.entries.iter_mut().find(|e| e.mood == mood) {
            Some(existing) => existing.asset = asset,
            None => self.entries.push(AvatarEntry { mood, asset }),
        }
    }

    pub fn get(&self, mood: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.mood == mood)
            .map(|e| e.asset.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AvatarEntry> {
        self.entries.iter()
    }

    /// Pick the avatar for a mood label.
    ///
    /// Lookup order:
    /// 1. exact key match
    /// 2. first key (in map order) contained in the lowercased mood
    /// 3. the `neutral` entry
    /// 4. [`DEFAULT_AVATAR`]
    pub fn resolve(&self, mood: &str) -> &str {
        if let Some(asset) = self.get(mood) {
            return asset;
        }

        let folded = mood.to_lowercase();
        self.entries
            .iter()
            .find(|e| !e.mood.is_empty() && folded.contains(&e.mood.to_lowercase()))
            .map(|e| e.asset.as_str())
            .or_else(|| self.get(NEUTRAL_MOOD))
            .unwrap_or(DEFAULT_AVATAR)
    }
}
