//! Lore index - the lookup structure behind "Relevant World Info".

use persona_sheet::LoreEntry;

use super::Keyword;
use crate::error::{Result, SessionError};

#[derive(Debug, Clone)]
struct IndexedEntry {
    keyword: Keyword,
    entry: LoreEntry,
}

/// Keyword -> fact mapping scanned by literal, case-insensitive substring match.
///
/// Results always come back in insertion order; there is no relevance ranking.
#[derive(Debug, Clone, Default)]
pub struct LoreIndex {
    entries: Vec<IndexedEntry>,
}

impl LoreIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a persona's lorebook. Blank keywords are skipped.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a LoreEntry>) -> Self {
        let mut index = Self::new();
        for entry in entries {
            if index.update(&entry.keyword, &entry.fact).is_err() {
                tracing::warn!("skipping lore entry with a blank keyword");
            }
        }
        index
    }

    /// Insert or replace the fact for a keyword.
    ///
    /// Replacing keeps the entry's original position. Blank keywords are rejected with
    /// [`SessionError::MalformedLoreUpdate`]. Surrounding whitespace is not part of the keyword.
    pub fn update(&mut self, keyword: &str, fact: &str) -> Result<()> {
        let keyword = keyword.trim();
        let parsed = Keyword::parse(keyword)
            .ok_or_else(|| SessionError::MalformedLoreUpdate("keyword is empty".to_string()))?;

        match self.entries.iter_mut().find(|e| e.entry.keyword == keyword) {
            Some(existing) => existing.entry.fact = fact.to_string(),
            None => self.entries.push(IndexedEntry {
                keyword: parsed,
                entry: LoreEntry::new(keyword, fact),
            }),
        }
        Ok(())
    }

    /// Remove a keyword. Absent keywords are a no-op.
    pub fn remove(&mut self, keyword: &str) -> Option<LoreEntry> {
        let keyword = keyword.trim();
        let pos = self.entries.iter().position(|e| e.entry.keyword == keyword)?;
        Some(self.entries.remove(pos).entry)
    }

    /// Every entry whose keyword occurs in `scan_text`, in insertion order.
    pub fn active_entries(&self, scan_text: &str) -> Vec<&LoreEntry> {
        let folded = scan_text.to_lowercase();
        self.entries
            .iter()
            .filter(|e| e.keyword.occurs_in(&folded))
            .map(|e| &e.entry)
            .collect()
    }

    pub fn get(&self, keyword: &str) -> Option<&LoreEntry> {
        let keyword = keyword.trim();
        self.entries
            .iter()
            .find(|e| e.entry.keyword == keyword)
            .map(|e| &e.entry)
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &LoreEntry> {
        self.entries.iter().map(|e| &e.entry)
    }

    /// Snapshot for the character store to persist.
    pub fn to_lorebook(&self) -> Vec<LoreEntry> {
        self.entries().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
