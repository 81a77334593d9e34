//! Keywords - the triggers of the lorebook.

use std::fmt;

/// A lore trigger with its case-folded form precomputed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Keyword {
    text: String,
    folded: String,
}

impl Keyword {
    /// Build a keyword. Returns `None` for blank input.
    pub fn parse(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return None;
        }
        let folded = text.to_lowercase();
        Some(Self { text, folded })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Check against text that has already been lowercased.
    pub fn occurs_in(&self, folded_haystack: &str) -> bool {
        folded_haystack.contains(&self.folded)
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
