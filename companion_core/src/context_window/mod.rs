//! Context Window - the rolling, token-bounded conversation history.
//!
//! The window is append-only except for four mutations:
//! 1. **Edit**: replace the content of a turn by index
//! 2. **Pop**: drop the trailing assistant turn (regenerate)
//! 3. **Evict**: drop the oldest turns while over budget
//! 4. **Clear**: full reset
//!
//! Eviction never leaves an assistant turn at the front and never shrinks the window
//! below two turns.

mod turn;

pub use turn::*;

use serde::{Deserialize, Serialize};

/// Characters per estimated token.
pub const CHARS_PER_TOKEN: usize = 3;

/// Eviction stops rather than shrink the window below this many turns.
pub const MIN_RETAINED_TURNS: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextWindow {
    turns: Vec<Turn>,
}

impl ContextWindow {
    /// Create a new empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a window from existing history (e.g. a loaded session).
    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Remove the last turn, but only if it is an assistant turn.
    pub fn pop_last(&mut self) -> Option<Turn> {
        if self.turns.last().is_some_and(Turn::is_assistant) {
            self.turns.pop()
        } else {
            None
        }
    }

    /// Remove the last turn, but only if it is a user turn.
    pub(crate) fn pop_last_user(&mut self) -> Option<Turn> {
        if self.turns.last().is_some_and(Turn::is_user) {
            self.turns.pop()
        } else {
            None
        }
    }

    /// Replace a turn's content. Returns `false` if the index is out of range.
    pub fn edit_at(&mut self, index: usize, new_content: impl Into<String>) -> bool {
        match self.turns.get_mut(index) {
            Some(turn) => {
                turn.content = new_content.into();
                true
            }
            None => false,
        }
    }

    /// The retained turns, oldest first.
    pub fn as_prompt_turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut Turn> {
        self.turns.last_mut()
    }

    /// Up to `n` most recent turns, oldest first.
    pub fn recent(&self, n: usize) -> &[Turn] {
        &self.turns[self.turns.len().saturating_sub(n)..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Rough token estimate: total content characters divided by [`CHARS_PER_TOKEN`].
    ///
    /// This is a cheap heuristic so the window can be trimmed without running a tokenizer
    /// on every turn. It is not an exact token count and will drift from the model's real
    /// tokenizer, especially for non-Latin text.
    pub fn estimate_tokens(&self) -> usize {
        self.turns.iter().map(Turn::char_len).sum::<usize>() / CHARS_PER_TOKEN
    }

    /// Evict the oldest turns until the estimate fits `max_tokens`.
    ///
    /// Each step removes the front turn together with the assistant turns that answer it,
    /// so a User->Assistant pair goes as a unit and a stray leading assistant turn goes on
    /// its own. Eviction only runs while at least 3 turns remain and stops before a step
    /// would leave fewer than [`MIN_RETAINED_TURNS`], even if still over budget.
    ///
    /// Returns the evicted turns, oldest first.
    pub fn enforce_budget(&mut self, max_tokens: usize) -> Vec<Turn> {
        let mut evicted = Vec::new();

        while self.estimate_tokens() > max_tokens && self.turns.len() > MIN_RETAINED_TURNS {
            let unit = self.front_unit_len();
            if self.turns.len() - unit < MIN_RETAINED_TURNS {
                break;
            }
            evicted.extend(self.turns.drain(..unit));
        }

        if !evicted.is_empty() {
            tracing::debug!(
                evicted = evicted.len(),
                retained = self.turns.len(),
                estimated_tokens = self.estimate_tokens(),
                "evicted oldest turns to fit context budget"
            );
        }
        evicted
    }

    /// Put previously evicted turns back at the front.
    pub(crate) fn restore_front(&mut self, turns: Vec<Turn>) {
        if turns.is_empty() {
            return;
        }
        self.turns.splice(0..0, turns);
    }

    /// Length of the front turn plus the assistant turns directly following it.
    fn front_unit_len(&self) -> usize {
        1 + self.turns[1..]
            .iter()
            .take_while(|t| t.is_assistant())
            .count()
    }
}
