//! Parsed turns - the display view derived from a raw assistant turn.

use once_cell::sync::Lazy;
use persona_sheet::Mood;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::config::ThoughtDelimiters;

/// Thought, speech and mood split out of one raw assistant output.
///
/// Never stored: always recomputed from the raw turn content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTurn {
    pub thought: Option<String>,
    pub speech: String,
    pub mood: Mood,
}

/// Byte layout of a raw output: where the thought body sits and which parts are speech.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ThoughtSpan {
    /// Text before the opening delimiter.
    pub leading: Range<usize>,
    /// Between the delimiters (or to the end when the block is never closed).
    pub body: Range<usize>,
    /// After the closing delimiter. Empty when the block is never closed.
    pub trailing: Range<usize>,
    pub closed: bool,
}

impl ThoughtSpan {
    /// The speech region: after the close, or before the open while still thinking.
    pub fn speech(&self) -> Range<usize> {
        if self.closed {
            self.trailing.clone()
        } else {
            self.leading.clone()
        }
    }
}

/// Locate the first thought block. A closing delimiter only counts after an opening one.
pub(crate) fn locate_thought(raw: &str, delimiters: &ThoughtDelimiters) -> Option<ThoughtSpan> {
    let open = raw.find(&delimiters.open)?;
    let body_start = open + delimiters.open.len();

    Some(match raw[body_start..].find(&delimiters.close) {
        Some(rel) => {
            let close = body_start + rel;
            let after = close + delimiters.close.len();
            ThoughtSpan {
                leading: 0..open,
                body: body_start..close,
                trailing: after..raw.len(),
                closed: true,
            }
        }
        None => ThoughtSpan {
            leading: 0..open,
            body: body_start..raw.len(),
            trailing: raw.len()..raw.len(),
            closed: false,
        },
    })
}

static MOOD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[\s*mood\s*:\s*([a-z0-9_ ]+?)\s*\]").unwrap());

/// Find the first `[Mood: label]` tag in `text`. Returns the tag's byte range and the label.
pub(crate) fn find_mood_tag(text: &str) -> Option<(Range<usize>, Mood)> {
    MOOD_PATTERN.captures(text).and_then(|caps| {
        let whole = caps.get(0)?;
        let label = caps.get(1)?;
        Some((whole.range(), Mood::new(label.as_str())))
    })
}

impl ParsedTurn {
    /// Split a raw assistant output.
    ///
    /// - thought: the trimmed body of the first thought block, `None` if absent or blank
    /// - speech: the text after the closing delimiter (the whole output when there is no
    ///   block, the text before the opening one while the block is unclosed), trimmed
    /// - mood: the first `[Mood: label]` tag anywhere in the output, lowercased;
    ///   `neutral` if none
    ///
    /// The mood tag is cut out of the speech when it sits there. Later thought blocks are
    /// ordinary speech text.
    pub fn from_raw(raw: &str, delimiters: &ThoughtDelimiters) -> Self {
        let (thought, region) = match locate_thought(raw, delimiters) {
            Some(span) => {
                let body = raw[span.body.clone()].trim();
                ((!body.is_empty()).then(|| body.to_string()), span.speech())
            }
            None => (None, 0..raw.len()),
        };

        let mut speech = raw[region.clone()].to_string();
        let mood = match find_mood_tag(raw) {
            Some((tag, mood)) => {
                if tag.start >= region.start && tag.end <= region.end {
                    speech.replace_range(tag.start - region.start..tag.end - region.start, "");
                }
                mood
            }
            None => Mood::neutral(),
        };

        Self {
            thought,
            speech: speech.trim().to_string(),
            mood,
        }
    }

    pub fn has_thought(&self) -> bool {
        self.thought.is_some()
    }
}
