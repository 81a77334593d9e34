//! Incremental thought/speech/mood parser for streamed model output.
//!
//! Fragments arrive in arbitrary sizes and may split a delimiter in two. The
//! parser keeps the whole raw buffer but only scans each byte once: it
//! remembers where the last delimiter search stopped and holds back a tail
//! that could still grow into a delimiter.

mod parsed;

pub use parsed::*;

use tracing::debug;

use crate::config::ThoughtDelimiters;

/// Parser position relative to the thought block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// No opening delimiter seen yet. Text is speech.
    PreThought,
    /// Inside the thought block, waiting for the closing delimiter.
    InThought,
    /// After the thought block. Everything is speech.
    Speech,
}

/// What a fragment produced, for live display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    ThinkingStarted,
    /// The thought block ended (or the stream ended inside it).
    ThinkingFinished { thought: Option<String> },
    /// Visible speech text, verbatim. The mood tag is only removed from the final turn.
    Speech(String),
    /// End of stream with the re-derived display view of the whole output.
    Completed(ParsedTurn),
}

impl StreamEvent {
    pub fn speech(&self) -> Option<&str> {
        match self {
            StreamEvent::Speech(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamParser {
    delimiters: ThoughtDelimiters,
    state: ParserState,
    buffer: String,
    /// Next byte offset to search for the pending delimiter.
    scan_pos: usize,
    /// Speech bytes up to here have been emitted.
    emitted: usize,
    thought_start: usize,
    finished: bool,
}

impl StreamParser {
    pub fn new(delimiters: ThoughtDelimiters) -> Self {
        Self {
            delimiters,
            state: ParserState::PreThought,
            buffer: String::new(),
            scan_pos: 0,
            emitted: 0,
            thought_start: 0,
            finished: false,
        }
    }

    /// A parser that already consumed `prefix` without reporting it.
    ///
    /// Used to extend an existing assistant turn: state and mood extraction
    /// cover the whole text, but only new speech is emitted.
    pub fn with_prefix(delimiters: ThoughtDelimiters, prefix: &str) -> Self {
        let mut parser = Self::new(delimiters);
        parser.push(prefix);
        parser.emitted = parser.buffer.len();
        parser
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Raw text consumed so far, delimiters and mood tag included.
    pub fn raw(&self) -> &str {
        &self.buffer
    }

    pub fn into_raw(self) -> String {
        self.buffer
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one fragment.
    pub fn push(&mut self, fragment: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished || fragment.is_empty() {
            return events;
        }
        self.buffer.push_str(fragment);

        loop {
            match self.state {
                ParserState::PreThought => {
                    let open = self.delimiters.open.as_str();
                    let found = self.buffer[self.scan_pos..].find(open);
                    let open_len = open.len();
                    if let Some(rel) = found {
                        let at = self.scan_pos + rel;
                        self.emit_speech_until(at, &mut events);
                        self.thought_start = at + open_len;
                        self.scan_pos = self.thought_start;
                        self.state = ParserState::InThought;
                        debug!(offset = at, "thought block opened");
                        events.push(StreamEvent::ThinkingStarted);
                        continue;
                    }
                    let safe = self.buffer.len()
                        - held_back(&self.buffer[self.scan_pos..], &self.delimiters.open);
                    self.emit_speech_until(safe, &mut events);
                    self.scan_pos = safe;
                }
                ParserState::InThought => {
                    let close = &self.delimiters.close;
                    if let Some(rel) = self.buffer[self.scan_pos..].find(close.as_str()) {
                        let at = self.scan_pos + rel;
                        let thought = trimmed(&self.buffer[self.thought_start..at]);
                        self.emitted = at + close.len();
                        self.scan_pos = self.emitted;
                        self.state = ParserState::Speech;
                        debug!(offset = at, "thought block closed");
                        events.push(StreamEvent::ThinkingFinished { thought });
                        continue;
                    }
                    self.scan_pos =
                        self.buffer.len() - held_back(&self.buffer[self.scan_pos..], close);
                }
                ParserState::Speech => {
                    let end = self.buffer.len();
                    self.emit_speech_until(end, &mut events);
                }
            }
            break;
        }
        events
    }

    /// End of stream: flush held-back text and report the parsed turn.
    ///
    /// A second call returns nothing.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        self.finished = true;

        match self.state {
            ParserState::PreThought | ParserState::Speech => {
                let end = self.buffer.len();
                self.emit_speech_until(end, &mut events);
            }
            ParserState::InThought => {
                debug!("stream ended inside thought block");
                let thought = trimmed(&self.buffer[self.thought_start..]);
                events.push(StreamEvent::ThinkingFinished { thought });
            }
        }

        events.push(StreamEvent::Completed(ParsedTurn::from_raw(
            &self.buffer,
            &self.delimiters,
        )));
        events
    }

    fn emit_speech_until(&mut self, end: usize, events: &mut Vec<StreamEvent>) {
        if end > self.emitted {
            events.push(StreamEvent::Speech(self.buffer[self.emitted..end].to_string()));
            self.emitted = end;
        }
    }
}

/// Length of the longest tail of `text` that is a proper prefix of `delimiter`.
fn held_back(text: &str, delimiter: &str) -> usize {
    let longest = delimiter.len().saturating_sub(1).min(text.len());
    (1..=longest)
        .rev()
        .find(|&len| delimiter.is_char_boundary(len) && text.ends_with(&delimiter[..len]))
        .unwrap_or(0)
}

fn trimmed(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
