//! Response streams - one running generation, bound to the session it will commit into.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{info, warn};

use super::GenerationSession;
use crate::backend::{FragmentStream, GenerationParams};
use crate::context_window::Turn;
use crate::error::Result;
use crate::stream_parser::{ParsedTurn, StreamEvent, StreamParser};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ResponseKind {
    /// Append a new assistant turn.
    Reply,
    /// Extend the trailing assistant turn in place.
    Continue,
}

/// What to undo if the stream does not complete.
#[derive(Debug)]
pub(super) struct PendingCommit {
    pub kind: ResponseKind,
    pub evicted: Vec<Turn>,
    pub appended_user: bool,
}

/// Pull-based view of a running response.
///
/// Holds the session mutably, so nothing else can touch its window until the
/// stream is finished or dropped. Only a stream that runs to completion
/// commits a turn; dropping it early or hitting a backend error restores the
/// window to what it was before `respond` was called.
pub struct ResponseStream<'a> {
    session: &'a mut GenerationSession,
    fragments: Option<Box<dyn FragmentStream>>,
    parser: StreamParser,
    queued: VecDeque<StreamEvent>,
    pending: Option<PendingCommit>,
    exhausted: bool,
}

impl<'a> ResponseStream<'a> {
    pub(super) async fn start(
        session: &'a mut GenerationSession,
        prompt: String,
        params: &GenerationParams,
        parser: StreamParser,
        pending: PendingCommit,
    ) -> Result<ResponseStream<'a>> {
        let backend = Arc::clone(&session.backend);
        // Built before awaiting so a dropped `respond` future still rolls back.
        let mut stream = Self {
            session,
            fragments: None,
            parser,
            queued: VecDeque::new(),
            pending: Some(pending),
            exhausted: false,
        };

        match backend.generate(&prompt, params).await {
            Ok(fragments) => {
                stream.fragments = Some(fragments);
                Ok(stream)
            }
            Err(err) => {
                stream.roll_back("backend failed to start");
                Err(err.into())
            }
        }
    }

    /// Next parser event. `None` once the stream has completed or failed.
    pub async fn next(&mut self) -> Option<Result<StreamEvent>> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Some(Ok(event));
            }
            if self.exhausted {
                return None;
            }
            let fragments = self.fragments.as_mut()?;

            match fragments.next().await {
                Some(Ok(fragment)) => {
                    let events = self.parser.push(&fragment);
                    self.queued.extend(events);
                }
                Some(Err(err)) => {
                    self.exhausted = true;
                    self.roll_back("backend failed mid-stream");
                    return Some(Err(err.into()));
                }
                None => {
                    self.exhausted = true;
                    let events = self.parser.finish();
                    if let Some(StreamEvent::Completed(parsed)) = events.last() {
                        self.commit(parsed);
                    }
                    self.queued.extend(events);
                }
            }
        }
    }

    /// Drain the stream and return the parsed turn.
    pub async fn collect(mut self) -> Result<ParsedTurn> {
        let mut completed = None;
        while let Some(event) = self.next().await {
            if let StreamEvent::Completed(parsed) = event? {
                completed = Some(parsed);
            }
        }
        Ok(completed.unwrap_or_else(|| {
            ParsedTurn::from_raw(self.parser.raw(), &self.session.config.delimiters())
        }))
    }

    /// Raw text received so far.
    pub fn raw(&self) -> &str {
        self.parser.raw()
    }

    pub fn is_committed(&self) -> bool {
        self.exhausted && self.pending.is_none() && self.parser.is_finished()
    }

    fn commit(&mut self, parsed: &ParsedTurn) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let raw = self.parser.raw().to_string();
        let window = &mut self.session.window;

        match pending.kind {
            ResponseKind::Reply => window.append(Turn::assistant(raw)),
            ResponseKind::Continue => {
                if let Some(last) = window.last_mut() {
                    last.content = raw;
                }
            }
        }
        self.session.current_mood = parsed.mood.clone();

        info!(
            session = %self.session.id,
            kind = ?pending.kind,
            turns = self.session.window.len(),
            mood = %parsed.mood,
            has_thought = parsed.has_thought(),
            "committed assistant turn"
        );
    }

    fn roll_back(&mut self, reason: &'static str) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let window = &mut self.session.window;
        if pending.appended_user {
            window.pop_last_user();
        }
        window.restore_front(pending.evicted);

        warn!(
            session = %self.session.id,
            reason,
            kind = ?pending.kind,
            discarded_chars = self.parser.raw().len(),
            "discarded partial response"
        );
    }
}

impl Drop for ResponseStream<'_> {
    fn drop(&mut self) {
        self.roll_back("response cancelled");
    }
}
