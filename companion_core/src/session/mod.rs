//! Generation Session - one companion conversation.
//!
//! A session owns its context window, lore index and persona snapshot. There
//! is no shared mutable state between sessions; a host that runs several
//! concurrently gives each its own handle.
//!
//! Every generating operation hands back a [`ResponseStream`] that borrows the
//! session mutably, which keeps operations on one session strictly sequential.

mod response;
mod sentiment;

pub use response::*;
pub use sentiment::*;

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use persona_sheet::{LoreEntry, Mood, Persona, SceneState, StatDelta, UserPersona, DEFAULT_AVATAR};
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::{GenerationBackend, GenerationParams};
use crate::config::SessionConfig;
use crate::context_window::{ContextWindow, Turn};
use crate::error::{Result, SessionError};
use crate::lorebook::LoreIndex;
use crate::persistence::SessionDocument;
use crate::prompt_builder::{DiarySource, PendingTurn, PromptBuilder, PromptInputs, SceneContext};
use crate::stream_parser::{ParsedTurn, StreamParser};

/// Source of the real-world date and time shown in the prompt.
pub type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub struct GenerationSession {
    id: Uuid,
    backend: Arc<dyn GenerationBackend>,
    config: SessionConfig,
    builder: PromptBuilder,
    persona: Option<Persona>,
    lore: LoreIndex,
    window: ContextWindow,
    user: UserPersona,
    diary: Option<Arc<dyn DiarySource>>,
    current_mood: Mood,
    clock: Clock,
}

impl GenerationSession {
    /// Create a session with no persona loaded. Generation fails with
    /// [`SessionError::ConfigMissing`] until one is.
    pub fn new(backend: Arc<dyn GenerationBackend>, config: SessionConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            backend,
            builder: PromptBuilder::from_config(&config),
            config,
            persona: None,
            lore: LoreIndex::new(),
            window: ContextWindow::new(),
            user: UserPersona::default(),
            diary: None,
            current_mood: Mood::neutral(),
            clock: Box::new(|| Local::now().naive_local()),
        }
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.load_persona(persona);
        self
    }

    pub fn with_user_persona(mut self, user: UserPersona) -> Self {
        self.user = user;
        self
    }

    pub fn with_diary(mut self, diary: Arc<dyn DiarySource>) -> Self {
        self.diary = Some(diary);
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Identifies this session in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn persona(&self) -> Option<&Persona> {
        self.persona.as_ref()
    }

    pub fn window(&self) -> &ContextWindow {
        &self.window
    }

    pub fn history(&self) -> &[Turn] {
        self.window.as_prompt_turns()
    }

    pub fn user_persona(&self) -> &UserPersona {
        &self.user
    }

    pub fn set_user_persona(&mut self, user: UserPersona) {
        self.user = user;
    }

    pub fn lorebook(&self) -> &LoreIndex {
        &self.lore
    }

    /// Install a persona snapshot: rebuild the lore index, clear history and mood.
    pub fn load_persona(&mut self, persona: Persona) {
        self.lore = LoreIndex::from_entries(&persona.lorebook);
        self.window.clear();
        self.current_mood = Mood::neutral();
        info!(
            session = %self.id,
            persona = %persona.name,
            lore_entries = self.lore.len(),
            "persona loaded"
        );
        self.persona = Some(persona);
    }

    /// Replace the persona, returning the previous snapshot.
    pub fn switch_persona(&mut self, persona: Persona) -> Option<Persona> {
        let previous = self.persona.take();
        self.load_persona(persona);
        previous
    }

    /// Move the persona to a new in-world scene.
    pub fn set_scene(&mut self, scene: SceneState) -> Result<()> {
        let persona = self.persona.as_mut().ok_or(SessionError::ConfigMissing)?;
        persona.scene = scene;
        Ok(())
    }

    /// Send a user message and stream the reply.
    ///
    /// A trailing user turn with the same text is reused rather than appended again,
    /// which is how a regenerate or a retry after cancellation re-asks the same message.
    pub async fn respond(
        &mut self,
        user_text: &str,
        params: &GenerationParams,
    ) -> Result<ResponseStream<'_>> {
        self.require_persona()?;

        let reused = self
            .window
            .last()
            .is_some_and(|t| t.is_user() && t.content == user_text);
        if !reused {
            self.window.append(Turn::user(user_text));
        }
        let evicted = self.window.enforce_budget(self.config.max_context_tokens);

        let turns = self.window.as_prompt_turns();
        let history = turns.split_last().map_or(turns, |(_, rest)| rest);
        let prompt = self.render_prompt(history, PendingTurn::User(user_text))?;
        debug!(reused, prompt_chars = prompt.len(), "starting response");

        let parser = StreamParser::new(self.config.delimiters());
        let pending = PendingCommit {
            kind: ResponseKind::Reply,
            evicted,
            appended_user: !reused,
        };
        ResponseStream::start(self, prompt, params, parser, pending).await
    }

    /// Extend the trailing assistant turn.
    ///
    /// The new text is appended to that turn on completion; cancelling leaves it as it was.
    pub async fn continue_response(
        &mut self,
        params: &GenerationParams,
    ) -> Result<ResponseStream<'_>> {
        self.require_persona()?;
        let prefix = match self.window.last() {
            Some(turn) if turn.is_assistant() => turn.content.clone(),
            _ => return Err(SessionError::NoAssistantTurnToContinue),
        };

        let evicted = self.window.enforce_budget(self.config.max_context_tokens);
        let prompt = self.render_prompt(self.window.as_prompt_turns(), PendingTurn::ContinueAssistant)?;
        debug!(prefix_chars = prefix.len(), "continuing response");

        let parser = StreamParser::with_prefix(self.config.delimiters(), &prefix);
        let pending = PendingCommit {
            kind: ResponseKind::Continue,
            evicted,
            appended_user: false,
        };
        ResponseStream::start(self, prompt, params, parser, pending).await
    }

    /// Drop the trailing assistant turn so its user turn can be answered again.
    ///
    /// Fails with [`SessionError::NoAssistantTurnToRegenerate`], leaving the window
    /// untouched, when the last turn is not an assistant turn.
    pub fn regenerate(&mut self) -> Result<Turn> {
        self.require_persona()?;
        let popped = self
            .window
            .pop_last()
            .ok_or(SessionError::NoAssistantTurnToRegenerate)?;
        self.refresh_mood();
        Ok(popped)
    }

    /// [`regenerate`](Self::regenerate) followed by [`respond`](Self::respond) with the
    /// preserved user turn.
    pub async fn regenerate_response(
        &mut self,
        params: &GenerationParams,
    ) -> Result<ResponseStream<'_>> {
        self.require_persona()?;
        let user_text = match self.window.as_prompt_turns() {
            [.., user, assistant] if user.is_user() && assistant.is_assistant() => {
                user.content.clone()
            }
            _ => return Err(SessionError::NoAssistantTurnToRegenerate),
        };
        self.regenerate()?;
        self.respond(&user_text, params).await
    }

    /// Replace a turn's content. Does not trigger generation.
    pub fn edit(&mut self, index: usize, content: impl Into<String>) -> Result<()> {
        self.require_persona()?;
        let len = self.window.len();
        if !self.window.edit_at(index, content) {
            return Err(SessionError::InvalidEditIndex { index, len });
        }
        self.refresh_mood();
        Ok(())
    }

    /// Clear the history. Persona and lore are kept.
    pub fn reset(&mut self) {
        self.window.clear();
        self.current_mood = Mood::neutral();
        info!(session = %self.id, "session reset");
    }

    /// Ask the persona for a first-person diary entry about the current history.
    ///
    /// Returns the speech part only. The window is not modified; storing the
    /// entry is up to the diary collaborator.
    pub async fn summarize(&self, params: &GenerationParams) -> Result<String> {
        let persona = self.require_persona()?;
        let prompt = self
            .builder
            .build_summary(persona, self.window.as_prompt_turns(), &self.user);

        let mut fragments = self.backend.generate(&prompt, params).await?;
        let mut raw = String::new();
        while let Some(fragment) = fragments.next().await {
            raw.push_str(&fragment?);
        }

        let parsed = ParsedTurn::from_raw(&raw, &self.config.delimiters());
        debug!(chars = parsed.speech.len(), "diary summary generated");
        Ok(parsed.speech)
    }

    /// Upsert a lore entry and mirror it into the persona snapshot.
    pub fn update_lore(&mut self, keyword: &str, fact: &str) -> Result<()> {
        let persona = self.persona.as_mut().ok_or(SessionError::ConfigMissing)?;
        self.lore.update(keyword, fact)?;
        persona.lorebook = self.lore.to_lorebook();
        Ok(())
    }

    /// Remove a lore entry. Unknown keywords are a no-op.
    pub fn remove_lore(&mut self, keyword: &str) -> Result<Option<LoreEntry>> {
        let persona = self.persona.as_mut().ok_or(SessionError::ConfigMissing)?;
        let removed = self.lore.remove(keyword);
        if removed.is_some() {
            persona.lorebook = self.lore.to_lorebook();
        }
        Ok(removed)
    }

    /// Best-effort stat deltas for a user message. See [`analyze_sentiment`].
    pub fn analyze_sentiment(&self, user_text: &str) -> StatDelta {
        analyze_sentiment(user_text)
    }

    /// Score a user message and apply the deltas to the persona's stats.
    pub fn apply_sentiment(&mut self, user_text: &str) -> Result<StatDelta> {
        let persona = self.persona.as_mut().ok_or(SessionError::ConfigMissing)?;
        let delta = analyze_sentiment(user_text);
        if !delta.is_zero() {
            persona.stats.apply(delta);
            debug!(
                affection = persona.stats.affection,
                energy = persona.stats.energy,
                "stats updated"
            );
        }
        Ok(delta)
    }

    /// Mood of the latest assistant turn, `neutral` before any.
    pub fn current_mood(&self) -> &Mood {
        &self.current_mood
    }

    /// Avatar asset for [`current_mood`](Self::current_mood).
    pub fn current_avatar(&self) -> &str {
        self.persona
            .as_ref()
            .map_or(DEFAULT_AVATAR, |p| p.avatar_for(self.current_mood.as_str()))
    }

    /// Display view of an assistant turn, re-derived from its raw content.
    pub fn display_turn(&self, index: usize) -> Option<ParsedTurn> {
        self.window
            .as_prompt_turns()
            .get(index)
            .filter(|turn| turn.is_assistant())
            .map(|turn| ParsedTurn::from_raw(&turn.content, &self.config.delimiters()))
    }

    pub fn snapshot(&self) -> SessionDocument {
        SessionDocument::new(self.window.as_prompt_turns().to_vec(), self.user.clone())
    }

    /// Replace history and user persona with a saved document.
    pub fn restore(&mut self, document: SessionDocument) {
        self.window = ContextWindow::from_turns(document.history);
        self.user = document.user_persona;
        self.refresh_mood();
        info!(session = %self.id, turns = self.window.len(), "session restored");
    }

    fn require_persona(&self) -> Result<&Persona> {
        self.persona.as_ref().ok_or(SessionError::ConfigMissing)
    }

    fn render_prompt(&self, history: &[Turn], pending: PendingTurn<'_>) -> Result<String> {
        let persona = self.require_persona()?;
        let diary = self
            .diary
            .as_ref()
            .map(|source| source.recent_entries(self.config.diary_limit))
            .unwrap_or_default();
        let scene = SceneContext::new(persona.scene.clone()).with_now((self.clock)());

        Ok(self.builder.build(&PromptInputs {
            persona,
            history,
            lore: &self.lore,
            user: &self.user,
            scene: &scene,
            diary: &diary,
            pending,
        }))
    }

    fn refresh_mood(&mut self) {
        let delimiters = self.config.delimiters();
        self.current_mood = self
            .window
            .as_prompt_turns()
            .iter()
            .rev()
            .find(|turn| turn.is_assistant())
            .map_or_else(Mood::neutral, |turn| {
                ParsedTurn::from_raw(&turn.content, &delimiters).mood
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FragmentStream, ReplayFragmentStream};
    use crate::error::BackendError;
    use crate::prompt_builder::DiaryEntry;
    use crate::stream_parser::StreamEvent;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Script {
        Reply(Vec<&'static str>),
        FailAfter(Vec<&'static str>),
        Unavailable,
        Hang,
    }

    struct ScriptedBackend {
        scripts: Mutex<VecDeque<Script>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        async fn generate(
            &self,
            prompt: &str,
            _params: &GenerationParams,
        ) -> std::result::Result<Box<dyn FragmentStream>, BackendError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let script = self.scripts.lock().unwrap().pop_front();
            match script {
                Some(Script::Reply(fragments)) => {
                    Ok(Box::new(ReplayFragmentStream::from_text(fragments)))
                }
                Some(Script::FailAfter(fragments)) => {
                    let items = fragments
                        .into_iter()
                        .map(|f| Ok(f.to_string()))
                        .chain(std::iter::once(Err(BackendError::StreamInterrupted(
                            "connection reset".to_string(),
                        ))));
                    Ok(Box::new(ReplayFragmentStream::new(items)))
                }
                Some(Script::Hang) => std::future::pending().await,
                Some(Script::Unavailable) | None => {
                    Err(BackendError::Unavailable("backend offline".to_string()))
                }
            }
        }
    }

    fn fixed_clock() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(18, 30, 0)
            .unwrap()
    }

    fn persona() -> Persona {
        Persona::new("Aria", "A cheerful tavern keeper.")
            .with_scenario("Aria runs the Gilded Mug.")
            .with_lore("Excalibur", "a sword of light")
            .with_avatar("neutral", "aria_neutral.png")
            .with_avatar("happy", "aria_happy.png")
    }

    fn session(backend: Arc<ScriptedBackend>) -> GenerationSession {
        GenerationSession::new(backend, SessionConfig::default())
            .with_persona(persona())
            .with_clock(fixed_clock)
    }

    fn params() -> GenerationParams {
        GenerationParams::default()
    }

    fn expect_err<T>(result: Result<T>) -> SessionError {
        match result {
            Ok(_) => panic!("expected an error"),
            Err(err) => err,
        }
    }

    fn history(turns: &[(&str, &str)]) -> SessionDocument {
        let turns = turns
            .iter()
            .map(|(role, content)| match *role {
                "user" => Turn::user(*content),
                _ => Turn::assistant(*content),
            })
            .collect();
        SessionDocument::new(turns, UserPersona::default())
    }

    const HAPPY_REPLY: &[&str] = &[
        "<thought>I feel ",
        "happy</thought>Hel",
        "lo there!\n[Mood: Happy]",
    ];

    #[tokio::test]
    async fn test_respond_commits_raw_turn() {
        let backend = ScriptedBackend::new(vec![Script::Reply(HAPPY_REPLY.to_vec())]);
        let mut session = session(backend);

        let parsed = session.respond("Hi Aria", &params()).await.unwrap().collect().await.unwrap();

        assert_eq!(parsed.thought.as_deref(), Some("I feel happy"));
        assert_eq!(parsed.speech, "Hello there!");
        assert_eq!(parsed.mood.as_str(), "happy");

        let turns = session.history();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "Hi Aria");
        assert_eq!(
            turns[1].content,
            "<thought>I feel happy</thought>Hello there!\n[Mood: Happy]"
        );
        assert_eq!(session.current_mood().as_str(), "happy");
        assert_eq!(session.current_avatar(), "aria_happy.png");
        assert_eq!(session.display_turn(1), Some(parsed));
        assert_eq!(session.display_turn(0), None);
    }

    #[tokio::test]
    async fn test_events_arrive_incrementally() {
        let backend = ScriptedBackend::new(vec![Script::Reply(HAPPY_REPLY.to_vec())]);
        let mut session = session(backend);

        let mut stream = session.respond("Hi", &params()).await.unwrap();
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event.unwrap());
        }
        assert!(stream.is_committed());
        drop(stream);

        assert_eq!(events[0], StreamEvent::ThinkingStarted);
        assert_eq!(
            events[1],
            StreamEvent::ThinkingFinished {
                thought: Some("I feel happy".to_string())
            }
        );
        let speech: String = events.iter().filter_map(StreamEvent::speech).collect();
        assert_eq!(speech, "Hello there!\n[Mood: Happy]");
        assert!(matches!(events.last(), Some(StreamEvent::Completed(_))));
    }

    #[tokio::test]
    async fn test_plain_reply() {
        let backend = ScriptedBackend::new(vec![Script::Reply(vec!["Just a ", "plain reply."])]);
        let mut session = session(backend);

        let parsed = session.respond("Hi", &params()).await.unwrap().collect().await.unwrap();

        assert_eq!(parsed.thought, None);
        assert_eq!(parsed.speech, "Just a plain reply.");
        assert!(parsed.mood.is_neutral());
        assert_eq!(session.current_avatar(), "aria_neutral.png");
    }

    #[tokio::test]
    async fn test_no_persona_fails_fast() {
        let backend = ScriptedBackend::new(vec![Script::Reply(vec!["hi"])]);
        let mut session = GenerationSession::new(backend.clone(), SessionConfig::default());

        let err = expect_err(session.respond("Hi", &params()).await);
        assert!(matches!(err, SessionError::ConfigMissing));
        assert!(matches!(session.regenerate(), Err(SessionError::ConfigMissing)));
        assert!(matches!(session.edit(0, "x"), Err(SessionError::ConfigMissing)));
        assert!(matches!(
            session.update_lore("a", "b"),
            Err(SessionError::ConfigMissing)
        ));
        assert!(session.history().is_empty());
        assert!(backend.prompts().is_empty());
        assert_eq!(session.current_avatar(), DEFAULT_AVATAR);
    }

    #[tokio::test]
    async fn test_regenerate_requires_trailing_assistant() {
        let mut session = session(ScriptedBackend::new(vec![]));
        session.restore(history(&[("user", "a"), ("assistant", "b"), ("user", "c")]));
        let before = session.window().clone();

        assert!(matches!(
            session.regenerate(),
            Err(SessionError::NoAssistantTurnToRegenerate)
        ));
        assert_eq!(session.window(), &before);

        let err = expect_err(session.regenerate_response(&params()).await);
        assert!(matches!(err, SessionError::NoAssistantTurnToRegenerate));
        assert_eq!(session.window(), &before);
    }

    #[tokio::test]
    async fn test_regenerate_reuses_user_turn() {
        let backend = ScriptedBackend::new(vec![
            Script::Reply(vec!["First. [Mood: sad]"]),
            Script::Reply(vec!["Second. [Mood: happy]"]),
        ]);
        let mut session = session(backend.clone());

        session.respond("Hi", &params()).await.unwrap().collect().await.unwrap();
        assert_eq!(session.current_mood().as_str(), "sad");

        let parsed = session
            .regenerate_response(&params())
            .await
            .unwrap()
            .collect()
            .await
            .unwrap();

        assert_eq!(parsed.speech, "Second.");
        let contents: Vec<&str> = session.history().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["Hi", "Second. [Mood: happy]"]);

        // Both prompts end with the same single user turn.
        let prompts = backend.prompts();
        assert_eq!(prompts[0], prompts[1]);
        assert_eq!(prompts[1].matches("<|end_header_id|>\n\nHi<|eot_id|>").count(), 1);
    }

    #[tokio::test]
    async fn test_manual_regenerate_then_respond() {
        let backend = ScriptedBackend::new(vec![
            Script::Reply(vec!["One."]),
            Script::Reply(vec!["Two."]),
        ]);
        let mut session = session(backend);

        session.respond("Hi", &params()).await.unwrap().collect().await.unwrap();
        let popped = session.regenerate().unwrap();
        assert_eq!(popped.content, "One.");
        assert_eq!(session.history().len(), 1);

        session.respond("Hi", &params()).await.unwrap().collect().await.unwrap();
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[1].content, "Two.");
    }

    #[tokio::test]
    async fn test_cancel_discards_partial_turn() {
        let backend = ScriptedBackend::new(vec![
            Script::Reply(vec!["<thought>hmm</thought>", "Hel", "lo", "!"]),
            Script::Reply(vec!["Hello!"]),
        ]);
        let mut session = session(backend);
        session.restore(history(&[("user", "earlier"), ("assistant", "reply")]));
        let before = session.window().clone();

        {
            let mut stream = session.respond("Hi", &params()).await.unwrap();
            assert!(stream.next().await.is_some());
            assert!(stream.next().await.is_some());
            assert!(stream.next().await.is_some());
            assert!(!stream.raw().is_empty());
        }
        assert_eq!(session.window(), &before);

        session.respond("Hi", &params()).await.unwrap().collect().await.unwrap();
        let contents: Vec<&str> = session.history().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["earlier", "reply", "Hi", "Hello!"]);
    }

    #[tokio::test]
    async fn test_cancel_keeps_reused_user_turn() {
        let backend = ScriptedBackend::new(vec![Script::Reply(vec!["a", "b"])]);
        let mut session = session(backend);
        session.restore(history(&[("user", "Hi")]));

        {
            let mut stream = session.respond("Hi", &params()).await.unwrap();
            stream.next().await;
        }

        assert_eq!(session.history().len(), 1);
        assert!(session.history()[0].is_user());
    }

    #[tokio::test]
    async fn test_cancel_restores_evicted_turns() {
        let backend = ScriptedBackend::new(vec![Script::Reply(vec!["partial", "more"])]);
        let config = SessionConfig {
            max_context_tokens: 10,
            ..SessionConfig::default()
        };
        let mut session = GenerationSession::new(backend, config).with_persona(persona());
        session.restore(history(&[
            ("user", "a fairly long opening message"),
            ("assistant", "an equally long answer to it"),
            ("user", "second message"),
            ("assistant", "second answer"),
        ]));
        let before = session.window().clone();

        {
            let mut stream = session.respond("third", &params()).await.unwrap();
            stream.next().await;
        }

        assert_eq!(session.window(), &before);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_rolls_back() {
        let backend = ScriptedBackend::new(vec![Script::FailAfter(vec!["Hel", "lo"])]);
        let mut session = session(backend);

        let mut stream = session.respond("Hi", &params()).await.unwrap();
        let mut failure = None;
        while let Some(event) = stream.next().await {
            if let Err(err) = event {
                failure = Some(err);
            }
        }
        assert!(!stream.is_committed());
        drop(stream);

        assert!(matches!(
            failure,
            Some(SessionError::Backend(BackendError::StreamInterrupted(_)))
        ));
        assert!(session.history().is_empty());
        assert!(session.current_mood().is_neutral());
    }

    #[tokio::test]
    async fn test_backend_unavailable_rolls_back() {
        let backend = ScriptedBackend::new(vec![Script::Unavailable]);
        let mut session = session(backend);
        session.restore(history(&[("user", "a"), ("assistant", "b")]));

        let err = expect_err(session.respond("Hi", &params()).await);

        assert!(matches!(
            err,
            SessionError::Backend(BackendError::Unavailable(_))
        ));
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn test_budget_eviction_on_respond() {
        let backend = ScriptedBackend::new(vec![Script::Reply(vec!["ok"])]);
        let config = SessionConfig {
            max_context_tokens: 10,
            ..SessionConfig::default()
        };
        let mut session = GenerationSession::new(backend.clone(), config).with_persona(persona());
        session.restore(history(&[
            ("user", "a fairly long opening message"),
            ("assistant", "an equally long answer to it"),
            ("user", "second message"),
            ("assistant", "second answer"),
        ]));

        session.respond("third", &params()).await.unwrap().collect().await.unwrap();

        let contents: Vec<&str> = session.history().iter().map(|t| t.content.as_str()).collect();
        // Only the opening pair goes; the rest fits the budget.
        assert_eq!(contents, vec!["second message", "second answer", "third", "ok"]);
        assert!(!backend.prompts()[0].contains("a fairly long opening message"));
    }

    #[tokio::test]
    async fn test_continue_extends_last_turn() {
        let backend = ScriptedBackend::new(vec![Script::Reply(vec![" there!", "\n[Mood: shy]"])]);
        let mut session = session(backend.clone());
        session.restore(history(&[
            ("user", "Hi"),
            ("assistant", "<thought>a guest</thought>Hello"),
        ]));

        let mut stream = session.continue_response(&params()).await.unwrap();
        let mut speech = String::new();
        let mut parsed = None;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                StreamEvent::Speech(text) => speech.push_str(&text),
                StreamEvent::Completed(turn) => parsed = Some(turn),
                _ => {}
            }
        }
        drop(stream);

        assert_eq!(speech, " there!\n[Mood: shy]");
        let parsed = parsed.unwrap();
        assert_eq!(parsed.thought.as_deref(), Some("a guest"));
        assert_eq!(parsed.speech, "Hello there!");
        assert_eq!(session.history().len(), 2);
        assert_eq!(
            session.history()[1].content,
            "<thought>a guest</thought>Hello there!\n[Mood: shy]"
        );
        assert_eq!(session.current_mood().as_str(), "shy");
        assert!(backend.prompts()[0]
            .ends_with("<|start_header_id|>assistant<|end_header_id|>\n\n<thought>a guest</thought>Hello"));
    }

    #[tokio::test]
    async fn test_continue_requires_trailing_assistant() {
        let mut session = session(ScriptedBackend::new(vec![]));
        session.restore(history(&[("user", "Hi")]));

        let err = expect_err(session.continue_response(&params()).await);
        assert!(matches!(err, SessionError::NoAssistantTurnToContinue));
    }

    #[tokio::test]
    async fn test_cancelled_continue_leaves_turn() {
        let backend = ScriptedBackend::new(vec![Script::Reply(vec![" more", " words"])]);
        let mut session = session(backend);
        session.restore(history(&[("user", "Hi"), ("assistant", "Hello")]));

        {
            let mut stream = session.continue_response(&params()).await.unwrap();
            stream.next().await;
        }

        assert_eq!(session.history()[1].content, "Hello");
    }

    #[tokio::test]
    async fn test_edit() {
        let mut session = session(ScriptedBackend::new(vec![]));
        session.restore(history(&[("user", "Hi"), ("assistant", "Hello [Mood: calm]")]));
        assert_eq!(session.current_mood().as_str(), "calm");

        session.edit(1, "Hello [Mood: happy]").unwrap();
        assert_eq!(session.history()[1].content, "Hello [Mood: happy]");
        assert_eq!(session.current_mood().as_str(), "happy");

        let err = expect_err(session.edit(5, "nope"));
        assert!(matches!(err, SessionError::InvalidEditIndex { index: 5, len: 2 }));
    }

    #[tokio::test]
    async fn test_reset_keeps_persona_and_lore() {
        let backend = ScriptedBackend::new(vec![Script::Reply(vec!["Hi! [Mood: happy]"])]);
        let mut session = session(backend);
        session.respond("Hi", &params()).await.unwrap().collect().await.unwrap();

        session.reset();

        assert!(session.history().is_empty());
        assert!(session.current_mood().is_neutral());
        assert_eq!(session.persona().map(|p| p.name.as_str()), Some("Aria"));
        assert_eq!(session.lorebook().len(), 1);
    }

    #[tokio::test]
    async fn test_lore_passthrough_reaches_prompt() {
        let backend = ScriptedBackend::new(vec![
            Script::Reply(vec!["ok"]),
            Script::Reply(vec!["ok"]),
        ]);
        let mut session = session(backend.clone());

        session.update_lore("Avalon", "an island of apples").unwrap();
        session.respond("Take me to avalon", &params()).await.unwrap().collect().await.unwrap();
        assert!(backend.prompts()[0].contains("- Avalon: an island of apples"));

        assert!(session.remove_lore("Avalon").unwrap().is_some());
        assert!(session.remove_lore("Avalon").unwrap().is_none());
        session.reset();
        session.respond("Take me to avalon", &params()).await.unwrap().collect().await.unwrap();
        assert!(!backend.prompts()[1].contains("Relevant World Info"));

        let err = expect_err(session.update_lore("  ", "blank"));
        assert!(matches!(err, SessionError::MalformedLoreUpdate(_)));

        let persona = session.persona().unwrap();
        assert_eq!(persona.lorebook, session.lorebook().to_lorebook());
    }

    #[tokio::test]
    async fn test_prompt_is_deterministic_across_sessions() {
        let first = ScriptedBackend::new(vec![Script::Reply(vec!["ok"])]);
        let second = ScriptedBackend::new(vec![Script::Reply(vec!["ok"])]);
        let mut a = session(first.clone());
        let mut b = session(second.clone());

        a.respond("Tell me about Excalibur", &params()).await.unwrap().collect().await.unwrap();
        b.respond("Tell me about Excalibur", &params()).await.unwrap().collect().await.unwrap();

        assert_eq!(first.prompts(), second.prompts());
        assert!(first.prompts()[0].contains("- Date and time: 2024-05-01 18:30 (Wednesday)"));
        assert!(first.prompts()[0].contains("- Excalibur: a sword of light"));
    }

    #[tokio::test]
    async fn test_diary_entries_in_prompt() {
        let backend = ScriptedBackend::new(vec![Script::Reply(vec!["ok"])]);
        let diary: Vec<DiaryEntry> = (1..=5)
            .map(|day| DiaryEntry::new(format!("2024-04-0{day} 21:00"), format!("day {day}")))
            .collect();
        let mut session = session(backend.clone()).with_diary(Arc::new(diary));

        session.respond("Hi", &params()).await.unwrap().collect().await.unwrap();

        let prompt = &backend.prompts()[0];
        assert!(prompt.contains(
            "### Recent Memories\n- [2024-04-03 21:00] day 3\n- [2024-04-04 21:00] day 4\n- [2024-04-05 21:00] day 5"
        ));
        assert!(!prompt.contains("day 2"));
    }

    #[tokio::test]
    async fn test_summarize_returns_speech_only() {
        let backend = ScriptedBackend::new(vec![
            Script::Reply(vec!["Hi! [Mood: happy]"]),
            Script::Reply(vec!["<thought>recall</thought>Dear diary, ", "Sam visited. [Mood: content]"]),
        ]);
        let mut session = session(backend.clone());
        session.respond("Hi", &params()).await.unwrap().collect().await.unwrap();
        let before = session.window().clone();

        let entry = session.summarize(&params()).await.unwrap();

        assert_eq!(entry, "Dear diary, Sam visited.");
        assert_eq!(session.window(), &before);
        assert!(backend.prompts()[1].contains("Write a short diary entry"));
    }

    #[tokio::test]
    async fn test_summarize_propagates_backend_errors() {
        let session = session(ScriptedBackend::new(vec![Script::FailAfter(vec!["Dear"])]));

        let err = expect_err(session.summarize(&params()).await);
        assert!(matches!(err, SessionError::Backend(_)));
    }

    #[test]
    fn test_apply_sentiment() {
        let mut session = session(ScriptedBackend::new(vec![]));
        let before = session.persona().unwrap().stats;

        let delta = session.apply_sentiment("Thank you, I love this!").unwrap();

        assert_eq!(delta.affection, 2);
        let after = session.persona().unwrap().stats;
        assert_eq!(after.affection, before.affection + 2);
        assert_eq!(after.energy, before.energy);
        assert!(session.analyze_sentiment("weather").is_zero());
    }

    #[tokio::test]
    async fn test_dropped_respond_future_rolls_back() {
        let backend = ScriptedBackend::new(vec![Script::Hang]);
        let mut session = session(backend.clone());
        session.restore(history(&[("user", "Hi"), ("assistant", "Hey [Mood: happy]")]));
        let before = session.history().to_vec();
        let params = params();

        tokio::select! {
            biased;
            _ = session.respond("Still there?", &params) => panic!("generation never starts"),
            _ = std::future::ready(()) => {}
        }

        assert_eq!(backend.prompts().len(), 1);
        assert_eq!(session.history(), before.as_slice());
        assert_eq!(session.current_mood().as_str(), "happy");
    }

    #[test]
    fn test_sessions_are_isolated() {
        let mut a = session(ScriptedBackend::new(vec![]));
        let b = session(ScriptedBackend::new(vec![]));
        a.update_lore("Avalon", "an island of apples").unwrap();
        a.restore(history(&[("user", "Hi")]));

        assert_ne!(a.id(), b.id());
        assert_eq!(b.lorebook().len(), 1);
        assert!(b.history().is_empty());
    }

    #[test]
    fn test_switch_persona() {
        let mut session = session(ScriptedBackend::new(vec![]));
        session.restore(history(&[("user", "Hi"), ("assistant", "Hey [Mood: happy]")]));

        let previous = session.switch_persona(Persona::new("Bram", "A grumpy blacksmith."));

        assert_eq!(previous.map(|p| p.name), Some("Aria".to_string()));
        assert!(session.history().is_empty());
        assert!(session.lorebook().is_empty());
        assert!(session.current_mood().is_neutral());
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut session = session(ScriptedBackend::new(vec![]))
            .with_user_persona(UserPersona::new("Sam", "A bard."));
        session.restore(history(&[("user", "Hi"), ("assistant", "Hey [Mood: happy]")]));
        session.set_user_persona(UserPersona::new("Sam", "A bard."));

        let json = session.snapshot().to_json_pretty().unwrap();
        let mut other = GenerationSession::new(ScriptedBackend::new(vec![]), SessionConfig::default())
            .with_persona(persona());
        other.restore(SessionDocument::from_json(&json).unwrap());

        assert_eq!(other.history(), session.history());
        assert_eq!(other.user_persona().name, "Sam");
        assert_eq!(other.current_mood().as_str(), "happy");
    }

    #[test]
    fn test_set_scene() {
        let mut session = session(ScriptedBackend::new(vec![]));
        session.set_scene(SceneState::new().at("The forge").with_hour(7)).unwrap();

        let scene = &session.persona().unwrap().scene;
        assert_eq!(scene.location.as_deref(), Some("The forge"));
        assert_eq!(scene.hour, Some(7));
    }
}
