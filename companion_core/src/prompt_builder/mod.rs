//! Prompt Builder - renders one persona-conditioned prompt string.
//!
//! The persona block is assembled in a fixed order:
//! 1. **Preamble**: role instruction naming the persona, "never break character"
//! 2. **Current Context**: date/time, location, in-world hour, stats
//! 3. **Character Description** and **Scenario**
//! 4. **About the user**: only when the user persona has a description
//! 5. **Recent Memories**: diary excerpts, most recent last
//! 6. **Instructions**: thought delimiters, in-character reply, mood tag
//! 7. **Example Dialogue**
//! 8. **Relevant World Info**: lore hits, only when something matched
//!
//! The block is then wrapped in the configured chat template together with
//! the turn history and the pending turn. Output is a pure function of the
//! inputs: no clock reads, no randomness, no map iteration.

mod sections;

use chrono::NaiveDateTime;
use persona_sheet::{Persona, SceneState, UserPersona};
use serde::{Deserialize, Serialize};

use crate::config::{PromptTemplate, SessionConfig, ThoughtDelimiters};
use crate::context_window::{Role, Turn};
use crate::lorebook::LoreIndex;

/// How many of the latest history turns are scanned for lore keywords.
pub const LORE_SCAN_TURNS: usize = 2;

const LLAMA3_BEGIN: &str = "<|begin_of_text|>";
const LLAMA3_EOT: &str = "<|eot_id|>";

/// One dated diary excerpt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub date: String,
    pub content: String,
}

impl DiaryEntry {
    pub fn new(date: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            content: content.into(),
        }
    }
}

/// Supplies past-event summaries for the prompt. The core never writes entries.
pub trait DiarySource: Send + Sync {
    /// The last `limit` entries, oldest first.
    fn recent_entries(&self, limit: usize) -> Vec<DiaryEntry>;
}

impl DiarySource for Vec<DiaryEntry> {
    fn recent_entries(&self, limit: usize) -> Vec<DiaryEntry> {
        let start = self.len().saturating_sub(limit);
        self[start..].to_vec()
    }
}

/// Real-world time plus in-world scene, both optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneContext {
    pub now: Option<NaiveDateTime>,
    pub scene: SceneState,
}

impl SceneContext {
    pub fn new(scene: SceneState) -> Self {
        Self { now: None, scene }
    }

    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self
    }
}

/// What the model is asked to produce next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingTurn<'a> {
    /// A new user message, followed by an open assistant turn.
    User(&'a str),
    /// Leave the trailing assistant turn of the history open for extension.
    ContinueAssistant,
}

impl PendingTurn<'_> {
    fn user_text(&self) -> &str {
        match self {
            PendingTurn::User(text) => text,
            PendingTurn::ContinueAssistant => "",
        }
    }
}

/// Everything a prompt is rendered from.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub persona: &'a Persona,
    /// Committed history, without the pending user turn.
    pub history: &'a [Turn],
    pub lore: &'a LoreIndex,
    pub user: &'a UserPersona,
    pub scene: &'a SceneContext,
    pub diary: &'a [DiaryEntry],
    pub pending: PendingTurn<'a>,
}

/// Renders prompts for one template and delimiter pair.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    template: PromptTemplate,
    delimiters: ThoughtDelimiters,
}

impl PromptBuilder {
    pub fn new(template: PromptTemplate, delimiters: ThoughtDelimiters) -> Self {
        Self {
            template,
            delimiters,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.template, config.delimiters())
    }

    pub fn template(&self) -> PromptTemplate {
        self.template
    }

    /// Render the full prompt: persona block, history, pending turn.
    pub fn build(&self, inputs: &PromptInputs<'_>) -> String {
        let system = self.persona_block(inputs);
        self.render(
            &system,
            inputs.history,
            inputs.pending,
            &inputs.persona.name,
            &inputs.user.name,
        )
    }

    /// The persona block alone, as it appears inside the system turn.
    pub fn persona_block(&self, inputs: &PromptInputs<'_>) -> String {
        let persona = inputs.persona;
        let mut blocks = vec![
            sections::preamble(persona, inputs.user),
            sections::current_context(inputs.scene, &persona.stats),
            sections::section("Character Description", persona.description.trim()),
        ];
        blocks.extend(sections::optional_section("Scenario", &persona.scenario));
        blocks.extend(sections::optional_section(
            &format!("About {}", inputs.user.name),
            &inputs.user.description,
        ));
        blocks.extend(sections::memories(inputs.diary));
        blocks.push(sections::instructions(inputs.user, &self.delimiters));
        blocks.extend(sections::optional_section(
            "Example Dialogue",
            &persona.example_dialogue,
        ));

        let scan_text = lore_scan_text(inputs.pending.user_text(), inputs.history);
        let hits = inputs.lore.active_entries(&scan_text);
        if !hits.is_empty() {
            tracing::debug!(hits = hits.len(), "lore entries activated");
        }
        blocks.extend(sections::world_info(&hits));

        blocks.join("\n\n")
    }

    /// Prompt for the diary flow: the persona writes a first-person entry about the history.
    pub fn build_summary(&self, persona: &Persona, history: &[Turn], user: &UserPersona) -> String {
        let system = format!(
            "You are {name}. Below is your latest conversation with {user}.\n\
             Write a short diary entry in the first person, as {name}, about what happened \
             and how you feel about it. Keep it under five sentences.",
            name = persona.name,
            user = user.name,
        );
        self.render(
            &system,
            history,
            PendingTurn::User("Write today's diary entry now."),
            &persona.name,
            &user.name,
        )
    }

    fn render(
        &self,
        system: &str,
        history: &[Turn],
        pending: PendingTurn<'_>,
        persona_name: &str,
        user_name: &str,
    ) -> String {
        let (closed, open) = match (pending, history.split_last()) {
            (PendingTurn::ContinueAssistant, Some((last, rest))) if last.is_assistant() => {
                (rest, Some(last.content.as_str()))
            }
            _ => (history, None),
        };

        match self.template {
            PromptTemplate::Llama3 => render_llama3(system, closed, pending, open),
            PromptTemplate::Plain => {
                let names = SpeakerNames {
                    persona: persona_name,
                    user: user_name,
                };
                render_plain(system, closed, pending, open, &names)
            }
        }
    }
}

/// The pending user text and the latest history turns, one per line.
fn lore_scan_text(user_text: &str, history: &[Turn]) -> String {
    let start = history.len().saturating_sub(LORE_SCAN_TURNS);
    let mut parts: Vec<&str> = history[start..].iter().map(|t| t.content.as_str()).collect();
    parts.push(user_text);
    parts.join("\n")
}

fn llama3_header(out: &mut String, role: &str) {
    out.push_str("<|start_header_id|>");
    out.push_str(role);
    out.push_str("<|end_header_id|>\n\n");
}

fn llama3_block(out: &mut String, role: &str, content: &str) {
    llama3_header(out, role);
    out.push_str(content);
    out.push_str(LLAMA3_EOT);
}

fn render_llama3(
    system: &str,
    closed: &[Turn],
    pending: PendingTurn<'_>,
    open: Option<&str>,
) -> String {
    let mut out = String::from(LLAMA3_BEGIN);
    llama3_block(&mut out, Role::System.as_str(), system);
    for turn in closed {
        llama3_block(&mut out, turn.role.as_str(), &turn.content);
    }
    if let PendingTurn::User(text) = pending {
        llama3_block(&mut out, Role::User.as_str(), text);
    }
    llama3_header(&mut out, Role::Assistant.as_str());
    if let Some(content) = open {
        out.push_str(content);
    }
    out
}

struct SpeakerNames<'a> {
    persona: &'a str,
    user: &'a str,
}

impl SpeakerNames<'_> {
    fn of(&self, role: Role) -> &str {
        match role {
            Role::User => self.user,
            Role::Assistant => self.persona,
            Role::System => "System",
        }
    }
}

fn render_plain(
    system: &str,
    closed: &[Turn],
    pending: PendingTurn<'_>,
    open: Option<&str>,
    names: &SpeakerNames<'_>,
) -> String {
    let mut out = String::from(system);
    out.push_str("\n\n");
    for turn in closed {
        out.push_str(&format!("{}: {}\n", names.of(turn.role), turn.content));
    }
    if let PendingTurn::User(text) = pending {
        out.push_str(&format!("{}: {}\n", names.user, text));
    }
    out.push_str(names.persona);
    out.push(':');
    if let Some(content) = open {
        out.push(' ');
        out.push_str(content);
    }
    out
}
