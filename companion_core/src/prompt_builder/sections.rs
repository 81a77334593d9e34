//! Sections of the persona block, rendered in a fixed order.

use persona_sheet::{LoreEntry, Persona, PersonaStats, UserPersona, STAT_MAX};

use super::{DiaryEntry, SceneContext};
use crate::config::ThoughtDelimiters;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M (%A)";

pub(crate) fn preamble(persona: &Persona, user: &UserPersona) -> String {
    format!(
        "You are an expert actor that can fully immerse yourself into any role given. \
         You do not break character for any reason.\n\
         Currently your role is {name}, which is described in detail below.\n\
         As {name}, continue the exchange with {user}.",
        name = persona.name,
        user = user.name,
    )
}

/// Date, scene and stats. Lines for values that are not known are left out.
pub(crate) fn current_context(scene: &SceneContext, stats: &PersonaStats) -> String {
    let mut lines = Vec::new();
    if let Some(now) = scene.now {
        lines.push(format!("- Date and time: {}", now.format(DATE_FORMAT)));
    }
    if let Some(location) = &scene.scene.location {
        lines.push(format!("- Location: {location}"));
    }
    if let (Some(hour), Some(time_of_day)) = (scene.scene.hour, scene.scene.time_of_day()) {
        lines.push(format!("- In-world hour: {hour:02}:00 ({time_of_day})"));
    }
    lines.push(format!("- Affection: {}/{STAT_MAX}", stats.affection));
    lines.push(format!("- Energy: {}/{STAT_MAX}", stats.energy));

    section("Current Context", &lines.join("\n"))
}

pub(crate) fn memories(diary: &[DiaryEntry]) -> Option<String> {
    if diary.is_empty() {
        return None;
    }
    let lines: Vec<String> = diary
        .iter()
        .map(|entry| format!("- [{}] {}", entry.date, entry.content.trim()))
        .collect();
    Some(section("Recent Memories", &lines.join("\n")))
}

pub(crate) fn instructions(user: &UserPersona, delimiters: &ThoughtDelimiters) -> String {
    let body = format!(
        "1. Analyze the user's input ({user}) and your current emotional state.\n\
         2. Output your internal thoughts between {open} and {close}.\n\
         3. Then, respond to {user} in character.\n\
         4. End your reply with your mood on its own line, formatted as [Mood: <emotion>].",
        user = user.name,
        open = delimiters.open,
        close = delimiters.close,
    );
    section("Instructions", &body)
}

pub(crate) fn world_info(entries: &[&LoreEntry]) -> Option<String> {
    if entries.is_empty() {
        return None;
    }
    let lines: Vec<String> = entries
        .iter()
        .map(|entry| format!("- {}: {}", entry.keyword, entry.fact))
        .collect();
    Some(section("Relevant World Info", &lines.join("\n")))
}

/// `### Title` followed by the body. Blank bodies give `None`.
pub(crate) fn optional_section(title: &str, body: &str) -> Option<String> {
    let body = body.trim();
    (!body.is_empty()).then(|| section(title, body))
}

pub(crate) fn section(title: &str, body: &str) -> String {
    format!("### {title}\n{body}")
}
