//! Persona definitions.

use serde::{Deserialize, Serialize};

use super::{AvatarMap, LoreEntry, PersonaStats};
use crate::error::SheetError;
use crate::world_state::SceneState;

/// A full persona definition: who the companion is and where they are right now.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub description: String,

    #[serde(default)]
    pub scenario: String,
    #[serde(default)]
    pub example_dialogue: String,

    /// Keyword -> fact, in authoring order.
    #[serde(default, with = "crate::ordered_map")]
    pub lorebook: Vec<LoreEntry>,

    #[serde(default, rename = "avatar_emotion_map")]
    pub avatars: AvatarMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,

    #[serde(default)]
    pub stats: PersonaStats,
    #[serde(default)]
    pub scene: SceneState,
}

impl Persona {
    /// Create a new persona with the given name and description.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            scenario: String::new(),
            example_dialogue: String::new(),
            lorebook: Vec::new(),
            avatars: AvatarMap::new(),
            background_image: None,
            stats: PersonaStats::default(),
            scene: SceneState::default(),
        }
    }

    /// Read a persona card (the `config.json` shape used by character folders).
    ///
    /// `name` and `description` must be present and non-blank.
    pub fn from_json(json: &str) -> Result<Self, SheetError> {
        let mut persona: Persona = serde_json::from_str(json)?;
        if persona.name.trim().is_empty() {
            return Err(SheetError::MissingField("name"));
        }
        if persona.description.trim().is_empty() {
            return Err(SheetError::MissingField("description"));
        }
        persona.scene.hour = persona.scene.hour.map(|hour| hour % 24);
        Ok(persona)
    }

    /// Render the persona back to card JSON.
    pub fn to_json(&self) -> Result<String, SheetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = scenario.into();
        self
    }

    pub fn with_example_dialogue(mut self, dialogue: impl Into<String>) -> Self {
        self.example_dialogue = dialogue.into();
        self
    }

    /// Add a lorebook entry. A repeated keyword replaces the earlier fact.
    pub fn with_lore(mut self, keyword: impl Into<String>, fact: impl Into<String>) -> Self {
        let entry = LoreEntry::new(keyword, fact);
        match self.lorebook.iter_mut().find(|e| e.keyword == entry.keyword) {
            Some(existing) => existing.fact = entry.fact,
            None => self.lorebook.push(entry),
        }
        self
    }

    pub fn with_avatar(mut self, mood: impl Into<String>, asset: impl Into<String>) -> Self {
        self.avatars.insert(mood, asset);
        self
    }

    pub fn with_stats(mut self, stats: PersonaStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_scene(mut self, scene: SceneState) -> Self {
        self.scene = scene;
        self
    }

    /// Avatar asset for a mood label.
    pub fn avatar_for(&self, mood: &str) -> &str {
        self.avatars.resolve(mood)
    }
}

/// The human side of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPersona {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Default for UserPersona {
    fn default() -> Self {
        Self {
            name: "User".to_string(),
            description: String::new(),
        }
    }
}

impl UserPersona {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}
