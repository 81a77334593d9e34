//! Session configuration.
//!
//! Hosts keep this in TOML next to their other settings and hand the text over; the engine
//! itself never reads files.

use serde::{Deserialize, Serialize};

use crate::backend::GenerationParams;
use crate::error::Result;

/// Chat template wrapped around the assembled prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptTemplate {
    /// Llama 3 header/eot markup.
    #[default]
    Llama3,
    /// `Name: text` transcript lines.
    Plain,
}

/// The delimiter pair the model is told to wrap its private reasoning in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThoughtDelimiters {
    pub open: String,
    pub close: String,
}

impl Default for ThoughtDelimiters {
    fn default() -> Self {
        Self {
            open: "<thought>".to_string(),
            close: "</thought>".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Token budget for the rolling history (see `ContextWindow::estimate_tokens`).
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// How many diary entries to inject as recent memories.
    #[serde(default = "default_diary_limit")]
    pub diary_limit: usize,

    #[serde(default)]
    pub template: PromptTemplate,

    #[serde(default = "default_thought_open")]
    pub thought_open: String,
    #[serde(default = "default_thought_close")]
    pub thought_close: String,

    /// Sampling defaults used when the caller has no overrides.
    #[serde(default)]
    pub params: GenerationParams,
}

fn default_max_context_tokens() -> usize {
    6000
}

fn default_diary_limit() -> usize {
    3
}

fn default_thought_open() -> String {
    ThoughtDelimiters::default().open
}

fn default_thought_close() -> String {
    ThoughtDelimiters::default().close
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            diary_limit: default_diary_limit(),
            template: PromptTemplate::default(),
            thought_open: default_thought_open(),
            thought_close: default_thought_close(),
            params: GenerationParams::default(),
        }
    }
}

impl SessionConfig {
    /// Parse from TOML text. Missing keys fall back to their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SessionConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn delimiters(&self) -> ThoughtDelimiters {
        ThoughtDelimiters {
            open: self.thought_open.clone(),
            close: self.thought_close.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.thought_open.is_empty() || self.thought_close.is_empty() {
            return Err(crate::error::SessionError::Config(
                "thought delimiters must not be empty".to_string(),
            ));
        }
        if self.thought_open == self.thought_close {
            return Err(crate::error::SessionError::Config(
                "thought delimiters must differ".to_string(),
            ));
        }
        Ok(())
    }
}
