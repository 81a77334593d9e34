//! Session documents - the JSON shape the persistence collaborator saves and loads.
//!
//! Current form: `{"history": [Turn], "user_persona": {"name", "description"}}`.
//! Older saves are a bare array of turns; those load with the default user persona.

use persona_sheet::UserPersona;
use serde::{Deserialize, Serialize};

use crate::context_window::Turn;
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionDocument {
    pub history: Vec<Turn>,
    pub user_persona: UserPersona,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentWire {
    Legacy(Vec<Turn>),
    Wrapped {
        #[serde(default)]
        history: Vec<Turn>,
        #[serde(default, alias = "userPersona")]
        user_persona: UserPersona,
    },
}

impl<'de> Deserialize<'de> for SessionDocument {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(match DocumentWire::deserialize(deserializer)? {
            DocumentWire::Legacy(history) => SessionDocument {
                history,
                user_persona: UserPersona::default(),
            },
            DocumentWire::Wrapped {
                history,
                user_persona,
            } => SessionDocument {
                history,
                user_persona,
            },
        })
    }
}

impl SessionDocument {
    pub fn new(history: Vec<Turn>, user_persona: UserPersona) -> Self {
        Self {
            history,
            user_persona,
        }
    }

    /// Parse either document form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
