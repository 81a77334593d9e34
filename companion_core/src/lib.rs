//! # Companion Core (The Brain)
//!
//! The conversation context engine of a role-play companion. This crate reads
//! persona state from `persona_sheet`, assembles persona-conditioned prompts,
//! keeps a token-bounded rolling history and splits the model's streamed
//! output into thought, speech and mood as it arrives.
//!
//! ## Core Components
//!
//! - **lorebook**: Keyword-triggered world facts
//! - **context_window**: Rolling turn history with budget eviction
//! - **prompt_builder**: Renders persona, lore, diary and history into one prompt
//! - **stream_parser**: Incremental thought/speech/mood state machine
//! - **session**: Orchestrates respond, regenerate, continue, edit and reset
//! - **backend**: The generation backend and fragment stream contracts
//! - **persistence**: The saved session document
//!
//! ## Design Philosophy
//!
//! - **Raw Storage**: Assistant turns keep the raw model output; the display split is always re-derived
//! - **Commit on Completion**: Only a fully completed stream changes the history
//! - **Isolated Sessions**: Each session owns its window, lore and persona snapshot

pub mod backend;
pub mod config;
pub mod context_window;
pub mod error;
pub mod lorebook;
pub mod persistence;
pub mod prompt_builder;
pub mod session;
pub mod stream_parser;

pub use backend::*;
pub use config::*;
pub use context_window::*;
pub use error::*;
pub use lorebook::*;
pub use persistence::*;
pub use prompt_builder::*;
pub use session::*;
pub use stream_parser::*;
