//! # Persona Sheet
//!
//! The "Character Sheet" crate - holds the persona definition a companion is played from:
//! identity, description, scenario, example dialogue, lorebook, avatar moods, stats and the
//! current scene. This crate is the single source of truth for persona state and does not
//! contain any model logic.

pub mod entities;
pub mod error;
pub mod mechanics;
mod ordered_map;
pub mod world_state;

pub use entities::*;
pub use error::*;
pub use mechanics::*;
pub use world_state::*;
