//! Entity definitions for the persona sheet.

mod components;
mod persona;

pub use components::*;
pub use persona::*;
