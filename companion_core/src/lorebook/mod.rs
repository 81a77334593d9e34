//! Lorebook module - keyword-triggered world knowledge.
//!
//! The lorebook consists of:
//! - **Keywords**: case-folded trigger strings matched as literal substrings
//! - **Entries**: one fact per keyword, kept in insertion order
//! - **Index**: scans text and returns every entry whose keyword occurs in it

mod index;
mod keyword;

pub use index::*;
pub use keyword::*;
