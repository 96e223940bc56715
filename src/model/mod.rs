//! Core data model: normalized content and curator state.

pub mod content;
pub mod curation;
