//! `threadbook` - turn a mail export into a curated single-page chronicle.
//!
//! The pipeline normalizes an MBOX file (or a directory of `.eml` files) into
//! per-thread documents with deduplicated inline images, lets a curator order
//! and exclude content through a small HTTP API, and assembles the result into
//! one relocatable HTML document with an optional redaction pass.

pub mod assemble;
pub mod catalog;
pub mod config;
pub mod error;
pub mod model;
pub mod normalize;
pub mod parser;
pub mod redact;
pub mod server;
pub mod store;
