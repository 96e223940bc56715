//! Input readers: MBOX streaming, `.eml` directories, header and MIME
//! decoding, and the notes XML export.

pub mod eml;
pub mod header;
pub mod mbox;
pub mod mime;
pub mod notes;
