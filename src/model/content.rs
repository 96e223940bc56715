//! Normalized content: thread and notes documents, and the catalog items that point into them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator between a document name and a fragment id in an item reference.
pub const FRAGMENT_SEPARATOR: char = '#';

/// What kind of unit a [`ContentItem`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A group of messages sharing a canonical subject.
    #[serde(alias = "email")]
    Thread,
    /// A single note (or, for legacy entries, the whole notes document).
    #[serde(alias = "notes")]
    Note,
}

/// A unit the curator can place in the final document.
///
/// The `id` is the reference stored in curation state, so it must stay stable
/// across normalization runs: a thread document file name, or
/// `<notes document>#<fragment id>` for a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "filename")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub title: String,
    /// Rendered date of the first message (threads only).
    pub date: Option<String>,
    /// Number of messages (threads) or 1 (notes).
    pub messages: usize,
}

impl ContentItem {
    /// Where the normalized body of this item lives.
    pub fn source_ref(&self) -> SourceRef {
        SourceRef::parse(&self.id)
    }
}

/// Pointer to a normalized body: a document, plus a fragment id for notes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRef {
    pub document: String,
    pub fragment: Option<String>,
}

impl SourceRef {
    /// Split `doc#fragment` into its parts. An empty fragment counts as none.
    pub fn parse(reference: &str) -> Self {
        match reference.split_once(FRAGMENT_SEPARATOR) {
            Some((doc, frag)) if !frag.is_empty() => Self {
                document: doc.to_string(),
                fragment: Some(frag.to_string()),
            },
            Some((doc, _)) => Self {
                document: doc.to_string(),
                fragment: None,
            },
            None => Self {
                document: reference.to_string(),
                fragment: None,
            },
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fragment {
            Some(frag) => write!(f, "{}{FRAGMENT_SEPARATOR}{frag}", self.document),
            None => write!(f, "{}", self.document),
        }
    }
}

/// A normalized thread, persisted as one JSON document per thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadDocument {
    /// Canonical subject (reply/forward prefixes stripped).
    pub subject: String,
    /// Messages in arrival order of the source export.
    pub messages: Vec<NormalizedMessage>,
}

/// One message of a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    /// Stable identifier derived from the Message-ID (or date and body).
    pub key: String,
    /// Rendered date string (the raw `Date:` header).
    pub date: String,
    /// Self-contained HTML fragment with image references resolved.
    pub body: String,
}

/// The normalized notes document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteDocument {
    #[serde(default)]
    pub notes: Vec<Note>,
}

impl NoteDocument {
    /// Look up a note by fragment id.
    pub fn find(&self, fragment: &str) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == fragment)
    }
}

/// A single note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Fragment id, assigned when the notes document is generated.
    pub id: String,
    pub title: String,
    /// HTML body.
    pub body: String,
}
