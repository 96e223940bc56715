//! Curator state: the ordered inclusion list and message-level exclusions.

use serde::{Deserialize, Serialize};

use super::content::{ItemKind, NormalizedMessage};

/// One ordered slot in the final document. Position is the index in the list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurationEntry {
    /// Reference to a [`ContentItem`](super::content::ContentItem) id.
    #[serde(rename = "filename")]
    pub item_ref: String,
    /// Label used in the table of contents and section heading.
    pub title: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ItemKind>,
    /// Drops the whole item from the final document while keeping its slot.
    #[serde(default)]
    pub excluded: bool,
}

/// Persisted shape of the order file: `{"items": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderDocument {
    #[serde(default)]
    pub items: Vec<CurationEntry>,
}

/// Hides one message of a thread from final assembly.
///
/// Older state files only carry the rendered date; those keep matching by
/// date. Entries written with a `message_key` match by key, which survives
/// changes in date formatting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageExclusion {
    /// Id of the containing thread item.
    pub filename: String,
    /// Rendered date of the hidden message.
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_key: Option<String>,
}

impl MessageExclusion {
    /// Whether this exclusion hides `message` inside the item `item_id`.
    pub fn matches(&self, item_id: &str, message: &NormalizedMessage) -> bool {
        if self.filename != item_id {
            return false;
        }
        match &self.message_key {
            Some(key) => *key == message.key,
            None => self.date == message.date,
        }
    }
}

/// Persisted shape of the exclusions file: `{"exclusions": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExclusionsDocument {
    #[serde(default)]
    pub exclusions: Vec<MessageExclusion>,
}

/// True if any exclusion hides `message` inside `item_id`.
pub fn is_hidden(exclusions: &[MessageExclusion], item_id: &str, message: &NormalizedMessage) -> bool {
    exclusions.iter().any(|e| e.matches(item_id, message))
}
