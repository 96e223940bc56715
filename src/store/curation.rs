//! Curation state: two whole-document JSON overlays on top of the catalog.
//!
//! - the order file `{"items": [...]}` lists every curated slot in order
//! - the exclusions file `{"exclusions": [...]}` hides single messages
//!
//! Both are read and written whole. There is no locking: the last completed
//! save replaces the previous document entirely.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{read_document, write_document};
use crate::config::PathsConfig;
use crate::error::Result;
use crate::model::content::ContentItem;
use crate::model::curation::{CurationEntry, ExclusionsDocument, MessageExclusion, OrderDocument};

/// Reads and writes the two curator state files.
#[derive(Debug, Clone)]
pub struct CurationStore {
    order_path: PathBuf,
    exclusions_path: PathBuf,
}

impl CurationStore {
    pub fn new(order_path: impl Into<PathBuf>, exclusions_path: impl Into<PathBuf>) -> Self {
        Self {
            order_path: order_path.into(),
            exclusions_path: exclusions_path.into(),
        }
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(&paths.order_file, &paths.exclusions_file)
    }

    pub fn order_path(&self) -> &Path {
        &self.order_path
    }

    pub fn exclusions_path(&self) -> &Path {
        &self.exclusions_path
    }

    /// Load the ordered entries. A missing or blank file is an empty order.
    pub fn load(&self) -> Result<Vec<CurationEntry>> {
        let doc: OrderDocument = read_document(&self.order_path)?;
        Ok(doc.items)
    }

    /// Replace the whole order document.
    pub fn save(&self, entries: &[CurationEntry]) -> Result<()> {
        let doc = OrderDocument {
            items: entries.to_vec(),
        };
        write_document(&self.order_path, &doc)?;
        info!(path = %self.order_path.display(), count = entries.len(), "Saved order");
        Ok(())
    }

    /// Load message exclusions. A missing or blank file means none.
    pub fn load_exclusions(&self) -> Result<Vec<MessageExclusion>> {
        let doc: ExclusionsDocument = read_document(&self.exclusions_path)?;
        Ok(doc.exclusions)
    }

    /// Replace the whole exclusions document.
    pub fn save_exclusions(&self, exclusions: &[MessageExclusion]) -> Result<()> {
        let doc = ExclusionsDocument {
            exclusions: exclusions.to_vec(),
        };
        write_document(&self.exclusions_path, &doc)?;
        info!(
            path = %self.exclusions_path.display(),
            count = exclusions.len(),
            "Saved message exclusions"
        );
        Ok(())
    }

    /// Append an entry for every catalog item not yet referenced.
    ///
    /// Existing entries are never reordered or removed. Returns the number of
    /// appended entries; the file is only written when that is non-zero.
    pub fn reconcile(&self, items: &[ContentItem]) -> Result<usize> {
        let mut entries = self.load()?;
        let added = reconcile_entries(&mut entries, items);
        if added > 0 {
            self.save(&entries)?;
        } else {
            debug!("Order already covers every catalog item");
        }
        Ok(added)
    }
}

/// Append one unexcluded entry per unreferenced item, in catalog order.
pub fn reconcile_entries(entries: &mut Vec<CurationEntry>, items: &[ContentItem]) -> usize {
    let known: HashSet<String> = entries.iter().map(|e| e.item_ref.clone()).collect();
    let before = entries.len();

    for item in items.iter().filter(|item| !known.contains(&item.id)) {
        info!(item = %item.id, "Appending new item to order");
        entries.push(CurationEntry {
            item_ref: item.id.clone(),
            title: item.title.clone(),
            kind: Some(item.kind),
            excluded: false,
        });
    }

    entries.len() - before
}
