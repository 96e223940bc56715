//! Content catalog: every normalized thread and note available for curation.
//!
//! The catalog is a read-only view over the normalizer's output. Listing it
//! twice over unchanged files yields the same items in the same order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::PathsConfig;
use crate::error::{BookError, Result};
use crate::model::content::{
    ContentItem, ItemKind, NoteDocument, ThreadDocument, FRAGMENT_SEPARATOR,
};
use crate::normalize::THREAD_EXTENSION;

/// Read access to normalized bodies, keyed the way curation entries refer to them.
pub trait ContentSource {
    /// The thread document with the given item id, `None` when it does not exist.
    fn thread(&self, id: &str) -> Result<Option<ThreadDocument>>;

    /// The notes document with the given name, `None` when it does not exist.
    fn notes(&self, document: &str) -> Result<Option<NoteDocument>>;
}

/// Filesystem catalog over `content_dir` and the notes document.
#[derive(Debug, Clone)]
pub struct Catalog {
    content_dir: PathBuf,
    notes_doc: PathBuf,
}

impl Catalog {
    pub fn new(content_dir: impl Into<PathBuf>, notes_doc: impl Into<PathBuf>) -> Self {
        Self {
            content_dir: content_dir.into(),
            notes_doc: notes_doc.into(),
        }
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(&paths.content_dir, &paths.notes_doc)
    }

    /// File name under which notes are referenced, e.g. `player_notes.json`.
    pub fn notes_document_name(&self) -> String {
        self.notes_doc
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Every thread and note, ordered by title (then id).
    ///
    /// Documents that cannot be parsed are logged and left out.
    pub fn list_items(&self) -> Result<Vec<ContentItem>> {
        let mut items = self.thread_items()?;
        items.extend(self.note_items()?);
        items.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        debug!(count = items.len(), "Listed catalog");
        Ok(items)
    }

    fn thread_items(&self) -> Result<Vec<ContentItem>> {
        let read_dir = match std::fs::read_dir(&self.content_dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %self.content_dir.display(), "Content directory missing");
                return Ok(Vec::new());
            }
            Err(e) => return Err(BookError::io(&self.content_dir, e)),
        };

        let notes_name = self.notes_document_name();
        let notes_here = self.notes_doc.parent().map(|p| same_dir(p, &self.content_dir));

        let mut items = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| BookError::io(&self.content_dir, e))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_thread_file(&path, &name) {
                continue;
            }
            if notes_here == Some(true) && name == notes_name {
                continue;
            }

            match read_thread(&path) {
                Ok(doc) => items.push(ContentItem {
                    id: name,
                    kind: ItemKind::Thread,
                    title: doc.subject,
                    date: doc
                        .messages
                        .first()
                        .map(|m| m.date.clone())
                        .filter(|d| !d.is_empty()),
                    messages: doc.messages.len(),
                }),
                Err(e) => warn!(error = %e, "Skipping unreadable thread document"),
            }
        }
        Ok(items)
    }

    fn note_items(&self) -> Result<Vec<ContentItem>> {
        let doc = match read_notes(&self.notes_doc) {
            Ok(Some(doc)) => doc,
            Ok(None) => return Ok(Vec::new()),
            Err(e @ BookError::InvalidDocument { .. }) => {
                warn!(error = %e, "Skipping unreadable notes document");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let document = self.notes_document_name();
        Ok(doc
            .notes
            .into_iter()
            .map(|note| ContentItem {
                id: format!("{document}{FRAGMENT_SEPARATOR}{}", note.id),
                kind: ItemKind::Note,
                title: note.title,
                date: None,
                messages: 1,
            })
            .collect())
    }
}

impl ContentSource for Catalog {
    fn thread(&self, id: &str) -> Result<Option<ThreadDocument>> {
        if !is_plain_file_name(id) {
            return Ok(None);
        }
        let path = self.content_dir.join(id);
        match read_thread(&path) {
            Ok(doc) => Ok(Some(doc)),
            Err(BookError::FileNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn notes(&self, document: &str) -> Result<Option<NoteDocument>> {
        if document != self.notes_document_name() {
            return Ok(None);
        }
        read_notes(&self.notes_doc)
    }
}

/// In-memory content, for callers that already hold the documents.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    pub threads: HashMap<String, ThreadDocument>,
    pub notes: HashMap<String, NoteDocument>,
}

impl ContentSource for MemorySource {
    fn thread(&self, id: &str) -> Result<Option<ThreadDocument>> {
        Ok(self.threads.get(id).cloned())
    }

    fn notes(&self, document: &str) -> Result<Option<NoteDocument>> {
        Ok(self.notes.get(document).cloned())
    }
}

fn read_thread(path: &Path) -> Result<ThreadDocument> {
    let contents = std::fs::read_to_string(path).map_err(|e| BookError::from_read(path, e))?;
    serde_json::from_str(&contents).map_err(|e| BookError::InvalidDocument {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn read_notes(path: &Path) -> Result<Option<NoteDocument>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(BookError::io(path, e)),
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| BookError::InvalidDocument {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn is_thread_file(path: &Path, name: &str) -> bool {
    !name.starts_with('.')
        && path.extension().is_some_and(|ext| ext == THREAD_EXTENSION)
        && path.is_file()
}

/// Item ids name files directly inside the content directory.
fn is_plain_file_name(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\'])
        && !id.contains(FRAGMENT_SEPARATOR)
}

fn same_dir(a: &Path, b: &Path) -> bool {
    let a = if a.as_os_str().is_empty() { Path::new(".") } else { a };
    let b = if b.as_os_str().is_empty() { Path::new(".") } else { b };
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::content::{NormalizedMessage, Note};

    fn write_thread(dir: &Path, name: &str, subject: &str, dates: &[&str]) {
        let doc = ThreadDocument {
            subject: subject.to_string(),
            messages: dates
                .iter()
                .enumerate()
                .map(|(i, d)| NormalizedMessage {
                    key: format!("k{i}"),
                    date: d.to_string(),
                    body: format!("<p>{i}</p>"),
                })
                .collect(),
        };
        std::fs::write(dir.join(name), serde_json::to_string(&doc).unwrap()).unwrap();
    }

    #[test]
    fn test_list_items_sorted_by_title() {
        let tmp = tempfile::tempdir().unwrap();
        let content = tmp.path().join("content");
        std::fs::create_dir_all(content.join("images")).unwrap();
        write_thread(&content, "b.json", "beta", &["Mon"]);
        write_thread(&content, "a.json", "Zed", &["Tue", "Wed"]);
        std::fs::write(content.join(".a.json.tmp"), "{").unwrap();
        std::fs::write(content.join("broken.json"), "{").unwrap();
        std::fs::write(content.join("readme.txt"), "x").unwrap();

        let notes = NoteDocument {
            notes: vec![Note {
                id: "id-1".to_string(),
                title: "Map".to_string(),
                body: String::new(),
            }],
        };
        let notes_doc = tmp.path().join("player_notes.json");
        std::fs::write(&notes_doc, serde_json::to_string(&notes).unwrap()).unwrap();

        let catalog = Catalog::new(&content, &notes_doc);
        let items = catalog.list_items().unwrap();
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        // case-sensitive: uppercase sorts before lowercase
        assert_eq!(titles, vec!["Map", "Zed", "beta"]);
        assert_eq!(items[0].id, "player_notes.json#id-1");
        assert_eq!(items[0].kind, ItemKind::Note);
        assert_eq!(items[1].messages, 2);
        assert_eq!(items[1].date.as_deref(), Some("Tue"));

        assert_eq!(catalog.list_items().unwrap(), items);
    }

    #[test]
    fn test_missing_sources_are_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(tmp.path().join("nope"), tmp.path().join("nope.json"));
        assert!(catalog.list_items().unwrap().is_empty());
    }

    #[test]
    fn test_notes_document_inside_content_dir_is_not_a_thread() {
        let tmp = tempfile::tempdir().unwrap();
        write_thread(tmp.path(), "s.json", "Session", &["Mon"]);
        std::fs::write(tmp.path().join("player_notes.json"), r#"{"notes": []}"#).unwrap();
        let catalog = Catalog::new(tmp.path(), tmp.path().join("player_notes.json"));
        let items = catalog.list_items().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "s.json");
    }

    #[test]
    fn test_thread_lookup_rejects_paths() {
        let tmp = tempfile::tempdir().unwrap();
        write_thread(tmp.path(), "s.json", "Session", &["Mon"]);
        let catalog = Catalog::new(tmp.path(), tmp.path().join("n.json"));
        assert!(catalog.thread("s.json").unwrap().is_some());
        assert!(catalog.thread("missing.json").unwrap().is_none());
        assert!(catalog.thread("../s.json").unwrap().is_none());
        assert!(catalog.notes("other.json").unwrap().is_none());
    }
}
