//! Content normalizer: turns a mail export into one JSON document per thread,
//! and the notes XML export into the notes document.
//!
//! Messages are grouped by canonical subject in the order the export lists
//! them. Each message body becomes a cleaned HTML fragment whose images point
//! into the shared image store.

pub mod html;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::PathsConfig;
use crate::error::{BookError, Result};
use crate::model::content::{NormalizedMessage, ThreadDocument};
use crate::parser::eml::{list_eml_files, read_eml};
use crate::parser::mbox::MboxReader;
use crate::parser::mime::{parse_message, ParsedMessage};
use crate::parser::notes::read_notes_export;
use crate::store::images::{ImageSource, ImageStore};
use crate::store::write_document;

use self::html::{clean_fragment, ImageRefs};

/// Subject used for messages without one.
pub const UNTITLED_SUBJECT: &str = "Untitled Journal Entry";

/// File name stem used when a subject has no usable characters.
pub const UNTITLED_FILENAME: &str = "Untitled";

/// Extension of normalized thread documents.
pub const THREAD_EXTENSION: &str = "json";

/// Hex chars kept from the SHA-256 of a message identity.
const MESSAGE_KEY_LEN: usize = 16;

static REPLY_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:re|fwd|fw)\s*:\s*").expect("reply prefix regex"));

/// Strip every leading `Re:`/`Fwd:`/`Fw:` prefix (case-insensitive) and trim.
///
/// An empty result becomes [`UNTITLED_SUBJECT`].
pub fn canonical_subject(raw: &str) -> String {
    let mut subject = raw.trim();
    while let Some(m) = REPLY_PREFIX.find(subject) {
        subject = subject[m.end()..].trim_start();
    }
    let subject = subject.trim();
    if subject.is_empty() {
        UNTITLED_SUBJECT.to_string()
    } else {
        subject.to_string()
    }
}

/// File name stem for a subject: word characters, `-` and whitespace kept,
/// whitespace turned into `_`.
pub fn safe_filename(subject: &str) -> String {
    let kept: String = subject
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();
    let stem: String = kept
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    if stem.is_empty() {
        UNTITLED_FILENAME.to_string()
    } else {
        stem
    }
}

/// Stable per-message key: hash of the Message-ID, else of date and body.
pub fn message_key(message_id: Option<&str>, date: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    match message_id {
        Some(id) => hasher.update(id.as_bytes()),
        None => {
            hasher.update(date.as_bytes());
            hasher.update([0u8]);
            hasher.update(body.as_bytes());
        }
    }
    let hex: String = hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    hex[..MESSAGE_KEY_LEN].to_string()
}

/// Key for the `occurrence`-th repeat (1-based) of a message whose base key
/// was already taken, e.g. one message exported under several labels.
pub fn repeated_message_key(base: &str, occurrence: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(base.as_bytes());
    hasher.update([0u8]);
    hasher.update(occurrence.to_string().as_bytes());
    let hex: String = hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    hex[..MESSAGE_KEY_LEN].to_string()
}

/// Counters reported after a normalization run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub messages: u64,
    pub threads: usize,
    pub images_written: usize,
    /// Paths of the thread documents written, in first-seen order.
    pub documents: Vec<PathBuf>,
}

/// Threads under construction, in first-seen order.
#[derive(Default)]
struct ThreadGroups {
    threads: Vec<ThreadDocument>,
    by_key: HashMap<String, usize>,
}

impl ThreadGroups {
    fn push(&mut self, subject: String, message: NormalizedMessage) {
        let key = subject.to_lowercase();
        match self.by_key.get(&key) {
            Some(&idx) => self.threads[idx].messages.push(message),
            None => {
                self.by_key.insert(key, self.threads.len());
                self.threads.push(ThreadDocument {
                    subject,
                    messages: vec![message],
                });
            }
        }
    }
}

/// Normalizes a mail export into thread documents under `content_dir`.
pub struct Normalizer<'a> {
    paths: &'a PathsConfig,
}

impl<'a> Normalizer<'a> {
    pub fn new(paths: &'a PathsConfig) -> Self {
        Self { paths }
    }

    /// Normalize `paths.mbox` (an MBOX file or a directory of `.eml` files).
    ///
    /// Existing documents with the same name are overwritten; documents of
    /// threads no longer present in the export are left alone.
    pub fn run(&self, progress: Option<&dyn Fn(u64, u64)>) -> Result<NormalizeStats> {
        let store = ImageStore::open(self.paths.images_dir())?;
        let mut groups = ThreadGroups::default();
        let mut stats = NormalizeStats::default();
        let mut seen_keys: HashMap<String, usize> = HashMap::new();

        let mut handle = |raw: &[u8]| -> Result<()> {
            let (subject, mut message, written) = normalize_message(parse_message(raw), &store)?;
            let repeats = seen_keys.entry(message.key.clone()).or_insert(0);
            if *repeats > 0 {
                debug!(key = %message.key, occurrence = *repeats, "Repeated message key");
                message.key = repeated_message_key(&message.key, *repeats);
            }
            *repeats += 1;
            stats.messages += 1;
            stats.images_written += written;
            groups.push(subject, message);
            Ok(())
        };

        let input = &self.paths.mbox;
        if input.is_dir() {
            let files = list_eml_files(input)?;
            let total = files.len() as u64;
            info!(dir = %input.display(), files = total, "Normalizing .eml directory");
            for (i, file) in files.iter().enumerate() {
                handle(&read_eml(file)?)?;
                if let Some(cb) = progress {
                    cb(i as u64 + 1, total);
                }
            }
        } else {
            let reader = MboxReader::new(input)?;
            info!(path = %input.display(), size = reader.file_size(), "Normalizing MBOX");
            let mut failure: Option<BookError> = None;
            reader.for_each_message(
                &mut |raw| match handle(raw) {
                    Ok(()) => true,
                    Err(e) => {
                        failure = Some(e);
                        false
                    }
                },
                progress,
            )?;
            if let Some(e) = failure {
                return Err(e);
            }
        }

        stats.threads = groups.threads.len();
        stats.documents = self.write_threads(&groups.threads)?;

        info!(
            messages = stats.messages,
            threads = stats.threads,
            images = stats.images_written,
            "Normalization complete"
        );
        Ok(stats)
    }

    fn write_threads(&self, threads: &[ThreadDocument]) -> Result<Vec<PathBuf>> {
        let mut used: HashMap<String, usize> = HashMap::new();
        let mut written = Vec::with_capacity(threads.len());

        for thread in threads {
            let stem = safe_filename(&thread.subject);
            let count = used.entry(stem.to_lowercase()).or_insert(0);
            *count += 1;
            let name = if *count == 1 {
                format!("{stem}.{THREAD_EXTENSION}")
            } else {
                warn!(subject = %thread.subject, "Thread file name collision, adding suffix");
                format!("{stem}_{count}.{THREAD_EXTENSION}")
            };

            let path = self.paths.content_dir.join(&name);
            write_document(&path, thread)?;
            debug!(path = %path.display(), messages = thread.messages.len(), "Wrote thread");
            written.push(path);
        }

        Ok(written)
    }
}

/// Store a message's images and clean its body.
///
/// Returns the canonical subject, the normalized message and the number of
/// image files newly written.
fn normalize_message(
    parsed: ParsedMessage,
    store: &ImageStore,
) -> Result<(String, NormalizedMessage, usize)> {
    let subject = canonical_subject(parsed.subject.as_deref().unwrap_or_default());
    let date = parsed.date.unwrap_or_default();

    let mut refs = ImageRefs::new();
    let mut written = 0;
    for image in &parsed.images {
        let stored = store.store(&ImageSource {
            bytes: &image.bytes,
            content_id: image.content_id.as_deref(),
            filename_hint: image.filename.as_deref(),
            content_type: Some(&image.content_type),
        })?;
        if stored.written {
            written += 1;
        }
        if let Some(cid) = &image.content_id {
            refs.insert(cid.clone(), stored.relative_path.clone());
        }
        if let Some(name) = &image.filename {
            refs.insert(name.clone(), stored.relative_path.clone());
        }
    }

    let key = message_key(parsed.message_id.as_deref(), &date, &parsed.html);
    let fragment = clean_fragment(&parsed.html, &refs, store)?;
    written += fragment.images_written;

    let message = NormalizedMessage {
        key,
        date,
        body: fragment.html,
    };
    Ok((subject, message, written))
}

/// Convert the notes XML export into the notes document. Returns the number
/// of notes written.
pub fn export_notes(paths: &PathsConfig) -> Result<usize> {
    let doc = read_notes_export(&paths.notes_xml)?;
    write_document(&paths.notes_doc, &doc)?;
    info!(
        from = %paths.notes_xml.display(),
        to = %paths.notes_doc.display(),
        notes = doc.notes.len(),
        "Exported notes"
    );
    Ok(doc.notes.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_subject_strips_nested_prefixes() {
        assert_eq!(canonical_subject("Re: Fwd: RE:  Session 3 "), "Session 3");
        assert_eq!(canonical_subject("FW:Session 3"), "Session 3");
        assert_eq!(canonical_subject("Session 3"), "Session 3");
        assert_eq!(canonical_subject("Reunion"), "Reunion");
    }

    #[test]
    fn test_canonical_subject_empty() {
        assert_eq!(canonical_subject(""), UNTITLED_SUBJECT);
        assert_eq!(canonical_subject("Re: "), UNTITLED_SUBJECT);
    }

    #[test]
    fn test_safe_filename() {
        assert_eq!(safe_filename("Session 1: The Village!"), "Session_1_The_Village");
        assert_eq!(safe_filename("  Ravenloft - Part 2 "), "Ravenloft_-_Part_2");
        assert_eq!(safe_filename("???"), UNTITLED_FILENAME);
        assert_eq!(safe_filename("Café"), "Café");
    }

    #[test]
    fn test_message_key() {
        let a = message_key(Some("<a@x>"), "Mon", "body");
        let b = message_key(Some("<a@x>"), "Tue", "other");
        assert_eq!(a, b);
        assert_eq!(a.len(), MESSAGE_KEY_LEN);

        let c = message_key(None, "Mon", "body");
        let d = message_key(None, "Mon", "body2");
        assert_ne!(c, d);
        assert_ne!(message_key(None, "Mo", "nbody"), message_key(None, "Mon", "body"));
    }

    #[test]
    fn test_repeated_message_key() {
        let base = message_key(Some("<a@x>"), "Mon", "body");
        let second = repeated_message_key(&base, 1);
        let third = repeated_message_key(&base, 2);
        assert_eq!(second.len(), MESSAGE_KEY_LEN);
        assert_ne!(second, base);
        assert_ne!(second, third);
        assert_eq!(second, repeated_message_key(&base, 1));
    }

    #[test]
    fn test_groups_by_lowercase_subject_in_first_seen_order() {
        let mut groups = ThreadGroups::default();
        let msg = |k: &str| NormalizedMessage {
            key: k.to_string(),
            date: String::new(),
            body: String::new(),
        };
        groups.push("Session 2".to_string(), msg("a"));
        groups.push("Session 1".to_string(), msg("b"));
        groups.push("session 2".to_string(), msg("c"));

        assert_eq!(groups.threads.len(), 2);
        assert_eq!(groups.threads[0].subject, "Session 2");
        assert_eq!(groups.threads[0].messages.len(), 2);
        assert_eq!(groups.threads[1].subject, "Session 1");
    }

    #[test]
    fn test_colliding_file_names_get_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = PathsConfig {
            content_dir: tmp.path().to_path_buf(),
            ..Default::default()
        };
        let doc = |s: &str| ThreadDocument {
            subject: s.to_string(),
            messages: Vec::new(),
        };
        let written = Normalizer::new(&paths)
            .write_threads(&[doc("Session 1!"), doc("Session 1?")])
            .unwrap();
        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["Session_1.json", "Session_1_2.json"]);
    }
}
