//! Campaign-database notes export.
//!
//! ```xml
//! <root>
//!   <notes>
//!     <id-00001><name>Village map</name><text><p>...</p></text></id-00001>
//!   </notes>
//! </root>
//! ```
//!
//! Each child of `<notes>` is one note; its element name is the note's
//! fragment id.

use std::borrow::Cow;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::error::{BookError, Result};
use crate::model::content::{Note, NoteDocument};

/// Title given to notes without a `<name>`.
pub const UNTITLED_NOTE: &str = "Untitled";

/// Read and parse a notes export file.
pub fn read_notes_export(path: &Path) -> Result<NoteDocument> {
    let bytes = std::fs::read(path).map_err(|e| BookError::from_read(path, e))?;
    let text = decode_xml_bytes(&bytes);
    parse_notes_xml(&text).map_err(|reason| BookError::NotesXml {
        path: path.to_path_buf(),
        reason,
    })
}

/// UTF-8 when valid, Windows-1252 otherwise.
fn decode_xml_bytes(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => {
            debug!("Notes export is not UTF-8, decoding as Windows-1252");
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded
        }
    }
}

/// Parse the export into notes, in document order.
pub fn parse_notes_xml(xml: &str) -> std::result::Result<NoteDocument, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut depth: usize = 0;
    let mut in_notes = false;
    let mut saw_notes = false;
    let mut current: Option<Note> = None;
    let mut notes = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("at byte {}: {e}", reader.buffer_position()))?;
        match event {
            Event::Start(e) => {
                depth += 1;
                match (depth, in_notes) {
                    (2, _) if e.name().as_ref() == b"notes" => {
                        in_notes = true;
                        saw_notes = true;
                    }
                    (3, true) => current = Some(empty_note(&e)),
                    (4, true) => {
                        let field = e.name().as_ref().to_vec();
                        let inner = reader
                            .read_text(e.name())
                            .map_err(|err| format!("in <{}>: {err}", element_name(&e)))?;
                        // read_text consumed the matching end tag
                        depth -= 1;
                        if let Some(note) = current.as_mut() {
                            match field.as_slice() {
                                b"name" => note.title = unescape_title(&inner),
                                b"text" => note.body = inner.trim().to_string(),
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if depth == 2 && in_notes {
                    notes.push(empty_note(&e));
                } else if depth == 1 && e.name().as_ref() == b"notes" {
                    saw_notes = true;
                }
            }
            Event::End(_) => {
                if depth == 3 && in_notes {
                    if let Some(note) = current.take() {
                        notes.push(note);
                    }
                } else if depth == 2 && in_notes {
                    in_notes = false;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_notes {
        warn!("No <notes> section found in export");
    }
    Ok(NoteDocument { notes })
}

fn empty_note(e: &BytesStart<'_>) -> Note {
    Note {
        id: element_name(e),
        title: UNTITLED_NOTE.to_string(),
        body: String::new(),
    }
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn unescape_title(raw: &str) -> String {
    let title = quick_xml::escape::unescape(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    let title = title.trim();
    if title.is_empty() {
        UNTITLED_NOTE.to_string()
    } else {
        title.to_string()
    }
}
