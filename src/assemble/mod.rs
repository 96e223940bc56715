//! Assembler: merges curator state with the catalog into one document.
//!
//! Assembly is pure. Given the same entries, exclusions and source documents
//! it produces byte-identical HTML, numbering included.

pub mod publish;
mod render;

use tracing::{debug, info, warn};

use crate::catalog::ContentSource;
use crate::config::PublishConfig;
use crate::error::Result;
use crate::model::content::{NormalizedMessage, Note, NoteDocument, SourceRef, ThreadDocument};
use crate::model::curation::{is_hidden, CurationEntry, MessageExclusion};

use self::render::Toggle;

/// The assembled document and what went into it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembly {
    pub html: String,
    /// Numbered sections emitted (one per non-excluded entry).
    pub sections: usize,
    /// Entries dropped because they are marked excluded.
    pub skipped_entries: usize,
    /// Messages hidden by message-level exclusions.
    pub hidden_messages: usize,
    /// References that did not resolve, in document order.
    pub missing: Vec<String>,
}

/// What a curation entry points at.
#[derive(Debug, Clone)]
pub enum Resolved {
    Thread(ThreadDocument),
    Note(Note),
    /// Legacy entry naming the whole notes document.
    AllNotes(NoteDocument),
}

pub struct Assembler<'a, S: ContentSource + ?Sized> {
    source: &'a S,
    publish: &'a PublishConfig,
}

impl<'a, S: ContentSource + ?Sized> Assembler<'a, S> {
    pub fn new(source: &'a S, publish: &'a PublishConfig) -> Self {
        Self { source, publish }
    }

    /// Build the final document.
    ///
    /// Never fails: an entry whose content cannot be resolved renders a
    /// visible placeholder and is listed in [`Assembly::missing`].
    pub fn assemble(&self, entries: &[CurationEntry], exclusions: &[MessageExclusion]) -> Assembly {
        let mut assembly = Assembly::default();

        let included: Vec<&CurationEntry> = entries.iter().filter(|e| !e.excluded).collect();
        assembly.skipped_entries = entries.len() - included.len();
        if assembly.skipped_entries > 0 {
            info!(count = assembly.skipped_entries, "Skipping excluded entries");
        }

        let toc: Vec<(usize, &str)> = included
            .iter()
            .enumerate()
            .map(|(i, e)| (i + 1, e.title.as_str()))
            .collect();

        let mut html = String::with_capacity(64 * 1024);
        render::page_start(&mut html, self.publish);
        render::toc(&mut html, &toc);

        for (i, entry) in included.iter().enumerate() {
            let number = i + 1;
            let mut body = String::new();
            match self.resolve_logged(&entry.item_ref) {
                Some(resolved) => {
                    assembly.hidden_messages +=
                        render_resolved(&mut body, &entry.item_ref, &resolved, exclusions, false);
                }
                None => {
                    render::missing(&mut body, &entry.item_ref);
                    assembly.missing.push(entry.item_ref.clone());
                }
            }
            render::section(&mut html, number, &entry.title, &body);
            assembly.sections += 1;
        }

        render::page_end(&mut html, self.publish);
        assembly.html = html;

        info!(
            sections = assembly.sections,
            hidden_messages = assembly.hidden_messages,
            missing = assembly.missing.len(),
            "Assembled document"
        );
        assembly
    }

    /// Render one item as it would appear inside its section.
    ///
    /// With `controls`, every message is shown with an exclude checkbox
    /// (checked when an exclusion hides it) instead of hiding it.
    /// Returns `None` when the reference does not resolve.
    pub fn preview(
        &self,
        item_ref: &str,
        exclusions: &[MessageExclusion],
        controls: bool,
    ) -> Result<Option<String>> {
        let Some(resolved) = self.resolve(item_ref)? else {
            return Ok(None);
        };
        let mut body = String::new();
        render_resolved(&mut body, item_ref, &resolved, exclusions, controls);
        Ok(Some(body))
    }

    /// Resolve a curation reference to its content.
    ///
    /// `doc#fragment` names one note; a bare name is a thread document, or
    /// (legacy) the whole notes document.
    pub fn resolve(&self, item_ref: &str) -> Result<Option<Resolved>> {
        let source_ref = SourceRef::parse(item_ref);
        if let Some(fragment) = &source_ref.fragment {
            let note = self
                .source
                .notes(&source_ref.document)?
                .and_then(|doc| doc.find(fragment).cloned());
            return Ok(note.map(Resolved::Note));
        }

        if let Some(thread) = self.source.thread(&source_ref.document)? {
            return Ok(Some(Resolved::Thread(thread)));
        }
        Ok(self
            .source
            .notes(&source_ref.document)?
            .map(Resolved::AllNotes))
    }

    fn resolve_logged(&self, item_ref: &str) -> Option<Resolved> {
        match self.resolve(item_ref) {
            Ok(Some(resolved)) => Some(resolved),
            Ok(None) => {
                warn!(item = item_ref, "Curation entry references missing content");
                None
            }
            Err(e) => {
                warn!(item = item_ref, error = %e, "Could not read content for curation entry");
                None
            }
        }
    }
}

/// Render resolved content into `out`. Returns the number of hidden messages.
fn render_resolved(
    out: &mut String,
    item_ref: &str,
    resolved: &Resolved,
    exclusions: &[MessageExclusion],
    controls: bool,
) -> usize {
    match resolved {
        Resolved::Thread(thread) => render_thread(out, item_ref, &thread.messages, exclusions, controls),
        Resolved::Note(note) => {
            render::note_card(out, note);
            0
        }
        Resolved::AllNotes(doc) => {
            for note in &doc.notes {
                render::note_card(out, note);
            }
            0
        }
    }
}

fn render_thread(
    out: &mut String,
    item_id: &str,
    messages: &[NormalizedMessage],
    exclusions: &[MessageExclusion],
    controls: bool,
) -> usize {
    let mut hidden = 0;
    for message in messages {
        let excluded = is_hidden(exclusions, item_id, message);
        if controls {
            render::message_card(out, message, Some(Toggle { item_id, excluded }));
        } else if excluded {
            debug!(item = item_id, date = %message.date, "Hiding excluded message");
            hidden += 1;
        } else {
            render::message_card(out, message, None);
        }
    }
    hidden
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemorySource;
    use crate::model::content::ItemKind;

    fn message(key: &str, date: &str) -> NormalizedMessage {
        NormalizedMessage {
            key: key.to_string(),
            date: date.to_string(),
            body: format!("<p>body {key}</p>"),
        }
    }

    fn entry(item_ref: &str, title: &str, excluded: bool) -> CurationEntry {
        CurationEntry {
            item_ref: item_ref.to_string(),
            title: title.to_string(),
            kind: Some(ItemKind::Thread),
            excluded,
        }
    }

    fn source() -> MemorySource {
        let mut source = MemorySource::default();
        source.threads.insert(
            "s1.json".to_string(),
            ThreadDocument {
                subject: "Session 1".to_string(),
                messages: vec![message("a", "Mon"), message("b", "Tue"), message("c", "Wed")],
            },
        );
        source.threads.insert(
            "s2.json".to_string(),
            ThreadDocument {
                subject: "Session 2".to_string(),
                messages: vec![message("d", "Thu")],
            },
        );
        source.notes.insert(
            "player_notes.json".to_string(),
            NoteDocument {
                notes: vec![
                    Note {
                        id: "id-1".to_string(),
                        title: "Map".to_string(),
                        body: "<p>map</p>".to_string(),
                    },
                    Note {
                        id: "id-2".to_string(),
                        title: "Lore".to_string(),
                        body: "<p>lore</p>".to_string(),
                    },
                ],
            },
        );
        source
    }

    #[test]
    fn test_message_exclusion_keeps_rest_in_order() {
        let source = source();
        let publish = PublishConfig::default();
        let assembler = Assembler::new(&source, &publish);
        let entries = vec![entry("s1.json", "Session 1", false), entry("s2.json", "Session 2", false)];

        let plain = assembler.assemble(&entries, &[]);
        let excluded = assembler.assemble(
            &entries,
            &[MessageExclusion {
                filename: "s1.json".to_string(),
                date: "Tue".to_string(),
                message_key: None,
            }],
        );

        assert_eq!(excluded.hidden_messages, 1);
        assert!(!excluded.html.contains("body b"));
        let a = excluded.html.find("body a").unwrap();
        let c = excluded.html.find("body c").unwrap();
        assert!(a < c);
        assert_eq!(excluded.html.matches("class=\"card message\"").count(), 3);
        assert_eq!(plain.html.matches("class=\"card message\"").count(), 4);
        assert!(excluded.html.contains("body d"));
    }

    #[test]
    fn test_all_messages_excluded_still_renders_section() {
        let source = source();
        let publish = PublishConfig::default();
        let exclusions = vec![MessageExclusion {
            filename: "s2.json".to_string(),
            date: String::new(),
            message_key: Some("d".to_string()),
        }];
        let out = Assembler::new(&source, &publish)
            .assemble(&[entry("s2.json", "Session 2", false)], &exclusions);
        assert_eq!(out.sections, 1);
        assert!(out.html.contains(r#"id="section-1""#));
        assert!(!out.html.contains("body d"));
    }

    #[test]
    fn test_excluded_entry_leaves_toc_and_numbering() {
        let source = source();
        let publish = PublishConfig::default();
        let entries = vec![
            entry("s1.json", "Session 1", true),
            entry("s2.json", "Session 2", false),
        ];
        let out = Assembler::new(&source, &publish).assemble(&entries, &[]);
        assert_eq!(out.skipped_entries, 1);
        assert_eq!(out.sections, 1);
        assert!(!out.html.contains("Session 1"));
        assert!(out.html.contains(
            r##"<li><a href="#section-1"><span class="section-number">1</span>Session 2</a></li>"##
        ));
    }

    #[test]
    fn test_missing_reference_renders_placeholder() {
        let source = source();
        let publish = PublishConfig::default();
        let entries = vec![
            entry("gone.json", "Gone", false),
            entry("player_notes.json#id-9", "Nope", false),
            entry("s2.json", "Session 2", false),
        ];
        let out = Assembler::new(&source, &publish).assemble(&entries, &[]);
        assert_eq!(out.missing, vec!["gone.json", "player_notes.json#id-9"]);
        assert_eq!(out.sections, 3);
        assert!(out.html.contains("Missing content: gone.json"));
        assert!(out.html.contains(r#"id="section-3""#));
    }

    #[test]
    fn test_note_fragment_and_legacy_whole_document() {
        let source = source();
        let publish = PublishConfig::default();
        let single = Assembler::new(&source, &publish)
            .assemble(&[entry("player_notes.json#id-2", "Lore", false)], &[]);
        assert!(single.html.contains(r#"<div class="card note" id="id-2">"#));
        assert!(!single.html.contains("<p>map</p>"));

        let all = Assembler::new(&source, &publish)
            .assemble(&[entry("player_notes.json", "Player Notes", false)], &[]);
        assert!(all.html.contains("<p>map</p>"));
        assert!(all.html.contains("<p>lore</p>"));
    }

    #[test]
    fn test_titles_are_escaped() {
        let source = source();
        let publish = PublishConfig::default();
        let out = Assembler::new(&source, &publish)
            .assemble(&[entry("s2.json", "Fish & <Chips>", false)], &[]);
        assert!(out.html.contains("Fish &amp; &lt;Chips&gt;"));
        assert!(!out.html.contains("<Chips>"));
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let source = source();
        let publish = PublishConfig::default();
        let entries = vec![entry("s2.json", "B", false), entry("s1.json", "A", false)];
        let assembler = Assembler::new(&source, &publish);
        assert_eq!(assembler.assemble(&entries, &[]), assembler.assemble(&entries, &[]));
    }

    #[test]
    fn test_preview_with_controls_marks_excluded() {
        let source = source();
        let publish = PublishConfig::default();
        let exclusions = vec![MessageExclusion {
            filename: "s1.json".to_string(),
            date: "Tue".to_string(),
            message_key: None,
        }];
        let assembler = Assembler::new(&source, &publish);

        let html = assembler.preview("s1.json", &exclusions, true).unwrap().unwrap();
        assert_eq!(html.matches("class=\"exclude-message\"").count(), 3);
        assert_eq!(html.matches(" checked>").count(), 1);
        assert!(html.contains(r#"data-date="Tue" data-key="b" checked>"#));

        let plain = assembler.preview("s1.json", &exclusions, false).unwrap().unwrap();
        assert!(!plain.contains("body b"));
        assert!(assembler.preview("nope.json", &[], true).unwrap().is_none());
    }
}
