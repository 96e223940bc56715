//! End-to-end tests: normalize a fixture export, curate it and publish.

use std::path::{Path, PathBuf};

use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

use threadbook::assemble::publish::publish;
use threadbook::catalog::{Catalog, ContentSource};
use threadbook::config::Config;
use threadbook::error::BookError;
use threadbook::model::content::{ItemKind, ThreadDocument};
use threadbook::model::curation::MessageExclusion;
use threadbook::normalize::{export_notes, Normalizer};
use threadbook::store::curation::CurationStore;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// A project directory with the fixture export and notes in place.
fn project() -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let config = Config::rooted_at(tmp.path());
    std::fs::copy(fixture("journal.mbox"), &config.paths.mbox).unwrap();
    std::fs::copy(fixture("db.xml"), &config.paths.notes_xml).unwrap();
    (tmp, config)
}

/// Normalize, export notes and reconcile the order.
fn prepared_project() -> (TempDir, Config) {
    let (tmp, config) = project();
    Normalizer::new(&config.paths).run(None).unwrap();
    export_notes(&config.paths).unwrap();
    let items = Catalog::from_config(&config.paths).list_items().unwrap();
    CurationStore::from_config(&config.paths)
        .reconcile(&items)
        .unwrap();
    (tmp, config)
}

fn read_thread(config: &Config, id: &str) -> ThreadDocument {
    Catalog::from_config(&config.paths)
        .thread(id)
        .unwrap()
        .unwrap()
}

// ─── Normalization ──────────────────────────────────────────────────

#[test]
fn test_subjects_group_into_two_threads() {
    let (_tmp, config) = project();
    let stats = Normalizer::new(&config.paths).run(None).unwrap();
    assert_eq!(stats.messages, 3);
    assert_eq!(stats.threads, 2);

    let session1 = read_thread(&config, "Session_1.json");
    assert_eq!(session1.subject, "Session 1");
    assert_eq!(session1.messages.len(), 2);
    assert_eq!(session1.messages[0].date, "Tue, 02 Jan 2024 10:00:00 +0000");
    assert_eq!(read_thread(&config, "Session_2.json").messages.len(), 1);
}

#[test]
fn test_catalog_is_title_sorted() {
    let (_tmp, config) = project();
    Normalizer::new(&config.paths).run(None).unwrap();
    export_notes(&config.paths).unwrap();

    let items = Catalog::from_config(&config.paths).list_items().unwrap();
    let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["Barovia", "Ireena & Ismark", "Session 1", "Session 2", "Untitled"]
    );
    assert_eq!(items[0].id, "player_notes.json#id-00001");
    assert_eq!(items[0].kind, ItemKind::Note);
    assert_eq!(items[2].id, "Session_1.json");
    assert_eq!(items[2].messages, 2);
}

#[test]
fn test_inline_images_are_stored_and_rewritten() {
    let (tmp, config) = project();
    let stats = Normalizer::new(&config.paths).run(None).unwrap();
    assert_eq!(stats.images_written, 2);

    let images = tmp.child("cleaned_emails").child("images");
    images.child("map1.png").assert(predicate::path::is_file());

    let session1 = read_thread(&config, "Session_1.json");
    let first = &session1.messages[0].body;
    assert!(first.contains(r#"src="images/map1.png""#), "{first}");
    assert!(!first.contains("<style"));
    assert!(!first.contains("<title"));
    assert!(first.contains(r#"target="_blank""#));

    let reply = &session1.messages[1].body;
    assert!(!reply.contains("data:image"), "{reply}");
    let stored: Vec<String> = std::fs::read_dir(images.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("image_"))
        .collect();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].ends_with(".png"));
    assert!(reply.contains(&format!("images/{}", stored[0])));
}

#[test]
fn test_renormalizing_writes_no_new_images() {
    let (_tmp, config) = project();
    Normalizer::new(&config.paths).run(None).unwrap();
    let again = Normalizer::new(&config.paths).run(None).unwrap();
    assert_eq!(again.images_written, 0);
    assert_eq!(again.threads, 2);
}

#[test]
fn test_eml_directory_input() {
    let (tmp, mut config) = project();
    let mails = tmp.child("mails");
    mails
        .child("b.eml")
        .write_str("Subject: Re: Camp\r\nDate: Tue, 09 Jan 2024\r\nContent-Type: text/html\r\n\r\n<p>second</p>")
        .unwrap();
    mails
        .child("a.eml")
        .write_str("Subject: Camp\r\nDate: Mon, 08 Jan 2024\r\nContent-Type: text/html\r\n\r\n<p>first</p>")
        .unwrap();
    config.paths.mbox = mails.path().to_path_buf();

    let stats = Normalizer::new(&config.paths).run(None).unwrap();
    assert_eq!(stats.threads, 1);
    let camp = read_thread(&config, "Camp.json");
    assert!(camp.messages[0].body.contains("first"));
    assert!(camp.messages[1].body.contains("second"));
}

#[test]
fn test_duplicate_message_ids_get_distinct_keys() {
    let (tmp, mut config) = project();
    let mails = tmp.child("labels");
    let mail = "Message-ID: <same@example.com>\r\nSubject: Camp\r\nDate: Mon, 08 Jan 2024\r\n\
                Content-Type: text/html\r\n\r\n<p>copy</p>";
    mails.child("inbox.eml").write_str(mail).unwrap();
    mails.child("sessions.eml").write_str(mail).unwrap();
    config.paths.mbox = mails.path().to_path_buf();

    Normalizer::new(&config.paths).run(None).unwrap();
    let first = read_thread(&config, "Camp.json");
    assert_eq!(first.messages.len(), 2);
    assert_ne!(first.messages[0].key, first.messages[1].key);

    Normalizer::new(&config.paths).run(None).unwrap();
    let again = read_thread(&config, "Camp.json");
    assert_eq!(again.messages[0].key, first.messages[0].key);
    assert_eq!(again.messages[1].key, first.messages[1].key);
}

#[test]
fn test_missing_export_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let config = Config::rooted_at(tmp.path());
    let err = Normalizer::new(&config.paths).run(None).unwrap_err();
    assert!(matches!(err, BookError::FileNotFound(_)), "{err:?}");
}

// ─── Curation ───────────────────────────────────────────────────────

#[test]
fn test_reconcile_is_idempotent() {
    let (_tmp, config) = prepared_project();
    let items = Catalog::from_config(&config.paths).list_items().unwrap();
    let state = CurationStore::from_config(&config.paths);

    assert_eq!(state.load().unwrap().len(), items.len());
    assert_eq!(state.reconcile(&items).unwrap(), 0);
    assert_eq!(state.load().unwrap().len(), items.len());
}

#[test]
fn test_corrupt_order_is_surfaced_not_replaced() {
    let (_tmp, config) = prepared_project();
    std::fs::write(&config.paths.order_file, "{\"items\": [").unwrap();

    let items = Catalog::from_config(&config.paths).list_items().unwrap();
    let err = CurationStore::from_config(&config.paths)
        .reconcile(&items)
        .unwrap_err();
    assert!(matches!(err, BookError::CorruptState { .. }));
    assert!(matches!(
        publish(&config, false).unwrap_err(),
        BookError::CorruptState { .. }
    ));
    assert_eq!(
        std::fs::read_to_string(&config.paths.order_file).unwrap(),
        "{\"items\": ["
    );
}

// ─── Publishing ─────────────────────────────────────────────────────

#[test]
fn test_publish_writes_relocatable_artifact() {
    let (tmp, config) = prepared_project();
    let report = publish(&config, false).unwrap();
    assert_eq!(report.sections, 5);
    assert_eq!(report.images_copied, 2);
    assert!(report.missing.is_empty());

    let public = tmp.child("public");
    public.child("index.html").assert(predicate::str::contains(
        r##"<a href="#section-3"><span class="section-number">3</span>Session 1</a>"##,
    ));
    public
        .child("index.html")
        .assert(predicate::str::contains(r#"src="images/map1.png""#));
    public
        .child("images")
        .child("map1.png")
        .assert(predicate::path::is_file());
}

#[test]
fn test_publish_into_content_dir_keeps_image_store() {
    let (tmp, mut config) = project();
    Normalizer::new(&config.paths).run(None).unwrap();
    config.paths.output_dir = config.paths.content_dir.clone();

    let err = publish(&config, false).unwrap_err();
    assert!(matches!(err, BookError::OutputOverlapsStore { .. }), "{err:?}");
    tmp.child("cleaned_emails")
        .child("images")
        .child("map1.png")
        .assert(predicate::path::is_file());
    assert!(!config.paths.output_html().exists());
}

#[test]
fn test_publish_is_deterministic() {
    let (_tmp, config) = prepared_project();
    publish(&config, false).unwrap();
    let first = std::fs::read(config.paths.output_html()).unwrap();
    publish(&config, false).unwrap();
    let second = std::fs::read(config.paths.output_html()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_excluded_entry_drops_section_but_stays_in_order() {
    let (_tmp, config) = prepared_project();
    let state = CurationStore::from_config(&config.paths);
    let mut entries = state.load().unwrap();
    let entry = entries
        .iter_mut()
        .find(|e| e.item_ref == "Session_2.json")
        .unwrap();
    entry.excluded = true;
    state.save(&entries).unwrap();

    let report = publish(&config, false).unwrap();
    assert_eq!(report.sections, 4);
    assert_eq!(report.skipped_entries, 1);

    let html = std::fs::read_to_string(config.paths.output_html()).unwrap();
    assert!(!html.contains("Session 2"));
    assert!(!html.contains("Into the mists"));
    assert!(!html.contains("section-5"));

    let saved = state.load().unwrap();
    assert_eq!(saved.len(), 5);
    assert!(saved.iter().any(|e| e.item_ref == "Session_2.json"));
}

#[test]
fn test_message_exclusion_by_key_hides_one_message() {
    let (_tmp, config) = prepared_project();
    let reply = read_thread(&config, "Session_1.json").messages[1].clone();
    CurationStore::from_config(&config.paths)
        .save_exclusions(&[MessageExclusion {
            filename: "Session_1.json".to_string(),
            date: "a date format that changed since".to_string(),
            message_key: Some(reply.key.clone()),
        }])
        .unwrap();

    let report = publish(&config, false).unwrap();
    assert_eq!(report.hidden_messages, 1);

    let html = std::fs::read_to_string(config.paths.output_html()).unwrap();
    assert!(html.contains("The party arrived at the village."));
    assert!(!html.contains("We should not have trusted the innkeeper."));
    assert!(html.contains("Into the mists."));
}

#[test]
fn test_dangling_entry_renders_placeholder() {
    let (_tmp, config) = prepared_project();
    std::fs::remove_file(config.paths.content_dir.join("Session_2.json")).unwrap();

    let report = publish(&config, false).unwrap();
    assert_eq!(report.missing, vec!["Session_2.json".to_string()]);
    assert_eq!(report.sections, 5);
    let html = std::fs::read_to_string(config.paths.output_html()).unwrap();
    assert!(html.contains("Missing content: Session_2.json"));
}

#[test]
fn test_publish_with_redaction() {
    let (_tmp, mut config) = prepared_project();
    config.redact.names.push(threadbook::config::NameReplacement {
        pattern: r"\bIreena\b".to_string(),
        replacement: "the Burgomaster's daughter".to_string(),
    });

    let report = publish(&config, true).unwrap();
    let descriptions: Vec<&str> = report
        .redactions
        .iter()
        .map(|c| c.description.as_str())
        .collect();
    assert!(descriptions.contains(&"email addresses"));
    assert!(descriptions.contains(&"phone numbers"));

    let html = std::fs::read_to_string(config.paths.output_html()).unwrap();
    assert!(!html.contains("555-123-4567"));
    assert!(!html.contains("gm@example.com"));
    assert!(html.contains("[phone removed]"));
    assert!(html.contains("the Burgomaster's daughter &amp; Ismark"));
}

#[test]
fn test_invalid_name_pattern_writes_nothing() {
    let (_tmp, mut config) = prepared_project();
    config.redact.names.push(threadbook::config::NameReplacement {
        pattern: "(unclosed".to_string(),
        replacement: "x".to_string(),
    });
    let err = publish(&config, true).unwrap_err();
    assert!(matches!(err, BookError::InvalidPattern { .. }));
    assert!(!config.paths.output_html().exists());
}
