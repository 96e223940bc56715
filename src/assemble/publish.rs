//! Writes the published artifact: `index.html` plus a sibling `images/`.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{BookError, Result};
use crate::redact::{Change, Redactor};
use crate::store::curation::CurationStore;
use crate::store::images::IMAGES_DIR_NAME;

use super::{Assembler, Assembly};

/// Name of the published document inside the output directory.
pub const INDEX_FILE: &str = "index.html";

/// What [`publish`] wrote.
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub index: PathBuf,
    pub sections: usize,
    pub skipped_entries: usize,
    pub hidden_messages: usize,
    pub missing: Vec<String>,
    pub images_copied: usize,
    /// Redaction changes, empty when redaction was not requested.
    pub redactions: Vec<Change>,
}

/// Assemble the curated document and write it to `paths.output_dir`.
///
/// The output `images/` directory is replaced by a fresh copy of the image
/// store so the artifact can be moved as a unit. An output directory whose
/// `images/` overlaps the store is refused before anything is written.
pub fn publish(config: &Config, redact: bool) -> Result<PublishReport> {
    // Compile patterns first so a bad config does not leave a half-written artifact.
    let redactor = if redact {
        Some(Redactor::from_config(&config.redact)?)
    } else {
        None
    };

    let output_dir = &config.paths.output_dir;
    let store_images = config.paths.images_dir();
    let output_images = output_dir.join(IMAGES_DIR_NAME);
    check_disjoint(&store_images, &output_images)?;

    let catalog = Catalog::from_config(&config.paths);
    let state = CurationStore::from_config(&config.paths);
    let entries = state.load()?;
    let exclusions = state.load_exclusions()?;
    if entries.is_empty() {
        warn!(path = %state.order_path().display(), "Order is empty, publishing an empty document");
    }

    let Assembly {
        html,
        sections,
        skipped_entries,
        hidden_messages,
        missing,
    } = Assembler::new(&catalog, &config.publish).assemble(&entries, &exclusions);

    let (html, redactions) = match redactor {
        Some(redactor) => {
            let redaction = redactor.redact(&html);
            (redaction.text, redaction.changes)
        }
        None => (html, Vec::new()),
    };

    std::fs::create_dir_all(output_dir).map_err(|e| BookError::io(output_dir, e))?;
    let index = config.paths.output_html();
    std::fs::write(&index, html).map_err(|e| BookError::io(&index, e))?;

    let images_copied = replace_images(&store_images, &output_images)?;

    info!(
        path = %index.display(),
        sections,
        images = images_copied,
        "Published document"
    );

    Ok(PublishReport {
        index,
        sections,
        skipped_entries,
        hidden_messages,
        missing,
        images_copied,
        redactions,
    })
}

/// Redact an already published file in place.
pub fn redact_file(path: &Path, config: &Config) -> Result<Vec<Change>> {
    let redactor = Redactor::from_config(&config.redact)?;
    let text = std::fs::read_to_string(path).map_err(|e| BookError::from_read(path, e))?;
    let redaction = redactor.redact(&text);
    std::fs::write(path, &redaction.text).map_err(|e| BookError::io(path, e))?;
    Ok(redaction.changes)
}

/// Refuse an output `images/` that is the image store, or inside it, or contains it.
fn check_disjoint(store: &Path, output: &Path) -> Result<()> {
    let store_abs = resolve(store);
    let output_abs = resolve(output);
    if output_abs.starts_with(&store_abs) || store_abs.starts_with(&output_abs) {
        return Err(BookError::OutputOverlapsStore {
            output: output.to_path_buf(),
            store: store.to_path_buf(),
        });
    }
    Ok(())
}

/// Canonicalize the longest existing prefix of `path` and re-append the rest.
fn resolve(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut rest = Vec::new();
    loop {
        let candidate = if existing.as_os_str().is_empty() {
            Path::new(".")
        } else {
            existing
        };
        if let Ok(mut resolved) = candidate.canonicalize() {
            resolved.extend(rest.iter().rev());
            return resolved;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// Replace `dest` with a flat copy of `source`. Returns the number of files copied.
fn replace_images(source: &Path, dest: &Path) -> Result<usize> {
    if dest.exists() {
        std::fs::remove_dir_all(dest).map_err(|e| BookError::io(dest, e))?;
    }
    if !source.is_dir() {
        return Ok(0);
    }
    std::fs::create_dir_all(dest).map_err(|e| BookError::io(dest, e))?;

    let mut copied = 0;
    for entry in std::fs::read_dir(source).map_err(|e| BookError::io(source, e))? {
        let entry = entry.map_err(|e| BookError::io(source, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let target = dest.join(entry.file_name());
        std::fs::copy(&path, &target).map_err(|e| BookError::io(&path, e))?;
        copied += 1;
    }
    Ok(copied)
}
