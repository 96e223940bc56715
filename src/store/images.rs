//! Content-addressed image store.
//!
//! Every inline image extracted during normalization is written once under a
//! deterministic identity:
//!
//! 1. the content-id (angle brackets stripped), else
//! 2. the attachment filename, else
//! 3. `image_` + the first 12 hex chars of the SHA-256 of the bytes.
//!
//! The chosen string is sanitized (anything outside `[A-Za-z0-9._-]` becomes
//! `_`) and gets a default extension when it does not already end in a
//! recognized image extension.
//!
//! The first writer of an identity wins: an existing file is never
//! overwritten, even when the bytes differ. Identities that differ only in
//! case, or in an extension appended here, are distinct files and are not
//! checked against each other for collisions.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{BookError, Result};

/// Name of the store directory, also the prefix of returned relative paths.
pub const IMAGES_DIR_NAME: &str = "images";

/// Extensions accepted as-is (compared case-insensitively).
pub const RECOGNIZED_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Extension appended when neither the identity nor the MIME type names one.
pub const DEFAULT_EXTENSION: &str = ".jpg";

/// Number of hex chars of the content hash used in hash-derived names.
const HASH_NAME_LEN: usize = 12;

/// An image to store, with the hints used to name it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageSource<'a> {
    pub bytes: &'a [u8],
    pub content_id: Option<&'a str>,
    pub filename_hint: Option<&'a str>,
    /// MIME type such as `image/png`, used to pick the default extension.
    pub content_type: Option<&'a str>,
}

/// Result of [`ImageStore::store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// Path relative to the directory holding the HTML, e.g. `images/logo.png`.
    pub relative_path: String,
    /// Whether this call created the file.
    pub written: bool,
}

/// Compute the storage file name for an image.
///
/// Pure: the same inputs always yield the same name.
pub fn image_identity(source: &ImageSource<'_>) -> String {
    let base = source
        .content_id
        .map(|cid| cid.replace(['<', '>'], ""))
        .filter(|cid| !cid.trim().is_empty())
        .or_else(|| {
            source
                .filename_hint
                .filter(|name| !name.trim().is_empty())
                .map(str::to_string)
        })
        .map(|name| sanitize_identity(name.trim()))
        .unwrap_or_else(|| format!("image_{}", content_hash(source.bytes)));

    if has_recognized_extension(&base) {
        base
    } else {
        format!("{base}{}", extension_for(source.content_type))
    }
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_identity(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn has_recognized_extension(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    RECOGNIZED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Default extension for a MIME type, falling back to [`DEFAULT_EXTENSION`].
fn extension_for(content_type: Option<&str>) -> &'static str {
    let subtype = content_type
        .and_then(|ct| ct.split(';').next())
        .and_then(|ct| ct.trim().to_ascii_lowercase().strip_prefix("image/").map(str::to_string));
    match subtype.as_deref() {
        Some("png") => ".png",
        Some("gif") => ".gif",
        Some("webp") => ".webp",
        Some("jpeg") | Some("jpg") | Some("pjpeg") => ".jpg",
        _ => DEFAULT_EXTENSION,
    }
}

fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..HASH_NAME_LEN].to_string()
}

/// Write-once image directory.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    /// Open the store at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| BookError::io(&dir, e))?;
        Ok(Self { dir })
    }

    /// Directory holding the stored files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store an image and return its relative path.
    ///
    /// Idempotent: a second call with the same identity returns the same path
    /// and does not touch the existing file.
    pub fn store(&self, source: &ImageSource<'_>) -> Result<StoredImage> {
        let name = image_identity(source);
        let path = self.dir.join(&name);
        let relative_path = format!("{IMAGES_DIR_NAME}/{name}");

        // create_new makes the existence check and the creation one step.
        let written = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(source.bytes)
                    .map_err(|e| BookError::io(&path, e))?;
                debug!(path = %path.display(), size = source.bytes.len(), "Stored image");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => false,
            Err(e) => return Err(BookError::io(&path, e)),
        };

        Ok(StoredImage {
            relative_path,
            written,
        })
    }
}
