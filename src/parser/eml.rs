//! Directory-of-`.eml` input (RFC 5322 messages without MBOX framing).

use std::path::{Path, PathBuf};

use crate::error::{BookError, Result};

/// List the `.eml` files of a directory, sorted by file name so that the
/// export order is stable across filesystems.
pub fn list_eml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let read_dir = std::fs::read_dir(dir).map_err(|e| BookError::from_read(dir, e))?;
    let mut files = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| BookError::io(dir, e))?;
        let path = entry.path();
        let is_eml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("eml"))
            .unwrap_or(false);
        if is_eml && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read one `.eml` file.
pub fn read_eml(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| BookError::from_read(path, e))
}
