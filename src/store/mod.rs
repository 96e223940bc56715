//! On-disk stores: the content-addressed image directory and the curator
//! state files.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{BookError, Result};

pub mod curation;
pub mod images;

/// Read a state document; missing or whitespace-only files yield the default.
pub(crate) fn read_document<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "State file missing, starting empty");
            return Ok(T::default());
        }
        Err(e) => return Err(BookError::io(path, e)),
    };

    if contents.trim().is_empty() {
        return Ok(T::default());
    }

    serde_json::from_str(&contents).map_err(|e| BookError::CorruptState {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Write pretty-printed JSON next to `path`, then rename it into place.
pub(crate) fn write_document<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(doc)?;
    json.push('\n');

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| BookError::io(parent, e))?;
        }
    }

    let filename = path.file_name().unwrap_or_default().to_string_lossy();
    let tmp = path.with_file_name(format!(".{filename}.tmp"));
    std::fs::write(&tmp, json).map_err(|e| BookError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| BookError::io(path, e))?;
    Ok(())
}
