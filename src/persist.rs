use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Writes `contents` to `path` via a temp-file-then-rename so a reader never
/// observes a partially written checkpoint file.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("")
    ));
    fs::write(&tmp_path, contents).map_err(|source| Error::PersistenceFailed {
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| Error::PersistenceFailed {
        path: path.to_path_buf(),
        source,
    })
}
