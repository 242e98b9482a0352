//! Atomic file replacement.

use std::io::Write;
use std::path::Path;

use crate::format::error::FormatError;

/// Write `contents` to `path` through a temporary file in the same directory,
/// then rename it over the target.
///
/// Missing parent directories are created.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), FormatError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| FormatError::Io(e.error))?;

    log::trace!("Wrote {} bytes to {:?}", contents.len(), path);
    Ok(())
}
