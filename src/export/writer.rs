//! Atomic placement of exported files.
//!
//! Content goes to `<name>.tmp` next to the final path, is synced, then renamed
//! over the final name. A crash leaves either no file or the complete file at
//! the final path, plus at worst a stale `.tmp` that the next resume scan
//! removes.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Suffix appended to the final file name while writing.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Temporary path used while writing `final_path`.
#[must_use]
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut name: OsString = final_path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(TEMP_SUFFIX);
    final_path.with_file_name(name)
}

/// Writes `bytes` to `final_path` atomically.
///
/// On failure the temporary file is removed and nothing is left at the final
/// path.
///
/// # Errors
///
/// Returns the first I/O error from create, write, sync or rename.
pub async fn write_atomic(final_path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = temp_path(final_path);

    let result = write_and_rename(&tmp, final_path, bytes).await;
    if result.is_err()
        && let Err(error) = tokio::fs::remove_file(&tmp).await
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(path = %tmp.display(), error = %error, "could not remove temporary file");
    }
    result
}

async fn write_and_rename(tmp: &Path, final_path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::File::create(tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(tmp, final_path).await?;
    sync_parent(final_path).await;

    debug!(path = %final_path.display(), bytes = bytes.len(), "file placed");
    Ok(())
}

/// Persists the rename itself. Best effort: not every file system supports
/// syncing a directory.
#[cfg(unix)]
async fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent()
        && let Ok(dir) = tokio::fs::File::open(parent).await
        && let Err(error) = dir.sync_all().await
    {
        debug!(path = %parent.display(), error = %error, "directory sync failed");
    }
}

#[cfg(not(unix))]
async fn sync_parent(_path: &Path) {}
