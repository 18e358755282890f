//! Atomic, lock-guarded file replacement
//!
//! Used for both the CSV snapshot and the sync state document. The target is
//! never opened for writing: content goes to a temp file in the same
//! directory which is fsynced and then renamed over the target.

use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::PersistError;

/// Advisory lock file guarding `path` (`<file name>.lock` next to it)
pub fn lock_path(path: &Path) -> PathBuf {
    sibling(path, "lock")
}

/// `<file name>.<suffix>` next to `path`
pub fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn open_lock_file(path: &Path) -> Result<File, PersistError> {
    let lock_path = lock_path(path);
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| PersistError::Lock {
            path: lock_path,
            message: format!("failed to open lock file: {e}"),
        })
}

/// Replace `path` with whatever `write` produces.
///
/// When `backup` is given and `path` exists, the current content is copied
/// there first. On any error the target is left byte-identical and the temp
/// file is removed.
pub fn write_atomically<F>(path: &Path, backup: Option<&Path>, write: F) -> Result<(), PersistError>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let dir = parent_dir(path);
    std::fs::create_dir_all(dir).map_err(|e| PersistError::io(dir, e))?;

    let mut lock = RwLock::new(open_lock_file(path)?);
    let _guard = lock.write().map_err(|e| PersistError::Lock {
        path: lock_path(path),
        message: format!("failed to acquire write lock: {e}"),
    })?;

    let mut temp_file = tempfile::NamedTempFile::new_in(dir).map_err(|e| PersistError::io(dir, e))?;
    let temp_path = temp_file.path().to_path_buf();

    {
        let mut writer = io::BufWriter::new(temp_file.as_file_mut());
        write(&mut writer).map_err(|e| PersistError::io(&temp_path, e))?;
        writer.flush().map_err(|e| PersistError::io(&temp_path, e))?;
    }
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| PersistError::io(&temp_path, e))?;

    if let Some(backup) = backup {
        if path.exists() {
            std::fs::copy(path, backup).map_err(|e| PersistError::io(backup, e))?;
            debug!(backup = %backup.display(), "Rotated snapshot backup");
        }
    }

    temp_file
        .persist(path)
        .map_err(|e| PersistError::io(path, e.error))?;

    if let Err(e) = sync_dir(dir) {
        debug!(dir = %dir.display(), error = %e, "Directory fsync failed, rename may not be durable");
    }

    Ok(())
}

/// Flush directory entries so a rename survives a crash
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

/// Run `read` on `path` under a shared lock. `Ok(None)` when the file is absent.
pub fn read_locked<T, F>(path: &Path, read: F) -> Result<Option<T>, PersistError>
where
    F: FnOnce(File) -> Result<T, PersistError>,
{
    if !path.exists() {
        return Ok(None);
    }

    let lock = RwLock::new(open_lock_file(path)?);
    let _guard = lock.read().map_err(|e| PersistError::Lock {
        path: lock_path(path),
        message: format!("failed to acquire read lock: {e}"),
    })?;

    match File::open(path) {
        Ok(file) => read(file).map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PersistError::io(path, e)),
    }
}
