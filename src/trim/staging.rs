//! Staging file for a trim and the atomic swap onto the original.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A hidden sibling of the target file that receives the trimmed output.
///
/// The staging file lives in the target's directory so the final rename
/// never crosses filesystems. Dropping a `Staging` without calling
/// [`Staging::persist`] deletes the file.
#[derive(Debug)]
pub struct Staging {
    file: Option<NamedTempFile>,
    target: PathBuf,
}

impl Staging {
    /// Create `.<name>.trim-XXXXXX.tmp` next to `target`.
    pub fn create(target: &Path) -> io::Result<Self> {
        let name = target.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file name", target.display()),
            )
        })?;
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let file = tempfile::Builder::new()
            .prefix(&format!(".{}.trim-", name.to_string_lossy()))
            .suffix(".tmp")
            .rand_bytes(6)
            .tempfile_in(dir)?;

        // The replacement keeps the original's mode bits.
        if let Ok(meta) = std::fs::metadata(target) {
            std::fs::set_permissions(file.path(), meta.permissions())?;
        }

        tracing::debug!(path = %file.path().display(), "created staging file");
        Ok(Self {
            file: Some(file),
            target: target.to_path_buf(),
        })
    }

    fn inner(&self) -> io::Result<&NamedTempFile> {
        self.file
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "staging file already persisted"))
    }

    /// Path of the staging file.
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(NamedTempFile::path)
    }

    /// The open staging file, for writing.
    pub fn file(&self) -> io::Result<&File> {
        self.inner().map(NamedTempFile::as_file)
    }

    /// Flush file contents and metadata to disk.
    pub fn sync(&self) -> io::Result<()> {
        self.inner()?.as_file().sync_all()
    }

    /// Atomically rename the staging file over the target.
    ///
    /// On failure the target is untouched and the staging file is removed.
    pub fn persist(mut self) -> io::Result<PathBuf> {
        let file = self
            .file
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "staging file already persisted"))?;

        match file.persist(&self.target) {
            Ok(_) => Ok(self.target.clone()),
            Err(err) => {
                discard(err.file);
                Err(err.error)
            }
        }
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            discard(file);
        }
    }
}

fn discard(file: NamedTempFile) {
    let path = file.path().to_path_buf();
    match file.close() {
        Ok(()) => tracing::debug!(path = %path.display(), "removed staging file"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove staging file"),
    }
}
