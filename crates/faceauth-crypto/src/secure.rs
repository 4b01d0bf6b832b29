//! Scoped output files
//!
//! Output is written to a temporary file beside its destination and only
//! renamed into place once the whole operation succeeded. A temporary that is
//! dropped instead (error, cancellation, panic unwind) is overwritten with
//! random bytes, synced, and deleted, so a failed run never leaves a
//! valid-looking artifact or recoverable plaintext behind.

use rand::RngCore;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use faceauth_core::{FaceauthError, FaceauthResult};

const SCRUB_BLOCK: usize = 64 * 1024;

/// A temporary file that is scrubbed and removed unless persisted.
pub struct ScrubbedTempFile {
    inner: Option<NamedTempFile>,
}

impl ScrubbedTempFile {
    /// Create an owner-only temporary file in `dir`.
    pub fn new_in(dir: &Path) -> FaceauthResult<Self> {
        let file = tempfile::Builder::new()
            .prefix(".faceauth-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        Ok(Self { inner: Some(file) })
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.as_ref().map(|t| t.path())
    }

    /// Sync and atomically rename to `destination`. Without `overwrite` an
    /// existing destination is never replaced.
    pub fn persist(mut self, destination: &Path, overwrite: bool) -> FaceauthResult<()> {
        self.file_mut()?.sync_all()?;
        let temp = self.inner.take().ok_or_else(released)?;

        let result = if overwrite {
            temp.persist(destination)
        } else {
            temp.persist_noclobber(destination)
        };
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                scrub_and_remove(e.file);
                Err(FaceauthError::Resource(e.error))
            }
        }
    }

    fn file_mut(&mut self) -> io::Result<&mut File> {
        self.inner
            .as_mut()
            .map(|t| t.as_file_mut())
            .ok_or_else(released)
    }
}

impl Drop for ScrubbedTempFile {
    fn drop(&mut self) {
        if let Some(temp) = self.inner.take() {
            scrub_and_remove(temp);
        }
    }
}

impl Read for ScrubbedTempFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file_mut()?.read(buf)
    }
}

impl Write for ScrubbedTempFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file_mut()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file_mut()?.flush()
    }
}

impl Seek for ScrubbedTempFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file_mut()?.seek(pos)
    }
}

/// The output of one encrypt/decrypt, tracked until committed.
pub struct ScopedOutput {
    temp: Option<ScrubbedTempFile>,
    destination: PathBuf,
    overwrite: bool,
}

impl ScopedOutput {
    /// Start writing an output destined for `destination`.
    ///
    /// Fails up front when the destination exists and `overwrite` is off.
    pub fn create(destination: &Path, overwrite: bool) -> FaceauthResult<Self> {
        if !overwrite && destination.exists() {
            return Err(FaceauthError::Resource(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("output already exists: {}", destination.display()),
            )));
        }
        let temp = ScrubbedTempFile::new_in(parent_dir(destination))?;
        Ok(Self {
            temp: Some(temp),
            destination: destination.to_path_buf(),
            overwrite,
        })
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Move the finished output into place.
    pub fn commit(mut self) -> FaceauthResult<PathBuf> {
        let temp = self.temp.take().ok_or_else(released)?;
        temp.persist(&self.destination, self.overwrite)?;
        Ok(std::mem::take(&mut self.destination))
    }
}

impl Drop for ScopedOutput {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            tracing::warn!(
                destination = %self.destination.display(),
                "discarding partial output"
            );
            drop(temp);
        }
    }
}

impl Write for ScopedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.as_mut().ok_or_else(released)?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.as_mut().ok_or_else(released)?.flush()
    }
}

/// Directory that will hold `path`; `.` for bare file names.
pub(crate) fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn released() -> io::Error {
    io::Error::other("temporary file already released")
}

fn scrub_and_remove(mut temp: NamedTempFile) {
    let path = temp.path().to_path_buf();
    if let Err(e) = overwrite_with_random(temp.as_file_mut()) {
        tracing::warn!(path = %path.display(), "failed to overwrite temporary file: {e}");
    }
    if let Err(e) = temp.close() {
        tracing::warn!(path = %path.display(), "failed to remove temporary file: {e}");
    }
}

/// Overwrite the full current length of `file` with random bytes.
fn overwrite_with_random(file: &mut File) -> io::Result<()> {
    let len = file.metadata()?.len();
    file.seek(SeekFrom::Start(0))?;

    let mut rng = rand::thread_rng();
    let mut block = vec![0u8; SCRUB_BLOCK];
    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(SCRUB_BLOCK as u64) as usize;
        rng.fill_bytes(&mut block[..n]);
        file.write_all(&block[..n])?;
        remaining -= n as u64;
    }
    file.sync_all()
}
