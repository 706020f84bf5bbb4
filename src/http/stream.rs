//! Re-readable file streams for file responses.
//!
//! A raw file handle is consumed by the first read. `FileStream` can be
//! read many times: streams opened from a path re-open the file for every
//! reader, and handle-backed streams read the whole body with positional
//! reads, so measuring or logging a body never moves the offset of a
//! reader that is already streaming it.

use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Shared, re-readable file body.
#[derive(Debug, Clone)]
pub struct FileStream {
    file: Arc<Mutex<File>>,
    path: Option<PathBuf>,
    len: u64,
}

impl FileStream {
    /// Open `path` for reading. Every reader re-opens the path.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let mut stream = Self::from_file(File::open(path)?)?;
        stream.path = Some(path.to_path_buf());
        Ok(stream)
    }

    /// Wrap an already-open handle.
    pub fn from_file(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
            path: None,
            len,
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read the whole file from the start.
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        if let Some(path) = &self.path {
            return std::fs::read(path);
        }
        let file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        read_from_start(&file, self.len)
    }

    /// Handle positioned at the start, for streaming to a socket.
    ///
    /// Path-backed streams get a fresh descriptor. Handle-backed streams get
    /// a duplicate that shares its offset with other readers of the same
    /// stream (but not with `read_all`).
    pub fn reader(&self) -> io::Result<File> {
        if let Some(path) = &self.path {
            return File::open(path);
        }
        let file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        let mut handle = file.try_clone()?;
        handle.seek(SeekFrom::Start(0))?;
        Ok(handle)
    }
}

#[cfg(unix)]
fn read_from_start(file: &File, len: u64) -> io::Result<Vec<u8>> {
    use std::os::unix::fs::FileExt;

    let mut buf = Vec::with_capacity(len as usize);
    let mut chunk = [0u8; 8192];
    loop {
        let n = file.read_at(&mut chunk, buf.len() as u64)?;
        if n == 0 {
            return Ok(buf);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

#[cfg(not(unix))]
fn read_from_start(mut file: &File, len: u64) -> io::Result<Vec<u8>> {
    use std::io::Read;

    file.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::with_capacity(len as usize);
    file.read_to_end(&mut buf)?;
    Ok(buf)
}
