//! Direct backend over a positioned `std::fs::File`.
//!
//! Uses `pread`/`pwrite` on Unix so the OS file offset is never shared
//! state; the logical cursor lives entirely in [`DirectFile`].

use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::{Access, IoError, StorageFile};

/// Standard file-handle backend.
///
/// All operations are blocking and go through the OS page cache. `sync`
/// flushes data and metadata via `fsync`.
#[derive(Debug)]
pub struct DirectFile {
    /// `None` once closed.
    file: Option<File>,
    position: u64,
}

impl DirectFile {
    /// Opens `path` with the given access mode.
    ///
    /// Read-write access creates the file if it does not exist; read-only
    /// access fails if it does not.
    pub fn open(path: &Path, access: Access) -> Result<Self, IoError> {
        let mut opts = OpenOptions::new();
        opts.read(true);
        if access == Access::ReadWrite {
            opts.write(true).create(true);
        }
        let file = opts.open(path)?;
        Ok(Self {
            file: Some(file),
            position: 0,
        })
    }

    fn file(&self) -> Result<&File, IoError> {
        self.file.as_ref().ok_or(IoError::Closed)
    }
}

impl StorageFile for DirectFile {
    fn seek(&mut self, position: u64) {
        self.position = position;
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn read_fully(&mut self, buf: &mut [u8]) -> Result<(), IoError> {
        let file = self.file()?;
        let mut filled = 0;

        while filled < buf.len() {
            let offset = self.position + filled as u64;

            #[cfg(unix)]
            let n = {
                use std::os::unix::fs::FileExt;
                file.read_at(&mut buf[filled..], offset)?
            };

            #[cfg(not(unix))]
            let n = {
                use std::os::windows::fs::FileExt;
                file.seek_read(&mut buf[filled..], offset)?
            };

            if n == 0 {
                return Err(IoError::UnexpectedEof {
                    offset,
                    needed: buf.len() - filled,
                    length: file.metadata()?.len(),
                });
            }
            filled += n;
        }

        self.position += buf.len() as u64;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), IoError> {
        let file = self.file()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            file.write_all_at(buf, self.position)?;
        }

        #[cfg(not(unix))]
        {
            use std::os::windows::fs::FileExt;
            let mut written = 0;
            while written < buf.len() {
                let n = file.seek_write(&buf[written..], self.position + written as u64)?;
                written += n;
            }
        }

        self.position += buf.len() as u64;
        Ok(())
    }

    fn length(&self) -> Result<u64, IoError> {
        Ok(self.file()?.metadata()?.len())
    }

    fn set_length(&mut self, length: u64) -> Result<(), IoError> {
        self.file()?.set_len(length)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), IoError> {
        self.file()?.sync_all()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), IoError> {
        // Dropping the handle closes it
        self.file = None;
        Ok(())
    }
}
