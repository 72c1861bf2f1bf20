//! File-backed disk-style medium.

use crate::error::{StorageError, StorageResult};
use crate::medium::{Medium, MediumGeometry};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Fill chunk used when erasing or extending the backing file.
const FILL_CHUNK: usize = 4096;

/// A file-backed medium.
///
/// Models a disk-style device: a fixed-size byte range with free
/// overwrite. The backing file is created (or extended) to the full medium
/// size at open and filled with the erase value, so a fresh medium reads
/// as erased. Erase is implemented by rewriting whole blocks with the
/// erase value.
///
/// # Durability
///
/// Writes go through OS file APIs; call [`sync`](Self::sync) to push data
/// to stable storage.
///
/// # Example
///
/// ```no_run
/// use arealog_storage::{FileMedium, Medium};
/// use std::path::Path;
///
/// let medium = FileMedium::open(Path::new("store.bin"), 4096, 16).unwrap();
/// medium.write(0, b"persistent").unwrap();
/// medium.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileMedium {
    path: PathBuf,
    file: RwLock<File>,
    erase_block_size: usize,
    erase_blocks: usize,
}

impl FileMedium {
    /// Opens or creates a file-backed medium of `erase_blocks` blocks of
    /// `erase_block_size` bytes.
    ///
    /// A new or short file is extended to the full size and the new range
    /// is filled with the erase value.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, extended, or filled.
    pub fn open(path: &Path, erase_block_size: usize, erase_blocks: usize) -> StorageResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let size = (erase_block_size * erase_blocks) as u64;
        let existing = file.metadata()?.len();

        if existing < size {
            file.seek(SeekFrom::Start(existing))?;
            let fill = [0xFFu8; FILL_CHUNK];
            let mut remaining = (size - existing) as usize;
            while remaining > 0 {
                let n = remaining.min(FILL_CHUNK);
                file.write_all(&fill[..n])?;
                remaining -= n;
            }
            file.flush()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            erase_block_size,
            erase_blocks,
        })
    }

    /// Returns the path to the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Syncs all data to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> StorageResult<()> {
        self.file.write().sync_all()?;
        Ok(())
    }

    fn size(&self) -> u64 {
        (self.erase_block_size * self.erase_blocks) as u64
    }

    fn check_range(&self, offset: u64, len: usize) -> StorageResult<()> {
        let size = self.size();
        if len as u64 > size || offset > size - len as u64 {
            return Err(StorageError::InvalidRange { offset, len, size });
        }
        Ok(())
    }
}

impl Medium for FileMedium {
    fn read(&self, offset: u64, buf: &mut [u8]) -> StorageResult<()> {
        self.check_range(offset, buf.len())?;
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        self.check_range(offset, data.len())?;
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    fn erase(&self, block: usize, count: usize) -> StorageResult<()> {
        let offset = (block * self.erase_block_size) as u64;
        let len = count * self.erase_block_size;
        self.check_range(offset, len)?;

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;

        let fill = [0xFFu8; FILL_CHUNK];
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(FILL_CHUNK);
            file.write_all(&fill[..n])?;
            remaining -= n;
        }

        Ok(())
    }

    fn geometry(&self) -> MediumGeometry {
        MediumGeometry {
            write_block_size: 1,
            erase_block_size: self.erase_block_size,
            size: self.size(),
            erase_value: 0xFF,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_medium_starts_erased() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("medium.bin");

        let medium = FileMedium::open(&path, 256, 4).unwrap();
        let mut buf = vec![0u8; 1024];
        medium.read(0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn file_medium_write_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("medium.bin");

        let medium = FileMedium::open(&path, 256, 4).unwrap();
        medium.write(100, b"disk data").unwrap();

        let mut buf = [0u8; 9];
        medium.read(100, &mut buf).unwrap();
        assert_eq!(&buf, b"disk data");
    }

    #[test]
    fn file_medium_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("medium.bin");

        {
            let medium = FileMedium::open(&path, 256, 4).unwrap();
            medium.write(0, b"durable").unwrap();
            medium.sync().unwrap();
        }

        let medium = FileMedium::open(&path, 256, 4).unwrap();
        let mut buf = [0u8; 7];
        medium.read(0, &mut buf).unwrap();
        assert_eq!(&buf, b"durable");
    }

    #[test]
    fn file_medium_erase_fills_blocks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("medium.bin");

        let medium = FileMedium::open(&path, 256, 4).unwrap();
        medium.write(0, &vec![0x00; 512]).unwrap();
        medium.erase(0, 1).unwrap();

        let mut buf = vec![0u8; 512];
        medium.read(0, &mut buf).unwrap();
        assert!(buf[..256].iter().all(|&b| b == 0xFF));
        assert!(buf[256..].iter().all(|&b| b == 0x00));
    }

    #[test]
    fn file_medium_rejects_out_of_range() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("medium.bin");

        let medium = FileMedium::open(&path, 256, 4).unwrap();
        assert!(matches!(
            medium.write(1020, &[0u8; 8]),
            Err(StorageError::InvalidRange { .. })
        ));
    }

    #[test]
    fn file_medium_has_no_xip_address() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("medium.bin");

        let medium = FileMedium::open(&path, 256, 4).unwrap();
        assert!(matches!(
            medium.ioctl(crate::IoctlCmd::XipAddress),
            Err(StorageError::Unsupported)
        ));
    }
}
