//! Memory-backed medium.

use crate::error::{StorageError, StorageResult};
use crate::medium::{IoctlCmd, IoctlValue, Medium, MediumGeometry};
use parking_lot::RwLock;

/// A memory-backed medium.
///
/// Models RAM-like storage: any pattern may replace any, erase simply
/// fills blocks with the erase value. Suitable for unit tests, ephemeral
/// stores, and shared-memory regions.
///
/// # Example
///
/// ```rust
/// use arealog_storage::{Medium, RamMedium};
///
/// let medium = RamMedium::new(1024, 4, false);
/// medium.write(0, b"data").unwrap();
/// let mut buf = [0u8; 4];
/// medium.read(0, &mut buf).unwrap();
/// assert_eq!(&buf, b"data");
/// ```
#[derive(Debug)]
pub struct RamMedium {
    data: RwLock<Vec<u8>>,
    erase_block_size: usize,
    erase_value: u8,
}

impl RamMedium {
    /// Creates a medium of `erase_blocks` blocks of `erase_block_size`
    /// bytes, initialized to the erase value.
    #[must_use]
    pub fn new(erase_block_size: usize, erase_blocks: usize, zero_erase: bool) -> Self {
        let erase_value = if zero_erase { 0x00 } else { 0xFF };
        Self {
            data: RwLock::new(vec![erase_value; erase_block_size * erase_blocks]),
            erase_block_size,
            erase_value,
        }
    }

    /// Returns a copy of the medium contents.
    ///
    /// Useful for inspecting on-medium layout in tests.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    fn size(&self) -> u64 {
        self.data.read().len() as u64
    }

    fn check_range(&self, offset: u64, len: usize) -> StorageResult<()> {
        let size = self.size();
        if len as u64 > size || offset > size - len as u64 {
            return Err(StorageError::InvalidRange { offset, len, size });
        }
        Ok(())
    }
}

impl Medium for RamMedium {
    fn read(&self, offset: u64, buf: &mut [u8]) -> StorageResult<()> {
        self.check_range(offset, buf.len())?;
        let data = self.data.read();
        let start = offset as usize;
        buf.copy_from_slice(&data[start..start + buf.len()]);
        Ok(())
    }

    fn write(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        self.check_range(offset, data.len())?;
        let mut cells = self.data.write();
        let start = offset as usize;
        cells[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn erase(&self, block: usize, count: usize) -> StorageResult<()> {
        let offset = (block * self.erase_block_size) as u64;
        let len = count * self.erase_block_size;
        self.check_range(offset, len)?;

        let mut cells = self.data.write();
        let start = offset as usize;
        cells[start..start + len].fill(self.erase_value);
        Ok(())
    }

    fn ioctl(&self, cmd: IoctlCmd) -> StorageResult<IoctlValue> {
        match cmd {
            IoctlCmd::XipAddress => Ok(IoctlValue::XipAddress(self.data.read().as_ptr() as usize)),
        }
    }

    fn geometry(&self) -> MediumGeometry {
        MediumGeometry {
            write_block_size: 1,
            erase_block_size: self.erase_block_size,
            size: self.size(),
            erase_value: self.erase_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ram_starts_erased() {
        let medium = RamMedium::new(64, 2, false);
        assert!(medium.snapshot().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn ram_zero_erase_starts_zeroed() {
        let medium = RamMedium::new(64, 2, true);
        assert!(medium.snapshot().iter().all(|&b| b == 0x00));
        assert_eq!(medium.geometry().erase_value, 0x00);
    }

    #[test]
    fn ram_write_and_read_roundtrip() {
        let medium = RamMedium::new(64, 2, false);
        medium.write(10, b"hello").unwrap();

        let mut buf = [0u8; 5];
        medium.read(10, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn ram_overwrite_allowed() {
        let medium = RamMedium::new(64, 2, false);
        medium.write(0, &[0x00; 8]).unwrap();
        medium.write(0, &[0xAA; 8]).unwrap();

        let mut buf = [0u8; 8];
        medium.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0xAA; 8]);
    }

    #[test]
    fn ram_erase_fills_blocks() {
        let medium = RamMedium::new(64, 2, false);
        medium.write(0, &vec![0x00; 128]).unwrap();
        medium.erase(1, 1).unwrap();

        let snapshot = medium.snapshot();
        assert!(snapshot[..64].iter().all(|&b| b == 0x00));
        assert!(snapshot[64..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn ram_read_out_of_range_fails() {
        let medium = RamMedium::new(64, 2, false);
        let mut buf = [0u8; 16];
        assert!(matches!(
            medium.read(120, &mut buf),
            Err(StorageError::InvalidRange { .. })
        ));
    }

    #[test]
    fn ram_reports_xip_address() {
        let medium = RamMedium::new(64, 2, false);
        let value = medium.ioctl(IoctlCmd::XipAddress).unwrap();
        assert!(matches!(value, IoctlValue::XipAddress(addr) if addr != 0));
    }
}
