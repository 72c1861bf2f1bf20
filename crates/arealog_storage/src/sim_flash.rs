//! Simulated NOR flash medium.

use crate::error::{StorageError, StorageResult};
use crate::medium::{IoctlCmd, IoctlValue, Medium, MediumGeometry};
use parking_lot::{Mutex, RwLock};

#[derive(Debug, Default)]
struct Faults {
    fail_writes: usize,
    fail_write_covering: Option<u64>,
    fail_erases: usize,
}

/// An in-memory NOR flash simulation.
///
/// Enforces the constraints of real NOR flash: writes are aligned to the
/// write block, programming can only clear bits (1 to 0), and a write that
/// would need to set a cleared bit fails instead of silently corrupting.
/// An explicit erase restores whole blocks to 0xFF.
///
/// # Fault injection
///
/// Tests can make upcoming transactions fail:
///
/// - [`fail_next_writes`](Self::fail_next_writes) - the next `n` writes
///   return a medium failure before touching any cell.
/// - [`fail_write_covering`](Self::fail_write_covering) - the next write
///   whose range covers the given byte offset fails (one-shot).
/// - [`fail_next_erases`](Self::fail_next_erases) - the next `n` erases
///   fail.
#[derive(Debug)]
pub struct SimFlashMedium {
    cells: RwLock<Vec<u8>>,
    write_block_size: usize,
    erase_block_size: usize,
    faults: Mutex<Faults>,
}

impl SimFlashMedium {
    /// Creates a simulated flash of `erase_blocks` blocks, fully erased.
    #[must_use]
    pub fn new(write_block_size: usize, erase_block_size: usize, erase_blocks: usize) -> Self {
        Self {
            cells: RwLock::new(vec![0xFF; erase_block_size * erase_blocks]),
            write_block_size,
            erase_block_size,
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Makes the next `count` writes fail without touching any cell.
    pub fn fail_next_writes(&self, count: usize) {
        self.faults.lock().fail_writes = count;
    }

    /// Makes the next write whose range covers `offset` fail (one-shot).
    pub fn fail_write_covering(&self, offset: u64) {
        self.faults.lock().fail_write_covering = Some(offset);
    }

    /// Makes the next `count` erases fail.
    pub fn fail_next_erases(&self, count: usize) {
        self.faults.lock().fail_erases = count;
    }

    /// Returns a copy of the flash contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.cells.read().clone()
    }

    fn size(&self) -> u64 {
        self.cells.read().len() as u64
    }

    fn check_range(&self, offset: u64, len: usize) -> StorageResult<()> {
        let size = self.size();
        if len as u64 > size || offset > size - len as u64 {
            return Err(StorageError::InvalidRange { offset, len, size });
        }
        Ok(())
    }
}

impl Medium for SimFlashMedium {
    fn read(&self, offset: u64, buf: &mut [u8]) -> StorageResult<()> {
        self.check_range(offset, buf.len())?;
        let cells = self.cells.read();
        let start = offset as usize;
        buf.copy_from_slice(&cells[start..start + buf.len()]);
        Ok(())
    }

    fn write(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        {
            let mut faults = self.faults.lock();
            if faults.fail_writes > 0 {
                faults.fail_writes -= 1;
                return Err(StorageError::medium_failure(offset, "injected write fault"));
            }
            if let Some(at) = faults.fail_write_covering {
                if at >= offset && at < offset + data.len() as u64 {
                    faults.fail_write_covering = None;
                    return Err(StorageError::medium_failure(offset, "injected write fault"));
                }
            }
        }

        let align = self.write_block_size as u64;
        if offset % align != 0 || data.len() % self.write_block_size != 0 {
            return Err(StorageError::invalid_argument(
                "flash writes must be write-block aligned",
            ));
        }

        self.check_range(offset, data.len())?;

        let mut cells = self.cells.write();
        let start = offset as usize;

        for (i, &byte) in data.iter().enumerate() {
            let cell = cells[start + i];
            if byte & !cell != 0 {
                return Err(StorageError::medium_failure(
                    offset + i as u64,
                    "program without erase",
                ));
            }
            cells[start + i] = cell & byte;
        }

        Ok(())
    }

    fn erase(&self, block: usize, count: usize) -> StorageResult<()> {
        {
            let mut faults = self.faults.lock();
            if faults.fail_erases > 0 {
                faults.fail_erases -= 1;
                return Err(StorageError::medium_failure(
                    (block * self.erase_block_size) as u64,
                    "injected erase fault",
                ));
            }
        }

        let offset = (block * self.erase_block_size) as u64;
        let len = count * self.erase_block_size;
        self.check_range(offset, len)?;

        let mut cells = self.cells.write();
        let start = offset as usize;
        cells[start..start + len].fill(0xFF);
        Ok(())
    }

    fn ioctl(&self, cmd: IoctlCmd) -> StorageResult<IoctlValue> {
        match cmd {
            IoctlCmd::XipAddress => {
                Ok(IoctlValue::XipAddress(self.cells.read().as_ptr() as usize))
            }
        }
    }

    fn geometry(&self) -> MediumGeometry {
        MediumGeometry {
            write_block_size: self.write_block_size,
            erase_block_size: self.erase_block_size,
            size: self.size(),
            erase_value: 0xFF,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_starts_erased() {
        let flash = SimFlashMedium::new(8, 256, 2);
        assert!(flash.snapshot().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn flash_write_clears_bits() {
        let flash = SimFlashMedium::new(8, 256, 2);
        flash.write(0, &[0xF0; 8]).unwrap();

        let mut buf = [0u8; 8];
        flash.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0xF0; 8]);
    }

    #[test]
    fn flash_allows_one_to_zero_overwrite() {
        let flash = SimFlashMedium::new(8, 256, 2);
        flash.write(0, &[0xF0; 8]).unwrap();
        // 0x30 only clears bits that 0xF0 still has set.
        flash.write(0, &[0x30; 8]).unwrap();

        let mut buf = [0u8; 8];
        flash.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0x30; 8]);
    }

    #[test]
    fn flash_rejects_program_without_erase() {
        let flash = SimFlashMedium::new(8, 256, 2);
        flash.write(0, &[0x0F; 8]).unwrap();

        let result = flash.write(0, &[0xF0; 8]);
        assert!(matches!(result, Err(StorageError::MediumFailure { .. })));
    }

    #[test]
    fn flash_erase_restores_block() {
        let flash = SimFlashMedium::new(8, 256, 2);
        flash.write(0, &[0x00; 256]).unwrap();
        flash.erase(0, 1).unwrap();
        assert!(flash.snapshot()[..256].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn flash_rejects_misaligned_write() {
        let flash = SimFlashMedium::new(8, 256, 2);
        assert!(matches!(
            flash.write(4, &[0x00; 8]),
            Err(StorageError::InvalidArgument { .. })
        ));
        assert!(matches!(
            flash.write(0, &[0x00; 5]),
            Err(StorageError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn flash_injected_write_fault_fires_once_per_count() {
        let flash = SimFlashMedium::new(8, 256, 2);
        flash.fail_next_writes(2);

        assert!(flash.write(0, &[0x00; 8]).is_err());
        assert!(flash.write(0, &[0x00; 8]).is_err());
        flash.write(0, &[0x00; 8]).unwrap();
    }

    #[test]
    fn flash_fault_covering_offset_hits_matching_write() {
        let flash = SimFlashMedium::new(8, 256, 2);
        flash.fail_write_covering(16);

        // A write elsewhere is unaffected.
        flash.write(64, &[0x00; 8]).unwrap();
        // The write covering offset 16 fails once.
        assert!(flash.write(8, &[0x00; 16]).is_err());
        flash.write(8, &[0x00; 16]).unwrap();
    }

    #[test]
    fn flash_injected_erase_fault() {
        let flash = SimFlashMedium::new(8, 256, 2);
        flash.fail_next_erases(1);
        assert!(flash.erase(0, 1).is_err());
        flash.erase(0, 1).unwrap();
    }

    #[test]
    fn flash_faulted_write_leaves_cells_untouched() {
        let flash = SimFlashMedium::new(8, 256, 2);
        flash.fail_next_writes(1);
        assert!(flash.write(0, &[0x00; 8]).is_err());
        assert!(flash.snapshot()[..8].iter().all(|&b| b == 0xFF));
    }
}
