//! Medium driver contract.

use crate::error::{StorageError, StorageResult};

/// Physical geometry reported by a medium driver.
///
/// Consumed by the optional verification pass of
/// [`StorageArea`](crate::StorageArea) construction; the declared area
/// geometry must be expressible on top of these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediumGeometry {
    /// Smallest physical write unit in bytes.
    pub write_block_size: usize,
    /// Physical erase block size in bytes.
    pub erase_block_size: usize,
    /// Total medium size in bytes.
    pub size: u64,
    /// Byte value the medium reads as after an erase.
    pub erase_value: u8,
}

/// Commands understood by [`Medium::ioctl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlCmd {
    /// Request the CPU-mapped base address of the medium, if any.
    XipAddress,
}

/// Values returned by [`Medium::ioctl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlValue {
    /// CPU-mapped base address of the medium.
    XipAddress(usize),
}

/// A low-level storage medium.
///
/// Mediums are **opaque byte stores with geometry**: they move bytes at
/// offsets and, where the hardware requires it, erase whole blocks. All
/// format interpretation happens above them.
///
/// # Contract
///
/// - `read` has no alignment constraint.
/// - `write` is only called with offsets and lengths that are multiples of
///   the write block size declared by the area on top; drivers may rely on
///   this.
/// - `erase` addresses whole erase blocks; mediums that overwrite freely
///   may leave the default [`StorageError::Unsupported`] implementation.
/// - Drivers must not retain the passed buffers beyond the call.
///
/// # Implementors
///
/// - [`RamMedium`](crate::RamMedium) - memory-backed, free overwrite
/// - [`SimFlashMedium`](crate::SimFlashMedium) - NOR flash simulation
/// - [`FileMedium`](crate::FileMedium) - file-backed disk-style medium
pub trait Medium: Send + Sync {
    /// Reads `buf.len()` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range escapes the medium or the underlying
    /// transaction fails.
    fn read(&self, offset: u64, buf: &mut [u8]) -> StorageResult<()>;

    /// Writes `data` starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range escapes the medium, the transaction
    /// fails, or the medium's write constraints are violated.
    fn write(&self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Erases `count` erase blocks starting at block `block`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unsupported`] for mediums without an erase
    /// primitive.
    fn erase(&self, block: usize, count: usize) -> StorageResult<()> {
        let _ = (block, count);
        Err(StorageError::Unsupported)
    }

    /// Driver-specific control operations.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unsupported`] for commands the medium does
    /// not implement.
    fn ioctl(&self, cmd: IoctlCmd) -> StorageResult<IoctlValue> {
        let _ = cmd;
        Err(StorageError::Unsupported)
    }

    /// Returns the physical geometry of the medium.
    fn geometry(&self) -> MediumGeometry;
}
