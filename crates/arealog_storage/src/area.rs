//! Uniform byte-addressed I/O over a medium.

use crate::error::{StorageError, StorageResult};
use crate::medium::{IoctlCmd, IoctlValue, Medium};
use std::sync::Arc;
use tracing::debug;

/// Behavioral properties of a storage area.
///
/// The properties declare how the area *uses* the medium below it; they do
/// not remove any limitation of the medium itself. If neither overwrite
/// property is set, a written region must be erased before it is written
/// again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AreaProps {
    read_only: bool,
    full_overwrite: bool,
    limited_overwrite: bool,
    zero_erase: bool,
    auto_erase: bool,
}

impl AreaProps {
    /// Creates an empty property set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            read_only: false,
            full_overwrite: false,
            limited_overwrite: false,
            zero_erase: false,
            auto_erase: false,
        }
    }

    /// Marks the area read-only.
    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Any pattern may replace any (RAM, EEPROM, RRAM).
    #[must_use]
    pub const fn full_overwrite(mut self) -> Self {
        self.full_overwrite = true;
        self
    }

    /// Bits may only flip from the erased state (NOR flash).
    #[must_use]
    pub const fn limited_overwrite(mut self) -> Self {
        self.limited_overwrite = true;
        self
    }

    /// Erased storage reads as 0x00 instead of 0xFF.
    #[must_use]
    pub const fn zero_erase(mut self) -> Self {
        self.zero_erase = true;
        self
    }

    /// The area erases implicitly while writing.
    #[must_use]
    pub const fn auto_erase(mut self) -> Self {
        self.auto_erase = true;
        self
    }

    /// Returns true if the area is read-only.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Returns true if any pattern may replace any.
    #[must_use]
    pub const fn is_full_overwrite(&self) -> bool {
        self.full_overwrite
    }

    /// Returns true if bits may only flip from the erased state.
    #[must_use]
    pub const fn is_limited_overwrite(&self) -> bool {
        self.limited_overwrite
    }

    /// Returns true if erased storage reads as 0x00.
    #[must_use]
    pub const fn is_zero_erase(&self) -> bool {
        self.zero_erase
    }

    /// Returns true if the area erases implicitly while writing.
    #[must_use]
    pub const fn is_auto_erase(&self) -> bool {
        self.auto_erase
    }
}

/// Declared geometry and behavior of a [`StorageArea`].
#[derive(Debug, Clone)]
pub struct AreaConfig {
    /// Write block size in bytes; a power of two. Every physical write is
    /// a multiple of this.
    pub write_size: usize,
    /// Erase block size in bytes; a multiple of `write_size`.
    pub erase_size: usize,
    /// Number of erase blocks; the area spans `erase_size * erase_blocks`
    /// bytes.
    pub erase_blocks: usize,
    /// Behavioral properties.
    pub props: AreaProps,
    /// Check the declared geometry against the medium at construction.
    pub verify: bool,
}

impl AreaConfig {
    /// Creates a configuration with the given geometry and no properties.
    #[must_use]
    pub fn new(write_size: usize, erase_size: usize, erase_blocks: usize) -> Self {
        Self {
            write_size,
            erase_size,
            erase_blocks,
            props: AreaProps::new(),
            verify: false,
        }
    }

    /// Sets the behavioral properties.
    #[must_use]
    pub fn props(mut self, props: AreaProps) -> Self {
        self.props = props;
        self
    }

    /// Enables geometry verification against the medium.
    #[must_use]
    pub fn verify(mut self) -> Self {
        self.verify = true;
        self
    }
}

/// A byte-addressed view of a medium with fixed write and erase geometry.
///
/// The area performs range validation, gather/scatter I/O, and
/// write-alignment staging so that the medium below only ever sees
/// write-block-aligned, write-block-multiple writes.
///
/// # Example
///
/// ```rust
/// use arealog_storage::{AreaConfig, AreaProps, RamMedium, StorageArea};
/// use std::sync::Arc;
///
/// let medium = Arc::new(RamMedium::new(1024, 4, false));
/// let config = AreaConfig::new(8, 1024, 4).props(AreaProps::new().full_overwrite());
/// let area = StorageArea::new(medium, config).unwrap();
/// area.write(0, &[0u8; 16]).unwrap();
/// ```
pub struct StorageArea {
    medium: Arc<dyn Medium>,
    write_size: usize,
    erase_size: usize,
    erase_blocks: usize,
    props: AreaProps,
}

impl StorageArea {
    /// Creates a storage area over a medium.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfig`] if the geometry is
    /// inconsistent, or (with `verify` set) if the declared geometry cannot
    /// be expressed on the medium.
    pub fn new(medium: Arc<dyn Medium>, config: AreaConfig) -> StorageResult<Self> {
        if config.write_size == 0 || !config.write_size.is_power_of_two() {
            return Err(StorageError::invalid_config(
                "write size must be a power of two",
            ));
        }

        if config.erase_size == 0 || config.erase_size % config.write_size != 0 {
            return Err(StorageError::invalid_config(
                "erase size must be a non-zero multiple of the write size",
            ));
        }

        if config.erase_blocks == 0 {
            return Err(StorageError::invalid_config(
                "area must span at least one erase block",
            ));
        }

        let area = Self {
            medium,
            write_size: config.write_size,
            erase_size: config.erase_size,
            erase_blocks: config.erase_blocks,
            props: config.props,
        };

        if config.verify {
            area.verify_geometry()?;
        }

        Ok(area)
    }

    fn verify_geometry(&self) -> StorageResult<()> {
        let geo = self.medium.geometry();

        if self.write_size % geo.write_block_size != 0 {
            return Err(StorageError::invalid_config(
                "declared write size is not a multiple of the medium write block",
            ));
        }

        if self.erase_size % geo.erase_block_size != 0 {
            return Err(StorageError::invalid_config(
                "declared erase size is not a multiple of the medium erase block",
            ));
        }

        if self.size() > geo.size {
            return Err(StorageError::invalid_config(
                "declared area does not fit the medium",
            ));
        }

        if self.erase_value() != geo.erase_value {
            return Err(StorageError::invalid_config(
                "declared erase value does not match the medium",
            ));
        }

        Ok(())
    }

    /// Returns the write block size in bytes.
    #[must_use]
    pub fn write_size(&self) -> usize {
        self.write_size
    }

    /// Returns the erase block size in bytes.
    #[must_use]
    pub fn erase_size(&self) -> usize {
        self.erase_size
    }

    /// Returns the number of erase blocks.
    #[must_use]
    pub fn erase_blocks(&self) -> usize {
        self.erase_blocks
    }

    /// Returns the total area size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.erase_size as u64 * self.erase_blocks as u64
    }

    /// Returns the behavioral properties.
    #[must_use]
    pub fn props(&self) -> AreaProps {
        self.props
    }

    /// Returns the byte value of erased storage.
    #[must_use]
    pub fn erase_value(&self) -> u8 {
        if self.props.is_zero_erase() {
            0x00
        } else {
            0xFF
        }
    }

    fn range_valid(&self, offset: u64, len: usize) -> bool {
        let size = self.size();
        len as u64 <= size && offset <= size - len as u64
    }

    /// Reads into a sequence of buffers, in order, starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidRange`] if the aggregate range
    /// escapes the area, or a medium error.
    pub fn readv(&self, offset: u64, bufs: &mut [&mut [u8]]) -> StorageResult<()> {
        let total: usize = bufs.iter().map(|b| b.len()).sum();

        if !self.range_valid(offset, total) {
            return Err(StorageError::InvalidRange {
                offset,
                len: total,
                size: self.size(),
            });
        }

        // Reads have no alignment constraint, so each element goes to the
        // medium directly.
        let mut pos = offset;
        for buf in bufs.iter_mut() {
            self.medium.read(pos, buf)?;
            pos += buf.len() as u64;
        }

        Ok(())
    }

    /// Reads `buf.len()` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidRange`] if the range escapes the
    /// area, or a medium error.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> StorageResult<()> {
        self.readv(offset, &mut [buf])
    }

    /// Writes a sequence of parts, in order, starting at `offset`.
    ///
    /// The aggregate length must be a multiple of the write size and
    /// `offset` must be write-size aligned; the parts themselves may split
    /// anywhere. The engine stages partial write blocks across part
    /// boundaries so the medium only sees aligned, whole-block writes.
    ///
    /// # Errors
    ///
    /// - [`StorageError::ReadOnly`] if the area forbids writes.
    /// - [`StorageError::InvalidArgument`] on misaligned offset or length.
    /// - [`StorageError::InvalidRange`] if the range escapes the area.
    /// - Medium errors abort the call; earlier blocks may already have
    ///   been written.
    pub fn writev(&self, offset: u64, parts: &[&[u8]]) -> StorageResult<()> {
        if self.props.is_read_only() {
            return Err(StorageError::ReadOnly);
        }

        let total: usize = parts.iter().map(|p| p.len()).sum();
        let align = self.write_size;

        if total % align != 0 || offset % align as u64 != 0 {
            return Err(StorageError::invalid_argument(
                "write offset and length must be multiples of the write size",
            ));
        }

        if !self.range_valid(offset, total) {
            return Err(StorageError::InvalidRange {
                offset,
                len: total,
                size: self.size(),
            });
        }

        let mut staging = vec![0u8; align];
        let mut fill = 0usize;
        let mut pos = offset;

        for part in parts {
            let mut data = *part;

            if fill > 0 {
                let take = data.len().min(align - fill);
                staging[fill..fill + take].copy_from_slice(&data[..take]);
                fill += take;
                data = &data[take..];

                if fill == align {
                    self.medium_write(pos, &staging)?;
                    pos += align as u64;
                    fill = 0;
                }
            }

            let direct = data.len() & !(align - 1);
            if direct > 0 {
                self.medium_write(pos, &data[..direct])?;
                pos += direct as u64;
                data = &data[direct..];
            }

            if !data.is_empty() {
                staging[..data.len()].copy_from_slice(data);
                fill = data.len();
            }
        }

        // The total is a multiple of the write size, so the staging buffer
        // always drains on the last part.
        debug_assert_eq!(fill, 0);
        Ok(())
    }

    /// Writes `data` starting at `offset`.
    ///
    /// # Errors
    ///
    /// See [`Self::writev`].
    pub fn write(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        self.writev(offset, &[data])
    }

    /// Hands an aligned run to the medium, erasing ahead of the write on
    /// areas that erase implicitly.
    fn medium_write(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        if !self.props.is_auto_erase() || self.props.is_full_overwrite() {
            return self.medium.write(offset, data);
        }

        let esize = self.erase_size as u64;
        let mut pos = offset;
        let mut data = data;

        while !data.is_empty() {
            if pos % esize == 0 {
                self.medium.erase((pos / esize) as usize, 1)?;
            }

            let run = ((esize - pos % esize) as usize).min(data.len());
            self.medium.write(pos, &data[..run])?;
            pos += run as u64;
            data = &data[run..];
        }

        Ok(())
    }

    /// Erases `count` erase blocks starting at block `block`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::ReadOnly`] if the area forbids writes.
    /// - [`StorageError::InvalidRange`] if the blocks escape the area.
    /// - [`StorageError::Unsupported`] if the medium has no erase.
    pub fn erase(&self, block: usize, count: usize) -> StorageResult<()> {
        if self.props.is_read_only() {
            return Err(StorageError::ReadOnly);
        }

        if count > self.erase_blocks || block > self.erase_blocks - count {
            debug!(block, count, "erase range escapes the area");
            return Err(StorageError::InvalidRange {
                offset: block as u64 * self.erase_size as u64,
                len: count * self.erase_size,
                size: self.size(),
            });
        }

        self.medium.erase(block, count)
    }

    /// Forwards a control command to the medium.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unsupported`] if the medium does not
    /// implement the command.
    pub fn ioctl(&self, cmd: IoctlCmd) -> StorageResult<IoctlValue> {
        self.medium.ioctl(cmd)
    }
}

impl std::fmt::Debug for StorageArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageArea")
            .field("write_size", &self.write_size)
            .field("erase_size", &self.erase_size)
            .field("erase_blocks", &self.erase_blocks)
            .field("props", &self.props)
            .finish_non_exhaustive()
    }
}
