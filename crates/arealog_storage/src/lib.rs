//! # Arealog Storage
//!
//! Storage medium abstraction and byte-addressed area engine for arealog.
//!
//! This crate provides the lowest layer of the arealog stack:
//!
//! - [`Medium`] - the driver contract for one kind of device: plain byte
//!   reads, write-block-aligned writes, optional block erase, optional
//!   control operations.
//! - [`StorageArea`] - a uniform byte-addressed view over a medium with
//!   declared write/erase geometry and behavioral properties. The area
//!   validates ranges, performs gather/scatter I/O, and stages partial
//!   write blocks so the medium only ever sees aligned transfers.
//!
//! ## Available mediums
//!
//! - [`RamMedium`] - memory-backed, free overwrite
//! - [`SimFlashMedium`] - NOR flash simulation with fault injection
//! - [`FileMedium`] - file-backed disk-style medium
//!
//! ## Example
//!
//! ```rust
//! use arealog_storage::{AreaConfig, AreaProps, RamMedium, StorageArea};
//! use std::sync::Arc;
//!
//! let medium = Arc::new(RamMedium::new(1024, 4, false));
//! let config = AreaConfig::new(8, 1024, 4).props(AreaProps::new().full_overwrite());
//! let area = StorageArea::new(medium, config).unwrap();
//!
//! area.writev(0, &[b"hel".as_slice(), b"lo wo", b"rld!...."]).unwrap();
//! let mut buf = [0u8; 16];
//! area.read(0, &mut buf).unwrap();
//! assert_eq!(&buf, b"hello world!....");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod area;
mod disk;
mod error;
mod medium;
mod ram;
mod sim_flash;

pub use area::{AreaConfig, AreaProps, StorageArea};
pub use disk::FileMedium;
pub use error::{StorageError, StorageResult};
pub use medium::{IoctlCmd, IoctlValue, Medium, MediumGeometry};
pub use ram::RamMedium;
pub use sim_flash::SimFlashMedium;
