//! # Arealog Core
//!
//! A log-structured record store over arealog storage areas.
//!
//! This crate provides:
//! - Record framing with CRC-32 protection and a configurable
//!   crc-skipped prefix for in-place invalidation
//! - The sector state machine: write position, wrap counter, sector
//!   cookies
//! - The log engine: append, iterate, validate, in-place update,
//!   advance, compact, mount-time scan and power-loss recovery
//! - Three store modes: read-only, simple circular buffer, persistent
//!   circular buffer
//!
//! ## Example
//!
//! ```rust
//! use arealog_core::{Store, StoreConfig, StoreMode};
//! use arealog_storage::{AreaConfig, AreaProps, RamMedium, StorageArea};
//! use std::sync::Arc;
//!
//! let medium = Arc::new(RamMedium::new(1024, 4, false));
//! let config = AreaConfig::new(8, 1024, 4).props(AreaProps::new().full_overwrite());
//! let area = StorageArea::new(medium, config).unwrap();
//!
//! let store = Store::new(area, StoreConfig::new(1024, 4), StoreMode::Circular);
//! store.mount().unwrap();
//! store.write(b"hello").unwrap();
//!
//! let record = store.records().unwrap().next().unwrap().unwrap();
//! let mut data = vec![0u8; record.size];
//! store.record_read(&record, 0, &mut data).unwrap();
//! assert_eq!(&data, b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod record;
mod store;

pub use error::{StoreError, StoreResult};
pub use record::{crc32, Crc32, RECORD_MAGIC};
pub use store::{
    CompactHooks, KeepFn, MovedFn, Position, Record, RecordIter, Store, StoreConfig, StoreMode,
};
