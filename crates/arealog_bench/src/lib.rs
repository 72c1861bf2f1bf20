//! Benchmark helpers for the arealog record store.

#![deny(unsafe_code)]

use arealog_core::{Store, StoreConfig, StoreMode};
use arealog_storage::{AreaConfig, AreaProps, RamMedium, StorageArea};
use std::sync::Arc;

/// Builds a mounted circular-buffer store on a RAM medium.
///
/// # Panics
///
/// Panics if the area or mount is rejected, which only happens on a
/// geometry mismatch in the benchmark configuration itself.
#[must_use]
pub fn ram_store(sector_size: usize, sector_count: usize) -> Store {
    let medium = Arc::new(RamMedium::new(sector_size, sector_count, false));
    let config = AreaConfig::new(8, sector_size, sector_count)
        .props(AreaProps::new().full_overwrite());
    let area = StorageArea::new(medium, config).unwrap();

    let store = Store::new(
        area,
        StoreConfig::new(sector_size, sector_count),
        StoreMode::Circular,
    );
    store.mount().unwrap();
    store
}
