//! The storage area store: a record log over a storage area.

mod compact;
mod iter;

pub use iter::RecordIter;

use crate::error::{StoreError, StoreResult};
use crate::record::{
    align_down, align_up, encode_header, framed_len, slot_size, Crc32, CRC_SIZE, FILL_VALUE,
    HEADER_SIZE, MIN_BUF_SIZE,
};
use arealog_storage::StorageArea;
use parking_lot::Mutex;
use std::fmt;
use tracing::debug;

/// Decides whether a record survives a compact.
pub type KeepFn = dyn Fn(&Store, &Record) -> bool + Send + Sync;

/// Observes a completed record move, e.g. to update an external index.
pub type MovedFn = dyn Fn(&Store, &Record, &Record) + Send + Sync;

/// Callbacks driving compaction of a persistent circular buffer.
pub struct CompactHooks {
    keep: Box<KeepFn>,
    moved: Option<Box<MovedFn>>,
}

impl CompactHooks {
    /// Creates hooks with a liveness decision.
    ///
    /// `keep` is called for every readable record in a sector about to be
    /// reclaimed; returning `true` copies the record forward.
    ///
    /// Both hooks run while the store's internal lock is held: they may
    /// use the record access methods ([`Store::record_read`],
    /// [`Store::record_readv`], [`Store::record_valid`]) but must not
    /// call state-mutating or state-reading entry points such as
    /// [`Store::write`] or [`Store::position`].
    pub fn new<F>(keep: F) -> Self
    where
        F: Fn(&Store, &Record) -> bool + Send + Sync + 'static,
    {
        Self {
            keep: Box::new(keep),
            moved: None,
        }
    }

    /// Registers an observer invoked after each record move with the
    /// original and destination handles.
    #[must_use]
    pub fn on_moved<F>(mut self, moved: F) -> Self
    where
        F: Fn(&Store, &Record, &Record) + Send + Sync + 'static,
    {
        self.moved = Some(Box::new(moved));
        self
    }
}

impl fmt::Debug for CompactHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompactHooks")
            .field("moved", &self.moved.is_some())
            .finish_non_exhaustive()
    }
}

/// Behavior of a store.
#[derive(Debug)]
pub enum StoreMode {
    /// Reading only; write, advance and compact are unsupported.
    ReadOnly,
    /// Simple circular buffer: advancing takes the next sector into use
    /// and old data is erased or overwritten.
    Circular,
    /// Persistent circular buffer: compaction copies records the hooks
    /// want kept to the front before their sector is reclaimed. Without
    /// hooks this behaves like [`StoreMode::Circular`] with spare
    /// sectors.
    Persistent {
        /// Compaction callbacks; `None` disables moves and recovery.
        hooks: Option<CompactHooks>,
    },
}

/// Configuration of a store on top of a storage area.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Sector size in bytes; a multiple of the area write size and a
    /// divisor or multiple of the area erase size.
    pub sector_size: usize,
    /// Number of sectors; `sector_size * sector_count` must fit the area.
    pub sector_count: usize,
    /// Sectors kept unused between the write head and the records ahead
    /// of it. Persistent stores with hooks require
    /// `spare_sectors * sector_size >= erase_size`.
    pub spare_sectors: usize,
    /// Record data bytes excluded from the crc so they may be rewritten
    /// in place, e.g. to invalidate a record.
    pub crc_skip: usize,
    /// Opaque blob written at the start of every sector taken into use.
    pub cookie: Option<Vec<u8>>,
}

impl StoreConfig {
    /// Creates a configuration with no spares, no crc skip and no cookie.
    #[must_use]
    pub fn new(sector_size: usize, sector_count: usize) -> Self {
        Self {
            sector_size,
            sector_count,
            spare_sectors: 0,
            crc_skip: 0,
            cookie: None,
        }
    }

    /// Sets the number of spare sectors.
    #[must_use]
    pub fn spare_sectors(mut self, spare_sectors: usize) -> Self {
        self.spare_sectors = spare_sectors;
        self
    }

    /// Sets the number of record data bytes excluded from the crc.
    #[must_use]
    pub fn crc_skip(mut self, crc_skip: usize) -> Self {
        self.crc_skip = crc_skip;
        self
    }

    /// Sets the sector cookie.
    #[must_use]
    pub fn cookie(mut self, cookie: impl Into<Vec<u8>>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }
}

/// A handle to one record in a store.
///
/// Handles are ephemeral values: any write, advance or compact on the
/// store invalidates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    /// Sector holding the record.
    pub sector: usize,
    /// Byte offset of the record header within the sector.
    pub loc: usize,
    /// Payload length in bytes.
    pub size: usize,
}

/// The write position of a mounted store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Current write sector.
    pub sector: usize,
    /// Next write offset within the sector.
    pub loc: usize,
    /// Current wrap counter.
    pub wrapcnt: u8,
}

#[derive(Debug)]
struct StoreState {
    ready: bool,
    sector: usize,
    loc: usize,
    wrapcnt: u8,
}

/// A snapshot of the write head, taken at a well-defined point.
#[derive(Debug, Clone, Copy)]
struct Head {
    sector: usize,
    loc: usize,
    wrapcnt: u8,
}

impl Head {
    fn of(state: &StoreState) -> Self {
        Self {
            sector: state.sector,
            loc: state.loc,
            wrapcnt: state.wrapcnt,
        }
    }
}

/// A record log over a storage area.
///
/// The store partitions its area into fixed-size sectors and appends
/// crc-protected records to the current one. Mounting scans the area to
/// rebuild the write position; see [`StoreMode`] for what happens when
/// space runs out.
///
/// All state-mutating operations serialize on an internal lock. Reads and
/// iteration snapshot the write head and are otherwise unguarded; they
/// stop correctly at the head observed when they started.
pub struct Store {
    area: StorageArea,
    sector_size: usize,
    sector_count: usize,
    spare_sectors: usize,
    crc_skip: usize,
    cookie: Option<Vec<u8>>,
    mode: StoreMode,
    state: Mutex<StoreState>,
}

impl Store {
    /// Creates an unmounted store. Configuration is checked at mount.
    #[must_use]
    pub fn new(area: StorageArea, config: StoreConfig, mode: StoreMode) -> Self {
        Self {
            area,
            sector_size: config.sector_size,
            sector_count: config.sector_count,
            spare_sectors: config.spare_sectors,
            crc_skip: config.crc_skip,
            cookie: config.cookie,
            mode,
            state: Mutex::new(StoreState {
                ready: false,
                sector: 0,
                loc: 0,
                wrapcnt: 0,
            }),
        }
    }

    /// Returns the storage area below the store.
    #[must_use]
    pub fn area(&self) -> &StorageArea {
        &self.area
    }

    /// Returns the sector size in bytes.
    #[must_use]
    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    /// Returns the number of sectors.
    #[must_use]
    pub fn sector_count(&self) -> usize {
        self.sector_count
    }

    /// Returns the number of spare sectors.
    #[must_use]
    pub fn spare_sectors(&self) -> usize {
        self.spare_sectors
    }

    /// Returns the number of record data bytes excluded from the crc.
    #[must_use]
    pub fn crc_skip(&self) -> usize {
        self.crc_skip
    }

    /// Returns true if the store is mounted.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.state.lock().ready
    }

    /// Returns the current write position.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotReady`] if the store is not mounted.
    pub fn position(&self) -> StoreResult<Position> {
        let state = self.state.lock();
        if !state.ready {
            return Err(StoreError::NotReady);
        }
        Ok(Position {
            sector: state.sector,
            loc: state.loc,
            wrapcnt: state.wrapcnt,
        })
    }

    fn sector_off(&self, sector: usize) -> u64 {
        sector as u64 * self.sector_size as u64
    }

    fn advance_sector(&self, sector: usize, count: usize) -> usize {
        (sector + count) % self.sector_count
    }

    fn reverse_sector(&self, sector: usize, count: usize) -> usize {
        (sector + self.sector_count - count % self.sector_count) % self.sector_count
    }

    fn validate_config(&self) -> StoreResult<()> {
        let write_size = self.area.write_size();
        let erase_size = self.area.erase_size();

        if self.sector_size == 0 || self.sector_size % write_size != 0 {
            return Err(StoreError::invalid_config(
                "sector size must be a non-zero multiple of the area write size",
            ));
        }

        if erase_size % self.sector_size != 0 && self.sector_size % erase_size != 0 {
            return Err(StoreError::invalid_config(
                "sector size must divide or be a multiple of the erase size",
            ));
        }

        if self.sector_count == 0 {
            return Err(StoreError::invalid_config("sector count must be non-zero"));
        }

        if self.sector_size as u64 * self.sector_count as u64 > self.area.size() {
            return Err(StoreError::invalid_config("store does not fit the area"));
        }

        if let StoreMode::Persistent { hooks: Some(_) } = &self.mode {
            if self.spare_sectors * self.sector_size < erase_size {
                return Err(StoreError::invalid_config(
                    "compaction needs at least one erase block of spare sectors",
                ));
            }
        }

        if let Some(cookie) = &self.cookie {
            if align_up(cookie.len(), write_size) >= self.sector_size {
                return Err(StoreError::invalid_config(
                    "sector cookie does not fit the sector",
                ));
            }
        }

        Ok(())
    }

    /// Mounts the store by scanning the area for the write position.
    ///
    /// For circular buffers an empty area is seeded by taking sector 0
    /// into use; a persistent store with hooks additionally checks for an
    /// interrupted compact and finishes it. This can be a slow operation.
    ///
    /// # Errors
    ///
    /// - [`StoreError::AlreadyMounted`] if the store is mounted.
    /// - [`StoreError::InvalidConfig`] if the configuration is rejected.
    /// - Storage errors from seeding or recovery.
    pub fn mount(&self) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state.ready {
            return Err(StoreError::AlreadyMounted);
        }

        self.validate_config()?;

        // Sentinel: no sector with a readable record found yet.
        state.sector = self.sector_count;
        state.loc = self.sector_size;

        for i in 0..self.sector_count {
            let mut record = Record {
                sector: i,
                loc: 0,
                size: 0,
            };
            if self
                .next_in_sector(Head::of(&state), &mut record, false, false)
                .is_err()
            {
                continue;
            }

            let mut wrap = [0u8; 1];
            let off = self.sector_off(i) + record.loc as u64 + 1;
            if self.area.read(off, &mut wrap).is_err() {
                continue;
            }

            if state.sector > i {
                state.wrapcnt = wrap[0];
            }

            if wrap[0] != state.wrapcnt {
                // Crossed the wrap boundary; the previous sector is the head.
                break;
            }

            state.sector = i;
        }

        if state.sector == self.sector_count {
            match self.mode {
                StoreMode::ReadOnly => {
                    state.sector = 0;
                    state.loc = 0;
                    state.wrapcnt = 0;
                }
                _ => {
                    state.sector = self.sector_count - 1;
                    self.do_advance(&mut state)?;
                    state.wrapcnt = 0;
                }
            }
        } else {
            // Walk the head sector permissively to place the write
            // position just past its last readable record.
            let head = Head::of(&state);
            let mut record = Record {
                sector: state.sector,
                loc: 0,
                size: 0,
            };
            let mut loc = 0;
            while self
                .next_in_sector(head, &mut record, true, true)
                .is_ok()
            {
                loc = record.loc + slot_size(record.size, self.area.write_size());
            }
            state.loc = loc;

            if let StoreMode::Persistent { hooks: Some(hooks) } = &self.mode {
                self.recovery(&mut state, hooks)?;
            }
        }

        state.ready = true;
        debug!(
            sector = state.sector,
            loc = state.loc,
            wrapcnt = state.wrapcnt,
            "store mounted"
        );
        Ok(())
    }

    /// Unmounts the store. Idempotent; performs no I/O.
    pub fn unmount(&self) {
        self.state.lock().ready = false;
    }

    /// Erases every block of the area. Only allowed while unmounted.
    ///
    /// # Errors
    ///
    /// - [`StoreError::AlreadyMounted`] if the store is mounted.
    /// - Storage errors from the erase.
    pub fn wipe(&self) -> StoreResult<()> {
        let state = self.state.lock();
        if state.ready {
            return Err(StoreError::AlreadyMounted);
        }

        self.area.erase(0, self.area.erase_blocks())?;
        Ok(())
    }

    /// Appends a record built from `parts`, concatenated in order.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotReady`] if the store is not mounted.
    /// - [`StoreError::Unsupported`] on a read-only store.
    /// - [`StoreError::InvalidArgument`] for an empty payload or one
    ///   above 65535 bytes.
    /// - [`StoreError::NoSpace`] if the current sector cannot hold the
    ///   framed record; the write position is unchanged.
    pub fn writev(&self, parts: &[&[u8]]) -> StoreResult<()> {
        let mut state = self.state.lock();
        if !state.ready {
            return Err(StoreError::NotReady);
        }

        if matches!(self.mode, StoreMode::ReadOnly) {
            return Err(StoreError::Unsupported);
        }

        self.do_writev(&mut state, parts)
    }

    /// Appends a record with the given payload.
    ///
    /// # Errors
    ///
    /// See [`Self::writev`].
    pub fn write(&self, data: &[u8]) -> StoreResult<()> {
        self.writev(&[data])
    }

    /// Takes the next sector into use. This may erase old data and can be
    /// a slow operation.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotReady`] if the store is not mounted.
    /// - [`StoreError::Unsupported`] on a read-only store.
    /// - Storage errors from filling, erasing or the cookie write.
    pub fn advance(&self) -> StoreResult<()> {
        let mut state = self.state.lock();
        if !state.ready {
            return Err(StoreError::NotReady);
        }

        if matches!(self.mode, StoreMode::ReadOnly) {
            return Err(StoreError::Unsupported);
        }

        self.do_advance(&mut state)
    }

    /// Advances and, on a persistent store with hooks, copies live
    /// records out of the sectors about to be reclaimed. Can be a slow
    /// operation.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotReady`] if the store is not mounted.
    /// - [`StoreError::Unsupported`] on a read-only store.
    /// - Storage errors from the advance or the moves.
    pub fn compact(&self) -> StoreResult<()> {
        let mut state = self.state.lock();
        if !state.ready {
            return Err(StoreError::NotReady);
        }

        match &self.mode {
            StoreMode::ReadOnly => Err(StoreError::Unsupported),
            StoreMode::Circular => self.do_compact(&mut state, None),
            StoreMode::Persistent { hooks } => self.do_compact(&mut state, hooks.as_ref()),
        }
    }

    /// Returns an iterator over the readable records, oldest first.
    ///
    /// The iterator snapshots the write head; records appended afterwards
    /// are not visited.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotReady`] if the store is not mounted.
    pub fn records(&self) -> StoreResult<RecordIter<'_>> {
        let state = self.state.lock();
        if !state.ready {
            return Err(StoreError::NotReady);
        }
        Ok(RecordIter::new(self, Head::of(&state)))
    }

    /// Returns true if the record's crc checks out.
    #[must_use]
    pub fn record_valid(&self, record: &Record) -> bool {
        let fits = record.size > 0
            && record.sector < self.sector_count
            && record.loc < self.sector_size
            && framed_len(record.size) < self.sector_size - record.loc;

        fits && self.record_crc_ok(record)
    }

    /// Reads record data starting at `start` into a sequence of buffers.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidArgument`] if the range escapes the record
    ///   data.
    /// - Storage errors from the reads.
    pub fn record_readv(
        &self,
        record: &Record,
        start: usize,
        bufs: &mut [&mut [u8]],
    ) -> StoreResult<()> {
        let total: usize = bufs.iter().map(|b| b.len()).sum();

        if record.sector >= self.sector_count
            || record.loc > self.sector_size
            || record.size > self.sector_size
            || record.size < start.saturating_add(total)
        {
            return Err(StoreError::invalid_argument(
                "read escapes the record data",
            ));
        }

        let off = self.sector_off(record.sector) + (record.loc + HEADER_SIZE + start) as u64;
        self.area.readv(off, bufs)?;
        Ok(())
    }

    /// Reads record data starting at `start` into `buf`.
    ///
    /// # Errors
    ///
    /// See [`Self::record_readv`].
    pub fn record_read(&self, record: &Record, start: usize, buf: &mut [u8]) -> StoreResult<()> {
        self.record_readv(record, start, &mut [buf])
    }

    /// Rewrites the start of a record's data in place.
    ///
    /// Only possible on areas that support overwriting, and only within
    /// the crc-skipped prefix, so the record's crc stays intact. On
    /// limited-overwrite areas the new data may only clear bits. Used to
    /// mark records invalid.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Unsupported`] if the area forbids overwrites.
    /// - [`StoreError::InvalidArgument`] if the record is not valid or
    ///   the update exceeds the crc-skipped prefix.
    /// - Storage errors from the read-modify-write.
    pub fn record_update(&self, record: &Record, data: &[u8]) -> StoreResult<()> {
        let props = self.area.props();
        if !props.is_full_overwrite() && !props.is_limited_overwrite() {
            return Err(StoreError::Unsupported);
        }

        if data.len() > self.crc_skip || !self.record_valid(record) {
            return Err(StoreError::invalid_argument(
                "update must stay within the crc-skipped prefix of a valid record",
            ));
        }

        let align = self.area.write_size();
        let sector_base = self.sector_off(record.sector);
        let mut window = sector_base + align_down(record.loc + HEADER_SIZE, align) as u64;
        let mut cursor = sector_base + (record.loc + HEADER_SIZE) as u64;
        let mut buf = vec![0u8; align];
        let mut remaining = data;

        while !remaining.is_empty() {
            let into = (cursor - window) as usize;
            let n = remaining.len().min(align - into);

            self.area.read(window, &mut buf)?;
            buf[into..into + n].copy_from_slice(&remaining[..n]);
            self.area.write(window, &buf)?;

            remaining = &remaining[n..];
            cursor += n as u64;
            window += align as u64;
        }

        Ok(())
    }

    /// Reads the cookie of a sector into `buf`.
    ///
    /// Returns the number of bytes read: the smaller of the buffer and
    /// the configured cookie.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidArgument`] if no cookie is configured or
    ///   the sector is out of range.
    /// - Storage errors from the read.
    pub fn sector_cookie(&self, sector: usize, buf: &mut [u8]) -> StoreResult<usize> {
        let Some(cookie) = &self.cookie else {
            return Err(StoreError::invalid_argument("store has no sector cookie"));
        };

        if sector >= self.sector_count {
            return Err(StoreError::invalid_argument("sector out of range"));
        }

        let n = buf.len().min(cookie.len());
        self.area.read(self.sector_off(sector), &mut buf[..n])?;
        Ok(n)
    }

    fn do_writev(&self, state: &mut StoreState, parts: &[&[u8]]) -> StoreResult<()> {
        let payload: usize = parts.iter().map(|p| p.len()).sum();

        if payload == 0 {
            return Err(StoreError::invalid_argument(
                "record payload must not be empty",
            ));
        }

        if payload > u16::MAX as usize {
            return Err(StoreError::invalid_argument(
                "record payload exceeds 65535 bytes",
            ));
        }

        let write_size = self.area.write_size();
        let framed = framed_len(payload);

        if framed > self.sector_size || self.sector_size - framed < state.loc {
            return Err(StoreError::NoSpace);
        }

        let header = encode_header(state.wrapcnt, payload as u16);

        let mut crc = Crc32::new();
        let mut skip = self.crc_skip;
        for part in parts {
            if skip >= part.len() {
                skip -= part.len();
                continue;
            }
            crc.update(&part[skip..]);
            skip = 0;
        }

        let slot = align_up(framed, write_size);
        let mut trailer = vec![FILL_VALUE; slot - payload - HEADER_SIZE];
        trailer[..CRC_SIZE].copy_from_slice(&crc.finalize().to_le_bytes());

        let mut iov: Vec<&[u8]> = Vec::with_capacity(parts.len() + 2);
        iov.push(&header);
        iov.extend_from_slice(parts);
        iov.push(&trailer);

        loop {
            let off = self.sector_off(state.sector) + state.loc as u64;
            match self.area.writev(off, &iov) {
                Ok(()) => {
                    state.loc += slot;
                    return Ok(());
                }
                Err(err) => {
                    // A single defective write block should not fail the
                    // whole log; retry one block further.
                    debug!(offset = off, error = %err, "record write failed, skipping one write block");
                    state.loc += write_size;
                    if self.sector_size - framed < state.loc {
                        return Err(StoreError::NoSpace);
                    }
                }
            }
        }
    }

    fn do_advance(&self, state: &mut StoreState) -> StoreResult<()> {
        if self.area.props().is_full_overwrite() {
            // Make the old head unambiguous on the next scan.
            self.fill_sector(state)?;
        }

        state.sector += 1;
        if state.sector == self.sector_count {
            state.sector = 0;
            state.wrapcnt = state.wrapcnt.wrapping_add(1);
        }
        state.loc = 0;

        let props = self.area.props();
        if !props.is_full_overwrite() && !props.is_auto_erase() {
            self.erase_entered_block(state)?;
        }

        self.write_cookie(state)
    }

    fn fill_sector(&self, state: &mut StoreState) -> StoreResult<()> {
        let buflen = MIN_BUF_SIZE.max(self.area.write_size());
        let buf = vec![FILL_VALUE; buflen];
        let off = self.sector_off(state.sector);

        while state.loc < self.sector_size {
            let n = buflen.min(self.sector_size - state.loc);
            self.area.write(off + state.loc as u64, &buf[..n])?;
            state.loc += n;
        }

        Ok(())
    }

    fn erase_entered_block(&self, state: &StoreState) -> StoreResult<()> {
        let erase_size = self.area.erase_size();

        if (state.sector * self.sector_size) % erase_size != 0 {
            return Ok(());
        }

        let block = state.sector * self.sector_size / erase_size;
        let count = (self.sector_size / erase_size).max(1);
        self.area.erase(block, count)?;
        Ok(())
    }

    fn write_cookie(&self, state: &mut StoreState) -> StoreResult<()> {
        let Some(cookie) = &self.cookie else {
            return Ok(());
        };

        if state.loc != 0 || cookie.is_empty() {
            return Ok(());
        }

        let aligned = align_up(cookie.len(), self.area.write_size());
        let fill = vec![FILL_VALUE; aligned - cookie.len()];
        self.area
            .writev(self.sector_off(state.sector), &[cookie.as_slice(), &fill])?;
        state.loc = aligned;
        Ok(())
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("area", &self.area)
            .field("sector_size", &self.sector_size)
            .field("sector_count", &self.sector_count)
            .field("spare_sectors", &self.spare_sectors)
            .field("crc_skip", &self.crc_skip)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
