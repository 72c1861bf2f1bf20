//! Record location and iteration.

use super::{Head, Record, Store};
use crate::error::{StoreError, StoreResult};
use crate::record::{
    align_up, framed_len, Crc32, CRC_SIZE, HEADER_SIZE, MIN_BUF_SIZE, RECORD_MAGIC,
};
use tracing::debug;

impl Store {
    /// Finds the next readable record in `record.sector`, starting from
    /// the record handle's current position (a zeroed handle starts at
    /// the sector begin, behind the cookie).
    ///
    /// With `wrapcheck` the candidate's wrap byte must match the wrap the
    /// sector logically carries relative to `head`. With `recover`, a
    /// failed candidate resynchronizes one write block further instead of
    /// ending the walk, stepping over partial-write debris.
    ///
    /// Returns [`StoreError::NotFound`] at the write head or the end of
    /// the sector.
    pub(super) fn next_in_sector(
        &self,
        head: Head,
        record: &mut Record,
        wrapcheck: bool,
        recover: bool,
    ) -> StoreResult<()> {
        let write_size = self.area.write_size();
        let off = self.sector_off(record.sector);

        if record.loc == 0 {
            if let Some(cookie) = &self.cookie {
                if !cookie.is_empty() {
                    record.loc = align_up(cookie.len(), write_size);
                }
            }
        }

        loop {
            let mut candidate = record.loc;
            if record.size != 0 {
                candidate = align_up(candidate + framed_len(record.size), write_size);
            }

            if (head.sector == record.sector && head.loc <= candidate)
                || candidate + HEADER_SIZE > self.sector_size
            {
                record.loc = candidate.min(self.sector_size);
                record.size = 0;
                return Err(StoreError::NotFound);
            }

            let mut header = [0u8; HEADER_SIZE];
            self.area.read(off + candidate as u64, &mut header)?;

            let size = u16::from_le_bytes([header[2], header[3]]) as usize;
            let size_ok = size > 0 && framed_len(size) < self.sector_size - candidate;

            // The wrap a record in this sector must carry: one behind the
            // head's for sectors physically ahead of the head.
            let mut wrap = header[1];
            if record.sector > head.sector {
                wrap = wrap.wrapping_add(1);
            }
            let wrap_ok = !wrapcheck || wrap == head.wrapcnt;

            if header[0] == RECORD_MAGIC && wrap_ok && size_ok {
                let probe = Record {
                    sector: record.sector,
                    loc: candidate,
                    size,
                };
                if self.record_crc_ok(&probe) {
                    *record = probe;
                    return Ok(());
                }
            }

            if !recover {
                return Err(StoreError::NotFound);
            }

            record.loc = candidate + write_size;
            record.size = 0;
        }
    }

    /// Streams the record's crc-covered data through a bounded buffer and
    /// compares against the stored trailer.
    pub(super) fn record_crc_ok(&self, record: &Record) -> bool {
        let buflen = MIN_BUF_SIZE.max(self.area.write_size());
        let mut buf = vec![0u8; buflen];
        let base = self.sector_off(record.sector) + (record.loc + HEADER_SIZE) as u64;

        let mut crc = Crc32::new();
        let mut pos = self.crc_skip.min(record.size);

        while pos < record.size {
            let n = buflen.min(record.size - pos);
            if self.area.read(base + pos as u64, &mut buf[..n]).is_err() {
                debug!(offset = base + pos as u64, "record data read failed");
                return false;
            }
            crc.update(&buf[..n]);
            pos += n;
        }

        let mut stored = [0u8; CRC_SIZE];
        if self
            .area
            .read(base + record.size as u64, &mut stored)
            .is_err()
        {
            debug!(offset = base + record.size as u64, "record crc read failed");
            return false;
        }

        crc.finalize() == u32::from_le_bytes(stored)
    }
}

/// Iterator over the readable records of a store, oldest first.
///
/// Created by [`Store::records`]. The iteration window starts one past
/// the spare sectors ahead of the write head observed at creation and
/// ends at that head; records from the previous wrap still physically
/// ahead of the head come first.
pub struct RecordIter<'a> {
    store: &'a Store,
    head: Head,
    record: Record,
    started: bool,
    done: bool,
}

impl<'a> RecordIter<'a> {
    pub(super) fn new(store: &'a Store, head: Head) -> Self {
        Self {
            store,
            head,
            record: Record {
                sector: 0,
                loc: 0,
                size: 0,
            },
            started: false,
            done: false,
        }
    }
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = StoreResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if !self.started {
            self.started = true;
            self.record = Record {
                sector: self
                    .store
                    .advance_sector(self.head.sector, self.store.spare_sectors + 1),
                loc: 0,
                size: 0,
            };
        }

        loop {
            match self
                .store
                .next_in_sector(self.head, &mut self.record, true, true)
            {
                Ok(()) => return Some(Ok(self.record)),
                Err(StoreError::NotFound) => {
                    if self.record.sector == self.head.sector {
                        self.done = true;
                        return None;
                    }
                    self.record = Record {
                        sector: self.store.advance_sector(self.record.sector, 1),
                        loc: 0,
                        size: 0,
                    };
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

impl std::fmt::Debug for RecordIter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordIter")
            .field("record", &self.record)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
