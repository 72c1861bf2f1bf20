//! Compaction and interrupted-compact recovery.

use super::{CompactHooks, Head, Record, Store, StoreState};
use crate::error::{StoreError, StoreResult};
use crate::record::{slot_size, MIN_BUF_SIZE};
use tracing::debug;

impl Store {
    /// Advances and, when the new head enters an erase block, moves the
    /// records the hooks want kept out of the sectors that follow the
    /// spare window.
    pub(super) fn do_compact(
        &self,
        state: &mut StoreState,
        hooks: Option<&CompactHooks>,
    ) -> StoreResult<()> {
        self.do_advance(state)?;

        let Some(hooks) = hooks else {
            return Ok(());
        };

        let erase_size = self.area.erase_size();
        if (state.sector * self.sector_size) % erase_size != 0 {
            return Ok(());
        }

        let mut walk = Record {
            sector: self.advance_sector(state.sector, self.spare_sectors),
            loc: 0,
            size: 0,
        };

        for _ in 0..(erase_size / self.sector_size).max(1) {
            walk.loc = 0;
            walk.size = 0;

            while self
                .next_in_sector(Head::of(state), &mut walk, true, true)
                .is_ok()
            {
                loop {
                    match self.move_record(state, hooks, &walk) {
                        Ok(()) => break,
                        // The destination sector filled up mid-move;
                        // cascade another advance and retry.
                        Err(StoreError::NoSpace) => self.do_advance(state)?,
                        Err(err) => return Err(err),
                    }
                }
            }

            walk.sector = self.advance_sector(walk.sector, 1);
        }

        Ok(())
    }

    /// Copies one record to the write head if the hooks keep it, patching
    /// the wrap byte to the current counter. The crc does not cover the
    /// header, so the patched copy stays valid.
    fn move_record(
        &self,
        state: &mut StoreState,
        hooks: &CompactHooks,
        record: &Record,
    ) -> StoreResult<()> {
        if !(hooks.keep)(self, record) || !self.record_valid(record) {
            return Ok(());
        }

        let slot = slot_size(record.size, self.area.write_size());
        if self.sector_size - slot < state.loc {
            return Err(StoreError::NoSpace);
        }

        let dest = Record {
            sector: state.sector,
            loc: state.loc,
            size: record.size,
        };
        let rdoff = self.sector_off(record.sector) + record.loc as u64;
        let wroff = self.sector_off(state.sector) + state.loc as u64;

        let buflen = MIN_BUF_SIZE.max(self.area.write_size());
        let mut buf = vec![0u8; buflen];
        let mut start = 0usize;

        while start < slot {
            let n = buflen.min(slot - start);
            self.area.read(rdoff + start as u64, &mut buf[..n])?;

            if start == 0 {
                buf[1] = state.wrapcnt;
            }

            self.area.write(wroff + start as u64, &buf[..n])?;
            state.loc += n;
            start += n;
        }

        if let Some(moved) = &hooks.moved {
            moved(self, record, &dest);
        }

        Ok(())
    }

    fn reverse_head(&self, state: &mut StoreState) {
        if state.sector == 0 {
            state.sector = self.sector_count;
        }
        state.sector -= 1;
        state.loc = self.sector_size;
        if state.sector == self.sector_count - 1 {
            state.wrapcnt = state.wrapcnt.wrapping_sub(1);
        }
    }

    /// Detects a compact interrupted by power loss and repeats it.
    ///
    /// Counts the records a compact would still move out of the sectors
    /// past the spare window (`pending`) and the copies already present
    /// in the erase block holding the scanned head (`moved`). Whenever
    /// anything is pending, the head is backed up to the start of its
    /// erase block, one sector further, and the compact is run again:
    /// either the interrupted move is completed, or a finished copy is
    /// redone so the source block can be released.
    pub(super) fn recovery(
        &self,
        state: &mut StoreState,
        hooks: &CompactHooks,
    ) -> StoreResult<()> {
        let erase_size = self.area.erase_size();
        let sectors_per_block = (erase_size / self.sector_size).max(1);
        let saved = (state.sector, state.loc, state.wrapcnt);

        // Back the head up to the start of its erase block, one sector
        // further, counting the sectors stepped over.
        let mut rscnt = 0usize;
        while (state.sector * self.sector_size) % erase_size != 0 {
            self.reverse_head(state);
            rscnt += 1;
        }
        self.reverse_head(state);
        rscnt += 1;

        let mut pending = 0usize;
        let mut walk = Record {
            sector: self.advance_sector(state.sector, self.spare_sectors + 1),
            loc: 0,
            size: 0,
        };
        for _ in 0..sectors_per_block {
            walk.loc = 0;
            walk.size = 0;
            while self
                .next_in_sector(Head::of(state), &mut walk, true, true)
                .is_ok()
            {
                if (hooks.keep)(self, &walk) {
                    pending += 1;
                }
            }
            walk.sector = self.advance_sector(walk.sector, 1);
        }

        state.sector = saved.0;
        state.loc = saved.1;
        state.wrapcnt = saved.2;

        if pending == 0 {
            return Ok(());
        }

        // Count the copies already written into the erase block holding
        // the head; walk strictly, debris ends the count.
        let mut moved = 0usize;
        walk.sector = state.sector;
        while (walk.sector * self.sector_size) % erase_size != 0 {
            walk.sector = self.reverse_sector(walk.sector, 1);
        }
        for _ in 0..rscnt {
            walk.loc = 0;
            walk.size = 0;
            while self
                .next_in_sector(Head::of(state), &mut walk, true, false)
                .is_ok()
            {
                moved += 1;
            }
            walk.sector = self.advance_sector(walk.sector, 1);
        }

        if moved >= pending {
            debug!(moved, pending, "compact copy complete, repeating to release the source block");
        } else {
            debug!(moved, pending, "compact interrupted, repeating the move");
        }

        while (state.sector * self.sector_size) % erase_size != 0 {
            self.reverse_head(state);
        }
        self.reverse_head(state);

        self.do_compact(state, Some(hooks))
    }
}
