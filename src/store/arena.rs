use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Geometry;
use crate::store::region::Region;

/// Bump allocator over the entry half of the memory region.
///
/// Adjacency lists are written once into ranges reserved here and never
/// freed; `last_entry` only ever grows. Callers write disjoint ranges, so
/// the only shared state is the cursor itself.
pub(crate) struct EntryArena {
    region: Arc<Region>,
    geo: Geometry,
    last_entry: Mutex<u64>,
}

impl EntryArena {
    pub(crate) fn new(region: Arc<Region>, geo: Geometry) -> Self {
        Self {
            region,
            geo,
            last_entry: Mutex::new(0),
        }
    }

    /// Reserves a contiguous range of `n` entries and returns its first
    /// offset.
    ///
    /// # Panics
    ///
    /// Panics when the arena cannot hold the range; an undersized region
    /// must fail loud rather than truncate data.
    pub(crate) fn reserve(&self, n: u64) -> u64 {
        let mut last = self.last_entry.lock();
        let off = *last;
        *last += n;
        assert!(
            *last < self.geo.num_entries,
            "entry arena exhausted: {} of {} entries",
            *last,
            self.geo.num_entries
        );
        off
    }

    /// Writes one entry at `off`.
    pub(crate) fn write(&self, off: u64, value: u64) {
        self.region.store(self.geo.entry_word(off), value);
    }

    /// A view over the `len` entries starting at `off`.
    pub(crate) fn view(&self, off: u64, len: u64) -> &[AtomicU64] {
        self.region.view(self.geo.entry_word(off), len)
    }

    /// Entries allocated so far.
    pub(crate) fn used(&self) -> u64 {
        *self.last_entry.lock()
    }
}
