use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;

use crate::error::{Result, StoreError};

/// The contiguous memory region shared between the slot array and the entry
/// arena, and exposed byte-for-byte to remote readers.
///
/// The region is an array of 64-bit words. Build-phase writers are serialized
/// per bucket chain by the table's stripe locks and per counter by the
/// allocator locks, so plain relaxed operations suffice; after the build
/// joins its threads the table is immutable and readers need no ordering at
/// all. Remote reads observe exactly the little-endian serialization of
/// these words, which is what makes the local and remote lookup paths
/// interchangeable.
pub struct Region {
    words: Box<[AtomicU64]>,
}

impl Region {
    /// Allocates a zeroed region of (at most) `bytes` bytes, rounded down to
    /// whole words.
    pub fn new(bytes: usize) -> Self {
        let words = bytes / 8;
        Self {
            words: (0..words).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.words.len() * 8
    }

    /// Resets every word to the empty sentinel. The region handed over by a
    /// transport may be recycled, so construction always clears it.
    pub fn clear(&self) {
        self.words
            .par_iter()
            .for_each(|word| word.store(0, Ordering::Relaxed));
    }

    /// # Panics
    ///
    /// Panics when `idx` is outside the region.
    pub(crate) fn load(&self, idx: u64) -> u64 {
        self.words[idx as usize].load(Ordering::Relaxed)
    }

    /// # Panics
    ///
    /// Panics when `idx` is outside the region.
    pub(crate) fn store(&self, idx: u64, value: u64) {
        self.words[idx as usize].store(value, Ordering::Relaxed);
    }

    /// A view over `len` words starting at `idx`.
    ///
    /// # Panics
    ///
    /// Panics when the range falls outside the region.
    pub(crate) fn view(&self, idx: u64, len: u64) -> &[AtomicU64] {
        let start = idx as usize;
        let end = start
            .checked_add(len as usize)
            .unwrap_or_else(|| panic!("word range overflow at {}+{}", idx, len));
        &self.words[start..end]
    }

    /// Serves a one-sided read against this region: copies `dst.len()` bytes
    /// starting at byte `src_off` into `dst`. Offsets and lengths must be
    /// word-aligned, mirroring how slots and entries are addressed.
    pub fn read_bytes(&self, src_off: u64, dst: &mut [u8]) -> Result<()> {
        if src_off % 8 != 0 || dst.len() % 8 != 0 {
            return Err(StoreError::Transport(format!(
                "unaligned read: {} bytes at offset {}",
                dst.len(),
                src_off
            )));
        }
        let first = (src_off / 8) as usize;
        let words = dst.len() / 8;
        let end = first.checked_add(words).filter(|&e| e <= self.words.len());
        let Some(end) = end else {
            return Err(StoreError::Transport(format!(
                "read of {} bytes at offset {} beyond region of {} bytes",
                dst.len(),
                src_off,
                self.size_bytes()
            )));
        };
        for (chunk, word) in dst.chunks_exact_mut(8).zip(&self.words[first..end]) {
            chunk.copy_from_slice(&word.load(Ordering::Relaxed).to_le_bytes());
        }
        Ok(())
    }
}
