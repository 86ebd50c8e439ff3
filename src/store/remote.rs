use std::convert::TryInto;

use crate::error::{Result, StoreError};
use crate::model::{Dir, Pid, Vid};
use crate::store::key::{Key, SlotRecord, SLOT_BYTES};
use crate::store::{Edges, GraphStore};

impl GraphStore {
    /// Fetches the adjacency list of `(vid, dir, pid)` from server `dst`
    /// with two one-sided reads: the bucket-chain walk, then the value.
    /// The list is returned as an owned copy out of thread `tid`'s scratch
    /// buffer.
    pub(crate) fn get_edges_remote(
        &self,
        tid: usize,
        dst: usize,
        vid: Vid,
        dir: Dir,
        pid: Pid,
    ) -> Result<Edges<'_>> {
        let key = Key::new(vid, dir, pid);
        let Some(rec) = self.fetch_record(tid, dst, key)? else {
            return Ok(Edges::empty());
        };
        if rec.ptr.size() == 0 {
            return Ok(Edges::empty());
        }

        let len_bytes = rec.ptr.size() as usize * 8;
        let mut scratch = self.scratch_for(tid).lock();
        scratch.resize(len_bytes, 0);
        self.transport.read(
            tid,
            dst,
            &mut scratch[..len_bytes],
            self.geo.entry_byte_off(rec.ptr.off()),
        )?;

        let values = scratch[..len_bytes]
            .chunks_exact(8)
            .map(|chunk| u64::from_le_bytes(chunk.try_into().expect("chunk has exactly 8 bytes")))
            .collect();
        Ok(Edges::owned(values))
    }

    /// Walks the remote bucket chain for `key`, one bucket per read,
    /// memoizing the record on a hit. `None` means the key does not exist
    /// on `dst`.
    fn fetch_record(&self, tid: usize, dst: usize, key: Key) -> Result<Option<SlotRecord>> {
        if let Some(rec) = self.cache.lookup(key) {
            return Ok(Some(rec));
        }

        let assoc = self.geo.associativity as usize;
        let bucket_bytes = assoc * SLOT_BYTES;
        let mut scratch = self.scratch_for(tid).lock();
        scratch.resize(bucket_bytes, 0);

        let primary = key.hash() % self.geo.num_buckets;
        let mut bucket = primary;
        let mut hops = 0u64;
        loop {
            if hops > self.geo.num_buckets_ext {
                return Err(StoreError::Corruption(format!(
                    "remote bucket chain from {} on server {} does not terminate",
                    primary, dst
                )));
            }
            hops += 1;

            self.transport.read(
                tid,
                dst,
                &mut scratch[..bucket_bytes],
                self.geo.bucket_byte_off(bucket),
            )?;

            for slot in 0..assoc - 1 {
                let rec = SlotRecord::decode(&scratch[slot * SLOT_BYTES..])?;
                if rec.key == key {
                    self.cache.insert(rec);
                    return Ok(Some(rec));
                }
            }

            let chain = SlotRecord::decode(&scratch[(assoc - 1) * SLOT_BYTES..])?;
            if chain.key.is_empty() {
                return Ok(None);
            }
            bucket = chain.key.vid();
        }
    }

    /// # Panics
    ///
    /// Panics when `tid` exceeds the configured thread budget.
    fn scratch_for(&self, tid: usize) -> &parking_lot::Mutex<Vec<u8>> {
        assert!(
            tid < self.scratch.len(),
            "tid {} outside the {} scratch buffers",
            tid,
            self.scratch.len()
        );
        &self.scratch[tid]
    }
}
