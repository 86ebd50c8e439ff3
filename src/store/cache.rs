use parking_lot::Mutex;

use crate::store::key::{Key, SlotRecord};

/// Direct-mapped memo of slot records seen by the remote lookup path.
///
/// One mutexed slot per index; insert overwrites whatever lives there, so
/// eviction is implicit. The table is immutable once serving starts, which
/// is why a cached record can never go stale. Both operations are no-ops
/// when caching is disabled.
pub(crate) struct VertexCache {
    slots: Box<[Mutex<SlotRecord>]>,
    enabled: bool,
}

impl VertexCache {
    pub(crate) fn new(capacity: usize, enabled: bool) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| Mutex::new(SlotRecord::VACANT)).collect(),
            enabled,
        }
    }

    fn slot_for(&self, key: Key) -> &Mutex<SlotRecord> {
        &self.slots[(key.hash() % self.slots.len() as u64) as usize]
    }

    pub(crate) fn lookup(&self, key: Key) -> Option<SlotRecord> {
        if !self.enabled {
            return None;
        }
        let guard = self.slot_for(key).lock();
        (guard.key == key).then_some(*guard)
    }

    pub(crate) fn insert(&self, record: SlotRecord) {
        if !self.enabled {
            return;
        }
        *self.slot_for(record.key).lock() = record;
    }
}
