use std::convert::TryInto;
use std::fmt;

use crate::error::{Result, StoreError};
use crate::model::{Dir, Pid, Vid};

/// Size of one hash-table slot: a key word and a pointer word.
pub const SLOT_BYTES: usize = 16;
/// Size of one entry-arena element.
pub const EDGE_BYTES: usize = 8;

const NBITS_DIR: u32 = 1;
const NBITS_PID: u32 = 17;
const NBITS_VID: u32 = 64 - NBITS_PID - NBITS_DIR;

const PID_SHIFT: u32 = NBITS_DIR;
const VID_SHIFT: u32 = NBITS_DIR + NBITS_PID;

/// Largest vertex id a packed key can carry.
pub const MAX_VID: u64 = (1 << NBITS_VID) - 1;
/// Largest predicate/type id a packed key can carry.
pub const MAX_PID: u64 = (1 << NBITS_PID) - 1;

const NBITS_OFF: u32 = 40;
const NBITS_SIZE: u32 = 24;

/// Largest entry-arena offset a pointer word can carry.
pub const MAX_OFF: u64 = (1 << NBITS_OFF) - 1;
/// Longest adjacency list a pointer word can describe.
pub const MAX_SIZE: u64 = (1 << NBITS_SIZE) - 1;

/// A 64-bit packed lookup key: vertex id, predicate id and direction.
///
/// The all-zero word doubles as the empty-slot sentinel, and a key stored in
/// a bucket's chain slot carries the next bucket id in its `vid` field.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct Key(u64);

impl Key {
    pub const EMPTY: Key = Key(0);

    /// Packs `(vid, dir, pid)` into a key.
    ///
    /// # Panics
    ///
    /// Panics when `vid` or `pid` does not fit its bit budget.
    pub fn new(vid: Vid, dir: Dir, pid: Pid) -> Self {
        assert!(vid <= MAX_VID, "vid {} exceeds {} bits", vid, NBITS_VID);
        assert!(pid <= MAX_PID, "pid {} exceeds {} bits", pid, NBITS_PID);
        Key((vid << VID_SHIFT) | (pid << PID_SHIFT) | dir.into_u64())
    }

    /// A chain-slot key linking to overflow bucket `bucket`.
    pub(crate) fn link(bucket: u64) -> Self {
        assert!(bucket <= MAX_VID, "bucket id {} exceeds vid field", bucket);
        Key(bucket << VID_SHIFT)
    }

    pub(crate) fn from_packed(word: u64) -> Self {
        Key(word)
    }

    pub(crate) fn packed(self) -> u64 {
        self.0
    }

    pub fn vid(self) -> Vid {
        self.0 >> VID_SHIFT
    }

    pub fn pid(self) -> Pid {
        (self.0 >> PID_SHIFT) & MAX_PID
    }

    pub fn dir(self) -> Dir {
        Dir::from_u64(self.0 & 1).expect("one-bit direction is always valid")
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Stable avalanche hash of the packed word (murmur3 finalizer). Every
    /// replica derives bucket placement from this, so it must never change
    /// across versions that share a cluster.
    pub fn hash(self) -> u64 {
        let mut h = self.0;
        h ^= h >> 33;
        h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
        h ^= h >> 33;
        h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
        h ^= h >> 33;
        h
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("Key(empty)");
        }
        f.debug_struct("Key")
            .field("vid", &self.vid())
            .field("pid", &self.pid())
            .field("dir", &self.dir())
            .finish()
    }
}

/// A pointer word locating an adjacency list in the entry arena: offset in
/// the low 40 bits, list length in the high 24.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EntryPtr(u64);

impl EntryPtr {
    pub const NULL: EntryPtr = EntryPtr(0);

    /// # Panics
    ///
    /// Panics when `size` or `off` does not fit its bit budget.
    pub fn new(size: u64, off: u64) -> Self {
        assert!(size <= MAX_SIZE, "list length {} exceeds {} bits", size, NBITS_SIZE);
        assert!(off <= MAX_OFF, "entry offset {} exceeds {} bits", off, NBITS_OFF);
        EntryPtr((size << NBITS_OFF) | off)
    }

    pub(crate) fn from_raw(word: u64) -> Self {
        EntryPtr(word)
    }

    pub(crate) fn raw(self) -> u64 {
        self.0
    }

    pub fn size(self) -> u64 {
        self.0 >> NBITS_OFF
    }

    pub fn off(self) -> u64 {
        self.0 & MAX_OFF
    }
}

/// One decoded hash-table slot: the key and where its value lives.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SlotRecord {
    pub key: Key,
    pub ptr: EntryPtr,
}

impl SlotRecord {
    pub(crate) const VACANT: SlotRecord = SlotRecord {
        key: Key::EMPTY,
        ptr: EntryPtr::NULL,
    };

    /// Decodes a slot from its on-wire form: two little-endian words.
    pub(crate) fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SLOT_BYTES {
            return Err(StoreError::Corruption(format!(
                "slot record truncated: {} bytes",
                bytes.len()
            )));
        }
        let key = u64::from_le_bytes(bytes[..8].try_into().expect("slice has exactly 8 bytes"));
        let ptr = u64::from_le_bytes(bytes[8..16].try_into().expect("slice has exactly 8 bytes"));
        Ok(SlotRecord {
            key: Key::from_packed(key),
            ptr: EntryPtr::from_raw(ptr),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn packs_and_unpacks_fields() {
        let key = Key::new(0x2_0000_0000, Dir::Out, 42);
        assert_eq!(key.vid(), 0x2_0000_0000);
        assert_eq!(key.pid(), 42);
        assert_eq!(key.dir(), Dir::Out);
        assert!(!key.is_empty());
    }

    #[test]
    fn zero_word_is_the_empty_sentinel() {
        assert!(Key::EMPTY.is_empty());
        assert!(!Key::new(0, Dir::Out, 1).is_empty());
        assert!(!Key::link(1).is_empty());
    }

    #[test]
    fn link_keys_carry_the_bucket_id() {
        let link = Key::link(987);
        assert_eq!(link.vid(), 987);
        assert_eq!(link.pid(), 0);
    }

    #[test]
    #[should_panic(expected = "exceeds")]
    fn oversized_vid_is_rejected() {
        let _ = Key::new(MAX_VID + 1, Dir::In, 0);
    }

    #[test]
    fn pointer_packs_and_unpacks() {
        let ptr = EntryPtr::new(3, 1 << 30);
        assert_eq!(ptr.size(), 3);
        assert_eq!(ptr.off(), 1 << 30);
        assert_eq!(EntryPtr::NULL.size(), 0);
    }

    #[test]
    fn slot_record_decodes_wire_words() {
        let key = Key::new(123_456, Dir::In, 9);
        let ptr = EntryPtr::new(7, 100);
        let mut bytes = [0u8; SLOT_BYTES];
        bytes[..8].copy_from_slice(&key.packed().to_le_bytes());
        bytes[8..].copy_from_slice(&ptr.raw().to_le_bytes());
        let rec = SlotRecord::decode(&bytes).unwrap();
        assert_eq!(rec.key, key);
        assert_eq!(rec.ptr, ptr);
        assert!(SlotRecord::decode(&bytes[..8]).is_err());
    }

    #[test]
    fn hash_mixes_neighboring_keys_apart() {
        let a = Key::new(1 << 20, Dir::Out, 2).hash();
        let b = Key::new((1 << 20) + 1, Dir::Out, 2).hash();
        let c = Key::new(1 << 20, Dir::In, 2).hash();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    proptest! {
        #[test]
        fn key_roundtrip_prop(vid in 0..=MAX_VID, pid in 0..=MAX_PID, out in any::<bool>()) {
            let dir = if out { Dir::Out } else { Dir::In };
            let key = Key::new(vid, dir, pid);
            prop_assert_eq!(key.vid(), vid);
            prop_assert_eq!(key.pid(), pid);
            prop_assert_eq!(key.dir(), dir);
            prop_assert_eq!(Key::from_packed(key.packed()), key);
        }

        #[test]
        fn ptr_roundtrip_prop(size in 0..=MAX_SIZE, off in 0..=MAX_OFF) {
            let ptr = EntryPtr::new(size, off);
            prop_assert_eq!(ptr.size(), size);
            prop_assert_eq!(ptr.off(), off);
            prop_assert_eq!(EntryPtr::from_raw(ptr.raw()), ptr);
        }
    }
}
