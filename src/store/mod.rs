//! The partitioned graph key-value store.
//!
//! One store instance runs on every server and is authoritative for the
//! vertices that hash to it. The memory region it manages is split into a
//! slot array (a cluster-chained hash table) and an entry arena (adjacency
//! lists); the same byte layout serves in-process lookups and one-sided
//! remote reads.
//!
//! The logical dictionary, with `vid = 0` marking index entries:
//!
//! | key | value |
//! |---|---|
//! | `(vid, OUT, pid)` | objects reachable from `vid` under `pid` |
//! | `(vid, IN, pid)` | subjects pointing at `vid` under `pid` |
//! | `(vid, OUT, TYPE_ID)` | types of `vid` |
//! | `(vid, OUT/IN, PREDICATE_ID)` | predicates incident to `vid` (versatile) |
//! | `(0, OUT, pid)` | subjects using `pid` |
//! | `(0, IN, pid)` | objects using `pid` |
//! | `(0, IN, tid)` | members of type `tid` |
//! | `(0, IN, TYPE_ID)` | all vertices (versatile) |
//! | `(0, OUT, TYPE_ID)` | all predicates (versatile) |
//!
//! A build runs [`GraphStore::insert_normal`] on every server, then
//! [`GraphStore::insert_index`]; afterwards the store is immutable and
//! serves lock-free reads until the process exits.

mod arena;
mod cache;
mod key;
mod loader;
mod region;
mod remote;
mod stats;
mod table;
mod verify;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{Geometry, StoreOptions};
use crate::error::Result;
use crate::model::{owner_of, Dir, Pid, Vid};
use crate::transport::{Loopback, RemoteReader};

use arena::EntryArena;
use cache::VertexCache;
use table::BucketTable;

pub use key::{EntryPtr, Key, SlotRecord, EDGE_BYTES, SLOT_BYTES};
pub use region::Region;
pub use stats::{EntrySection, IndirectSection, MainSection, StoreStats};
pub use verify::{VerifyCounts, VerifyFinding, VerifyLevel, VerifyReport, VerifySeverity};

/// An adjacency list returned by a lookup.
///
/// Local lookups borrow the entry arena directly; remote lookups carry the
/// list copied out of the one-sided read. A missing key is an empty list,
/// never an error.
pub struct Edges<'a> {
    repr: Repr<'a>,
}

enum Repr<'a> {
    View(&'a [AtomicU64]),
    Owned(Vec<u64>),
}

impl<'a> Edges<'a> {
    pub(crate) fn view(words: &'a [AtomicU64]) -> Self {
        Self {
            repr: Repr::View(words),
        }
    }

    pub(crate) fn owned(values: Vec<u64>) -> Self {
        Self {
            repr: Repr::Owned(values),
        }
    }

    pub(crate) fn empty() -> Self {
        Self::owned(Vec::new())
    }

    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::View(words) => words.len(),
            Repr::Owned(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, idx: usize) -> Option<u64> {
        match &self.repr {
            Repr::View(words) => words.get(idx).map(|w| w.load(Ordering::Relaxed)),
            Repr::Owned(values) => values.get(idx).copied(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.len()).filter_map(move |idx| self.get(idx))
    }

    pub fn to_vec(&self) -> Vec<u64> {
        self.iter().collect()
    }
}

impl fmt::Debug for Edges<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// One replica of the partitioned graph store.
///
/// All methods take `&self`; the build phases are internally synchronized
/// and may be driven by many loader threads, and the read phase is
/// lock-free. The two phases must not overlap: callers join every loader
/// thread before the first read.
pub struct GraphStore {
    opts: StoreOptions,
    geo: Geometry,
    region: Arc<Region>,
    table: BucketTable,
    arena: EntryArena,
    cache: VertexCache,
    transport: Arc<dyn RemoteReader>,
    scratch: Box<[Mutex<Vec<u8>>]>,
}

impl GraphStore {
    /// Opens a store over a transport-registered region. The region is
    /// cleared; all replicas must share the geometry-determining options.
    pub fn new(
        opts: StoreOptions,
        region: Arc<Region>,
        transport: Arc<dyn RemoteReader>,
    ) -> Result<Self> {
        let geo = Geometry::resolve(&opts, region.size_bytes())?;
        region.clear();

        let table = BucketTable::new(Arc::clone(&region), geo, opts.num_locks);
        let arena = EntryArena::new(Arc::clone(&region), geo);
        let cache = VertexCache::new(opts.cache_capacity, opts.enable_caching);
        let scratch = (0..opts.num_threads)
            .map(|_| Mutex::new(Vec::new()))
            .collect();

        Ok(Self {
            opts,
            geo,
            region,
            table,
            arena,
            cache,
            transport,
            scratch,
        })
    }

    /// Opens a single-server store with a private region and loopback
    /// transport.
    pub fn standalone(opts: StoreOptions) -> Result<Self> {
        let region = Arc::new(Region::new(opts.memstore_bytes));
        let transport = Arc::new(Loopback::new(vec![Arc::clone(&region)]));
        Self::new(opts, region, transport)
    }

    pub fn options(&self) -> &StoreOptions {
        &self.opts
    }

    pub fn geometry(&self) -> Geometry {
        self.geo
    }

    pub fn sid(&self) -> usize {
        self.opts.sid
    }

    /// The backing region, as registered with the transport.
    pub fn region(&self) -> &Arc<Region> {
        &self.region
    }

    /// The adjacency list of `(vid, dir, pid)` from the local table.
    ///
    /// Zero-copy and non-blocking; only legal once the build phases are
    /// done.
    pub fn get_edges_local(&self, vid: Vid, dir: Dir, pid: Pid) -> Edges<'_> {
        match self.table.lookup(Key::new(vid, dir, pid)) {
            Some(rec) if rec.ptr.size() > 0 => {
                Edges::view(self.arena.view(rec.ptr.off(), rec.ptr.size()))
            }
            _ => Edges::empty(),
        }
    }

    /// An index list: `(0, dir, pid)`. Index keys live on the server that
    /// built them, so there is no remote flavor of this call.
    pub fn get_index_edges_local(&self, pid: Pid, dir: Dir) -> Edges<'_> {
        self.get_edges_local(0, dir, pid)
    }

    /// The adjacency list of `(vid, dir, pid)`, wherever it lives. Routes to
    /// the local table when this server owns `vid`, otherwise walks the
    /// owner's buckets through the transport on behalf of thread `tid`.
    pub fn get_edges_global(&self, tid: usize, vid: Vid, dir: Dir, pid: Pid) -> Result<Edges<'_>> {
        let dst = owner_of(vid, self.opts.num_servers);
        if dst == self.opts.sid {
            Ok(self.get_edges_local(vid, dir, pid))
        } else {
            self.get_edges_remote(tid, dst, vid, dir, pid)
        }
    }
}
