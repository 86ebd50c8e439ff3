use serde::Serialize;
use tracing::info;

use crate::model::{Dir, TYPE_ID};
use crate::store::{GraphStore, EDGE_BYTES, SLOT_BYTES};

/// Occupancy and memory-usage report for one store replica.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub main: MainSection,
    pub indirect: IndirectSection,
    pub entries: EntrySection,
    /// Total vertices on this partition (versatile builds only).
    pub vertices: Option<u64>,
    /// Total predicates on this partition (versatile builds only).
    pub predicates: Option<u64>,
}

/// The primary bucket region.
#[derive(Debug, Clone, Serialize)]
pub struct MainSection {
    pub bytes: u64,
    pub slots: u64,
    pub used_slots: u64,
    pub used_pct: f64,
    /// Slots reserved as chain links, one per bucket.
    pub chain_slots: u64,
}

/// The overflow bucket region.
#[derive(Debug, Clone, Serialize)]
pub struct IndirectSection {
    pub bytes: u64,
    pub slots: u64,
    pub used_slots: u64,
    pub used_pct: f64,
    pub allocated_buckets: u64,
    pub allocated_pct: f64,
}

/// The entry arena.
#[derive(Debug, Clone, Serialize)]
pub struct EntrySection {
    pub bytes: u64,
    pub entries: u64,
    pub used_entries: u64,
    pub used_pct: f64,
}

fn pct(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * used as f64 / total as f64
    }
}

impl GraphStore {
    /// Collects the occupancy report. Walks the whole slot array, so this
    /// is a diagnostic, not a hot-path call.
    pub fn stats(&self) -> StoreStats {
        let geo = self.geometry();
        let assoc = geo.associativity;

        let main_slots = geo.num_buckets * assoc;
        let main_used = self.table.used_data_slots(0, geo.num_buckets);
        let ext_slots = geo.num_buckets_ext * assoc;
        let ext_used = self
            .table
            .used_data_slots(geo.num_buckets, geo.total_buckets());
        let allocated = self.table.allocated_ext();
        let used_entries = self.arena.used();

        let (vertices, predicates) = if self.options().versatile {
            (
                Some(self.get_index_edges_local(TYPE_ID, Dir::In).len() as u64),
                Some(self.get_index_edges_local(TYPE_ID, Dir::Out).len() as u64),
            )
        } else {
            (None, None)
        };

        StoreStats {
            main: MainSection {
                bytes: main_slots * SLOT_BYTES as u64,
                slots: main_slots,
                used_slots: main_used,
                used_pct: pct(main_used, main_slots),
                chain_slots: geo.num_buckets,
            },
            indirect: IndirectSection {
                bytes: ext_slots * SLOT_BYTES as u64,
                slots: ext_slots,
                used_slots: ext_used,
                used_pct: pct(ext_used, ext_slots),
                allocated_buckets: allocated,
                allocated_pct: pct(allocated, geo.num_buckets_ext),
            },
            entries: EntrySection {
                bytes: geo.num_entries * EDGE_BYTES as u64,
                entries: geo.num_entries,
                used_entries,
                used_pct: pct(used_entries, geo.num_entries),
            },
            vertices,
            predicates,
        }
    }

    /// Emits the occupancy report to the tracing infrastructure.
    pub fn log_stats(&self) {
        let stats = self.stats();
        info!(
            target: "tripod::stats",
            main_used_pct = stats.main.used_pct,
            main_slots = stats.main.slots,
            indirect_used_pct = stats.indirect.used_pct,
            indirect_allocated_buckets = stats.indirect.allocated_buckets,
            entry_used_pct = stats.entries.used_pct,
            entry_count = stats.entries.entries,
            vertices = stats.vertices,
            predicates = stats.predicates,
            "store occupancy snapshot"
        );
    }
}
