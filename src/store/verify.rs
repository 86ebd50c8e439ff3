use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::model::{Dir, PREDICATE_ID, TYPE_ID};
use crate::store::GraphStore;

const MAX_FINDINGS: usize = 32;

/// Specifies the depth of integrity checks to perform.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyLevel {
    /// Counter and geometry validation without scanning the slot array.
    Fast,
    /// Full scan: chain structure, pointer ranges, duplicate keys and
    /// index coverage.
    Full,
}

/// Indicates the severity of a verification finding.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Informational message about the verification process.
    Info,
    /// Critical issue indicating corruption or an integrity failure.
    Error,
}

/// A single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    pub severity: VerifySeverity,
    pub message: String,
}

impl VerifyFinding {
    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: VerifySeverity::Error,
            message: message.into(),
        }
    }
}

/// Statistics collected while verifying.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    /// Occupied data slots across both bucket regions.
    pub keys_found: u64,
    /// Keys under vid 0, i.e. index entries.
    pub index_keys_found: u64,
    /// Adjacency entries referenced by some slot.
    pub adjacency_entries: u64,
    /// Overflow buckets reachable from a primary chain.
    pub chained_buckets: u64,
}

/// Complete report of one verification run.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    pub level: VerifyLevel,
    pub success: bool,
    pub findings: Vec<VerifyFinding>,
    pub counts: VerifyCounts,
}

fn push_error(findings: &mut Vec<VerifyFinding>, message: impl Into<String>) {
    if findings.len() < MAX_FINDINGS {
        findings.push(VerifyFinding::error(message));
    }
}

impl GraphStore {
    /// Validates the structural integrity of the built table.
    ///
    /// Intended for diagnostics after a load: it walks the slot array
    /// single-threaded and must not race with the build phases. A `Full`
    /// run confirms that every chain terminates inside the allocated
    /// indirect region, that no overflow bucket is claimed by two chains,
    /// that every pointer stays inside the allocated arena, that no key
    /// occurs twice, and that every normal key is covered by its
    /// predicate index.
    pub fn verify(&self, level: VerifyLevel) -> VerifyReport {
        let mut findings = Vec::new();
        let mut counts = VerifyCounts::default();

        let geo = self.geometry();
        let allocated_ext = self.table.allocated_ext();
        let used_entries = self.arena.used();

        if allocated_ext > geo.num_buckets_ext {
            push_error(
                &mut findings,
                format!(
                    "overflow allocator past capacity: {} of {}",
                    allocated_ext, geo.num_buckets_ext
                ),
            );
        }
        if used_entries > geo.num_entries {
            push_error(
                &mut findings,
                format!(
                    "entry allocator past capacity: {} of {}",
                    used_entries, geo.num_entries
                ),
            );
        }

        if matches!(level, VerifyLevel::Full) {
            self.verify_chains(&mut findings, &mut counts, allocated_ext);
            self.verify_slots(&mut findings, &mut counts, used_entries);
        }

        VerifyReport {
            level,
            success: findings.is_empty(),
            findings,
            counts,
        }
    }

    /// Follows every primary chain, confirming links stay inside the
    /// allocated indirect region and that no overflow bucket has two
    /// owners.
    fn verify_chains(
        &self,
        findings: &mut Vec<VerifyFinding>,
        counts: &mut VerifyCounts,
        allocated_ext: u64,
    ) {
        let geo = self.geometry();
        let mut owned: HashMap<u64, u64> = HashMap::new();

        for primary in 0..geo.num_buckets {
            let mut bucket = primary;
            let mut hops = 0u64;
            loop {
                if hops > geo.num_buckets_ext {
                    push_error(
                        findings,
                        format!("chain from bucket {} does not terminate", primary),
                    );
                    break;
                }
                hops += 1;

                let chain_slot = geo.bucket_first_slot(bucket) + geo.associativity - 1;
                let link = self.table.slot(chain_slot).key;
                if link.is_empty() {
                    break;
                }

                let next = link.vid();
                if next < geo.num_buckets || next >= geo.num_buckets + allocated_ext {
                    push_error(
                        findings,
                        format!(
                            "chain from bucket {} links to {} outside the allocated indirect region",
                            primary, next
                        ),
                    );
                    break;
                }
                if let Some(owner) = owned.insert(next, primary) {
                    push_error(
                        findings,
                        format!(
                            "overflow bucket {} claimed by chains {} and {}",
                            next, owner, primary
                        ),
                    );
                    break;
                }
                counts.chained_buckets += 1;
                bucket = next;
            }
        }
    }

    /// Scans every data slot: pointer ranges, duplicate keys and predicate
    /// index coverage.
    fn verify_slots(
        &self,
        findings: &mut Vec<VerifyFinding>,
        counts: &mut VerifyCounts,
        used_entries: u64,
    ) {
        let geo = self.geometry();
        let mut seen: HashSet<u64> = HashSet::new();
        let mut indexed: HashMap<(Dir, u64), HashSet<u64>> = HashMap::new();
        let mut normal: Vec<(Dir, u64, u64)> = Vec::new();
        let mut typed: Vec<(u64, u64, u64)> = Vec::new();

        for bucket in 0..geo.total_buckets() {
            let base = geo.bucket_first_slot(bucket);
            for slot in base..base + geo.associativity - 1 {
                let rec = self.table.slot(slot);
                if rec.key.is_empty() {
                    continue;
                }
                counts.keys_found += 1;
                counts.adjacency_entries += rec.ptr.size();

                if !seen.insert(rec.key.packed()) {
                    push_error(findings, format!("key {:?} stored twice", rec.key));
                }
                if rec.ptr.size() > 0 && rec.ptr.off() + rec.ptr.size() > used_entries {
                    push_error(
                        findings,
                        format!(
                            "key {:?} points past the allocated arena: {}+{} of {}",
                            rec.key,
                            rec.ptr.off(),
                            rec.ptr.size(),
                            used_entries
                        ),
                    );
                    continue;
                }

                let (vid, pid, dir) = (rec.key.vid(), rec.key.pid(), rec.key.dir());
                if vid == 0 {
                    counts.index_keys_found += 1;
                    indexed.insert((dir, pid), self.read_list(rec.ptr.off(), rec.ptr.size()));
                } else if pid == TYPE_ID && dir == Dir::Out {
                    typed.push((vid, rec.ptr.off(), rec.ptr.size()));
                } else if pid != PREDICATE_ID && pid != TYPE_ID {
                    normal.push((dir, pid, vid));
                }
            }
        }

        for (dir, pid, vid) in normal {
            let covered = indexed
                .get(&(dir, pid))
                .map(|members| members.contains(&vid))
                .unwrap_or(false);
            if !covered {
                push_error(
                    findings,
                    format!(
                        "vertex {} missing from the {:?} index of predicate {}",
                        vid, dir, pid
                    ),
                );
            }
        }

        for (vid, off, size) in typed {
            for tid in self.read_list(off, size) {
                let covered = indexed
                    .get(&(Dir::In, tid))
                    .map(|members| members.contains(&vid))
                    .unwrap_or(false);
                if !covered {
                    push_error(
                        findings,
                        format!("vertex {} missing from the index of type {}", vid, tid),
                    );
                }
            }
        }
    }

    fn read_list(&self, off: u64, size: u64) -> HashSet<u64> {
        if size == 0 {
            return HashSet::new();
        }
        self.arena
            .view(off, size)
            .iter()
            .map(|w| w.load(std::sync::atomic::Ordering::Relaxed))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreOptions;
    use crate::model::{Triple, TPID_MAX};
    use crate::store::key::Key;

    fn built_store() -> GraphStore {
        let store =
            GraphStore::standalone(StoreOptions::new(1 << 10, 1 << 20)).unwrap();
        let triples = vec![
            Triple::new(TPID_MAX + 1, 5, TPID_MAX + 2),
            Triple::new(TPID_MAX + 1, 6, TPID_MAX + 3),
            Triple::new(TPID_MAX + 4, 5, TPID_MAX + 2),
        ];
        let mut spo = triples.clone();
        spo.sort_by(crate::model::spo_order);
        let mut ops = triples;
        ops.sort_by(crate::model::ops_order);
        store.insert_normal(spo, ops);
        store.insert_index();
        store
    }

    #[test]
    fn a_healthy_store_passes_full_verification() {
        let store = built_store();
        let report = store.verify(VerifyLevel::Full);
        assert!(report.success, "findings: {:?}", report.findings);
        // 5 forward/reverse keys plus 4 index keys.
        assert_eq!(report.counts.keys_found, 9);
        assert_eq!(report.counts.index_keys_found, 4);
    }

    #[test]
    fn fast_verification_skips_the_scan() {
        let store = built_store();
        let report = store.verify(VerifyLevel::Fast);
        assert!(report.success);
        assert_eq!(report.counts.keys_found, 0);
    }

    #[test]
    fn a_dangling_chain_link_is_reported() {
        let store = built_store();
        let geo = store.geometry();
        // Point bucket 0's chain slot at an unallocated overflow bucket.
        let chain_slot = geo.bucket_first_slot(0) + geo.associativity - 1;
        store
            .region()
            .store(chain_slot * 2, Key::link(geo.num_buckets + 7).packed());

        let report = store.verify(VerifyLevel::Full);
        assert!(!report.success);
        assert!(report.findings.iter().any(|f| f
            .message
            .contains("outside the allocated indirect region")));
    }

    #[test]
    fn a_wild_pointer_is_reported() {
        let store = built_store();
        let geo = store.geometry();
        // Find an occupied data slot and stretch its pointer past the arena.
        let mut corrupted = None;
        'outer: for bucket in 0..geo.total_buckets() {
            let base = geo.bucket_first_slot(bucket);
            for slot in base..base + geo.associativity - 1 {
                if !store.table.slot(slot).key.is_empty() {
                    corrupted = Some(slot);
                    break 'outer;
                }
            }
        }
        let slot = corrupted.expect("store has at least one key");
        store.region().store(
            slot * 2 + 1,
            crate::store::key::EntryPtr::new(1 << 20, 0).raw(),
        );

        let report = store.verify(VerifyLevel::Full);
        assert!(!report.success);
        assert!(report
            .findings
            .iter()
            .any(|f| f.message.contains("points past the allocated arena")));
    }
}
