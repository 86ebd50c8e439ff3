use std::sync::atomic::Ordering;
use std::time::Instant;

use dashmap::{DashMap, DashSet};
use rayon::prelude::*;
use tracing::info;

use crate::model::{is_type_id, Dir, Pid, Triple, Vid, PREDICATE_ID, TYPE_ID};
use crate::store::key::{EntryPtr, Key};
use crate::store::GraphStore;

impl GraphStore {
    /// Loads this server's triples into the table: one key per maximal
    /// `(subject, predicate)` run of `spo` and per `(object, predicate)` run
    /// of `ops`, each pointing at its contiguously written adjacency list.
    ///
    /// `spo` must be sorted by `(s, p, o)` and `ops` by `(o, p, s)`; both
    /// must contain only triples this server owns. Because type object ids
    /// sit below vertex ids, the type assertions form a prefix of `ops`;
    /// they are skipped here and re-enter as index entries in
    /// [`GraphStore::insert_index`].
    ///
    /// May be called from several loader threads as long as no two shards
    /// split a key's run between them.
    ///
    /// # Panics
    ///
    /// Panics on a duplicate key or when the slot array or entry arena runs
    /// out of room.
    pub fn insert_normal(&self, spo: Vec<Triple>, ops: Vec<Triple>) {
        let type_triples = ops.iter().take_while(|t| is_type_id(t.o)).count();
        let normal_ops = &ops[type_triples..];

        let total = (spo.len() + normal_ops.len()) as u64;
        let base = self.arena.reserve(total);
        let mut off = base;

        // Distinct key runs, which is exactly the entry budget of the
        // versatile predicate lists.
        let mut runs = 0u64;

        let mut s = 0;
        while s < spo.len() {
            let mut e = s + 1;
            while e < spo.len() && spo[e].s == spo[s].s && spo[e].p == spo[s].p {
                e += 1;
            }
            runs += 1;

            let slot = self.table.insert(Key::new(spo[s].s, Dir::Out, spo[s].p));
            self.table
                .set_ptr(slot, EntryPtr::new((e - s) as u64, off));
            for t in &spo[s..e] {
                self.arena.write(off, t.o);
                off += 1;
            }
            s = e;
        }

        let mut s = 0;
        while s < normal_ops.len() {
            let mut e = s + 1;
            while e < normal_ops.len()
                && normal_ops[e].o == normal_ops[s].o
                && normal_ops[e].p == normal_ops[s].p
            {
                e += 1;
            }
            runs += 1;

            let slot = self
                .table
                .insert(Key::new(normal_ops[s].o, Dir::In, normal_ops[s].p));
            self.table
                .set_ptr(slot, EntryPtr::new((e - s) as u64, off));
            for t in &normal_ops[s..e] {
                self.arena.write(off, t.s);
                off += 1;
            }
            s = e;
        }

        debug_assert_eq!(off, base + total);

        if self.opts.versatile {
            self.insert_predicate_lists(&spo, normal_ops, runs);
        }
    }

    /// Versatile-mode keys `(v, dir, PREDICATE_ID)`: for each vertex, the
    /// deduplicated predicates incident in that direction. Sorted input
    /// makes equal predicates adjacent within a vertex block, so emitting
    /// once per run deduplicates.
    fn insert_predicate_lists(&self, spo: &[Triple], normal_ops: &[Triple], runs: u64) {
        let mut off = self.arena.reserve(runs);

        let mut s = 0;
        while s < spo.len() {
            let slot = self
                .table
                .insert(Key::new(spo[s].s, Dir::Out, PREDICATE_ID));

            let mut e = s;
            let mut len = 0u64;
            loop {
                let run_pid = spo[e].p;
                self.arena.write(off, run_pid);
                off += 1;
                len += 1;
                e += 1;
                while e < spo.len() && spo[e].s == spo[s].s && spo[e].p == run_pid {
                    e += 1;
                }
                if e >= spo.len() || spo[e].s != spo[s].s {
                    break;
                }
            }

            self.table.set_ptr(slot, EntryPtr::new(len, off - len));
            s = e;
        }

        let mut s = 0;
        while s < normal_ops.len() {
            let slot = self
                .table
                .insert(Key::new(normal_ops[s].o, Dir::In, PREDICATE_ID));

            let mut e = s;
            let mut len = 0u64;
            loop {
                let run_pid = normal_ops[e].p;
                self.arena.write(off, run_pid);
                off += 1;
                len += 1;
                e += 1;
                while e < normal_ops.len()
                    && normal_ops[e].o == normal_ops[s].o
                    && normal_ops[e].p == run_pid
                {
                    e += 1;
                }
                if e >= normal_ops.len() || normal_ops[e].o != normal_ops[s].o {
                    break;
                }
            }

            self.table.set_ptr(slot, EntryPtr::new(len, off - len));
            s = e;
        }
    }

    /// Builds the reverse indexes over the loaded data and inserts them as
    /// ordinary key/value pairs under `vid = 0`.
    ///
    /// Scans every bucket in parallel, classifying each occupied data slot
    /// by its key shape, then materializes one index key per predicate
    /// (each direction), one per type, and, in versatile mode, the
    /// all-vertices and all-predicates sets. The index key direction
    /// matches the direction of the normal keys it aggregates. Orderings
    /// within index lists follow the scan and are unspecified.
    ///
    /// Call once, after `insert_normal` has finished on every server.
    ///
    /// # Panics
    ///
    /// Panics when the scan meets a reverse type key, which the load
    /// pipeline must never emit, or when materialization exhausts the slot
    /// array or entry arena.
    pub fn insert_index(&self) {
        let scan_start = Instant::now();

        let subjects_by_pred: DashMap<Pid, Vec<Vid>> = DashMap::new();
        let objects_by_pred: DashMap<Pid, Vec<Vid>> = DashMap::new();
        let members_by_type: DashMap<Pid, Vec<Vid>> = DashMap::new();
        let all_vertices: DashSet<u64> = DashSet::new();
        let all_predicates: DashSet<u64> = DashSet::new();

        let data_slots = self.geo.associativity - 1;
        (0..self.geo.total_buckets()).into_par_iter().for_each(|bucket| {
            let base = self.geo.bucket_first_slot(bucket);
            for slot in base..base + data_slots {
                let rec = self.table.slot(slot);
                if rec.key.is_empty() {
                    continue;
                }

                let vid = rec.key.vid();
                let pid = rec.key.pid();
                match (rec.key.dir(), pid) {
                    (_, PREDICATE_ID) => {
                        // Versatile-only keys: their owner is a vertex and
                        // their adjacency enumerates predicates.
                        all_vertices.insert(vid);
                        for word in self.arena.view(rec.ptr.off(), rec.ptr.size()) {
                            all_predicates.insert(word.load(Ordering::Relaxed));
                        }
                    }
                    (Dir::In, TYPE_ID) => {
                        panic!("reverse type key for vid {} survived the load", vid)
                    }
                    (Dir::Out, TYPE_ID) => {
                        for word in self.arena.view(rec.ptr.off(), rec.ptr.size()) {
                            let tid = word.load(Ordering::Relaxed);
                            members_by_type.entry(tid).or_default().push(vid);
                        }
                    }
                    (Dir::In, _) => objects_by_pred.entry(pid).or_default().push(vid),
                    (Dir::Out, _) => subjects_by_pred.entry(pid).or_default().push(vid),
                }
            }
        });

        info!(
            elapsed_ms = scan_start.elapsed().as_millis() as u64,
            predicates = subjects_by_pred.len().max(objects_by_pred.len()),
            types = members_by_type.len(),
            "scanned slot array for index material"
        );

        let write_start = Instant::now();
        self.store_index_map(members_by_type, Dir::In);
        self.store_index_map(objects_by_pred, Dir::In);
        self.store_index_map(subjects_by_pred, Dir::Out);

        if self.opts.versatile {
            self.store_index_set(all_vertices, Dir::In);
            self.store_index_set(all_predicates, Dir::Out);
        }

        info!(
            elapsed_ms = write_start.elapsed().as_millis() as u64,
            "materialized index keys"
        );
    }

    fn store_index_map(&self, map: DashMap<Pid, Vec<Vid>>, dir: Dir) {
        for (id, vids) in map {
            let mut off = self.arena.reserve(vids.len() as u64);
            let slot = self.table.insert(Key::new(0, dir, id));
            self.table
                .set_ptr(slot, EntryPtr::new(vids.len() as u64, off));
            for vid in vids {
                self.arena.write(off, vid);
                off += 1;
            }
        }
    }

    fn store_index_set(&self, set: DashSet<u64>, dir: Dir) {
        let len = set.len() as u64;
        let mut off = self.arena.reserve(len);
        let slot = self.table.insert(Key::new(0, dir, TYPE_ID));
        self.table.set_ptr(slot, EntryPtr::new(len, off));
        for id in set {
            self.arena.write(off, id);
            off += 1;
        }
    }
}
