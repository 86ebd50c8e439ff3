use std::collections::HashSet;

use tripod::{Dir, GraphStore, Key, StoreOptions, Triple, TPID_MAX};

const PID: u64 = 5;

fn collision_store() -> GraphStore {
    // Associativity 4 leaves 3 data slots per bucket.
    let opts = StoreOptions::new(256, 1 << 20).associativity(4);
    GraphStore::standalone(opts).unwrap()
}

/// Picks `count` subjects whose forward keys all land in one primary
/// bucket, plus one object per triple whose reverse key lands alone in some
/// other bucket, so overflow accounting is driven by the forward chain
/// only.
fn colliding_triples(store: &GraphStore, count: usize) -> Vec<Triple> {
    let num_buckets = store.geometry().num_buckets;
    let bucket_of = |key: Key| key.hash() % num_buckets;

    let mut subjects = Vec::with_capacity(count);
    let mut target = None;
    let mut vid = TPID_MAX;
    while subjects.len() < count {
        let bucket = bucket_of(Key::new(vid, Dir::Out, PID));
        match target {
            None => {
                target = Some(bucket);
                subjects.push(vid);
            }
            Some(t) if bucket == t => subjects.push(vid),
            Some(_) => {}
        }
        vid += 1;
    }
    let target = target.unwrap();

    let mut objects = Vec::with_capacity(count);
    let mut used_buckets = HashSet::from([target]);
    while objects.len() < count {
        vid += 1;
        let bucket = bucket_of(Key::new(vid, Dir::In, PID));
        if used_buckets.insert(bucket) {
            objects.push(vid);
        }
    }

    subjects
        .iter()
        .zip(&objects)
        .map(|(&s, &o)| Triple::new(s, PID, o))
        .collect()
}

#[test]
fn colliding_keys_chain_through_overflow_buckets() {
    let store = collision_store();
    let triples = colliding_triples(&store, 33);

    let mut spo = triples.clone();
    spo.sort_by(tripod::model::spo_order);
    let mut ops = triples.clone();
    ops.sort_by(tripod::model::ops_order);
    store.insert_normal(spo, ops);

    // 3 keys fit the primary bucket; the other 30 need ceil(30 / 3) = 10
    // overflow buckets.
    assert_eq!(store.stats().indirect.allocated_buckets, 10);

    store.insert_index();
    for t in &triples {
        assert_eq!(store.get_edges_local(t.s, Dir::Out, PID).to_vec(), [t.o]);
        assert_eq!(store.get_edges_local(t.o, Dir::In, PID).to_vec(), [t.s]);
    }
    let indexed: HashSet<u64> = store.get_index_edges_local(PID, Dir::Out).iter().collect();
    assert_eq!(indexed, triples.iter().map(|t| t.s).collect());
}

#[test]
fn absent_keys_walk_the_full_chain_and_miss() {
    let store = collision_store();
    let triples = colliding_triples(&store, 12);
    let probe_subjects: Vec<u64> = {
        // More subjects from the same bucket that were never loaded.
        let extended = colliding_triples(&store, 20);
        extended[12..].iter().map(|t| t.s).collect()
    };

    let mut spo = triples.clone();
    spo.sort_by(tripod::model::spo_order);
    let mut ops = triples;
    ops.sort_by(tripod::model::ops_order);
    store.insert_normal(spo, ops);

    for s in probe_subjects {
        assert!(store.get_edges_local(s, Dir::Out, PID).is_empty());
    }
}
