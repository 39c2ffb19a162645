//! The in-memory storage of a single replica
//!
//! Each key holds at most one [`StoredEntry`]. Updates follow a last-writer-wins rule based on the
//! [`Timestamp`] order: an incoming entry replaces the stored one unless the stored timestamp is
//! strictly larger. Equal timestamps are accepted, so re-sending the same entry (which is exactly
//! what the write-back of a read does) is idempotent.

use dashmap::{mapref::entry::Entry, DashMap};

use crate::timestamp::Timestamp;

/// A value together with the timestamp of the write that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct StoredEntry {
    pub value: String,
    pub timestamp: Timestamp,
}

impl StoredEntry {
    pub fn new<V>(value: V, timestamp: Timestamp) -> Self
    where
        V: Into<String>,
    {
        Self {
            value: value.into(),
            timestamp,
        }
    }
}

/// The Result of applying a Set to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// The entry was stored, replacing any previous entry
    Applied,
    /// A newer entry was already stored, the update was ignored
    Stale,
}

/// A concurrent key-value store for one replica
///
/// The map is sharded, so concurrent updates to unrelated keys usually do not contend, and the
/// compare-and-replace for a single key happens while holding that key's shard.
#[derive(Debug, Default)]
pub struct ReplicaStore {
    entries: DashMap<String, StoredEntry>,
}

impl ReplicaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of the entry currently stored for `key`
    pub fn get(&self, key: &str) -> Option<StoredEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Store `value` for `key`, unless a strictly newer entry is already stored
    pub fn set<V>(&self, key: &str, value: V, timestamp: Timestamp) -> SetOutcome
    where
        V: Into<String>,
    {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut current) => {
                if current.get().timestamp > timestamp {
                    return SetOutcome::Stale;
                }
                current.insert(StoredEntry::new(value, timestamp));
                SetOutcome::Applied
            }
            Entry::Vacant(slot) => {
                slot.insert(StoredEntry::new(value, timestamp));
                SetOutcome::Applied
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn missing_key() {
        let store = ReplicaStore::new();

        assert_eq!(None, store.get("x"));
        assert!(store.is_empty());
    }

    #[test]
    fn newer_replaces_older() {
        let store = ReplicaStore::new();

        assert_eq!(
            SetOutcome::Applied,
            store.set("x", "first", Timestamp::new(1, "A"))
        );
        assert_eq!(
            SetOutcome::Applied,
            store.set("x", "second", Timestamp::new(2, "A"))
        );

        assert_eq!(
            Some(StoredEntry::new("second", Timestamp::new(2, "A"))),
            store.get("x")
        );
        assert_eq!(1, store.len());
    }

    #[test]
    fn older_is_ignored() {
        let store = ReplicaStore::new();

        store.set("x", "new", Timestamp::new(3, "A"));
        assert_eq!(
            SetOutcome::Stale,
            store.set("x", "old", Timestamp::new(2, "Z"))
        );
        assert_eq!(
            SetOutcome::Stale,
            store.set("x", "tie-lost", Timestamp::new(3, "0"))
        );

        assert_eq!("new", store.get("x").unwrap().value);
    }

    #[test]
    fn equal_timestamp_is_idempotent() {
        let store = ReplicaStore::new();
        let ts = Timestamp::new(4, "A");

        assert_eq!(SetOutcome::Applied, store.set("x", "v", ts.clone()));
        let once = store.get("x");

        assert_eq!(SetOutcome::Applied, store.set("x", "v", ts));
        assert_eq!(once, store.get("x"));
        assert_eq!(1, store.len());
    }

    #[test]
    fn keys_are_independent() {
        let store = ReplicaStore::new();

        store.set("a", "1", Timestamp::new(10, "A"));
        store.set("b", "2", Timestamp::new(1, "A"));

        assert_eq!("1", store.get("a").unwrap().value);
        assert_eq!("2", store.get("b").unwrap().value);
    }

    #[test]
    fn sequential_random_sets_keep_the_largest() {
        let store = ReplicaStore::new();
        let mut rng = rand::rngs::SmallRng::seed_from_u64(0);

        let mut expected: std::collections::HashMap<String, Timestamp> = Default::default();
        for _ in 0..5_000 {
            let key = format!("{}", rng.gen_range(0..20));
            let ts = Timestamp::new(rng.gen_range(1..1_000), format!("c{}", rng.gen_range(0..4)));

            store.set(&key, ts.to_string(), ts.clone());

            let best = expected.entry(key).or_insert_with(|| ts.clone());
            if ts > *best {
                *best = ts;
            }
        }

        for (key, ts) in expected {
            let stored = store.get(&key).unwrap();
            assert_eq!(ts, stored.timestamp);
            assert_eq!(ts.to_string(), stored.value);
        }
    }

    #[test]
    fn concurrent_sets_never_regress() {
        let store = Arc::new(ReplicaStore::new());

        let threads: Vec<_> = (0..8u64)
            .map(|thread| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let mut rng = rand::rngs::SmallRng::seed_from_u64(thread);
                    for _ in 0..2_000 {
                        let key = format!("{}", rng.gen_range(0..10));
                        let seq = rng.gen_range(1..10_000);
                        store.set(&key, seq.to_string(), Timestamp::new(seq, "c"));
                    }
                })
            })
            .collect();

        for handle in threads {
            handle.join().unwrap();
        }

        // Repeat the same random streams to find the largest sequence offered per key
        let mut largest = std::collections::HashMap::new();
        for thread in 0..8u64 {
            let mut rng = rand::rngs::SmallRng::seed_from_u64(thread);
            for _ in 0..2_000 {
                let key = format!("{}", rng.gen_range(0..10));
                let seq: u64 = rng.gen_range(1..10_000);
                let entry = largest.entry(key).or_insert(seq);
                *entry = (*entry).max(seq);
            }
        }

        for (key, seq) in largest {
            let stored = store.get(&key).unwrap();
            assert_eq!(seq, stored.timestamp.sequence());
            assert_eq!(seq.to_string(), stored.value);
        }
    }

    #[test]
    fn concurrent_equal_timestamps_settle_on_one_entry() {
        for round in 0..20 {
            let store = Arc::new(ReplicaStore::new());
            let ts = Timestamp::new(9, "same-owner");

            let threads: Vec<_> = (0..4)
                .map(|thread| {
                    let store = store.clone();
                    let ts = ts.clone();
                    std::thread::spawn(move || {
                        for _ in 0..100 {
                            assert_eq!(
                                SetOutcome::Applied,
                                store.set("k", format!("value-{}", thread), ts.clone())
                            );
                        }
                    })
                })
                .collect();

            for handle in threads {
                handle.join().unwrap();
            }

            let stored = store.get("k").unwrap();
            assert_eq!(ts, stored.timestamp, "round {}", round);
            assert!(
                (0..4).any(|thread| stored.value == format!("value-{}", thread)),
                "unexpected value {:?}",
                stored.value
            );
            assert_eq!(1, store.len());
        }
    }
}
