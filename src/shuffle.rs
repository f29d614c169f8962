//! Partitioned intermediate store written by mappers and drained by reducers.

use std::sync::Mutex;

use log::{trace, warn};

use crate::hash_table::{djb2, HashBucketTable};

/// Per-partition iteration state, advanced only by the single reducer
/// worker assigned to that partition. Wrapped in a `Mutex` purely for
/// `Send`/`Sync` hygiene — access is single-threaded by contract, so the
/// lock is never contended.
struct Cursor {
    /// Snapshot of the partition's keys in bucket-array order, taken at
    /// `begin_partition` time. The partition is structurally read-only
    /// during the reduce phase, so the snapshot never goes stale.
    keys: Vec<String>,
    /// Index into `keys` of the current key, or `None` once exhausted.
    key_index: Option<usize>,
    /// Position into the current key's value list for the next `next_value` call.
    value_index: usize,
}

struct Partition {
    table: Mutex<HashBucketTable>,
    cursor: Mutex<Cursor>,
}

/// The partitioned, concurrently-written key/value multimap produced by the
/// map phase and drained by the reduce phase.
///
/// Each partition holds its own mutex, so mappers emitting into different
/// partitions never contend with each other. Built once per job with
/// `P = num_reducers` partitions and dropped at the end of `run`.
pub(crate) struct ShuffleStore {
    partitions: Vec<Partition>,
}

impl ShuffleStore {
    pub(crate) fn new(num_partitions: usize) -> Self {
        trace!("creating shuffle store with {num_partitions} partitions");
        let partitions = (0..num_partitions)
            .map(|_| Partition {
                table: Mutex::new(HashBucketTable::new()),
                cursor: Mutex::new(Cursor {
                    keys: Vec::new(),
                    key_index: None,
                    value_index: 0,
                }),
            })
            .collect();
        Self { partitions }
    }

    pub(crate) fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Inserts `(key, value)` into the partition chosen by [`partition`].
    pub(crate) fn emit(&self, key: &str, value: String) {
        let p = partition(key, self.partitions.len());
        self.partitions[p].table.lock().unwrap().insert(key, value);
    }

    /// Resets partition `p`'s cursor to its first occupied bucket, taking a
    /// fresh snapshot of the bucket-array key order.
    pub(crate) fn begin_partition(&self, p: usize) {
        let table = self.partitions[p].table.lock().unwrap();
        let keys: Vec<String> = table.occupied_slots().map(str::to_owned).collect();
        let mut cursor = self.partitions[p].cursor.lock().unwrap();
        cursor.key_index = if keys.is_empty() { None } else { Some(0) };
        cursor.keys = keys;
        cursor.value_index = 0;
    }

    /// The key at partition `p`'s current cursor, or `None` if exhausted.
    pub(crate) fn current_key(&self, p: usize) -> Option<String> {
        let cursor = self.partitions[p].cursor.lock().unwrap();
        let index = cursor.key_index?;
        cursor.keys.get(index).cloned()
    }

    /// Advances partition `p`'s cursor to the next occupied bucket and
    /// resets the per-key value cursor.
    pub(crate) fn advance_key(&self, p: usize) {
        let mut cursor = self.partitions[p].cursor.lock().unwrap();
        let Some(current) = cursor.key_index else {
            return;
        };
        let next = current + 1;
        cursor.key_index = if next < cursor.keys.len() { Some(next) } else { None };
        cursor.value_index = 0;
    }

    /// The next value for partition `p`'s current key, or `None` if the
    /// list is exhausted or `key` no longer matches the current key.
    pub(crate) fn next_value(&self, p: usize, key: &str) -> Option<String> {
        let table = self.partitions[p].table.lock().unwrap();
        let mut cursor = self.partitions[p].cursor.lock().unwrap();

        let index = cursor.key_index?;
        let current_key = cursor.keys.get(index)?.clone();
        if current_key != key {
            warn!("next_value called with key {key:?} but partition {p} is at {current_key:?}");
            return None;
        }

        let values = table.get(&current_key)?;
        let value = values.get(cursor.value_index)?.clone();
        cursor.value_index += 1;
        Some(value)
    }
}

/// `djb2(key) % num_partitions`. Pure, deterministic, reused internally by
/// the hash bucket table with power-of-two masking instead of modulus.
pub fn partition(key: &str, num_partitions: usize) -> usize {
    (djb2(key) % num_partitions as u64) as usize
}
