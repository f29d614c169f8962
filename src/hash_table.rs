//! Open-addressed hash table from string key to a growable list of values.
//!
//! Backs each partition of the [`crate::shuffle::ShuffleStore`]. Grounded on
//! the DJB2 + linear-probing + load-factor-growth scheme of the original
//! `hashtable.c`, translated into owned `String` keys and `Vec<String>`
//! value lists instead of manually managed C buffers.

const INITIAL_BUCKETS: usize = 8;
const MAX_LOAD_FACTOR: f64 = 0.7;

/// Values accumulated under a single key.
pub(crate) type ValueList = Vec<String>;

struct Bucket {
    key: String,
    values: ValueList,
}

/// Hashes `key` with DJB2: `h = 5381; h = h * 33 + byte`, wrapping u64 math.
pub(crate) fn djb2(key: &str) -> u64 {
    let mut hash: u64 = 5381;
    for byte in key.as_bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(*byte as u64);
    }
    hash
}

/// Open-addressed table of `key -> ValueList`, power-of-two bucket count,
/// linear probing, grown by doubling whenever load factor exceeds 0.7.
pub(crate) struct HashBucketTable {
    buckets: Vec<Option<Bucket>>,
    num_keys: usize,
}

impl HashBucketTable {
    pub(crate) fn new() -> Self {
        Self {
            buckets: (0..INITIAL_BUCKETS).map(|_| None).collect(),
            num_keys: 0,
        }
    }

    /// Appends `value` to `key`'s value list, creating the list if `key` is
    /// new. Grows the table afterward if the load factor now exceeds 0.7.
    pub(crate) fn insert(&mut self, key: &str, value: String) {
        Self::insert_into(&mut self.buckets, &mut self.num_keys, key, value);

        if self.num_keys as f64 / self.buckets.len() as f64 > MAX_LOAD_FACTOR {
            self.grow();
        }
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.find_slot(key).is_some()
    }

    pub(crate) fn get(&self, key: &str) -> Option<&ValueList> {
        self.find_slot(key)
            .map(|index| &self.buckets[index].as_ref().unwrap().values)
    }

    /// Keys in bucket-array order; the iteration order the shuffle store's
    /// cursor walks during the reduce phase.
    pub(crate) fn occupied_slots(&self) -> impl Iterator<Item = &str> {
        self.buckets
            .iter()
            .filter_map(|slot| slot.as_ref().map(|bucket| bucket.key.as_str()))
    }

    fn find_slot(&self, key: &str) -> Option<usize> {
        let num_buckets = self.buckets.len();
        let mut index = (djb2(key) as usize) & (num_buckets - 1);
        for _ in 0..num_buckets {
            match &self.buckets[index] {
                Some(bucket) if bucket.key == key => return Some(index),
                None => return None,
                Some(_) => index = (index + 1) % num_buckets,
            }
        }
        None
    }

    /// Inserts (or appends to) `key` into `buckets`, bumping `num_keys` on a
    /// fresh key. Does not check or enforce the load factor — the caller
    /// (either [`HashBucketTable::insert`] or [`HashBucketTable::grow`]'s
    /// rehash) is responsible for that, so growth can reuse this path
    /// without triggering a recursive grow.
    fn insert_into(
        buckets: &mut [Option<Bucket>],
        num_keys: &mut usize,
        key: &str,
        value: String,
    ) {
        let num_buckets = buckets.len();
        let mut index = (djb2(key) as usize) & (num_buckets - 1);
        loop {
            match &mut buckets[index] {
                Some(bucket) if bucket.key == key => {
                    bucket.values.push(value);
                    return;
                }
                Some(_) => index = (index + 1) % num_buckets,
                None => {
                    buckets[index] = Some(Bucket {
                        key: key.to_owned(),
                        values: vec![value],
                    });
                    *num_keys += 1;
                    return;
                }
            }
        }
    }

    /// Doubles the bucket count and rehashes every live entry through
    /// [`Self::insert_into`], which does not re-check the load factor —
    /// a single non-recursive pass.
    fn grow(&mut self) {
        let new_capacity = self.buckets.len() * 2;
        let mut new_buckets: Vec<Option<Bucket>> = (0..new_capacity).map(|_| None).collect();
        let mut new_num_keys = 0;

        for slot in self.buckets.drain(..) {
            if let Some(bucket) = slot {
                let Bucket { key, values } = bucket;
                let num_buckets = new_buckets.len();
                let mut index = (djb2(&key) as usize) & (num_buckets - 1);
                loop {
                    match &new_buckets[index] {
                        None => {
                            new_buckets[index] = Some(Bucket { key, values });
                            new_num_keys += 1;
                            break;
                        }
                        Some(_) => index = (index + 1) % num_buckets,
                    }
                }
            }
        }

        self.buckets = new_buckets;
        self.num_keys = new_num_keys;
    }

    #[cfg(test)]
    pub(crate) fn load_factor(&self) -> f64 {
        self.num_keys as f64 / self.buckets.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn djb2_matches_known_vector() {
        let mut hash: u64 = 5381;
        for byte in b"a" {
            hash = hash.wrapping_mul(33).wrapping_add(*byte as u64);
        }
        assert_eq!(djb2("a"), hash);
        assert_eq!(djb2(""), 5381);
    }

    #[test]
    fn insert_and_get_round_trip() {
        let mut table = HashBucketTable::new();
        table.insert("apple", "1".to_owned());
        table.insert("apple", "1".to_owned());
        table.insert("bear", "1".to_owned());

        assert_eq!(table.get("apple"), Some(&vec!["1".to_owned(), "1".to_owned()]));
        assert_eq!(table.get("bear"), Some(&vec!["1".to_owned()]));
        assert_eq!(table.get("cat"), None);
        assert!(table.contains("apple"));
        assert!(!table.contains("cat"));
    }

    #[test]
    fn load_factor_never_exceeds_threshold() {
        let mut table = HashBucketTable::new();
        for i in 0..5000 {
            table.insert(&format!("key-{i}"), "v".to_owned());
        }
        assert!(table.load_factor() <= MAX_LOAD_FACTOR);
        for i in 0..5000 {
            assert!(table.contains(&format!("key-{i}")));
        }
    }

    #[test]
    fn occupied_slots_visits_every_key_exactly_once() {
        let mut table = HashBucketTable::new();
        let keys: Vec<String> = (0..200).map(|i| format!("k{i}")).collect();
        for key in &keys {
            table.insert(key, "x".to_owned());
        }

        let mut seen: Vec<&str> = table.occupied_slots().collect();
        seen.sort_unstable();
        let mut expected: Vec<&str> = keys.iter().map(String::as_str).collect();
        expected.sort_unstable();
        assert_eq!(seen, expected);
    }

    #[test]
    fn single_key_one_million_values_no_loss() {
        let mut table = HashBucketTable::new();
        for _ in 0..1_000_000 {
            table.insert("k", "v".to_owned());
        }
        assert_eq!(table.get("k").unwrap().len(), 1_000_000);
    }
}
