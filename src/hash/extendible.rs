use log::debug;
use parking_lot::Mutex;
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};

/// A dynamically growing hash table using extendible hashing.
///
/// The directory holds `2^global_depth` entries routing the low
/// `global_depth` bits of a key's hash to a bucket; several entries may alias
/// one bucket. A full bucket is split by one extra hash bit, doubling the
/// directory first when the bucket is already at global depth. Buckets are
/// never merged.
///
/// Buckets live in a slab and directory entries are slab indices, so aliasing
/// is index equality and the table owns all of its storage. All operations
/// lock a single internal mutex.
pub struct ExtendibleHashTable<K, V, S = RandomState> {
    bucket_capacity: usize,
    hasher: S,
    inner: Mutex<Directory<K, V>>,
}

struct Directory<K, V> {
    global_depth: u32,
    /// `2^global_depth` entries, each an index into `buckets`.
    entries: Vec<usize>,
    /// Bucket slab. Slots are only ever appended.
    buckets: Vec<Bucket<K, V>>,
}

struct Bucket<K, V> {
    local_depth: u32,
    items: HashMap<K, V>,
}

impl<K, V> ExtendibleHashTable<K, V, RandomState>
where
    K: Hash + Eq,
{
    /// Create a table whose buckets hold at most `bucket_capacity` entries.
    pub fn new(bucket_capacity: usize) -> Self {
        Self::with_hasher(bucket_capacity, RandomState::new())
    }
}

impl<K, V, S> ExtendibleHashTable<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// As [`ExtendibleHashTable::new`], with an explicit hash state.
    pub fn with_hasher(bucket_capacity: usize, hasher: S) -> Self {
        assert!(bucket_capacity > 0, "bucket capacity must be nonzero");
        Self {
            bucket_capacity,
            hasher,
            inner: Mutex::new(Directory {
                global_depth: 0,
                entries: vec![0],
                buckets: vec![Bucket {
                    local_depth: 0,
                    items: HashMap::new(),
                }],
            }),
        }
    }

    /// Look up the value stored under `key`.
    pub fn find(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let dir = self.inner.lock();
        let slot = dir.entries[self.dir_index(key, dir.global_depth)];
        dir.buckets[slot].items.get(key).cloned()
    }

    /// Remove `key`, reporting whether it was present. Buckets are not
    /// rebalanced.
    pub fn remove(&self, key: &K) -> bool {
        let mut dir = self.inner.lock();
        let slot = dir.entries[self.dir_index(key, dir.global_depth)];
        dir.buckets[slot].items.remove(key).is_some()
    }

    /// Insert or overwrite the value under `key`, splitting buckets and
    /// doubling the directory as needed. Never fails on capacity.
    pub fn insert(&self, key: K, value: V) {
        let mut dir = self.inner.lock();
        loop {
            let slot = dir.entries[self.dir_index(&key, dir.global_depth)];
            let bucket = &mut dir.buckets[slot];

            if let Some(existing) = bucket.items.get_mut(&key) {
                *existing = value;
                return;
            }
            if bucket.items.len() < self.bucket_capacity {
                bucket.items.insert(key, value);
                return;
            }

            // Full: split the target bucket, then re-locate. Repeated splits
            // are possible when every resident key shares the new bit.
            self.split(&mut dir, slot);
        }
    }

    /// Directory-wide bit count.
    pub fn global_depth(&self) -> u32 {
        self.inner.lock().global_depth
    }

    /// Bit count of the bucket behind directory entry `dir_index`.
    pub fn local_depth(&self, dir_index: usize) -> u32 {
        let dir = self.inner.lock();
        let slot = dir.entries[dir_index];
        dir.buckets[slot].local_depth
    }

    /// Number of distinct buckets referenced by the directory. Each bucket is
    /// counted at its canonical entry, the index equal to its discriminator.
    pub fn num_buckets(&self) -> usize {
        let dir = self.inner.lock();
        dir.entries
            .iter()
            .enumerate()
            .filter(|&(i, &slot)| (i as u64) >> dir.buckets[slot].local_depth == 0)
            .count()
    }

    fn dir_index(&self, key: &K, global_depth: u32) -> usize {
        (self.hasher.hash_one(key) & ((1u64 << global_depth) - 1)) as usize
    }

    /// Split the bucket in `slot` by one hash bit, doubling the directory
    /// first if the bucket is already at global depth.
    fn split(&self, dir: &mut Directory<K, V>, slot: usize) {
        if dir.buckets[slot].local_depth == dir.global_depth {
            // Entry i + 2^g aliases entry i, so existing routing is unchanged.
            let copy = dir.entries.clone();
            dir.entries.extend(copy);
            dir.global_depth += 1;
            debug!("directory doubled to global depth {}", dir.global_depth);
        }

        let mask = 1usize << dir.buckets[slot].local_depth;
        dir.buckets[slot].local_depth += 1;
        let local_depth = dir.buckets[slot].local_depth;

        let new_slot = dir.buckets.len();
        dir.buckets.push(Bucket {
            local_depth,
            items: HashMap::new(),
        });

        // Entries with the new bit set move to the peer bucket.
        for (i, entry) in dir.entries.iter_mut().enumerate() {
            if *entry == slot && i & mask != 0 {
                *entry = new_slot;
            }
        }

        // Redistribute by the updated routing.
        let items = std::mem::take(&mut dir.buckets[slot].items);
        let global_depth = dir.global_depth;
        for (key, value) in items {
            let target = dir.entries[self.dir_index(&key, global_depth)];
            dir.buckets[target].items.insert(key, value);
        }

        debug!(
            "split bucket {} -> {} at local depth {}",
            slot, new_slot, local_depth
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::hash::Hasher;

    /// Hashes a key to its own integer value, so directory routing follows
    /// the key's low bits exactly.
    #[derive(Clone, Default)]
    struct IdentityState;

    struct IdentityHasher(u64);

    impl BuildHasher for IdentityState {
        type Hasher = IdentityHasher;

        fn build_hasher(&self) -> IdentityHasher {
            IdentityHasher(0)
        }
    }

    impl Hasher for IdentityHasher {
        fn finish(&self) -> u64 {
            self.0
        }

        fn write(&mut self, bytes: &[u8]) {
            let mut buf = [0u8; 8];
            let n = bytes.len().min(8);
            buf[..n].copy_from_slice(&bytes[..n]);
            self.0 = u64::from_le_bytes(buf);
        }

        fn write_u32(&mut self, n: u32) {
            self.0 = n as u64;
        }

        fn write_u64(&mut self, n: u64) {
            self.0 = n;
        }
    }

    fn identity_table(bucket_capacity: usize) -> ExtendibleHashTable<u32, String, IdentityState> {
        ExtendibleHashTable::with_hasher(bucket_capacity, IdentityState)
    }

    #[test]
    fn test_insert_find_roundtrip() {
        let table = ExtendibleHashTable::new(4);
        table.insert(1, "a".to_string());
        assert_eq!(table.find(&1), Some("a".to_string()));
        assert_eq!(table.find(&2), None);
    }

    #[test]
    fn test_insert_overwrites() {
        let table = ExtendibleHashTable::new(4);
        table.insert(1, "a".to_string());
        table.insert(1, "b".to_string());
        assert_eq!(table.find(&1), Some("b".to_string()));
    }

    #[test]
    fn test_remove() {
        let table = ExtendibleHashTable::new(4);
        table.insert(1, "a".to_string());
        assert!(table.remove(&1));
        assert!(!table.remove(&1));
        assert_eq!(table.find(&1), None);
    }

    #[test]
    fn test_initial_shape() {
        let table = identity_table(2);
        assert_eq!(table.global_depth(), 0);
        assert_eq!(table.num_buckets(), 1);
        assert_eq!(table.local_depth(0), 0);
    }

    #[test]
    fn test_split_with_low_bit_keys() {
        // Capacity 2, keys 0..8 routed by their own low bits: every split
        // separates cleanly, ending at depth 2 with four full buckets.
        let table = identity_table(2);
        for key in 0..8u32 {
            table.insert(key, format!("v{key}"));
        }

        assert_eq!(table.global_depth(), 2);
        assert_eq!(table.num_buckets(), 4);
        for i in 0..4 {
            assert_eq!(table.local_depth(i), 2);
        }
        for key in 0..8u32 {
            assert_eq!(table.find(&key), Some(format!("v{key}")));
        }
    }

    #[test]
    fn test_overwrite_of_full_bucket_does_not_split() {
        let table = identity_table(2);
        table.insert(0, "a".to_string());
        table.insert(4, "b".to_string()); // same bucket at depth 0

        table.insert(0, "c".to_string());
        assert_eq!(table.global_depth(), 0);
        assert_eq!(table.num_buckets(), 1);
        assert_eq!(table.find(&0), Some("c".to_string()));
        assert_eq!(table.find(&4), Some("b".to_string()));
    }

    #[test]
    fn test_cascading_splits_terminate() {
        // Capacity 1, keys differing only in bit 1: the first split does not
        // separate them, the second does.
        let table = identity_table(1);
        table.insert(0, "a".to_string());
        table.insert(2, "b".to_string());

        assert_eq!(table.global_depth(), 2);
        assert_eq!(table.find(&0), Some("a".to_string()));
        assert_eq!(table.find(&2), Some("b".to_string()));
    }

    #[test]
    fn test_aliased_entries_share_bucket() {
        // After doubling past a shallow bucket, its aliases must report the
        // same local depth and route to the same storage.
        let table = identity_table(1);
        table.insert(0, "a".to_string());
        table.insert(1, "b".to_string());
        table.insert(3, "c".to_string());

        // Bucket for even keys stayed at depth 1 while global depth grew to 2,
        // so entries 0 and 2 alias it.
        assert_eq!(table.global_depth(), 2);
        assert_eq!(table.local_depth(0), table.local_depth(2));
        assert_eq!(table.num_buckets(), 3);
    }

    #[test]
    fn test_directory_invariants_with_default_hasher() {
        let table: ExtendibleHashTable<u32, u32> = ExtendibleHashTable::new(2);
        for key in 0..256u32 {
            table.insert(key, key * 2);
        }

        let global_depth = table.global_depth();
        let dir_size = 1usize << global_depth;
        let mut max_local = 0;
        for i in 0..dir_size {
            let local = table.local_depth(i);
            assert!(local <= global_depth);
            max_local = max_local.max(local);
        }
        assert_eq!(max_local, global_depth);

        for key in 0..256u32 {
            assert_eq!(table.find(&key), Some(key * 2));
        }
    }

    #[test]
    fn test_bucket_discriminator_invariant() {
        // Every key must live in the bucket its low local-depth bits select.
        let table = identity_table(2);
        for key in 0..32u32 {
            table.insert(key, format!("{key}"));
        }

        let dir = table.inner.lock();
        let dir_size = 1usize << dir.global_depth;
        assert_eq!(dir.entries.len(), dir_size);
        for (i, &slot) in dir.entries.iter().enumerate() {
            let bucket = &dir.buckets[slot];
            let mask = (1u64 << bucket.local_depth) - 1;
            for key in bucket.items.keys() {
                assert_eq!(*key as u64 & mask, i as u64 & mask);
            }
        }
    }

    #[test]
    fn test_remove_does_not_shrink() {
        let table = identity_table(2);
        for key in 0..8u32 {
            table.insert(key, format!("{key}"));
        }
        let depth = table.global_depth();
        let buckets = table.num_buckets();

        for key in 0..8u32 {
            assert!(table.remove(&key));
        }
        assert_eq!(table.global_depth(), depth);
        assert_eq!(table.num_buckets(), buckets);
    }
}
