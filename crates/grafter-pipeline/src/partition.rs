//! Stable partition hashing.
//!
//! Every stage that has to co-locate records (dictionary shards, edge
//! partitions, merge groups, sink groups) buckets keys through
//! [`PartitionHasher`]. The hash must be a pure function of the key's value so
//! that separate workers and separate runs agree on every bucket; `std`'s
//! `DefaultHasher` makes no such promise, so keys hash with a fixed 32-bit
//! polynomial over their text instead.

use crate::error::ConfigError;
use grafter_model::VertexId;

/// Process-independent 32-bit hash.
pub trait StableHash {
    fn stable_hash(&self) -> i32;
}

impl StableHash for str {
    /// `h = 31 * h + c` over the characters, wrapping on overflow.
    fn stable_hash(&self) -> i32 {
        self.chars()
            .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
    }
}

impl StableHash for String {
    fn stable_hash(&self) -> i32 {
        self.as_str().stable_hash()
    }
}

impl StableHash for i64 {
    fn stable_hash(&self) -> i32 {
        (*self ^ ((*self as u64) >> 32) as i64) as i32
    }
}

impl StableHash for u64 {
    fn stable_hash(&self) -> i32 {
        (*self ^ (*self >> 32)) as i32
    }
}

impl StableHash for VertexId {
    fn stable_hash(&self) -> i32 {
        self.raw_id().stable_hash()
    }
}

impl<T: StableHash + ?Sized> StableHash for &T {
    fn stable_hash(&self) -> i32 {
        (**self).stable_hash()
    }
}

/// Maps keys into `[0, N)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionHasher {
    buckets: i32,
}

impl PartitionHasher {
    pub fn new(buckets: usize) -> Result<Self, ConfigError> {
        if buckets == 0 || buckets > i32::MAX as usize {
            return Err(ConfigError::InvalidPartitions(buckets));
        }
        Ok(Self {
            buckets: buckets as i32,
        })
    }

    pub fn buckets(&self) -> usize {
        self.buckets as usize
    }

    /// Bucket of `key`. A negative remainder is folded into range by adding N.
    pub fn bucket<K: StableHash + ?Sized>(&self, key: &K) -> usize {
        let mut b = key.stable_hash() % self.buckets;
        if b < 0 {
            b += self.buckets;
        }
        b as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn string_hash_matches_polynomial() {
        assert_eq!("".stable_hash(), 0);
        assert_eq!("a".stable_hash(), 97);
        assert_eq!("ab".stable_hash(), 97 * 31 + 98);
        // Known value of the same polynomial on the JVM ("hello".hashCode()).
        assert_eq!("hello".stable_hash(), 99_162_322);
    }

    #[test]
    fn negative_hashes_fold_into_range() {
        // "polygenelubricants" overflows to i32::MIN.
        let key = "polygenelubricants";
        assert_eq!(key.stable_hash(), i32::MIN);
        let hasher = PartitionHasher::new(7).unwrap();
        let b = hasher.bucket(key);
        assert!(b < 7);
        assert_eq!(b as i32, (i32::MIN % 7) + 7);
    }

    #[test]
    fn zero_buckets_is_a_config_error() {
        assert!(matches!(
            PartitionHasher::new(0),
            Err(ConfigError::InvalidPartitions(0))
        ));
    }

    #[test]
    fn vertex_ids_hash_by_raw_text() {
        let hasher = PartitionHasher::new(16).unwrap();
        let id = VertexId::labeled("ada", "person");
        assert_eq!(hasher.bucket(&id), hasher.bucket(id.raw_id().as_str()));
    }

    proptest! {
        #[test]
        fn buckets_are_in_range_and_stable(key in ".*", n in 1usize..512) {
            let hasher = PartitionHasher::new(n).unwrap();
            let b = hasher.bucket(key.as_str());
            prop_assert!(b < n);
            prop_assert_eq!(b, hasher.bucket(&key.clone()));
        }

        #[test]
        fn integer_buckets_are_in_range(v in any::<i64>(), n in 1usize..512) {
            let hasher = PartitionHasher::new(n).unwrap();
            prop_assert!(hasher.bucket(&v) < n);
            prop_assert!(hasher.bucket(&(v as u64)) < n);
        }
    }
}
