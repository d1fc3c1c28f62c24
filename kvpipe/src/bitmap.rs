//! # Sharded Bitmap Index
//!
//! Stores one bit per logical id across many fixed-width bitmap keys.
//!
//! ```text
//! id ──► shard index = id / hash_range ──► key "<prefix>_<index>"
//!    └─► offset      = id % hash_range ──► bit inside that key
//!
//! hash_range = 8, prefix = "p":
//!   ids 0..=7   -> "p_0"
//!   ids 8..=15  -> "p_1"
//!   ids 16..=23 -> "p_2"
//! ```
//!
//! Point reads and writes go through the batch executor. Range operations
//! (count, delete, iterate) walk the covering shard keys one by one with
//! single commands; ranges work at shard granularity.

use std::collections::{btree_map, BTreeMap, HashMap};
use std::num::NonZeroU64;
use std::vec;

use crate::commands::{BinaryCommands, TextCommands};
use crate::error::{HelperError, HelperResult};
use crate::helper::KvHelper;
use crate::session::SessionPool;

/// Mapping from ids to shard keys and offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardLayout {
    prefix: String,
    hash_range: NonZeroU64,
}

impl ShardLayout {
    pub fn new(prefix: impl Into<String>, hash_range: u64) -> HelperResult<Self> {
        let hash_range = NonZeroU64::new(hash_range)
            .ok_or_else(|| HelperError::InvalidArgument("hash range must be positive".to_string()))?;
        Ok(ShardLayout {
            prefix: prefix.into(),
            hash_range,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn hash_range(&self) -> u64 {
        self.hash_range.get()
    }

    pub fn shard_index(&self, bit: u64) -> u64 {
        bit / self.hash_range
    }

    pub fn offset(&self, bit: u64) -> u64 {
        bit % self.hash_range
    }

    pub fn shard_key(&self, bit: u64) -> String {
        self.key_for_index(self.shard_index(bit))
    }

    /// Shard key of every id.
    pub fn shard_keys(&self, bits: impl IntoIterator<Item = u64>) -> HashMap<u64, String> {
        bits.into_iter().map(|bit| (bit, self.shard_key(bit))).collect()
    }

    /// First id stored in each shard covering `[start, end]`, mapped to the
    /// shard key, in ascending order. Empty when `start > end`.
    pub fn generate_keys(&self, start: u64, end: u64) -> BTreeMap<u64, String> {
        if start > end {
            return BTreeMap::new();
        }
        let range = self.hash_range.get();
        (self.shard_index(start)..=self.shard_index(end))
            .map(|index| (index * range, self.key_for_index(index)))
            .collect()
    }

    fn key_for_index(&self, index: u64) -> String {
        format!("{}_{}", self.prefix, index)
    }
}

/// Bitmap index bound to a helper.
pub struct ShardedBitmap<'h, P> {
    helper: &'h KvHelper<P>,
    layout: ShardLayout,
}

impl<P: SessionPool> KvHelper<P> {
    pub fn bitmap(&self, prefix: impl Into<String>, hash_range: u64) -> HelperResult<ShardedBitmap<'_, P>> {
        Ok(ShardedBitmap {
            helper: self,
            layout: ShardLayout::new(prefix, hash_range)?,
        })
    }
}

impl<'h, P: SessionPool> ShardedBitmap<'h, P> {
    pub fn layout(&self) -> &ShardLayout {
        &self.layout
    }

    /// Bit of every requested id. Ids whose partition failed read as
    /// `false`, the same as ids never set.
    pub fn get_bits(&self, bits: impl IntoIterator<Item = u64>) -> HashMap<u64, bool> {
        let bits: Vec<u64> = bits.into_iter().collect();
        let mut result = self.get_bits_resolved(bits.iter().copied());
        for bit in bits {
            result.entry(bit).or_insert(false);
        }
        result
    }

    /// Bits confirmed by the store; ids lost to a failed partition are
    /// absent instead of defaulted.
    pub fn get_bits_resolved(&self, bits: impl IntoIterator<Item = u64>) -> HashMap<u64, bool> {
        let layout = &self.layout;
        self.helper.pipeline(bits, |pipeline, bit| {
            Some(pipeline.getbit(layout.shard_key(*bit), layout.offset(*bit)))
        })
    }

    pub fn get_bit(&self, bit: u64) -> bool {
        self.get_bits([bit]).get(&bit).copied().unwrap_or(false)
    }

    /// Writes `value` for every id and returns each id's previous bit.
    /// Ids whose partition failed are absent.
    pub fn set_bits(&self, bits: impl IntoIterator<Item = u64>, value: bool) -> HashMap<u64, bool> {
        let layout = &self.layout;
        self.helper.pipeline(bits, |pipeline, bit| {
            Some(pipeline.setbit(layout.shard_key(*bit), layout.offset(*bit), value))
        })
    }

    /// Previous bit, or `None` when the write did not go through.
    pub fn set_bit(&self, bit: u64, value: bool) -> Option<bool> {
        self.set_bits([bit], value).get(&bit).copied()
    }

    /// Total set bits over the shards covering `[start, end]`.
    pub fn count_bits(&self, start: u64, end: u64) -> HelperResult<u64> {
        let text = self.helper.text();
        let mut total = 0u64;
        for key in self.layout.generate_keys(start, end).values() {
            total += u64::try_from(text.bitcount(key)?).unwrap_or(0);
        }
        Ok(total)
    }

    /// Deletes every shard covering `[start, end]`; returns how many existed.
    pub fn delete_range(&self, start: u64, end: u64) -> HelperResult<u64> {
        let text = self.helper.text();
        let mut removed = 0u64;
        for key in self.layout.generate_keys(start, end).values() {
            removed += u64::try_from(text.del(key)?).unwrap_or(0);
        }
        Ok(removed)
    }

    /// Ids of every set bit in the shards covering `[start, end]`, ascending.
    ///
    /// Shards are fetched lazily, one per step; a missing shard is skipped.
    pub fn iterate_set_bits(&self, start: u64, end: u64) -> SetBits<'h, P> {
        SetBits {
            helper: self.helper,
            shards: self.layout.generate_keys(start, end).into_iter(),
            current: Vec::new().into_iter(),
            failed: false,
        }
    }
}

/// Iterator returned by `ShardedBitmap::iterate_set_bits`.
pub struct SetBits<'h, P> {
    helper: &'h KvHelper<P>,
    shards: btree_map::IntoIter<u64, String>,
    current: vec::IntoIter<u64>,
    failed: bool,
}

impl<P: SessionPool> Iterator for SetBits<'_, P> {
    type Item = HelperResult<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(bit) = self.current.next() {
                return Some(Ok(bit));
            }
            if self.failed {
                return None;
            }
            let (base, key) = self.shards.next()?;
            match self.helper.binary().get(key.as_bytes()) {
                Ok(Some(payload)) => self.current = decode_set_bits(base, &payload).into_iter(),
                Ok(None) => {}
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Ids of the set bits in a shard payload, most significant bit first.
pub fn decode_set_bits(base: u64, payload: &[u8]) -> Vec<u64> {
    let mut bits = Vec::new();
    for (byte_idx, &byte) in payload.iter().enumerate() {
        if byte == 0 {
            continue;
        }
        for bit_idx in 0..8u64 {
            if byte & (0x80 >> bit_idx) != 0 {
                bits.push(base + byte_idx as u64 * 8 + bit_idx);
            }
        }
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_key_depends_only_on_shard_index() {
        let layout = ShardLayout::new("p", 8).unwrap();
        assert_eq!(layout.shard_key(0), "p_0");
        assert_eq!(layout.shard_key(7), "p_0");
        assert_eq!(layout.shard_key(8), "p_1");
    }

    #[test]
    fn index_and_offset_recompose_the_id() {
        let layout = ShardLayout::new("p", 1_000).unwrap();
        for bit in [0u64, 1, 999, 1_000, 123_456_789, u64::MAX] {
            assert_eq!(layout.shard_index(bit) * 1_000 + layout.offset(bit), bit);
        }
    }

    #[test]
    fn generate_keys_covers_range() {
        let layout = ShardLayout::new("p", 8).unwrap();
        let keys = layout.generate_keys(0, 20);
        let expected: Vec<(u64, String)> = vec![(0, "p_0".into()), (8, "p_1".into()), (16, "p_2".into())];
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn generate_keys_unaligned_and_empty() {
        let layout = ShardLayout::new("p", 8).unwrap();
        let keys: Vec<u64> = layout.generate_keys(5, 17).into_keys().collect();
        assert_eq!(keys, vec![0, 8, 16]);
        assert!(layout.generate_keys(9, 3).is_empty());
    }

    #[test]
    fn zero_hash_range_is_rejected() {
        assert!(matches!(ShardLayout::new("p", 0), Err(HelperError::InvalidArgument(_))));
    }

    #[test]
    fn shard_keys_maps_each_id() {
        let layout = ShardLayout::new("uv", 100).unwrap();
        let keys = layout.shard_keys([5, 150]);
        assert_eq!(keys[&5], "uv_0");
        assert_eq!(keys[&150], "uv_1");
    }

    #[test]
    fn decodes_payload_msb_first() {
        // 0b0001_0000 -> bit 3; second byte 0b1000_0001 -> bits 8 and 15.
        assert_eq!(decode_set_bits(16, &[0x10, 0x81]), vec![19, 24, 31]);
        assert!(decode_set_bits(0, &[0, 0]).is_empty());
    }
}
