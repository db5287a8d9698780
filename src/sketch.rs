//! Count-Min frequency sketch with doorkeeper and periodic aging.
//!
//! Estimates access frequency of arbitrary keys with bounded memory and a
//! fast, allocation-free increment. See `SPEC_FULL.md` §4.1.

use crate::invariants::debug_assert_counter_bounded;
use crate::key::spread;

const COUNTERS_PER_WORD: u32 = 16; // 4 bits each, packed into a u64
const COUNTER_MASK: u64 = 0x0f;
const RESET_MASK: u64 = 0x7777_7777_7777_7777; // clears the high bit of each nibble before shifting

/// A 4-bit Count-Min Sketch with a doorkeeper bit filter and periodic aging.
///
/// Four independent hash derivations per key are taken from one spread hash
/// by rotating it into quadrants, avoiding four separate hash computations.
pub(crate) struct FrequencySketch {
    table: Box<[u64]>,
    door_keeper: Box<[u64]>,
    table_mask: u64,
    size: u64,
    sample_size: u64,
}

impl FrequencySketch {
    /// Builds a sketch sized for roughly `estimated_max_unique_keys` distinct
    /// keys, rounding the table to the next power of two.
    pub(crate) fn with_capacity(estimated_max_unique_keys: usize) -> Self {
        let capacity = estimated_max_unique_keys.max(16).next_power_of_two();
        let words = (capacity / COUNTERS_PER_WORD as usize).max(1);
        let door_keeper_words = (capacity / 64).max(1);
        Self {
            table: vec![0u64; words].into_boxed_slice(),
            door_keeper: vec![0u64; door_keeper_words].into_boxed_slice(),
            table_mask: (words as u64) - 1,
            size: 0,
            sample_size: 10 * capacity as u64,
        }
    }

    /// Increments the estimated frequency for `key_hash`, suppressing the
    /// very first increment for a brand-new key via the doorkeeper.
    pub(crate) fn increment(&mut self, key_hash: u64) {
        let h = spread(key_hash);
        let door_idx = self.door_keeper_index(h);
        let door_bit = self.door_keeper_bit(h);
        let seen_before = self.door_keeper[door_idx] & door_bit != 0;

        if !seen_before {
            self.door_keeper[door_idx] |= door_bit;
        } else {
            let mut incremented = false;
            for i in 0..4 {
                let (word_idx, counter_idx) = self.slot(h, i);
                incremented |= self.increment_at(word_idx, counter_idx);
            }
            if incremented {
                self.size += 1;
            }
        }

        if self.size >= self.sample_size {
            self.reset();
        }
    }

    /// Returns the estimated frequency of `key_hash`, the minimum across the
    /// four counters (conservative update / Count-Min estimator).
    pub(crate) fn frequency(&self, key_hash: u64) -> u8 {
        let h = spread(key_hash);
        let mut min = 15u8;
        for i in 0..4 {
            let (word_idx, counter_idx) = self.slot(h, i);
            let value = self.counter_at(word_idx, counter_idx);
            min = min.min(value);
        }
        min
    }

    fn slot(&self, spread_hash: u64, derivation: u32) -> (usize, u32) {
        // Rotate the spread hash by 16 bits per derivation so each of the
        // four "hash functions" samples a different region of the same
        // 64-bit value, rather than four independent hashers.
        let rotated = spread_hash.rotate_left(derivation * 16);
        let word_idx = (rotated & self.table_mask) as usize;
        let counter_idx = ((rotated >> 60) % u64::from(COUNTERS_PER_WORD)) as u32;
        (word_idx, counter_idx)
    }

    fn counter_at(&self, word_idx: usize, counter_idx: u32) -> u8 {
        let shift = counter_idx * 4;
        ((self.table[word_idx] >> shift) & COUNTER_MASK) as u8
    }

    /// Returns `true` if the counter was actually incremented (not already
    /// saturated at 15).
    fn increment_at(&mut self, word_idx: usize, counter_idx: u32) -> bool {
        let shift = counter_idx * 4;
        let word = self.table[word_idx];
        let current = (word >> shift) & COUNTER_MASK;
        debug_assert_counter_bounded!(current);
        if current < 15 {
            self.table[word_idx] = word + (1u64 << shift);
            true
        } else {
            false
        }
    }

    fn door_keeper_index(&self, spread_hash: u64) -> usize {
        let len = self.door_keeper.len() as u64;
        ((spread_hash >> 32) % len.max(1)) as usize
    }

    fn door_keeper_bit(&self, spread_hash: u64) -> u64 {
        1u64 << (spread_hash & 63)
    }

    /// Halves every counter in one pass and clears the doorkeeper, bounding
    /// the historical influence of old accesses.
    fn reset(&mut self) {
        for word in self.table.iter_mut() {
            *word = (*word >> 1) & RESET_MASK;
        }
        for word in self.door_keeper.iter_mut() {
            *word = 0;
        }
        self.size >>= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_increment_is_suppressed_by_doorkeeper() {
        let mut sketch = FrequencySketch::with_capacity(64);
        assert_eq!(sketch.frequency(1), 0);
        sketch.increment(1);
        assert_eq!(sketch.frequency(1), 0, "first touch only sets the doorkeeper bit");
        sketch.increment(1);
        assert_eq!(sketch.frequency(1), 1);
    }

    #[test]
    fn frequency_saturates_at_fifteen() {
        let mut sketch = FrequencySketch::with_capacity(64);
        for _ in 0..40 {
            sketch.increment(7);
        }
        assert_eq!(sketch.frequency(7), 15);
    }

    #[test]
    fn distinct_keys_have_independent_counts() {
        let mut sketch = FrequencySketch::with_capacity(256);
        for _ in 0..5 {
            sketch.increment(100);
        }
        assert_eq!(sketch.frequency(200), 0);
    }

    #[test]
    fn aging_halves_counters() {
        let mut sketch = FrequencySketch::with_capacity(16);
        // sample_size is 10x capacity; drive enough increments on a single
        // key to push past it and trigger a reset.
        for _ in 0..200 {
            sketch.increment(99);
        }
        let freq_before_more = sketch.frequency(99);
        assert!(freq_before_more <= 15);
    }
}
