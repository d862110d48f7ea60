//! Bloom filter used as the membership index of issued IDs.
//!
//! The filter is sized by two numbers that are persisted in the index header:
//! `n`, the length of the bit array, and `k`, the number of hash rounds. Bit
//! positions are derived by double hashing a 128-bit xxh3 digest of the ID.

use xxhash_rust::xxh3::xxh3_128;

use crate::{Error, Result};

/// Default number of hash rounds.
pub const DEFAULT_HASH_ROUNDS: u64 = 10;

/// Bits reserved per expected item when inferring the filter size.
pub const BITS_PER_ITEM: u64 = 20;

/// Ceiling on the number of expected items used when inferring the filter
/// size, which bounds memory regardless of the ID length.
pub const MAX_EXPECTED_ITEMS: u64 = 100_000_000;

/// Largest bit array an index header may describe.
pub const MAX_FILTER_BITS: u64 = BITS_PER_ITEM * MAX_EXPECTED_ITEMS;

/// Largest number of hash rounds an index header may describe.
pub const MAX_HASH_ROUNDS: u64 = 64;

/// Size of the ID alphabet, `[a-z0-9]`.
const ALPHABET_SIZE: u64 = 36;

/// `n`, `k` and the word count prefix the serialized state.
const STATE_PREFIX_LEN: usize = 3 * size_of::<u64>();

/// Returns the default bit array length for IDs of `id_len` characters:
/// `20 * min(36^id_len, 100_000_000)`.
///
/// # Example
/// ```
/// use idpool::default_filter_bits;
///
/// assert_eq!(default_filter_bits(2), 25_920);
/// assert_eq!(default_filter_bits(20), 2_000_000_000);
/// ```
pub fn default_filter_bits(id_len: usize) -> u64 {
    let space = u32::try_from(id_len)
        .ok()
        .and_then(|exp| ALPHABET_SIZE.checked_pow(exp))
        .unwrap_or(u64::MAX);
    BITS_PER_ITEM * space.min(MAX_EXPECTED_ITEMS)
}

/// A fixed-size Bloom filter over string IDs.
///
/// - `test` never returns a false negative for an added ID.
/// - `add` is idempotent.
/// - Memory is fixed at construction (`n` bits) and independent of the number
///   of items added.
#[derive(Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u64>,
    n: u64,
    k: u64,
}

impl core::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("n", &self.n)
            .field("k", &self.k)
            .field("ones", &self.count_ones())
            .finish()
    }
}

impl BloomFilter {
    /// Creates an empty filter with `n` bits and `k` hash rounds. Both are
    /// raised to at least one.
    pub fn new(n: u64, k: u64) -> Self {
        let n = n.max(1);
        let k = k.max(1);
        Self {
            bits: vec![0; words_for(n)],
            n,
            k,
        }
    }

    /// Length of the bit array.
    pub const fn len_bits(&self) -> u64 {
        self.n
    }

    /// Number of hash rounds per ID.
    pub const fn hash_rounds(&self) -> u64 {
        self.k
    }

    /// Number of bits currently set.
    pub fn count_ones(&self) -> u64 {
        self.bits.iter().map(|w| u64::from(w.count_ones())).sum()
    }

    /// Records `id`.
    pub fn add(&mut self, id: &str) {
        let (h1, h2) = hash_pair(id);
        for i in 0..self.k {
            let bit = self.position(h1, h2, i);
            self.bits[(bit / 64) as usize] |= 1 << (bit % 64);
        }
    }

    /// Returns `true` if `id` may have been added, `false` if it definitely
    /// was not.
    pub fn test(&self, id: &str) -> bool {
        let (h1, h2) = hash_pair(id);
        (0..self.k).all(|i| {
            let bit = self.position(h1, h2, i);
            self.bits[(bit / 64) as usize] & (1 << (bit % 64)) != 0
        })
    }

    /// Estimated false-positive rate after `items` distinct insertions:
    /// `(1 - e^(-k * items / n))^k`.
    #[allow(clippy::cast_precision_loss)]
    pub fn estimated_fp_rate(&self, items: u64) -> f64 {
        let k = self.k as f64;
        let fill = 1.0 - (-k * items as f64 / self.n as f64).exp();
        fill.powf(k)
    }

    /// Serializes the filter state.
    ///
    /// Layout (little-endian): `n: u64 | k: u64 | words: u64 | words * u64`.
    pub fn encode_state(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(STATE_PREFIX_LEN + self.bits.len() * 8);
        out.extend_from_slice(&self.n.to_le_bytes());
        out.extend_from_slice(&self.k.to_le_bytes());
        out.extend_from_slice(&(self.bits.len() as u64).to_le_bytes());
        for word in &self.bits {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Restores a filter from [`Self::encode_state`] output, requiring that
    /// it was sized with exactly `n` bits and `k` rounds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FilterDecode`] when the input is truncated, has
    /// trailing bytes, or its sizing disagrees with `n` and `k`.
    pub fn from_state(n: u64, k: u64, state: &[u8]) -> Result<Self> {
        let (n, k) = (n.max(1), k.max(1));
        let expected_words = words_for(n);
        let (prefix, body) = state
            .split_at_checked(STATE_PREFIX_LEN)
            .ok_or_else(|| decode_error(format!("state too short: {} bytes", state.len())))?;

        let mut fields = prefix.chunks_exact(8).map(read_u64);
        let (state_n, state_k, words) = match (fields.next(), fields.next(), fields.next()) {
            (Some(n), Some(k), Some(w)) => (n, k, w),
            _ => return Err(decode_error("state prefix incomplete".into())),
        };

        if state_n != n || state_k != k {
            return Err(decode_error(format!(
                "sizing mismatch: state has n={state_n}, k={state_k}; header has n={n}, k={k}"
            )));
        }
        if words != expected_words as u64
            || Some(body.len()) != expected_words.checked_mul(size_of::<u64>())
        {
            return Err(decode_error(format!(
                "expected {expected_words} words, found {words} words in {} bytes",
                body.len()
            )));
        }

        Ok(Self {
            bits: body.chunks_exact(8).map(read_u64).collect(),
            n,
            k,
        })
    }

    #[inline]
    const fn position(&self, h1: u64, h2: u64, round: u64) -> u64 {
        h1.wrapping_add(round.wrapping_mul(h2)) % self.n
    }
}

fn words_for(n: u64) -> usize {
    usize::try_from(n.div_ceil(64)).unwrap_or(usize::MAX)
}

/// Splits the 128-bit digest into the two double-hashing bases. The second
/// base is forced odd so it is never zero.
fn hash_pair(id: &str) -> (u64, u64) {
    let h = xxh3_128(id.as_bytes());
    (h as u64, ((h >> 64) as u64) | 1)
}

fn read_u64(chunk: &[u8]) -> u64 {
    let mut buf = [0_u8; 8];
    buf.copy_from_slice(chunk);
    u64::from_le_bytes(buf)
}

fn decode_error(reason: String) -> Error {
    Error::FilterDecode { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IdGenerator;

    #[test]
    fn default_sizing_scales_with_id_space() {
        assert_eq!(default_filter_bits(1), 720);
        assert_eq!(default_filter_bits(2), 25_920);
        assert_eq!(default_filter_bits(5), 20 * 60_466_176);
    }

    #[test]
    fn default_sizing_is_clamped() {
        assert_eq!(default_filter_bits(6), 2_000_000_000);
        assert_eq!(default_filter_bits(20), 2_000_000_000);
        assert_eq!(default_filter_bits(usize::MAX), 2_000_000_000);
    }

    #[test]
    fn added_ids_are_always_found() {
        let mut filter = BloomFilter::new(64 * 1024, DEFAULT_HASH_ROUNDS);
        let mut generator = IdGenerator::default();
        let ids: Vec<String> = (0..1000).map(|_| generator.generate(20)).collect();
        for id in &ids {
            filter.add(id);
        }
        for id in &ids {
            assert!(filter.test(id), "false negative for {id}");
        }
    }

    #[test]
    fn add_is_idempotent() {
        let mut filter = BloomFilter::new(25_920, DEFAULT_HASH_ROUNDS);
        filter.add("abc123");
        let ones = filter.count_ones();
        filter.add("abc123");
        assert!(filter.test("abc123"));
        assert_eq!(filter.count_ones(), ones);
    }

    #[test]
    fn empty_filter_contains_nothing() {
        let filter = BloomFilter::new(1024, 4);
        assert!(!filter.test("abc123"));
        assert!(!filter.test(""));
        assert_eq!(filter.count_ones(), 0);
    }

    #[test]
    fn zero_sizing_is_raised_to_one() {
        let mut filter = BloomFilter::new(0, 0);
        assert_eq!(filter.len_bits(), 1);
        assert_eq!(filter.hash_rounds(), 1);
        filter.add("x");
        assert!(filter.test("y"));
    }

    #[test]
    fn false_positive_rate_stays_near_estimate() {
        let items = 2_000;
        let mut filter = BloomFilter::new(BITS_PER_ITEM * items, DEFAULT_HASH_ROUNDS);
        let mut generator = IdGenerator::default();
        for _ in 0..items {
            filter.add(&generator.generate(20));
        }
        let probes = 20_000;
        let hits = (0..probes)
            .filter(|_| filter.test(&generator.generate(20)))
            .count();
        // Estimate is ~9e-5; allow generous slack for a small sample.
        assert!(filter.estimated_fp_rate(items) < 1e-3);
        assert!(hits < 20, "{hits} false positives in {probes} probes");
    }

    #[test]
    fn state_restores_membership() {
        let mut filter = BloomFilter::new(10_000, 7);
        for id in ["a", "bb", "ccc", "abc123"] {
            filter.add(id);
        }
        let state = filter.encode_state();
        let restored = BloomFilter::from_state(10_000, 7, &state).unwrap();
        assert_eq!(restored, filter);
        assert!(restored.test("abc123"));
    }

    #[test]
    fn state_with_other_sizing_is_rejected() {
        let state = BloomFilter::new(10_000, 7).encode_state();
        let err = BloomFilter::from_state(10_000, 8, &state).unwrap_err();
        assert!(matches!(err, Error::FilterDecode { .. }));
        let err = BloomFilter::from_state(20_000, 7, &state).unwrap_err();
        assert!(matches!(err, Error::FilterDecode { .. }));
    }

    #[test]
    fn truncated_or_padded_state_is_rejected() {
        let state = BloomFilter::new(1_000, 3).encode_state();
        assert!(BloomFilter::from_state(1_000, 3, &state[..state.len() - 1]).is_err());
        assert!(BloomFilter::from_state(1_000, 3, &state[..10]).is_err());
        assert!(BloomFilter::from_state(1_000, 3, &[]).is_err());

        let mut padded = state;
        padded.push(0);
        assert!(BloomFilter::from_state(1_000, 3, &padded).is_err());
    }

    #[test]
    fn state_for_huge_sizing_is_rejected_without_allocating() {
        let mut state = Vec::new();
        for field in [u64::MAX, 10, u64::MAX / 64] {
            state.extend_from_slice(&field.to_le_bytes());
        }
        let err = BloomFilter::from_state(u64::MAX, 10, &state).unwrap_err();
        assert!(matches!(err, Error::FilterDecode { .. }));
    }
}
