use core::fmt::Write as _;

use sha2::{Digest, Sha256};

use crate::{
    base32,
    rand::{RandSource, ThreadRandom},
};

/// Default length of a generated ID.
pub const DEFAULT_ID_LEN: usize = 20;

/// Generates fixed-length, lowercase alphanumeric ID candidates.
///
/// Each round hashes seed material made of the generation counter, a random
/// 63-bit integer and a random float with SHA-256, encodes the digest as
/// base32 and keeps only `[a-z0-9]` after lowercasing. Rounds repeat until the
/// requested length is reached, so any length can be produced.
///
/// Candidates are *not* checked for uniqueness here. Pair the generator with a
/// [`BloomFilter`] to reject IDs that were already issued.
///
/// The generator owns its counter, so two generators never share state.
///
/// [`BloomFilter`]: crate::BloomFilter
#[derive(Debug, Clone)]
pub struct IdGenerator<R = ThreadRandom>
where
    R: RandSource,
{
    rng: R,
    counter: u64,
    seed: String,
}

impl Default for IdGenerator<ThreadRandom> {
    fn default() -> Self {
        Self::new(ThreadRandom)
    }
}

impl<R> IdGenerator<R>
where
    R: RandSource,
{
    /// Creates a new [`IdGenerator`] with its generation counter at zero.
    ///
    /// # Example
    /// ```
    /// use idpool::{IdGenerator, ThreadRandom};
    ///
    /// let mut generator = IdGenerator::new(ThreadRandom);
    /// let id = generator.generate(20);
    /// assert_eq!(id.len(), 20);
    /// ```
    pub const fn new(rng: R) -> Self {
        Self {
            rng,
            counter: 0,
            seed: String::new(),
        }
    }

    /// Number of [`Self::generate`] calls made so far.
    pub const fn counter(&self) -> u64 {
        self.counter
    }

    /// Generates a candidate ID of exactly `length` characters drawn from
    /// `[a-z0-9]`.
    ///
    /// Increments the generation counter once per call, however many digest
    /// rounds are needed to reach `length`.
    pub fn generate(&mut self, length: usize) -> String {
        let step = self.counter;
        self.counter = self.counter.wrapping_add(1);

        let mut id = String::with_capacity(length + base32::encoded_len(32));
        let mut encoded = String::with_capacity(base32::encoded_len(32));
        while id.len() < length {
            self.seed.clear();
            // Writing to a `String` cannot fail.
            let _ = write!(
                self.seed,
                "{step}.{}.{:.6}",
                self.rng.rand_i63(),
                self.rng.rand_f64()
            );
            let digest = Sha256::digest(self.seed.as_bytes());

            encoded.clear();
            base32::encode_into(&digest, &mut encoded);
            id.extend(
                encoded
                    .chars()
                    .filter(char::is_ascii_alphanumeric)
                    .map(|c| c.to_ascii_lowercase()),
            );
        }
        id.truncate(length);
        id
    }
}
