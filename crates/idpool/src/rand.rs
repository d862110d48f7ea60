use rand::{Rng, rng};

/// A trait for random sources that feed seed material into each ID candidate.
///
/// This abstraction allows you to plug in a real random source or a fixed
/// source in tests.
///
/// # Example
/// ```
/// use idpool::RandSource;
///
/// struct FixedRand;
/// impl RandSource for FixedRand {
///     fn rand_i63(&self) -> u64 {
///         1234
///     }
///     fn rand_f64(&self) -> f64 {
///         0.5
///     }
/// }
///
/// let rng = FixedRand;
/// assert_eq!(rng.rand_i63(), 1234);
/// ```
pub trait RandSource {
    /// Returns a random non-negative integer that fits in 63 bits.
    fn rand_i63(&self) -> u64;

    /// Returns a random float in `[0, 1)`.
    fn rand_f64(&self) -> f64;
}

/// A `RandSource` that uses the thread-local RNG (`rand::rng()`).
///
/// This RNG is fast, cryptographically secure (ChaCha-based), seeded from the
/// OS and automatically reseeded periodically. Each draw is independent of the
/// previous one.
///
/// This type does **not** store the RNG itself; it accesses the thread-local
/// generator on each call, so it is zero-sized and freely cloneable.
#[derive(Default, Clone, Copy, Debug)]
pub struct ThreadRandom;

impl RandSource for ThreadRandom {
    fn rand_i63(&self) -> u64 {
        rng().random::<u64>() >> 1
    }

    fn rand_f64(&self) -> f64 {
        rng().random()
    }
}
