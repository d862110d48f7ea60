//! Watermark-driven replenishment of the ID queue.
//!
//! The [`Replenisher`] is a two-state machine:
//!
//! - **Idle-Check**: read the queue length. Below the low watermark it moves
//!   to Replenishing; otherwise it flushes the index if it is dirty and
//!   sleeps one interval.
//! - **Replenishing**: mint a batch of unused IDs and push them in small
//!   groups, then return to Idle-Check immediately so a deep backlog drains
//!   without sleeping.
//!
//! Each call to [`Replenisher::step`] performs one transition and reports the
//! delay the caller should wait, which keeps the failure handling testable
//! without a clock. [`Replenisher::run`] drives it forever.

mod policy;
#[cfg(test)]
mod tests;

pub use policy::*;

use core::time::Duration;

use crate::{
    BloomFilter, DEFAULT_ID_LEN, Error, IdGenerator, IndexFile, IndexHeader, LoadedIndex,
    QueueStore, Result,
    rand::{RandSource, ThreadRandom},
};

/// Queue length below which a batch is minted.
pub const DEFAULT_LOW_WATERMARK: u64 = 100;
/// IDs minted per replenishment.
pub const DEFAULT_BATCH_SIZE: usize = 10;
/// IDs pushed per queue command.
pub const DEFAULT_GROUP_SIZE: usize = 3;
/// Candidates drawn for one ID before giving up.
pub const DEFAULT_MAX_ATTEMPTS: usize = 1000;

/// Returns the default queue key for IDs of `id_len` characters.
pub fn default_key(id_len: usize) -> String {
    format!("guid-{id_len}")
}

/// Settings for a [`Replenisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplenishConfig {
    /// Queue key the IDs are pushed to.
    pub key: String,
    /// Length of each ID.
    pub id_len: usize,
    pub low_watermark: u64,
    pub batch_size: usize,
    /// Upper bound on values per push. The last group of a batch shrinks to
    /// the remaining count.
    pub group_size: usize,
    /// Retry cap per ID. Exceeding it means the ID space is effectively
    /// exhausted for the current index.
    pub max_attempts: usize,
    pub retry: RetryPolicy,
}

impl Default for ReplenishConfig {
    fn default() -> Self {
        Self {
            key: default_key(DEFAULT_ID_LEN),
            id_len: DEFAULT_ID_LEN,
            low_watermark: DEFAULT_LOW_WATERMARK,
            batch_size: DEFAULT_BATCH_SIZE,
            group_size: DEFAULT_GROUP_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of a single [`Replenisher::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The queue was below the watermark and `pushed` IDs were added. The
    /// next step should follow immediately.
    Replenished { pushed: usize },
    /// The queue was stocked. `flushed` reports whether the index was written
    /// during this step.
    Idle { flushed: bool, delay: Duration },
    /// The queue failed or no unused ID could be found. Wait `delay` before
    /// retrying.
    Backoff { delay: Duration },
}

impl Step {
    /// How long to wait before the next step.
    pub const fn delay(&self) -> Duration {
        match self {
            Self::Replenished { .. } => Duration::ZERO,
            Self::Idle { delay, .. } | Self::Backoff { delay } => *delay,
        }
    }
}

/// Keeps a queue stocked with IDs that have never been issued before.
///
/// Owns the generator, the in-memory index and its dirty flag. The index is
/// only written to disk while the queue is stocked, so a burst of
/// replenishments costs a single flush.
pub struct Replenisher<Q, R = ThreadRandom>
where
    Q: QueueStore,
    R: RandSource,
{
    config: ReplenishConfig,
    queue: Q,
    generator: IdGenerator<R>,
    index: IndexFile,
    header: IndexHeader,
    filter: BloomFilter,
    dirty: bool,
    failures: u32,
}

impl<Q, R> Replenisher<Q, R>
where
    Q: QueueStore,
    R: RandSource,
{
    /// Creates a new [`Replenisher`] over an index already loaded from
    /// `index`.
    pub fn new(
        config: ReplenishConfig,
        queue: Q,
        generator: IdGenerator<R>,
        index: IndexFile,
        loaded: LoadedIndex,
    ) -> Self {
        Self {
            config,
            queue,
            generator,
            index,
            header: loaded.header,
            filter: loaded.filter,
            dirty: false,
            failures: 0,
        }
    }

    pub const fn config(&self) -> &ReplenishConfig {
        &self.config
    }

    pub const fn queue(&self) -> &Q {
        &self.queue
    }

    pub const fn queue_mut(&mut self) -> &mut Q {
        &mut self.queue
    }

    pub const fn filter(&self) -> &BloomFilter {
        &self.filter
    }

    /// Whether the index has additions that are not yet on disk.
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Runs the state machine forever, sleeping between steps as directed.
    pub fn run(&mut self) -> ! {
        #[cfg(feature = "tracing")]
        tracing::info!("Starting watch loop for \"{}\"", self.config.key);
        loop {
            let delay = self.step().delay();
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
    }

    /// Performs one transition of the state machine.
    pub fn step(&mut self) -> Step {
        let len = match self.queue.length(&self.config.key) {
            Ok(len) => len,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Queue error: {_e}");
                return self.backoff();
            }
        };

        if len < self.config.low_watermark {
            #[cfg(feature = "tracing")]
            tracing::info!(
                "count(\"{}\")={len} < {}, generating {} ids",
                self.config.key,
                self.config.low_watermark,
                self.config.batch_size
            );
            return match self.replenish(self.config.batch_size) {
                Ok(pushed) => {
                    self.failures = 0;
                    Step::Replenished { pushed }
                }
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Replenishment failed: {_e}");
                    self.backoff()
                }
            };
        }

        self.failures = 0;
        let flushed = self.dirty && self.try_flush();
        Step::Idle {
            flushed,
            delay: self.config.retry.interval,
        }
    }

    /// Mints `count` unused IDs and pushes them to the queue in groups of at
    /// most `group_size`. Returns the number of IDs pushed.
    ///
    /// # Errors
    ///
    /// Stops at the first push failure or [`Error::CapacityExhausted`]. IDs
    /// already recorded in the index but not pushed are never issued.
    pub fn replenish(&mut self, count: usize) -> Result<usize> {
        let group_size = self.config.group_size.max(1);
        let mut pushed = 0;
        while pushed < count {
            let group = self.mint(group_size.min(count - pushed))?;
            self.queue.push(&self.config.key, &group)?;
            pushed += group.len();
        }
        Ok(pushed)
    }

    /// Mints `count` IDs that the index has never seen and records them,
    /// without pushing them anywhere.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExhausted`] if a single ID needs more than
    /// `max_attempts` candidates.
    pub fn mint(&mut self, count: usize) -> Result<Vec<String>> {
        (0..count).map(|_| self.mint_one()).collect()
    }

    /// Writes the index to disk and clears the dirty flag.
    ///
    /// # Errors
    ///
    /// Returns the persistence error; the dirty flag stays set.
    pub fn flush(&mut self) -> Result<()> {
        self.index.flush(&self.header, &self.filter)?;
        self.dirty = false;
        Ok(())
    }

    fn mint_one(&mut self) -> Result<String> {
        for _ in 0..self.config.max_attempts.max(1) {
            let id = self.generator.generate(self.config.id_len);
            if self.filter.test(&id) {
                #[cfg(feature = "tracing")]
                tracing::debug!("Rejected candidate {id}: already in index");
                continue;
            }
            self.filter.add(&id);
            self.dirty = true;
            return Ok(id);
        }
        Err(Error::CapacityExhausted {
            attempts: self.config.max_attempts.max(1),
        })
    }

    fn try_flush(&mut self) -> bool {
        match self.flush() {
            Ok(()) => true,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Write error for {}: {_e}", self.index.path().display());
                false
            }
        }
    }

    fn backoff(&mut self) -> Step {
        self.failures = self.failures.saturating_add(1);
        Step::Backoff {
            delay: self.config.retry.backoff(self.failures),
        }
    }
}
