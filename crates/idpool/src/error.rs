//! Error types for the ID pool.
//!
//! This module defines the central `Error` enum, which captures every
//! reportable failure in the pool. Whether an error is fatal depends on where
//! it surfaces:
//!
//! ## Error Cases
//! - `Config`: Missing or invalid configuration. Always fatal.
//! - `Io`, `HeaderJson`, `InvalidHeader`, `HeaderTooLarge`, `FilterDecode`:
//!   Index file failures. Reads degrade to an empty or freshly sized index,
//!   writes leave the previous file in place.
//! - `CapacityExhausted`: No unused ID could be found within the retry cap.
//! - `Queue`, `Redis`: The external queue rejected a command. Transient inside
//!   the replenishment loop.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the ID pool.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Configuration was missing or invalid.
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// Reading or writing the index file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The index header did not contain valid JSON.
    #[error("Header decode error: {0}")]
    HeaderJson(#[from] serde_json::Error),

    /// The index header was structurally invalid.
    #[error("Invalid header: {reason}")]
    InvalidHeader { reason: String },

    /// The encoded header does not fit in the reserved header region.
    #[error("Header too large: {len} bytes")]
    HeaderTooLarge { len: usize },

    /// The serialized filter state could not be restored.
    #[error("Filter decode error: {reason}")]
    FilterDecode { reason: String },

    /// Every candidate drawn for a single ID was already in the index.
    #[error("No unused ID found after {attempts} attempts")]
    CapacityExhausted { attempts: usize },

    /// The queue store rejected a command.
    #[error("Queue error: {context}")]
    Queue { context: String },

    /// The Redis client returned an error.
    #[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl Error {
    /// Returns `true` for failures that the replenishment loop should retry
    /// after backing off instead of terminating.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Queue { .. } | Self::CapacityExhausted { .. } => true,
            #[cfg(feature = "redis")]
            Self::Redis(_) => true,
            _ => false,
        }
    }
}
