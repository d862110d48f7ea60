use anyhow::bail;
use clap::{Args, Parser, Subcommand};
use core::time::Duration;
use idpool::{
    DEFAULT_BATCH_SIZE, DEFAULT_GROUP_SIZE, DEFAULT_ID_LEN, DEFAULT_LOW_WATERMARK,
    DEFAULT_MAX_ATTEMPTS, MIN_ID_LEN, ReplenishConfig, RetryPolicy, default_key,
};
use std::path::PathBuf;

/// Command-line interface of the `idpool` binary.
///
/// Every option can also be supplied through its `IDPOOL_*` environment
/// variable or a `.env` file in the working directory.
#[derive(Parser, Debug)]
#[command(
    name = "idpool",
    version,
    about = "Keeps a Redis list stocked with random IDs that are never issued twice",
    arg_required_else_help = true
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the replenishment service.
    Start(StartArgs),
    /// Load or create the index file, optionally importing IDs from a file.
    Import(ImportArgs),
    /// Print the first IDs queued in Redis.
    Top(RedisArgs),
    /// Truncate the ID list in Redis.
    ClearRedis(RedisArgs),
    /// Test whether an ID is recorded in the index.
    Has(HasArgs),
}

/// Connection settings for the Redis list.
#[derive(Args, Debug, Clone)]
pub struct RedisArgs {
    /// Redis server address (`host:port`).
    ///
    /// Environment variable: `IDPOOL_REDIS`
    #[arg(long, env = "IDPOOL_REDIS", default_value = "127.0.0.1:6379")]
    pub redis: String,

    /// Redis password. Empty means no authentication.
    ///
    /// Environment variable: `IDPOOL_REDIS_PASSWORD`
    #[arg(long, env = "IDPOOL_REDIS_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Redis list key holding the IDs. Defaults to `guid-<idlen>`.
    ///
    /// Environment variable: `IDPOOL_KEY`
    #[arg(long, env = "IDPOOL_KEY")]
    pub key: Option<String>,
}

/// Location of the index file.
#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    /// Bloom filter index file.
    ///
    /// Environment variable: `IDPOOL_INDEX`
    #[arg(long, env = "IDPOOL_INDEX", default_value = "guid.idx")]
    pub index: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct StartArgs {
    #[command(flatten)]
    pub redis: RedisArgs,

    #[command(flatten)]
    pub index: IndexArgs,

    /// ID length. Also sizes a newly created index.
    ///
    /// Environment variable: `IDPOOL_IDLEN`
    #[arg(long, env = "IDPOOL_IDLEN", default_value_t = DEFAULT_ID_LEN)]
    pub idlen: usize,

    /// Queue length below which a new batch is minted.
    ///
    /// Environment variable: `IDPOOL_LOW_WATERMARK`
    #[arg(long, env = "IDPOOL_LOW_WATERMARK", default_value_t = DEFAULT_LOW_WATERMARK)]
    pub low_watermark: u64,

    /// IDs minted per replenishment.
    ///
    /// Environment variable: `IDPOOL_BATCH_SIZE`
    #[arg(long, env = "IDPOOL_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Maximum IDs pushed per Redis command.
    ///
    /// Environment variable: `IDPOOL_GROUP_SIZE`
    #[arg(long, env = "IDPOOL_GROUP_SIZE", default_value_t = DEFAULT_GROUP_SIZE)]
    pub group_size: usize,

    /// Polling interval in milliseconds.
    ///
    /// Environment variable: `IDPOOL_INTERVAL_MS`
    #[arg(long, env = "IDPOOL_INTERVAL_MS", default_value_t = 1000)]
    pub interval_ms: u64,

    /// Longest wait between retries after consecutive Redis errors, in
    /// milliseconds. Equal to the interval by default (no growth).
    ///
    /// Environment variable: `IDPOOL_MAX_BACKOFF_MS`
    #[arg(long, env = "IDPOOL_MAX_BACKOFF_MS", default_value_t = 1000)]
    pub max_backoff_ms: u64,

    /// Candidates drawn for a single ID before the index is reported as
    /// exhausted.
    ///
    /// Environment variable: `IDPOOL_MAX_ATTEMPTS`
    #[arg(long, env = "IDPOOL_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    #[command(flatten)]
    pub index: IndexArgs,

    /// ID length used to size the index if it does not exist yet.
    ///
    /// Environment variable: `IDPOOL_IDLEN`
    #[arg(long, env = "IDPOOL_IDLEN")]
    pub idlen: Option<usize>,

    /// File with one ID per line to record in the index.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct HasArgs {
    #[command(flatten)]
    pub index: IndexArgs,

    /// ID to look up.
    pub value: String,
}

/// Where and how to reach the Redis list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisTarget {
    pub addr: String,
    pub password: Option<String>,
    pub key: String,
}

impl RedisArgs {
    /// Resolves the key, defaulting to `guid-<id_len>`.
    pub fn into_target(self, id_len: usize) -> RedisTarget {
        RedisTarget {
            addr: self.redis,
            password: Some(self.password).filter(|p| !p.is_empty()),
            key: self.key.unwrap_or_else(|| default_key(id_len)),
        }
    }
}

/// Validated configuration for the `start` command.
#[derive(Debug, Clone)]
pub struct StartConfig {
    pub target: RedisTarget,
    pub index: PathBuf,
    pub replenish: ReplenishConfig,
}

impl TryFrom<StartArgs> for StartConfig {
    type Error = anyhow::Error;

    fn try_from(args: StartArgs) -> Result<Self, Self::Error> {
        if args.idlen < MIN_ID_LEN {
            bail!("IDLEN must be at least {MIN_ID_LEN} (got {})", args.idlen);
        }
        if args.batch_size == 0 {
            bail!("BATCH_SIZE must be greater than 0");
        }
        if args.group_size == 0 {
            bail!("GROUP_SIZE must be greater than 0");
        }
        if args.max_attempts == 0 {
            bail!("MAX_ATTEMPTS must be greater than 0");
        }
        if args.interval_ms == 0 {
            bail!("INTERVAL_MS must be greater than 0");
        }

        let target = args.redis.into_target(args.idlen);
        Ok(Self {
            replenish: ReplenishConfig {
                key: target.key.clone(),
                id_len: args.idlen,
                low_watermark: args.low_watermark,
                batch_size: args.batch_size,
                group_size: args.group_size,
                max_attempts: args.max_attempts,
                retry: RetryPolicy::new(
                    Duration::from_millis(args.interval_ms),
                    Duration::from_millis(args.max_backoff_ms),
                ),
            },
            target,
            index: args.index.index,
        })
    }
}
