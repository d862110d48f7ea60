//! Command implementations.
//!
//! Each command resolves its configuration, performs its work and returns an
//! [`anyhow::Result`]; `main` turns an error into exit code 1. Commands that
//! print take a writer so they can be exercised against an in-memory queue.

use crate::server::config::{
    Command, HasArgs, ImportArgs, RedisArgs, RedisTarget, StartArgs, StartConfig,
};
use anyhow::Context;
use idpool::{
    BloomFilter, DEFAULT_ID_LEN, IdGenerator, IndexFile, LoadState, LoadedIndex, QueueStore,
    RedisQueue, Replenisher,
};
use std::{
    fs::File,
    io::{BufRead, BufReader, Write},
    path::Path,
};

/// Last index (inclusive) printed by `top`.
const TOP_STOP: i64 = 10;

pub fn dispatch(command: Command) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match command {
        Command::Start(args) => start(args),
        Command::Import(args) => import(&args, &mut out),
        Command::Top(args) => {
            let target = args.into_target(DEFAULT_ID_LEN);
            top(&mut connect(&target)?, &target.key, &mut out)
        }
        Command::ClearRedis(args) => clear_redis(args),
        Command::Has(args) => has(&args, &mut out),
    }
}

/// Loads the index, connects to Redis and runs the replenishment loop until
/// the process is terminated.
fn start(args: StartArgs) -> anyhow::Result<()> {
    let config = StartConfig::try_from(args)?;
    tracing::info!(
        "redis={}, idlen={}, key=\"{}\"",
        config.target.addr,
        config.replenish.id_len,
        config.target.key
    );

    let index = IndexFile::new(&config.index);
    let loaded = load(&index, Some(config.replenish.id_len))?;
    if loaded.state == LoadState::Degraded {
        tracing::warn!(
            "Index {} could not be restored; IDs issued before this run may be reissued",
            config.index.display()
        );
    }

    let mut queue = connect(&config.target)?;
    queue
        .ping()
        .with_context(|| format!("redis at {} did not answer PING", config.target.addr))?;
    tracing::info!(
        "redis connected, starting watch loop for \"{}\"",
        config.target.key
    );

    Replenisher::new(
        config.replenish,
        queue,
        IdGenerator::default(),
        index,
        loaded,
    )
    .run()
}

/// Loads or creates the index and records every ID listed in `--file`.
///
/// The index is written back when it was just created or gained IDs.
fn import(args: &ImportArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let index = IndexFile::new(&args.index.index);
    let LoadedIndex {
        header,
        mut filter,
        state,
    } = load(&index, args.idlen)?;

    let imported = match &args.file {
        Some(path) => import_lines(path, &mut filter)?,
        None => 0,
    };

    if state == LoadState::Created || imported > 0 {
        index
            .flush(&header, &filter)
            .with_context(|| format!("failed to write {}", index.path().display()))?;
    }

    writeln!(
        out,
        "{}: {imported} ids imported (n={}, k={})",
        index.path().display(),
        header.filter_n,
        header.filter_k
    )?;
    Ok(())
}

fn import_lines(path: &Path, filter: &mut BloomFilter) -> anyhow::Result<usize> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut imported = 0;
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        let id = line.trim();
        if id.is_empty() || filter.test(id) {
            continue;
        }
        filter.add(id);
        imported += 1;
    }
    tracing::info!("Imported {imported} ids from {}", path.display());
    Ok(imported)
}

/// Prints up to the first eleven queued IDs, one per line.
fn top(queue: &mut impl QueueStore, key: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let ids = queue
        .range(key, 0, TOP_STOP)
        .with_context(|| format!("failed to read \"{key}\""))?;
    for id in ids {
        writeln!(out, "{id}")?;
    }
    Ok(())
}

fn clear_redis(args: RedisArgs) -> anyhow::Result<()> {
    let target = args.into_target(DEFAULT_ID_LEN);
    clear(&mut connect(&target)?, &target.key)
}

/// Empties the list under `key`.
fn clear(queue: &mut impl QueueStore, key: &str) -> anyhow::Result<()> {
    queue
        .truncate(key, 1, 0)
        .with_context(|| format!("failed to truncate \"{key}\""))?;
    tracing::info!("Truncated \"{key}\"");
    Ok(())
}

/// Reports whether the value is recorded in the index. Presence is not an
/// error either way.
fn has(args: &HasArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let index = IndexFile::new(&args.index.index);
    let loaded = load(&index, None)?;
    writeln!(out, "{}", membership_report(&loaded.filter, &args.value))?;
    Ok(())
}

fn membership_report(filter: &BloomFilter, value: &str) -> String {
    if filter.test(value) {
        format!("{value} exists")
    } else {
        format!("{value} not found")
    }
}

fn load(index: &IndexFile, id_len: Option<usize>) -> anyhow::Result<LoadedIndex> {
    index
        .load(id_len)
        .with_context(|| format!("failed to load index {}", index.path().display()))
}

fn connect(target: &RedisTarget) -> anyhow::Result<RedisQueue> {
    RedisQueue::connect(&target.addr, target.password.as_deref())
        .with_context(|| format!("failed to connect to redis at {}", target.addr))
}
