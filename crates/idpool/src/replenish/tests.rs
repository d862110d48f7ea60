use super::*;
use crate::{LoadState, MemoryQueue, RandSource};
use std::collections::HashSet;
use tempfile::TempDir;

const KEY: &str = "guid-20";

struct FixedRand;

impl RandSource for FixedRand {
    fn rand_i63(&self) -> u64 {
        7
    }
    fn rand_f64(&self) -> f64 {
        0.125
    }
}

/// Records the size of every push so group boundaries can be asserted.
#[derive(Default)]
struct RecordingQueue {
    inner: MemoryQueue,
    pushes: Vec<usize>,
    fail_pushes_after: Option<usize>,
}

impl QueueStore for RecordingQueue {
    fn length(&mut self, key: &str) -> Result<u64> {
        self.inner.length(key)
    }

    fn push(&mut self, key: &str, values: &[String]) -> Result<()> {
        if self.fail_pushes_after == Some(self.pushes.len()) {
            return Err(Error::Queue {
                context: "push refused".into(),
            });
        }
        self.pushes.push(values.len());
        self.inner.push(key, values)
    }

    fn range(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.inner.range(key, start, stop)
    }

    fn truncate(&mut self, key: &str, start: i64, stop: i64) -> Result<()> {
        self.inner.truncate(key, start, stop)
    }
}

fn small_header() -> IndexHeader {
    IndexHeader {
        filter_n: 1 << 16,
        filter_k: 10,
    }
}

fn config() -> ReplenishConfig {
    ReplenishConfig {
        key: KEY.to_owned(),
        retry: RetryPolicy::new(Duration::from_millis(10), Duration::from_millis(40)),
        ..ReplenishConfig::default()
    }
}

fn fresh_index(dir: &TempDir) -> (IndexFile, LoadedIndex) {
    let index = IndexFile::new(dir.path().join("guid.idx"));
    let header = small_header();
    let loaded = LoadedIndex {
        filter: header.new_filter(),
        header,
        state: LoadState::Created,
    };
    (index, loaded)
}

fn replenisher<Q: QueueStore>(dir: &TempDir, queue: Q) -> Replenisher<Q> {
    let (index, loaded) = fresh_index(dir);
    Replenisher::new(config(), queue, IdGenerator::default(), index, loaded)
}

fn prefill(queue: &mut impl QueueStore, count: usize) -> Vec<String> {
    let mut generator = IdGenerator::default();
    let ids: Vec<String> = (0..count).map(|_| generator.generate(20)).collect();
    queue.push(KEY, &ids).unwrap();
    ids
}

#[test]
fn below_watermark_pushes_exactly_one_batch() {
    let dir = TempDir::new().unwrap();
    let mut queue = RecordingQueue::default();
    let existing = prefill(&mut queue, 50);
    queue.pushes.clear();

    let mut replenisher = replenisher(&dir, queue);
    for id in &existing {
        replenisher.filter.add(id);
    }

    assert_eq!(replenisher.step(), Step::Replenished { pushed: 10 });

    let queue = replenisher.queue();
    assert_eq!(queue.pushes, [3, 3, 3, 1]);
    let values = queue.inner.values(KEY);
    assert_eq!(values.len(), 60);
    assert_eq!(&values[..50], existing.as_slice());

    let before: HashSet<&String> = existing.iter().collect();
    let minted: HashSet<&String> = values[50..].iter().collect();
    assert_eq!(minted.len(), 10);
    assert!(minted.is_disjoint(&before));
    for id in &minted {
        assert_eq!(id.len(), 20);
        assert!(replenisher.filter().test(id));
    }
    assert!(replenisher.is_dirty());
}

#[test]
fn stocked_clean_queue_idles_without_flushing() {
    let dir = TempDir::new().unwrap();
    let mut queue = MemoryQueue::new();
    prefill(&mut queue, 100);

    let mut replenisher = replenisher(&dir, queue);
    assert_eq!(
        replenisher.step(),
        Step::Idle {
            flushed: false,
            delay: Duration::from_millis(10),
        }
    );
    assert!(!replenisher.index.path().exists());
}

#[test]
fn idle_step_flushes_dirty_index() {
    let dir = TempDir::new().unwrap();
    let mut replenisher = replenisher(&dir, MemoryQueue::new());

    while let Step::Replenished { .. } = replenisher.step() {}
    assert!(!replenisher.is_dirty());

    let issued = replenisher.queue().values(KEY);
    assert_eq!(issued.len(), 100);

    let loaded = IndexFile::new(dir.path().join("guid.idx"))
        .load(None)
        .unwrap();
    assert_eq!(loaded.state, LoadState::Restored);
    assert_eq!(loaded.header, small_header());
    for id in &issued {
        assert!(loaded.filter.test(id), "{id} missing after flush");
    }
}

#[test]
fn deep_backlog_drains_without_sleeping() {
    let dir = TempDir::new().unwrap();
    let mut replenisher = replenisher(&dir, MemoryQueue::new());

    let mut steps = Vec::new();
    loop {
        let step = replenisher.step();
        steps.push(step);
        if !matches!(step, Step::Replenished { .. }) {
            break;
        }
    }

    assert_eq!(steps.len(), 11);
    assert!(
        steps[..10]
            .iter()
            .all(|s| *s == Step::Replenished { pushed: 10 } && s.delay().is_zero())
    );
    assert!(matches!(steps[10], Step::Idle { flushed: true, .. }));
}

#[test]
fn queue_errors_back_off_and_recover() {
    let dir = TempDir::new().unwrap();
    let mut queue = MemoryQueue::new();
    queue.set_offline(true);
    let mut replenisher = replenisher(&dir, queue);

    let delays: Vec<Duration> = (0..4).map(|_| replenisher.step().delay()).collect();
    assert_eq!(
        delays,
        [10, 20, 40, 40].map(Duration::from_millis).to_vec()
    );
    assert!(!replenisher.is_dirty());

    replenisher.queue_mut().set_offline(false);
    assert_eq!(replenisher.step(), Step::Replenished { pushed: 10 });

    replenisher.queue_mut().set_offline(true);
    assert_eq!(
        replenisher.step(),
        Step::Backoff {
            delay: Duration::from_millis(10)
        }
    );
}

#[test]
fn failed_flush_keeps_dirty_flag() {
    let dir = TempDir::new().unwrap();
    let (_, loaded) = fresh_index(&dir);
    let index = IndexFile::new(dir.path().join("missing").join("guid.idx"));
    let mut queue = MemoryQueue::new();
    prefill(&mut queue, 100);
    let mut replenisher =
        Replenisher::new(config(), queue, IdGenerator::default(), index, loaded);

    replenisher.mint(1).unwrap();
    assert!(replenisher.is_dirty());

    assert!(matches!(
        replenisher.step(),
        Step::Idle { flushed: false, .. }
    ));
    assert!(replenisher.is_dirty());
}

#[test]
fn push_failure_burns_recorded_ids() {
    let dir = TempDir::new().unwrap();
    let queue = RecordingQueue {
        fail_pushes_after: Some(1),
        ..RecordingQueue::default()
    };
    let mut replenisher = replenisher(&dir, queue);

    assert!(matches!(replenisher.step(), Step::Backoff { .. }));
    assert_eq!(replenisher.queue().pushes, [3]);
    assert_eq!(replenisher.queue().inner.values(KEY).len(), 3);
    assert!(replenisher.is_dirty());
}

#[test]
fn saturated_index_reports_capacity_exhaustion() {
    let dir = TempDir::new().unwrap();
    let index = IndexFile::new(dir.path().join("guid.idx"));
    let header = IndexHeader {
        filter_n: 1,
        filter_k: 1,
    };
    let mut filter = header.new_filter();
    filter.add("anything");
    let loaded = LoadedIndex {
        header,
        filter,
        state: LoadState::Restored,
    };
    let config = ReplenishConfig {
        max_attempts: 5,
        ..config()
    };
    let mut replenisher =
        Replenisher::new(config, MemoryQueue::new(), IdGenerator::default(), index, loaded);

    assert!(matches!(
        replenisher.mint(1),
        Err(Error::CapacityExhausted { attempts: 5 })
    ));
    assert!(matches!(replenisher.step(), Step::Backoff { .. }));
    assert_eq!(replenisher.queue().values(KEY).len(), 0);
}

#[test]
fn restarted_generator_skips_previously_issued_ids() {
    let dir = TempDir::new().unwrap();
    let (index, loaded) = fresh_index(&dir);
    let mut first = Replenisher::new(
        config(),
        MemoryQueue::new(),
        IdGenerator::new(FixedRand),
        index,
        loaded,
    );
    let issued = first.mint(10).unwrap();
    first.flush().unwrap();

    // Same deterministic source, so the first ten candidates repeat.
    let index = IndexFile::new(dir.path().join("guid.idx"));
    let loaded = index.load(None).unwrap();
    let mut second = Replenisher::new(
        config(),
        MemoryQueue::new(),
        IdGenerator::new(FixedRand),
        index,
        loaded,
    );
    let reissued = second.mint(10).unwrap();

    let issued: HashSet<String> = issued.into_iter().collect();
    assert!(reissued.iter().all(|id| !issued.contains(id)));
    assert_eq!(second.generator.counter(), 20);
}

#[test]
fn default_config_matches_documented_values() {
    let config = ReplenishConfig::default();
    assert_eq!(config.key, "guid-20");
    assert_eq!(config.id_len, 20);
    assert_eq!(config.low_watermark, 100);
    assert_eq!(config.batch_size, 10);
    assert_eq!(config.group_size, 3);
    assert_eq!(config.retry.interval, Duration::from_secs(1));
}
