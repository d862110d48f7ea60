use std::collections::{HashMap, VecDeque};

use crate::{Error, Result};

/// A minimal interface to the FIFO list store that holds issued IDs.
///
/// Index arguments follow Redis list semantics: `stop` is inclusive and
/// negative values count from the tail (`-1` is the last element).
pub trait QueueStore {
    /// Returns the number of values queued under `key`.
    fn length(&mut self, key: &str) -> Result<u64>;

    /// Appends `values` to the tail of `key` in a single operation.
    fn push(&mut self, key: &str, values: &[String]) -> Result<()>;

    /// Returns the values between `start` and `stop` (inclusive).
    fn range(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;

    /// Keeps only the values between `start` and `stop` (inclusive). A range
    /// that selects nothing, such as `(1, 0)`, empties the list.
    fn truncate(&mut self, key: &str, start: i64, stop: i64) -> Result<()>;
}

impl<Q> QueueStore for &mut Q
where
    Q: QueueStore + ?Sized,
{
    fn length(&mut self, key: &str) -> Result<u64> {
        (**self).length(key)
    }

    fn push(&mut self, key: &str, values: &[String]) -> Result<()> {
        (**self).push(key, values)
    }

    fn range(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        (**self).range(key, start, stop)
    }

    fn truncate(&mut self, key: &str, start: i64, stop: i64) -> Result<()> {
        (**self).truncate(key, start, stop)
    }
}

/// An in-process [`QueueStore`].
///
/// Useful for tests and dry runs. It can be switched offline to simulate an
/// unreachable store; every command then fails with [`Error::Queue`].
#[derive(Debug, Default, Clone)]
pub struct MemoryQueue {
    lists: HashMap<String, VecDeque<String>>,
    offline: bool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent command fail (`true`) or succeed (`false`).
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    /// Returns the values queued under `key`, head first.
    pub fn values(&self, key: &str) -> Vec<String> {
        self.lists
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline {
            return Err(Error::Queue {
                context: "memory queue is offline".into(),
            });
        }
        Ok(())
    }
}

impl QueueStore for MemoryQueue {
    fn length(&mut self, key: &str) -> Result<u64> {
        self.check_online()?;
        Ok(self.lists.get(key).map_or(0, |list| list.len() as u64))
    }

    fn push(&mut self, key: &str, values: &[String]) -> Result<()> {
        self.check_online()?;
        if values.is_empty() {
            return Err(Error::Queue {
                context: "push requires at least one value".into(),
            });
        }
        self.lists
            .entry(key.to_owned())
            .or_default()
            .extend(values.iter().cloned());
        Ok(())
    }

    fn range(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.check_online()?;
        let Some(list) = self.lists.get(key) else {
            return Ok(Vec::new());
        };
        Ok(resolve_range(list.len(), start, stop)
            .map(|(from, to)| list.range(from..=to).cloned().collect())
            .unwrap_or_default())
    }

    fn truncate(&mut self, key: &str, start: i64, stop: i64) -> Result<()> {
        self.check_online()?;
        let Some(list) = self.lists.get_mut(key) else {
            return Ok(());
        };
        match resolve_range(list.len(), start, stop) {
            Some((from, to)) => {
                list.truncate(to + 1);
                list.drain(..from);
            }
            None => {
                self.lists.remove(key);
            }
        }
        Ok(())
    }
}

/// Resolves Redis-style `start`/`stop` against a list of `len` values into
/// an inclusive index range, or `None` if the range selects nothing.
fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = i64::try_from(len).ok()?;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((usize::try_from(start).ok()?, usize::try_from(stop).ok()?))
}
