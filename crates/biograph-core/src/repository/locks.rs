//! Per-tag write locks.

use crate::error::{BioGraphError, Result};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Lazily created async mutex per tag.
///
/// Writes to one tag are mutually exclusive; writes to different tags run
/// freely. An entry lives only while some write holds or waits for it.
#[derive(Debug, Default)]
pub(crate) struct TagLocks {
    locks: LockTable,
}

/// Guards held for the duration of one write.
pub(crate) struct TagGuards {
    table: LockTable,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl Drop for TagGuards {
    fn drop(&mut self) {
        self.guards.clear();
        // The table only hands out clones under this lock, so a count of one
        // means nobody holds or awaits the mutex.
        if let Ok(mut locks) = self.table.lock() {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
    }
}

impl TagLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn handle(&self, tag: &str) -> Result<Arc<AsyncMutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| BioGraphError::Other("Failed to acquire tag lock table".into()))?;
        Ok(locks
            .entry(tag.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone())
    }

    /// Lock one tag.
    pub(crate) async fn lock(&self, tag: &str) -> Result<TagGuards> {
        self.lock_all([tag]).await
    }

    /// Lock several tags in sorted order so concurrent callers cannot deadlock.
    pub(crate) async fn lock_all<'a>(
        &self,
        tags: impl IntoIterator<Item = &'a str>,
    ) -> Result<TagGuards> {
        let ordered: BTreeSet<&str> = tags.into_iter().collect();

        let mut held = TagGuards {
            table: Arc::clone(&self.locks),
            guards: Vec::with_capacity(ordered.len()),
        };
        for tag in ordered {
            let handle = self.handle(tag)?;
            held.guards.push(handle.lock_owned().await);
        }
        Ok(held)
    }

    /// Number of tags with a live lock entry.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}
