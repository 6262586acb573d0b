//! Versioned snapshot store with long-poll waiters.
//!
//! Every [`StateSynchronizer::update_state`] bumps one version counter and
//! installs the snapshot under the state lock, then wakes waiters under a
//! separate table lock. Only the current snapshot is kept: a consumer that is
//! behind gets the whole screen as its diff rather than a replay.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::diff::{Diff, VersionedSnapshot};
use crate::error::{Error, Result};
use crate::terminal::Snapshot;

type Waiters = BTreeMap<u64, HashMap<u64, oneshot::Sender<Arc<Diff>>>>;

#[derive(Debug, Default)]
struct SyncState {
    version: u64,
    current: Option<Arc<VersionedSnapshot>>,
}

/// Distributes screen updates to any number of long-polling consumers.
#[derive(Debug, Default)]
pub struct StateSynchronizer {
    state: RwLock<SyncState>,
    waiters: Mutex<Waiters>,
    next_waiter: AtomicU64,
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Outcome of the non-blocking half of a poll.
enum Poll<'a> {
    Ready(Arc<Diff>),
    Wait(Registration<'a>),
}

/// A waiter's slot in the table; removed on drop, whatever the exit path.
struct Registration<'a> {
    sync: &'a StateSynchronizer,
    key: u64,
    id: u64,
    rx: oneshot::Receiver<Arc<Diff>>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.sync.unregister(self.key, self.id);
    }
}

impl StateSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new snapshot and wake every waiter behind it.
    ///
    /// Returns the new version.
    pub fn update_state(&self, snapshot: Snapshot) -> u64 {
        let (version, diff, next) = {
            let mut state = write_lock(&self.state);
            state.version += 1;
            let next = Arc::new(VersionedSnapshot {
                version: state.version,
                screen: snapshot.screen,
                cursor: snapshot.cursor,
                timestamp: unix_nanos(),
            });
            let diff = match &state.current {
                Some(previous) => Diff::between(previous, &next),
                None => Diff::full(&next),
            };
            state.current = Some(Arc::clone(&next));
            (state.version, Arc::new(diff), next)
        };

        let woken = self.notify(&next, &diff);
        trace!(version, changes = diff.changes.len(), woken, "state updated");
        version
    }

    /// Number of updates installed so far.
    pub fn current_version(&self) -> u64 {
        read_lock(&self.state).version
    }

    /// The latest snapshot, if any update has happened.
    pub fn current_snapshot(&self) -> Option<Arc<VersionedSnapshot>> {
        read_lock(&self.state).current.clone()
    }

    /// Number of consumers currently blocked in a poll.
    pub fn waiter_count(&self) -> usize {
        lock(&self.waiters).values().map(HashMap::len).sum()
    }

    /// Wait up to `timeout` for a version newer than `since`.
    ///
    /// Returns immediately with a full diff when `since` is not the current
    /// version, and `None` if nothing changed before the timeout.
    pub async fn poll_changes(&self, since: u64, timeout: Duration) -> Option<Arc<Diff>> {
        match self.begin_poll(since) {
            Poll::Ready(diff) => Some(diff),
            Poll::Wait(mut registration) => {
                match tokio::time::timeout(timeout, &mut registration.rx).await {
                    Ok(Ok(diff)) => Some(diff),
                    Ok(Err(_)) | Err(_) => None,
                }
            }
        }
    }

    /// Wait for a version newer than `since` until `cancel` fires.
    ///
    /// Cancellation releases only this waiter and yields [`Error::Cancelled`].
    pub async fn poll_changes_with_cancel(
        &self,
        since: u64,
        cancel: &CancellationToken,
    ) -> Result<Arc<Diff>> {
        match self.begin_poll(since) {
            Poll::Ready(diff) => Ok(diff),
            Poll::Wait(mut registration) => {
                tokio::select! {
                    received = &mut registration.rx => {
                        received.map_err(|_| Error::Cancelled)
                    }
                    _ = cancel.cancelled() => Err(Error::Cancelled),
                }
            }
        }
    }

    fn begin_poll(&self, since: u64) -> Poll<'_> {
        let (version, current) = {
            let state = read_lock(&self.state);
            (state.version, state.current.clone())
        };

        if let Some(snapshot) = &current
            && since != version
        {
            debug!(since, version, "poller out of date, sending full state");
            return Poll::Ready(Arc::new(Diff::full(snapshot)));
        }

        // Register under the version we observed so that a poller claiming a
        // version from before any snapshot still wakes on the first one.
        let (tx, rx) = oneshot::channel();
        let id = self.next_waiter.fetch_add(1, Ordering::Relaxed);
        lock(&self.waiters).entry(version).or_default().insert(id, tx);
        let registration = Registration {
            sync: self,
            key: version,
            id,
            rx,
        };

        // An update may have installed a newer version between our read and
        // the insert above; if its notification missed us, answer now.
        let (latest, current) = {
            let state = read_lock(&self.state);
            (state.version, state.current.clone())
        };
        if latest != version
            && self.unregister(version, id)
            && let Some(snapshot) = current
        {
            return Poll::Ready(Arc::new(Diff::full(&snapshot)));
        }

        Poll::Wait(registration)
    }

    /// Remove a waiter. Returns true if it was still registered.
    fn unregister(&self, key: u64, id: u64) -> bool {
        let mut waiters = lock(&self.waiters);
        let Some(slot) = waiters.get_mut(&key) else {
            return false;
        };
        let removed = slot.remove(&id).is_some();
        if slot.is_empty() {
            waiters.remove(&key);
        }
        removed
    }

    /// Wake every waiter registered below `next`. Waiters at the version just
    /// before it get `diff`; older ones get the whole of `next`, since `diff`
    /// covers only the last step.
    fn notify(&self, next: &VersionedSnapshot, diff: &Arc<Diff>) -> usize {
        let version = next.version;
        let ready = {
            let mut waiters = lock(&self.waiters);
            let pending = waiters.split_off(&version);
            std::mem::replace(&mut *waiters, pending)
        };

        let mut full: Option<Arc<Diff>> = None;
        let mut woken = 0;
        for (key, slot) in ready {
            let answer = if key + 1 == version {
                Arc::clone(diff)
            } else {
                Arc::clone(full.get_or_insert_with(|| Arc::new(Diff::full(next))))
            };
            for (_, tx) in slot {
                if tx.send(Arc::clone(&answer)).is_ok() {
                    woken += 1;
                }
            }
        }
        woken
    }
}

// =============================================================================
// Tests
// =============================================================================
