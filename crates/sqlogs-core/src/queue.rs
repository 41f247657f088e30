//! Ordered ingestion queue with a single writer thread.
//!
//! Producers push entries from any thread and return immediately. One
//! dedicated thread pops entries in FIFO order and persists them one at a
//! time; entry N+1 is never started before entry N has finished, whatever
//! the outcome.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  push   ┌─────────────────────────────┐  pop   ┌──────────────────┐
//! │  producers   │ ──────► │ Mutex<VecDeque<QueueItem>>  │ ─────► │  sqlogs-writer   │
//! │ (any thread) │         │  not_empty / not_full       │        │  Persist::persist│
//! └──────────────┘         └─────────────────────────────┘        └──────────────────┘
//!                                                                      │ failures
//!                                                                      ▼
//!                                                      broadcast::Sender<WriteFailure>
//! ```
//!
//! ## States
//!
//! `Idle → Persisting → Idle → …`, then `Draining` once close is requested
//! and `Closed` when every queued entry has been attempted and the storage
//! handle released.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::{OverflowPolicy, QueueConfig};
use crate::entry::LogEntry;
use crate::error::{LoggerError, LoggerResult};
use crate::writer::Persist;

/// Capacity of the failure broadcast channel
const FAILURE_CHANNEL_CAPACITY: usize = 256;

/// Writer state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Waiting for entries
    Idle,
    /// Persisting one entry
    Persisting,
    /// Close requested; remaining entries are being written
    Draining,
    /// Writer thread finished
    Closed,
}

/// A persist attempt that failed. The entry is not retried.
#[derive(Debug, Clone)]
pub struct WriteFailure {
    pub entry: LogEntry,
    pub error: String,
}

/// Counters since the queue was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Entries accepted onto the queue
    pub enqueued: u64,
    /// Entries written successfully
    pub persisted: u64,
    /// Entries whose persist attempt failed
    pub failed: u64,
    /// Entries discarded by the overflow policy
    pub dropped: u64,
    /// Entries still waiting in the queue
    pub pending: usize,
}

enum QueueItem {
    Entry(LogEntry),
    /// Resolved once every item queued before it has been handled
    Barrier(oneshot::Sender<()>),
}

struct Inner {
    items: VecDeque<QueueItem>,
    /// Number of `QueueItem::Entry` in `items`
    pending: usize,
    closed: bool,
    state: QueueState,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    persisted: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

struct Shared {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    not_full: Condvar,
    counters: Counters,
    failures: broadcast::Sender<WriteFailure>,
}

/// FIFO queue feeding exactly one writer thread.
pub struct IngestQueue {
    shared: Arc<Shared>,
    config: QueueConfig,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl IngestQueue {
    /// Start the writer thread. `sink` is moved onto it and owned there.
    pub fn spawn<P>(sink: P, config: QueueConfig, thread_name: &str) -> LoggerResult<Self>
    where
        P: Persist + 'static,
    {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                pending: 0,
                closed: false,
                state: QueueState::Idle,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            counters: Counters::default(),
            failures,
        });

        let worker_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || run_writer(worker_shared, sink))
            .map_err(|e| LoggerError::Thread(format!("failed to spawn writer thread: {}", e)))?;

        debug!(thread = thread_name, capacity = ?config.capacity, "Writer thread started");

        Ok(Self {
            shared,
            config,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Queue an entry. Never waits on storage; may wait for room only under
    /// [`OverflowPolicy::Block`].
    pub fn push(&self, entry: LogEntry) -> LoggerResult<()> {
        let mut inner = self.shared.inner.lock();
        if inner.closed {
            return Err(self.refuse_closed());
        }

        if let Some(capacity) = self.config.effective_capacity() {
            while inner.pending >= capacity {
                match self.config.overflow {
                    OverflowPolicy::Block => {
                        self.shared.not_full.wait(&mut inner);
                        if inner.closed {
                            return Err(self.refuse_closed());
                        }
                    }
                    OverflowPolicy::Reject => {
                        self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(capacity, "Log queue full, rejecting entry");
                        return Err(LoggerError::QueueFull(capacity));
                    }
                    OverflowPolicy::DropOldest => {
                        let Some(pos) = inner
                            .items
                            .iter()
                            .position(|item| matches!(item, QueueItem::Entry(_)))
                        else {
                            break;
                        };
                        inner.items.remove(pos);
                        inner.pending -= 1;
                        self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(capacity, "Log queue full, dropped oldest entry");
                    }
                }
            }
        }

        inner.items.push_back(QueueItem::Entry(entry));
        inner.pending += 1;
        self.shared.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        drop(inner);

        self.shared.not_empty.notify_one();
        Ok(())
    }

    fn refuse_closed(&self) -> LoggerError {
        self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
        warn!("Log queue closed, dropping entry");
        LoggerError::QueueClosed
    }

    fn push_barrier(&self) -> LoggerResult<oneshot::Receiver<()>> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.shared.inner.lock();
        if inner.closed {
            return Err(LoggerError::QueueClosed);
        }
        inner.items.push_back(QueueItem::Barrier(tx));
        drop(inner);

        self.shared.not_empty.notify_one();
        Ok(rx)
    }

    /// Wait until every entry queued before this call has been attempted.
    pub async fn flush(&self) -> LoggerResult<()> {
        let rx = self.push_barrier()?;
        rx.await
            .map_err(|_| LoggerError::Thread("writer stopped before flush completed".into()))
    }

    /// Blocking variant of [`flush`](Self::flush).
    ///
    /// Must not be called from inside an async runtime.
    pub fn flush_blocking(&self) -> LoggerResult<()> {
        let rx = self.push_barrier()?;
        rx.blocking_recv()
            .map_err(|_| LoggerError::Thread("writer stopped before flush completed".into()))
    }

    /// Stop accepting entries, write everything already queued, release the
    /// storage handle and join the writer thread.
    ///
    /// Calling it again is a no-op.
    pub fn close(&self) -> LoggerResult<WriterStats> {
        {
            let mut inner = self.shared.inner.lock();
            inner.closed = true;
        }
        self.shared.not_empty.notify_all();
        self.shared.not_full.notify_all();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| LoggerError::Thread("writer thread panicked".into()))?;
            info!(stats = ?self.stats(), "Log writer closed");
        }
        Ok(self.stats())
    }

    pub fn state(&self) -> QueueState {
        let inner = self.shared.inner.lock();
        match inner.state {
            QueueState::Closed => QueueState::Closed,
            _ if inner.closed => QueueState::Draining,
            state => state,
        }
    }

    pub fn stats(&self) -> WriterStats {
        let pending = self.shared.inner.lock().pending;
        let c = &self.shared.counters;
        WriterStats {
            enqueued: c.enqueued.load(Ordering::Relaxed),
            persisted: c.persisted.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            pending,
        }
    }

    /// Subscribe to persist failures.
    ///
    /// Only failures after the call are delivered.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<WriteFailure> {
        self.shared.failures.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.inner.lock().closed
    }
}

impl Drop for IngestQueue {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(error = %e, "Log writer did not shut down cleanly");
        }
    }
}

/// Writer loop. Runs until the queue is closed and empty.
fn run_writer<P: Persist>(shared: Arc<Shared>, mut sink: P) {
    loop {
        let item = {
            let mut inner = shared.inner.lock();
            loop {
                if let Some(item) = inner.items.pop_front() {
                    if matches!(item, QueueItem::Entry(_)) {
                        inner.pending -= 1;
                        inner.state = QueueState::Persisting;
                    }
                    break Some(item);
                }
                if inner.closed {
                    break None;
                }
                shared.not_empty.wait(&mut inner);
            }
        };
        shared.not_full.notify_one();

        match item {
            None => break,
            Some(QueueItem::Barrier(done)) => {
                let _ = done.send(());
            }
            Some(QueueItem::Entry(entry)) => {
                match sink.persist(&entry) {
                    Ok(outcome) => {
                        shared.counters.persisted.fetch_add(1, Ordering::Relaxed);
                        if !outcome.added_columns.is_empty() {
                            debug!(columns = ?outcome.added_columns, "Log table extended");
                        }
                    }
                    Err(e) => {
                        shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                        error!(error = %e, group = %entry.group, level = %entry.level, "Failed to persist log entry");
                        // No subscribers is fine
                        let _ = shared.failures.send(WriteFailure {
                            entry,
                            error: e.to_string(),
                        });
                    }
                }
                shared.inner.lock().state = QueueState::Idle;
            }
        }
    }

    sink.close();
    shared.inner.lock().state = QueueState::Closed;
}
