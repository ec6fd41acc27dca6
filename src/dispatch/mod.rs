//! Snapshot assembly and fan-out.
//!
//! After each scheduler round the dispatcher merges the latest value per
//! stream into an immutable [`Snapshot`] and publishes it on a watch
//! channel. Pull consumers borrow the latest snapshot without blocking
//! anything; push sinks run on their own forwarding tasks, where the watch
//! channel gives the at-most-one-pending policy for free: a slow sink only
//! ever sees the newest snapshot, never a growing queue, and can never
//! stall the scheduler.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch};

use crate::metric::{Sample, StreamKey};
use crate::plugin::Formatter;
use crate::scheduler::RoundUpdate;
use crate::store::BufferStore;

/// Immutable, timestamped view of the latest sample per stream, plus a
/// handle to the history store for window queries.
pub struct Snapshot {
    pub round_id: u64,
    pub timestamp: DateTime<Utc>,
    pub latest: BTreeMap<StreamKey, Sample>,
    store: Arc<BufferStore>,
}

impl Snapshot {
    fn empty(store: Arc<BufferStore>) -> Self {
        Self {
            round_id: 0,
            timestamp: Utc::now(),
            latest: BTreeMap::new(),
            store,
        }
    }

    pub fn get(&self, key: &StreamKey) -> Option<&Sample> {
        self.latest.get(key)
    }

    /// Up to the `n` most recent samples of one stream, oldest first.
    pub fn history(&self, key: &StreamKey, n: usize) -> Vec<Sample> {
        self.store.window(key, n)
    }

    /// Ad-hoc lookup: samples whose `plugin.metric` qualified name matches
    /// a `*`-glob pattern (e.g. `cpu.*` or `*.usage`).
    pub fn query(&self, pattern: &str) -> Vec<&Sample> {
        let anchored = format!("^{}$", regex::escape(pattern).replace("\\*", ".*"));
        let re = match regex::Regex::new(&anchored) {
            Ok(re) => re,
            Err(_) => return Vec::new(),
        };
        self.latest
            .values()
            .filter(|s| re.is_match(&s.key.qualified_name()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

/// Handle for pull consumers: always returns the most recently published
/// snapshot without blocking the scheduler.
#[derive(Clone)]
pub struct SnapshotHandle {
    rx: watch::Receiver<Arc<Snapshot>>,
}

impl SnapshotHandle {
    /// Non-blocking read of the latest published snapshot.
    pub fn latest(&self) -> Arc<Snapshot> {
        Arc::clone(&self.rx.borrow())
    }

    /// Wait until a newer snapshot than the last observed one is published.
    /// Returns false when the dispatcher is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// Publishes snapshots to one watch channel shared by all consumers.
pub struct Dispatcher {
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    store: Arc<BufferStore>,
    round: AtomicU64,
}

impl Dispatcher {
    pub fn new(store: Arc<BufferStore>) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(Snapshot::empty(Arc::clone(&store))));
        Self {
            snapshot_tx,
            store,
            round: AtomicU64::new(0),
        }
    }

    pub fn subscribe_pull(&self) -> SnapshotHandle {
        SnapshotHandle {
            rx: self.snapshot_tx.subscribe(),
        }
    }

    /// Register a push sink. Each formatted payload is delivered on the
    /// returned channel; if the consumer lags, newer snapshots replace the
    /// unconsumed one before formatting (at-most-one-pending).
    pub fn subscribe_push(
        &self,
        mut sink: Box<dyn Formatter>,
    ) -> mpsc::Receiver<Vec<u8>> {
        let mut rx = self.snapshot_tx.subscribe();
        let (out_tx, out_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let snapshot = Arc::clone(&rx.borrow_and_update());
                if snapshot.round_id == 0 {
                    continue;
                }
                match sink.on_snapshot(&snapshot) {
                    Ok(bytes) => {
                        if out_tx.send(bytes).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => log::warn!("push sink failed: {}", e),
                }
            }
        });

        out_rx
    }

    /// Merge a round's samples over the current latest-per-stream view and
    /// publish the result. Returns the published snapshot.
    pub fn publish(&self, samples: Vec<Sample>) -> Arc<Snapshot> {
        let mut latest = self.snapshot_tx.borrow().latest.clone();
        for sample in samples {
            latest.insert(sample.key.clone(), sample);
        }
        let snapshot = Arc::new(Snapshot {
            round_id: self.round.fetch_add(1, Ordering::SeqCst) + 1,
            timestamp: Utc::now(),
            latest,
            store: Arc::clone(&self.store),
        });
        // send() only fails with no receivers, which is fine.
        let _ = self.snapshot_tx.send(Arc::clone(&snapshot));
        snapshot
    }

    /// Publisher loop: merges updates from scheduler tasks into snapshots
    /// until shutdown.
    pub async fn run(
        self: Arc<Self>,
        mut update_rx: mpsc::Receiver<RoundUpdate>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                update = update_rx.recv() => {
                    match update {
                        Some(update) => {
                            log::trace!(
                                "round update from '{}' ({} samples)",
                                update.plugin,
                                update.samples.len()
                            );
                            self.publish(update.samples);
                        }
                        None => break,
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    }
}
