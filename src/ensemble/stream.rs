//! Concurrent query fan-out and the merged result stream.
//!
//! # Shape
//!
//! ```text
//!  partition 0 ──producer──┐
//!  partition 1 ──producer──┼──▶ bounded channel ──▶ QueryStream (Iterator)
//!  partition n ──producer──┘          ▲
//!                                     └── CancelToken checked before every send
//! ```
//!
//! # Shutdown ordering
//!
//! Cancelling (explicitly, through a [`CancelToken`], or by dropping the
//! stream) runs in this order:
//!
//! 1. set the token, so producers stop at their next emission;
//! 2. drain the channel until every sender is gone, which unblocks any
//!    producer parked in `send` on a full channel;
//! 3. join every producer thread;
//! 4. only then drop the receiver.
//!
//! Dropping the receiver first would leave producers to discover the closed
//! channel on their own time; skipping the drain would deadlock on a
//! producer blocked in `send`. No producer outlives its stream.
//!
//! # Why not a shared worker pool
//!
//! Producers park in `send` until their consumer reads. With a fixed pool
//! shared by all queries, a caller holding two open streams could fill every
//! worker with producers of the stream it is not reading while the other
//! stream's producers wait in the pool queue, and neither stream would ever
//! advance. Each stream therefore owns its producer threads, one per
//! partition, and joins them on shutdown; the thread count is bounded by
//! `open streams × partitions`.

use super::PartitionIndex;
use crate::error::{EnsembleError, Result};
use crate::forest::BandedIndex;
use crate::hash::Signature;
use crate::params::BandingParams;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Shared cancellation flag for one query.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every producer of the query to stop.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Counts running producers; decrements when the owning thread exits.
struct ProducerGuard {
    live: Arc<AtomicUsize>,
}

impl ProducerGuard {
    fn enter(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            live: Arc::clone(live),
        }
    }
}

impl Drop for ProducerGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Lazily merged candidate keys from every partition.
///
/// Keys arrive in no particular order. Stop early by calling
/// [`QueryStream::cancel`] or simply dropping the stream.
pub struct QueryStream {
    receiver: Option<Receiver<String>>,
    producers: Vec<JoinHandle<()>>,
    cancel: CancelToken,
    started: Instant,
    delivered: usize,
    /// Set once the completion has been logged.
    reported: bool,
}

impl QueryStream {
    pub(super) fn spawn<I: BandedIndex + 'static>(
        partitions: Arc<[PartitionIndex<I>]>,
        params: Vec<BandingParams>,
        signature: Signature,
        capacity: usize,
        live: &Arc<AtomicUsize>,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel(capacity);
        let cancel = CancelToken::new();
        let signature = Arc::new(signature);
        let mut stream = Self {
            receiver: Some(rx),
            producers: Vec::with_capacity(params.len()),
            cancel: cancel.clone(),
            started: Instant::now(),
            delivered: 0,
            reported: false,
        };

        for (partition, banding) in params.into_iter().enumerate() {
            let guard = ProducerGuard::enter(live);
            let worker = Producer {
                partition,
                banding,
                partitions: Arc::clone(&partitions),
                signature: Arc::clone(&signature),
                tx: tx.clone(),
                cancel: cancel.clone(),
            };
            let spawned = thread::Builder::new()
                .name(format!("lshe-query-{partition}"))
                .spawn(move || {
                    let _guard = guard;
                    worker.run();
                });
            match spawned {
                Ok(handle) => stream.producers.push(handle),
                Err(e) => {
                    // Our sender must go before the stream drains on drop.
                    drop(tx);
                    return Err(EnsembleError::ThreadSpawn(e.to_string()));
                }
            }
        }

        Ok(stream)
    }

    /// Token that cancels this query from any thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Stop all producers and release the stream.
    ///
    /// Returns once every producer has exited.
    pub fn cancel(mut self) {
        self.cancel.cancel();
        self.shutdown();
    }

    /// Number of producers still attached to this stream.
    pub fn num_producers(&self) -> usize {
        self.producers.len()
    }

    /// Time since the query was dispatched.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Candidates handed to the consumer so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    fn report(&mut self, outcome: &'static str) {
        if self.reported {
            return;
        }
        self.reported = true;
        debug!(
            outcome,
            delivered = self.delivered,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "query stream closed"
        );
    }

    fn shutdown(&mut self) {
        let outcome = if self.cancel.is_cancelled() {
            "cancelled"
        } else {
            "stopped"
        };
        self.cancel.cancel();
        if let Some(rx) = &self.receiver {
            while rx.recv().is_ok() {}
        }
        for handle in self.producers.drain(..) {
            if handle.join().is_err() {
                warn!("query producer panicked");
            }
        }
        self.receiver = None;
        self.report(outcome);
    }
}

impl Iterator for QueryStream {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let received = self.receiver.as_ref()?.recv();
        match received {
            Ok(key) => {
                self.delivered += 1;
                Some(key)
            }
            Err(_) => {
                self.report("exhausted");
                None
            }
        }
    }
}

impl Drop for QueryStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for QueryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryStream")
            .field("producers", &self.producers.len())
            .field("delivered", &self.delivered)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// One partition's lookup, run on its own thread.
struct Producer<I> {
    partition: usize,
    banding: BandingParams,
    partitions: Arc<[PartitionIndex<I>]>,
    signature: Arc<Signature>,
    tx: SyncSender<String>,
    cancel: CancelToken,
}

impl<I: BandedIndex> Producer<I> {
    fn run(self) {
        let index = &self.partitions[self.partition].index;
        let keys = match index.query(&self.signature, self.banding.k, self.banding.l) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(partition = self.partition, error = %e, "partition query failed");
                return;
            }
        };

        let mut emitted = 0usize;
        for key in keys {
            if self.cancel.is_cancelled() {
                trace!(partition = self.partition, emitted, "producer cancelled");
                return;
            }
            if self.tx.send(key.to_owned()).is_err() {
                return;
            }
            emitted += 1;
        }
        trace!(partition = self.partition, emitted, "producer finished");
    }
}
