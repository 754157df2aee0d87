//! Timed deferred-task queue.
//!
//! Work that must not run on the channel's IO task (anything that issues AT
//! commands in response to a state change or an unsolicited line) is posted
//! here with a delay. A single tokio task owns a min-heap keyed by due time
//! and runs due tasks one at a time, in due order, ties broken by posting
//! order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Work items posted by the state machine and the unsolicited dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredTask {
    /// Run the channel initialization sequence after a (re)connect.
    Initialize,
    /// Post-power-on sequence, entered with SIM_NOT_READY.
    OnRadioPowerOn,
    /// Post-SIM-ready sequence, entered with SIM_READY.
    OnSimReady,
    /// Query the SIM again while it is not ready.
    PollSimState,
    /// Re-query the PDP context list and announce it.
    DataCallListChanged,
    /// Re-announce call state so the host polls the call list again.
    CallStateChanged,
}

/// Executes tasks taken off the queue.
#[async_trait]
pub trait TaskRunner<T>: Send + Sync + 'static {
    async fn run(&self, task: T);
}

/// Posting side of the queue.
#[derive(Debug)]
pub struct Scheduler<T> {
    tx: mpsc::UnboundedSender<(Instant, T)>,
}

impl<T> Clone for Scheduler<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send + 'static> Scheduler<T> {
    /// Spawn the queue task driving `runner`.
    ///
    /// The task exits when `cancel` fires or every `Scheduler` handle has
    /// been dropped. Tasks still queued at that point are discarded.
    pub fn spawn<R: TaskRunner<T>>(runner: R, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_queue(rx, runner, cancel));
        Self { tx }
    }

    /// Post `task` to run once `delay` has elapsed.
    ///
    /// Returns `false` if the queue task is gone.
    pub fn schedule(&self, task: T, delay: Duration) -> bool {
        self.tx.send((Instant::now() + delay, task)).is_ok()
    }
}

struct Timed<T> {
    at: Instant,
    seq: u64,
    task: T,
}

impl<T> PartialEq for Timed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl<T> Eq for Timed<T> {}

impl<T> PartialOrd for Timed<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Timed<T> {
    // Reversed so that BinaryHeap pops the earliest entry.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

async fn run_queue<T, R>(
    mut rx: mpsc::UnboundedReceiver<(Instant, T)>,
    runner: R,
    cancel: CancellationToken,
) where
    T: Send + 'static,
    R: TaskRunner<T>,
{
    let mut heap: BinaryHeap<Timed<T>> = BinaryHeap::new();
    let mut seq: u64 = 0;

    loop {
        let next_due = heap.peek().map(|t| t.at);
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            posted = rx.recv() => match posted {
                Some((at, task)) => {
                    heap.push(Timed { at, seq, task });
                    seq += 1;
                }
                None => break,
            },

            _ = tokio::time::sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                let now = Instant::now();
                while heap.peek().is_some_and(|t| t.at <= now) {
                    if let Some(due) = heap.pop() {
                        trace!(seq = due.seq, "running deferred task");
                        runner.run(due.task).await;
                    }
                }
            }
        }
    }

    debug!(discarded = heap.len(), "deferred task queue stopped");
}
