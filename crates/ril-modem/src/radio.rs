//! Radio state machine.
//!
//! The state lives in a [`watch`] channel together with the "channel closed"
//! flag, so that both change under one lock and waiters can block on the
//! flag. Every transition runs the same steps:
//!
//! 1. While the closed flag is set the state is forced to UNAVAILABLE.
//! 2. Nothing happens if the state did not change.
//! 3. Otherwise the change is broadcast as [`RilEvent::RadioStateChanged`]
//!    after the lock is released, and entering SIM_NOT_READY or SIM_READY
//!    posts the matching entry sequence to the deferred queue.

use std::time::Duration;

use ril_core::events::RilEvent;
use ril_core::types::RadioState;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::scheduler::{DeferredTask, Scheduler};

/// State plus the closed flag, as observed by waiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub state: RadioState,
    pub closed: bool,
}

/// Owner of the radio state.
pub struct RadioStateMachine {
    snapshot: watch::Sender<Snapshot>,
    events: broadcast::Sender<RilEvent>,
    scheduler: Scheduler<DeferredTask>,
}

impl RadioStateMachine {
    /// Start in UNAVAILABLE with the closed flag set; nothing is open yet.
    pub fn new(events: broadcast::Sender<RilEvent>, scheduler: Scheduler<DeferredTask>) -> Self {
        let (snapshot, _) = watch::channel(Snapshot {
            state: RadioState::Unavailable,
            closed: true,
        });
        Self {
            snapshot,
            events,
            scheduler,
        }
    }

    pub fn state(&self) -> RadioState {
        self.snapshot.borrow().state
    }

    pub fn is_closed(&self) -> bool {
        self.snapshot.borrow().closed
    }

    /// Request a transition. Returns the state actually in effect afterwards,
    /// which is UNAVAILABLE whenever the channel is closed.
    pub fn set_state(&self, requested: RadioState) -> RadioState {
        self.transition(None, requested)
    }

    /// Mark the channel closed and drop to UNAVAILABLE.
    pub fn mark_closed(&self) {
        self.transition(Some(true), RadioState::Unavailable);
    }

    /// Clear the closed flag after a new channel was opened. The state stays
    /// UNAVAILABLE until initialization moves it.
    pub fn mark_open(&self) {
        self.snapshot.send_if_modified(|snap| {
            let changed = snap.closed;
            snap.closed = false;
            changed
        });
    }

    /// Wait until the closed flag is set.
    pub async fn wait_closed(&self) {
        let mut rx = self.snapshot.subscribe();
        // The sender lives as long as `self`, so this only fails on teardown.
        let _ = rx.wait_for(|snap| snap.closed).await;
    }

    /// Watch state changes directly.
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.subscribe()
    }

    fn transition(&self, closed: Option<bool>, requested: RadioState) -> RadioState {
        let mut previous = RadioState::Unavailable;
        let mut current = RadioState::Unavailable;
        let changed = self.snapshot.send_if_modified(|snap| {
            previous = snap.state;
            let closed_changed = match closed {
                Some(flag) if flag != snap.closed => {
                    snap.closed = flag;
                    true
                }
                _ => false,
            };
            let next = if snap.closed {
                RadioState::Unavailable
            } else {
                requested
            };
            snap.state = next;
            current = next;
            closed_changed || next != previous
        });

        if changed && current != previous {
            info!(from = %previous, to = %current, "radio state changed");
            // No subscribers is not an error.
            let _ = self.events.send(RilEvent::RadioStateChanged { state: current });
            match current {
                RadioState::SimNotReady => {
                    self.post(DeferredTask::OnRadioPowerOn);
                }
                RadioState::SimReady => {
                    self.post(DeferredTask::OnSimReady);
                }
                _ => {}
            }
        }
        current
    }

    fn post(&self, task: DeferredTask) {
        if !self.scheduler.schedule(task, Duration::ZERO) {
            debug!(?task, "deferred queue gone, entry sequence dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TaskRunner;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tokio_util::sync::CancellationToken;

    #[derive(Clone, Default)]
    struct Posted(Arc<Mutex<Vec<DeferredTask>>>);

    #[async_trait]
    impl TaskRunner<DeferredTask> for Posted {
        async fn run(&self, task: DeferredTask) {
            self.0.lock().unwrap().push(task);
        }
    }

    fn machine() -> (RadioStateMachine, Posted, broadcast::Receiver<RilEvent>) {
        let posted = Posted::default();
        let scheduler = Scheduler::spawn(posted.clone(), CancellationToken::new());
        let (events, rx) = broadcast::channel(16);
        (RadioStateMachine::new(events, scheduler), posted, rx)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn starts_closed_and_unavailable() {
        let (radio, _, _) = machine();
        assert_eq!(radio.state(), RadioState::Unavailable);
        assert!(radio.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_flag_forces_unavailable() {
        let (radio, _, mut rx) = machine();
        assert_eq!(radio.set_state(RadioState::SimReady), RadioState::Unavailable);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn transitions_emit_once_and_post_entry_tasks() {
        let (radio, posted, mut rx) = machine();
        radio.mark_open();

        assert_eq!(radio.set_state(RadioState::Off), RadioState::Off);
        assert_eq!(radio.set_state(RadioState::SimNotReady), RadioState::SimNotReady);
        assert_eq!(radio.set_state(RadioState::SimNotReady), RadioState::SimNotReady);
        assert_eq!(radio.set_state(RadioState::SimReady), RadioState::SimReady);
        settle().await;

        let mut seen = Vec::new();
        while let Ok(RilEvent::RadioStateChanged { state }) = rx.try_recv() {
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![RadioState::Off, RadioState::SimNotReady, RadioState::SimReady]
        );
        assert_eq!(
            *posted.0.lock().unwrap(),
            vec![DeferredTask::OnRadioPowerOn, DeferredTask::OnSimReady]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn mark_closed_drops_to_unavailable_and_wakes_waiters() {
        let (radio, _, mut rx) = machine();
        let radio = Arc::new(radio);
        radio.mark_open();
        radio.set_state(RadioState::SimReady);
        let _ = rx.try_recv();

        let waiter = {
            let radio = radio.clone();
            tokio::spawn(async move { radio.wait_closed().await })
        };
        settle().await;
        assert!(!waiter.is_finished());

        radio.mark_closed();
        waiter.await.unwrap();
        assert_eq!(radio.state(), RadioState::Unavailable);
        assert_eq!(
            rx.try_recv().unwrap(),
            RilEvent::RadioStateChanged {
                state: RadioState::Unavailable
            }
        );
        assert_eq!(radio.set_state(RadioState::Off), RadioState::Unavailable);
    }
}
