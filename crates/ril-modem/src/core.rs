//! RilCore -- the shared state behind a running RIL service.
//!
//! One `RilCore` owns the radio state machine, the currently open AT
//! channel (if any), the request table, the unsolicited dispatcher and the
//! deferred task queue. Request handlers, the channel's callbacks and the
//! deferred tasks all reach the modem through it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use ril_at::{AtChannel, ChannelHandler, CloseReason};
use ril_core::error::{Error, Result};
use ril_core::events::RilEvent;
use ril_core::transport::Transport;
use ril_core::types::{RadioState, RilErrno};
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{RilConfig, RIL_VERSION};
use crate::radio::RadioStateMachine;
use crate::requests::{self, Request, RequestCode, RequestResult, RequestTable};
use crate::scheduler::{DeferredTask, Scheduler, TaskRunner};
use crate::unsolicited::{UnsolicitedContext, UnsolicitedDispatcher};

/// Identifies one host request from submission to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestToken(pub u64);

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A submitted request whose completion has not been collected yet.
///
/// Completion is delivered exactly once, whichever task produces it.
#[derive(Debug)]
pub struct PendingRequest {
    token: RequestToken,
    rx: oneshot::Receiver<RequestResult>,
}

impl PendingRequest {
    pub fn token(&self) -> RequestToken {
        self.token
    }

    /// Wait for the request to complete.
    pub async fn wait(self) -> RequestResult {
        // A dropped sender means the handler task died mid-request.
        self.rx.await.unwrap_or(Err(RilErrno::GenericFailure))
    }
}

/// Shared state of a RIL service instance.
pub struct RilCore {
    config: RilConfig,
    radio: RadioStateMachine,
    events: broadcast::Sender<RilEvent>,
    /// Open channel tagged with the generation that opened it.
    channel: RwLock<Option<(u64, AtChannel)>>,
    generation: AtomicU64,
    table: RequestTable,
    unsolicited: UnsolicitedDispatcher,
    scheduler: Scheduler<DeferredTask>,
    next_token: AtomicU64,
    weak: Weak<RilCore>,
}

impl fmt::Debug for RilCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RilCore")
            .field("state", &self.radio.state())
            .field("table", &self.table)
            .finish()
    }
}

impl RilCore {
    /// Create the core and start its deferred task queue, which stops when
    /// `cancel` fires. Must be called inside a tokio runtime.
    pub fn new(config: RilConfig, table: RequestTable, cancel: CancellationToken) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<RilCore>| {
            let (events, _) = broadcast::channel(config.event_capacity.max(1));
            let scheduler = Scheduler::spawn(DeferredRunner { core: weak.clone() }, cancel);
            let radio = RadioStateMachine::new(events.clone(), scheduler.clone());
            RilCore {
                config,
                radio,
                events,
                channel: RwLock::new(None),
                generation: AtomicU64::new(0),
                table,
                unsolicited: UnsolicitedDispatcher::new(),
                scheduler,
                next_token: AtomicU64::new(0),
                weak: weak.clone(),
            }
        })
    }

    // ---------------------------------------------------------------
    // Host surface
    // ---------------------------------------------------------------

    /// Submit a request. Gating and table lookup happen synchronously; the
    /// handler itself runs on its own task.
    pub fn on_request(&self, request: Request) -> PendingRequest {
        let token = RequestToken(self.next_token.fetch_add(1, Ordering::Relaxed) + 1);
        let code = request.code();
        let (tx, rx) = oneshot::channel();
        let state = self.radio.state();

        if !requests::is_allowed(state, code) {
            debug!(%token, %code, %state, "request rejected in current radio state");
            let _ = tx.send(Err(RilErrno::RadioNotAvailable));
            return PendingRequest { token, rx };
        }

        let (Some(handler), Some(core)) = (self.table.get(code), self.weak.upgrade()) else {
            debug!(%token, %code, "request not supported");
            let _ = tx.send(Err(RilErrno::RequestNotSupported));
            return PendingRequest { token, rx };
        };

        debug!(%token, %code, "request accepted");
        tokio::spawn(async move {
            let result = handler.handle(&core, request).await;
            match &result {
                Ok(_) => debug!(%token, %code, "request complete"),
                Err(errno) => debug!(%token, %code, %errno, "request failed"),
            }
            // The host may have stopped waiting.
            let _ = tx.send(result);
        });
        PendingRequest { token, rx }
    }

    /// Submit a request and wait for its completion.
    pub async fn request(&self, request: Request) -> RequestResult {
        self.on_request(request).wait().await
    }

    pub fn current_state(&self) -> RadioState {
        self.radio.state()
    }

    /// Whether the request table has a handler for `code`.
    pub fn on_supports(&self, code: RequestCode) -> bool {
        self.table.supports(code)
    }

    /// Commands already written cannot be aborted; the request completes
    /// or times out on its own.
    pub fn on_cancel(&self, token: RequestToken) {
        debug!(%token, "cancel requested, ignored");
    }

    pub fn version(&self) -> &'static str {
        RIL_VERSION
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RilEvent> {
        self.events.subscribe()
    }

    // ---------------------------------------------------------------
    // Handler-facing API
    // ---------------------------------------------------------------

    pub fn config(&self) -> &RilConfig {
        &self.config
    }

    pub fn radio(&self) -> &RadioStateMachine {
        &self.radio
    }

    pub fn unsolicited(&self) -> &UnsolicitedDispatcher {
        &self.unsolicited
    }

    /// The open AT channel, or [`Error::NotConnected`].
    pub fn at(&self) -> Result<AtChannel> {
        let slot = self
            .channel
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match slot.as_ref() {
            Some((_, channel)) if !channel.is_closed() => Ok(channel.clone()),
            _ => Err(Error::NotConnected),
        }
    }

    /// Broadcast an event to subscribers.
    pub fn notify(&self, event: RilEvent) {
        debug!(?event, "unsolicited event");
        let _ = self.events.send(event);
    }

    /// Post a deferred task.
    pub fn schedule(&self, task: DeferredTask, delay: Duration) {
        if !self.scheduler.schedule(task, delay) {
            warn!(?task, "deferred queue stopped, task dropped");
        }
    }

    // ---------------------------------------------------------------
    // Channel lifecycle
    // ---------------------------------------------------------------

    /// Open an AT channel over `transport` and make it current.
    pub fn attach_channel(&self, transport: Box<dyn Transport>) -> AtChannel {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let handler = Arc::new(CoreHandler {
            core: self.weak.clone(),
            generation,
        });
        let channel = AtChannel::open(transport, self.config.channel_config(), handler);
        *self
            .channel
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some((generation, channel.clone()));
        self.radio.mark_open();
        // The channel may have died before the closed flag was cleared.
        if channel.is_closed() {
            self.radio.mark_closed();
        }
        info!(generation, "AT channel opened");
        channel
    }

    fn on_channel_closed(&self, generation: u64, reason: &CloseReason) {
        match reason {
            CloseReason::Shutdown => info!(generation, "AT channel closed"),
            CloseReason::Timeout => warn!(generation, "AT channel timeout; closing"),
            other => warn!(generation, reason = %other, "AT channel closed"),
        }
        {
            let mut slot = self
                .channel
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if matches!(slot.as_ref(), Some((g, _)) if *g == generation) {
                *slot = None;
            }
        }
        self.radio.mark_closed();
    }
}

impl UnsolicitedContext for RilCore {
    fn radio_state(&self) -> RadioState {
        self.radio.state()
    }

    fn notify(&self, event: RilEvent) {
        RilCore::notify(self, event);
    }

    fn schedule(&self, task: DeferredTask, delay: Duration) {
        RilCore::schedule(self, task, delay);
    }
}

/// Channel callbacks, routed back into the core that opened the channel.
struct CoreHandler {
    core: Weak<RilCore>,
    generation: u64,
}

impl ChannelHandler for CoreHandler {
    fn on_unsolicited(&self, line: &str, pdu: Option<&str>) {
        if let Some(core) = self.core.upgrade() {
            core.unsolicited.dispatch(&*core, line, pdu);
        }
    }

    fn on_closed(&self, reason: &CloseReason) {
        if let Some(core) = self.core.upgrade() {
            core.on_channel_closed(self.generation, reason);
        }
    }
}

struct DeferredRunner {
    core: Weak<RilCore>,
}

#[async_trait]
impl TaskRunner<DeferredTask> for DeferredRunner {
    async fn run(&self, task: DeferredTask) {
        if let Some(core) = self.core.upgrade() {
            core.run_deferred(task).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::Response;
    use ril_test_harness::MockModem;

    fn core() -> Arc<RilCore> {
        RilCore::new(
            RilConfig::default(),
            RequestTable::standard(),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn unavailable_rejects_all_but_sim_status() {
        let core = core();
        assert_eq!(core.current_state(), RadioState::Unavailable);
        assert_eq!(
            core.request(Request::SignalStrength).await,
            Err(RilErrno::RadioNotAvailable)
        );
        assert_eq!(
            core.request(Request::RadioPower { on: true }).await,
            Err(RilErrno::RadioNotAvailable)
        );
        assert!(matches!(
            core.request(Request::GetSimStatus).await,
            Ok(Response::CardStatus(_))
        ));
    }

    #[tokio::test]
    async fn tokens_are_unique_and_increasing() {
        let core = core();
        let a = core.on_request(Request::GetSimStatus);
        let b = core.on_request(Request::GetSimStatus);
        assert!(b.token() > a.token());
        core.on_cancel(a.token());
        assert!(a.wait().await.is_ok());
        assert!(b.wait().await.is_ok());
    }

    #[tokio::test]
    async fn unsupported_codes_report_as_such() {
        let mut table = RequestTable::standard();
        table.unregister(RequestCode::GetSimStatus);
        let core = RilCore::new(RilConfig::default(), table, CancellationToken::new());
        assert!(!core.on_supports(RequestCode::GetSimStatus));
        assert_eq!(
            core.request(Request::GetSimStatus).await,
            Err(RilErrno::RequestNotSupported)
        );
        assert!(core.version().starts_with("ril-modem"));
    }

    #[tokio::test]
    async fn no_channel_means_not_connected() {
        let core = core();
        assert!(matches!(core.at(), Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn closing_the_channel_clears_it_and_drops_to_unavailable() {
        let core = core();
        let modem = MockModem::new();
        let handle = modem.handle();
        let channel = core.attach_channel(Box::new(modem));
        assert!(core.at().is_ok());
        assert!(!core.radio().is_closed());

        handle.hang_up();
        channel.closed().await;
        assert!(core.radio().is_closed());
        assert_eq!(core.current_state(), RadioState::Unavailable);
        assert!(matches!(core.at(), Err(Error::NotConnected)));
    }
}
