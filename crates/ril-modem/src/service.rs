//! RilService -- a running RIL instance as seen by its host.

use std::sync::Arc;

use ril_core::events::RilEvent;
use ril_core::types::RadioState;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::{PendingRequest, RequestToken, RilCore};
use crate::mainloop::{self, Connector};
use crate::requests::{Request, RequestCode, RequestResult};

/// Owns the core and the main loop task that keeps its channel open.
///
/// Dropping the service stops the main loop; [`RilService::shutdown`] also
/// waits for it.
#[derive(Debug)]
pub struct RilService {
    core: Arc<RilCore>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RilService {
    /// Start the main loop for `core` over `connector`. The core must have
    /// been created with `cancel`.
    pub(crate) fn start<C: Connector>(
        core: Arc<RilCore>,
        connector: C,
        cancel: CancellationToken,
    ) -> Self {
        let task = tokio::spawn(mainloop::run(
            core.clone(),
            Arc::new(connector),
            cancel.clone(),
        ));
        RilService {
            core,
            cancel,
            task: Some(task),
        }
    }

    pub fn on_request(&self, request: Request) -> PendingRequest {
        self.core.on_request(request)
    }

    /// Submit a request and wait for its completion.
    pub async fn request(&self, request: Request) -> RequestResult {
        self.core.request(request).await
    }

    pub fn current_state(&self) -> RadioState {
        self.core.current_state()
    }

    pub fn on_supports(&self, code: RequestCode) -> bool {
        self.core.on_supports(code)
    }

    pub fn on_cancel(&self, token: RequestToken) {
        self.core.on_cancel(token);
    }

    pub fn version(&self) -> &'static str {
        self.core.version()
    }

    /// Receive unsolicited events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RilEvent> {
        self.core.subscribe()
    }

    /// Shared core, for hosts that want the handler-facing API.
    pub fn core(&self) -> &Arc<RilCore> {
        &self.core
    }

    /// Close the channel and stop the main loop.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!(error = %e, "main loop task ended abnormally");
            }
        }
    }
}

impl Drop for RilService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
