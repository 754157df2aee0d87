//! Connect / initialize / wait-for-closure / reconnect loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ril_core::transport::Transport;
use ril_transport::{SerialConfig, TransportSource};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::RilCore;
use crate::scheduler::DeferredTask;

/// Produces a fresh transport for each connection attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Block until a transport is available. `None` means `cancel` fired.
    async fn connect(&self, cancel: &CancellationToken) -> Option<Box<dyn Transport>>;
}

/// Connects to a [`TransportSource`], retrying forever with a fixed backoff.
#[derive(Debug, Clone)]
pub struct SourceConnector {
    pub source: TransportSource,
    pub serial: SerialConfig,
    pub backoff: Duration,
}

#[async_trait]
impl Connector for SourceConnector {
    async fn connect(&self, cancel: &CancellationToken) -> Option<Box<dyn Transport>> {
        let transport = self
            .source
            .connect_forever(&self.serial, self.backoff, cancel)
            .await?;
        info!(source = %self.source, "AT interface connected");
        Some(transport)
    }
}

/// Drive `core` until `cancel` fires.
///
/// Each pass opens a channel, queues initialization and waits for the
/// channel to close. A closed channel leaves the radio UNAVAILABLE until the
/// next pass brings it back.
pub async fn run<C: Connector + ?Sized>(core: Arc<RilCore>, connector: Arc<C>, cancel: CancellationToken) {
    loop {
        let transport = tokio::select! {
            _ = cancel.cancelled() => break,
            transport = connector.connect(&cancel) => match transport {
                Some(transport) => transport,
                None => break,
            },
        };

        let channel = core.attach_channel(transport);
        core.schedule(DeferredTask::Initialize, Duration::ZERO);

        tokio::select! {
            _ = cancel.cancelled() => {
                channel.close();
                channel.closed().await;
                break;
            }
            _ = core.radio().wait_closed() => {
                warn!("AT channel closed, re-opening");
            }
        }
    }
    info!("RIL main loop stopped");
}
