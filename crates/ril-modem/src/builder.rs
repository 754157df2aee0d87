//! RilBuilder -- fluent builder for a running [`RilService`].
//!
//! Separates configuration from start-up so callers can pick the transport
//! source, adjust timeouts and swap request handlers before the main loop
//! starts connecting.
//!
//! # Example
//!
//! ```no_run
//! use ril_modem::RilBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> ril_core::Result<()> {
//! let ril = RilBuilder::new()
//!     .device("/dev/ttyUSB2")
//!     .command_timeout(Duration::from_secs(20))
//!     .build()?;
//! println!("{}", ril.version());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ril_core::error::{Error, Result};
use ril_transport::{SerialConfig, TransportSource};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::RilConfig;
use crate::core::RilCore;
use crate::mainloop::{Connector, SourceConnector};
use crate::requests::{RequestCode, RequestHandler, RequestTable};
use crate::service::RilService;

/// Fluent builder for [`RilService`].
///
/// Everything but the transport source has a default, so the simplest
/// usage is:
///
/// ```ignore
/// let ril = RilBuilder::new().loopback(5038).build()?;
/// ```
#[derive(Default)]
pub struct RilBuilder {
    config: RilConfig,
    source: Option<TransportSource>,
    table: Option<RequestTable>,
    overrides: Vec<(Vec<RequestCode>, Arc<dyn RequestHandler>)>,
}

impl fmt::Debug for RilBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RilBuilder")
            .field("config", &self.config)
            .field("source", &self.source)
            .field("overrides", &self.overrides.len())
            .finish()
    }
}

impl RilBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: RilConfig) -> Self {
        self.config = config;
        self
    }

    pub fn source(mut self, source: TransportSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Connect to a TCP listener on `127.0.0.1:<port>`.
    pub fn loopback(self, port: u16) -> Self {
        self.source(TransportSource::Loopback(port))
    }

    /// Open a character device such as `/dev/ttyUSB2`.
    pub fn device(self, path: impl Into<PathBuf>) -> Self {
        self.source(TransportSource::Device(path.into()))
    }

    /// Connect to a Unix-domain stream socket.
    pub fn socket(self, path: impl Into<PathBuf>) -> Self {
        self.source(TransportSource::LocalSocket(path.into()))
    }

    /// Time allowed for a single AT command (default: 30s).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Delay between SIM polls while the SIM is not ready (default: 1s).
    pub fn sim_poll_interval(mut self, interval: Duration) -> Self {
        self.config.sim_poll_interval = interval;
        self
    }

    /// Sleep between failed connection attempts (default: 10s).
    pub fn reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.config.reconnect_backoff = backoff;
        self
    }

    /// Line settings for tty sources.
    pub fn serial(mut self, serial: SerialConfig) -> Self {
        self.config.serial = serial;
        self
    }

    /// Start from `table` instead of the standard vocabulary.
    pub fn request_table(mut self, table: RequestTable) -> Self {
        self.table = Some(table);
        self
    }

    /// Serve `codes` with `handler`, on top of whichever table is in use.
    pub fn handler(mut self, codes: &[RequestCode], handler: Arc<dyn RequestHandler>) -> Self {
        self.overrides.push((codes.to_vec(), handler));
        self
    }

    /// Start the service over the configured transport source.
    ///
    /// Requires that a source has been set. Must be called inside a tokio
    /// runtime.
    pub fn build(self) -> Result<RilService> {
        let source = self
            .source
            .clone()
            .ok_or_else(|| Error::InvalidParameter("a transport source is required".into()))?;
        info!(%source, "starting RIL");
        let connector = SourceConnector {
            source,
            serial: self.config.serial.clone(),
            backoff: self.config.reconnect_backoff,
        };
        Ok(self.build_with_connector(connector))
    }

    /// Start the service over a caller-provided connector.
    ///
    /// This is the entry point for tests and for hosts that manage the
    /// transport themselves. Any configured source is ignored.
    pub fn build_with_connector<C: Connector>(self, connector: C) -> RilService {
        let mut table = self.table.unwrap_or_else(RequestTable::standard);
        for (codes, handler) in self.overrides {
            table.register(&codes, handler);
        }
        let cancel = CancellationToken::new();
        let core = RilCore::new(self.config, table, cancel.clone());
        RilService::start(core, connector, cancel)
    }
}
