//! ril-modem: the radio interface layer for AT-command modems.
//!
//! This crate sits between a host (a telephony framework or the `rild`
//! daemon) and a modem's AT port. It keeps one [`AtChannel`](ril_at::AtChannel)
//! open, tracks the radio/SIM state, turns host requests into AT exchanges
//! and unsolicited modem lines into [`RilEvent`](ril_core::RilEvent)s.
//!
//! # Architecture
//!
//! - [`radio`] -- the five-state radio state machine and its closed flag
//! - [`scheduler`] -- the single deferred-task queue
//! - [`bringup`] -- initialization, power-on and SIM-ready sequences, SIM polling
//! - [`unsolicited`] -- the unsolicited line table
//! - [`requests`] / [`vocabulary`] -- request codes, gating and the standard handlers
//! - [`commands`] -- AT command builders and response parsers
//! - [`core`](crate::core) -- [`RilCore`], shared by all of the above
//! - [`mainloop`] / [`service`] -- the reconnect loop and the host handle
//! - [`builder`] / [`init`] -- ways to start a service
//!
//! # Example
//!
//! ```no_run
//! use ril_modem::{Request, RilBuilder};
//!
//! # async fn example() -> ril_core::Result<()> {
//! let ril = RilBuilder::new().loopback(5038).build()?;
//! let mut events = ril.subscribe();
//! let result = ril.request(Request::SignalStrength).await;
//! println!("{result:?}");
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod bringup;
pub mod builder;
pub mod commands;
pub mod config;
pub mod core;
pub mod gsm;
pub mod init;
pub mod mainloop;
pub mod radio;
pub mod requests;
pub mod scheduler;
pub mod service;
pub mod unsolicited;
pub mod vocabulary;

pub use builder::RilBuilder;
pub use config::{RilConfig, RIL_VERSION};
pub use crate::core::{PendingRequest, RequestToken, RilCore};
pub use init::{ril_init, RilArgs};
pub use mainloop::{Connector, SourceConnector};
pub use requests::{Request, RequestCode, RequestHandler, RequestResult, RequestTable, Response};
pub use scheduler::DeferredTask;
pub use service::RilService;
pub use vocabulary::{
    CallRequests, DataRequests, DeviceRequests, NetworkRequests, SimRequests, SmsRequests,
};
