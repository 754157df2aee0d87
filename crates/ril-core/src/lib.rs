//! ril-core: core types, errors and traits for the AT-modem RIL.
//!
//! This crate defines the vendor-agnostic vocabulary shared by the
//! transport, AT channel and modem layers, so that hosts can depend on
//! these types without pulling in a transport or a vendor profile.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level link to the modem
//! - [`RilEvent`] -- unsolicited notifications for the host
//! - [`RadioState`] -- the state machine phase gating requests
//! - [`Error`] / [`Result`] -- internal error handling
//! - [`RilErrno`] -- the failure code a host request completes with

pub mod error;
pub mod events;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use events::RilEvent;
pub use transport::Transport;
pub use types::*;
