//! AT command channel for modem RIL backends.
//!
//! This crate turns a raw modem byte stream into a request/response channel
//! with a side stream of unsolicited lines. One tokio task owns the
//! transport, frames lines, serializes command issuance and enforces the
//! command timeout.
//!
//! # Architecture
//!
//! - [`protocol`] -- line framing, SMS prompt handling, final result tokens
//! - [`tokenizer`] -- typed field cursor for response grammars
//! - [`response`] -- command shapes and structured responses
//! - [`channel`] -- the IO task and the [`AtChannel`] handle

pub mod channel;
pub mod protocol;
pub mod response;
pub mod tokenizer;

pub use channel::{AtChannel, ChannelConfig, ChannelHandler, CloseReason, NullHandler};
pub use response::{AtCommand, AtResponse, CommandKind};
pub use tokenizer::{Fields, Token};
