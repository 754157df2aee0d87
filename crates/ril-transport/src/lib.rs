//! Transport implementations for the AT-modem RIL.
//!
//! This crate provides concrete [`Transport`](ril_core::Transport)
//! implementations for the three places a modem AT port can live:
//!
//! - [`serial::open_device`]: a character device, raw mode for ttys
//! - [`tcp::connect_loopback`]: a TCP listener on `127.0.0.1`
//! - [`local::connect_local`]: a Unix-domain stream socket
//!
//! [`TransportSource`] picks one of them and wraps the boot-time
//! retry-forever loop.

pub mod chardev;
pub mod local;
pub mod serial;
pub mod source;
pub mod stream;
pub mod tcp;

pub use chardev::CharDevice;
pub use serial::SerialConfig;
pub use source::TransportSource;
pub use stream::StreamTransport;
