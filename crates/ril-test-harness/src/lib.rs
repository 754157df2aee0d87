//! ril-test-harness: test utilities for the AT-modem RIL.
//!
//! This crate provides [`MockModem`], a scripted in-memory modem
//! implementing [`Transport`](ril_core::Transport), for deterministic testing
//! of the AT channel, the radio state machine and the request vocabulary
//! without real hardware.

pub mod mock_modem;

pub use mock_modem::{frame_lines, MockModem, MockModemHandle, ModemEvent};
