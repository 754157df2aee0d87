//! Scripted mock modem for deterministic testing of the AT channel and the
//! layers above it.
//!
//! [`MockModem`] implements [`Transport`]. Commands written to it are
//! matched against a script and the scripted reply is queued for the next
//! `receive()` calls. A cloneable [`MockModemHandle`] stays with the test
//! after the modem itself has been boxed into a channel, so tests can keep
//! scripting, inject unsolicited lines, drop the link, and inspect traffic.
//!
//! # Example
//!
//! ```
//! use ril_test_harness::MockModem;
//!
//! let modem = MockModem::new();
//! let handle = modem.handle();
//! handle.expect("AT+CSQ", &["+CSQ: 14,99", "OK"]);
//! handle.on("AT+CPIN?", &["+CPIN: READY", "OK"]);
//! handle.fallback(&["OK"]);
//! ```
//!
//! Matching order for each written command: the head of the ordered
//! expectation queue, then persistent rules (latest first), then the
//! fallback reply. A command matching none of them is recorded as
//! unexpected and answered with `ERROR`.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use ril_core::error::{Error, Result};
use ril_core::transport::Transport;

/// Something that happened on the mock link, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemEvent {
    /// A command (or SMS PDU) written by the host, terminator stripped.
    Received(String),
    /// A reply chunk handed to the host by `receive()`.
    Delivered(String),
}

#[derive(Debug)]
struct Expectation {
    command: String,
    /// `None` scripts silence.
    response: Option<Vec<u8>>,
    delay: Duration,
}

#[derive(Debug)]
struct Chunk {
    ready_at: Instant,
    bytes: Vec<u8>,
    offset: usize,
}

#[derive(Debug, Default)]
struct State {
    expectations: VecDeque<Expectation>,
    rules: Vec<(String, Vec<u8>)>,
    fallback: Option<Vec<u8>>,
    inbound: VecDeque<Chunk>,
    events: Vec<ModemEvent>,
    sent_raw: Vec<Vec<u8>>,
    unexpected: Vec<String>,
    closed_by_host: bool,
    hung_up: bool,
    writes_stalled: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    data_ready: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enqueue(&self, bytes: Vec<u8>, delay: Duration) {
        self.lock().inbound.push_back(Chunk {
            ready_at: Instant::now() + delay,
            bytes,
            offset: 0,
        });
        self.data_ready.notify_one();
    }
}

/// Render reply lines the way a modem does: each line followed by CR LF,
/// the whole reply preceded by CR LF.
pub fn frame_lines(lines: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    for line in lines {
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

fn strip_terminator(data: &[u8]) -> String {
    let end = data
        .iter()
        .rposition(|&b| b != b'\r' && b != b'\n' && b != 0x1a)
        .map_or(0, |i| i + 1);
    String::from_utf8_lossy(&data[..end]).into_owned()
}

// ---------------------------------------------------------------------------
// MockModem
// ---------------------------------------------------------------------------

/// A mock [`Transport`] scripted like a modem.
#[derive(Debug, Default)]
pub struct MockModem {
    shared: Arc<Shared>,
}

impl MockModem {
    /// Create a new mock modem with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that keeps working after the modem has been boxed.
    pub fn handle(&self) -> MockModemHandle {
        MockModemHandle {
            shared: self.shared.clone(),
        }
    }
}

#[async_trait]
impl Transport for MockModem {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let reply = {
            let mut state = self.shared.lock();
            if state.closed_by_host || state.hung_up {
                return Err(Error::NotConnected);
            }
            let command = strip_terminator(data);
            state.sent_raw.push(data.to_vec());
            state.events.push(ModemEvent::Received(command.clone()));

            let head_matches = state
                .expectations
                .front()
                .is_some_and(|e| e.command == command);
            let rule = state
                .rules
                .iter()
                .rev()
                .find(|(c, _)| *c == command)
                .map(|(_, reply)| reply.clone());

            if state.writes_stalled {
                None
            } else if head_matches {
                state
                    .expectations
                    .pop_front()
                    .and_then(|e| e.response.map(|r| (r, e.delay)))
            } else if let Some(reply) = rule.or_else(|| state.fallback.clone()) {
                Some((reply, Duration::ZERO))
            } else {
                tracing::warn!(command = %command, "mock modem: unexpected command");
                state.unexpected.push(command);
                Some((frame_lines(&["ERROR"]), Duration::ZERO))
            }
        };

        let stalled = self.shared.lock().writes_stalled;
        if stalled {
            std::future::pending::<()>().await;
        }
        if let Some((bytes, delay)) = reply {
            self.shared.enqueue(bytes, delay);
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;
        loop {
            let wake_at = {
                let mut state = self.shared.lock();
                if state.closed_by_host {
                    return Err(Error::NotConnected);
                }
                let now = Instant::now();
                let hung_up = state.hung_up;
                match state.inbound.front_mut() {
                    Some(chunk) if chunk.ready_at <= now => {
                        let first = chunk.offset == 0;
                        let remaining = &chunk.bytes[chunk.offset..];
                        let n = remaining.len().min(buf.len());
                        buf[..n].copy_from_slice(&remaining[..n]);
                        chunk.offset += n;
                        let text = first.then(|| String::from_utf8_lossy(&chunk.bytes).into_owned());
                        if chunk.offset >= chunk.bytes.len() {
                            state.inbound.pop_front();
                        }
                        if let Some(text) = text {
                            state.events.push(ModemEvent::Delivered(text));
                        }
                        return Ok(n);
                    }
                    Some(chunk) => chunk.ready_at.min(deadline),
                    None if hung_up => return Ok(0),
                    None => deadline,
                }
            };

            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            tokio::select! {
                _ = self.shared.data_ready.notified() => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
            if Instant::now() >= deadline && !self.has_ready_data() {
                return Err(Error::Timeout);
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.shared.lock().closed_by_host = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let state = self.shared.lock();
        !state.closed_by_host && !state.hung_up
    }
}

impl MockModem {
    fn has_ready_data(&self) -> bool {
        let state = self.shared.lock();
        state.hung_up
            || state
                .inbound
                .front()
                .is_some_and(|c| c.ready_at <= Instant::now())
    }
}

// ---------------------------------------------------------------------------
// MockModemHandle
// ---------------------------------------------------------------------------

/// Test-side control over a [`MockModem`].
#[derive(Debug, Clone)]
pub struct MockModemHandle {
    shared: Arc<Shared>,
}

impl MockModemHandle {
    /// Expect `command` next and answer with `lines`.
    pub fn expect(&self, command: &str, lines: &[&str]) {
        self.expect_raw(command, &frame_lines(lines));
    }

    /// Expect `command` next and answer with exact bytes (e.g. the SMS
    /// prompt `"\r\n> "`).
    pub fn expect_raw(&self, command: &str, bytes: &[u8]) {
        self.push_expectation(command, Some(bytes.to_vec()), Duration::ZERO);
    }

    /// Expect `command` next and answer with `lines` after `delay`.
    pub fn expect_delayed(&self, command: &str, lines: &[&str], delay: Duration) {
        self.push_expectation(command, Some(frame_lines(lines)), delay);
    }

    /// Expect `command` next and never answer it.
    pub fn expect_silence(&self, command: &str) {
        self.push_expectation(command, None, Duration::ZERO);
    }

    fn push_expectation(&self, command: &str, response: Option<Vec<u8>>, delay: Duration) {
        self.shared.lock().expectations.push_back(Expectation {
            command: command.to_string(),
            response,
            delay,
        });
    }

    /// Answer `command` with `lines` every time it is written, unless an
    /// ordered expectation claims it first. Later rules win.
    pub fn on(&self, command: &str, lines: &[&str]) {
        self.shared
            .lock()
            .rules
            .push((command.to_string(), frame_lines(lines)));
    }

    /// Reply for commands nothing else matched.
    pub fn fallback(&self, lines: &[&str]) {
        self.shared.lock().fallback = Some(frame_lines(lines));
    }

    /// Emit an unsolicited line now.
    pub fn push_unsolicited(&self, line: &str) {
        self.shared.enqueue(frame_lines(&[line]), Duration::ZERO);
    }

    /// Emit raw bytes now.
    pub fn push_raw(&self, bytes: &[u8]) {
        self.shared.enqueue(bytes.to_vec(), Duration::ZERO);
    }

    /// Make every later write block forever, as a wedged device would.
    pub fn stall_writes(&self) {
        self.shared.lock().writes_stalled = true;
    }

    /// Drop the link: pending replies still drain, then reads report EOF.
    pub fn hang_up(&self) {
        self.shared.lock().hung_up = true;
        self.shared.data_ready.notify_one();
    }

    /// Commands written so far, terminators stripped.
    pub fn received(&self) -> Vec<String> {
        self.shared
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                ModemEvent::Received(c) => Some(c.clone()),
                ModemEvent::Delivered(_) => None,
            })
            .collect()
    }

    /// How many times `command` was written.
    pub fn count(&self, command: &str) -> usize {
        self.received().iter().filter(|c| *c == command).count()
    }

    /// Raw bytes of every `send()` call.
    pub fn sent_raw(&self) -> Vec<Vec<u8>> {
        self.shared.lock().sent_raw.clone()
    }

    /// Ordered log of received commands and delivered replies.
    pub fn events(&self) -> Vec<ModemEvent> {
        self.shared.lock().events.clone()
    }

    /// Commands that matched no script entry.
    pub fn unexpected(&self) -> Vec<String> {
        self.shared.lock().unexpected.clone()
    }

    /// Ordered expectations not yet consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.shared.lock().expectations.len()
    }

    /// Wait until `command` has been written at least once.
    pub async fn wait_for_command(&self, command: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.count(command) > 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
