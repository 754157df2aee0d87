//! The AT command channel.
//!
//! One tokio task owns the transport. It frames incoming bytes into lines,
//! completes the single in-flight command, and routes every other line to a
//! [`ChannelHandler`]. Callers talk to the task through the cloneable
//! [`AtChannel`] handle.
//!
//! # Invariants
//!
//! - At most one command is in flight. The IO task stops taking requests
//!   from its queue while a command is pending, so a second caller's bytes
//!   are never written before the first command's final result was framed.
//! - Unsolicited lines are handed to the handler as soon as they are framed,
//!   on the IO task. Handlers must not issue commands from that context;
//!   awaiting a command there would stall the very task that completes it.
//! - A command timeout tears the whole channel down. Closure happens once,
//!   wakes the pending caller and every queued caller with an error, then
//!   calls [`ChannelHandler::on_closed`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use ril_core::error::{Error, Result};
use ril_core::transport::Transport;

use crate::protocol::{self, Frame, LineFramer, CTRL_Z, MAX_AT_RESPONSE};
use crate::response::{AtCommand, AtResponse, CommandKind};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Configuration for the channel IO task.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Time allowed between writing a command and framing its final result.
    pub command_timeout: Duration,
    /// Largest unterminated response tolerated before the channel closes.
    pub max_response: usize,
    /// Depth of the request queue in front of the IO task.
    pub queue_depth: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(30),
            max_response: MAX_AT_RESPONSE,
            queue_depth: 32,
        }
    }
}

/// Why the channel closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// A command did not complete within the command timeout.
    Timeout,
    /// The peer closed the stream.
    Eof,
    /// Reading or writing the transport failed.
    Transport(String),
    /// The framer gave up on the byte stream.
    Framing(String),
    /// [`AtChannel::close`] was called, or every handle was dropped.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Timeout => f.write_str("command timeout"),
            CloseReason::Eof => f.write_str("end of stream"),
            CloseReason::Transport(e) => write!(f, "transport error: {e}"),
            CloseReason::Framing(e) => write!(f, "framing error: {e}"),
            CloseReason::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// Receiver of everything the channel does not route to a caller.
///
/// Both methods run on the channel's IO task and must return promptly.
pub trait ChannelHandler: Send + Sync + 'static {
    /// An unsolicited line. `pdu` is set for SMS indications (`+CMT:`,
    /// `+CDS:`, `+CBM:`) and carries the line that followed.
    fn on_unsolicited(&self, line: &str, pdu: Option<&str>);

    /// The channel closed. Called exactly once per channel.
    fn on_closed(&self, reason: &CloseReason);
}

/// Handler that drops everything.
pub struct NullHandler;

impl ChannelHandler for NullHandler {
    fn on_unsolicited(&self, _line: &str, _pdu: Option<&str>) {}
    fn on_closed(&self, _reason: &CloseReason) {}
}

struct Request {
    command: AtCommand,
    reply: oneshot::Sender<Result<AtResponse>>,
}

/// Handle to an open AT channel.
#[derive(Clone)]
pub struct AtChannel {
    tx: mpsc::Sender<Request>,
    shutdown: CancellationToken,
    done: CancellationToken,
    closed: Arc<AtomicBool>,
}

impl fmt::Debug for AtChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtChannel")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl AtChannel {
    /// Spawn the IO task over `transport` and return a handle to it.
    pub fn open(
        transport: Box<dyn Transport>,
        config: ChannelConfig,
        handler: Arc<dyn ChannelHandler>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let channel = AtChannel {
            tx,
            shutdown: CancellationToken::new(),
            done: CancellationToken::new(),
            closed: Arc::new(AtomicBool::new(false)),
        };

        let io = IoTask {
            transport,
            framer: LineFramer::new(config.max_response),
            config,
            handler,
            pending: None,
            sms_header: None,
            rx,
            shutdown: channel.shutdown.clone(),
            done: channel.done.clone(),
            closed: channel.closed.clone(),
        };
        tokio::spawn(io.run());
        channel
    }

    /// Issue a command and wait for its final result.
    ///
    /// Returns the response whatever its final result; command failures are
    /// reported through [`AtResponse::success`]. `Err` means the channel
    /// failed: [`Error::Timeout`] for the command that timed out,
    /// [`Error::ChannelClosed`] for anything caught in the closure.
    pub async fn execute(&self, command: AtCommand) -> Result<AtResponse> {
        if self.is_closed() {
            return Err(Error::ChannelClosed);
        }
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(Request { command, reply })
            .await
            .map_err(|_| Error::ChannelClosed)?;
        reply_rx.await.map_err(|_| Error::ChannelClosed)?
    }

    /// Command with no intermediate response. Fails on an error result.
    pub async fn send_command(&self, text: impl Into<String>) -> Result<AtResponse> {
        self.execute(AtCommand::no_result(text)).await?.into_result()
    }

    /// Command answered by one line starting with a digit.
    pub async fn send_command_numeric(&self, text: impl Into<String>) -> Result<String> {
        self.execute(AtCommand::numeric(text)).await?.into_single_line()
    }

    /// Command answered by exactly one line starting with `prefix`.
    pub async fn send_command_singleline(
        &self,
        text: impl Into<String>,
        prefix: &str,
    ) -> Result<String> {
        self.execute(AtCommand::singleline(text, prefix))
            .await?
            .into_single_line()
    }

    /// Command answered by zero or more lines starting with `prefix`.
    pub async fn send_command_multiline(
        &self,
        text: impl Into<String>,
        prefix: &str,
    ) -> Result<Vec<String>> {
        Ok(self
            .execute(AtCommand::multiline(text, prefix))
            .await?
            .into_result()?
            .intermediates)
    }

    /// Two-phase SMS exchange, answered by one line starting with `prefix`.
    pub async fn send_command_sms(
        &self,
        text: impl Into<String>,
        pdu: impl Into<String>,
        prefix: &str,
    ) -> Result<String> {
        self.execute(AtCommand::sms(text, pdu, prefix))
            .await?
            .into_single_line()
    }

    /// Ask the IO task to close the channel.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Whether the channel has closed (or begun closing).
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wait until the IO task has finished tearing down.
    pub async fn closed(&self) {
        self.done.cancelled().await;
    }
}

// ---------------------------------------------------------------------------
// IO task
// ---------------------------------------------------------------------------

/// How long a single transport read may block before the loop re-checks
/// its queue and deadline.
const READ_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, PartialEq, Eq)]
enum Stage {
    AwaitingPrompt,
    AwaitingResult,
}

struct Pending {
    command: AtCommand,
    reply: oneshot::Sender<Result<AtResponse>>,
    intermediates: Vec<String>,
    stage: Stage,
    deadline: Instant,
}

struct IoTask {
    transport: Box<dyn Transport>,
    framer: LineFramer,
    config: ChannelConfig,
    handler: Arc<dyn ChannelHandler>,
    pending: Option<Pending>,
    /// SMS indication waiting for its PDU line.
    sms_header: Option<String>,
    rx: mpsc::Receiver<Request>,
    shutdown: CancellationToken,
    done: CancellationToken,
    closed: Arc<AtomicBool>,
}

impl IoTask {
    async fn run(mut self) {
        let mut buf = [0u8; 512];

        let reason = loop {
            let deadline = self.pending.as_ref().map(|p| p.deadline);
            let idle = self.pending.is_none();

            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break CloseReason::Shutdown,

                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    warn!(
                        command = %self.pending.as_ref().map(|p| p.command.text.as_str()).unwrap_or(""),
                        "AT command timed out, closing channel"
                    );
                    break CloseReason::Timeout;
                }

                res = self.transport.receive(&mut buf, READ_POLL) => {
                    match res {
                        Ok(0) => break CloseReason::Eof,
                        Ok(n) => {
                            if let Err(reason) = self.on_bytes(&buf[..n]).await {
                                break reason;
                            }
                        }
                        Err(Error::Timeout) => {}
                        Err(e) => break CloseReason::Transport(e.to_string()),
                    }
                }

                req = self.rx.recv(), if idle => {
                    match req {
                        Some(req) => {
                            if let Err(reason) = self.start(req).await {
                                break reason;
                            }
                        }
                        None => break CloseReason::Shutdown,
                    }
                }
            }
        };

        self.teardown(reason).await;
    }

    /// Write a new command and make it the pending one.
    async fn start(&mut self, req: Request) -> std::result::Result<(), CloseReason> {
        let Request { command, reply } = req;
        if reply.is_closed() {
            debug!(command = %command.text, "caller went away before issue, dropping");
            return Ok(());
        }

        debug!(command = %command.text, "AT>");
        let mut bytes = Vec::with_capacity(command.text.len() + 1);
        bytes.extend_from_slice(command.text.as_bytes());
        bytes.push(b'\r');

        let stage = match command.kind {
            CommandKind::Sms { .. } => Stage::AwaitingPrompt,
            _ => Stage::AwaitingResult,
        };
        let deadline = Instant::now() + self.config.command_timeout;
        self.pending = Some(Pending {
            command,
            reply,
            intermediates: Vec::new(),
            stage,
            deadline,
        });

        self.write(&bytes, deadline).await
    }

    /// Write to the transport, giving up at the pending command's deadline.
    async fn write(
        &mut self,
        bytes: &[u8],
        deadline: Instant,
    ) -> std::result::Result<(), CloseReason> {
        tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => Err(CloseReason::Shutdown),

            res = tokio::time::timeout_at(deadline, self.transport.send(bytes)) => match res {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(CloseReason::Transport(e.to_string())),
                Err(_) => {
                    warn!(bytes = bytes.len(), "AT write timed out, closing channel");
                    Err(CloseReason::Timeout)
                }
            },
        }
    }

    async fn on_bytes(&mut self, data: &[u8]) -> std::result::Result<(), CloseReason> {
        trace!(bytes = data.len(), "AT raw input");
        if let Err(e) = self.framer.push(data) {
            warn!(error = %e, "AT framing failed, closing channel");
            return Err(CloseReason::Framing(e.to_string()));
        }

        loop {
            let expect_prompt = self
                .pending
                .as_ref()
                .is_some_and(|p| p.stage == Stage::AwaitingPrompt);
            match self.framer.next_frame(expect_prompt) {
                Some(Frame::Line(line)) => self.on_line(line),
                Some(Frame::Prompt) => self.on_prompt().await?,
                None => return Ok(()),
            }
        }
    }

    async fn on_prompt(&mut self) -> std::result::Result<(), CloseReason> {
        let Some(pending) = self.pending.as_mut() else {
            return Ok(());
        };
        let CommandKind::Sms { pdu, .. } = &pending.command.kind else {
            return Ok(());
        };
        debug!(pdu_len = pdu.len(), "AT> <pdu>");
        let mut bytes = Vec::with_capacity(pdu.len() + 1);
        bytes.extend_from_slice(pdu.as_bytes());
        bytes.push(CTRL_Z);
        pending.stage = Stage::AwaitingResult;
        let deadline = pending.deadline;

        self.write(&bytes, deadline).await
    }

    fn on_line(&mut self, line: String) {
        debug!(line = %line, "AT<");

        if let Some(header) = self.sms_header.take() {
            self.handler.on_unsolicited(&header, Some(&line));
            return;
        }
        if protocol::is_sms_unsolicited(&line) {
            self.sms_header = Some(line);
            return;
        }

        let Some(pending) = self.pending.as_mut() else {
            self.handler.on_unsolicited(&line, None);
            return;
        };

        if let Some(result) = protocol::classify_final(&line) {
            if let Some(pending) = self.pending.take() {
                let response = AtResponse::complete(line, &result, pending.intermediates);
                let _ = pending.reply.send(Ok(response));
            }
        } else if pending.command.accepts(&line, pending.intermediates.len()) {
            pending.intermediates.push(line);
        } else {
            self.handler.on_unsolicited(&line, None);
        }
    }

    async fn teardown(mut self, reason: CloseReason) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(reason = %reason, "AT channel closed");

        if let Some(pending) = self.pending.take() {
            let err = if reason == CloseReason::Timeout {
                Error::Timeout
            } else {
                Error::ChannelClosed
            };
            let _ = pending.reply.send(Err(err));
        }

        self.rx.close();
        while let Ok(req) = self.rx.try_recv() {
            let _ = req.reply.send(Err(Error::ChannelClosed));
        }

        if let Err(e) = self.transport.close().await {
            debug!(error = %e, "transport close failed");
        }

        self.handler.on_closed(&reason);
        self.done.cancel();
    }
}
