//! Command descriptors and structured responses.

use ril_core::error::{Error, Result};

use crate::protocol::{self, FinalResult};

/// Response shape of an AT command.
///
/// The shape decides which non-final lines the channel collects as
/// intermediates while the command is in flight. Lines that do not fit the
/// shape are routed to the unsolicited handler instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    /// Only a final result is expected.
    NoResult,
    /// One intermediate line starting with a digit (IMSI, IMEI, ...).
    Numeric,
    /// One intermediate line starting with `prefix`.
    SingleLine { prefix: String },
    /// Any number of intermediate lines starting with `prefix`.
    MultiLine { prefix: String },
    /// Two-phase SMS exchange: wait for `"> "`, write `pdu` + Ctrl-Z, then
    /// behave like [`SingleLine`](CommandKind::SingleLine).
    Sms { prefix: String, pdu: String },
}

/// A command queued on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtCommand {
    /// Command text without the trailing `\r`.
    pub text: String,
    pub kind: CommandKind,
}

impl AtCommand {
    pub fn no_result(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: CommandKind::NoResult,
        }
    }

    pub fn numeric(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: CommandKind::Numeric,
        }
    }

    pub fn singleline(text: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: CommandKind::SingleLine {
                prefix: prefix.into(),
            },
        }
    }

    pub fn multiline(text: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: CommandKind::MultiLine {
                prefix: prefix.into(),
            },
        }
    }

    pub fn sms(text: impl Into<String>, pdu: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: CommandKind::Sms {
                prefix: prefix.into(),
                pdu: pdu.into(),
            },
        }
    }

    /// Whether `line` belongs to this command given the intermediates
    /// collected so far.
    pub(crate) fn accepts(&self, line: &str, collected: usize) -> bool {
        match &self.kind {
            CommandKind::NoResult => false,
            CommandKind::Numeric => {
                collected == 0 && line.bytes().next().is_some_and(|b| b.is_ascii_digit())
            }
            CommandKind::SingleLine { prefix } | CommandKind::Sms { prefix, .. } => {
                collected == 0 && line.starts_with(prefix.as_str())
            }
            CommandKind::MultiLine { prefix } => line.starts_with(prefix.as_str()),
        }
    }
}

/// Outcome of one command exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtResponse {
    /// Whether the final result was a success token.
    pub success: bool,
    /// The final result line as received.
    pub final_line: String,
    /// Collected intermediate lines, in arrival order.
    pub intermediates: Vec<String>,
}

impl AtResponse {
    pub(crate) fn complete(final_line: String, result: &FinalResult, intermediates: Vec<String>) -> Self {
        Self {
            success: matches!(result, FinalResult::Success),
            final_line,
            intermediates,
        }
    }

    /// CME/CMS error code of a failed response.
    pub fn cme_error(&self) -> Option<u32> {
        if self.success {
            None
        } else {
            protocol::parse_error_code(&self.final_line)
        }
    }

    /// Turn a failing final result into [`Error::CommandFailed`].
    pub fn into_result(self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            let cme = self.cme_error();
            Err(Error::CommandFailed {
                final_line: self.final_line,
                cme,
            })
        }
    }

    /// The first intermediate line, required by single-line shapes.
    pub fn into_single_line(self) -> Result<String> {
        self.into_result()?
            .intermediates
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidResponse("success without intermediate line".into()))
    }
}
