//! Error types for the RIL.
//!
//! All fallible operations below the host surface return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport faults, AT framing faults,
//! command failures reported by the modem and response parse failures are
//! all captured here.
//!
//! What the host finally sees is a [`RilErrno`](crate::types::RilErrno);
//! the conversion from [`Error`] is lossy on purpose.

/// The error type for all RIL operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial device, loopback socket, local socket).
    #[error("transport error: {0}")]
    Transport(String),

    /// The byte stream could not be framed into AT lines (oversized
    /// response, unexpected prompt). Fatal to the channel.
    #[error("framing error: {0}")]
    Framing(String),

    /// No final result arrived within the command timeout.
    ///
    /// A timed-out command leaves the link in an unknown framing state, so
    /// the channel is torn down whenever this is returned by a command.
    #[error("timeout waiting for final result")]
    Timeout,

    /// The AT channel was closed while the command was queued or in flight.
    #[error("AT channel closed")]
    ChannelClosed,

    /// The modem answered with a failing final result (`ERROR`,
    /// `+CME ERROR: n`, `NO CARRIER`, ...).
    #[error("command failed: {final_line}")]
    CommandFailed {
        /// The final result line exactly as received.
        final_line: String,
        /// The numeric code of a `+CME ERROR: n` / `+CMS ERROR: n` result.
        cme: Option<u32>,
    },

    /// The command succeeded at the framing level but the response did not
    /// follow the expected grammar.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// An invalid parameter was passed to a request or command builder.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No AT channel is currently open.
    #[error("not connected")]
    NotConnected,

    /// The connection to the modem was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The CME/CMS error code, if this is a command failure carrying one.
    pub fn cme_error(&self) -> Option<u32> {
        match self {
            Error::CommandFailed { cme, .. } => *cme,
            _ => None,
        }
    }

    /// Whether this error means the channel itself is gone, as opposed to a
    /// failure local to one command.
    pub fn is_channel_fault(&self) -> bool {
        matches!(
            self,
            Error::Timeout
                | Error::ChannelClosed
                | Error::NotConnected
                | Error::ConnectionLost
                | Error::Framing(_)
                | Error::Transport(_)
                | Error::Io(_)
        )
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_framing() {
        let e = Error::Framing("response exceeds 4096 bytes".into());
        assert_eq!(e.to_string(), "framing error: response exceeds 4096 bytes");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for final result");
    }

    #[test]
    fn error_display_command_failed() {
        let e = Error::CommandFailed {
            final_line: "+CME ERROR: 10".into(),
            cme: Some(10),
        };
        assert_eq!(e.to_string(), "command failed: +CME ERROR: 10");
        assert_eq!(e.cme_error(), Some(10));
    }

    #[test]
    fn plain_error_has_no_cme_code() {
        let e = Error::CommandFailed {
            final_line: "ERROR".into(),
            cme: None,
        };
        assert_eq!(e.cme_error(), None);
        assert_eq!(Error::Timeout.cme_error(), None);
    }

    #[test]
    fn channel_faults_are_distinguished_from_command_failures() {
        assert!(Error::Timeout.is_channel_fault());
        assert!(Error::ChannelClosed.is_channel_fault());
        assert!(Error::Framing("overflow".into()).is_channel_fault());
        assert!(!Error::InvalidResponse("bad +CREG".into()).is_channel_fault());
        assert!(!Error::CommandFailed {
            final_line: "ERROR".into(),
            cme: None
        }
        .is_channel_fault());
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
