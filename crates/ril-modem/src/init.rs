//! Command-line configuration and the library-mode entry point.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgGroup, Parser};
use ril_transport::TransportSource;
use tracing::warn;

use crate::builder::RilBuilder;
use crate::service::RilService;

/// Where to find the modem, plus channel tuning.
///
/// Exactly one of `-p`, `-d` or `-s` must be given.
#[derive(Debug, Clone, Parser)]
#[command(name = "rild")]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["port", "device", "socket"])
))]
pub struct RilArgs {
    /// Connect to the AT interface on 127.0.0.1:<PORT>.
    #[arg(short = 'p', long, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// Open the AT interface as a character device (e.g. /dev/ttyUSB2).
    #[arg(short = 'd', long)]
    pub device: Option<PathBuf>,

    /// Connect to the AT interface over a Unix-domain socket.
    #[arg(short = 's', long)]
    pub socket: Option<PathBuf>,

    /// Per-command timeout in seconds.
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,
}

impl RilArgs {
    /// The configured transport source, if any.
    pub fn source(&self) -> Option<TransportSource> {
        if let Some(port) = self.port {
            Some(TransportSource::Loopback(port))
        } else if let Some(device) = &self.device {
            Some(TransportSource::Device(device.clone()))
        } else {
            self.socket.clone().map(TransportSource::LocalSocket)
        }
    }

    /// A builder carrying these settings.
    pub fn builder(&self) -> RilBuilder {
        let mut builder = RilBuilder::new();
        if let Some(source) = self.source() {
            builder = builder.source(source);
        }
        if let Some(secs) = self.timeout {
            builder = builder.command_timeout(Duration::from_secs(secs));
        }
        builder
    }
}

/// Start a service from an argument vector, first element being the
/// program name.
///
/// Returns `None` when the arguments do not name exactly one transport
/// source. Must be called inside a tokio runtime.
pub fn ril_init<I, T>(argv: I) -> Option<RilService>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = match RilArgs::try_parse_from(argv) {
        Ok(args) => args,
        Err(e) => {
            warn!(error = %e, "invalid RIL arguments");
            return None;
        }
    };
    match args.builder().build() {
        Ok(service) => Some(service),
        Err(e) => {
            warn!(error = %e, "RIL not started");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_flag_selects_its_source() {
        let args = RilArgs::try_parse_from(["rild", "-p", "5038"]).unwrap();
        assert_eq!(args.source(), Some(TransportSource::Loopback(5038)));

        let args = RilArgs::try_parse_from(["rild", "-d", "/dev/ttyUSB2"]).unwrap();
        assert_eq!(args.source(), Some(TransportSource::Device("/dev/ttyUSB2".into())));

        let args = RilArgs::try_parse_from(["rild", "-s", "/dev/socket/modem"]).unwrap();
        assert_eq!(
            args.source(),
            Some(TransportSource::LocalSocket("/dev/socket/modem".into()))
        );
    }

    #[test]
    fn exactly_one_source_is_required() {
        assert!(RilArgs::try_parse_from(["rild"]).is_err());
        assert!(RilArgs::try_parse_from(["rild", "-p", "1", "-d", "/dev/tty"]).is_err());
        assert!(RilArgs::try_parse_from(["rild", "-p", "0"]).is_err());
    }

    #[test]
    fn timeout_is_optional_seconds() {
        let args = RilArgs::try_parse_from(["rild", "-p", "5038", "--timeout", "20"]).unwrap();
        assert_eq!(args.timeout, Some(20));
        assert!(RilArgs::try_parse_from(["rild", "-p", "5038", "--timeout", "0"]).is_err());
    }

    #[tokio::test]
    async fn ril_init_without_source_is_none() {
        assert!(ril_init(["rild"]).is_none());
        assert!(ril_init(["rild", "--bogus"]).is_none());
    }

    #[tokio::test]
    async fn ril_init_with_source_starts() {
        let ril = ril_init(["rild", "-s", "/nonexistent/ril/at.sock"]).unwrap();
        assert!(ril.version().starts_with("ril-modem"));
        ril.shutdown().await;
    }
}
