//! Runtime configuration for the RIL service.

use std::time::Duration;

use ril_at::ChannelConfig;
use ril_at::protocol::MAX_AT_RESPONSE;
use ril_transport::SerialConfig;

/// Version string reported to the host.
pub const RIL_VERSION: &str = concat!("ril-modem ", env!("CARGO_PKG_VERSION"));

/// Tunables for the service, the channel it opens, and its deferred tasks.
#[derive(Debug, Clone)]
pub struct RilConfig {
    /// Time allowed for any single AT command to reach its final result.
    pub command_timeout: Duration,
    /// Largest unterminated response the framer tolerates.
    pub max_response: usize,
    /// Delay between SIM status polls while the SIM is not ready.
    pub sim_poll_interval: Duration,
    /// Delay before re-announcing call state while calls are transitional.
    pub call_state_repoll: Duration,
    /// Sleep between failed connection attempts.
    pub reconnect_backoff: Duration,
    /// Attempts for `+CREG?` / `+CGREG?` queries.
    pub registration_retries: u32,
    /// Attempts for `AT+CIMI`, spaced by `imsi_retry_interval`.
    pub imsi_retries: u32,
    pub imsi_retry_interval: Duration,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Network interface reported for PDP contexts.
    pub data_ifname: String,
    /// Line settings used when the source is a tty.
    pub serial: SerialConfig,
}

impl Default for RilConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(30),
            max_response: MAX_AT_RESPONSE,
            sim_poll_interval: Duration::from_secs(1),
            call_state_repoll: Duration::from_millis(500),
            reconnect_backoff: Duration::from_secs(10),
            registration_retries: 4,
            imsi_retries: 10,
            imsi_retry_interval: Duration::from_secs(1),
            event_capacity: 64,
            data_ifname: "ppp0".into(),
            serial: SerialConfig::default(),
        }
    }
}

impl RilConfig {
    /// Channel settings derived from this configuration.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            command_timeout: self.command_timeout,
            max_response: self.max_response,
            ..ChannelConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_modem_timings() {
        let c = RilConfig::default();
        assert_eq!(c.sim_poll_interval, Duration::from_secs(1));
        assert_eq!(c.call_state_repoll, Duration::from_millis(500));
        assert_eq!(c.reconnect_backoff, Duration::from_secs(10));
        assert_eq!(c.registration_retries, 4);
        assert_eq!(c.max_response, 0x1000);
    }

    #[test]
    fn channel_config_follows_timeout() {
        let c = RilConfig {
            command_timeout: Duration::from_secs(3),
            ..RilConfig::default()
        };
        let ch = c.channel_config();
        assert_eq!(ch.command_timeout, Duration::from_secs(3));
        assert_eq!(ch.max_response, MAX_AT_RESPONSE);
    }

    #[test]
    fn version_names_the_crate() {
        assert!(RIL_VERSION.starts_with("ril-modem "));
    }
}
