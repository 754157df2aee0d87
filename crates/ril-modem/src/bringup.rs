//! Deferred work: channel initialization, radio and SIM entry sequences,
//! SIM polling, and re-announcements queued by unsolicited lines.

use ril_at::AtChannel;
use ril_core::error::Result;
use ril_core::events::RilEvent;
use ril_core::types::{DataCall, RadioState, SimStatus};
use tracing::{debug, info, warn};

use crate::commands::{self, CGREG_MODE, CREG_MODES, INIT_SEQUENCE, POWER_ON_SEQUENCE};
use crate::core::RilCore;
use crate::scheduler::DeferredTask;

/// CME error reported by `AT+CPIN?` when no SIM is inserted.
const CME_SIM_NOT_INSERTED: u32 = 10;

/// Run `commands` in order, ignoring command failures. Stops at the first
/// channel fault, which is returned.
async fn run_sequence(at: &AtChannel, commands: &[&str]) -> Result<()> {
    for &command in commands {
        match at.send_command(command).await {
            Ok(_) => {}
            Err(e) if e.is_channel_fault() => return Err(e),
            Err(e) => debug!(command, error = %e, "ignoring failed command"),
        }
    }
    Ok(())
}

impl RilCore {
    pub(crate) async fn run_deferred(&self, task: DeferredTask) {
        debug!(?task, "running deferred task");
        match task {
            DeferredTask::Initialize => self.initialize().await,
            DeferredTask::OnRadioPowerOn => self.on_radio_power_on().await,
            DeferredTask::OnSimReady => self.on_sim_ready().await,
            DeferredTask::PollSimState => self.poll_sim_state().await,
            DeferredTask::DataCallListChanged => self.announce_data_call_list().await,
            DeferredTask::CallStateChanged => self.notify(RilEvent::CallStateChanged),
        }
    }

    /// Bring a fresh channel to OFF (or SIM_NOT_READY if the radio is
    /// already powered).
    async fn initialize(&self) {
        let Ok(at) = self.at() else {
            debug!("channel gone before initialization");
            return;
        };
        self.radio().set_state(RadioState::Off);

        if let Err(e) = self.initialize_channel(&at).await {
            warn!(error = %e, "initialization aborted");
            return;
        }

        match self.is_radio_on().await {
            Ok(true) => {
                self.radio().set_state(RadioState::SimNotReady);
            }
            Ok(false) => info!("radio is off after initialization"),
            Err(e) => debug!(error = %e, "AT+CFUN? failed, leaving radio OFF"),
        }
    }

    async fn initialize_channel(&self, at: &AtChannel) -> Result<()> {
        run_sequence(at, INIT_SEQUENCE).await?;
        for &command in CREG_MODES {
            match at.send_command(command).await {
                Ok(_) => break,
                Err(e) if e.is_channel_fault() => return Err(e),
                Err(e) => debug!(command, error = %e, "registration mode not supported"),
            }
        }
        run_sequence(at, &[CGREG_MODE]).await
    }

    async fn on_radio_power_on(&self) {
        let Ok(at) = self.at() else { return };
        if let Err(e) = run_sequence(&at, POWER_ON_SEQUENCE).await {
            warn!(error = %e, "power-on sequence aborted");
            return;
        }
        self.poll_sim_state().await;
    }

    async fn on_sim_ready(&self) {
        let Ok(at) = self.at() else { return };
        if let Err(e) = run_sequence(&at, commands::SIM_READY_SEQUENCE).await {
            warn!(error = %e, "SIM-ready sequence aborted");
            return;
        }
        if let Err(e) = at
            .send_command_singleline(commands::CSMS_COMMAND, commands::CSMS_PREFIX)
            .await
        {
            debug!(error = %e, "AT+CSMS=1 failed");
        }
    }

    /// One step of SIM polling while SIM_NOT_READY.
    async fn poll_sim_state(&self) {
        if self.radio().state() != RadioState::SimNotReady {
            return;
        }
        match self.get_sim_status().await {
            SimStatus::NotReady => {
                self.schedule(DeferredTask::PollSimState, self.config().sim_poll_interval);
            }
            SimStatus::Ready => {
                self.radio().set_state(RadioState::SimReady);
            }
            locked => {
                info!(status = ?locked, "SIM locked or absent");
                self.radio().set_state(RadioState::SimLockedOrAbsent);
            }
        }
    }

    async fn announce_data_call_list(&self) {
        match self.query_data_call_list().await {
            Ok(calls) => self.notify(RilEvent::DataCallListChanged { calls }),
            Err(e) => debug!(error = %e, "data call list re-query failed"),
        }
    }

    // ---------------------------------------------------------------
    // Queries shared by requests and deferred tasks
    // ---------------------------------------------------------------

    /// SIM status via `AT+CPIN?`. Never fails: anything that is not a
    /// definite answer reads as NOT_READY.
    pub async fn get_sim_status(&self) -> SimStatus {
        if !self.radio().state().is_on() {
            return SimStatus::NotReady;
        }
        let Ok(at) = self.at() else {
            return SimStatus::NotReady;
        };
        match at.send_command_singleline("AT+CPIN?", "+CPIN:").await {
            Ok(line) => commands::parse_cpin(&line).unwrap_or_else(|e| {
                debug!(error = %e, "unparsable +CPIN answer");
                SimStatus::NotReady
            }),
            Err(e) if e.cme_error() == Some(CME_SIM_NOT_INSERTED) => SimStatus::Absent,
            Err(e) => {
                debug!(error = %e, "AT+CPIN? failed");
                SimStatus::NotReady
            }
        }
    }

    /// Whether `AT+CFUN?` reports the radio powered.
    pub async fn is_radio_on(&self) -> Result<bool> {
        let line = self.at()?.send_command_singleline("AT+CFUN?", "+CFUN:").await?;
        commands::parse_cfun(&line)
    }

    /// PDP contexts from `AT+CGACT?` merged with `AT+CGDCONT?`.
    pub async fn query_data_call_list(&self) -> Result<Vec<DataCall>> {
        let at = self.at()?;
        let activation = commands::parse_cgact(&at.send_command_multiline("AT+CGACT?", "+CGACT:").await?)?;
        let contexts =
            commands::parse_cgdcont(&at.send_command_multiline("AT+CGDCONT?", "+CGDCONT:").await?)?;
        Ok(commands::merge_data_calls(
            &activation,
            &contexts,
            &self.config().data_ifname,
        ))
    }

    /// Send `AT+CFUN=<on>` and move the state machine accordingly.
    pub async fn set_radio_power(&self, on: bool) -> Result<()> {
        let at = self.at()?;
        let state = self.radio().state();
        if !on && state != RadioState::Off {
            at.send_command("AT+CFUN=0").await?;
            self.radio().set_state(RadioState::Off);
        } else if on && state == RadioState::Off {
            if let Err(e) = at.send_command("AT+CFUN=1").await {
                // Some modems reject CFUN=1 when already on.
                if e.is_channel_fault() || !self.is_radio_on().await? {
                    return Err(e);
                }
            }
            self.radio().set_state(RadioState::SimNotReady);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RilConfig;
    use crate::requests::RequestTable;
    use ril_test_harness::MockModem;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn core_with(modem: MockModem) -> Arc<RilCore> {
        let core = RilCore::new(
            RilConfig::default(),
            RequestTable::standard(),
            CancellationToken::new(),
        );
        core.attach_channel(Box::new(modem));
        core
    }

    #[tokio::test]
    async fn sim_status_without_power_sends_nothing() {
        let modem = MockModem::new();
        let handle = modem.handle();
        let core = core_with(modem);
        assert_eq!(core.get_sim_status().await, SimStatus::NotReady);
        assert_eq!(handle.count("AT+CPIN?"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sim_not_inserted_reads_absent() {
        let modem = MockModem::new();
        let handle = modem.handle();
        handle.on("AT+CPIN?", &["+CME ERROR: 10"]);
        handle.fallback(&["OK"]);
        let core = core_with(modem);
        core.radio().set_state(RadioState::SimNotReady);
        assert_eq!(core.get_sim_status().await, SimStatus::Absent);
    }

    #[tokio::test(start_paused = true)]
    async fn other_cpin_errors_read_not_ready() {
        let modem = MockModem::new();
        let handle = modem.handle();
        handle.on("AT+CPIN?", &["+CME ERROR: 14"]);
        handle.fallback(&["OK"]);
        let core = core_with(modem);
        core.radio().set_state(RadioState::SimNotReady);
        assert_eq!(core.get_sim_status().await, SimStatus::NotReady);
    }

    #[tokio::test(start_paused = true)]
    async fn power_on_rejected_but_already_on_still_advances() {
        let modem = MockModem::new();
        let handle = modem.handle();
        handle.on("AT+CFUN=1", &["ERROR"]);
        handle.on("AT+CFUN?", &["+CFUN: 1", "OK"]);
        handle.on("AT+CPIN?", &["+CPIN: READY", "OK"]);
        handle.fallback(&["OK"]);
        let core = core_with(modem);
        core.radio().set_state(RadioState::Off);

        core.set_radio_power(true).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_ne!(core.current_state(), RadioState::Off);
    }

    #[tokio::test(start_paused = true)]
    async fn power_off_from_any_powered_state() {
        let modem = MockModem::new();
        let handle = modem.handle();
        handle.fallback(&["OK"]);
        let core = core_with(modem);
        core.radio().set_state(RadioState::SimLockedOrAbsent);

        core.set_radio_power(false).await.unwrap();
        assert_eq!(core.current_state(), RadioState::Off);
        assert_eq!(handle.count("AT+CFUN=0"), 1);
    }
}
