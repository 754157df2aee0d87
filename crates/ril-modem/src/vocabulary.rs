//! Standard request handlers for 27.007 / 27.005 modems.
//!
//! Handlers are grouped by family. Each family struct serves several
//! request codes; [`register_standard`] installs them all. A vendor table
//! can override a single code and delegate the rest to these structs.

use std::sync::Arc;

use async_trait::async_trait;
use ril_at::AtChannel;
use ril_core::error::{Error, Result};
use ril_core::types::{RadioState, RilErrno, SmsResponse};
use tracing::debug;

use crate::commands::{self, DEFAULT_NETWORK_TYPE};
use crate::core::RilCore;
use crate::requests::{Request, RequestCode, RequestHandler, RequestResult, RequestTable, Response};
use crate::scheduler::DeferredTask;
use crate::unsolicited;

/// Fill `table` with the standard vocabulary.
pub(crate) fn register_standard(table: &mut RequestTable) {
    table.register(
        &[
            RequestCode::GetSimStatus,
            RequestCode::RadioPower,
            RequestCode::EnterSimPin,
            RequestCode::EnterSimPuk,
            RequestCode::ChangeSimPin,
        ],
        Arc::new(SimRequests),
    );
    table.register(
        &[
            RequestCode::GetCurrentCalls,
            RequestCode::Dial,
            RequestCode::Hangup,
            RequestCode::HangupWaitingOrBackground,
            RequestCode::HangupForegroundResumeBackground,
            RequestCode::SwitchWaitingOrHoldingAndActive,
            RequestCode::Conference,
            RequestCode::Udub,
            RequestCode::Answer,
            RequestCode::SeparateConnection,
            RequestCode::Dtmf,
            RequestCode::LastCallFailCause,
            RequestCode::SetMute,
            RequestCode::GetMute,
        ],
        Arc::new(CallRequests),
    );
    table.register(
        &[
            RequestCode::SignalStrength,
            RequestCode::VoiceRegistrationState,
            RequestCode::DataRegistrationState,
            RequestCode::Operator,
            RequestCode::SetNetworkSelectionAutomatic,
            RequestCode::QueryNetworkSelectionMode,
            RequestCode::ScreenState,
        ],
        Arc::new(NetworkRequests),
    );
    table.register(
        &[
            RequestCode::SendSms,
            RequestCode::SendSmsExpectMore,
            RequestCode::SmsAcknowledge,
            RequestCode::WriteSmsToSim,
            RequestCode::DeleteSmsOnSim,
        ],
        Arc::new(SmsRequests),
    );
    table.register(
        &[RequestCode::DataCallList, RequestCode::DeactivateDataCall],
        Arc::new(DataRequests),
    );
    table.register(
        &[
            RequestCode::GetImsi,
            RequestCode::GetImei,
            RequestCode::GetImeisv,
            RequestCode::BasebandVersion,
            RequestCode::SendUssd,
            RequestCode::CancelUssd,
            RequestCode::OemHookRaw,
        ],
        Arc::new(DeviceRequests),
    );
}

// ---------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------

/// Issue a command whose only result is OK / ERROR.
async fn simple(ril: &RilCore, command: impl Into<String>) -> RequestResult {
    ril.at()?.send_command(command).await?;
    Ok(Response::Empty)
}

/// Single-line query retried on command failure, never on channel faults.
async fn retry_singleline(
    at: &AtChannel,
    command: &str,
    prefix: &str,
    attempts: u32,
) -> Result<String> {
    let mut attempt = 1;
    loop {
        match at.send_command_singleline(command, prefix).await {
            Ok(line) => return Ok(line),
            Err(e) if e.is_channel_fault() || attempt >= attempts => return Err(e),
            Err(e) => {
                debug!(command, attempt, error = %e, "retrying query");
                attempt += 1;
            }
        }
    }
}

/// PIN commands: a modem-side failure means the password was wrong.
async fn pin_command(ril: &RilCore, command: Result<String>) -> RequestResult {
    let at = ril.at()?;
    match at.send_command(command?).await {
        Ok(_) => Ok(Response::Empty),
        Err(e) if e.is_channel_fault() => Err(RilErrno::from(e)),
        Err(e) => {
            debug!(error = %e, "PIN rejected");
            Err(RilErrno::PasswordIncorrect)
        }
    }
}

fn unexpected(request: &Request) -> RequestResult {
    debug!(code = %request.code(), "request routed to the wrong handler");
    Err(RilErrno::RequestNotSupported)
}

// ---------------------------------------------------------------
// SIM and radio power
// ---------------------------------------------------------------

/// SIM status, radio power, PIN and PUK handling.
pub struct SimRequests;

#[async_trait]
impl RequestHandler for SimRequests {
    async fn handle(&self, ril: &RilCore, request: Request) -> RequestResult {
        match request {
            Request::GetSimStatus => Ok(Response::CardStatus(ril.get_sim_status().await.into())),
            Request::RadioPower { on } => {
                ril.set_radio_power(on).await?;
                Ok(Response::Empty)
            }
            Request::EnterSimPin { pin } => {
                let done = pin_command(ril, commands::cmd_enter_pin(&pin)).await?;
                ril.radio().set_state(RadioState::SimReady);
                Ok(done)
            }
            Request::EnterSimPuk { puk, new_pin } => {
                let done = pin_command(ril, commands::cmd_enter_puk(&puk, &new_pin)).await?;
                ril.radio().set_state(RadioState::SimReady);
                Ok(done)
            }
            Request::ChangeSimPin { old_pin, new_pin } => {
                pin_command(ril, commands::cmd_change_pin(&old_pin, &new_pin)).await
            }
            other => unexpected(&other),
        }
    }
}

// ---------------------------------------------------------------
// Calls
// ---------------------------------------------------------------

/// Call list, call control, DTMF and mute.
pub struct CallRequests;

impl CallRequests {
    async fn current_calls(ril: &RilCore) -> RequestResult {
        let lines = ril
            .at()?
            .send_command_multiline("AT+CLCC", "+CLCC:")
            .await?;

        let mut calls = Vec::with_capacity(lines.len() + 1);
        let mut needs_repoll = false;
        for line in &lines {
            match commands::parse_clcc(line) {
                Ok(call) => {
                    if !call.state.is_settled() {
                        needs_repoll = true;
                    }
                    if call.is_voice {
                        calls.push(call);
                    }
                }
                Err(e) => debug!(line, error = %e, "skipping invalid +CLCC line"),
            }
        }

        if let Some(number) = ril.unsolicited().take_call_waiting() {
            let index = commands::call_waiting_index(&calls);
            match commands::parse_clcc(&commands::call_waiting_clcc(index, &number)) {
                Ok(call) => calls.push(call),
                Err(e) => debug!(%number, error = %e, "dropping call-waiting entry"),
            }
        }

        if needs_repoll {
            ril.schedule(DeferredTask::CallStateChanged, ril.config().call_state_repoll);
        }
        Ok(Response::Calls(calls))
    }
}

#[async_trait]
impl RequestHandler for CallRequests {
    async fn handle(&self, ril: &RilCore, request: Request) -> RequestResult {
        match request {
            Request::GetCurrentCalls => Self::current_calls(ril).await,
            Request::Dial { address, clir } => simple(ril, commands::cmd_dial(&address, clir)?).await,
            Request::Hangup { index } => simple(ril, commands::cmd_hangup(index)).await,
            Request::HangupWaitingOrBackground => simple(ril, "AT+CHLD=0").await,
            Request::HangupForegroundResumeBackground => simple(ril, "AT+CHLD=1").await,
            Request::SwitchWaitingOrHoldingAndActive => simple(ril, "AT+CHLD=2").await,
            Request::Conference => simple(ril, "AT+CHLD=3").await,
            Request::Udub => simple(ril, "ATH").await,
            Request::Answer => simple(ril, "ATA").await,
            Request::SeparateConnection { index } => {
                simple(ril, commands::cmd_separate_connection(index)?).await
            }
            Request::Dtmf { tone } => simple(ril, commands::cmd_dtmf(tone)?).await,
            Request::LastCallFailCause => {
                let line = ril.at()?.send_command_singleline("AT+CEER", "+CEER:").await?;
                Ok(Response::Int(commands::parse_ceer(&line)?))
            }
            Request::SetMute { muted } => {
                simple(ril, format!("AT+CMUT={}", u8::from(muted))).await
            }
            Request::GetMute => {
                let line = ril.at()?.send_command_singleline("AT+CMUT?", "+CMUT:").await?;
                Ok(Response::Flag(commands::parse_cmut(&line)?))
            }
            other => unexpected(&other),
        }
    }
}

// ---------------------------------------------------------------
// Network
// ---------------------------------------------------------------

/// Signal, registration, operator and selection mode.
pub struct NetworkRequests;

impl NetworkRequests {
    async fn registration(ril: &RilCore, data: bool) -> RequestResult {
        let (command, prefix) = if data {
            ("AT+CGREG?", "+CGREG:")
        } else {
            ("AT+CREG?", "+CREG:")
        };
        let at = ril.at()?;
        let line = retry_singleline(&at, command, prefix, ril.config().registration_retries).await?;
        let reg = commands::parse_registration(&line)?;

        let mut network_type = DEFAULT_NETWORK_TYPE;
        if data && reg.act.is_none() && reg.lac.is_some() {
            // Technology not in +CGREG; take it from the operator query.
            match at.send_command_singleline("AT+COPS?", "+COPS:").await {
                Ok(cops) => {
                    if let Some(mapped) = commands::parse_cops_act(&cops)
                        .ok()
                        .flatten()
                        .and_then(commands::cops_act_to_network_type)
                    {
                        network_type = mapped;
                    }
                }
                Err(e) if e.is_channel_fault() => return Err(e.into()),
                Err(e) => debug!(error = %e, "AT+COPS? failed, using default network type"),
            }
        }
        Ok(Response::Registration(reg.into_state(network_type)))
    }
}

#[async_trait]
impl RequestHandler for NetworkRequests {
    async fn handle(&self, ril: &RilCore, request: Request) -> RequestResult {
        match request {
            Request::SignalStrength => {
                let line = ril.at()?.send_command_singleline("AT+CSQ", "+CSQ:").await?;
                Ok(Response::SignalStrength(commands::parse_csq(&line)?))
            }
            Request::VoiceRegistrationState => Self::registration(ril, false).await,
            Request::DataRegistrationState => Self::registration(ril, true).await,
            Request::Operator => {
                let lines = ril
                    .at()?
                    .send_command_multiline(commands::OPERATOR_QUERY, "+COPS:")
                    .await?;
                Ok(Response::Operator(commands::parse_operator(&lines)?))
            }
            Request::SetNetworkSelectionAutomatic => simple(ril, "AT+COPS=0").await,
            Request::QueryNetworkSelectionMode => {
                let line = ril.at()?.send_command_singleline("AT+COPS?", "+COPS:").await?;
                Ok(Response::Int(commands::parse_selection_mode(&line)?))
            }
            Request::ScreenState { on } => {
                let at = ril.at()?;
                let sequence = if on {
                    commands::SCREEN_ON_SEQUENCE
                } else {
                    commands::SCREEN_OFF_SEQUENCE
                };
                for &command in sequence {
                    at.send_command(command).await?;
                }
                Ok(Response::Empty)
            }
            other => unexpected(&other),
        }
    }
}

// ---------------------------------------------------------------
// SMS
// ---------------------------------------------------------------

/// SMSC prefix meaning "use the SIM's service centre".
const DEFAULT_SMSC: &str = "00";

/// Submission, acknowledgement and SIM storage of short messages.
pub struct SmsRequests;

impl SmsRequests {
    async fn send(ril: &RilCore, smsc: Option<String>, pdu: String) -> RequestResult {
        let at = ril.at()?;
        let command = commands::cmd_send_sms(&pdu)?;
        let smsc = match smsc {
            Some(smsc) => smsc,
            None => {
                let line = at.send_command_singleline("AT+CSCA?", "+CSCA:").await?;
                let (number, toa) = commands::parse_csca(&line)?;
                commands::encode_smsc(&number, toa)
            }
        };
        let line = at
            .send_command_sms(command, format!("{smsc}{pdu}"), "+CMGS:")
            .await?;
        Ok(Response::Sms(SmsResponse {
            message_ref: commands::parse_message_ref(&line)?,
            ack_pdu: None,
            error_code: -1,
        }))
    }
}

#[async_trait]
impl RequestHandler for SmsRequests {
    async fn handle(&self, ril: &RilCore, request: Request) -> RequestResult {
        match request {
            Request::SendSms { smsc, pdu } => Self::send(ril, smsc, pdu).await,
            Request::SendSmsExpectMore { smsc, pdu } => {
                let at = ril.at()?;
                match at.send_command("AT+CMMS=1").await {
                    Ok(_) => {}
                    Err(e) if e.is_channel_fault() => return Err(e.into()),
                    Err(e) => debug!(error = %e, "AT+CMMS=1 failed"),
                }
                Self::send(ril, smsc, pdu).await
            }
            Request::SmsAcknowledge { success } => {
                simple(ril, commands::cmd_sms_acknowledge(success)).await
            }
            Request::WriteSmsToSim { status, smsc, pdu } => {
                let command = commands::cmd_write_sms(&pdu, status)?;
                let smsc = smsc.unwrap_or_else(|| DEFAULT_SMSC.to_string());
                let line = ril
                    .at()?
                    .send_command_sms(command, format!("{smsc}{pdu}"), "+CMGW:")
                    .await?;
                Ok(Response::Int(commands::parse_message_ref(&line)?))
            }
            Request::DeleteSmsOnSim { index } => simple(ril, format!("AT+CMGD={index}")).await,
            other => unexpected(&other),
        }
    }
}

// ---------------------------------------------------------------
// Packet data
// ---------------------------------------------------------------

/// PDP context listing and deactivation.
pub struct DataRequests;

#[async_trait]
impl RequestHandler for DataRequests {
    async fn handle(&self, ril: &RilCore, request: Request) -> RequestResult {
        match request {
            Request::DataCallList => Ok(Response::DataCalls(ril.query_data_call_list().await?)),
            Request::DeactivateDataCall { cid } => {
                simple(ril, commands::cmd_deactivate_data_call(cid)).await?;
                ril.schedule(DeferredTask::DataCallListChanged, std::time::Duration::ZERO);
                Ok(Response::Empty)
            }
            other => unexpected(&other),
        }
    }
}

// ---------------------------------------------------------------
// Identity, USSD, OEM
// ---------------------------------------------------------------

/// Subscriber and equipment identity, USSD sessions and the raw OEM hook.
pub struct DeviceRequests;

impl DeviceRequests {
    async fn imsi(ril: &RilCore) -> RequestResult {
        let at = ril.at()?;
        let attempts = ril.config().imsi_retries.max(1);
        let mut attempt = 1;
        loop {
            match at.send_command_numeric("AT+CIMI").await {
                Ok(imsi) => return Ok(Response::Text(imsi)),
                Err(e) if e.is_channel_fault() || attempt >= attempts => return Err(e.into()),
                Err(e) => {
                    debug!(attempt, error = %e, "AT+CIMI failed, SIM may still be loading");
                    attempt += 1;
                    tokio::time::sleep(ril.config().imsi_retry_interval).await;
                }
            }
        }
    }

    async fn baseband_version(ril: &RilCore) -> RequestResult {
        // Answered with or without a "+CGMR:" header depending on firmware,
        // so every line is collected and unsolicited ones are handed back.
        let lines = ril.at()?.send_command_multiline("AT+CGMR", "").await?;
        let mut version = None;
        for line in lines {
            if unsolicited::is_unsolicited(&line) {
                ril.unsolicited().dispatch(ril, &line, None);
            } else if version.is_none() {
                let text = line.strip_prefix("+CGMR:").map(str::trim).unwrap_or(&line);
                version = Some(text.to_string());
            }
        }
        match version {
            Some(version) if !version.is_empty() => Ok(Response::Text(version)),
            _ => Err(Error::InvalidResponse("empty baseband version".into()).into()),
        }
    }
}

#[async_trait]
impl RequestHandler for DeviceRequests {
    async fn handle(&self, ril: &RilCore, request: Request) -> RequestResult {
        match request {
            Request::GetImsi => Self::imsi(ril).await,
            Request::GetImei | Request::GetImeisv => {
                Ok(Response::Text(ril.at()?.send_command_numeric("AT+CGSN").await?))
            }
            Request::BasebandVersion => Self::baseband_version(ril).await,
            Request::SendUssd { ussd } => simple(ril, commands::cmd_send_ussd(&ussd)).await,
            Request::CancelUssd => simple(ril, commands::CANCEL_USSD).await,
            Request::OemHookRaw(data) => Ok(Response::Raw(data)),
            other => unexpected(&other),
        }
    }
}
