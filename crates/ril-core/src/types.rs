//! Shared data types for the RIL.
//!
//! These are the typed payloads exchanged between the modem layer and the
//! host: radio and SIM state, call and data-context records parsed out of AT
//! responses, and the [`RilErrno`] failure taxonomy.

use std::fmt;

use crate::error::Error;

// ---------------------------------------------------------------------------
// Radio / SIM state
// ---------------------------------------------------------------------------

/// Phase of the radio state machine.
///
/// The state gates which host requests are accepted: only a SIM status
/// query is legal while [`Unavailable`](RadioState::Unavailable), and only
/// power and SIM status requests while [`Off`](RadioState::Off).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RadioState {
    /// No AT channel, or the channel was closed after a fault.
    #[default]
    Unavailable,
    /// Channel initialized, radio powered down.
    Off,
    /// Radio powered up, SIM not yet reported ready.
    SimNotReady,
    /// SIM is absent, PIN/PUK locked, or network personalized.
    SimLockedOrAbsent,
    /// SIM ready; all requests are accepted.
    SimReady,
}

impl RadioState {
    /// Whether the radio is powered (any state past `Off`).
    pub fn is_on(self) -> bool {
        !matches!(self, RadioState::Unavailable | RadioState::Off)
    }

    /// Whether an AT channel is available in this state.
    pub fn is_available(self) -> bool {
        self != RadioState::Unavailable
    }
}

impl fmt::Display for RadioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RadioState::Unavailable => "UNAVAILABLE",
            RadioState::Off => "OFF",
            RadioState::SimNotReady => "SIM_NOT_READY",
            RadioState::SimLockedOrAbsent => "SIM_LOCKED_OR_ABSENT",
            RadioState::SimReady => "SIM_READY",
        };
        f.write_str(s)
    }
}

/// Result of a SIM status poll (`AT+CPIN?`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimStatus {
    Absent,
    NotReady,
    Ready,
    Pin,
    Puk,
    NetworkPersonalization,
}

/// Presence of the SIM card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    Absent,
    Present,
    Error,
}

/// State of the SIM application on the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Unknown,
    Detected,
    Pin,
    Puk,
    SubscriptionPerso,
    Ready,
}

/// PIN1 state of the SIM application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinState {
    Unknown,
    EnabledNotVerified,
    EnabledVerified,
    Disabled,
    EnabledBlocked,
}

/// Personalization sub-state, meaningful only for `SubscriptionPerso`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersoSubstate {
    Unknown,
    Ready,
    Network,
}

/// The single GSM SIM application reported in a [`CardStatus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppStatus {
    pub app_state: AppState,
    pub perso_substate: PersoSubstate,
    pub pin1: PinState,
    pub pin2: PinState,
}

/// Card status as reported to the host for a SIM status request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardStatus {
    pub card_state: CardState,
    pub sim_status: SimStatus,
    /// `None` when the card is absent.
    pub app: Option<AppStatus>,
}

impl From<SimStatus> for CardStatus {
    fn from(status: SimStatus) -> Self {
        let app = |app_state, perso_substate, pin1| AppStatus {
            app_state,
            perso_substate,
            pin1,
            pin2: PinState::Unknown,
        };
        let (card_state, app) = match status {
            SimStatus::Absent => (CardState::Absent, None),
            SimStatus::NotReady => (
                CardState::Present,
                Some(app(AppState::Detected, PersoSubstate::Unknown, PinState::Unknown)),
            ),
            SimStatus::Ready => (
                CardState::Present,
                Some(app(AppState::Ready, PersoSubstate::Ready, PinState::Unknown)),
            ),
            SimStatus::Pin => (
                CardState::Present,
                Some(app(AppState::Pin, PersoSubstate::Unknown, PinState::EnabledNotVerified)),
            ),
            SimStatus::Puk => (
                CardState::Present,
                Some(app(AppState::Puk, PersoSubstate::Unknown, PinState::EnabledBlocked)),
            ),
            SimStatus::NetworkPersonalization => (
                CardState::Present,
                Some(app(
                    AppState::SubscriptionPerso,
                    PersoSubstate::Network,
                    PinState::EnabledNotVerified,
                )),
            ),
        };
        CardStatus {
            card_state,
            sim_status: status,
            app,
        }
    }
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

/// State of a call as reported by `+CLCC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Active,
    Holding,
    Dialing,
    Alerting,
    Incoming,
    Waiting,
}

impl CallState {
    /// Map the numeric `+CLCC` `<stat>` field.
    pub fn from_clcc(stat: i64) -> Option<Self> {
        match stat {
            0 => Some(CallState::Active),
            1 => Some(CallState::Holding),
            2 => Some(CallState::Dialing),
            3 => Some(CallState::Alerting),
            4 => Some(CallState::Incoming),
            5 => Some(CallState::Waiting),
            _ => None,
        }
    }

    /// Active and held calls are stable; everything else is transitional.
    pub fn is_settled(self) -> bool {
        matches!(self, CallState::Active | CallState::Holding)
    }
}

/// One entry of the current call list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub index: u32,
    pub state: CallState,
    pub is_mt: bool,
    pub is_multiparty: bool,
    pub is_voice: bool,
    /// Remote number, `None` when the modem reported no dialable digits.
    pub number: Option<String>,
    pub toa: u32,
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Signal quality (`AT+CSQ` / `^RSSI:`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalStrength {
    /// 0..=31, or 99 when unknown.
    pub rssi: i32,
    /// Bit error rate 0..=7, or 99 when unknown.
    pub ber: i32,
}

/// Voice or data registration state (`+CREG` / `+CGREG`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationState {
    pub stat: i32,
    pub lac: Option<u32>,
    pub cid: Option<u32>,
    pub network_type: i32,
}

impl RegistrationState {
    /// Host string form: stat and network type in decimal, LAC and CID in hex.
    ///
    /// Missing LAC/CID render as `ffffffff`, matching a `-1` formatted with
    /// `%x`, which is what hosts expect.
    pub fn to_strings(&self) -> [String; 4] {
        let hex = |v: Option<u32>| format!("{:x}", v.unwrap_or(u32::MAX));
        [
            self.stat.to_string(),
            hex(self.lac),
            hex(self.cid),
            self.network_type.to_string(),
        ]
    }
}

/// Operator names from the triple `+COPS?` query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorInfo {
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    pub numeric: Option<String>,
}

/// Result of an SMS submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsResponse {
    pub message_ref: i32,
    pub ack_pdu: Option<String>,
    pub error_code: i32,
}

/// One PDP context from `+CGACT?` merged with `+CGDCONT?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataCall {
    pub cid: u32,
    pub active: bool,
    pub pdp_type: String,
    pub apn: String,
    pub address: String,
    pub ifname: String,
}

// ---------------------------------------------------------------------------
// Host error codes
// ---------------------------------------------------------------------------

/// Failure code reported to the host for a completed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RilErrno {
    RadioNotAvailable,
    GenericFailure,
    PasswordIncorrect,
    SimPin2,
    SimPuk2,
    RequestNotSupported,
    Cancelled,
    SmsSendFailRetry,
    ModeNotSupported,
}

impl fmt::Display for RilErrno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RilErrno::RadioNotAvailable => "RADIO_NOT_AVAILABLE",
            RilErrno::GenericFailure => "GENERIC_FAILURE",
            RilErrno::PasswordIncorrect => "PASSWORD_INCORRECT",
            RilErrno::SimPin2 => "SIM_PIN2",
            RilErrno::SimPuk2 => "SIM_PUK2",
            RilErrno::RequestNotSupported => "REQUEST_NOT_SUPPORTED",
            RilErrno::Cancelled => "CANCELLED",
            RilErrno::SmsSendFailRetry => "SMS_SEND_FAIL_RETRY",
            RilErrno::ModeNotSupported => "MODE_NOT_SUPPORTED",
        };
        f.write_str(s)
    }
}

impl std::error::Error for RilErrno {}

impl From<&Error> for RilErrno {
    /// A request that reached the modem and failed, timed out, or lost its
    /// channel mid-flight reports a generic failure. Only the absence of a
    /// channel before issuing maps to "radio not available".
    fn from(err: &Error) -> Self {
        match err {
            Error::NotConnected => RilErrno::RadioNotAvailable,
            _ => RilErrno::GenericFailure,
        }
    }
}

impl From<Error> for RilErrno {
    fn from(err: Error) -> Self {
        RilErrno::from(&err)
    }
}
