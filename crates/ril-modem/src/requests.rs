//! Host request vocabulary and table dispatch.
//!
//! Every request code maps to a [`RequestHandler`] in a [`RequestTable`].
//! The standard table covers generic 27.007 modems; a vendor variant
//! replaces individual entries with [`RequestTable::register`] instead of
//! forking the whole dispatcher.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ril_core::types::{
    Call, CardStatus, DataCall, OperatorInfo, RadioState, RegistrationState, RilErrno,
    SignalStrength, SmsResponse,
};

use crate::commands::Clir;
use crate::core::RilCore;
use crate::vocabulary;

/// A host request with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    GetSimStatus,
    RadioPower { on: bool },
    EnterSimPin { pin: String },
    EnterSimPuk { puk: String, new_pin: String },
    ChangeSimPin { old_pin: String, new_pin: String },

    GetCurrentCalls,
    Dial { address: String, clir: Clir },
    Hangup { index: u32 },
    HangupWaitingOrBackground,
    HangupForegroundResumeBackground,
    SwitchWaitingOrHoldingAndActive,
    Conference,
    Udub,
    Answer,
    SeparateConnection { index: u32 },
    Dtmf { tone: char },
    LastCallFailCause,
    SetMute { muted: bool },
    GetMute,

    SignalStrength,
    VoiceRegistrationState,
    DataRegistrationState,
    Operator,
    SetNetworkSelectionAutomatic,
    QueryNetworkSelectionMode,
    ScreenState { on: bool },

    /// `smsc` is the hex SMSC prefix; `None` uses the modem's `+CSCA`.
    SendSms { smsc: Option<String>, pdu: String },
    SendSmsExpectMore { smsc: Option<String>, pdu: String },
    SmsAcknowledge { success: bool },
    WriteSmsToSim { status: u8, smsc: Option<String>, pdu: String },
    DeleteSmsOnSim { index: u32 },

    GetImsi,
    GetImei,
    GetImeisv,
    BasebandVersion,

    DataCallList,
    DeactivateDataCall { cid: u32 },

    SendUssd { ussd: String },
    CancelUssd,

    OemHookRaw(Vec<u8>),
}

/// Payload-free request identifier, used for table lookup and gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestCode {
    GetSimStatus,
    RadioPower,
    EnterSimPin,
    EnterSimPuk,
    ChangeSimPin,
    GetCurrentCalls,
    Dial,
    Hangup,
    HangupWaitingOrBackground,
    HangupForegroundResumeBackground,
    SwitchWaitingOrHoldingAndActive,
    Conference,
    Udub,
    Answer,
    SeparateConnection,
    Dtmf,
    LastCallFailCause,
    SetMute,
    GetMute,
    SignalStrength,
    VoiceRegistrationState,
    DataRegistrationState,
    Operator,
    SetNetworkSelectionAutomatic,
    QueryNetworkSelectionMode,
    ScreenState,
    SendSms,
    SendSmsExpectMore,
    SmsAcknowledge,
    WriteSmsToSim,
    DeleteSmsOnSim,
    GetImsi,
    GetImei,
    GetImeisv,
    BasebandVersion,
    DataCallList,
    DeactivateDataCall,
    SendUssd,
    CancelUssd,
    OemHookRaw,
}

impl fmt::Display for RequestCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Request {
    pub fn code(&self) -> RequestCode {
        match self {
            Request::GetSimStatus => RequestCode::GetSimStatus,
            Request::RadioPower { .. } => RequestCode::RadioPower,
            Request::EnterSimPin { .. } => RequestCode::EnterSimPin,
            Request::EnterSimPuk { .. } => RequestCode::EnterSimPuk,
            Request::ChangeSimPin { .. } => RequestCode::ChangeSimPin,
            Request::GetCurrentCalls => RequestCode::GetCurrentCalls,
            Request::Dial { .. } => RequestCode::Dial,
            Request::Hangup { .. } => RequestCode::Hangup,
            Request::HangupWaitingOrBackground => RequestCode::HangupWaitingOrBackground,
            Request::HangupForegroundResumeBackground => {
                RequestCode::HangupForegroundResumeBackground
            }
            Request::SwitchWaitingOrHoldingAndActive => {
                RequestCode::SwitchWaitingOrHoldingAndActive
            }
            Request::Conference => RequestCode::Conference,
            Request::Udub => RequestCode::Udub,
            Request::Answer => RequestCode::Answer,
            Request::SeparateConnection { .. } => RequestCode::SeparateConnection,
            Request::Dtmf { .. } => RequestCode::Dtmf,
            Request::LastCallFailCause => RequestCode::LastCallFailCause,
            Request::SetMute { .. } => RequestCode::SetMute,
            Request::GetMute => RequestCode::GetMute,
            Request::SignalStrength => RequestCode::SignalStrength,
            Request::VoiceRegistrationState => RequestCode::VoiceRegistrationState,
            Request::DataRegistrationState => RequestCode::DataRegistrationState,
            Request::Operator => RequestCode::Operator,
            Request::SetNetworkSelectionAutomatic => RequestCode::SetNetworkSelectionAutomatic,
            Request::QueryNetworkSelectionMode => RequestCode::QueryNetworkSelectionMode,
            Request::ScreenState { .. } => RequestCode::ScreenState,
            Request::SendSms { .. } => RequestCode::SendSms,
            Request::SendSmsExpectMore { .. } => RequestCode::SendSmsExpectMore,
            Request::SmsAcknowledge { .. } => RequestCode::SmsAcknowledge,
            Request::WriteSmsToSim { .. } => RequestCode::WriteSmsToSim,
            Request::DeleteSmsOnSim { .. } => RequestCode::DeleteSmsOnSim,
            Request::GetImsi => RequestCode::GetImsi,
            Request::GetImei => RequestCode::GetImei,
            Request::GetImeisv => RequestCode::GetImeisv,
            Request::BasebandVersion => RequestCode::BasebandVersion,
            Request::DataCallList => RequestCode::DataCallList,
            Request::DeactivateDataCall { .. } => RequestCode::DeactivateDataCall,
            Request::SendUssd { .. } => RequestCode::SendUssd,
            Request::CancelUssd => RequestCode::CancelUssd,
            Request::OemHookRaw(_) => RequestCode::OemHookRaw,
        }
    }
}

/// Successful completion payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Empty,
    CardStatus(CardStatus),
    Calls(Vec<Call>),
    SignalStrength(SignalStrength),
    Registration(RegistrationState),
    Operator(OperatorInfo),
    Sms(SmsResponse),
    Text(String),
    Int(i32),
    Flag(bool),
    DataCalls(Vec<DataCall>),
    Raw(Vec<u8>),
}

/// Completion of one request as seen by the host.
pub type RequestResult = std::result::Result<Response, RilErrno>;

/// Serves one or more request codes.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, ril: &RilCore, request: Request) -> RequestResult;
}

/// Whether `code` may be issued in `state`.
///
/// Only a SIM status query is legal while UNAVAILABLE, and only power and
/// SIM status requests while OFF.
pub fn is_allowed(state: RadioState, code: RequestCode) -> bool {
    match state {
        RadioState::Unavailable => code == RequestCode::GetSimStatus,
        RadioState::Off => matches!(code, RequestCode::GetSimStatus | RequestCode::RadioPower),
        _ => true,
    }
}

/// Request code to handler map.
#[derive(Clone, Default)]
pub struct RequestTable {
    handlers: HashMap<RequestCode, Arc<dyn RequestHandler>>,
}

impl fmt::Debug for RequestTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestTable")
            .field("codes", &self.handlers.len())
            .finish()
    }
}

impl RequestTable {
    /// An empty table; every request is unsupported.
    pub fn new() -> Self {
        Self::default()
    }

    /// The vocabulary for generic 27.007 modems.
    pub fn standard() -> Self {
        let mut table = Self::new();
        vocabulary::register_standard(&mut table);
        table
    }

    /// Install `handler` for `codes`, replacing any existing entries.
    pub fn register(&mut self, codes: &[RequestCode], handler: Arc<dyn RequestHandler>) {
        for &code in codes {
            self.handlers.insert(code, handler.clone());
        }
    }

    /// Remove the entry for `code`; it then reports as unsupported.
    pub fn unregister(&mut self, code: RequestCode) {
        self.handlers.remove(&code);
    }

    pub fn supports(&self, code: RequestCode) -> bool {
        self.handlers.contains_key(&code)
    }

    pub fn get(&self, code: RequestCode) -> Option<Arc<dyn RequestHandler>> {
        self.handlers.get(&code).cloned()
    }
}
