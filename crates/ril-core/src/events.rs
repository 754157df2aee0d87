//! Unsolicited notifications delivered to the host.
//!
//! Events are emitted through a [`tokio::sync::broadcast`] channel owned by
//! the RIL service. They are the typed equivalent of the host's "send
//! unsolicited" callback: radio state transitions, modem indications
//! translated by the unsolicited dispatcher, and results of deferred
//! re-queries.

use crate::types::{DataCall, RadioState, SignalStrength};

/// An unsolicited event emitted by the RIL.
///
/// Delivery is best-effort through a bounded broadcast channel; a slow
/// subscriber may miss events and will observe a `Lagged` error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RilEvent {
    /// The radio state machine entered a new state.
    RadioStateChanged {
        /// The new state.
        state: RadioState,
    },

    /// The call list may have changed; the host should re-query it.
    CallStateChanged,

    /// Voice or data registration may have changed.
    VoiceNetworkStateChanged,

    /// A new SMS was delivered (`+CMT:`).
    NewSms {
        /// Hex PDU from the line following the indication.
        pdu: String,
    },

    /// An SMS status report was delivered (`+CDS:`).
    SmsStatusReport {
        /// Hex PDU from the line following the indication.
        pdu: String,
    },

    /// The PDP context list was re-queried after a network event.
    DataCallListChanged {
        /// The refreshed list.
        calls: Vec<DataCall>,
    },

    /// Network time and zone, as `yy/mm/dd,hh:mm:ss(+/-)tz,dst`.
    NitzTimeReceived {
        /// The assembled NITZ string.
        time: String,
    },

    /// Unsolicited signal strength report.
    SignalStrength(SignalStrength),

    /// A network-initiated or response USSD message.
    Ussd {
        /// USSD type code (0 = notify, 1 = request, 2 = terminated ...).
        code: u8,
        /// Decoded message text, when present.
        message: Option<String>,
    },
}
