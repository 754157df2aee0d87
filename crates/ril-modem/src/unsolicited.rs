//! Unsolicited line dispatcher.
//!
//! Runs on the channel's IO task, so it never issues AT commands itself:
//! anything that needs a follow-up query is posted to the deferred queue.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use ril_at::Fields;
use ril_core::events::RilEvent;
use ril_core::types::RadioState;
use tracing::{debug, warn};

use crate::commands;
use crate::scheduler::DeferredTask;

/// What the dispatcher needs from the service around it.
pub trait UnsolicitedContext: Send + Sync {
    fn radio_state(&self) -> RadioState;
    fn notify(&self, event: RilEvent);
    fn schedule(&self, task: DeferredTask, delay: Duration);
}

/// Translates modem indications into [`RilEvent`]s and deferred tasks.
#[derive(Debug, Default)]
pub struct UnsolicitedDispatcher {
    /// `time+tz` from `+CTZV:`, completed by the next `+CTZDST:`.
    nitz_pending: Mutex<Option<String>>,
    /// Number from the last `+CCWA`, reported once by the next call list.
    call_waiting: Mutex<Option<String>>,
}

/// Leading text of every line [`UnsolicitedDispatcher::dispatch`] acts on.
const PREFIXES: &[&str] = &[
    "+CTZV:",
    "+CTZDST:",
    "%CTZV:",
    "+HTCCTZV:",
    "+CRING:",
    "RING",
    "NO CARRIER",
    "+CCWA",
    "^RSSI:",
    "+CREG:",
    "+CGREG:",
    "+CMT:",
    "+CDS:",
    "+CGEV:",
    "+CME ERROR: 150",
    "+CUSD:",
];

/// Whether `line` is one the modem sends on its own.
pub fn is_unsolicited(line: &str) -> bool {
    PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl UnsolicitedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one unsolicited line. `pdu` is the line that followed an SMS
    /// indication.
    pub fn dispatch(&self, ctx: &dyn UnsolicitedContext, line: &str, pdu: Option<&str>) {
        // The host polls for initial state once the radio is available.
        if ctx.radio_state() == RadioState::Unavailable {
            debug!(line, "ignoring unsolicited line while unavailable");
            return;
        }

        if line.starts_with("+CTZV:") || line.starts_with("+CTZDST:") {
            self.on_nitz_part(ctx, line);
        } else if line.starts_with("%CTZV:") || line.starts_with("+HTCCTZV:") {
            ctx.notify(RilEvent::NitzTimeReceived {
                time: after_header(line).to_string(),
            });
        } else if line.starts_with("+CRING:")
            || line.starts_with("RING")
            || line.starts_with("NO CARRIER")
            || line.starts_with("+CCWA")
        {
            if line.starts_with("+CCWA") {
                self.capture_call_waiting(line);
            }
            ctx.notify(RilEvent::CallStateChanged);
            ctx.schedule(DeferredTask::DataCallListChanged, Duration::ZERO);
        } else if line.starts_with("^RSSI:") {
            match commands::parse_rssi(line) {
                Ok(strength) => ctx.notify(RilEvent::SignalStrength(strength)),
                Err(e) => warn!(line, error = %e, "bad ^RSSI line"),
            }
        } else if line.starts_with("+CREG:") || line.starts_with("+CGREG:") {
            ctx.notify(RilEvent::VoiceNetworkStateChanged);
            ctx.schedule(DeferredTask::DataCallListChanged, Duration::ZERO);
        } else if line.starts_with("+CMT:") {
            match pdu {
                Some(pdu) => ctx.notify(RilEvent::NewSms { pdu: pdu.to_string() }),
                None => warn!(line, "+CMT without PDU"),
            }
        } else if line.starts_with("+CDS:") {
            match pdu {
                Some(pdu) => ctx.notify(RilEvent::SmsStatusReport { pdu: pdu.to_string() }),
                None => warn!(line, "+CDS without PDU"),
            }
        } else if line.starts_with("+CGEV:") || line.starts_with("+CME ERROR: 150") {
            // Some stacks report PDP changes only as a stray CME error 150.
            ctx.schedule(DeferredTask::DataCallListChanged, Duration::ZERO);
        } else if line.starts_with("+CUSD:") {
            match commands::parse_cusd(line) {
                Ok((code, message)) => ctx.notify(RilEvent::Ussd { code, message }),
                Err(e) => warn!(line, error = %e, "bad +CUSD line"),
            }
        } else {
            debug!(line, "unhandled unsolicited line");
        }
    }

    /// Take the number of a call reported waiting since the last call list.
    pub fn take_call_waiting(&self) -> Option<String> {
        lock(&self.call_waiting).take()
    }

    fn capture_call_waiting(&self, line: &str) {
        let number = Fields::parse(line)
            .and_then(|mut f| f.next_str().map(str::to_string))
            .ok()
            .filter(|n| !n.is_empty());
        if let Some(number) = number {
            debug!(%number, "call waiting");
            *lock(&self.call_waiting) = Some(number);
        }
    }

    /// `+CTZV: "<tz>","<time>"` stores `time+tz`; `+CTZDST: "<dst>"` then
    /// completes it as `yy/mm/dd,hh:mm:ss(+/-)tz,dst`.
    fn on_nitz_part(&self, ctx: &dyn UnsolicitedContext, line: &str) {
        let parsed = Fields::parse(line).and_then(|mut f| {
            let first = f.next_str()?.to_string();
            let second = if f.has_more() {
                Some(f.next_str()?.to_string())
            } else {
                None
            };
            Ok((first, second))
        });
        let (first, second) = match parsed {
            Ok(fields) => fields,
            Err(e) => {
                warn!(line, error = %e, "invalid NITZ line");
                return;
            }
        };

        if line.starts_with("+CTZV:") {
            let Some(time) = second else {
                warn!(line, "invalid NITZ line");
                return;
            };
            *lock(&self.nitz_pending) = Some(format!("{time}{first}"));
        } else {
            match lock(&self.nitz_pending).take() {
                Some(partial) => ctx.notify(RilEvent::NitzTimeReceived {
                    time: format!("{partial},{first}"),
                }),
                None => debug!(line, "+CTZDST without preceding +CTZV"),
            }
        }
    }
}

/// Text after the first `:`, trimmed and with one pair of enclosing quotes
/// removed.
fn after_header(line: &str) -> &str {
    let body = line.split_once(':').map_or("", |(_, rest)| rest.trim());
    body.strip_prefix('"')
        .and_then(|b| b.strip_suffix('"'))
        .unwrap_or(body)
}
