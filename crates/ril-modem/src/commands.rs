//! AT command builders and response parsers for the request vocabulary.
//!
//! All functions here are pure: they build command strings or consume
//! response lines without touching the channel. Grammar follows 3GPP 27.007
//! (and 27.005 for SMS) as spoken by generic GSM/UMTS modems, including the
//! shape variations seen in the wild for `+CREG` / `+CGREG`.

use ril_at::{Fields, Token};
use ril_core::error::{Error, Result};
use ril_core::types::{
    Call, CallState, DataCall, OperatorInfo, RegistrationState, SignalStrength, SimStatus,
};

use crate::gsm;

// ---------------------------------------------------------------
// Bring-up sequences
// ---------------------------------------------------------------

/// Commands issued on every fresh channel, after the radio is marked OFF.
/// Failures are tolerated; the modem may not know every one of them.
pub const INIT_SEQUENCE: &[&str] = &[
    "ATE0Q0V1",
    "ATS0=0",
    "ATX3",
    "AT&C1",
    "AT&D1",
    "AT+CMEE=1",
    "AT+CRC=1;+CR=1",
    "AT+CLIP=1",
    "AT+CLIR=0",
    "AT+CCWA=1",
    "AT+COLP=0",
    "AT+CUSD=1",
    "AT+CMGF=0",
    "AT+CSSN=0,1",
];

/// Network registration reporting, most verbose first.
pub const CREG_MODES: &[&str] = &["AT+CREG=2", "AT+CREG=1"];
pub const CGREG_MODE: &str = "AT+CGREG=2";

/// Issued when the radio comes up (entering SIM_NOT_READY).
pub const POWER_ON_SEQUENCE: &[&str] = &["ATE0", "AT+CLIP=1", "AT+CLIR=0"];

/// Issued when the SIM becomes ready, followed by the `+CSMS` query.
pub const SIM_READY_SEQUENCE: &[&str] = &[
    "AT+COPS=0",
    "AT+CNMI=1,2,2,1,1",
    "AT+CSCB=1",
    "AT+CTZU=1",
    "AT+CTZR=1",
];

pub const CSMS_COMMAND: &str = "AT+CSMS=1";
pub const CSMS_PREFIX: &str = "+CSMS:";

/// Screen on: full registration and packet-domain event reporting.
pub const SCREEN_ON_SEQUENCE: &[&str] = &["AT+CREG=2", "AT+CGREG=2", "AT+CGEREP=1,0"];
/// Screen off: stop unsolicited registration chatter.
pub const SCREEN_OFF_SEQUENCE: &[&str] = &["AT+CREG=0", "AT+CGREG=0", "AT+CGEREP=0,0"];

/// Operator name in all three formats, answered by three `+COPS:` lines.
pub const OPERATOR_QUERY: &str = "AT+COPS=3,0;+COPS?;+COPS=3,1;+COPS?;+COPS=3,2;+COPS?";

// ---------------------------------------------------------------
// Argument validation
// ---------------------------------------------------------------

/// Quote `value` for use inside an AT command argument.
fn quoted(what: &str, value: &str) -> Result<String> {
    if value.contains(['"', '\r', '\n']) {
        return Err(Error::InvalidParameter(format!(
            "{what} must not contain quotes or line breaks"
        )));
    }
    Ok(format!("\"{value}\""))
}

fn require_hex_pdu(pdu: &str) -> Result<usize> {
    if pdu.is_empty() || pdu.len() % 2 != 0 || !pdu.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidParameter(format!(
            "PDU must be a non-empty even-length hex string, got {} chars",
            pdu.len()
        )));
    }
    Ok(pdu.len() / 2)
}

// ---------------------------------------------------------------
// SIM
// ---------------------------------------------------------------

/// Map a `+CPIN:` line to a SIM status.
pub fn parse_cpin(line: &str) -> Result<SimStatus> {
    let mut f = Fields::parse(line)?;
    let code = f.next_str()?;
    Ok(match code {
        "READY" => SimStatus::Ready,
        "SIM PIN" => SimStatus::Pin,
        "SIM PUK" => SimStatus::Puk,
        "PH-NET PIN" => SimStatus::NetworkPersonalization,
        _ => SimStatus::Absent,
    })
}

pub fn cmd_enter_pin(pin: &str) -> Result<String> {
    Ok(format!("AT+CPIN={}", quoted("PIN", pin)?))
}

pub fn cmd_enter_puk(puk: &str, new_pin: &str) -> Result<String> {
    Ok(format!(
        "AT+CPIN={},{}",
        quoted("PUK", puk)?,
        quoted("new PIN", new_pin)?
    ))
}

pub fn cmd_change_pin(old_pin: &str, new_pin: &str) -> Result<String> {
    Ok(format!(
        "AT+CPWD=\"SC\",{},{}",
        quoted("old PIN", old_pin)?,
        quoted("new PIN", new_pin)?
    ))
}

/// Whether a `+CFUN:` line reports full functionality.
pub fn parse_cfun(line: &str) -> Result<bool> {
    let mut f = Fields::parse(line)?;
    Ok(f.next_int()? == 1)
}

// ---------------------------------------------------------------
// Calls
// ---------------------------------------------------------------

/// Calling line identification restriction for a dial request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clir {
    /// Subscription default.
    #[default]
    Default,
    /// Restrict (suppress presentation of) the caller's number.
    Invocation,
    /// Allow presentation of the caller's number.
    Suppression,
}

impl Clir {
    fn suffix(self) -> &'static str {
        match self {
            Clir::Default => "",
            Clir::Invocation => "I",
            Clir::Suppression => "i",
        }
    }
}

/// `ATD<address><clir>;`
pub fn cmd_dial(address: &str, clir: Clir) -> Result<String> {
    let valid = |c: char| c.is_ascii_digit() || "+*#,pPwWABCD".contains(c);
    if address.is_empty() || !address.chars().all(valid) {
        return Err(Error::InvalidParameter(format!(
            "not a dialable address: {address:?}"
        )));
    }
    Ok(format!("ATD{address}{};", clir.suffix()))
}

/// Release a specific call (`AT+CHLD=1x`).
pub fn cmd_hangup(index: u32) -> String {
    format!("AT+CHLD=1{index}")
}

/// Split a call out of a conference (`AT+CHLD=2x`). Only 1..=9 are valid.
pub fn cmd_separate_connection(index: u32) -> Result<String> {
    if !(1..=9).contains(&index) {
        return Err(Error::InvalidParameter(format!(
            "call index {index} out of range 1..=9"
        )));
    }
    Ok(format!("AT+CHLD=2{index}"))
}

pub fn cmd_dtmf(tone: char) -> Result<String> {
    if !(tone.is_ascii_digit() || matches!(tone, '*' | '#' | 'A'..='D')) {
        return Err(Error::InvalidParameter(format!("not a DTMF tone: {tone:?}")));
    }
    Ok(format!("AT+VTS={tone}"))
}

/// Parse one `+CLCC:` line:
/// `index,dir,stat,mode,mpty[,"number",toa]`.
pub fn parse_clcc(line: &str) -> Result<Call> {
    let mut f = Fields::parse(line)?;
    let index = f.next_int()?;
    let is_mt = f.next_bool()?;
    let stat = f.next_int()?;
    let state = CallState::from_clcc(stat)
        .ok_or_else(|| Error::InvalidResponse(format!("unknown call state {stat} in {line:?}")))?;
    let is_voice = f.next_int()? == 0;
    let is_multiparty = f.next_bool()?;

    let mut number = None;
    let mut toa = 0;
    if f.has_more() {
        let raw = f.next_str()?;
        // Some modems put text such as "NOT AVAILABLE" here.
        if raw.starts_with(|c: char| c == '+' || c.is_ascii_digit()) {
            number = Some(raw.to_string());
        }
        if f.has_more() {
            toa = f.next_int()?;
        }
    }

    Ok(Call {
        index: u32::try_from(index)
            .map_err(|_| Error::InvalidResponse(format!("bad call index in {line:?}")))?,
        state,
        is_mt,
        is_multiparty,
        is_voice,
        number,
        toa: u32::try_from(toa).unwrap_or(0),
    })
}

/// Index for the synthetic waiting-call entry appended to a call list.
///
/// One past the last call, but indices above 9 cannot be addressed with
/// `AT+CHLD`, so an earlier gap is used when the last index is 9 or more.
pub fn call_waiting_index(calls: &[Call]) -> u32 {
    let Some((last, earlier)) = calls.split_last() else {
        return 1;
    };
    let index = last.index + 1;
    if index <= 9 {
        return index;
    }
    earlier
        .iter()
        .rev()
        .find(|c| c.index < 9)
        .map(|c| c.index + 1)
        .unwrap_or(index)
}

/// `+CLCC:` line describing a waiting call reported only through `+CCWA`.
pub fn call_waiting_clcc(index: u32, number: &str) -> String {
    format!("+CLCC: {index},0,5,0,0,\"{number}\",129")
}

/// Cause code from `+CEER: <report>,<cause>`.
pub fn parse_ceer(line: &str) -> Result<i32> {
    let mut f = Fields::parse(line)?;
    f.skip()?;
    int32(f.next_int()?, line)
}

/// Mute flag from `+CMUT: <n>`.
pub fn parse_cmut(line: &str) -> Result<bool> {
    Fields::parse(line)?.next_bool()
}

// ---------------------------------------------------------------
// Network
// ---------------------------------------------------------------

/// `+CSQ: <rssi>,<ber>`
pub fn parse_csq(line: &str) -> Result<SignalStrength> {
    let mut f = Fields::parse(line)?;
    Ok(SignalStrength {
        rssi: int32(f.next_int()?, line)?,
        ber: int32(f.next_int()?, line)?,
    })
}

/// `^RSSI: <rssi>`; the bit error rate is not reported.
pub fn parse_rssi(line: &str) -> Result<SignalStrength> {
    let mut f = Fields::parse(line)?;
    Ok(SignalStrength {
        rssi: int32(f.next_int()?, line)?,
        ber: 99,
    })
}

/// Fields of a `+CREG` / `+CGREG` line before defaults are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub stat: i32,
    pub lac: Option<u32>,
    pub cid: Option<u32>,
    /// Access technology, when the line carried one.
    pub act: Option<i32>,
}

impl Registration {
    /// Host form, with `network_type` used when no technology was reported.
    pub fn into_state(self, network_type: i32) -> RegistrationState {
        RegistrationState {
            stat: self.stat,
            lac: self.lac,
            cid: self.cid,
            network_type: self.act.unwrap_or(network_type),
        }
    }
}

/// Network type reported when the registration line does not carry one.
pub const DEFAULT_NETWORK_TYPE: i32 = 1;

/// Parse a registration line. The shape is told apart by field count:
///
/// | fields | layout                     |
/// |--------|----------------------------|
/// | 1      | `stat` (unsolicited)       |
/// | 2      | `n,stat`                   |
/// | 3      | `stat,lac,cid` (unsolicited)|
/// | 4      | `n,stat,lac,cid`           |
/// | 5      | `n,stat,lac,cid,act`       |
pub fn parse_registration(line: &str) -> Result<Registration> {
    let mut f = Fields::parse(line)?;
    let count = f.len();
    if matches!(count, 2 | 4 | 5) {
        f.skip()?;
    }
    let stat = int32(f.next_int()?, line)?;
    let (lac, cid) = match count {
        1 | 2 => (None, None),
        3..=5 => (optional_hex(&mut f)?, optional_hex(&mut f)?),
        n => {
            return Err(Error::InvalidResponse(format!(
                "unexpected registration shape ({n} fields) in {line:?}"
            )))
        }
    };
    let act = if count == 5 {
        Some(int32(f.next_int()?, line)?)
    } else {
        None
    };
    Ok(Registration {
        stat,
        lac,
        cid,
        act,
    })
}

fn optional_hex(f: &mut Fields<'_>) -> Result<Option<u32>> {
    match f.peek() {
        Some(Token::Empty) => {
            f.skip()?;
            Ok(None)
        }
        _ => f.next_hex().map(Some),
    }
}

/// Access technology (4th field) of a `+COPS?` answer, if present.
pub fn parse_cops_act(line: &str) -> Result<Option<i64>> {
    let mut f = Fields::parse(line)?;
    if f.len() < 4 {
        return Ok(None);
    }
    f.skip()?;
    f.skip()?;
    f.skip()?;
    f.next_int().map(Some)
}

/// Map a 27.007 `<AcT>` value to the host's data radio technology.
pub fn cops_act_to_network_type(act: i64) -> Option<i32> {
    match act {
        0 | 1 => Some(1), // GPRS
        3 => Some(2),     // EDGE
        2 | 7 => Some(3), // UMTS
        4..=6 => Some(9), // HSPA family
        _ => None,
    }
}

/// Operator names from the three answers to [`OPERATOR_QUERY`], in long,
/// short, numeric order. A line with no `<oper>` field means unregistered.
pub fn parse_operator(lines: &[String]) -> Result<OperatorInfo> {
    let [long, short, numeric] = lines else {
        return Err(Error::InvalidResponse(format!(
            "expected 3 +COPS lines, got {}",
            lines.len()
        )));
    };
    let name = |line: &str| -> Result<Option<String>> {
        let mut f = Fields::parse(line)?;
        if f.len() < 3 {
            return Ok(None);
        }
        f.skip()?;
        f.skip()?;
        Ok(Some(f.next_str()?.to_string()))
    };
    Ok(OperatorInfo {
        long_name: name(long.as_str())?,
        short_name: name(short.as_str())?,
        numeric: name(numeric.as_str())?,
    })
}

/// Selection mode (`0` automatic, `1` manual) from `+COPS: <mode>,...`.
pub fn parse_selection_mode(line: &str) -> Result<i32> {
    let mut f = Fields::parse(line)?;
    int32(f.next_int()?, line)
}

// ---------------------------------------------------------------
// SMS
// ---------------------------------------------------------------

/// Service centre address from `+CSCA: "<number>",<toa>`.
pub fn parse_csca(line: &str) -> Result<(String, u8)> {
    let mut f = Fields::parse(line)?;
    let number = f.next_str()?.to_string();
    let toa = f.next_int()?;
    let toa = u8::try_from(toa)
        .map_err(|_| Error::InvalidResponse(format!("bad type of address in {line:?}")))?;
    Ok((number, toa))
}

/// Encode a service centre address as the SMSC prefix of a submit PDU:
/// length octet, type of address, then semi-octet swapped BCD digits
/// padded with `F`.
pub fn encode_smsc(number: &str, toa: u8) -> String {
    let digits: Vec<char> = number.trim_start_matches('+').chars().collect();
    let octets = (digits.len() + 1) / 2 + 1;
    let mut out = format!("{octets:02x}{toa:02x}");
    for pair in digits.chunks(2) {
        match pair {
            [a, b] => {
                out.push(*b);
                out.push(*a);
            }
            [a] => {
                out.push('F');
                out.push(*a);
            }
            _ => {}
        }
    }
    out
}

/// `AT+CMGS=<tpdu octets>`, for a PDU given without its SMSC prefix.
pub fn cmd_send_sms(pdu: &str) -> Result<String> {
    Ok(format!("AT+CMGS={}", require_hex_pdu(pdu)?))
}

/// `AT+CMGW=<tpdu octets>,<stat>`.
pub fn cmd_write_sms(pdu: &str, status: u8) -> Result<String> {
    if status > 3 {
        return Err(Error::InvalidParameter(format!(
            "SMS storage status {status} out of range 0..=3"
        )));
    }
    Ok(format!("AT+CMGW={},{status}", require_hex_pdu(pdu)?))
}

/// First integer of `+CMGS:` / `+CMGW:`.
pub fn parse_message_ref(line: &str) -> Result<i32> {
    let mut f = Fields::parse(line)?;
    int32(f.next_int()?, line)
}

pub fn cmd_sms_acknowledge(success: bool) -> &'static str {
    if success {
        "AT+CNMA=1"
    } else {
        "AT+CNMA=2"
    }
}

// ---------------------------------------------------------------
// Packet data
// ---------------------------------------------------------------

/// One `+CGDCONT:` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdpContext {
    pub cid: u32,
    pub pdp_type: String,
    pub apn: String,
    pub address: String,
}

/// `+CGACT: <cid>,<state>` lines.
pub fn parse_cgact(lines: &[String]) -> Result<Vec<(u32, bool)>> {
    lines
        .iter()
        .map(|line| {
            let mut f = Fields::parse(line)?;
            let cid = cid(f.next_int()?, line)?;
            Ok((cid, f.next_bool()?))
        })
        .collect()
}

/// `+CGDCONT: <cid>,"<type>","<apn>"[,"<addr>",...]` lines.
pub fn parse_cgdcont(lines: &[String]) -> Result<Vec<PdpContext>> {
    lines
        .iter()
        .map(|line| {
            let mut f = Fields::parse(line)?;
            let cid = cid(f.next_int()?, line)?;
            let pdp_type = f.next_str()?.to_string();
            let apn = f.next_str()?.to_string();
            let address = if f.has_more() {
                f.next_str()?.to_string()
            } else {
                String::new()
            };
            Ok(PdpContext {
                cid,
                pdp_type,
                apn,
                address,
            })
        })
        .collect()
}

/// Data call list in `+CGACT?` order, filled in from `+CGDCONT?`.
pub fn merge_data_calls(
    activation: &[(u32, bool)],
    contexts: &[PdpContext],
    ifname: &str,
) -> Vec<DataCall> {
    activation
        .iter()
        .map(|&(cid, active)| {
            let ctx = contexts.iter().find(|c| c.cid == cid);
            DataCall {
                cid,
                active,
                pdp_type: ctx.map(|c| c.pdp_type.clone()).unwrap_or_default(),
                apn: ctx.map(|c| c.apn.clone()).unwrap_or_default(),
                address: ctx.map(|c| c.address.clone()).unwrap_or_default(),
                ifname: ifname.to_string(),
            }
        })
        .collect()
}

pub fn cmd_deactivate_data_call(cid: u32) -> String {
    format!("AT+CGACT=0,{cid}")
}

// ---------------------------------------------------------------
// USSD
// ---------------------------------------------------------------

/// `AT+CUSD=1,"<hex>",15` with the request in GSM default alphabet.
pub fn cmd_send_ussd(request: &str) -> String {
    format!("AT+CUSD=1,\"{}\",15", gsm::encode_hex(request))
}

pub const CANCEL_USSD: &str = "AT+CUSD=2";

/// `+CUSD: <m>[,"<hex>"[,<dcs>]]`. A message that does not decode as GSM
/// hex is passed through as sent.
pub fn parse_cusd(line: &str) -> Result<(u8, Option<String>)> {
    let mut f = Fields::parse(line)?;
    let code = f.next_int()?;
    let code = u8::try_from(code)
        .map_err(|_| Error::InvalidResponse(format!("bad USSD code in {line:?}")))?;
    let message = if f.has_more() {
        let raw = f.next_str()?;
        Some(gsm::decode_hex(raw).unwrap_or_else(|| raw.to_string()))
    } else {
        None
    };
    Ok((code, message))
}

// ---------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------

fn int32(v: i64, line: &str) -> Result<i32> {
    i32::try_from(v).map_err(|_| Error::InvalidResponse(format!("{v} out of range in {line:?}")))
}

fn cid(v: i64, line: &str) -> Result<u32> {
    u32::try_from(v).map_err(|_| Error::InvalidResponse(format!("bad context id in {line:?}")))
}
