//! AT line framing and result classification.
//!
//! The modem speaks CR/LF-terminated text lines. Two exceptions shape the
//! framer:
//!
//! - After an SMS submission command the modem answers with the bare
//!   two-byte prompt `"> "`, with no terminator. It is only recognized while
//!   the channel is waiting for it, since `>` can legitimately start a line.
//! - SMS delivery indications (`+CMT:`, `+CDS:`, `+CBM:`) are followed by a
//!   second line carrying the hex PDU. Pairing is left to the channel.

use ril_core::error::{Error, Result};

/// Largest single response the framer will buffer before giving up.
pub const MAX_AT_RESPONSE: usize = 0x1000;

/// Terminator written after an SMS PDU.
pub const CTRL_Z: u8 = 0x1a;

/// Final result tokens that complete a command successfully.
const FINAL_SUCCESS: &[&str] = &["OK", "CONNECT"];

/// Final result tokens that complete a command with an error.
/// Matched as prefixes so that `+CME ERROR: <n>` carries its code along.
const FINAL_ERROR: &[&str] = &[
    "ERROR",
    "+CMS ERROR:",
    "+CME ERROR:",
    "NO CARRIER",
    "NO ANSWER",
    "NO DIALTONE",
    "BUSY",
];

/// Unsolicited lines that are followed by a PDU line.
const SMS_UNSOLICITED: &[&str] = &["+CMT:", "+CDS:", "+CBM:"];

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// A final result line, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalResult {
    Success,
    Error {
        /// Numeric code from `+CME ERROR: n` or `+CMS ERROR: n`.
        cme: Option<u32>,
    },
}

/// Classify `line` as a final result token, or `None` if it is not one.
pub fn classify_final(line: &str) -> Option<FinalResult> {
    if FINAL_SUCCESS.iter().any(|t| line.starts_with(t)) {
        return Some(FinalResult::Success);
    }
    if FINAL_ERROR.iter().any(|t| line.starts_with(t)) {
        return Some(FinalResult::Error {
            cme: parse_error_code(line),
        });
    }
    None
}

/// Extract `<n>` from `+CME ERROR: <n>` / `+CMS ERROR: <n>`.
pub fn parse_error_code(line: &str) -> Option<u32> {
    let rest = line
        .strip_prefix("+CME ERROR:")
        .or_else(|| line.strip_prefix("+CMS ERROR:"))?;
    rest.trim().parse().ok()
}

/// Whether `line` is an SMS indication whose PDU follows on the next line.
pub fn is_sms_unsolicited(line: &str) -> bool {
    SMS_UNSOLICITED.iter().any(|p| line.starts_with(p))
}

// ---------------------------------------------------------------------------
// Framer
// ---------------------------------------------------------------------------

/// One unit produced by the framer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line with its terminator stripped.
    Line(String),
    /// The SMS prompt `"> "`.
    Prompt,
}

/// Accumulates raw bytes and cuts them into [`Frame`]s.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
    max_len: usize,
}

impl LineFramer {
    /// Create a framer that fails once a partial line exceeds `max_len`.
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(256),
            max_len,
        }
    }

    /// Append received bytes.
    ///
    /// Returns [`Error::Framing`] if the unterminated tail would exceed the
    /// maximum response size. The channel treats that as fatal.
    pub fn push(&mut self, data: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(data);
        self.skip_terminators();
        let tail = match self.buf.iter().rposition(|&b| b == b'\r' || b == b'\n') {
            Some(i) => self.buf.len() - i - 1,
            None => self.buf.len(),
        };
        if tail > self.max_len {
            self.buf.clear();
            return Err(Error::Framing(format!(
                "response of {tail} bytes exceeds {} without a line terminator",
                self.max_len
            )));
        }
        Ok(())
    }

    /// Pop the next complete frame.
    ///
    /// `expect_prompt` enables recognition of the SMS prompt, and must only
    /// be set while an SMS submission is waiting for it.
    pub fn next_frame(&mut self, expect_prompt: bool) -> Option<Frame> {
        self.skip_terminators();

        if expect_prompt && self.buf.starts_with(b"> ") {
            self.buf.drain(..2);
            return Some(Frame::Prompt);
        }

        let end = self.buf.iter().position(|&b| b == b'\r' || b == b'\n')?;
        let line = String::from_utf8_lossy(&self.buf[..end]).into_owned();
        self.buf.drain(..end);
        self.skip_terminators();
        Some(Frame::Line(line))
    }

    /// Bytes buffered but not yet framed.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    fn skip_terminators(&mut self) {
        let n = self
            .buf
            .iter()
            .take_while(|&&b| b == b'\r' || b == b'\n')
            .count();
        if n > 0 {
            self.buf.drain(..n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(s: &str) -> Option<Frame> {
        Some(Frame::Line(s.to_string()))
    }

    // =======================================================================
    // classify_final
    // =======================================================================

    #[test]
    fn ok_is_success() {
        assert_eq!(classify_final("OK"), Some(FinalResult::Success));
        assert_eq!(classify_final("CONNECT 115200"), Some(FinalResult::Success));
    }

    #[test]
    fn error_tokens() {
        assert_eq!(classify_final("ERROR"), Some(FinalResult::Error { cme: None }));
        assert_eq!(classify_final("NO CARRIER"), Some(FinalResult::Error { cme: None }));
        assert_eq!(classify_final("NO DIALTONE"), Some(FinalResult::Error { cme: None }));
        assert_eq!(classify_final("NO ANSWER"), Some(FinalResult::Error { cme: None }));
        assert_eq!(classify_final("BUSY"), Some(FinalResult::Error { cme: None }));
    }

    #[test]
    fn cme_error_carries_code() {
        assert_eq!(
            classify_final("+CME ERROR: 10"),
            Some(FinalResult::Error { cme: Some(10) })
        );
        assert_eq!(
            classify_final("+CMS ERROR: 304"),
            Some(FinalResult::Error { cme: Some(304) })
        );
    }

    #[test]
    fn verbose_cme_error_has_no_code() {
        assert_eq!(
            classify_final("+CME ERROR: SIM not inserted"),
            Some(FinalResult::Error { cme: None })
        );
    }

    #[test]
    fn intermediate_lines_are_not_final() {
        assert_eq!(classify_final("+CSQ: 14,99"), None);
        assert_eq!(classify_final("+CREG: 1"), None);
        assert_eq!(classify_final("RING"), None);
    }

    #[test]
    fn sms_unsolicited_prefixes() {
        assert!(is_sms_unsolicited("+CMT: ,23"));
        assert!(is_sms_unsolicited("+CDS: 25"));
        assert!(is_sms_unsolicited("+CBM: 88"));
        assert!(!is_sms_unsolicited("+CMGS: 4"));
    }

    // =======================================================================
    // LineFramer
    // =======================================================================

    #[test]
    fn frames_crlf_lines() {
        let mut f = LineFramer::new(MAX_AT_RESPONSE);
        f.push(b"\r\n+CSQ: 14,99\r\n\r\nOK\r\n").unwrap();
        assert_eq!(f.next_frame(false), line("+CSQ: 14,99"));
        assert_eq!(f.next_frame(false), line("OK"));
        assert_eq!(f.next_frame(false), None);
        assert_eq!(f.pending_len(), 0);
    }

    #[test]
    fn partial_line_waits_for_terminator() {
        let mut f = LineFramer::new(MAX_AT_RESPONSE);
        f.push(b"+CREG: 0,").unwrap();
        assert_eq!(f.next_frame(false), None);
        f.push(b"1\r").unwrap();
        assert_eq!(f.next_frame(false), line("+CREG: 0,1"));
    }

    #[test]
    fn bare_cr_and_bare_lf_both_terminate() {
        let mut f = LineFramer::new(MAX_AT_RESPONSE);
        f.push(b"RING\rRING\n").unwrap();
        assert_eq!(f.next_frame(false), line("RING"));
        assert_eq!(f.next_frame(false), line("RING"));
    }

    #[test]
    fn prompt_recognized_only_when_expected() {
        let mut f = LineFramer::new(MAX_AT_RESPONSE);
        f.push(b"\r\n> ").unwrap();
        assert_eq!(f.next_frame(false), None);
        assert_eq!(f.next_frame(true), Some(Frame::Prompt));
        assert_eq!(f.pending_len(), 0);
    }

    #[test]
    fn prompt_followed_by_more_data() {
        let mut f = LineFramer::new(MAX_AT_RESPONSE);
        f.push(b"> \r\n+CMGS: 7\r\n").unwrap();
        assert_eq!(f.next_frame(true), Some(Frame::Prompt));
        assert_eq!(f.next_frame(false), line("+CMGS: 7"));
    }

    #[test]
    fn overflow_without_terminator_is_framing_error() {
        let mut f = LineFramer::new(16);
        let result = f.push(&[b'A'; 17]);
        assert!(matches!(result, Err(Error::Framing(_))));
        assert_eq!(f.pending_len(), 0);
    }

    #[test]
    fn long_input_with_terminators_is_accepted() {
        let mut f = LineFramer::new(16);
        f.push(b"0123456789\r\n0123456789\r\n").unwrap();
        assert_eq!(f.next_frame(false), line("0123456789"));
        assert_eq!(f.next_frame(false), line("0123456789"));
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let mut f = LineFramer::new(MAX_AT_RESPONSE);
        f.push(b"+COPS: 0,0,\"\xffoo\"\r\n").unwrap();
        match f.next_frame(false) {
            Some(Frame::Line(l)) => assert!(l.starts_with("+COPS: 0,0,")),
            other => panic!("expected line, got {other:?}"),
        }
    }
}
