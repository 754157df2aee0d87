//! GSM 03.38 default alphabet, unpacked 8-bit form, as hex strings.
//!
//! USSD strings travel as `AT+CUSD=1,"<hex>",15` and come back in `+CUSD:`
//! the same way: one septet per byte, hex encoded. Characters outside the
//! default alphabet (and the escape table) are sent as `?`.

/// Default alphabet, indexed by septet value. 0x1B is the escape to the
/// extension table and decodes to a space on its own.
const DEFAULT_ALPHABET: [char; 128] = [
    '@', '£', '$', '¥', 'è', 'é', 'ù', 'ì', 'ò', 'Ç', '\n', 'Ø', 'ø', '\r', 'Å', 'å', //
    'Δ', '_', 'Φ', 'Γ', 'Λ', 'Ω', 'Π', 'Ψ', 'Σ', 'Θ', 'Ξ', ' ', 'Æ', 'æ', 'ß', 'É', //
    ' ', '!', '"', '#', '¤', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/', //
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?', //
    '¡', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', //
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'Ä', 'Ö', 'Ñ', 'Ü', '§', //
    '¿', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', //
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'ä', 'ö', 'ñ', 'ü', 'à', //
];

const ESCAPE: u8 = 0x1b;

/// Extension table reached through the escape septet.
const EXTENSION: &[(u8, char)] = &[
    (0x0a, '\u{0c}'),
    (0x14, '^'),
    (0x28, '{'),
    (0x29, '}'),
    (0x2f, '\\'),
    (0x3c, '['),
    (0x3d, '~'),
    (0x3e, ']'),
    (0x40, '|'),
    (0x65, '€'),
];

/// Encode `text` as hex of unpacked GSM septets (uppercase digits).
pub fn encode_hex(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for ch in text.chars() {
        if let Some(septet) = DEFAULT_ALPHABET
            .iter()
            .enumerate()
            .find(|&(i, &c)| c == ch && i != ESCAPE as usize)
            .map(|(i, _)| i)
        {
            push_hex(&mut out, septet as u8);
        } else if let Some(&(code, _)) = EXTENSION.iter().find(|(_, c)| *c == ch) {
            push_hex(&mut out, ESCAPE);
            push_hex(&mut out, code);
        } else {
            push_hex(&mut out, b'?');
        }
    }
    out
}

/// Decode hex of unpacked GSM septets. Returns `None` if `hex` is not an
/// even-length string of hex digits.
pub fn decode_hex(hex: &str) -> Option<String> {
    if hex.len() % 2 != 0 {
        return None;
    }
    let bytes = hex
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let s = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(s, 16).ok()
        })
        .collect::<Option<Vec<u8>>>()?;

    let mut out = String::with_capacity(bytes.len());
    let mut iter = bytes.into_iter();
    while let Some(b) = iter.next() {
        let septet = b & 0x7f;
        if septet == ESCAPE {
            match iter.next() {
                Some(code) => match EXTENSION.iter().find(|(c, _)| *c == code & 0x7f) {
                    Some(&(_, ch)) => out.push(ch),
                    None => out.push(DEFAULT_ALPHABET[(code & 0x7f) as usize]),
                },
                None => out.push(' '),
            }
        } else {
            out.push(DEFAULT_ALPHABET[septet as usize]);
        }
    }
    Some(out)
}

fn push_hex(out: &mut String, b: u8) {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    out.push(DIGITS[(b >> 4) as usize] as char);
    out.push(DIGITS[(b & 0x0f) as usize] as char);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_letters_and_digits_map_to_themselves() {
        assert_eq!(encode_hex("*100#"), "2A31303023");
        assert_eq!(decode_hex("2A31303023").as_deref(), Some("*100#"));
    }

    #[test]
    fn at_sign_and_currency_are_remapped() {
        assert_eq!(encode_hex("@"), "00");
        assert_eq!(encode_hex("$"), "02");
        assert_eq!(decode_hex("0102").as_deref(), Some("£$"));
    }

    #[test]
    fn extension_characters_use_escape() {
        assert_eq!(encode_hex("€"), "1B65");
        assert_eq!(decode_hex("1B65").as_deref(), Some("€"));
        assert_eq!(decode_hex("1B3C1B3E").as_deref(), Some("[]"));
    }

    #[test]
    fn unmappable_characters_become_question_marks() {
        assert_eq!(encode_hex("中"), "3F");
    }

    #[test]
    fn malformed_hex_is_rejected() {
        assert!(decode_hex("ABC").is_none());
        assert!(decode_hex("ZZ").is_none());
    }

    #[test]
    fn balance_reply_decodes() {
        let hex = encode_hex("Balance: 5.00 EUR");
        assert_eq!(decode_hex(&hex).as_deref(), Some("Balance: 5.00 EUR"));
    }
}
