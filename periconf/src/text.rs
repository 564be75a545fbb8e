//! Byte-to-text helpers shared by the response classifier and the flash output reader.

/// Decode bytes as UTF-8, silently dropping invalid sequences.
///
/// Unlike [`String::from_utf8_lossy`] no replacement character is inserted, so a
/// chunk of binary noise can decode to an empty string.
#[must_use]
pub fn decode_dropping_invalid(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

/// Whether a character counts as printable.
///
/// Control characters are not printable, except newline, carriage return and tab.
#[must_use]
pub fn is_printable(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\t') || !c.is_control()
}

/// Drop everything [`is_printable`] rejects.
#[must_use]
pub fn strip_unprintable(text: &str) -> String {
    text.chars().filter(|c| is_printable(*c)).collect()
}

/// Length of a trailing UTF-8 sequence that is cut short.
///
/// Zero when `bytes` ends on a character boundary or with bytes that can never
/// start a valid character.
#[must_use]
pub fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    let floor = bytes.len().saturating_sub(3);
    for start in (floor..bytes.len()).rev() {
        if bytes[start] & 0xC0 == 0x80 {
            continue;
        }
        return match std::str::from_utf8(&bytes[start..]) {
            Err(e) if e.valid_up_to() == 0 && e.error_len().is_none() => bytes.len() - start,
            _ => 0,
        };
    }
    0
}

/// Take every byte of `pending` up to the last complete character.
///
/// A character cut short at the end stays in `pending` until the rest of it
/// arrives with the next read.
pub fn take_complete(pending: &mut Vec<u8>) -> Vec<u8> {
    let keep = incomplete_suffix_len(pending);
    let rest = pending.split_off(pending.len() - keep);
    std::mem::replace(pending, rest)
}
