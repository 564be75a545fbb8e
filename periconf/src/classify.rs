//! Text-versus-binary classification of received byte chunks.
//!
//! The boards answer commands with plain text, but with RS-485 diagnostics
//! enabled they also echo raw bus frames. Those frames are summarized instead
//! of being rendered as garbage.

use std::fmt;

use crate::text::{decode_dropping_invalid, is_printable, strip_unprintable};

/// Strings shorter than this are always treated as text.
const MIN_JUDGED_LEN: usize = 5;

/// Minimum share of printable characters in the decoded chunk.
const MIN_PRINTABLE_RATIO: f64 = 0.7;

/// Share of hex digits and spaces above which a long chunk is a hex dump.
const MAX_HEX_RATIO: f64 = 0.8;

/// Hex-dump detection only applies to chunks longer than this.
const HEX_DUMP_MIN_LEN: usize = 20;

/// Number of raw bytes shown in a binary preview.
pub const PREVIEW_BYTES: usize = 10;

/// Leading markers of raw RS-485 frames echoed by the firmware.
const RAW_FRAME_MARKERS: &[&str] = &["3E ", "31 ", ">", "0x3E", "0x31"];

/// Outcome of classifying one received chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Human-readable text, cleaned of unprintable characters and trimmed.
    TextLine(String),
    /// Binary diagnostic noise.
    BinaryPreview(BinaryPreview),
}

/// Compact description of a binary chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryPreview {
    /// Total number of bytes in the chunk.
    pub byte_count: usize,
    /// First bytes as space-separated two-digit uppercase hex.
    pub hex_prefix: String,
}

impl BinaryPreview {
    /// Summarize `bytes`.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let hex_prefix = bytes
            .iter()
            .take(PREVIEW_BYTES)
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            byte_count: bytes.len(),
            hex_prefix,
        }
    }

    /// Whether the preview shows only part of the chunk.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.byte_count > PREVIEW_BYTES
    }
}

impl fmt::Display for BinaryPreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_truncated() {
            write!(
                f,
                "[binary data: {} bytes, {}...]",
                self.byte_count, self.hex_prefix
            )
        } else {
            write!(f, "[binary data: {}]", self.hex_prefix)
        }
    }
}

/// Classify a freshly read chunk.
///
/// The rules are applied in order:
///
/// 1. decode as UTF-8 dropping invalid sequences, strip unprintable characters;
/// 2. nothing left → binary;
/// 3. fewer than 5 characters → text;
/// 4. less than 70% of the decoded characters printable → binary;
/// 5. longer than 20 characters and more than 80% hex digits or spaces → binary;
/// 6. starts with a raw frame marker → binary;
/// 7. text if it contains a Latin or Cyrillic letter, binary otherwise.
#[must_use]
pub fn classify(bytes: &[u8]) -> Response {
    let decoded = decode_dropping_invalid(bytes);
    let cleaned = strip_unprintable(&decoded);
    let text = cleaned.trim();

    if looks_like_text(&decoded, text) {
        Response::TextLine(text.to_string())
    } else {
        Response::BinaryPreview(BinaryPreview::of(bytes))
    }
}

fn looks_like_text(decoded: &str, text: &str) -> bool {
    if text.is_empty() {
        return false;
    }

    let len = text.chars().count();
    if len < MIN_JUDGED_LEN {
        return true;
    }

    if ratio(decoded, is_printable) < MIN_PRINTABLE_RATIO {
        return false;
    }

    if len > HEX_DUMP_MIN_LEN && ratio(text, is_hex_dump_char) > MAX_HEX_RATIO {
        return false;
    }

    if RAW_FRAME_MARKERS
        .iter()
        .any(|marker| text.starts_with(marker))
    {
        return false;
    }

    text.chars().any(is_letter)
}

#[allow(clippy::cast_precision_loss)]
fn ratio(text: &str, pred: impl Fn(char) -> bool) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let hits = text.chars().filter(|c| pred(*c)).count();
    hits as f64 / total as f64
}

fn is_hex_dump_char(c: char) -> bool {
    c.is_ascii_hexdigit() || c == ' '
}

fn is_letter(c: char) -> bool {
    c.is_ascii_alphabetic()
        || (('\u{00C0}'..='\u{024F}').contains(&c) && c.is_alphabetic())
        || ('\u{0400}'..='\u{04FF}').contains(&c)
}
