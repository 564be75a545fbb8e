//! Percentage extraction from streamed flashing-tool output.
//!
//! esptool interleaves prose with progress markers such as `12%`, `12.5 %` or
//! `(12 %)`, and a single marker may arrive split over several writes. The
//! tracker keeps a short trailing window of everything seen and reports the
//! most recent complete marker in it.

use std::sync::LazyLock;

use regex::Regex;

/// Number of trailing characters kept for matching.
pub const WINDOW_CHARS: usize = 100;

static PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // Static pattern
    Regex::new(r"(\d{1,3})(?:\.\d+)?\s?%").unwrap()
});

/// Sliding-window percentage parser.
#[derive(Debug, Default, Clone)]
pub struct ProgressTracker {
    window: String,
    last: Option<u8>,
}

impl ProgressTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of output and return the latest percentage in the window.
    ///
    /// Returns `None` when the window holds no usable marker. Values above 100
    /// are skipped in favour of the latest in-range marker.
    pub fn append(&mut self, chunk: &str) -> Option<u8> {
        if chunk.is_empty() {
            return self.last;
        }

        self.window.push_str(chunk);
        let len = self.window.chars().count();
        if len > WINDOW_CHARS {
            let cut = self
                .window
                .char_indices()
                .nth(len - WINDOW_CHARS)
                .map_or(0, |(idx, _)| idx);
            self.window.drain(..cut);
        }

        let latest = PERCENT_RE
            .captures_iter(&self.window)
            .filter_map(|caps| caps.get(1)?.as_str().parse::<u8>().ok())
            .filter(|pct| *pct <= 100)
            .last();

        if latest.is_some() {
            self.last = latest;
        }
        latest
    }

    /// The most recent percentage reported by [`append`](Self::append).
    #[must_use]
    pub fn last_percent(&self) -> Option<u8> {
        self.last
    }

    /// The current window contents.
    #[must_use]
    pub fn window(&self) -> &str {
        &self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_marker_wins() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.append("Writing at 0x00010000... (12 %)\n"), Some(12));
        assert_eq!(tracker.append("Writing at 0x00020000... (45 %)\n"), Some(45));
        assert_eq!(tracker.last_percent(), Some(45));
    }

    #[test]
    fn test_marker_formats() {
        for (text, expected) in [
            ("10%", 10),
            ("10 %", 10),
            ("(10 %)", 10),
            ("10.5%", 10),
            ("99.75 %", 99),
            ("100 %", 100),
            ("0%", 0),
        ] {
            let mut tracker = ProgressTracker::new();
            assert_eq!(tracker.append(text), Some(expected), "text {text:?}");
        }
    }

    #[test]
    fn test_marker_split_across_writes() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.append("Writing at 0x00010000... (6"), None);
        assert_eq!(tracker.append("7"), None);
        assert_eq!(tracker.append(" %)"), Some(67));
    }

    #[test]
    fn test_no_marker() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.append("Connecting...."), None);
        assert_eq!(tracker.append("Chip is ESP32-D0WD"), None);
        assert_eq!(tracker.last_percent(), None);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut tracker = ProgressTracker::new();
        tracker.append("(5 %)");
        tracker.append(&"x".repeat(150));
        assert_eq!(tracker.window().chars().count(), WINDOW_CHARS);
        // The old marker fell out of the window
        assert_eq!(tracker.append("y"), None);
        assert_eq!(tracker.last_percent(), Some(5));
    }

    #[test]
    fn test_window_handles_multibyte_chars() {
        let mut tracker = ProgressTracker::new();
        tracker.append(&"Запись ".repeat(30));
        assert_eq!(tracker.window().chars().count(), WINDOW_CHARS);
        assert_eq!(tracker.append("(33 %)"), Some(33));
    }

    #[test]
    fn test_out_of_range_ignored() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.append("(40 %) then 250 %"), Some(40));
        let mut fresh = ProgressTracker::new();
        assert_eq!(fresh.append("999%"), None);
    }

    #[test]
    fn test_empty_chunk_keeps_last() {
        let mut tracker = ProgressTracker::new();
        tracker.append("(20 %)");
        assert_eq!(tracker.append(""), Some(20));
    }
}
