//! Encoder output parsing: percent extraction, ETA grammars, and the
//! bounded rolling tail used for failure diagnostics.

use std::collections::VecDeque;

use once_cell::sync::Lazy;
use regex::Regex;

pub(super) const TAIL_MAX_LINES: usize = 25;
pub(super) const TAIL_MAX_CHARS: usize = 2000;

static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]{1,3}(?:\.[0-9]+)?)\s*%").expect("percent regex"));
static ETA_HMS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ETA\s+(\d{1,2}):(\d{2}):(\d{2})").expect("eta hms regex"));
static ETA_HM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ETA\s+(\d{1,2})h(\d{1,2})m(?:([0-9]{1,2})s)?").expect("eta hm regex"));
static ETA_MS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ETA\s+(\d{1,2})m([0-9]{1,2})s").expect("eta ms regex"));

/// Extract the encode percentage from a status line. Only lines that carry
/// both the `Encoding` marker and a percent sign count; everything else is
/// plain log output.
pub(super) fn parse_encode_percent(line: &str) -> Option<f64> {
    if !line.contains("Encoding") || !line.contains('%') {
        return None;
    }
    let captures = PERCENT_RE.captures(line)?;
    captures.get(1)?.as_str().parse().ok()
}

/// Parse the encoder's ETA in any of its three formats, in order:
/// `ETA HH:MM:SS`, `ETA NhNm[Ns]`, `ETA NmNs`.
pub(super) fn parse_eta_seconds(line: &str) -> Option<i64> {
    if let Some(c) = ETA_HMS_RE.captures(line) {
        let hours: i64 = c[1].parse().ok()?;
        let minutes: i64 = c[2].parse().ok()?;
        let seconds: i64 = c[3].parse().ok()?;
        return Some(hours * 3600 + minutes * 60 + seconds);
    }
    if let Some(c) = ETA_HM_RE.captures(line) {
        let hours: i64 = c[1].parse().ok()?;
        let minutes: i64 = c[2].parse().ok()?;
        let seconds: i64 = c.get(3).map_or(0, |m| m.as_str().parse().unwrap_or(0));
        return Some(hours * 3600 + minutes * 60 + seconds);
    }
    if let Some(c) = ETA_MS_RE.captures(line) {
        let minutes: i64 = c[1].parse().ok()?;
        let seconds: i64 = c[2].parse().ok()?;
        return Some(minutes * 60 + seconds);
    }
    None
}

/// Rolling window of the encoder's most recent output lines.
#[derive(Debug, Default)]
pub(super) struct RollingTail {
    lines: VecDeque<String>,
}

impl RollingTail {
    pub(super) fn push(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if self.lines.len() == TAIL_MAX_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    /// Joined tail bounded to [`TAIL_MAX_CHARS`] characters from the end.
    pub(super) fn text(&self) -> String {
        let joined = self
            .lines
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");
        let joined = joined.trim().to_string();
        if joined.chars().count() <= TAIL_MAX_CHARS {
            return joined;
        }
        let skip = joined.chars().count() - TAIL_MAX_CHARS;
        joined.chars().skip(skip).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_extracted_from_encoding_lines_only() {
        let line = "Encoding: task 1 of 1, 45.23 % (112.42 fps, avg 110.35 fps, ETA 00h12m34s)";
        let pct = parse_encode_percent(line).expect("percent should parse");
        assert!((pct - 45.23).abs() < 0.001);

        assert!(parse_encode_percent("Muxing: this may take awhile...").is_none());
        assert!(parse_encode_percent("45.23 % but no marker").is_none());
        assert!(parse_encode_percent("Encoding without a number").is_none());
    }

    #[test]
    fn eta_hms_format_parses() {
        assert_eq!(parse_eta_seconds("ETA 01:02:03"), Some(3723));
    }

    #[test]
    fn eta_hm_format_parses_with_optional_seconds() {
        assert_eq!(parse_eta_seconds("ETA 1h2m3s"), Some(3723));
        assert_eq!(parse_eta_seconds("ETA 1h2m"), Some(3720));
    }

    #[test]
    fn eta_ms_format_parses() {
        assert_eq!(parse_eta_seconds("ETA 12m34s"), Some(754));
    }

    #[test]
    fn eta_formats_are_tried_in_order() {
        // A full encoder line with the NhNmNs grammar.
        let line = "Encoding: 45.2 % (110 fps, ETA 00h12m34s)";
        assert_eq!(parse_eta_seconds(line), Some(754));
        assert_eq!(parse_eta_seconds("no eta here"), None);
    }

    #[test]
    fn rolling_tail_caps_lines_and_chars() {
        let mut tail = RollingTail::default();
        for i in 0..100 {
            tail.push(&format!("line {i}"));
        }
        let text = tail.text();
        assert!(text.starts_with("line 75"));
        assert!(text.ends_with("line 99"));

        let mut tail = RollingTail::default();
        for _ in 0..TAIL_MAX_LINES {
            tail.push(&"y".repeat(200));
        }
        assert_eq!(tail.text().chars().count(), TAIL_MAX_CHARS);
    }

    #[test]
    fn rolling_tail_skips_blank_lines() {
        let mut tail = RollingTail::default();
        tail.push("   ");
        tail.push("real output");
        assert_eq!(tail.text(), "real output");
    }
}
