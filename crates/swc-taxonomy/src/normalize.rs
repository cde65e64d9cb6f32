//! Free-text weakness-code extraction.
//!
//! Analyzer reports and LLM responses mention SWC codes in every shape the
//! ecosystem has produced: `SWC-101`, `swc_101`, `SWC-SWC-101` (a recurring
//! concatenation artifact in filtered tool output), codes embedded in JSON,
//! codes inside prose. `normalize` recovers the deduplicated canonical set
//! and never fails; malformed input yields the empty set.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::warn;

use crate::SwcId;

static SWC_TOKEN: Lazy<Regex> = Lazy::new(|| {
    // One or more SWC prefixes (collapsing the duplicated-prefix artifact)
    // followed by the numeric part. Separators tolerate -, _, and spaces.
    Regex::new(r"(?i)\b(?:SWC[-_\s]{0,2})+(\d{1,4})\b").expect("static regex")
});

static LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)//[^\n]*").expect("static regex"));
static BLOCK_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("static regex"));
static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("static regex"));

/// Extract every canonical weakness code mentioned anywhere in `text`.
pub fn normalize(text: &str) -> BTreeSet<SwcId> {
    SWC_TOKEN
        .captures_iter(text)
        .filter_map(|cap| cap[1].parse::<u32>().ok())
        .map(SwcId)
        .collect()
}

/// Render a set back to the comma-separated form used in verdict artifacts.
/// `normalize(render(s)) == s` for any set of canonical codes.
pub fn render(codes: &BTreeSet<SwcId>) -> String {
    codes
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse one analyzer report body. Valid JSON is compacted and harvested as
/// a whole (tool output embeds codes in arbitrary fields); anything else is
/// treated as plain text after stripping comments and blank runs.
pub fn parse_report_text(text: &str) -> BTreeSet<SwcId> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        return normalize(&value.to_string());
    }
    let cleaned = LINE_COMMENT.replace_all(text, "");
    let cleaned = BLOCK_COMMENT.replace_all(&cleaned, "");
    let cleaned = BLANK_RUN.replace_all(&cleaned, "\n\n");
    normalize(&cleaned)
}

/// Load and parse a report file. A missing or unreadable file is evidence
/// absence, not an error: log and return the empty set.
pub fn parse_report_file(path: &Path) -> BTreeSet<SwcId> {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_report_text(&text),
        Err(err) => {
            warn!(path = %path.display(), %err, "analyzer report unreadable; treating as no evidence");
            BTreeSet::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(ns: &[u32]) -> BTreeSet<SwcId> {
        ns.iter().copied().map(SwcId).collect()
    }

    #[test]
    fn extracts_and_dedupes() {
        let got = normalize("found SWC-101 and swc-107, also SWC-101 again");
        assert_eq!(got, ids(&[101, 107]));
    }

    #[test]
    fn collapses_repeated_prefix() {
        assert_eq!(normalize("SWC-SWC-101"), ids(&[101]));
        assert_eq!(normalize("SWC-SWC-SWC-110"), ids(&[110]));
    }

    #[test]
    fn tolerates_separator_noise() {
        assert_eq!(normalize("SWC_105, SWC 116"), ids(&[105, 116]));
    }

    #[test]
    fn malformed_input_yields_empty_set() {
        assert!(normalize("").is_empty());
        assert!(normalize("SWC- with no digits, and plain prose").is_empty());
        assert!(normalize("\u{0}\u{1}\u{2}").is_empty());
    }

    #[test]
    fn render_round_trips() {
        let set = ids(&[100, 104, 128]);
        assert_eq!(render(&set), "SWC-100, SWC-104, SWC-128");
        assert_eq!(normalize(&render(&set)), set);
    }

    #[test]
    fn parses_embedded_json_reports() {
        let report = r#"{"issues": [{"swc-id": "SWC-107", "title": "Reentrancy"},
                                     {"swc-id": "SWC-SWC-104"}]}"#;
        assert_eq!(parse_report_text(report), ids(&[104, 107]));
    }

    #[test]
    fn falls_back_to_plain_text_on_invalid_json() {
        let report = "{*not json*}\nMythril: SWC-101 at line 12\n\n\n\nSWC-110";
        assert_eq!(parse_report_text(report), ids(&[101, 110]));
    }

    #[test]
    fn missing_report_file_is_empty_evidence() {
        let got = parse_report_file(Path::new("/nonexistent/report.sol.txt"));
        assert!(got.is_empty());
    }
}
