//! Heuristic field extraction from detail-page text.
//!
//! Every category owns its own ordered pattern list and is evaluated
//! independently of the others, so a new label format added to one category
//! cannot produce matches in another.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{DetailRecord, Talkgroup};

/// Lines at or above this length are not treated as `key: value` pairs.
pub const MAX_FIELD_LINE_LEN: usize = 200;

/// Keys never harvested from `key: value` lines.
const NOISE_KEYS: &[&str] = &["", "call", "date", "details", "http", "https"];

type Setter = fn(&mut DetailRecord, String);

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("hardcoded regex pattern is valid")
}

static REPEATER_ID: LazyLock<Regex> = LazyLock::new(|| re(r"Repeater ID:\s*(\S+)"));

/// Frequency fields: each pattern is independent and sets its own field.
static FREQUENCY_RULES: LazyLock<Vec<(Regex, Setter)>> = LazyLock::new(|| {
    vec![
        (re(r"Downlink:\s*(\d+\.\d+)"), |d, v| d.downlink = Some(v)),
        (re(r"Uplink:\s*(\d+\.\d+)"), |d, v| d.uplink = Some(v)),
        (re(r"Offset:\s*([+-]?\d+\.\d+)\s*MHz"), |d, v| d.offset = Some(v)),
    ]
});

/// Color code labels, first match wins.
static COLOR_CODE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        re(r"(?i)DMR\s+Color\s+Code\s*:\s*(\d+)"),
        re(r"(?i)Color\s+Code\s*:\s*(\d+)"),
    ]
});

/// DMR id labels, first match wins. Only digits are captured, so
/// placeholders like "DMR ID: pending" never match.
static DMR_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        re(r"(?i)DMR\s+ID:\s*(\d+)"),
        re(r"(?i)DMR\s+ID\s+(\d+)"),
        re(r"(?i)DMRID:\s*(\d+)"),
    ]
});

static TALKGROUP: LazyLock<Regex> = LazyLock::new(|| re(r"(TS[12])\s+(TG\d+)\s*🔊\s*=\s*(\d+)"));

/// Network names and labels that only appear on digital-voice pages.
static DIGITAL_INDICATORS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        re(r"(?i)DMR\s+Color\s+Code"),
        re(r"(?i)DMR\s+Network"),
        re(r"(?i)DMR\s+ID"),
        re(r"(?i)Western\s+States\s+DMR"),
        re(r"(?i)Brandmeister"),
        re(r"(?i)IPSC"),
        re(r"(?i)DMR\s*-?\s*Marc"),
    ]
});

static GRID_SQUARE: LazyLock<Regex> = LazyLock::new(|| re(r"[A-Z]{2}[0-9]{2}[a-z]{2}"));

/// Which of the weak digital-voice signals fired for a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigitalSignals {
    pub color_code: bool,
    pub dmr_id: bool,
    pub talkgroups: bool,
    pub network_name: bool,
}

impl DigitalSignals {
    /// A page is digital if any one signal is present.
    pub fn is_digital(&self) -> bool {
        self.color_code || self.dmr_id || self.talkgroups || self.network_name
    }

    pub fn reasons(&self) -> Vec<&'static str> {
        [
            (self.color_code, "color_code"),
            (self.dmr_id, "dmr_id"),
            (self.talkgroups, "talkgroups"),
            (self.network_name, "network_name"),
        ]
        .into_iter()
        .filter_map(|(hit, name)| hit.then_some(name))
        .collect()
    }
}

/// Run every extraction category over visible page text.
///
/// Status-network identifiers are not handled here; see
/// [`crate::status::StatusNetwork::detect`].
pub fn extract_detail(text: &str) -> DetailRecord {
    let mut detail = DetailRecord {
        repeater_id: capture_first(std::slice::from_ref(&*REPEATER_ID), text),
        ..DetailRecord::default()
    };
    extract_frequencies(text, &mut detail);
    detail.talkgroups = extract_talkgroups(text);
    let signals = extract_digital(text, &mut detail);
    if signals.is_digital() {
        tracing::trace!(reasons = ?signals.reasons(), "Digital voice detected");
    }
    detail.extra = harvest_key_values(text);
    detail.grid_squares = grid_squares(text);
    detail
}

/// Downlink, uplink and signed offset, each independently optional.
pub fn extract_frequencies(text: &str, detail: &mut DetailRecord) {
    for (pattern, set) in FREQUENCY_RULES.iter() {
        if let Some(value) = pattern.captures(text).and_then(|c| c.get(1)) {
            set(detail, value.as_str().to_string());
        }
    }
}

/// Color code, DMR id and the digital flag.
///
/// The flag is an OR of weak signals; color code and id are extracted on
/// their own and may be absent even when the flag is set. Talkgroups must
/// already be on `detail`.
pub fn extract_digital(text: &str, detail: &mut DetailRecord) -> DigitalSignals {
    detail.color_code = capture_first(&COLOR_CODE_PATTERNS, text);
    detail.dmr_id = capture_first(&DMR_ID_PATTERNS, text);

    let signals = DigitalSignals {
        color_code: detail.color_code.is_some(),
        dmr_id: detail.dmr_id.is_some(),
        talkgroups: !detail.talkgroups.is_empty(),
        network_name: DIGITAL_INDICATORS.iter().any(|p| p.is_match(text)),
    };
    detail.digital = signals.is_digital();
    signals
}

/// All `TS1 TG91 🔊 = 91` style assignments, in page order.
pub fn extract_talkgroups(text: &str) -> Vec<Talkgroup> {
    TALKGROUP
        .captures_iter(text)
        .map(|c| Talkgroup {
            slot: if &c[1] == "TS1" { 1 } else { 2 },
            group: c[2].to_string(),
            number: c[3].to_string(),
        })
        .collect()
}

/// Generic `key: value` lines.
///
/// Lines are split at the first colon. Keys are lower-cased with spaces and
/// dashes turned into underscores; empty values and noise keys are skipped.
pub fn harvest_key_values(text: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for line in text.lines().map(str::trim) {
        if line.len() >= MAX_FIELD_LINE_LEN {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = normalize_key(key);
        let value = value.trim();
        if value.is_empty() || NOISE_KEYS.contains(&key.as_str()) {
            continue;
        }
        fields.insert(key, value.to_string());
    }
    fields
}

/// `"Color Code"` → `"color_code"`, `"DG-ID"` → `"dg_id"`.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace([' ', '-'], "_")
}

/// Every Maidenhead-style locator (`CM87wj`) on the page.
pub fn grid_squares(text: &str) -> Vec<String> {
    GRID_SQUARE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// First capture group of the first pattern that matches.
pub(crate) fn capture_first(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|p| {
        p.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DMR_PAGE: &str = "Repeater ID: 4521\n\
        Downlink: 444.125\n\
        Uplink: 449.125\n\
        Offset: +5.000 MHz\n\
        DMR Color Code: 1\n\
        DMR ID: 310724\n\
        TS1 TG91 🔊 = 91\n\
        TS2 TG3100 🔊 = 3100\n\
        Sponsor: Valley ARC\n\
        Grid: CM87wj and CM87xk\n";

    #[test]
    fn test_extracts_frequency_pair_and_offset() {
        let detail = extract_detail(DMR_PAGE);
        assert_eq!(detail.downlink.as_deref(), Some("444.125"));
        assert_eq!(detail.uplink.as_deref(), Some("449.125"));
        assert_eq!(detail.offset.as_deref(), Some("+5.000"));
        assert_eq!(detail.repeater_id.as_deref(), Some("4521"));
    }

    #[test]
    fn test_frequency_fields_are_independent() {
        let mut detail = DetailRecord::default();
        extract_frequencies("Uplink: 147.540\nOffset: -0.600 MHz", &mut detail);
        assert_eq!(detail.downlink, None);
        assert_eq!(detail.uplink.as_deref(), Some("147.540"));
        assert_eq!(detail.offset.as_deref(), Some("-0.600"));
    }

    #[test]
    fn test_offset_requires_mhz_unit() {
        let mut detail = DetailRecord::default();
        extract_frequencies("Offset: 0.600", &mut detail);
        assert_eq!(detail.offset, None);
    }

    #[test]
    fn test_full_dmr_page_is_digital() {
        let detail = extract_detail(DMR_PAGE);
        assert!(detail.digital);
        assert_eq!(detail.color_code.as_deref(), Some("1"));
        assert_eq!(detail.dmr_id.as_deref(), Some("310724"));
        assert_eq!(detail.talkgroups.len(), 2);
        assert_eq!(detail.talkgroups[1].slot, 2);
        assert_eq!(detail.talkgroups[1].group, "TG3100");
    }

    #[test]
    fn test_color_code_alone_is_digital() {
        let mut detail = DetailRecord::default();
        let signals = extract_digital("Color Code: 7", &mut detail);
        assert_eq!(
            signals,
            DigitalSignals {
                color_code: true,
                ..DigitalSignals::default()
            }
        );
        assert!(detail.digital);
        assert_eq!(detail.dmr_id, None);
    }

    #[test]
    fn test_no_signals_is_analog() {
        let detail = extract_detail("Downlink: 146.940\nTone: 100.0\nUse: OPEN");
        assert!(!detail.digital);
        assert_eq!(detail.color_code, None);
    }

    #[test]
    fn test_network_name_alone_is_digital() {
        let detail = extract_detail("Linked to Brandmeister");
        assert!(detail.digital);
        assert_eq!(detail.color_code, None);
        assert_eq!(detail.dmr_id, None);
    }

    #[test]
    fn test_talkgroups_alone_are_digital() {
        let mut detail = DetailRecord {
            talkgroups: extract_talkgroups("TS1 TG9 🔊 = 9"),
            ..DetailRecord::default()
        };
        let signals = extract_digital("TS1 TG9 🔊 = 9", &mut detail);
        assert!(signals.talkgroups);
        assert!(!signals.network_name);
        assert!(detail.digital);
    }

    #[test]
    fn test_dmr_id_rejects_placeholder_text() {
        let mut detail = DetailRecord::default();
        extract_digital("DMRID: pending", &mut detail);
        assert_eq!(detail.dmr_id, None);
    }

    #[test]
    fn test_key_values_normalized_and_filtered() {
        let text = "Call: W1AW\nDG-ID: 00\nLast Update: 2024-01-02 10:30\nDetails:\n\
                    Echo Notes:   \nno colon here\n";
        let fields = harvest_key_values(text);
        assert_eq!(fields.get("dg_id").map(String::as_str), Some("00"));
        assert_eq!(
            fields.get("last_update").map(String::as_str),
            Some("2024-01-02 10:30")
        );
        assert!(!fields.contains_key("call"));
        assert!(!fields.contains_key("details"));
        assert!(!fields.contains_key("echo_notes"));
    }

    #[test]
    fn test_long_lines_are_not_fields() {
        let long = format!("Remark: {}", "x".repeat(MAX_FIELD_LINE_LEN));
        assert!(harvest_key_values(&long).is_empty());
    }

    #[test]
    fn test_grid_squares_matched_globally() {
        assert_eq!(grid_squares(DMR_PAGE), vec!["CM87wj", "CM87xk"]);
        assert!(grid_squares("cm87wj CM8Xwj").is_empty());
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key(" Color Code "), "color_code");
        assert_eq!(normalize_key("WIRES-X"), "wires_x");
    }
}
