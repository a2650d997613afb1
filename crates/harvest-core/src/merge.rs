//! Merge basic records and detail records into the fixed output schema.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::{
    BasicRecord, DetailRecord, RowPosition, StatusBlock, StructuredRow, talkgroup_list,
};

/// Basic columns that already feed a named output column.
const MAPPED_BASIC_COLUMNS: &[&str] = &[
    "frequency",
    "call",
    "callsign",
    "county",
    "use",
    "status",
    "tone_up",
    "tone_down",
    "tone",
];

const NOTE_SEPARATOR: &str = "; ";

/// Build one output row per basic record, in input order.
///
/// Details are joined on [`RowPosition`]; a record without a detail entry
/// produces a row from basic columns only. Never fails.
pub fn structure(
    basic: &[BasicRecord],
    details: &BTreeMap<RowPosition, DetailRecord>,
) -> Vec<StructuredRow> {
    let rows: Vec<StructuredRow> = basic
        .iter()
        .map(|record| structure_row(record, details.get(&record.position)))
        .collect();
    tracing::debug!(
        rows = rows.len(),
        enriched = basic.iter().filter(|r| details.contains_key(&r.position)).count(),
        "Structured rows"
    );
    rows
}

/// Extra fields of a detail record, each consumed at most once.
struct Extras<'a> {
    fields: &'a BTreeMap<String, String>,
    consumed: BTreeSet<&'a str>,
}

impl<'a> Extras<'a> {
    fn new(fields: &'a BTreeMap<String, String>) -> Self {
        Self {
            fields,
            consumed: BTreeSet::new(),
        }
    }

    /// Non-empty value of `key`, marking it consumed.
    fn take(&mut self, key: &str) -> Option<&'a str> {
        let (k, v) = self.fields.get_key_value(key)?;
        let v = v.trim();
        if v.is_empty() {
            return None;
        }
        self.consumed.insert(k.as_str());
        Some(v)
    }

    /// First unconsumed entry accepted by `pred`, marking it consumed.
    fn take_where(&mut self, pred: impl Fn(&str, &str) -> bool) -> Option<&'a str> {
        let (k, v) = self
            .fields
            .iter()
            .find(|(k, v)| !self.consumed.contains(k.as_str()) && pred(k, v))?;
        self.consumed.insert(k.as_str());
        Some(v.trim())
    }

    /// Mark `key` consumed when `covered` is true.
    fn consume_if(&mut self, key: &str, covered: bool) {
        if covered && let Some((k, _)) = self.fields.get_key_value(key) {
            self.consumed.insert(k.as_str());
        }
    }

    fn leftovers(&self) -> impl Iterator<Item = (&'a str, &'a str)> + '_ {
        self.fields
            .iter()
            .filter(|(k, v)| !self.consumed.contains(k.as_str()) && !v.trim().is_empty())
            .map(|(k, v)| (k.as_str(), v.trim()))
    }
}

fn structure_row(record: &BasicRecord, detail: Option<&DetailRecord>) -> StructuredRow {
    let empty_detail = DetailRecord::default();
    let detail = detail.unwrap_or(&empty_detail);
    let mut extras = Extras::new(&detail.extra);

    // Label lines that were already parsed into typed fields.
    extras.consume_if("repeater_id", detail.repeater_id.is_some());
    extras.consume_if("downlink", detail.downlink.is_some());
    extras.consume_if("uplink", detail.uplink.is_some());
    extras.consume_if("offset", detail.offset.is_some());
    extras.consume_if("dmr_color_code", detail.color_code.is_some());
    extras.consume_if("color_code", detail.color_code.is_some());
    extras.consume_if("dmr_id", detail.dmr_id.is_some());
    extras.consume_if("dmrid", detail.dmr_id.is_some());
    extras.consume_if("echolink", detail.echolink.is_some());
    extras.consume_if("irlp", detail.irlp.is_some());

    let uplink_tone = extras
        .take("tone_up")
        .or_else(|| record.get("tone_up"))
        .or_else(|| record.get("tone"));
    let downlink_tone = extras
        .take("tone_down")
        .or_else(|| record.get("tone_down"))
        .or_else(|| record.get("tone"));

    let system_fusion = extras.take_where(|k, v| {
        k.contains("fusion") || v.to_lowercase().contains("system fusion")
    });
    let dg_id = extras.take_where(|k, _| k.contains("dg") && k.contains("id"));
    let wires_x = extras.take_where(|k, _| k.contains("wires"));

    let grid_square = match detail.grid_squares.first() {
        Some(first) => {
            extras.take_where(|k, v| k.contains("grid") && v.contains(first.as_str()));
            Some(first.as_str())
        }
        None => extras.take_where(|k, _| k.contains("grid")),
    };

    let downlink = detail.downlink.as_deref().or_else(|| record.get("frequency"));

    let county = extras.take("county").or_else(|| record.get("county"));
    let call = extras
        .take("call")
        .or_else(|| extras.take("callsign"))
        .or_else(|| record.get("call"))
        .or_else(|| record.get("callsign"));
    let use_ = extras.take("use").or_else(|| record.get("use"));
    let status = extras.take("status").or_else(|| record.get("status"));

    let sponsor = extras.take("sponsor");
    let affiliate = extras.take("affiliate");
    let coordination = extras.take("coordination");
    let updated = extras.take("updated");
    let reviewed = extras.take("reviewed");
    let fm = extras
        .take("fm")
        .or_else(|| extras.take_where(|k, _| k.contains("analog") || k.contains("fm")));

    let echolink = detail.echolink.as_ref();
    let irlp = detail.irlp.as_ref();

    StructuredRow {
        position: record.position,
        downlink: text(downlink),
        uplink: owned(&detail.uplink),
        offset: owned(&detail.offset),
        uplink_tone: text(uplink_tone),
        downlink_tone: text(downlink_tone),
        dmr: detail.digital.to_string(),
        color_code: owned(&detail.color_code),
        dmr_id: owned(&detail.dmr_id),
        system_fusion: text(system_fusion),
        dg_id: text(dg_id),
        wires_x: text(wires_x),
        county: text(county),
        grid_square: text(grid_square),
        call: text(call),
        use_: text(use_),
        status: text(status),
        sponsor: text(sponsor),
        affiliate: text(affiliate),
        fm: text(fm),
        echolink: node(echolink),
        coordination: text(coordination),
        updated: text(updated),
        reviewed: text(reviewed),
        echolink_node: node(echolink),
        echolink_status: block_field(echolink, |b| b.status.as_deref()),
        echolink_callsign: block_field(echolink, |b| b.callsign.as_deref()),
        echolink_location: block_field(echolink, |b| b.location.as_deref()),
        echolink_last_activity: block_field(echolink, |b| b.last_activity.as_deref()),
        irlp: node(irlp),
        irlp_node: node(irlp),
        irlp_status: block_field(irlp, |b| b.status.as_deref()),
        irlp_last_activity: block_field(irlp, |b| b.last_activity.as_deref()),
        irlp_callsign: block_field(irlp, |b| b.callsign.as_deref()),
        irlp_location: block_field(irlp, |b| b.location.as_deref()),
        notes: notes(record, detail, &extras),
    }
}

fn text(value: Option<&str>) -> String {
    value.map(str::to_string).unwrap_or_default()
}

fn owned(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn node(block: Option<&StatusBlock>) -> String {
    block.map(|b| b.node.clone()).unwrap_or_default()
}

fn block_field(
    block: Option<&StatusBlock>,
    field: impl Fn(&StatusBlock) -> Option<&str>,
) -> String {
    text(block.and_then(|b| field(b)))
}

/// Everything that did not land in a named column, as `Key: value` parts.
fn notes(record: &BasicRecord, detail: &DetailRecord, extras: &Extras<'_>) -> String {
    let mut notes = Vec::new();

    if detail.digital && !detail.talkgroups.is_empty() {
        notes.push(format!("Talkgroups: {}", talkgroup_list(&detail.talkgroups)));
        for slot in [1u8, 2] {
            let groups: Vec<&str> = detail
                .talkgroups
                .iter()
                .filter(|tg| tg.slot == slot)
                .map(|tg| tg.group.as_str())
                .collect();
            if !groups.is_empty() {
                notes.push(format!("TS{slot}: {}", groups.join(",")));
            }
        }
    }

    for (key, value) in extras.leftovers() {
        notes.push(note(key, value));
    }

    for (prefix, block) in [("echolink", &detail.echolink), ("irlp", &detail.irlp)] {
        let Some(block) = block else { continue };
        let unmapped = [
            ("status_detail", &block.status_detail),
            ("owner", &block.owner),
            ("node_name", &block.node_name),
            ("status_text", &block.status_text),
        ];
        for (name, value) in unmapped {
            if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                notes.push(note(&format!("{prefix}_{name}"), value));
            }
        }
    }

    if let Some(id) = &detail.repeater_id {
        notes.push(note("repeater_id", id));
    }

    for (column, value) in record.columns() {
        if MAPPED_BASIC_COLUMNS.contains(&column) || value.trim().is_empty() {
            continue;
        }
        notes.push(note(column, value.trim()));
    }

    notes.join(NOTE_SEPARATOR)
}

fn note(key: &str, value: &str) -> String {
    format!("{}: {value}", title_case(key))
}

/// `"last_update"` → `"Last Update"`. Letters following a non-letter are
/// upper-cased, all others lower-cased.
pub fn title_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut prev_alpha = false;
    for c in key.replace('_', " ").chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Talkgroup;

    fn basic(pos: usize, pairs: &[(&str, &str)]) -> BasicRecord {
        BasicRecord::from_pairs(RowPosition(pos), pairs.iter().copied())
    }

    fn extra(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_basic_only_row() {
        let records = vec![basic(
            0,
            &[
                ("frequency", "146.940"),
                ("call", "W1AW"),
                ("location", "Newington"),
                ("tone", "100.0"),
            ],
        )];
        let rows = structure(&records, &BTreeMap::new());
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.call, "W1AW");
        assert_eq!(row.dmr, "false");
        assert_eq!(row.uplink_tone, "100.0");
        assert_eq!(row.downlink_tone, "100.0");
        assert_eq!(row.downlink, "146.940");
        assert_eq!(row.notes, "Location: Newington");
    }

    #[test]
    fn test_listing_frequency_fills_missing_downlink() {
        let records = vec![
            basic(0, &[("frequency", "147.120"), ("call", "W6BBB"), ("location", "Sonoma")]),
            basic(1, &[("frequency", "146.940")]),
        ];
        let mut details = BTreeMap::new();
        details.insert(
            RowPosition(1),
            DetailRecord {
                downlink: Some("146.945".into()),
                ..DetailRecord::default()
            },
        );

        let rows = structure(&records, &details);
        assert_eq!(rows[0].downlink, "147.120");
        assert_eq!(rows[0].notes, "Location: Sonoma");
        assert_eq!(rows[1].downlink, "146.945");
    }

    #[test]
    fn test_details_attach_by_position() {
        let records = vec![basic(1, &[("call", "AAA")]), basic(3, &[("call", "BBB")])];
        let mut details = BTreeMap::new();
        details.insert(
            RowPosition(1),
            DetailRecord {
                downlink: Some("146.940".into()),
                ..DetailRecord::default()
            },
        );
        details.insert(
            RowPosition(3),
            DetailRecord {
                downlink: Some("444.100".into()),
                ..DetailRecord::default()
            },
        );

        let rows = structure(&records, &details);
        assert_eq!(rows[0].call, "AAA");
        assert_eq!(rows[0].downlink, "146.940");
        assert_eq!(rows[1].call, "BBB");
        assert_eq!(rows[1].downlink, "444.100");
        assert_eq!(rows[1].position, RowPosition(3));
    }

    #[test]
    fn test_detail_values_take_precedence_over_basic() {
        let records = vec![basic(0, &[("county", "Basic County"), ("use", "OPEN")])];
        let mut details = BTreeMap::new();
        details.insert(
            RowPosition(0),
            DetailRecord {
                extra: extra(&[("county", "Detail County"), ("tone_up", "88.5")]),
                ..DetailRecord::default()
            },
        );
        let row = &structure(&records, &details)[0];
        assert_eq!(row.county, "Detail County");
        assert_eq!(row.use_, "OPEN");
        assert_eq!(row.uplink_tone, "88.5");
        assert_eq!(row.notes, "");
    }

    #[test]
    fn test_unmapped_detail_keys_survive_in_notes() {
        let records = vec![basic(0, &[("frequency", "146.94")])];
        let mut details = BTreeMap::new();
        details.insert(
            RowPosition(0),
            DetailRecord {
                extra: extra(&[("antenna_height", "120 ft"), ("sponsor", "Valley ARC")]),
                ..DetailRecord::default()
            },
        );
        let row = &structure(&records, &details)[0];
        assert_eq!(row.sponsor, "Valley ARC");
        assert_eq!(row.notes, "Antenna Height: 120 ft");
    }

    #[test]
    fn test_derived_columns_consume_their_source_keys() {
        let records = vec![basic(0, &[])];
        let mut details = BTreeMap::new();
        details.insert(
            RowPosition(0),
            DetailRecord {
                extra: extra(&[
                    ("dg_id", "00"),
                    ("system_fusion", "Yes"),
                    ("wires_x_node", "12345"),
                    ("analog_fm", "Yes"),
                    ("grid", "CM87"),
                ]),
                ..DetailRecord::default()
            },
        );
        let row = &structure(&records, &details)[0];
        assert_eq!(row.system_fusion, "Yes");
        assert_eq!(row.dg_id, "00");
        assert_eq!(row.wires_x, "12345");
        assert_eq!(row.fm, "Yes");
        assert_eq!(row.grid_square, "CM87");
        assert_eq!(row.notes, "");
    }

    #[test]
    fn test_typed_labels_not_repeated_in_notes() {
        let records = vec![basic(0, &[])];
        let mut details = BTreeMap::new();
        details.insert(
            RowPosition(0),
            DetailRecord {
                repeater_id: Some("4521".into()),
                downlink: Some("444.125".into()),
                extra: extra(&[
                    ("repeater_id", "4521"),
                    ("downlink", "444.125"),
                    ("uplink", "TBD"),
                ]),
                ..DetailRecord::default()
            },
        );
        let row = &structure(&records, &details)[0];
        assert_eq!(row.uplink, "");
        assert_eq!(row.notes, "Uplink: TBD; Repeater Id: 4521");
    }

    #[test]
    fn test_digital_notes_list_talkgroups_by_slot() {
        let records = vec![basic(0, &[])];
        let mut details = BTreeMap::new();
        details.insert(
            RowPosition(0),
            DetailRecord {
                digital: true,
                color_code: Some("1".into()),
                talkgroups: vec![
                    Talkgroup { slot: 1, group: "TG91".into(), number: "91".into() },
                    Talkgroup { slot: 2, group: "TG3100".into(), number: "3100".into() },
                    Talkgroup { slot: 1, group: "TG93".into(), number: "93".into() },
                ],
                ..DetailRecord::default()
            },
        );
        let row = &structure(&records, &details)[0];
        assert_eq!(row.dmr, "true");
        assert_eq!(row.color_code, "1");
        assert_eq!(
            row.notes,
            "Talkgroups: TS1:TG91,TS2:TG3100,TS1:TG93; TS1: TG91,TG93; TS2: TG3100"
        );
    }

    #[test]
    fn test_status_blocks_fill_columns_and_notes() {
        let records = vec![basic(0, &[])];
        let mut irlp = StatusBlock::new("3341");
        irlp.status = Some("IDLE".into());
        irlp.status_detail = Some("0 days".into());
        irlp.owner = Some("Jane".into());
        irlp.callsign = Some("VE7ABC".into());
        let mut echolink = StatusBlock::new("98765");
        echolink.status = Some("Error".into());
        echolink.error = Some("timed out".into());

        let mut details = BTreeMap::new();
        details.insert(
            RowPosition(0),
            DetailRecord {
                irlp: Some(irlp),
                echolink: Some(echolink),
                extra: extra(&[("irlp", "3341 IDLE"), ("echolink", "98765")]),
                ..DetailRecord::default()
            },
        );
        let row = &structure(&records, &details)[0];
        assert_eq!(row.irlp, "3341");
        assert_eq!(row.irlp_node, "3341");
        assert_eq!(row.irlp_status, "IDLE");
        assert_eq!(row.irlp_callsign, "VE7ABC");
        assert_eq!(row.echolink, "98765");
        assert_eq!(row.echolink_status, "Error");
        assert_eq!(row.notes, "Irlp Status Detail: 0 days; Irlp Owner: Jane");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("last_update"), "Last Update");
        assert_eq!(title_case("dg_id"), "Dg Id");
        assert_eq!(title_case("ts1x"), "Ts1X");
        assert_eq!(title_case("PL_TONE"), "Pl Tone");
    }
}
