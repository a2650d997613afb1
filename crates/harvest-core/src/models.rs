use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of a row in the original, unfiltered listing table (header excluded).
///
/// This is the join key between basic records, detail links and detail
/// records. It is assigned once by the listing parser and never renumbered.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RowPosition(pub usize);

impl fmt::Display for RowPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of the listing table, keyed by normalized column name.
///
/// Columns keep the order in which the table presented them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BasicRecord {
    pub position: RowPosition,
    fields: Vec<(String, String)>,
}

impl BasicRecord {
    pub fn new(position: RowPosition) -> Self {
        Self {
            position,
            fields: Vec::new(),
        }
    }

    /// Build a record from `(column, value)` pairs. Later duplicates win.
    pub fn from_pairs<K, V>(position: RowPosition, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut record = Self::new(position);
        for (k, v) in pairs {
            record.insert(k, v);
        }
        record
    }

    /// Set a column value, replacing an existing one in place.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == column) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn remove(&mut self, column: &str) -> Option<String> {
        let idx = self.fields.iter().position(|(k, _)| k == column)?;
        Some(self.fields.remove(idx).1)
    }

    /// Non-empty value of a column.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == column)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.trim().is_empty())
    }
}

/// Union of the columns of `records`, in first-seen order.
pub fn union_columns(records: &[BasicRecord]) -> Vec<&str> {
    let mut columns: Vec<&str> = Vec::new();
    for record in records {
        for (column, _) in record.columns() {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
    }
    columns
}

/// Basic-record values copied onto a detail link for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkEcho {
    pub frequency: String,
    pub callsign: String,
    pub location: String,
}

/// A per-record detail page discovered in the first cell of a listing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailLink {
    pub url: String,
    pub position: RowPosition,
    pub echo: LinkEcho,
}

/// Result of one listing fetch: records and their detail links.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub records: Vec<BasicRecord>,
    pub links: Vec<DetailLink>,
}

/// Visible text and anchor targets of a fetched page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub text: String,
    pub links: Vec<String>,
}

/// One DMR talkgroup assignment, e.g. `TS1 TG91 = 91`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Talkgroup {
    pub slot: u8,
    pub group: String,
    pub number: String,
}

/// Status-network information for one node (EchoLink or IRLP).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBlock {
    pub node: String,
    /// Trailing text after the node number on the detail page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callsign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusBlock {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            ..Self::default()
        }
    }
}

/// Fields mined from one detail page.
///
/// The schema-relevant fields are typed; everything else harvested from
/// `key: value` lines lands in `extra` and is consumed once by the Notes
/// column during merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeater_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downlink: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uplink: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dmr_id: Option<String>,
    pub digital: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub talkgroups: Vec<Talkgroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grid_squares: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub echolink: Option<StatusBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub irlp: Option<StatusBlock>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl DetailRecord {
    /// True when nothing at all was mined from the page.
    pub fn is_empty(&self) -> bool {
        self.repeater_id.is_none()
            && self.downlink.is_none()
            && self.uplink.is_none()
            && self.offset.is_none()
            && self.color_code.is_none()
            && self.dmr_id.is_none()
            && !self.digital
            && self.talkgroups.is_empty()
            && self.grid_squares.is_empty()
            && self.echolink.is_none()
            && self.irlp.is_none()
            && self.extra.is_empty()
    }

    /// Flattened `(key, value)` view used for verbose logging.
    pub fn field_pairs(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let mut push = |k: &str, v: &Option<String>| {
            if let Some(v) = v {
                out.push((k.to_string(), v.clone()));
            }
        };
        push("repeater_id", &self.repeater_id);
        push("downlink", &self.downlink);
        push("uplink", &self.uplink);
        push("offset", &self.offset);
        push("color_code", &self.color_code);
        push("dmr_id", &self.dmr_id);
        out.push(("digital".to_string(), self.digital.to_string()));
        if !self.talkgroups.is_empty() {
            out.push(("talkgroups".to_string(), talkgroup_list(&self.talkgroups)));
        }
        if !self.grid_squares.is_empty() {
            out.push(("grid_squares".to_string(), self.grid_squares.join(",")));
        }
        for (name, block) in [("echolink", &self.echolink), ("irlp", &self.irlp)] {
            if let Some(block) = block {
                out.push((format!("{name}_node"), block.node.clone()));
                if let Some(status) = &block.status {
                    out.push((format!("{name}_status"), status.clone()));
                }
            }
        }
        out.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }
}

/// `TS1:TG91,TS2:TG95` rendering of a talkgroup list.
pub fn talkgroup_list(talkgroups: &[Talkgroup]) -> String {
    talkgroups
        .iter()
        .map(|tg| format!("TS{}:{}", tg.slot, tg.group))
        .collect::<Vec<_>>()
        .join(",")
}

/// Final fixed-schema output row. See [`StructuredRow::COLUMNS`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StructuredRow {
    #[serde(skip)]
    pub position: RowPosition,
    pub downlink: String,
    pub uplink: String,
    pub offset: String,
    pub uplink_tone: String,
    pub downlink_tone: String,
    pub dmr: String,
    pub color_code: String,
    pub dmr_id: String,
    pub system_fusion: String,
    pub dg_id: String,
    pub wires_x: String,
    pub county: String,
    pub grid_square: String,
    pub call: String,
    pub use_: String,
    pub status: String,
    pub sponsor: String,
    pub affiliate: String,
    pub fm: String,
    pub echolink: String,
    pub coordination: String,
    pub updated: String,
    pub reviewed: String,
    pub echolink_node: String,
    pub echolink_status: String,
    pub echolink_callsign: String,
    pub echolink_location: String,
    pub echolink_last_activity: String,
    pub irlp: String,
    pub irlp_node: String,
    pub irlp_status: String,
    pub irlp_last_activity: String,
    pub irlp_callsign: String,
    pub irlp_location: String,
    pub notes: String,
}

impl StructuredRow {
    /// Output column names, in order. Downstream formatters depend on these.
    pub const COLUMNS: [&'static str; 35] = [
        "Downlink",
        "Uplink",
        "Offset",
        "Uplink Tone",
        "Downlink Tone",
        "DMR",
        "Color Code",
        "DMR ID",
        "SYSTEM FUSION",
        "DG-ID",
        "WIRES-X",
        "County",
        "Grid Square",
        "Call",
        "Use",
        "Status",
        "Sponsor",
        "Affiliate",
        "FM",
        "EchoLink",
        "Coordination",
        "Updated",
        "Reviewed",
        "EchoLink Node",
        "EchoLink Status",
        "EchoLink Callsign",
        "EchoLink Location",
        "EchoLink Last Activity",
        "IRLP",
        "IRLP Node",
        "IRLP Status",
        "IRLP Last Activity",
        "IRLP Callsign",
        "IRLP Location",
        "Notes",
    ];

    /// Column values in [`Self::COLUMNS`] order.
    pub fn values(&self) -> [&str; 35] {
        [
            self.downlink.as_str(),
            self.uplink.as_str(),
            self.offset.as_str(),
            self.uplink_tone.as_str(),
            self.downlink_tone.as_str(),
            self.dmr.as_str(),
            self.color_code.as_str(),
            self.dmr_id.as_str(),
            self.system_fusion.as_str(),
            self.dg_id.as_str(),
            self.wires_x.as_str(),
            self.county.as_str(),
            self.grid_square.as_str(),
            self.call.as_str(),
            self.use_.as_str(),
            self.status.as_str(),
            self.sponsor.as_str(),
            self.affiliate.as_str(),
            self.fm.as_str(),
            self.echolink.as_str(),
            self.coordination.as_str(),
            self.updated.as_str(),
            self.reviewed.as_str(),
            self.echolink_node.as_str(),
            self.echolink_status.as_str(),
            self.echolink_callsign.as_str(),
            self.echolink_location.as_str(),
            self.echolink_last_activity.as_str(),
            self.irlp.as_str(),
            self.irlp_node.as_str(),
            self.irlp_status.as_str(),
            self.irlp_last_activity.as_str(),
            self.irlp_callsign.as_str(),
            self.irlp_location.as_str(),
            self.notes.as_str(),
        ]
    }

    /// Value of a column by its output name.
    pub fn get(&self, column: &str) -> Option<&str> {
        let idx = Self::COLUMNS.iter().position(|c| *c == column)?;
        Some(self.values()[idx])
    }
}
