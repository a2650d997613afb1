//! EchoLink and IRLP node detection and the second-hop status lookup.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::AppError;
use crate::extract::capture_first;
use crate::models::StatusBlock;
use crate::traits::{Cleaner, Fetcher};

/// Status value recorded when the second hop fails.
pub const STATUS_ERROR: &str = "Error";

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("hardcoded regex pattern is valid")
}

/// Case-insensitive `Label: value` patterns capturing the rest of the line.
fn labels(names: &[&str]) -> Vec<Regex> {
    names
        .iter()
        .map(|name| re(&format!(r"(?i){name}:\s*([^\n]+)")))
        .collect()
}

static ECHOLINK_ID: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)EchoLink:\s*(\d+)([^\n]*)"));
static IRLP_ID: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)IRLP:\s*(\d+)([^\n]*)"));

static ECHOLINK_HREF: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)echolink"));
static IRLP_HREF: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)irlp|status\.irlp\.net"));

/// IRLP state keywords, first match wins. `None` means the captured text is
/// itself the status.
static IRLP_STATES: LazyLock<Vec<(Regex, Option<&'static str>)>> = LazyLock::new(|| {
    vec![
        (re(r"(?i)IDLE\s+for\s+([^\n]+)"), Some("IDLE")),
        (re(r"(?i)CONNECTED\s+to\s+([^\n]+)"), Some("CONNECTED")),
        (re(r"(?i)ONLINE\s+([^\n]*)"), Some("ONLINE")),
        (re(r"(?i)OFFLINE\s+([^\n]*)"), Some("OFFLINE")),
        (re(r"(?i)Status:\s*([^\n]+)"), None),
    ]
});

static CALLSIGNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        re(r"(?i)Call:\s*([A-Z0-9]{3,8}(?:-[A-Z0-9]+)?)"),
        re(r"(?i)Callsign:\s*([A-Z0-9]{3,8}(?:-[A-Z0-9]+)?)"),
        re(r"\b([A-Z]{1,2}[0-9][A-Z]{1,3}(?:-[A-Z0-9]+)?)\b"),
    ]
});

static IRLP_LOCATION: LazyLock<Vec<Regex>> =
    LazyLock::new(|| labels(&["Location", "QTH", "City", r"Node\s+Location"]));
static ECHOLINK_LOCATION: LazyLock<Vec<Regex>> =
    LazyLock::new(|| labels(&["Location", "QTH", "City"]));
static IRLP_ACTIVITY: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    labels(&[
        r"Last\s+Activity",
        r"Last\s+Connect",
        r"Last\s+Connection",
        r"Last\s+Heard",
    ])
});
static ECHOLINK_ACTIVITY: LazyLock<Vec<Regex>> =
    LazyLock::new(|| labels(&[r"Last\s+Activity", r"Last\s+Seen"]));
static IRLP_OWNER: LazyLock<Vec<Regex>> =
    LazyLock::new(|| labels(&["Owner", "Trustee", "Contact"]));
static IRLP_NODE_NAME: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    labels(&[r"Node\s+Name", "Description", r"Node\s+Description"])
});

/// A voice-over-IP linking network with its own node status site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusNetwork {
    EchoLink,
    Irlp,
}

impl StatusNetwork {
    pub const ALL: [StatusNetwork; 2] = [StatusNetwork::EchoLink, StatusNetwork::Irlp];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusNetwork::EchoLink => "EchoLink",
            StatusNetwork::Irlp => "IRLP",
        }
    }

    /// Base URL relative status links are resolved against.
    pub fn base_url(&self) -> &'static str {
        match self {
            StatusNetwork::EchoLink => "https://www.echolink.org/",
            StatusNetwork::Irlp => "https://status.irlp.net/",
        }
    }

    fn id_pattern(&self) -> &'static Regex {
        match self {
            StatusNetwork::EchoLink => &ECHOLINK_ID,
            StatusNetwork::Irlp => &IRLP_ID,
        }
    }

    fn href_pattern(&self) -> &'static Regex {
        match self {
            StatusNetwork::EchoLink => &ECHOLINK_HREF,
            StatusNetwork::Irlp => &IRLP_HREF,
        }
    }

    /// Node number and trailing text, e.g. `IRLP: 3341 IDLE for 3 hours`.
    pub fn detect(&self, text: &str) -> Option<StatusBlock> {
        let caps = self.id_pattern().captures(text)?;
        let mut block = StatusBlock::new(&caps[1]);
        let trailing = caps[2].trim();
        if !trailing.is_empty() {
            block.status_text = Some(trailing.to_string());
        }
        Some(block)
    }

    /// First anchor pointing at this network's site that mentions `node`.
    pub fn find_status_link(&self, hrefs: &[String], node: &str) -> Option<String> {
        let href = hrefs
            .iter()
            .find(|href| self.href_pattern().is_match(href) && href.contains(node))?;
        if href.starts_with("http") {
            return Some(href.clone());
        }
        Url::parse(self.base_url())
            .and_then(|base| base.join(href))
            .map(String::from)
            .ok()
    }

    /// Fill status fields of `block` from a status page's visible text.
    pub fn parse_status_page(&self, text: &str, block: &mut StatusBlock) {
        match self {
            StatusNetwork::Irlp => {
                let (status, detail) = irlp_status(text);
                block.status = Some(status);
                block.status_detail = detail;
                block.location = capture_first(&IRLP_LOCATION, text);
                block.last_activity = capture_first(&IRLP_ACTIVITY, text);
                block.owner = capture_first(&IRLP_OWNER, text);
                block.node_name = capture_first(&IRLP_NODE_NAME, text);
            }
            StatusNetwork::EchoLink => {
                block.status = Some(echolink_status(text).to_string());
                block.location = capture_first(&ECHOLINK_LOCATION, text);
                block.last_activity = capture_first(&ECHOLINK_ACTIVITY, text);
            }
        }
        block.callsign = callsign(text);
    }
}

impl fmt::Display for StatusNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn irlp_status(text: &str) -> (String, Option<String>) {
    for (pattern, state) in IRLP_STATES.iter() {
        let Some(caps) = pattern.captures(text) else {
            continue;
        };
        let captured = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        return match state {
            Some(state) => (
                state.to_string(),
                (!captured.is_empty()).then(|| captured.to_string()),
            ),
            None => (captured.to_string(), None),
        };
    }

    let lower = text.to_lowercase();
    let status = if lower.contains("online") {
        "Online"
    } else if lower.contains("offline") {
        "Offline"
    } else if lower.contains("idle") {
        "IDLE"
    } else {
        "Unknown"
    };
    (status.to_string(), None)
}

fn echolink_status(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    if lower.contains("online") {
        "Online"
    } else if lower.contains("offline") {
        "Offline"
    } else {
        "Unknown"
    }
}

/// First plausible amateur callsign; node numbers and short tokens are skipped.
fn callsign(text: &str) -> Option<String> {
    CALLSIGNS.iter().find_map(|pattern| {
        let found = pattern.captures(text)?.get(1)?.as_str();
        let plausible = found.len() >= 3 && !found.chars().all(|c| c.is_ascii_digit());
        plausible.then(|| found.to_string())
    })
}

/// Follow the status link for `block` (if the detail page has one) and merge
/// the node status into it.
///
/// Without a matching anchor nothing is fetched. A failed fetch marks the
/// block with [`STATUS_ERROR`] and the error message; fields already on the
/// block are kept.
pub async fn resolve_status<F: Fetcher, C: Cleaner>(
    network: StatusNetwork,
    block: &mut StatusBlock,
    hrefs: &[String],
    fetcher: &F,
    cleaner: &C,
) {
    let Some(url) = network.find_status_link(hrefs, &block.node) else {
        tracing::debug!(%network, node = %block.node, "No status link on detail page");
        return;
    };
    block.url = Some(url.clone());

    match fetch_status_page(&url, fetcher, cleaner).await {
        Ok(text) => {
            network.parse_status_page(&text, block);
            tracing::debug!(
                %network,
                node = %block.node,
                status = block.status.as_deref().unwrap_or_default(),
                "Status resolved"
            );
        }
        Err(e) => {
            tracing::debug!(%network, %url, error = %e, "Status lookup failed");
            block.status = Some(STATUS_ERROR.to_string());
            block.error = Some(e.to_string());
        }
    }
}

async fn fetch_status_page<F: Fetcher, C: Cleaner>(
    url: &str,
    fetcher: &F,
    cleaner: &C,
) -> Result<String, AppError> {
    let html = fetcher.fetch(url).await?;
    Ok(cleaner.clean(&html)?.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockFetcher, PassthroughCleaner};

    fn hrefs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_detect_irlp_with_trailing_text() {
        let block = StatusNetwork::Irlp
            .detect("Notes\nIRLP: 3341 IDLE for 0 days, 3 hours\nMore")
            .unwrap();
        assert_eq!(block.node, "3341");
        assert_eq!(block.status_text.as_deref(), Some("IDLE for 0 days, 3 hours"));
    }

    #[test]
    fn test_detect_echolink_without_trailing_text() {
        let block = StatusNetwork::EchoLink.detect("echolink: 123456\n").unwrap();
        assert_eq!(block.node, "123456");
        assert_eq!(block.status_text, None);
        assert!(StatusNetwork::EchoLink.detect("EchoLink: none").is_none());
    }

    #[test]
    fn test_find_status_link_resolves_relative_hrefs() {
        let links = hrefs(&["/about", "node.php?num=3341", "https://irlp.net/x"]);
        assert_eq!(
            StatusNetwork::Irlp.find_status_link(&links, "3341"),
            None,
            "relative href without an irlp host does not match"
        );

        let links = hrefs(&["irlp/status?node=3341"]);
        assert_eq!(
            StatusNetwork::Irlp.find_status_link(&links, "3341").as_deref(),
            Some("https://status.irlp.net/irlp/status?node=3341")
        );
    }

    #[test]
    fn test_find_status_link_requires_node_number() {
        let links = hrefs(&[
            "https://www.echolink.org/logins.jsp",
            "https://www.echolink.org/node.jsp?n=98765",
        ]);
        assert_eq!(
            StatusNetwork::EchoLink.find_status_link(&links, "98765").as_deref(),
            Some("https://www.echolink.org/node.jsp?n=98765")
        );
        assert_eq!(StatusNetwork::EchoLink.find_status_link(&links, "11111"), None);
    }

    #[test]
    fn test_parse_irlp_page() {
        let text = "Node 3341\nIDLE for 0 days, 3 hours\nCallsign: VE7ABC-R\n\
                    Node Location: Vancouver, BC\nLast Heard: yesterday\n\
                    Owner: Jane Doe\nNode Name: Mountain Link\n";
        let mut block = StatusBlock::new("3341");
        StatusNetwork::Irlp.parse_status_page(text, &mut block);
        assert_eq!(block.status.as_deref(), Some("IDLE"));
        assert_eq!(block.status_detail.as_deref(), Some("0 days, 3 hours"));
        assert_eq!(block.callsign.as_deref(), Some("VE7ABC-R"));
        assert_eq!(block.location.as_deref(), Some("Vancouver, BC"));
        assert_eq!(block.last_activity.as_deref(), Some("yesterday"));
        assert_eq!(block.owner.as_deref(), Some("Jane Doe"));
        assert_eq!(block.node_name.as_deref(), Some("Mountain Link"));
    }

    #[test]
    fn test_irlp_generic_status_label() {
        let (status, detail) = irlp_status("Status: Down for maintenance");
        assert_eq!(status, "Down for maintenance");
        assert_eq!(detail, None);
        assert_eq!(irlp_status("nothing useful here").0, "Unknown");
    }

    #[test]
    fn test_parse_echolink_page() {
        let text = "Node 98765 is Online\nCall: W1AW-R\nQTH: Newington, CT\nLast Seen: 5 min ago";
        let mut block = StatusBlock::new("98765");
        StatusNetwork::EchoLink.parse_status_page(text, &mut block);
        assert_eq!(block.status.as_deref(), Some("Online"));
        assert_eq!(block.callsign.as_deref(), Some("W1AW-R"));
        assert_eq!(block.location.as_deref(), Some("Newington, CT"));
        assert_eq!(block.last_activity.as_deref(), Some("5 min ago"));
        assert_eq!(block.owner, None);
    }

    #[test]
    fn test_callsign_rejects_node_numbers() {
        assert_eq!(callsign("Call: 123456"), None);
        assert_eq!(callsign("Call: 123456 heard K6XYZ").as_deref(), Some("K6XYZ"));
    }

    #[tokio::test]
    async fn test_resolve_without_link_does_not_fetch() {
        let fetcher = MockFetcher::new("<html></html>");
        let mut block = StatusBlock::new("3341");
        resolve_status(
            StatusNetwork::Irlp,
            &mut block,
            &hrefs(&["/other"]),
            &fetcher,
            &PassthroughCleaner,
        )
        .await;
        assert!(fetcher.requested_urls().is_empty());
        assert_eq!(block.url, None);
        assert_eq!(block.status, None);
    }

    #[tokio::test]
    async fn test_resolve_failure_marks_error_and_keeps_fields() {
        let fetcher = MockFetcher::with_error(AppError::Timeout(30));
        let mut block = StatusBlock::new("3341");
        block.status_text = Some("IDLE".into());
        resolve_status(
            StatusNetwork::Irlp,
            &mut block,
            &hrefs(&["https://status.irlp.net/?nodeid=3341"]),
            &fetcher,
            &PassthroughCleaner,
        )
        .await;
        assert_eq!(block.status.as_deref(), Some(STATUS_ERROR));
        assert!(block.error.as_deref().unwrap().contains("30"));
        assert_eq!(block.status_text.as_deref(), Some("IDLE"));
        assert_eq!(block.node, "3341");
    }

    #[tokio::test]
    async fn test_resolve_success_fills_block() {
        let fetcher = MockFetcher::new("Node is OFFLINE since Monday\nCall: VE7XYZ");
        let mut block = StatusBlock::new("4000");
        resolve_status(
            StatusNetwork::Irlp,
            &mut block,
            &hrefs(&["https://status.irlp.net/index.php?nodeid=4000"]),
            &fetcher,
            &PassthroughCleaner,
        )
        .await;
        assert_eq!(
            fetcher.requested_urls(),
            vec!["https://status.irlp.net/index.php?nodeid=4000"]
        );
        assert_eq!(block.status.as_deref(), Some("OFFLINE"));
        assert_eq!(block.status_detail.as_deref(), Some("since Monday"));
        assert_eq!(block.callsign.as_deref(), Some("VE7XYZ"));
    }
}
