use std::sync::LazyLock;

use harvest_core::error::AppError;
use harvest_core::models::Page;
use harvest_core::traits::Cleaner;
use scraper::{ElementRef, Html, Node, Selector};

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("hardcoded selector is valid"));

/// Elements whose content is never visible text.
const SKIP_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Elements that end a line of visible text.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "tr", "li", "ul", "ol", "dl", "dt", "dd", "table", "h1", "h2", "h3", "h4", "h5",
    "h6", "section", "article", "header", "footer", "form", "center", "pre", "blockquote",
];

/// Elements that end a table cell.
const CELL_TAGS: &[&str] = &["td", "th"];

/// HTML-to-text cleaner using scraper.
///
/// Produces one line per block element with table cells separated by a
/// space, and collects every anchor `href` verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlCleaner;

impl HtmlCleaner {
    pub fn new() -> Self {
        Self
    }
}

impl Cleaner for HtmlCleaner {
    fn clean(&self, html: &str) -> Result<Page, AppError> {
        let document = Html::parse_document(html);

        let mut raw = String::new();
        collect_text(document.root_element(), &mut raw);

        let links = document
            .select(&ANCHOR)
            .filter_map(|a| a.value().attr("href"))
            .map(|href| href.trim().to_string())
            .filter(|href| !href.is_empty())
            .collect();

        Ok(Page {
            text: tidy_lines(&raw),
            links,
        })
    }
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIP_TAGS.contains(&name) {
        return;
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, out);
                }
            }
            _ => {}
        }
    }

    if name == "br" || BLOCK_TAGS.contains(&name) {
        out.push('\n');
    } else if CELL_TAGS.contains(&name) {
        out.push(' ');
    }
}

/// Trim every line, collapse inner whitespace runs and drop blank lines.
fn tidy_lines(raw: &str) -> String {
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
