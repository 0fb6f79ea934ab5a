//! Tolerant extraction of typed fields from rendered portal pages.
//!
//! Nothing here fails: a label that is missing, misspelled or reordered just
//! leaves the corresponding field empty.

use crate::dates::{parse_day_first, NUMERIC_DATE, WORDED_DATE};
use crate::model::{CaseDetail, ListingRow};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use time::Date;
use unicode_normalization::UnicodeNormalization;
use url::Url;

pub const UNKNOWN_COURT: &str = "Unknown Court";

pub const LABEL_CASE_TYPE: &str = "Case Type";
pub const LABEL_COURT_AND_JUDGE: &str = "Court Number and Judge";
pub const LABEL_FILING_NUMBER: &str = "Filing Number";
pub const LABEL_REGISTRATION_NUMBER: &str = "Registration Number";

/// Labels that commonly follow a value on the case-status page. A captured
/// value is cut at the first of these so adjacent fields do not bleed into
/// each other when the page flattens a table into one line.
const STOP_LABELS: [&str; 14] = [
    "CNR Number",
    LABEL_CASE_TYPE,
    LABEL_COURT_AND_JUDGE,
    LABEL_FILING_NUMBER,
    LABEL_REGISTRATION_NUMBER,
    "Filing Date",
    "Registration Date",
    "First Hearing Date",
    "Next Hearing Date",
    "Decision Date",
    "Case Status",
    "Stage of Case",
    "Nature of Disposal",
    "Petitioner and Advocate",
];

static CNR_NOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([A-Z0-9]{16})\s*\(\s*Note the CNR number").expect("static regex")
});
static CNR_ANY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z0-9]{16}\b").expect("static regex"));
static STOP: LazyLock<Regex> = LazyLock::new(|| {
    let alts: Vec<String> = STOP_LABELS.iter().map(|l| label_pattern(l)).collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", alts.join("|"))).expect("static regex")
});
static NEXT_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(Next\s+Hearing\s+Date|Next\s+Date|Next\s+Hearing|NextDate)[:\-\s]*")
        .expect("static regex")
});
static ANY_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("{NUMERIC_DATE}|{WORDED_DATE}")).expect("static regex")
});
static NUMERIC_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(NUMERIC_DATE).expect("static regex"));

static SEL_TABLE: LazyLock<Selector> = LazyLock::new(|| selector("table"));
static SEL_TR: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static SEL_CELL: LazyLock<Selector> = LazyLock::new(|| selector("td, th"));
static SEL_HEADING: LazyLock<Selector> = LazyLock::new(|| selector("h1, h2, h3"));
static SEL_LINK: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// Label text as a regex fragment that tolerates any run of whitespace
/// between its words.
fn label_pattern(label: &str) -> String {
    label
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+")
}

/// Visible text of a page: text nodes outside `script`/`style`, each trimmed,
/// joined with single spaces, NFKC-normalised.
pub fn page_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut parts = Vec::new();
    for node in doc.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name()))
            .is_some_and(|name| matches!(name, "script" | "style" | "noscript"));
        if hidden {
            continue;
        }
        let t = text.trim();
        if !t.is_empty() {
            parts.push(t);
        }
    }
    parts.join(" ").nfkc().collect()
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// The 16-character CNR. Prefers the token the portal annotates with
/// "(Note the CNR number ...)"; otherwise the first standalone 16-character
/// alphanumeric token, which can be a false positive.
pub fn cnr_number(text: &str) -> Option<String> {
    if let Some(caps) = CNR_NOTED.captures(text) {
        return Some(caps[1].to_string());
    }
    CNR_ANY.find(text).map(|m| m.as_str().to_string())
}

/// Value following `label` and its separators, first occurrence wins.
pub fn labeled_field(text: &str, label: &str) -> Option<String> {
    let re = Regex::new(&format!(
        r"(?i){}[:\-\s]*([A-Za-z0-9/.\-\s]+)",
        label_pattern(label)
    ))
    .ok()?;
    let caps = re.captures(text)?;
    let mut value = caps.get(1)?.as_str();
    if let Some(stop) = STOP.find(value) {
        value = &value[..stop.start()];
    }
    let value = value.trim_matches(|c: char| c.is_whitespace() || c == '-');
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn case_detail(text: &str) -> CaseDetail {
    CaseDetail {
        cnr_number: cnr_number(text),
        case_type: labeled_field(text, LABEL_CASE_TYPE),
        court_and_judge: labeled_field(text, LABEL_COURT_AND_JUDGE),
        filing_number: labeled_field(text, LABEL_FILING_NUMBER),
        registration_number: labeled_field(text, LABEL_REGISTRATION_NUMBER),
    }
}

/// Next hearing date mentioned in a listing row's text.
pub fn hearing_date(row_text: &str) -> Option<Date> {
    let labeled = NEXT_LABEL.find(row_text).and_then(|m| {
        let after = row_text[m.end()..].trim();
        ANY_DATE
            .find(after)
            .and_then(|token| parse_day_first(token.as_str()))
    });
    if labeled.is_some() {
        return labeled;
    }
    if !row_text.contains("Next") {
        return None;
    }
    NUMERIC_ONLY
        .find(row_text)
        .and_then(|token| parse_day_first(token.as_str()))
}

/// Rows of the first table on a cause-list page, header row skipped.
/// Rows without a serial in their first cell are not cases and are dropped.
pub fn listing_rows(html: &str) -> Vec<ListingRow> {
    let doc = Html::parse_document(html);
    let Some(table) = doc.select(&SEL_TABLE).next() else {
        return Vec::new();
    };
    let court_name = doc
        .select(&SEL_HEADING)
        .next()
        .map(element_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN_COURT.to_string());

    table
        .select(&SEL_TR)
        .skip(1)
        .filter_map(|tr| {
            let columns: Vec<String> = tr.select(&SEL_CELL).map(element_text).collect();
            let serial = columns.first()?.trim().to_string();
            if serial.is_empty() {
                return None;
            }
            let row_text = element_text(tr);
            Some(ListingRow {
                serial,
                next_hearing_date: hearing_date(&row_text),
                columns,
                court_name: court_name.clone(),
            })
        })
        .collect()
}

/// Absolute addresses of every PDF linked from the page, in document order,
/// without repeats. Links that cannot be resolved against `base` are skipped.
pub fn document_links(html: &str, base: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let base = Url::parse(base).ok();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for a in doc.select(&SEL_LINK) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if !href.to_ascii_lowercase().ends_with(".pdf") {
            continue;
        }
        let resolved = match &base {
            Some(base) => base.join(href).ok().map(|u| u.to_string()),
            None => Url::parse(href).ok().map(|u| u.to_string()),
        };
        if let Some(url) = resolved {
            if seen.insert(url.clone()) {
                out.push(url);
            }
        }
    }
    out
}

/// Whether `label` appears in `text` as a whole token, so serial "1" does not
/// match a row that merely contains "11" or "2021".
pub fn mentions_label(text: &str, label: &str) -> bool {
    let label = label.trim();
    if label.is_empty() {
        return false;
    }
    text.match_indices(label).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + label.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
