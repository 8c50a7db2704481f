//! Guided missed-receipt parsing
//!
//! The worker is asked for store, amount, items, and project in one text.
//! Parsing is best-effort: labeled fields are taken verbatim, a money-shaped
//! token becomes the amount, and the leftovers are split store-first. Missing
//! fields stay blank; the record is flagged for review either way, so a
//! partial parse is capture, not failure.

use fieldbook_common::money;

/// The four requested fields, each optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissedDetails {
    pub store: Option<String>,
    pub amount_cents: Option<i64>,
    pub items: Option<String>,
    pub project: Option<String>,
}

const STORE_LABELS: &[&str] = &["store", "vendor", "shop"];
const AMOUNT_LABELS: &[&str] = &["amount", "total", "cost", "price"];
const ITEMS_LABELS: &[&str] = &["items", "item", "bought", "for"];
const PROJECT_LABELS: &[&str] = &["project", "job", "site"];

fn labeled_value<'a>(segment: &'a str, labels: &[&str]) -> Option<&'a str> {
    let (label, value) = segment.split_once(':')?;
    let label = label.trim().to_lowercase();
    labels
        .contains(&label.as_str())
        .then(|| value.trim())
        .filter(|v| !v.is_empty())
}

/// Find a money-shaped token ("$45", "45.00") in a free-text segment.
fn find_amount(segment: &str) -> Option<i64> {
    for token in segment.split_whitespace() {
        let token = token.trim_matches(|c: char| c == ',' || c == ';');
        if token.starts_with('$') || token.contains('.') {
            if let Some(cents) = money::parse_cents(token) {
                return Some(cents);
            }
        }
    }
    // A bare integer counts only when the segment is nothing else,
    // e.g. the worker answered the amount question with "45".
    let lone = segment.trim();
    if lone.chars().all(|c| c.is_ascii_digit()) && !lone.is_empty() {
        return money::parse_cents(lone);
    }
    None
}

/// "project Sparrow" / "for the Sparrow job" style project mentions.
fn find_project_mention(segment: &str) -> Option<String> {
    let lower = segment.to_lowercase();
    for marker in ["project ", "job "] {
        if let Some(pos) = lower.find(marker) {
            let rest = segment[pos + marker.len()..].trim();
            let name: String = rest
                .split_whitespace()
                .next()
                .unwrap_or("")
                .trim_matches(|c: char| !c.is_ascii_alphanumeric())
                .to_string();
            if !name.is_empty() {
                return Some(name);
            }
        }
    }
    None
}

/// Parse the worker's reply into the four requested fields.
pub fn parse_missed_details(body: &str) -> MissedDetails {
    let mut details = MissedDetails::default();

    // Segment on newlines when present, otherwise commas.
    let segments: Vec<&str> = if body.contains('\n') {
        body.lines().collect()
    } else {
        body.split(',').collect()
    };

    let mut leftovers: Vec<&str> = Vec::new();

    for segment in segments {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        if let Some(value) = labeled_value(segment, STORE_LABELS) {
            details.store.get_or_insert_with(|| value.to_string());
            continue;
        }
        if let Some(value) = labeled_value(segment, AMOUNT_LABELS) {
            if details.amount_cents.is_none() {
                details.amount_cents = money::parse_cents(value).or_else(|| find_amount(value));
            }
            continue;
        }
        if let Some(value) = labeled_value(segment, ITEMS_LABELS) {
            details.items.get_or_insert_with(|| value.to_string());
            continue;
        }
        if let Some(value) = labeled_value(segment, PROJECT_LABELS) {
            details.project.get_or_insert_with(|| value.to_string());
            continue;
        }

        if details.amount_cents.is_none() {
            if let Some(cents) = find_amount(segment) {
                details.amount_cents = Some(cents);
                continue;
            }
        }
        if details.project.is_none() {
            if let Some(project) = find_project_mention(segment) {
                details.project = Some(project);
                continue;
            }
        }

        leftovers.push(segment);
    }

    // Unlabeled leftovers: store first, the rest is the item description.
    let mut leftovers = leftovers.into_iter();
    if details.store.is_none() {
        details.store = leftovers.next().map(str::to_string);
    }
    let rest: Vec<&str> = leftovers.collect();
    if details.items.is_none() && !rest.is_empty() {
        details.items = Some(rest.join(", "));
    }

    details
}
