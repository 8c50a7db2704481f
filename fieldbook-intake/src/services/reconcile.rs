//! Reconciliation engine
//!
//! Fuzzy-matches free-text project captions against active projects, and
//! resolves a spend category through the suggestion → vendor-keyword →
//! fallback cascade. High-confidence matches are accepted silently; field
//! workers are never asked to fix their own typos; low confidence leaves
//! the field unresolved and flags the record instead.

use crate::db::reference::{CategoryRef, ProjectRef};
use tracing::debug;

/// Jaro-Winkler acceptance threshold for project captions.
pub const PROJECT_MATCH_THRESHOLD: f64 = 0.85;

/// Jaro-Winkler acceptance threshold for category suggestions.
pub const CATEGORY_MATCH_THRESHOLD: f64 = 0.80;

/// The designated catch-all category, end of the cascade.
pub const FALLBACK_CATEGORY: &str = "Other";

/// A caption resolved to a project, with the score that won.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectMatch {
    pub project_id: i64,
    pub name: String,
    pub score: f64,
}

fn similarity(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(&a.to_lowercase(), &b.to_lowercase())
}

/// Match a worker-supplied caption against the active projects.
///
/// Case-insensitive exact match wins immediately; otherwise the best
/// Jaro-Winkler score at or above the threshold is accepted. Below
/// threshold the caption stays unresolved (the caller flags the record).
pub fn match_project(caption: &str, projects: &[ProjectRef]) -> Option<ProjectMatch> {
    let caption = caption.trim();
    if caption.is_empty() {
        return None;
    }

    if let Some(project) = projects
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(caption))
    {
        return Some(ProjectMatch {
            project_id: project.id,
            name: project.name.clone(),
            score: 1.0,
        });
    }

    let best = projects
        .iter()
        .map(|p| (p, similarity(caption, &p.name)))
        .max_by(|a, b| a.1.total_cmp(&b.1))?;

    debug!(caption = %caption, candidate = %best.0.name, score = best.1, "Best project candidate");

    if best.1 >= PROJECT_MATCH_THRESHOLD {
        Some(ProjectMatch {
            project_id: best.0.id,
            name: best.0.name.clone(),
            score: best.1,
        })
    } else {
        None
    }
}

// Vendor-name substrings → category name. First hit wins, in table order.
const FUEL_VENDORS: &[&str] = &[
    "gas", "fuel", "shell", "chevron", "bp", "exxon", "mobil", "circle k", "wawa", "racetrac",
    "speedway", "sunoco", "murphy", "quiktrip", "citgo", "valero", "marathon",
];
const MATERIAL_VENDORS: &[&str] = &[
    "home depot", "lowe", "menard", "ace hardware", "84 lumber", "abc supply", "beacon", "srs",
    "build",
];
const FOOD_VENDORS: &[&str] = &[
    "mcdonald", "burger", "subway", "wendy", "chick-fil", "taco bell", "pizza", "restaurant",
    "diner", "cafe", "publix", "walmart", "dollar general", "dollar tree", "convenience",
];
const SAFETY_VENDORS: &[&str] = &["safety", "grainger", "fastenal"];
const LODGING_VENDORS: &[&str] = &["hotel", "motel", "inn", "suites", "lodge", "extended stay"];

const VENDOR_TABLES: &[(&[&str], &str)] = &[
    (FUEL_VENDORS, "Fuel"),
    (MATERIAL_VENDORS, "Materials"),
    (FOOD_VENDORS, "Food & Drinks"),
    (SAFETY_VENDORS, "Safety Gear"),
    (LODGING_VENDORS, "Lodging"),
];

fn category_name_for_vendor(vendor_name: &str) -> Option<&'static str> {
    let lower = vendor_name.to_lowercase();
    for (keywords, category) in VENDOR_TABLES {
        if keywords.iter().any(|kw| lower.contains(kw)) {
            return Some(category);
        }
    }
    None
}

fn find_category<'a>(categories: &'a [CategoryRef], name: &str) -> Option<&'a CategoryRef> {
    categories.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

/// Resolve the record's category. Cascade, first hit wins:
/// 1. the extraction's suggested name, fuzzy-matched against active
///    categories;
/// 2. vendor-name keyword heuristics;
/// 3. the fallback catch-all.
///
/// Returns None only when even the fallback category is missing from the
/// reference list.
pub fn resolve_category(
    suggestion: Option<&str>,
    vendor_name: Option<&str>,
    categories: &[CategoryRef],
) -> Option<CategoryRef> {
    if let Some(suggestion) = suggestion.map(str::trim).filter(|s| !s.is_empty()) {
        if let Some(category) = find_category(categories, suggestion) {
            return Some(category.clone());
        }
        let best = categories
            .iter()
            .map(|c| (c, similarity(suggestion, &c.name)))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((category, score)) = best {
            if score >= CATEGORY_MATCH_THRESHOLD {
                return Some(category.clone());
            }
        }
    }

    if let Some(vendor) = vendor_name {
        if let Some(name) = category_name_for_vendor(vendor) {
            if let Some(category) = find_category(categories, name) {
                return Some(category.clone());
            }
        }
    }

    find_category(categories, FALLBACK_CATEGORY).cloned()
}
