//! Reply composer
//!
//! Every text the service sends back lives here, so the wording can be
//! tuned (or localized later) without touching pipeline logic. Replies are
//! SMS-sized: the confirmation summary caps line items at five.

use crate::config::ConfirmMode;
use crate::services::structurer::ExtractedReceipt;
use fieldbook_common::money;

const MAX_SUMMARY_ITEMS: usize = 5;

pub fn welcome(name: &str) -> String {
    format!(
        "Welcome to Fieldbook, {}! You're all set. Send a photo of a receipt \
         with the project name any time. Example: [photo] Project Sparrow",
        name
    )
}

pub fn ask_name() -> String {
    "Hey! Looks like this is your first time texting Fieldbook. What's your \
     name? Just reply with your first name and I'll get you set up."
        .to_string()
}

pub fn unrecognized(name: &str) -> String {
    format!(
        "Sorry {}, I didn't catch that. Send a photo of a receipt with the \
         project name, or tell me if you didn't get a receipt.",
        name
    )
}

pub fn confirmed(name: &str) -> String {
    format!("Saved! Thanks, {}.", name)
}

pub fn rejected(name: &str) -> String {
    format!(
        "No problem, {}. You can:\n\
         1. Send a clearer photo of the receipt\n\
         2. Text me the details: vendor, amount, date, and project name\n\n\
         What would you like to do?",
        name
    )
}

pub fn confirm_reprompt(name: &str) -> String {
    format!(
        "{}, just reply YES to save or NO if something looks wrong.",
        name
    )
}

pub fn manual_entry_saved(name: &str) -> String {
    format!(
        "Got it, {}. I've saved your notes and flagged this receipt for \
         review. Thanks!",
        name
    )
}

pub fn missed_receipt_prompt(name: &str) -> String {
    format!(
        "No worries, {}. Text me these four things and I'll log it: the \
         store, the amount, what you bought, and the project name.",
        name
    )
}

pub fn missed_details_saved(name: &str) -> String {
    format!(
        "Got it, {}. I've logged what you sent and flagged it for review.",
        name
    )
}

pub fn download_failed(name: &str) -> String {
    format!(
        "Sorry {}, I had trouble downloading that image. Could you try \
         sending it again?",
        name
    )
}

pub fn could_not_read(name: &str) -> String {
    format!(
        "Sorry {}, I couldn't read that receipt clearly. Could you try \
         another photo with better lighting? Make sure the whole receipt is \
         visible and flat.",
        name
    )
}

pub fn duplicate_warning() -> String {
    "Heads up — this looks like a receipt you already sent. I've flagged it \
     for review just in case."
        .to_string()
}

pub fn quality_warning() -> String {
    "Heads up — that image looks very small. I'll still process it, but a \
     clearer photo would help."
        .to_string()
}

pub fn in_progress(name: &str) -> String {
    format!(
        "One second, {} — still working on your last message. Try again in \
         a moment.",
        name
    )
}

/// YYYY-MM-DD → MM/DD/YY for SMS readability; anything else passes through.
fn short_date(iso: &str) -> String {
    let parts: Vec<&str> = iso.split('-').collect();
    match parts.as_slice() {
        [year, month, day] if year.len() == 4 => format!("{}/{}/{}", month, day, &year[2..]),
        _ => iso.to_string(),
    }
}

/// The record summary the worker sees, with either an acknowledgment or a
/// YES/NO prompt depending on mode:
///
/// ```text
/// Home Depot, Kissimmee FL — 02/18/26 — $42.17
/// 2 items: 2x4 Lumber ($23.88), Deck Screws ($15.53)
/// Project: Sparrow
///
/// Is that correct, Omar? Reply YES to save or NO to flag.
/// ```
pub fn receipt_summary(
    receipt: &ExtractedReceipt,
    name: &str,
    project_label: Option<&str>,
    mode: ConfirmMode,
) -> String {
    let vendor = receipt.vendor_name.as_deref().unwrap_or("Unknown vendor");
    let location = match (receipt.vendor_city.as_deref(), receipt.vendor_state.as_deref()) {
        (Some(city), Some(state)) => format!(", {} {}", city, state),
        (Some(city), None) => format!(", {}", city),
        (None, Some(state)) => format!(", {}", state),
        (None, None) => String::new(),
    };
    let date = receipt
        .purchase_date
        .as_deref()
        .map(short_date)
        .unwrap_or_else(|| "unknown date".to_string());
    let total = receipt
        .total_cents
        .map(money::format_cents)
        .unwrap_or_else(|| "unknown amount".to_string());

    let mut lines = vec![format!("{}{} — {} — {}", vendor, location, date, total)];

    if receipt.line_items.is_empty() {
        lines.push("No line items detected".to_string());
    } else {
        let count = receipt.line_items.len();
        let mut parts = Vec::new();
        for item in receipt.line_items.iter().take(MAX_SUMMARY_ITEMS) {
            match item.extended_cents.or(item.unit_cents) {
                Some(cents) => parts.push(format!("{} ({})", item.item_name, money::format_cents(cents))),
                None => parts.push(item.item_name.clone()),
            }
        }
        let mut items_line = format!(
            "{} item{}: {}",
            count,
            if count == 1 { "" } else { "s" },
            parts.join(", ")
        );
        if count > MAX_SUMMARY_ITEMS {
            items_line.push_str(&format!(" +{} more", count - MAX_SUMMARY_ITEMS));
        }
        lines.push(items_line);
    }

    if let Some(project) = project_label {
        lines.push(format!("Project: {}", project));
    }

    match mode {
        ConfirmMode::AutoAccept => {
            lines.push(format!("\nGot it, {}! This receipt has been logged.", name));
        }
        ConfirmMode::ConfirmRequired => {
            lines.push(format!(
                "\nIs that correct, {}? Reply YES to save or NO to flag.",
                name
            ));
        }
    }

    lines.join("\n")
}
