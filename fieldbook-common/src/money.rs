//! Money as integral cents.
//!
//! All monetary amounts in fieldbook are `i64` cents, both in memory and in
//! the database. String amounts are parsed digit-by-digit so a value like
//! "42.17" round-trips exactly; binary floats only appear transiently when
//! the extraction payload carries a JSON number.

/// Parse a human or machine amount string into cents.
///
/// Accepts forms like "42.17", "$42.17", "1,204.50", "-3.00", "7".
/// Returns None for anything that does not look like a money amount.
pub fn parse_cents(raw: &str) -> Option<i64> {
    let mut s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let mut negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest.trim();
    }
    s = s.strip_prefix('$').unwrap_or(s).trim();

    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }

    let (dollars_part, cents_part) = match cleaned.split_once('.') {
        Some((d, c)) => (d, c),
        None => (cleaned.as_str(), ""),
    };

    if !dollars_part.chars().all(|c| c.is_ascii_digit())
        || !cents_part.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let dollars: i64 = if dollars_part.is_empty() {
        0
    } else {
        dollars_part.parse().ok()?
    };

    // Two fractional digits; a third digit rounds half-up.
    let mut digits = cents_part.chars();
    let tens = digits.next().and_then(|c| c.to_digit(10)).unwrap_or(0) as i64;
    let ones = digits.next().and_then(|c| c.to_digit(10)).unwrap_or(0) as i64;
    let round_up = digits
        .next()
        .and_then(|c| c.to_digit(10))
        .map(|d| d >= 5)
        .unwrap_or(false);

    let mut cents = dollars.checked_mul(100)?.checked_add(tens * 10 + ones)?;
    if round_up {
        cents = cents.checked_add(1)?;
    }
    Some(if negative { -cents } else { cents })
}

/// Convert a JSON-number amount (dollars) to cents.
///
/// The float is rounded to the nearest cent; receipt magnitudes are far
/// inside f64's exact-integer range so the rounding is stable.
pub fn cents_from_f64(dollars: f64) -> Option<i64> {
    if !dollars.is_finite() {
        return None;
    }
    let cents = (dollars * 100.0).round();
    if cents.abs() > 9.0e15 {
        return None;
    }
    Some(cents as i64)
}

/// Format cents as a dollar string, e.g. 4217 -> "$42.17", -300 -> "-$3.00".
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}${}.{:02}", sign, abs / 100, abs % 100)
}
