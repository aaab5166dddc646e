//! Phone number normalization.
//!
//! Stat sources and the vendor API disagree on formatting (`+7 (912)
//! 345-67-89`, `79123456789`, ...). Everything is stored and compared in
//! E.164 form: a leading `+` followed by 8 to 15 digits.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

/// Characters dropped before validation.
static SEPARATORS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\-().]").expect("valid regex"));

static E164_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?([1-9][0-9]{7,14})$").expect("valid regex"));

/// Normalize a phone number to E.164.
pub fn normalize_e164(raw: &str) -> Result<String, CoreError> {
    let compact = SEPARATORS_RE.replace_all(raw.trim(), "");
    let digits = E164_RE
        .captures(&compact)
        .and_then(|c| c.get(1))
        .ok_or_else(|| CoreError::Validation(format!("Invalid phone number '{raw}'")))?;
    Ok(format!("+{}", digits.as_str()))
}

/// The digits of an E.164 number without the leading `+`, as the stat
/// service expects them in query strings.
pub fn digits_only(e164: &str) -> &str {
    e164.strip_prefix('+').unwrap_or(e164)
}
