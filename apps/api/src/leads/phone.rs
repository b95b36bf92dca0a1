//! Phone number handling shared by dispatch, messaging and inbound routing.
//!
//! Numbers are stored free-form and normalised on read. Normalisation assumes
//! Brazilian numbers: it does not validate that the result is dialable.

/// Country code prefixed to every normalised number.
pub const COUNTRY_CODE: &str = "55";

/// Number of trailing digits compared when matching an inbound sender to a lead.
pub const MATCH_SUFFIX_LEN: usize = 8;

/// Minimum digit count for an auto-matched lead's phone to be dialable.
pub const MIN_DIALABLE_DIGITS: usize = 10;

/// Strips every non-digit character.
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Strips non-digits and prefixes the country code unless already present.
pub fn normalize_phone(raw: &str) -> String {
    let digits = digits_only(raw);
    if digits.starts_with(COUNTRY_CODE) {
        digits
    } else {
        format!("{COUNTRY_CODE}{digits}")
    }
}

/// Last `MATCH_SUFFIX_LEN` digits of a number, or all of them when shorter.
pub fn match_suffix(raw: &str) -> String {
    let digits = digits_only(raw);
    let start = digits.len().saturating_sub(MATCH_SUFFIX_LEN);
    digits[start..].to_string()
}
