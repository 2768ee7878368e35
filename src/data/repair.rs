//! Text rules applied by the bulk repair passes of `AddressRepository`.
//!
//! Each rule returns `Some(fixed)` only when it actually changes the text, so
//! callers can skip the write otherwise. Positions are counted in characters.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ARRONDISSEMENT: Regex = Regex::new(r"(?i)arrondissement")
        .expect("Could not create regex");
    static ref PARIS: Regex = Regex::new(r"(?i)paris")
        .expect("Could not create regex");
    static ref PARIGI: Regex = Regex::new(r"(?i)parigi")
        .expect("Could not create regex");
    static ref POSTAL_CODE: Regex = Regex::new(r"\s(75[0-9]{3})(?:[^0-9]|$)")
        .expect("Could not create regex");
    static ref COMMA_BEFORE_POSTAL_CODE: Regex = Regex::new(r", ?75[0-9]{3}")
        .expect("Could not create regex");
}

const CITY_NAME: &str = "PARIS";

// "Paris" must start after the 5th character, "Parigi" after the 6th.
const MIN_CHARS_BEFORE_PARIS: usize = 5;
const MIN_CHARS_BEFORE_PARIGI: usize = 6;

/// Upper-cases the city name in addresses mentioning an arrondissement.
///
/// `"25 rue de paris, Arrondissement 5, 75005 PARIS"` becomes
/// `"25 rue de PARIS, Arrondissement 5, 75005 PARIS"`.
pub fn fix_arrondissement_syntax(text: &str) -> Option<String> {
    if !ARRONDISSEMENT.is_match(text) {
        return None;
    }
    replace_first_match(text, &PARIS, MIN_CHARS_BEFORE_PARIS, CITY_NAME)
}

/// Replaces the Italian "Parigi" some geocoders return with "PARIS".
pub fn fix_city_name(text: &str) -> Option<String> {
    replace_first_match(text, &PARIGI, MIN_CHARS_BEFORE_PARIGI, CITY_NAME)
}

/// Inserts `", "` before a Paris postal code separated from the street part
/// by whitespace only: `"10 rue X 75010 PARIS"` becomes `"10 rue X, 75010 PARIS"`.
///
/// Texts where any postal code is already preceded by a comma are left alone.
pub fn fix_missing_comma_before_postal_code(text: &str) -> Option<String> {
    if COMMA_BEFORE_POSTAL_CODE.is_match(text) {
        return None;
    }

    let code = POSTAL_CODE.captures(text)?.get(1)?;
    let street = text[..code.start()]
        .trim_end_matches(|c: char| c == ',' || c.is_whitespace());
    if street.is_empty() {
        return None;
    }

    Some(format!("{}, {}", street, &text[code.start()..]))
}

/// Only the first match is considered; if it starts before `min_chars_before`
/// the text is left untouched even when a later match would qualify.
fn replace_first_match(
    text: &str,
    pattern: &Regex,
    min_chars_before: usize,
    replacement: &str
) -> Option<String> {
    let found = pattern.find(text)?;
    if text[..found.start()].chars().count() < min_chars_before {
        return None;
    }
    if found.as_str() == replacement {
        return None;
    }

    let mut fixed = String::with_capacity(text.len());
    fixed.push_str(&text[..found.start()]);
    fixed.push_str(replacement);
    fixed.push_str(&text[found.end()..]);
    Some(fixed)
}
