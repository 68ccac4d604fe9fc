use crate::domain::model::PostalCode;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

const MIN_COMPACT_LEN: usize = 5;
const MAX_COMPACT_LEN: usize = 8;

fn postcode_shape() -> &'static Regex {
    static SHAPE: OnceLock<Regex> = OnceLock::new();
    // outward (A9, A9A, A99, AA9, AA9A, AA99) + inward (9AA)
    SHAPE.get_or_init(|| {
        Regex::new(r"^([A-Z]{1,2}[0-9][A-Z0-9]?)([0-9][A-Z]{2})$").expect("static postcode regex")
    })
}

/// Turns one raw token into canonical form, or `None` when it is not a postcode.
pub fn normalize_token(token: &str) -> Option<PostalCode> {
    let compact: String = token
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if !(MIN_COMPACT_LEN..=MAX_COMPACT_LEN).contains(&compact.len()) {
        return None;
    }

    let caps = postcode_shape().captures(&compact)?;
    Some(PostalCode::new_unchecked(format!("{} {}", &caps[1], &caps[2])))
}

/// Splits raw text on commas and line breaks and returns the unique valid postcodes
/// in the order they first appear.
pub fn parse(raw_text: &str) -> Vec<PostalCode> {
    let mut seen = HashSet::new();
    let mut codes = Vec::new();
    let mut skipped = 0usize;

    for token in raw_text.split([',', '\n', '\r']) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        match normalize_token(token) {
            Some(code) => {
                if seen.insert(code.clone()) {
                    codes.push(code);
                }
            }
            None => skipped += 1,
        }
    }

    tracing::debug!(
        "Normalized {} unique postcodes ({} tokens skipped)",
        codes.len(),
        skipped
    );
    codes
}
