//! Name part extraction for author forenames
//!
//! arXiv only delivers `forenames` as free text ("Hans Peter", "J. K.",
//! "Yu. A."). The first two tokens that are not initials become the derived
//! first and middle name used for name-based analysis.

/// Split `forenames` into a lower-cased `(first, middle)` pair.
///
/// The input is lower-cased and split on whitespace. The first token becomes
/// `first` and the second becomes `middle`. Either is dropped when it looks
/// like an initial: a trailing period ("yu.", "h-k.") or a single character.
pub fn extract_first_and_middle(forenames: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(forenames) = forenames else {
        return (None, None);
    };

    let lowered = forenames.to_lowercase();
    let mut words = lowered.split_whitespace();

    let first = words.next().and_then(ignore_initial);
    let middle = words.next().and_then(ignore_initial);

    (first, middle)
}

fn ignore_initial(word: &str) -> Option<String> {
    if word.ends_with('.') || word.chars().count() <= 1 {
        None
    } else {
        Some(word.to_string())
    }
}

const UMLAUT_ESCAPES: [(&str, &str); 3] = [("\"a", "ä"), ("\"u", "ü"), ("\"o", "ö")];

/// Replace the legacy `"a`, `"u`, `"o` escapes with precomposed umlauts.
///
/// Strings without a double quote are returned unchanged, as are quotes that
/// are not followed by one of those three letters.
pub fn repair_umlaut_escape(s: &str) -> String {
    if !s.contains('"') {
        return s.to_string();
    }

    UMLAUT_ESCAPES
        .iter()
        .fold(s.to_string(), |acc, (escape, umlaut)| acc.replace(escape, umlaut))
}

/// Derived name parts with the umlaut repair applied to both
pub fn derive_name_parts(forenames: Option<&str>) -> (Option<String>, Option<String>) {
    let (first, middle) = extract_first_and_middle(forenames);
    (
        first.map(|f| repair_umlaut_escape(&f)),
        middle.map(|m| repair_umlaut_escape(&m)),
    )
}
