//! Text normalization shared by the report matcher.
//!
//! Turkish letters are folded to ASCII before comparison so that a user
//! typing "satis" still finds "Satış".

/// Function words that never identify a report.
///
/// Entries are already normalized; tokens are compared after folding.
pub const STOPWORDS: &[&str] = &[
    "bir", "bu", "ve", "ile", "icin", "mi", "mu", "nedir", "goster", "bana", "olan", "neler",
    "kadar", "hangi", "tum", "listele", "getir", "gecen", "son",
];

/// Minimum token length kept by [`tokenize`]; shorter tokens are noise.
const MIN_TOKEN_LEN: usize = 3;

/// Map a single Turkish-specific character to its ASCII counterpart.
fn fold_char(c: char) -> Option<char> {
    Some(match c {
        'ç' | 'Ç' => 'c',
        'ğ' | 'Ğ' => 'g',
        'ı' | 'İ' | 'I' => 'i',
        'ö' | 'Ö' => 'o',
        'ş' | 'Ş' => 's',
        'ü' | 'Ü' => 'u',
        _ => return None,
    })
}

/// Lowercase and transliterate Turkish characters to ASCII.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match fold_char(c) {
            Some(folded) => out.push(folded),
            // U+0307 appears when a dotted capital I is lowercased elsewhere.
            None if c == '\u{0307}' => {}
            None => out.extend(c.to_lowercase()),
        }
    }
    out
}

/// Split an utterance into normalized query tokens.
///
/// Tokens shorter than three characters and stopwords are discarded.
/// Leading and trailing punctuation is stripped so "satışlar?" counts.
pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .map(|raw| raw.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|token| token.chars().count() >= MIN_TOKEN_LEN)
        .filter(|token| !STOPWORDS.contains(token))
        .map(str::to_string)
        .collect()
}
