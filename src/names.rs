//! Person-name keys used by the player matcher.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

const SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv", "v"];

/// Lowercase with collapsed whitespace.
pub fn exact_key(name: &str) -> String {
    collapse(&name.to_lowercase())
}

/// Diacritics, periods and quote glyph variants removed: `Nikola Jokić` and
/// `Nikola Jokic` share a key, as do `D'Angelo` and `D’Angelo`.
pub fn canonical_key(name: &str) -> String {
    let folded: String = name
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter_map(|c| match c {
            '.' => None,
            '\u{2018}' | '\u{2019}' | '\u{02BC}' | '`' | '\u{00B4}' => Some('\''),
            c => Some(c),
        })
        .collect();
    collapse(&folded.to_lowercase())
}

/// Canonical key with generational suffixes dropped.
pub fn suffixless_key(name: &str) -> String {
    let canonical = canonical_key(name);
    let mut tokens: Vec<&str> = canonical
        .split(' ')
        .map(|t| t.trim_matches(','))
        .filter(|t| !t.is_empty())
        .collect();
    while tokens.len() > 1 && tokens.last().is_some_and(|t| SUFFIXES.contains(t)) {
        tokens.pop();
    }
    tokens.join(" ")
}

pub fn last_name_key(name: &str) -> Option<String> {
    let key = suffixless_key(name);
    let last = key.rsplit(' ').next()?;
    (!last.is_empty() && last.len() < key.len()).then(|| last.to_string())
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_folds_marks_and_punctuation() {
        assert_eq!(canonical_key("Nikola Jokić"), "nikola jokic");
        assert_eq!(canonical_key("D\u{2019}Angelo  Russell"), "d'angelo russell");
        assert_eq!(canonical_key("P.J. Washington"), "pj washington");
        assert_eq!(canonical_key("Dāvis Bertāns"), "davis bertans");
    }

    #[test]
    fn suffixes_drop_only_at_the_end() {
        assert_eq!(suffixless_key("Jaren Jackson Jr."), "jaren jackson");
        assert_eq!(suffixless_key("Gary Trent, Jr."), "gary trent");
        assert_eq!(suffixless_key("Marvin Bagley III"), "marvin bagley");
        assert_eq!(suffixless_key("V"), "v");
    }

    #[test]
    fn last_name_needs_two_tokens() {
        assert_eq!(last_name_key("Jaren Jackson Jr.").as_deref(), Some("jackson"));
        assert_eq!(last_name_key("Nene"), None);
    }
}
