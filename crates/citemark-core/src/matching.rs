use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

/// Spacing diacritics that PDF extraction tends to emit next to (rather than
/// on top of) the letter they belong to, e.g. `"M¨uller"`.
static DIACRITIC_COMPOSITIONS: Lazy<HashMap<(char, char), char>> = Lazy::new(|| {
    let table: &[(char, &str, &str)] = &[
        // Umlaut/diaeresis (¨)
        ('\u{a8}', "AEIOUYaeiouy", "ÄËÏÖÜŸäëïöüÿ"),
        // Acute accent (´)
        ('\u{b4}', "AEIOUNCSZYaeiouncszy", "ÁÉÍÓÚŃĆŚŹÝáéíóúńćśźý"),
        // Grave accent (`)
        ('`', "AEIOUaeiou", "ÀÈÌÒÙàèìòù"),
        // Tilde (~ and ˜)
        ('~', "ANOano", "ÃÑÕãñõ"),
        ('\u{2dc}', "ANOano", "ÃÑÕãñõ"),
        // Caron (ˇ)
        ('\u{2c7}', "CSZERNcszern", "ČŠŽĚŘŇčšžěřň"),
    ];
    let mut m = HashMap::new();
    for (mark, bases, composed) in table {
        for (base, c) in bases.chars().zip(composed.chars()) {
            m.insert((*mark, base), c);
        }
    }
    m
});

static SPACE_BEFORE_DIACRITIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z])\s+([\u{a8}\u{b4}`~\u{2dc}\u{2c7}])").unwrap());

static SEPARATED_DIACRITIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\u{a8}\u{b4}`~\u{2dc}\u{2c7}])\s*([A-Za-z])").unwrap());

/// Compose separated diacritics: `"M ¨uller"` → `"Müller"`, `"R´enyi"` → `"Rényi"`.
pub fn fix_separated_diacritics(text: &str) -> String {
    let text = SPACE_BEFORE_DIACRITIC_RE.replace_all(text, "$1$2");

    SEPARATED_DIACRITIC_RE
        .replace_all(&text, |caps: &regex::Captures| {
            let mark = caps[1].chars().next().unwrap_or(' ');
            let letter = caps[2].chars().next().unwrap_or(' ');
            DIACRITIC_COMPOSITIONS
                .get(&(mark, letter))
                .map(|c| c.to_string())
                .unwrap_or_else(|| letter.to_string())
        })
        .into_owned()
}

/// Fold a personal name for comparison: compose stray diacritics, NFKD,
/// strip to ASCII letters, lowercase.
///
/// `"Müller"`, `"Muller"` and `"M¨uller"` all fold to `"muller"`.
pub fn fold_name(name: &str) -> String {
    let name = fix_separated_diacritics(name);
    name.nfkd()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Split free text into folded word tokens (letters and digits only).
///
/// Used to compare marker surnames and years against bibliography entries.
pub fn normalize_tokens(text: &str) -> Vec<String> {
    static SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\u{a8}\u{b4}`~\u{2dc}\u{2c7}]+").unwrap());

    let text = fix_separated_diacritics(text);
    SPLIT_RE
        .split(&text)
        .map(|tok| {
            tok.nfkd()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|tok| !tok.is_empty())
        .collect()
}
