use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::config::ParsingConfig;

/// Common compound-word suffixes that should keep the hyphen.
pub(crate) static COMPOUND_SUFFIXES: Lazy<Vec<String>> = Lazy::new(|| {
    [
        "based", "driven", "aware", "oriented", "specific", "related", "dependent",
        "independent", "like", "free", "scale", "level", "order", "wise", "fold", "term", "year",
        "old", "time", "world", "analysis", "sectional", "reported", "controlled", "grained",
    ]
    .into_iter()
    .map(String::from)
    .collect()
});

/// Expand common typographic ligatures found in extracted text.
pub fn expand_ligatures(text: &str) -> String {
    text.replace('\u{FB00}', "ff")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .replace(['\u{FB05}', '\u{FB06}'], "st")
}

/// Fix hyphenation from line breaks while preserving compound words.
///
/// - `"cita- tion"` or `"cita-\ntion"` → `"citation"` (syllable break)
/// - `"cross- sectional"` → `"cross-sectional"` (compound word)
pub fn fix_hyphenation(text: &str) -> String {
    fix_hyphenation_with_config(text, &ParsingConfig::default())
}

/// Config-aware version of [`fix_hyphenation`].
pub(crate) fn fix_hyphenation_with_config(text: &str, config: &ParsingConfig) -> String {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w)-[ \t]*\n\s*(\w)(\w*)|(\w)-[ \t]+(\w)(\w*)").unwrap());

    let suffix_set: HashSet<String> = config
        .compound_suffixes
        .resolve(&COMPOUND_SUFFIXES)
        .into_iter()
        .map(|s| s.to_lowercase())
        .collect();

    RE.replace_all(text, |caps: &regex::Captures| {
        let (before, after_char, after_rest) = match (caps.get(1), caps.get(4)) {
            (Some(b), _) => (b.as_str(), &caps[2], &caps[3]),
            (None, Some(b)) => (b.as_str(), &caps[5], &caps[6]),
            (None, None) => return caps[0].to_string(),
        };

        let after_word = format!("{}{}", after_char, after_rest);
        let after_lower = after_word.to_lowercase();

        // Digits before the hyphen mark ranges and model names ("COVID-19", "3- 5")
        if before.chars().last().is_some_and(|c| c.is_ascii_digit()) {
            return format!("{}-{}", before, after_word);
        }

        // Capitalized or numeric continuations: "Smith- Jones", "COVID- 19"
        if after_char
            .chars()
            .next()
            .is_some_and(|c| c.is_uppercase() || c.is_ascii_digit())
        {
            return format!("{}-{}", before, after_word);
        }

        if suffix_set.contains(after_lower.as_str()) {
            return format!("{}-{}", before, after_word);
        }

        format!("{}{}", before, after_word)
    })
    .into_owned()
}

/// Prepare extracted document text for annotation.
///
/// Expands ligatures, repairs line-break hyphenation, unifies line endings
/// and replaces no-break spaces. Offsets reported by the pipeline refer to
/// the returned string, not the input.
pub fn normalize_text(text: &str) -> String {
    normalize_text_with_config(text, &ParsingConfig::default())
}

/// Config-aware version of [`normalize_text`].
pub fn normalize_text_with_config(text: &str, config: &ParsingConfig) -> String {
    let text = text.replace("\r\n", "\n").replace(['\r', '\u{0C}'], "\n");
    let text = text.replace(['\u{00A0}', '\u{202F}'], " ");
    let text = expand_ligatures(&text);
    fix_hyphenation_with_config(&text, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParsingConfigBuilder;

    #[test]
    fn test_expand_ligatures() {
        assert_eq!(expand_ligatures("ﬁnding ﬂow"), "finding flow");
        assert_eq!(expand_ligatures("eﬃcient oﬄine"), "efficient offline");
        assert_eq!(expand_ligatures("no ligatures here"), "no ligatures here");
    }

    #[test]
    fn test_fix_hyphenation_syllable_break() {
        assert_eq!(fix_hyphenation("cita- tion"), "citation");
        assert_eq!(fix_hyphenation("cita-\ntion"), "citation");
        assert_eq!(fix_hyphenation("classi- fication"), "classification");
    }

    #[test]
    fn test_fix_hyphenation_keeps_compounds_names_and_ranges() {
        assert_eq!(fix_hyphenation("cross- sectional"), "cross-sectional");
        assert_eq!(fix_hyphenation("data-\ndriven"), "data-driven");
        assert_eq!(fix_hyphenation("Smith- Jones"), "Smith-Jones");
        assert_eq!(fix_hyphenation("COVID- 19"), "COVID-19");
    }

    #[test]
    fn test_fix_hyphenation_ignores_plain_hyphens() {
        assert_eq!(fix_hyphenation("well-known result"), "well-known result");
        assert_eq!(fix_hyphenation("[3-5]"), "[3-5]");
    }

    #[test]
    fn test_normalize_text() {
        let input = "A ﬁxed ef-\nfect model\r\nwith long- term\u{00A0}follow-up.";
        assert_eq!(
            normalize_text(input),
            "A fixed effect model\nwith long-term follow-up."
        );
    }

    #[test]
    fn test_fix_hyphenation_custom_suffix() {
        let config = ParsingConfigBuilder::new()
            .add_compound_suffix("blind".to_string())
            .build()
            .unwrap();
        assert_eq!(
            fix_hyphenation_with_config("double- blind", &config),
            "double-blind"
        );
        assert_eq!(
            fix_hyphenation_with_config("cita- tion", &config),
            "citation"
        );
    }

    #[test]
    fn test_fix_hyphenation_replace_suffixes() {
        let config = ParsingConfigBuilder::new()
            .set_compound_suffixes(vec!["blind".to_string()])
            .build()
            .unwrap();
        assert_eq!(
            fix_hyphenation_with_config("cross- sectional", &config),
            "crosssectional"
        );
    }
}
