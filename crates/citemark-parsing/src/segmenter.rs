//! Rule-based sentence boundary detection for scholarly prose.
//!
//! Candidate boundaries are terminal punctuation followed by whitespace, and
//! blank lines. A candidate is rejected when the period belongs to a known
//! abbreviation, an initial, a dotted abbreviation (`e.g.`, `U.S.`), or falls
//! inside a parenthetical/bracket span. Two merge passes then repair the
//! remaining over-splits.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use citemark_core::Sentence;

use crate::config::ParsingConfig;

/// Words whose trailing period does not end a sentence (lowercase, no dot).
pub(crate) static DEFAULT_ABBREVIATIONS: Lazy<Vec<String>> = Lazy::new(|| {
    [
        // Citation and cross-reference furniture
        "al", "fig", "figs", "eq", "eqs", "eqn", "tab", "sec", "sect", "ch", "chap", "vol",
        "vols", "p", "pp", "para", "ref", "refs", "cf", "vs", "viz", "ca", "approx", "resp",
        "ed", "eds", "suppl", "no", "nos",
        // Titles
        "dr", "mr", "mrs", "ms", "prof", "jr", "sr", "st",
        // Venue abbreviations common in running text
        "proc", "conf", "j", "int", "intl", "trans", "univ", "dept", "inc", "ltd", "co",
        // Months
        "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep", "sept", "oct", "nov", "dec",
    ]
    .into_iter()
    .map(String::from)
    .collect()
});

/// Splits raw text into [`Sentence`] spans.
///
/// Holds only the resolved abbreviation set, so one instance can be shared
/// across any number of documents.
#[derive(Debug, Clone)]
pub struct SentenceSegmenter {
    abbreviations: HashSet<String>,
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self::with_config(&ParsingConfig::default())
    }

    pub fn with_config(config: &ParsingConfig) -> Self {
        let abbreviations = config
            .abbreviations
            .resolve(&DEFAULT_ABBREVIATIONS)
            .into_iter()
            .map(|a| a.trim_end_matches('.').to_lowercase())
            .collect();
        Self { abbreviations }
    }

    /// Segment `text` into sentences in reading order.
    ///
    /// Empty or whitespace-only input yields no sentences. Every returned
    /// sentence is non-empty and trimmed; the gaps between consecutive
    /// sentences contain only whitespace.
    pub fn segment(&self, text: &str) -> Vec<Sentence> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let cuts = self.boundaries(text);

        let mut spans: Vec<(usize, usize)> = Vec::new();
        let mut prev = 0;
        for cut in cuts.into_iter().chain(std::iter::once(text.len())) {
            if let Some(span) = trim_span(text, prev, cut) {
                spans.push(span);
            }
            prev = cut;
        }

        let spans = merge_spans(text, spans);

        spans
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| Sentence {
                index,
                start_offset: start,
                end_offset: end,
                text: text[start..end].to_string(),
            })
            .collect()
    }

    /// Byte positions at which the text may be cut, ascending and unique.
    fn boundaries(&self, text: &str) -> Vec<usize> {
        static TERMINAL_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r#"[.!?…]+["'”’»)\]]*\s"#).unwrap());
        static BLANK_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

        let protected = protected_spans(text);
        let mut cuts = Vec::new();

        for m in TERMINAL_RE.find_iter(text) {
            // Cut right after the punctuation and any closing quotes/brackets
            let trailing_ws = m.as_str().chars().last().map_or(0, char::len_utf8);
            let cut = m.end() - trailing_ws;
            let punct = &text[m.start()..cut];

            if is_inside(&protected, m.start()) {
                continue;
            }
            if punct.starts_with('.')
                && !punct.starts_with("..")
                && self.is_non_terminal_period(&text[..m.start()], &text[m.start() + 1..])
            {
                continue;
            }
            cuts.push(cut);
        }

        for m in BLANK_LINE_RE.find_iter(text) {
            cuts.push(m.start());
        }

        cuts.sort_unstable();
        cuts.dedup();
        cuts
    }

    /// Whether a period between `before` and `after` belongs to an
    /// abbreviation, initial or number rather than ending a sentence.
    fn is_non_terminal_period(&self, before: &str, after: &str) -> bool {
        static DOTTED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:\p{L}\.)+\p{L}$").unwrap());

        let mut preceding = before.split_whitespace().rev();
        let token = preceding
            .next()
            .unwrap_or("")
            .trim_start_matches(['(', '[', '"', '\'', '“', '‘']);

        if token.is_empty() {
            return false;
        }

        if is_single_capital(token) {
            return is_initial(preceding.next(), after.split_whitespace().next());
        }

        if DOTTED_RE.is_match(token) {
            return true;
        }

        self.abbreviations.contains(&token.to_lowercase())
    }
}

/// Words after which a lone capital letter is a name initial: "by J. Smith".
const NAME_LEADS: &[&str] = &[
    "by", "with", "and", "of", "from", "to", "for", "see", "cf", "&", "dr", "prof", "mr", "mrs",
    "ms", "et",
];

fn is_single_capital(token: &str) -> bool {
    let mut chars = token.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_uppercase())
}

/// Decide whether a lone capital followed by a period ("X.") is an initial.
///
/// It is when it sits in a run of initials ("J. R. Smith"), follows a
/// capitalized forename ("John F. Kennedy"), or follows a word that
/// introduces a name ("by X. Smith"). Otherwise it ends the sentence
/// ("shows X. Smith (2020) disagrees").
fn is_initial(previous: Option<&str>, next: Option<&str>) -> bool {
    let is_initial_token =
        |t: &str| t.strip_suffix('.').is_some_and(is_single_capital);

    if next.is_some_and(is_initial_token) || previous.is_some_and(is_initial_token) {
        return true;
    }
    let Some(previous) = previous else {
        return true;
    };
    let word = previous.trim_matches(|c: char| !c.is_alphanumeric() && c != '&');
    if word.is_empty() {
        return false;
    }
    if NAME_LEADS.contains(&word.to_lowercase().as_str()) {
        return true;
    }
    // Forename: capitalized and not ending the previous clause
    previous.chars().next().is_some_and(char::is_uppercase)
        && previous.chars().last().is_some_and(char::is_alphabetic)
}

/// Parenthetical and bracket spans (bounded in length) in which a period is
/// never a sentence boundary: `(Smith et al., 2020, p. 5)`, `[Ref. 12]`.
fn protected_spans(text: &str) -> Vec<(usize, usize)> {
    static PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^()]{0,250}\)").unwrap());
    static BRACKET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\[\]]{0,120}\]").unwrap());

    let mut spans: Vec<(usize, usize)> = PAREN_RE
        .find_iter(text)
        .chain(BRACKET_RE.find_iter(text))
        .filter(|m| !m.as_str().contains("\n\n"))
        .map(|m| (m.start(), m.end()))
        .collect();
    spans.sort_unstable();
    spans
}

/// Whether `pos` lies strictly inside one of the (sorted) spans.
fn is_inside(spans: &[(usize, usize)], pos: usize) -> bool {
    let idx = spans.partition_point(|&(start, _)| start < pos);
    spans[..idx].iter().rev().any(|&(start, end)| start < pos && pos + 1 < end)
}

/// Shrink `[start, end)` to exclude surrounding whitespace; `None` if empty.
fn trim_span(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &text[start..end];
    let trimmed_start = start + (slice.len() - slice.trim_start().len());
    let trimmed_end = end - (slice.len() - slice.trim_end().len());
    (trimmed_start < trimmed_end).then_some((trimmed_start, trimmed_end))
}

/// Merge over-split sentences into their predecessor:
/// - a sentence starting with a lowercase letter (missed abbreviation),
/// - a sentence consisting solely of a citation marker (`[12].`).
fn merge_spans(text: &str, spans: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        let piece = &text[start..end];
        let should_merge = !merged.is_empty() && (starts_lowercase(piece) || is_marker_only(piece));
        match merged.last_mut() {
            Some(last) if should_merge => last.1 = end,
            _ => merged.push((start, end)),
        }
    }
    merged
}

fn starts_lowercase(piece: &str) -> bool {
    piece.chars().next().is_some_and(char::is_lowercase)
}

fn is_marker_only(piece: &str) -> bool {
    static MARKER_ONLY_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"^(?:\[[^\[\]]{1,60}\]|\([^()]{1,200}\)|[⁰¹²³⁴⁵⁶⁷⁸⁹]+|\d{1,3})(?:\s*[,;]?\s*(?:\[[^\[\]]{1,60}\]|\([^()]{1,200}\)))*[.,;:]?$",
        )
        .unwrap()
    });
    MARKER_ONLY_RE.is_match(piece)
}
