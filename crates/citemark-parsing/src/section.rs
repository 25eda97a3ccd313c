use once_cell::sync::Lazy;
use regex::Regex;

use citemark_core::BibliographyEntry;

use crate::config::ParsingConfig;

/// Byte span of a document's reference list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferencesSection {
    /// Start of the "References" header line; the body ends here.
    pub header_start: usize,
    /// First byte after the header.
    pub start: usize,
    /// End of the list (an appendix or acknowledgments header, or end of text).
    pub end: usize,
}

impl ReferencesSection {
    pub fn text<'a>(&self, document: &'a str) -> &'a str {
        &document[self.start..self.end]
    }
}

/// Segmentation strategy that produced a reference list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentationStrategy {
    /// `[1] ...`
    Ieee,
    /// `1. ...`
    Numbered,
    /// `Smith, J. (2020) ...` line starts.
    AuthorYear,
    /// Blank-line separated paragraphs.
    Fallback,
}

/// One reference-list entry, with its printed number when it has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentedReference {
    pub number: Option<u32>,
    pub text: String,
}

/// Locate the references section in the document text.
///
/// Searches for a References / Bibliography / Works Cited header on a line
/// of its own (optionally numbered, "7 References", "VII. References") and
/// returns the span up to the next appendix or acknowledgments header.
/// Returns `None` when no header exists.
pub fn find_references_section(text: &str) -> Option<ReferencesSection> {
    find_references_section_with_config(text, &ParsingConfig::default())
}

/// Config-aware version of [`find_references_section`].
pub(crate) fn find_references_section_with_config(
    text: &str,
    config: &ParsingConfig,
) -> Option<ReferencesSection> {
    static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?im)^[ \t]*(?:(?:\d{1,2}|[IVX]{1,4})\.?[ \t]+)?(?:References|Bibliography|Works[ \t]+Cited|Literature[ \t]+Cited)[ \t]*:?[ \t]*$")
            .unwrap()
    });
    static END_RE: Lazy<Regex> = Lazy::new(|| {
        // Appendix must not be followed by a colon ("Artifact Appendix: Title" inside a reference)
        Regex::new(r"(?i)\n\s*(?:Appendix(?:\s+[A-Z0-9]|\s*\n|\s*$)|Acknowledgments|Acknowledgements|Supplementary\s+Material|Author\s+Contributions|Conflicts?\s+of\s+Interest|[A-Z]\n\s*(?:Appendix|Proofs?|Additional|Supplementary))")
            .unwrap()
    });

    let header_re = config.section_header_re.as_ref().unwrap_or(&HEADER_RE);
    let end_re = config.section_end_re.as_ref().unwrap_or(&END_RE);

    // Use the LAST header: tables and outlines mention "References" earlier
    let header = header_re.find_iter(text).last()?;
    let start = header.end();
    let rest = &text[start..];
    let end = start + end_re.find(rest).map_or(rest.len(), |m| m.start());

    if text[start..end].trim().is_empty() {
        return None;
    }

    tracing::debug!(
        header_start = header.start(),
        start,
        end,
        "found references section"
    );

    Some(ReferencesSection {
        header_start: header.start(),
        start,
        end,
    })
}

/// Split a reference list into entries, trying the most specific layout first.
pub fn segment_references(ref_text: &str) -> (SegmentationStrategy, Vec<SegmentedReference>) {
    if let Some(refs) = try_ieee(ref_text) {
        return (SegmentationStrategy::Ieee, refs);
    }
    if let Some(refs) = try_numbered(ref_text) {
        return (SegmentationStrategy::Numbered, refs);
    }
    if let Some(refs) = try_author_year(ref_text) {
        return (SegmentationStrategy::AuthorYear, refs);
    }
    (SegmentationStrategy::Fallback, fallback_double_newline(ref_text))
}

/// Build bibliography entries from a reference list.
///
/// Numbered lists keep their printed numbers as keys. Other lists are keyed
/// `Surname:Year` when both can be read from the entry, otherwise by
/// 1-based position.
pub fn parse_bibliography(ref_text: &str) -> Vec<BibliographyEntry> {
    let (strategy, refs) = segment_references(ref_text);
    let entries: Vec<BibliographyEntry> = refs
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            let key = match r.number {
                Some(n) => n.to_string(),
                None => author_year_key(&r.text).unwrap_or_else(|| (i + 1).to_string()),
            };
            BibliographyEntry::new(key, collapse_whitespace(&r.text))
        })
        .collect();

    tracing::debug!(?strategy, entries = entries.len(), "parsed bibliography");
    entries
}

/// Split at explicit markers matched by `re`, whose group 1 is the entry number.
///
/// At least three markers are required, numbered sequentially from 1, so that
/// bracketed years (`[2017]`) and numbered lists in prose are not mistaken
/// for a reference list.
fn split_numbered(ref_text: &str, re: &Regex) -> Option<Vec<SegmentedReference>> {
    let caps: Vec<_> = re.captures_iter(ref_text).collect();
    if caps.len() < 3 {
        return None;
    }

    let numbers: Vec<u32> = caps
        .iter()
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect();
    if numbers.len() != caps.len() || numbers[0] != 1 {
        return None;
    }
    if !numbers.iter().take(5).collect::<Vec<_>>().windows(2).all(|w| *w[1] == *w[0] + 1) {
        return None;
    }

    let mut refs = Vec::new();
    for (i, c) in caps.iter().enumerate() {
        let Some(whole) = c.get(0) else { continue };
        // Cut at the next number, not the next match: the match may begin
        // with this entry's final period
        let end = caps
            .get(i + 1)
            .and_then(|n| n.get(1))
            .map_or(ref_text.len(), |m| m.start());
        let content = ref_text[whole.end()..end].trim_end().trim_end_matches('[').trim();
        if !content.is_empty() {
            refs.push(SegmentedReference {
                number: Some(numbers[i]),
                text: content.to_string(),
            });
        }
    }
    Some(refs)
}

fn try_ieee(ref_text: &str) -> Option<Vec<SegmentedReference>> {
    // After a line start, a period, a closing bracket or a digit: extracted
    // text does not always keep the newline before "[n]"
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|\n|[.\]0-9])\s*\[(\d{1,3})\]\s*").unwrap());
    split_numbered(ref_text, &RE)
}

fn try_numbered(ref_text: &str) -> Option<Vec<SegmentedReference>> {
    // 1-3 digits only, not 4-digit years
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)(?:^|\n)\s*(\d{1,3})\.\s+").unwrap());
    split_numbered(ref_text, &RE)
}

fn try_author_year(ref_text: &str) -> Option<Vec<SegmentedReference>> {
    // "Smith, J.", "van der Berg, A.", "O'Neil, P. R." at a line start
    static ENTRY_START_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?m)^[ \t]*(?:(?:van|von|de|der|den|del|da|di|le|la)\s+)*\p{Lu}[\p{L}'’\-]+,\s+\p{Lu}").unwrap()
    });

    let starts: Vec<usize> = ENTRY_START_RE.find_iter(ref_text).map(|m| m.start()).collect();
    if starts.len() < 2 {
        return None;
    }

    let mut refs = Vec::new();
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(ref_text.len());
        let content = ref_text[start..end].trim();
        if !content.is_empty() {
            refs.push(SegmentedReference {
                number: None,
                text: content.to_string(),
            });
        }
    }

    // Each entry should carry a year; otherwise these are wrapped lines, not entries
    let with_year = refs.iter().filter(|r| YEAR_RE.is_match(&r.text)).count();
    (with_year * 2 > refs.len()).then_some(refs)
}

fn fallback_double_newline(ref_text: &str) -> Vec<SegmentedReference> {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

    RE.split(ref_text)
        .map(str::trim)
        .filter(|p| p.len() > 20)
        .map(|p| SegmentedReference {
            number: None,
            text: p.to_string(),
        })
        .collect()
}

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b((?:1[5-9]|20)\d{2}[a-z]?)\b").unwrap());

/// `"Smith, J. (2020a). Title."` → `"Smith:2020a"`.
fn author_year_key(entry: &str) -> Option<String> {
    static SURNAME_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^\s*((?:(?:van|von|de|der|den|del|da|di|le|la)\s+)*\p{Lu}[\p{L}'’\-]+)").unwrap()
    });

    let surname = SURNAME_RE.captures(entry)?.get(1)?.as_str();
    let year = YEAR_RE.captures(entry)?.get(1)?.as_str();
    Some(format!("{}:{}", surname, year))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
