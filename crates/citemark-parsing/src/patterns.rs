//! Citation-marker rule families.
//!
//! Each [`MarkerRule`] pairs a compiled pattern with a field extractor that
//! turns a match into zero or more inner citations. Rules are grouped into
//! [`RuleFamily`] values, one per concrete [`CitationStyle`]. All families
//! are scanned independently; [`resolve_overlaps`] then decides which
//! candidates survive.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use citemark_core::{CitationStyle, Diagnostic, DiagnosticKind, MarkerFields};

use crate::config::ParsingConfig;

/// A group of rules matching one citation-style family.
///
/// Declaration order doubles as the tie-break order for equal-length overlaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleFamily {
    /// `(Smith, 2020)`, `Smith (2020)`.
    AuthorYear,
    /// `[3]`, `[2, 4-6]`.
    BracketNumeric,
    /// Superscripts and bare numbers glued to punctuation: `disease,3,4`.
    BareNumeric,
}

impl RuleFamily {
    pub const ALL: [RuleFamily; 3] = [
        RuleFamily::AuthorYear,
        RuleFamily::BracketNumeric,
        RuleFamily::BareNumeric,
    ];

    pub fn style(&self) -> CitationStyle {
        match self {
            RuleFamily::AuthorYear => CitationStyle::Apa,
            RuleFamily::BracketNumeric => CitationStyle::Ieee,
            RuleFamily::BareNumeric => CitationStyle::Numbered,
        }
    }

    pub fn for_style(style: CitationStyle) -> Option<RuleFamily> {
        match style {
            CitationStyle::Apa => Some(RuleFamily::AuthorYear),
            CitationStyle::Ieee => Some(RuleFamily::BracketNumeric),
            CitationStyle::Numbered => Some(RuleFamily::BareNumeric),
            CitationStyle::Mixed | CitationStyle::Unknown => None,
        }
    }
}

/// One citation inside a matched marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPart {
    pub start: usize,
    pub end: usize,
    pub fields: MarkerFields,
}

/// A rule match before overlap resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerCandidate {
    pub family: RuleFamily,
    pub rule: &'static str,
    /// Position of the rule in the library's declaration order.
    pub rule_order: usize,
    pub outer_start: usize,
    pub outer_end: usize,
    pub parts: Vec<MarkerPart>,
}

impl MarkerCandidate {
    pub fn len(&self) -> usize {
        self.outer_end - self.outer_start
    }

    pub fn is_empty(&self) -> bool {
        self.outer_end == self.outer_start
    }

    pub fn style(&self) -> CitationStyle {
        self.family.style()
    }

    fn overlaps(&self, start: usize, end: usize) -> bool {
        self.outer_start < end && start < self.outer_end
    }
}

/// Scan-time settings shared by all field extractors.
#[derive(Debug, Clone, Copy)]
pub struct ScanContext {
    pub max_range_expansion: u32,
}

impl Default for ScanContext {
    fn default() -> Self {
        Self {
            max_range_expansion: 100,
        }
    }
}

impl From<&ParsingConfig> for ScanContext {
    fn from(config: &ParsingConfig) -> Self {
        Self {
            max_range_expansion: config.max_range_expansion,
        }
    }
}

/// What a field extractor made of one pattern match.
#[derive(Debug)]
pub enum RuleOutcome {
    Matched {
        outer_start: usize,
        outer_end: usize,
        parts: Vec<MarkerPart>,
        diagnostics: Vec<Diagnostic>,
    },
    /// Looked like a marker but could not be parsed.
    Malformed(Vec<Diagnostic>),
    NoMatch,
}

type FieldExtractor = fn(&str, &Captures<'_>, &ScanContext) -> RuleOutcome;

/// A named pattern plus the function that pulls fields out of its matches.
pub struct MarkerRule {
    pub name: &'static str,
    pub family: RuleFamily,
    pattern: Regex,
    extractor: FieldExtractor,
}

impl std::fmt::Debug for MarkerRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerRule")
            .field("name", &self.name)
            .field("family", &self.family)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

impl MarkerRule {
    pub fn style(&self) -> CitationStyle {
        self.family.style()
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Candidates and diagnostics from scanning one text.
#[derive(Debug, Default)]
pub struct ScanOutput {
    pub candidates: Vec<MarkerCandidate>,
    pub diagnostics: Vec<Diagnostic>,
}

/// The ordered set of marker rules.
///
/// Immutable after construction; [`MarkerPatternLibrary::shared`] hands out
/// one process-wide instance.
#[derive(Debug)]
pub struct MarkerPatternLibrary {
    rules: Vec<MarkerRule>,
}

impl Default for MarkerPatternLibrary {
    fn default() -> Self {
        Self::new()
    }
}

// ── Pattern building blocks ──

/// Capitalized surname: "Smith", "McDonald", "O'Neil", "Smith-Jones", "Li".
const NAME: &str = r"\p{Lu}(?:['’]\p{Lu})?\p{Ll}[\p{L}'’\-]*";
const PARTICLES: &str = r"(?:(?:van|von|de|der|den|del|della|di|da|du|dos|le|la|ten|ter)\s+)*";
const YEAR_TOKEN: &str = r"(?:(?:1[5-9]|20)\d{2}[a-z]?|n\.\s?d\.|in\s+press|forthcoming)";
const LOCATOR: &str = r"(?i:(?:pp?\.|ch(?:ap)?\.|sec(?:t)?\.|para\.|fig\.|§)\s*[\divxlc]+(?:\s*[-–]\s*[\divxlc]+)?|\d+(?:\s*[-–]\s*\d+)?)";

fn surname() -> String {
    format!(r"\b{PARTICLES}{NAME}")
}

/// Author list inside a parenthetical: "Smith", "Smith & Jones",
/// "Smith, Jones, and Lee", "Smith et al.".
fn author_list() -> String {
    let s = surname();
    format!(r"{s}(?:(?:\s*,\s*{s})*,?(?:\s*&\s*|\s+and\s+){s})?(?:\s+et\s+al\.?)?")
}

/// Words that look like surnames in front of a parenthesized year but are not.
const NON_AUTHOR_WORDS: &[&str] = &[
    "In", "The", "See", "This", "That", "These", "Table", "Tables", "Figure", "Figures", "Fig",
    "Section", "Sections", "Chapter", "Appendix", "Equation", "Eq", "Step", "Phase", "Version",
    "Year", "Years", "Since", "Until", "During", "From", "Before", "After", "January",
    "February", "March", "April", "May", "June", "July", "August", "September", "October",
    "November", "December", "Result", "Results", "Data", "Dataset", "Model", "Models", "Method",
    "Methods", "Analysis", "Experiment", "Experiments", "Study", "Studies", "Work", "Previous",
    "Recent", "Prior", "Our", "We", "It", "They", "Here", "There", "However", "Moreover", "Thus",
    "Therefore", "Also", "Both", "Each", "All", "Some", "Most", "Many", "Other", "Others",
    "Participants", "Sample", "Samples", "Survey", "Report",
];

static SIGNAL_PHRASE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i:see\s+also|see|e\.g\.,?|cf\.|i\.e\.,?|for\s+example,?|for\s+a\s+review,?\s+see)\s+").unwrap()
});

static CITATION_BODY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^(?P<authors>{authors})(?:['’]s)?\s*,?\s*(?P<years>{y}(?:\s*,\s*{y})*)(?:\s*[,:]\s*(?P<loc>{LOCATOR}))?\s*$",
        authors = author_list(),
        y = YEAR_TOKEN,
    ))
    .unwrap()
});

static YEARS_ONLY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\s*(?P<years>{y}(?:\s*[,;]\s*{y})*)(?:\s*[,:]\s*(?P<loc>{LOCATOR}))?\s*$",
        y = YEAR_TOKEN,
    ))
    .unwrap()
});

static YEAR_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(YEAR_TOKEN).unwrap());

static YEAR_LIKE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:1[5-9]|20)\d{2}").unwrap());

const SUPERSCRIPT_DIGITS: &str = "⁰¹²³⁴⁵⁶⁷⁸⁹";

static CAPITALIZED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(NAME).unwrap());

impl MarkerPatternLibrary {
    /// Build the default rule set, in declaration order.
    pub fn new() -> Self {
        let rules = vec![
            MarkerRule {
                name: "parenthetical",
                family: RuleFamily::AuthorYear,
                pattern: Regex::new(r"\(([^()]{1,300})\)").unwrap(),
                extractor: extract_parenthetical,
            },
            MarkerRule {
                name: "narrative",
                family: RuleFamily::AuthorYear,
                pattern: Regex::new(&format!(
                    r"(?P<authors>{})(?:['’]s)?\s*\((?P<inner>[^()]{{1,80}})\)",
                    narrative_authors()
                ))
                .unwrap(),
                extractor: extract_narrative,
            },
            MarkerRule {
                name: "bracket",
                family: RuleFamily::BracketNumeric,
                pattern: Regex::new(
                    r"\[\s*(\d{1,3}(?:\s*[-–—]\s*\d{1,3})?(?:\s*[,;]\s*\d{1,3}(?:\s*[-–—]\s*\d{1,3})?)*)\s*\]",
                )
                .unwrap(),
                extractor: extract_bracket,
            },
            MarkerRule {
                name: "superscript",
                family: RuleFamily::BareNumeric,
                pattern: Regex::new(r"[⁰¹²³⁴⁵⁶⁷⁸⁹]+(?:[,⁻‐–\-][⁰¹²³⁴⁵⁶⁷⁸⁹]+)*").unwrap(),
                extractor: extract_superscript,
            },
            MarkerRule {
                name: "bare_numeric",
                family: RuleFamily::BareNumeric,
                pattern: Regex::new(r"(?:\p{Ll}|[\p{L}\)][.,;:])(\d{1,3}(?:[,\-–]\d{1,3})*)").unwrap(),
                extractor: extract_bare_numeric,
            },
        ];
        Self { rules }
    }

    /// The process-wide default library.
    pub fn shared() -> &'static MarkerPatternLibrary {
        static LIBRARY: Lazy<MarkerPatternLibrary> = Lazy::new(MarkerPatternLibrary::new);
        &LIBRARY
    }

    pub fn rules(&self) -> &[MarkerRule] {
        &self.rules
    }

    /// Run every rule of the given families over `text[..scan_end]`.
    ///
    /// Candidates may overlap; pass them through [`resolve_overlaps`].
    pub fn scan(
        &self,
        text: &str,
        scan_end: usize,
        families: &[RuleFamily],
        ctx: &ScanContext,
    ) -> ScanOutput {
        let haystack = &text[..scan_end];
        let mut out = ScanOutput::default();

        for (rule_order, rule) in self.rules.iter().enumerate() {
            if !families.contains(&rule.family) {
                continue;
            }
            for caps in rule.pattern.captures_iter(haystack) {
                match (rule.extractor)(haystack, &caps, ctx) {
                    RuleOutcome::Matched {
                        outer_start,
                        outer_end,
                        parts,
                        diagnostics,
                    } => {
                        out.diagnostics.extend(diagnostics);
                        if parts.is_empty() || outer_start >= outer_end {
                            continue;
                        }
                        out.candidates.push(MarkerCandidate {
                            family: rule.family,
                            rule: rule.name,
                            rule_order,
                            outer_start,
                            outer_end,
                            parts,
                        });
                    }
                    RuleOutcome::Malformed(diagnostics) => out.diagnostics.extend(diagnostics),
                    RuleOutcome::NoMatch => {}
                }
            }
        }

        tracing::trace!(
            candidates = out.candidates.len(),
            malformed = out.diagnostics.len(),
            "marker scan complete"
        );
        out
    }
}

/// Narrative author lists are one name or two joined by a conjunction. A comma
/// list would swallow a sentence-initial word ("Moreover, Smith and Lee (2020)").
fn narrative_authors() -> String {
    let s = surname();
    format!(r"{s}(?:(?:\s*&\s*|\s+and\s+){s})?(?:\s+et\s+al\.?)?")
}

/// Resolve overlapping candidates.
///
/// The candidate with the longer outer span wins; equal lengths resolve by
/// family declaration order, then rule declaration order, then position.
/// Survivors are returned ordered by `outer_start`.
pub fn resolve_overlaps(mut candidates: Vec<MarkerCandidate>) -> Vec<MarkerCandidate> {
    candidates.sort_by_key(|c| (Reverse(c.len()), c.family, c.rule_order, c.outer_start));

    // Accepted spans keyed by start; accepted spans never overlap each other.
    let mut accepted: BTreeMap<usize, MarkerCandidate> = BTreeMap::new();
    for candidate in candidates {
        let (start, end) = (candidate.outer_start, candidate.outer_end);
        let clashes_before = accepted
            .range(..=start)
            .next_back()
            .is_some_and(|(_, c)| c.overlaps(start, end));
        let clashes_after = accepted
            .range(start..end)
            .next()
            .is_some_and(|(_, c)| c.overlaps(start, end));
        if !clashes_before && !clashes_after {
            accepted.insert(start, candidate);
        }
    }
    accepted.into_values().collect()
}

// ── Field extractors ──

fn extract_parenthetical(text: &str, caps: &Captures<'_>, _ctx: &ScanContext) -> RuleOutcome {
    let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
        return RuleOutcome::NoMatch;
    };

    let mut parts = Vec::new();
    let mut diagnostics = Vec::new();
    let mut part_start = inner.start();
    let mut last_authors: Option<Vec<String>> = None;
    let mut orphan_years = Vec::new();

    for piece in inner.as_str().split(';') {
        let piece_start = part_start;
        part_start += piece.len() + 1;

        let Some((start, end)) = trimmed_range(piece, piece_start) else {
            continue;
        };
        let mut body = &text[start..end];
        let mut body_start = start;
        if let Some(m) = SIGNAL_PHRASE_RE.find(body) {
            body_start += m.end();
            body = &text[body_start..end];
        }

        let (authors, c) = match CITATION_BODY_RE.captures(body) {
            Some(c) => (split_authors(&c["authors"]), Some(c)),
            // "(Smith, 2020a; 2020b)": a year-only piece continues the previous authors
            None => match YEARS_ONLY_RE.captures(body) {
                Some(c) => match &last_authors {
                    Some(authors) => (authors.clone(), Some(c)),
                    None => {
                        orphan_years.push((body_start, end));
                        continue;
                    }
                },
                None => (Vec::new(), None),
            },
        };

        match c {
            Some(c) => {
                let years = c.name("years").map(|m| (body_start + m.start(), m.as_str()));
                let locator = c.name("loc").map(|m| m.as_str().trim().to_string());
                if let Some((years_start, years_text)) = years {
                    parts.extend(author_year_parts(
                        &authors,
                        years_start,
                        years_text,
                        locator,
                        body_start,
                        end,
                    ));
                }
                last_authors = Some(authors);
            }
            None => {
                // Only report pieces that carry both a year and a name; a bare
                // "(2020)" belongs to the narrative rule.
                if YEAR_LIKE_RE.is_match(body) && CAPITALIZED_RE.is_match(body) {
                    diagnostics.push(Diagnostic::at(
                        DiagnosticKind::MalformedMarker,
                        format!("unparseable author-year citation {:?}", body),
                        body_start,
                        end,
                    ));
                }
            }
        }
    }

    // A lone "(2020)" belongs to the narrative rule; inside a real
    // author-year list, a year with no authors before it is malformed.
    if !parts.is_empty() {
        for (start, end) in orphan_years {
            diagnostics.push(Diagnostic::at(
                DiagnosticKind::MalformedMarker,
                format!("year {:?} has no preceding authors", &text[start..end]),
                start,
                end,
            ));
        }
    }

    if parts.is_empty() {
        return if diagnostics.is_empty() {
            RuleOutcome::NoMatch
        } else {
            RuleOutcome::Malformed(diagnostics)
        };
    }

    RuleOutcome::Matched {
        outer_start: whole.start(),
        outer_end: whole.end(),
        parts,
        diagnostics,
    }
}

fn extract_narrative(_text: &str, caps: &Captures<'_>, _ctx: &ScanContext) -> RuleOutcome {
    let (Some(whole), Some(authors_m), Some(inner)) =
        (caps.get(0), caps.name("authors"), caps.name("inner"))
    else {
        return RuleOutcome::NoMatch;
    };

    let authors = split_authors(authors_m.as_str());
    match authors.first() {
        Some(first) if !NON_AUTHOR_WORDS.contains(&first.as_str()) => {}
        _ => return RuleOutcome::NoMatch,
    }

    let Some(c) = YEARS_ONLY_RE.captures(inner.as_str()) else {
        return RuleOutcome::NoMatch;
    };
    let Some(years) = c.name("years") else {
        return RuleOutcome::NoMatch;
    };
    let locator = c.name("loc").map(|m| m.as_str().trim().to_string());

    let parts = author_year_parts(
        &authors,
        inner.start() + years.start(),
        years.as_str(),
        locator,
        whole.start(),
        whole.end(),
    );

    RuleOutcome::Matched {
        outer_start: whole.start(),
        outer_end: whole.end(),
        parts,
        diagnostics: Vec::new(),
    }
}

fn extract_bracket(_text: &str, caps: &Captures<'_>, ctx: &ScanContext) -> RuleOutcome {
    let (Some(whole), Some(list)) = (caps.get(0), caps.get(1)) else {
        return RuleOutcome::NoMatch;
    };

    match expand_numeric_list(list.as_str(), &['-', '–', '—'], ctx.max_range_expansion) {
        Ok(numeric_keys) => RuleOutcome::Matched {
            outer_start: whole.start(),
            outer_end: whole.end(),
            parts: vec![MarkerPart {
                start: whole.start(),
                end: whole.end(),
                fields: MarkerFields::Numeric { numeric_keys },
            }],
            diagnostics: Vec::new(),
        },
        Err(reason) => RuleOutcome::Malformed(vec![Diagnostic::at(
            DiagnosticKind::MalformedMarker,
            format!("bracket marker {:?}: {}", whole.as_str(), reason),
            whole.start(),
            whole.end(),
        )]),
    }
}

fn extract_superscript(_text: &str, caps: &Captures<'_>, ctx: &ScanContext) -> RuleOutcome {
    let Some(whole) = caps.get(0) else {
        return RuleOutcome::NoMatch;
    };
    // Longer digit runs are OCR noise, not reference numbers
    if whole
        .as_str()
        .split(|c: char| !SUPERSCRIPT_DIGITS.contains(c))
        .any(|run| run.chars().count() > 3)
    {
        return RuleOutcome::NoMatch;
    }

    let plain: String = whole
        .as_str()
        .chars()
        .map(|c| match c {
            '⁰' => '0',
            '¹' => '1',
            '²' => '2',
            '³' => '3',
            '⁴' => '4',
            '⁵' => '5',
            '⁶' => '6',
            '⁷' => '7',
            '⁸' => '8',
            '⁹' => '9',
            '⁻' | '‐' | '–' => '-',
            other => other,
        })
        .collect();

    numeric_outcome(whole.start(), whole.end(), &plain, ctx)
}

fn extract_bare_numeric(text: &str, caps: &Captures<'_>, ctx: &ScanContext) -> RuleOutcome {
    let Some(digits) = caps.get(1) else {
        return RuleOutcome::NoMatch;
    };

    // Must be followed by a boundary, and not be the integer part of a decimal
    let rest = &text[digits.end()..];
    let mut next = rest.chars();
    match (next.next(), next.next()) {
        (None, _) => {}
        (Some(c), after) if c == '.' || c == ',' => {
            if after.is_some_and(|a| a.is_ascii_digit()) {
                return RuleOutcome::NoMatch;
            }
        }
        (Some(c), _) if c.is_whitespace() || c == ';' || c == ':' || c == ')' => {}
        _ => return RuleOutcome::NoMatch,
    }

    numeric_outcome(digits.start(), digits.end(), digits.as_str(), ctx)
}

fn numeric_outcome(start: usize, end: usize, list: &str, ctx: &ScanContext) -> RuleOutcome {
    match expand_numeric_list(list, &['-'], ctx.max_range_expansion) {
        Ok(numeric_keys) => RuleOutcome::Matched {
            outer_start: start,
            outer_end: end,
            parts: vec![MarkerPart {
                start,
                end,
                fields: MarkerFields::Numeric { numeric_keys },
            }],
            diagnostics: Vec::new(),
        },
        // Bare numbers are too ambiguous to report
        Err(_) => RuleOutcome::NoMatch,
    }
}

// ── Helpers ──

/// Expand `"2, 4-6"` into `[2, 4, 5, 6]`, dropping repeats.
///
/// Reversed ranges and ranges longer than `max_range` are errors.
pub(crate) fn expand_numeric_list(
    list: &str,
    dashes: &[char],
    max_range: u32,
) -> Result<Vec<u32>, String> {
    let mut keys: Vec<u32> = Vec::new();
    let mut push = |k: u32| {
        if !keys.contains(&k) {
            keys.push(k);
        }
    };

    for item in list.split([',', ';']) {
        let item = item.trim();
        if item.is_empty() {
            return Err("empty list item".to_string());
        }
        match item.split_once(dashes) {
            Some((a, b)) => {
                let a: u32 = a.trim().parse().map_err(|_| format!("bad number {:?}", a))?;
                let b: u32 = b.trim().parse().map_err(|_| format!("bad number {:?}", b))?;
                if b < a {
                    return Err(format!("reversed range {}-{}", a, b));
                }
                if u64::from(b) - u64::from(a) + 1 > u64::from(max_range) {
                    return Err(format!("range {}-{} exceeds {} keys", a, b, max_range));
                }
                (a..=b).for_each(&mut push);
            }
            None => push(item.parse().map_err(|_| format!("bad number {:?}", item))?),
        }
    }
    Ok(keys)
}

/// Turn an author list plus one or more year tokens into marker parts.
///
/// The first year's part spans `[first_start, first_end)` (the whole
/// citation); later years point at their own token and inherit the authors.
/// The locator attaches to the last year.
fn author_year_parts(
    authors: &[String],
    years_start: usize,
    years_text: &str,
    locator: Option<String>,
    first_start: usize,
    first_end: usize,
) -> Vec<MarkerPart> {
    let tokens: Vec<_> = YEAR_TOKEN_RE.find_iter(years_text).collect();
    let last = tokens.len().saturating_sub(1);

    tokens
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let (year, year_suffix) = parse_year(m.as_str());
            let (start, end) = if i == 0 {
                (first_start, first_end)
            } else {
                (years_start + m.start(), years_start + m.end())
            };
            MarkerPart {
                start,
                end,
                fields: MarkerFields::AuthorYear {
                    authors: authors.to_vec(),
                    year,
                    year_suffix,
                    locator: if i == last { locator.clone() } else { None },
                },
            }
        })
        .collect()
}

/// `"2020a"` → `(Some(2020), Some('a'))`; `"n.d."` → `(None, None)`.
fn parse_year(token: &str) -> (Option<u16>, Option<char>) {
    let digits: String = token.chars().take_while(char::is_ascii_digit).collect();
    if digits.len() != 4 {
        return (None, None);
    }
    let suffix = token[digits.len()..]
        .chars()
        .next()
        .filter(char::is_ascii_lowercase);
    (digits.parse().ok(), suffix)
}

/// Split `"Smith, Jones, and Lee"` / `"Smith & Jones"` / `"Smith et al."` into surnames.
fn split_authors(authors: &str) -> Vec<String> {
    static ET_AL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+et\s+al\.?\s*$").unwrap());
    static SEP_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\s*,\s*(?:and\s+|&\s*)?|\s*&\s*|\s+and\s+").unwrap());
    static POSSESSIVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"['’]s$").unwrap());

    let authors = ET_AL_RE.replace(authors.trim(), "");
    SEP_RE
        .split(&authors)
        .map(|a| POSSESSIVE_RE.replace(a.trim(), "").into_owned())
        .filter(|a| !a.is_empty())
        .collect()
}

/// Byte range of `piece` (which starts at `offset`) without surrounding whitespace.
fn trimmed_range(piece: &str, offset: usize) -> Option<(usize, usize)> {
    let start = offset + (piece.len() - piece.trim_start().len());
    let end = offset + piece.trim_end().len();
    (start < end).then_some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str, families: &[RuleFamily]) -> ScanOutput {
        MarkerPatternLibrary::shared().scan(text, text.len(), families, &ScanContext::default())
    }

    fn resolved(text: &str, families: &[RuleFamily]) -> Vec<MarkerCandidate> {
        resolve_overlaps(scan(text, families).candidates)
    }

    fn keys(c: &MarkerCandidate) -> Vec<u32> {
        c.parts[0].fields.numeric_keys().to_vec()
    }

    #[test]
    fn test_bracket_single_list_range() {
        let text = "See [3], then [3,5] and finally [3-5].";
        let found = resolved(text, &[RuleFamily::BracketNumeric]);
        assert_eq!(found.len(), 3);
        assert_eq!(keys(&found[0]), vec![3]);
        assert_eq!(keys(&found[1]), vec![3, 5]);
        assert_eq!(keys(&found[2]), vec![3, 4, 5]);
        assert_eq!(&text[found[2].outer_start..found[2].outer_end], "[3-5]");
    }

    #[test]
    fn test_bracket_mixed_list_and_range() {
        let found = resolved("as in [2, 7–9; 4]", &[RuleFamily::BracketNumeric]);
        assert_eq!(keys(&found[0]), vec![2, 7, 8, 9, 4]);
    }

    #[test]
    fn test_bracket_unbalanced_is_ignored() {
        let out = scan("see [3 for details", &[RuleFamily::BracketNumeric]);
        assert!(out.candidates.is_empty());
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_bracket_reversed_range_is_malformed() {
        let out = scan("as in [9-4].", &[RuleFamily::BracketNumeric]);
        assert!(out.candidates.is_empty());
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::MalformedMarker);
        assert_eq!(out.diagnostics[0].start_offset, Some(6));
    }

    #[test]
    fn test_bracket_range_cap() {
        let ctx = ScanContext {
            max_range_expansion: 5,
        };
        let text = "[1-20]";
        let out = MarkerPatternLibrary::shared().scan(text, text.len(), &[RuleFamily::BracketNumeric], &ctx);
        assert!(out.candidates.is_empty());
        assert_eq!(out.diagnostics.len(), 1);
    }

    #[test]
    fn test_bracket_years_are_not_numeric_markers() {
        assert!(resolved("published [2020] online", &[RuleFamily::BracketNumeric]).is_empty());
    }

    #[test]
    fn test_parenthetical_single() {
        let found = resolved("as shown (Smith, 2020).", &[RuleFamily::AuthorYear]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule, "parenthetical");
        assert_eq!(
            found[0].parts[0].fields,
            MarkerFields::AuthorYear {
                authors: vec!["Smith".to_string()],
                year: Some(2020),
                year_suffix: None,
                locator: None,
            }
        );
    }

    #[test]
    fn test_parenthetical_multi_citation() {
        let text = "prior work (Smith, 2020; Jones 2019, p.5) agrees";
        let found = resolved(text, &[RuleFamily::AuthorYear]);
        assert_eq!(found.len(), 1);
        let parts = &found[0].parts;
        assert_eq!(parts.len(), 2);
        assert_eq!(&text[parts[0].start..parts[0].end], "Smith, 2020");
        assert_eq!(&text[parts[1].start..parts[1].end], "Jones 2019, p.5");
        assert_eq!(
            parts[1].fields,
            MarkerFields::AuthorYear {
                authors: vec!["Jones".to_string()],
                year: Some(2019),
                year_suffix: None,
                locator: Some("p.5".to_string()),
            }
        );
        assert_eq!(&text[found[0].outer_start..found[0].outer_end], "(Smith, 2020; Jones 2019, p.5)");
    }

    #[test]
    fn test_parenthetical_authors_and_suffix() {
        let found = resolved(
            "(see Smith & Jones, 2020a; Lee, Park, and Kim 2018; Brown et al., 2017)",
            &[RuleFamily::AuthorYear],
        );
        let parts = &found[0].parts;
        assert_eq!(parts.len(), 3);
        assert_eq!(
            parts[0].fields,
            MarkerFields::AuthorYear {
                authors: vec!["Smith".to_string(), "Jones".to_string()],
                year: Some(2020),
                year_suffix: Some('a'),
                locator: None,
            }
        );
        assert_eq!(
            parts[1].fields.first_author(),
            Some("Lee")
        );
        match &parts[1].fields {
            MarkerFields::AuthorYear { authors, .. } => assert_eq!(authors, &["Lee", "Park", "Kim"]),
            other => panic!("unexpected fields {:?}", other),
        }
        match &parts[2].fields {
            MarkerFields::AuthorYear { authors, year, .. } => {
                assert_eq!(authors, &["Brown"]);
                assert_eq!(*year, Some(2017));
            }
            other => panic!("unexpected fields {:?}", other),
        }
    }

    #[test]
    fn test_parenthetical_several_years_one_author() {
        let text = "(Smith, 2019, 2020)";
        let found = resolved(text, &[RuleFamily::AuthorYear]);
        let parts = &found[0].parts;
        assert_eq!(parts.len(), 2);
        assert_eq!(&text[parts[1].start..parts[1].end], "2020");
        assert_eq!(parts[1].fields.first_author(), Some("Smith"));
    }

    #[test]
    fn test_parenthetical_year_only_piece_inherits_authors() {
        let text = "see (Smith, 2020a; 2020b) here";
        let out = scan(text, &[RuleFamily::AuthorYear]);
        assert!(out.diagnostics.is_empty());
        let found = resolve_overlaps(out.candidates);
        let parts = &found[0].parts;
        assert_eq!(parts.len(), 2);
        assert_eq!(&text[parts[1].start..parts[1].end], "2020b");
        assert_eq!(
            parts[1].fields,
            MarkerFields::AuthorYear {
                authors: vec!["Smith".to_string()],
                year: Some(2020),
                year_suffix: Some('b'),
                locator: None,
            }
        );
    }

    #[test]
    fn test_parenthetical_leading_year_only_piece_is_malformed() {
        let text = "(2019; Smith, 2020)";
        let out = scan(text, &[RuleFamily::AuthorYear]);
        assert_eq!(out.candidates.len(), 1);
        assert_eq!(out.candidates[0].parts.len(), 1);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::MalformedMarker);
        assert_eq!(out.diagnostics[0].start_offset, Some(1));
        assert_eq!(out.diagnostics[0].end_offset, Some(5));
    }

    #[test]
    fn test_parenthetical_year_alone_is_left_to_narrative() {
        let out = scan("Smith (2020) agrees", &[RuleFamily::AuthorYear]);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_narrative_skips_common_sentence_openers() {
        let text = "Results (2020) were strong. Data (2019) was clean. Model (2018) too.";
        assert!(resolved(text, &[RuleFamily::AuthorYear]).is_empty());

        let found = resolved("As Smith (2020) showed.", &[RuleFamily::AuthorYear]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule, "narrative");
    }

    #[test]
    fn test_parenthetical_no_date() {
        let found = resolved("(Smith, n.d.)", &[RuleFamily::AuthorYear]);
        match &found[0].parts[0].fields {
            MarkerFields::AuthorYear { year, .. } => assert_eq!(*year, None),
            other => panic!("unexpected fields {:?}", other),
        }
    }

    #[test]
    fn test_year_range_with_suffixes_is_unsupported() {
        let out = scan("(Smith, 2020a-2020c)", &[RuleFamily::AuthorYear]);
        assert!(out.candidates.is_empty());
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::MalformedMarker);
    }

    #[test]
    fn test_parenthetical_without_year_is_silent() {
        let out = scan("(see Table 2) and (in press soon)", &[RuleFamily::AuthorYear]);
        assert!(out.candidates.is_empty());
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_narrative() {
        let text = "Smith (2020) and Jones et al. (2019) disagree.";
        let found = resolved(text, &[RuleFamily::AuthorYear]);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].rule, "narrative");
        assert_eq!(&text[found[0].outer_start..found[0].outer_end], "Smith (2020)");
        assert_eq!(&text[found[1].outer_start..found[1].outer_end], "Jones et al. (2019)");
        assert_eq!(found[1].parts[0].fields.first_author(), Some("Jones"));
    }

    #[test]
    fn test_narrative_skips_sentence_initial_words() {
        let text = "Moreover, Smith and Lee (2020, p. 3) found this.";
        let found = resolved(text, &[RuleFamily::AuthorYear]);
        assert_eq!(found.len(), 1);
        assert_eq!(&text[found[0].outer_start..found[0].outer_end], "Smith and Lee (2020, p. 3)");
        match &found[0].parts[0].fields {
            MarkerFields::AuthorYear { authors, locator, .. } => {
                assert_eq!(authors, &["Smith", "Lee"]);
                assert_eq!(locator.as_deref(), Some("p. 3"));
            }
            other => panic!("unexpected fields {:?}", other),
        }
    }

    #[test]
    fn test_narrative_rejects_non_author_words() {
        assert!(resolved("In Table (2020) we list", &[RuleFamily::AuthorYear]).is_empty());
    }

    #[test]
    fn test_superscript() {
        let found = resolved("as reported¹²,³⁻⁵ elsewhere", &[RuleFamily::BareNumeric]);
        assert_eq!(found.len(), 1);
        assert_eq!(keys(&found[0]), vec![12, 3, 4, 5]);
    }

    #[test]
    fn test_superscript_noise_is_ignored() {
        let text = "Noise here⁰⁻⁴²⁹⁴⁹⁶⁷²⁹⁵ in the scan.";
        let out = scan(text, &[RuleFamily::BareNumeric]);
        assert!(out.candidates.is_empty());
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_expand_numeric_list_full_u32_range() {
        assert!(expand_numeric_list("0-4294967295", &['-'], 100).is_err());
        assert!(expand_numeric_list("4294967295-4294967295", &['-'], 100).is_ok());
    }

    #[test]
    fn test_bare_numeric() {
        let text = "this disease,3,4 and shown.12 The value 2.5 is fine";
        let found = resolved(text, &[RuleFamily::BareNumeric]);
        assert_eq!(found.len(), 2);
        assert_eq!(&text[found[0].outer_start..found[0].outer_end], "3,4");
        assert_eq!(keys(&found[1]), vec![12]);
    }

    #[test]
    fn test_bare_numeric_skips_decimals() {
        assert!(resolved("a ratio,0.5 here", &[RuleFamily::BareNumeric]).is_empty());
    }

    #[test]
    fn test_scan_end_limits_search() {
        let text = "Body [1].\nReferences\n[1] Smith.";
        let out = MarkerPatternLibrary::shared().scan(text, 9, &[RuleFamily::BracketNumeric], &ScanContext::default());
        assert_eq!(out.candidates.len(), 1);
    }

    fn candidate(family: RuleFamily, rule_order: usize, start: usize, end: usize) -> MarkerCandidate {
        MarkerCandidate {
            family,
            rule: "test",
            rule_order,
            outer_start: start,
            outer_end: end,
            parts: vec![MarkerPart {
                start,
                end,
                fields: MarkerFields::Numeric { numeric_keys: vec![1] },
            }],
        }
    }

    #[test]
    fn test_resolve_longer_span_wins() {
        let out = resolve_overlaps(vec![
            candidate(RuleFamily::BracketNumeric, 2, 5, 8),
            candidate(RuleFamily::AuthorYear, 0, 0, 12),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].family, RuleFamily::AuthorYear);
    }

    #[test]
    fn test_resolve_equal_length_uses_declaration_order() {
        let out = resolve_overlaps(vec![
            candidate(RuleFamily::BareNumeric, 4, 3, 6),
            candidate(RuleFamily::BracketNumeric, 2, 4, 7),
            candidate(RuleFamily::AuthorYear, 1, 2, 5),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].family, RuleFamily::AuthorYear);
    }

    #[test]
    fn test_resolve_keeps_disjoint_and_orders_by_start() {
        let out = resolve_overlaps(vec![
            candidate(RuleFamily::BracketNumeric, 2, 10, 13),
            candidate(RuleFamily::BracketNumeric, 2, 0, 3),
            candidate(RuleFamily::AuthorYear, 0, 3, 10),
        ]);
        let starts: Vec<_> = out.iter().map(|c| c.outer_start).collect();
        assert_eq!(starts, vec![0, 3, 10]);
    }

    #[test]
    fn test_expand_numeric_list_dedups() {
        assert_eq!(expand_numeric_list("2, 2, 3-4, 3", &['-'], 100).unwrap(), vec![2, 3, 4]);
        assert!(expand_numeric_list("2,,3", &['-'], 100).is_err());
    }
}
