use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod config_file;
pub mod matching;

// Re-export for convenience
pub use config_file::{ConfigError, ConfigFile};
pub use matching::{fold_name, normalize_tokens};

/// The bibliographic convention a marker (or a whole document) follows.
///
/// `Apa`, `Ieee` and `Numbered` are the concrete rule-family styles. `Mixed`
/// and `Unknown` only ever appear as a document-level classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CitationStyle {
    Apa,
    Ieee,
    Numbered,
    Mixed,
    Unknown,
}

impl CitationStyle {
    /// The styles that own a rule family, in declaration order.
    pub const CONCRETE: [CitationStyle; 3] =
        [CitationStyle::Apa, CitationStyle::Ieee, CitationStyle::Numbered];

    pub fn as_str(&self) -> &'static str {
        match self {
            CitationStyle::Apa => "APA",
            CitationStyle::Ieee => "IEEE",
            CitationStyle::Numbered => "NUMBERED",
            CitationStyle::Mixed => "MIXED",
            CitationStyle::Unknown => "UNKNOWN",
        }
    }

    /// Whether this style owns a rule family (as opposed to MIXED/UNKNOWN).
    pub fn is_concrete(&self) -> bool {
        matches!(
            self,
            CitationStyle::Apa | CitationStyle::Ieee | CitationStyle::Numbered
        )
    }
}

impl fmt::Display for CitationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown citation style: {0:?}")]
pub struct ParseStyleError(pub String);

impl FromStr for CitationStyle {
    type Err = ParseStyleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apa" | "author-year" | "author_year" => Ok(CitationStyle::Apa),
            "ieee" | "bracket" => Ok(CitationStyle::Ieee),
            "numbered" | "superscript" => Ok(CitationStyle::Numbered),
            "mixed" => Ok(CitationStyle::Mixed),
            "unknown" => Ok(CitationStyle::Unknown),
            _ => Err(ParseStyleError(s.to_string())),
        }
    }
}

/// Raw document text plus an optional identifier of where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub source_id: Option<String>,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_id: None,
        }
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }
}

/// One sentence of the document, in reading order.
///
/// Offsets are UTF-8 byte offsets into the document text; `end_offset` is
/// exclusive and `text` is exactly `document[start_offset..end_offset]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
}

impl Sentence {
    pub fn len(&self) -> usize {
        self.end_offset - self.start_offset
    }

    pub fn is_empty(&self) -> bool {
        self.start_offset == self.end_offset
    }

    /// Whether `offset` falls in `[start_offset, end_offset)`.
    pub fn contains(&self, offset: usize) -> bool {
        self.start_offset <= offset && offset < self.end_offset
    }
}

/// Structured fields pulled out of a single citation marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarkerFields {
    /// `(Smith & Jones, 2020a, p. 5)` or `Smith (2020)`.
    AuthorYear {
        authors: Vec<String>,
        /// `None` for "n.d." and "in press" citations.
        year: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        year_suffix: Option<char>,
        locator: Option<String>,
    },
    /// `[3]`, `[2, 4-6]`, superscript `³`. Ranges are expanded.
    Numeric { numeric_keys: Vec<u32> },
}

impl MarkerFields {
    /// Surname of the first author, if this is an author-year marker.
    pub fn first_author(&self) -> Option<&str> {
        match self {
            MarkerFields::AuthorYear { authors, .. } => authors.first().map(String::as_str),
            MarkerFields::Numeric { .. } => None,
        }
    }

    pub fn numeric_keys(&self) -> &[u32] {
        match self {
            MarkerFields::Numeric { numeric_keys } => numeric_keys,
            MarkerFields::AuthorYear { .. } => &[],
        }
    }
}

/// A citation marker located in the document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerOccurrence {
    pub raw_text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    /// Span of the enclosing parenthetical or bracket. Equal to the
    /// occurrence span unless several citations share one parenthetical.
    pub outer_start: usize,
    pub outer_end: usize,
    pub style: CitationStyle,
    /// Name of the pattern rule that produced this occurrence.
    pub rule: String,
    pub fields: MarkerFields,
    pub sentence_index: usize,
    pub bib_key: Option<String>,
    /// All resolved bibliography keys (several for `[2,3]`); `bib_key` is the first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bib_keys: Vec<String>,
}

/// Outcome of classifying a document's dominant citation style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub style: CitationStyle,
    /// In `[0, 1]`; always 0 for `Unknown`.
    pub confidence: f64,
    /// Weighted markers per 1000 words, per concrete style.
    pub per_style_scores: BTreeMap<CitationStyle, f64>,
    /// Unweighted marker counts, per concrete style.
    #[serde(default)]
    pub marker_counts: BTreeMap<CitationStyle, usize>,
    #[serde(default)]
    pub word_count: usize,
}

impl ClassificationResult {
    /// An `Unknown` result with zero confidence and zeroed scores.
    pub fn unknown(word_count: usize) -> Self {
        Self {
            style: CitationStyle::Unknown,
            confidence: 0.0,
            per_style_scores: CitationStyle::CONCRETE.iter().map(|s| (*s, 0.0)).collect(),
            marker_counts: CitationStyle::CONCRETE.iter().map(|s| (*s, 0)).collect(),
            word_count,
        }
    }

    pub fn score(&self, style: CitationStyle) -> f64 {
        self.per_style_scores.get(&style).copied().unwrap_or(0.0)
    }

    /// True when no single style could be committed to.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self.style, CitationStyle::Mixed | CitationStyle::Unknown)
    }
}

/// A reference-list entry supplied by the bibliography-parsing step.
///
/// `key` is either the numeric index as a string (`"3"`) or `"Author:Year"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibliographyEntry {
    pub key: String,
    pub raw_text: String,
}

impl BibliographyEntry {
    pub fn new(key: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            raw_text: raw_text.into(),
        }
    }
}

/// Whether (and how insistently) markers are linked to a bibliography.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkingMode {
    /// Never link, even when a bibliography is supplied.
    Off,
    /// Link when a bibliography is supplied; otherwise skip silently.
    #[default]
    IfAvailable,
    /// Linking was explicitly requested: a missing bibliography is an error.
    Required,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown linking mode: {0:?} (expected off, if_available or required)")]
pub struct ParseLinkingModeError(pub String);

impl FromStr for LinkingMode {
    type Err = ParseLinkingModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "off" => Ok(LinkingMode::Off),
            "if_available" | "auto" => Ok(LinkingMode::IfAvailable),
            "required" => Ok(LinkingMode::Required),
            _ => Err(ParseLinkingModeError(s.to_string())),
        }
    }
}

/// Kind of a non-fatal condition noticed while processing a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    EmptyInput,
    AmbiguousStyle,
    UnknownStyle,
    LowConfidence,
    MalformedMarker,
    UnresolvedReference,
    AmbiguousReference,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::EmptyInput => "empty input",
            DiagnosticKind::AmbiguousStyle => "ambiguous style",
            DiagnosticKind::UnknownStyle => "unknown style",
            DiagnosticKind::LowConfidence => "low confidence",
            DiagnosticKind::MalformedMarker => "malformed marker",
            DiagnosticKind::UnresolvedReference => "unresolved reference",
            DiagnosticKind::AmbiguousReference => "ambiguous reference",
        };
        f.write_str(s)
    }
}

/// A non-fatal condition, returned alongside the primary results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_offset: Option<usize>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            start_offset: None,
            end_offset: None,
        }
    }

    /// A diagnostic pinned to a byte range of the document.
    pub fn at(kind: DiagnosticKind, message: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            kind,
            message: message.into(),
            start_offset: Some(start),
            end_offset: Some(end),
        }
    }
}

/// Everything the pipeline produces for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub classification: ClassificationResult,
    pub sentences: Vec<Sentence>,
    pub occurrences: Vec<MarkerOccurrence>,
    pub diagnostics: Vec<Diagnostic>,
}

impl AnnotatedDocument {
    /// Occurrences attributed to the sentence at `index`.
    pub fn occurrences_in_sentence(&self, index: usize) -> impl Iterator<Item = &MarkerOccurrence> {
        self.occurrences
            .iter()
            .filter(move |o| o.sentence_index == index)
    }

    pub fn linked_count(&self) -> usize {
        self.occurrences.iter().filter(|o| o.bib_key.is_some()).count()
    }

    pub fn diagnostics_of(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }
}
