use thiserror::Error;

pub mod classifier;
pub mod config;
pub mod extractor;
pub mod linker;
pub mod patterns;
pub mod pipeline;
pub mod section;
pub mod segmenter;
pub mod text_processing;

pub use classifier::StyleClassifier;
pub use config::{ListOverride, ParsingConfig, ParsingConfigBuilder};
pub use extractor::{Extraction, MarkerExtractor};
pub use linker::BibliographyLinker;
pub use patterns::{MarkerPatternLibrary, MarkerRule, RuleFamily, resolve_overlaps};
pub use pipeline::CitationPipeline;
pub use segmenter::SentenceSegmenter;
// Re-export domain types from core (canonical definitions live there)
pub use citemark_core::{
    AnnotatedDocument, BibliographyEntry, CitationStyle, ClassificationResult, Diagnostic,
    DiagnosticKind, Document, LinkingMode, MarkerFields, MarkerOccurrence, Sentence,
};

/// Fatal errors: invalid configuration or a broken call contract.
///
/// Malformed document text is never an error; it surfaces as a
/// [`Diagnostic`] instead.
#[derive(Error, Debug)]
pub enum ParsingError {
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("bibliography linking was required but no bibliography was supplied")]
    MissingBibliography,
    #[error("sentence {index} has invalid span {start}..{end} for text of length {text_len}")]
    InvalidSentenceSpan {
        index: usize,
        start: usize,
        end: usize,
        text_len: usize,
    },
    #[error("marker at {start}..{end} cannot be attributed: no sentences were supplied")]
    NoSentences { start: usize, end: usize },
}

/// Annotate a document with the default configuration.
///
/// Pipeline:
/// 1. Split the reference list off the body (if a header is found)
/// 2. Segment the whole text into sentences
/// 3. Classify the body's dominant citation style
/// 4. Extract markers from the body with that style's rule families
/// 5. Link markers to `bibliography`, or to the parsed reference list
pub fn annotate(
    document: &Document,
    bibliography: Option<&[BibliographyEntry]>,
) -> Result<AnnotatedDocument, ParsingError> {
    CitationPipeline::new().annotate(document, bibliography)
}
