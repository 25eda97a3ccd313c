use citemark_core::{
    AnnotatedDocument, BibliographyEntry, CitationStyle, ClassificationResult, Diagnostic,
    DiagnosticKind, Document, LinkingMode, MarkerOccurrence, Sentence,
};

use crate::ParsingError;
use crate::classifier::{StyleClassifier, classification_diagnostics};
use crate::config::ParsingConfig;
use crate::extractor::{Extraction, MarkerExtractor};
use crate::linker::BibliographyLinker;
use crate::section::{self, ReferencesSection};
use crate::segmenter::SentenceSegmenter;

/// Segmenter, classifier, extractor and linker wired together under one
/// configuration.
///
/// Construct once and reuse across documents; a run holds no state.
#[derive(Debug, Clone)]
pub struct CitationPipeline {
    config: ParsingConfig,
    segmenter: SentenceSegmenter,
    classifier: StyleClassifier,
    extractor: MarkerExtractor,
    linker: BibliographyLinker,
}

impl Default for CitationPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl CitationPipeline {
    pub fn new() -> Self {
        Self::with_config(ParsingConfig::default())
    }

    pub fn with_config(config: ParsingConfig) -> Self {
        Self {
            segmenter: SentenceSegmenter::with_config(&config),
            classifier: StyleClassifier::with_config(&config),
            extractor: MarkerExtractor::with_config(&config),
            linker: BibliographyLinker::with_config(&config),
            config,
        }
    }

    pub fn config(&self) -> &ParsingConfig {
        &self.config
    }

    pub fn segment(&self, text: &str) -> Vec<Sentence> {
        self.segmenter.segment(text)
    }

    pub fn classify(&self, text: &str) -> ClassificationResult {
        self.classifier.classify(text)
    }

    pub fn extract(
        &self,
        text: &str,
        sentences: &[Sentence],
        style: CitationStyle,
    ) -> Result<Extraction, ParsingError> {
        self.extractor.extract(text, sentences, style)
    }

    pub fn link(
        &self,
        occurrences: &mut [MarkerOccurrence],
        bibliography: &[BibliographyEntry],
    ) -> Vec<Diagnostic> {
        self.linker.link(occurrences, bibliography)
    }

    /// The document's reference list, if it has one.
    pub fn references_section(&self, text: &str) -> Option<ReferencesSection> {
        if !self.config.split_references {
            return None;
        }
        section::find_references_section_with_config(text, &self.config)
    }

    /// Bibliography entries parsed from the document's own reference list.
    pub fn references(&self, text: &str) -> Vec<BibliographyEntry> {
        self.references_section(text)
            .map(|s| section::parse_bibliography(s.text(text)))
            .unwrap_or_default()
    }

    /// Run the whole pipeline over one document.
    ///
    /// When `bibliography` is `None` the document's own reference list (if
    /// found) is used for linking. Fails only on broken call contracts:
    /// [`LinkingMode::Required`] with no bibliography from either source.
    pub fn annotate(
        &self,
        document: &Document,
        bibliography: Option<&[BibliographyEntry]>,
    ) -> Result<AnnotatedDocument, ParsingError> {
        let text = document.text.as_str();
        let span = tracing::debug_span!("annotate", source = ?document.source_id, bytes = text.len());
        let _guard = span.enter();

        if text.trim().is_empty() {
            if self.config.linking == LinkingMode::Required && bibliography.is_none() {
                return Err(ParsingError::MissingBibliography);
            }
            return Ok(AnnotatedDocument {
                source_id: document.source_id.clone(),
                classification: ClassificationResult::unknown(0),
                sentences: Vec::new(),
                occurrences: Vec::new(),
                diagnostics: vec![Diagnostic::new(
                    DiagnosticKind::EmptyInput,
                    "document text is empty",
                )],
            });
        }

        let references = self.references_section(text);
        let body_end = references.map_or(text.len(), |s| s.header_start);

        let parsed_bibliography;
        let bibliography = match (self.config.linking, bibliography) {
            (LinkingMode::Off, _) => None,
            (_, Some(bib)) => Some(bib),
            (mode, None) => {
                parsed_bibliography = references
                    .map(|s| section::parse_bibliography(s.text(text)))
                    .unwrap_or_default();
                if !parsed_bibliography.is_empty() {
                    Some(parsed_bibliography.as_slice())
                } else if mode == LinkingMode::Required {
                    return Err(ParsingError::MissingBibliography);
                } else {
                    None
                }
            }
        };

        let sentences = self.segmenter.segment(text);
        let mut diagnostics = Vec::new();

        let mut classification = self.classifier.classify(&text[..body_end]);
        match self.config.forced_style {
            Some(style) => {
                tracing::debug!(style = %style, detected = %classification.style, "style forced");
                classification.style = style;
                classification.confidence = 1.0;
            }
            None => diagnostics.extend(classification_diagnostics(&classification)),
        }

        let Extraction {
            mut occurrences,
            diagnostics: extraction_diagnostics,
        } = self
            .extractor
            .extract_in(text, body_end, &sentences, classification.style)?;
        diagnostics.extend(extraction_diagnostics);

        if classification.style == CitationStyle::Unknown && !occurrences.is_empty() {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::LowConfidence,
                format!(
                    "{} markers found by a best-effort pass over a document with no dominant style",
                    occurrences.len()
                ),
            ));
        }

        if let Some(bib) = bibliography {
            diagnostics.extend(self.linker.link(&mut occurrences, bib));
        }

        tracing::info!(
            style = %classification.style,
            sentences = sentences.len(),
            occurrences = occurrences.len(),
            diagnostics = diagnostics.len(),
            "annotated document"
        );

        Ok(AnnotatedDocument {
            source_id: document.source_id.clone(),
            classification,
            sentences,
            occurrences,
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParsingConfigBuilder;

    #[test]
    fn test_empty_document() {
        let doc = CitationPipeline::new().annotate(&Document::new(""), None).unwrap();
        assert!(doc.sentences.is_empty());
        assert!(doc.occurrences.is_empty());
        assert_eq!(doc.classification.style, CitationStyle::Unknown);
        assert_eq!(doc.diagnostics[0].kind, DiagnosticKind::EmptyInput);
    }

    #[test]
    fn test_required_linking_without_bibliography() {
        let config = ParsingConfigBuilder::new()
            .linking(LinkingMode::Required)
            .build()
            .unwrap();
        let err = CitationPipeline::with_config(config)
            .annotate(&Document::new("Shown in [1]."), None)
            .unwrap_err();
        assert!(matches!(err, ParsingError::MissingBibliography));
    }

    #[test]
    fn test_required_linking_uses_reference_list() {
        let config = ParsingConfigBuilder::new()
            .linking(LinkingMode::Required)
            .build()
            .unwrap();
        let text = "Shown in [1] and [2]. Also [3].\n\nReferences\n[1] A. One.\n[2] B. Two.\n[3] C. Three.\n";
        let doc = CitationPipeline::with_config(config)
            .annotate(&Document::new(text), None)
            .unwrap();
        assert_eq!(doc.occurrences.len(), 3);
        assert_eq!(doc.linked_count(), 3);
    }

    #[test]
    fn test_reference_list_is_not_scanned() {
        let text = "Prior work [1] and [2] matters.\n\nReferences\n[1] A. One, 2019.\n[2] B. Two, 2020.\n[3] C. Three (Smith, 2020).\n";
        let doc = CitationPipeline::new().annotate(&Document::new(text), None).unwrap();
        assert_eq!(doc.classification.style, CitationStyle::Ieee);
        assert_eq!(doc.occurrences.len(), 2);
        // Sentences still cover the whole text
        assert!(doc.sentences.last().unwrap().end_offset > text.find("References").unwrap());
    }

    #[test]
    fn test_references_follow_split_setting() {
        let text = "Shown in [1].\n\nReferences\n[1] A. One.\n[2] B. Two.\n";
        assert_eq!(CitationPipeline::new().references(text).len(), 2);

        let config = ParsingConfigBuilder::new().split_references(false).build().unwrap();
        let pipeline = CitationPipeline::with_config(config);
        assert!(pipeline.references_section(text).is_none());
        assert!(pipeline.references(text).is_empty());
    }

    #[test]
    fn test_linking_off() {
        let config = ParsingConfigBuilder::new().linking(LinkingMode::Off).build().unwrap();
        let bib = vec![BibliographyEntry::new("1", "A. One.")];
        let doc = CitationPipeline::with_config(config)
            .annotate(&Document::new("Shown in [1] and [2]."), Some(bib.as_slice()))
            .unwrap();
        assert_eq!(doc.linked_count(), 0);
        assert_eq!(doc.diagnostics_of(DiagnosticKind::UnresolvedReference).count(), 0);
    }

    #[test]
    fn test_forced_style() {
        let config = ParsingConfigBuilder::new()
            .forced_style(CitationStyle::Apa)
            .build()
            .unwrap();
        let doc = CitationPipeline::with_config(config)
            .annotate(&Document::new("Shown in [1] by Smith (2020)."), None)
            .unwrap();
        assert_eq!(doc.classification.style, CitationStyle::Apa);
        assert_eq!(doc.occurrences.len(), 1);
        assert_eq!(doc.occurrences[0].style, CitationStyle::Apa);
    }

    #[test]
    fn test_unknown_style_reports_low_confidence() {
        let mut text = String::from("A single marker [1] in a long text.");
        text.push_str(&" word".repeat(2000));
        let doc = CitationPipeline::new().annotate(&Document::new(text), None).unwrap();
        assert_eq!(doc.classification.style, CitationStyle::Unknown);
        assert_eq!(doc.occurrences.len(), 1);
        assert_eq!(doc.diagnostics_of(DiagnosticKind::UnknownStyle).count(), 1);
        assert_eq!(doc.diagnostics_of(DiagnosticKind::LowConfidence).count(), 1);
    }

    #[test]
    fn test_source_id_is_carried() {
        let doc = CitationPipeline::new()
            .annotate(&Document::new("Text [1].").with_source_id("paper-7"), None)
            .unwrap();
        assert_eq!(doc.source_id.as_deref(), Some("paper-7"));
    }
}
