use std::collections::{BTreeSet, HashSet};

use citemark_core::{CitationStyle, Diagnostic, MarkerOccurrence, Sentence};

use crate::ParsingError;
use crate::config::ParsingConfig;
use crate::patterns::{MarkerPatternLibrary, RuleFamily, ScanContext, resolve_overlaps};

/// Occurrences plus the non-fatal diagnostics raised while finding them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub occurrences: Vec<MarkerOccurrence>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Applies the rule families of a resolved style and attributes each
/// citation to its sentence.
#[derive(Debug, Clone, Default)]
pub struct MarkerExtractor {
    config: ParsingConfig,
}

impl MarkerExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &ParsingConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Rule families run for a resolved style, restricted to enabled styles.
    pub fn families_for(&self, style: CitationStyle) -> Vec<RuleFamily> {
        let families: &[RuleFamily] = match style {
            CitationStyle::Apa => &[RuleFamily::AuthorYear],
            CitationStyle::Ieee => &[RuleFamily::BracketNumeric],
            CitationStyle::Numbered => &[RuleFamily::BracketNumeric, RuleFamily::BareNumeric],
            CitationStyle::Mixed | CitationStyle::Unknown => {
                &[RuleFamily::AuthorYear, RuleFamily::BracketNumeric]
            }
        };
        families
            .iter()
            .copied()
            .filter(|f| self.config.is_enabled(f.style()))
            .collect()
    }

    /// Extract markers from the whole of `text`.
    pub fn extract(
        &self,
        text: &str,
        sentences: &[Sentence],
        style: CitationStyle,
    ) -> Result<Extraction, ParsingError> {
        self.extract_in(text, text.len(), sentences, style)
    }

    /// Extract markers from `text[..scan_end]`; sentences may cover all of `text`.
    pub fn extract_in(
        &self,
        text: &str,
        scan_end: usize,
        sentences: &[Sentence],
        style: CitationStyle,
    ) -> Result<Extraction, ParsingError> {
        validate_sentences(text, sentences)?;
        let scan_end = floor_char_boundary(text, scan_end.min(text.len()));

        let families = self.families_for(style);
        let scan = MarkerPatternLibrary::shared().scan(
            text,
            scan_end,
            &families,
            &ScanContext::from(&self.config),
        );

        let mut occurrences = Vec::new();
        let mut seen = HashSet::new();
        for candidate in resolve_overlaps(scan.candidates) {
            for part in &candidate.parts {
                if !seen.insert((part.start, part.end, candidate.style())) {
                    continue;
                }
                if sentences.is_empty() {
                    return Err(ParsingError::NoSentences {
                        start: part.start,
                        end: part.end,
                    });
                }
                occurrences.push(MarkerOccurrence {
                    raw_text: text[part.start..part.end].to_string(),
                    start_offset: part.start,
                    end_offset: part.end,
                    outer_start: candidate.outer_start,
                    outer_end: candidate.outer_end,
                    style: candidate.style(),
                    rule: candidate.rule.to_string(),
                    fields: part.fields.clone(),
                    sentence_index: owning_sentence(sentences, part.start),
                    bib_key: None,
                    bib_keys: Vec::new(),
                });
            }
        }

        if families.contains(&RuleFamily::BareNumeric) {
            drop_bare_beside_brackets(&mut occurrences);
        }

        occurrences.sort_by_key(|o| (o.start_offset, o.end_offset));

        tracing::debug!(
            style = %style,
            occurrences = occurrences.len(),
            diagnostics = scan.diagnostics.len(),
            "extracted citation markers"
        );

        Ok(Extraction {
            occurrences,
            diagnostics: scan.diagnostics,
        })
    }
}

/// Bare numbers are a fallback: a sentence with a bracket marker keeps only that.
fn drop_bare_beside_brackets(occurrences: &mut Vec<MarkerOccurrence>) {
    let bracketed: BTreeSet<usize> = occurrences
        .iter()
        .filter(|o| o.style == CitationStyle::Ieee)
        .map(|o| o.sentence_index)
        .collect();
    occurrences.retain(|o| {
        o.style != CitationStyle::Numbered || !bracketed.contains(&o.sentence_index)
    });
}

/// Index of the sentence containing `pos`, or the nearest preceding one.
fn owning_sentence(sentences: &[Sentence], pos: usize) -> usize {
    let after = sentences.partition_point(|s| s.start_offset <= pos);
    sentences[after.saturating_sub(1)].index
}

fn validate_sentences(text: &str, sentences: &[Sentence]) -> Result<(), ParsingError> {
    let mut previous_start = 0;
    for (i, s) in sentences.iter().enumerate() {
        let valid = s.start_offset <= s.end_offset
            && s.end_offset <= text.len()
            && s.start_offset >= previous_start
            && text.is_char_boundary(s.start_offset)
            && text.is_char_boundary(s.end_offset);
        if !valid {
            return Err(ParsingError::InvalidSentenceSpan {
                index: i,
                start: s.start_offset,
                end: s.end_offset,
                text_len: text.len(),
            });
        }
        previous_start = s.start_offset;
    }
    Ok(())
}

fn floor_char_boundary(text: &str, mut pos: usize) -> usize {
    while !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SentenceSegmenter;
    use citemark_core::{DiagnosticKind, MarkerFields};

    fn run(text: &str, style: CitationStyle) -> Extraction {
        let sentences = SentenceSegmenter::new().segment(text);
        MarkerExtractor::new().extract(text, &sentences, style).unwrap()
    }

    #[test]
    fn test_bracket_keys() {
        let ex = run("One [3]. Two [3,5]. Three [3-5].", CitationStyle::Ieee);
        let keys: Vec<&[u32]> = ex.occurrences.iter().map(|o| o.fields.numeric_keys()).collect();
        assert_eq!(keys, vec![&[3][..], &[3, 5][..], &[3, 4, 5][..]]);
        let sentences: Vec<usize> = ex.occurrences.iter().map(|o| o.sentence_index).collect();
        assert_eq!(sentences, vec![0, 1, 2]);
        assert_eq!(ex.occurrences[2].raw_text, "[3-5]");
    }

    #[test]
    fn test_parenthetical_one_and_two() {
        let ex = run("First (Smith, 2020). Then (Smith, 2020; Jones, 2019).", CitationStyle::Apa);
        assert_eq!(ex.occurrences.len(), 3);
        assert_eq!(ex.occurrences[0].sentence_index, 0);
        assert_eq!(ex.occurrences[1].sentence_index, 1);
        assert_eq!(ex.occurrences[2].sentence_index, 1);
        assert_eq!(ex.occurrences[1].outer_start, ex.occurrences[2].outer_start);
        assert_eq!(ex.occurrences[1].raw_text, "Smith, 2020");
        assert_eq!(
            ex.occurrences[2].fields,
            MarkerFields::AuthorYear {
                authors: vec!["Jones".to_string()],
                year: Some(2019),
                year_suffix: None,
                locator: None,
            }
        );
    }

    #[test]
    fn test_style_selects_families() {
        let text = "See [1] and (Smith, 2020).";
        assert_eq!(run(text, CitationStyle::Ieee).occurrences.len(), 1);
        assert_eq!(run(text, CitationStyle::Apa).occurrences.len(), 1);
        assert_eq!(run(text, CitationStyle::Mixed).occurrences.len(), 2);
        assert_eq!(run(text, CitationStyle::Unknown).occurrences.len(), 2);
    }

    #[test]
    fn test_bare_numeric_only_for_numbered() {
        let text = "This disease,3,4 spreads fast.";
        assert!(run(text, CitationStyle::Mixed).occurrences.is_empty());
        let ex = run(text, CitationStyle::Numbered);
        assert_eq!(ex.occurrences.len(), 1);
        assert_eq!(ex.occurrences[0].fields.numeric_keys(), &[3, 4]);
        assert_eq!(ex.occurrences[0].style, CitationStyle::Numbered);
    }

    #[test]
    fn test_bare_numeric_dropped_beside_bracket() {
        let text = "This disease,3 spreads [4]. Another finding,5 here.";
        let ex = run(text, CitationStyle::Numbered);
        let raw: Vec<&str> = ex.occurrences.iter().map(|o| o.raw_text.as_str()).collect();
        assert_eq!(raw, vec!["[4]", "5"]);
    }

    #[test]
    fn test_unbalanced_bracket() {
        let ex = run("see [3 for details", CitationStyle::Ieee);
        assert!(ex.occurrences.is_empty());
        assert!(ex.diagnostics.is_empty());
    }

    #[test]
    fn test_malformed_reported() {
        let ex = run("Bad range [7-2] here.", CitationStyle::Ieee);
        assert!(ex.occurrences.is_empty());
        assert_eq!(ex.diagnostics[0].kind, DiagnosticKind::MalformedMarker);
    }

    #[test]
    fn test_marker_in_gap_goes_to_preceding_sentence() {
        let text = "First. [2] Second.";
        let sentences = vec![
            Sentence {
                index: 0,
                start_offset: 0,
                end_offset: 6,
                text: "First.".to_string(),
            },
            Sentence {
                index: 1,
                start_offset: 11,
                end_offset: 18,
                text: "Second.".to_string(),
            },
        ];
        let ex = MarkerExtractor::new()
            .extract(text, &sentences, CitationStyle::Ieee)
            .unwrap();
        assert_eq!(ex.occurrences[0].sentence_index, 0);
    }

    #[test]
    fn test_marker_before_first_sentence() {
        let text = "[1] Body.";
        let sentences = vec![Sentence {
            index: 0,
            start_offset: 4,
            end_offset: 9,
            text: "Body.".to_string(),
        }];
        let ex = MarkerExtractor::new()
            .extract(text, &sentences, CitationStyle::Ieee)
            .unwrap();
        assert_eq!(ex.occurrences[0].sentence_index, 0);
    }

    #[test]
    fn test_invalid_sentence_span() {
        let sentences = vec![Sentence {
            index: 0,
            start_offset: 0,
            end_offset: 99,
            text: String::new(),
        }];
        let err = MarkerExtractor::new()
            .extract("short [1]", &sentences, CitationStyle::Ieee)
            .unwrap_err();
        assert!(matches!(err, ParsingError::InvalidSentenceSpan { index: 0, end: 99, .. }));
    }

    #[test]
    fn test_markers_without_sentences() {
        let err = MarkerExtractor::new()
            .extract("short [1]", &[], CitationStyle::Ieee)
            .unwrap_err();
        assert!(matches!(err, ParsingError::NoSentences { start: 6, end: 9 }));
        // No markers, no sentences: nothing to attribute
        assert!(MarkerExtractor::new().extract("plain", &[], CitationStyle::Ieee).is_ok());
    }

    #[test]
    fn test_scan_end() {
        let text = "Body [1].\nReferences\n[1] A. Author. Title.";
        let sentences = SentenceSegmenter::new().segment(text);
        let ex = MarkerExtractor::new()
            .extract_in(text, 9, &sentences, CitationStyle::Ieee)
            .unwrap();
        assert_eq!(ex.occurrences.len(), 1);
    }

    #[test]
    fn test_ordering_and_idempotence() {
        let text = "A (Smith, 2019; Lee, 2018) and [2] then Jones (2017) with [1, 4].";
        let a = run(text, CitationStyle::Mixed);
        let b = run(text, CitationStyle::Mixed);
        assert_eq!(a, b);
        assert!(a.occurrences.windows(2).all(|w| w[0].start_offset <= w[1].start_offset));
        assert_eq!(a.occurrences.len(), 5);
    }
}
