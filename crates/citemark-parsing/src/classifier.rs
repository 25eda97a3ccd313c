use std::collections::BTreeMap;

use citemark_core::{CitationStyle, ClassificationResult, Diagnostic, DiagnosticKind};

use crate::config::ParsingConfig;
use crate::patterns::{MarkerPatternLibrary, RuleFamily, ScanContext, resolve_overlaps};

/// Decides which citation style a document predominantly uses.
///
/// Every enabled rule family is run over the text, overlaps are resolved,
/// and the surviving citations are counted per style. Counts are turned
/// into densities (markers per 1000 words) so short and long documents
/// are judged on the same scale.
#[derive(Debug, Clone, Default)]
pub struct StyleClassifier {
    config: ParsingConfig,
}

impl StyleClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &ParsingConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn classify(&self, text: &str) -> ClassificationResult {
        let word_count = text.split_whitespace().count();
        if word_count == 0 {
            return ClassificationResult::unknown(0);
        }

        let families: Vec<RuleFamily> = RuleFamily::ALL
            .into_iter()
            .filter(|f| self.config.is_enabled(f.style()))
            .collect();

        let scan = MarkerPatternLibrary::shared().scan(
            text,
            text.len(),
            &families,
            &ScanContext::from(&self.config),
        );

        let mut marker_counts: BTreeMap<CitationStyle, usize> =
            families.iter().map(|f| (f.style(), 0)).collect();
        for candidate in resolve_overlaps(scan.candidates) {
            *marker_counts.entry(candidate.style()).or_default() += candidate.parts.len();
        }

        let per_style_scores: BTreeMap<CitationStyle, f64> = marker_counts
            .iter()
            .map(|(&style, &count)| {
                let weight = if style == CitationStyle::Numbered {
                    self.config.bare_numeric_weight
                } else {
                    1.0
                };
                (style, count as f64 * weight * 1000.0 / word_count as f64)
            })
            .collect();

        let (style, confidence) = self.decide(&per_style_scores);

        tracing::debug!(
            style = %style,
            confidence,
            words = word_count,
            ?marker_counts,
            "classified citation style"
        );

        ClassificationResult {
            style,
            confidence,
            per_style_scores,
            marker_counts,
            word_count,
        }
    }

    /// Pick the dominant style from per-style densities.
    fn decide(&self, scores: &BTreeMap<CitationStyle, f64>) -> (CitationStyle, f64) {
        // Highest first; BTreeMap order (APA, IEEE, NUMBERED) breaks ties
        let mut ranked: Vec<(CitationStyle, f64)> = scores.iter().map(|(&s, &v)| (s, v)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let presence = self.config.min_style_presence;
        let Some(&(top_style, top)) = ranked.first() else {
            return (CitationStyle::Unknown, 0.0);
        };
        if top < presence || top <= 0.0 {
            return (CitationStyle::Unknown, 0.0);
        }

        let total: f64 = ranked.iter().map(|(_, v)| v).sum();
        if let Some(&(_, second)) = ranked.get(1)
            && second >= presence
            && second > 0.0
            && top - second < self.config.mixed_margin * top
        {
            return (CitationStyle::Mixed, ((top + second) / total).clamp(0.0, 1.0));
        }

        (top_style, (top / total).clamp(0.0, 1.0))
    }
}

/// Non-fatal signals a classification carries.
pub fn classification_diagnostics(result: &ClassificationResult) -> Vec<Diagnostic> {
    match result.style {
        CitationStyle::Mixed => {
            let styles: Vec<String> = result
                .per_style_scores
                .iter()
                .filter(|(_, v)| **v > 0.0)
                .map(|(s, v)| format!("{}={:.1}", s, v))
                .collect();
            vec![Diagnostic::new(
                DiagnosticKind::AmbiguousStyle,
                format!("no single dominant citation style ({})", styles.join(", ")),
            )]
        }
        CitationStyle::Unknown if result.word_count > 0 => vec![Diagnostic::new(
            DiagnosticKind::UnknownStyle,
            "no citation style reached the minimum presence threshold".to_string(),
        )],
        _ => Vec::new(),
    }
}
