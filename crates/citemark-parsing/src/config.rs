use std::collections::BTreeSet;

use regex::Regex;

use citemark_core::config_file::ConfigFile;
use citemark_core::{CitationStyle, LinkingMode};

use crate::ParsingError;

/// Controls how a list of values is overridden from its defaults.
#[derive(Debug, Clone, Default)]
pub enum ListOverride<T> {
    /// Use the built-in defaults.
    #[default]
    Default,
    /// Completely replace the defaults with these values.
    Replace(Vec<T>),
    /// Append these values to the defaults.
    Extend(Vec<T>),
}

impl<T: Clone> ListOverride<T> {
    /// Resolve this override against the given defaults.
    pub fn resolve(&self, defaults: &[T]) -> Vec<T> {
        match self {
            ListOverride::Default => defaults.to_vec(),
            ListOverride::Replace(v) => v.clone(),
            ListOverride::Extend(v) => {
                let mut result = defaults.to_vec();
                result.extend(v.iter().cloned());
                result
            }
        }
    }
}

/// Configuration for the marker extraction pipeline.
///
/// Use [`ParsingConfigBuilder`] to construct with validation.
#[derive(Debug, Clone)]
pub struct ParsingConfig {
    // ── classifier.rs ──
    /// Top-two scores closer than this fraction of the winner's score → MIXED.
    pub(crate) mixed_margin: f64,
    /// Minimum markers per 1000 words for a style to count as present.
    pub(crate) min_style_presence: f64,
    /// Multiplier applied to bare-numeric counts, which are noisy.
    pub(crate) bare_numeric_weight: f64,
    /// Styles whose rule families may run at all.
    pub(crate) enabled_styles: BTreeSet<CitationStyle>,
    /// Skip classification and extract with this style.
    pub(crate) forced_style: Option<CitationStyle>,

    // ── patterns.rs ──
    /// Longest numeric range (`[1-100]`) that is expanded; longer is malformed.
    pub(crate) max_range_expansion: u32,

    // ── segmenter.rs ──
    /// Words whose trailing period never ends a sentence (lowercase, no dot).
    pub(crate) abbreviations: ListOverride<String>,

    // ── linker.rs ──
    /// Minimum author/year overlap for an author-year marker to link.
    pub(crate) min_bib_overlap: f64,
    /// Fuzzy ratio at which two surnames are considered equal.
    pub(crate) surname_similarity: f64,
    pub(crate) linking: LinkingMode,

    // ── section.rs ──
    /// Keep the reference list out of marker extraction.
    pub(crate) split_references: bool,
    pub(crate) section_header_re: Option<Regex>,
    pub(crate) section_end_re: Option<Regex>,

    // ── text_processing.rs ──
    /// Compound-word suffixes that should preserve the hyphen.
    pub(crate) compound_suffixes: ListOverride<String>,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            mixed_margin: 0.15,
            min_style_presence: 1.0,
            bare_numeric_weight: 0.5,
            enabled_styles: CitationStyle::CONCRETE.into_iter().collect(),
            forced_style: None,
            max_range_expansion: 100,
            abbreviations: ListOverride::Default,
            min_bib_overlap: 0.6,
            surname_similarity: 0.9,
            linking: LinkingMode::IfAvailable,
            split_references: true,
            section_header_re: None,
            section_end_re: None,
            compound_suffixes: ListOverride::Default,
        }
    }
}

impl ParsingConfig {
    pub fn mixed_margin(&self) -> f64 {
        self.mixed_margin
    }

    pub fn min_style_presence(&self) -> f64 {
        self.min_style_presence
    }

    pub fn min_bib_overlap(&self) -> f64 {
        self.min_bib_overlap
    }

    pub fn linking(&self) -> LinkingMode {
        self.linking
    }

    pub fn enabled_styles(&self) -> &BTreeSet<CitationStyle> {
        &self.enabled_styles
    }

    pub fn is_enabled(&self, style: CitationStyle) -> bool {
        self.enabled_styles.contains(&style)
    }

    pub fn forced_style(&self) -> Option<CitationStyle> {
        self.forced_style
    }
}

/// Builder for [`ParsingConfig`].
///
/// String patterns are compiled in [`build()`](Self::build), which also
/// range-checks the numeric thresholds.
#[derive(Debug, Clone, Default)]
pub struct ParsingConfigBuilder {
    mixed_margin: Option<f64>,
    min_style_presence: Option<f64>,
    bare_numeric_weight: Option<f64>,
    enabled_styles: Option<BTreeSet<CitationStyle>>,
    forced_style: Option<CitationStyle>,
    max_range_expansion: Option<u32>,
    abbreviations: ListOverride<String>,
    min_bib_overlap: Option<f64>,
    surname_similarity: Option<f64>,
    linking: Option<LinkingMode>,
    split_references: Option<bool>,
    section_header_re: Option<String>,
    section_end_re: Option<String>,
    compound_suffixes: ListOverride<String>,
}

impl ParsingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a builder from an on-disk config; builder calls made afterwards win.
    pub fn from_config_file(file: &ConfigFile) -> Self {
        let mut builder = Self::new();
        if let Some(c) = &file.classifier {
            builder.mixed_margin = c.mixed_margin;
            builder.min_style_presence = c.min_style_presence;
            builder.bare_numeric_weight = c.bare_numeric_weight;
        }
        if let Some(e) = &file.extraction {
            builder.enabled_styles = e
                .enabled_styles
                .as_ref()
                .map(|styles| styles.iter().copied().collect());
            builder.max_range_expansion = e.max_range_expansion;
            builder.split_references = e.split_references;
        }
        if let Some(s) = &file.segmenter
            && let Some(extra) = &s.extra_abbreviations
        {
            builder.abbreviations = ListOverride::Extend(extra.clone());
        }
        if let Some(l) = &file.linker {
            builder.min_bib_overlap = l.min_bib_overlap;
            builder.linking = l.mode;
        }
        builder
    }

    // ── Classifier ──

    pub fn mixed_margin(mut self, margin: f64) -> Self {
        self.mixed_margin = Some(margin);
        self
    }

    pub fn min_style_presence(mut self, presence: f64) -> Self {
        self.min_style_presence = Some(presence);
        self
    }

    pub fn bare_numeric_weight(mut self, weight: f64) -> Self {
        self.bare_numeric_weight = Some(weight);
        self
    }

    pub fn enabled_styles(mut self, styles: impl IntoIterator<Item = CitationStyle>) -> Self {
        self.enabled_styles = Some(styles.into_iter().collect());
        self
    }

    pub fn forced_style(mut self, style: CitationStyle) -> Self {
        self.forced_style = Some(style);
        self
    }

    // ── Patterns ──

    pub fn max_range_expansion(mut self, n: u32) -> Self {
        self.max_range_expansion = Some(n);
        self
    }

    // ── Abbreviations ──

    pub fn set_abbreviations(mut self, abbreviations: Vec<String>) -> Self {
        self.abbreviations = ListOverride::Replace(abbreviations);
        self
    }

    pub fn add_abbreviation(mut self, abbreviation: String) -> Self {
        match &mut self.abbreviations {
            ListOverride::Extend(v) | ListOverride::Replace(v) => v.push(abbreviation),
            ListOverride::Default => self.abbreviations = ListOverride::Extend(vec![abbreviation]),
        }
        self
    }

    // ── Linker ──

    pub fn min_bib_overlap(mut self, overlap: f64) -> Self {
        self.min_bib_overlap = Some(overlap);
        self
    }

    pub fn surname_similarity(mut self, ratio: f64) -> Self {
        self.surname_similarity = Some(ratio);
        self
    }

    pub fn linking(mut self, mode: LinkingMode) -> Self {
        self.linking = Some(mode);
        self
    }

    // ── Reference section ──

    pub fn split_references(mut self, split: bool) -> Self {
        self.split_references = Some(split);
        self
    }

    pub fn section_header_regex(mut self, pattern: &str) -> Self {
        self.section_header_re = Some(pattern.to_string());
        self
    }

    pub fn section_end_regex(mut self, pattern: &str) -> Self {
        self.section_end_re = Some(pattern.to_string());
        self
    }

    // ── Compound suffixes ──

    pub fn set_compound_suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.compound_suffixes = ListOverride::Replace(suffixes);
        self
    }

    pub fn add_compound_suffix(mut self, suffix: String) -> Self {
        match &mut self.compound_suffixes {
            ListOverride::Extend(v) | ListOverride::Replace(v) => v.push(suffix),
            ListOverride::Default => self.compound_suffixes = ListOverride::Extend(vec![suffix]),
        }
        self
    }

    /// Validate thresholds, compile patterns and produce a [`ParsingConfig`].
    pub fn build(self) -> Result<ParsingConfig, ParsingError> {
        let defaults = ParsingConfig::default();

        let unit = |name: &str, v: Option<f64>, default: f64| -> Result<f64, ParsingError> {
            match v {
                Some(x) if !(0.0..=1.0).contains(&x) => Err(ParsingError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {x}"
                ))),
                Some(x) => Ok(x),
                None => Ok(default),
            }
        };
        let non_negative =
            |name: &str, v: Option<f64>, default: f64| -> Result<f64, ParsingError> {
                match v {
                    Some(x) if !(x >= 0.0 && x.is_finite()) => Err(ParsingError::InvalidConfig(
                        format!("{name} must be a non-negative number, got {x}"),
                    )),
                    Some(x) => Ok(x),
                    None => Ok(default),
                }
            };

        let enabled_styles = match self.enabled_styles {
            Some(styles) => {
                let concrete: BTreeSet<_> = styles.into_iter().filter(|s| s.is_concrete()).collect();
                if concrete.is_empty() {
                    return Err(ParsingError::InvalidConfig(
                        "enabled_styles must name at least one of APA, IEEE, NUMBERED".to_string(),
                    ));
                }
                concrete
            }
            None => defaults.enabled_styles,
        };

        let compile = |opt: Option<String>| -> Result<Option<Regex>, regex::Error> {
            opt.map(|p| Regex::new(&p)).transpose()
        };

        Ok(ParsingConfig {
            mixed_margin: unit("mixed_margin", self.mixed_margin, defaults.mixed_margin)?,
            min_style_presence: non_negative(
                "min_style_presence",
                self.min_style_presence,
                defaults.min_style_presence,
            )?,
            bare_numeric_weight: non_negative(
                "bare_numeric_weight",
                self.bare_numeric_weight,
                defaults.bare_numeric_weight,
            )?,
            enabled_styles,
            forced_style: self.forced_style,
            max_range_expansion: self
                .max_range_expansion
                .unwrap_or(defaults.max_range_expansion),
            abbreviations: self.abbreviations,
            min_bib_overlap: unit("min_bib_overlap", self.min_bib_overlap, defaults.min_bib_overlap)?,
            surname_similarity: unit(
                "surname_similarity",
                self.surname_similarity,
                defaults.surname_similarity,
            )?,
            linking: self.linking.unwrap_or(defaults.linking),
            split_references: self.split_references.unwrap_or(defaults.split_references),
            section_header_re: compile(self.section_header_re)?,
            section_end_re: compile(self.section_end_re)?,
            compound_suffixes: self.compound_suffixes,
        })
    }
}
