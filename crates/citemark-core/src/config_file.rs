use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CitationStyle, LinkingMode};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub classifier: Option<ClassifierConfig>,
    pub extraction: Option<ExtractionConfig>,
    pub segmenter: Option<SegmenterConfig>,
    pub linker: Option<LinkerConfig>,
    pub display: Option<DisplayConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub mixed_margin: Option<f64>,
    pub min_style_presence: Option<f64>,
    pub bare_numeric_weight: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub enabled_styles: Option<Vec<CitationStyle>>,
    pub max_range_expansion: Option<u32>,
    pub split_references: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Added to the built-in abbreviation list.
    pub extra_abbreviations: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkerConfig {
    pub min_bib_overlap: Option<f64>,
    pub mode: Option<LinkingMode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub color: Option<bool>,
}

/// Platform config directory path: `<config_dir>/citemark/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("citemark").join("config.toml"))
}

/// Load config by cascading CWD `.citemark.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".citemark.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    match try_load_from_path(path) {
        Ok(config) => Some(config),
        Err(ConfigError::Io { .. }) => None,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Load a config from a path the user named explicitly; errors are reported.
pub fn try_load_from_path(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let classifier = match (base.classifier, overlay.classifier) {
        (Some(b), Some(o)) => Some(ClassifierConfig {
            mixed_margin: o.mixed_margin.or(b.mixed_margin),
            min_style_presence: o.min_style_presence.or(b.min_style_presence),
            bare_numeric_weight: o.bare_numeric_weight.or(b.bare_numeric_weight),
        }),
        (b, o) => o.or(b),
    };

    let extraction = match (base.extraction, overlay.extraction) {
        (Some(b), Some(o)) => Some(ExtractionConfig {
            enabled_styles: o.enabled_styles.or(b.enabled_styles),
            max_range_expansion: o.max_range_expansion.or(b.max_range_expansion),
            split_references: o.split_references.or(b.split_references),
        }),
        (b, o) => o.or(b),
    };

    // Abbreviation lists accumulate rather than replace.
    let segmenter = match (base.segmenter, overlay.segmenter) {
        (Some(b), Some(o)) => {
            let extra = match (b.extra_abbreviations, o.extra_abbreviations) {
                (Some(mut b), Some(o)) => {
                    for a in o {
                        if !b.contains(&a) {
                            b.push(a);
                        }
                    }
                    Some(b)
                }
                (b, o) => o.or(b),
            };
            Some(SegmenterConfig {
                extra_abbreviations: extra,
            })
        }
        (b, o) => o.or(b),
    };

    let linker = match (base.linker, overlay.linker) {
        (Some(b), Some(o)) => Some(LinkerConfig {
            min_bib_overlap: o.min_bib_overlap.or(b.min_bib_overlap),
            mode: o.mode.or(b.mode),
        }),
        (b, o) => o.or(b),
    };

    let display = match (base.display, overlay.display) {
        (Some(b), Some(o)) => Some(DisplayConfig {
            color: o.color.or(b.color),
        }),
        (b, o) => o.or(b),
    };

    ConfigFile {
        classifier,
        extraction,
        segmenter,
        linker,
        display,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
            [classifier]
            mixed_margin = 0.25

            [extraction]
            enabled_styles = ["APA", "IEEE"]

            [linker]
            mode = "required"
        "#;
        let config: ConfigFile = toml::from_str(toml_str).unwrap();
        let classifier = config.classifier.unwrap();
        assert_eq!(classifier.mixed_margin, Some(0.25));
        assert_eq!(classifier.min_style_presence, None);
        assert_eq!(
            config.extraction.unwrap().enabled_styles,
            Some(vec![CitationStyle::Apa, CitationStyle::Ieee])
        );
        assert_eq!(config.linker.unwrap().mode, Some(LinkingMode::Required));
        assert!(config.segmenter.is_none());
    }

    #[test]
    fn test_merge_overlay_wins() {
        let base = ConfigFile {
            classifier: Some(ClassifierConfig {
                mixed_margin: Some(0.1),
                min_style_presence: Some(2.0),
                bare_numeric_weight: None,
            }),
            linker: Some(LinkerConfig {
                min_bib_overlap: Some(0.5),
                mode: None,
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            classifier: Some(ClassifierConfig {
                mixed_margin: Some(0.3),
                ..Default::default()
            }),
            display: Some(DisplayConfig { color: Some(false) }),
            ..Default::default()
        };

        let merged = merge(base, overlay);
        let classifier = merged.classifier.unwrap();
        assert_eq!(classifier.mixed_margin, Some(0.3));
        assert_eq!(classifier.min_style_presence, Some(2.0));
        assert_eq!(merged.linker.unwrap().min_bib_overlap, Some(0.5));
        assert_eq!(merged.display.unwrap().color, Some(false));
    }

    #[test]
    fn test_merge_accumulates_abbreviations() {
        let base = ConfigFile {
            segmenter: Some(SegmenterConfig {
                extra_abbreviations: Some(vec!["approx".into(), "resp".into()]),
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            segmenter: Some(SegmenterConfig {
                extra_abbreviations: Some(vec!["resp".into(), "suppl".into()]),
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        assert_eq!(
            merged.segmenter.unwrap().extra_abbreviations.unwrap(),
            vec!["approx", "resp", "suppl"]
        );
    }

    #[test]
    fn test_load_from_missing_path_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from_path(&dir.path().join("nope.toml")).is_none());
    }

    #[test]
    fn test_try_load_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[classifier]\nmixed_margin = \"wide\"").unwrap();
        let err = try_load_from_path(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
        assert!(load_from_path(file.path()).is_none());
    }

    #[test]
    fn test_try_load_roundtrip_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[extraction]\nmax_range_expansion = 20\n").unwrap();
        let config = try_load_from_path(file.path()).unwrap();
        assert_eq!(config.extraction.unwrap().max_range_expansion, Some(20));
    }
}
