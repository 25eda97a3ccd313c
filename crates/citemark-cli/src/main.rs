use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use citemark_core::config_file::{self, ConfigFile};
use citemark_parsing::text_processing::normalize_text_with_config;
use citemark_parsing::{
    BibliographyEntry, CitationPipeline, CitationStyle, Document, LinkingMode, ParsingConfig,
    ParsingConfigBuilder,
};

mod output;

use output::ColorMode;

/// Citation marker extractor - find, classify and link in-text citations
#[derive(Parser, Debug)]
#[command(name = "citemark", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Segment a document, extract its citation markers and link them
    Annotate {
        #[command(flatten)]
        common: CommonArgs,

        /// Bibliography to link against: a JSON array of {key, raw_text} or a TEI file
        #[arg(long)]
        bib: Option<PathBuf>,

        /// Force a citation style instead of classifying (apa, ieee, numbered, mixed)
        #[arg(long)]
        style: Option<CitationStyle>,

        /// Fail if no bibliography is available for linking
        #[arg(long)]
        require_bib: bool,

        /// Skip linking entirely
        #[arg(long, conflicts_with = "require_bib")]
        no_link: bool,
    },

    /// Report the dominant citation style of a document
    Classify {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Print the bibliography entries found in a document's reference list
    References {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Path to a plain-text (.txt) or TEI-XML (.xml, .tei) document
    file_path: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Path to output file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file to use instead of ./.citemark.toml and the user config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep line-break hyphenation and ligatures as extracted
    #[arg(long)]
    raw: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "citemark=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Annotate {
            common,
            bib,
            style,
            require_bib,
            no_link,
        } => {
            let linking = if require_bib {
                Some(LinkingMode::Required)
            } else if no_link {
                Some(LinkingMode::Off)
            } else {
                None
            };
            annotate(common, bib, style, linking)
        }
        Command::Classify { common } => classify(common),
        Command::References { common } => references(common),
    }
}

fn annotate(
    common: CommonArgs,
    bib: Option<PathBuf>,
    style: Option<CitationStyle>,
    linking: Option<LinkingMode>,
) -> anyhow::Result<()> {
    let (file, mut builder) = load_settings(&common)?;
    if let Some(style) = style {
        builder = builder.forced_style(style);
    }
    if let Some(mode) = linking {
        builder = builder.linking(mode);
    }
    let config = builder.build()?;

    let input = load_input(&common, &config)?;
    let bibliography = match bib {
        Some(path) => Some(load_bibliography(&path)?),
        None => input.bibliography,
    };

    let pipeline = CitationPipeline::with_config(config);
    let doc = pipeline
        .annotate(&input.document, bibliography.as_deref())
        .with_context(|| format!("failed to annotate {}", common.file_path.display()))?;

    let (mut writer, color) = open_output(&common, &file)?;
    match common.format {
        Format::Json => write_json(&mut writer, &doc)?,
        Format::Text => output::print_annotation(&mut writer, &input.document.text, &doc, color)?,
    }
    Ok(())
}

fn classify(common: CommonArgs) -> anyhow::Result<()> {
    let (file, builder) = load_settings(&common)?;
    let config = builder.build()?;
    let input = load_input(&common, &config)?;

    let pipeline = CitationPipeline::with_config(config);
    let text = &input.document.text;
    let body = match pipeline.references_section(text) {
        Some(section) => &text[..section.header_start],
        None => text.as_str(),
    };
    let result = pipeline.classify(body);

    let (mut writer, color) = open_output(&common, &file)?;
    match common.format {
        Format::Json => write_json(&mut writer, &result)?,
        Format::Text => output::print_classification(&mut writer, &result, color)?,
    }
    Ok(())
}

fn references(common: CommonArgs) -> anyhow::Result<()> {
    let (file, builder) = load_settings(&common)?;
    let config = builder.build()?;
    let input = load_input(&common, &config)?;

    let entries = match input.bibliography {
        Some(entries) => entries,
        None => CitationPipeline::with_config(config).references(&input.document.text),
    };

    let (mut writer, color) = open_output(&common, &file)?;
    match common.format {
        Format::Json => write_json(&mut writer, &entries)?,
        Format::Text => output::print_references(&mut writer, &entries, color)?,
    }
    Ok(())
}

/// Resolve configuration: CLI flags > env vars > config file > defaults.
///
/// Flags are applied by the caller on the returned builder.
fn load_settings(common: &CommonArgs) -> anyhow::Result<(ConfigFile, ParsingConfigBuilder)> {
    let file = match &common.config {
        Some(path) => config_file::try_load_from_path(path)?,
        None => config_file::load_config(),
    };

    let mut builder = ParsingConfigBuilder::from_config_file(&file);
    if let Some(margin) = env_parse::<f64>("CITEMARK_MIXED_MARGIN")? {
        builder = builder.mixed_margin(margin);
    }
    if let Some(presence) = env_parse::<f64>("CITEMARK_MIN_STYLE_PRESENCE")? {
        builder = builder.min_style_presence(presence);
    }
    if let Some(overlap) = env_parse::<f64>("CITEMARK_MIN_BIB_OVERLAP")? {
        builder = builder.min_bib_overlap(overlap);
    }
    if let Some(mode) = env_parse::<LinkingMode>("CITEMARK_LINKING")? {
        builder = builder.linking(mode);
    }
    if let Some(style) = env_parse::<CitationStyle>("CITEMARK_STYLE")? {
        builder = builder.forced_style(style);
    }
    Ok((file, builder))
}

fn env_parse<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {}={:?}: {}", name, value, e)),
        _ => Ok(None),
    }
}

struct Input {
    document: Document,
    /// Set for TEI input, which carries its own bibliography.
    bibliography: Option<Vec<BibliographyEntry>>,
}

fn is_tei(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("xml" | "tei")
    )
}

fn load_input(common: &CommonArgs, config: &ParsingConfig) -> anyhow::Result<Input> {
    let path = &common.file_path;
    let source_id = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());

    if is_tei(path) {
        let tei = citemark_tei::read_tei_file(path)?;
        let (document, bibliography) = tei.into_document(source_id);
        tracing::debug!(entries = bibliography.len(), "read TEI input");
        return Ok(Input {
            document,
            bibliography: (!bibliography.is_empty()).then_some(bibliography),
        });
    }

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let text = if common.raw {
        text
    } else {
        normalize_text_with_config(&text, config)
    };
    let mut document = Document::new(text);
    if let Some(id) = source_id {
        document = document.with_source_id(id);
    }
    Ok(Input {
        document,
        bibliography: None,
    })
}

fn load_bibliography(path: &Path) -> anyhow::Result<Vec<BibliographyEntry>> {
    if is_tei(path) {
        return Ok(citemark_tei::read_tei_file(path)?.bibliography);
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("{} is not a JSON array of bibliography entries", path.display()))
}

/// Output writer and color mode. Color is only used for text written to stdout.
fn open_output(common: &CommonArgs, file: &ConfigFile) -> anyhow::Result<(Box<dyn Write>, ColorMode)> {
    let config_color = file.display.as_ref().and_then(|d| d.color).unwrap_or(true);
    let use_color = config_color
        && !common.no_color
        && common.output.is_none()
        && common.format == Format::Text;

    let writer: Box<dyn Write> = match &common.output {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout()),
    };
    Ok((writer, ColorMode(use_color)))
}

fn write_json<T: serde::Serialize>(writer: &mut dyn Write, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *writer, value)?;
    writeln!(writer)?;
    Ok(())
}
