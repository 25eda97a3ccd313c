use std::io::Write;

use citemark_core::{
    AnnotatedDocument, BibliographyEntry, CitationStyle, ClassificationResult, Diagnostic,
    DiagnosticKind, MarkerFields, MarkerOccurrence,
};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Longest sentence excerpt printed above its markers.
const EXCERPT_CHARS: usize = 100;

fn style_label(style: CitationStyle, color: ColorMode) -> String {
    if !color.enabled() {
        return style.to_string();
    }
    match style {
        CitationStyle::Apa => style.cyan().to_string(),
        CitationStyle::Ieee => style.blue().to_string(),
        CitationStyle::Numbered => style.magenta().to_string(),
        CitationStyle::Mixed => style.yellow().to_string(),
        CitationStyle::Unknown => style.dimmed().to_string(),
    }
}

/// Print the style decision with per-style densities and counts.
pub fn print_classification(
    w: &mut dyn Write,
    result: &ClassificationResult,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(
        w,
        "Style: {} (confidence {:.2}, {} words)",
        style_label(result.style, color),
        result.confidence,
        result.word_count
    )?;
    for (style, score) in &result.per_style_scores {
        let count = result.marker_counts.get(style).copied().unwrap_or(0);
        writeln!(
            w,
            "  {:<9} {:>8.2} per 1000 words ({} markers)",
            style.as_str(),
            score,
            count
        )?;
    }
    Ok(())
}

/// Print an annotated document: classification, then each sentence that
/// carries markers, then diagnostics.
pub fn print_annotation(
    w: &mut dyn Write,
    text: &str,
    doc: &AnnotatedDocument,
    color: ColorMode,
) -> std::io::Result<()> {
    if let Some(id) = &doc.source_id {
        writeln!(w, "{}", id)?;
    }
    print_classification(w, &doc.classification, color)?;
    writeln!(
        w,
        "Sentences: {}   Markers: {}   Linked: {}",
        doc.sentences.len(),
        doc.occurrences.len(),
        doc.linked_count()
    )?;

    let mut current_sentence = None;
    for occ in &doc.occurrences {
        if current_sentence != Some(occ.sentence_index) {
            current_sentence = Some(occ.sentence_index);
            writeln!(w)?;
            let excerpt = doc
                .sentences
                .get(occ.sentence_index)
                .map(|s| excerpt(&s.text))
                .unwrap_or_default();
            if color.enabled() {
                writeln!(w, "{} {}", format!("[{}]", occ.sentence_index).dimmed(), excerpt)?;
            } else {
                writeln!(w, "[{}] {}", occ.sentence_index, excerpt)?;
            }
        }
        print_occurrence(w, text, occ, color)?;
    }

    if !doc.diagnostics.is_empty() {
        writeln!(w)?;
        writeln!(w, "Diagnostics:")?;
        for d in &doc.diagnostics {
            print_diagnostic(w, d, color)?;
        }
    }
    Ok(())
}

fn print_occurrence(
    w: &mut dyn Write,
    text: &str,
    occ: &MarkerOccurrence,
    color: ColorMode,
) -> std::io::Result<()> {
    let fields = match &occ.fields {
        MarkerFields::Numeric { numeric_keys } => format!(
            "keys={}",
            numeric_keys
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",")
        ),
        MarkerFields::AuthorYear {
            authors,
            year,
            year_suffix,
            locator,
        } => {
            let year = match (year, year_suffix) {
                (Some(y), Some(s)) => format!("{}{}", y, s),
                (Some(y), None) => y.to_string(),
                (None, _) => "n.d.".to_string(),
            };
            let mut s = format!("{} {}", authors.join(" & "), year);
            if let Some(loc) = locator {
                s.push_str(&format!(", {}", loc));
            }
            s
        }
    };

    let outer = text.get(occ.outer_start..occ.outer_end).unwrap_or(&occ.raw_text);
    let link = if occ.bib_keys.is_empty() {
        if color.enabled() {
            "-".red().to_string()
        } else {
            "-".to_string()
        }
    } else {
        let keys = occ.bib_keys.join(", ");
        if color.enabled() {
            keys.green().to_string()
        } else {
            keys
        }
    };

    writeln!(
        w,
        "    {:>6}..{:<6} {:<24} {} [{}] -> {}",
        occ.start_offset,
        occ.end_offset,
        outer,
        style_label(occ.style, color),
        fields,
        link
    )
}

fn print_diagnostic(w: &mut dyn Write, d: &Diagnostic, color: ColorMode) -> std::io::Result<()> {
    let location = match (d.start_offset, d.end_offset) {
        (Some(s), Some(e)) => format!(" at {}..{}", s, e),
        _ => String::new(),
    };
    let label = match d.kind {
        DiagnosticKind::MalformedMarker | DiagnosticKind::UnresolvedReference => "warning",
        _ => "note",
    };
    if color.enabled() {
        let label = if label == "warning" {
            label.yellow().to_string()
        } else {
            label.dimmed().to_string()
        };
        writeln!(w, "  {} {}{}: {}", label, d.kind, location, d.message)
    } else {
        writeln!(w, "  {} {}{}: {}", label, d.kind, location, d.message)
    }
}

/// Print bibliography entries, one per line.
pub fn print_references(
    w: &mut dyn Write,
    entries: &[BibliographyEntry],
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w, "Found {} references", entries.len())?;
    for entry in entries {
        if color.enabled() {
            writeln!(w, "{:>6}  {}", entry.key.bold(), entry.raw_text)?;
        } else {
            writeln!(w, "{:>6}  {}", entry.key, entry.raw_text)?;
        }
    }
    Ok(())
}

fn excerpt(sentence: &str) -> String {
    let flat: String = sentence.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", cut)
}
