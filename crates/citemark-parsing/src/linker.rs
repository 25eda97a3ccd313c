use std::collections::HashSet;

use citemark_core::{
    BibliographyEntry, Diagnostic, DiagnosticKind, MarkerFields, MarkerOccurrence, fold_name,
    normalize_tokens,
};

use crate::config::ParsingConfig;

/// Resolves marker keys against a bibliography.
///
/// Numeric markers match on the entry key. Author-year markers are scored
/// by how many of their surnames and their year appear among the entry's
/// tokens; the best entry above `min_bib_overlap` wins. Nothing here is
/// fatal: every miss becomes a diagnostic.
#[derive(Debug, Clone, Default)]
pub struct BibliographyLinker {
    config: ParsingConfig,
}

/// A bibliography entry prepared for matching.
struct IndexedEntry<'a> {
    entry: &'a BibliographyEntry,
    numeric_key: Option<u32>,
    /// `("smith", "2020a")` for entries keyed `Smith:2020a`.
    author_year_key: Option<(String, String)>,
    tokens: HashSet<String>,
    has_year: bool,
}

impl<'a> IndexedEntry<'a> {
    fn new(entry: &'a BibliographyEntry) -> Self {
        let key = entry
            .key
            .trim()
            .trim_matches(|c: char| c == '[' || c == ']' || c == '.' || c.is_whitespace());
        let numeric_key = key.parse().ok();
        let author_year_key = key.split_once(':').map(|(author, year)| {
            let surname = author.split_whitespace().last().unwrap_or(author);
            (fold_name(surname), year.trim().to_ascii_lowercase())
        });
        let tokens: HashSet<String> = normalize_tokens(&entry.raw_text).into_iter().collect();
        let has_year = tokens.iter().any(|t| is_year_token(t));
        Self {
            entry,
            numeric_key,
            author_year_key,
            tokens,
            has_year,
        }
    }
}

impl BibliographyLinker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &ParsingConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Fill `bib_key` / `bib_keys` where an entry resolves.
    ///
    /// Returns one diagnostic per unresolved numeric key, per unresolved
    /// author-year citation, and per ambiguous author-year resolution.
    pub fn link(
        &self,
        occurrences: &mut [MarkerOccurrence],
        bibliography: &[BibliographyEntry],
    ) -> Vec<Diagnostic> {
        let index: Vec<IndexedEntry<'_>> = bibliography.iter().map(IndexedEntry::new).collect();
        let mut diagnostics = Vec::new();

        for occ in occurrences.iter_mut() {
            occ.bib_keys.clear();
            match &occ.fields {
                MarkerFields::Numeric { numeric_keys } => {
                    for &k in numeric_keys {
                        match index.iter().find(|e| e.numeric_key == Some(k)) {
                            Some(e) => occ.bib_keys.push(e.entry.key.clone()),
                            None => diagnostics.push(Diagnostic::at(
                                DiagnosticKind::UnresolvedReference,
                                format!("no bibliography entry for key {}", k),
                                occ.start_offset,
                                occ.end_offset,
                            )),
                        }
                    }
                }
                MarkerFields::AuthorYear {
                    authors,
                    year,
                    year_suffix,
                    ..
                } => {
                    let year = year.map(|y| match year_suffix {
                        Some(s) => format!("{}{}", y, s),
                        None => y.to_string(),
                    });
                    match self.resolve_author_year(&index, authors, year.as_deref()) {
                        Resolution::Unique(key) => occ.bib_keys.push(key),
                        Resolution::Tied(key, count) => {
                            diagnostics.push(Diagnostic::at(
                                DiagnosticKind::AmbiguousReference,
                                format!(
                                    "{:?} matches {} entries equally; using {:?}",
                                    occ.raw_text, count, key
                                ),
                                occ.start_offset,
                                occ.end_offset,
                            ));
                            occ.bib_keys.push(key);
                        }
                        Resolution::None => diagnostics.push(Diagnostic::at(
                            DiagnosticKind::UnresolvedReference,
                            format!("no bibliography entry matches {:?}", occ.raw_text),
                            occ.start_offset,
                            occ.end_offset,
                        )),
                    }
                }
            }
            occ.bib_key = occ.bib_keys.first().cloned();
        }

        tracing::debug!(
            entries = bibliography.len(),
            linked = occurrences.iter().filter(|o| o.bib_key.is_some()).count(),
            unresolved = diagnostics
                .iter()
                .filter(|d| d.kind == DiagnosticKind::UnresolvedReference)
                .count(),
            "linked markers to bibliography"
        );

        diagnostics
    }

    fn resolve_author_year(
        &self,
        index: &[IndexedEntry<'_>],
        authors: &[String],
        year: Option<&str>,
    ) -> Resolution {
        let surnames: Vec<String> = authors
            .iter()
            .filter_map(|a| a.split_whitespace().last())
            .map(fold_name)
            .filter(|s| !s.is_empty())
            .collect();
        if surnames.is_empty() {
            return Resolution::None;
        }

        let mut best: Option<(f64, usize)> = None;
        let mut ties = 0;
        for (i, entry) in index.iter().enumerate() {
            let score = self.overlap(entry, &surnames, year);
            if score < self.config.min_bib_overlap {
                continue;
            }
            match best {
                Some((b, _)) if (score - b).abs() < f64::EPSILON => ties += 1,
                Some((b, _)) if score < b => {}
                _ => {
                    best = Some((score, i));
                    ties = 1;
                }
            }
        }

        match best {
            None => Resolution::None,
            Some((_, i)) if ties > 1 => Resolution::Tied(index[i].entry.key.clone(), ties),
            Some((_, i)) => Resolution::Unique(index[i].entry.key.clone()),
        }
    }

    /// `(matched surnames + year matched) / (surnames + 1)`, zero unless the
    /// first author matches. A direct `Surname:Year` key scores 1.
    fn overlap(&self, entry: &IndexedEntry<'_>, surnames: &[String], year: Option<&str>) -> f64 {
        let year_matched = match year {
            Some(y) => entry.tokens.contains(y),
            // "n.d." and "in press" entries carry no year
            None => !entry.has_year,
        };

        if let Some((key_author, key_year)) = &entry.author_year_key
            && key_author == &surnames[0]
            && year.is_some_and(|y| y == key_year)
        {
            return 1.0;
        }

        if !self.surname_in(entry, &surnames[0]) {
            return 0.0;
        }
        let matched = surnames.iter().filter(|s| self.surname_in(entry, s)).count();
        (matched + usize::from(year_matched)) as f64 / (surnames.len() + 1) as f64
    }

    fn surname_in(&self, entry: &IndexedEntry<'_>, surname: &str) -> bool {
        if entry.tokens.contains(surname) {
            return true;
        }
        if surname.len() < 5 {
            return false;
        }
        entry.tokens.iter().any(|t| {
            t.len() >= 4
                && rapidfuzz::fuzz::ratio(t.chars(), surname.chars())
                    >= self.config.surname_similarity
        })
    }
}

enum Resolution {
    Unique(String),
    Tied(String, usize),
    None,
}

fn is_year_token(token: &str) -> bool {
    let digits: String = token.chars().take_while(char::is_ascii_digit).collect();
    digits.len() == 4
        && token.len() <= 5
        && matches!(&digits[..2], "15" | "16" | "17" | "18" | "19" | "20")
}
