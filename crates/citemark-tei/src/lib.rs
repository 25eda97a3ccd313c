//! Reader for TEI-XML documents produced by a full-text structuring service.
//!
//! Pulls two things out of a TEI file using SAX-style event processing:
//! the body text (`<head>` and `<p>` blocks of `<body>`, separated by blank
//! lines) and the bibliography (`<biblStruct>` entries of any `<listBibl>`).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

use citemark_core::{BibliographyEntry, Document};

#[derive(Error, Debug)]
pub enum TeiError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed TEI at byte {position}: {source}")]
    Xml {
        position: u64,
        source: quick_xml::Error,
    },
}

/// Text and bibliography read from one TEI file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeiDocument {
    /// `<titleStmt><title>` from the header.
    pub title: Option<String>,
    pub body_text: String,
    /// Keyed by 1-based position in the list.
    pub bibliography: Vec<BibliographyEntry>,
}

impl TeiDocument {
    pub fn into_document(self, source_id: Option<String>) -> (Document, Vec<BibliographyEntry>) {
        let mut document = Document::new(self.body_text);
        if let Some(id) = source_id.or(self.title) {
            document = document.with_source_id(id);
        }
        (document, self.bibliography)
    }
}

/// Elements inside `<body>` whose text is not running prose.
const SKIPPED_ELEMENTS: &[&[u8]] = &[b"figure", b"table", b"formula", b"note"];

fn is_skipped(name: &[u8]) -> bool {
    SKIPPED_ELEMENTS.iter().any(|&e| e == name)
}

/// Read a TEI file from disk.
pub fn read_tei_file(path: &Path) -> Result<TeiDocument, TeiError> {
    let file = File::open(path).map_err(|source| TeiError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_tei(BufReader::new(file))
}

pub fn parse_tei_str(xml: &str) -> Result<TeiDocument, TeiError> {
    parse_tei(xml.as_bytes())
}

/// Parse a TEI document.
///
/// Text inside figures, tables, formulas and notes is left out of the body.
/// Bibliography text is the whitespace-collapsed text content of each
/// `<biblStruct>`, with the `when` value of empty `<date/>` elements included.
pub fn parse_tei<R: BufRead>(reader: R) -> Result<TeiDocument, TeiError> {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(false);

    let mut buf = Vec::with_capacity(4096);
    let mut doc = TeiDocument::default();

    // State
    let mut in_title_stmt = false;
    let mut reading_title = false;
    let mut in_body = false;
    let mut skip_depth = 0usize;
    let mut block_depth = 0usize;
    let mut blocks: Vec<String> = Vec::new();
    let mut in_bibl = false;
    let mut text_buf = String::new();

    loop {
        let event = xml.read_event_into(&mut buf).map_err(|source| TeiError::Xml {
            position: xml.error_position(),
            source,
        })?;

        match event {
            Event::Start(ref e) => {
                let name = e.local_name();
                let name_ref = name.as_ref();

                match name_ref {
                    b"titleStmt" => in_title_stmt = true,
                    b"title" if in_title_stmt && doc.title.is_none() => {
                        reading_title = true;
                        text_buf.clear();
                    }
                    b"body" => in_body = true,
                    b"biblStruct" if !in_body => {
                        in_bibl = true;
                        text_buf.clear();
                    }
                    _ if in_body && is_skipped(name_ref) => skip_depth += 1,
                    b"head" | b"p" if in_body && skip_depth == 0 => {
                        if block_depth == 0 {
                            text_buf.clear();
                        }
                        block_depth += 1;
                    }
                    _ if in_bibl => text_buf.push(' '),
                    _ => {}
                }
            }

            Event::Empty(ref e) => {
                if in_bibl {
                    text_buf.push(' ');
                    push_date(e, &mut text_buf);
                }
            }

            Event::Text(ref e) => {
                if reading_title || in_bibl || (block_depth > 0 && skip_depth == 0) {
                    if let Ok(text) = e.unescape() {
                        text_buf.push_str(&text);
                    }
                }
            }

            Event::CData(ref e) => {
                if reading_title || in_bibl || (block_depth > 0 && skip_depth == 0) {
                    text_buf.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }

            Event::End(ref e) => {
                let name = e.local_name();
                let name_ref = name.as_ref();

                match name_ref {
                    b"titleStmt" => in_title_stmt = false,
                    b"title" if reading_title => {
                        reading_title = false;
                        let title = collapse_whitespace(&text_buf);
                        if !title.is_empty() {
                            doc.title = Some(title);
                        }
                    }
                    b"body" => in_body = false,
                    b"biblStruct" if in_bibl => {
                        in_bibl = false;
                        let raw = collapse_whitespace(&text_buf);
                        if !raw.is_empty() {
                            let key = (doc.bibliography.len() + 1).to_string();
                            doc.bibliography.push(BibliographyEntry::new(key, raw));
                        }
                    }
                    _ if in_body && is_skipped(name_ref) => {
                        skip_depth = skip_depth.saturating_sub(1);
                    }
                    b"head" | b"p" if in_body && skip_depth == 0 && block_depth > 0 => {
                        block_depth -= 1;
                        if block_depth == 0 {
                            let block = collapse_whitespace(&text_buf);
                            if !block.is_empty() {
                                blocks.push(block);
                            }
                        }
                    }
                    _ if in_bibl => text_buf.push(' '),
                    _ => {}
                }
            }

            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    doc.body_text = blocks.join("\n\n");

    tracing::debug!(
        blocks = blocks.len(),
        bytes = doc.body_text.len(),
        entries = doc.bibliography.len(),
        "parsed TEI document"
    );

    Ok(doc)
}

/// Append the `when` attribute of an empty `<date/>` element.
fn push_date(e: &BytesStart<'_>, out: &mut String) {
    if e.local_name().as_ref() != b"date" {
        return;
    }
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"when" {
            out.push_str(&String::from_utf8_lossy(&attr.value));
            out.push(' ');
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<TEI xmlns="http://www.tei-c.org/ns/1.0">
  <teiHeader>
    <fileDesc>
      <titleStmt>
        <title level="a" type="main">Forgetting &amp; Memory</title>
      </titleStmt>
    </fileDesc>
  </teiHeader>
  <text>
    <body>
      <div>
        <head n="1">Introduction</head>
        <p>Forgetting follows a curve <ref type="bibr" target="#b0">(Ebbinghaus, 1885)</ref>.
           Later work refined it <ref type="bibr" target="#b1">[2]</ref>.</p>
        <figure><head>Figure 1</head><figDesc>A curve.</figDesc></figure>
        <p>Second paragraph.</p>
      </div>
    </body>
    <back>
      <div type="references">
        <listBibl>
          <biblStruct xml:id="b0">
            <monogr>
              <title level="m">Memory</title>
              <author><persName><forename>H</forename><surname>Ebbinghaus</surname></persName></author>
              <imprint><date type="published" when="1885"/></imprint>
            </monogr>
          </biblStruct>
          <biblStruct xml:id="b1">
            <analytic>
              <title>Replication</title>
              <author><persName><surname>Murre</surname></persName></author>
            </analytic>
            <monogr><imprint><date when="2015">2015</date></imprint></monogr>
          </biblStruct>
        </listBibl>
      </div>
    </back>
  </text>
</TEI>"##;

    #[test]
    fn test_parse_body() {
        let doc = parse_tei_str(SAMPLE).unwrap();
        assert_eq!(doc.title.as_deref(), Some("Forgetting & Memory"));
        assert_eq!(
            doc.body_text,
            "Introduction\n\nForgetting follows a curve (Ebbinghaus, 1885). \
             Later work refined it [2].\n\nSecond paragraph."
        );
    }

    #[test]
    fn test_parse_bibliography() {
        let doc = parse_tei_str(SAMPLE).unwrap();
        assert_eq!(doc.bibliography.len(), 2);
        assert_eq!(doc.bibliography[0].key, "1");
        assert_eq!(doc.bibliography[0].raw_text, "Memory H Ebbinghaus 1885");
        assert_eq!(doc.bibliography[1].key, "2");
        assert_eq!(doc.bibliography[1].raw_text, "Replication Murre 2015");
    }

    #[test]
    fn test_into_document_prefers_explicit_source_id() {
        let doc = parse_tei_str(SAMPLE).unwrap();
        let (document, bib) = doc.clone().into_document(Some("paper.xml".to_string()));
        assert_eq!(document.source_id.as_deref(), Some("paper.xml"));
        assert_eq!(bib.len(), 2);

        let (document, _) = doc.into_document(None);
        assert_eq!(document.source_id.as_deref(), Some("Forgetting & Memory"));
    }

    #[test]
    fn test_empty_body() {
        let doc = parse_tei_str("<TEI><text><body/></text></TEI>").unwrap();
        assert!(doc.body_text.is_empty());
        assert!(doc.bibliography.is_empty());
    }

    #[test]
    fn test_malformed_xml() {
        let err = parse_tei_str("<TEI><text><body><p>open</body></TEI>").unwrap_err();
        assert!(matches!(err, TeiError::Xml { .. }));
    }

    #[test]
    fn test_read_tei_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.tei.xml");
        std::fs::write(&path, SAMPLE).unwrap();
        let doc = read_tei_file(&path).unwrap();
        assert_eq!(doc.bibliography.len(), 2);

        let err = read_tei_file(&dir.path().join("missing.xml")).unwrap_err();
        assert!(matches!(err, TeiError::Io { .. }));
    }
}
