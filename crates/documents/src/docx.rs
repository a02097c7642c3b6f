//! DOCX text extraction
//!
//! Reads `word/document.xml` out of the archive and emits one line per
//! non-empty paragraph. Word keeps list numbering and heading levels in
//! paragraph properties rather than in the text, so list paragraphs are
//! prefixed with `- ` and `HeadingN` paragraphs with N `#` to keep the
//! structure visible to the task parser.

use std::fmt::Display;
use std::io::{Cursor, Read};

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{ExtractionError, Result};
use crate::traits::TextExtractor;

const DOCUMENT_PART: &str = "word/document.xml";

/// A `w:p` that has been opened but not yet closed.
#[derive(Default)]
struct OpenParagraph {
    slot: usize,
    text: String,
    heading: Option<usize>,
    listed: bool,
}

impl OpenParagraph {
    fn into_line(self) -> Option<String> {
        let text = self.text.trim();
        if text.is_empty() {
            return None;
        }
        let prefix = match self.heading {
            Some(level) => format!("{} ", "#".repeat(level.clamp(1, 6))),
            None if self.listed => "- ".to_string(),
            None => String::new(),
        };
        Some(format!("{}{}", prefix, text))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DocxExtractor;

impl DocxExtractor {
    /// Convert the XML of `word/document.xml` into text lines.
    ///
    /// Paragraphs nested inside another one (text boxes, shapes) become
    /// lines of their own, placed where they open.
    pub fn document_xml_to_text(xml: &str) -> Result<String> {
        let mut reader = Reader::from_str(xml);
        let mut lines: Vec<Option<String>> = Vec::new();
        let mut open: Vec<OpenParagraph> = Vec::new();
        let mut in_run_text = false;

        loop {
            let event = reader.read_event().map_err(|e| {
                malformed(format_args!("byte {}: {}", reader.error_position(), e))
            })?;

            match event {
                Event::Start(ref tag) => match tag.name().as_ref() {
                    b"w:p" => {
                        open.push(OpenParagraph {
                            slot: lines.len(),
                            ..Default::default()
                        });
                        lines.push(None);
                    }
                    b"w:t" => in_run_text = true,
                    other => mark_properties(other, tag, open.last_mut()),
                },
                Event::Empty(ref tag) => match tag.name().as_ref() {
                    b"w:tab" => push_text(&mut open, "\t"),
                    b"w:br" => push_text(&mut open, " "),
                    other => mark_properties(other, tag, open.last_mut()),
                },
                Event::End(ref tag) => match tag.name().as_ref() {
                    b"w:p" => {
                        if let Some(paragraph) = open.pop() {
                            let slot = paragraph.slot;
                            lines[slot] = paragraph.into_line();
                        }
                    }
                    b"w:t" => in_run_text = false,
                    _ => {}
                },
                Event::Text(ref text) if in_run_text => {
                    let decoded = text.decode().map_err(malformed)?;
                    push_text(&mut open, &decoded);
                }
                Event::GeneralRef(ref reference) if in_run_text => {
                    if let Some(c) = reference.resolve_char_ref().map_err(malformed)? {
                        push_text(&mut open, c.encode_utf8(&mut [0; 4]));
                    } else {
                        let name = reference.decode().map_err(malformed)?;
                        let resolved = resolve_predefined_entity(&name).ok_or_else(|| {
                            malformed(format_args!("unknown entity &{};", name))
                        })?;
                        push_text(&mut open, resolved);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(lines.into_iter().flatten().collect::<Vec<_>>().join("\n"))
    }
}

impl TextExtractor for DocxExtractor {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["docx"]
    }

    fn extract(&self, bytes: &[u8]) -> Result<String> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        let mut part = archive.by_name(DOCUMENT_PART).map_err(|e| {
            ExtractionError::Malformed(format!("missing {}: {}", DOCUMENT_PART, e))
        })?;

        let mut xml = String::new();
        part.read_to_string(&mut xml)?;

        Self::document_xml_to_text(&xml)
    }
}

fn malformed(e: impl Display) -> ExtractionError {
    ExtractionError::Malformed(format!("{}: {}", DOCUMENT_PART, e))
}

fn push_text(open: &mut [OpenParagraph], text: &str) {
    if let Some(paragraph) = open.last_mut() {
        paragraph.text.push_str(text);
    }
}

/// Paragraph properties that change how the line is rendered.
fn mark_properties(name: &[u8], tag: &BytesStart<'_>, paragraph: Option<&mut OpenParagraph>) {
    let Some(paragraph) = paragraph else {
        return;
    };
    match name {
        b"w:numPr" => paragraph.listed = true,
        b"w:pStyle" => {
            let style = tag
                .attributes()
                .flatten()
                .find(|attr| attr.key.as_ref() == b"w:val")
                .map(|attr| String::from_utf8_lossy(&attr.value).into_owned());
            if let Some(level) = style.as_deref().and_then(heading_level) {
                paragraph.heading = Some(level);
            }
        }
        _ => {}
    }
}

/// `Heading2` or `heading 2` → 2.
fn heading_level(style: &str) -> Option<usize> {
    let rest = style
        .strip_prefix("Heading")
        .or_else(|| style.strip_prefix("heading"))?;
    rest.trim().parse().ok()
}
