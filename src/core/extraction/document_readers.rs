// Format-specific readers used by the content extractor.

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

use super::content_extractor::{DocumentKind, ExtractionError};

const WORD_BODY_PART: &str = "word/document.xml";

fn read_error(kind: DocumentKind, err: impl ToString) -> ExtractionError {
    ExtractionError::DocumentRead {
        kind,
        message: err.to_string(),
    }
}

/// Reads the paragraphs of a WordprocessingML package.
pub(super) fn read_word(content: &[u8]) -> Result<String, ExtractionError> {
    let mut archive =
        ZipArchive::new(Cursor::new(content)).map_err(|e| read_error(DocumentKind::Word, e))?;
    let mut xml = String::new();
    {
        let mut part = archive
            .by_name(WORD_BODY_PART)
            .map_err(|e| read_error(DocumentKind::Word, e))?;
        part.read_to_string(&mut xml)
            .map_err(|e| read_error(DocumentKind::Word, e))?;
    }

    let paragraphs = paragraphs_from_xml(&xml)?;
    Ok(paragraphs.join("\n").trim_matches('\n').to_string())
}

/// Collects the text of every `w:p` element in document order.
fn paragraphs_from_xml(xml: &str) -> Result<Vec<String>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    // Paragraphs nest inside text boxes; the innermost one owns the text.
    let mut open: Vec<String> = Vec::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:p" => open.push(String::new()),
                b"w:t" => in_text_run = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:p" => paragraphs.push(String::new()),
                b"w:tab" => {
                    if let Some(current) = open.last_mut() {
                        current.push('\t');
                    }
                }
                b"w:br" | b"w:cr" => {
                    if let Some(current) = open.last_mut() {
                        current.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::Text(text)) if in_text_run => {
                let text = text
                    .unescape()
                    .map_err(|e| read_error(DocumentKind::Word, e))?;
                if let Some(current) = open.last_mut() {
                    current.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => {
                    if let Some(finished) = open.pop() {
                        paragraphs.push(finished);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(read_error(DocumentKind::Word, e)),
            _ => {}
        }
    }

    Ok(paragraphs)
}

/// Extracts the text of every page, in page order.
pub(super) fn read_pdf(content: &[u8]) -> Result<String, ExtractionError> {
    pdf_extract::extract_text_from_mem(content)
        .map_err(|e| read_error(DocumentKind::Pdf, format!("{e:?}")))
}
