use crate::error::IngestError;
use lopdf::Document;
use scraper::{Html, Selector};
use std::io::{Cursor, Read};
use tracing::{debug, warn};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_MSWORD: &str = "application/msword";
pub const MIME_GOOGLE_DOC: &str = "application/vnd.google-apps.document";
pub const MIME_HTML: &str = "text/html";

const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], mime_type: &str) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MimeExtractor;

impl TextExtractor for MimeExtractor {
    fn extract(&self, bytes: &[u8], mime_type: &str) -> String {
        extract_text(bytes, mime_type)
    }
}

/// Converts a document buffer of the declared MIME type into plain text.
pub fn extract_text(bytes: &[u8], mime_type: &str) -> String {
    if bytes.is_empty() {
        return String::new();
    }

    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let extracted = match essence.as_str() {
        MIME_PDF => extract_page_texts(bytes).map(|pages| {
            pages
                .into_iter()
                .map(|page| page.text)
                .collect::<Vec<_>>()
                .join("\n\n")
        }),
        MIME_DOCX => extract_docx(bytes),
        MIME_HTML => Ok(extract_html_text(&String::from_utf8_lossy(bytes))),
        // Word binaries and native Google Docs arrive as text exports from the source.
        MIME_MSWORD | MIME_GOOGLE_DOC => Ok(String::from_utf8_lossy(bytes).into_owned()),
        other if other.starts_with("text/") || other == "application/json" => {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
        other => {
            debug!(mime_type = other, "unsupported mime type, no text extracted");
            return String::new();
        }
    };

    match extracted {
        Ok(text) => text.trim().to_string(),
        Err(error) => {
            warn!(mime_type = %essence, %error, "text extraction failed");
            String::new()
        }
    }
}

pub fn extract_page_texts(bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
    let document =
        Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

    let mut pages = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        let text = document
            .extract_text(&[page_no])
            .map_err(|error| IngestError::PdfParse(error.to_string()))?;

        if !text.trim().is_empty() {
            pages.push(PageText {
                number: page_no,
                text,
            });
        }
    }

    Ok(pages)
}

fn extract_docx(bytes: &[u8]) -> Result<String, IngestError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|error| IngestError::InvalidArgument(format!("docx archive: {error}")))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|error| IngestError::InvalidArgument(format!("docx body: {error}")))?;

    let mut xml = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut xml)?;

    word_runs_to_text(&xml)
}

/// Collects `w:t` runs, one paragraph (`w:p`) per block.
fn word_runs_to_text(xml: &[u8]) -> Result<String, IngestError> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(element)) if element.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(element)) => match element.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !current.trim().is_empty() {
                        paragraphs.push(current.trim().to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Text(text)) if in_text => {
                current.push_str(text.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::Eof) => break,
            Err(error) => {
                return Err(IngestError::InvalidArgument(format!("docx xml: {error}")));
            }
            _ => {}
        }
        buf.clear();
    }

    if !current.trim().is_empty() {
        paragraphs.push(current.trim().to_string());
    }

    Ok(paragraphs.join("\n\n"))
}

/// Visible text of an HTML page, one block per text node.
pub fn extract_html_text(html: &str) -> String {
    const SKIPPED: [&str; 6] = ["script", "style", "noscript", "iframe", "svg", "head"];

    let document = Html::parse_document(html);
    let root = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next())
        .unwrap_or_else(|| document.root_element());

    let mut parts = Vec::new();
    collect_text(root, &SKIPPED, &mut parts);
    parts.join("\n")
}

fn collect_text(element: scraper::ElementRef<'_>, skipped: &[&str], parts: &mut Vec<String>) {
    use scraper::node::Node;

    if skipped.contains(&element.value().name()) {
        return;
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
            }
            Node::Element(_) => {
                if let Some(child_element) = scraper::ElementRef::wrap(child) {
                    collect_text(child_element, skipped, parts);
                }
            }
            _ => {}
        }
    }
}
