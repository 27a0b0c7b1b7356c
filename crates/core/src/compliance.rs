use crate::chunking::normalize_whitespace;
use crate::extractor::{extract_html_text, extract_text, MIME_PDF};
use crate::ingest::resolve_within;
use crate::llm::{ChatMessage, ChatModel};
use crate::IngestError;
use lopdf::{Dictionary, Document, Object};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const MAX_ITEMS: usize = 10;
pub const MAX_PROMPT_CHARS: usize = 12_000;
pub const FALLBACK_SUMMARY: &str =
    "The compliance report could not be generated from the model response. Review the document manually.";

const ANALYSIS_INSTRUCTIONS: &str = "You audit documents for WCAG 2.1 and ADA accessibility. \
Reply with a single JSON object and nothing else, shaped as: \
{\"score\": <integer 0-100>, \"level\": \"A\" | \"AA\" | \"AAA\" | \"non-compliant\", \
\"summary\": <string>, \"issues\": [{\"criterion\": <string>, \"severity\": \"low\" | \"medium\" | \"high\", \
\"description\": <string>}], \"recommendations\": [<string>]}";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ComplianceLevel {
    #[serde(rename = "A")]
    A,
    #[serde(rename = "AA")]
    Aa,
    #[serde(rename = "AAA")]
    Aaa,
    #[serde(rename = "non-compliant")]
    NonCompliant,
    #[serde(rename = "unknown")]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceIssue {
    pub criterion: String,
    pub severity: Severity,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceReport {
    pub score: u8,
    pub level: ComplianceLevel,
    pub summary: String,
    pub issues: Vec<ComplianceIssue>,
    pub recommendations: Vec<String>,
}

impl ComplianceReport {
    pub fn fallback() -> Self {
        Self {
            score: 0,
            level: ComplianceLevel::Unknown,
            summary: FALLBACK_SUMMARY.to_string(),
            issues: Vec::new(),
            recommendations: Vec::new(),
        }
    }
}

/// The outermost `{ ... }` span of `text`, if any.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Strict parse of a model reply; any deviation yields the fallback report.
pub fn parse_compliance_report(reply: &str) -> ComplianceReport {
    let Some(json) = extract_json_object(reply) else {
        warn!("model reply contains no JSON object, using fallback report");
        return ComplianceReport::fallback();
    };

    match serde_json::from_str::<ComplianceReport>(json) {
        Ok(report) if report.score <= 100 => report,
        Ok(report) => {
            warn!(score = report.score, "score out of range, using fallback report");
            ComplianceReport::fallback()
        }
        Err(error) => {
            warn!(%error, "model reply does not match report schema, using fallback report");
            ComplianceReport::fallback()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceOutcome {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ComplianceReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediated_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PdfMetadata {
    pub title: String,
    pub language: String,
    pub producer: String,
    pub creator: String,
}

impl PdfMetadata {
    pub fn for_title(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            language: "en-US".to_string(),
            producer: "accessdoc".to_string(),
            creator: "accessdoc".to_string(),
        }
    }
}

/// Sets Title, Producer, Creator and `/Lang` on a copy of `input`.
pub fn remediate_pdf_metadata(
    input: &Path,
    output: &Path,
    metadata: &PdfMetadata,
) -> Result<(), IngestError> {
    let mut doc =
        Document::load(input).map_err(|error| IngestError::PdfParse(error.to_string()))?;

    let info_id = match doc.trailer.get(b"Info").and_then(Object::as_reference) {
        Ok(id) => id,
        Err(_) => {
            let id = doc.add_object(Dictionary::new());
            doc.trailer.set("Info", Object::Reference(id));
            id
        }
    };
    let info = doc
        .get_object_mut(info_id)
        .and_then(Object::as_dict_mut)
        .map_err(|error| IngestError::PdfParse(format!("info dictionary: {error}")))?;
    info.set("Title", Object::string_literal(metadata.title.as_str()));
    info.set("Producer", Object::string_literal(metadata.producer.as_str()));
    info.set("Creator", Object::string_literal(metadata.creator.as_str()));

    let root_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|error| IngestError::PdfParse(format!("catalog: {error}")))?;
    let catalog = doc
        .get_object_mut(root_id)
        .and_then(Object::as_dict_mut)
        .map_err(|error| IngestError::PdfParse(format!("catalog: {error}")))?;
    catalog.set("Lang", Object::string_literal(metadata.language.as_str()));

    doc.save(output)?;
    Ok(())
}

fn remediated_path_for(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    input.with_file_name(format!("{stem}.remediated.pdf"))
}

enum ItemSource {
    Url(String),
    Local(PathBuf),
}

fn is_url(item: &str) -> bool {
    item.starts_with("http://") || item.starts_with("https://")
}

pub struct ComplianceAnalyzer<'a, C: ChatModel + ?Sized> {
    model: &'a C,
    client: Client,
    docs_root: PathBuf,
    remediate: bool,
}

impl<'a, C: ChatModel + ?Sized> ComplianceAnalyzer<'a, C> {
    /// Local items are paths relative to `docs_root`.
    pub fn new(model: &'a C, docs_root: impl Into<PathBuf>) -> Result<Self, IngestError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            model,
            client,
            docs_root: docs_root.into(),
            remediate: false,
        })
    }

    /// Also write metadata-remediated copies of local PDFs.
    pub fn with_remediation(mut self, remediate: bool) -> Self {
        self.remediate = remediate;
        self
    }

    pub async fn analyze(&self, items: &[String]) -> Result<Vec<ComplianceOutcome>, IngestError> {
        if items.is_empty() || items.len() > MAX_ITEMS {
            return Err(IngestError::Validation(format!(
                "between 1 and {MAX_ITEMS} items are required, got {}",
                items.len()
            )));
        }

        let sources = items
            .iter()
            .map(|item| {
                let item = item.trim();
                if is_url(item) {
                    Ok(ItemSource::Url(item.to_string()))
                } else {
                    resolve_within(&self.docs_root, item).map(ItemSource::Local)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut outcomes = Vec::with_capacity(items.len());
        for (item, source) in items.iter().zip(&sources) {
            let outcome = match self.analyze_item(item.trim(), source).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    warn!(source = %item, %error, "compliance analysis failed");
                    ComplianceOutcome {
                        source: item.clone(),
                        report: None,
                        remediated_path: None,
                        error: Some(error.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        info!(
            items = outcomes.len(),
            failed = outcomes.iter().filter(|outcome| outcome.error.is_some()).count(),
            "compliance analysis complete"
        );
        Ok(outcomes)
    }

    async fn analyze_item(
        &self,
        item: &str,
        source: &ItemSource,
    ) -> Result<ComplianceOutcome, IngestError> {
        let text = match source {
            ItemSource::Url(url) => self.download_text(url).await?,
            ItemSource::Local(path) => {
                let bytes = tokio::fs::read(path).await?;
                let mime = mime_guess::from_path(path)
                    .first_raw()
                    .unwrap_or("text/plain");
                extract_text(&bytes, mime)
            }
        };

        if text.trim().is_empty() {
            return Err(IngestError::Validation(format!("no text extracted from {item}")));
        }

        let excerpt: String = normalize_whitespace(&text)
            .chars()
            .take(MAX_PROMPT_CHARS)
            .collect();
        let prompt = format!("Source: {item}\n\nDocument text:\n{excerpt}");
        let reply = self
            .model
            .complete(&[ChatMessage::user(prompt)], Some(ANALYSIS_INSTRUCTIONS))
            .await?;
        let report = parse_compliance_report(&reply);

        let remediated_path = match source {
            ItemSource::Local(path) if self.remediate && is_pdf_path(path) => {
                self.remediate_local(path)
            }
            _ => None,
        };

        Ok(ComplianceOutcome {
            source: item.to_string(),
            report: Some(report),
            remediated_path,
            error: None,
        })
    }

    async fn download_text(&self, url: &str) -> Result<String, IngestError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let bytes = response.bytes().await?;

        let text = if content_type.contains("pdf") || bytes.starts_with(b"%PDF") {
            extract_text(&bytes, MIME_PDF)
        } else if content_type.contains("html") || content_type.is_empty() {
            extract_html_text(&String::from_utf8_lossy(&bytes))
        } else {
            extract_text(&bytes, &content_type)
        };
        Ok(text)
    }

    fn remediate_local(&self, input: &Path) -> Option<String> {
        let output = remediated_path_for(input);
        let title = input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        match remediate_pdf_metadata(input, &output, &PdfMetadata::for_title(title)) {
            Ok(()) => Some(output.display().to_string()),
            Err(error) => {
                warn!(source = %input.display(), %error, "pdf metadata remediation skipped");
                None
            }
        }
    }
}

fn is_pdf_path(path: &Path) -> bool {
    mime_guess::from_path(path).first_raw() == Some(MIME_PDF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServiceError;
    use async_trait::async_trait;
    use lopdf::dictionary;

    struct CannedModel(String);

    #[async_trait]
    impl ChatModel for CannedModel {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _system_context: Option<&str>,
        ) -> Result<String, ServiceError> {
            Ok(self.0.clone())
        }
    }

    const VALID_REPLY: &str = r#"Here is the report:
{"score": 72, "level": "AA", "summary": "Mostly fine.",
 "issues": [{"criterion": "1.1.1", "severity": "high", "description": "Images lack alt text."}],
 "recommendations": ["Add alt text"]}
Thanks."#;

    #[test]
    fn report_is_parsed_from_surrounding_prose() {
        let report = parse_compliance_report(VALID_REPLY);
        assert_eq!(report.score, 72);
        assert_eq!(report.level, ComplianceLevel::Aa);
        assert_eq!(report.issues[0].severity, Severity::High);
        assert_eq!(report.recommendations, vec!["Add alt text".to_string()]);
    }

    #[test]
    fn malformed_replies_fall_back() {
        for reply in [
            "no json here",
            "{not json}",
            r#"{"score": 50, "level": "AA", "summary": "missing lists"}"#,
            r#"{"score": 150, "level": "AA", "summary": "", "issues": [], "recommendations": []}"#,
            r#"{"score": 50, "level": "gold", "summary": "", "issues": [], "recommendations": []}"#,
        ] {
            assert_eq!(parse_compliance_report(reply), ComplianceReport::fallback());
        }
    }

    #[test]
    fn fallback_is_unknown_with_zero_score() {
        let fallback = ComplianceReport::fallback();
        assert_eq!(fallback.score, 0);
        assert_eq!(
            serde_json::to_value(&fallback).unwrap()["level"],
            "unknown"
        );
    }

    #[tokio::test]
    async fn item_count_is_validated() {
        let model = CannedModel(VALID_REPLY.to_string());
        let analyzer = ComplianceAnalyzer::new(&model, ".").unwrap();

        assert!(matches!(
            analyzer.analyze(&[]).await,
            Err(IngestError::Validation(_))
        ));
        let too_many = vec!["a.pdf".to_string(); MAX_ITEMS + 1];
        assert!(matches!(
            analyzer.analyze(&too_many).await,
            Err(IngestError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn failing_items_do_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("notes.txt"),
            "Headings are used consistently across the document.",
        )
        .unwrap();

        let model = CannedModel(VALID_REPLY.to_string());
        let analyzer = ComplianceAnalyzer::new(&model, dir.path()).unwrap();
        let outcomes = analyzer
            .analyze(&["missing.pdf".to_string(), "notes.txt".to_string()])
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].error.is_some());
        assert!(outcomes[0].report.is_none());
        assert_eq!(outcomes[1].report.as_ref().map(|report| report.score), Some(72));
    }

    #[tokio::test]
    async fn local_items_must_stay_under_the_docs_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("docs");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("ok.txt"), "Readable text inside the document root.").unwrap();
        std::fs::write(dir.path().join("private.txt"), "Text outside the document root.").unwrap();

        let model = CannedModel(VALID_REPLY.to_string());
        let analyzer = ComplianceAnalyzer::new(&model, &root).unwrap();

        for outside in ["../private.txt", "/etc/hostname"] {
            let result = analyzer
                .analyze(&["ok.txt".to_string(), outside.to_string()])
                .await;
            assert!(
                matches!(result, Err(IngestError::Validation(_))),
                "{outside} was not refused"
            );
        }
    }

    fn write_minimal_pdf(path: &Path) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn remediation_sets_info_and_language() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("report.pdf");
        write_minimal_pdf(&input);

        let output = remediated_path_for(&input);
        assert_eq!(output.file_name().unwrap(), "report.remediated.pdf");
        remediate_pdf_metadata(&input, &output, &PdfMetadata::for_title("Annual Report")).unwrap();

        let saved = Document::load(&output).unwrap();
        let info_id = saved.trailer.get(b"Info").unwrap().as_reference().unwrap();
        let info = saved.get_object(info_id).unwrap().as_dict().unwrap();
        assert_eq!(info.get(b"Title").unwrap().as_str().unwrap(), b"Annual Report");
        let catalog = saved.catalog().unwrap();
        assert_eq!(catalog.get(b"Lang").unwrap().as_str().unwrap(), b"en-US");
    }

    #[test]
    fn remediation_of_non_pdf_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("fake.pdf");
        std::fs::write(&input, "not a pdf").unwrap();
        let output = dir.path().join("out.pdf");
        assert!(remediate_pdf_metadata(&input, &output, &PdfMetadata::for_title("x")).is_err());
    }
}
