use crate::error::IngestError;
use crate::models::{Chunk, SourceFile};
use regex::Regex;

const PARAGRAPH_BREAK: &str = r"\n\s*\n";
const SENTENCE_END: &str = r"[.!?]\s+";

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    /// Largest fragment the paragraph and sentence tiers may emit.
    pub max_chars: usize,
    /// Fragments must be strictly longer than this.
    pub min_chars: usize,
    pub window_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 2_000,
            min_chars: 20,
            window_chars: 500,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.window_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "window_chars must be positive".to_string(),
            ));
        }
        if self.window_chars > self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "window_chars {} exceeds max_chars {}",
                self.window_chars, self.max_chars
            )));
        }
        if self.min_chars >= self.window_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "min_chars {} must be below window_chars {}",
                self.min_chars, self.window_chars
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkTier {
    Paragraph,
    Sentence,
    Window,
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Paragraphs, then sentences, then fixed windows; one tier per document.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IngestError> {
    Ok(chunk_text_with_tier(text, config)?
        .map(|(_, fragments)| fragments)
        .unwrap_or_default())
}

pub fn chunk_text_with_tier(
    text: &str,
    config: ChunkingConfig,
) -> Result<Option<(ChunkTier, Vec<String>)>, IngestError> {
    config.validate()?;

    let text = text.replace("\r\n", "\n");
    if text.trim().is_empty() {
        return Ok(None);
    }

    let paragraph_re = Regex::new(PARAGRAPH_BREAK)?;
    let paragraphs = keep_fragments(paragraph_re.split(&text).map(str::to_string), config);
    if fits(&paragraphs, config) {
        return Ok(Some((ChunkTier::Paragraph, paragraphs)));
    }

    let sentence_re = Regex::new(SENTENCE_END)?;
    let sentences = keep_fragments(split_sentences(&text, &sentence_re), config);
    if fits(&sentences, config) {
        return Ok(Some((ChunkTier::Sentence, sentences)));
    }

    let windows = keep_fragments(split_windows(&text, config.window_chars), config);
    if windows.is_empty() {
        return Ok(None);
    }
    Ok(Some((ChunkTier::Window, windows)))
}

fn keep_fragments(
    fragments: impl Iterator<Item = String>,
    config: ChunkingConfig,
) -> Vec<String> {
    fragments
        .map(|fragment| fragment.trim().to_string())
        .filter(|fragment| fragment.chars().count() > config.min_chars)
        .collect()
}

fn fits(fragments: &[String], config: ChunkingConfig) -> bool {
    !fragments.is_empty()
        && fragments
            .iter()
            .all(|fragment| fragment.chars().count() <= config.max_chars)
}

fn split_sentences(text: &str, sentence_re: &Regex) -> std::vec::IntoIter<String> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for terminator in sentence_re.find_iter(text) {
        // the terminator is a single ASCII byte; keep it with its sentence
        let end = terminator.start() + 1;
        sentences.push(text[start..end].to_string());
        start = terminator.end();
    }

    if start < text.len() {
        sentences.push(text[start..].to_string());
    }

    sentences.into_iter()
}

fn split_windows(text: &str, window_chars: usize) -> std::vec::IntoIter<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(window_chars)
        .map(|window| window.iter().collect::<String>())
        .collect::<Vec<_>>()
        .into_iter()
}

pub fn build_chunks(
    file: &SourceFile,
    text: &str,
    config: ChunkingConfig,
) -> Result<Vec<Chunk>, IngestError> {
    Ok(chunk_text(text, config)?
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk {
            file_id: file.file_id.clone(),
            chunk_index: index as u64,
            text,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceFile {
        SourceFile {
            file_id: "file-1".to_string(),
            name: "guide.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            modified_at: None,
        }
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof\u{a0}\u{a0}spacing";
        let normalized = normalize_whitespace(input);
        assert_eq!(normalized, "A lot of spacing");
    }

    #[test]
    fn paragraphs_are_preferred_and_short_noise_dropped() {
        let text = "First paragraph about alt text on images.\n\nok\n\n  \nSecond paragraph about heading structure.";
        let (tier, chunks) = chunk_text_with_tier(text, ChunkingConfig::default())
            .unwrap()
            .unwrap();

        assert_eq!(tier, ChunkTier::Paragraph);
        assert_eq!(
            chunks,
            vec![
                "First paragraph about alt text on images.".to_string(),
                "Second paragraph about heading structure.".to_string(),
            ]
        );
    }

    #[test]
    fn sentence_tier_used_when_paragraph_too_large() {
        let sentence = "Every form control needs a programmatic label for screen readers";
        let text = std::iter::repeat(format!("{sentence}. "))
            .take(40)
            .collect::<String>();
        assert!(text.len() > 2_000);

        let (tier, chunks) = chunk_text_with_tier(&text, ChunkingConfig::default())
            .unwrap()
            .unwrap();

        assert_eq!(tier, ChunkTier::Sentence);
        assert_eq!(chunks.len(), 40);
        assert_eq!(chunks[0], format!("{sentence}."));
    }

    #[test]
    fn unpunctuated_run_falls_back_to_windows() {
        let text = "a".repeat(3_000);
        let (tier, chunks) = chunk_text_with_tier(&text, ChunkingConfig::default())
            .unwrap()
            .unwrap();

        assert_eq!(tier, ChunkTier::Window);
        assert_eq!(chunks.len(), 6);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 500));
    }

    #[test]
    fn windows_respect_char_boundaries() {
        let text = "é".repeat(2_200);
        let chunks = chunk_text(&text, ChunkingConfig::default()).unwrap();
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks[4].chars().count(), 200);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("   \n\n ", ChunkingConfig::default())
            .unwrap()
            .is_empty());
        assert!(chunk_text("too short", ChunkingConfig::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn build_chunks_numbers_contiguously() {
        let text = "Paragraph one is long enough to keep.\n\nParagraph two is long enough to keep.\n\nParagraph three is long enough to keep.";
        let chunks = build_chunks(&source(), text, ChunkingConfig::default()).unwrap();

        let indexes: Vec<u64> = chunks.iter().map(|chunk| chunk.chunk_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert!(chunks.iter().all(|chunk| chunk.file_id == "file-1"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ChunkingConfig {
            max_chars: 100,
            min_chars: 20,
            window_chars: 0,
        };
        assert!(chunk_text("anything at all here to chunk", config).is_err());
    }
}
