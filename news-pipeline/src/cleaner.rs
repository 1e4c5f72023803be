use crate::text::tidy;
use crate::types::{PipelineError, Result};
use regex::Regex;
use scraper::Html;
use std::sync::OnceLock;
use tracing::debug;

fn script_style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").expect("static regex"))
}

fn block_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)</?(p|div|li|ul|ol|blockquote|section|article|h[1-6])\b[^>]*>|<br\s*/?>")
            .expect("static regex")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"))
}

fn paragraph_gap_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t\r]*\n").expect("static regex"))
}

/// Turns feed markup into ordered, whitespace-normalized paragraphs.
#[derive(Debug, Clone)]
pub struct ContentCleaner {
    min_chars: usize,
}

impl ContentCleaner {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }

    /// Pure: the same input always yields the same paragraphs.
    /// Fails with `CleaningFailure` when too little text survives.
    pub fn clean(&self, raw: &str) -> Result<Vec<String>> {
        let without_code = script_style_re().replace_all(raw, " ");
        let with_breaks = block_break_re().replace_all(&without_code, "\n\n");
        let stripped = tag_re().replace_all(&with_breaks, " ");
        // Feeds sometimes escape their markup twice.
        let decoded = decode_entities(&stripped);
        let decoded = tag_re().replace_all(&decoded, " ");

        let paragraphs: Vec<String> = paragraph_gap_re()
            .split(&decoded)
            .map(tidy)
            .filter(|p| p.chars().any(|c| c.is_alphanumeric()))
            .collect();

        let chars = meaningful_chars(&paragraphs);
        if chars < self.min_chars {
            debug!("Cleaning produced {} meaningful chars (min {})", chars, self.min_chars);
            return Err(PipelineError::CleaningFailure {
                chars,
                min: self.min_chars,
            });
        }

        Ok(paragraphs)
    }
}

impl Default for ContentCleaner {
    fn default() -> Self {
        Self::new(80)
    }
}

fn meaningful_chars(paragraphs: &[String]) -> usize {
    paragraphs
        .iter()
        .flat_map(|p| p.chars())
        .filter(|c| c.is_alphanumeric())
        .count()
}

/// Character references are decoded by an HTML parser. Tags are already gone, so
/// the fragment is plain text apart from references.
fn decode_entities(text: &str) -> String {
    Html::parse_fragment(text).root_element().text().collect()
}
