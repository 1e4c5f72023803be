use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use interfaces::defs::{
    AdaptedContent, AgeTier, AnswerState, Article, ArticleId, Category, Question, QuestionId, SourceSpec, Subject,
};

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub source_name: String,
    pub success: bool,
    pub error: Option<String>,
    pub fetch_time: DateTime<Utc>,
    pub response_time_ms: u64,
    pub http_status: Option<u16>,
    pub content: Option<String>, // RSS/XML content
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
    /// Minimum spacing between two requests to the same host.
    pub min_host_interval_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "KnowledgeRUs-News/1.0".to_string(),
            timeout_seconds: 10,
            max_retries: 2,
            retry_delay_seconds: 1,
            max_feed_size_mb: 10,
            max_redirects: 5,
            min_host_interval_ms: 1000,
        }
    }
}

#[derive(Debug)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub entries: Vec<ParsedEntry>,
}

#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub guid: Option<String>,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl ParsedEntry {
    /// Body to clean: full content when the feed carries it, else the summary, else the title.
    pub fn body(&self) -> &str {
        self.content
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .or(self.description.as_deref().filter(|d| !d.trim().is_empty()))
            .unwrap_or(&self.title)
    }
}

/// What one pass over the source list produced.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub articles: Vec<Article>,
    /// Source name -> whether that source failed and was replaced by fallback content.
    pub failures: BTreeMap<String, bool>,
}

/// Returned to the presentation layer after a refresh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub article_count: usize,
    pub failures: BTreeMap<String, bool>,
    pub article_ids: Vec<ArticleId>,
}

impl RefreshSummary {
    pub fn failed_sources(&self) -> Vec<&str> {
        self.failures
            .iter()
            .filter(|(_, failed)| **failed)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Fetch failed for {source_name}: {reason}")]
    FetchFailure { source_name: String, reason: String },

    #[error("Cleaning left {chars} meaningful characters, need at least {min}")]
    CleaningFailure { chars: usize, min: usize },

    #[error("Adaptation degraded to rule-based output: {0}")]
    AdaptationDegraded(String),

    #[error("Embedding dimension mismatch: index holds {expected}, got {actual}")]
    IndexDimensionMismatch { expected: usize, actual: usize },

    #[error("Article not found: {id}")]
    ArticleNotFound { id: ArticleId },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("General error: {0}")]
    General(String),
}

impl From<figment::Error> for PipelineError {
    fn from(e: figment::Error) -> Self {
        PipelineError::Config(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(content: Option<&str>, description: Option<&str>) -> ParsedEntry {
        ParsedEntry {
            guid: None,
            url: "https://example.com/a".to_string(),
            title: "Title only".to_string(),
            description: description.map(str::to_string),
            content: content.map(str::to_string),
            published_at: None,
        }
    }

    #[test]
    fn body_prefers_content_then_summary_then_title() {
        assert_eq!(entry(Some("<p>full</p>"), Some("short")).body(), "<p>full</p>");
        assert_eq!(entry(Some("   "), Some("short")).body(), "short");
        assert_eq!(entry(None, None).body(), "Title only");
    }

    #[test]
    fn failed_sources_lists_only_flagged() {
        let mut summary = RefreshSummary::default();
        summary.failures.insert("ScienceDaily".to_string(), true);
        summary.failures.insert("Wired".to_string(), false);
        assert_eq!(summary.failed_sources(), vec!["ScienceDaily"]);
    }
}
