use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Namespace for every identifier derived in this workspace. Articles hash their
// source URL and publish time under it, questions hash (article, subject, tier).
const KNOWLEDGE_NAMESPACE: Uuid = Uuid::from_u128(0x6b6e_6f77_6c65_6467_6572_7573_6e65_7773);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArticleId(pub Uuid);

impl ArticleId {
    pub fn derive(url: &str, published_at: &DateTime<Utc>) -> Self {
        let key = format!("{}#{}", url, published_at.to_rfc3339_opts(SecondsFormat::Secs, true));
        Self(Uuid::new_v5(&KNOWLEDGE_NAMESPACE, key.as_bytes()))
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ArticleId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuestionId(pub Uuid);

impl QuestionId {
    pub fn derive(article_id: ArticleId, subject: Subject, tier: AgeTier) -> Self {
        let key = format!("{}/{}/{}", article_id, subject.as_str(), tier.as_str());
        Self(Uuid::new_v5(&KNOWLEDGE_NAMESPACE, key.as_bytes()))
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for QuestionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Reading-level band. Ordered from youngest to oldest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgeTier {
    #[serde(rename = "6-8")]
    Ages6To8,
    #[serde(rename = "9-11")]
    Ages9To11,
    #[serde(rename = "12-14")]
    Ages12To14,
    #[serde(rename = "15-17")]
    Ages15To17,
}

impl AgeTier {
    pub const ALL: [AgeTier; 4] = [
        AgeTier::Ages6To8,
        AgeTier::Ages9To11,
        AgeTier::Ages12To14,
        AgeTier::Ages15To17,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeTier::Ages6To8 => "6-8",
            AgeTier::Ages9To11 => "9-11",
            AgeTier::Ages12To14 => "12-14",
            AgeTier::Ages15To17 => "15-17",
        }
    }

    /// The next younger tier, if any.
    pub fn younger(&self) -> Option<AgeTier> {
        match self {
            AgeTier::Ages6To8 => None,
            AgeTier::Ages9To11 => Some(AgeTier::Ages6To8),
            AgeTier::Ages12To14 => Some(AgeTier::Ages9To11),
            AgeTier::Ages15To17 => Some(AgeTier::Ages12To14),
        }
    }
}

impl fmt::Display for AgeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgeTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "6-8" => Ok(AgeTier::Ages6To8),
            "9-11" => Ok(AgeTier::Ages9To11),
            "12-14" => Ok(AgeTier::Ages12To14),
            "15-17" => Ok(AgeTier::Ages15To17),
            other => Err(format!("unknown age tier '{}', expected one of 6-8, 9-11, 12-14, 15-17", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Subject {
    Math,
    Science,
    #[serde(rename = "ELA")]
    Ela,
}

impl Subject {
    pub const ALL: [Subject; 3] = [Subject::Math, Subject::Science, Subject::Ela];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Math => "Math",
            Subject::Science => "Science",
            Subject::Ela => "ELA",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Science,
    Technology,
    Environment,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Science, Category::Technology, Category::Environment];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Science => "science",
            Category::Technology => "technology",
            Category::Environment => "environment",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "science" => Ok(Category::Science),
            "technology" | "tech" => Ok(Category::Technology),
            "environment" => Ok(Category::Environment),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}

/// A configured feed: display name, feed URL and the category its articles belong to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub url: String,
    pub category: Category,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub category: Category,
    pub source_name: String,
    pub title: String,
    pub url: String,
    pub raw_text: String,
    /// Paragraphs in reading order. Never empty once the article leaves the cleaner.
    pub cleaned: Vec<String>,
    pub published_at: DateTime<Utc>,
    pub is_fallback: bool,
}

impl Article {
    pub fn cleaned_text(&self) -> String {
        self.cleaned.join("\n\n")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdaptedContent {
    pub article_id: ArticleId,
    pub tier: AgeTier,
    pub title: String,
    pub paragraphs: Vec<String>,
    pub llm_assisted: bool,
}

impl AdaptedContent {
    pub fn text(&self) -> String {
        self.paragraphs.join("\n\n")
    }

    pub fn word_count(&self) -> usize {
        self.paragraphs.iter().map(|p| p.split_whitespace().count()).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub article_id: ArticleId,
    pub subject: Subject,
    pub tier: AgeTier,
    pub prompt: String,
    pub options: Vec<String>,
    pub answer: String,
    /// Accepted absolute deviation for numeric answers.
    pub tolerance: Option<f64>,
    pub hint: String,
    pub explanation: String,
    pub reasoning: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerState {
    Unattempted,
    HintShown,
    Resolved,
}

// Object style note:
// Articles, adapted content and questions are immutable values once built.
// The stores that hold them live in the pipeline crate and are handed to each
// component explicitly; nothing here keeps global state.

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn article_ids_are_stable_per_url_and_time() {
        let published = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let a = ArticleId::derive("https://example.com/moon", &published);
        let b = ArticleId::derive("https://example.com/moon", &published);
        let c = ArticleId::derive("https://example.com/moon", &(published + chrono::Duration::seconds(1)));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn question_ids_differ_per_subject_and_tier() {
        let published = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let article = ArticleId::derive("https://example.com/moon", &published);
        let math = QuestionId::derive(article, Subject::Math, AgeTier::Ages6To8);
        assert_eq!(math, QuestionId::derive(article, Subject::Math, AgeTier::Ages6To8));
        assert_ne!(math, QuestionId::derive(article, Subject::Science, AgeTier::Ages6To8));
        assert_ne!(math, QuestionId::derive(article, Subject::Math, AgeTier::Ages9To11));
    }

    #[test]
    fn age_tiers_parse_and_order() {
        for tier in AgeTier::ALL {
            assert_eq!(tier.as_str().parse::<AgeTier>().unwrap(), tier);
        }
        assert!(AgeTier::Ages6To8 < AgeTier::Ages15To17);
        assert_eq!(AgeTier::Ages12To14.younger(), Some(AgeTier::Ages9To11));
        assert!("5-7".parse::<AgeTier>().is_err());
    }

    #[test]
    fn tiers_serialize_as_bands() {
        let json = serde_json::to_string(&AgeTier::Ages9To11).unwrap();
        assert_eq!(json, "\"9-11\"");
        let subject = serde_json::to_string(&Subject::Ela).unwrap();
        assert_eq!(subject, "\"ELA\"");
    }
}
