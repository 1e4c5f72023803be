use crate::types::{ParsedEntry, ParsedFeed, PipelineError, Result};
use chrono::Utc;
use feed_rs::parser;
use std::collections::HashSet;
use tracing::{debug, info};

/// RSS/Atom parsing on top of `feed-rs`, dropping entries already seen by GUID or URL.
pub struct FeedParser {
    seen_guids: HashSet<String>,
    seen_urls: HashSet<String>,
}

impl FeedParser {
    pub fn new() -> Self {
        Self {
            seen_guids: HashSet::new(),
            seen_urls: HashSet::new(),
        }
    }

    pub fn parse_feed(&mut self, content: &str) -> Result<ParsedFeed> {
        debug!("Parsing feed content ({} bytes)", content.len());

        if !Self::is_valid_feed_content(content) {
            return Err(PipelineError::Parse("Content does not look like an RSS or Atom feed".to_string()));
        }

        let feed = parser::parse(content.as_bytes())
            .map_err(|e| PipelineError::Parse(format!("Failed to parse feed: {}", e)))?;

        let title = feed.title.map(|t| t.content);
        let description = feed.description.map(|d| d.content);

        let entries: Vec<ParsedEntry> = feed
            .entries
            .into_iter()
            .filter_map(|entry| self.parse_entry(entry))
            .collect();

        info!("Parsed feed with {} entries", entries.len());

        Ok(ParsedFeed {
            title,
            description,
            entries,
        })
    }

    fn parse_entry(&mut self, entry: feed_rs::model::Entry) -> Option<ParsedEntry> {
        let title = entry
            .title
            .map(|t| t.content)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Untitled".to_string());

        let url = entry.links.first()?.href.clone();

        let guid = if !entry.id.is_empty() { Some(entry.id.clone()) } else { None };

        if let Some(ref guid) = guid {
            if !self.seen_guids.insert(guid.clone()) {
                debug!("Skipping duplicate entry with GUID: {}", guid);
                return None;
            }
        }

        if !self.seen_urls.insert(url.clone()) {
            debug!("Skipping duplicate entry with URL: {}", url);
            return None;
        }

        let description = entry.summary.map(|s| s.content);
        let content = entry.content.and_then(|c| c.body);
        let published_at = entry
            .published
            .or(entry.updated)
            .map(|dt| dt.with_timezone(&Utc));

        Some(ParsedEntry {
            guid,
            url,
            title,
            description,
            content,
            published_at,
        })
    }

    pub fn is_valid_feed_content(content: &str) -> bool {
        let content_lower = content.to_lowercase();

        content_lower.contains("<rss")
            || content_lower.contains("<feed")
            || content_lower.contains("<rdf:rdf")
            || content_lower.contains("<channel")
    }
}

impl Default for FeedParser {
    fn default() -> Self {
        Self::new()
    }
}
