use crate::cleaner::ContentCleaner;
use crate::fallback::FallbackLibrary;
use crate::fetcher::Fetcher;
use crate::parser::FeedParser;
use crate::text::tidy;
use crate::traits::PullFeed;
use crate::types::{
    Article, ArticleId, FetchConfig, FetchReport, ParsedEntry, PipelineError, Result, SourceSpec,
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// `PullFeed` over HTTP: `Fetcher` for transport, `FeedParser` for RSS/Atom.
pub struct RssPuller {
    fetcher: Fetcher,
}

impl RssPuller {
    pub fn new(config: FetchConfig) -> Result<Self> {
        Ok(Self {
            fetcher: Fetcher::new(config)?,
        })
    }
}

#[async_trait]
impl PullFeed for RssPuller {
    async fn pull(&self, source: &SourceSpec) -> Result<Vec<ParsedEntry>> {
        let result = self.fetcher.fetch_feed(&source.name, &source.url).await?;
        if !result.success {
            return Err(PipelineError::FetchFailure {
                source_name: source.name.clone(),
                reason: result.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        let content = result.content.ok_or_else(|| PipelineError::FetchFailure {
            source_name: source.name.clone(),
            reason: "Empty payload".to_string(),
        })?;

        // A fresh parser per pull: duplicates are dropped within one feed document,
        // while a later refresh still sees every entry.
        let mut parser = FeedParser::new();
        Ok(parser.parse_feed(&content)?.entries)
    }
}

/// Turns a source list into clean articles. Failures never escape: a failed source is
/// flagged and replaced by fallback content, an uncleanable entry by a fallback article.
pub struct FeedFetcher {
    puller: Arc<dyn PullFeed>,
    cleaner: ContentCleaner,
    fallbacks: Arc<FallbackLibrary>,
    source_timeout: Duration,
    max_articles_per_source: usize,
    max_concurrent: usize,
}

enum SourceOutcome {
    Pulled(Vec<Article>),
    Failed(Article),
}

impl FeedFetcher {
    pub fn new(puller: Arc<dyn PullFeed>, cleaner: ContentCleaner, fallbacks: Arc<FallbackLibrary>) -> Self {
        Self {
            puller,
            cleaner,
            fallbacks,
            source_timeout: Duration::from_secs(30),
            max_articles_per_source: 5,
            max_concurrent: 4,
        }
    }

    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    pub fn with_max_articles_per_source(mut self, max: usize) -> Self {
        self.max_articles_per_source = max.max(1);
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    pub async fn fetch(&self, sources: &[SourceSpec]) -> FetchReport {
        info!("Fetching {} sources ({} at a time)", sources.len(), self.max_concurrent);

        let pending: Vec<_> = sources
            .iter()
            .enumerate()
            .map(|(index, source)| async move { (index, self.fetch_source(source).await) })
            .collect();
        let mut outcomes: Vec<(usize, SourceOutcome)> = stream::iter(pending)
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;
        // Keep the caller's source order regardless of completion order.
        outcomes.sort_by_key(|(index, _)| *index);

        let mut report = FetchReport::default();
        let mut seen: HashSet<ArticleId> = HashSet::new();
        for ((_, outcome), source) in outcomes.into_iter().zip(sources) {
            let (failed, articles) = match outcome {
                SourceOutcome::Pulled(articles) => (false, articles),
                SourceOutcome::Failed(fallback) => (true, vec![fallback]),
            };
            report.failures.insert(source.name.clone(), failed);
            report
                .articles
                .extend(articles.into_iter().filter(|a| seen.insert(a.id)));
        }

        let failed = report.failures.values().filter(|f| **f).count();
        info!(
            "Fetch finished: {} articles, {}/{} sources failed",
            report.articles.len(),
            failed,
            sources.len()
        );
        report
    }

    async fn fetch_source(&self, source: &SourceSpec) -> SourceOutcome {
        let pulled = tokio::time::timeout(self.source_timeout, self.puller.pull(source)).await;
        let entries = match pulled {
            Ok(Ok(entries)) if !entries.is_empty() => entries,
            Ok(Ok(_)) => return self.fail(source, "feed had no entries".to_string()),
            Ok(Err(e)) => return self.fail(source, e.to_string()),
            Err(_) => return self.fail(source, format!("timed out after {:?}", self.source_timeout)),
        };

        let articles = entries
            .iter()
            .take(self.max_articles_per_source)
            .map(|entry| self.build_article(source, entry))
            .collect();
        SourceOutcome::Pulled(articles)
    }

    fn fail(&self, source: &SourceSpec, reason: String) -> SourceOutcome {
        let error = PipelineError::FetchFailure {
            source_name: source.name.clone(),
            reason,
        };
        warn!("{}; substituting fallback {} content", error, source.category);
        SourceOutcome::Failed(self.fallbacks.next(source.category))
    }

    fn build_article(&self, source: &SourceSpec, entry: &ParsedEntry) -> Article {
        let body = entry.body();
        match self.cleaner.clean(body) {
            Ok(cleaned) => {
                let published_at = entry.published_at.unwrap_or_default();
                let title = Some(tidy(&entry.title))
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| "Untitled".to_string());
                Article {
                    id: ArticleId::derive(&entry.url, &published_at),
                    category: source.category,
                    source_name: source.name.clone(),
                    title,
                    url: entry.url.clone(),
                    raw_text: body.to_string(),
                    cleaned,
                    published_at,
                    is_fallback: false,
                }
            }
            Err(e) => {
                debug!("Entry {} from {} replaced by fallback: {}", entry.url, source.name, e);
                self.fallbacks.next(source.category)
            }
        }
    }
}
