use crate::adapter::ContentAdapter;
use crate::articles::ArticleStore;
use crate::cache::TtlCache;
use crate::cleaner::ContentCleaner;
use crate::config::AppConfig;
use crate::fallback::FallbackLibrary;
use crate::feed_source::{FeedFetcher, RssPuller};
use crate::index::VectorIndex;
use crate::llm::{HashingEmbedder, OllamaClient, DEFAULT_HASHING_DIMENSION};
use crate::questions::QuestionGenerator;
use crate::session::{LearningSession, SubmissionOutcome};
use crate::store::VectorStore;
use crate::traits::{Completer, Embedder, PullFeed};
use crate::types::{
    AdaptedContent, AgeTier, Article, ArticleId, Category, PipelineError, Question, QuestionId, RefreshSummary,
    Result, SourceSpec,
};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

const GENERAL_QUERY: &str = "science technology discovery education learning";

struct QuestionCache {
    by_article: TtlCache<(ArticleId, AgeTier), Vec<Question>>,
    by_id: HashMap<QuestionId, Question>,
}

impl QuestionCache {
    fn new(ttl: Duration) -> Self {
        Self {
            by_article: TtlCache::new(ttl),
            by_id: HashMap::new(),
        }
    }

    /// A question is active only while its (article, tier) set is cached.
    fn active(&self, id: QuestionId) -> Option<&Question> {
        self.by_id
            .get(&id)
            .filter(|q| self.by_article.get(&(q.article_id, q.tier)).is_some())
    }

    fn clear(&mut self) {
        self.by_article.clear();
        self.by_id.clear();
    }
}

/// Entry point for the presentation layer. Owns the article store, the index and
/// the caches, and hands each component the stores it needs.
pub struct KnowledgeService {
    sources: Vec<SourceSpec>,
    articles: Arc<ArticleStore>,
    index: Arc<VectorIndex>,
    fetcher: FeedFetcher,
    adapter: ContentAdapter,
    generator: QuestionGenerator,
    questions: RwLock<QuestionCache>,
    max_concurrent_articles: usize,
    refresh_lock: Mutex<()>,
    generation: Arc<AtomicU64>,
    last_refresh: RwLock<Option<(Vec<SourceSpec>, RefreshSummary)>>,
}

/// Assembles a [`KnowledgeService`]. Collaborators not supplied explicitly are built
/// from the configuration.
pub struct ServiceBuilder {
    config: AppConfig,
    puller: Option<Arc<dyn PullFeed>>,
    embedder: Option<Arc<dyn Embedder>>,
    completer: Option<Arc<dyn Completer>>,
    store: Option<VectorStore>,
}

impl ServiceBuilder {
    pub fn with_puller(mut self, puller: Arc<dyn PullFeed>) -> Self {
        self.puller = Some(puller);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_completer(mut self, completer: Arc<dyn Completer>) -> Self {
        self.completer = Some(completer);
        self
    }

    pub fn with_store(mut self, store: VectorStore) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn build(self) -> Result<KnowledgeService> {
        let config = self.config;
        let embed_timeout = Duration::from_secs(config.embed_timeout_secs);
        let llm_timeout = Duration::from_secs(config.llm_timeout_secs);

        let puller = match self.puller {
            Some(puller) => puller,
            None => Arc::new(RssPuller::new(config.fetch.clone())?),
        };
        let embedder = match self.embedder {
            Some(embedder) => embedder,
            None => embedder_for(&config)?,
        };
        let completer = match self.completer {
            Some(completer) => Some(completer),
            None if config.llm_enabled => Some(Arc::new(OllamaClient::new(
                &config.ollama_url,
                &config.llm_model,
                llm_timeout,
            )?) as Arc<dyn Completer>),
            None => None,
        };
        let store = match (self.store, &config.vector_store_path) {
            (Some(store), _) => Some(store),
            (None, Some(path)) => Some(VectorStore::open(path, &embedder.model_name()).await?),
            (None, None) => None,
        };

        let index = Arc::new(match store {
            Some(store) => VectorIndex::with_store(embedder, embed_timeout, store).await?,
            None => VectorIndex::new(embedder, embed_timeout),
        });
        let articles = Arc::new(ArticleStore::new(config.cache_ttl()));

        let generation = Arc::new(AtomicU64::new(0));
        let mut adapter = ContentAdapter::new(index.clone(), articles.clone(), config.cache_ttl())
            .with_retrieval_top_k(config.retrieval_top_k)
            .with_generation(generation.clone());
        if let Some(completer) = completer {
            adapter = adapter.with_completer(completer, llm_timeout);
        }

        let fetcher = FeedFetcher::new(
            puller,
            ContentCleaner::new(config.min_clean_chars),
            Arc::new(FallbackLibrary::new()),
        )
        .with_source_timeout(Duration::from_secs(config.source_timeout_secs))
        .with_max_articles_per_source(config.max_articles_per_source)
        .with_max_concurrent(config.max_concurrent_fetches);

        info!(
            "Knowledge service ready: {} sources, embeddings from {}, LLM {}",
            config.sources.values().map(Vec::len).sum::<usize>(),
            index.model_name(),
            if adapter.llm_enabled() { "enabled" } else { "disabled" }
        );

        Ok(KnowledgeService {
            sources: config.source_specs()?,
            articles,
            index,
            fetcher,
            adapter,
            generator: QuestionGenerator::new(),
            questions: RwLock::new(QuestionCache::new(config.cache_ttl())),
            max_concurrent_articles: config.max_concurrent_articles.max(1),
            refresh_lock: Mutex::new(()),
            generation,
            last_refresh: RwLock::new(None),
        })
    }
}

/// `hashing` or `hashing-<dim>` selects the local embedder; anything else is an Ollama model.
fn embedder_for(config: &AppConfig) -> Result<Arc<dyn Embedder>> {
    if let Some(rest) = config.embedding_model.strip_prefix("hashing") {
        let dimension = match rest.strip_prefix('-') {
            Some(dim) => dim.parse().map_err(|_| {
                PipelineError::General(format!("invalid embedding dimension in '{}'", config.embedding_model))
            })?,
            None => DEFAULT_HASHING_DIMENSION,
        };
        return Ok(Arc::new(HashingEmbedder::new(dimension)));
    }
    Ok(Arc::new(OllamaClient::new(
        &config.ollama_url,
        &config.embedding_model,
        Duration::from_secs(config.embed_timeout_secs),
    )?))
}

impl KnowledgeService {
    pub fn builder(config: AppConfig) -> ServiceBuilder {
        ServiceBuilder {
            config,
            puller: None,
            embedder: None,
            completer: None,
            store: None,
        }
    }

    pub async fn from_config(config: AppConfig) -> Result<Self> {
        Self::builder(config).build().await
    }

    pub fn configured_sources(&self) -> &[SourceSpec] {
        &self.sources
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Number of times the working set has been replaced.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub async fn last_refresh(&self) -> Option<RefreshSummary> {
        self.last_refresh.read().await.as_ref().map(|(_, summary)| summary.clone())
    }

    pub async fn refresh_configured(&self) -> Result<RefreshSummary> {
        let sources = self.sources.clone();
        self.refresh_feeds(&sources).await
    }

    /// Re-fetch `sources`, replace the working set and rebuild the index. A request
    /// that arrives while a refresh of the same sources is running waits for it and
    /// returns its summary.
    pub async fn refresh_feeds(&self, sources: &[SourceSpec]) -> Result<RefreshSummary> {
        let observed = self.generation.load(Ordering::Acquire);
        let _guard = self.refresh_lock.lock().await;

        if self.generation.load(Ordering::Acquire) != observed {
            if let Some((last_sources, summary)) = self.last_refresh.read().await.as_ref() {
                if last_sources.as_slice() == sources {
                    debug!("Coalesced refresh onto generation {}", self.generation());
                    return Ok(summary.clone());
                }
            }
        }

        info!("Refreshing {} sources", sources.len());
        let report = self.fetcher.fetch(sources).await;
        let indexed = self.index_articles(&report.articles).await?;

        let keep: HashSet<ArticleId> = report.articles.iter().map(|a| a.id).collect();
        let dropped = self.index.retain(&keep).await?;
        if dropped > 0 {
            debug!("Dropped {} vectors for articles no longer present", dropped);
        }

        let summary = RefreshSummary {
            article_count: report.articles.len(),
            article_ids: report.articles.iter().map(|a| a.id).collect(),
            failures: report.failures,
        };

        // Bump before clearing so a read that started on the old set cannot re-fill a cache.
        self.articles.replace_all(report.articles).await;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.adapter.clear().await;
        self.questions.write().await.clear();

        *self.last_refresh.write().await = Some((sources.to_vec(), summary.clone()));

        let failed = summary.failed_sources();
        if failed.is_empty() {
            info!(
                "Refresh {} complete: {} articles, {} indexed",
                generation, summary.article_count, indexed
            );
        } else {
            warn!(
                "Refresh {} complete with fallbacks for {:?}: {} articles, {} indexed",
                generation, failed, summary.article_count, indexed
            );
        }
        Ok(summary)
    }

    /// Embed every article in a bounded pool. Articles whose embedding fails stay
    /// readable but are left out of retrieval.
    async fn index_articles(&self, articles: &[Article]) -> Result<usize> {
        let pending: Vec<_> = articles
            .iter()
            .map(|article| async move {
                let text = format!("{}\n\n{}", article.title, article.cleaned_text());
                (article.id, self.index.index(article.id, article.published_at, &text).await)
            })
            .collect();
        let results: Vec<(ArticleId, Result<()>)> = stream::iter(pending)
            .buffer_unordered(self.max_concurrent_articles)
            .collect()
            .await;

        let mut indexed = 0;
        for (id, result) in results {
            match result {
                Ok(()) => indexed += 1,
                Err(e @ PipelineError::IndexDimensionMismatch { .. }) => return Err(e),
                Err(e) => warn!("Skipping retrieval for article {}: {}", id, e),
            }
        }
        Ok(indexed)
    }

    async fn ensure_fresh(&self) -> Result<()> {
        if self.articles.is_stale().await {
            info!("Article store is stale, refreshing configured sources");
            self.refresh_configured().await?;
        }
        Ok(())
    }

    /// The article together with the generation it was read under.
    async fn article(&self, id: ArticleId) -> Result<(Article, u64)> {
        self.ensure_fresh().await?;
        let generation = self.generation();
        let article = self.articles.get(id).await.ok_or(PipelineError::ArticleNotFound { id })?;
        Ok((article, generation))
    }

    pub async fn articles(&self, category: Option<Category>) -> Result<Vec<Article>> {
        self.ensure_fresh().await?;
        Ok(self.articles.list(category).await)
    }

    pub async fn get_adapted_article(&self, id: ArticleId, tier: AgeTier) -> Result<AdaptedContent> {
        let (article, generation) = self.article(id).await?;
        self.adapter.adapt_as_of(&article, tier, generation).await
    }

    /// Math, Science and ELA questions for the article at this tier, generated from
    /// the adapted text on first request and cached alongside it.
    pub async fn get_questions(&self, id: ArticleId, tier: AgeTier) -> Result<Vec<Question>> {
        let (article, generation) = self.article(id).await?;
        if let Some(cached) = self.questions.read().await.by_article.get(&(id, tier)) {
            return Ok(cached.clone());
        }

        let adapted = self.adapter.adapt_as_of(&article, tier, generation).await?;
        let generated = self.generator.generate(&article, &adapted).to_vec();

        let mut cache = self.questions.write().await;
        if self.generation() != generation {
            debug!("Working set replaced while generating questions for {}; not cached", id);
            return Ok(generated);
        }
        if let Some(existing) = cache.by_article.get(&(id, tier)) {
            return Ok(existing.clone());
        }
        for question in &generated {
            cache.by_id.insert(question.id, question.clone());
        }
        cache.by_article.insert((id, tier), generated.clone());
        debug!("Generated {} questions for {} ({})", generated.len(), id, tier);
        Ok(generated)
    }

    /// Articles matching `topic` by similarity, or a general science selection without
    /// one, each adapted for `tier` with its questions. Both come from the same caches as
    /// [`Self::get_adapted_article`] and [`Self::get_questions`]. When nothing is indexed
    /// the working set is served in listing order.
    pub async fn search_articles(
        &self,
        topic: Option<&str>,
        tier: AgeTier,
        count: usize,
    ) -> Result<Vec<(AdaptedContent, Vec<Question>)>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.ensure_fresh().await?;

        let query = match topic.map(str::trim).filter(|t| !t.is_empty()) {
            Some(topic) => topic.to_string(),
            None => GENERAL_QUERY.to_string(),
        };
        let mut ids: Vec<ArticleId> = self.index.query(&query, count).await?.into_iter().map(|(id, _)| id).collect();
        if ids.is_empty() {
            debug!("No indexed matches for '{}', serving the working set", query);
            ids = self.articles.list(None).await.into_iter().map(|a| a.id).take(count).collect();
        }

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_questions(id, tier).await {
                Ok(questions) => {
                    let adapted = self.get_adapted_article(id, tier).await?;
                    results.push((adapted, questions));
                }
                // Indexed but gone from the working set.
                Err(PipelineError::ArticleNotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        info!("Search for '{}' at {} returned {} articles", query, tier, results.len());
        Ok(results)
    }

    /// Record an answer in the learner's session. Questions that are not currently
    /// active are reported through the outcome status, never as an error.
    pub async fn submit_answer(
        &self,
        session: &mut LearningSession,
        question_id: QuestionId,
        answer: &str,
    ) -> SubmissionOutcome {
        let question = self.questions.read().await.active(question_id).cloned();
        match question {
            Some(question) => session.submit(&question, answer),
            None => {
                debug!("Submission for inactive question {}", question_id);
                SubmissionOutcome::unknown_question()
            }
        }
    }
}
