use crate::types::{Article, ArticleId, Category};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

struct Snapshot {
    articles: HashMap<ArticleId, Article>,
    order: Vec<ArticleId>,
    loaded_at: Option<Instant>,
}

/// Working set of articles from the most recent refresh. Refresh is the only writer;
/// the whole set ages out together after the TTL.
pub struct ArticleStore {
    ttl: Duration,
    inner: RwLock<Snapshot>,
}

impl ArticleStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(Snapshot {
                articles: HashMap::new(),
                order: Vec::new(),
                loaded_at: None,
            }),
        }
    }

    /// Replace the working set, keeping the given order for listings.
    pub async fn replace_all(&self, articles: Vec<Article>) {
        let mut inner = self.inner.write().await;
        inner.order = articles.iter().map(|a| a.id).collect();
        inner.articles = articles.into_iter().map(|a| (a.id, a)).collect();
        inner.loaded_at = Some(Instant::now());
        debug!("Article store now holds {} articles", inner.articles.len());
    }

    /// True when nothing has been loaded yet or the TTL has passed.
    pub async fn is_stale(&self) -> bool {
        self.inner
            .read()
            .await
            .loaded_at
            .map_or(true, |at| at.elapsed() >= self.ttl)
    }

    pub async fn get(&self, id: ArticleId) -> Option<Article> {
        self.inner.read().await.articles.get(&id).cloned()
    }

    pub async fn get_many(&self, ids: &[ArticleId]) -> Vec<Article> {
        let inner = self.inner.read().await;
        ids.iter().filter_map(|id| inner.articles.get(id).cloned()).collect()
    }

    pub async fn list(&self, category: Option<Category>) -> Vec<Article> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.articles.get(id))
            .filter(|a| category.map_or(true, |c| a.category == c))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.articles.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
