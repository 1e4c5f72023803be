use crate::store::VectorStore;
use crate::traits::Embedder;
use crate::types::{ArticleId, PipelineError, Result};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

struct IndexedVector {
    vector: Vec<f32>,
    published_at: DateTime<Utc>,
}

#[derive(Default)]
struct IndexState {
    dimension: Option<usize>,
    entries: HashMap<ArticleId, IndexedVector>,
}

impl IndexState {
    fn check_dimension(&self, actual: usize) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != actual => Err(PipelineError::IndexDimensionMismatch { expected, actual }),
            _ => Ok(()),
        }
    }
}

/// Cosine-similarity index over article embeddings. The index is the only owner
/// of embeddings; the first stored vector fixes the dimension for the process.
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    embed_timeout: Duration,
    store: Option<VectorStore>,
    state: RwLock<IndexState>,
}

impl VectorIndex {
    pub fn new(embedder: Arc<dyn Embedder>, embed_timeout: Duration) -> Self {
        Self {
            embedder,
            embed_timeout,
            store: None,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Index backed by a persistent store; vectors already stored for the store's
    /// model are loaded immediately.
    pub async fn with_store(embedder: Arc<dyn Embedder>, embed_timeout: Duration, store: VectorStore) -> Result<Self> {
        let mut state = IndexState::default();
        for row in store.load().await? {
            state.check_dimension(row.vector.len())?;
            state.dimension = Some(row.vector.len());
            state.entries.insert(
                row.article_id,
                IndexedVector {
                    vector: row.vector,
                    published_at: row.published_at,
                },
            );
        }
        info!("Loaded {} persisted vectors for model {}", state.entries.len(), store.model());

        Ok(Self {
            embedder,
            embed_timeout,
            store: Some(store),
            state: RwLock::new(state),
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = tokio::time::timeout(self.embed_timeout, self.embedder.embed(text))
            .await
            .map_err(|_| PipelineError::Timeout(self.embed_timeout.as_millis() as u64))??;
        if vector.is_empty() {
            return Err(PipelineError::Embedding("embedder returned an empty vector".to_string()));
        }
        Ok(vector)
    }

    /// Embed `text` and store it under `id`, replacing any previous vector.
    pub async fn index(&self, id: ArticleId, published_at: DateTime<Utc>, text: &str) -> Result<()> {
        let vector = self.embed(text).await?;
        self.insert_vector(id, published_at, vector).await
    }

    pub async fn insert_vector(&self, id: ArticleId, published_at: DateTime<Utc>, vector: Vec<f32>) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_dimension(vector.len())?;

        if let Some(store) = &self.store {
            store.upsert(id, published_at, &vector).await?;
        }

        state.dimension = Some(vector.len());
        state.entries.insert(id, IndexedVector { vector, published_at });
        debug!("Indexed {}", id);
        Ok(())
    }

    /// Up to `k` articles most similar to `text`, best first; equal scores put the
    /// more recently published article first. An empty index answers with no results.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<(ArticleId, f32)>> {
        if k == 0 || self.state.read().await.entries.is_empty() {
            return Ok(Vec::new());
        }

        let query = self.embed(text).await?;
        let state = self.state.read().await;
        state.check_dimension(query.len())?;

        let mut scored: Vec<(ArticleId, f32, DateTime<Utc>)> = state
            .entries
            .iter()
            .map(|(id, entry)| (*id, cosine_similarity(&query, &entry.vector), entry.published_at))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.2.cmp(&a.2))
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);

        Ok(scored.into_iter().map(|(id, score, _)| (id, score)).collect())
    }

    pub async fn embedding(&self, id: ArticleId) -> Option<Vec<f32>> {
        self.state.read().await.entries.get(&id).map(|e| e.vector.clone())
    }

    pub async fn contains(&self, id: ArticleId) -> bool {
        self.state.read().await.entries.contains_key(&id)
    }

    pub async fn remove(&self, id: ArticleId) -> Result<bool> {
        let mut state = self.state.write().await;
        if let Some(store) = &self.store {
            store.remove(id).await?;
        }
        Ok(state.entries.remove(&id).is_some())
    }

    /// Drop vectors for articles outside `keep`. Returns how many were removed.
    pub async fn retain(&self, keep: &HashSet<ArticleId>) -> Result<usize> {
        let mut state = self.state.write().await;
        let stale: Vec<ArticleId> = state.entries.keys().filter(|id| !keep.contains(id)).copied().collect();
        for id in &stale {
            if let Some(store) = &self.store {
                store.remove(*id).await?;
            }
            state.entries.remove(id);
        }
        Ok(stale.len())
    }

    /// Drop every vector. The dimension stays fixed for the rest of the process.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(store) = &self.store {
            store.clear().await?;
        }
        state.entries.clear();
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn dimension(&self) -> Option<usize> {
        self.state.read().await.dimension
    }

    pub fn model_name(&self) -> String {
        self.embedder.model_name()
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
