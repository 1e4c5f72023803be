use crate::types::{ArticleId, PipelineError, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// A persisted embedding row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVector {
    pub article_id: ArticleId,
    pub published_at: DateTime<Utc>,
    pub vector: Vec<f32>,
}

/// SQLite-backed embedding store. Rows are keyed by (article, embedding model) so
/// switching models never mixes dimensions on load.
#[derive(Clone)]
pub struct VectorStore {
    db: SqlitePool,
    model: String,
}

impl VectorStore {
    pub async fn open(path: &Path, model: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
        let db = SqlitePoolOptions::new().max_connections(4).connect_with(options).await?;
        info!("Opened vector store at {}", path.display());
        Self::with_pool(db, model).await
    }

    /// Private in-memory database; one connection so every query sees the same data.
    pub async fn in_memory(model: &str) -> Result<Self> {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(db, model).await
    }

    async fn with_pool(db: SqlitePool, model: &str) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                article_id BLOB NOT NULL,
                model TEXT NOT NULL,
                published_at TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                vector TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (article_id, model)
            )
            "#,
        )
        .execute(&db)
        .await?;

        Ok(Self {
            db,
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn upsert(&self, article_id: ArticleId, published_at: DateTime<Utc>, vector: &[f32]) -> Result<()> {
        let encoded = serde_json::to_string(vector)?;
        sqlx::query(
            r#"
            INSERT INTO embeddings (article_id, model, published_at, dimension, vector, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (article_id, model) DO UPDATE SET
                published_at = EXCLUDED.published_at,
                dimension = EXCLUDED.dimension,
                vector = EXCLUDED.vector,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(article_id.0)
        .bind(&self.model)
        .bind(published_at)
        .bind(vector.len() as i64)
        .bind(encoded)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        debug!("Persisted {}-dim vector for {}", vector.len(), article_id);
        Ok(())
    }

    /// Every vector stored for this store's model, oldest article first.
    pub async fn load(&self) -> Result<Vec<StoredVector>> {
        let rows = sqlx::query(
            r#"
            SELECT article_id, published_at, vector
            FROM embeddings
            WHERE model = $1
            ORDER BY published_at ASC
            "#,
        )
        .bind(&self.model)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<StoredVector> {
                let id: Uuid = row.try_get("article_id")?;
                let published_at: DateTime<Utc> = row.try_get("published_at")?;
                let encoded: String = row.try_get("vector")?;
                let vector: Vec<f32> = serde_json::from_str(&encoded)?;
                Ok(StoredVector {
                    article_id: ArticleId(id),
                    published_at,
                    vector,
                })
            })
            .collect()
    }

    pub async fn remove(&self, article_id: ArticleId) -> Result<()> {
        sqlx::query("DELETE FROM embeddings WHERE article_id = $1 AND model = $2")
            .bind(article_id.0)
            .bind(&self.model)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM embeddings WHERE model = $1")
            .bind(&self.model)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings WHERE model = $1")
            .bind(&self.model)
            .fetch_one(&self.db)
            .await?;
        usize::try_from(count).map_err(|e| PipelineError::General(e.to_string()))
    }
}
