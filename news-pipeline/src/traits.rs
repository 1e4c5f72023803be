use crate::types::{ParsedEntry, Result, SourceSpec};
use async_trait::async_trait;

/// Pulls raw entries for one configured source (RSS over HTTP in production).
#[async_trait]
pub trait PullFeed: Send + Sync {
    /// Fetch and parse the source. Any network, HTTP or parse problem is an `Err`;
    /// the caller decides how to recover.
    async fn pull(&self, source: &SourceSpec) -> Result<Vec<ParsedEntry>>;
}

/// `embed(text) -> vector`. Implementations must return vectors of one fixed
/// dimension for the lifetime of the process.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> String;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// `complete(prompt) -> text`.
#[async_trait]
pub trait Completer: Send + Sync {
    fn model_name(&self) -> String;

    async fn complete(&self, prompt: &str) -> Result<String>;
}
