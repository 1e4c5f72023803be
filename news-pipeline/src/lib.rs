pub mod types;
pub mod config;
pub mod text;
pub mod fetcher;
pub mod parser;
pub mod cleaner;
pub mod fallback;
pub mod traits;
pub mod feed_source;
pub mod llm;
pub mod store;
pub mod cache;
pub mod index;
pub mod articles;
pub mod adapter;
pub mod questions;
pub mod session;
pub mod pipeline;

pub use types::*;
pub use config::AppConfig;
pub use cleaner::ContentCleaner;
pub use fallback::FallbackLibrary;
pub use feed_source::{FeedFetcher, RssPuller};
pub use traits::{Completer, Embedder, PullFeed};
pub use llm::{HashingEmbedder, MockCompleter, OllamaClient};
pub use store::VectorStore;
pub use index::VectorIndex;
pub use articles::ArticleStore;
pub use adapter::ContentAdapter;
pub use questions::QuestionGenerator;
pub use session::{Achievement, AnswerSession, LearningSession, SubmissionOutcome, SubmissionStatus};
pub use pipeline::{KnowledgeService, ServiceBuilder};
