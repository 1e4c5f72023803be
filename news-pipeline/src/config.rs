//! Layered configuration: built-in defaults, then an optional `knowledge.toml`,
//! then `KRU_*` environment variables (`__` separates nested sections, e.g.
//! `KRU_FETCH__TIMEOUT_SECONDS=5`).

use crate::types::{Category, FetchConfig, PipelineError, Result, SourceSpec};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "knowledge.toml";
pub const ENV_PREFIX: &str = "KRU_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub embedding_model: String,
    pub llm_model: String,
    pub ollama_url: String,
    pub llm_enabled: bool,
    /// SQLite file holding persisted embeddings. `None` keeps the index in memory.
    pub vector_store_path: Option<PathBuf>,
    pub cache_ttl_secs: u64,
    /// Category name -> feeds in that category.
    pub sources: BTreeMap<String, Vec<FeedConfig>>,
    pub fetch: FetchConfig,
    pub max_articles_per_source: usize,
    pub max_concurrent_fetches: usize,
    pub max_concurrent_articles: usize,
    pub min_clean_chars: usize,
    pub retrieval_top_k: usize,
    pub llm_timeout_secs: u64,
    pub embed_timeout_secs: u64,
    pub source_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut sources = BTreeMap::new();
        sources.insert(
            "science".to_string(),
            vec![
                feed("O'Reilly Radar", "https://feeds.feedburner.com/oreilly/radar"),
                feed("ScienceDaily", "https://www.sciencedaily.com/rss/all.xml"),
            ],
        );
        sources.insert(
            "technology".to_string(),
            vec![
                feed("TechCrunch", "https://feeds.feedburner.com/TechCrunch"),
                feed("Wired", "https://www.wired.com/feed/rss"),
            ],
        );
        sources.insert(
            "environment".to_string(),
            vec![
                feed("National Geographic", "https://www.nationalgeographic.com/environment/rss/"),
                feed("EPA", "https://www.epa.gov/newsreleases/rss.xml"),
            ],
        );

        Self {
            embedding_model: "hashing-256".to_string(),
            llm_model: "llama2:7b".to_string(),
            ollama_url: "http://127.0.0.1:11434".to_string(),
            llm_enabled: false,
            vector_store_path: None,
            cache_ttl_secs: 3600,
            sources,
            fetch: FetchConfig::default(),
            max_articles_per_source: 5,
            max_concurrent_fetches: 4,
            max_concurrent_articles: 4,
            min_clean_chars: 80,
            retrieval_top_k: 3,
            llm_timeout_secs: 30,
            embed_timeout_secs: 10,
            source_timeout_secs: 30,
        }
    }
}

fn feed(name: &str, url: &str) -> FeedConfig {
    FeedConfig {
        name: name.to_string(),
        url: url.to_string(),
    }
}

impl AppConfig {
    /// Load from defaults, `knowledge.toml` in the working directory and `KRU_*` variables.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config: AppConfig = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn figment(path: &Path) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if path.exists() {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn validate(&self) -> Result<()> {
        if self.cache_ttl_secs == 0 {
            return Err(PipelineError::General("cache_ttl_secs must be positive".to_string()));
        }
        if self.max_concurrent_fetches == 0 || self.max_concurrent_articles == 0 {
            return Err(PipelineError::General("worker pool sizes must be positive".to_string()));
        }
        for feeds in self.sources.values() {
            for feed in feeds {
                url::Url::parse(&feed.url)?;
            }
        }
        self.source_specs().map(|_| ())
    }

    /// Flatten the per-category table into source specs, in category then file order.
    pub fn source_specs(&self) -> Result<Vec<SourceSpec>> {
        let mut specs = Vec::new();
        for (category, feeds) in &self.sources {
            let category: Category = category.parse().map_err(PipelineError::General)?;
            specs.extend(feeds.iter().map(|f| SourceSpec {
                name: f.name.clone(),
                url: f.url.clone(),
                category,
            }));
        }
        Ok(specs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_cover_all_categories() {
        let config = AppConfig::default();
        let specs = config.source_specs().unwrap();
        for category in Category::ALL {
            assert!(specs.iter().any(|s| s.category == category), "missing {}", category);
        }
        assert!(specs.iter().any(|s| s.name == "ScienceDaily"));
        assert_eq!(config.cache_ttl(), Duration::from_secs(3600));
        assert!(!config.llm_enabled);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
llm_enabled = true
cache_ttl_secs = 120

[fetch]
timeout_seconds = 3

[[sources.science]]
name = "NASA"
url = "https://www.nasa.gov/rss/dyn/breaking_news.rss"
"#
        )
        .unwrap();

        let config: AppConfig = AppConfig::figment(file.path()).extract().unwrap();
        assert!(config.llm_enabled);
        assert_eq!(config.cache_ttl_secs, 120);
        assert_eq!(config.fetch.timeout_seconds, 3);
        assert_eq!(config.fetch.max_retries, FetchConfig::default().max_retries);
        assert_eq!(config.sources["science"], vec![feed("NASA", "https://www.nasa.gov/rss/dyn/breaking_news.rss")]);
    }

    #[test]
    fn unknown_category_is_rejected() {
        let mut config = AppConfig::default();
        config.sources.insert("sports".to_string(), vec![feed("ESPN", "https://espn.com/rss")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let config = AppConfig {
            cache_ttl_secs: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
