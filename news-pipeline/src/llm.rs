use crate::text::content_words;
use crate::traits::{Completer, Embedder};
use crate::types::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_HASHING_DIMENSION: usize = 256;

/// Offline embedder: feature-hashed bag of content words, L2-normalized.
/// Deterministic, so it doubles as the test embedder.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension: dimension.max(1) }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in content_words(text) {
            let hash = fnv1a(word.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSION)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325u64, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> String {
        format!("hashing-{}", self.dimension)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Ollama HTTP client serving both capabilities (`/api/generate`, `/api/embeddings`).
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    async fn post<Req: Serialize + Sync, Resp: for<'de> Deserialize<'de>>(&self, path: &str, body: &Req) -> Result<Resp> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::Llm(format!("Ollama request failed: {}", response.status())));
        }
        Ok(response.json::<Resp>().await?)
    }
}

#[async_trait]
impl Completer for OllamaClient {
    fn model_name(&self) -> String {
        self.model.clone()
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!("Sending {} char prompt to {}", prompt.len(), self.model);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: 0.3,
                top_p: 0.9,
                num_predict: 800,
            },
        };
        let response: GenerateResponse = self.post("/api/generate", &request).await?;
        let text = response.response.trim().to_string();
        if text.is_empty() {
            return Err(PipelineError::Llm("empty completion".to_string()));
        }
        Ok(text)
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    fn model_name(&self) -> String {
        self.model.clone()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };
        let response: EmbeddingResponse = self.post("/api/embeddings", &request).await?;
        if response.embedding.is_empty() {
            return Err(PipelineError::Embedding("empty embedding".to_string()));
        }
        Ok(response.embedding)
    }
}

/// Scripted completer for development and tests: replays queued responses,
/// then falls back to a fixed reply, after an optional delay.
pub struct MockCompleter {
    name: String,
    responses: Mutex<VecDeque<Result<String>>>,
    default_response: Option<String>,
    response_delay_ms: u64,
    prompts: Mutex<Vec<String>>,
}

impl MockCompleter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            responses: Mutex::new(VecDeque::new()),
            default_response: None,
            response_delay_ms: 0,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default(mut self, response: &str) -> Self {
        self.default_response = Some(response.to_string());
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.response_delay_ms = delay_ms;
        self
    }

    pub fn push_response(&self, response: Result<String>) {
        self.responses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(response);
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl Completer for MockCompleter {
    fn model_name(&self) -> String {
        format!("mock ({})", self.name)
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        if self.response_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.response_delay_ms)).await;
        }
        self.prompts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(prompt.to_string());

        let queued = self.responses.lock().unwrap_or_else(|p| p.into_inner()).pop_front();
        match queued {
            Some(response) => response,
            None => match &self.default_response {
                Some(text) => Ok(text.clone()),
                None => {
                    info!("Mock completer {} has no scripted response", self.name);
                    Err(PipelineError::Llm("no scripted response".to_string()))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("Water ice on the Moon").await.unwrap();
        let b = embedder.embed("Water ice on the Moon").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn similar_texts_score_higher() {
        let embedder = HashingEmbedder::default();
        let moon = embedder.embed("moon crater ice water astronauts").await.unwrap();
        let moon2 = embedder.embed("ice found in a moon crater").await.unwrap();
        let reef = embedder.embed("coral reef fish bleaching ocean").await.unwrap();
        assert!(cosine(&moon, &moon2) > cosine(&moon, &reef));
    }

    #[tokio::test]
    async fn empty_text_embeds_to_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert_eq!(embedder.embed("the and of").await.unwrap(), vec![0.0; 8]);
    }

    #[tokio::test]
    async fn ollama_completion_and_embedding() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": "  Simple words.  "})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"embedding": [0.5, 0.5]})))
            .mount(&server)
            .await;

        let client = OllamaClient::new(&server.uri(), "llama2:7b", Duration::from_secs(2)).unwrap();
        assert_eq!(client.complete("Rewrite").await.unwrap(), "Simple words.");
        assert_eq!(client.embed("text").await.unwrap(), vec![0.5, 0.5]);
    }

    #[tokio::test]
    async fn ollama_error_status_is_llm_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = OllamaClient::new(&server.uri(), "llama2:7b", Duration::from_secs(2)).unwrap();
        assert!(matches!(client.complete("Rewrite").await, Err(PipelineError::Llm(_))));
    }

    #[tokio::test]
    async fn mock_completer_replays_script() {
        let mock = MockCompleter::new("test").with_default("fallback text");
        mock.push_response(Ok("first".to_string()));
        assert_eq!(mock.complete("p1").await.unwrap(), "first");
        assert_eq!(mock.complete("p2").await.unwrap(), "fallback text");
        assert_eq!(mock.prompts(), vec!["p1", "p2"]);
    }
}
