use crate::config::RagConfig;
use crate::error::EmbedError;
use crate::ollama::OllamaClient;
use crate::parse;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// One way of turning text into a raw vector. Strategies are tried in
/// order; the first success wins and its output is resized to the
/// configured dimensionality.
#[async_trait]
pub trait EmbeddingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Produces fixed-length embeddings and never fails: backend trouble
/// walks the strategy ladder down to a deterministic offline hash, and
/// only an empty ladder yields the all-zero null vector.
pub struct EmbeddingProvider {
    strategies: Vec<Box<dyn EmbeddingStrategy>>,
    dimensions: usize,
}

impl EmbeddingProvider {
    pub fn new(config: &RagConfig) -> Result<Self, EmbedError> {
        let client = Arc::new(OllamaClient::new(config)?);
        let dimensions = config.embedding_dimensions;

        let strategies: Vec<Box<dyn EmbeddingStrategy>> = vec![
            Box::new(EmbedEndpoint {
                client: Arc::clone(&client),
            }),
            Box::new(LegacyEmbedEndpoint {
                client: Arc::clone(&client),
            }),
            Box::new(ChatArrayStrategy {
                client: Arc::clone(&client),
                dimensions,
            }),
            Box::new(GenerateArrayStrategy {
                client,
                dimensions,
            }),
            Box::new(HashingStrategy { dimensions }),
        ];

        Ok(Self {
            strategies,
            dimensions,
        })
    }

    /// Seam for tests and alternative ladders.
    pub fn with_strategies(
        dimensions: usize,
        strategies: Vec<Box<dyn EmbeddingStrategy>>,
    ) -> Self {
        Self {
            strategies,
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Always returns a vector of exactly the configured length. The
    /// all-zero vector signals that every strategy failed.
    pub async fn embed_one(&self, text: &str) -> Vec<f32> {
        for strategy in &self.strategies {
            match strategy.embed(text).await {
                Ok(raw) => {
                    debug!(strategy = strategy.name(), raw_len = raw.len(), "embedding produced");
                    return resize_vector(raw, self.dimensions);
                }
                Err(error) => {
                    warn!(strategy = strategy.name(), %error, "embedding strategy failed, trying next");
                }
            }
        }

        warn!("all embedding strategies exhausted, returning null vector");
        vec![0.0; self.dimensions]
    }

    /// One round-trip per text, sequential, so a flaky backend is never
    /// hit with a burst.
    pub async fn embed_many(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_one(text).await);
        }
        vectors
    }
}

/// An all-zero embedding marks total strategy failure, distinct from any
/// legitimate small-magnitude vector.
pub fn is_null_vector(vector: &[f32]) -> bool {
    !vector.iter().any(|value| *value != 0.0)
}

/// Coerces a raw vector to exactly `dimensions` entries so the store's
/// dimensionality invariant holds no matter which backend produced it.
pub fn resize_vector(raw: Vec<f32>, dimensions: usize) -> Vec<f32> {
    if dimensions == 0 || raw.is_empty() {
        return vec![0.0; dimensions];
    }
    if raw.len() == dimensions {
        return raw;
    }

    if raw.len() > dimensions {
        if raw.len() % dimensions == 0 {
            let group = raw.len() / dimensions;
            return raw
                .chunks(group)
                .map(|window| window.iter().sum::<f32>() / group as f32)
                .collect();
        }
        return raw[..dimensions].to_vec();
    }

    let mut tiled = Vec::with_capacity(dimensions);
    while tiled.len() < dimensions {
        let take = (dimensions - tiled.len()).min(raw.len());
        tiled.extend_from_slice(&raw[..take]);
    }
    tiled
}

struct EmbedEndpoint {
    client: Arc<OllamaClient>,
}

#[async_trait]
impl EmbeddingStrategy for EmbedEndpoint {
    fn name(&self) -> &'static str {
        "embed-endpoint"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let payload = self.client.embed(text).await?;
        parse::embedding_from_response(&payload)
            .map(|(_, vector)| vector)
            .ok_or_else(|| EmbedError::Parse("embed endpoint payload".to_string()))
    }
}

struct LegacyEmbedEndpoint {
    client: Arc<OllamaClient>,
}

#[async_trait]
impl EmbeddingStrategy for LegacyEmbedEndpoint {
    fn name(&self) -> &'static str {
        "legacy-embed-endpoint"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let payload = self.client.embeddings_legacy(text).await?;
        parse::embedding_from_response(&payload)
            .map(|(_, vector)| vector)
            .ok_or_else(|| EmbedError::Parse("legacy embeddings payload".to_string()))
    }
}

fn array_instruction(dimensions: usize, text: &str) -> String {
    format!(
        "Respond with only a JSON array of {dimensions} floating point numbers \
         representing a semantic summary of the following text. No prose, no \
         explanation.\n\nText: {text}"
    )
}

struct ChatArrayStrategy {
    client: Arc<OllamaClient>,
    dimensions: usize,
}

#[async_trait]
impl EmbeddingStrategy for ChatArrayStrategy {
    fn name(&self) -> &'static str {
        "chat-array"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let reply = self
            .client
            .chat(
                "You convert text into numeric semantic vectors.",
                &array_instruction(self.dimensions, text),
            )
            .await
            .map_err(|error| EmbedError::BackendResponse {
                backend: "ollama/api/chat".to_string(),
                details: error.to_string(),
            })?;

        parse::float_array_from_text(&reply)
            .ok_or_else(|| EmbedError::Parse("chat reply held no float array".to_string()))
    }
}

struct GenerateArrayStrategy {
    client: Arc<OllamaClient>,
    dimensions: usize,
}

#[async_trait]
impl EmbeddingStrategy for GenerateArrayStrategy {
    fn name(&self) -> &'static str {
        "generate-array"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let reply = self
            .client
            .generate(&array_instruction(self.dimensions, text))
            .await
            .map_err(|error| EmbedError::BackendResponse {
                backend: "ollama/api/generate".to_string(),
                details: error.to_string(),
            })?;

        parse::float_array_from_text(&reply)
            .ok_or_else(|| EmbedError::Parse("completion held no float array".to_string()))
    }
}

/// Deterministic offline fallback: no network, never fails, and the
/// output is already at the target dimensionality.
pub struct HashingStrategy {
    pub dimensions: usize,
}

#[async_trait]
impl EmbeddingStrategy for HashingStrategy {
    fn name(&self) -> &'static str {
        "hashing-fallback"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(hashed_embedding(text, self.dimensions))
    }
}

const SCATTER_POSITIONS: u64 = 16;
const TOP_WORDS: usize = 100;
const BIAS_STRIDE: usize = 200;

pub fn hashed_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    let mut vector = vec![0f32; dimensions.max(1)];

    let normalized: String = text
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_alphanumeric() { ch } else { ' ' })
        .collect();

    let mut frequencies: HashMap<&str, u32> = HashMap::new();
    for word in normalized.split_whitespace() {
        *frequencies.entry(word).or_insert(0) += 1;
    }

    // HashMap iteration order is arbitrary; sort for a stable top-100.
    let mut ranked: Vec<(&str, u32)> = frequencies.into_iter().collect();
    ranked.sort_by(|left, right| right.1.cmp(&left.1).then(left.0.cmp(right.0)));
    ranked.truncate(TOP_WORDS);

    for (word, frequency) in ranked {
        let hash = fnv1a(word);
        for i in 0..SCATTER_POSITIONS {
            let position = (hash.wrapping_mul(i + 1) % vector.len() as u64) as usize;
            vector[position] += frequency as f32;
        }
    }

    let length_bias = (text.len() % 1_000) as f32 / 10_000.0;
    let mut position = 0;
    while position < vector.len() {
        vector[position] += length_bias;
        position += BIAS_STRIDE;
    }

    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in &mut vector {
            *value /= magnitude;
        }
    }

    vector
}

fn fnv1a(token: &str) -> u64 {
    let mut hash = 1469598103934665603u64;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}
