//! LLM and embedding provider traits (§6). Callers never depend on
//! which concrete provider is wired in; multiple backends (local model,
//! remote API) are pluggable behind the same trait.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>, model: Option<&str>) -> Result<String>;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Fixed per provider; callers size vector-index buffers from this.
    fn dimensions(&self) -> usize;
}

/// Deterministic provider for tests and the `test` run mode: echoes the
/// prompt back wrapped in a recognisable marker.
pub struct MockLlmProvider;

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn generate(&self, prompt: &str, _system_prompt: Option<&str>, _model: Option<&str>) -> Result<String> {
        Ok(format!("[mock-response] {prompt}"))
    }
}

/// Hash-seeded, normalised pseudo-embeddings: stable across runs for the
/// same input text, with no external dependency.
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut seed = hasher.finish();

        let mut embedding = Vec::with_capacity(self.dimensions);
        for _ in 0..self.dimensions {
            // xorshift64, deterministic and dependency-free
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let value = (seed as f64 / u64::MAX as f64) as f32 * 2.0 - 1.0;
            embedding.push(value);
        }
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for v in &mut embedding {
                *v /= magnitude;
            }
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
