use std::hash::Hasher;

use async_trait::async_trait;
use twox_hash::XxHash64;

use super::EmbeddingProvider;
use crate::error::{VectorError, VectorResult};

pub const DEFAULT_HASHING_DIMENSION: usize = 384;

/// Feature-hashing embedder that runs in-process.
///
/// Each lowercased alphanumeric token lands in an xxHash64 bucket with a
/// hash-derived sign, and the result is L2-normalized. Texts sharing words
/// score higher under cosine similarity. Deterministic across runs and
/// machines, which makes it the offline default and the test embedder.
#[derive(Debug, Clone, Copy)]
pub struct HashingProvider {
    dimension: usize,
}

impl HashingProvider {
    pub fn new(dimension: usize) -> VectorResult<Self> {
        if dimension == 0 {
            return Err(VectorError::configuration(
                "embedding",
                vec!["dimension".to_string()],
            ));
        }
        Ok(Self { dimension })
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        let mut tokens = 0;
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let (bucket, sign) = self.slot(&token.to_lowercase());
            vector[bucket] += sign;
            tokens += 1;
        }

        // Keep token-free texts off the zero vector so cosine stays defined.
        if tokens == 0 {
            let (bucket, _) = self.slot("");
            vector[bucket] = 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }

    fn slot(&self, token: &str) -> (usize, f32) {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(token.as_bytes());
        let h = hasher.finish();
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        ((h % self.dimension as u64) as usize, sign)
    }
}

impl Default for HashingProvider {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_HASHING_DIMENSION,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    fn name(&self) -> String {
        format!("hashing:{}", self.dimension)
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    async fn embed_batch(&self, texts: &[String]) -> VectorResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}
