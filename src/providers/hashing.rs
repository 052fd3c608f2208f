//! Offline feature-hashing embedder.
//!
//! Maps each lowercase word and adjacent word pair to a signed bucket of a
//! fixed-size vector via SHA-256, then normalizes to unit length. Texts
//! sharing vocabulary get high cosine similarity; no network or model
//! download is involved, and the output is identical across runs and
//! platforms.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use askdocs_core::embedding::{normalize, Embedder};
use askdocs_core::ProviderError;

pub struct HashingEmbedder {
    dims: usize,
    model: String,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims: dims.max(1),
            model: "hashing-v1".to_string(),
        }
    }

    /// Embed a single text.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();

        for w in &words {
            self.add_feature(&mut v, w.as_bytes(), 1.0);
        }
        for pair in words.windows(2) {
            let feature = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut v, feature.as_bytes(), 0.5);
        }

        normalize(&mut v);
        v
    }

    fn add_feature(&self, v: &mut [f32], feature: &[u8], weight: f32) {
        let digest = Sha256::digest(feature);
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let h = u64::from_le_bytes(head);
        let bucket = (h % self.dims as u64) as usize;
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdocs_core::embedding::cosine_similarity;

    #[test]
    fn deterministic_and_normalized() {
        let e = HashingEmbedder::new(64);
        let a = e.embed_one("The quick brown fox");
        let b = e.embed_one("the QUICK brown fox!");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let e = HashingEmbedder::new(256);
        let doc = e.embed_one("refund policy allows returns within thirty days");
        let related = e.embed_one("what is the refund policy for returns");
        let unrelated = e.embed_one("volcanic eruptions shape island geology");
        assert!(cosine_similarity(&doc, &related) > cosine_similarity(&doc, &unrelated));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let e = HashingEmbedder::new(8);
        assert_eq!(e.embed_one("  ... "), vec![0.0; 8]);
    }
}
