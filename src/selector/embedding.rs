//! Text embedding for table metadata and questions.

use sha2::{Digest, Sha256};

use crate::{
    error::{AppResult, embedding_error},
    schema::TableDescriptor
};

/// Words that carry no signal about which table a question needs
const STOPWORDS: &[&str] = &[
    "a", "all", "an", "and", "any", "are", "at", "by", "can", "each", "find", "for", "from", "get",
    "give", "how", "in", "is", "list", "many", "me", "much", "of", "on", "or", "per", "show",
    "that", "the", "their", "them", "to", "what", "which", "who", "with"
];

/// Maps text to a fixed-length vector.
///
/// Implementations must be deterministic: the same text always yields the
/// same vector, otherwise cached table embeddings stop matching questions.
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> AppResult<Vec<f32>>;
}

/// Feature-hashing embedder over SHA-256 token digests.
///
/// Each token lands in one bucket with a sign taken from the digest, and the
/// result is L2-normalized so cosine similarity reduces to a dot product.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimensions: usize
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1)
        }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "sha256-hashing"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(embedding_error("text has no meaningful tokens"));
        }

        for token in &tokens {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }
}

/// Lowercase word tokens with identifiers split on `_`, trailing plural `s`
/// removed and stopwords dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| singular(&t.to_lowercase()))
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn singular(word: &str) -> String {
    match word.strip_suffix('s') {
        Some(stem) if stem.len() >= 3 && !stem.ends_with('s') => stem.to_string(),
        _ => word.to_string()
    }
}

/// Text embedded for a table: name, column names and description, lowercased.
pub fn table_text(name: &str, table: &TableDescriptor) -> String {
    let mut parts = vec![name.to_string()];
    parts.extend(table.columns.iter().cloned());
    if let Some(description) = table.description.as_deref().filter(|d| !d.trim().is_empty()) {
        parts.push(description.trim().to_string());
    }
    parts.join(" ").to_lowercase()
}

/// Cosine similarity, `None` when lengths differ or either vector is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a * norm_b))
}
