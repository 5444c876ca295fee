//! Embedding-based intent fallback over the catalog examples.

use super::catalog;
use crate::{
    ai::SentenceEmbedder,
    chat::schema::Intent,
    error::Result,
    utils::cosine_similarity,
};
use std::sync::Arc;
use tracing::info;

/// Minimum cosine similarity before the semantic stage may win.
pub const SEMANTIC_FLOOR: f64 = 0.55;
/// Below this raw score the reported confidence is not boosted.
const BOOST_FLOOR: f64 = 0.60;

pub struct SemanticIndex {
    embedder: Arc<dyn SentenceEmbedder>,
    examples: Vec<(Intent, Vec<f32>)>,
}

impl SemanticIndex {
    /// Embeds every catalog example once; the matrix is immutable afterwards.
    pub async fn build(embedder: Arc<dyn SentenceEmbedder>) -> Result<Self> {
        let mut intents = Vec::new();
        let mut texts = Vec::new();
        for intent in Intent::ALL.iter().copied() {
            for example in catalog::examples(intent) {
                intents.push(intent);
                texts.push(example.to_string());
            }
        }
        let vectors = embedder.embed(&texts).await?;
        info!("Semantic intent index built with {} examples", vectors.len());
        Ok(Self {
            embedder,
            examples: intents.into_iter().zip(vectors).collect(),
        })
    }

    #[cfg(test)]
    pub fn from_parts(embedder: Arc<dyn SentenceEmbedder>, examples: Vec<(Intent, Vec<f32>)>) -> Self {
        Self { embedder, examples }
    }

    /// Best intent by cosine similarity to any of its examples.
    pub async fn nearest(&self, text: &str) -> Result<Option<(Intent, f64)>> {
        let query = self.embedder.embed(&[text.to_string()]).await?;
        let Some(query) = query.first() else {
            return Ok(None);
        };
        Ok(self
            .examples
            .iter()
            .map(|(intent, vector)| (*intent, cosine_similarity(query, vector) as f64))
            .fold(None, |best: Option<(Intent, f64)>, (intent, score)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((intent, score)),
            }))
    }
}

/// Reported confidence for a semantic pick: boosted by 10% and capped at
/// 0.99, but never above the raw score for marginal matches.
pub fn semantic_confidence(score: f64) -> f64 {
    if score < BOOST_FLOOR {
        score
    } else {
        (score * 1.1).min(0.99)
    }
}
