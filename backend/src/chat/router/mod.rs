//! Hybrid intent router: phrase overrides, weighted keyword packs, then an
//! optional embedding fallback. Each stage is deterministic on its own.

pub mod catalog;
pub mod keywords;
pub mod overrides;
pub mod semantic;

use super::{
    normalizer::NormalizedText,
    schema::{Entities, Intent, IntentResult},
};
use semantic::{semantic_confidence, SemanticIndex, SEMANTIC_FLOOR};
use tracing::{debug, warn};

const OVERRIDE_CONFIDENCE: f64 = 1.0;
const SEMANTIC_TRIGGER: f64 = 0.85;
const LOW_CONFIDENCE: f64 = 0.4;
const FOLLOW_UP_CEILING: f64 = 0.3;
const FOLLOW_UP_CONFIDENCE: f64 = 0.5;

pub struct IntentRouter {
    semantic: Option<SemanticIndex>,
}

impl IntentRouter {
    pub fn new(semantic: Option<SemanticIndex>) -> Self {
        Self { semantic }
    }

    pub fn has_semantic(&self) -> bool {
        self.semantic.is_some()
    }

    /// Classifies `text` given the already-extracted `entities`.
    /// `context_symbol` is the session's last resolved symbol, if any.
    pub async fn route(
        &self,
        text: &NormalizedText,
        mut entities: Entities,
        context_symbol: Option<&str>,
    ) -> IntentResult {
        let normalized = text.normalized.as_str();
        let padded = keywords::padded(normalized);

        let (mut intent, mut confidence) = match overrides::detect(normalized, &padded, &entities) {
            Some(intent) => {
                debug!("Override matched {}", intent);
                (intent, OVERRIDE_CONFIDENCE)
            }
            None => self.score(normalized).await,
        };

        if confidence < FOLLOW_UP_CEILING {
            if let Some(symbol) = context_symbol {
                intent = Intent::FollowUp;
                confidence = FOLLOW_UP_CONFIDENCE;
                if entities.symbol.is_none() {
                    entities.symbol = Some(symbol.to_string());
                }
            }
        }

        if confidence < LOW_CONFIDENCE && intent != Intent::Help && intent != Intent::FollowUp {
            intent = Intent::Unknown;
        }

        let mut missing_fields = Vec::new();
        if intent.requires_symbol() && entities.symbol.is_none() && context_symbol.is_none() {
            missing_fields.push("symbol".to_string());
        }
        if intent == Intent::CompareStocks && entities.compare_symbols.is_none() {
            missing_fields.push("compare_symbols".to_string());
        }

        IntentResult {
            intent,
            confidence,
            entities,
            missing_fields,
        }
    }

    /// Keyword stage, then the semantic stage when keywords are unsure.
    async fn score(&self, normalized: &str) -> (Intent, f64) {
        let (mut intent, mut confidence) = keywords::score_intents(normalized).unwrap_or((Intent::Unknown, 0.0));

        if confidence < SEMANTIC_TRIGGER {
            if let Some(index) = &self.semantic {
                match index.nearest(normalized).await {
                    Ok(Some((candidate, score))) if score >= SEMANTIC_FLOOR && score > confidence => {
                        debug!("Semantic fallback picked {} ({:.3})", candidate, score);
                        intent = candidate;
                        confidence = semantic_confidence(score);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Semantic fallback unavailable: {}", e),
                }
            }
        }
        (intent, confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ai::SentenceEmbedder, chat::extractor, error::Result, chat::schema::Range};
    use async_trait::async_trait;
    use std::sync::Arc;

    async fn route(raw: &str) -> IntentResult {
        route_with(&IntentRouter::new(None), raw, None).await
    }

    async fn route_with(router: &IntentRouter, raw: &str, context_symbol: Option<&str>) -> IntentResult {
        let text = NormalizedText::new(raw);
        let entities = extractor::extract(&text);
        router.route(&text, entities, context_symbol).await
    }

    #[tokio::test]
    async fn annual_financials_override() {
        let r = route("Annual financials for COMI").await;
        assert_eq!(r.intent, Intent::FinancialsAnnual);
        assert_eq!(r.confidence, 1.0);
        assert_eq!(r.entities.symbol.as_deref(), Some("COMI"));
    }

    #[tokio::test]
    async fn market_cap_beats_price() {
        let r = route("Market cap of SWDY").await;
        assert_eq!(r.intent, Intent::StockMarketCap);
        assert_eq!(r.entities.symbol.as_deref(), Some("SWDY"));
    }

    #[tokio::test]
    async fn top_gainers_override() {
        assert_eq!(route("Top gainers today").await.intent, Intent::TopGainers);
    }

    #[tokio::test]
    async fn chart_with_symbol_and_range() {
        let r = route("Chart TMGH 3M").await;
        assert_eq!(r.intent, Intent::StockChart);
        assert_eq!(r.entities.symbol.as_deref(), Some("TMGH"));
        assert_eq!(r.entities.range, Some(Range::ThreeMonths));
    }

    #[tokio::test]
    async fn analyze_with_symbol() {
        let r = route("Analyze GGRN").await;
        assert_eq!(r.intent, Intent::StockSnapshot);
        assert_eq!(r.entities.symbol.as_deref(), Some("GGRN"));
    }

    #[tokio::test]
    async fn compare_pair() {
        let r = route("Compare COMI vs SWDY").await;
        assert_eq!(r.intent, Intent::CompareStocks);
        assert!(r.confidence >= 0.95);
        assert_eq!(r.entities.compare_symbols, Some(["COMI".to_string(), "SWDY".to_string()]));
    }

    #[tokio::test]
    async fn price_override_skips_earnings_multiples() {
        assert_eq!(route("What is the price of COMI?").await.intent, Intent::StockPrice);
        assert_ne!(route("price to earnings of SWDY").await.intent, Intent::StockPrice);
    }

    #[tokio::test]
    async fn arabic_curated_name_routes_to_price() {
        let r = route("السويدي").await;
        assert_eq!(r.intent, Intent::StockPrice);
        assert_eq!(r.entities.symbol.as_deref(), Some("السويدي"));
        assert_eq!(route("اخبار السويدي").await.intent, Intent::News);
    }

    #[tokio::test]
    async fn glossary_terms_route_to_definition() {
        let r = route("What is P/E ratio?").await;
        assert_eq!(r.intent, Intent::DefineTerm);
        assert!(r.missing_fields.is_empty());
    }

    #[tokio::test]
    async fn keyword_stage_for_deep_safety() {
        let r = route("Is COMI safe?").await;
        assert_eq!(r.intent, Intent::DeepSafety);
        assert!(r.confidence >= 0.4 && r.confidence < 1.0);
    }

    #[tokio::test]
    async fn low_confidence_becomes_unknown() {
        let r = route("blue elephants dancing").await;
        assert_eq!(r.intent, Intent::Unknown);
    }

    #[tokio::test]
    async fn follow_up_injects_context_symbol() {
        let router = IntentRouter::new(None);
        let r = route_with(&router, "and what about it", Some("COMI")).await;
        assert_eq!(r.intent, Intent::FollowUp);
        assert_eq!(r.confidence, 0.5);
        assert_eq!(r.entities.symbol.as_deref(), Some("COMI"));
    }

    #[tokio::test]
    async fn missing_symbol_is_reported() {
        let r = route("show me the dividends").await;
        assert_eq!(r.intent, Intent::Dividends);
        assert_eq!(r.missing_fields, vec!["symbol".to_string()]);

        let r = route_with(&IntentRouter::new(None), "show me the dividends", Some("COMI")).await;
        assert!(r.missing_fields.is_empty());
    }

    /// Embeds texts onto two axes: anything mentioning "fund" points one
    /// way, everything else the other.
    struct AxisEmbedder;

    #[async_trait]
    impl SentenceEmbedder for AxisEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| if t.contains("fund") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
                .collect())
        }
    }

    #[tokio::test]
    async fn semantic_stage_rescues_unmatched_text() {
        let index = SemanticIndex::from_parts(
            Arc::new(AxisEmbedder),
            vec![(Intent::FundList, vec![1.0, 0.0]), (Intent::Greeting, vec![0.0, 1.0])],
        );
        let router = IntentRouter::new(Some(index));
        let r = route_with(&router, "any fund worth a look", None).await;
        assert_eq!(r.intent, Intent::FundList);
        assert_eq!(r.confidence, 0.99);
    }
}
