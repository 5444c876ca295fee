//! Five-tier symbol resolution with weighted candidate scoring.
//!
//! Tiers run in order (nickname, fund alias, exact ticker, alias table,
//! name substring) and the fuzzy tier only runs when the earlier tiers found
//! nothing. Candidates are scored, deduplicated per `(entity_type, symbol)`
//! and sorted; a fund close to the top is promoted unless the caller passed
//! an entity hint.

use super::{
    nicknames::{DEFAULT_POPULARITY, NICKNAMES},
    normalizer::normalize,
    schema::{AliasType, EntityType, MarketCode, MatchType, ResolutionCandidate, ResolvedSymbol},
};
use crate::{
    error::Result,
    repository::{MarketRepository, SymbolHit},
};
use once_cell::sync::Lazy;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tracing::{debug, warn};

pub const MIN_RESOLVE_SCORE: f64 = 50.0;
pub const CLARIFY_GAP: f64 = 15.0;
pub const CLARIFY_FLOOR: f64 = 70.0;
const SIMILARITY_THRESHOLD: f64 = 0.25;
const TIER_LIMIT: i64 = 5;

/// Arabic type words stripped from the front of a probe ("سهم", "شركة", ...),
/// in normalized form.
const ARABIC_PREFIXES: &[&str] = &["سهم", "شركه", "بنك", "مجموعه", "صندوق", "وثيقه", "سعر", "تحليل"];

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // english
        "a", "an", "the", "of", "for", "in", "on", "at", "to", "me", "my", "is", "are", "was", "what",
        "whats", "how", "much", "many", "show", "give", "tell", "get", "about", "please", "and", "or",
        "vs", "versus", "with", "price", "prices", "quote", "stock", "stocks", "share", "shares",
        "company", "chart", "graph", "analyze", "analyse", "analysis", "market", "cap", "today",
        "now", "current", "latest", "trading", "value", "info", "data", "compare", "annual",
        "quarterly", "financials", "report", "news", "ownership", "dividends", "dividend", "pe",
        "p/e", "ratio", "ratios", "roe", "eps", "rsi", "macd", "egx", "tdwl", "tasi", "egp", "sar",
        "top", "best", "gainers", "losers", "safe", "safety", "it", "its", "this", "that", "does",
        "do", "can", "you", "i", "be", "has", "have", "buy", "sell", "summary", "overview", "1m",
        "3m", "6m", "1y", "5y", "1d", "1w", "max",
        // arabic (normalized)
        "سعر", "سهم", "اسهم", "شارت", "رسم", "تحليل", "حلل", "كام", "ايه", "اي", "ما", "هو", "هي",
        "عن", "في", "من", "علي", "الي", "و", "مع", "مقابل", "قارن", "مقارنه", "بكام", "النهارده",
        "اليوم", "دلوقتي", "الان", "شركه", "قيمه", "السوقيه", "اداء", "اخبار", "ارباح", "توزيعات",
        "بيانات", "ماليه", "هل", "عايز", "اعرف", "لو", "سمحت",
    ]
    .into_iter()
    .collect()
});

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token.to_lowercase().as_str())
}

/// Strips leading Arabic type words until a fixed point.
fn strip_prefixes(query_norm: &str) -> String {
    let mut current = query_norm.trim().to_string();
    loop {
        let next = ARABIC_PREFIXES.iter().find_map(|prefix| {
            current
                .strip_prefix(prefix)
                .filter(|rest| rest.starts_with(' '))
                .map(|rest| rest.trim().to_string())
        });
        match next {
            Some(rest) if !rest.is_empty() => current = rest,
            _ => return current,
        }
    }
}

fn looks_like_ticker(probe: &str) -> bool {
    let len = probe.chars().count();
    (2..=6).contains(&len) && probe.chars().all(|c| c.is_ascii_alphanumeric())
}

/// `final = 0.40·base + 0.25·alias_weight + 0.20·popularity + 0.10·market_bonus
/// + 0.05·entity_bonus`, capped at 100.
pub fn final_score(
    base: f64,
    alias_type: AliasType,
    popularity: f64,
    candidate_market: Option<MarketCode>,
    requested_market: Option<MarketCode>,
    entity_type: EntityType,
) -> f64 {
    let market_bonus = match requested_market {
        None => 100.0,
        Some(m) if candidate_market == Some(m) => 100.0,
        Some(_) => 50.0,
    };
    let entity_bonus = match entity_type {
        EntityType::Fund => 100.0,
        EntityType::Stock => 0.0,
    };
    let score = 0.40 * base
        + 0.25 * alias_type.weight()
        + 0.20 * popularity.clamp(0.0, 100.0)
        + 0.10 * market_bonus
        + 0.05 * entity_bonus;
    score.min(100.0)
}

/// Whether the ranked list is too close or too weak to pick silently.
/// A ticker typed verbatim is never ambiguous.
pub fn needs_clarification(candidates: &[ResolutionCandidate]) -> bool {
    match candidates {
        [] => false,
        [top, ..] if top.match_type == MatchType::Exact => false,
        [top] => top.final_score < CLARIFY_FLOOR,
        [top, second, ..] => {
            top.final_score < CLARIFY_FLOOR || top.final_score - second.final_score < CLARIFY_GAP
        }
    }
}

pub struct SymbolResolver {
    repo: Arc<dyn MarketRepository>,
}

impl SymbolResolver {
    pub fn new(repo: Arc<dyn MarketRepository>) -> Self {
        Self { repo }
    }

    fn candidate(
        hit: SymbolHit,
        base: f64,
        match_type: MatchType,
        alias_type: AliasType,
        market: Option<MarketCode>,
    ) -> ResolutionCandidate {
        let popularity = hit
            .popularity
            .or_else(|| NICKNAMES.popularity(&hit.symbol))
            .unwrap_or(DEFAULT_POPULARITY);
        ResolutionCandidate {
            final_score: final_score(base, alias_type, popularity, hit.market_code, market, hit.entity_type),
            symbol: hit.symbol,
            name_en: hit.name_en,
            name_ar: hit.name_ar,
            market_code: hit.market_code,
            entity_type: hit.entity_type,
            match_type,
            alias_type,
            base_score: base,
        }
    }

    async fn nickname_tier(&self, probe: &str, market: Option<MarketCode>) -> Result<Vec<ResolutionCandidate>> {
        let Some(symbol) = NICKNAMES.lookup(probe) else {
            return Ok(vec![]);
        };
        let hit = match self.repo.ticker(symbol).await? {
            Some(row) => SymbolHit::stock(&row.symbol, row.name_en.as_deref(), row.name_ar.as_deref(), row.market()),
            None => SymbolHit::stock(symbol, None, None, None),
        };
        Ok(vec![Self::candidate(hit, 100.0, MatchType::Nickname, AliasType::Nickname, market)])
    }

    /// Tiers 2 through 5 for one probe, optionally scoped to a market.
    async fn market_tiers(
        &self,
        probe: &str,
        filter: Option<MarketCode>,
        market: Option<MarketCode>,
    ) -> Result<Vec<ResolutionCandidate>> {
        let mut out = Vec::new();

        if looks_like_ticker(probe) {
            for hit in self.repo.exact_ticker_hits(&probe.to_uppercase(), filter).await? {
                out.push(Self::candidate(hit, 100.0, MatchType::Exact, AliasType::Official, market));
            }
        }

        for hit in self.repo.alias_hits(probe, filter).await? {
            let priority = hit.priority.unwrap_or(1).clamp(1, 10) as f64;
            let alias_type = hit.alias_type.unwrap_or(AliasType::Common);
            out.push(Self::candidate(hit, 70.0 + 2.5 * priority, MatchType::Alias, alias_type, market));
        }

        if probe.chars().count() >= 3 {
            for hit in self.repo.name_hits(probe, filter, TIER_LIMIT).await? {
                out.push(Self::candidate(hit, 75.0, MatchType::Name, AliasType::Common, market));
            }
        }

        if out.is_empty() {
            out = self.fuzzy_tier(probe, filter, market).await?;
        }
        Ok(out)
    }

    async fn fuzzy_tier(
        &self,
        probe: &str,
        filter: Option<MarketCode>,
        market: Option<MarketCode>,
    ) -> Result<Vec<ResolutionCandidate>> {
        let match_type = if probe.contains(' ') {
            MatchType::PhraseSimilarity
        } else {
            MatchType::Similarity
        };
        match self.repo.similarity_hits(probe, filter, SIMILARITY_THRESHOLD, TIER_LIMIT).await {
            Ok(hits) if !hits.is_empty() => {
                return Ok(hits
                    .into_iter()
                    .map(|hit| {
                        let sim = hit.similarity.unwrap_or(SIMILARITY_THRESHOLD);
                        let alias_type = hit.alias_type.unwrap_or(AliasType::Auto);
                        Self::candidate(hit, 50.0 + 45.0 * sim, match_type, alias_type, market)
                    })
                    .collect());
            }
            Ok(_) => {}
            Err(e) => warn!("Trigram search unavailable, falling back to LIKE: {}", e),
        }

        let tokens: Vec<String> = probe
            .split_whitespace()
            .filter(|t| t.chars().count() >= 3 && !is_stopword(t))
            .take(3)
            .map(str::to_string)
            .collect();
        if tokens.is_empty() {
            return Ok(vec![]);
        }
        Ok(self
            .repo
            .token_hits(&tokens, filter, TIER_LIMIT)
            .await?
            .into_iter()
            .map(|hit| Self::candidate(hit, 60.0, MatchType::Fuzzy, AliasType::Common, market))
            .collect())
    }

    /// Ranked candidates, best first.
    pub async fn resolve_candidates(
        &self,
        query: &str,
        market: Option<MarketCode>,
        hint: Option<EntityType>,
        limit: usize,
    ) -> Result<Vec<ResolutionCandidate>> {
        let query_norm = normalize(query);
        let clean = strip_prefixes(&query_norm);
        if clean.is_empty() || clean.split_whitespace().all(is_stopword) {
            debug!("Resolver rejected stopword probe {:?}", query_norm);
            return Ok(vec![]);
        }

        let mut probes = vec![clean.clone()];
        if query_norm != clean {
            probes.push(query_norm.clone());
        }

        let mut candidates = Vec::new();
        for probe in &probes {
            candidates.extend(self.nickname_tier(probe, market).await?);
            for hit in self.repo.fund_alias_hits(probe).await? {
                candidates.push(Self::candidate(hit, 95.0, MatchType::Alias, AliasType::Official, market));
            }
            let scoped = self.market_tiers(probe, market, market).await?;
            if scoped.is_empty() && market.is_some() {
                candidates.extend(self.market_tiers(probe, None, market).await?);
            } else {
                candidates.extend(scoped);
            }
        }

        if let Some(entity_type) = hint {
            candidates.retain(|c| c.entity_type == entity_type);
        }

        let mut ranked = dedup(candidates);
        if hint.is_none() {
            promote_close_fund(&mut ranked);
        }
        ranked.truncate(limit);
        Ok(ranked)
    }

    /// Highest-ranked candidate scoring at least `MIN_RESOLVE_SCORE`.
    pub async fn resolve(
        &self,
        query: &str,
        market: Option<MarketCode>,
        hint: Option<EntityType>,
    ) -> Result<Option<ResolvedSymbol>> {
        let candidates = self.resolve_candidates(query, market, hint, 5).await?;
        Ok(best(&candidates))
    }
}

pub fn best(candidates: &[ResolutionCandidate]) -> Option<ResolvedSymbol> {
    candidates
        .first()
        .filter(|c| c.final_score >= MIN_RESOLVE_SCORE)
        .map(ResolvedSymbol::from)
}

fn dedup(candidates: Vec<ResolutionCandidate>) -> Vec<ResolutionCandidate> {
    let mut best: HashMap<(EntityType, String), ResolutionCandidate> = HashMap::new();
    for candidate in candidates {
        let key = (candidate.entity_type, candidate.symbol.clone());
        match best.get(&key) {
            Some(existing) if existing.final_score >= candidate.final_score => {}
            _ => {
                best.insert(key, candidate);
            }
        }
    }
    let mut ranked: Vec<ResolutionCandidate> = best.into_values().collect();
    ranked.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    ranked
}

/// Funds within `CLARIFY_GAP` of a stock leader move to the front.
fn promote_close_fund(ranked: &mut Vec<ResolutionCandidate>) {
    let Some(top) = ranked.first() else { return };
    if top.entity_type == EntityType::Fund {
        return;
    }
    let top_score = top.final_score;
    if let Some(pos) = ranked
        .iter()
        .position(|c| c.entity_type == EntityType::Fund && top_score - c.final_score < CLARIFY_GAP)
    {
        let fund = ranked.remove(pos);
        ranked.insert(0, fund);
    }
}

/// Request-scoped memo over a resolver, keyed on the normalized query, the
/// market and the entity hint.
pub struct ResolverSession<'a> {
    resolver: &'a SymbolResolver,
    cache: HashMap<(String, Option<MarketCode>, Option<EntityType>), Vec<ResolutionCandidate>>,
}

impl<'a> ResolverSession<'a> {
    pub fn new(resolver: &'a SymbolResolver) -> Self {
        Self {
            resolver,
            cache: HashMap::new(),
        }
    }

    pub async fn candidates(
        &mut self,
        query: &str,
        market: Option<MarketCode>,
        hint: Option<EntityType>,
    ) -> Result<Vec<ResolutionCandidate>> {
        let key = (normalize(query), market, hint);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.clone());
        }
        let candidates = self.resolver.resolve_candidates(query, market, hint, 5).await?;
        self.cache.insert(key, candidates.clone());
        Ok(candidates)
    }

    pub async fn resolve(
        &mut self,
        query: &str,
        market: Option<MarketCode>,
        hint: Option<EntityType>,
    ) -> Result<Option<ResolvedSymbol>> {
        let candidates = self.candidates(query, market, hint).await?;
        Ok(best(&candidates))
    }

    pub fn cached_queries(&self) -> usize {
        self.cache.len()
    }
}
