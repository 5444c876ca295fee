//! Per-session conversational context: the last symbol, market, intent and
//! range, kept for pronoun carry-over between turns.

use super::schema::{Intent, MarketCode, Range};
use crate::{cache::Cache, error::Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub session_id: String,
    pub last_symbol: Option<String>,
    pub last_market: Option<MarketCode>,
    pub last_intent: Option<Intent>,
    pub last_range: Option<Range>,
    pub expires_at: DateTime<Utc>,
}

/// Fields to merge into a context; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct ContextUpdate {
    pub last_symbol: Option<String>,
    pub last_market: Option<MarketCode>,
    pub last_intent: Option<Intent>,
    pub last_range: Option<Range>,
}

impl Context {
    fn empty(session_id: &str, ttl: Duration) -> Self {
        Self {
            session_id: session_id.to_string(),
            last_symbol: None,
            last_market: None,
            last_intent: None,
            last_range: None,
            expires_at: expiry(ttl),
        }
    }

    fn merge(&mut self, update: ContextUpdate, ttl: Duration) {
        if update.last_symbol.is_some() {
            self.last_symbol = update.last_symbol;
        }
        if update.last_market.is_some() {
            self.last_market = update.last_market;
        }
        if update.last_intent.is_some() {
            self.last_intent = update.last_intent;
        }
        if update.last_range.is_some() {
            self.last_range = update.last_range;
        }
        self.expires_at = expiry(ttl);
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

fn expiry(ttl: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(30))
}

#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<Context>>;
    /// Shallow merge into the stored context and refresh its expiry.
    async fn set(&self, session_id: &str, update: ContextUpdate) -> Result<Context>;

    fn generate_session_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// In-process TTL map; expired entries are dropped when read.
pub struct MemoryContextStore {
    ttl: Duration,
    entries: RwLock<HashMap<String, Context>>,
}

impl MemoryContextStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ContextStore for MemoryContextStore {
    async fn get(&self, session_id: &str) -> Result<Option<Context>> {
        {
            let entries = self.entries.read().await;
            match entries.get(session_id) {
                Some(ctx) if !ctx.is_expired() => return Ok(Some(ctx.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        self.entries.write().await.remove(session_id);
        Ok(None)
    }

    async fn set(&self, session_id: &str, update: ContextUpdate) -> Result<Context> {
        let mut entries = self.entries.write().await;
        let ctx = entries
            .entry(session_id.to_string())
            .or_insert_with(|| Context::empty(session_id, self.ttl));
        if ctx.is_expired() {
            *ctx = Context::empty(session_id, self.ttl);
        }
        ctx.merge(update, self.ttl);
        Ok(ctx.clone())
    }
}

/// Redis-backed store for multi-process deployments; the key's TTL does the
/// eviction.
pub struct RedisContextStore {
    cache: Arc<Cache>,
    ttl: Duration,
}

impl RedisContextStore {
    pub fn new(cache: Arc<Cache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    fn key(session_id: &str) -> String {
        format!("chat:context:{}", session_id)
    }
}

#[async_trait]
impl ContextStore for RedisContextStore {
    async fn get(&self, session_id: &str) -> Result<Option<Context>> {
        let ctx: Option<Context> = self.cache.get(&Self::key(session_id)).await?;
        Ok(ctx.filter(|c| !c.is_expired()))
    }

    async fn set(&self, session_id: &str, update: ContextUpdate) -> Result<Context> {
        let mut ctx = self
            .get(session_id)
            .await?
            .unwrap_or_else(|| Context::empty(session_id, self.ttl));
        ctx.merge(update, self.ttl);
        self.cache.set(&Self::key(session_id), &ctx, Some(self.ttl)).await?;
        Ok(ctx)
    }
}
