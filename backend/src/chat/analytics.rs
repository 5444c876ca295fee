//! Fire-and-forget interaction logging. Nothing here can fail a request.

use super::schema::{Intent, Language};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

pub const LOW_CONFIDENCE: &str = "LOW_CONFIDENCE";
pub const HANDLER_FALLBACK: &str = "HANDLER_FALLBACK";
const LOW_CONFIDENCE_BELOW: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionRecord {
    pub session_id: String,
    pub user_id: Option<String>,
    pub raw_text: String,
    pub normalized_text: String,
    pub language: Language,
    pub intent: Intent,
    pub confidence: f64,
    pub entities: Value,
    pub resolved_symbol: Option<String>,
    pub resolver_method: Option<String>,
    pub handler: String,
    pub success: bool,
    pub cards_count: i32,
    pub fallback: bool,
    pub error_code: Option<String>,
    pub latency_ms: i64,
    pub actions_shown: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl InteractionRecord {
    /// Why this interaction belongs in the unresolved queue, if it does.
    pub fn failure_reason(&self) -> Option<String> {
        let low_confidence = self.confidence < LOW_CONFIDENCE_BELOW
            && !matches!(self.intent, Intent::Blocked | Intent::SystemError);
        if low_confidence {
            return Some(LOW_CONFIDENCE.to_string());
        }
        if let Some(code) = &self.error_code {
            return Some(code.clone());
        }
        if !self.success || self.fallback {
            return Some(HANDLER_FALLBACK.to_string());
        }
        None
    }
}

/// Write side of the analytics tables.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn insert_interaction(&self, record: &InteractionRecord) -> Result<()>;
    async fn upsert_session_summary(&self, record: &InteractionRecord) -> Result<()>;
    async fn insert_unresolved(&self, record: &InteractionRecord, reason: &str) -> Result<()>;
}

pub struct PgAnalyticsSink {
    pool: PgPool,
}

impl PgAnalyticsSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalyticsSink for PgAnalyticsSink {
    async fn insert_interaction(&self, r: &InteractionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_interactions (
                session_id, user_id, raw_text, normalized_text, language, intent, confidence,
                entities, resolved_symbol, resolver_method, handler, success, cards_count,
                fallback, error_code, latency_ms, actions_shown, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(&r.session_id)
        .bind(&r.user_id)
        .bind(&r.raw_text)
        .bind(&r.normalized_text)
        .bind(r.language.as_str())
        .bind(r.intent.as_str())
        .bind(r.confidence)
        .bind(&r.entities)
        .bind(&r.resolved_symbol)
        .bind(&r.resolver_method)
        .bind(&r.handler)
        .bind(r.success)
        .bind(r.cards_count)
        .bind(r.fallback)
        .bind(&r.error_code)
        .bind(r.latency_ms)
        .bind(serde_json::json!(r.actions_shown))
        .bind(r.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_session_summary(&self, r: &InteractionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_session_summary (
                session_id, user_id, first_message_at, last_message_at, message_count,
                failed_count, last_intent, last_symbol
            )
            VALUES ($1, $2, $3, $3, 1, $4, $5, $6)
            ON CONFLICT (session_id) DO UPDATE SET
                user_id = COALESCE(EXCLUDED.user_id, chat_session_summary.user_id),
                last_message_at = EXCLUDED.last_message_at,
                message_count = chat_session_summary.message_count + 1,
                failed_count = chat_session_summary.failed_count + EXCLUDED.failed_count,
                last_intent = EXCLUDED.last_intent,
                last_symbol = COALESCE(EXCLUDED.last_symbol, chat_session_summary.last_symbol)
            "#,
        )
        .bind(&r.session_id)
        .bind(&r.user_id)
        .bind(r.created_at)
        .bind(if r.success { 0i32 } else { 1i32 })
        .bind(r.intent.as_str())
        .bind(&r.resolved_symbol)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_unresolved(&self, r: &InteractionRecord, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO unresolved_queries (
                session_id, raw_text, normalized_text, language, detected_intent, confidence,
                failure_reason, entities, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&r.session_id)
        .bind(&r.raw_text)
        .bind(&r.normalized_text)
        .bind(r.language.as_str())
        .bind(r.intent.as_str())
        .bind(r.confidence)
        .bind(reason)
        .bind(&r.entities)
        .bind(r.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Writes one interaction and, when it failed, one unresolved-queue row.
pub async fn record(sink: &dyn AnalyticsSink, record: &InteractionRecord) {
    if let Err(e) = sink.insert_interaction(record).await {
        warn!("Failed to log interaction for {}: {}", record.session_id, e);
    }
    if let Err(e) = sink.upsert_session_summary(record).await {
        warn!("Failed to update session summary for {}: {}", record.session_id, e);
    }
    if let Some(reason) = record.failure_reason() {
        if let Err(e) = sink.insert_unresolved(record, &reason).await {
            warn!("Failed to queue unresolved query for {}: {}", record.session_id, e);
        }
    }
}

#[derive(Clone)]
pub struct AnalyticsLogger {
    sink: Arc<dyn AnalyticsSink>,
}

impl AnalyticsLogger {
    pub fn new(sink: Arc<dyn AnalyticsSink>) -> Self {
        Self { sink }
    }

    /// Spawns the write; the caller never waits on it.
    pub fn log(&self, interaction: InteractionRecord) -> JoinHandle<()> {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            record(sink.as_ref(), &interaction).await;
        })
    }
}
