use crate::{config::DatabaseConfig, error::{AppError, Result}};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Bounded Postgres pool shared by the read model (resolver, handlers) and
/// the analytics writer.
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.url)
            .await
            .map_err(AppError::Database)?;

        // Chat-owned tables; the market read model is provisioned by ingestion.
        for statement in CHAT_SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(AppError::Database)?;
        }

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(true)
    }
}

const CHAT_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS chat_interactions (
        id BIGSERIAL PRIMARY KEY,
        session_id VARCHAR(64) NOT NULL,
        user_id VARCHAR(64),
        raw_text TEXT NOT NULL,
        normalized_text TEXT,
        language VARCHAR(8),
        intent VARCHAR(64) NOT NULL,
        confidence DOUBLE PRECISION,
        entities JSONB,
        resolved_symbol VARCHAR(32),
        resolver_method VARCHAR(32),
        handler VARCHAR(64),
        success BOOLEAN NOT NULL,
        cards_count INTEGER NOT NULL DEFAULT 0,
        fallback BOOLEAN NOT NULL DEFAULT FALSE,
        error_code TEXT,
        latency_ms BIGINT NOT NULL,
        actions_shown JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_session_summary (
        session_id VARCHAR(64) PRIMARY KEY,
        user_id VARCHAR(64),
        first_message_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        last_message_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        message_count INTEGER NOT NULL DEFAULT 0,
        failed_count INTEGER NOT NULL DEFAULT 0,
        last_intent VARCHAR(64),
        last_symbol VARCHAR(32)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS unresolved_queries (
        id BIGSERIAL PRIMARY KEY,
        session_id VARCHAR(64) NOT NULL,
        raw_text TEXT NOT NULL,
        normalized_text TEXT,
        language VARCHAR(8),
        detected_intent VARCHAR(64),
        confidence DOUBLE PRECISION,
        failure_reason TEXT NOT NULL,
        entities JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
];
