use crate::error::{AppError, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: Option<RedisConfig>,
    pub jwt: JwtConfig,
    pub llm: Option<LlmConfig>,
    pub embedding: Option<EmbeddingConfig>,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
}

/// OpenAI-compatible chat-completion endpoint used by the paraphraser and
/// the narrative layer.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub guest_question_limit: u32,
    pub context_ttl: Duration,
    pub paraphrase_timeout: Duration,
    pub narrative_timeout: Duration,
    pub live_fetch_timeout: Duration,
    pub live_market_url: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            guest_question_limit: 5,
            context_ttl: Duration::from_secs(30 * 60),
            paraphrase_timeout: Duration::from_millis(2000),
            narrative_timeout: Duration::from_millis(3000),
            live_fetch_timeout: Duration::from_secs(15),
            live_market_url: DEFAULT_LIVE_MARKET_URL.to_string(),
        }
    }
}

const DEFAULT_LIVE_MARKET_URL: &str =
    "https://query1.finance.yahoo.com/v8/finance/chart/{symbol}?range={range}&interval=1d";

impl AppConfig {
    pub fn new() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| AppError::Internal("DATABASE_URL must be set".to_string()))?;

        let defaults = ChatConfig::default();

        Ok(Self {
            server: ServerConfig {
                port: env_parse("PORT", 8000),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10),
            },
            redis: env_opt("REDIS_URL").map(|url| RedisConfig { url }),
            jwt: JwtConfig {
                secret: std::env::var("JWT_SECRET").unwrap_or_else(|_| {
                    tracing::warn!("JWT_SECRET not set, using development secret");
                    "dev-secret-change-me".to_string()
                }),
            },
            llm: env_opt("LLM_API_KEY").map(|api_key| LlmConfig {
                api_key,
                base_url: std::env::var("LLM_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                model: std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            }),
            embedding: env_opt("EMBEDDING_API_KEY").map(|api_key| EmbeddingConfig {
                api_key,
                base_url: std::env::var("EMBEDDING_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                model: std::env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            }),
            chat: ChatConfig {
                guest_question_limit: env_parse(
                    "GUEST_QUESTION_LIMIT",
                    defaults.guest_question_limit,
                ),
                context_ttl: Duration::from_secs(env_parse(
                    "CHAT_CONTEXT_TTL_SECS",
                    defaults.context_ttl.as_secs(),
                )),
                paraphrase_timeout: Duration::from_millis(env_parse(
                    "PARAPHRASE_TIMEOUT_MS",
                    defaults.paraphrase_timeout.as_millis() as u64,
                )),
                narrative_timeout: Duration::from_millis(env_parse(
                    "NARRATIVE_TIMEOUT_MS",
                    defaults.narrative_timeout.as_millis() as u64,
                )),
                live_fetch_timeout: Duration::from_secs(env_parse(
                    "LIVE_FETCH_TIMEOUT_SECS",
                    defaults.live_fetch_timeout.as_secs(),
                )),
                live_market_url: std::env::var("LIVE_MARKET_URL")
                    .unwrap_or(defaults.live_market_url),
            },
        })
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_defaults_match_documented_budgets() {
        let chat = ChatConfig::default();
        assert_eq!(chat.guest_question_limit, 5);
        assert_eq!(chat.context_ttl, Duration::from_secs(1800));
        assert!(chat.paraphrase_timeout <= Duration::from_secs(2));
        assert!(chat.live_fetch_timeout <= Duration::from_secs(15));
    }

    #[test]
    fn env_parse_falls_back_on_garbage() {
        std::env::set_var("EGX_TEST_GARBAGE_PORT", "not-a-number");
        assert_eq!(env_parse("EGX_TEST_GARBAGE_PORT", 42u16), 42);
    }
}
