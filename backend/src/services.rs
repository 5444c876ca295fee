use crate::{
    ai::{AIService, ChatCompletion, HttpEmbedder, SentenceEmbedder},
    auth::{AuthService, GuestLimiter},
    cache::Cache,
    chat::{
        analytics::{AnalyticsLogger, PgAnalyticsSink},
        context::{ContextStore, MemoryContextStore, RedisContextStore},
        dispatcher::Dispatcher,
        narrative::NarrativeWriter,
        paraphraser::Paraphraser,
        resolver::SymbolResolver,
        router::{semantic::SemanticIndex, IntentRouter},
        ChatPipeline,
    },
    config::AppConfig,
    database::Database,
    error::Result,
    financial::{FinancialService, LiveMarketFeed},
    repository::{postgres::PgMarketRepository, MarketRepository},
};
use std::sync::Arc;
use tracing::{info, warn};

pub struct AppServices {
    pub auth: AuthService,
    pub guests: GuestLimiter,
    pub chat: Arc<ChatPipeline>,
}

impl AppServices {
    pub async fn new(config: &AppConfig, database: &Database, cache: Option<Arc<Cache>>) -> Result<Self> {
        let repo: Arc<dyn MarketRepository> = Arc::new(PgMarketRepository::new(database.pool().clone()));
        let live: Arc<dyn LiveMarketFeed> = Arc::new(FinancialService::new(&config.chat));

        let llm: Option<Arc<dyn ChatCompletion>> = config.llm.clone().map(|llm| {
            info!("LLM layer enabled with model {}", llm.model);
            Arc::new(AIService::new(llm)) as Arc<dyn ChatCompletion>
        });

        let semantic = match config.embedding.clone() {
            Some(embedding) => {
                let embedder: Arc<dyn SentenceEmbedder> = Arc::new(HttpEmbedder::new(embedding));
                match SemanticIndex::build(embedder).await {
                    Ok(index) => Some(index),
                    Err(e) => {
                        warn!("Semantic fallback disabled, example embedding failed: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        let context: Arc<dyn ContextStore> = match &cache {
            Some(cache) => Arc::new(RedisContextStore::new(cache.clone(), config.chat.context_ttl)),
            None => Arc::new(MemoryContextStore::new(config.chat.context_ttl)),
        };

        let router = IntentRouter::new(semantic);
        info!("Intent router ready, semantic fallback: {}", router.has_semantic());

        let chat = ChatPipeline::new(
            router,
            SymbolResolver::new(repo.clone()),
            Dispatcher::new(repo, Some(live), config.chat.live_fetch_timeout),
            context,
            Paraphraser::new(llm.clone(), config.chat.paraphrase_timeout),
            NarrativeWriter::new(llm, config.chat.narrative_timeout),
            AnalyticsLogger::new(Arc::new(PgAnalyticsSink::new(database.pool().clone()))),
        );

        Ok(Self {
            auth: AuthService::new(&config.jwt),
            guests: GuestLimiter::new(cache, config.chat.guest_question_limit),
            chat: Arc::new(chat),
        })
    }
}
