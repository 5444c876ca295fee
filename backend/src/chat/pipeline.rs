//! Request orchestration: normalize, screen, route, resolve, dispatch,
//! build, narrate, remember, log. Every failure ends in a `ChatResponse`.

use super::{
    analytics::{AnalyticsLogger, InteractionRecord},
    builder::{self, Classified},
    compliance,
    context::{Context, ContextStore, ContextUpdate},
    dispatcher::{Dispatched, Dispatcher, Target},
    extractor,
    handlers::HandlerResult,
    narrative::NarrativeWriter,
    normalizer::NormalizedText,
    paraphraser::Paraphraser,
    resolver::{best, needs_clarification, ResolverSession, SymbolResolver},
    router::IntentRouter,
    schema::{ChatResponse, Entities, EntityType, Intent, Language, MarketCode, Range, ResolvedSymbol},
};
use crate::{
    error::{AppError, Result},
    models::Caller,
};
use chrono::Utc;
use futures::FutureExt;
use std::{
    collections::HashMap,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

const SESSION_LOCKS_SOFT_CAP: usize = 1024;

/// One chat turn as received from the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct ChatInput {
    pub message: String,
    pub session_id: Option<String>,
    pub market: Option<MarketCode>,
    pub caller: Caller,
}

/// Result of the main path: the response and its analytics row.
struct Turn {
    response: ChatResponse,
    record: InteractionRecord,
}

pub struct ChatPipeline {
    router: IntentRouter,
    resolver: SymbolResolver,
    dispatcher: Dispatcher,
    context: Arc<dyn ContextStore>,
    paraphraser: Paraphraser,
    narrative: NarrativeWriter,
    analytics: AnalyticsLogger,
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ChatPipeline {
    pub fn new(
        router: IntentRouter,
        resolver: SymbolResolver,
        dispatcher: Dispatcher,
        context: Arc<dyn ContextStore>,
        paraphraser: Paraphraser,
        narrative: NarrativeWriter,
        analytics: AnalyticsLogger,
    ) -> Self {
        Self {
            router,
            resolver,
            dispatcher,
            context,
            paraphraser,
            narrative,
            analytics,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        if locks.len() > SESSION_LOCKS_SOFT_CAP {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Never fails: faults and panics become a `SYSTEM_ERROR` response.
    pub async fn handle(&self, input: ChatInput) -> ChatResponse {
        let started = Instant::now();
        let session_id = input
            .session_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.context.generate_session_id());

        let lock = self.session_lock(&session_id).await;
        let _guard = lock.lock().await;

        let outcome = AssertUnwindSafe(self.process(&input, &session_id, started))
            .catch_unwind()
            .await;
        let turn = match outcome {
            Ok(Ok(turn)) => turn,
            Ok(Err(e)) => {
                error!("Chat pipeline failed for session {}: {:?}", session_id, e);
                self.fault(&input, &session_id, started, format!("{:?}", e))
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic".to_string());
                error!("Chat pipeline panicked for session {}: {}", session_id, reason);
                self.fault(&input, &session_id, started, reason)
            }
        };

        info!(
            "chat session={} intent={} confidence={:.2} latency_ms={}",
            session_id, turn.response.meta.intent, turn.response.meta.confidence, turn.response.meta.latency_ms
        );
        self.analytics.log(turn.record);
        turn.response
    }

    fn fault(&self, input: &ChatInput, session_id: &str, started: Instant, reason: String) -> Turn {
        let text = NormalizedText::new(&input.message);
        let response = builder::system_error(text.language, started.elapsed(), session_id);
        let record = InteractionRecord {
            session_id: session_id.to_string(),
            user_id: input.caller.user_id.clone(),
            raw_text: input.message.clone(),
            normalized_text: text.normalized,
            language: text.language,
            intent: Intent::SystemError,
            confidence: 0.0,
            entities: serde_json::json!({"exception": reason}),
            resolved_symbol: None,
            resolver_method: None,
            handler: "system".to_string(),
            success: false,
            cards_count: response.cards.len() as i32,
            fallback: true,
            error_code: Some("SYSTEM_ERROR".to_string()),
            latency_ms: response.meta.latency_ms as i64,
            actions_shown: Vec::new(),
            created_at: Utc::now(),
        };
        Turn { response, record }
    }

    async fn load_context(&self, session_id: &str) -> Option<Context> {
        match self.context.get(session_id).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("Context read failed for {}: {}", session_id, e);
                None
            }
        }
    }

    async fn process(&self, input: &ChatInput, session_id: &str, started: Instant) -> Result<Turn> {
        let original = NormalizedText::new(&input.message);
        let language = original.language;

        let verdict = compliance::check(&input.message);
        if verdict.blocked {
            let message = verdict
                .message
                .unwrap_or_else(|| compliance::blocked_message(verdict.language).to_string());
            let entities = Entities::default();
            let response = builder::blocked(message, verdict.language, &entities, started.elapsed(), session_id);
            let record = self.record(input, &original, session_id, &response, None, "compliance", &HandlerResult::ok(""));
            return Ok(Turn { response, record });
        }

        let context = self.load_context(session_id).await;
        let context_symbol = context.as_ref().and_then(|c| c.last_symbol.clone());

        // the rewrite only feeds routing and extraction
        let routing_text = match self.paraphraser.paraphrase(&input.message).await {
            Some(rewritten) => NormalizedText::new(&rewritten),
            None => original.clone(),
        };

        let mut entities = extractor::extract(&routing_text);
        if entities.market_code.is_none() {
            entities.market_code = input.market;
        }
        let routed = self
            .router
            .route(&routing_text, entities, context_symbol.as_deref())
            .await;
        let confidence = routed.confidence;
        let mut entities = routed.entities;

        let intent = match routed.intent {
            Intent::FollowUp => context
                .as_ref()
                .and_then(|c| c.last_intent)
                .filter(|i| i.requires_symbol() || i.is_deep())
                .unwrap_or(Intent::StockSnapshot),
            other => other,
        };
        if entities.symbol.is_none() && (intent.requires_symbol() || intent.is_deep()) {
            entities.symbol = context_symbol.clone();
        }
        if entities.range.is_none() && intent.implies_chart() {
            entities.range = Some(Range::OneMonth);
        }

        let (target, dispatched) = match self.resolve_target(intent, &entities).await {
            Ok(target) => {
                if let Target::Symbol(symbol) = &target {
                    entities.symbol = Some(symbol.symbol.clone());
                    if entities.market_code.is_none() {
                        entities.market_code = symbol.market_code;
                    }
                }
                let dispatched = match self.dispatcher.dispatch(intent, &entities, language, &target).await {
                    Ok(dispatched) => dispatched,
                    Err(e) => data_unavailable(intent, language, e)?,
                };
                (target, dispatched)
            }
            Err(e) => (Target::None, data_unavailable(intent, language, e)?),
        };

        let classified = Classified {
            intent: dispatched.intent,
            confidence,
            entities: &entities,
            language,
        };
        let mut response = builder::build(dispatched.result.clone(), &classified, started.elapsed(), session_id);

        let answered = dispatched.intent;
        if dispatched.result.success && !answered.is_system() && !answered.is_chitchat() {
            if let Some(narrative) = self.narrative.narrate(&input.message, answered, &response).await {
                narrative.apply(&mut response);
            }
        }

        if dispatched.result.success && !answered.is_system() {
            let resolved = match &target {
                Target::Symbol(s) => Some(s),
                _ => None,
            };
            let update = ContextUpdate {
                last_symbol: resolved.map(|s| s.symbol.clone()),
                last_market: resolved.and_then(|s| s.market_code).or(entities.market_code),
                last_intent: (!answered.is_chitchat()).then_some(answered),
                last_range: entities.range,
            };
            if let Err(e) = self.context.set(session_id, update).await {
                warn!("Context write failed for {}: {}", session_id, e);
            }
        }

        response.meta.latency_ms = started.elapsed().as_millis() as u64;
        response.meta.as_of = Utc::now();

        let record = self.record(
            input,
            &original,
            session_id,
            &response,
            target.symbol(),
            dispatched.handler,
            &dispatched.result,
        );
        Ok(Turn { response, record })
    }

    async fn resolve_target(&self, intent: Intent, entities: &Entities) -> Result<Target> {
        let mut session = ResolverSession::new(&self.resolver);
        let market = entities.market_code;
        let hint = intent.preferred_entity_type();

        if intent == Intent::CompareStocks {
            let Some([first, second]) = &entities.compare_symbols else {
                return Ok(Target::None);
            };
            let mut pair = Vec::with_capacity(2);
            for query in [first, second] {
                let candidates = session.candidates(query, market, Some(EntityType::Stock)).await?;
                match best(&candidates) {
                    Some(symbol) => pair.push(symbol),
                    None => {
                        return Ok(Target::Ambiguous {
                            query: query.clone(),
                            candidates,
                        })
                    }
                }
            }
            let second = pair.pop();
            let first = pair.pop();
            return Ok(match (first, second) {
                (Some(a), Some(b)) => Target::Pair(a, b),
                _ => Target::None,
            });
        }

        let needs_symbol = intent.requires_symbol() || intent.is_deep();
        let Some(query) = entities.symbol.as_deref().filter(|_| needs_symbol) else {
            return Ok(Target::None);
        };
        let candidates = session.candidates(query, market, hint).await?;
        Ok(match best(&candidates) {
            Some(symbol) if !needs_clarification(&candidates) => Target::Symbol(symbol),
            _ => Target::Ambiguous {
                query: query.to_string(),
                candidates,
            },
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        input: &ChatInput,
        text: &NormalizedText,
        session_id: &str,
        response: &ChatResponse,
        resolved: Option<&ResolvedSymbol>,
        handler: &str,
        result: &HandlerResult,
    ) -> InteractionRecord {
        InteractionRecord {
            session_id: session_id.to_string(),
            user_id: input.caller.user_id.clone(),
            raw_text: input.message.clone(),
            normalized_text: text.normalized.clone(),
            language: text.language,
            intent: response.meta.intent,
            confidence: response.meta.confidence,
            entities: serde_json::to_value(&response.meta.entities).unwrap_or_default(),
            resolved_symbol: resolved.map(|s| s.symbol.clone()),
            resolver_method: resolved.map(|s| s.match_type.as_str().to_string()),
            handler: handler.to_string(),
            success: result.success,
            cards_count: response.cards.len() as i32,
            fallback: result.fallback,
            error_code: result.error_code.clone(),
            latency_ms: response.meta.latency_ms as i64,
            actions_shown: response.actions.iter().map(|a| a.payload.clone()).collect(),
            created_at: Utc::now(),
        }
    }
}

/// Read-model failures degrade to a no-data reply for the routed intent;
/// anything else reaches the fault boundary.
fn data_unavailable(intent: Intent, language: Language, e: AppError) -> Result<Dispatched> {
    if !matches!(e, AppError::Database(_)) {
        return Err(e);
    }
    warn!("Data access failed for {} ({}): {}", intent, e.code(), e);
    Ok(Dispatched {
        intent,
        handler: super::dispatcher::handler_name(intent),
        result: HandlerResult::no_data(if language.is_arabic() {
            "البيانات غير متاحة حاليا."
        } else {
            "That data isn't available right now."
        }),
    })
}

/// Test wiring over the in-memory repository.
#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::{
        chat::{analytics::testing::MemorySink, context::MemoryContextStore},
        repository::memory::MemoryRepository,
    };

    pub fn pipeline_with(context: Arc<dyn ContextStore>, sink: Arc<MemorySink>) -> ChatPipeline {
        pipeline_over(MemoryRepository::seeded(), context, sink)
    }

    pub fn pipeline_over(repo: MemoryRepository, context: Arc<dyn ContextStore>, sink: Arc<MemorySink>) -> ChatPipeline {
        let repo = Arc::new(repo);
        ChatPipeline::new(
            IntentRouter::new(None),
            SymbolResolver::new(repo.clone()),
            Dispatcher::new(repo, None, Duration::from_millis(100)),
            context,
            Paraphraser::new(None, Duration::from_millis(100)),
            NarrativeWriter::new(None, Duration::from_millis(100)),
            AnalyticsLogger::new(sink),
        )
    }

    pub fn pipeline(sink: Arc<MemorySink>) -> (ChatPipeline, Arc<MemoryContextStore>) {
        let store = Arc::new(MemoryContextStore::new(Duration::from_secs(60)));
        (pipeline_with(store.clone(), sink), store)
    }

    pub fn ask(message: &str, session: &str) -> ChatInput {
        ChatInput {
            message: message.to_string(),
            session_id: Some(session.to_string()),
            ..Default::default()
        }
    }

    /// Lets spawned analytics writes land.
    pub async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::{testing::*, *};
    use crate::{
        chat::{
            analytics::testing::MemorySink,
            context::MemoryContextStore,
            schema::{CardType, ChartType, DataSource},
        },
        repository::memory::MemoryRepository,
    };
    use async_trait::async_trait;

    fn card<'r>(response: &'r ChatResponse, card_type: CardType) -> Option<&'r crate::chat::schema::Card> {
        response.cards.iter().find(|c| c.card_type == card_type)
    }

    #[tokio::test]
    async fn price_question_returns_snapshot_and_chart_action() {
        let sink = Arc::new(MemorySink::default());
        let (p, store) = pipeline(sink.clone());
        let r = p.handle(ask("What is the price of COMI?", "s1")).await;

        assert_eq!(r.meta.intent, Intent::StockPrice);
        let snapshot = card(&r, CardType::Snapshot).unwrap();
        for key in ["last_price", "change_percent", "volume"] {
            assert!(snapshot.data[key].is_number(), "{}", key);
        }
        let chart = r.actions.iter().find(|a| a.label == "View Chart").unwrap();
        assert_eq!(chart.payload, "Chart COMI");

        let ctx = store.get("s1").await.unwrap().unwrap();
        assert_eq!(ctx.last_symbol.as_deref(), Some("COMI"));
        settle().await;
        assert_eq!(sink.interactions.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn arabic_chart_with_range() {
        let sink = Arc::new(MemorySink::default());
        let (p, _) = pipeline(sink);
        let r = p.handle(ask("شارت SWDY 6M", "s2")).await;

        assert_eq!(r.meta.intent, Intent::StockChart);
        assert_eq!(r.meta.entities.range, Some(Range::SixMonths));
        let chart = r.chart.unwrap();
        assert_eq!(chart.range, Some(Range::SixMonths));
        assert!(matches!(chart.data_source, Some(DataSource::Database) | Some(DataSource::Live)));
        assert!(r.actions.iter().any(|a| ["1M", "3M", "6M"].contains(&a.label.as_str())));
    }

    #[tokio::test]
    async fn compare_two_stocks() {
        let sink = Arc::new(MemorySink::default());
        let (p, _) = pipeline(sink);
        let r = p.handle(ask("Compare COMI vs SWDY", "s3")).await;

        assert_eq!(r.meta.intent, Intent::CompareStocks);
        assert!(r.meta.confidence >= 0.95);
        let table = card(&r, CardType::CompareTable).unwrap();
        assert_eq!(table.data["stocks"].as_array().unwrap().len(), 2);
        for metric in table.data["metrics"].as_array().unwrap() {
            assert!(!metric["values"]["COMI"].is_null());
            assert!(!metric["values"]["SWDY"].is_null());
        }
        let chart = r.chart.unwrap();
        assert_eq!(chart.chart_type, ChartType::Line);
        assert_eq!(chart.series[0]["COMI"], 0.0);
        assert!(r.disclaimer.is_some());
    }

    #[tokio::test]
    async fn top_gainers_are_positive_and_skip_funds() {
        let sink = Arc::new(MemorySink::default());
        let (p, _) = pipeline(sink);
        let r = p.handle(ask("Top gainers today", "s4")).await;

        assert_eq!(r.meta.intent, Intent::TopGainers);
        let movers: Vec<_> = r.cards.iter().filter(|c| c.card_type == CardType::MoversTable).collect();
        assert_eq!(movers.len(), 1);
        let rows = movers[0].data["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 10);
        let changes: Vec<f64> = rows.iter().map(|r| r["change_percent"].as_f64().unwrap()).collect();
        assert!(changes.iter().all(|c| *c > 0.0));
        assert!(changes.windows(2).all(|w| w[0] >= w[1]));
        assert!(rows.iter().all(|r| r["symbol"] != "AZGF"));
    }

    #[tokio::test]
    async fn safety_question_builds_health_card_and_donut() {
        let sink = Arc::new(MemorySink::default());
        let (p, _) = pipeline(sink);
        let r = p.handle(ask("Is COMI safe?", "s5")).await;

        assert_eq!(r.meta.intent, Intent::DeepSafety);
        let health = card(&r, CardType::DeepHealth).unwrap();
        assert!(health.data["z_score"].is_number());
        assert!(health.data["f_score"].is_number());
        let status = health.data["status"].as_str().unwrap();
        assert!(["Safe Zone 🟢", "Grey Zone 🟡", "Distress Zone 🔴", "Data Unavailable ⚪"].contains(&status));
        assert_eq!(r.chart.unwrap().chart_type, ChartType::Donut);
        assert!(r.disclaimer.is_some());
    }

    #[tokio::test]
    async fn advice_is_blocked_before_data_access() {
        let sink = Arc::new(MemorySink::default());
        let (p, store) = pipeline(sink.clone());
        let r = p.handle(ask("Should I buy Aramco?", "s6")).await;

        assert_eq!(r.meta.intent, Intent::Blocked);
        assert!(r.cards.is_empty());
        assert_eq!(r.language, Language::En);
        assert!(store.get("s6").await.unwrap().is_none());
        settle().await;
        assert_eq!(sink.interactions.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn follow_up_reuses_the_last_symbol() {
        let sink = Arc::new(MemorySink::default());
        let (p, _) = pipeline(sink);
        p.handle(ask("What is the price of COMI?", "s7")).await;
        let r = p.handle(ask("and what about it", "s7")).await;
        assert_eq!(r.meta.intent, Intent::StockPrice);
        assert_eq!(r.meta.entities.symbol.as_deref(), Some("COMI"));
    }

    #[tokio::test]
    async fn missing_symbol_asks_for_clarification_and_is_queued() {
        let sink = Arc::new(MemorySink::default());
        let (p, _) = pipeline(sink.clone());
        let r = p.handle(ask("show me the dividends", "s8")).await;
        assert_eq!(r.meta.intent, Intent::ClarifySymbol);
        assert!(!r.actions.is_empty());
        settle().await;
        let queued = sink.unresolved.lock().await;
        assert_eq!(queued.len(), 1);
        assert!(["CLARIFY_SYMBOL", "LOW_CONFIDENCE"].contains(&queued[0].1.as_str()));
    }

    #[tokio::test]
    async fn unknown_text_gets_suggestions() {
        let sink = Arc::new(MemorySink::default());
        let (p, _) = pipeline(sink.clone());
        let r = p.handle(ask("blue elephants dancing", "s9")).await;
        assert_eq!(r.meta.intent, Intent::Unknown);
        assert!(card(&r, CardType::Suggestions).is_some());
        settle().await;
        assert_eq!(sink.unresolved.lock().await[0].1, "LOW_CONFIDENCE");
    }

    #[tokio::test]
    async fn resolver_database_failure_is_no_data_not_a_fault() {
        let sink = Arc::new(MemorySink::default());
        let repo = MemoryRepository {
            fail_aliases: true,
            ..MemoryRepository::seeded()
        };
        let store = Arc::new(MemoryContextStore::new(Duration::from_secs(60)));
        let p = pipeline_over(repo, store, sink.clone());
        let r = p.handle(ask("What is the price of COMI?", "s11")).await;

        assert_eq!(r.meta.intent, Intent::StockPrice);
        assert!(r.cards.iter().all(|c| c.card_type != CardType::Error));
        settle().await;
        let logged = sink.interactions.lock().await;
        assert_eq!(logged[0].error_code.as_deref(), Some("NO_DB_DATA"));
        assert_eq!(logged[0].handler, "market.snapshot");
        assert_eq!(sink.unresolved.lock().await[0].1, "NO_DB_DATA");
    }

    #[tokio::test]
    async fn comparing_a_stock_with_its_alias_asks_again() {
        let sink = Arc::new(MemorySink::default());
        let (p, _) = pipeline(sink);
        let r = p.handle(ask("Compare COMI vs CIB", "s12")).await;

        assert_eq!(r.meta.intent, Intent::ClarifySymbol);
        assert!(card(&r, CardType::CompareTable).is_none());
        assert!(r.chart.is_none());
        assert!(r.actions.iter().all(|a| a.payload.starts_with("Compare COMI vs ") && a.payload != "Compare COMI vs COMI"));
    }

    struct Exploding;

    #[async_trait]
    impl ContextStore for Exploding {
        async fn get(&self, _session_id: &str) -> Result<Option<Context>> {
            panic!("context store exploded")
        }

        async fn set(&self, _session_id: &str, _update: ContextUpdate) -> Result<Context> {
            Err(AppError::Internal("unreachable".into()))
        }
    }

    #[tokio::test]
    async fn panics_become_system_error() {
        let sink = Arc::new(MemorySink::default());
        let p = pipeline_with(Arc::new(Exploding), sink.clone());
        let r = p.handle(ask("Price of COMI", "s10")).await;

        assert_eq!(r.meta.intent, Intent::SystemError);
        assert_eq!(r.meta.confidence, 0.0);
        assert_eq!(r.cards[0].card_type, CardType::Error);
        settle().await;
        let logged = sink.interactions.lock().await;
        assert_eq!(logged.len(), 1);
        assert!(!logged[0].success);
        assert!(logged[0].entities["exception"].as_str().unwrap().contains("exploded"));
    }

    #[tokio::test]
    async fn every_card_type_is_closed_and_disclaimers_hold() {
        let sink = Arc::new(MemorySink::default());
        let (p, _) = pipeline(sink);
        for (i, q) in [
            "Annual financials for COMI",
            "Market cap of SWDY",
            "Technical analysis of COMI",
            "Who owns COMI?",
            "What is P/E ratio?",
            "hello",
        ]
        .into_iter()
        .enumerate()
        {
            let r = p.handle(ask(q, &format!("m{}", i))).await;
            assert!(r.cards.iter().all(|c| CardType::ALL.contains(&c.card_type)), "{}", q);
            if r.meta.intent.needs_disclaimer() {
                assert!(r.disclaimer.as_deref().map_or(false, |d| !d.is_empty()), "{}", q);
            }
        }
    }
}
