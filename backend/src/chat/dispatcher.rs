//! Static intent → handler table. Required-entity gating happens here and
//! nowhere else; handlers assume their inputs are present.

use super::{
    handlers::{
        chitchat, command_for, compare, corporate, deep, fundamentals, funds, market,
        screeners::{self, screener_default, DEFAULT_SECTOR},
        technical, HandlerContext, HandlerResult,
    },
    schema::{Action, CardType, Direction, Entities, Intent, Language, ResolutionCandidate, ResolvedSymbol},
};
use crate::{
    error::Result,
    financial::LiveMarketFeed,
    repository::{MarketRepository, PeriodType, StatMetric, StatementKind},
};
use serde_json::json;
use std::{sync::Arc, time::Duration};

pub const CLARIFY_SYMBOL: &str = "CLARIFY_SYMBOL";

/// What symbol resolution produced for the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Target {
    #[default]
    None,
    Symbol(ResolvedSymbol),
    Pair(ResolvedSymbol, ResolvedSymbol),
    /// The query named something, but the ranking was too close or too weak.
    Ambiguous {
        query: String,
        candidates: Vec<ResolutionCandidate>,
    },
}

impl Target {
    pub fn symbol(&self) -> Option<&ResolvedSymbol> {
        match self {
            Target::Symbol(s) => Some(s),
            Target::Pair(s, _) => Some(s),
            _ => None,
        }
    }
}

/// A handler result together with the intent actually answered and the
/// handler that produced it.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub intent: Intent,
    pub handler: &'static str,
    pub result: HandlerResult,
}

pub fn handler_name(intent: Intent) -> &'static str {
    use Intent::*;
    match intent {
        StockPrice | StockSnapshot | StockMarketCap => "market.snapshot",
        StockChart => "market.chart",
        StockStat => "market.stats",
        StockVolume => "market.volume",
        Stock52WeekRange => "market.range_52w",
        FinancialsAnnual | FinancialsQuarterly => "fundamentals.financials",
        FinancialExplorer => "fundamentals.explorer",
        IncomeStatement | BalanceSheet | CashFlow => "fundamentals.statement",
        RevenueTrend => "fundamentals.revenue_trend",
        Dividends => "fundamentals.dividends",
        MetricEps | MetricPe | MetricPb | MetricRoe | MetricMargins | MetricDebt | RatiosValuation
        | RatiosProfitability | RatiosLiquidity | RatiosLeverage | RatiosEfficiency => "fundamentals.metrics",
        FairValue => "fundamentals.fair_value",
        DeepSafety | DeepValuation | DeepEfficiency | DeepGrowth => "deep",
        TopGainers | TopLosers | MostActive => "screeners.movers",
        SectorStocks => "screeners.sector_stocks",
        SectorList => "screeners.sector_list",
        DividendLeaders => "screeners.dividend_leaders",
        LargestCompanies => "screeners.largest",
        ScreenerPe => "screeners.pe",
        ScreenerDeepMetric | ScreenerGrowth | ScreenerSafety | ScreenerValue | ScreenerIncome => {
            "screeners.metric"
        }
        MarketSummary => "screeners.market_summary",
        FundNav => "funds.nav",
        FundList => "funds.list",
        FundMovers => "funds.movers",
        Ownership => "corporate.ownership",
        News | Agm | CorporateActions => "corporate.filings",
        Earnings => "corporate.earnings",
        AnalystRatings => "corporate.analyst_ratings",
        TechnicalIndicators | TechnicalTrend | SupportResistance | Momentum | MovingAverages => "technical",
        CompareStocks => "compare",
        Greeting | Identity | Mood | Gratitude | Goodbye | DefineTerm | Help | Capabilities => "chitchat",
        ClarifySymbol => "clarify",
        FollowUp => "market.snapshot",
        Unknown => "chitchat.unknown",
        Blocked => "compliance",
        SystemError => "system",
    }
}

pub struct Dispatcher {
    repo: Arc<dyn MarketRepository>,
    live: Option<Arc<dyn LiveMarketFeed>>,
    live_timeout: Duration,
}

impl Dispatcher {
    pub fn new(repo: Arc<dyn MarketRepository>, live: Option<Arc<dyn LiveMarketFeed>>, live_timeout: Duration) -> Self {
        Self {
            repo,
            live,
            live_timeout,
        }
    }

    pub async fn dispatch(
        &self,
        intent: Intent,
        entities: &Entities,
        language: Language,
        target: &Target,
    ) -> Result<Dispatched> {
        let ctx = HandlerContext {
            repo: self.repo.as_ref(),
            live: self.live.as_deref(),
            live_timeout: self.live_timeout,
            language,
            entities,
        };
        let answered = |result: HandlerResult| Dispatched {
            intent,
            handler: handler_name(intent),
            result,
        };

        if intent.is_chitchat() || intent == Intent::Unknown {
            return Ok(answered(chitchat::handle(&ctx, intent)));
        }

        if intent == Intent::CompareStocks {
            return match target {
                Target::Pair(a, b) if a.symbol == b.symbol => Ok(clarify_same_pair(&ctx, a)),
                Target::Pair(a, b) => Ok(answered(compare::handle(&ctx, a, b).await?)),
                Target::Ambiguous { query, candidates } => Ok(clarify(&ctx, intent, query, candidates)),
                _ => Ok(clarify_compare(&ctx)),
            };
        }

        if intent.is_deep() {
            return match target {
                Target::Symbol(symbol) => Ok(answered(deep::handle(&ctx, symbol, intent).await?)),
                Target::Ambiguous { query, candidates } => Ok(clarify(&ctx, intent, query, candidates)),
                _ => {
                    let (metric, direction) = screener_default(intent).unwrap_or((StatMetric::Roe, Direction::Desc));
                    Ok(Dispatched {
                        intent,
                        handler: "screeners.metric",
                        result: screeners::metric_screener(&ctx, metric, direction).await?,
                    })
                }
            };
        }

        if intent.requires_symbol() || intent == Intent::FollowUp {
            return match target {
                Target::Symbol(symbol) | Target::Pair(symbol, _) => {
                    Ok(answered(symbol_scoped(&ctx, intent, symbol).await?))
                }
                Target::Ambiguous { query, candidates } => Ok(clarify(&ctx, intent, query, candidates)),
                Target::None => Ok(ask_for_symbol(&ctx, intent)),
            };
        }

        let result = match intent {
            Intent::TopGainers | Intent::TopLosers | Intent::MostActive => screeners::movers(&ctx, intent).await?,
            Intent::SectorStocks => {
                let sector = entities.sector.as_deref().unwrap_or(DEFAULT_SECTOR);
                screeners::sector_stocks(&ctx, sector).await?
            }
            Intent::SectorList => screeners::sector_list(&ctx).await?,
            Intent::DividendLeaders => screeners::dividend_leaders(&ctx).await?,
            Intent::LargestCompanies => screeners::largest(&ctx).await?,
            Intent::ScreenerPe => screeners::pe_screener(&ctx).await?,
            Intent::ScreenerDeepMetric => {
                let (default_metric, default_direction) =
                    screener_default(intent).unwrap_or((StatMetric::Roe, Direction::Desc));
                let metric = entities
                    .metric
                    .as_deref()
                    .and_then(StatMetric::from_token)
                    .unwrap_or(default_metric);
                let direction = entities.direction.unwrap_or(default_direction);
                screeners::metric_screener(&ctx, metric, direction).await?
            }
            Intent::ScreenerGrowth | Intent::ScreenerSafety | Intent::ScreenerValue | Intent::ScreenerIncome => {
                let (metric, direction) = screener_default(intent).unwrap_or((StatMetric::Roe, Direction::Desc));
                screeners::metric_screener(&ctx, metric, entities.direction.unwrap_or(direction)).await?
            }
            Intent::MarketSummary => screeners::market_summary(&ctx).await?,
            Intent::FundList => funds::list(&ctx).await?,
            Intent::FundMovers => funds::movers(&ctx).await?,
            _ => chitchat::handle(&ctx, Intent::Unknown),
        };
        Ok(answered(result))
    }
}

async fn symbol_scoped(ctx: &HandlerContext<'_>, intent: Intent, symbol: &ResolvedSymbol) -> Result<HandlerResult> {
    use Intent::*;
    match intent {
        StockPrice | StockSnapshot | StockMarketCap => market::snapshot(ctx, symbol, intent).await,
        FollowUp => market::snapshot(ctx, symbol, StockSnapshot).await,
        StockChart => market::chart(ctx, symbol).await,
        StockStat => market::stats(ctx, symbol).await,
        StockVolume => market::volume(ctx, symbol).await,
        Stock52WeekRange => market::range_52w(ctx, symbol).await,
        FinancialsAnnual => fundamentals::financials(ctx, symbol, PeriodType::Annual).await,
        FinancialsQuarterly => fundamentals::financials(ctx, symbol, PeriodType::Quarterly).await,
        FinancialExplorer => fundamentals::explorer(ctx, symbol).await,
        IncomeStatement => fundamentals::statement(ctx, symbol, StatementKind::Income).await,
        BalanceSheet => fundamentals::statement(ctx, symbol, StatementKind::Balance).await,
        CashFlow => fundamentals::statement(ctx, symbol, StatementKind::Cashflow).await,
        RevenueTrend => fundamentals::revenue_trend(ctx, symbol).await,
        Dividends => fundamentals::dividends(ctx, symbol).await,
        FairValue => fundamentals::fair_value(ctx, symbol).await,
        MetricEps | MetricPe | MetricPb | MetricRoe | MetricMargins | MetricDebt | RatiosValuation
        | RatiosProfitability | RatiosLiquidity | RatiosLeverage | RatiosEfficiency => {
            fundamentals::metrics(ctx, symbol, intent).await
        }
        FundNav => funds::nav(ctx, symbol).await,
        Ownership => corporate::ownership(ctx, symbol).await,
        News | Agm | CorporateActions => corporate::filings(ctx, symbol, intent).await,
        Earnings => corporate::earnings(ctx, symbol).await,
        AnalystRatings => corporate::analyst_ratings(ctx, symbol).await,
        TechnicalIndicators | TechnicalTrend | SupportResistance | Momentum | MovingAverages => {
            technical::handle(ctx, symbol, intent).await
        }
        _ => market::snapshot(ctx, symbol, StockSnapshot).await,
    }
}

fn clarification(message: String, actions: Vec<Action>, data: serde_json::Value, ctx: &HandlerContext<'_>) -> Dispatched {
    Dispatched {
        intent: Intent::ClarifySymbol,
        handler: "clarify",
        result: HandlerResult {
            success: true,
            message,
            cards: vec![super::handlers::card(
                CardType::Suggestions,
                ctx.t("Did you mean", "هل تقصد"),
                data,
            )],
            chart: None,
            actions,
            error_code: Some(CLARIFY_SYMBOL.to_string()),
            fallback: false,
        },
    }
}

/// Ranked candidates become buttons that re-ask the original intent.
fn clarify(ctx: &HandlerContext<'_>, intent: Intent, query: &str, candidates: &[ResolutionCandidate]) -> Dispatched {
    let asked = if intent == Intent::CompareStocks {
        Intent::StockSnapshot
    } else {
        intent
    };
    let actions: Vec<Action> = candidates
        .iter()
        .take(4)
        .map(|c| {
            Action::query(
                c.display_name(Language::En),
                c.display_name(Language::Ar),
                command_for(asked, &c.symbol),
            )
        })
        .collect();
    let options: Vec<serde_json::Value> = candidates
        .iter()
        .take(4)
        .map(|c| {
            json!({
                "symbol": c.symbol,
                "name": c.display_name(ctx.language),
                "market_code": c.market_code,
                "entity_type": c.entity_type,
                "score": crate::utils::num(Some(c.final_score)),
            })
        })
        .collect();
    let message = if candidates.is_empty() {
        ctx.t(
            format!("I couldn't find a stock or fund matching \"{}\". Could you give the ticker?", query),
            format!("لم أجد سهماً أو صندوقاً باسم \"{}\". هل يمكنك كتابة الرمز؟", query),
        )
    } else {
        ctx.t(
            format!("\"{}\" could mean more than one company. Which one did you mean?", query),
            format!("\"{}\" قد تعني أكثر من شركة. أيها تقصد؟", query),
        )
    };
    clarification(message, actions, json!({"query": query, "candidates": options}), ctx)
}

fn ask_for_symbol(ctx: &HandlerContext<'_>, intent: Intent) -> Dispatched {
    let actions = ["COMI", "SWDY", "2222"]
        .into_iter()
        .map(|s| {
            let command = command_for(intent, s);
            Action::query(command.clone(), command.clone(), command)
        })
        .collect();
    clarification(
        ctx.t(
            "Which stock do you mean? Add a ticker or company name, for example:",
            "أي سهم تقصد؟ أضف الرمز أو اسم الشركة، مثلاً:",
        ),
        actions,
        json!({"query": null, "candidates": []}),
        ctx,
    )
}

fn clarify_compare(ctx: &HandlerContext<'_>) -> Dispatched {
    clarification(
        ctx.t(
            "Tell me the two stocks to compare, for example \"Compare COMI vs SWDY\".",
            "اذكر السهمين للمقارنة، مثلاً \"قارن COMI مع SWDY\".",
        ),
        vec![Action::query("Compare COMI vs SWDY", "قارن COMI مع SWDY", "Compare COMI vs SWDY")],
        json!({"query": null, "candidates": []}),
        ctx,
    )
}

/// Both sides resolved to one ticker, e.g. a name and its short alias.
fn clarify_same_pair(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol) -> Dispatched {
    let name = ctx.name(symbol);
    let actions = ["COMI", "SWDY", "TMGH"]
        .into_iter()
        .filter(|other| *other != symbol.symbol)
        .take(2)
        .map(|other| {
            let en = format!("Compare {} vs {}", symbol.symbol, other);
            let ar = format!("قارن {} مع {}", symbol.symbol, other);
            Action::query(en.clone(), ar, en)
        })
        .collect();
    clarification(
        ctx.t(
            format!("Both names point to {} ({}). Which other stock should I compare it with?", name, symbol.symbol),
            format!("الاسمان يشيران إلى {} ({}). ما السهم الآخر الذي تريد المقارنة معه؟", name, symbol.symbol),
        ),
        actions,
        json!({"query": symbol.symbol, "candidates": []}),
        ctx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chat::{
            handlers::testing::resolved,
            schema::{AliasType, EntityType, MarketCode, MatchType},
        },
        repository::memory::MemoryRepository,
    };

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(MemoryRepository::seeded()), None, Duration::from_millis(100))
    }

    fn candidate(symbol: &str, score: f64) -> ResolutionCandidate {
        ResolutionCandidate {
            symbol: symbol.to_string(),
            name_en: Some(format!("{} Co", symbol)),
            name_ar: None,
            market_code: Some(MarketCode::Egx),
            entity_type: EntityType::Stock,
            match_type: MatchType::Alias,
            alias_type: AliasType::Common,
            base_score: score,
            final_score: score,
        }
    }

    #[tokio::test]
    async fn missing_symbol_asks_for_one() {
        let d = dispatcher().dispatch(Intent::StockPrice, &Entities::default(), Language::En, &Target::None).await.unwrap();
        assert_eq!(d.intent, Intent::ClarifySymbol);
        assert_eq!(d.result.error_code.as_deref(), Some(CLARIFY_SYMBOL));
        assert_eq!(d.result.actions[0].payload, "Price of COMI");
    }

    #[tokio::test]
    async fn ambiguous_candidates_become_buttons() {
        let target = Target::Ambiguous {
            query: "fawry".into(),
            candidates: vec![candidate("FWRY", 80.0), candidate("FAWRYMM", 76.0)],
        };
        let d = dispatcher().dispatch(Intent::Dividends, &Entities::default(), Language::En, &target).await.unwrap();
        assert_eq!(d.intent, Intent::ClarifySymbol);
        let payloads: Vec<&str> = d.result.actions.iter().map(|a| a.payload.as_str()).collect();
        assert_eq!(payloads, vec!["Dividends of FWRY", "Dividends of FAWRYMM"]);
    }

    #[tokio::test]
    async fn deep_intent_without_symbol_runs_the_screener() {
        let d = dispatcher().dispatch(Intent::DeepSafety, &Entities::default(), Language::En, &Target::None).await.unwrap();
        assert_eq!(d.intent, Intent::DeepSafety);
        assert_eq!(d.handler, "screeners.metric");
        assert_eq!(d.result.cards[0]["type"], "screener_results");
        assert_eq!(d.result.cards[0]["data"]["metric"], "z_score");
    }

    #[tokio::test]
    async fn sector_defaults_to_financial_services() {
        let d = dispatcher().dispatch(Intent::SectorStocks, &Entities::default(), Language::En, &Target::None).await.unwrap();
        let rows = d.result.cards[0]["data"]["rows"].as_array().unwrap();
        assert!(rows.iter().all(|r| r["sector"] == DEFAULT_SECTOR));
    }

    #[tokio::test]
    async fn compare_needs_two_symbols() {
        let target = Target::Symbol(resolved("COMI", MarketCode::Egx));
        let d = dispatcher().dispatch(Intent::CompareStocks, &Entities::default(), Language::En, &target).await.unwrap();
        assert_eq!(d.intent, Intent::ClarifySymbol);
        assert_eq!(d.result.actions[0].payload, "Compare COMI vs SWDY");
    }

    #[tokio::test]
    async fn compare_with_itself_asks_for_another_stock() {
        let comi = resolved("COMI", MarketCode::Egx);
        let target = Target::Pair(comi.clone(), comi);
        let d = dispatcher().dispatch(Intent::CompareStocks, &Entities::default(), Language::En, &target).await.unwrap();
        assert_eq!(d.intent, Intent::ClarifySymbol);
        assert_eq!(d.result.error_code.as_deref(), Some(CLARIFY_SYMBOL));
        assert!(d.result.message.contains("Which other stock"));
        let payloads: Vec<&str> = d.result.actions.iter().map(|a| a.payload.as_str()).collect();
        assert_eq!(payloads, vec!["Compare COMI vs SWDY", "Compare COMI vs TMGH"]);
    }

    #[tokio::test]
    async fn chitchat_skips_data_access() {
        let d = dispatcher().dispatch(Intent::Greeting, &Entities::default(), Language::Ar, &Target::None).await.unwrap();
        assert_eq!(d.handler, "chitchat");
        assert!(d.result.success);
    }

    #[test]
    fn every_intent_has_a_handler_name() {
        for intent in Intent::ALL {
            assert!(!handler_name(*intent).is_empty());
        }
    }
}
