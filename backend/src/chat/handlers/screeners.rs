//! Market-wide rankings: movers, sectors, dividend leaders and metric
//! screeners.

use super::{card, fmt_num, fmt_pct, HandlerContext, HandlerResult};
use crate::{
    chat::schema::{Action, CardType, Chart, ChartType, Condition, Direction, Intent},
    error::Result,
    repository::{RankedRow, StatMetric, TickerColumn, TickerRanking, TickerRow},
    utils::num,
};
use serde_json::{json, Value};

pub const DEFAULT_SECTOR: &str = "Financial Services";
const SCREENER_LIMIT: i64 = 10;

/// Metric and order used by the named screeners and by deep intents that
/// arrive without a symbol.
pub fn screener_default(intent: Intent) -> Option<(StatMetric, Direction)> {
    match intent {
        Intent::ScreenerGrowth | Intent::DeepGrowth => Some((StatMetric::RevenueGrowth, Direction::Desc)),
        Intent::ScreenerSafety | Intent::DeepSafety => Some((StatMetric::ZScore, Direction::Desc)),
        Intent::ScreenerValue | Intent::DeepValuation => Some((StatMetric::EarningsYield, Direction::Desc)),
        Intent::ScreenerIncome => Some((StatMetric::DividendYield, Direction::Desc)),
        Intent::DeepEfficiency => Some((StatMetric::Roce, Direction::Desc)),
        Intent::ScreenerDeepMetric => Some((StatMetric::Roe, Direction::Desc)),
        _ => None,
    }
}

fn ticker_row(t: &TickerRow, arabic: bool) -> Value {
    json!({
        "symbol": t.symbol,
        "name": t.display_name(arabic),
        "market_code": t.market_code,
        "sector": t.sector_name,
        "last_price": num(t.last_price),
        "change_percent": num(t.change_percent),
        "volume": num(t.volume),
        "market_cap": num(t.market_cap),
        "pe_ratio": num(t.pe_ratio),
        "dividend_yield": num(t.dividend_yield),
    })
}

fn symbol_actions(symbols: impl Iterator<Item = String>) -> Vec<Action> {
    symbols
        .take(3)
        .map(|s| Action::query(s.clone(), s.clone(), format!("Analyze {}", s)))
        .collect()
}

fn empty(ctx: &HandlerContext<'_>) -> HandlerResult {
    HandlerResult::no_data(ctx.t(
        "No stocks match that right now.",
        "لا توجد أسهم مطابقة حاليا.",
    ))
}

fn ranking(ctx: &HandlerContext<'_>, column: TickerColumn, direction: Direction) -> TickerRanking {
    let mut ranking = TickerRanking::new(column, direction);
    ranking.market = ctx.entities.market_code;
    ranking
}

async fn movers_rows(ctx: &HandlerContext<'_>, intent: Intent, limit: i64) -> Result<Vec<TickerRow>> {
    let mut r = match intent {
        Intent::TopLosers => {
            let mut r = ranking(ctx, TickerColumn::ChangePercent, Direction::Asc);
            r.bound = Some((Condition::Below, 0.0));
            r
        }
        Intent::MostActive => ranking(ctx, TickerColumn::Volume, Direction::Desc),
        _ => {
            let mut r = ranking(ctx, TickerColumn::ChangePercent, Direction::Desc);
            r.require_positive = true;
            r
        }
    };
    r.sector = ctx.entities.sector.clone();
    r.limit = limit;
    ctx.repo.rank_tickers(&r).await
}

fn movers_title(intent: Intent, arabic: bool) -> &'static str {
    match (intent, arabic) {
        (Intent::TopLosers, false) => "Top losers",
        (Intent::TopLosers, true) => "الأكثر انخفاضا",
        (Intent::MostActive, false) => "Most active",
        (Intent::MostActive, true) => "الأكثر نشاطا",
        (_, false) => "Top gainers",
        (_, true) => "الأكثر ارتفاعا",
    }
}

/// TOP_GAINERS, TOP_LOSERS and MOST_ACTIVE. Fund certificates never rank.
pub async fn movers(ctx: &HandlerContext<'_>, intent: Intent) -> Result<HandlerResult> {
    let rows = movers_rows(ctx, intent, SCREENER_LIMIT).await?;
    if rows.is_empty() {
        return Ok(empty(ctx));
    }
    let leaders: Vec<String> = rows
        .iter()
        .take(3)
        .map(|t| match intent {
            Intent::MostActive => format!("{} ({})", t.symbol, super::fmt_big(t.volume)),
            _ => format!("{} ({})", t.symbol, fmt_pct(t.change_percent)),
        })
        .collect();
    let title = movers_title(intent, ctx.ar());

    Ok(HandlerResult::ok(format!("{}: {}.", title, leaders.join(", ")))
        .card(card(
            CardType::MoversTable,
            title,
            json!({
                "kind": intent.as_str(),
                "rows": rows.iter().map(|t| ticker_row(t, ctx.ar())).collect::<Vec<_>>(),
            }),
        ))
        .actions(symbol_actions(rows.iter().map(|t| t.symbol.clone()))))
}

pub async fn sector_stocks(ctx: &HandlerContext<'_>, sector: &str) -> Result<HandlerResult> {
    let mut r = ranking(ctx, TickerColumn::MarketCap, Direction::Desc);
    r.sector = Some(sector.to_string());
    r.limit = 20;
    let rows = ctx.repo.rank_tickers(&r).await?;
    if rows.is_empty() {
        return Ok(empty(ctx));
    }
    Ok(HandlerResult::ok(ctx.t(
        format!("{} stocks in {}, largest first.", rows.len(), sector),
        format!("{} سهم في قطاع {}، الأكبر أولا.", rows.len(), sector),
    ))
    .card(card(
        CardType::ScreenerResults,
        sector.to_string(),
        json!({
            "sector": sector,
            "sort": "market_cap",
            "rows": rows.iter().map(|t| ticker_row(t, ctx.ar())).collect::<Vec<_>>(),
        }),
    ))
    .actions(symbol_actions(rows.iter().map(|t| t.symbol.clone()))))
}

pub async fn sector_list(ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
    let sectors = ctx.repo.sector_summaries(ctx.entities.market_code).await?;
    if sectors.is_empty() {
        return Ok(empty(ctx));
    }
    let series: Vec<Value> = sectors
        .iter()
        .map(|s| json!({"label": s.sector_name, "value": num(s.avg_change_percent)}))
        .collect();
    let actions = sectors
        .iter()
        .take(3)
        .map(|s| {
            Action::query(
                s.sector_name.clone(),
                s.sector_name.clone(),
                format!("Stocks in {} sector", s.sector_name),
            )
        })
        .collect();

    Ok(HandlerResult::ok(ctx.t(
        format!("{} sectors, ordered by total market cap.", sectors.len()),
        format!("{} قطاع مرتبة حسب القيمة السوقية.", sectors.len()),
    ))
    .card(card(CardType::SectorList, ctx.t("Sectors", "القطاعات"), json!({"sectors": sectors})))
    .chart(Chart::new(ChartType::Bar, ctx.t("Average change by sector", "متوسط التغير حسب القطاع")).series(series))
    .actions(actions))
}

async fn ticker_screener(
    ctx: &HandlerContext<'_>,
    ranking: TickerRanking,
    title: String,
) -> Result<HandlerResult> {
    let rows = ctx.repo.rank_tickers(&ranking).await?;
    if rows.is_empty() {
        return Ok(empty(ctx));
    }
    let leaders: Vec<String> = rows
        .iter()
        .take(3)
        .map(|t| format!("{} ({})", t.symbol, fmt_num(ranking.column.value(t), 2)))
        .collect();
    Ok(HandlerResult::ok(format!("{}: {}.", title, leaders.join(", ")))
        .card(card(
            CardType::ScreenerResults,
            title,
            json!({
                "sort": ranking.column.sql(),
                "direction": ranking.direction.as_str(),
                "rows": rows.iter().map(|t| ticker_row(t, ctx.ar())).collect::<Vec<_>>(),
            }),
        ))
        .actions(symbol_actions(rows.iter().map(|t| t.symbol.clone()))))
}

pub async fn dividend_leaders(ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
    let mut r = ranking(ctx, TickerColumn::DividendYield, Direction::Desc);
    r.require_positive = true;
    r.sector = ctx.entities.sector.clone();
    ticker_screener(ctx, r, ctx.t("Highest dividend yields", "أعلى عائد توزيعات")).await
}

pub async fn largest(ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
    let mut r = ranking(ctx, TickerColumn::MarketCap, Direction::Desc);
    r.sector = ctx.entities.sector.clone();
    ticker_screener(ctx, r, ctx.t("Largest companies", "أكبر الشركات")).await
}

/// SCREENER_PE: cheapest first, optionally bounded ("P/E below 10").
pub async fn pe_screener(ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
    let direction = ctx.entities.direction.unwrap_or(Direction::Asc);
    let mut r = ranking(ctx, TickerColumn::PeRatio, direction);
    r.require_positive = true;
    r.sector = ctx.entities.sector.clone();
    r.bound = ctx.entities.condition.zip(ctx.entities.threshold);
    let title = match r.bound {
        Some((Condition::Below, v)) => ctx.t(format!("P/E below {}", v), format!("مكرر ربحية أقل من {}", v)),
        Some((Condition::Above, v)) => ctx.t(format!("P/E above {}", v), format!("مكرر ربحية أعلى من {}", v)),
        None => ctx.t("Lowest P/E ratios", "أقل مكرر ربحية"),
    };
    ticker_screener(ctx, r, title).await
}

fn ranked_row(r: &RankedRow, arabic: bool) -> Value {
    let name = if arabic {
        r.name_ar.as_ref().or(r.name_en.as_ref())
    } else {
        r.name_en.as_ref().or(r.name_ar.as_ref())
    };
    json!({
        "symbol": r.symbol,
        "name": name,
        "market_code": r.market_code,
        "sector": r.sector_name,
        "last_price": num(r.last_price),
        "value": num(r.value),
    })
}

/// Statistics-backed screeners (deep metric, growth, safety, value, income).
pub async fn metric_screener(
    ctx: &HandlerContext<'_>,
    metric: StatMetric,
    direction: Direction,
) -> Result<HandlerResult> {
    let rows = ctx
        .repo
        .rank_statistics(metric, direction, ctx.entities.market_code, SCREENER_LIMIT)
        .await?;
    if rows.is_empty() {
        return Ok(empty(ctx));
    }
    let label = metric.label(ctx.ar());
    let title = match direction {
        Direction::Desc => ctx.t(format!("Highest {}", label), format!("الأعلى في {}", label)),
        Direction::Asc => ctx.t(format!("Lowest {}", label), format!("الأقل في {}", label)),
    };
    let leaders: Vec<String> = rows
        .iter()
        .take(3)
        .map(|r| format!("{} ({})", r.symbol, fmt_num(r.value, 2)))
        .collect();

    Ok(HandlerResult::ok(format!("{}: {}.", title, leaders.join(", ")))
        .card(card(
            CardType::ScreenerResults,
            title,
            json!({
                "metric": metric.column(),
                "metric_label": label,
                "direction": direction.as_str(),
                "rows": rows.iter().map(|r| ranked_row(r, ctx.ar())).collect::<Vec<_>>(),
            }),
        ))
        .actions(symbol_actions(rows.iter().map(|r| r.symbol.clone()))))
}

pub async fn market_summary(ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
    let sectors = ctx.repo.sector_summaries(ctx.entities.market_code).await?;
    let gainers = movers_rows(ctx, Intent::TopGainers, 5).await?;
    let losers = movers_rows(ctx, Intent::TopLosers, 5).await?;
    if sectors.is_empty() && gainers.is_empty() && losers.is_empty() {
        return Ok(empty(ctx));
    }

    let up = sectors.iter().filter(|s| s.avg_change_percent.map_or(false, |c| c > 0.0)).count();
    let mut result = HandlerResult::ok(ctx.t(
        format!("{} of {} sectors are up on average today.", up, sectors.len()),
        format!("{} من {} قطاع في ارتفاع اليوم.", up, sectors.len()),
    ));
    if !sectors.is_empty() {
        result = result.card(card(CardType::SectorList, ctx.t("Sectors", "القطاعات"), json!({"sectors": sectors})));
    }
    for (intent, rows) in [(Intent::TopGainers, &gainers), (Intent::TopLosers, &losers)] {
        if rows.is_empty() {
            continue;
        }
        result = result.card(card(
            CardType::MoversTable,
            movers_title(intent, ctx.ar()),
            json!({
                "kind": intent.as_str(),
                "rows": rows.iter().map(|t| ticker_row(t, ctx.ar())).collect::<Vec<_>>(),
            }),
        ));
    }
    Ok(result.actions(vec![
        Action::query("Top gainers", "الأكثر ارتفاعا", "Top gainers today"),
        Action::query("Top losers", "الأكثر انخفاضا", "Top losers today"),
        Action::query("Most active", "الأكثر نشاطا", "Most active stocks"),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chat::{
            handlers::testing::{card_of, ctx},
            schema::{Entities, Language, MarketCode},
        },
        repository::memory::MemoryRepository,
    };

    #[tokio::test]
    async fn gainers_are_positive_and_skip_funds() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = movers(&c, Intent::TopGainers).await.unwrap();
        let rows = card_of(&r, CardType::MoversTable).unwrap()["data"]["rows"].as_array().unwrap().clone();
        assert_eq!(rows.len(), 10);
        assert!(rows.iter().all(|row| row["change_percent"].as_f64().unwrap() > 0.0));
        assert!(rows.iter().all(|row| row["symbol"] != "AZGF"));
        assert_eq!(rows[0]["symbol"], "GGRN");
    }

    #[tokio::test]
    async fn losers_are_negative() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = movers(&c, Intent::TopLosers).await.unwrap();
        let rows = card_of(&r, CardType::MoversTable).unwrap()["data"]["rows"].as_array().unwrap().clone();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["symbol"], "EKHO");
    }

    #[tokio::test]
    async fn market_filter_applies() {
        let repo = MemoryRepository::seeded();
        let entities = Entities {
            market_code: Some(MarketCode::Tdwl),
            ..Default::default()
        };
        let c = ctx(&repo, &entities, Language::En);
        let r = largest(&c).await.unwrap();
        let rows = &card_of(&r, CardType::ScreenerResults).unwrap()["data"]["rows"];
        assert_eq!(rows[0]["symbol"], "2222");
        assert_eq!(rows.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn pe_screener_respects_bound() {
        let repo = MemoryRepository::seeded();
        let entities = Entities {
            condition: Some(Condition::Below),
            threshold: Some(10.0),
            ..Default::default()
        };
        let c = ctx(&repo, &entities, Language::En);
        let r = pe_screener(&c).await.unwrap();
        let rows = card_of(&r, CardType::ScreenerResults).unwrap()["data"]["rows"].as_array().unwrap().clone();
        assert!(!rows.is_empty());
        assert!(rows.iter().all(|row| row["pe_ratio"].as_f64().unwrap() < 10.0));
    }

    #[tokio::test]
    async fn safety_screener_ranks_by_z_score() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let (metric, direction) = screener_default(Intent::ScreenerSafety).unwrap();
        let r = metric_screener(&c, metric, direction).await.unwrap();
        let rows = &card_of(&r, CardType::ScreenerResults).unwrap()["data"]["rows"];
        assert_eq!(rows[0]["symbol"], "COMI");
        assert_eq!(rows.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn sector_stocks_and_summary() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = sector_stocks(&c, DEFAULT_SECTOR).await.unwrap();
        let rows = &card_of(&r, CardType::ScreenerResults).unwrap()["data"]["rows"];
        assert_eq!(rows[0]["symbol"], "1120");

        let r = market_summary(&c).await.unwrap();
        assert!(card_of(&r, CardType::SectorList).is_some());
        assert_eq!(r.cards.len(), 3);
    }
}
