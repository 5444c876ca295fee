//! Price, snapshot, chart and per-ticker statistics.

use super::{card, fmt_big, fmt_num, fmt_pct, stock_actions, HandlerContext, HandlerResult};
use crate::{
    chat::schema::{Action, CardType, Chart, ChartType, DataSource, Intent, MarketCode, Range, ResolvedSymbol},
    error::Result,
    repository::{OhlcPoint, TickerRow},
    utils::{json_f64, num},
};
use chrono::{Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use tracing::{debug, warn};

const CHART_RANGES: [Range; 4] = [Range::OneMonth, Range::ThreeMonths, Range::SixMonths, Range::OneYear];

pub fn since(range: Range) -> Option<NaiveDate> {
    range.days().map(|d| Utc::now().date_naive() - Duration::days(d))
}

/// Daily bars for `range`, from the database unless its history is too
/// thin for the window and the symbol trades on EGX, in which case the
/// live feed is tried within its timeout.
pub async fn load_ohlc(
    ctx: &HandlerContext<'_>,
    symbol: &ResolvedSymbol,
    range: Range,
) -> Result<(Vec<OhlcPoint>, DataSource)> {
    let points = ctx.repo.ohlc(&symbol.symbol, since(range)).await?;
    if points.len() >= range.min_points() || symbol.market_code != Some(MarketCode::Egx) {
        return Ok((points, DataSource::Database));
    }

    let Some(live) = ctx.live else {
        return Ok((points, DataSource::Database));
    };
    debug!(
        "{} has {} bars for {}, trying live feed",
        symbol.symbol,
        points.len(),
        range
    );
    match tokio::time::timeout(ctx.live_timeout, live.daily_ohlc(&symbol.symbol, MarketCode::Egx, range)).await {
        Ok(Ok(live_points)) if !live_points.is_empty() => Ok((live_points, DataSource::Live)),
        Ok(Ok(_)) => Ok((points, DataSource::Database)),
        Ok(Err(e)) => {
            warn!("Live fetch for {} failed: {}", symbol.symbol, e);
            Ok((points, DataSource::Database))
        }
        Err(_) => {
            warn!("Live fetch for {} timed out", symbol.symbol);
            Ok((points, DataSource::Database))
        }
    }
}

pub fn header_card(ticker: &TickerRow, arabic: bool) -> Value {
    card(
        CardType::StockHeader,
        ticker.display_name(arabic),
        json!({
            "symbol": ticker.symbol,
            "name_en": ticker.name_en,
            "name_ar": ticker.name_ar,
            "market_code": ticker.market_code,
            "currency": ticker.currency,
            "sector": ticker.sector_name,
            "industry": ticker.industry,
        }),
    )
}

pub fn snapshot_card(ticker: &TickerRow, title: String) -> Value {
    card(
        CardType::Snapshot,
        title,
        json!({
            "symbol": ticker.symbol,
            "last_price": num(ticker.last_price),
            "change": num(ticker.change),
            "change_percent": num(ticker.change_percent),
            "volume": num(ticker.volume),
            "open": num(ticker.open_price),
            "high": num(ticker.high),
            "low": num(ticker.low),
            "prev_close": num(ticker.prev_close),
            "market_cap": num(ticker.market_cap),
            "currency": ticker.currency,
            "last_updated": ticker.last_updated,
        }),
    )
}

fn not_found(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol) -> HandlerResult {
    HandlerResult::no_data(ctx.t(
        format!("I couldn't find market data for {}.", symbol.symbol),
        format!("لم أجد بيانات سوقية لـ {}.", symbol.symbol),
    ))
}

fn currency(ticker: &TickerRow) -> &str {
    ticker.currency.as_deref().unwrap_or("")
}

/// STOCK_PRICE, STOCK_SNAPSHOT and STOCK_MARKET_CAP share one read.
pub async fn snapshot(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol, intent: Intent) -> Result<HandlerResult> {
    let Some(ticker) = ctx.repo.ticker(&symbol.symbol).await? else {
        return Ok(not_found(ctx, symbol));
    };
    let name = ticker.display_name(ctx.ar());

    let message = match intent {
        Intent::StockMarketCap => ctx.t(
            format!("{} has a market cap of {} {}.", name, fmt_big(ticker.market_cap), currency(&ticker)),
            format!("القيمة السوقية لـ {} هي {} {}.", name, fmt_big(ticker.market_cap), currency(&ticker)),
        ),
        _ => ctx.t(
            format!(
                "{} ({}) is trading at {} {} ({}).",
                name,
                ticker.symbol,
                fmt_num(ticker.last_price, 2),
                currency(&ticker),
                fmt_pct(ticker.change_percent)
            ),
            format!(
                "سهم {} ({}) يتداول عند {} {} ({}).",
                name,
                ticker.symbol,
                fmt_num(ticker.last_price, 2),
                currency(&ticker),
                fmt_pct(ticker.change_percent)
            ),
        ),
    };

    let mut result = HandlerResult::ok(message)
        .card(header_card(&ticker, ctx.ar()))
        .card(snapshot_card(&ticker, ctx.t("Price", "السعر")));

    if intent == Intent::StockSnapshot {
        let stats = ctx.repo.statistics(&ticker.symbol).await?;
        result = result.card(stats_card(ctx, &ticker, stats.as_ref()));
        let (points, source) = load_ohlc(ctx, symbol, Range::OneMonth).await?;
        if !points.is_empty() {
            result = result.chart(
                Chart::new(ChartType::Area, ctx.t("Last month", "آخر شهر"))
                    .symbol(&ticker.symbol)
                    .range(Range::OneMonth)
                    .series(line_points(&points))
                    .source(source),
            );
        }
    }

    Ok(result.actions(stock_actions(&ticker.symbol, intent)))
}

fn stats_card(ctx: &HandlerContext<'_>, ticker: &TickerRow, stats: Option<&serde_json::Map<String, Value>>) -> Value {
    let stat = |key: &str| num(stats.and_then(|s| json_f64(s, key)));
    card(
        CardType::Stats,
        ctx.t("Key statistics", "إحصائيات رئيسية"),
        json!({
            "symbol": ticker.symbol,
            "pe_ratio": num(ticker.pe_ratio),
            "pb_ratio": num(ticker.pb_ratio),
            "dividend_yield": num(ticker.dividend_yield),
            "market_cap": num(ticker.market_cap),
            "beta": num(ticker.beta),
            "high_52w": num(ticker.high_52w),
            "low_52w": num(ticker.low_52w),
            "target_price": num(ticker.target_price),
            "eps": stat("eps"),
            "roe": stat("roe"),
            "net_margin": stat("net_margin"),
            "debt_to_equity": stat("debt_to_equity"),
        }),
    )
}

pub async fn stats(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol) -> Result<HandlerResult> {
    let Some(ticker) = ctx.repo.ticker(&symbol.symbol).await? else {
        return Ok(not_found(ctx, symbol));
    };
    let stats = ctx.repo.statistics(&ticker.symbol).await?;
    let name = ticker.display_name(ctx.ar());
    Ok(HandlerResult::ok(ctx.t(
        format!("Key statistics for {}.", name),
        format!("الإحصائيات الرئيسية لـ {}.", name),
    ))
    .card(header_card(&ticker, ctx.ar()))
    .card(stats_card(ctx, &ticker, stats.as_ref()))
    .actions(stock_actions(&ticker.symbol, Intent::StockStat)))
}

pub async fn volume(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol) -> Result<HandlerResult> {
    let Some(ticker) = ctx.repo.ticker(&symbol.symbol).await? else {
        return Ok(not_found(ctx, symbol));
    };
    let (points, source) = load_ohlc(ctx, symbol, Range::OneMonth).await?;
    let volumes: Vec<f64> = points.iter().filter_map(|p| p.volume).collect();
    let average = (!volumes.is_empty()).then(|| volumes.iter().sum::<f64>() / volumes.len() as f64);
    let name = ticker.display_name(ctx.ar());

    let mut result = HandlerResult::ok(ctx.t(
        format!(
            "{} traded {} shares in the last session (30-day average {}).",
            name,
            fmt_big(ticker.volume),
            fmt_big(average)
        ),
        format!(
            "حجم تداول {} في آخر جلسة {} سهم (متوسط 30 يوم {}).",
            name,
            fmt_big(ticker.volume),
            fmt_big(average)
        ),
    ))
    .card(header_card(&ticker, ctx.ar()))
    .card(card(
        CardType::Stats,
        ctx.t("Volume", "حجم التداول"),
        json!({
            "symbol": ticker.symbol,
            "volume": num(ticker.volume),
            "avg_volume_30d": num(average),
            "relative_volume": num(ticker.volume.zip(average).and_then(|(v, a)| (a > 0.0).then(|| v / a))),
        }),
    ));

    if !points.is_empty() {
        let series = points
            .iter()
            .map(|p| json!({"date": p.date, "value": num(p.volume)}))
            .collect();
        result = result.chart(
            Chart::new(ChartType::Column, ctx.t("Daily volume", "حجم التداول اليومي"))
                .symbol(&ticker.symbol)
                .range(Range::OneMonth)
                .series(series)
                .source(source),
        );
    }
    Ok(result.actions(stock_actions(&ticker.symbol, Intent::StockVolume)))
}

pub async fn range_52w(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol) -> Result<HandlerResult> {
    let Some(ticker) = ctx.repo.ticker(&symbol.symbol).await? else {
        return Ok(not_found(ctx, symbol));
    };
    let position = match (ticker.last_price, ticker.low_52w, ticker.high_52w) {
        (Some(p), Some(lo), Some(hi)) if hi > lo => Some((p - lo) / (hi - lo) * 100.0),
        _ => None,
    };
    let name = ticker.display_name(ctx.ar());
    Ok(HandlerResult::ok(ctx.t(
        format!(
            "{} traded between {} and {} over the past 52 weeks.",
            name,
            fmt_num(ticker.low_52w, 2),
            fmt_num(ticker.high_52w, 2)
        ),
        format!(
            "تداول {} بين {} و {} خلال 52 أسبوع.",
            name,
            fmt_num(ticker.low_52w, 2),
            fmt_num(ticker.high_52w, 2)
        ),
    ))
    .card(header_card(&ticker, ctx.ar()))
    .card(card(
        CardType::Stats,
        ctx.t("52-week range", "نطاق 52 أسبوع"),
        json!({
            "symbol": ticker.symbol,
            "last_price": num(ticker.last_price),
            "high_52w": num(ticker.high_52w),
            "low_52w": num(ticker.low_52w),
            "position_pct": num(position),
        }),
    ))
    .actions(stock_actions(&ticker.symbol, Intent::Stock52WeekRange)))
}

pub fn line_points(points: &[OhlcPoint]) -> Vec<Value> {
    points
        .iter()
        .map(|p| json!({"date": p.date, "value": num(Some(p.close))}))
        .collect()
}

pub fn candles(points: &[OhlcPoint]) -> Vec<Value> {
    points
        .iter()
        .map(|p| {
            json!({
                "date": p.date,
                "open": num(p.open),
                "high": num(p.high),
                "low": num(p.low),
                "close": num(Some(p.close)),
                "volume": num(p.volume),
            })
        })
        .collect()
}

/// Name and market come from the ticker master, not from the resolver hit.
pub async fn chart(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol) -> Result<HandlerResult> {
    let range = ctx.range_or(Range::OneMonth);
    let ticker = ctx.repo.ticker(&symbol.symbol).await?;
    let symbol = &match &ticker {
        Some(t) => ResolvedSymbol {
            market_code: t.market().or(symbol.market_code),
            ..symbol.clone()
        },
        None => symbol.clone(),
    };
    let (points, source) = load_ohlc(ctx, symbol, range).await?;
    let name = match &ticker {
        Some(t) => t.display_name(ctx.ar()),
        None => ctx.name(symbol),
    };

    let range_actions: Vec<Action> = CHART_RANGES
        .iter()
        .filter(|r| **r != range)
        .map(|r| Action::query(r.as_str(), r.as_str(), format!("Chart {} {}", symbol.symbol, r)))
        .collect();

    if points.is_empty() {
        return Ok(HandlerResult::no_data(ctx.t(
            format!("No price history is available for {} yet.", name),
            format!("لا يوجد تاريخ أسعار متاح لـ {} حاليا.", name),
        ))
        .actions(range_actions));
    }

    let first = points.first().map(|p| p.close);
    let last = points.last().map(|p| p.close);
    let change = first.zip(last).and_then(|(a, b)| crate::utils::pct_change(a, b));

    Ok(HandlerResult::ok(ctx.t(
        format!("{} over {}: {} ({} bars).", name, range, fmt_pct(change), points.len()),
        format!("{} خلال {}: {} ({} جلسة).", name, range, fmt_pct(change), points.len()),
    ))
    .chart(
        Chart::new(ChartType::Candlestick, format!("{} {}", symbol.symbol, range))
            .symbol(&symbol.symbol)
            .range(range)
            .series(candles(&points))
            .source(source),
    )
    .actions(range_actions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chat::{
            handlers::testing::{card_of, ctx, resolved},
            schema::{Entities, Language},
        },
        financial::LiveMarketFeed,
        repository::memory::{synthetic_ohlc, MemoryRepository},
    };
    use async_trait::async_trait;

    #[tokio::test]
    async fn price_has_snapshot_and_chart_action() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = snapshot(&c, &resolved("COMI", MarketCode::Egx), Intent::StockPrice).await.unwrap();
        assert!(r.success);
        let snap = card_of(&r, CardType::Snapshot).unwrap();
        assert_eq!(snap["data"]["last_price"], 82.5);
        assert!(snap["data"]["change_percent"].is_number());
        assert!(snap["data"]["volume"].is_number());
        assert!(r.actions.iter().any(|a| a.label == "View Chart" && a.payload == "Chart COMI"));
        assert!(r.message.contains("82.50"));
    }

    #[tokio::test]
    async fn snapshot_adds_stats_and_area_chart() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = snapshot(&c, &resolved("SWDY", MarketCode::Egx), Intent::StockSnapshot).await.unwrap();
        assert!(card_of(&r, CardType::Stats).is_some());
        assert_eq!(r.chart.unwrap().chart_type, ChartType::Area);
    }

    #[tokio::test]
    async fn unknown_ticker_is_no_data() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::Ar);
        let r = snapshot(&c, &resolved("ZZZZ", MarketCode::Egx), Intent::StockPrice).await.unwrap();
        assert_eq!(r.error_code.as_deref(), Some("NO_DB_DATA"));
        assert!(r.cards.is_empty());
    }

    #[tokio::test]
    async fn chart_uses_database_when_deep_enough() {
        let repo = MemoryRepository::seeded();
        let entities = Entities {
            range: Some(Range::SixMonths),
            ..Default::default()
        };
        let c = ctx(&repo, &entities, Language::Ar);
        let r = chart(&c, &resolved("SWDY", MarketCode::Egx)).await.unwrap();
        let chart = r.chart.unwrap();
        assert_eq!(chart.range, Some(Range::SixMonths));
        assert_eq!(chart.data_source, Some(DataSource::Database));
        let labels: Vec<&str> = r.actions.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["1M", "3M", "1Y"]);
    }

    struct FixedFeed(usize);

    #[async_trait]
    impl LiveMarketFeed for FixedFeed {
        async fn daily_ohlc(&self, _symbol: &str, _market: MarketCode, _range: Range) -> Result<Vec<OhlcPoint>> {
            Ok(synthetic_ohlc(58.0, self.0 as i64))
        }
    }

    #[tokio::test]
    async fn thin_history_falls_back_to_live() {
        let repo = MemoryRepository::seeded();
        let entities = Entities {
            range: Some(Range::ThreeMonths),
            ..Default::default()
        };
        let feed = FixedFeed(63);
        let mut c = ctx(&repo, &entities, Language::En);
        c.live = Some(&feed);
        let r = chart(&c, &resolved("TMGH", MarketCode::Egx)).await.unwrap();
        let chart = r.chart.unwrap();
        assert_eq!(chart.data_source, Some(DataSource::Live));
        assert_eq!(chart.series.len(), 63);
    }

    #[tokio::test]
    async fn chart_rereads_name_and_market_from_ticker_master() {
        let repo = MemoryRepository::seeded();
        let entities = Entities {
            range: Some(Range::ThreeMonths),
            ..Default::default()
        };
        let feed = FixedFeed(63);
        let mut c = ctx(&repo, &entities, Language::En);
        c.live = Some(&feed);
        let stale = ResolvedSymbol {
            name_en: Some("TMGH Co".to_string()),
            market_code: None,
            ..resolved("TMGH", MarketCode::Egx)
        };
        let r = chart(&c, &stale).await.unwrap();
        assert!(r.message.starts_with("Talaat Moustafa Group Holding"), "{}", r.message);
        // EGX from the ticker row unlocks the live fallback
        assert_eq!(r.chart.unwrap().data_source, Some(DataSource::Live));
    }

    #[tokio::test]
    async fn thin_history_without_feed_stays_on_database() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = chart(&c, &resolved("TMGH", MarketCode::Egx)).await.unwrap();
        assert_eq!(r.chart.unwrap().data_source, Some(DataSource::Database));
    }

    #[tokio::test]
    async fn range_52w_reports_position() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = range_52w(&c, &resolved("COMI", MarketCode::Egx)).await.unwrap();
        let stats = card_of(&r, CardType::Stats).unwrap();
        let pos = stats["data"]["position_pct"].as_f64().unwrap();
        assert!(pos > 0.0 && pos < 100.0);
    }
}
