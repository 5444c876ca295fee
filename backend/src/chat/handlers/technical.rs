//! Indicator readouts over daily closes.

use super::{card, fmt_num, fmt_pct, market, stock_actions, HandlerContext, HandlerResult};
use crate::{
    chat::schema::{CardType, Chart, ChartType, Intent, Range, ResolvedSymbol},
    error::Result,
    financial::{compute_technicals, sma_series, TechnicalSnapshot},
    utils::num,
};
use serde_json::{json, Value};

/// Indicators are computed over a year of bars regardless of the range
/// being charted.
const LOOKBACK: Range = Range::OneYear;
const MIN_BARS: usize = 15;

fn readout(t: &TickerSnapshotView<'_>) -> Value {
    let s = t.snapshot;
    json!({
        "symbol": t.symbol,
        "focus": t.intent.as_str(),
        "last_close": num(Some(s.last_close)),
        "trend": s.trend.label(t.arabic),
        "rsi_14": num(s.rsi_14),
        "rsi_state": s.rsi_state(t.arabic),
        "macd": num(s.macd),
        "macd_signal": num(s.macd_signal),
        "macd_histogram": num(s.macd_histogram),
        "sma_20": num(s.sma_20),
        "sma_50": num(s.sma_50),
        "sma_200": num(s.sma_200),
        "ema_20": num(s.ema_20),
        "bollinger": {
            "upper": num(s.bollinger_upper),
            "middle": num(s.bollinger_middle),
            "lower": num(s.bollinger_lower),
        },
        "roc_10": num(s.roc_10),
        "support": num(s.support),
        "resistance": num(s.resistance),
    })
}

struct TickerSnapshotView<'a> {
    symbol: &'a str,
    intent: Intent,
    arabic: bool,
    snapshot: &'a TechnicalSnapshot,
}

fn message(ctx: &HandlerContext<'_>, name: &str, intent: Intent, s: &TechnicalSnapshot) -> String {
    let trend = s.trend.label(ctx.ar());
    match intent {
        Intent::SupportResistance => ctx.t(
            format!(
                "{}: support near {}, resistance near {} (last close {}).",
                name,
                fmt_num(s.support, 2),
                fmt_num(s.resistance, 2),
                fmt_num(Some(s.last_close), 2)
            ),
            format!(
                "{}: الدعم قرب {} والمقاومة قرب {} (آخر إغلاق {}).",
                name,
                fmt_num(s.support, 2),
                fmt_num(s.resistance, 2),
                fmt_num(Some(s.last_close), 2)
            ),
        ),
        Intent::MovingAverages => ctx.t(
            format!(
                "{}: SMA20 {}, SMA50 {}, SMA200 {} against a close of {}.",
                name,
                fmt_num(s.sma_20, 2),
                fmt_num(s.sma_50, 2),
                fmt_num(s.sma_200, 2),
                fmt_num(Some(s.last_close), 2)
            ),
            format!(
                "{}: متوسط 20 يوم {}، 50 يوم {}، 200 يوم {} مقابل إغلاق {}.",
                name,
                fmt_num(s.sma_20, 2),
                fmt_num(s.sma_50, 2),
                fmt_num(s.sma_200, 2),
                fmt_num(Some(s.last_close), 2)
            ),
        ),
        Intent::Momentum => ctx.t(
            format!(
                "{}: RSI {} ({}), 10-day rate of change {}.",
                name,
                fmt_num(s.rsi_14, 1),
                s.rsi_state(false),
                fmt_pct(s.roc_10)
            ),
            format!(
                "{}: مؤشر القوة النسبية {} ({})، معدل التغير 10 أيام {}.",
                name,
                fmt_num(s.rsi_14, 1),
                s.rsi_state(true),
                fmt_pct(s.roc_10)
            ),
        ),
        Intent::TechnicalTrend => ctx.t(
            format!("{} is in a {} on its 20 and 50 day averages.", name, trend.to_lowercase()),
            format!("{} في {} حسب متوسطي 20 و 50 يوم.", name, trend),
        ),
        _ => {
            let macd = match s.macd_bullish() {
                Some(true) => ctx.t("MACD above signal", "الماكد أعلى من خط الإشارة"),
                Some(false) => ctx.t("MACD below signal", "الماكد أسفل خط الإشارة"),
                None => ctx.t("MACD n/a", "الماكد غير متاح"),
            };
            ctx.t(
                format!("{}: {}, RSI {} ({}), {}.", name, trend, fmt_num(s.rsi_14, 1), s.rsi_state(false), macd),
                format!("{}: {}، مؤشر القوة النسبية {} ({})، {}.", name, trend, fmt_num(s.rsi_14, 1), s.rsi_state(true), macd),
            )
        }
    }
}

pub async fn handle(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol, intent: Intent) -> Result<HandlerResult> {
    let (points, source) = market::load_ohlc(ctx, symbol, LOOKBACK).await?;
    let name = ctx.name(symbol);
    if points.len() < MIN_BARS {
        return Ok(HandlerResult::no_data(ctx.t(
            format!("There isn't enough price history for {} to compute indicators.", name),
            format!("لا يوجد تاريخ أسعار كاف لـ {} لحساب المؤشرات.", name),
        ))
        .actions(stock_actions(&symbol.symbol, intent)));
    }
    let Some(snapshot) = compute_technicals(&points)? else {
        return Ok(HandlerResult::no_data(ctx.t("No price history.", "لا يوجد تاريخ أسعار.")));
    };

    let range = ctx.range_or(Range::ThreeMonths);
    let closes: Vec<f64> = points.iter().map(|p| p.close).collect();
    let sma_20 = sma_series(&closes, 20)?;
    let sma_50 = sma_series(&closes, 50)?;
    let start = market::since(range);
    let series: Vec<Value> = points
        .iter()
        .enumerate()
        .filter(|(_, p)| start.map_or(true, |s| p.date >= s))
        .map(|(i, p)| {
            let mut point = json!({"date": p.date, "close": num(Some(p.close))});
            if intent == Intent::MovingAverages || intent == Intent::TechnicalTrend {
                point["sma_20"] = num(sma_20[i]);
                point["sma_50"] = num(sma_50[i]);
            }
            point
        })
        .collect();

    let view = TickerSnapshotView {
        symbol: &symbol.symbol,
        intent,
        arabic: ctx.ar(),
        snapshot: &snapshot,
    };
    let mut chart = Chart::new(ChartType::Line, format!("{} {}", symbol.symbol, range))
        .symbol(&symbol.symbol)
        .range(range)
        .series(series)
        .source(source);
    if intent == Intent::SupportResistance {
        chart.title = ctx.t(
            format!("{} with support {} / resistance {}", symbol.symbol, fmt_num(snapshot.support, 2), fmt_num(snapshot.resistance, 2)),
            format!("{} الدعم {} / المقاومة {}", symbol.symbol, fmt_num(snapshot.support, 2), fmt_num(snapshot.resistance, 2)),
        );
    }

    Ok(HandlerResult::ok(message(ctx, &name, intent, &snapshot))
        .card(card(CardType::Technicals, ctx.t("Technical indicators", "المؤشرات الفنية"), readout(&view)))
        .chart(chart)
        .actions(stock_actions(&symbol.symbol, Intent::TechnicalIndicators)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chat::{
            handlers::testing::{card_of, ctx, resolved},
            schema::{Entities, Language, MarketCode},
        },
        repository::memory::MemoryRepository,
    };

    #[tokio::test]
    async fn indicators_card_and_line_chart() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = handle(&c, &resolved("COMI", MarketCode::Egx), Intent::TechnicalIndicators).await.unwrap();
        let data = &card_of(&r, CardType::Technicals).unwrap()["data"];
        assert!(data["rsi_14"].is_number());
        assert!(data["sma_200"].is_number());
        let chart = r.chart.unwrap();
        assert_eq!(chart.chart_type, ChartType::Line);
        assert!(chart.series.len() <= 92);
    }

    #[tokio::test]
    async fn moving_averages_overlay() {
        let repo = MemoryRepository::seeded();
        let entities = Entities {
            range: Some(Range::OneMonth),
            ..Default::default()
        };
        let c = ctx(&repo, &entities, Language::En);
        let r = handle(&c, &resolved("SWDY", MarketCode::Egx), Intent::MovingAverages).await.unwrap();
        let chart = r.chart.unwrap();
        assert!(chart.series.iter().all(|p| p["sma_20"].is_number() && p["sma_50"].is_number()));
    }

    #[tokio::test]
    async fn thin_history_is_no_data() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = handle(&c, &resolved("TMGH", MarketCode::Egx), Intent::Momentum).await.unwrap();
        assert_eq!(r.error_code.as_deref(), Some("NO_DB_DATA"));
    }
}
