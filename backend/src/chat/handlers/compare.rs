//! Side-by-side comparison of two stocks.

use super::{
    card, fmt_pct,
    fundamentals::{metric_format, metric_label, metric_value},
    market, HandlerContext, HandlerResult,
};
use crate::{
    chat::schema::{Action, CardType, Chart, ChartType, DataSource, Intent, Range, ResolvedSymbol},
    error::Result,
    repository::{OhlcPoint, TickerRow},
    utils::{num, pct_change},
};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};

struct Category {
    key: &'static str,
    en: &'static str,
    ar: &'static str,
    cap: usize,
    metrics: &'static [&'static str],
}

const CATEGORIES: &[Category] = &[
    Category {
        key: "overview",
        en: "Overview",
        ar: "نظرة عامة",
        cap: 4,
        metrics: &["last_price", "change_percent", "market_cap", "volume", "beta"],
    },
    Category {
        key: "valuation",
        en: "Valuation",
        ar: "التقييم",
        cap: 4,
        metrics: &["pe_ratio", "pb_ratio", "ev_ebitda", "peg_ratio", "earnings_yield"],
    },
    Category {
        key: "profitability",
        en: "Profitability",
        ar: "الربحية",
        cap: 4,
        metrics: &["roe", "roa", "net_margin", "gross_margin", "operating_margin"],
    },
    Category {
        key: "efficiency",
        en: "Efficiency",
        ar: "الكفاءة",
        cap: 3,
        metrics: &["roce", "asset_turnover", "inventory_turnover"],
    },
    Category {
        key: "growth",
        en: "Growth",
        ar: "النمو",
        cap: 3,
        metrics: &["revenue_growth", "earnings_growth"],
    },
    Category {
        key: "health",
        en: "Financial Health",
        ar: "الصحة المالية",
        cap: 4,
        metrics: &["z_score", "f_score", "debt_to_equity", "current_ratio", "interest_coverage", "quick_ratio"],
    },
    Category {
        key: "dividends",
        en: "Dividends",
        ar: "التوزيعات",
        cap: 2,
        metrics: &["dividend_yield", "fcf_yield"],
    },
];

struct Side {
    symbol: String,
    ticker: Option<TickerRow>,
    stats: Option<Map<String, Value>>,
}

impl Side {
    fn value(&self, key: &str) -> Option<f64> {
        metric_value(key, self.ticker.as_ref(), self.stats.as_ref())
    }

    fn stock(&self, arabic: bool) -> Value {
        let name = self
            .ticker
            .as_ref()
            .map(|t| t.display_name(arabic))
            .unwrap_or_else(|| self.symbol.clone());
        json!({
            "symbol": self.symbol,
            "name": name,
            "market_code": self.ticker.as_ref().map(|t| t.market_code.clone()),
            "sector": self.ticker.as_ref().and_then(|t| t.sector_name.clone()),
            "currency": self.ticker.as_ref().and_then(|t| t.currency.clone()),
        })
    }
}

/// Metrics present on both sides, in category order, capped per category.
fn shared_metrics(a: &Side, b: &Side, arabic: bool) -> Vec<Value> {
    let mut rows = Vec::new();
    for category in CATEGORIES {
        let shown = category
            .metrics
            .iter()
            .filter_map(|key| Some((*key, a.value(key)?, b.value(key)?)))
            .take(category.cap);
        for (key, left, right) in shown {
            rows.push(json!({
                "key": key,
                "label": metric_label(key, arabic),
                "category": category.key,
                "category_label": if arabic { category.ar } else { category.en },
                "format": metric_format(key),
                "values": {a.symbol.as_str(): num(Some(left)), b.symbol.as_str(): num(Some(right))},
            }));
        }
    }
    rows
}

/// Both close series rebased to percent change from the first date they
/// have in common.
fn relative_performance(a: (&str, &[OhlcPoint]), b: (&str, &[OhlcPoint])) -> Vec<Value> {
    let right: HashMap<_, f64> = b.1.iter().map(|p| (p.date, p.close)).collect();
    let common: BTreeMap<_, (f64, f64)> = a
        .1
        .iter()
        .filter_map(|p| right.get(&p.date).map(|&close| (p.date, (p.close, close))))
        .collect();
    let Some((_, &(base_a, base_b))) = common.iter().next() else {
        return Vec::new();
    };
    common
        .iter()
        .map(|(date, (ca, cb))| {
            json!({
                "date": date,
                a.0: num(pct_change(base_a, *ca)),
                b.0: num(pct_change(base_b, *cb)),
            })
        })
        .collect()
}

fn last_change(series: &[Value], symbol: &str) -> Option<f64> {
    series.last().and_then(|p| p[symbol].as_f64())
}

pub async fn handle(ctx: &HandlerContext<'_>, first: &ResolvedSymbol, second: &ResolvedSymbol) -> Result<HandlerResult> {
    // one symbol at a time so a failure on either side surfaces as-is
    let mut sides = Vec::with_capacity(2);
    for symbol in [first, second] {
        sides.push(Side {
            symbol: symbol.symbol.clone(),
            ticker: ctx.repo.ticker(&symbol.symbol).await?,
            stats: ctx.repo.statistics(&symbol.symbol).await?,
        });
    }
    let (a, b) = (&sides[0], &sides[1]);

    if let Some(missing) = sides.iter().find(|s| s.ticker.is_none()) {
        return Ok(HandlerResult::no_data(ctx.t(
            format!("I have no market data for {} to compare.", missing.symbol),
            format!("لا توجد بيانات سوق لـ {} للمقارنة.", missing.symbol),
        )));
    }

    let range = ctx.range_or(Range::OneMonth);
    let (points_a, source_a) = market::load_ohlc(ctx, first, range).await?;
    let (points_b, source_b) = market::load_ohlc(ctx, second, range).await?;
    let series = relative_performance((&a.symbol, &points_a), (&b.symbol, &points_b));

    let metrics = shared_metrics(a, b, ctx.ar());
    let name_a = ctx.name(first);
    let name_b = ctx.name(second);
    let perf_a = last_change(&series, &a.symbol);
    let perf_b = last_change(&series, &b.symbol);

    let mut result = HandlerResult::ok(ctx.t(
        format!(
            "{} vs {} over {}: {} against {}. {} shared metrics below.",
            name_a,
            name_b,
            range,
            fmt_pct(perf_a),
            fmt_pct(perf_b),
            metrics.len()
        ),
        format!(
            "{} مقابل {} خلال {}: {} مقابل {}. {} مؤشرات مشتركة أدناه.",
            name_a,
            name_b,
            range,
            fmt_pct(perf_a),
            fmt_pct(perf_b),
            metrics.len()
        ),
    ))
    .card(card(
        CardType::CompareTable,
        format!("{} vs {}", a.symbol, b.symbol),
        json!({
            "stocks": [a.stock(ctx.ar()), b.stock(ctx.ar())],
            "metrics": metrics,
        }),
    ));

    if !series.is_empty() {
        let source = if source_a == DataSource::Live || source_b == DataSource::Live {
            DataSource::Live
        } else {
            DataSource::Database
        };
        result = result.chart(
            Chart::new(
                ChartType::Line,
                ctx.t(
                    format!("{} vs {} (% change, {})", a.symbol, b.symbol, range),
                    format!("{} مقابل {} (نسبة التغير، {})", a.symbol, b.symbol, range),
                ),
            )
            .range(range)
            .series(series)
            .source(source),
        );
    }

    Ok(result.actions(
        [
            (Intent::DeepSafety, &a.symbol),
            (Intent::DeepSafety, &b.symbol),
            (Intent::StockChart, &a.symbol),
            (Intent::StockChart, &b.symbol),
        ]
        .into_iter()
        .map(|(intent, symbol)| {
            let command = super::command_for(intent, symbol);
            Action::query(command.clone(), command.clone(), command)
        })
        .collect(),
    ))
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
    async fn table_lists_only_metrics_on_both_sides() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = handle(&c, &resolved("COMI", MarketCode::Egx), &resolved("SWDY", MarketCode::Egx))
            .await
            .unwrap();
        let data = &card_of(&r, CardType::CompareTable).unwrap()["data"];
        assert_eq!(data["stocks"].as_array().unwrap().len(), 2);
        let metrics = data["metrics"].as_array().unwrap();
        assert!(!metrics.is_empty());
        for m in metrics {
            assert!(m["values"]["COMI"].is_number(), "{}", m["key"]);
            assert!(m["values"]["SWDY"].is_number(), "{}", m["key"]);
        }
        assert!(metrics.iter().all(|m| m["key"] != "inventory_turnover"));
        let health = metrics.iter().filter(|m| m["category"] == "health").count();
        assert!(health <= 4);
    }

    #[tokio::test]
    async fn chart_is_rebased_to_first_common_date() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = handle(&c, &resolved("COMI", MarketCode::Egx), &resolved("SWDY", MarketCode::Egx))
            .await
            .unwrap();
        let chart = r.chart.unwrap();
        assert_eq!(chart.chart_type, ChartType::Line);
        assert_eq!(chart.series[0]["COMI"], 0.0);
        assert_eq!(chart.series[0]["SWDY"], 0.0);
        assert!(chart.series.len() > 20);
    }

    #[tokio::test]
    async fn unknown_side_is_no_data() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = handle(&c, &resolved("COMI", MarketCode::Egx), &resolved("ZZZZ", MarketCode::Egx))
            .await
            .unwrap();
        assert_eq!(r.error_code.as_deref(), Some("NO_DB_DATA"));
        assert!(r.cards.is_empty());
    }

    #[test]
    fn rebasing_skips_dates_missing_on_one_side() {
        let day = |d: u32, close: f64| OhlcPoint {
            date: chrono::NaiveDate::from_ymd_opt(2024, 1, d).unwrap(),
            open: None,
            high: None,
            low: None,
            close,
            volume: None,
        };
        let a = vec![day(1, 10.0), day(2, 11.0), day(3, 12.0)];
        let b = vec![day(2, 20.0), day(3, 30.0)];
        let series = relative_performance(("A", &a), ("B", &b));
        assert_eq!(series.len(), 2);
        assert_eq!(series[0]["A"], 0.0);
        assert_eq!(series[1]["B"], 50.0);
    }
}
