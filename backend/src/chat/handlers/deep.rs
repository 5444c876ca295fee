//! Deep-analysis cards built from the pre-computed statistics row.

use super::{card, fmt_num, fundamentals, stock_actions, HandlerContext, HandlerResult};
use crate::{
    chat::schema::{CardType, Chart, ChartType, Intent, ResolvedSymbol},
    error::Result,
    repository::{PeriodType, StatementKind},
    utils::{json_f64, num, pct_change},
};
use serde_json::{json, Map, Value};

const Z_SAFE: f64 = 2.99;
const Z_GREY: f64 = 1.81;

/// Altman zone for a Z-score.
pub fn z_status(z: Option<f64>, arabic: bool) -> &'static str {
    match (z, arabic) {
        (Some(z), false) if z > Z_SAFE => "Safe Zone 🟢",
        (Some(z), true) if z > Z_SAFE => "منطقة آمنة 🟢",
        (Some(z), false) if z >= Z_GREY => "Grey Zone 🟡",
        (Some(z), true) if z >= Z_GREY => "منطقة رمادية 🟡",
        (Some(_), false) => "Distress Zone 🔴",
        (Some(_), true) => "منطقة خطر 🔴",
        (None, false) => "Data Unavailable ⚪",
        (None, true) => "بيانات غير متاحة ⚪",
    }
}

fn f_strength(f: Option<f64>, arabic: bool) -> Option<&'static str> {
    let f = f?;
    Some(match (f >= 7.0, f >= 4.0, arabic) {
        (true, _, false) => "Strong",
        (true, _, true) => "قوي",
        (false, true, false) => "Moderate",
        (false, true, true) => "متوسط",
        (false, false, false) => "Weak",
        (false, false, true) => "ضعيف",
    })
}

fn metric_rows(keys: &[&str], stats: &Map<String, Value>, arabic: bool) -> Vec<Value> {
    keys.iter()
        .map(|key| {
            json!({
                "key": key,
                "label": fundamentals::metric_label(key, arabic),
                "value": num(json_f64(stats, key)),
                "format": fundamentals::metric_format(key),
            })
        })
        .collect()
}

fn no_stats(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol, intent: Intent) -> HandlerResult {
    HandlerResult::no_data(ctx.t(
        format!("Deep analysis data for {} is not available yet.", symbol.symbol),
        format!("بيانات التحليل المتعمق لـ {} غير متاحة حاليا.", symbol.symbol),
    ))
    .actions(stock_actions(&symbol.symbol, intent))
}

pub async fn handle(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol, intent: Intent) -> Result<HandlerResult> {
    let Some(stats) = ctx.repo.statistics(&symbol.symbol).await? else {
        return Ok(no_stats(ctx, symbol, intent));
    };
    let result = match intent {
        Intent::DeepValuation => valuation(ctx, symbol, &stats).await?,
        Intent::DeepEfficiency => efficiency(ctx, symbol, &stats),
        Intent::DeepGrowth => growth(ctx, symbol, &stats).await?,
        _ => safety(ctx, symbol, &stats),
    };
    Ok(result.actions(stock_actions(&symbol.symbol, intent)))
}

fn safety(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol, stats: &Map<String, Value>) -> HandlerResult {
    let z = json_f64(stats, "z_score");
    let f = json_f64(stats, "f_score");
    let status = z_status(z, ctx.ar());
    let name = ctx.name(symbol);

    let mut result = HandlerResult::ok(ctx.t(
        format!(
            "{}: Altman Z-Score {} ({}), Piotroski F-Score {}/9.",
            name,
            fmt_num(z, 2),
            status,
            fmt_num(f, 0)
        ),
        format!(
            "{}: مؤشر ألتمان {} ({})، مؤشر بيوتروسكي {}/9.",
            name,
            fmt_num(z, 2),
            status,
            fmt_num(f, 0)
        ),
    ))
    .card(card(
        CardType::DeepHealth,
        ctx.t("Financial health", "الصحة المالية"),
        json!({
            "symbol": symbol.symbol,
            "z_score": num(z),
            "f_score": num(f),
            "status": status,
            "f_score_strength": f_strength(f, ctx.ar()),
            "metrics": metric_rows(
                &["debt_to_equity", "current_ratio", "quick_ratio", "interest_coverage"],
                stats,
                ctx.ar(),
            ),
        }),
    ));

    if let (Some(debt), Some(equity)) = (json_f64(stats, "total_debt"), json_f64(stats, "total_equity")) {
        result = result.chart(
            Chart::new(ChartType::Donut, ctx.t("Debt vs equity", "الديون مقابل حقوق الملكية"))
                .symbol(&symbol.symbol)
                .series(vec![
                    json!({"label": ctx.t("Total Debt", "إجمالي الديون"), "value": num(Some(debt))}),
                    json!({"label": ctx.t("Total Equity", "حقوق الملكية"), "value": num(Some(equity))}),
                ]),
        );
    }
    result
}

/// Cheapness flags: multiple below its threshold counts one point.
const CHEAP_BELOW: &[(&str, f64)] = &[
    ("pe_ratio", 10.0),
    ("pb_ratio", 1.5),
    ("ev_ebitda", 8.0),
    ("peg_ratio", 1.0),
];

async fn valuation(
    ctx: &HandlerContext<'_>,
    symbol: &ResolvedSymbol,
    stats: &Map<String, Value>,
) -> Result<HandlerResult> {
    let ticker = ctx.repo.ticker(&symbol.symbol).await?;
    let value = |key: &str| fundamentals::metric_value(key, ticker.as_ref(), Some(stats));

    let checked: Vec<bool> = CHEAP_BELOW
        .iter()
        .filter_map(|(key, limit)| value(*key).filter(|v| *v > 0.0).map(|v| v < *limit))
        .collect();
    let cheap = checked.iter().filter(|c| **c).count();
    let label = match (checked.len(), cheap * 2 >= checked.len() + 1, cheap == 0) {
        (0, _, _) => ctx.t("Not enough data", "بيانات غير كافية"),
        (_, true, _) => ctx.t("Low multiples", "مضاعفات منخفضة"),
        (_, _, true) => ctx.t("High multiples", "مضاعفات مرتفعة"),
        _ => ctx.t("Mixed multiples", "مضاعفات متباينة"),
    };

    let graham = fundamentals::graham_number(json_f64(stats, "eps"), json_f64(stats, "book_value_per_share"));
    let price = ticker.as_ref().and_then(|t| t.last_price);
    let keys = ["pe_ratio", "pb_ratio", "ev_ebitda", "peg_ratio", "earnings_yield", "fcf_yield"];
    let metrics: Vec<Value> = keys
        .iter()
        .map(|key| {
            json!({
                "key": key,
                "label": fundamentals::metric_label(key, ctx.ar()),
                "value": num(value(*key)),
                "format": fundamentals::metric_format(key),
            })
        })
        .collect();

    let name = ctx.name(symbol);
    Ok(HandlerResult::ok(ctx.t(
        format!("{}: {} ({} of {} multiples below typical thresholds).", name, label, cheap, checked.len()),
        format!("{}: {} ({} من {} مضاعفات أقل من المعتاد).", name, label, cheap, checked.len()),
    ))
    .card(card(
        CardType::DeepValuation,
        ctx.t("Valuation", "التقييم"),
        json!({
            "symbol": symbol.symbol,
            "last_price": num(price),
            "graham_number": num(graham),
            "graham_upside_pct": num(graham.zip(price).and_then(|(g, p)| pct_change(p, g))),
            "signal": label,
            "cheap_flags": cheap,
            "checked_flags": checked.len(),
            "metrics": metrics,
        }),
    )))
}

fn efficiency(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol, stats: &Map<String, Value>) -> HandlerResult {
    let keys = ["roe", "roa", "roce", "asset_turnover", "inventory_turnover", "operating_margin"];
    let radar: Vec<Value> = keys
        .iter()
        .filter_map(|key| {
            json_f64(stats, key).map(|v| {
                json!({"metric": fundamentals::metric_label(key, ctx.ar()), "value": num(Some(v))})
            })
        })
        .collect();
    let name = ctx.name(symbol);
    let roe = json_f64(stats, "roe");

    let mut result = HandlerResult::ok(ctx.t(
        format!("{} earns {}% on equity.", name, fmt_num(roe, 1)),
        format!("العائد على حقوق الملكية لـ {} هو {}%.", name, fmt_num(roe, 1)),
    ))
    .card(card(
        CardType::DeepEfficiency,
        ctx.t("Efficiency", "الكفاءة"),
        json!({"symbol": symbol.symbol, "metrics": metric_rows(&keys, stats, ctx.ar())}),
    ));
    if radar.len() >= 3 {
        result = result.chart(
            Chart::new(ChartType::Radar, ctx.t("Efficiency profile", "ملف الكفاءة"))
                .symbol(&symbol.symbol)
                .series(radar),
        );
    }
    result
}

async fn growth(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol, stats: &Map<String, Value>) -> Result<HandlerResult> {
    let income = ctx
        .repo
        .statements(StatementKind::Income, &symbol.symbol, PeriodType::Annual, 5)
        .await?;
    let revenue = |i: usize| income.get(i).and_then(|r| r.fields()).and_then(|f| json_f64(f, "total_revenue"));
    let net = |i: usize| income.get(i).and_then(|r| r.fields()).and_then(|f| json_f64(f, "net_income"));

    let series: Vec<Value> = (0..income.len().saturating_sub(1))
        .rev()
        .map(|i| {
            json!({
                "period": income[i].period_label(),
                "revenue_growth": num(revenue(i + 1).zip(revenue(i)).and_then(|(a, b)| pct_change(a, b))),
                "earnings_growth": num(net(i + 1).zip(net(i)).and_then(|(a, b)| pct_change(a, b))),
            })
        })
        .collect();

    let revenue_growth = json_f64(stats, "revenue_growth");
    let earnings_growth = json_f64(stats, "earnings_growth");
    let name = ctx.name(symbol);
    let mut result = HandlerResult::ok(ctx.t(
        format!(
            "{}: revenue growth {}%, earnings growth {}%.",
            name,
            fmt_num(revenue_growth, 1),
            fmt_num(earnings_growth, 1)
        ),
        format!(
            "{}: نمو الإيرادات {}%، نمو الأرباح {}%.",
            name,
            fmt_num(revenue_growth, 1),
            fmt_num(earnings_growth, 1)
        ),
    ))
    .card(card(
        CardType::DeepGrowth,
        ctx.t("Growth", "النمو"),
        json!({
            "symbol": symbol.symbol,
            "revenue_growth": num(revenue_growth),
            "earnings_growth": num(earnings_growth),
            "history": series.clone(),
        }),
    ));
    if !series.is_empty() {
        result = result.chart(
            Chart::new(ChartType::Bar, ctx.t("Year-over-year growth", "النمو السنوي"))
                .symbol(&symbol.symbol)
                .series(series),
        );
    }
    Ok(result)
}
