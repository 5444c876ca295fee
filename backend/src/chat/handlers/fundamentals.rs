//! Statements, the financial explorer, dividends, single metrics, ratio
//! families and fair value.

use super::{card, fmt_num, fmt_pct, stock_actions, HandlerContext, HandlerResult};
use crate::{
    chat::schema::{CardType, Chart, ChartType, Intent, ResolvedSymbol},
    error::Result,
    repository::{PeriodType, StatMetric, StatementKind, StatementRow, TickerRow},
    utils::{json_f64, num, pct_change},
};
use serde_json::{json, Map, Value};

/// One line of a pivoted statement.
struct LineItem {
    key: &'static str,
    en: &'static str,
    ar: &'static str,
    subtotal: bool,
    indent: u8,
}

const fn item(key: &'static str, en: &'static str, ar: &'static str, subtotal: bool, indent: u8) -> LineItem {
    LineItem {
        key,
        en,
        ar,
        subtotal,
        indent,
    }
}

const INCOME: &[LineItem] = &[
    item("total_revenue", "Revenue", "الإيرادات", false, 0),
    item("gross_profit", "Gross Profit", "مجمل الربح", true, 0),
    item("operating_income", "Operating Income", "الربح التشغيلي", true, 0),
    item("ebitda", "EBITDA", "EBITDA", false, 1),
    item("net_income", "Net Income", "صافي الربح", true, 0),
    item("eps", "EPS", "ربحية السهم", false, 1),
];

const BALANCE: &[LineItem] = &[
    item("total_assets", "Total Assets", "إجمالي الأصول", true, 0),
    item("cash_and_equivalents", "Cash & Equivalents", "النقدية وما يعادلها", false, 1),
    item("goodwill", "Goodwill", "الشهرة", false, 1),
    item("total_liabilities", "Total Liabilities", "إجمالي الالتزامات", true, 0),
    item("total_debt", "Total Debt", "إجمالي الديون", false, 1),
    item("total_equity", "Total Equity", "حقوق الملكية", true, 0),
];

const CASHFLOW: &[LineItem] = &[
    item("operating_cash_flow", "Operating Cash Flow", "التدفق النقدي التشغيلي", true, 0),
    item("capital_expenditure", "Capital Expenditure", "النفقات الرأسمالية", false, 1),
    item("free_cash_flow", "Free Cash Flow", "التدفق النقدي الحر", true, 0),
    item("dividends_paid", "Dividends Paid", "توزيعات مدفوعة", false, 1),
];

const RATIOS: &[LineItem] = &[
    item("roe", "ROE %", "العائد على حقوق الملكية %", false, 0),
    item("roa", "ROA %", "العائد على الأصول %", false, 0),
    item("net_margin", "Net Margin %", "هامش صافي الربح %", false, 0),
    item("current_ratio", "Current Ratio", "نسبة التداول", false, 0),
    item("debt_to_equity", "Debt to Equity", "الدين إلى حقوق الملكية", false, 0),
    item("pe_ratio", "P/E", "مكرر الربحية", false, 0),
    item("pb_ratio", "P/B", "مضاعف القيمة الدفترية", false, 0),
    item("asset_turnover", "Asset Turnover", "دوران الأصول", false, 0),
];

/// Quarterly columns shown by the explorer.
const EXPLORER_QUARTERS: i64 = 8;

/// Nested object holding industry-specific lines (banks, insurers).
const SECTOR_SPECIFIC: &str = "sector_specific_data";

fn items(kind: StatementKind) -> &'static [LineItem] {
    match kind {
        StatementKind::Income => INCOME,
        StatementKind::Balance => BALANCE,
        StatementKind::Cashflow => CASHFLOW,
        StatementKind::Ratios => RATIOS,
    }
}

/// Flow statements add up over four quarters; stock statements take the
/// latest quarter.
fn ttm_mode(kind: StatementKind) -> &'static str {
    match kind {
        StatementKind::Income | StatementKind::Cashflow => "sum",
        StatementKind::Balance | StatementKind::Ratios => "snapshot",
    }
}

fn kind_tag(kind: StatementKind) -> &'static str {
    match kind {
        StatementKind::Income => "income",
        StatementKind::Balance => "balance",
        StatementKind::Cashflow => "cashflow",
        StatementKind::Ratios => "ratios",
    }
}

fn kind_title(kind: StatementKind, arabic: bool) -> &'static str {
    match (kind, arabic) {
        (StatementKind::Income, false) => "Income Statement",
        (StatementKind::Income, true) => "قائمة الدخل",
        (StatementKind::Balance, false) => "Balance Sheet",
        (StatementKind::Balance, true) => "الميزانية العمومية",
        (StatementKind::Cashflow, false) => "Cash Flow",
        (StatementKind::Cashflow, true) => "التدفقات النقدية",
        (StatementKind::Ratios, false) => "Financial Ratios",
        (StatementKind::Ratios, true) => "النسب المالية",
    }
}

fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn value_of(row: &StatementRow, key: &str) -> Option<f64> {
    let fields = row.fields()?;
    json_f64(fields, key).or_else(|| {
        fields
            .get(SECTOR_SPECIFIC)
            .and_then(Value::as_object)
            .and_then(|nested| json_f64(nested, key))
    })
}

fn sector_keys<'r>(rows: impl IntoIterator<Item = &'r StatementRow>) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for row in rows {
        if let Some(nested) = row.fields().and_then(|f| f.get(SECTOR_SPECIFIC)).and_then(Value::as_object) {
            for key in nested.keys() {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
    }
    keys
}

/// One column of a pivoted table. A trailing-twelve-month column folds
/// four quarters; every other column holds a single statement row.
struct Column<'r> {
    label: String,
    rows: Vec<&'r StatementRow>,
}

impl Column<'_> {
    /// Sum over the folded rows; null when any of them lacks the line.
    fn value(&self, key: &str) -> Option<f64> {
        self.rows.iter().map(|r| value_of(r, key)).sum()
    }
}

fn columns(rows: &[StatementRow]) -> Vec<Column<'_>> {
    rows.iter()
        .map(|r| Column {
            label: r.period_label(),
            rows: vec![r],
        })
        .collect()
}

fn quarter_index(row: &StatementRow) -> Option<i32> {
    row.fiscal_quarter
        .filter(|q| (1..=4).contains(q))
        .map(|q| row.fiscal_year * 4 + q - 1)
}

/// Quarters are newest first; each must directly precede the one before it.
fn consecutive(window: &[StatementRow]) -> bool {
    window
        .windows(2)
        .all(|pair| match (quarter_index(&pair[0]), quarter_index(&pair[1])) {
            (Some(later), Some(earlier)) => later - earlier == 1,
            _ => false,
        })
}

/// Rolling TTM columns labelled by quarter end, newest first. Flow
/// statements sum four consecutive quarters and skip any window with a
/// gap; stock statements and ratios take each quarter as it stands.
fn ttm_columns(kind: StatementKind, quarters: &[StatementRow]) -> Vec<Column<'_>> {
    match ttm_mode(kind) {
        "sum" => quarters
            .windows(4)
            .filter(|window| consecutive(window))
            .map(|window| Column {
                label: window[0].period_label(),
                rows: window.iter().collect(),
            })
            .collect(),
        _ => columns(quarters),
    }
}

fn by_period(periods: &[String], values: &[Option<f64>]) -> Map<String, Value> {
    periods
        .iter()
        .zip(values)
        .map(|(period, value)| (period.clone(), num(*value)))
        .collect()
}

fn growth_row(key: &str, label: String, periods: &[String], values: &[Option<f64>]) -> Value {
    // columns are newest first, so growth compares with the next one
    let growth: Vec<Option<f64>> = (0..values.len())
        .map(|i| match (values[i], values.get(i + 1).copied().flatten()) {
            (Some(now), Some(before)) => pct_change(before, now),
            _ => None,
        })
        .collect();
    json!({
        "key": format!("{}_growth", key),
        "label": label,
        "values": by_period(periods, &growth),
        "isSubtotal": false,
        "isGrowth": true,
        "indent": 1,
        "ttm_mode": "snapshot",
    })
}

/// Pivots columns into `{periods, rows}` with each row's values keyed by
/// period label. Rows whose values are all null are dropped.
fn pivot(kind: StatementKind, columns: &[Column<'_>], arabic: bool, with_growth: bool) -> Value {
    let periods: Vec<String> = columns.iter().map(|c| c.label.clone()).collect();
    let mut out = Vec::new();

    let push = |key: &str, label: String, subtotal: bool, indent: u8, out: &mut Vec<Value>| {
        let values: Vec<Option<f64>> = columns.iter().map(|c| c.value(key)).collect();
        if values.iter().all(Option::is_none) {
            return;
        }
        out.push(json!({
            "key": key,
            "label": label,
            "values": by_period(&periods, &values),
            "isSubtotal": subtotal,
            "isGrowth": false,
            "indent": indent,
            "ttm_mode": ttm_mode(kind),
        }));
        if with_growth && matches!(key, "total_revenue" | "net_income") && columns.len() > 1 {
            let label = if arabic { "النمو %" } else { "Growth %" };
            out.push(growth_row(key, label.to_string(), &periods, &values));
        }
    };

    for line in items(kind) {
        let label = if arabic { line.ar } else { line.en };
        push(line.key, label.to_string(), line.subtotal, line.indent, &mut out);
    }
    for key in sector_keys(columns.iter().flat_map(|c| c.rows.iter().copied())) {
        let label = title_case(&key);
        push(&key, label, false, 1, &mut out);
    }

    json!({
        "statement": kind_tag(kind),
        "periods": periods,
        "rows": out,
    })
}

fn no_statements(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol) -> HandlerResult {
    HandlerResult::no_data(ctx.t(
        format!("Financial statements for {} are not available yet.", symbol.symbol),
        format!("القوائم المالية لـ {} غير متاحة حاليا.", symbol.symbol),
    ))
}

fn growth_chart(ctx: &HandlerContext<'_>, symbol: &str, income: &[StatementRow]) -> Option<Chart> {
    let series: Vec<Value> = income
        .iter()
        .rev()
        .filter(|r| value_of(r, "total_revenue").is_some() || value_of(r, "net_income").is_some())
        .map(|r| {
            json!({
                "period": r.period_label(),
                "revenue": num(value_of(r, "total_revenue")),
                "net_income": num(value_of(r, "net_income")),
            })
        })
        .collect();
    if series.is_empty() {
        return None;
    }
    Some(
        Chart::new(ChartType::FinancialGrowth, ctx.t("Revenue & net income", "الإيرادات وصافي الربح"))
            .symbol(symbol)
            .series(series),
    )
}

/// FINANCIALS_ANNUAL / FINANCIALS_QUARTERLY: one table per statement.
pub async fn financials(
    ctx: &HandlerContext<'_>,
    symbol: &ResolvedSymbol,
    period: PeriodType,
) -> Result<HandlerResult> {
    let limit = match period {
        PeriodType::Annual => 5,
        PeriodType::Quarterly => 4,
    };
    let mut result = HandlerResult::ok(String::new());
    let mut income = Vec::new();
    for kind in [StatementKind::Income, StatementKind::Balance, StatementKind::Cashflow] {
        let rows = ctx.repo.statements(kind, &symbol.symbol, period, limit).await?;
        if rows.is_empty() {
            continue;
        }
        result = result.card(card(
            CardType::FinancialsTable,
            kind_title(kind, ctx.ar()),
            pivot(kind, &columns(&rows), ctx.ar(), kind == StatementKind::Income),
        ));
        if kind == StatementKind::Income {
            income = rows;
        }
    }
    if result.cards.is_empty() {
        return Ok(no_statements(ctx, symbol));
    }

    let name = ctx.name(symbol);
    result.message = match income.first() {
        Some(latest) => ctx.t(
            format!(
                "{} reported revenue of {} and net income of {} for {}.",
                name,
                super::fmt_big(value_of(latest, "total_revenue")),
                super::fmt_big(value_of(latest, "net_income")),
                latest.period_label()
            ),
            format!(
                "سجلت {} إيرادات {} وصافي ربح {} عن {}.",
                name,
                super::fmt_big(value_of(latest, "total_revenue")),
                super::fmt_big(value_of(latest, "net_income")),
                latest.period_label()
            ),
        ),
        None => ctx.t(format!("Financial statements for {}.", name), format!("القوائم المالية لـ {}.", name)),
    };
    if let Some(chart) = growth_chart(ctx, &symbol.symbol, &income) {
        result = result.chart(chart);
    }
    let skip = match period {
        PeriodType::Annual => Intent::FinancialsAnnual,
        PeriodType::Quarterly => Intent::FinancialsQuarterly,
    };
    Ok(result.actions(stock_actions(&symbol.symbol, skip)))
}

/// INCOME_STATEMENT / BALANCE_SHEET / CASH_FLOW.
pub async fn statement(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol, kind: StatementKind) -> Result<HandlerResult> {
    let rows = ctx.repo.statements(kind, &symbol.symbol, PeriodType::Annual, 5).await?;
    if rows.is_empty() {
        return Ok(no_statements(ctx, symbol));
    }
    let title = kind_title(kind, ctx.ar());
    let mut result = HandlerResult::ok(format!("{}: {}", title, ctx.name(symbol))).card(card(
        CardType::FinancialsTable,
        title,
        pivot(kind, &columns(&rows), ctx.ar(), kind == StatementKind::Income),
    ));
    if kind == StatementKind::Income {
        if let Some(chart) = growth_chart(ctx, &symbol.symbol, &rows) {
            result = result.chart(chart);
        }
    }
    Ok(result.actions(stock_actions(&symbol.symbol, Intent::FinancialsAnnual)))
}

pub async fn revenue_trend(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol) -> Result<HandlerResult> {
    let rows = ctx
        .repo
        .statements(StatementKind::Income, &symbol.symbol, PeriodType::Annual, 5)
        .await?;
    let revenues: Vec<Option<f64>> = rows.iter().map(|r| value_of(r, "total_revenue")).collect();
    if revenues.iter().all(Option::is_none) {
        return Ok(no_statements(ctx, symbol));
    }

    let series: Vec<Value> = rows
        .iter()
        .enumerate()
        .rev()
        .map(|(i, r)| {
            let growth = match (revenues[i], revenues.get(i + 1).copied().flatten()) {
                (Some(now), Some(before)) => pct_change(before, now),
                _ => None,
            };
            json!({"period": r.period_label(), "value": num(revenues[i]), "growth_pct": num(growth)})
        })
        .collect();

    let cagr = match (revenues.first().copied().flatten(), revenues.last().copied().flatten()) {
        (Some(latest), Some(oldest)) if oldest > 0.0 && latest > 0.0 && revenues.len() > 1 => {
            Some(((latest / oldest).powf(1.0 / (revenues.len() - 1) as f64) - 1.0) * 100.0)
        }
        _ => None,
    };

    let name = ctx.name(symbol);
    Ok(HandlerResult::ok(ctx.t(
        format!("{} revenue over {} years, compound growth {}.", name, rows.len(), fmt_pct(cagr)),
        format!("إيرادات {} خلال {} سنوات بنمو مركب {}.", name, rows.len(), fmt_pct(cagr)),
    ))
    .card(card(
        CardType::FinancialsTable,
        ctx.t("Revenue trend", "اتجاه الإيرادات"),
        pivot(StatementKind::Income, &columns(&rows), ctx.ar(), true),
    ))
    .chart(
        Chart::new(ChartType::Bar, ctx.t("Annual revenue", "الإيرادات السنوية"))
            .symbol(&symbol.symbol)
            .series(series),
    )
    .actions(stock_actions(&symbol.symbol, Intent::RevenueTrend)))
}

/// FINANCIAL_EXPLORER: annual, quarterly and rolling trailing-twelve-month
/// views of every statement and the ratios in one card.
pub async fn explorer(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol) -> Result<HandlerResult> {
    let mut annual = Map::new();
    let mut quarterly = Map::new();
    let mut ttm = Map::new();

    for kind in [
        StatementKind::Income,
        StatementKind::Balance,
        StatementKind::Cashflow,
        StatementKind::Ratios,
    ] {
        let tag = kind_tag(kind).to_string();
        let rows = ctx.repo.statements(kind, &symbol.symbol, PeriodType::Annual, 5).await?;
        if !rows.is_empty() {
            annual.insert(tag.clone(), pivot(kind, &columns(&rows), ctx.ar(), kind == StatementKind::Income));
        }
        // three extra quarters so the oldest shown quarter can close a window
        let quarters = ctx
            .repo
            .statements(kind, &symbol.symbol, PeriodType::Quarterly, EXPLORER_QUARTERS + 3)
            .await?;
        if quarters.is_empty() {
            continue;
        }
        let shown = &quarters[..quarters.len().min(EXPLORER_QUARTERS as usize)];
        quarterly.insert(tag.clone(), pivot(kind, &columns(shown), ctx.ar(), false));

        let mut trailing: Vec<Column<'_>> = ttm_columns(kind, &quarters);
        trailing.truncate(EXPLORER_QUARTERS as usize);
        if trailing.is_empty() {
            continue;
        }
        let mut table = pivot(kind, &trailing, ctx.ar(), false);
        if table["rows"].as_array().map_or(false, |rows| !rows.is_empty()) {
            table["ttm_mode"] = json!(ttm_mode(kind));
            ttm.insert(tag, table);
        }
    }

    if annual.is_empty() && quarterly.is_empty() {
        return Ok(no_statements(ctx, symbol));
    }

    let name = ctx.name(symbol);
    Ok(HandlerResult::ok(ctx.t(
        format!("Full financials for {}: annual, quarterly and trailing twelve months.", name),
        format!("القوائم المالية الكاملة لـ {}: سنوي وربع سنوي وآخر 12 شهر.", name),
    ))
    .card(card(
        CardType::FinancialExplorer,
        ctx.t("Financial explorer", "مستكشف القوائم المالية"),
        json!({
            "symbol": symbol.symbol,
            "annual": annual,
            "quarterly": quarterly,
            "ttm": ttm,
        }),
    ))
    .actions(stock_actions(&symbol.symbol, Intent::FinancialsAnnual)))
}

pub async fn dividends(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol) -> Result<HandlerResult> {
    let history = ctx.repo.dividend_history(&symbol.symbol, 20).await?;
    let ticker = ctx.repo.ticker(&symbol.symbol).await?;
    let name = ctx.name(symbol);
    if history.is_empty() {
        return Ok(HandlerResult::no_data(ctx.t(
            format!("No dividend history is recorded for {}.", name),
            format!("لا يوجد سجل توزيعات لـ {}.", name),
        ))
        .actions(stock_actions(&symbol.symbol, Intent::Dividends)));
    }

    let rows: Vec<Value> = history
        .iter()
        .map(|d| {
            json!({
                "ex_date": d.ex_date,
                "payment_date": d.payment_date,
                "amount": num(d.amount),
                "type": d.dividend_type,
            })
        })
        .collect();
    let series: Vec<Value> = history
        .iter()
        .rev()
        .filter(|d| d.ex_date.is_some())
        .map(|d| json!({"date": d.ex_date, "value": num(d.amount)}))
        .collect();
    let dividend_yield = ticker.as_ref().and_then(|t| t.dividend_yield);
    let latest = history.first().and_then(|d| d.amount);

    Ok(HandlerResult::ok(ctx.t(
        format!(
            "{} last paid {} per share; current yield {}%.",
            name,
            fmt_num(latest, 2),
            fmt_num(dividend_yield, 2)
        ),
        format!(
            "آخر توزيع لـ {} كان {} للسهم، والعائد الحالي {}%.",
            name,
            fmt_num(latest, 2),
            fmt_num(dividend_yield, 2)
        ),
    ))
    .card(card(
        CardType::DividendsTable,
        ctx.t("Dividend history", "سجل التوزيعات"),
        json!({
            "symbol": symbol.symbol,
            "dividend_yield": num(dividend_yield),
            "currency": ticker.as_ref().and_then(|t| t.currency.clone()),
            "rows": rows,
        }),
    ))
    .chart(
        Chart::new(ChartType::Column, ctx.t("Dividends per share", "التوزيعات للسهم"))
            .symbol(&symbol.symbol)
            .series(series),
    )
    .actions(stock_actions(&symbol.symbol, Intent::Dividends)))
}

/// Metric keys shown for each single-metric and ratio-family intent.
fn metric_keys(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::MetricEps => &["eps", "earnings_growth", "pe_ratio"],
        Intent::MetricPe => &["pe_ratio", "earnings_yield", "peg_ratio"],
        Intent::MetricPb => &["pb_ratio", "book_value_per_share"],
        Intent::MetricRoe => &["roe", "roa", "roce"],
        Intent::MetricMargins => &["gross_margin", "operating_margin", "net_margin"],
        Intent::MetricDebt | Intent::RatiosLeverage => {
            &["debt_to_equity", "total_debt", "total_equity", "interest_coverage"]
        }
        Intent::RatiosValuation => &[
            "pe_ratio",
            "pb_ratio",
            "ev_ebitda",
            "peg_ratio",
            "earnings_yield",
            "fcf_yield",
            "dividend_yield",
        ],
        Intent::RatiosProfitability => &["gross_margin", "operating_margin", "net_margin", "roe", "roa", "roce"],
        Intent::RatiosLiquidity => &["current_ratio", "quick_ratio"],
        Intent::RatiosEfficiency => &["asset_turnover", "inventory_turnover", "roce"],
        _ => &[],
    }
}

pub fn metric_label(key: &str, arabic: bool) -> String {
    if let Some(metric) = StatMetric::from_token(key) {
        return metric.label(arabic).to_string();
    }
    let label = match (key, arabic) {
        ("eps", false) => "EPS",
        ("eps", true) => "ربحية السهم",
        ("book_value_per_share", false) => "Book Value / Share",
        ("book_value_per_share", true) => "القيمة الدفترية للسهم",
        ("total_debt", false) => "Total Debt",
        ("total_debt", true) => "إجمالي الديون",
        ("total_equity", false) => "Total Equity",
        ("total_equity", true) => "حقوق الملكية",
        ("quick_ratio", false) => "Quick Ratio",
        ("quick_ratio", true) => "نسبة السيولة السريعة",
        ("inventory_turnover", false) => "Inventory Turnover",
        ("inventory_turnover", true) => "دوران المخزون",
        _ => return title_case(key),
    };
    label.to_string()
}

/// Display format hint for the UI.
pub fn metric_format(key: &str) -> &'static str {
    match key {
        "roe" | "roa" | "roce" | "gross_margin" | "operating_margin" | "net_margin" | "earnings_yield"
        | "fcf_yield" | "dividend_yield" | "revenue_growth" | "earnings_growth" | "change_percent" => "percent",
        "total_debt" | "total_equity" | "market_cap" | "volume" => "amount",
        "eps" | "book_value_per_share" | "last_price" => "price",
        _ => "ratio",
    }
}

/// Market-priced multiples come from the ticker row; everything else from
/// the pre-computed statistics.
pub fn metric_value(key: &str, ticker: Option<&TickerRow>, stats: Option<&Map<String, Value>>) -> Option<f64> {
    let from_ticker = ticker.and_then(|t| match key {
        "pe_ratio" => t.pe_ratio,
        "pb_ratio" => t.pb_ratio,
        "dividend_yield" => t.dividend_yield,
        "market_cap" => t.market_cap,
        "last_price" => t.last_price,
        "change_percent" => t.change_percent,
        "volume" => t.volume,
        "beta" => t.beta,
        _ => None,
    });
    from_ticker.or_else(|| stats.and_then(|s| json_f64(s, key)))
}

/// METRIC_* and RATIOS_* intents.
pub async fn metrics(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol, intent: Intent) -> Result<HandlerResult> {
    let ticker = ctx.repo.ticker(&symbol.symbol).await?;
    let stats = ctx.repo.statistics(&symbol.symbol).await?;

    let rows: Vec<(&str, Option<f64>)> = metric_keys(intent)
        .iter()
        .map(|key| (*key, metric_value(key, ticker.as_ref(), stats.as_ref())))
        .collect();
    let name = ctx.name(symbol);
    if rows.iter().all(|(_, v)| v.is_none()) {
        return Ok(HandlerResult::no_data(ctx.t(
            format!("These figures are not available for {} yet.", name),
            format!("هذه الأرقام غير متاحة لـ {} حاليا.", name),
        ))
        .actions(stock_actions(&symbol.symbol, intent)));
    }

    let summary: Vec<String> = rows
        .iter()
        .filter_map(|(key, v)| v.map(|v| format!("{} {:.2}", metric_label(key, ctx.ar()), v)))
        .take(3)
        .collect();
    let metrics: Vec<Value> = rows
        .iter()
        .map(|(key, v)| {
            json!({
                "key": key,
                "label": metric_label(key, ctx.ar()),
                "value": num(*v),
                "format": metric_format(key),
            })
        })
        .collect();

    Ok(HandlerResult::ok(format!("{}: {}.", name, summary.join(", ")))
        .card(card(
            CardType::Ratios,
            ratio_title(intent, ctx.ar()),
            json!({"symbol": symbol.symbol, "metrics": metrics}),
        ))
        .actions(stock_actions(&symbol.symbol, intent)))
}

fn ratio_title(intent: Intent, arabic: bool) -> &'static str {
    match (intent, arabic) {
        (Intent::RatiosValuation, false) => "Valuation ratios",
        (Intent::RatiosValuation, true) => "نسب التقييم",
        (Intent::RatiosProfitability, false) => "Profitability ratios",
        (Intent::RatiosProfitability, true) => "نسب الربحية",
        (Intent::RatiosLiquidity, false) => "Liquidity ratios",
        (Intent::RatiosLiquidity, true) => "نسب السيولة",
        (Intent::RatiosLeverage | Intent::MetricDebt, false) => "Leverage",
        (Intent::RatiosLeverage | Intent::MetricDebt, true) => "الرفع المالي",
        (Intent::RatiosEfficiency, false) => "Efficiency ratios",
        (Intent::RatiosEfficiency, true) => "نسب الكفاءة",
        (_, false) => "Key metrics",
        (_, true) => "مؤشرات رئيسية",
    }
}

const GRAHAM_MULTIPLIER: f64 = 22.5;
const FAIR_BAND_PCT: f64 = 10.0;

pub fn graham_number(eps: Option<f64>, book_value_per_share: Option<f64>) -> Option<f64> {
    match (eps, book_value_per_share) {
        (Some(e), Some(b)) if e > 0.0 && b > 0.0 => Some((GRAHAM_MULTIPLIER * e * b).sqrt()),
        _ => None,
    }
}

pub async fn fair_value(ctx: &HandlerContext<'_>, symbol: &ResolvedSymbol) -> Result<HandlerResult> {
    let ticker = ctx.repo.ticker(&symbol.symbol).await?;
    let stats = ctx.repo.statistics(&symbol.symbol).await?;
    let ratings = ctx.repo.analyst_ratings(&symbol.symbol, 10).await?;
    let price = ticker.as_ref().and_then(|t| t.last_price);

    let graham = graham_number(
        stats.as_ref().and_then(|s| json_f64(s, "eps")),
        stats.as_ref().and_then(|s| json_f64(s, "book_value_per_share")),
    );
    let targets: Vec<f64> = ratings.iter().filter_map(|r| r.target_price).collect();
    let consensus = (!targets.is_empty()).then(|| targets.iter().sum::<f64>() / targets.len() as f64);
    let listed_target = ticker.as_ref().and_then(|t| t.target_price);

    let upside = |v: Option<f64>| v.zip(price).and_then(|(v, p)| pct_change(p, v));
    let mut methods = Vec::new();
    for (method, label_en, label_ar, value) in [
        ("graham", "Graham number", "رقم جراهام", graham),
        ("analyst_consensus", "Analyst consensus", "متوسط المحللين", consensus),
        ("target_price", "Published target", "السعر المستهدف المنشور", listed_target),
    ] {
        if value.is_some() {
            methods.push(json!({
                "method": method,
                "label": if ctx.ar() { label_ar } else { label_en },
                "value": num(value),
                "upside_pct": num(upside(value)),
            }));
        }
    }

    let name = ctx.name(symbol);
    let estimates: Vec<f64> = [graham, consensus, listed_target].into_iter().flatten().collect();
    if estimates.is_empty() {
        return Ok(HandlerResult::no_data(ctx.t(
            format!("There isn't enough data to estimate a fair value for {}.", name),
            format!("لا توجد بيانات كافية لتقدير القيمة العادلة لـ {}.", name),
        )));
    }
    let average = estimates.iter().sum::<f64>() / estimates.len() as f64;
    let gap = upside(Some(average));
    let position = match gap {
        Some(g) if g > FAIR_BAND_PCT => "below_estimate",
        Some(g) if g < -FAIR_BAND_PCT => "above_estimate",
        Some(_) => "near_estimate",
        None => "unknown",
    };

    Ok(HandlerResult::ok(ctx.t(
        format!(
            "Estimates for {} average {} against a price of {} ({} gap).",
            name,
            fmt_num(Some(average), 2),
            fmt_num(price, 2),
            fmt_pct(gap)
        ),
        format!(
            "متوسط تقديرات {} هو {} مقابل سعر {} (فارق {}).",
            name,
            fmt_num(Some(average), 2),
            fmt_num(price, 2),
            fmt_pct(gap)
        ),
    ))
    .card(card(
        CardType::FairValue,
        ctx.t("Fair value estimates", "تقديرات القيمة العادلة"),
        json!({
            "symbol": symbol.symbol,
            "last_price": num(price),
            "fair_value": num(Some(average)),
            "upside_pct": num(gap),
            "position": position,
            "methods": methods,
        }),
    ))
    .actions(stock_actions(&symbol.symbol, Intent::FairValue)))
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
    async fn annual_financials_pivot_three_statements() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = financials(&c, &resolved("COMI", MarketCode::Egx), PeriodType::Annual).await.unwrap();
        assert_eq!(r.cards.len(), 3);
        let income = &r.cards[0]["data"];
        assert_eq!(income["periods"], json!(["2023", "2022", "2021"]));
        let keys: Vec<&str> = income["rows"]
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row["key"].as_str().unwrap())
            .collect();
        // ebitda is null in every period
        assert!(!keys.contains(&"ebitda"));
        assert!(keys.contains(&"total_revenue_growth"));
        assert!(keys.contains(&"net_interest_income"));
        assert_eq!(r.chart.unwrap().chart_type, ChartType::FinancialGrowth);
    }

    #[tokio::test]
    async fn quarterly_labels() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = financials(&c, &resolved("SWDY", MarketCode::Egx), PeriodType::Quarterly).await.unwrap();
        assert_eq!(r.cards[0]["data"]["periods"][0], "Q2 2024");
    }

    #[tokio::test]
    async fn missing_statements_are_no_data() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = financials(&c, &resolved("TMGH", MarketCode::Egx), PeriodType::Annual).await.unwrap();
        assert_eq!(r.error_code.as_deref(), Some("NO_DB_DATA"));
    }

    #[tokio::test]
    async fn pivoted_rows_key_values_by_period() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = statement(&c, &resolved("COMI", MarketCode::Egx), StatementKind::Income).await.unwrap();
        let table = &card_of(&r, CardType::FinancialsTable).unwrap()["data"];
        let rows = table["rows"].as_array().unwrap();
        let revenue = rows.iter().find(|row| row["key"] == "total_revenue").unwrap();
        assert_eq!(revenue["values"]["2023"], 80e9);
        assert!(revenue["values"]["2021"].is_number());
        assert_eq!(revenue["isSubtotal"], false);
        assert_eq!(revenue["isGrowth"], false);
        assert_eq!(revenue["indent"], 0);
        assert!(revenue.get("is_subtotal").is_none());

        let growth = rows.iter().find(|row| row["key"] == "total_revenue_growth").unwrap();
        assert_eq!(growth["isGrowth"], true);
        assert!(growth["values"]["2023"].is_number());
        assert!(growth["values"]["2021"].is_null());
        let net = rows.iter().find(|row| row["key"] == "net_income").unwrap();
        assert_eq!(net["isSubtotal"], true);
    }

    #[tokio::test]
    async fn explorer_rolls_ttm_per_quarter_end() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = explorer(&c, &resolved("COMI", MarketCode::Egx)).await.unwrap();
        let data = &card_of(&r, CardType::FinancialExplorer).unwrap()["data"];
        assert!(data["annual"]["ratios"].is_object());

        // six seeded quarters close three full windows
        let income = &data["ttm"]["income"];
        assert_eq!(income["periods"], json!(["Q2 2024", "Q1 2024", "Q4 2023"]));
        assert_eq!(income["ttm_mode"], "sum");
        let revenue = income["rows"]
            .as_array()
            .unwrap()
            .iter()
            .find(|row| row["key"] == "total_revenue")
            .unwrap();
        assert_eq!(revenue["ttm_mode"], "sum");
        // quarters at 1.0, 0.96, 0.92, 0.88 of 22bn
        let expected = 22e9 * (1.0 + 0.96 + 0.92 + 0.88);
        assert!((revenue["values"]["Q2 2024"].as_f64().unwrap() - expected).abs() < 1.0);

        let balance = &data["ttm"]["balance"];
        assert_eq!(balance["periods"].as_array().unwrap().len(), 6);
        assert!(balance["rows"].as_array().unwrap().iter().all(|row| row["ttm_mode"] == "snapshot"));
    }

    #[tokio::test]
    async fn explorer_includes_ratio_ttm_as_snapshot() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = explorer(&c, &resolved("COMI", MarketCode::Egx)).await.unwrap();
        let data = &card_of(&r, CardType::FinancialExplorer).unwrap()["data"];
        let ratios = &data["ttm"]["ratios"];
        assert_eq!(ratios["ttm_mode"], "snapshot");
        assert_eq!(ratios["periods"][0], "Q2 2024");
        let roe = ratios["rows"].as_array().unwrap().iter().find(|row| row["key"] == "roe").unwrap();
        assert_eq!(roe["values"]["Q2 2024"], 28.0);
        assert!(data["quarterly"]["ratios"].is_object());
    }

    fn quarter(year: i32, q: i32, revenue: f64) -> StatementRow {
        StatementRow {
            fiscal_year: year,
            fiscal_quarter: Some(q),
            period_type: "quarterly".to_string(),
            period_ending: None,
            data: json!({"total_revenue": revenue}),
        }
    }

    #[test]
    fn ttm_windows_with_a_gap_are_skipped() {
        // Q1 2024 is missing
        let quarters = vec![
            quarter(2024, 2, 10.0),
            quarter(2023, 4, 9.0),
            quarter(2023, 3, 8.0),
            quarter(2023, 2, 7.0),
            quarter(2023, 1, 6.0),
        ];
        let ttm = ttm_columns(StatementKind::Income, &quarters);
        let labels: Vec<&str> = ttm.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["Q4 2023"]);
        assert_eq!(ttm[0].value("total_revenue"), Some(30.0));

        // a year boundary is still consecutive
        let quarters = vec![quarter(2024, 1, 4.0), quarter(2023, 4, 3.0), quarter(2023, 3, 2.0), quarter(2023, 2, 1.0)];
        assert_eq!(ttm_columns(StatementKind::Cashflow, &quarters).len(), 1);
        assert_eq!(ttm_columns(StatementKind::Balance, &quarters[..2]).len(), 2);
    }

    #[tokio::test]
    async fn explorer_drops_ttm_when_no_window_is_complete() {
        let mut repo = MemoryRepository::default();
        repo.statements.insert(
            (StatementKind::Income, "COMI".to_string(), PeriodType::Quarterly),
            vec![quarter(2024, 2, 10.0), quarter(2023, 4, 9.0), quarter(2023, 3, 8.0), quarter(2023, 2, 7.0)],
        );
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = explorer(&c, &resolved("COMI", MarketCode::Egx)).await.unwrap();
        let data = &card_of(&r, CardType::FinancialExplorer).unwrap()["data"];
        assert_eq!(data["quarterly"]["income"]["periods"].as_array().unwrap().len(), 4);
        assert!(data["ttm"].get("income").is_none());
    }

    #[tokio::test]
    async fn pe_metric_prefers_ticker_multiple() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = metrics(&c, &resolved("COMI", MarketCode::Egx), Intent::MetricPe).await.unwrap();
        let metrics = &card_of(&r, CardType::Ratios).unwrap()["data"]["metrics"];
        let ticker_pe = repo.tickers.iter().find(|t| t.symbol == "COMI").unwrap().pe_ratio;
        assert_eq!(metrics[0]["value"].as_f64(), ticker_pe.map(|v| crate::utils::round_to(v, 2)));
    }

    #[tokio::test]
    async fn fair_value_blends_graham_and_analysts() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = fair_value(&c, &resolved("COMI", MarketCode::Egx)).await.unwrap();
        let data = &card_of(&r, CardType::FairValue).unwrap()["data"];
        let methods = data["methods"].as_array().unwrap();
        assert_eq!(methods.len(), 3);
        assert_eq!(methods[1]["value"], 101.5);
        assert!(graham_number(Some(-1.0), Some(10.0)).is_none());
    }

    #[tokio::test]
    async fn dividends_table_and_chart() {
        let repo = MemoryRepository::seeded();
        let entities = Entities::default();
        let c = ctx(&repo, &entities, Language::En);
        let r = dividends(&c, &resolved("COMI", MarketCode::Egx)).await.unwrap();
        let data = &card_of(&r, CardType::DividendsTable).unwrap()["data"];
        assert_eq!(data["rows"].as_array().unwrap().len(), 2);
        assert_eq!(r.chart.unwrap().series.len(), 2);

        let r = dividends(&c, &resolved("SWDY", MarketCode::Egx)).await.unwrap();
        assert_eq!(r.error_code.as_deref(), Some("NO_DB_DATA"));
    }
}
