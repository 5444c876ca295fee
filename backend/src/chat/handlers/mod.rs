//! One module per intent family. Handlers read through `MarketRepository`,
//! emit plain JSON cards tagged with a `type`, and never mutate state.

pub mod chitchat;
pub mod compare;
pub mod corporate;
pub mod deep;
pub mod fundamentals;
pub mod funds;
pub mod market;
pub mod screeners;
pub mod technical;

use super::schema::{Action, CardType, Chart, Entities, Intent, Language, Range, ResolvedSymbol};
use crate::{financial::LiveMarketFeed, repository::MarketRepository, utils::sanitize_json};
use serde_json::{json, Value};
use std::time::Duration;

pub const NO_DB_DATA: &str = "NO_DB_DATA";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerResult {
    pub success: bool,
    pub message: String,
    pub cards: Vec<Value>,
    pub chart: Option<Chart>,
    pub actions: Vec<Action>,
    pub error_code: Option<String>,
    pub fallback: bool,
}

impl HandlerResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Default::default()
        }
    }

    /// The query was understood but the read model has nothing for it.
    pub fn no_data(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error_code: Some(NO_DB_DATA.to_string()),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>, error_code: &str) -> Self {
        Self {
            success: false,
            message: message.into(),
            error_code: Some(error_code.to_string()),
            fallback: true,
            ..Default::default()
        }
    }

    pub fn card(mut self, card: Value) -> Self {
        self.cards.push(card);
        self
    }

    pub fn chart(mut self, chart: Chart) -> Self {
        self.chart = Some(chart);
        self
    }

    pub fn actions(mut self, actions: Vec<Action>) -> Self {
        self.actions.extend(actions);
        self
    }
}

/// A card as the builder expects it: `{type, title, data}` with every
/// non-finite number already nulled.
pub fn card(card_type: CardType, title: impl Into<String>, data: Value) -> Value {
    json!({
        "type": card_type.as_str(),
        "title": title.into(),
        "data": sanitize_json(data),
    })
}

/// Everything a handler may read.
pub struct HandlerContext<'a> {
    pub repo: &'a dyn MarketRepository,
    pub live: Option<&'a dyn LiveMarketFeed>,
    pub live_timeout: Duration,
    pub language: Language,
    pub entities: &'a Entities,
}

impl HandlerContext<'_> {
    pub fn ar(&self) -> bool {
        self.language.is_arabic()
    }

    /// Picks the English or Arabic variant.
    pub fn t(&self, en: impl Into<String>, ar: impl Into<String>) -> String {
        if self.ar() {
            ar.into()
        } else {
            en.into()
        }
    }

    pub fn range_or(&self, default: Range) -> Range {
        self.entities.range.unwrap_or(default)
    }

    pub fn name(&self, symbol: &ResolvedSymbol) -> String {
        let name = if self.ar() {
            symbol.name_ar.as_ref().or(symbol.name_en.as_ref())
        } else {
            symbol.name_en.as_ref().or(symbol.name_ar.as_ref())
        };
        name.cloned().unwrap_or_else(|| symbol.symbol.clone())
    }
}

/// Canonical English command that re-asks `intent` for `symbol`; used for
/// clarification buttons and follow-up suggestions.
pub fn command_for(intent: Intent, symbol: &str) -> String {
    use Intent::*;
    match intent {
        StockPrice => format!("Price of {}", symbol),
        StockMarketCap => format!("Market cap of {}", symbol),
        StockChart => format!("Chart {}", symbol),
        StockStat => format!("Key stats for {}", symbol),
        StockVolume => format!("Trading volume of {}", symbol),
        Stock52WeekRange => format!("52 week range of {}", symbol),
        FinancialsAnnual => format!("Annual financials for {}", symbol),
        FinancialsQuarterly => format!("Quarterly results for {}", symbol),
        FinancialExplorer => format!("Full financials for {} with TTM", symbol),
        IncomeStatement => format!("Income statement of {}", symbol),
        BalanceSheet => format!("Balance sheet of {}", symbol),
        CashFlow => format!("Cash flow of {}", symbol),
        RevenueTrend => format!("Revenue trend of {}", symbol),
        Dividends => format!("Dividends of {}", symbol),
        MetricEps => format!("EPS of {}", symbol),
        MetricPe => format!("PE ratio of {}", symbol),
        MetricPb => format!("Price to book of {}", symbol),
        MetricRoe => format!("ROE of {}", symbol),
        MetricMargins => format!("Net margin of {}", symbol),
        MetricDebt => format!("Debt of {}", symbol),
        RatiosValuation => format!("Valuation ratios for {}", symbol),
        RatiosProfitability => format!("Profitability ratios of {}", symbol),
        RatiosLiquidity => format!("Liquidity ratios for {}", symbol),
        RatiosLeverage => format!("Leverage ratios of {}", symbol),
        RatiosEfficiency => format!("Efficiency ratios of {}", symbol),
        FairValue => format!("Fair value of {}", symbol),
        DeepSafety => format!("Is {} safe?", symbol),
        DeepValuation => format!("Is {} cheap?", symbol),
        DeepEfficiency => format!("How efficient is {}?", symbol),
        DeepGrowth => format!("Is {} growing?", symbol),
        FundNav => format!("NAV of {}", symbol),
        Ownership => format!("Who owns {}?", symbol),
        News => format!("Latest news on {}", symbol),
        Earnings => format!("Latest earnings of {}", symbol),
        Agm => format!("AGM of {}", symbol),
        CorporateActions => format!("Corporate actions for {}", symbol),
        AnalystRatings => format!("Analyst ratings for {}", symbol),
        TechnicalIndicators => format!("Technical analysis of {}", symbol),
        TechnicalTrend => format!("Trend of {}", symbol),
        SupportResistance => format!("Support and resistance for {}", symbol),
        Momentum => format!("Momentum of {}", symbol),
        MovingAverages => format!("Moving averages of {}", symbol),
        _ => format!("Analyze {}", symbol),
    }
}

/// Follow-up buttons shown under most single-stock answers.
pub fn stock_actions(symbol: &str, skip: Intent) -> Vec<Action> {
    [
        (Intent::StockChart, "View Chart", "عرض الشارت"),
        (Intent::FinancialsAnnual, "Financials", "القوائم المالية"),
        (Intent::DeepSafety, "Financial Health", "الصحة المالية"),
        (Intent::TechnicalIndicators, "Technicals", "التحليل الفني"),
        (Intent::News, "News", "الأخبار"),
    ]
    .into_iter()
    .filter(|(intent, _, _)| *intent != skip)
    .take(4)
    .map(|(intent, en, ar)| Action::query(en, ar, command_for(intent, symbol)))
    .collect()
}

/// `82.50` style price text, or a dash.
pub fn fmt_num(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.*}", decimals, v),
        _ => "-".to_string(),
    }
}

pub fn fmt_pct(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:+.2}%", v),
        _ => "-".to_string(),
    }
}

/// Billions/millions shorthand for large amounts.
pub fn fmt_big(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => {
            let abs = v.abs();
            if abs >= 1e12 {
                format!("{:.2}T", v / 1e12)
            } else if abs >= 1e9 {
                format!("{:.2}B", v / 1e9)
            } else if abs >= 1e6 {
                format!("{:.2}M", v / 1e6)
            } else {
                format!("{:.0}", v)
            }
        }
        _ => "-".to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cards_are_sanitized() {
        let c = card(CardType::Snapshot, "t", json!({"x": f64::NAN}));
        assert_eq!(c["type"], "snapshot");
        assert!(c["data"]["x"].is_null());
    }

    #[test]
    fn chart_action_payload_for_price_answers() {
        let actions = stock_actions("COMI", Intent::StockPrice);
        assert_eq!(actions[0].label, "View Chart");
        assert_eq!(actions[0].payload, "Chart COMI");
    }

    #[test]
    fn number_formatting() {
        assert_eq!(fmt_big(Some(2.5e11)), "250.00B");
        assert_eq!(fmt_pct(Some(2.4)), "+2.40%");
        assert_eq!(fmt_num(None, 2), "-");
    }
}
