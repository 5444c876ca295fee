//! Read model consumed by the symbol resolver and the intent handlers.
//!
//! Everything that reaches SQL as an identifier (tables, ranking columns,
//! sort direction) goes through one of the closed enums below; free text
//! from the user is only ever bound as a parameter.

pub mod postgres;

#[cfg(test)]
pub mod memory;

use crate::{
    chat::schema::{AliasType, Condition, Direction, EntityType, MarketCode},
    error::Result,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// One row produced by a resolver tier before scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolHit {
    pub symbol: String,
    pub name_en: Option<String>,
    pub name_ar: Option<String>,
    pub market_code: Option<MarketCode>,
    pub entity_type: EntityType,
    pub alias_type: Option<AliasType>,
    pub priority: Option<i32>,
    pub popularity: Option<f64>,
    pub similarity: Option<f64>,
}

impl SymbolHit {
    pub fn stock(symbol: &str, name_en: Option<&str>, name_ar: Option<&str>, market: Option<MarketCode>) -> Self {
        Self {
            symbol: symbol.to_string(),
            name_en: name_en.map(str::to_string),
            name_ar: name_ar.map(str::to_string),
            market_code: market,
            entity_type: EntityType::Stock,
            alias_type: None,
            priority: None,
            popularity: None,
            similarity: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct TickerRow {
    pub symbol: String,
    pub name_en: Option<String>,
    pub name_ar: Option<String>,
    pub market_code: String,
    pub currency: Option<String>,
    pub sector_name: Option<String>,
    pub industry: Option<String>,
    pub last_price: Option<f64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub volume: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub open_price: Option<f64>,
    pub prev_close: Option<f64>,
    pub high_52w: Option<f64>,
    pub low_52w: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub market_cap: Option<f64>,
    pub beta: Option<f64>,
    pub target_price: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl TickerRow {
    pub fn market(&self) -> Option<MarketCode> {
        MarketCode::parse(&self.market_code)
    }

    pub fn display_name(&self, arabic: bool) -> String {
        let name = if arabic {
            self.name_ar.as_ref().or(self.name_en.as_ref())
        } else {
            self.name_en.as_ref().or(self.name_ar.as_ref())
        };
        name.cloned().unwrap_or_else(|| self.symbol.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct OhlcPoint {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StatementRow {
    pub fiscal_year: i32,
    pub fiscal_quarter: Option<i32>,
    pub period_type: String,
    pub period_ending: Option<NaiveDate>,
    pub data: Value,
}

impl StatementRow {
    pub fn fields(&self) -> Option<&Map<String, Value>> {
        self.data.as_object()
    }

    /// Column label used in pivoted tables: `2023` or `Q3 2023`.
    pub fn period_label(&self) -> String {
        match self.fiscal_quarter {
            Some(q) if self.period_type == "quarterly" => format!("Q{} {}", q, self.fiscal_year),
            _ => self.fiscal_year.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct RankedRow {
    pub symbol: String,
    pub name_en: Option<String>,
    pub name_ar: Option<String>,
    pub market_code: String,
    pub sector_name: Option<String>,
    pub last_price: Option<f64>,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SectorSummary {
    pub sector_name: String,
    pub stock_count: i64,
    pub avg_change_percent: Option<f64>,
    pub total_market_cap: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ShareholderRow {
    pub holder_name: String,
    pub holder_name_ar: Option<String>,
    pub ownership_percent: Option<f64>,
    pub shares: Option<f64>,
    pub as_of_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct CorporateActionRow {
    pub action_type: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub announcement_date: Option<NaiveDate>,
    pub ex_date: Option<NaiveDate>,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct AnalystRatingRow {
    pub firm: Option<String>,
    pub rating: Option<String>,
    pub target_price: Option<f64>,
    pub rating_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct DividendRow {
    pub ex_date: Option<NaiveDate>,
    pub payment_date: Option<NaiveDate>,
    pub amount: Option<f64>,
    pub dividend_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct FundRow {
    pub fund_id: String,
    pub symbol: Option<String>,
    pub name_en: Option<String>,
    pub name_ar: Option<String>,
    pub manager_name: Option<String>,
    pub currency: Option<String>,
    pub market_code: Option<String>,
    pub last_nav: Option<f64>,
    pub nav_change_percent: Option<f64>,
    pub ytd_return: Option<f64>,
    pub one_year_return: Option<f64>,
    pub last_nav_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct NavPoint {
    pub date: NaiveDate,
    pub nav: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Income,
    Balance,
    Cashflow,
    Ratios,
}

impl StatementKind {
    pub fn table(self) -> &'static str {
        match self {
            StatementKind::Income => "income_statements",
            StatementKind::Balance => "balance_sheets",
            StatementKind::Cashflow => "cashflow_statements",
            StatementKind::Ratios => "financial_ratios_history",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodType {
    Annual,
    Quarterly,
}

impl PeriodType {
    pub fn as_str(self) -> &'static str {
        match self {
            PeriodType::Annual => "annual",
            PeriodType::Quarterly => "quarterly",
        }
    }
}

/// Columns of `market_tickers` that may be ranked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickerColumn {
    ChangePercent,
    Volume,
    MarketCap,
    DividendYield,
    PeRatio,
    PbRatio,
}

impl TickerColumn {
    pub fn sql(self) -> &'static str {
        match self {
            TickerColumn::ChangePercent => "change_percent",
            TickerColumn::Volume => "volume",
            TickerColumn::MarketCap => "market_cap",
            TickerColumn::DividendYield => "dividend_yield",
            TickerColumn::PeRatio => "pe_ratio",
            TickerColumn::PbRatio => "pb_ratio",
        }
    }

    pub fn value(self, row: &TickerRow) -> Option<f64> {
        match self {
            TickerColumn::ChangePercent => row.change_percent,
            TickerColumn::Volume => row.volume,
            TickerColumn::MarketCap => row.market_cap,
            TickerColumn::DividendYield => row.dividend_yield,
            TickerColumn::PeRatio => row.pe_ratio,
            TickerColumn::PbRatio => row.pb_ratio,
        }
    }
}

/// A ranking over `market_tickers`; `bound` filters the ranked column.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerRanking {
    pub column: TickerColumn,
    pub direction: Direction,
    pub market: Option<MarketCode>,
    pub sector: Option<String>,
    pub bound: Option<(Condition, f64)>,
    pub require_positive: bool,
    pub exclude_funds: bool,
    pub limit: i64,
}

impl TickerRanking {
    pub fn new(column: TickerColumn, direction: Direction) -> Self {
        Self {
            column,
            direction,
            market: None,
            sector: None,
            bound: None,
            require_positive: false,
            exclude_funds: true,
            limit: 10,
        }
    }
}

/// Pre-computed columns of `stock_statistics` that deep screeners may rank on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatMetric {
    Roe,
    Roa,
    Roce,
    NetMargin,
    GrossMargin,
    OperatingMargin,
    EvEbitda,
    DebtToEquity,
    ZScore,
    FScore,
    AssetTurnover,
    EarningsYield,
    FcfYield,
    RevenueGrowth,
    EarningsGrowth,
    CurrentRatio,
    InterestCoverage,
    DividendYield,
    PeRatio,
    PbRatio,
    PegRatio,
}

impl StatMetric {
    pub const ALL: &'static [StatMetric] = &[
        StatMetric::Roe,
        StatMetric::Roa,
        StatMetric::Roce,
        StatMetric::NetMargin,
        StatMetric::GrossMargin,
        StatMetric::OperatingMargin,
        StatMetric::EvEbitda,
        StatMetric::DebtToEquity,
        StatMetric::ZScore,
        StatMetric::FScore,
        StatMetric::AssetTurnover,
        StatMetric::EarningsYield,
        StatMetric::FcfYield,
        StatMetric::RevenueGrowth,
        StatMetric::EarningsGrowth,
        StatMetric::CurrentRatio,
        StatMetric::InterestCoverage,
        StatMetric::DividendYield,
        StatMetric::PeRatio,
        StatMetric::PbRatio,
        StatMetric::PegRatio,
    ];

    /// DB column name; doubles as the entity `metric` token.
    pub fn column(self) -> &'static str {
        match self {
            StatMetric::Roe => "roe",
            StatMetric::Roa => "roa",
            StatMetric::Roce => "roce",
            StatMetric::NetMargin => "net_margin",
            StatMetric::GrossMargin => "gross_margin",
            StatMetric::OperatingMargin => "operating_margin",
            StatMetric::EvEbitda => "ev_ebitda",
            StatMetric::DebtToEquity => "debt_to_equity",
            StatMetric::ZScore => "z_score",
            StatMetric::FScore => "f_score",
            StatMetric::AssetTurnover => "asset_turnover",
            StatMetric::EarningsYield => "earnings_yield",
            StatMetric::FcfYield => "fcf_yield",
            StatMetric::RevenueGrowth => "revenue_growth",
            StatMetric::EarningsGrowth => "earnings_growth",
            StatMetric::CurrentRatio => "current_ratio",
            StatMetric::InterestCoverage => "interest_coverage",
            StatMetric::DividendYield => "dividend_yield",
            StatMetric::PeRatio => "pe_ratio",
            StatMetric::PbRatio => "pb_ratio",
            StatMetric::PegRatio => "peg_ratio",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        StatMetric::ALL.iter().copied().find(|m| m.column() == token)
    }

    pub fn label(self, arabic: bool) -> &'static str {
        match (self, arabic) {
            (StatMetric::Roe, false) => "Return on Equity",
            (StatMetric::Roe, true) => "العائد على حقوق الملكية",
            (StatMetric::Roa, false) => "Return on Assets",
            (StatMetric::Roa, true) => "العائد على الأصول",
            (StatMetric::Roce, false) => "Return on Capital Employed",
            (StatMetric::Roce, true) => "العائد على رأس المال المستخدم",
            (StatMetric::NetMargin, false) => "Net Margin",
            (StatMetric::NetMargin, true) => "هامش صافي الربح",
            (StatMetric::GrossMargin, false) => "Gross Margin",
            (StatMetric::GrossMargin, true) => "هامش الربح الإجمالي",
            (StatMetric::OperatingMargin, false) => "Operating Margin",
            (StatMetric::OperatingMargin, true) => "هامش التشغيل",
            (StatMetric::EvEbitda, false) => "EV/EBITDA",
            (StatMetric::EvEbitda, true) => "قيمة المنشأة إلى EBITDA",
            (StatMetric::DebtToEquity, false) => "Debt to Equity",
            (StatMetric::DebtToEquity, true) => "الدين إلى حقوق الملكية",
            (StatMetric::ZScore, false) => "Altman Z-Score",
            (StatMetric::ZScore, true) => "مؤشر ألتمان Z",
            (StatMetric::FScore, false) => "Piotroski F-Score",
            (StatMetric::FScore, true) => "مؤشر بيوتروسكي F",
            (StatMetric::AssetTurnover, false) => "Asset Turnover",
            (StatMetric::AssetTurnover, true) => "دوران الأصول",
            (StatMetric::EarningsYield, false) => "Earnings Yield",
            (StatMetric::EarningsYield, true) => "عائد الأرباح",
            (StatMetric::FcfYield, false) => "FCF Yield",
            (StatMetric::FcfYield, true) => "عائد التدفق النقدي الحر",
            (StatMetric::RevenueGrowth, false) => "Revenue Growth",
            (StatMetric::RevenueGrowth, true) => "نمو الإيرادات",
            (StatMetric::EarningsGrowth, false) => "Earnings Growth",
            (StatMetric::EarningsGrowth, true) => "نمو الأرباح",
            (StatMetric::CurrentRatio, false) => "Current Ratio",
            (StatMetric::CurrentRatio, true) => "نسبة التداول",
            (StatMetric::InterestCoverage, false) => "Interest Coverage",
            (StatMetric::InterestCoverage, true) => "تغطية الفوائد",
            (StatMetric::DividendYield, false) => "Dividend Yield",
            (StatMetric::DividendYield, true) => "عائد التوزيعات",
            (StatMetric::PeRatio, false) => "P/E Ratio",
            (StatMetric::PeRatio, true) => "مكرر الربحية",
            (StatMetric::PbRatio, false) => "P/B Ratio",
            (StatMetric::PbRatio, true) => "مضاعف القيمة الدفترية",
            (StatMetric::PegRatio, false) => "PEG Ratio",
            (StatMetric::PegRatio, true) => "مضاعف PEG",
        }
    }

    /// Ratio-style metrics where negative values are meaningless for ranking.
    pub fn requires_positive(self) -> bool {
        matches!(
            self,
            StatMetric::EvEbitda | StatMetric::PeRatio | StatMetric::PbRatio | StatMetric::PegRatio
        )
    }
}

#[async_trait]
pub trait MarketRepository: Send + Sync {
    // Resolver tiers.
    async fn fund_alias_hits(&self, probe: &str) -> Result<Vec<SymbolHit>>;
    async fn exact_ticker_hits(&self, symbol: &str, market: Option<MarketCode>) -> Result<Vec<SymbolHit>>;
    async fn alias_hits(&self, probe: &str, market: Option<MarketCode>) -> Result<Vec<SymbolHit>>;
    async fn name_hits(&self, probe: &str, market: Option<MarketCode>, limit: i64) -> Result<Vec<SymbolHit>>;
    async fn similarity_hits(
        &self,
        probe: &str,
        market: Option<MarketCode>,
        threshold: f64,
        limit: i64,
    ) -> Result<Vec<SymbolHit>>;
    async fn token_hits(&self, tokens: &[String], market: Option<MarketCode>, limit: i64) -> Result<Vec<SymbolHit>>;

    // Handler reads.
    async fn ticker(&self, symbol: &str) -> Result<Option<TickerRow>>;
    async fn ohlc(&self, symbol: &str, since: Option<NaiveDate>) -> Result<Vec<OhlcPoint>>;
    async fn statements(
        &self,
        kind: StatementKind,
        symbol: &str,
        period: PeriodType,
        limit: i64,
    ) -> Result<Vec<StatementRow>>;
    async fn statistics(&self, symbol: &str) -> Result<Option<Map<String, Value>>>;
    async fn rank_tickers(&self, ranking: &TickerRanking) -> Result<Vec<TickerRow>>;
    async fn rank_statistics(
        &self,
        metric: StatMetric,
        direction: Direction,
        market: Option<MarketCode>,
        limit: i64,
    ) -> Result<Vec<RankedRow>>;
    async fn sector_summaries(&self, market: Option<MarketCode>) -> Result<Vec<SectorSummary>>;
    async fn shareholders(&self, symbol: &str) -> Result<Vec<ShareholderRow>>;
    async fn corporate_actions(&self, symbol: &str, action_types: &[&str], limit: i64) -> Result<Vec<CorporateActionRow>>;
    async fn analyst_ratings(&self, symbol: &str, limit: i64) -> Result<Vec<AnalystRatingRow>>;
    async fn dividend_history(&self, symbol: &str, limit: i64) -> Result<Vec<DividendRow>>;
    async fn fund(&self, fund_id: &str) -> Result<Option<FundRow>>;
    async fn nav_history(&self, fund_id: &str, since: Option<NaiveDate>) -> Result<Vec<NavPoint>>;
    async fn funds(&self, market: Option<MarketCode>, limit: i64) -> Result<Vec<FundRow>>;
    async fn fund_movers(&self, direction: Direction, limit: i64) -> Result<Vec<FundRow>>;
}
