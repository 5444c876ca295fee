//! Closed enums and records shared by every stage of the chat pipeline.
//!
//! `Intent`, `CardType` and `ChartType` are exported at the HTTP boundary;
//! adding a variant is a compatibility-visible change for the UI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generates a string-tagged enum with `as_str`, `from_tag` and `ALL`.
macro_rules! tagged_enum {
    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $( $(#[$meta:meta])* $variant:ident => $tag:literal ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$meta])* #[serde(rename = $tag)] $variant, )*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),*];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $tag,)*
                }
            }

            pub fn from_tag(tag: &str) -> Option<Self> {
                match tag {
                    $($tag => Some($name::$variant),)*
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentFamily {
    MarketData,
    Fundamentals,
    DeepAnalysis,
    Screener,
    Funds,
    Corporate,
    Technical,
    Comparative,
    Chitchat,
    System,
}

tagged_enum! {
    pub enum Intent {
        // market data
        StockPrice => "STOCK_PRICE",
        StockSnapshot => "STOCK_SNAPSHOT",
        StockMarketCap => "STOCK_MARKET_CAP",
        StockChart => "STOCK_CHART",
        StockStat => "STOCK_STAT",
        StockVolume => "STOCK_VOLUME",
        Stock52WeekRange => "STOCK_52W_RANGE",
        // fundamentals
        FinancialsAnnual => "FINANCIALS_ANNUAL",
        FinancialsQuarterly => "FINANCIALS_QUARTERLY",
        FinancialExplorer => "FINANCIAL_EXPLORER",
        IncomeStatement => "INCOME_STATEMENT",
        BalanceSheet => "BALANCE_SHEET",
        CashFlow => "CASH_FLOW",
        RevenueTrend => "REVENUE_TREND",
        Dividends => "DIVIDENDS",
        MetricEps => "METRIC_EPS",
        MetricPe => "METRIC_PE",
        MetricPb => "METRIC_PB",
        MetricRoe => "METRIC_ROE",
        MetricMargins => "METRIC_MARGINS",
        MetricDebt => "METRIC_DEBT",
        RatiosValuation => "RATIOS_VALUATION",
        RatiosProfitability => "RATIOS_PROFITABILITY",
        RatiosLiquidity => "RATIOS_LIQUIDITY",
        RatiosLeverage => "RATIOS_LEVERAGE",
        RatiosEfficiency => "RATIOS_EFFICIENCY",
        FairValue => "FAIR_VALUE",
        // deep analysis
        DeepSafety => "DEEP_SAFETY",
        DeepValuation => "DEEP_VALUATION",
        DeepEfficiency => "DEEP_EFFICIENCY",
        DeepGrowth => "DEEP_GROWTH",
        // screeners
        TopGainers => "TOP_GAINERS",
        TopLosers => "TOP_LOSERS",
        MostActive => "MOST_ACTIVE",
        SectorStocks => "SECTOR_STOCKS",
        SectorList => "SECTOR_LIST",
        #[serde(alias = "MARKET_DIVIDEND_YIELD_LEADERS")]
        DividendLeaders => "DIVIDEND_LEADERS",
        ScreenerPe => "SCREENER_PE",
        ScreenerDeepMetric => "SCREENER_DEEP_METRIC",
        ScreenerGrowth => "SCREENER_GROWTH",
        ScreenerSafety => "SCREENER_SAFETY",
        ScreenerValue => "SCREENER_VALUE",
        ScreenerIncome => "SCREENER_INCOME",
        LargestCompanies => "LARGEST_COMPANIES",
        MarketSummary => "MARKET_SUMMARY",
        // funds
        FundNav => "FUND_NAV",
        FundList => "FUND_LIST",
        FundMovers => "FUND_MOVERS",
        // corporate
        Ownership => "OWNERSHIP",
        News => "NEWS",
        Earnings => "EARNINGS",
        Agm => "AGM",
        CorporateActions => "CORPORATE_ACTIONS",
        AnalystRatings => "ANALYST_RATINGS",
        // technical
        TechnicalIndicators => "TECHNICAL_INDICATORS",
        TechnicalTrend => "TECHNICAL_TREND",
        SupportResistance => "SUPPORT_RESISTANCE",
        Momentum => "MOMENTUM",
        MovingAverages => "MOVING_AVERAGES",
        // comparative
        CompareStocks => "COMPARE_STOCKS",
        // chitchat
        Greeting => "GREETING",
        Identity => "IDENTITY",
        Mood => "MOOD",
        Gratitude => "GRATITUDE",
        Goodbye => "GOODBYE",
        DefineTerm => "DEFINE_TERM",
        Help => "HELP",
        Capabilities => "CAPABILITIES",
        // system
        ClarifySymbol => "CLARIFY_SYMBOL",
        FollowUp => "FOLLOW_UP",
        Unknown => "UNKNOWN",
        Blocked => "BLOCKED",
        SystemError => "SYSTEM_ERROR",
    }
}

impl Intent {
    /// Accepts retired tags that were collapsed into a surviving intent.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "MARKET_DIVIDEND_YIELD_LEADERS" => Some(Intent::DividendLeaders),
            other => Intent::from_tag(other),
        }
    }

    pub fn family(self) -> IntentFamily {
        use Intent::*;
        match self {
            StockPrice | StockSnapshot | StockMarketCap | StockChart | StockStat | StockVolume
            | Stock52WeekRange => IntentFamily::MarketData,
            FinancialsAnnual | FinancialsQuarterly | FinancialExplorer | IncomeStatement
            | BalanceSheet | CashFlow | RevenueTrend | Dividends | MetricEps | MetricPe
            | MetricPb | MetricRoe | MetricMargins | MetricDebt | RatiosValuation
            | RatiosProfitability | RatiosLiquidity | RatiosLeverage | RatiosEfficiency
            | FairValue => IntentFamily::Fundamentals,
            DeepSafety | DeepValuation | DeepEfficiency | DeepGrowth => IntentFamily::DeepAnalysis,
            TopGainers | TopLosers | MostActive | SectorStocks | SectorList | DividendLeaders
            | ScreenerPe | ScreenerDeepMetric | ScreenerGrowth | ScreenerSafety | ScreenerValue
            | ScreenerIncome | LargestCompanies | MarketSummary => IntentFamily::Screener,
            FundNav | FundList | FundMovers => IntentFamily::Funds,
            Ownership | News | Earnings | Agm | CorporateActions | AnalystRatings => {
                IntentFamily::Corporate
            }
            TechnicalIndicators | TechnicalTrend | SupportResistance | Momentum
            | MovingAverages => IntentFamily::Technical,
            CompareStocks => IntentFamily::Comparative,
            Greeting | Identity | Mood | Gratitude | Goodbye | DefineTerm | Help | Capabilities => {
                IntentFamily::Chitchat
            }
            ClarifySymbol | FollowUp | Unknown | Blocked | SystemError => IntentFamily::System,
        }
    }

    /// Intents whose handler reads data for exactly one symbol.
    pub fn requires_symbol(self) -> bool {
        match self.family() {
            IntentFamily::MarketData
            | IntentFamily::Fundamentals
            | IntentFamily::Corporate
            | IntentFamily::Technical => true,
            IntentFamily::Funds => self == Intent::FundNav,
            _ => false,
        }
    }

    /// Deep intents degrade to a screener instead of asking for a symbol.
    pub fn is_deep(self) -> bool {
        self.family() == IntentFamily::DeepAnalysis
    }

    pub fn is_chitchat(self) -> bool {
        self.family() == IntentFamily::Chitchat
    }

    pub fn is_system(self) -> bool {
        self.family() == IntentFamily::System
    }

    /// Intents presenting ratios, statements or rankings carry a
    /// non-advisory disclaimer.
    pub fn needs_disclaimer(self) -> bool {
        match self.family() {
            IntentFamily::Fundamentals
            | IntentFamily::DeepAnalysis
            | IntentFamily::Screener
            | IntentFamily::Technical
            | IntentFamily::Comparative => true,
            IntentFamily::Corporate => self == Intent::AnalystRatings,
            _ => false,
        }
    }

    /// Intents that chart a time series and default their range.
    pub fn implies_chart(self) -> bool {
        matches!(
            self,
            Intent::StockChart
                | Intent::RevenueTrend
                | Intent::TechnicalTrend
                | Intent::TechnicalIndicators
                | Intent::MovingAverages
                | Intent::Momentum
                | Intent::CompareStocks
                | Intent::FundNav
        )
    }

    /// Preferred resolver entity type for this intent.
    pub fn preferred_entity_type(self) -> Option<EntityType> {
        match self.family() {
            IntentFamily::Funds => Some(EntityType::Fund),
            IntentFamily::MarketData
            | IntentFamily::Fundamentals
            | IntentFamily::DeepAnalysis
            | IntentFamily::Corporate
            | IntentFamily::Technical
            | IntentFamily::Comparative => Some(EntityType::Stock),
            _ => None,
        }
    }
}

tagged_enum! {
    pub enum CardType {
        StockHeader => "stock_header",
        Snapshot => "snapshot",
        Stats => "stats",
        FinancialsTable => "financials_table",
        FinancialExplorer => "financial_explorer",
        DividendsTable => "dividends_table",
        CompareTable => "compare_table",
        MoversTable => "movers_table",
        SectorList => "sector_list",
        ScreenerResults => "screener_results",
        Ratios => "ratios",
        Ownership => "ownership",
        FairValue => "fair_value",
        Technicals => "technicals",
        NewsList => "news_list",
        FundNav => "fund_nav",
        FundList => "fund_list",
        FundMovers => "fund_movers",
        DeepValuation => "deep_valuation",
        DeepEfficiency => "deep_efficiency",
        DeepHealth => "deep_health",
        DeepGrowth => "deep_growth",
        Help => "help",
        Suggestions => "suggestions",
        Error => "error",
        FactExplanations => "fact_explanations",
    }
}

tagged_enum! {
    pub enum ChartType {
        Candlestick => "candlestick",
        Line => "line",
        Bar => "bar",
        Area => "area",
        Column => "column",
        Pie => "pie",
        Donut => "donut",
        Radar => "radar",
        FinancialGrowth => "financial_growth",
    }
}

tagged_enum! {
    pub enum Language {
        En => "en",
        Ar => "ar",
        Mixed => "mixed",
    }
}

impl Language {
    /// Language the reply is written in; mixed input is answered in English.
    pub fn reply(self) -> Language {
        match self {
            Language::Ar => Language::Ar,
            _ => Language::En,
        }
    }

    pub fn is_arabic(self) -> bool {
        self == Language::Ar
    }
}

tagged_enum! {
    pub enum MarketCode {
        Egx => "EGX",
        Tdwl => "TDWL",
    }
}

impl MarketCode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "EGX" | "EG" | "EGYPT" | "CASE" => Some(MarketCode::Egx),
            "TDWL" | "SA" | "KSA" | "SAUDI" | "TASI" | "TADAWUL" => Some(MarketCode::Tdwl),
            _ => None,
        }
    }

    pub fn currency(self) -> &'static str {
        match self {
            MarketCode::Egx => "EGP",
            MarketCode::Tdwl => "SAR",
        }
    }
}

tagged_enum! {
    pub enum Range {
        OneDay => "1D",
        OneWeek => "1W",
        OneMonth => "1M",
        ThreeMonths => "3M",
        SixMonths => "6M",
        OneYear => "1Y",
        FiveYears => "5Y",
        Max => "MAX",
    }
}

impl Range {
    /// Calendar days covered; `None` means the full history.
    pub fn days(self) -> Option<i64> {
        match self {
            Range::OneDay => Some(1),
            Range::OneWeek => Some(7),
            Range::OneMonth => Some(30),
            Range::ThreeMonths => Some(91),
            Range::SixMonths => Some(182),
            Range::OneYear => Some(365),
            Range::FiveYears => Some(5 * 365),
            Range::Max => None,
        }
    }

    /// Minimum number of daily bars expected for the window to count as
    /// covered by the database.
    pub fn min_points(self) -> usize {
        match self {
            Range::OneDay => 1,
            Range::OneWeek => 3,
            Range::OneMonth => 15,
            Range::ThreeMonths => 45,
            Range::SixMonths => 90,
            Range::OneYear => 180,
            Range::FiveYears => 900,
            Range::Max => 200,
        }
    }
}

tagged_enum! {
    pub enum Condition {
        Below => "below",
        Above => "above",
    }
}

tagged_enum! {
    pub enum Direction {
        Asc => "asc",
        Desc => "desc",
    }
}

impl Direction {
    pub fn sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

tagged_enum! {
    pub enum StatementType {
        Income => "income",
        Balance => "balance",
        Cashflow => "cashflow",
    }
}

tagged_enum! {
    pub enum EntityType {
        Stock => "stock",
        Fund => "fund",
    }
}

tagged_enum! {
    pub enum MatchType {
        Exact => "exact",
        Nickname => "nickname",
        Alias => "alias",
        Name => "name",
        Fuzzy => "fuzzy",
        Similarity => "similarity",
        PhraseSimilarity => "phrase_similarity",
    }
}

tagged_enum! {
    pub enum AliasType {
        Nickname => "nickname",
        Official => "official",
        Short => "short",
        Common => "common",
        Brand => "brand",
        Auto => "auto",
        Typo => "typo",
    }
}

impl AliasType {
    /// Weight of the alias kind in the resolver score, 0..=100.
    pub fn weight(self) -> f64 {
        match self {
            AliasType::Nickname => 100.0,
            AliasType::Official => 95.0,
            AliasType::Short => 85.0,
            AliasType::Common => 70.0,
            AliasType::Brand => 65.0,
            AliasType::Auto => 50.0,
            AliasType::Typo => 40.0,
        }
    }
}

tagged_enum! {
    pub enum ActionType {
        Query => "query",
        Navigate => "navigate",
        Filter => "filter",
    }
}

tagged_enum! {
    pub enum DataSource {
        Database => "database",
        Live => "live",
    }
}

/// Structured slots pulled out of a message. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_code: Option<MarketCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compare_symbols: Option<[String; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_type: Option<StatementType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: Intent,
    pub confidence: f64,
    pub entities: Entities,
    pub missing_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionCandidate {
    pub symbol: String,
    pub name_en: Option<String>,
    pub name_ar: Option<String>,
    pub market_code: Option<MarketCode>,
    pub entity_type: EntityType,
    pub match_type: MatchType,
    pub alias_type: AliasType,
    pub base_score: f64,
    pub final_score: f64,
}

impl ResolutionCandidate {
    pub fn display_name(&self, language: Language) -> String {
        let name = if language.is_arabic() {
            self.name_ar.as_ref().or(self.name_en.as_ref())
        } else {
            self.name_en.as_ref().or(self.name_ar.as_ref())
        };
        match name {
            Some(name) => format!("{} ({})", name, self.symbol),
            None => self.symbol.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSymbol {
    pub symbol: String,
    pub name_en: Option<String>,
    pub name_ar: Option<String>,
    pub market_code: Option<MarketCode>,
    pub entity_type: EntityType,
    pub match_type: MatchType,
    pub confidence: f64,
}

impl From<&ResolutionCandidate> for ResolvedSymbol {
    fn from(candidate: &ResolutionCandidate) -> Self {
        Self {
            symbol: candidate.symbol.clone(),
            name_en: candidate.name_en.clone(),
            name_ar: candidate.name_ar.clone(),
            market_code: candidate.market_code,
            entity_type: candidate.entity_type,
            match_type: candidate.match_type,
            confidence: candidate.final_score / 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    #[serde(rename = "type")]
    pub card_type: CardType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub title: String,
    pub series: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
}

impl Chart {
    pub fn new(chart_type: ChartType, title: impl Into<String>) -> Self {
        Self {
            chart_type,
            symbol: None,
            title: title.into(),
            series: Vec::new(),
            range: None,
            data_source: None,
        }
    }

    pub fn symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    pub fn range(mut self, range: Range) -> Self {
        self.range = Some(range);
        self
    }

    pub fn series(mut self, series: Vec<Value>) -> Self {
        self.series = series;
        self
    }

    pub fn source(mut self, source: DataSource) -> Self {
        self.data_source = Some(source);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_ar: Option<String>,
    pub action_type: ActionType,
    pub payload: String,
}

impl Action {
    pub fn query(label: impl Into<String>, label_ar: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            label_ar: Some(label_ar.into()),
            action_type: ActionType::Query,
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub intent: Intent,
    pub confidence: f64,
    pub entities: Entities,
    /// Language detected in the input, `mixed` included.
    pub detected_language: Language,
    pub latency_ms: u64,
    pub cached: bool,
    pub as_of: DateTime<Utc>,
    pub backend_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversational_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fact_explanations: Option<std::collections::BTreeMap<String, String>>,
    pub language: Language,
    pub cards: Vec<Card>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<Chart>,
    pub actions: Vec<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disclaimer: Option<String>,
    pub meta: ResponseMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}
