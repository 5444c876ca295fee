//! In-memory read model for tests. Mirrors the SQL semantics of the
//! Postgres repository closely enough for resolver, handler and pipeline
//! tests to run without a database.

use super::{
    AnalystRatingRow, CorporateActionRow, DividendRow, FundRow, MarketRepository, NavPoint,
    OhlcPoint, PeriodType, RankedRow, SectorSummary, ShareholderRow, StatMetric, StatementKind,
    StatementRow, SymbolHit, TickerRanking, TickerRow,
};
use crate::{
    chat::{
        normalizer::normalize,
        schema::{AliasType, Condition, Direction, EntityType, MarketCode},
    },
    error::{AppError, Result},
    utils::trigram_similarity,
};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct AliasFixture {
    pub alias_norm: String,
    pub symbol: String,
    pub market: MarketCode,
    pub alias_type: AliasType,
    pub priority: i32,
    pub popularity: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    pub tickers: Vec<TickerRow>,
    pub aliases: Vec<AliasFixture>,
    pub funds: Vec<FundRow>,
    pub fund_aliases: Vec<(String, String)>,
    pub ohlc: HashMap<String, Vec<OhlcPoint>>,
    pub statements: HashMap<(StatementKind, String, PeriodType), Vec<StatementRow>>,
    pub statistics: HashMap<String, Map<String, Value>>,
    pub shareholders: HashMap<String, Vec<ShareholderRow>>,
    pub corporate_actions: HashMap<String, Vec<CorporateActionRow>>,
    pub analyst_ratings: HashMap<String, Vec<AnalystRatingRow>>,
    pub dividends: HashMap<String, Vec<DividendRow>>,
    pub nav: HashMap<String, Vec<NavPoint>>,
    /// Simulates a database without the trigram extension.
    pub fail_similarity: bool,
    /// Simulates a broken connection on alias lookups.
    pub fail_aliases: bool,
}

#[allow(clippy::too_many_arguments)]
fn ticker(
    symbol: &str,
    name_en: &str,
    name_ar: &str,
    market: MarketCode,
    sector: &str,
    price: f64,
    change_percent: f64,
    volume: f64,
    market_cap: f64,
) -> TickerRow {
    let prev = price / (1.0 + change_percent / 100.0);
    TickerRow {
        symbol: symbol.to_string(),
        name_en: Some(name_en.to_string()),
        name_ar: Some(name_ar.to_string()),
        market_code: market.as_str().to_string(),
        currency: Some(market.currency().to_string()),
        sector_name: Some(sector.to_string()),
        industry: None,
        last_price: Some(price),
        change: Some(price - prev),
        change_percent: Some(change_percent),
        volume: Some(volume),
        high: Some(price * 1.01),
        low: Some(price * 0.99),
        open_price: Some(prev),
        prev_close: Some(prev),
        high_52w: Some(price * 1.3),
        low_52w: Some(price * 0.7),
        pe_ratio: Some(8.0 + (volume % 7.0)),
        pb_ratio: Some(1.5),
        dividend_yield: Some(2.0 + change_percent.abs() / 2.0),
        market_cap: Some(market_cap),
        beta: Some(1.0),
        target_price: Some(price * 1.15),
        last_updated: Some(Utc::now()),
    }
}

fn alias(alias_norm: &str, symbol: &str, market: MarketCode, alias_type: AliasType, priority: i32) -> AliasFixture {
    AliasFixture {
        alias_norm: normalize(alias_norm),
        symbol: symbol.to_string(),
        market,
        alias_type,
        priority,
        popularity: None,
    }
}

/// Deterministic daily bars ending today.
pub fn synthetic_ohlc(base: f64, days: i64) -> Vec<OhlcPoint> {
    let today = Utc::now().date_naive();
    (0..days)
        .map(|i| {
            let date = today - Duration::days(days - 1 - i);
            let t = i as f64;
            let close = base + (t / 9.0).sin() * base * 0.05 + t * base * 0.0005;
            OhlcPoint {
                date,
                open: Some(close * 0.995),
                high: Some(close * 1.01),
                low: Some(close * 0.99),
                close,
                volume: Some(100_000.0 + (t * 37.0) % 5_000.0),
            }
        })
        .collect()
}

fn statement(year: i32, quarter: Option<i32>, period: PeriodType, data: Value) -> StatementRow {
    StatementRow {
        fiscal_year: year,
        fiscal_quarter: quarter,
        period_type: period.as_str().to_string(),
        period_ending: quarter
            .and_then(|q| NaiveDate::from_ymd_opt(year, (q * 3) as u32, 28))
            .or_else(|| NaiveDate::from_ymd_opt(year, 12, 31)),
        data,
    }
}

fn statistics(scale: f64, z_score: Option<f64>) -> Map<String, Value> {
    let value = json!({
        "z_score": z_score,
        "f_score": 7,
        "roe": 22.5 * scale,
        "roa": 3.1 * scale,
        "roce": 18.0 * scale,
        "gross_margin": 55.0,
        "operating_margin": 38.0 * scale,
        "net_margin": 30.0 * scale,
        "ev_ebitda": 6.2 / scale,
        "debt_to_equity": 0.8 / scale,
        "total_debt": 40_000_000_000.0 / scale,
        "total_equity": 50_000_000_000.0,
        "asset_turnover": 0.12 * scale,
        "inventory_turnover": null,
        "earnings_yield": 11.0 * scale,
        "fcf_yield": 7.5 * scale,
        "revenue_growth": 18.0 * scale,
        "earnings_growth": 25.0 * scale,
        "current_ratio": 1.4,
        "quick_ratio": 1.1,
        "interest_coverage": 6.0 * scale,
        "dividend_yield": 3.2,
        "pe_ratio": 7.5 / scale,
        "pb_ratio": 1.6,
        "peg_ratio": 0.6 / scale,
        "eps": 9.4 * scale,
        "book_value_per_share": 45.0,
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl MemoryRepository {
    /// A small two-market universe with enough history for every handler.
    pub fn seeded() -> Self {
        use MarketCode::{Egx, Tdwl};

        let tickers = vec![
            ticker("COMI", "Commercial International Bank", "البنك التجاري الدولي", Egx, "Financial Services", 82.5, 2.4, 3_200_000.0, 250e9),
            ticker("SWDY", "Elsewedy Electric", "السويدي اليكتريك", Egx, "Industrials", 41.2, 3.1, 2_100_000.0, 90e9),
            ticker("TMGH", "Talaat Moustafa Group Holding", "مجموعة طلعت مصطفى القابضة", Egx, "Real Estate", 58.0, 1.2, 1_800_000.0, 120e9),
            ticker("GGRN", "Go Green for Agricultural Investment", "جو جرين للاستثمار الزراعي", Egx, "Basic Materials", 0.45, 5.5, 9_000_000.0, 0.8e9),
            ticker("FWRY", "Fawry for Banking Technology", "فوري لتكنولوجيا البنوك", Egx, "Technology", 6.8, 4.0, 12_000_000.0, 23e9),
            ticker("ETEL", "Telecom Egypt", "المصرية للاتصالات", Egx, "Communication Services", 38.5, 0.8, 900_000.0, 65e9),
            ticker("HRHO", "EFG Holding", "إي إف جي القابضة", Egx, "Financial Services", 21.0, 1.9, 1_500_000.0, 30e9),
            ticker("ABUK", "Abu Qir Fertilizers", "أبوقير للأسمدة", Egx, "Basic Materials", 55.0, 2.2, 700_000.0, 70e9),
            ticker("EAST", "Eastern Company", "الشرقية للدخان", Egx, "Consumer Defensive", 27.0, 0.5, 600_000.0, 60e9),
            ticker("ORAS", "Orascom Construction", "أوراسكوم كونستراكشون", Egx, "Industrials", 250.0, 1.5, 100_000.0, 29e9),
            ticker("PHDC", "Palm Hills Development", "بالم هيلز للتعمير", Egx, "Real Estate", 3.9, -1.4, 14_000_000.0, 12e9),
            ticker("EKHO", "Egypt Kuwait Holding", "القابضة المصرية الكويتية", Egx, "Industrials", 1.1, -2.3, 500_000.0, 12e9),
            ticker("AZGF", "Azimut Gold Fund Certificate", "وثيقة صندوق أزيموت للذهب", Egx, "Funds & Certificates", 12.0, 9.0, 400_000.0, 1e9),
            ticker("2222", "Saudi Arabian Oil Co", "أرامكو السعودية", Tdwl, "Energy", 27.9, 0.6, 15_000_000.0, 6.7e12),
            ticker("1120", "Al Rajhi Bank", "مصرف الراجحي", Tdwl, "Financial Services", 88.0, 1.1, 4_000_000.0, 350e9),
            ticker("2010", "Saudi Basic Industries Corp", "سابك", Tdwl, "Basic Materials", 76.0, -0.9, 2_000_000.0, 228e9),
        ];

        let aliases = vec![
            alias("commercial international bank", "COMI", Egx, AliasType::Official, 10),
            alias("cib", "COMI", Egx, AliasType::Short, 9),
            alias("البنك التجاري الدولي", "COMI", Egx, AliasType::Official, 10),
            alias("elsewedy electric", "SWDY", Egx, AliasType::Official, 10),
            alias("elsewedy", "SWDY", Egx, AliasType::Common, 8),
            alias("السويدي", "SWDY", Egx, AliasType::Common, 9),
            alias("talaat moustafa", "TMGH", Egx, AliasType::Common, 9),
            alias("fawry", "FWRY", Egx, AliasType::Brand, 8),
            alias("telecom egypt", "ETEL", Egx, AliasType::Official, 10),
            alias("palm hills", "PHDC", Egx, AliasType::Common, 8),
            alias("aramco", "2222", Tdwl, AliasType::Common, 9),
            alias("al rajhi", "1120", Tdwl, AliasType::Common, 9),
            alias("sabic", "2010", Tdwl, AliasType::Common, 9),
        ];

        let funds = vec![
            FundRow {
                fund_id: "EGF-101".to_string(),
                symbol: Some("FAWRYMM".to_string()),
                name_en: Some("Fawry Money Market Fund".to_string()),
                name_ar: Some("صندوق فوري النقدي".to_string()),
                manager_name: Some("Fawry Asset Management".to_string()),
                currency: Some("EGP".to_string()),
                market_code: Some("EGX".to_string()),
                last_nav: Some(14.2),
                nav_change_percent: Some(0.07),
                ytd_return: Some(19.5),
                one_year_return: Some(24.1),
                last_nav_date: Some(Utc::now().date_naive()),
            },
            FundRow {
                fund_id: "EGF-202".to_string(),
                symbol: Some("AZGOLD".to_string()),
                name_en: Some("Azimut Gold Fund".to_string()),
                name_ar: Some("صندوق أزيموت للذهب".to_string()),
                manager_name: Some("Azimut Egypt".to_string()),
                currency: Some("EGP".to_string()),
                market_code: Some("EGX".to_string()),
                last_nav: Some(31.0),
                nav_change_percent: Some(-0.4),
                ytd_return: Some(38.0),
                one_year_return: Some(61.0),
                last_nav_date: Some(Utc::now().date_naive()),
            },
        ];

        let mut ohlc = HashMap::new();
        ohlc.insert("COMI".to_string(), synthetic_ohlc(80.0, 400));
        ohlc.insert("SWDY".to_string(), synthetic_ohlc(40.0, 400));
        ohlc.insert("2222".to_string(), synthetic_ohlc(28.0, 400));
        // sparse history forces the live fallback
        ohlc.insert("TMGH".to_string(), synthetic_ohlc(58.0, 10));

        let mut statements = HashMap::new();
        for (symbol, scale) in [("COMI", 1.0), ("SWDY", 0.6)] {
            let mut income_a = Vec::new();
            let mut balance_a = Vec::new();
            let mut cash_a = Vec::new();
            let mut ratios_a = Vec::new();
            for (i, year) in [2023, 2022, 2021].into_iter().enumerate() {
                let f = scale * (1.0 - 0.15 * i as f64);
                income_a.push(statement(year, None, PeriodType::Annual, json!({
                    "total_revenue": 80e9 * f, "gross_profit": 44e9 * f, "operating_income": 30e9 * f,
                    "net_income": 24e9 * f, "eps": 8.0 * f, "ebitda": null,
                    "sector_specific_data": {"net_interest_income": 50e9 * f}
                })));
                balance_a.push(statement(year, None, PeriodType::Annual, json!({
                    "total_assets": 900e9 * f, "total_liabilities": 820e9 * f, "total_equity": 80e9 * f,
                    "cash_and_equivalents": 120e9 * f, "total_debt": 40e9 * f, "goodwill": null
                })));
                cash_a.push(statement(year, None, PeriodType::Annual, json!({
                    "operating_cash_flow": 35e9 * f, "capital_expenditure": -4e9 * f,
                    "free_cash_flow": 31e9 * f, "dividends_paid": -6e9 * f
                })));
                ratios_a.push(statement(year, None, PeriodType::Annual, json!({
                    "roe": 30.0 * f, "roa": 2.7 * f, "net_margin": 30.0, "current_ratio": 1.3,
                    "debt_to_equity": 0.5, "pe_ratio": 7.0, "pb_ratio": 1.8, "asset_turnover": 0.09
                })));
            }
            let mut income_q = Vec::new();
            let mut balance_q = Vec::new();
            let mut cash_q = Vec::new();
            let mut ratios_q = Vec::new();
            for (i, (year, quarter)) in [(2024, 2), (2024, 1), (2023, 4), (2023, 3), (2023, 2), (2023, 1)]
                .into_iter()
                .enumerate()
            {
                let f = scale * (1.0 - 0.04 * i as f64);
                income_q.push(statement(year, Some(quarter), PeriodType::Quarterly, json!({
                    "total_revenue": 22e9 * f, "gross_profit": 12e9 * f, "operating_income": 8e9 * f,
                    "net_income": 6.5e9 * f, "eps": 2.1 * f
                })));
                balance_q.push(statement(year, Some(quarter), PeriodType::Quarterly, json!({
                    "total_assets": 950e9 * f, "total_liabilities": 860e9 * f, "total_equity": 90e9 * f,
                    "cash_and_equivalents": 125e9 * f, "total_debt": 42e9 * f
                })));
                cash_q.push(statement(year, Some(quarter), PeriodType::Quarterly, json!({
                    "operating_cash_flow": 9e9 * f, "capital_expenditure": -1e9 * f, "free_cash_flow": 8e9 * f
                })));
                ratios_q.push(statement(year, Some(quarter), PeriodType::Quarterly, json!({
                    "roe": 28.0 * f, "net_margin": 29.5, "current_ratio": 1.25, "debt_to_equity": 0.47
                })));
            }
            let sym = symbol.to_string();
            statements.insert((StatementKind::Income, sym.clone(), PeriodType::Annual), income_a);
            statements.insert((StatementKind::Balance, sym.clone(), PeriodType::Annual), balance_a);
            statements.insert((StatementKind::Cashflow, sym.clone(), PeriodType::Annual), cash_a);
            statements.insert((StatementKind::Ratios, sym.clone(), PeriodType::Annual), ratios_a);
            statements.insert((StatementKind::Income, sym.clone(), PeriodType::Quarterly), income_q);
            statements.insert((StatementKind::Balance, sym.clone(), PeriodType::Quarterly), balance_q);
            statements.insert((StatementKind::Cashflow, sym.clone(), PeriodType::Quarterly), cash_q);
            statements.insert((StatementKind::Ratios, sym, PeriodType::Quarterly), ratios_q);
        }

        let mut stats = HashMap::new();
        stats.insert("COMI".to_string(), statistics(1.0, Some(3.4)));
        stats.insert("SWDY".to_string(), statistics(0.7, Some(2.2)));
        stats.insert("TMGH".to_string(), statistics(0.5, Some(1.2)));
        stats.insert("2222".to_string(), statistics(1.2, None));

        let mut shareholders = HashMap::new();
        shareholders.insert(
            "COMI".to_string(),
            vec![
                ShareholderRow {
                    holder_name: "Free Float".to_string(),
                    holder_name_ar: Some("أسهم حرة التداول".to_string()),
                    ownership_percent: Some(74.5),
                    shares: Some(2.2e9),
                    as_of_date: NaiveDate::from_ymd_opt(2024, 6, 30),
                },
                ShareholderRow {
                    holder_name: "Fairfax Financial".to_string(),
                    holder_name_ar: None,
                    ownership_percent: Some(6.5),
                    shares: Some(0.19e9),
                    as_of_date: NaiveDate::from_ymd_opt(2024, 6, 30),
                },
            ],
        );

        let mut corporate_actions = HashMap::new();
        corporate_actions.insert(
            "COMI".to_string(),
            vec![
                CorporateActionRow {
                    action_type: "news".to_string(),
                    title: Some("CIB reports record H1 profit".to_string()),
                    description: Some("Net income up 60% year on year.".to_string()),
                    announcement_date: NaiveDate::from_ymd_opt(2024, 8, 12),
                    ex_date: None,
                    value: None,
                },
                CorporateActionRow {
                    action_type: "agm".to_string(),
                    title: Some("Ordinary general assembly".to_string()),
                    description: Some("Approval of 2023 financial statements.".to_string()),
                    announcement_date: NaiveDate::from_ymd_opt(2024, 3, 10),
                    ex_date: None,
                    value: None,
                },
                CorporateActionRow {
                    action_type: "dividend".to_string(),
                    title: Some("Cash dividend".to_string()),
                    description: None,
                    announcement_date: NaiveDate::from_ymd_opt(2024, 3, 20),
                    ex_date: NaiveDate::from_ymd_opt(2024, 4, 2),
                    value: Some(1.5),
                },
            ],
        );

        let mut analyst_ratings = HashMap::new();
        analyst_ratings.insert(
            "COMI".to_string(),
            vec![
                AnalystRatingRow {
                    firm: Some("EFG Hermes".to_string()),
                    rating: Some("Buy".to_string()),
                    target_price: Some(105.0),
                    rating_date: NaiveDate::from_ymd_opt(2024, 7, 1),
                },
                AnalystRatingRow {
                    firm: Some("CI Capital".to_string()),
                    rating: Some("Overweight".to_string()),
                    target_price: Some(98.0),
                    rating_date: NaiveDate::from_ymd_opt(2024, 5, 15),
                },
            ],
        );

        let mut dividends = HashMap::new();
        dividends.insert(
            "COMI".to_string(),
            vec![
                DividendRow {
                    ex_date: NaiveDate::from_ymd_opt(2024, 4, 2),
                    payment_date: NaiveDate::from_ymd_opt(2024, 4, 10),
                    amount: Some(1.5),
                    dividend_type: Some("cash".to_string()),
                },
                DividendRow {
                    ex_date: NaiveDate::from_ymd_opt(2023, 4, 3),
                    payment_date: NaiveDate::from_ymd_opt(2023, 4, 11),
                    amount: Some(1.0),
                    dividend_type: Some("cash".to_string()),
                },
            ],
        );

        let mut nav = HashMap::new();
        nav.insert(
            "EGF-101".to_string(),
            synthetic_ohlc(14.0, 120)
                .into_iter()
                .map(|p| NavPoint { date: p.date, nav: p.close })
                .collect(),
        );

        Self {
            tickers,
            aliases,
            funds,
            fund_aliases: vec![("fawry".to_string(), "EGF-101".to_string())],
            ohlc,
            statements,
            statistics: stats,
            shareholders,
            corporate_actions,
            analyst_ratings,
            dividends,
            nav,
            fail_similarity: false,
            fail_aliases: false,
        }
    }

    fn ticker_row(&self, symbol: &str) -> Option<&TickerRow> {
        self.tickers.iter().find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    fn hit_for(&self, alias: &AliasFixture, similarity: Option<f64>) -> Option<SymbolHit> {
        let row = self.ticker_row(&alias.symbol)?;
        Some(SymbolHit {
            alias_type: Some(alias.alias_type),
            priority: Some(alias.priority),
            popularity: alias.popularity,
            similarity,
            ..ticker_hit(row, None)
        })
    }

    fn name_matches(row: &TickerRow, needle: &str) -> bool {
        let en = row.name_en.as_deref().map(str::to_lowercase).unwrap_or_default();
        let ar = row.name_ar.as_deref().map(normalize).unwrap_or_default();
        en.contains(needle) || ar.contains(needle)
    }

    fn name_len(row: &TickerRow) -> usize {
        row.name_en
            .as_deref()
            .or(row.name_ar.as_deref())
            .map(|n| n.chars().count())
            .unwrap_or(row.symbol.len())
    }
}

fn ticker_hit(row: &TickerRow, alias_type: Option<AliasType>) -> SymbolHit {
    SymbolHit {
        alias_type,
        ..SymbolHit::stock(&row.symbol, row.name_en.as_deref(), row.name_ar.as_deref(), row.market())
    }
}

fn in_market(row_market: Option<MarketCode>, filter: Option<MarketCode>) -> bool {
    filter.map_or(true, |m| row_market == Some(m))
}

fn is_fund_sector(sector: Option<&str>) -> bool {
    let sector = sector.unwrap_or("").to_lowercase();
    sector.contains("fund") || sector.contains("certificate") || sector.contains("صندوق")
}

fn sort_by<T>(rows: &mut [T], direction: Direction, key: impl Fn(&T) -> Option<f64>) {
    rows.sort_by(|a, b| {
        let (a, b) = (key(a).unwrap_or(f64::NAN), key(b).unwrap_or(f64::NAN));
        let ord = a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal);
        match direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        }
    });
}

fn fund_hit(fund: &FundRow) -> SymbolHit {
    SymbolHit {
        symbol: fund.fund_id.clone(),
        name_en: fund.name_en.clone(),
        name_ar: fund.name_ar.clone(),
        market_code: fund.market_code.as_deref().and_then(MarketCode::parse),
        entity_type: EntityType::Fund,
        alias_type: Some(AliasType::Official),
        priority: None,
        popularity: None,
        similarity: None,
    }
}

#[async_trait]
impl MarketRepository for MemoryRepository {
    async fn fund_alias_hits(&self, probe: &str) -> Result<Vec<SymbolHit>> {
        Ok(self
            .fund_aliases
            .iter()
            .filter(|(alias, _)| alias == probe)
            .filter_map(|(_, id)| self.funds.iter().find(|f| &f.fund_id == id))
            .map(fund_hit)
            .collect())
    }

    async fn exact_ticker_hits(&self, symbol: &str, market: Option<MarketCode>) -> Result<Vec<SymbolHit>> {
        Ok(self
            .tickers
            .iter()
            .filter(|t| t.symbol.eq_ignore_ascii_case(symbol) && in_market(t.market(), market))
            .map(|t| ticker_hit(t, Some(AliasType::Official)))
            .collect())
    }

    async fn alias_hits(&self, probe: &str, market: Option<MarketCode>) -> Result<Vec<SymbolHit>> {
        if self.fail_aliases {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut matches: Vec<&AliasFixture> = self
            .aliases
            .iter()
            .filter(|a| a.alias_norm == probe && in_market(Some(a.market), market))
            .collect();
        matches.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(matches.into_iter().filter_map(|a| self.hit_for(a, None)).take(10).collect())
    }

    async fn name_hits(&self, probe: &str, market: Option<MarketCode>, limit: i64) -> Result<Vec<SymbolHit>> {
        let mut rows: Vec<&TickerRow> = self
            .tickers
            .iter()
            .filter(|t| in_market(t.market(), market) && Self::name_matches(t, probe))
            .collect();
        rows.sort_by_key(|t| Self::name_len(t));
        Ok(rows
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|t| ticker_hit(t, Some(AliasType::Common)))
            .collect())
    }

    async fn similarity_hits(
        &self,
        probe: &str,
        market: Option<MarketCode>,
        threshold: f64,
        limit: i64,
    ) -> Result<Vec<SymbolHit>> {
        if self.fail_similarity {
            return Err(AppError::Database(sqlx::Error::Protocol(
                "function similarity(text, unknown) does not exist".to_string(),
            )));
        }
        let mut scored: Vec<(f64, &AliasFixture)> = self
            .aliases
            .iter()
            .filter(|a| in_market(Some(a.market), market))
            .map(|a| (trigram_similarity(&a.alias_norm, probe), a))
            .filter(|(sim, _)| *sim > threshold)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(limit.max(0) as usize)
            .filter_map(|(sim, a)| self.hit_for(a, Some(sim)))
            .collect())
    }

    async fn token_hits(&self, tokens: &[String], market: Option<MarketCode>, limit: i64) -> Result<Vec<SymbolHit>> {
        if tokens.is_empty() {
            return Ok(vec![]);
        }
        let mut rows: Vec<&TickerRow> = self
            .tickers
            .iter()
            .filter(|t| in_market(t.market(), market))
            .filter(|t| tokens.iter().all(|tok| Self::name_matches(t, tok)))
            .collect();
        rows.sort_by_key(|t| Self::name_len(t));
        Ok(rows
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|t| ticker_hit(t, Some(AliasType::Common)))
            .collect())
    }

    async fn ticker(&self, symbol: &str) -> Result<Option<TickerRow>> {
        Ok(self.ticker_row(symbol).cloned())
    }

    async fn ohlc(&self, symbol: &str, since: Option<NaiveDate>) -> Result<Vec<OhlcPoint>> {
        Ok(self
            .ohlc
            .get(&symbol.to_uppercase())
            .map(|points| {
                points
                    .iter()
                    .filter(|p| since.map_or(true, |s| p.date >= s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn statements(
        &self,
        kind: StatementKind,
        symbol: &str,
        period: PeriodType,
        limit: i64,
    ) -> Result<Vec<StatementRow>> {
        Ok(self
            .statements
            .get(&(kind, symbol.to_uppercase(), period))
            .map(|rows| rows.iter().take(limit.max(0) as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn statistics(&self, symbol: &str) -> Result<Option<Map<String, Value>>> {
        Ok(self.statistics.get(&symbol.to_uppercase()).cloned())
    }

    async fn rank_tickers(&self, ranking: &TickerRanking) -> Result<Vec<TickerRow>> {
        let column = ranking.column;
        let mut rows: Vec<TickerRow> = self
            .tickers
            .iter()
            .filter(|t| column.value(t).is_some())
            .filter(|t| in_market(t.market(), ranking.market))
            .filter(|t| match &ranking.sector {
                Some(sector) => t
                    .sector_name
                    .as_deref()
                    .map_or(false, |s| s.to_lowercase().contains(&sector.to_lowercase())),
                None => true,
            })
            .filter(|t| !ranking.require_positive || column.value(t).map_or(false, |v| v > 0.0))
            .filter(|t| match ranking.bound {
                Some((Condition::Below, bound)) => column.value(t).map_or(false, |v| v < bound),
                Some((Condition::Above, bound)) => column.value(t).map_or(false, |v| v > bound),
                None => true,
            })
            .filter(|t| !ranking.exclude_funds || !is_fund_sector(t.sector_name.as_deref()))
            .cloned()
            .collect();
        sort_by(&mut rows, ranking.direction, |t| column.value(t));
        rows.truncate(ranking.limit.max(0) as usize);
        Ok(rows)
    }

    async fn rank_statistics(
        &self,
        metric: StatMetric,
        direction: Direction,
        market: Option<MarketCode>,
        limit: i64,
    ) -> Result<Vec<RankedRow>> {
        let mut rows: Vec<RankedRow> = self
            .statistics
            .iter()
            .filter_map(|(symbol, stats)| {
                let t = self.ticker_row(symbol)?;
                let value = crate::utils::json_f64(stats, metric.column())?;
                if metric.requires_positive() && value <= 0.0 {
                    return None;
                }
                if !in_market(t.market(), market) || is_fund_sector(t.sector_name.as_deref()) {
                    return None;
                }
                Some(RankedRow {
                    symbol: t.symbol.clone(),
                    name_en: t.name_en.clone(),
                    name_ar: t.name_ar.clone(),
                    market_code: t.market_code.clone(),
                    sector_name: t.sector_name.clone(),
                    last_price: t.last_price,
                    value: Some(value),
                })
            })
            .collect();
        sort_by(&mut rows, direction, |r| r.value);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn sector_summaries(&self, market: Option<MarketCode>) -> Result<Vec<SectorSummary>> {
        let mut groups: HashMap<String, Vec<&TickerRow>> = HashMap::new();
        for t in self.tickers.iter().filter(|t| in_market(t.market(), market)) {
            if let Some(sector) = &t.sector_name {
                groups.entry(sector.clone()).or_default().push(t);
            }
        }
        let mut out: Vec<SectorSummary> = groups
            .into_iter()
            .map(|(sector_name, rows)| {
                let changes: Vec<f64> = rows.iter().filter_map(|t| t.change_percent).collect();
                SectorSummary {
                    sector_name,
                    stock_count: rows.len() as i64,
                    avg_change_percent: if changes.is_empty() {
                        None
                    } else {
                        Some(changes.iter().sum::<f64>() / changes.len() as f64)
                    },
                    total_market_cap: Some(rows.iter().filter_map(|t| t.market_cap).sum()),
                }
            })
            .collect();
        sort_by(&mut out, Direction::Desc, |s| s.total_market_cap);
        Ok(out)
    }

    async fn shareholders(&self, symbol: &str) -> Result<Vec<ShareholderRow>> {
        Ok(self.shareholders.get(&symbol.to_uppercase()).cloned().unwrap_or_default())
    }

    async fn corporate_actions(&self, symbol: &str, action_types: &[&str], limit: i64) -> Result<Vec<CorporateActionRow>> {
        Ok(self
            .corporate_actions
            .get(&symbol.to_uppercase())
            .map(|rows| {
                rows.iter()
                    .filter(|r| action_types.is_empty() || action_types.contains(&r.action_type.as_str()))
                    .take(limit.max(0) as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn analyst_ratings(&self, symbol: &str, limit: i64) -> Result<Vec<AnalystRatingRow>> {
        Ok(self
            .analyst_ratings
            .get(&symbol.to_uppercase())
            .map(|rows| rows.iter().take(limit.max(0) as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn dividend_history(&self, symbol: &str, limit: i64) -> Result<Vec<DividendRow>> {
        Ok(self
            .dividends
            .get(&symbol.to_uppercase())
            .map(|rows| rows.iter().take(limit.max(0) as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn fund(&self, fund_id: &str) -> Result<Option<FundRow>> {
        Ok(self
            .funds
            .iter()
            .find(|f| f.fund_id == fund_id || f.symbol.as_deref().map_or(false, |s| s.eq_ignore_ascii_case(fund_id)))
            .cloned())
    }

    async fn nav_history(&self, fund_id: &str, since: Option<NaiveDate>) -> Result<Vec<NavPoint>> {
        Ok(self
            .nav
            .get(fund_id)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| since.map_or(true, |s| p.date >= s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn funds(&self, market: Option<MarketCode>, limit: i64) -> Result<Vec<FundRow>> {
        let mut rows: Vec<FundRow> = self
            .funds
            .iter()
            .filter(|f| in_market(f.market_code.as_deref().and_then(MarketCode::parse), market))
            .cloned()
            .collect();
        sort_by(&mut rows, Direction::Desc, |f| f.ytd_return);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn fund_movers(&self, direction: Direction, limit: i64) -> Result<Vec<FundRow>> {
        let mut rows: Vec<FundRow> = self
            .funds
            .iter()
            .filter(|f| f.nav_change_percent.is_some())
            .cloned()
            .collect();
        sort_by(&mut rows, direction, |f| f.nav_change_percent);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}
