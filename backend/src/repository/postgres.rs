use super::{
    AnalystRatingRow, CorporateActionRow, DividendRow, FundRow, MarketRepository, NavPoint,
    OhlcPoint, PeriodType, RankedRow, SectorSummary, ShareholderRow, StatMetric, StatementKind,
    StatementRow, SymbolHit, TickerRanking, TickerRow,
};
use crate::{
    chat::schema::{AliasType, Condition, Direction, EntityType, MarketCode},
    error::Result,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use sqlx::{PgPool, Postgres, QueryBuilder};

const TICKER_COLUMNS: &str = "symbol, name_en, name_ar, market_code, currency, sector_name, industry, \
    last_price::float8 AS last_price, change::float8 AS change, change_percent::float8 AS change_percent, \
    volume::float8 AS volume, high::float8 AS high, low::float8 AS low, open_price::float8 AS open_price, \
    prev_close::float8 AS prev_close, high_52w::float8 AS high_52w, low_52w::float8 AS low_52w, \
    pe_ratio::float8 AS pe_ratio, pb_ratio::float8 AS pb_ratio, dividend_yield::float8 AS dividend_yield, \
    market_cap::float8 AS market_cap, beta::float8 AS beta, target_price::float8 AS target_price, \
    last_updated::timestamptz AS last_updated";

/// Folds stored Arabic names the same way the normalizer folds queries.
const NAME_AR_NORM: &str = "translate(COALESCE(name_ar, ''), 'أإآةى', 'اااهي')";

const FUND_COLUMNS: &str = "fund_id::text AS fund_id, symbol, name_en, name_ar, manager_name, currency, market_code, \
    last_nav::float8 AS last_nav, nav_change_percent::float8 AS nav_change_percent, \
    ytd_return::float8 AS ytd_return, one_year_return::float8 AS one_year_return, \
    last_nav_date::date AS last_nav_date";

#[derive(Debug, sqlx::FromRow)]
struct HitRow {
    symbol: String,
    name_en: Option<String>,
    name_ar: Option<String>,
    market_code: Option<String>,
    alias_type: Option<String>,
    priority: Option<i32>,
    popularity: Option<f64>,
    similarity: Option<f64>,
}

impl HitRow {
    fn into_hit(self, entity_type: EntityType) -> SymbolHit {
        SymbolHit {
            symbol: self.symbol,
            name_en: self.name_en,
            name_ar: self.name_ar,
            market_code: self.market_code.as_deref().and_then(MarketCode::parse),
            entity_type,
            alias_type: self.alias_type.as_deref().and_then(AliasType::from_tag),
            priority: self.priority,
            popularity: self.popularity,
            similarity: self.similarity,
        }
    }
}

fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn market_str(market: Option<MarketCode>) -> Option<&'static str> {
    market.map(MarketCode::as_str)
}

#[derive(Clone)]
pub struct PgMarketRepository {
    pool: PgPool,
}

impl PgMarketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_hits(
        &self,
        sql: &str,
        probe: &str,
        market: Option<MarketCode>,
        entity_type: EntityType,
    ) -> Result<Vec<SymbolHit>> {
        let rows = sqlx::query_as::<_, HitRow>(sql)
            .bind(probe)
            .bind(market_str(market))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.into_hit(entity_type)).collect())
    }
}

#[async_trait]
impl MarketRepository for PgMarketRepository {
    async fn fund_alias_hits(&self, probe: &str) -> Result<Vec<SymbolHit>> {
        let sql = r#"
            SELECT f.fund_id::text AS symbol, f.name_en, f.name_ar, f.market_code,
                   'official' AS alias_type, NULL::int4 AS priority,
                   NULL::float8 AS popularity, NULL::float8 AS similarity
            FROM fund_aliases a
            JOIN mutual_funds f ON f.fund_id = a.fund_id
            WHERE a.alias_text_norm = $1
            LIMIT 5
        "#;
        let rows = sqlx::query_as::<_, HitRow>(sql)
            .bind(probe)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.into_hit(EntityType::Fund)).collect())
    }

    async fn exact_ticker_hits(&self, symbol: &str, market: Option<MarketCode>) -> Result<Vec<SymbolHit>> {
        let sql = r#"
            SELECT symbol, name_en, name_ar, market_code,
                   'official' AS alias_type, NULL::int4 AS priority,
                   NULL::float8 AS popularity, NULL::float8 AS similarity
            FROM market_tickers
            WHERE UPPER(symbol) = UPPER($1) AND ($2::text IS NULL OR market_code = $2)
        "#;
        self.fetch_hits(sql, symbol, market, EntityType::Stock).await
    }

    async fn alias_hits(&self, probe: &str, market: Option<MarketCode>) -> Result<Vec<SymbolHit>> {
        let sql = r#"
            SELECT t.symbol, t.name_en, t.name_ar, t.market_code,
                   a.alias_type, a.priority::int4 AS priority,
                   a.popularity_score::float8 AS popularity, NULL::float8 AS similarity
            FROM ticker_aliases a
            JOIN market_tickers t ON t.symbol = a.symbol AND t.market_code = a.market_code
            WHERE a.alias_text_norm = $1 AND ($2::text IS NULL OR a.market_code = $2)
            ORDER BY a.priority DESC
            LIMIT 10
        "#;
        self.fetch_hits(sql, probe, market, EntityType::Stock).await
    }

    async fn name_hits(&self, probe: &str, market: Option<MarketCode>, limit: i64) -> Result<Vec<SymbolHit>> {
        let sql = format!(
            r#"
            SELECT symbol, name_en, name_ar, market_code,
                   'common' AS alias_type, NULL::int4 AS priority,
                   NULL::float8 AS popularity, NULL::float8 AS similarity
            FROM market_tickers
            WHERE (LOWER(COALESCE(name_en, '')) LIKE $1 OR {name_ar} LIKE $1)
              AND ($2::text IS NULL OR market_code = $2)
            ORDER BY LENGTH(COALESCE(name_en, name_ar, symbol)) ASC
            LIMIT $3
            "#,
            name_ar = NAME_AR_NORM
        );
        let rows = sqlx::query_as::<_, HitRow>(&sql)
            .bind(like_pattern(probe))
            .bind(market_str(market))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.into_hit(EntityType::Stock)).collect())
    }

    async fn similarity_hits(
        &self,
        probe: &str,
        market: Option<MarketCode>,
        threshold: f64,
        limit: i64,
    ) -> Result<Vec<SymbolHit>> {
        let sql = r#"
            SELECT t.symbol, t.name_en, t.name_ar, t.market_code,
                   a.alias_type, a.priority::int4 AS priority,
                   a.popularity_score::float8 AS popularity,
                   similarity(a.alias_text_norm, $1)::float8 AS similarity
            FROM ticker_aliases a
            JOIN market_tickers t ON t.symbol = a.symbol AND t.market_code = a.market_code
            WHERE similarity(a.alias_text_norm, $1) > $3
              AND ($2::text IS NULL OR a.market_code = $2)
            ORDER BY similarity DESC
            LIMIT $4
        "#;
        let rows = sqlx::query_as::<_, HitRow>(sql)
            .bind(probe)
            .bind(market_str(market))
            .bind(threshold)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.into_hit(EntityType::Stock)).collect())
    }

    async fn token_hits(&self, tokens: &[String], market: Option<MarketCode>, limit: i64) -> Result<Vec<SymbolHit>> {
        if tokens.is_empty() {
            return Ok(vec![]);
        }
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT symbol, name_en, name_ar, market_code, 'common' AS alias_type, \
             NULL::int4 AS priority, NULL::float8 AS popularity, NULL::float8 AS similarity \
             FROM market_tickers WHERE TRUE",
        );
        for token in tokens {
            let pattern = like_pattern(token);
            qb.push(" AND (LOWER(COALESCE(name_en, '')) LIKE ")
                .push_bind(pattern.clone())
                .push(format!(" OR {} LIKE ", NAME_AR_NORM))
                .push_bind(pattern)
                .push(")");
        }
        if let Some(market) = market {
            qb.push(" AND market_code = ").push_bind(market.as_str());
        }
        qb.push(" ORDER BY LENGTH(COALESCE(name_en, name_ar, symbol)) ASC LIMIT ")
            .push_bind(limit);

        let rows = qb.build_query_as::<HitRow>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.into_hit(EntityType::Stock)).collect())
    }

    async fn ticker(&self, symbol: &str) -> Result<Option<TickerRow>> {
        let sql = format!(
            "SELECT {} FROM market_tickers WHERE UPPER(symbol) = UPPER($1) LIMIT 1",
            TICKER_COLUMNS
        );
        Ok(sqlx::query_as::<_, TickerRow>(&sql)
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn ohlc(&self, symbol: &str, since: Option<NaiveDate>) -> Result<Vec<OhlcPoint>> {
        let sql = r#"
            SELECT date::date AS date, open::float8 AS open, high::float8 AS high,
                   low::float8 AS low, close::float8 AS close, volume::float8 AS volume
            FROM ohlc_data
            WHERE symbol = $1 AND close IS NOT NULL AND ($2::date IS NULL OR date >= $2)
            ORDER BY date ASC
        "#;
        Ok(sqlx::query_as::<_, OhlcPoint>(sql)
            .bind(symbol)
            .bind(since)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn statements(
        &self,
        kind: StatementKind,
        symbol: &str,
        period: PeriodType,
        limit: i64,
    ) -> Result<Vec<StatementRow>> {
        let (quarter, ending) = match kind {
            StatementKind::Ratios => ("NULL::int4", "NULL::date"),
            _ => ("fiscal_quarter::int4", "period_ending::date"),
        };
        let sql = format!(
            r#"
            SELECT fiscal_year::int4 AS fiscal_year, {quarter} AS fiscal_quarter,
                   period_type, {ending} AS period_ending, to_jsonb(s) AS data
            FROM {table} s
            WHERE symbol = $1 AND period_type = $2
            ORDER BY fiscal_year DESC, {quarter} DESC NULLS LAST
            LIMIT $3
            "#,
            quarter = quarter,
            ending = ending,
            table = kind.table()
        );
        Ok(sqlx::query_as::<_, StatementRow>(&sql)
            .bind(symbol)
            .bind(period.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn statistics(&self, symbol: &str) -> Result<Option<Map<String, Value>>> {
        let row: Option<(Value,)> =
            sqlx::query_as("SELECT to_jsonb(s) FROM stock_statistics s WHERE symbol = $1 LIMIT 1")
                .bind(symbol)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(value,)| match value {
            Value::Object(map) => Some(map),
            _ => None,
        }))
    }

    async fn rank_tickers(&self, ranking: &TickerRanking) -> Result<Vec<TickerRow>> {
        let column = ranking.column.sql();
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM market_tickers WHERE {} IS NOT NULL",
            TICKER_COLUMNS, column
        ));
        if let Some(market) = ranking.market {
            qb.push(" AND market_code = ").push_bind(market.as_str());
        }
        if let Some(sector) = &ranking.sector {
            qb.push(" AND sector_name ILIKE ").push_bind(like_pattern(sector));
        }
        if ranking.require_positive {
            qb.push(format!(" AND {} > 0", column));
        }
        if let Some((condition, value)) = ranking.bound {
            let op = match condition {
                Condition::Below => "<",
                Condition::Above => ">",
            };
            qb.push(format!(" AND {} {} ", column, op)).push_bind(value);
        }
        if ranking.exclude_funds {
            qb.push(
                " AND COALESCE(sector_name, '') NOT ILIKE '%fund%' \
                 AND COALESCE(sector_name, '') NOT ILIKE '%certificate%' \
                 AND COALESCE(sector_name, '') NOT LIKE '%صندوق%'",
            );
        }
        qb.push(format!(" ORDER BY {} {} NULLS LAST LIMIT ", column, ranking.direction.sql()))
            .push_bind(ranking.limit);

        Ok(qb.build_query_as::<TickerRow>().fetch_all(&self.pool).await?)
    }

    async fn rank_statistics(
        &self,
        metric: StatMetric,
        direction: Direction,
        market: Option<MarketCode>,
        limit: i64,
    ) -> Result<Vec<RankedRow>> {
        let column = metric.column();
        let positive = if metric.requires_positive() {
            format!(" AND s.{} > 0", column)
        } else {
            String::new()
        };
        let sql = format!(
            r#"
            SELECT t.symbol, t.name_en, t.name_ar, t.market_code, t.sector_name,
                   t.last_price::float8 AS last_price, s.{col}::float8 AS value
            FROM stock_statistics s
            JOIN market_tickers t ON t.symbol = s.symbol
            WHERE s.{col} IS NOT NULL{positive}
              AND ($1::text IS NULL OR t.market_code = $1)
              AND COALESCE(t.sector_name, '') NOT ILIKE '%fund%'
            ORDER BY s.{col} {dir} NULLS LAST
            LIMIT $2
            "#,
            col = column,
            positive = positive,
            dir = direction.sql()
        );
        Ok(sqlx::query_as::<_, RankedRow>(&sql)
            .bind(market_str(market))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn sector_summaries(&self, market: Option<MarketCode>) -> Result<Vec<SectorSummary>> {
        let sql = r#"
            SELECT sector_name, COUNT(*)::int8 AS stock_count,
                   AVG(change_percent)::float8 AS avg_change_percent,
                   SUM(market_cap)::float8 AS total_market_cap
            FROM market_tickers
            WHERE sector_name IS NOT NULL AND ($1::text IS NULL OR market_code = $1)
            GROUP BY sector_name
            ORDER BY total_market_cap DESC NULLS LAST
        "#;
        Ok(sqlx::query_as::<_, SectorSummary>(sql)
            .bind(market_str(market))
            .fetch_all(&self.pool)
            .await?)
    }

    async fn shareholders(&self, symbol: &str) -> Result<Vec<ShareholderRow>> {
        let sql = r#"
            SELECT holder_name, holder_name_ar, ownership_percent::float8 AS ownership_percent,
                   shares::float8 AS shares, as_of_date::date AS as_of_date
            FROM major_shareholders
            WHERE symbol = $1
            ORDER BY ownership_percent DESC NULLS LAST
            LIMIT 15
        "#;
        Ok(sqlx::query_as::<_, ShareholderRow>(sql)
            .bind(symbol)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn corporate_actions(&self, symbol: &str, action_types: &[&str], limit: i64) -> Result<Vec<CorporateActionRow>> {
        let sql = r#"
            SELECT action_type, title, description, announcement_date::date AS announcement_date,
                   ex_date::date AS ex_date, value::float8 AS value
            FROM corporate_actions
            WHERE symbol = $1 AND (cardinality($2::text[]) = 0 OR action_type = ANY($2))
            ORDER BY COALESCE(announcement_date, ex_date) DESC NULLS LAST
            LIMIT $3
        "#;
        let types: Vec<String> = action_types.iter().map(|t| t.to_string()).collect();
        Ok(sqlx::query_as::<_, CorporateActionRow>(sql)
            .bind(symbol)
            .bind(types)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn analyst_ratings(&self, symbol: &str, limit: i64) -> Result<Vec<AnalystRatingRow>> {
        let sql = r#"
            SELECT firm, rating, target_price::float8 AS target_price, rating_date::date AS rating_date
            FROM analyst_ratings
            WHERE symbol = $1
            ORDER BY rating_date DESC NULLS LAST
            LIMIT $2
        "#;
        Ok(sqlx::query_as::<_, AnalystRatingRow>(sql)
            .bind(symbol)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn dividend_history(&self, symbol: &str, limit: i64) -> Result<Vec<DividendRow>> {
        let sql = r#"
            SELECT ex_date::date AS ex_date, payment_date::date AS payment_date,
                   amount::float8 AS amount, dividend_type
            FROM dividend_history
            WHERE symbol = $1
            ORDER BY ex_date DESC NULLS LAST
            LIMIT $2
        "#;
        Ok(sqlx::query_as::<_, DividendRow>(sql)
            .bind(symbol)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn fund(&self, fund_id: &str) -> Result<Option<FundRow>> {
        let sql = format!(
            "SELECT {} FROM mutual_funds WHERE fund_id::text = $1 OR UPPER(symbol) = UPPER($1) LIMIT 1",
            FUND_COLUMNS
        );
        Ok(sqlx::query_as::<_, FundRow>(&sql)
            .bind(fund_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn nav_history(&self, fund_id: &str, since: Option<NaiveDate>) -> Result<Vec<NavPoint>> {
        let sql = r#"
            SELECT date::date AS date, nav::float8 AS nav
            FROM nav_history
            WHERE fund_id::text = $1 AND nav IS NOT NULL AND ($2::date IS NULL OR date >= $2)
            ORDER BY date ASC
        "#;
        Ok(sqlx::query_as::<_, NavPoint>(sql)
            .bind(fund_id)
            .bind(since)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn funds(&self, market: Option<MarketCode>, limit: i64) -> Result<Vec<FundRow>> {
        let sql = format!(
            "SELECT {} FROM mutual_funds WHERE ($1::text IS NULL OR market_code = $1) \
             ORDER BY ytd_return DESC NULLS LAST LIMIT $2",
            FUND_COLUMNS
        );
        Ok(sqlx::query_as::<_, FundRow>(&sql)
            .bind(market_str(market))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn fund_movers(&self, direction: Direction, limit: i64) -> Result<Vec<FundRow>> {
        let sql = format!(
            "SELECT {} FROM mutual_funds WHERE nav_change_percent IS NOT NULL \
             ORDER BY nav_change_percent {} LIMIT $1",
            FUND_COLUMNS,
            direction.sql()
        );
        Ok(sqlx::query_as::<_, FundRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }
}
