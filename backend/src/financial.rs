use crate::{
    chat::schema::{MarketCode, Range},
    config::ChatConfig,
    error::{AppError, Result},
    repository::OhlcPoint,
};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use ta::{
    indicators::{
        BollingerBands, ExponentialMovingAverage, MovingAverageConvergenceDivergence, RateOfChange,
        RelativeStrengthIndex, SimpleMovingAverage,
    },
    Next,
};

/// Daily bars from an outside provider, used when the database history is
/// too short for the requested window.
#[async_trait]
pub trait LiveMarketFeed: Send + Sync {
    async fn daily_ohlc(&self, symbol: &str, market: MarketCode, range: Range) -> Result<Vec<OhlcPoint>>;
}

pub struct FinancialService {
    client: Client,
    url_template: String,
    timeout: Duration,
}

impl FinancialService {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            client: Client::new(),
            url_template: config.live_market_url.clone(),
            timeout: config.live_fetch_timeout,
        }
    }

    /// Provider ticker: Cairo listings carry `.CA`, Tadawul `.SR`.
    pub fn provider_symbol(symbol: &str, market: MarketCode) -> String {
        match market {
            MarketCode::Egx => format!("{}.CA", symbol.to_uppercase()),
            MarketCode::Tdwl => format!("{}.SR", symbol),
        }
    }

    pub fn provider_range(range: Range) -> &'static str {
        match range {
            Range::OneDay => "5d",
            Range::OneWeek => "5d",
            Range::OneMonth => "1mo",
            Range::ThreeMonths => "3mo",
            Range::SixMonths => "6mo",
            Range::OneYear => "1y",
            Range::FiveYears => "5y",
            Range::Max => "max",
        }
    }

    fn url(&self, symbol: &str, market: MarketCode, range: Range) -> String {
        self.url_template
            .replace("{symbol}", &Self::provider_symbol(symbol, market))
            .replace("{range}", Self::provider_range(range))
    }
}

#[async_trait]
impl LiveMarketFeed for FinancialService {
    async fn daily_ohlc(&self, symbol: &str, market: MarketCode, range: Range) -> Result<Vec<OhlcPoint>> {
        let url = self.url(symbol, market, range);
        tracing::debug!("Live OHLC fetch {}", url);

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .header("User-Agent", "Mozilla/5.0")
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Live market API error: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "Live market API returned {}",
                response.status()
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("JSON parse error: {}", e)))?;

        parse_chart(&data)
    }
}

/// Parses a `chart.result[0]` payload into ascending daily bars. Bars
/// without a close are dropped; duplicate dates keep the last bar.
pub fn parse_chart(data: &Value) -> Result<Vec<OhlcPoint>> {
    let result = data
        .pointer("/chart/result/0")
        .ok_or_else(|| AppError::ExternalService("Live market payload has no result".to_string()))?;
    let timestamps = result
        .get("timestamp")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let quote = result.pointer("/indicators/quote/0").cloned().unwrap_or(Value::Null);

    let column = |name: &str, i: usize| -> Option<f64> {
        quote
            .get(name)
            .and_then(|c| c.get(i))
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
    };

    let mut points: Vec<OhlcPoint> = timestamps
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let date = DateTime::from_timestamp(ts.as_i64()?, 0)?.date_naive();
            Some(OhlcPoint {
                date,
                open: column("open", i),
                high: column("high", i),
                low: column("low", i),
                close: column("close", i)?,
                volume: column("volume", i),
            })
        })
        .collect();

    points.sort_by_key(|p| p.date);
    points.reverse();
    points.dedup_by_key(|p| p.date);
    points.reverse();
    Ok(points)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Uptrend,
    Downtrend,
    Sideways,
}

impl Trend {
    pub fn label(self, arabic: bool) -> &'static str {
        match (self, arabic) {
            (Trend::Uptrend, false) => "Uptrend",
            (Trend::Uptrend, true) => "اتجاه صاعد",
            (Trend::Downtrend, false) => "Downtrend",
            (Trend::Downtrend, true) => "اتجاه هابط",
            (Trend::Sideways, false) => "Sideways",
            (Trend::Sideways, true) => "اتجاه عرضي",
        }
    }
}

/// Indicator readings at the last bar. Each one is `None` until the series
/// is long enough to fill its window.
#[derive(Debug, Clone, PartialEq)]
pub struct TechnicalSnapshot {
    pub last_close: f64,
    pub rsi_14: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub ema_20: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_middle: Option<f64>,
    pub bollinger_lower: Option<f64>,
    pub roc_10: Option<f64>,
    pub support: Option<f64>,
    pub resistance: Option<f64>,
    pub trend: Trend,
}

impl TechnicalSnapshot {
    pub fn rsi_state(&self, arabic: bool) -> &'static str {
        match (self.rsi_14, arabic) {
            (Some(r), false) if r > 70.0 => "overbought",
            (Some(r), true) if r > 70.0 => "تشبع شرائي",
            (Some(r), false) if r < 30.0 => "oversold",
            (Some(r), true) if r < 30.0 => "تشبع بيعي",
            (_, false) => "neutral",
            (_, true) => "محايد",
        }
    }

    pub fn macd_bullish(&self) -> Option<bool> {
        Some(self.macd? > self.macd_signal?)
    }
}

const SWING_LOOKBACK: usize = 120;
const SWING_WING: usize = 2;

fn ta_err(e: ta::errors::TaError) -> AppError {
    AppError::Internal(format!("Indicator setup failed: {:?}", e))
}

/// Runs one indicator over `closes`, returning its reading at the last bar
/// once `warmup` bars have been seen.
fn last_reading<I, O>(mut indicator: I, closes: &[f64], warmup: usize) -> Option<O>
where
    I: Next<f64, Output = O>,
{
    let mut out = None;
    for &close in closes {
        out = Some(indicator.next(close));
    }
    if closes.len() >= warmup {
        out
    } else {
        None
    }
}

/// Rolling simple moving average aligned with `closes`; `None` until the
/// window fills. Used for overlay series on charts.
pub fn sma_series(closes: &[f64], period: usize) -> Result<Vec<Option<f64>>> {
    let mut sma = SimpleMovingAverage::new(period).map_err(ta_err)?;
    Ok(closes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let v = sma.next(c);
            (i + 1 >= period).then_some(v)
        })
        .collect())
}

pub fn compute_technicals(points: &[OhlcPoint]) -> Result<Option<TechnicalSnapshot>> {
    let Some(last) = points.last() else {
        return Ok(None);
    };
    let closes: Vec<f64> = points.iter().map(|p| p.close).collect();
    let last_close = last.close;

    let rsi_14 = last_reading(RelativeStrengthIndex::new(14).map_err(ta_err)?, &closes, 15);
    let sma_20 = last_reading(SimpleMovingAverage::new(20).map_err(ta_err)?, &closes, 20);
    let sma_50 = last_reading(SimpleMovingAverage::new(50).map_err(ta_err)?, &closes, 50);
    let sma_200 = last_reading(SimpleMovingAverage::new(200).map_err(ta_err)?, &closes, 200);
    let ema_20 = last_reading(ExponentialMovingAverage::new(20).map_err(ta_err)?, &closes, 20);
    let macd = last_reading(
        MovingAverageConvergenceDivergence::new(12, 26, 9).map_err(ta_err)?,
        &closes,
        35,
    );
    let bollinger = last_reading(BollingerBands::new(20, 2.0).map_err(ta_err)?, &closes, 20);
    let roc_10 = last_reading(RateOfChange::new(10).map_err(ta_err)?, &closes, 11);

    let (support, resistance) = support_resistance(points, last_close);

    let trend = match (sma_20, sma_50) {
        (Some(s20), Some(s50)) if last_close > s20 && s20 > s50 => Trend::Uptrend,
        (Some(s20), Some(s50)) if last_close < s20 && s20 < s50 => Trend::Downtrend,
        (Some(s20), None) if last_close > s20 * 1.02 => Trend::Uptrend,
        (Some(s20), None) if last_close < s20 * 0.98 => Trend::Downtrend,
        _ => Trend::Sideways,
    };

    Ok(Some(TechnicalSnapshot {
        last_close,
        rsi_14,
        sma_20,
        sma_50,
        sma_200,
        ema_20,
        macd: macd.as_ref().map(|m| m.macd),
        macd_signal: macd.as_ref().map(|m| m.signal),
        macd_histogram: macd.as_ref().map(|m| m.histogram),
        bollinger_upper: bollinger.as_ref().map(|b| b.upper),
        bollinger_middle: bollinger.as_ref().map(|b| b.average),
        bollinger_lower: bollinger.as_ref().map(|b| b.lower),
        roc_10,
        support,
        resistance,
        trend,
    }))
}

/// Nearest swing low below and swing high above the last close, within the
/// recent lookback. Falls back to the window's extremes.
pub fn support_resistance(points: &[OhlcPoint], last_close: f64) -> (Option<f64>, Option<f64>) {
    let window = &points[points.len().saturating_sub(SWING_LOOKBACK)..];
    let lows: Vec<f64> = window.iter().map(|p| p.low.unwrap_or(p.close)).collect();
    let highs: Vec<f64> = window.iter().map(|p| p.high.unwrap_or(p.close)).collect();

    let mut support: Option<f64> = None;
    let mut resistance: Option<f64> = None;
    if window.len() > SWING_WING * 2 {
        for i in SWING_WING..window.len() - SWING_WING {
            let around = i - SWING_WING..=i + SWING_WING;
            if around.clone().all(|j| lows[i] <= lows[j]) && lows[i] < last_close {
                support = Some(support.map_or(lows[i], |s: f64| s.max(lows[i])));
            }
            if around.clone().all(|j| highs[i] >= highs[j]) && highs[i] > last_close {
                resistance = Some(resistance.map_or(highs[i], |r: f64| r.min(highs[i])));
            }
        }
    }

    let support = support.or_else(|| lows.iter().copied().filter(|l| *l < last_close).reduce(f64::min));
    let resistance =
        resistance.or_else(|| highs.iter().copied().filter(|h| *h > last_close).reduce(f64::max));
    (support, resistance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::synthetic_ohlc;
    use serde_json::json;

    #[test]
    fn provider_symbols_carry_exchange_suffix() {
        assert_eq!(FinancialService::provider_symbol("comi", MarketCode::Egx), "COMI.CA");
        assert_eq!(FinancialService::provider_symbol("2222", MarketCode::Tdwl), "2222.SR");
        assert_eq!(FinancialService::provider_range(Range::SixMonths), "6mo");
    }

    #[test]
    fn url_template_is_filled() {
        let service = FinancialService::new(&ChatConfig::default());
        let url = service.url("TMGH", MarketCode::Egx, Range::ThreeMonths);
        assert!(url.contains("TMGH.CA"));
        assert!(url.contains("range=3mo"));
    }

    #[test]
    fn chart_payload_parses_sorted_and_skips_null_closes() {
        let data = json!({
            "chart": {"result": [{
                "timestamp": [1717200000, 1717027200, 1717113600],
                "indicators": {"quote": [{
                    "open": [10.0, 9.0, 9.5],
                    "high": [10.5, 9.2, 9.9],
                    "low": [9.8, 8.9, 9.4],
                    "close": [10.2, 9.1, null],
                    "volume": [1000, 900, 800]
                }]}
            }]}
        });
        let points = parse_chart(&data).unwrap();
        assert_eq!(points.len(), 2);
        assert!(points[0].date < points[1].date);
        assert_eq!(points[0].close, 9.1);
        assert_eq!(points[1].volume, Some(1000.0));
    }

    #[test]
    fn missing_result_is_an_external_error() {
        let err = parse_chart(&json!({"chart": {"result": null}})).unwrap_err();
        assert!(matches!(err, AppError::ExternalService(_)));
    }

    #[test]
    fn indicators_fill_on_long_history() {
        let points = synthetic_ohlc(80.0, 300);
        let t = compute_technicals(&points).unwrap().unwrap();
        let rsi = t.rsi_14.unwrap();
        assert!((0.0..=100.0).contains(&rsi));
        assert!(t.sma_20.is_some() && t.sma_50.is_some() && t.sma_200.is_some());
        assert!(t.macd.is_some() && t.macd_signal.is_some());
        let (upper, lower) = (t.bollinger_upper.unwrap(), t.bollinger_lower.unwrap());
        assert!(upper > lower);
    }

    #[test]
    fn short_history_leaves_slow_indicators_empty() {
        let points = synthetic_ohlc(58.0, 10);
        let t = compute_technicals(&points).unwrap().unwrap();
        assert!(t.rsi_14.is_none());
        assert!(t.sma_50.is_none());
        assert_eq!(t.trend, Trend::Sideways);
        assert!(compute_technicals(&[]).unwrap().is_none());
    }

    #[test]
    fn support_sits_below_and_resistance_above_the_close() {
        let points = synthetic_ohlc(40.0, 200);
        let last = points.last().unwrap().close;
        let (support, resistance) = support_resistance(&points, last);
        if let Some(s) = support {
            assert!(s < last);
        }
        if let Some(r) = resistance {
            assert!(r > last);
        }
        assert!(support.is_some() || resistance.is_some());
    }

    #[test]
    fn sma_series_aligns_with_input() {
        let closes = [1.0, 2.0, 3.0, 4.0];
        let s = sma_series(&closes, 2).unwrap();
        assert_eq!(s, vec![None, Some(1.5), Some(2.5), Some(3.5)]);
    }
}
