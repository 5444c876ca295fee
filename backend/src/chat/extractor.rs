//! Slot extraction over normalized text. Pure and independent of the routed
//! intent; the router and dispatcher decide which slots matter.

use super::{
    nicknames::NICKNAMES,
    normalizer::{extract_symbol_tokens, NormalizedText},
    resolver::is_stopword,
    router::keywords::{contains_phrase, padded},
    schema::{Condition, Direction, Entities, MarketCode, Range, StatementType},
};
use crate::repository::StatMetric;
use once_cell::sync::Lazy;
use regex::Regex;

static RANGE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(1d|1w|1m|3m|6m|1y|5y|max)\b").expect("valid range regex"));

static THRESHOLD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:\bpe\b|\bp/e\b|مضاعف|مكرر)\s*(?:ratio\s*|الربحيه\s*)?(below|under|less than|lower than|<|اقل من|تحت|above|over|more than|greater than|higher than|>|اكثر من|اعلي من|فوق)\s*(\d+(?:\.\d+)?)",
    )
    .expect("valid threshold regex")
});

static COMPARE_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\s)([\p{L}\d]{2,12})\s+(vs\.?|versus|and|و|مع|مقابل|against)\s+([\p{L}\d]{2,12})(?:\s|$)")
        .expect("valid compare regex")
});

static DEFINE_TERM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:please\s+)?(?:define|what is|what's|whats|what are|what does|meaning of|explain|ما هو|ما هي|ما معني|عرف|اشرح|يعني ايه)\s+(?:an?\s+|the\s+)?(.+?)(?:\s+mean)?$",
    )
    .expect("valid define regex")
});

/// Words after which a ticker-like token names the subject.
const SYMBOL_TRIGGERS: &[&str] = &[
    "analyze", "analyse", "analysis", "chart", "graph", "price", "quote", "about", "for", "of", "on",
    "show", "شارت", "سعر", "سهم", "حلل", "تحليل", "رسم",
];

/// Upper-case abbreviations that are never tickers.
const NON_TICKERS: &[&str] = &[
    "PE", "ROE", "ROA", "EGX", "TDWL", "TASI", "RSI", "MACD", "EPS", "NAV", "AGM", "TTM", "SMA", "EMA",
    "USD", "EGP", "SAR", "CEO", "GDP", "IPO", "ETF", "ROCE", "FCF", "YTD", "EBITDA", "PEG", "BUY", "SELL",
    "WHAT", "HOW", "THE", "TOP", "DAY", "WEEK", "YEAR", "MONTH", "SECTOR", "FUND", "FUNDS", "INDEX",
];

const METRIC_PHRASES: &[(&str, StatMetric)] = &[
    ("return on capital employed", StatMetric::Roce),
    ("free cash flow yield", StatMetric::FcfYield),
    ("return on equity", StatMetric::Roe),
    ("return on assets", StatMetric::Roa),
    ("العائد علي حقوق الملكيه", StatMetric::Roe),
    ("العائد علي الاصول", StatMetric::Roa),
    ("interest coverage", StatMetric::InterestCoverage),
    ("operating margin", StatMetric::OperatingMargin),
    ("earnings growth", StatMetric::EarningsGrowth),
    ("profit growth", StatMetric::EarningsGrowth),
    ("revenue growth", StatMetric::RevenueGrowth),
    ("sales growth", StatMetric::RevenueGrowth),
    ("earnings yield", StatMetric::EarningsYield),
    ("dividend yield", StatMetric::DividendYield),
    ("asset turnover", StatMetric::AssetTurnover),
    ("current ratio", StatMetric::CurrentRatio),
    ("debt to equity", StatMetric::DebtToEquity),
    ("price to book", StatMetric::PbRatio),
    ("gross margin", StatMetric::GrossMargin),
    ("net margin", StatMetric::NetMargin),
    ("fcf yield", StatMetric::FcfYield),
    ("ev/ebitda", StatMetric::EvEbitda),
    ("ev ebitda", StatMetric::EvEbitda),
    ("piotroski", StatMetric::FScore),
    ("f-score", StatMetric::FScore),
    ("f score", StatMetric::FScore),
    ("z-score", StatMetric::ZScore),
    ("z score", StatMetric::ZScore),
    ("altman", StatMetric::ZScore),
    ("هامش الربح", StatMetric::NetMargin),
    ("نمو الايرادات", StatMetric::RevenueGrowth),
    ("نمو الارباح", StatMetric::EarningsGrowth),
    ("المديونيه", StatMetric::DebtToEquity),
    ("leverage", StatMetric::DebtToEquity),
    ("margin", StatMetric::NetMargin),
    ("هامش", StatMetric::NetMargin),
    ("debt", StatMetric::DebtToEquity),
    ("ديون", StatMetric::DebtToEquity),
    ("roce", StatMetric::Roce),
    ("roe", StatMetric::Roe),
    ("roa", StatMetric::Roa),
    ("peg", StatMetric::PegRatio),
    ("p/b", StatMetric::PbRatio),
    ("pb", StatMetric::PbRatio),
    ("p/e", StatMetric::PeRatio),
    ("pe", StatMetric::PeRatio),
];

const ASCENDING_WORDS: &[&str] = &[
    "cheap", "cheapest", "low", "lowest", "least", "undervalued", "smallest", "ارخص", "اقل", "منخفض", "رخيصه",
];

const SECTORS: &[(&str, &str)] = &[
    ("real estate", "Real Estate"),
    ("العقارات", "Real Estate"),
    ("عقارات", "Real Estate"),
    ("banks", "Financial Services"),
    ("banking", "Financial Services"),
    ("financial services", "Financial Services"),
    ("البنوك", "Financial Services"),
    ("بنوك", "Financial Services"),
    ("industrials", "Industrials"),
    ("industrial", "Industrials"),
    ("الصناعه", "Industrials"),
    ("technology", "Technology"),
    ("tech", "Technology"),
    ("التكنولوجيا", "Technology"),
    ("energy", "Energy"),
    ("oil", "Energy"),
    ("الطاقه", "Energy"),
    ("البترول", "Energy"),
    ("telecom", "Communication Services"),
    ("الاتصالات", "Communication Services"),
    ("materials", "Basic Materials"),
    ("chemicals", "Basic Materials"),
    ("fertilizers", "Basic Materials"),
    ("الاسمده", "Basic Materials"),
    ("الكيماويات", "Basic Materials"),
    ("consumer", "Consumer Defensive"),
    ("food", "Consumer Defensive"),
    ("الاغذيه", "Consumer Defensive"),
    ("healthcare", "Healthcare"),
    ("pharma", "Healthcare"),
    ("الادويه", "Healthcare"),
];

const MARKETS: &[(&str, MarketCode)] = &[
    ("egx", MarketCode::Egx),
    ("egypt", MarketCode::Egx),
    ("egyptian", MarketCode::Egx),
    ("مصر", MarketCode::Egx),
    ("المصريه", MarketCode::Egx),
    ("tdwl", MarketCode::Tdwl),
    ("tasi", MarketCode::Tdwl),
    ("tadawul", MarketCode::Tdwl),
    ("saudi", MarketCode::Tdwl),
    ("ksa", MarketCode::Tdwl),
    ("السعوديه", MarketCode::Tdwl),
    ("السعودي", MarketCode::Tdwl),
];

fn find_range(normalized: &str, padded: &str) -> Option<Range> {
    if let Some(m) = RANGE_TOKEN.captures(normalized) {
        return Range::from_tag(&m[1].to_uppercase());
    }
    let phrases: &[(&str, Range)] = &[
        ("all time", Range::Max),
        ("5 years", Range::FiveYears),
        ("five years", Range::FiveYears),
        ("1 year", Range::OneYear),
        ("one year", Range::OneYear),
        ("past year", Range::OneYear),
        ("last year", Range::OneYear),
        ("6 months", Range::SixMonths),
        ("six months", Range::SixMonths),
        ("3 months", Range::ThreeMonths),
        ("three months", Range::ThreeMonths),
        ("1 month", Range::OneMonth),
        ("last month", Range::OneMonth),
        ("1 week", Range::OneWeek),
        ("last week", Range::OneWeek),
        ("intraday", Range::OneDay),
        ("من البدايه", Range::Max),
        ("كل الفتره", Range::Max),
        ("5 سنين", Range::FiveYears),
        ("5 سنوات", Range::FiveYears),
        ("سنه", Range::OneYear),
        ("السنه", Range::OneYear),
        ("6 شهور", Range::SixMonths),
        ("سته شهور", Range::SixMonths),
        ("3 شهور", Range::ThreeMonths),
        ("تلات شهور", Range::ThreeMonths),
        ("ثلاثه اشهر", Range::ThreeMonths),
        ("شهر", Range::OneMonth),
        ("اسبوع", Range::OneWeek),
    ];
    phrases
        .iter()
        .find(|(phrase, _)| contains_phrase(padded, phrase))
        .map(|(_, range)| *range)
}

fn find_threshold(normalized: &str, entities: &mut Entities) {
    let Some(caps) = THRESHOLD.captures(normalized) else { return };
    let Ok(value) = caps[2].parse::<f64>() else { return };
    let condition = match &caps[1] {
        "above" | "over" | "more than" | "greater than" | "higher than" | ">" | "اكثر من" | "اعلي من" | "فوق" => {
            Condition::Above
        }
        _ => Condition::Below,
    };
    entities.metric = Some(StatMetric::PeRatio.column().to_string());
    entities.condition = Some(condition);
    entities.threshold = Some(value);
}

fn find_compare_pair(normalized: &str, padded: &str) -> Option<[String; 2]> {
    let explicit = ["compare", "comparison", "قارن", "مقارنه", "vs", "vs.", "versus", "مقابل", "against"]
        .iter()
        .any(|w| contains_phrase(padded, w));
    if !explicit {
        return None;
    }
    let text = normalized
        .trim_start_matches("compare ")
        .trim_start_matches("قارن ")
        .trim_start_matches("مقارنه ");
    let caps = COMPARE_PAIR.captures(text)?;
    let (left, right) = (&caps[1], &caps[3]);
    if is_stopword(left) || is_stopword(right) || left == right {
        return None;
    }
    Some([left.to_uppercase(), right.to_uppercase()])
}

fn find_statement_type(padded: &str) -> Option<StatementType> {
    let table: &[(&[&str], StatementType)] = &[
        (&["cash flow", "cashflow", "التدفق النقدي", "التدفقات النقديه"], StatementType::Cashflow),
        (&["balance sheet", "assets", "liabilities", "الميزانيه", "الاصول"], StatementType::Balance),
        (&["income statement", "income", "revenue", "revenues", "profit", "قائمه الدخل", "الايرادات", "الارباح"], StatementType::Income),
    ];
    table
        .iter()
        .find(|(words, _)| words.iter().any(|w| contains_phrase(padded, w)))
        .map(|(_, kind)| *kind)
}

fn find_metric(padded: &str) -> Option<StatMetric> {
    METRIC_PHRASES
        .iter()
        .find(|(phrase, _)| contains_phrase(padded, phrase))
        .map(|(_, metric)| *metric)
}

fn find_direction(padded: &str) -> Option<Direction> {
    if ASCENDING_WORDS.iter().any(|w| contains_phrase(padded, w)) {
        Some(Direction::Asc)
    } else if ["highest", "best", "top", "most", "largest", "اعلي", "افضل", "اكبر"]
        .iter()
        .any(|w| contains_phrase(padded, w))
    {
        Some(Direction::Desc)
    } else {
        None
    }
}

fn find_sector(padded: &str) -> Option<String> {
    SECTORS
        .iter()
        .find(|(phrase, _)| contains_phrase(padded, phrase))
        .map(|(_, sector)| sector.to_string())
}

fn find_market(padded: &str) -> Option<MarketCode> {
    MARKETS
        .iter()
        .find(|(phrase, _)| contains_phrase(padded, phrase))
        .map(|(_, market)| *market)
}

fn find_term(normalized: &str) -> Option<String> {
    let text = normalized.trim_end_matches(['?', '؟', '.', '!']).trim();
    if let Some(caps) = DEFINE_TERM.captures(text) {
        let term = caps[1].trim();
        return (!term.is_empty()).then(|| term.to_string());
    }
    // "<term> يعني ايه"
    text.strip_suffix("يعني ايه")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn is_ticker_like(token: &str) -> bool {
    let len = token.chars().count();
    let letters = (3..=6).contains(&len) && token.chars().all(|c| c.is_ascii_alphabetic());
    let digits = len == 4 && token.chars().all(|c| c.is_ascii_digit());
    (letters || digits) && !is_stopword(token) && !NON_TICKERS.contains(&token.to_uppercase().as_str())
}

fn raw_tokens(raw: &str) -> Vec<String> {
    raw.split(|c: char| c.is_whitespace() || matches!(c, '?' | '!' | ',' | '.' | '؟' | '،' | ':' | ';' | '"' | '(' | ')'))
        .filter(|t| !t.is_empty())
        .map(|t| crate::chat::normalizer::normalize(t))
        .collect()
}

/// Symbol rules, in order: trigger word followed by a ticker-like token,
/// a lone ticker, an upper-case or four-digit token anywhere, a curated
/// Arabic company name.
fn find_symbol(text: &NormalizedText) -> Option<String> {
    let tokens = raw_tokens(&text.raw);

    for (i, token) in tokens.iter().enumerate() {
        if !SYMBOL_TRIGGERS.contains(&token.as_str()) {
            continue;
        }
        if let Some(next) = tokens[i + 1..].iter().find(|t| !is_stopword(t) || is_ticker_like(t)) {
            if is_ticker_like(next) {
                return Some(next.to_uppercase());
            }
        }
    }

    if let [only] = tokens.as_slice() {
        let len = only.chars().count();
        if (3..=5).contains(&len) && is_ticker_like(only) {
            return Some(only.to_uppercase());
        }
    }

    if let Some(token) = extract_symbol_tokens(&text.raw)
        .into_iter()
        .find(|t| !NON_TICKERS.contains(&t.as_str()))
    {
        return Some(token);
    }

    NICKNAMES
        .find_arabic_name(&text.normalized)
        .map(|(name, _)| name.to_string())
}

pub fn extract(text: &NormalizedText) -> Entities {
    let normalized = text.normalized.as_str();
    let padded = padded(normalized);
    let mut entities = Entities {
        range: find_range(normalized, &padded),
        compare_symbols: find_compare_pair(normalized, &padded),
        statement_type: find_statement_type(&padded),
        sector: find_sector(&padded),
        market_code: find_market(&padded),
        term: find_term(normalized),
        ..Entities::default()
    };

    find_threshold(normalized, &mut entities);
    if entities.metric.is_none() {
        entities.metric = find_metric(&padded).map(|m| m.column().to_string());
    }
    entities.direction = find_direction(&padded).or_else(|| entities.metric.as_ref().map(|_| Direction::Desc));

    entities.symbol = match &entities.compare_symbols {
        Some([first, _]) => Some(first.clone()),
        None => find_symbol(text),
    };
    entities
}
