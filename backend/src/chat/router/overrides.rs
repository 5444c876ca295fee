//! Ordered phrase probes that pin an intent before keyword scoring.

use super::keywords::{contains_phrase, has_keywords_besides};
use crate::chat::{glossary, nicknames::NICKNAMES, schema::{Entities, Intent}};

fn any(padded: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| contains_phrase(padded, p))
}

const DEFINE_VERBS: &[&str] = &["define", "meaning of", "what does", "عرف", "يعني ايه", "معني", "اشرح"];

/// First matching probe wins; the order encodes precedence (market cap
/// before price, compare before everything).
pub fn detect(normalized: &str, padded: &str, entities: &Entities) -> Option<Intent> {
    let has_symbol = entities.symbol.is_some();

    if entities.compare_symbols.is_some() {
        return Some(Intent::CompareStocks);
    }

    if !has_symbol {
        if let Some(term) = &entities.term {
            if glossary::lookup(term).is_some() || any(padded, DEFINE_VERBS) {
                return Some(Intent::DefineTerm);
            }
        }
    }

    let annual = any(padded, &["annual", "yearly", "سنويه", "السنويه", "سنوي"]);
    let statements = any(
        padded,
        &["financials", "financial statements", "results", "report", "statements", "القوائم", "النتائج", "التقرير", "القوائم الماليه"],
    );
    if annual && statements {
        return Some(Intent::FinancialsAnnual);
    }
    if any(padded, &["quarterly", "last quarter", "quarter results", "ربع سنوي", "الربع", "نتائج الربع"]) {
        return Some(Intent::FinancialsQuarterly);
    }
    if any(padded, &["market cap", "market capitalization", "company size", "القيمه السوقيه", "راس المال السوقي"]) {
        return Some(Intent::StockMarketCap);
    }
    if any(padded, &["top gainers", "gainers", "biggest gainers", "الاكثر ارتفاعا", "الاكثر صعودا"]) {
        return Some(Intent::TopGainers);
    }
    if any(padded, &["top losers", "losers", "biggest losers", "الاكثر انخفاضا", "الاكثر هبوطا"]) {
        return Some(Intent::TopLosers);
    }
    if any(padded, &["most active", "most traded", "الاكثر نشاطا", "الاكثر تداولا"]) {
        return Some(Intent::MostActive);
    }
    if !has_symbol
        && any(padded, &["dividend leaders", "highest dividend", "top dividend", "best dividend", "اعلي توزيعات", "افضل توزيعات"])
    {
        return Some(Intent::DividendLeaders);
    }
    if !has_symbol
        && entities.sector.is_some()
        && any(padded, &["sector", "stocks", "companies", "قطاع", "اسهم", "شركات"])
    {
        return Some(Intent::SectorStocks);
    }
    if any(padded, &["who owns", "ownership", "shareholders", "major holders", "المساهمين", "هيكل الملكيه", "الملاك"]) {
        return Some(Intent::Ownership);
    }
    if any(padded, &["support", "resistance", "دعم", "مقاومه", "الدعم والمقاومه"]) {
        return Some(Intent::SupportResistance);
    }
    if any(padded, &["technical analysis", "technicals", "rsi", "macd", "تحليل فني", "مؤشرات فنيه"]) {
        return Some(Intent::TechnicalIndicators);
    }
    if has_symbol && any(padded, &["chart", "graph", "شارت", "رسم بياني"]) {
        return Some(Intent::StockChart);
    }
    if has_symbol && any(padded, &["analyze", "analyse", "analysis", "حلل", "تحليل"]) {
        return Some(Intent::StockSnapshot);
    }
    if any(padded, &["price", "quote", "trading at", "سعر", "بكام"])
        && !any(padded, &["earnings", "book", "target", "fair", "المستهدف", "الدفتريه", "العادله"])
    {
        return Some(Intent::StockPrice);
    }
    if NICKNAMES.find_arabic_name(normalized).is_some() && !has_keywords_besides(normalized, &[Intent::StockPrice]) {
        return Some(Intent::StockPrice);
    }
    if has_symbol && normalized.split_whitespace().count() == 1 {
        return Some(Intent::StockSnapshot);
    }
    None
}
