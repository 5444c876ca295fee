//! Weighted bilingual keyword packs, one per routable intent.

use crate::chat::{normalizer::normalize, schema::Intent};
use once_cell::sync::Lazy;

/// English keywords longer than this count in full; shorter ones are damped.
const EN_LENGTH_THRESHOLD: usize = 5;
const AR_LENGTH_THRESHOLD: usize = 3;
const SHORT_KEYWORD_FACTOR: f64 = 0.7;

pub struct KeywordPack {
    pub intent: Intent,
    pub weight: f64,
    pub english: Vec<String>,
    pub arabic: Vec<String>,
}

type RawPack = (Intent, f64, &'static [&'static str], &'static [&'static str]);

const RAW_PACKS: &[RawPack] = &[
    (Intent::StockPrice, 2.0,
        &["price", "quote", "trading at", "how much is", "share price", "last price", "cost"],
        &["سعر", "بكام", "كام سعر", "سعره", "وصل كام"]),
    (Intent::StockSnapshot, 1.8,
        &["snapshot", "overview", "summary of", "how is", "doing", "performance", "analyze", "analysis"],
        &["ملخص", "اداء", "عامل ايه", "حلل", "تحليل", "نظره عامه"]),
    (Intent::StockMarketCap, 2.2,
        &["market cap", "market capitalization", "company size", "worth", "valuation size"],
        &["القيمه السوقيه", "راس المال السوقي", "حجم الشركه"]),
    (Intent::StockChart, 2.2,
        &["chart", "graph", "plot", "candles", "candlestick", "price history"],
        &["شارت", "رسم بياني", "الرسم", "منحني", "تاريخ السعر"]),
    (Intent::StockStat, 1.8,
        &["beta", "statistics", "stats", "key stats"],
        &["احصائيات", "بيتا", "الاحصائيات"]),
    (Intent::StockVolume, 2.0,
        &["volume", "traded shares", "turnover today", "liquidity today"],
        &["حجم التداول", "كميه التداول", "الكميه"]),
    (Intent::Stock52WeekRange, 2.2,
        &["52 week", "52w", "52-week", "year high", "year low", "yearly range"],
        &["52 اسبوع", "اعلي سعر في السنه", "ادني سعر في السنه", "المدي السنوي"]),
    (Intent::FinancialsAnnual, 2.0,
        &["annual financials", "annual report", "yearly results", "annual results", "financials"],
        &["القوائم الماليه", "النتائج السنويه", "التقرير السنوي", "الميزانيه السنويه"]),
    (Intent::FinancialsQuarterly, 2.2,
        &["quarterly", "quarter results", "q1", "q2", "q3", "q4", "last quarter"],
        &["ربع سنوي", "الربع", "نتائج الربع", "ربعي"]),
    (Intent::FinancialExplorer, 2.2,
        &["financial explorer", "all financials", "full financials", "ttm", "trailing twelve"],
        &["كل القوائم", "المستكشف المالي", "اخر 12 شهر"]),
    (Intent::IncomeStatement, 2.2,
        &["income statement", "profit and loss", "p&l", "net income", "revenue and profit"],
        &["قائمه الدخل", "الارباح والخسائر", "صافي الربح"]),
    (Intent::BalanceSheet, 2.2,
        &["balance sheet", "assets", "liabilities", "equity position"],
        &["الميزانيه", "المركز المالي", "الاصول", "الالتزامات"]),
    (Intent::CashFlow, 2.2,
        &["cash flow", "cashflow", "free cash flow", "operating cash"],
        &["التدفق النقدي", "التدفقات النقديه", "الكاش"]),
    (Intent::RevenueTrend, 2.0,
        &["revenue trend", "revenue growth", "sales trend", "revenue history", "revenues", "sales"],
        &["الايرادات", "المبيعات", "نمو الايرادات"]),
    (Intent::Dividends, 2.0,
        &["dividend", "dividends", "payout", "distribution", "coupon"],
        &["توزيعات", "كوبون", "ارباح موزعه", "التوزيع"]),
    (Intent::MetricEps, 2.2,
        &["eps", "earnings per share"],
        &["ربحيه السهم", "ربح السهم"]),
    (Intent::MetricPe, 2.2,
        &["pe", "p/e", "pe ratio", "price to earnings", "multiple"],
        &["مكرر الربحيه", "مضاعف الربحيه", "مضاعف"]),
    (Intent::MetricPb, 2.2,
        &["pb", "p/b", "price to book", "book value"],
        &["القيمه الدفتريه", "مضاعف القيمه الدفتريه"]),
    (Intent::MetricRoe, 2.2,
        &["roe", "return on equity"],
        &["العائد علي حقوق الملكيه"]),
    (Intent::MetricMargins, 2.0,
        &["margin", "margins", "profit margin", "net margin", "gross margin"],
        &["هامش", "هامش الربح", "الهوامش"]),
    (Intent::MetricDebt, 2.0,
        &["debt", "leverage", "borrowing", "loans"],
        &["ديون", "المديونيه", "القروض"]),
    (Intent::RatiosValuation, 1.8,
        &["valuation ratios", "valuation multiples", "ev/ebitda"],
        &["نسب التقييم", "مضاعفات التقييم"]),
    (Intent::RatiosProfitability, 1.8,
        &["profitability ratios", "profitability", "returns ratios"],
        &["نسب الربحيه", "الربحيه"]),
    (Intent::RatiosLiquidity, 1.8,
        &["liquidity ratios", "current ratio", "quick ratio", "liquidity"],
        &["نسب السيوله", "السيوله", "نسبه التداول"]),
    (Intent::RatiosLeverage, 1.8,
        &["leverage ratios", "debt to equity", "gearing", "interest coverage"],
        &["نسب الرافعه", "الرافعه الماليه"]),
    (Intent::RatiosEfficiency, 1.8,
        &["efficiency ratios", "turnover ratios", "asset turnover"],
        &["نسب الكفاءه", "دوران الاصول"]),
    (Intent::FairValue, 2.2,
        &["fair value", "intrinsic value", "target price", "undervalued", "overvalued", "graham"],
        &["القيمه العادله", "السعر المستهدف", "القيمه الحقيقيه"]),
    (Intent::DeepSafety, 2.0,
        &["safe", "safety", "risky", "risk", "bankrupt", "bankruptcy", "z-score", "z score", "financial health", "solvency"],
        &["امان", "امن", "مخاطر", "افلاس", "الملاءه", "صحه ماليه"]),
    (Intent::DeepValuation, 2.0,
        &["cheap", "expensive", "deep valuation", "valuation analysis", "valued"],
        &["رخيص", "غالي", "تقييم"]),
    (Intent::DeepEfficiency, 2.0,
        &["efficient", "efficiency", "roce", "management quality", "capital efficiency"],
        &["كفاءه", "كفاءه الاداره"]),
    (Intent::DeepGrowth, 2.0,
        &["growth", "growing", "grow", "expansion"],
        &["نمو", "بينمو", "التوسع"]),
    (Intent::TopGainers, 2.4,
        &["top gainers", "gainers", "biggest gains", "best performers", "rising stocks", "up today"],
        &["الاكثر ارتفاعا", "الاكثر صعودا", "الرابحين", "طالعه"]),
    (Intent::TopLosers, 2.4,
        &["top losers", "losers", "biggest drops", "worst performers", "falling stocks", "down today"],
        &["الاكثر انخفاضا", "الاكثر هبوطا", "الخاسرين", "نازله"]),
    (Intent::MostActive, 2.4,
        &["most active", "most traded", "highest volume", "busiest"],
        &["الاكثر نشاطا", "الاكثر تداولا"]),
    (Intent::SectorStocks, 2.0,
        &["sector", "banks", "banking stocks", "real estate stocks", "industry stocks"],
        &["قطاع", "البنوك", "العقارات", "شركات قطاع"]),
    (Intent::SectorList, 2.2,
        &["sectors", "list sectors", "all sectors", "sector performance"],
        &["القطاعات", "كل القطاعات", "اداء القطاعات"]),
    (Intent::DividendLeaders, 2.2,
        &["dividend leaders", "highest dividend", "best dividend", "top dividend", "high yield stocks"],
        &["اعلي توزيعات", "اعلي عائد توزيعات", "افضل توزيعات"]),
    (Intent::ScreenerPe, 2.2,
        &["pe below", "pe under", "p/e below", "p/e under", "low pe", "pe less than"],
        &["مكرر اقل من", "مضاعف اقل من", "مكرر منخفض"]),
    (Intent::ScreenerDeepMetric, 2.0,
        &["highest roe", "best roe", "highest margin", "lowest debt", "best roce", "highest fcf", "rank by"],
        &["اعلي عائد", "اقل ديون", "ترتيب حسب"]),
    (Intent::ScreenerGrowth, 2.2,
        &["growth stocks", "fastest growing", "highest growth"],
        &["اسهم النمو", "الاسرع نموا"]),
    (Intent::ScreenerSafety, 2.2,
        &["safest stocks", "safe stocks", "low risk stocks", "defensive stocks"],
        &["اكثر الاسهم امانا", "اسهم امنه"]),
    (Intent::ScreenerValue, 2.2,
        &["value stocks", "cheapest stocks", "undervalued stocks", "bargains"],
        &["اسهم رخيصه", "ارخص الاسهم", "اسهم القيمه"]),
    (Intent::ScreenerIncome, 2.2,
        &["income stocks", "yield stocks", "passive income"],
        &["اسهم الدخل", "دخل ثابت"]),
    (Intent::LargestCompanies, 2.2,
        &["largest companies", "biggest companies", "largest market cap", "blue chips"],
        &["اكبر الشركات", "الشركات الكبري"]),
    (Intent::MarketSummary, 2.2,
        &["market summary", "market today", "market overview", "how is the market", "index"],
        &["ملخص السوق", "السوق النهارده", "البورصه النهارده", "المؤشر"]),
    (Intent::FundNav, 2.2,
        &["nav", "net asset value", "fund price", "fund performance"],
        &["صافي قيمه الاصول", "سعر الوثيقه", "اداء الصندوق"]),
    (Intent::FundList, 2.2,
        &["funds", "mutual funds", "list funds", "investment funds"],
        &["الصناديق", "صناديق الاستثمار"]),
    (Intent::FundMovers, 2.2,
        &["fund movers", "best funds", "top funds", "worst funds"],
        &["افضل الصناديق", "اسوا الصناديق"]),
    (Intent::Ownership, 2.2,
        &["ownership", "shareholders", "who owns", "major holders", "stake"],
        &["المساهمين", "هيكل الملكيه", "مين مالك", "الملاك"]),
    (Intent::News, 2.0,
        &["news", "announcements", "headlines", "disclosures"],
        &["اخبار", "الاخبار", "افصاحات"]),
    (Intent::Earnings, 2.0,
        &["earnings", "results", "profits", "earnings report"],
        &["الارباح", "نتائج الاعمال"]),
    (Intent::Agm, 2.2,
        &["agm", "general assembly", "general meeting", "shareholder meeting"],
        &["الجمعيه العموميه", "جمعيه عموميه"]),
    (Intent::CorporateActions, 2.0,
        &["corporate actions", "stock split", "rights issue", "bonus shares", "capital increase"],
        &["زياده راس المال", "اسهم مجانيه", "تجزئه"]),
    (Intent::AnalystRatings, 2.2,
        &["analyst", "analysts", "rating", "ratings", "recommendation", "consensus"],
        &["المحللين", "تقييم المحللين", "توصيات"]),
    (Intent::TechnicalIndicators, 2.2,
        &["technical", "indicators", "rsi", "macd", "bollinger"],
        &["فني", "مؤشرات فنيه", "تحليل فني"]),
    (Intent::TechnicalTrend, 2.0,
        &["trend", "uptrend", "downtrend", "direction"],
        &["الاتجاه", "الترند", "اتجاه"]),
    (Intent::SupportResistance, 2.2,
        &["support", "resistance", "levels", "support level"],
        &["دعم", "مقاومه", "مستويات"]),
    (Intent::Momentum, 2.0,
        &["momentum", "overbought", "oversold", "rate of change"],
        &["زخم", "تشبع شراء", "تشبع بيع"]),
    (Intent::MovingAverages, 2.2,
        &["moving average", "moving averages", "sma", "ema", "ma50", "ma200"],
        &["المتوسط المتحرك", "المتوسطات المتحركه"]),
    (Intent::CompareStocks, 2.4,
        &["compare", "comparison", "versus", "vs", "better than"],
        &["قارن", "مقارنه", "مقابل", "افضل من"]),
    (Intent::Greeting, 2.4,
        &["hi", "hello", "hey", "good morning", "good evening", "salam"],
        &["مرحبا", "اهلا", "السلام عليكم", "صباح الخير", "مساء الخير", "ازيك"]),
    (Intent::Identity, 2.4,
        &["who are you", "your name", "what are you", "are you a bot"],
        &["انت مين", "مين انت", "اسمك ايه"]),
    (Intent::Mood, 2.4,
        &["how are you", "how are you doing", "how do you feel"],
        &["انت عامل ايه", "اخبارك ايه", "كيف حالك"]),
    (Intent::Gratitude, 2.4,
        &["thanks", "thank you", "thx", "appreciate"],
        &["شكرا", "متشكر", "تسلم"]),
    (Intent::Goodbye, 2.4,
        &["bye", "goodbye", "see you", "later"],
        &["مع السلامه", "باي", "سلام"]),
    (Intent::DefineTerm, 2.2,
        &["define", "meaning of", "what does", "what is a", "explain"],
        &["عرف", "يعني ايه", "معني", "ما هو", "ما هي", "اشرح"]),
    (Intent::Help, 2.4,
        &["help", "how to use", "how do i", "examples"],
        &["مساعده", "ساعدني", "ازاي استخدم"]),
    (Intent::Capabilities, 2.4,
        &["what can you do", "capabilities", "features", "what do you know"],
        &["تقدر تعمل ايه", "بتعرف ايه", "امكانياتك"]),
];

pub static KEYWORD_PACKS: Lazy<Vec<KeywordPack>> = Lazy::new(|| {
    RAW_PACKS
        .iter()
        .map(|(intent, weight, english, arabic)| KeywordPack {
            intent: *intent,
            weight: *weight,
            english: english.iter().map(|k| k.to_lowercase()).collect(),
            arabic: arabic.iter().map(|k| normalize(k)).collect(),
        })
        .collect()
});

fn length_factor(keyword: &str, threshold: usize) -> f64 {
    if keyword.chars().count() > threshold {
        1.0
    } else {
        SHORT_KEYWORD_FACTOR
    }
}

/// Pads a normalized message with spaces and blanks out punctuation so
/// keywords match on whole words.
pub fn padded(normalized: &str) -> String {
    let cleaned: String = normalized
        .chars()
        .map(|c| match c {
            '?' | '!' | ',' | '.' | ';' | ':' | '"' | '(' | ')' | '؟' | '،' | '؛' => ' ',
            other => other,
        })
        .collect();
    format!(" {} ", cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
}

pub fn contains_phrase(padded: &str, phrase: &str) -> bool {
    padded.contains(&format!(" {} ", phrase))
}

impl KeywordPack {
    pub fn score(&self, padded: &str) -> f64 {
        let en: f64 = self
            .english
            .iter()
            .filter(|k| contains_phrase(padded, k))
            .map(|k| self.weight * length_factor(k, EN_LENGTH_THRESHOLD))
            .sum();
        let ar: f64 = self
            .arabic
            .iter()
            .filter(|k| contains_phrase(padded, k))
            .map(|k| self.weight * length_factor(k, AR_LENGTH_THRESHOLD))
            .sum();
        en + ar
    }
}

/// Best-scoring intent and its confidence, `min(score / 3, 1)`.
pub fn score_intents(normalized: &str) -> Option<(Intent, f64)> {
    let padded = padded(normalized);
    KEYWORD_PACKS
        .iter()
        .map(|pack| (pack.intent, pack.score(&padded)))
        .filter(|(_, score)| *score > 0.0)
        .fold(None, |best: Option<(Intent, f64)>, (intent, score)| match best {
            Some((_, top)) if top >= score => best,
            _ => Some((intent, score)),
        })
        .map(|(intent, score)| (intent, (score / 3.0).min(1.0)))
}

/// Whether any keyword of an intent other than `except` appears.
pub fn has_keywords_besides(normalized: &str, except: &[Intent]) -> bool {
    let padded = padded(normalized);
    KEYWORD_PACKS
        .iter()
        .filter(|pack| !except.contains(&pack.intent))
        .any(|pack| pack.score(&padded) > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_keywords_are_damped() {
        let (intent, confidence) = score_intents("is comi safe?").unwrap();
        assert_eq!(intent, Intent::DeepSafety);
        assert!((confidence - 2.0 * 0.7 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn arabic_keywords_match_normalized_text() {
        let (intent, _) = score_intents(&normalize("أخبار البنك التجاري")).unwrap();
        assert_eq!(intent, Intent::News);
    }

    #[test]
    fn keywords_match_whole_words_only() {
        // "pe" inside "open" must not count
        assert!(score_intents("open sesame").is_none());
    }

    #[test]
    fn confidence_is_capped_at_one() {
        let (_, confidence) = score_intents("income statement net income profit and loss").unwrap();
        assert_eq!(confidence, 1.0);
    }
}
