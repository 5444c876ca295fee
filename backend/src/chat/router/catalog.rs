//! Static intent catalog: example utterances per routable intent. Feeds the
//! semantic fallback index and the `/chat/intents` endpoint.

use crate::{chat::schema::Intent, models::IntentCatalogEntry};

pub fn examples(intent: Intent) -> &'static [&'static str] {
    use Intent::*;
    match intent {
        StockPrice => &["What is the price of COMI?", "How much is Aramco trading at?", "سعر السويدي كام؟"],
        StockSnapshot => &["Analyze GGRN", "Give me an overview of Fawry", "حلل سهم طلعت مصطفى"],
        StockMarketCap => &["Market cap of SWDY", "How big is Al Rajhi?", "القيمة السوقية للتجاري الدولي"],
        StockChart => &["Chart TMGH 3M", "Show me the price history of COMI", "شارت السويدي 6 شهور"],
        StockStat => &["Key stats for ETEL", "What is the beta of 2222?", "احصائيات سهم فوري"],
        StockVolume => &["Trading volume of FWRY today", "How many COMI shares traded?", "حجم التداول على أرامكو"],
        Stock52WeekRange => &["52 week high of SWDY", "Yearly range for 1120", "أعلى سعر في السنة لطلعت مصطفى"],
        FinancialsAnnual => &["Annual financials for COMI", "Show the annual report of SWDY", "القوائم المالية السنوية لأرامكو"],
        FinancialsQuarterly => &["Quarterly results for COMI", "Last quarter numbers of TMGH", "نتائج الربع الأخير للسويدي"],
        FinancialExplorer => &["Full financials for COMI with TTM", "Open the financial explorer for SWDY", "كل القوائم المالية لفوري"],
        IncomeStatement => &["Income statement of COMI", "Net income of Aramco", "قائمة الدخل للتجاري الدولي"],
        BalanceSheet => &["Balance sheet of SWDY", "Total assets of COMI", "الميزانية لطلعت مصطفى"],
        CashFlow => &["Cash flow of 2222", "Free cash flow for FWRY", "التدفقات النقدية للسويدي"],
        RevenueTrend => &["Revenue trend of SWDY", "How have COMI sales grown?", "الإيرادات بتاعة فوري"],
        Dividends => &["Dividends of COMI", "When does Aramco pay dividends?", "توزيعات الراجحي"],
        MetricEps => &["EPS of COMI", "Earnings per share for 2222", "ربحية السهم للسويدي"],
        MetricPe => &["PE ratio of COMI", "Price to earnings of SWDY", "مكرر ربحية أرامكو"],
        MetricPb => &["Price to book of COMI", "Book value of HRHO", "القيمة الدفترية للتجاري الدولي"],
        MetricRoe => &["ROE of COMI", "Return on equity for 1120", "العائد على حقوق الملكية لفوري"],
        MetricMargins => &["Profit margins of SWDY", "Net margin of COMI", "هامش ربح أرامكو"],
        MetricDebt => &["How much debt does TMGH have?", "Debt of SWDY", "مديونية طلعت مصطفى"],
        RatiosValuation => &["Valuation ratios for COMI", "EV/EBITDA of SWDY", "نسب التقييم لأرامكو"],
        RatiosProfitability => &["Profitability ratios of COMI", "How profitable is FWRY?", "نسب الربحية للسويدي"],
        RatiosLiquidity => &["Liquidity ratios for TMGH", "Current ratio of SWDY", "نسب السيولة لفوري"],
        RatiosLeverage => &["Leverage ratios of TMGH", "Debt to equity for COMI", "الرافعة المالية لطلعت مصطفى"],
        RatiosEfficiency => &["Efficiency ratios of SWDY", "Asset turnover of COMI", "نسب الكفاءة لأرامكو"],
        FairValue => &["Fair value of COMI", "Is SWDY undervalued?", "القيمة العادلة لسهم فوري"],
        DeepSafety => &["Is COMI safe?", "Z-score of TMGH", "هل السويدي آمن؟"],
        DeepValuation => &["Is Aramco cheap?", "Is FWRY expensive?", "هل فوري غالي؟"],
        DeepEfficiency => &["How efficient is COMI?", "ROCE of SWDY", "كفاءة إدارة طلعت مصطفى"],
        DeepGrowth => &["Is SWDY growing?", "Growth profile of FWRY", "نمو أرباح التجاري الدولي"],
        TopGainers => &["Top gainers today", "Which stocks are up today?", "الأكثر ارتفاعاً النهارده"],
        TopLosers => &["Top losers today", "Biggest drops in EGX", "الأكثر انخفاضاً"],
        MostActive => &["Most active stocks", "Highest volume today", "الأكثر تداولاً"],
        SectorStocks => &["Banking sector stocks", "Real estate stocks in EGX", "شركات قطاع البنوك"],
        SectorList => &["List all sectors", "Sector performance today", "أداء القطاعات"],
        DividendLeaders => &["Highest dividend yield stocks", "Dividend leaders in TDWL", "أعلى توزيعات"],
        ScreenerPe => &["Stocks with PE below 10", "Low PE stocks", "أسهم مكرر أقل من 8"],
        ScreenerDeepMetric => &["Highest ROE stocks", "Stocks with lowest debt", "أعلى عائد على حقوق الملكية"],
        ScreenerGrowth => &["Fastest growing companies", "Growth stocks", "الأسرع نمواً"],
        ScreenerSafety => &["Safest stocks", "Low risk stocks in EGX", "أكثر الأسهم أماناً"],
        ScreenerValue => &["Cheapest stocks", "Undervalued stocks", "أرخص الأسهم"],
        ScreenerIncome => &["Best income stocks", "Stocks for passive income", "أسهم الدخل"],
        LargestCompanies => &["Largest companies by market cap", "Blue chips in TDWL", "أكبر الشركات"],
        MarketSummary => &["Market summary", "How is the market today?", "ملخص السوق النهارده"],
        FundNav => &["NAV of Fawry money market fund", "Fund performance of Azimut gold", "سعر وثيقة صندوق فوري"],
        FundList => &["List mutual funds", "Which investment funds exist?", "صناديق الاستثمار"],
        FundMovers => &["Best performing funds", "Top funds today", "أفضل الصناديق"],
        Ownership => &["Who owns COMI?", "Major shareholders of SWDY", "هيكل الملكية لأرامكو"],
        News => &["Latest news on COMI", "Announcements for TMGH", "أخبار السويدي"],
        Earnings => &["Latest earnings of COMI", "Did SWDY profits rise?", "أرباح التجاري الدولي"],
        Agm => &["When is the COMI general assembly?", "AGM of SWDY", "الجمعية العمومية لفوري"],
        CorporateActions => &["Corporate actions for COMI", "Any stock split for SWDY?", "زيادة رأس مال طلعت مصطفى"],
        AnalystRatings => &["Analyst ratings for COMI", "What do analysts say about SWDY?", "توصيات المحللين لأرامكو"],
        TechnicalIndicators => &["Technical analysis of COMI", "RSI of SWDY", "تحليل فني لأرامكو"],
        TechnicalTrend => &["Trend of COMI", "Is SWDY in an uptrend?", "اتجاه سهم فوري"],
        SupportResistance => &["Support and resistance for COMI", "Key levels of TMGH", "مستويات الدعم والمقاومة للسويدي"],
        Momentum => &["Momentum of SWDY", "Is COMI overbought?", "زخم سهم أرامكو"],
        MovingAverages => &["Moving averages of COMI", "SMA 50 of SWDY", "المتوسطات المتحركة لفوري"],
        CompareStocks => &["Compare COMI vs SWDY", "Aramco versus SABIC", "قارن السويدي مع طلعت مصطفى"],
        Greeting => &["Hello", "Good morning", "السلام عليكم"],
        Identity => &["Who are you?", "What is your name?", "انت مين؟"],
        Mood => &["How are you?", "How are you doing today?", "اخبارك ايه؟"],
        Gratitude => &["Thanks!", "Thank you so much", "شكراً"],
        Goodbye => &["Bye", "See you later", "مع السلامة"],
        DefineTerm => &["What is P/E ratio?", "Define market cap", "يعني ايه توزيعات نقدية؟"],
        Help => &["Help", "How do I use this?", "ساعدني"],
        Capabilities => &["What can you do?", "What do you know?", "تقدر تعمل ايه؟"],
        ClarifySymbol | FollowUp | Unknown | Blocked | SystemError => &[],
    }
}

/// Every routable intent with its examples, in declaration order.
pub fn catalog() -> Vec<IntentCatalogEntry> {
    Intent::ALL
        .iter()
        .copied()
        .filter(|intent| !intent.is_system())
        .map(|intent| IntentCatalogEntry {
            intent: intent.as_str(),
            family: intent.family(),
            examples: examples(intent).to_vec(),
        })
        .collect()
}
