//! Built-in bilingual glossary behind `DEFINE_TERM`.

use super::normalizer::normalize;
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub struct GlossaryEntry {
    pub term_en: &'static str,
    pub term_ar: &'static str,
    pub definition_en: &'static str,
    pub definition_ar: &'static str,
    aliases: &'static [&'static str],
}

static ENTRIES: &[GlossaryEntry] = &[
    GlossaryEntry {
        term_en: "P/E Ratio",
        term_ar: "مكرر الربحية",
        definition_en: "Share price divided by earnings per share. It shows how many years of current profit the market is paying for.",
        definition_ar: "سعر السهم مقسوماً على ربحية السهم، ويوضح كم سنة من الأرباح الحالية يدفعها السوق.",
        aliases: &["pe", "p/e", "pe ratio", "p/e ratio", "price to earnings", "price earnings", "مكرر الربحيه", "مضاعف الربحيه", "مكرر"],
    },
    GlossaryEntry {
        term_en: "Market Capitalization",
        term_ar: "القيمة السوقية",
        definition_en: "Share price multiplied by shares outstanding: what the market values the whole company at.",
        definition_ar: "سعر السهم مضروباً في عدد الأسهم القائمة، أي قيمة الشركة بالكامل في السوق.",
        aliases: &["market cap", "market capitalization", "market capitalisation", "القيمه السوقيه", "راس المال السوقي"],
    },
    GlossaryEntry {
        term_en: "Earnings per Share",
        term_ar: "ربحية السهم",
        definition_en: "Net income attributable to shareholders divided by the number of shares.",
        definition_ar: "صافي الربح العائد للمساهمين مقسوماً على عدد الأسهم.",
        aliases: &["eps", "earnings per share", "ربحيه السهم", "ربح السهم"],
    },
    GlossaryEntry {
        term_en: "Dividend Yield",
        term_ar: "عائد التوزيعات",
        definition_en: "Annual cash dividend per share divided by the share price, expressed as a percentage.",
        definition_ar: "التوزيع النقدي السنوي للسهم مقسوماً على سعره، كنسبة مئوية.",
        aliases: &["dividend yield", "yield", "عائد التوزيعات", "العائد", "التوزيعات النقديه"],
    },
    GlossaryEntry {
        term_en: "Return on Equity",
        term_ar: "العائد على حقوق الملكية",
        definition_en: "Net income divided by shareholders' equity. Measures how much profit each unit of owner capital produces.",
        definition_ar: "صافي الربح مقسوماً على حقوق المساهمين، ويقيس الربح الناتج عن كل وحدة من رأس مال الملاك.",
        aliases: &["roe", "return on equity", "العائد علي حقوق الملكيه"],
    },
    GlossaryEntry {
        term_en: "Price to Book",
        term_ar: "مضاعف القيمة الدفترية",
        definition_en: "Share price divided by book value per share. Below 1 means the market prices the company under its net assets.",
        definition_ar: "سعر السهم مقسوماً على القيمة الدفترية للسهم، وأقل من 1 يعني أن السوق يسعّر الشركة بأقل من صافي أصولها.",
        aliases: &["pb", "p/b", "price to book", "book value", "القيمه الدفتريه", "مضاعف القيمه الدفتريه"],
    },
    GlossaryEntry {
        term_en: "RSI",
        term_ar: "مؤشر القوة النسبية",
        definition_en: "Relative Strength Index: a 0-100 momentum oscillator. Above 70 is usually read as overbought, below 30 as oversold.",
        definition_ar: "مؤشر القوة النسبية من 0 إلى 100؛ فوق 70 يعتبر تشبع شراء وتحت 30 تشبع بيع.",
        aliases: &["rsi", "relative strength index", "relative strength", "مؤشر القوه النسبيه"],
    },
    GlossaryEntry {
        term_en: "MACD",
        term_ar: "مؤشر الماكد",
        definition_en: "Difference between the 12- and 26-day exponential moving averages, compared against its own 9-day signal line.",
        definition_ar: "الفرق بين المتوسطين المتحركين الأسيين 12 و26 يوماً مقارنة بخط إشارة 9 أيام.",
        aliases: &["macd", "الماكد"],
    },
    GlossaryEntry {
        term_en: "Moving Average",
        term_ar: "المتوسط المتحرك",
        definition_en: "Average closing price over a rolling window (for example 20 or 50 days), used to smooth out price noise.",
        definition_ar: "متوسط سعر الإغلاق على نافذة متحركة (مثل 20 أو 50 يوماً) لتنعيم تذبذب السعر.",
        aliases: &["moving average", "sma", "ema", "المتوسط المتحرك"],
    },
    GlossaryEntry {
        term_en: "Support and Resistance",
        term_ar: "الدعم والمقاومة",
        definition_en: "Price zones where buying (support) or selling (resistance) has repeatedly stopped the price in the past.",
        definition_ar: "مناطق سعرية توقف عندها السعر سابقاً بسبب الشراء (دعم) أو البيع (مقاومة).",
        aliases: &["support", "resistance", "support and resistance", "الدعم", "المقاومه", "الدعم والمقاومه"],
    },
    GlossaryEntry {
        term_en: "Altman Z-Score",
        term_ar: "مؤشر ألتمان Z",
        definition_en: "A bankruptcy-risk score combining five balance-sheet and income ratios. Above 2.99 is the safe zone, below 1.81 the distress zone.",
        definition_ar: "مقياس لخطر الإفلاس يجمع خمس نسب مالية؛ فوق 2.99 منطقة أمان وتحت 1.81 منطقة خطر.",
        aliases: &["z-score", "z score", "altman", "altman z-score", "مؤشر التمان"],
    },
    GlossaryEntry {
        term_en: "Piotroski F-Score",
        term_ar: "مؤشر بيوتروسكي F",
        definition_en: "A 0-9 score of nine accounting tests on profitability, leverage and efficiency. 7 or more is considered strong.",
        definition_ar: "درجة من 0 إلى 9 مبنية على تسعة اختبارات محاسبية للربحية والرافعة والكفاءة؛ 7 فأكثر تعتبر قوية.",
        aliases: &["f-score", "f score", "piotroski", "مؤشر بيوتروسكي"],
    },
    GlossaryEntry {
        term_en: "EBITDA",
        term_ar: "الأرباح قبل الفوائد والضرائب والإهلاك",
        definition_en: "Earnings before interest, taxes, depreciation and amortization: a proxy for operating cash generation.",
        definition_ar: "الأرباح قبل الفوائد والضرائب والإهلاك والاستهلاك، وتقارب قدرة الشركة التشغيلية على توليد النقد.",
        aliases: &["ebitda", "ev/ebitda"],
    },
    GlossaryEntry {
        term_en: "Free Cash Flow",
        term_ar: "التدفق النقدي الحر",
        definition_en: "Operating cash flow minus capital expenditure: cash left for dividends, buybacks or debt repayment.",
        definition_ar: "التدفق النقدي التشغيلي مطروحاً منه الإنفاق الرأسمالي، وهو النقد المتاح للتوزيعات أو سداد الديون.",
        aliases: &["free cash flow", "fcf", "التدفق النقدي الحر"],
    },
    GlossaryEntry {
        term_en: "Net Asset Value",
        term_ar: "صافي قيمة الأصول",
        definition_en: "A fund's assets minus liabilities divided by units outstanding: the price of one fund unit.",
        definition_ar: "أصول الصندوق ناقص التزاماته مقسوماً على عدد الوثائق، أي سعر الوثيقة الواحدة.",
        aliases: &["nav", "net asset value", "صافي قيمه الاصول", "سعر الوثيقه"],
    },
    GlossaryEntry {
        term_en: "TTM",
        term_ar: "آخر اثني عشر شهراً",
        definition_en: "Trailing twelve months: the sum of the last four quarters for flow items, the latest quarter for balance-sheet items.",
        definition_ar: "آخر اثني عشر شهراً: مجموع آخر أربعة أرباع لبنود التدفق، وآخر ربع لبنود الميزانية.",
        aliases: &["ttm", "trailing twelve months", "اخر 12 شهر"],
    },
    GlossaryEntry {
        term_en: "Beta",
        term_ar: "معامل بيتا",
        definition_en: "Sensitivity of a stock to market moves. Above 1 swings more than the market, below 1 less.",
        definition_ar: "حساسية السهم لحركة السوق؛ أكبر من 1 يتحرك أكثر من السوق وأقل من 1 أقل منه.",
        aliases: &["beta", "بيتا", "معامل بيتا"],
    },
    GlossaryEntry {
        term_en: "Debt to Equity",
        term_ar: "الدين إلى حقوق الملكية",
        definition_en: "Total debt divided by shareholders' equity. Higher values mean more financial leverage.",
        definition_ar: "إجمالي الديون مقسوماً على حقوق المساهمين؛ كلما ارتفع زادت الرافعة المالية.",
        aliases: &["debt to equity", "d/e", "leverage", "الرافعه الماليه", "الدين الي حقوق الملكيه"],
    },
    GlossaryEntry {
        term_en: "Current Ratio",
        term_ar: "نسبة التداول",
        definition_en: "Current assets divided by current liabilities: the ability to cover short-term obligations.",
        definition_ar: "الأصول المتداولة مقسومة على الالتزامات المتداولة، وتقيس القدرة على سداد الالتزامات قصيرة الأجل.",
        aliases: &["current ratio", "نسبه التداول"],
    },
    GlossaryEntry {
        term_en: "Net Margin",
        term_ar: "هامش صافي الربح",
        definition_en: "Net income as a percentage of revenue.",
        definition_ar: "صافي الربح كنسبة مئوية من الإيرادات.",
        aliases: &["net margin", "profit margin", "margin", "هامش الربح", "هامش صافي الربح"],
    },
    GlossaryEntry {
        term_en: "Fair Value",
        term_ar: "القيمة العادلة",
        definition_en: "An estimate of what a share is worth from fundamentals, for example the Graham number sqrt(22.5 x EPS x book value per share).",
        definition_ar: "تقدير لقيمة السهم من أساسياته، مثل رقم جراهام: الجذر التربيعي لـ 22.5 × ربحية السهم × القيمة الدفترية للسهم.",
        aliases: &["fair value", "intrinsic value", "graham number", "القيمه العادله"],
    },
    GlossaryEntry {
        term_en: "52-Week Range",
        term_ar: "المدى السنوي",
        definition_en: "The lowest and highest prices the stock traded at over the past year.",
        definition_ar: "أدنى وأعلى سعر تداول عليه السهم خلال آخر سنة.",
        aliases: &["52 week range", "52-week range", "52 week high", "52 week low", "المدي السنوي"],
    },
    GlossaryEntry {
        term_en: "Trading Volume",
        term_ar: "حجم التداول",
        definition_en: "Number of shares that changed hands during the session.",
        definition_ar: "عدد الأسهم التي تم تداولها خلال الجلسة.",
        aliases: &["volume", "trading volume", "حجم التداول"],
    },
];

static INDEX: Lazy<HashMap<String, usize>> = Lazy::new(|| {
    let mut index = HashMap::new();
    for (i, entry) in ENTRIES.iter().enumerate() {
        for alias in entry.aliases.iter().chain([&entry.term_en]) {
            index.insert(normalize(alias), i);
        }
    }
    index
});

fn clean(term: &str) -> String {
    let term = normalize(term);
    let term = term.trim_matches(|c: char| c.is_ascii_punctuation() && c != '/' || c == '؟');
    term.strip_suffix(" ratio")
        .filter(|rest| INDEX.contains_key(*rest))
        .unwrap_or(term)
        .trim()
        .to_string()
}

/// Looks a term up by any of its aliases, ignoring case, Arabic letter
/// variants and a trailing question mark.
pub fn lookup(term: &str) -> Option<&'static GlossaryEntry> {
    let cleaned = clean(term);
    INDEX
        .get(&cleaned)
        .or_else(|| {
            let bare = cleaned.trim_start_matches("ال");
            INDEX.get(bare)
        })
        .map(|&i| &ENTRIES[i])
}

/// Entries whose alias appears as a whole word in `text`; used to annotate
/// jargon in card payloads.
pub fn mentioned_in(text: &str) -> Vec<&'static GlossaryEntry> {
    let haystack = format!(" {} ", normalize(text));
    ENTRIES
        .iter()
        .filter(|entry| {
            entry
                .aliases
                .iter()
                .filter(|alias| alias.chars().count() > 3)
                .any(|alias| haystack.contains(&format!(" {} ", normalize(alias))))
        })
        .collect()
}
