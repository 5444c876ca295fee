//! Blocks investment-advice and price-prediction requests before any data
//! access happens.

use super::{
    normalizer::{arabic_ratio, normalize},
    schema::{Action, Intent, Language},
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    Advice,
    Prediction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceVerdict {
    pub blocked: bool,
    pub violation: Option<Violation>,
    pub message: Option<String>,
    pub language: Language,
}

// Patterns are written against normalized text (lowercase, folded alef/yaa/taa).
static RULES: Lazy<Vec<(Regex, Violation)>> = Lazy::new(|| {
    let advice = [
        r"\bshould i (buy|sell|invest|hold|keep|exit|enter)\b",
        r"\b(is it|is now) (a )?(good|right|bad) (time )?to (buy|sell|invest)\b",
        r"\b(buy|sell) or (sell|hold|buy)\b",
        r"\bbest (stock|stocks|share|shares|investment|fund)s?\b",
        r"\bwhat (stock|stocks|shares) (should|to|do you recommend)\b",
        r"\b(recommend|recommendation)s? (me )?(a |some )?(stock|stocks|share|shares|fund)\b",
        r"\bworth (buying|investing)\b",
        r"\b(good|safe) (stock|investment) to buy\b",
        r"هل (اشتري|ابيع|استثمر|ادخل|اخرج)",
        r"(اشتري|ابيع) ولا",
        r"(انصحني|تنصحني|نصيحه|توصيه|توصيات)",
        r"افضل (سهم|اسهم|شركه|استثمار)",
        r"(اشتري ايه|اشتري اي سهم|اشتري انهي)",
        r"(ادخل|اشتري) (فيه|فيها|دلوقتي|الحين)",
    ];
    let prediction = [
        r"\b(will|is going to|gonna) (it |the stock |the price |the market )?(go up|go down|rise|fall|drop|crash|increase|decrease|reach)\b",
        r"\btarget price will reach\b",
        r"\b(predict|prediction|forecast)s?\b.*\b(price|stock|market|share)\b",
        r"\b(price|stock|market|share)s?\b.*\b(predict|prediction|forecast)\b",
        r"\bwhere (will|is) .* (go|head|heading)\b",
        r"\bprice (tomorrow|next week|next month|next year)\b",
        r"(سيرتفع|سينخفض|سيصعد|سيهبط|هيطلع|هينزل|هيعلي|هيقع)",
        r"(هل|متي) (سيرتفع|سينخفض|يرتفع|ينخفض|يطلع|ينزل)",
        r"(توقع|توقعات|تنبؤ) (سعر|السعر|السهم|سهم)",
        r"(السعر|سعره) (بكره|بكرا|الاسبوع الجاي|الشهر الجاي)",
    ];

    advice
        .iter()
        .map(|p| (p, Violation::Advice))
        .chain(prediction.iter().map(|p| (p, Violation::Prediction)))
        .filter_map(|(pattern, violation)| match Regex::new(pattern) {
            Ok(re) => Some((re, violation)),
            Err(e) => {
                tracing::error!("invalid compliance pattern {}: {}", pattern, e);
                None
            }
        })
        .collect()
});

const BLOCKED_EN: &str = "I can't give investment advice or predict prices. \
I can show you objective data such as prices, financial statements, ratios and \
historical charts so you can make your own informed decision.";

const BLOCKED_AR: &str = "لا أستطيع تقديم نصائح استثمارية أو توقع الأسعار. \
يمكنني عرض بيانات موضوعية مثل الأسعار والقوائم المالية والنسب والرسوم البيانية \
التاريخية لتتخذ قرارك بنفسك.";

/// Response language for canned messages, by Arabic-letter share of the raw text.
fn canned_language(raw: &str) -> Language {
    match arabic_ratio(raw) {
        Some(ratio) if ratio > 0.5 => Language::Ar,
        _ => Language::En,
    }
}

pub fn check(raw: &str) -> ComplianceVerdict {
    let normalized = normalize(raw);
    let language = canned_language(raw);

    let violation = RULES
        .iter()
        .find(|(re, _)| re.is_match(&normalized))
        .map(|(_, violation)| *violation);

    match violation {
        Some(violation) => ComplianceVerdict {
            blocked: true,
            violation: Some(violation),
            message: Some(blocked_message(language).to_string()),
            language,
        },
        None => ComplianceVerdict {
            blocked: false,
            violation: None,
            message: None,
            language,
        },
    }
}

pub fn blocked_message(language: Language) -> &'static str {
    if language.is_arabic() {
        BLOCKED_AR
    } else {
        BLOCKED_EN
    }
}

/// Two neutral follow-ups offered with every blocked reply.
pub fn safe_actions() -> Vec<Action> {
    vec![
        Action::query("Top gainers today", "الأكثر ارتفاعاً اليوم", "Top gainers today"),
        Action::query("What is P/E ratio?", "ما هو مكرر الربحية؟", "What is P/E ratio?"),
    ]
}

pub fn disclaimer(intent: Intent, language: Language) -> Option<String> {
    if intent == Intent::Blocked || !intent.needs_disclaimer() {
        return None;
    }
    let text = if language.is_arabic() {
        "هذه البيانات لأغراض معلوماتية فقط ولا تمثل توصية بالشراء أو البيع."
    } else {
        "This data is for informational purposes only and is not a recommendation to buy or sell."
    };
    Some(text.to_string())
}
