//! Fixed-template replies. Nothing here touches the database.

use super::{card, HandlerContext, HandlerResult};
use crate::chat::{
    glossary,
    schema::{Action, CardType, Intent},
};
use serde_json::json;

pub const UNKNOWN_INTENT: &str = "UNKNOWN_INTENT";

fn starter_actions() -> Vec<Action> {
    vec![
        Action::query("Price of COMI", "سعر التجاري الدولي", "Price of COMI"),
        Action::query("Top gainers today", "الأكثر ارتفاعاً اليوم", "Top gainers today"),
        Action::query("Compare COMI vs SWDY", "قارن COMI و SWDY", "Compare COMI vs SWDY"),
        Action::query("Is SWDY safe?", "هل السويدي آمن؟", "Is SWDY safe?"),
    ]
}

/// Help card sections: a title and a few example commands each.
fn help_sections(arabic: bool) -> serde_json::Value {
    let sections: [(&str, &str, &[&str]); 6] = [
        ("Prices & charts", "الأسعار والرسوم", &["Price of COMI", "Chart SWDY 6M", "52 week range of TMGH"]),
        ("Financials", "القوائم المالية", &["Annual financials for COMI", "Revenue trend of SWDY", "Dividends of EAST"]),
        ("Deep analysis", "التحليل المتعمق", &["Is COMI safe?", "Is SWDY cheap?", "Is FWRY growing?"]),
        ("Screeners", "الفرز", &["Top gainers today", "Stocks with PE below 10", "Banking sector stocks"]),
        ("Technicals", "التحليل الفني", &["Technical analysis of COMI", "Support and resistance for SWDY"]),
        ("Funds & more", "الصناديق وغيرها", &["List mutual funds", "Who owns COMI?", "What is P/E ratio?"]),
    ];
    json!({
        "sections": sections.iter().map(|(en, ar, examples)| json!({
            "title": if arabic { *ar } else { *en },
            "examples": examples,
        })).collect::<Vec<_>>(),
    })
}

fn help(ctx: &HandlerContext<'_>) -> HandlerResult {
    HandlerResult::ok(ctx.t(
        "I answer questions about EGX and Tadawul stocks and funds: prices, charts, financial statements, \
         ratios, screeners, technicals and comparisons. Try one of these:",
        "أجيب عن أسئلة أسهم وصناديق البورصة المصرية وتداول: الأسعار والرسوم البيانية والقوائم المالية \
         والنسب والفرز والتحليل الفني والمقارنات. جرّب أحد هذه الأوامر:",
    ))
    .card(card(CardType::Help, ctx.t("What I can do", "ماذا أستطيع أن أفعل"), help_sections(ctx.ar())))
    .actions(starter_actions())
}

fn define(ctx: &HandlerContext<'_>) -> HandlerResult {
    let term = ctx.entities.term.as_deref().unwrap_or_default();
    match glossary::lookup(term) {
        Some(entry) => {
            let (name, definition) = if ctx.ar() {
                (entry.term_ar, entry.definition_ar)
            } else {
                (entry.term_en, entry.definition_en)
            };
            HandlerResult::ok(format!("{}: {}", name, definition)).card(card(
                CardType::FactExplanations,
                name,
                json!({
                    "term": name,
                    "term_en": entry.term_en,
                    "term_ar": entry.term_ar,
                    "definition": definition,
                }),
            ))
        }
        None => HandlerResult::no_data(ctx.t(
            format!("I don't have a definition for \"{}\" yet.", term),
            format!("لا يوجد لدي تعريف لـ \"{}\" حاليا.", term),
        ))
        .actions(vec![Action::query("What is P/E ratio?", "ما هو مكرر الربحية؟", "What is P/E ratio?")]),
    }
}

fn unknown(ctx: &HandlerContext<'_>) -> HandlerResult {
    HandlerResult::failed(
        ctx.t(
            "I didn't quite get that. You can ask about a stock's price, chart, financials or safety, for example:",
            "لم أفهم طلبك تماماً. يمكنك السؤال عن سعر سهم أو الرسم البياني أو القوائم المالية أو الأمان، مثلاً:",
        ),
        UNKNOWN_INTENT,
    )
    .card(card(
        CardType::Suggestions,
        ctx.t("Try asking", "جرّب أن تسأل"),
        json!({"suggestions": starter_actions().into_iter().map(|a| a.payload).collect::<Vec<_>>()}),
    ))
    .actions(starter_actions())
}

pub fn handle(ctx: &HandlerContext<'_>, intent: Intent) -> HandlerResult {
    match intent {
        Intent::Greeting => HandlerResult::ok(ctx.t(
            "Hello! Ask me about any EGX or Tadawul stock, for example \"Price of COMI\".",
            "أهلاً بك! اسألني عن أي سهم في البورصة المصرية أو تداول، مثلاً \"سعر التجاري الدولي\".",
        ))
        .actions(starter_actions()),
        Intent::Identity => HandlerResult::ok(ctx.t(
            "I'm a market data assistant for the Egyptian Exchange and Tadawul. I report figures; I don't give investment advice.",
            "أنا مساعد بيانات السوق للبورصة المصرية وتداول. أعرض الأرقام ولا أقدم نصائح استثمارية.",
        ))
        .actions(starter_actions()),
        Intent::Mood => HandlerResult::ok(ctx.t(
            "All good and ready to dig into the market. What would you like to look at?",
            "بخير وجاهز للبحث في السوق. ماذا تريد أن ترى؟",
        )),
        Intent::Gratitude => HandlerResult::ok(ctx.t(
            "You're welcome! Anything else?",
            "العفو! هل تريد شيئاً آخر؟",
        )),
        Intent::Goodbye => HandlerResult::ok(ctx.t("Goodbye, see you next session.", "مع السلامة، أراك قريباً.")),
        Intent::Help | Intent::Capabilities => help(ctx),
        Intent::DefineTerm => define(ctx),
        _ => unknown(ctx),
    }
}
