//! Turns a handler result into the wire `ChatResponse`.

use super::{
    compliance,
    handlers::HandlerResult,
    schema::{Card, CardType, ChatResponse, Entities, Intent, Language, ResponseMeta},
};
use crate::utils::sanitize_json;
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Duration;

pub const BACKEND_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Classification data carried into the response meta.
#[derive(Debug, Clone)]
pub struct Classified<'a> {
    pub intent: Intent,
    pub confidence: f64,
    pub entities: &'a Entities,
    pub language: Language,
}

/// Validates the card tag against `CardType`; unknown tags become an
/// `error` card that keeps the original payload for debugging.
pub fn typed_card(raw: Value) -> Card {
    let tag = raw.get("type").and_then(Value::as_str).map(str::to_string);
    let title = raw.get("title").and_then(Value::as_str).map(str::to_string);
    let data = sanitize_json(raw.get("data").cloned().unwrap_or(Value::Null));
    match tag.as_deref().and_then(CardType::from_tag) {
        Some(card_type) => Card { card_type, title, data },
        None => Card {
            card_type: CardType::Error,
            title,
            data: json!({"unknown_type": tag, "data": data}),
        },
    }
}

fn meta(c: &Classified<'_>, latency: Duration) -> ResponseMeta {
    ResponseMeta {
        intent: c.intent,
        confidence: c.confidence.clamp(0.0, 1.0),
        entities: c.entities.clone(),
        detected_language: c.language,
        latency_ms: latency.as_millis() as u64,
        cached: false,
        as_of: Utc::now(),
        backend_version: BACKEND_VERSION.to_string(),
    }
}

pub fn build(result: HandlerResult, c: &Classified<'_>, latency: Duration, session_id: &str) -> ChatResponse {
    let language = c.language.reply();
    ChatResponse {
        message_text: result.message,
        conversational_text: None,
        fact_explanations: None,
        language,
        cards: result.cards.into_iter().map(typed_card).collect(),
        chart: result.chart,
        actions: result.actions,
        disclaimer: compliance::disclaimer(c.intent, language),
        meta: meta(c, latency),
        session_id: Some(session_id.to_string()),
    }
}

/// Compliance refusal: no cards, two neutral follow-ups.
pub fn blocked(message: String, language: Language, entities: &Entities, latency: Duration, session_id: &str) -> ChatResponse {
    let c = Classified {
        intent: Intent::Blocked,
        confidence: 1.0,
        entities,
        language,
    };
    ChatResponse {
        message_text: message,
        conversational_text: None,
        fact_explanations: None,
        language: language.reply(),
        cards: Vec::new(),
        chart: None,
        actions: compliance::safe_actions(),
        disclaimer: None,
        meta: meta(&c, latency),
        session_id: Some(session_id.to_string()),
    }
}

/// The maintenance reply returned when anything in the pipeline fails.
pub fn system_error(detected: Language, latency: Duration, session_id: &str) -> ChatResponse {
    let language = detected.reply();
    let (title, message) = if language.is_arabic() {
        ("صيانة النظام", "نواجه مشكلة مؤقتة في النظام. يرجى المحاولة بعد قليل.")
    } else {
        ("System maintenance", "We're experiencing a temporary system issue. Please try again shortly.")
    };
    let entities = Entities::default();
    let c = Classified {
        intent: Intent::SystemError,
        confidence: 0.0,
        entities: &entities,
        language: detected,
    };
    ChatResponse {
        message_text: message.to_string(),
        conversational_text: None,
        fact_explanations: None,
        language,
        cards: vec![Card {
            card_type: CardType::Error,
            title: Some(title.to_string()),
            data: json!({"code": "SYSTEM_ERROR", "message": message}),
        }],
        chart: None,
        actions: Vec::new(),
        disclaimer: None,
        meta: meta(&c, latency),
        session_id: Some(session_id.to_string()),
    }
}
