//! Optional prose layer: one conversational sentence around the data, plus
//! definitions for jargon that appears in the cards.

use super::{
    glossary,
    schema::{ChatResponse, Intent, Language},
};
use crate::ai::{ChatCompletion, CompletionRequest};
use serde::Deserialize;
use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tracing::{debug, warn};

const MAX_TOKENS: u32 = 120;
const MAX_TERMS: usize = 5;
const MAX_CONTEXT_CHARS: usize = 1500;

const SYSTEM_EN: &str = "You are a neutral market-data assistant for the Egyptian and Saudi exchanges. \
Given a user's question and the data already shown to them, write one or two short sentences that \
summarize what the data says. Never recommend buying, selling or holding, never predict prices. \
Reply as JSON: {\"text\": \"...\"}";

const SYSTEM_AR: &str = "أنت مساعد محايد لبيانات السوق للبورصة المصرية والسعودية. \
بناء على سؤال المستخدم والبيانات المعروضة له، اكتب جملة أو جملتين قصيرتين تلخصان ما تقوله البيانات. \
لا تقدم أي توصية بالشراء أو البيع أو الاحتفاظ ولا تتوقع الأسعار. \
أجب بصيغة JSON: {\"text\": \"...\"}";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Narrative {
    pub conversational_text: Option<String>,
    pub fact_explanations: BTreeMap<String, String>,
}

impl Narrative {
    pub fn apply(self, response: &mut ChatResponse) {
        response.conversational_text = self.conversational_text;
        if !self.fact_explanations.is_empty() {
            response.fact_explanations = Some(self.fact_explanations);
        }
    }
}

#[derive(Debug, Deserialize)]
struct NarrativeReply {
    text: String,
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

/// Glossary definitions for terms that appear in the card text.
pub fn explain_terms(response: &ChatResponse) -> BTreeMap<String, String> {
    let mut text = Vec::new();
    for card in &response.cards {
        if let Some(title) = &card.title {
            text.push(title.clone());
        }
        collect_strings(&card.data, &mut text);
    }
    let arabic = response.language.is_arabic();
    glossary::mentioned_in(&text.join(" . "))
        .into_iter()
        .take(MAX_TERMS)
        .map(|entry| {
            if arabic {
                (entry.term_ar.to_string(), entry.definition_ar.to_string())
            } else {
                (entry.term_en.to_string(), entry.definition_en.to_string())
            }
        })
        .collect()
}

pub struct NarrativeWriter {
    llm: Option<Arc<dyn ChatCompletion>>,
    timeout: Duration,
}

impl NarrativeWriter {
    pub fn new(llm: Option<Arc<dyn ChatCompletion>>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    async fn sentence(&self, llm: &dyn ChatCompletion, raw: &str, intent: Intent, response: &ChatResponse) -> Option<String> {
        let data: String = serde_json::to_string(&response.cards)
            .unwrap_or_default()
            .chars()
            .take(MAX_CONTEXT_CHARS)
            .collect();
        let request = CompletionRequest {
            system: match response.language {
                Language::Ar => SYSTEM_AR,
                _ => SYSTEM_EN,
            }
            .to_string(),
            user: format!(
                "Question: {}\nIntent: {}\nAnswer shown: {}\nData: {}",
                raw, intent, response.message_text, data
            ),
            max_tokens: MAX_TOKENS,
            temperature: 0.3,
            timeout: self.timeout,
            json_mode: true,
        };

        match tokio::time::timeout(self.timeout, llm.complete(request)).await {
            Ok(Ok(body)) => match serde_json::from_str::<NarrativeReply>(&body) {
                Ok(reply) if !reply.text.trim().is_empty() => Some(reply.text.trim().to_string()),
                Ok(_) => None,
                Err(e) => {
                    debug!("Narrative reply was not JSON: {}", e);
                    None
                }
            },
            Ok(Err(e)) => {
                warn!("Narrative layer failed: {}", e);
                None
            }
            Err(_) => {
                warn!("Narrative layer timed out after {:?}", self.timeout);
                None
            }
        }
    }

    /// `None` when the layer is disabled. Term definitions come from the
    /// built-in glossary and survive an LLM failure.
    pub async fn narrate(&self, raw: &str, intent: Intent, response: &ChatResponse) -> Option<Narrative> {
        let llm = self.llm.as_ref()?;
        Some(Narrative {
            conversational_text: self.sentence(llm.as_ref(), raw, intent, response).await,
            fact_explanations: explain_terms(response),
        })
    }
}
