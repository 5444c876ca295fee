//! Optional LLM rewrite of slang or multi-clause input into one short
//! English command. Any failure means "no paraphrase".

use crate::ai::{ChatCompletion, CompletionRequest};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

const MAX_TOKENS: u32 = 20;
const MIN_ASCII_TOKENS: usize = 3;

const SYSTEM_PROMPT: &str = "You rewrite stock-market chat messages about the Egyptian (EGX) and Saudi (TDWL) \
exchanges into one short canonical English command, for example \"Price of COMI\", \"Chart SWDY 6M\", \
\"Compare COMI vs SWDY\", \"Top gainers today\". Keep tickers and company names exactly as written. \
Reply with the command only, no punctuation at the end, no explanation.";

pub struct Paraphraser {
    llm: Option<Arc<dyn ChatCompletion>>,
    timeout: Duration,
}

impl Paraphraser {
    pub fn new(llm: Option<Arc<dyn ChatCompletion>>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Short all-ASCII input is already command-shaped.
    pub fn should_skip(raw: &str) -> bool {
        raw.is_ascii() && raw.split_whitespace().count() < MIN_ASCII_TOKENS
    }

    pub async fn paraphrase(&self, raw: &str) -> Option<String> {
        let llm = self.llm.as_ref()?;
        if Self::should_skip(raw) {
            return None;
        }

        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: raw.to_string(),
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            timeout: self.timeout,
            json_mode: false,
        };

        match tokio::time::timeout(self.timeout, llm.complete(request)).await {
            Ok(Ok(text)) => {
                let text = text.lines().next().unwrap_or_default().trim().trim_matches('"').to_string();
                if text.is_empty() {
                    None
                } else {
                    debug!("Paraphrased {:?} -> {:?}", raw, text);
                    Some(text)
                }
            }
            Ok(Err(e)) => {
                warn!("Paraphraser failed: {}", e);
                None
            }
            Err(_) => {
                warn!("Paraphraser timed out after {:?}", self.timeout);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, Result};
    use async_trait::async_trait;

    struct Fixed(Result<String>);

    #[async_trait]
    impl ChatCompletion for Fixed {
        async fn complete(&self, _request: CompletionRequest) -> Result<String> {
            match &self.0 {
                Ok(s) => Ok(s.clone()),
                Err(_) => Err(AppError::ExternalService("down".into())),
            }
        }
    }

    struct Slow;

    #[async_trait]
    impl ChatCompletion for Slow {
        async fn complete(&self, _request: CompletionRequest) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("late".into())
        }
    }

    fn with(llm: impl ChatCompletion + 'static) -> Paraphraser {
        Paraphraser::new(Some(Arc::new(llm)), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn short_ascii_input_is_skipped() {
        let p = with(Fixed(Ok("Price of COMI".into())));
        assert_eq!(p.paraphrase("COMI price").await, None);
        assert_eq!(p.paraphrase("السويدي وصل كام").await.as_deref(), Some("Price of COMI"));
    }

    #[tokio::test]
    async fn no_llm_means_no_paraphrase() {
        let p = Paraphraser::new(None, Duration::from_millis(50));
        assert_eq!(p.paraphrase("what's up with the cib share these days").await, None);
    }

    #[tokio::test]
    async fn failures_and_timeouts_are_swallowed() {
        let p = with(Fixed(Err(AppError::ExternalService("x".into()))));
        assert_eq!(p.paraphrase("what's up with the cib share these days").await, None);

        let p = with(Slow);
        assert_eq!(p.paraphrase("what's up with the cib share these days").await, None);
    }
}
