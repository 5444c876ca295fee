use crate::{
    config::{EmbeddingConfig, LlmConfig},
    error::{AppError, Result},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// One bounded chat-completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    pub json_mode: bool,
}

/// Chat-completion backend consumed by the paraphraser and the narrative
/// layer. Both layers treat every error as "layer unavailable".
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

/// Sentence embedder consumed by the semantic intent fallback. Vectors are
/// returned L2-normalized.
#[async_trait]
pub trait SentenceEmbedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client.
pub struct AIService {
    client: Client,
    config: LlmConfig,
}

impl AIService {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl ChatCompletion for AIService {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let messages = [
            ChatMessage { role: "system", content: &request.system },
            ChatMessage { role: "user", content: &request.user },
        ];
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": false,
        });
        if request.json_mode {
            payload["response_format"] = json!({ "type": "json_object" });
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .timeout(request.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("LLM request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "LLM returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("LLM JSON parse error: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| AppError::ExternalService("LLM returned no content".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/embeddings` client with a multilingual model.
pub struct HttpEmbedder {
    client: Client,
    config: EmbeddingConfig,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl SentenceEmbedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .timeout(Duration::from_secs(10))
            .json(&json!({ "model": self.config.model, "input": texts }))
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "Embedding service returned {}",
                response.status()
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("Embedding JSON parse error: {}", e)))?;

        parsed.data.sort_by_key(|row| row.index);
        if parsed.data.len() != texts.len() {
            return Err(AppError::ExternalService(format!(
                "Embedding service returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        Ok(parsed
            .data
            .into_iter()
            .map(|row| crate::utils::l2_normalize(row.embedding))
            .collect())
    }
}
