use serde::{Deserialize, Serialize};

/// Body of `POST /chat`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

/// Caller identity as established by the HTTP layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Option<String>,
    pub device_fingerprint: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IntentCatalogEntry {
    pub intent: &'static str,
    pub family: crate::chat::schema::IntentFamily,
    pub examples: Vec<&'static str>,
}

pub const MAX_MESSAGE_CHARS: usize = 500;
