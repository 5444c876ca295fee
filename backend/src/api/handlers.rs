use crate::{
    chat::{router::catalog::catalog, schema::MarketCode, ChatInput},
    error::{AppError, Result},
    models::{Caller, ChatRequest, MAX_MESSAGE_CHARS},
    AppState,
};
use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde_json::json;
use tracing::debug;

const FINGERPRINT_HEADER: &str = "x-device-fingerprint";
const MARKET_HEADER: &str = "x-market-context";

pub async fn health_check(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let db_healthy = state.database.health_check().await.unwrap_or(false);
    let cache_healthy = match &state.cache {
        Some(cache) => Some(cache.health_check().await.unwrap_or(false)),
        None => None,
    };

    let status = if db_healthy && cache_healthy.unwrap_or(true) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if status == StatusCode::OK { "ok" } else { "degraded" },
        "timestamp": chrono::Utc::now(),
        "database": db_healthy,
        "cache": cache_healthy,
        "version": env!("CARGO_PKG_VERSION")
    });

    Ok((status, Json(response)))
}

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Trimmed message, or a 400 when it is empty or too long.
pub fn validate_message(message: &str) -> Result<String> {
    let message = message.trim();
    if message.is_empty() {
        return Err(AppError::Validation("Message must not be empty".to_string()));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::Validation(format!(
            "Message must be at most {} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(message.to_string())
}

/// The body's market wins over the header.
pub fn market_context(body: Option<&str>, header: Option<&str>) -> Option<MarketCode> {
    body.and_then(MarketCode::parse)
        .or_else(|| header.and_then(MarketCode::parse))
}

pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ChatRequest>,
) -> Result<impl IntoResponse> {
    let message = validate_message(&payload.message)?;

    let fingerprint = header(&headers, FINGERPRINT_HEADER);
    let user_id = state
        .services
        .auth
        .authenticate(headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()))?;
    if user_id.is_none() {
        let used = state.services.guests.check(fingerprint).await?;
        debug!("Guest question {} of {}", used, state.config.chat.guest_question_limit);
    }

    let input = ChatInput {
        message,
        session_id: payload.session_id,
        market: market_context(payload.market.as_deref(), header(&headers, MARKET_HEADER)),
        caller: Caller {
            user_id,
            device_fingerprint: fingerprint.map(str::to_string),
        },
    };

    let response = state.services.chat.handle(input).await;
    Ok((StatusCode::OK, Json(response)))
}

pub async fn list_intents() -> impl IntoResponse {
    Json(json!({ "intents": catalog() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_bounds() {
        assert!(matches!(validate_message("   "), Err(AppError::Validation(_))));
        assert!(matches!(validate_message(&"a".repeat(501)), Err(AppError::Validation(_))));
        assert_eq!(validate_message("  Price of COMI ").unwrap(), "Price of COMI");
        // Arabic counts characters, not bytes.
        assert!(validate_message(&"س".repeat(500)).is_ok());
    }

    #[test]
    fn market_precedence() {
        assert_eq!(market_context(Some("tdwl"), Some("EGX")), Some(MarketCode::Tdwl));
        assert_eq!(market_context(None, Some("EGX")), Some(MarketCode::Egx));
        assert_eq!(market_context(Some("nasdaq"), None), None);
    }

    #[test]
    fn validation_errors_are_400() {
        let response = validate_message("").unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = AppError::GuestLimit.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
