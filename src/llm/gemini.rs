use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::service::{GenerativeService, ServiceError};
use crate::llm::types::{ContentPart, GenerationRequest, GenerationResponse, InlineData};
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

const GEMINI_RETRY_BASE_DELAY_MS: u64 = 900;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    Other(Value),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

/// HTTP client for the Gemini `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    timeout: Duration,
    max_attempts: usize,
}

impl GeminiClient {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_key: config.gemini_api_key.clone(),
            base_url: config.gemini_base_url.clone(),
            timeout: Duration::from_secs(config.gemini_timeout_seconds),
            max_attempts: config.gemini_max_retry_attempts.max(1),
        }
    }

    fn redact(&self, text: &str) -> String {
        let key = self.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }

    async fn call_gemini_api(
        &self,
        model: &str,
        payload: Value,
    ) -> Result<GeminiResponse, ServiceError> {
        if self.api_key.trim().is_empty() {
            return Err(ServiceError::MissingApiKey);
        }

        let client = get_http_client();
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        if tracing::enabled!(tracing::Level::DEBUG) {
            let payload_summary = summarize_gemini_payload(&payload);
            debug!(target: "llm.gemini", model = model, payload = %payload_summary);
        }

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let response = match client
                .post(&url)
                .timeout(self.timeout)
                .header("x-goog-api-key", &self.api_key)
                .json(&payload)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    let err_text = self.redact(&err.to_string());
                    let should_retry =
                        gemini_should_retry_error(&err) && attempt < self.max_attempts;
                    warn!(
                        "Gemini request failed to send: {} (timeout={}, connect={}, retrying={})",
                        err_text,
                        err.is_timeout(),
                        err.is_connect(),
                        should_retry
                    );
                    if should_retry {
                        tokio::time::sleep(gemini_retry_delay(attempt)).await;
                        continue;
                    }
                    return Err(ServiceError::Transport(err_text));
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let (message, body_summary) = summarize_error_body(&self.redact(&body));
                let should_retry =
                    gemini_should_retry_status(status) && attempt < self.max_attempts;
                warn!(
                    "Gemini API error: status={}, body={}, retrying={}",
                    status, body_summary, should_retry
                );
                if should_retry {
                    tokio::time::sleep(gemini_retry_delay(attempt)).await;
                    continue;
                }
                let detail = message.clone().unwrap_or(body_summary);
                return Err(ServiceError::Api {
                    status,
                    message,
                    detail,
                });
            }

            let body = response
                .text()
                .await
                .map_err(|err| ServiceError::Transport(self.redact(&err.to_string())))?;
            let value = parse_gemini_response(&body)?;
            if tracing::enabled!(tracing::Level::DEBUG) {
                let response_summary = summarize_gemini_response(&value);
                debug!(target: "llm.gemini", model = model, response = %response_summary);
            }
            return Ok(value);
        }
    }
}

#[async_trait]
impl GenerativeService for GeminiClient {
    async fn generate_image(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, ServiceError> {
        let model = request.model.clone();
        let payload = build_payload(&request);
        let metadata = json!({ "attachment": request.has_attachment() });
        log_llm_timing(
            "gemini",
            &request.model,
            "generate_image",
            Some(metadata),
            || async move {
                let response = self.call_gemini_api(&model, payload).await?;
                into_generation_response(response)
            },
        )
        .await
    }

    async fn generate_text(&self, request: GenerationRequest) -> Result<String, ServiceError> {
        let model = request.model.clone();
        let payload = build_payload(&request);
        let metadata = json!({ "attachment": request.has_attachment() });
        log_llm_timing(
            "gemini",
            &request.model,
            "generate_text",
            Some(metadata),
            || async move {
                let response = self.call_gemini_api(&model, payload).await?;
                Ok(into_generation_response(response)?.text())
            },
        )
        .await
    }
}

fn gemini_should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn gemini_should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn gemini_retry_delay(attempt: usize) -> Duration {
    let attempt = attempt.max(1) as u64;
    Duration::from_millis(GEMINI_RETRY_BASE_DELAY_MS.saturating_mul(attempt))
}

fn build_payload(request: &GenerationRequest) -> Value {
    let parts = request
        .parts
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => json!({ "text": text }),
            ContentPart::Inline(inline) => json!({
                "inlineData": {
                    "mimeType": inline.mime_type,
                    "data": inline.data
                }
            }),
        })
        .collect::<Vec<_>>();

    let mut payload = Map::new();
    payload.insert(
        "contents".to_string(),
        json!([{ "role": "user", "parts": parts }]),
    );
    if !request.response_modalities.is_empty() {
        let modalities = request
            .response_modalities
            .iter()
            .map(|modality| modality.wire_name())
            .collect::<Vec<_>>();
        payload.insert(
            "generationConfig".to_string(),
            json!({ "responseModalities": modalities }),
        );
    }
    Value::Object(payload)
}

fn parse_gemini_response(body: &str) -> Result<GeminiResponse, ServiceError> {
    serde_json::from_str::<GeminiResponse>(body)
        .map_err(|err| ServiceError::Malformed(format!("invalid JSON body: {err}")))
}

/// Only the first candidate is used, matching the service's own text accessor.
fn into_generation_response(response: GeminiResponse) -> Result<GenerationResponse, ServiceError> {
    let candidate = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next());

    let Some(candidate) = candidate else {
        if let Some(reason) = response
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
        {
            return Err(ServiceError::Malformed(format!(
                "the request was blocked ({reason})"
            )));
        }
        return Ok(GenerationResponse::default());
    };

    if candidate.content.is_none() {
        if let Some(reason) = candidate.finish_reason.as_deref() {
            debug!(target: "llm.gemini", finish_reason = reason, "candidate without content");
        }
    }

    let parts = candidate
        .content
        .and_then(|content| content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| match part {
            GeminiPart::Text { text } => Some(ContentPart::Text(text)),
            GeminiPart::InlineData { inline_data } => Some(ContentPart::Inline(InlineData {
                mime_type: inline_data.mime_type,
                data: inline_data.data,
            })),
            GeminiPart::Other(_) => None,
        })
        .collect();

    Ok(GenerationResponse { parts })
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_gemini_payload(payload: &Value) -> Value {
    let parts = payload
        .pointer("/contents/0/parts")
        .and_then(|value| value.as_array())
        .map(|parts| {
            parts
                .iter()
                .map(|part| {
                    if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                        json!({ "text": truncate_for_log(text, 200) })
                    } else if let Some(inline_data) = part.get("inlineData") {
                        let mime_type = inline_data
                            .get("mimeType")
                            .and_then(|value| value.as_str())
                            .unwrap_or("unknown");
                        let data_len = inline_data
                            .get("data")
                            .and_then(|value| value.as_str())
                            .map(|value| value.len())
                            .unwrap_or(0);
                        json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
                    } else {
                        json!({ "unknownPart": true })
                    }
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    json!({
        "parts": parts,
        "generationConfig": payload.get("generationConfig").cloned(),
    })
}

fn summarize_gemini_response(response: &GeminiResponse) -> Value {
    let mut text_parts = 0usize;
    let mut image_parts = 0usize;
    let mut text_preview = None;
    let mut other_parts = Vec::new();

    let candidates = response.candidates.as_deref().unwrap_or(&[]);
    for candidate in candidates {
        let parts = candidate
            .content
            .as_ref()
            .and_then(|content| content.parts.as_deref())
            .unwrap_or(&[]);
        for part in parts {
            match part {
                GeminiPart::Text { text } => {
                    text_parts += 1;
                    if text_preview.is_none() && !text.trim().is_empty() {
                        text_preview = Some(truncate_for_log(text, 200));
                    }
                }
                GeminiPart::InlineData { inline_data } => {
                    if inline_data.mime_type.starts_with("image/") {
                        image_parts += 1;
                    }
                }
                GeminiPart::Other(value) => {
                    let kind = value
                        .as_object()
                        .and_then(|fields| fields.keys().next().cloned())
                        .unwrap_or_else(|| "unknown".to_string());
                    other_parts.push(kind);
                }
            }
        }
    }

    json!({
        "candidates": candidates.len(),
        "textParts": text_parts,
        "imageParts": image_parts,
        "textPreview": text_preview,
        "otherParts": other_parts
    })
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::Modality;

    fn client_with_key(key: &str) -> GeminiClient {
        GeminiClient {
            api_key: key.to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(1),
            max_attempts: 1,
        }
    }

    #[test]
    fn image_payload_restricts_modality_and_orders_parts() {
        let inline = InlineData {
            mime_type: "image/png".to_string(),
            data: "QUJD".to_string(),
        };
        let request = GenerationRequest::new("img-model", Some(&inline), "make a nursery")
            .with_modalities(&[Modality::Image]);
        let payload = build_payload(&request);

        assert_eq!(
            payload.pointer("/generationConfig/responseModalities/0"),
            Some(&json!("IMAGE"))
        );
        assert_eq!(
            payload.pointer("/contents/0/parts/0/inlineData/mimeType"),
            Some(&json!("image/png"))
        );
        assert_eq!(
            payload.pointer("/contents/0/parts/1/text"),
            Some(&json!("make a nursery"))
        );
    }

    #[test]
    fn text_payload_has_no_generation_config() {
        let request = GenerationRequest::new("text-model", None, "advice please");
        let payload = build_payload(&request);
        assert!(payload.get("generationConfig").is_none());
        assert_eq!(
            payload.pointer("/contents/0/parts").and_then(|p| p.as_array()).map(|p| p.len()),
            Some(1)
        );
    }

    #[test]
    fn parses_inline_image_and_ignores_unknown_parts() {
        let body = r#"{
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "thoughtSignature": "abc" },
                        { "text": "Here is the room" },
                        { "inlineData": { "mimeType": "image/png", "data": "iVBORw0" } }
                    ]
                },
                "finishReason": "STOP"
            }]
        }"#;
        let response = into_generation_response(parse_gemini_response(body).unwrap()).unwrap();
        assert_eq!(response.parts.len(), 2);
        let image = response.first_inline_image().expect("image part");
        assert_eq!(image.to_data_uri(), "data:image/png;base64,iVBORw0");
    }

    #[test]
    fn response_summary_names_unknown_parts() {
        let body = r#"{
            "candidates": [{
                "content": { "parts": [ { "thoughtSignature": "abc" }, { "text": "ok" } ] }
            }]
        }"#;
        let summary = summarize_gemini_response(&parse_gemini_response(body).unwrap());
        assert_eq!(summary["otherParts"], json!(["thoughtSignature"]));
        assert_eq!(summary["textParts"], json!(1));
    }

    #[test]
    fn concatenates_text_of_the_first_candidate_only() {
        let body = r#"{
            "candidates": [
                { "content": { "parts": [ { "text": "Tip A\n" }, { "text": "---SPLIT---\nEssential B" } ] } },
                { "content": { "parts": [ { "text": "ignored" } ] } }
            ]
        }"#;
        let response = into_generation_response(parse_gemini_response(body).unwrap()).unwrap();
        assert_eq!(response.text(), "Tip A\n---SPLIT---\nEssential B");
    }

    #[test]
    fn blocked_prompt_is_reported() {
        let body = r#"{ "promptFeedback": { "blockReason": "SAFETY" } }"#;
        let err = into_generation_response(parse_gemini_response(body).unwrap()).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = parse_gemini_response("<html>").unwrap_err();
        assert!(matches!(err, ServiceError::Malformed(_)));
    }

    #[test]
    fn extracts_service_message_from_error_body() {
        let (message, summary) =
            summarize_error_body(r#"{"error":{"code":400,"message":"API key not valid."}}"#);
        assert_eq!(message.as_deref(), Some("API key not valid."));
        assert!(summary.contains("400"));

        let (message, summary) = summarize_error_body("   ");
        assert!(message.is_none());
        assert_eq!(summary, "empty response body");
    }

    #[test]
    fn redacts_api_key_from_error_text() {
        let client = client_with_key("secret-key");
        assert_eq!(
            client.redact("url?key=secret-key failed"),
            "url?key=[redacted] failed"
        );
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let client = client_with_key("  ");
        let err = client
            .generate_text(GenerationRequest::new("m", None, "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::MissingApiKey));
    }
}
