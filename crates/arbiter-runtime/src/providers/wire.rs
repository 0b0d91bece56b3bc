//! `generateContent` wire format shared by the Gemini and Vertex backends.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use arbiter_core::TokenUsage;

use super::{CompletionResponse, GenerationConfig, ProviderError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: WireGenerationConfig,
}

impl GenerateContentRequest {
    pub(crate) fn new(prompt: &str, config: &GenerationConfig) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: WireGenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

/// Finish reasons that mean the text was withheld.
const BLOCKED_FINISH_REASONS: &[&str] = &["SAFETY", "RECITATION", "BLOCKLIST", "PROHIBITED_CONTENT"];

impl GenerateContentResponse {
    /// Convert a 200 body into a completion.
    ///
    /// Blocked prompts, missing candidates and empty text are all
    /// `EmptyResponse`, which the retry layer treats as transient.
    pub(crate) fn into_completion(self, model: &str) -> Result<CompletionResponse, ProviderError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ProviderError::EmptyResponse {
                reason: format!("prompt blocked: {}", reason),
            });
        }

        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::EmptyResponse {
                reason: "no candidates".to_string(),
            })?;

        let finish_reason = candidate.finish_reason;
        if let Some(reason) = finish_reason.as_deref() {
            if BLOCKED_FINISH_REASONS.contains(&reason) {
                return Err(ProviderError::EmptyResponse {
                    reason: format!("finish reason {}", reason),
                });
            }
        }

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse {
                reason: format!(
                    "empty text (finish reason {})",
                    finish_reason.as_deref().unwrap_or("unknown")
                ),
            });
        }

        let usage = self
            .usage_metadata
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content: text,
            usage,
            model: self.model_version.unwrap_or_else(|| model.to_string()),
            stop_reason: finish_reason,
        })
    }
}

/// Send a prepared request and map the HTTP outcome.
pub(crate) async fn send(
    request: reqwest::RequestBuilder,
    model: &str,
) -> Result<CompletionResponse, ProviderError> {
    let response = request.send().await.map_err(|e| {
        // without_url keeps endpoints out of logged errors
        let e = e.without_url();
        if e.is_timeout() {
            ProviderError::Transient(format!("request timed out: {}", e))
        } else {
            ProviderError::Transient(e.to_string())
        }
    })?;

    let status = response.status();

    if status.as_u16() == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(ProviderError::RateLimited { retry_after });
    }

    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(ProviderError::AuthError);
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or(body);
        return Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        });
    }

    let body: GenerateContentResponse = response
        .json()
        .await
        .map_err(|e| ProviderError::Transient(format!("unreadable response body: {}", e.without_url())))?;

    body.into_completion(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: serde_json::Value) -> Result<CompletionResponse, ProviderError> {
        serde_json::from_value::<GenerateContentResponse>(body)
            .unwrap()
            .into_completion("gemini-test")
    }

    #[test]
    fn test_request_shape() {
        let config = GenerationConfig::new("gemini-test");
        let body = serde_json::to_value(GenerateContentRequest::new("hello", &config)).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
    }

    #[test]
    fn test_text_and_usage() {
        let response = parse(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"a\":"}, {"text": " 1}"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 5, "totalTokenCount": 17}
        }))
        .unwrap();
        assert_eq!(response.content, "{\"a\": 1}");
        assert_eq!(response.usage.total(), 17);
        assert_eq!(response.model, "gemini-test");
        assert_eq!(response.stop_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_blocked_prompt_is_empty_response() {
        let err = parse(serde_json::json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_safety_finish_is_empty_response() {
        let err = parse(serde_json::json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse { .. }));
    }

    #[test]
    fn test_whitespace_text_is_empty_response() {
        let err = parse(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "  \n"}]}, "finishReason": "MAX_TOKENS"}]
        }))
        .unwrap_err();
        match err {
            ProviderError::EmptyResponse { reason } => assert!(reason.contains("MAX_TOKENS")),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
