//! Vertex AI provider.
//!
//! Calls the publisher model endpoint of a GCP project with an OAuth
//! bearer token. Token minting is left to the caller (`gcloud auth
//! print-access-token` or a workload identity sidecar); the provider only
//! reads it.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use super::{
    factory::ProviderFactory,
    secrets::ApiCredential,
    wire::{self, GenerateContentRequest},
    CompletionResponse, GenerationConfig, LlmProvider, ProviderError,
};

/// Default environment variable for the Vertex access token.
pub const VERTEX_ACCESS_TOKEN_ENV: &str = "VERTEX_ACCESS_TOKEN";

const DEFAULT_LOCATION: &str = "us-central1";

/// Vertex AI `generateContent` backend.
pub struct VertexProvider {
    token: ApiCredential,
    project_id: String,
    location: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for VertexProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexProvider")
            .field("token", &self.token)
            .field("project_id", &self.project_id)
            .field("location", &self.location)
            .finish()
    }
}

impl VertexProvider {
    /// Create from JSON configuration.
    ///
    /// Recognized keys: `project_id` (required), `location`,
    /// `access_token`, `access_token_env`, `base_url`.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let project_id = config["project_id"]
            .as_str()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                ProviderError::NotConfigured("Vertex AI requires 'project_id'".to_string())
            })?
            .to_string();

        let location = config["location"]
            .as_str()
            .filter(|l| !l.is_empty())
            .unwrap_or(DEFAULT_LOCATION)
            .to_string();

        let env_var = config["access_token_env"]
            .as_str()
            .unwrap_or(VERTEX_ACCESS_TOKEN_ENV);
        let token = ApiCredential::from_config_or_env(
            config,
            "access_token",
            env_var,
            "Vertex AI access token",
        )?;

        let base_url = match config["base_url"].as_str() {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}-aiplatform.googleapis.com/v1", location),
        };

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            token,
            project_id,
            location,
            base_url,
            client,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            self.base_url, self.project_id, self.location, model
        )
    }
}

#[async_trait]
impl LlmProvider for VertexProvider {
    async fn complete(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let body = GenerateContentRequest::new(prompt, config);

        let request = self
            .client
            .post(self.endpoint(&config.model))
            .bearer_auth(self.token.expose())
            .json(&body);

        wire::send(request, &config.model).await
    }

    fn name(&self) -> &str {
        "vertex"
    }
}

/// Factory for [`VertexProvider`].
pub struct VertexProviderFactory;

impl ProviderFactory for VertexProviderFactory {
    fn provider_type(&self) -> &'static str {
        "vertex"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(VertexProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if config["project_id"].as_str().map_or(true, str::is_empty) {
            return Err(ProviderError::NotConfigured(
                "Vertex AI requires 'project_id'".to_string(),
            ));
        }

        let env_var = config["access_token_env"]
            .as_str()
            .unwrap_or(VERTEX_ACCESS_TOKEN_ENV);
        if !ApiCredential::is_available(config, "access_token", env_var) {
            return Err(ProviderError::NotConfigured(format!(
                "Vertex AI access token required: set 'access_token' in config or {} env",
                env_var
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> JsonValue {
        serde_json::json!({
            "project_id": "proj-1",
            "location": "europe-west4",
            "access_token": "ya29.token",
            "base_url": base_url
        })
    }

    #[test]
    fn test_endpoint_layout() {
        let provider = VertexProvider::from_config(&serde_json::json!({
            "project_id": "proj-1",
            "access_token": "t"
        }))
        .unwrap();
        assert_eq!(
            provider.endpoint("gemini-1.5-pro"),
            "https://us-central1-aiplatform.googleapis.com/v1/projects/proj-1/locations/us-central1/publishers/google/models/gemini-1.5-pro:generateContent"
        );
    }

    #[tokio::test]
    async fn test_complete_uses_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "POST",
                "/projects/proj-1/locations/europe-west4/publishers/google/models/gemini-test:generateContent",
            )
            .match_header("authorization", "Bearer ya29.token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"candidates": [{"content": {"parts": [{"text": "ok"}]}, "finishReason": "STOP"}]}"#,
            )
            .create_async()
            .await;

        let provider = VertexProvider::from_config(&config(&server.url())).unwrap();
        let response = provider
            .complete("prompt", &GenerationConfig::new("gemini-test"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "ok");
    }

    #[test]
    fn test_missing_project_rejected() {
        let err = VertexProvider::from_config(&serde_json::json!({"access_token": "t"})).unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
        assert!(VertexProviderFactory
            .validate_config(&serde_json::json!({"access_token": "t"}))
            .is_err());
    }

    #[test]
    fn test_token_not_in_debug_output() {
        let provider = VertexProvider::from_config(&config("http://localhost")).unwrap();
        let debug = format!("{:?}", provider);
        assert!(!debug.contains("ya29.token"));
        assert!(debug.contains("proj-1"));
    }
}
