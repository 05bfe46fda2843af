//! Gemini `generateContent` backend

use super::{GenerationRequest, TextGenerator};
use crate::config::LlmConfig;
use crate::secrets::SecretsProvider;
use crate::{FlowsmithError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;

/// Text generator backed by the Gemini REST API
///
/// The API key is resolved through the secrets provider on every call, so a
/// key saved through the configuration API takes effect without a restart.
pub struct GeminiGenerator {
    client: Client,
    config: LlmConfig,
    secrets: Arc<dyn SecretsProvider>,
}

impl GeminiGenerator {
    pub fn new(config: LlmConfig, secrets: Arc<dyn SecretsProvider>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| FlowsmithError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            secrets,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn build_payload(&self, request: &GenerationRequest) -> Value {
        json!({
            "systemInstruction": {
                "parts": [{"text": request.system}]
            },
            "contents": [{
                "role": "user",
                "parts": [{"text": request.user}]
            }],
            "generationConfig": {
                "temperature": self.config.temperature,
                "responseMimeType": "application/json"
            }
        })
    }

    fn parse_response(body: &Value) -> Result<String> {
        let parts = body["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| FlowsmithError::generation("response contained no candidates"))?;

        let text: String = parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect();

        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let api_key = self
            .secrets
            .get_secret(&self.config.api_key_env)
            .await?
            .ok_or_else(|| {
                FlowsmithError::generation(format!("{} is not set", self.config.api_key_env))
            })?;

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", api_key.as_str())])
            .json(&self.build_payload(request))
            .send()
            .await
            .map_err(|e| FlowsmithError::generation(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FlowsmithError::generation(format!(
                "backend returned {}: {}",
                status.as_u16(),
                crate::utils::truncate_chars(&body, 200)
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FlowsmithError::generation(format!("invalid response body: {}", e)))?;

        Self::parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::EnvSecretsProvider;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn generator_for(server: &MockServer, with_key: bool) -> GeminiGenerator {
        let secrets = Arc::new(EnvSecretsProvider::isolated());
        if with_key {
            secrets.set_secret("GEMINI_API_KEY", "test-key").await.unwrap();
        }
        let config = LlmConfig {
            base_url: server.uri(),
            ..LlmConfig::default()
        };
        GeminiGenerator::new(config, secrets).unwrap()
    }

    #[tokio::test]
    async fn test_generate_joins_candidate_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(json!({
                "generationConfig": {"responseMimeType": "application/json"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "{\"a\":"}, {"text": " 1}"}]}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let generator = generator_for(&server, true).await;
        let text = generator
            .generate(&GenerationRequest::new("system", "user"))
            .await
            .unwrap();
        assert_eq!(text, "{\"a\": 1}");
    }

    #[tokio::test]
    async fn test_missing_key_is_generation_error() {
        let server = MockServer::start().await;
        let generator = generator_for(&server, false).await;
        let err = generator
            .generate(&GenerationRequest::new("system", "user"))
            .await
            .unwrap_err();
        assert!(err.is_generation_failure());
    }

    #[tokio::test]
    async fn test_non_success_and_empty_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let generator = generator_for(&server, true).await;
        let request = GenerationRequest::new("system", "user");

        let err = generator.generate(&request).await.unwrap_err();
        assert!(err.to_string().contains("503"));

        let err = generator.generate(&request).await.unwrap_err();
        assert!(err.is_generation_failure());
    }
}
