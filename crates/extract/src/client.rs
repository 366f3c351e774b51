use async_trait::async_trait;
use serde_json::{json, Value};
use std::env;
use tracing::debug;

use crate::config::GeminiConfig;
use crate::prompt::ExtractionRequest;
use crate::{ClientError, ExtractError};

/// A remote model that answers a prompt with a JSON object matching a schema.
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    async fn generate(&self, request: &ExtractionRequest) -> Result<Value, ClientError>;
}

/// Client for the Gemini `models/{model}:generateContent` REST endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    config: GeminiConfig,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig, api_key: impl Into<String>) -> Result<Self, ExtractError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ExtractError::Client(e.to_string()))?;
        Ok(Self {
            http,
            config,
            api_key: api_key.into(),
        })
    }

    /// Build a client reading the key from `config.api_key_env`.
    pub fn from_env(config: GeminiConfig) -> Result<Self, ExtractError> {
        let key = env::var(&config.api_key_env).map_err(|_| {
            ExtractError::InvalidConfig(format!(
                "environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        Self::new(config, key)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

/// JSON body for a `generateContent` call.
pub fn request_body(request: &ExtractionRequest) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": request.prompt }],
        }],
        "systemInstruction": {
            "parts": [{ "text": request.system_instruction }],
        },
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": request.response_schema,
        },
    })
}

/// Pull the structured answer out of a `generateContent` response.
pub fn parse_response(body: &Value) -> Result<Value, ClientError> {
    let text = body
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            let reason = body
                .pointer("/candidates/0/finishReason")
                .and_then(Value::as_str)
                .unwrap_or("no candidates");
            ClientError::new(format!("response had no candidate text ({reason})"))
        })?;
    serde_json::from_str(text)
        .map_err(|e| ClientError::new(format!("candidate text is not valid JSON: {e}")))
}

#[async_trait]
impl ExtractionClient for GeminiClient {
    async fn generate(&self, request: &ExtractionRequest) -> Result<Value, ClientError> {
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::http(status.as_u16(), body));
        }

        let body: Value = response.json().await?;
        debug!(model = %self.config.model, "gemini_response_received");
        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PromptConfig;

    #[test]
    fn body_carries_schema_and_instruction() {
        let req = ExtractionRequest::for_batch(&PromptConfig::default(), &["text".into()], 4);
        let body = request_body(&req);
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(
            body["generationConfig"]["responseSchema"]["required"][0],
            "annotation_5"
        );
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            req.system_instruction.as_str()
        );
        assert_eq!(body["contents"][0]["parts"][0]["text"], req.prompt.as_str());
    }

    #[test]
    fn parses_candidate_json() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"annotation_1\": [\"graphs\"]}" }] }
            }]
        });
        let parsed = parse_response(&body).unwrap();
        assert_eq!(parsed["annotation_1"][0], "graphs");
    }

    #[test]
    fn missing_candidate_is_an_error() {
        let body = json!({ "candidates": [{ "finishReason": "SAFETY" }] });
        let err = parse_response(&body).unwrap_err();
        assert!(err.message.contains("SAFETY"));
        assert_eq!(err.status, None);
    }

    #[test]
    fn invalid_candidate_json_is_an_error() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "not json" }] } }]
        });
        assert!(parse_response(&body).is_err());
    }

    #[test]
    fn endpoint_joins_model() {
        let cfg = GeminiConfig::default().with_base_url("http://localhost:9999/v1beta/");
        let client = GeminiClient::new(cfg, "key").unwrap();
        assert_eq!(
            client.endpoint(),
            "http://localhost:9999/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn from_env_requires_key() {
        let cfg = GeminiConfig {
            api_key_env: "ABSTRACT_SEARCH_TEST_UNSET_KEY".into(),
            ..Default::default()
        };
        assert!(matches!(
            GeminiClient::from_env(cfg),
            Err(ExtractError::InvalidConfig(_))
        ));
    }
}
