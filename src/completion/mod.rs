//! Clients for the external LLM completion service.
//!
//! Pipelines only see [`CompletionClient`]; the concrete adapter is picked from configuration.
//! Both adapters issue plain HTTP requests with `reqwest` and perform no retries: any transport
//! failure, error status, undecodable body or empty completion is returned to the caller.

use crate::config::{CompletionProvider, Config};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Provider could not be reached or constructed.
    #[error("Completion provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed or carried no text.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// One completion call: rendered prompt plus the output budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Fully rendered prompt.
    pub prompt: String,
    /// Upper bound on generated tokens.
    pub max_output_tokens: usize,
}

/// Interface implemented by completion backends.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate raw completion text for the request.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

/// Build the completion client selected by configuration.
pub fn build_completion_client(
    config: &Config,
) -> Result<Arc<dyn CompletionClient>, CompletionError> {
    let http = Client::builder()
        .user_agent("docflow/completion")
        .build()
        .map_err(|error| {
            CompletionError::ProviderUnavailable(format!("failed to build HTTP client: {error}"))
        })?;
    let settings = ModelSettings {
        model: config.completion_model.clone(),
        temperature: config.completion_temperature,
    };

    let client: Arc<dyn CompletionClient> = match config.completion_provider {
        CompletionProvider::Ollama => Arc::new(OllamaCompletionClient {
            http,
            base_url: config
                .completion_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            settings,
        }),
        CompletionProvider::OpenAI => Arc::new(OpenAiCompletionClient {
            http,
            base_url: config
                .completion_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            api_key: config.completion_api_key.clone(),
            settings,
        }),
    };
    tracing::info!(
        provider = ?config.completion_provider,
        model = %config.completion_model,
        "Completion client initialized"
    );
    Ok(client)
}

#[derive(Debug, Clone)]
struct ModelSettings {
    model: String,
    temperature: Option<f32>,
}

struct OllamaCompletionClient {
    http: Client,
    base_url: String,
    settings: ModelSettings,
}

impl OllamaCompletionClient {
    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl CompletionClient for OllamaCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let mut options = Map::new();
        options.insert("num_predict".into(), json!(request.max_output_tokens));
        if let Some(temperature) = self.settings.temperature {
            options.insert("temperature".into(), json!(temperature));
        }
        let payload = json!({
            "model": self.settings.model,
            "prompt": request.prompt,
            "stream": false,
            "options": Value::Object(options),
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                CompletionError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CompletionError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            CompletionError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(CompletionError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        non_empty(body.response)
    }
}

struct OpenAiCompletionClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    settings: ModelSettings,
}

impl OpenAiCompletionClient {
    fn endpoint(&self) -> String {
        format!("{}/v1/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    text: String,
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let mut payload = json!({
            "model": self.settings.model,
            "prompt": request.prompt,
            "max_tokens": request.max_output_tokens,
        });
        if let Some(temperature) = self.settings.temperature {
            payload["temperature"] = json!(temperature);
        }

        let mut builder = self.http.post(self.endpoint()).json(&payload);
        if let Some(key) = self.api_key.as_deref() {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|error| {
            CompletionError::ProviderUnavailable(format!(
                "failed to reach completion API at {}: {error}",
                self.base_url
            ))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::GenerationFailed(format!(
                "completion API returned {status}: {body}"
            )));
        }

        let body: OpenAiResponse = response.json().await.map_err(|error| {
            CompletionError::InvalidResponse(format!(
                "failed to decode completion response: {error}"
            ))
        })?;

        let text = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or_else(|| CompletionError::InvalidResponse("response has no choices".into()))?;
        non_empty(text)
    }
}

fn non_empty(text: String) -> Result<String, CompletionError> {
    if text.trim().is_empty() {
        return Err(CompletionError::InvalidResponse(
            "provider returned an empty completion".into(),
        ));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn settings() -> ModelSettings {
        ModelSettings {
            model: "llama".into(),
            temperature: Some(0.0),
        }
    }

    fn http() -> Client {
        Client::builder()
            .user_agent("docflow-test")
            .build()
            .expect("client")
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            prompt: "Summarize".into(),
            max_output_tokens: 400,
        }
    }

    #[tokio::test]
    async fn ollama_client_sends_output_budget() {
        let server = MockServer::start_async().await;
        let client = OllamaCompletionClient {
            http: http(),
            base_url: server.base_url(),
            settings: settings(),
        };

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{"options": {"num_predict": 400}, "stream": false}"#);
                then.status(200).json_body(json!({
                    "response": "<summary>Done</summary>",
                    "done": true
                }));
            })
            .await;

        let text = client.complete(request()).await.expect("completion");

        mock.assert_async().await;
        assert_eq!(text, "<summary>Done</summary>");
    }

    #[tokio::test]
    async fn ollama_client_surfaces_error_status() {
        let server = MockServer::start_async().await;
        let client = OllamaCompletionClient {
            http: http(),
            base_url: server.base_url(),
            settings: settings(),
        };

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("boom");
            })
            .await;

        let error = client.complete(request()).await.expect_err("error response");
        assert!(
            matches!(&error, CompletionError::GenerationFailed(message) if message.contains("500")),
            "unexpected error: {error}"
        );
    }

    #[tokio::test]
    async fn openai_client_reads_first_choice() {
        let server = MockServer::start_async().await;
        let client = OpenAiCompletionClient {
            http: http(),
            base_url: server.base_url(),
            api_key: Some("secret".into()),
            settings: settings(),
        };

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/completions")
                    .header("authorization", "Bearer secret")
                    .json_body_partial(r#"{"model": "llama", "max_tokens": 400}"#);
                then.status(200).json_body(json!({
                    "choices": [{ "text": "<response>[Name]</response>" }]
                }));
            })
            .await;

        let text = client.complete(request()).await.expect("completion");

        mock.assert_async().await;
        assert_eq!(text, "<response>[Name]</response>");
    }

    #[tokio::test]
    async fn openai_client_rejects_empty_choices() {
        let server = MockServer::start_async().await;
        let client = OpenAiCompletionClient {
            http: http(),
            base_url: server.base_url(),
            api_key: None,
            settings: settings(),
        };

        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = client.complete(request()).await.expect_err("no choices");
        assert!(matches!(error, CompletionError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn blank_completion_is_malformed() {
        let server = MockServer::start_async().await;
        let client = OllamaCompletionClient {
            http: http(),
            base_url: server.base_url(),
            settings: settings(),
        };

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200)
                    .json_body(json!({ "response": "  \n", "done": true }));
            })
            .await;

        let error = client.complete(request()).await.expect_err("blank");
        assert!(matches!(error, CompletionError::InvalidResponse(_)));
    }
}
