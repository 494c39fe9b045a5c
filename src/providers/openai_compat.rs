//! OpenAI-compatible provider
//!
//! Works with any API that implements the OpenAI chat completions format.
//! The default deployment points it at Groq (api.groq.com).
//!
//! Responses are not turned into errors here: the relay needs to see the
//! status, error code and content type of every answer to decide whether to
//! move on to the next candidate model.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{CompletionBackend, CompletionRequest, CompletionResponse, ProviderError};

/// How much of a non-JSON body is kept for diagnostics
const NON_JSON_SNIPPET_CHARS: usize = 200;

/// Chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Error response from API
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
    /// Usually a string, but some endpoints send numbers
    #[serde(default)]
    code: Option<Value>,
}

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone)]
pub struct OpenAICompatConfig {
    /// Base URL for the API (e.g., https://api.groq.com/openai/v1)
    pub base_url: String,
}

impl OpenAICompatConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

/// OpenAI-compatible API provider
pub struct OpenAICompatProvider {
    config: OpenAICompatConfig,
    client: Client,
}

impl OpenAICompatProvider {
    /// Create a new provider with the given configuration.
    ///
    /// No request timeout is set; a slow model holds up the fallback chain.
    pub fn new(config: OpenAICompatConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ProviderError::ClientBuild(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionBackend for OpenAICompatProvider {
    async fn complete(
        &self,
        api_key: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let response = self
            .client
            .post(self.completions_url())
            .header(AUTHORIZATION, format!("Bearer {}", api_key))
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ProviderError::Connection(e.to_string())
                } else {
                    ProviderError::RequestFailed(e)
                }
            })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        tracing::debug!(model = %request.model, status, "Completion response received");

        Ok(interpret_response(status, content_type.as_deref(), &body))
    }
}

/// Classify a raw HTTP response from the completions endpoint
fn interpret_response(status: u16, content_type: Option<&str>, body: &str) -> CompletionResponse {
    let is_json = content_type.map_or(false, |ct| ct.contains("application/json"));

    let parsed = if is_json {
        serde_json::from_str::<Value>(body).ok()
    } else {
        None
    };

    let Some(value) = parsed else {
        return CompletionResponse::NonJson {
            status,
            body: body.chars().take(NON_JSON_SNIPPET_CHARS).collect(),
        };
    };

    if (200..300).contains(&status) {
        let content = serde_json::from_value::<ChatCompletionResponse>(value)
            .ok()
            .and_then(|completion| completion.choices.into_iter().next())
            .and_then(|choice| choice.message.content);

        return CompletionResponse::Completed { content };
    }

    let (code, message) = match serde_json::from_value::<ErrorResponse>(value) {
        Ok(error_resp) => (
            error_resp
                .error
                .code
                .and_then(|code| code.as_str().map(String::from)),
            error_resp.error.message,
        ),
        Err(_) => (None, None),
    };

    CompletionResponse::Rejected {
        status,
        code,
        message,
    }
}
