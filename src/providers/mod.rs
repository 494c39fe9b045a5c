//! Completion API integrations

#[cfg(test)]
pub(crate) mod fakes;
mod openai_compat;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::conversation::ChatMessage;

pub use openai_compat::{OpenAICompatConfig, OpenAICompatProvider};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Network error: could not reach the completion API ({0})")]
    Connection(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

/// One completion request, as sent to the endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// What came back from a single completion attempt
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionResponse {
    /// 2xx JSON response; `content` is the first choice's text, if any
    Completed { content: Option<String> },

    /// Non-2xx JSON response
    Rejected {
        status: u16,
        code: Option<String>,
        message: Option<String>,
    },

    /// Response body was not JSON
    NonJson { status: u16, body: String },
}

/// A chat completion endpoint the relay can send transcripts to
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Issue one completion request authenticated with `api_key`.
    ///
    /// Only transport failures are errors; every response the endpoint
    /// actually sends back is reported as a [`CompletionResponse`].
    async fn complete(
        &self,
        api_key: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;
}
