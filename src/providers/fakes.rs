//! Scripted completion backend for tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{CompletionBackend, CompletionRequest, CompletionResponse, ProviderError};

/// Replays queued responses in order and records every request it receives
#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<CompletionResponse, ProviderError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, response: CompletionResponse) -> Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn then_error(self, error: ProviderError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn reply(self, content: &str) -> Self {
        self.then(CompletionResponse::Completed {
            content: Some(content.to_string()),
        })
    }

    pub fn not_found(self, model: &str) -> Self {
        self.then(CompletionResponse::Rejected {
            status: 404,
            code: Some("model_not_found".to_string()),
            message: Some(format!("The model `{}` does not exist", model)),
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn attempted_models(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.model).collect()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(
        &self,
        _api_key: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Connection("script exhausted".to_string())))
    }
}
