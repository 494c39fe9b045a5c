//! Completion relay with multi-model fallback
//!
//! The relay turns one user message into one assistant reply:
//! 1. Validates the message, the API credential and the persona
//! 2. Builds the transcript (persona prompt, recent history, new message)
//! 3. Tries each candidate model in priority order
//! 4. Returns the first usable reply, or the reason none was produced
//!
//! Each attempt ends in one of three ways: a reply, a per-model failure that
//! moves on to the next candidate, or a fatal error that stops the chain.

use std::fmt;
use std::sync::Arc;

use crate::config::{Persona, PersonaRegistry, RelaySettings};
use crate::conversation::ChatMessage;
use crate::providers::{CompletionBackend, CompletionRequest, CompletionResponse};

/// Upstream error codes meaning "this model can't serve requests, try another"
const UNAVAILABLE_MODEL_CODES: [&str; 2] = ["model_decommissioned", "model_not_found"];

/// Everything the relay needs besides the personas and the backend
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bearer credential for the completion API
    pub api_key: Option<String>,

    /// Candidate models in priority order
    pub models: Vec<String>,

    pub max_tokens: u32,

    pub temperature: f32,

    /// Most recent history entries kept in the transcript
    pub history_window: usize,
}

impl RelayConfig {
    pub fn new(api_key: Option<String>, settings: &RelaySettings) -> Self {
        Self {
            api_key,
            models: settings.models.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            history_window: settings.history_window,
        }
    }
}

/// A successful relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReply {
    pub reply: String,
    /// The candidate that produced the reply
    pub model: String,
}

/// A per-candidate failure that moves the relay on to the next model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateFailure {
    /// The endpoint answered with something other than JSON
    NonJsonResponse { model: String },

    /// The model is decommissioned or unknown to the endpoint
    ModelUnavailable { model: String, message: String },

    /// The endpoint could not be reached
    Transport { model: String, message: String },
}

impl fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonJsonResponse { model } => {
                write!(f, "Non-JSON response from AI service ({})", model)
            }
            Self::ModelUnavailable { message, .. } | Self::Transport { message, .. } => {
                f.write_str(message)
            }
        }
    }
}

/// Errors from the relay
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RelayError {
    #[error("Message is required and must be a non-empty string")]
    InvalidInput,

    #[error(
        "Invalid character selected: {requested}. Available characters: {}",
        .available.join(", ")
    )]
    UnknownPersona {
        requested: String,
        available: Vec<String>,
    },

    #[error("Server configuration error: {0}")]
    Configuration(String),

    #[error("{message}")]
    Upstream {
        model: String,
        status: u16,
        message: String,
    },

    #[error("AI service returned empty response")]
    EmptyReply { model: String },

    #[error("All available models failed. Last error: {}", describe_last(.last_failure))]
    AllModelsFailed {
        last_failure: Option<CandidateFailure>,
    },
}

fn describe_last(failure: &Option<CandidateFailure>) -> String {
    match failure {
        Some(failure) => failure.to_string(),
        None => "no models configured".to_string(),
    }
}

/// Outcome of a single candidate attempt
enum Attempt {
    Reply(String),
    Next(CandidateFailure),
    Fatal(RelayError),
}

/// Forwards messages to the completion API on behalf of a persona
pub struct CompletionRelay {
    personas: Arc<PersonaRegistry>,
    backend: Arc<dyn CompletionBackend>,
    config: RelayConfig,
}

impl CompletionRelay {
    pub fn new(
        personas: Arc<PersonaRegistry>,
        backend: Arc<dyn CompletionBackend>,
        config: RelayConfig,
    ) -> Self {
        Self {
            personas,
            backend,
            config,
        }
    }

    /// Relay `message` as `persona_id`, with `history` as prior context
    pub async fn relay(
        &self,
        message: &str,
        persona_id: &str,
        history: &[ChatMessage],
    ) -> Result<RelayReply, RelayError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(RelayError::InvalidInput);
        }

        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            tracing::error!("GROQ_API_KEY environment variable is not set");
            RelayError::Configuration("API key not found".to_string())
        })?;

        let persona = self.persona(persona_id)?;

        tracing::info!(
            persona = %persona.name,
            history = history.len(),
            "Relaying message"
        );

        let mut request = CompletionRequest {
            model: String::new(),
            messages: self.build_transcript(persona, history, message),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let mut last_failure = None;

        for model in &self.config.models {
            tracing::info!(%model, "Trying model");
            request.model = model.clone();

            match self.attempt(api_key, &request).await {
                Attempt::Reply(reply) => {
                    tracing::info!(%model, "Generated response");
                    return Ok(RelayReply {
                        reply,
                        model: model.clone(),
                    });
                }
                Attempt::Next(failure) => {
                    tracing::warn!(%model, error = %failure, "Model failed, trying next candidate");
                    last_failure = Some(failure);
                }
                Attempt::Fatal(error) => {
                    tracing::error!(%model, %error, "Model request failed");
                    return Err(error);
                }
            }
        }

        Err(RelayError::AllModelsFailed { last_failure })
    }

    /// Resolve a persona id, listing the valid ids when it is unknown
    pub fn persona(&self, persona_id: &str) -> Result<&Persona, RelayError> {
        self.personas.get(persona_id).ok_or_else(|| {
            let available: Vec<String> =
                self.personas.ids().into_iter().map(String::from).collect();
            tracing::warn!(persona = %persona_id, ?available, "Invalid character");
            RelayError::UnknownPersona {
                requested: persona_id.to_string(),
                available,
            }
        })
    }

    /// System prompt, then the most recent history, then the new message
    fn build_transcript(
        &self,
        persona: &Persona,
        history: &[ChatMessage],
        message: &str,
    ) -> Vec<ChatMessage> {
        let start = history.len().saturating_sub(self.config.history_window);
        let recent = &history[start..];

        let mut messages = Vec::with_capacity(recent.len() + 2);
        messages.push(ChatMessage::system(persona.system_prompt.clone()));
        messages.extend(recent.iter().cloned());
        messages.push(ChatMessage::user(message));
        messages
    }

    async fn attempt(&self, api_key: &str, request: &CompletionRequest) -> Attempt {
        let model = request.model.clone();

        let response = match self.backend.complete(api_key, request).await {
            Ok(response) => response,
            Err(e) => {
                return Attempt::Next(CandidateFailure::Transport {
                    model,
                    message: e.to_string(),
                })
            }
        };

        match response {
            CompletionResponse::Completed { content } => {
                match content.filter(|c| !c.is_empty()) {
                    Some(reply) => Attempt::Reply(reply),
                    None => Attempt::Fatal(RelayError::EmptyReply { model }),
                }
            }
            CompletionResponse::NonJson { status, body } => {
                tracing::debug!(%model, status, %body, "Non-JSON response");
                Attempt::Next(CandidateFailure::NonJsonResponse { model })
            }
            CompletionResponse::Rejected {
                status,
                code,
                message,
            } => {
                let unavailable = status == 404
                    || code
                        .as_deref()
                        .map_or(false, |c| UNAVAILABLE_MODEL_CODES.contains(&c));

                if unavailable {
                    let message =
                        message.unwrap_or_else(|| format!("Model {} not available", model));
                    Attempt::Next(CandidateFailure::ModelUnavailable { model, message })
                } else {
                    let message =
                        message.unwrap_or_else(|| format!("AI service error with model {}", model));
                    Attempt::Fatal(RelayError::Upstream {
                        model,
                        status,
                        message,
                    })
                }
            }
        }
    }
}
