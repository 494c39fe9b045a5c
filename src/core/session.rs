//! Chat turns: relay a message and keep the conversation history up to date
//!
//! A failed relay never breaks the session. The failure is turned into a
//! short assistant-authored notice, stored alongside the user's message,
//! and the conversation carries on from there.

use serde::Serialize;
use std::sync::Arc;

use crate::conversation::{derive_title, ChatMessage, Message};

use super::relay::{CandidateFailure, CompletionRelay, RelayError};
use super::store::ConversationStore;

/// Result of one turn
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    /// Conversation the turn was saved to, `None` if saving failed
    pub conversation_id: Option<String>,

    /// The assistant reply, or a notice describing why there is none
    pub reply: Message,

    /// Model that produced the reply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    pub failed: bool,
}

/// How a relay failure is presented to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    Credential,
    RateLimited,
    Network,
    Other,
}

impl FailureCategory {
    pub fn of(error: &RelayError) -> Self {
        match error {
            RelayError::Configuration(_) => Self::Credential,
            RelayError::Upstream { status, message, .. } => {
                if *status == 401 || *status == 403 || message.contains("API key") {
                    Self::Credential
                } else if *status == 429 || message.to_lowercase().contains("rate limit") {
                    Self::RateLimited
                } else {
                    Self::Other
                }
            }
            RelayError::AllModelsFailed {
                last_failure: Some(CandidateFailure::Transport { .. }),
            } => Self::Network,
            _ => Self::Other,
        }
    }
}

/// The assistant-authored text shown in place of a reply
pub fn failure_notice(error: &RelayError) -> String {
    match FailureCategory::of(error) {
        FailureCategory::Credential => {
            "API key issue. Please check the completion API key configuration.".to_string()
        }
        FailureCategory::RateLimited => {
            "Rate limit reached. Please wait a moment before trying again.".to_string()
        }
        FailureCategory::Network => {
            "Network error. The AI service could not be reached, please try again.".to_string()
        }
        FailureCategory::Other => format!("Sorry, something went wrong: {}", error),
    }
}

/// Runs chat turns against the relay and persists them
pub struct ChatSession {
    relay: Arc<CompletionRelay>,
    store: Arc<ConversationStore>,
}

impl ChatSession {
    pub fn new(relay: Arc<CompletionRelay>, store: Arc<ConversationStore>) -> Self {
        Self { relay, store }
    }

    /// Send `message` to `persona_id`, continuing `conversation_id` if it exists
    pub async fn turn(
        &self,
        conversation_id: Option<&str>,
        persona_id: &str,
        message: &str,
    ) -> Result<TurnOutcome, RelayError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(RelayError::InvalidInput);
        }
        // Unknown personas are never persisted, whatever else fails later
        self.relay.persona(persona_id)?;

        let existing = match conversation_id {
            Some(id) => {
                let record = self.store.get(id).await;
                if record.is_none() {
                    tracing::warn!(%id, "Unknown conversation, starting a new one");
                }
                record
            }
            None => None,
        };

        let mut messages = existing
            .as_ref()
            .map(|record| record.messages.clone())
            .unwrap_or_default();
        let history: Vec<ChatMessage> = messages.iter().map(ChatMessage::from).collect();

        let result = self.relay.relay(message, persona_id, &history).await;

        messages.push(Message::user(message));

        let (reply, model, failed) = match result {
            Ok(relayed) => (Message::assistant(relayed.reply), Some(relayed.model), false),
            Err(error @ (RelayError::InvalidInput | RelayError::UnknownPersona { .. })) => {
                return Err(error)
            }
            Err(error) => {
                tracing::warn!(%error, "Chat turn failed");
                (Message::assistant(failure_notice(&error)), None, true)
            }
        };
        messages.push(reply.clone());

        let title = derive_title(&messages);
        let conversation_id = match existing {
            Some(record) => {
                if self
                    .store
                    .update(&record.id, &title, persona_id, messages)
                    .await
                {
                    Some(record.id)
                } else {
                    None
                }
            }
            None => self.store.create(&title, persona_id, messages).await,
        };

        Ok(TurnOutcome {
            conversation_id,
            reply,
            model,
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PersonaRegistry;
    use crate::conversation::Role;
    use crate::core::relay::RelayConfig;
    use crate::core::storage::SqliteStorage;
    use crate::core::store::DEFAULT_MAX_CONVERSATIONS;
    use crate::providers::fakes::ScriptedBackend;
    use crate::providers::CompletionResponse;

    async fn session_with(
        backend: Arc<ScriptedBackend>,
        api_key: Option<&str>,
    ) -> (ChatSession, Arc<ConversationStore>) {
        let config = RelayConfig {
            api_key: api_key.map(String::from),
            models: vec!["large".to_string(), "small".to_string()],
            max_tokens: 1000,
            temperature: 0.7,
            history_window: 10,
        };
        let relay = Arc::new(CompletionRelay::new(
            Arc::new(PersonaRegistry::builtin()),
            backend,
            config,
        ));
        let storage = Arc::new(SqliteStorage::new_in_memory(0).await.unwrap());
        let store = Arc::new(ConversationStore::new(storage, DEFAULT_MAX_CONVERSATIONS));
        (ChatSession::new(relay, store.clone()), store)
    }

    #[tokio::test]
    async fn test_turns_continue_a_conversation() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .reply("I am the Shogun.")
                .reply("Eternity is unchanging."),
        );
        let (session, store) = session_with(backend.clone(), Some("key")).await;

        let first = session
            .turn(None, "raiden-shogun", "Who are you?")
            .await
            .unwrap();
        assert!(!first.failed);
        assert_eq!(first.model.as_deref(), Some("large"));
        let id = first.conversation_id.unwrap();

        let second = session
            .turn(Some(&id), "raiden-shogun", "What is eternity?")
            .await
            .unwrap();
        assert_eq!(second.conversation_id.as_deref(), Some(id.as_str()));

        // Second request carries the first exchange as history
        let requests = backend.requests();
        let transcript = &requests[1].messages;
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript[1], ChatMessage::user("Who are you?"));
        assert_eq!(transcript[2], ChatMessage::assistant("I am the Shogun."));

        let records = store.list().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Who are you?");
        assert_eq!(records[0].messages.len(), 4);
    }

    #[tokio::test]
    async fn test_failed_turn_stores_notice() {
        let backend = Arc::new(ScriptedBackend::new().then(CompletionResponse::Rejected {
            status: 429,
            code: Some("rate_limit_exceeded".to_string()),
            message: Some("Rate limit reached for model `large`".to_string()),
        }));
        let (session, store) = session_with(backend, Some("key")).await;

        let outcome = session.turn(None, "sagiri", "Hello").await.unwrap();

        assert!(outcome.failed);
        assert!(outcome.model.is_none());
        assert_eq!(outcome.reply.role, Role::Assistant);
        assert!(outcome.reply.content.starts_with("Rate limit reached"));

        let record = store.get(&outcome.conversation_id.unwrap()).await.unwrap();
        assert_eq!(record.messages.len(), 2);
        assert_eq!(record.messages[1].content, outcome.reply.content);
    }

    #[tokio::test]
    async fn test_blank_message_is_rejected_and_not_stored() {
        let backend = Arc::new(ScriptedBackend::new());
        let (session, store) = session_with(backend, Some("key")).await;

        let err = session.turn(None, "sagiri", "   ").await.unwrap_err();
        assert_eq!(err, RelayError::InvalidInput);
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_persona_is_rejected_and_not_stored() {
        let backend = Arc::new(ScriptedBackend::new());
        let (session, store) = session_with(backend, Some("key")).await;

        let err = session.turn(None, "paimon", "Hello").await.unwrap_err();
        assert!(matches!(err, RelayError::UnknownPersona { .. }));
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_persona_without_key_is_not_stored() {
        let backend = Arc::new(ScriptedBackend::new());
        let (session, store) = session_with(backend.clone(), None).await;

        let err = session.turn(None, "paimon", "Hello").await.unwrap_err();
        assert!(matches!(err, RelayError::UnknownPersona { .. }));
        assert!(store.list().await.is_empty());
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_conversation_starts_fresh() {
        let backend = Arc::new(ScriptedBackend::new().reply("Hello there."));
        let (session, _) = session_with(backend, Some("key")).await;

        let outcome = session
            .turn(Some("does-not-exist"), "columbina", "Hi")
            .await
            .unwrap();
        let id = outcome.conversation_id.unwrap();
        assert_ne!(id, "does-not-exist");
    }

    #[test]
    fn test_failure_categories() {
        assert_eq!(
            FailureCategory::of(&RelayError::Configuration("API key not found".into())),
            FailureCategory::Credential
        );
        assert_eq!(
            FailureCategory::of(&RelayError::Upstream {
                model: "m".into(),
                status: 401,
                message: "Invalid API Key".into(),
            }),
            FailureCategory::Credential
        );
        assert_eq!(
            FailureCategory::of(&RelayError::AllModelsFailed {
                last_failure: Some(CandidateFailure::Transport {
                    model: "m".into(),
                    message: "connection refused".into(),
                }),
            }),
            FailureCategory::Network
        );
        assert_eq!(
            FailureCategory::of(&RelayError::EmptyReply { model: "m".into() }),
            FailureCategory::Other
        );
        assert!(failure_notice(&RelayError::EmptyReply { model: "m".into() })
            .contains("AI service returned empty response"));
    }

    #[tokio::test]
    async fn test_missing_key_yields_credential_notice() {
        let backend = Arc::new(ScriptedBackend::new());
        let (session, _) = session_with(backend.clone(), None).await;

        let outcome = session.turn(None, "sagiri", "Hello").await.unwrap();
        assert!(outcome.failed);
        assert!(outcome.reply.content.starts_with("API key issue"));
        assert!(backend.requests().is_empty());
    }
}
