//! API routes
//!
//! Every response is JSON, including errors (`{ "error": "..." }`) and
//! malformed request bodies.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::Persona;
use crate::conversation::{derive_title, sanitize_history, ConversationRecord, Message};
use crate::core::{RelayError, TurnOutcome};
use crate::AppState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Error body returned by every failing route
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Conversation not found")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<RelayError> for ApiError {
    fn from(error: RelayError) -> Self {
        let status = match error {
            RelayError::InvalidInput | RelayError::UnknownPersona { .. } => StatusCode::BAD_REQUEST,
            RelayError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Upstream { .. }
            | RelayError::EmptyReply { .. }
            | RelayError::AllModelsFailed { .. } => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, error.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::warn!(error = %rejection.body_text(), "Failed to parse request body");
        Self::new(StatusCode::BAD_REQUEST, "Invalid request format")
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Value,
    #[serde(default)]
    pub character: Option<String>,
    #[serde(default)]
    pub history: Value,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub success: bool,
    pub model: String,
}

#[derive(Debug, Deserialize)]
pub struct ConversationBody {
    #[serde(default)]
    pub title: Option<String>,
    pub character: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl ConversationBody {
    fn title(&self) -> String {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .unwrap_or_else(|| derive_title(&self.messages))
    }
}

/// A stored conversation plus the display name of its persona
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    #[serde(flatten)]
    pub record: ConversationRecord,
    pub persona_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub character: String,
    pub message: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn personas(State(state): State<AppState>) -> Json<Vec<Persona>> {
    Json(state.personas.iter().cloned().collect())
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;

    let message = request.message.as_str().unwrap_or_default();
    let character = request.character.as_deref().unwrap_or_default();
    let history = sanitize_history(&request.history);

    tracing::info!(character, history = history.len(), "Chat API called");

    let relayed = state.relay.relay(message, character, &history).await?;

    Ok(Json(ChatResponse {
        message: relayed.reply,
        success: true,
        model: relayed.model,
    }))
}

async fn list_conversations(State(state): State<AppState>) -> Json<Vec<ConversationView>> {
    let views = state
        .store
        .list()
        .await
        .into_iter()
        .map(|record| {
            let persona_name = state
                .personas
                .get_or_default(&record.persona_id)
                .map(|p| p.name.clone());
            ConversationView {
                record,
                persona_name,
            }
        })
        .collect();

    Json(views)
}

async fn create_conversation(
    State(state): State<AppState>,
    payload: Result<Json<ConversationBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = payload?;
    let title = body.title();

    match state.store.create(&title, &body.character, body.messages).await {
        Some(id) => Ok((StatusCode::CREATED, Json(json!({ "id": id })))),
        None => Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to save conversation",
        )),
    }
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationRecord>, ApiError> {
    state.store.get(&id).await.map(Json).ok_or_else(ApiError::not_found)
}

async fn update_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ConversationBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;
    let title = body.title();

    if state
        .store
        .update(&id, &title, &body.character, body.messages)
        .await
    {
        Ok(Json(json!({ "updated": true })))
    } else {
        Err(ApiError::not_found())
    }
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if state.store.delete(&id).await {
        Ok(Json(json!({ "deleted": true })))
    } else {
        Err(ApiError::not_found())
    }
}

async fn turn(
    State(state): State<AppState>,
    payload: Result<Json<TurnRequest>, JsonRejection>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let Json(request) = payload?;

    let outcome = state
        .session
        .turn(
            request.conversation_id.as_deref(),
            &request.character,
            &request.message,
        )
        .await?;

    Ok(Json(outcome))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/personas", get(personas))
        .route("/api/chat", post(chat))
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/api/conversations/:id",
            get(get_conversation)
                .put(update_conversation)
                .delete(delete_conversation),
        )
        .route("/api/sessions/turn", post(turn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::config::{PersonaRegistry, RelaySettings};
    use crate::core::{ChatSession, CompletionRelay, ConversationStore, RelayConfig, SqliteStorage};
    use crate::providers::fakes::ScriptedBackend;
    use crate::providers::CompletionResponse;

    async fn app(backend: ScriptedBackend, api_key: Option<&str>) -> Router {
        let personas = Arc::new(PersonaRegistry::builtin());
        let settings = RelaySettings {
            models: vec!["large".to_string(), "small".to_string()],
            ..RelaySettings::default()
        };
        let relay = Arc::new(CompletionRelay::new(
            personas.clone(),
            Arc::new(backend),
            RelayConfig::new(api_key.map(String::from), &settings),
        ));
        let storage = Arc::new(SqliteStorage::new_in_memory(0).await.unwrap());
        let store = Arc::new(ConversationStore::new(storage, 50));
        let session = Arc::new(ChatSession::new(relay.clone(), store.clone()));

        router().with_state(AppState {
            personas,
            relay,
            store,
            session,
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(ScriptedBackend::new(), Some("key")).await;
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_personas_hide_system_prompts() {
        let app = app(ScriptedBackend::new(), Some("key")).await;
        let (status, body) = send(&app, "GET", "/api/personas", None).await;

        assert_eq!(status, StatusCode::OK);
        let list = body.as_array().unwrap();
        assert_eq!(list.len(), 6);
        assert_eq!(list[0]["id"], "raiden-shogun");
        assert!(list[0].get("system_prompt").is_none());
    }

    #[tokio::test]
    async fn test_chat_success() {
        let backend = ScriptedBackend::new().not_found("large").reply("Steel speaks.");
        let app = app(backend, Some("key")).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/chat",
            Some(json!({
                "message": "Who are you?",
                "character": "sagiri",
                "history": [{ "role": "user", "content": "Hi" }]
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "message": "Steel speaks.", "success": true, "model": "small" })
        );
    }

    #[tokio::test]
    async fn test_chat_error_statuses() {
        let app_ok = app(ScriptedBackend::new(), Some("key")).await;

        let (status, body) = send(
            &app_ok,
            "POST",
            "/api/chat",
            Some(json!({ "message": "   ", "character": "sagiri" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("non-empty"));

        let (status, body) = send(
            &app_ok,
            "POST",
            "/api/chat",
            Some(json!({ "message": "Hi", "character": "paimon" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("arlecchino"));

        let no_key = app(ScriptedBackend::new(), None).await;
        let (status, body) = send(
            &no_key,
            "POST",
            "/api/chat",
            Some(json!({ "message": "Hi", "character": "sagiri" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("API key"));

        let upstream = app(
            ScriptedBackend::new().then(CompletionResponse::Completed { content: None }),
            Some("key"),
        )
        .await;
        let (status, body) = send(
            &upstream,
            "POST",
            "/api/chat",
            Some(json!({ "message": "Hi", "character": "sagiri" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "AI service returned empty response");
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_error() {
        let app = app(ScriptedBackend::new(), Some("key")).await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Invalid request format");
    }

    #[tokio::test]
    async fn test_conversation_crud() {
        let app = app(ScriptedBackend::new(), Some("key")).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/conversations",
            Some(json!({
                "character": "hoshimi-miyabi",
                "messages": [{ "role": "user", "content": "Any Hollows nearby?" }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["id"].as_str().unwrap().to_string();

        let (status, body) = send(&app, "GET", &format!("/api/conversations/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Any Hollows nearby?");
        assert_eq!(body["character"], "hoshimi-miyabi");

        let (status, _) = send(
            &app,
            "PUT",
            &format!("/api/conversations/{}", id),
            Some(json!({ "title": "Renamed", "character": "ghost", "messages": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "GET", "/api/conversations", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["title"], "Renamed");
        // Dangling persona falls back to the default persona's name
        assert_eq!(body[0]["personaName"], "Raiden Shogun");

        let (status, _) = send(&app, "DELETE", &format!("/api/conversations/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "DELETE", &format!("/api/conversations/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Conversation not found");

        let (status, _) = send(
            &app,
            "PUT",
            "/api/conversations/missing",
            Some(json!({ "character": "sagiri" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_session_turn() {
        let app = app(ScriptedBackend::new().reply("At your service."), Some("key")).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/sessions/turn",
            Some(json!({ "character": "saki-ayase", "message": "Good morning" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"]["content"], "At your service.");
        assert_eq!(body["reply"]["role"], "assistant");
        assert_eq!(body["model"], "large");
        assert_eq!(body["failed"], false);

        let id = body["conversationId"].as_str().unwrap();
        let (status, record) = send(&app, "GET", &format!("/api/conversations/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["messages"].as_array().unwrap().len(), 2);

        let (status, _) = send(
            &app,
            "POST",
            "/api/sessions/turn",
            Some(json!({ "character": "saki-ayase", "message": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
