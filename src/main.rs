//! Duskwave - Character Roleplay Chat API
//!
//! Relays chat messages to an OpenAI-compatible completion API in the voice
//! of a selected persona, falling back across models, and keeps a capped
//! history of past conversations.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod conversation;
mod core;
mod providers;
mod routes;

use config::{Config, PersonaRegistry};
use core::{ChatSession, CompletionRelay, ConversationStore, RelayConfig, SqliteStorage};
use providers::{OpenAICompatConfig, OpenAICompatProvider};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub personas: Arc<PersonaRegistry>,
    pub relay: Arc<CompletionRelay>,
    pub store: Arc<ConversationStore>,
    pub session: Arc<ChatSession>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duskwave=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let settings = config.load_settings()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    // Built-in personas, optionally extended or overridden from disk
    let mut registry = PersonaRegistry::builtin();
    if let Some(dir) = &config.personas_dir {
        let loaded = registry.load_dir(dir).await?;
        tracing::info!(dir = %dir.display(), loaded, "Loaded persona files");
    }
    tracing::info!("Serving {} persona(s)", registry.len());
    let personas = Arc::new(registry);

    let storage = Arc::new(
        SqliteStorage::new(
            &config.data_dir.join("duskwave.db"),
            settings.storage.quota_bytes,
        )
        .await?,
    );
    let store = Arc::new(ConversationStore::new(
        storage,
        settings.storage.max_conversations,
    ));

    if config.groq_api_key.is_none() {
        tracing::warn!("GROQ_API_KEY is not set, chat requests will fail");
    }

    let backend = Arc::new(OpenAICompatProvider::new(OpenAICompatConfig::new(
        config.groq_base_url.clone(),
    ))?);
    let relay = Arc::new(CompletionRelay::new(
        personas.clone(),
        backend,
        RelayConfig::new(config.groq_api_key.clone(), &settings.relay),
    ));
    let session = Arc::new(ChatSession::new(relay.clone(), store.clone()));

    let state = AppState {
        personas,
        relay,
        store,
        session,
    };

    let app = Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!(models = ?settings.relay.models, "Duskwave API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
