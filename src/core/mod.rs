//! Core chat components
//!
//! The relay talks to the completion API, the store keeps conversation
//! history, and the session ties the two together into chat turns.

mod relay;
mod session;
mod storage;
mod store;

pub use relay::{CompletionRelay, RelayConfig, RelayError};
pub use session::{ChatSession, TurnOutcome};
pub use storage::SqliteStorage;
pub use store::{ConversationStore, DEFAULT_MAX_CONVERSATIONS};
