//! Parley Gateway - chat-to-LLM relay with per-contact conversation history
//!
//! Every inbound chat message is appended to the sender's history, the whole
//! history is rendered into a prompt, and the model reply is stored and sent
//! back.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Channels                          │
//! │         WhatsApp (Cloud API webhook + send)          │
//! └────────────────────┬────────────────────────────────┘
//!                      │ IncomingMessage
//! ┌────────────────────▼────────────────────────────────┐
//! │            ConversationOrchestrator                  │
//! │  ConversationStore → PromptBuilder → ModelGateway    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │        Local backend  ──fallback──▶  Remote API      │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod channels;
pub mod config;
pub mod conversation;
pub mod daemon;
pub mod error;
pub mod history;
pub mod llm;
pub mod prompt;

pub use config::{BackendConfig, BackendMode, Config};
pub use conversation::{APOLOGY, ConversationOrchestrator};
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use history::{ContactSettings, ConversationStore, Identity, Speaker, Turn};
pub use llm::{BackendError, Completion, ModelGateway};
pub use prompt::PromptBuilder;
