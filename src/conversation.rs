//! Per-message conversation pipeline
//!
//! For every inbound message: record it, rebuild the prompt from the whole
//! contact history, ask the model, record the reply, return it.

use std::sync::Arc;

use crate::Result;
use crate::history::{ConversationStore, Identity, Turn};
use crate::llm::Completion;
use crate::prompt::PromptBuilder;

/// Reply sent when the pipeline itself breaks
pub const APOLOGY: &str = "Sorry, an error occurred while processing your message.";

/// Runs the store → prompt → model → store sequence for each message
///
/// Holds no per-contact state. Calls for different contacts run fully in
/// parallel; calls for the same contact may interleave their appends.
#[derive(Clone)]
pub struct ConversationOrchestrator {
    store: ConversationStore,
    prompts: PromptBuilder,
    model: Arc<dyn Completion>,
}

impl ConversationOrchestrator {
    /// Create an orchestrator
    #[must_use]
    pub fn new(store: ConversationStore, prompts: PromptBuilder, model: Arc<dyn Completion>) -> Self {
        Self {
            store,
            prompts,
            model,
        }
    }

    /// Conversation store in use
    #[must_use]
    pub const fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Handle one inbound message from `address` and return the reply text
    ///
    /// Always returns text: a completion, a backend `Error: ...` string, or
    /// [`APOLOGY`] if the pipeline fails.
    pub async fn handle(&self, address: &str, text: &str) -> String {
        match self.try_handle(address, text).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(from = %address, error = %e, "failed to process message");
                APOLOGY.to_string()
            }
        }
    }

    async fn try_handle(&self, address: &str, text: &str) -> Result<String> {
        let identity = Identity::from_address(address)?;
        tracing::info!(identity = %identity, "processing message");

        self.store.initialize(&identity).await;
        self.store.append(&identity, &Turn::user(address, text)).await;

        let turns = self.store.read_all(&identity).await;
        let prompt = self.prompts.build(&turns);
        tracing::debug!(identity = %identity, turns = turns.len(), prompt_chars = prompt.len(), "prompt built");

        let reply = self.model.complete(&prompt).await;

        self.store.append(&identity, &Turn::bot(address, reply.as_str())).await;
        Ok(reply)
    }
}
