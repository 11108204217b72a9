//! Gateway daemon
//!
//! Wires channels, the conversation pipeline, and the HTTP API together and
//! runs until Ctrl-C or the shutdown keyword.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::api::{ApiServer, ApiState};
use crate::channels::{Channel, IncomingMessage, OutgoingMessage, WhatsAppChannel};
use crate::conversation::ConversationOrchestrator;
use crate::history::ConversationStore;
use crate::llm::ModelGateway;
use crate::prompt::PromptBuilder;
use crate::{Config, Result};

/// Message sent to the chat before the bot stops
pub const SHUTDOWN_NOTICE: &str = "*_BOT SHUTDOWN_*";

/// What to do with an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Not for the bot (group chat, empty body)
    Ignore,
    /// Shutdown keyword from a direct chat
    Shutdown,
    /// Regular message to answer
    Converse,
}

impl Inbound {
    /// Classify `msg` against the configured shutdown keyword
    #[must_use]
    pub fn classify(msg: &IncomingMessage, shutdown_keyword: Option<&str>) -> Self {
        let body = msg.content.trim();
        if msg.is_group || body.is_empty() {
            return Self::Ignore;
        }
        if shutdown_keyword.is_some_and(|k| body.eq_ignore_ascii_case(k)) {
            return Self::Shutdown;
        }
        Self::Converse
    }
}

/// Build the conversation pipeline described by `config`
///
/// # Errors
///
/// Returns error if the model gateway cannot be created
pub fn build_orchestrator(config: &Config) -> Result<ConversationOrchestrator> {
    let store = ConversationStore::new(config.history.dir.clone());
    let prompts = PromptBuilder::new().with_max_turns(config.history.max_prompt_turns);
    let gateway = ModelGateway::new(Arc::new(config.backend.clone()))?;

    tracing::info!(
        mode = %config.backend.mode,
        history_dir = %store.root().display(),
        "conversation pipeline ready"
    );

    Ok(ConversationOrchestrator::new(store, prompts, Arc::new(gateway)))
}

/// Parley gateway daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    /// Create a new daemon
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until shutdown
    ///
    /// # Errors
    ///
    /// Returns error if the pipeline cannot be built
    pub async fn run(self) -> Result<()> {
        let orchestrator = Arc::new(build_orchestrator(&self.config)?);

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let ctrl_c_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = ctrl_c_tx.send(()).await;
            }
        });

        let mut whatsapp_handle = None;
        let mut verify_token = None;

        if let Some(wa) = &self.config.whatsapp {
            let (mut whatsapp, rx) =
                WhatsAppChannel::with_receiver(wa.access_token.clone(), wa.phone_number_id.clone());

            if let Err(e) = whatsapp.connect().await {
                tracing::error!(error = %e, "WhatsApp connect failed");
            } else {
                let whatsapp = Arc::new(whatsapp);
                whatsapp_handle = Some(Arc::clone(&whatsapp));
                verify_token.clone_from(&wa.verify_token);

                let orchestrator = Arc::clone(&orchestrator);
                let keyword = self.config.shutdown_keyword.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    handle_channel_messages(whatsapp, rx, orchestrator, keyword, shutdown_tx).await;
                });
            }
        } else {
            tracing::warn!("no messaging channel configured; only the HTTP API is running");
        }

        let api = ApiServer::new(
            ApiState {
                whatsapp: whatsapp_handle,
                whatsapp_verify_token: verify_token,
            },
            self.config.api_server.port,
        )
        .spawn();

        tracing::info!("parley gateway running");
        shutdown_rx.recv().await;
        tracing::info!("shutdown requested");

        api.abort();
        Ok(())
    }
}

/// Answer messages from one channel until its queue closes
///
/// Each message is handled on its own task so slow backends for one contact
/// do not hold up others. Returns once every in-flight reply has been sent.
pub async fn handle_channel_messages<C: Channel + 'static>(
    channel: Arc<C>,
    mut rx: mpsc::Receiver<IncomingMessage>,
    orchestrator: Arc<ConversationOrchestrator>,
    shutdown_keyword: Option<String>,
    shutdown_tx: mpsc::Sender<()>,
) {
    let channel_name = channel.name();
    tracing::info!(channel = channel_name, "channel handler started");

    let mut in_flight = JoinSet::new();

    while let Some(msg) = rx.recv().await {
        match Inbound::classify(&msg, shutdown_keyword.as_deref()) {
            Inbound::Ignore => {
                tracing::debug!(channel = channel_name, from = %msg.sender_id, "ignoring message");
            }
            Inbound::Shutdown => {
                tracing::info!(channel = channel_name, from = %msg.sender_id, "shutdown keyword received");
                let notice = OutgoingMessage::text(msg.sender_id.clone(), SHUTDOWN_NOTICE.to_string());
                if let Err(e) = channel.send(notice).await {
                    tracing::error!(error = %e, "failed to send shutdown notice");
                }
                let _ = shutdown_tx.send(()).await;
                break;
            }
            Inbound::Converse => {
                let channel = Arc::clone(&channel);
                let orchestrator = Arc::clone(&orchestrator);
                in_flight.spawn(async move {
                    let reply = orchestrator.handle(&msg.sender_id, &msg.content).await;
                    let outgoing = OutgoingMessage::reply(msg.sender_id.clone(), reply, msg.id);
                    if let Err(e) = channel.send(outgoing).await {
                        tracing::error!(to = %msg.sender_id, error = %e, "failed to send reply");
                    }
                });
            }
        }

        // Reap finished replies so the set does not grow unbounded
        while in_flight.try_join_next().is_some() {}
    }

    while in_flight.join_next().await.is_some() {}
    tracing::info!(channel = channel_name, "channel handler stopped");
}
