//! Messaging channel adapters
//!
//! Each channel implements the `Channel` trait; inbound messages arrive on an
//! mpsc queue owned by the daemon.

mod whatsapp;

use async_trait::async_trait;

pub use whatsapp::{
    WhatsAppChannel, WhatsAppMessage, WhatsAppTextContent, WhatsAppWebhook, WhatsAppWebhookChange,
    WhatsAppWebhookEntry, WhatsAppWebhookValue,
};

use crate::Result;

/// A message from a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Message identifier (platform-specific)
    pub id: String,

    /// Sender transport address (e.g. `15551234567@c.us`)
    pub sender_id: String,

    /// Sender display name
    pub sender_name: String,

    /// Message content
    pub content: String,

    /// Whether this arrived in a group chat
    pub is_group: bool,
}

/// A message to send to a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Recipient transport address
    pub channel_id: String,

    /// Message content
    pub content: String,

    /// Optional reply-to message ID
    pub reply_to: Option<String>,
}

impl OutgoingMessage {
    /// Create a simple `text` message
    #[must_use]
    pub const fn text(channel_id: String, content: String) -> Self {
        Self {
            channel_id,
            content,
            reply_to: None,
        }
    }

    /// Create a `reply` message
    #[must_use]
    pub const fn reply(channel_id: String, content: String, reply_to: String) -> Self {
        Self {
            channel_id,
            content,
            reply_to: Some(reply_to),
        }
    }
}

/// Unified interface for messaging channels
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name (e.g. "whatsapp")
    fn name(&self) -> &'static str;

    /// Connect to the channel
    async fn connect(&mut self) -> Result<()>;

    /// Disconnect from the channel
    async fn disconnect(&mut self) -> Result<()>;

    /// Send a message
    async fn send(&self, message: OutgoingMessage) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;
}
