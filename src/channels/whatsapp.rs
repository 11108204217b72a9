//! `WhatsApp` channel adapter
//!
//! Uses the `WhatsApp` Business Cloud API for sending.
//! Messages are received through the webhook endpoint in `api`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::mpsc;

use super::{Channel, IncomingMessage, OutgoingMessage};
use crate::{Error, Result};

/// Cloud API base URL
const GRAPH_API_BASE: &str = "https://graph.facebook.com/v18.0";

/// `WhatsApp` channel adapter
pub struct WhatsAppChannel {
    /// `WhatsApp` Business API access token
    access_token: String,
    /// Phone number ID for sending messages
    phone_number_id: String,
    api_base: String,
    client: Client,
    message_tx: Option<mpsc::Sender<IncomingMessage>>,
    connected: bool,
}

impl WhatsAppChannel {
    /// Create a new `WhatsApp` channel adapter
    ///
    /// # Arguments
    ///
    /// * `access_token` - `WhatsApp` Business API access token
    /// * `phone_number_id` - Phone number ID registered with `WhatsApp` Business
    #[must_use]
    pub fn new(access_token: String, phone_number_id: String) -> Self {
        Self {
            access_token,
            phone_number_id,
            api_base: GRAPH_API_BASE.to_string(),
            client: Client::new(),
            message_tx: None,
            connected: false,
        }
    }

    /// Create with a message receiver
    ///
    /// Returns the channel and a receiver for incoming messages
    #[must_use]
    pub fn with_receiver(
        access_token: String,
        phone_number_id: String,
    ) -> (Self, mpsc::Receiver<IncomingMessage>) {
        let (tx, rx) = mpsc::channel(100);
        let mut channel = Self::new(access_token, phone_number_id);
        channel.message_tx = Some(tx);
        (channel, rx)
    }

    /// Point the adapter at a different Graph API base URL
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Process an incoming `WhatsApp` webhook event
    ///
    /// Forwards every text message in the payload to the receiver and returns
    /// how many were forwarded.
    ///
    /// # Errors
    ///
    /// Returns error if message forwarding fails
    pub async fn handle_webhook(&self, payload: &WhatsAppWebhook) -> Result<usize> {
        let messages = payload.incoming_messages();
        let count = messages.len();

        if let Some(tx) = &self.message_tx {
            for incoming in messages {
                tx.send(incoming)
                    .await
                    .map_err(|e| Error::Channel(format!("Failed to forward message: {e}")))?;
            }
        }

        Ok(count)
    }

    /// Send a text message to a `WhatsApp` number
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn send_text(&self, to: &str, text: &str, reply_to: Option<&str>) -> Result<()> {
        let url = format!("{}/{}/messages", self.api_base, self.phone_number_id);

        // Link previews mangle code blocks
        let has_code = text.contains("```");

        let mut body = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": {
                "body": text,
                "preview_url": !has_code
            }
        });

        if let Some(message_id) = reply_to {
            body["context"] = serde_json::json!({
                "message_id": message_id
            });
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("WhatsApp API error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!(
                "WhatsApp API error: {status} - {body}"
            )));
        }

        tracing::debug!(to, "WhatsApp message sent");
        Ok(())
    }
}

#[async_trait]
impl Channel for WhatsAppChannel {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    async fn connect(&mut self) -> Result<()> {
        // WhatsApp uses webhooks; "connect" validates the configuration
        if self.access_token.is_empty() {
            return Err(Error::Channel(
                "WhatsApp access token required".to_string(),
            ));
        }
        if self.phone_number_id.is_empty() {
            return Err(Error::Channel(
                "WhatsApp phone number ID required".to_string(),
            ));
        }

        self.connected = true;
        tracing::info!("WhatsApp channel connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        tracing::info!("WhatsApp channel disconnected");
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        self.send_text(&message.channel_id, &message.content, message.reply_to.as_deref())
            .await
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// `WhatsApp` webhook payload from Cloud API
#[derive(Debug, Deserialize)]
pub struct WhatsAppWebhook {
    /// Webhook entries
    #[serde(default)]
    pub entry: Vec<WhatsAppWebhookEntry>,
}

impl WhatsAppWebhook {
    /// Text messages carried by this payload, in delivery order
    ///
    /// Non-text messages (media, reactions, status updates) are skipped.
    #[must_use]
    pub fn incoming_messages(&self) -> Vec<IncomingMessage> {
        self.entry
            .iter()
            .flat_map(|entry| &entry.changes)
            .flat_map(|change| {
                let value = &change.value;
                value
                    .messages
                    .iter()
                    .flatten()
                    .filter_map(move |msg| {
                        let body = msg.text.as_ref()?.body.trim();
                        if body.is_empty() {
                            return None;
                        }
                        Some(IncomingMessage {
                            id: msg.id.clone(),
                            sender_id: msg.from.clone(),
                            sender_name: value
                                .profile_name(&msg.from)
                                .unwrap_or(msg.from.as_str())
                                .to_string(),
                            content: body.to_string(),
                            // Cloud API only delivers 1:1 conversations
                            is_group: false,
                        })
                    })
            })
            .collect()
    }
}

/// `WhatsApp` webhook entry
#[derive(Debug, Deserialize)]
pub struct WhatsAppWebhookEntry {
    /// Changes in this entry
    #[serde(default)]
    pub changes: Vec<WhatsAppWebhookChange>,
}

/// `WhatsApp` webhook change
#[derive(Debug, Deserialize)]
pub struct WhatsAppWebhookChange {
    /// The change value
    pub value: WhatsAppWebhookValue,
}

/// `WhatsApp` webhook value containing messages
#[derive(Debug, Deserialize)]
pub struct WhatsAppWebhookValue {
    /// Sender profiles for the messages
    pub contacts: Option<Vec<WhatsAppContact>>,
    /// Incoming messages (if any)
    pub messages: Option<Vec<WhatsAppMessage>>,
}

impl WhatsAppWebhookValue {
    fn profile_name(&self, wa_id: &str) -> Option<&str> {
        self.contacts
            .iter()
            .flatten()
            .find(|c| c.wa_id == wa_id)
            .and_then(|c| c.profile.as_ref())
            .map(|p| p.name.as_str())
    }
}

/// `WhatsApp` contact attached to a webhook value
#[derive(Debug, Deserialize)]
pub struct WhatsAppContact {
    /// `WhatsApp` ID (phone number)
    pub wa_id: String,
    /// Public profile
    pub profile: Option<WhatsAppProfile>,
}

/// `WhatsApp` public profile
#[derive(Debug, Deserialize)]
pub struct WhatsAppProfile {
    /// Display name
    pub name: String,
}

/// `WhatsApp` message
#[derive(Debug, Deserialize)]
pub struct WhatsAppMessage {
    /// Sender phone number
    pub from: String,
    /// Message ID
    pub id: String,
    /// Message timestamp
    pub timestamp: String,
    /// Message type
    #[serde(rename = "type")]
    pub message_type: String,
    /// Text content (for text messages)
    pub text: Option<WhatsAppTextContent>,
}

/// `WhatsApp` text message content
#[derive(Debug, Deserialize)]
pub struct WhatsAppTextContent {
    /// Message body
    pub body: String,
}
