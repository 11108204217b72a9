//! Per-contact conversation history
//!
//! Each contact gets a directory holding an append-only JSONL log of turns
//! and a sidecar settings file.

mod identity;
mod store;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use identity::Identity;
pub use store::{ConversationStore, HISTORY_FILE, SETTINGS_FILE};

/// Who produced a turn
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Speaker {
    /// The contact on the chat side
    User,
    /// The model reply
    Bot,
    /// Any other label found in storage; kept on read, ignored by prompts
    Other(String),
}

impl Speaker {
    /// Label stored in the `sender` field
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
            Self::Other(label) => label,
        }
    }
}

impl From<String> for Speaker {
    fn from(label: String) -> Self {
        match label.as_str() {
            "user" => Self::User,
            "bot" => Self::Bot,
            _ => Self::Other(label),
        }
    }
}

impl From<Speaker> for String {
    fn from(speaker: Speaker) -> Self {
        match speaker {
            Speaker::User => "user".to_string(),
            Speaker::Bot => "bot".to_string(),
            Speaker::Other(label) => label,
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored message, user or bot
///
/// Serialized as `{"from", "message", "timestamp", "sender"}` with the
/// timestamp in unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Transport address the exchange belongs to
    #[serde(rename = "from")]
    pub origin: String,

    /// Message text
    #[serde(rename = "message")]
    pub text: String,

    /// When the turn was recorded
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    /// Who produced the turn
    #[serde(rename = "sender")]
    pub speaker: Speaker,
}

impl Turn {
    /// A turn from the contact, stamped now
    #[must_use]
    pub fn user(origin: impl Into<String>, text: impl Into<String>) -> Self {
        Self::now(origin, text, Speaker::User)
    }

    /// A model reply, stamped now
    #[must_use]
    pub fn bot(origin: impl Into<String>, text: impl Into<String>) -> Self {
        Self::now(origin, text, Speaker::Bot)
    }

    fn now(origin: impl Into<String>, text: impl Into<String>, speaker: Speaker) -> Self {
        Self {
            origin: origin.into(),
            text: text.into(),
            created_at: Utc::now(),
            speaker,
        }
    }
}

/// Per-contact settings stored beside the log
///
/// Reserved: no keys are interpreted yet, unknown keys survive a round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactSettings {
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
