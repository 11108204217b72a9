//! Completion response shapes
//!
//! Backends answer in one of a few JSON layouts. Each layout is a typed
//! decoder; they are tried in order and the first that yields text wins.

use serde::Deserialize;
use serde_json::Value;

/// A known completion response layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `{"results": [{"text": "..."}]}` (KoboldAI-style generate endpoints)
    Results,
    /// `{"choices": [{"message": {"content": "..."}}]}` (chat completions)
    ChatCompletion,
}

/// Shapes accepted from the local backend, in preference order
pub const LOCAL_SHAPES: &[ResponseShape] = &[ResponseShape::Results, ResponseShape::ChatCompletion];

/// Shapes accepted from the remote backend
pub const REMOTE_SHAPES: &[ResponseShape] = &[ResponseShape::ChatCompletion];

#[derive(Deserialize)]
struct ResultsBody {
    results: Vec<GeneratedText>,
}

#[derive(Deserialize)]
struct GeneratedText {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ChatBody {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ResponseShape {
    /// Decode `body` as this shape, returning the first generated text
    ///
    /// Missing, null, or empty text counts as no match.
    #[must_use]
    pub fn extract(self, body: &Value) -> Option<String> {
        let text = match self {
            Self::Results => ResultsBody::deserialize(body)
                .ok()?
                .results
                .into_iter()
                .next()?
                .text?,
            Self::ChatCompletion => ChatBody::deserialize(body)
                .ok()?
                .choices
                .into_iter()
                .next()?
                .message
                .content?,
        };

        (!text.is_empty()).then_some(text)
    }
}

/// Try `shapes` in order against `body`
#[must_use]
pub fn extract_text(body: &Value, shapes: &[ResponseShape]) -> Option<(ResponseShape, String)> {
    shapes
        .iter()
        .find_map(|shape| shape.extract(body).map(|text| (*shape, text)))
}
