//! Completion prompt assembled from conversation history

use std::fmt::Write;

use crate::history::{Speaker, Turn};

/// Turns a conversation history into a plain-text completion prompt
///
/// Each recognised turn becomes one `User: ...` or `Bot: ...` line, in
/// history order. Turns from any other speaker are left out.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder {
    max_turns: Option<usize>,
}

impl PromptBuilder {
    /// Builder that includes the full history
    #[must_use]
    pub const fn new() -> Self {
        Self { max_turns: None }
    }

    /// Keep only the most recent `max_turns` labelled turns
    ///
    /// `None` restores the unbounded default.
    #[must_use]
    pub const fn with_max_turns(mut self, max_turns: Option<usize>) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Render `turns` as a prompt
    #[must_use]
    pub fn build(&self, turns: &[Turn]) -> String {
        let lines: Vec<(&str, &str)> = turns
            .iter()
            .filter_map(|turn| role_label(&turn.speaker).map(|label| (label, turn.text.as_str())))
            .collect();

        let skip = self
            .max_turns
            .map_or(0, |max| lines.len().saturating_sub(max));

        lines
            .iter()
            .skip(skip)
            .fold(String::new(), |mut prompt, (label, text)| {
                let _ = writeln!(prompt, "{label}: {text}");
                prompt
            })
    }
}

const fn role_label(speaker: &Speaker) -> Option<&'static str> {
    match speaker {
        Speaker::User => Some("User"),
        Speaker::Bot => Some("Bot"),
        Speaker::Other(_) => None,
    }
}
