//! JSON-lines wire format
//!
//! One request per input line, one response per output line. Responses carry
//! the rendered fallback text so the output is readable without a template
//! renderer.

use parley_core::{OutgoingMessage, RecognizedSignals, Template, TurnOutcome};
use serde::{Deserialize, Serialize};

/// One input line
#[derive(Debug, Deserialize)]
pub struct TurnLine {
    /// Conversation the turn belongs to
    pub conversation: String,
    /// Raw user text
    #[serde(default)]
    pub text: String,
    /// NLU output for the text
    #[serde(default)]
    pub signals: RecognizedSignals,
    /// Forget the conversation instead of processing a turn
    #[serde(default)]
    pub reset: bool,
}

/// One rendered message
#[derive(Debug, Serialize)]
pub struct RenderedMessage {
    /// Response id
    pub template: Template,
    /// Fallback text with data filled in
    pub text: String,
    /// Suggested replies
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl From<&OutgoingMessage> for RenderedMessage {
    fn from(message: &OutgoingMessage) -> Self {
        Self {
            template: message.template,
            text: message.render(),
            choices: message.choices.clone(),
        }
    }
}

/// One output line
#[derive(Debug, Serialize)]
pub struct ResponseLine {
    /// Conversation the response belongs to
    pub conversation: String,
    /// Messages produced by the turn
    pub messages: Vec<RenderedMessage>,
    /// Whether a task is waiting for an answer
    pub still_active: bool,
}

impl ResponseLine {
    /// Response for a processed turn
    pub fn turn(conversation: String, outcome: &TurnOutcome) -> Self {
        Self {
            conversation,
            messages: outcome.messages.iter().map(RenderedMessage::from).collect(),
            still_active: outcome.still_active,
        }
    }

    /// Response for a reset
    pub fn reset(conversation: String) -> Self {
        Self {
            conversation,
            messages: Vec::new(),
            still_active: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::CalendarIntent;

    #[test]
    fn test_turn_line_defaults() {
        let line: TurnLine = serde_json::from_str(r#"{"conversation": "c1"}"#).unwrap();
        assert_eq!(line.conversation, "c1");
        assert!(line.text.is_empty());
        assert!(!line.reset);
        assert_eq!(line.signals.task_intent(), CalendarIntent::None);
    }

    #[test]
    fn test_turn_line_with_signals() {
        let line: TurnLine = serde_json::from_str(
            r#"{"conversation": "c1", "text": "book a meeting",
                "signals": {"task": {"intent": "CreateCalendarEntry", "score": 0.9}}}"#,
        )
        .unwrap();
        assert_eq!(line.signals.task_intent(), CalendarIntent::CreateCalendarEntry);
    }

    #[test]
    fn test_response_renders_text() {
        let outcome = TurnOutcome {
            messages: vec![OutgoingMessage::new(Template::EventCreated).with("title", "Sync")],
            still_active: false,
        };
        let json = serde_json::to_value(ResponseLine::turn("c1".into(), &outcome)).unwrap();
        assert_eq!(json["messages"][0]["template"], "event_created");
        assert!(json["messages"][0]["text"].as_str().unwrap().contains("Sync"));
        assert!(json["messages"][0].get("choices").is_none());
    }
}
