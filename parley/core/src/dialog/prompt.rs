//! Prompts and answer recognition
//!
//! A step that needs input returns a [`PromptSpec`]. On the next turn the
//! engine recognizes the user's answer against the prompt's [`PromptKind`]
//! and hands the step a typed [`StepResult`]. Recognition failure is not an
//! error; the engine re-asks within the retry bound.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::StepResult;
use crate::messages::OutgoingMessage;
use crate::recognizer::{
    CalendarIntent, EntityKind, GeneralIntent, RecognizedSignals, Resolution,
};

/// Direction for a paged choice list
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageMove {
    /// Following page
    Next,
    /// Preceding page
    Previous,
}

/// One offered choice
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Canonical value, also what is displayed
    pub value: String,
    /// Other answers that select it
    #[serde(default)]
    pub synonyms: Vec<String>,
}

impl Choice {
    /// Choice with synonyms
    pub fn new(value: impl Into<String>, synonyms: Vec<String>) -> Self {
        Self {
            value: value.into(),
            synonyms,
        }
    }
}

/// The choice the user picked
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundChoice {
    /// Position in the offered list
    pub index: usize,
    /// Its canonical value
    pub value: String,
}

/// What kind of answer a prompt expects
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PromptKind {
    /// Any non-empty text
    Text,
    /// Yes or no
    Confirm,
    /// One of a list
    Choice {
        /// Offered choices
        choices: Vec<Choice>,
        /// Whether next/previous page requests are understood
        paging: bool,
    },
    /// Date and/or time
    DateTime,
    /// A number
    Number,
    /// A length of time
    Duration,
}

/// A question plus how to recognize and re-ask it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromptSpec {
    /// First ask
    pub prompt: OutgoingMessage,
    /// Re-ask; the first ask is repeated when absent
    #[serde(default)]
    pub retry: Option<OutgoingMessage>,
    /// Expected answer
    pub kind: PromptKind,
    /// Attempts before giving up; configuration default when absent
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl PromptSpec {
    fn with_kind(prompt: OutgoingMessage, kind: PromptKind) -> Self {
        Self {
            prompt: prompt.expecting_reply(),
            retry: None,
            kind,
            max_attempts: None,
        }
    }

    /// Free-text question
    #[must_use]
    pub fn text(prompt: OutgoingMessage) -> Self {
        Self::with_kind(prompt, PromptKind::Text)
    }

    /// Yes/no question
    #[must_use]
    pub fn confirm(prompt: OutgoingMessage) -> Self {
        Self::with_kind(prompt, PromptKind::Confirm)
    }

    /// Choice question; the choice values are attached to the message
    #[must_use]
    pub fn choice(prompt: OutgoingMessage, choices: Vec<Choice>, paging: bool) -> Self {
        let labels = choices.iter().map(|c| c.value.clone()).collect();
        Self::with_kind(
            prompt.with_choices(labels),
            PromptKind::Choice { choices, paging },
        )
    }

    /// Date/time question
    #[must_use]
    pub fn date_time(prompt: OutgoingMessage) -> Self {
        Self::with_kind(prompt, PromptKind::DateTime)
    }

    /// Number question
    #[must_use]
    pub fn number(prompt: OutgoingMessage) -> Self {
        Self::with_kind(prompt, PromptKind::Number)
    }

    /// Duration question
    #[must_use]
    pub fn duration(prompt: OutgoingMessage) -> Self {
        Self::with_kind(prompt, PromptKind::Duration)
    }

    /// Use a different message when re-asking
    #[must_use]
    pub fn with_retry(mut self, retry: OutgoingMessage) -> Self {
        let mut retry = retry.expecting_reply();
        retry.choices.clone_from(&self.prompt.choices);
        self.retry = Some(retry);
        self
    }

    /// Override the attempt bound
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Message to send when re-asking
    #[must_use]
    pub fn retry_message(&self) -> OutgoingMessage {
        self.retry.as_ref().unwrap_or(&self.prompt).resend()
    }
}

/// A prompt waiting for its answer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingPrompt {
    /// The question
    pub spec: PromptSpec,
    /// Step that asked it
    pub step: usize,
    /// Failed answers so far
    #[serde(default)]
    pub attempts: u32,
}

// ============================================================================
// Lexicons
// ============================================================================

const YES_WORDS: &[&str] = &[
    "yes", "y", "yeah", "yep", "sure", "ok", "okay", "confirm", "correct", "right",
];
const NO_WORDS: &[&str] = &["no", "n", "nope", "nah", "not now", "wrong"];
const SKIP_WORDS: &[&str] = &["skip", "no one", "nobody", "just me", "myself", "none"];
const NEXT_WORDS: &[&str] = &["next", "more", "show more", "next page", "next one"];
const PREVIOUS_WORDS: &[&str] = &["previous", "back", "prev", "previous page", "go back"];

const ORDINALS: [&str; 10] = [
    "first", "second", "third", "fourth", "fifth", "sixth", "seventh", "eighth", "ninth",
    "tenth",
];
const NUMBER_WORDS: [&str; 20] = [
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "eleven",
    "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen", "twenty",
];

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d+").unwrap());
static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+|an?|one|two|three|four|five|six|ten|fifteen|twenty|thirty|forty five|forty-five)\s*(minutes?|mins?|m|hours?|hrs?|h)\b").unwrap()
});
/// Longest meeting a duration answer may ask for
pub const MAX_DURATION_SECS: i64 = 31 * 24 * 3600;

static HALF_HOUR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bhalf\s+(an\s+)?hour\b").unwrap());

/// Lowercase, trim and drop trailing punctuation
#[must_use]
pub fn normalize(text: &str) -> String {
    text.trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .trim()
        .to_lowercase()
}

/// Whether the text means "nobody else / skip"
#[must_use]
pub fn is_skip(text: &str) -> bool {
    SKIP_WORDS.contains(&normalize(text).as_str())
}

/// Yes/no from the lexicon
#[must_use]
pub fn parse_confirm(text: &str) -> Option<bool> {
    let norm = normalize(text);
    if YES_WORDS.contains(&norm.as_str()) {
        return Some(true);
    }
    if NO_WORDS.contains(&norm.as_str()) {
        return Some(false);
    }
    let first = norm.split_whitespace().next()?;
    if YES_WORDS.contains(&first) {
        Some(true)
    } else if NO_WORDS.contains(&first) {
        Some(false)
    } else {
        None
    }
}

/// Zero-based position named by an ordinal word, `last` resolving against `len`
#[must_use]
pub fn ordinal_index(text: &str, len: usize) -> Option<usize> {
    let norm = normalize(text);
    for word in norm.split_whitespace() {
        if let Some(pos) = ORDINALS.iter().position(|o| *o == word) {
            return Some(pos);
        }
        if word == "last" && len > 0 {
            return Some(len - 1);
        }
    }
    None
}

/// A cardinal or ordinal number from digits or English words
#[must_use]
pub fn parse_number(text: &str) -> Option<i64> {
    if let Some(m) = DIGITS_RE.find(text) {
        return m.as_str().parse().ok();
    }
    let norm = normalize(text);
    for word in norm.split_whitespace() {
        if let Some(pos) = NUMBER_WORDS.iter().position(|w| *w == word) {
            return i64::try_from(pos + 1).ok();
        }
        if let Some(pos) = ORDINALS.iter().position(|w| *w == word) {
            return i64::try_from(pos + 1).ok();
        }
    }
    None
}

/// `secs` when it is a usable meeting length
#[must_use]
pub fn bounded_duration(secs: i64) -> Option<i64> {
    (secs > 0 && secs <= MAX_DURATION_SECS).then_some(secs)
}

/// Seconds named by phrases like "30 minutes", "an hour", "half an hour"
///
/// Lengths outside `(0, MAX_DURATION_SECS]` are not recognized.
#[must_use]
pub fn parse_duration(text: &str) -> Option<i64> {
    if HALF_HOUR_RE.is_match(text) {
        return Some(1800);
    }
    let caps = DURATION_RE.captures(text)?;
    let amount = caps.get(1)?.as_str().to_lowercase();
    let unit = caps.get(2)?.as_str().to_lowercase();
    let n: i64 = match amount.as_str() {
        "a" | "an" => 1,
        "forty five" | "forty-five" => 45,
        "thirty" => 30,
        other => match other.parse() {
            Ok(n) => n,
            Err(_) => parse_number(other)?,
        },
    };
    let per_unit = if unit.starts_with('h') { 3600 } else { 60 };
    n.checked_mul(per_unit).and_then(bounded_duration)
}

// ============================================================================
// Recognition
// ============================================================================

fn page_move(kind_paging: bool, text: &str, signals: &RecognizedSignals) -> Option<PageMove> {
    if !kind_paging {
        return None;
    }
    match signals.general_intent() {
        GeneralIntent::ShowNext => return Some(PageMove::Next),
        GeneralIntent::ShowPrevious => return Some(PageMove::Previous),
        _ => {}
    }
    match signals.task_intent() {
        CalendarIntent::ShowNextCalendar => return Some(PageMove::Next),
        CalendarIntent::ShowPreviousCalendar => return Some(PageMove::Previous),
        _ => {}
    }
    let norm = normalize(text);
    if NEXT_WORDS.contains(&norm.as_str()) {
        Some(PageMove::Next)
    } else if PREVIOUS_WORDS.contains(&norm.as_str()) {
        Some(PageMove::Previous)
    } else {
        None
    }
}

fn find_choice(choices: &[Choice], text: &str) -> Option<FoundChoice> {
    let norm = normalize(text);
    if norm.is_empty() {
        return None;
    }
    let found = |index: usize| {
        choices.get(index).map(|c| FoundChoice {
            index,
            value: c.value.clone(),
        })
    };
    for (index, choice) in choices.iter().enumerate() {
        let matches = normalize(&choice.value) == norm
            || choice.synonyms.iter().any(|s| normalize(s) == norm);
        if matches {
            return found(index);
        }
    }
    ordinal_index(&norm, choices.len()).and_then(found)
}

/// Date/time values from the answer's entities
#[must_use]
pub fn date_times(signals: &RecognizedSignals) -> Vec<crate::recognizer::DateTimeValue> {
    let mut out = Vec::new();
    for entity in signals.entities() {
        if !matches!(
            entity.kind,
            EntityKind::DateTime | EntityKind::FromDate | EntityKind::FromTime
        ) {
            continue;
        }
        for value in &entity.values {
            match value {
                Resolution::Point { value } => out.push(*value),
                Resolution::Range { start, .. } => out.push(*start),
                Resolution::Duration { .. } | Resolution::Number { .. } => {}
            }
        }
    }
    out
}

/// Recognize an answer; `None` means the engine should re-ask
#[must_use]
pub fn recognize(kind: &PromptKind, text: &str, signals: &RecognizedSignals) -> Option<StepResult> {
    match kind {
        PromptKind::Text => {
            if text.trim().is_empty() {
                None
            } else {
                Some(StepResult::Text(text.to_string()))
            }
        }
        PromptKind::Confirm => {
            if signals.task_intent() == CalendarIntent::RejectCalendar {
                return Some(StepResult::Confirmed(false));
            }
            parse_confirm(text).map(StepResult::Confirmed)
        }
        PromptKind::Choice { choices, paging } => {
            if let Some(mv) = page_move(*paging, text, signals) {
                return Some(StepResult::Page(mv));
            }
            find_choice(choices, text).map(StepResult::Choice)
        }
        PromptKind::DateTime => {
            let values = date_times(signals);
            if values.is_empty() {
                None
            } else {
                Some(StepResult::DateTimes(values))
            }
        }
        PromptKind::Number => {
            let from_entity = signals.entities().iter().find_map(|e| {
                e.values.iter().find_map(|v| match v {
                    Resolution::Number { value } => Some(*value),
                    _ => None,
                })
            });
            from_entity
                .or_else(|| parse_number(text))
                .map(StepResult::Number)
        }
        PromptKind::Duration => {
            let from_entity = signals.entities_of(EntityKind::Duration).find_map(|e| {
                e.values.iter().find_map(|v| match v {
                    Resolution::Duration { seconds } => Some(*seconds),
                    _ => None,
                })
            });
            from_entity
                .and_then(bounded_duration)
                .or_else(|| parse_duration(text))
                .map(StepResult::Duration)
        }
    }
}
