//! Recognized Signals
//!
//! Output of the external NLU collaborator, as handed to the orchestrator on
//! every turn. Two recognizers run per utterance: a task recognizer that knows
//! calendar intents and entities, and a small general recognizer for
//! cancel/help/logout/paging.
//!
//! Entity spans are character offsets into the raw utterance with an
//! exclusive end. Values are always sliced from the raw text, never from a
//! normalized form.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Calendar task intents
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalendarIntent {
    /// Book a meeting
    CreateCalendarEntry,
    /// Book a meeting room
    FindMeetingRoom,
    /// Book a room for an existing event
    AddMeetingRoom,
    /// Swap the room of an existing event
    ChangeMeetingRoom,
    /// Release the room of an existing event
    CancelMeetingRoom,
    /// Accept an invitation
    AcceptEventEntry,
    /// Delete or decline an event
    DeleteCalendarEntry,
    /// Change an event
    ChangeCalendarEntry,
    /// Join an online meeting
    ConnectToMeeting,
    /// Show events
    FindCalendarEntry,
    /// Show event details
    FindCalendarDetail,
    /// When is an event
    FindCalendarWhen,
    /// Where is an event
    FindCalendarWhere,
    /// Who attends an event
    FindCalendarWho,
    /// How long is an event
    FindDuration,
    /// Time until the next event
    TimeRemaining,
    /// Check someone's availability
    CheckAvailability,
    /// Next page of events
    ShowNextCalendar,
    /// Previous page of events
    ShowPreviousCalendar,
    /// Negative answer
    RejectCalendar,
    /// Nothing recognized
    #[default]
    None,
}

/// General intents shared by every skill
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeneralIntent {
    /// Abandon the current task
    Cancel,
    /// Ask for help
    Help,
    /// Sign out
    Logout,
    /// Next page
    ShowNext,
    /// Previous page
    ShowPrevious,
    /// Nothing recognized
    #[default]
    None,
}

/// Character span of an entity in the raw utterance; `end` is exclusive
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSpan {
    /// First character
    pub start: usize,
    /// One past the last character
    pub end: usize,
}

impl RawSpan {
    /// Create a span
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Slice `text` by character offsets, clamped to the text
    ///
    /// Returns `None` when the clamped slice is empty.
    #[must_use]
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        let char_count = text.chars().count();
        let start = self.start.min(char_count);
        let end = self.end.min(char_count);
        if start >= end {
            return None;
        }
        let byte_at = |idx: usize| {
            text.char_indices()
                .nth(idx)
                .map_or(text.len(), |(byte, _)| byte)
        };
        Some(&text[byte_at(start)..byte_at(end)])
    }
}

/// Entity types produced by the task recognizer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Meeting title
    Subject,
    /// Meeting body
    Content,
    /// Free-text location
    Location,
    /// Attendee name
    ContactName,
    /// Attendee address
    Email,
    /// A date and/or time
    DateTime,
    /// Range start date
    FromDate,
    /// Range start time
    FromTime,
    /// Range end date
    ToDate,
    /// Range end time
    ToTime,
    /// A length of time
    Duration,
    /// A meeting room name
    MeetingRoom,
    /// A building name
    Building,
    /// A floor number
    FloorNumber,
    /// "the first one", "the last meeting"
    OrderReference,
    /// "my", "his", ...
    PronounType,
    /// "manager", ...
    RelationshipName,
}

/// A date and/or a time of day, as resolved by the recognizer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateTimeValue {
    /// Calendar date, when the expression names one
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Time of day, when the expression names one
    #[serde(default)]
    pub time: Option<NaiveTime>,
}

impl DateTimeValue {
    /// A date-only value
    #[must_use]
    pub fn date(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            time: None,
        }
    }

    /// A time-only value
    #[must_use]
    pub fn time(time: NaiveTime) -> Self {
        Self {
            date: None,
            time: Some(time),
        }
    }

    /// A full date and time
    #[must_use]
    pub fn at(date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            date: Some(date),
            time: Some(time),
        }
    }
}

/// One resolution of an entity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Resolution {
    /// A point in time
    Point {
        /// The instant
        value: DateTimeValue,
    },
    /// A time range
    Range {
        /// Range start
        start: DateTimeValue,
        /// Range end
        end: DateTimeValue,
    },
    /// A length of time
    Duration {
        /// Length in seconds
        seconds: i64,
    },
    /// A number
    Number {
        /// The value
        value: i64,
    },
}

/// A recognized entity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity type
    pub kind: EntityKind,
    /// Where it sits in the raw utterance
    pub span: RawSpan,
    /// Resolved values, if the recognizer produced any
    #[serde(default)]
    pub values: Vec<Resolution>,
}

impl Entity {
    /// Entity with no resolution
    #[must_use]
    pub fn new(kind: EntityKind, start: usize, end: usize) -> Self {
        Self {
            kind,
            span: RawSpan::new(start, end),
            values: Vec::new(),
        }
    }

    /// Add a resolution
    #[must_use]
    pub fn resolved(mut self, value: Resolution) -> Self {
        self.values.push(value);
        self
    }

    /// Entity text, sliced from the raw utterance
    #[must_use]
    pub fn text<'a>(&self, utterance: &'a str) -> Option<&'a str> {
        self.span.slice(utterance)
    }
}

/// Task recognizer result
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRecognition {
    /// Top intent
    pub intent: CalendarIntent,
    /// Confidence in `[0, 1]`
    pub score: f64,
    /// Entities found
    #[serde(default)]
    pub entities: Vec<Entity>,
}

/// General recognizer result
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralRecognition {
    /// Top intent
    pub intent: GeneralIntent,
    /// Confidence in `[0, 1]`
    pub score: f64,
}

/// Everything the NLU produced for one turn
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognizedSignals {
    /// Locale of the utterance
    #[serde(default)]
    pub locale: Option<String>,
    /// Task recognizer output
    #[serde(default)]
    pub task: Option<TaskRecognition>,
    /// General recognizer output
    #[serde(default)]
    pub general: Option<GeneralRecognition>,
}

impl RecognizedSignals {
    /// No recognition at all
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// A task intent with no entities
    #[must_use]
    pub fn task(intent: CalendarIntent, score: f64) -> Self {
        Self {
            task: Some(TaskRecognition {
                intent,
                score,
                entities: Vec::new(),
            }),
            ..Self::default()
        }
    }

    /// A general intent only
    #[must_use]
    pub fn general(intent: GeneralIntent, score: f64) -> Self {
        Self {
            general: Some(GeneralRecognition { intent, score }),
            ..Self::default()
        }
    }

    /// Add an entity to the task recognition, creating it if needed
    #[must_use]
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.task
            .get_or_insert_with(TaskRecognition::default)
            .entities
            .push(entity);
        self
    }

    /// Top task intent, `None` when absent
    #[must_use]
    pub fn task_intent(&self) -> CalendarIntent {
        self.task.as_ref().map_or(CalendarIntent::None, |t| t.intent)
    }

    /// Task confidence, 0 when absent
    #[must_use]
    pub fn task_score(&self) -> f64 {
        self.task.as_ref().map_or(0.0, |t| t.score)
    }

    /// Top general intent, `None` when absent
    #[must_use]
    pub fn general_intent(&self) -> GeneralIntent {
        self.general.as_ref().map_or(GeneralIntent::None, |g| g.intent)
    }

    /// General confidence, 0 when absent
    #[must_use]
    pub fn general_score(&self) -> f64 {
        self.general.as_ref().map_or(0.0, |g| g.score)
    }

    /// Task entities, empty when absent
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        self.task.as_ref().map_or(&[], |t| t.entities.as_slice())
    }

    /// Entities of one kind
    pub fn entities_of(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> {
        self.entities().iter().filter(move |e| e.kind == kind)
    }

    /// Text of the first entity of `kind`
    #[must_use]
    pub fn first_text<'a>(&self, kind: EntityKind, utterance: &'a str) -> Option<&'a str> {
        self.entities_of(kind).find_map(|e| e.text(utterance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_slices_by_chars() {
        let text = "meet José tomorrow";
        assert_eq!(RawSpan::new(5, 9).slice(text), Some("José"));
        assert_eq!(RawSpan::new(10, 18).slice(text), Some("tomorrow"));
    }

    #[test]
    fn test_span_clamps_and_rejects_empty() {
        let text = "hello";
        assert_eq!(RawSpan::new(3, 50).slice(text), Some("lo"));
        assert_eq!(RawSpan::new(10, 20).slice(text), None);
        assert_eq!(RawSpan::new(2, 2).slice(text), None);
    }

    #[test]
    fn test_signal_accessors_default() {
        let signals = RecognizedSignals::none();
        assert_eq!(signals.task_intent(), CalendarIntent::None);
        assert_eq!(signals.general_intent(), GeneralIntent::None);
        assert!(signals.entities().is_empty());
        assert!(signals.task_score().abs() < f64::EPSILON);
    }

    #[test]
    fn test_signals_deserialize() {
        let json = r#"{
            "task": {
                "intent": "CreateCalendarEntry",
                "score": 0.93,
                "entities": [
                    {"kind": "ContactName", "span": {"start": 16, "end": 20}},
                    {"kind": "DateTime", "span": {"start": 21, "end": 29},
                     "values": [{"type": "point", "value": {"date": "2026-10-17"}}]}
                ]
            },
            "general": {"intent": "None", "score": 0.1}
        }"#;
        let signals: RecognizedSignals = serde_json::from_str(json).unwrap();
        assert_eq!(signals.task_intent(), CalendarIntent::CreateCalendarEntry);
        assert_eq!(signals.entities().len(), 2);
        assert_eq!(
            signals.entities()[1].values[0],
            Resolution::Point {
                value: DateTimeValue::date(NaiveDate::from_ymd_opt(2026, 10, 17).unwrap())
            }
        );
    }

    #[test]
    fn test_first_text() {
        let text = "meeting with Alex";
        let signals = RecognizedSignals::task(CalendarIntent::CreateCalendarEntry, 0.9)
            .with_entity(Entity::new(EntityKind::ContactName, 13, 17));
        assert_eq!(signals.first_text(EntityKind::ContactName, text), Some("Alex"));
        assert_eq!(signals.first_text(EntityKind::Subject, text), None);
    }
}
