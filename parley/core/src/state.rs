//! Conversation State
//!
//! The single mutable record kept per conversation. The digester writes into
//! it on flow entry, flow steps fill and resolve slots, and it is cleared on
//! completion, on fatal errors and on cancel.
//!
//! # Slot discipline
//!
//! Date and time slots are candidate lists that only grow. Resolution picks
//! the last valid candidate and stores the concrete `start_date_time`; once
//! that is set it is never recomputed until the lists are cleared.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::recognizer::{CalendarIntent, DateTimeValue};
use crate::services::CalendarEvent;

// ============================================================================
// Shared value types
// ============================================================================

/// A confirmed meeting participant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    /// Name as shown to the user
    pub display_name: String,
    /// Address the invitation goes to
    pub address: String,
}

impl Attendee {
    /// Create an attendee
    pub fn new(display_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            address: address.into(),
        }
    }
}

/// A bookable meeting room
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Room name
    pub display_name: String,
    /// Room mailbox
    pub email: String,
    /// Building the room is in
    #[serde(default)]
    pub building: Option<String>,
    /// Floor the room is on
    #[serde(default)]
    pub floor: Option<i32>,
}

/// What the user asked to change after declining the create summary
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecreateTarget {
    /// The title
    Subject,
    /// The body
    Content,
    /// Start date and time
    Time,
    /// Length
    Duration,
    /// Free-text location
    Location,
    /// Attendees
    Participants,
    /// Booked room
    MeetingRoom,
}

impl RecreateTarget {
    /// All targets in prompt order
    pub const ALL: [Self; 7] = [
        Self::Subject,
        Self::Content,
        Self::Time,
        Self::Duration,
        Self::Location,
        Self::Participants,
        Self::MeetingRoom,
    ];

    /// Choice label
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Content => "content",
            Self::Time => "time",
            Self::Duration => "duration",
            Self::Location => "location",
            Self::Participants => "participants",
            Self::MeetingRoom => "meeting room",
        }
    }

    /// Extra words that select this target
    #[must_use]
    pub fn synonyms(self) -> &'static [&'static str] {
        match self {
            Self::Subject => &["title", "name"],
            Self::Content => &["body", "description"],
            Self::Time => &["date", "start", "when"],
            Self::Duration => &["length", "how long"],
            Self::Location => &["place", "where"],
            Self::Participants => &["attendees", "people", "who"],
            Self::MeetingRoom => &["room"],
        }
    }

    /// Parse a choice label back
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label() == label)
    }
}

// ============================================================================
// Meeting slots
// ============================================================================

/// Task fields of the meeting being created or searched for
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeetingSlots {
    /// Meeting title
    pub title: Option<String>,
    /// Meeting body
    pub content: Option<String>,
    /// Free-text location
    pub location: Option<String>,
    /// Start date candidates, oldest first
    pub start_date: Vec<NaiveDate>,
    /// Start time candidates, oldest first
    pub start_time: Vec<NaiveTime>,
    /// End date candidates, oldest first
    pub end_date: Vec<NaiveDate>,
    /// End time candidates, oldest first
    pub end_time: Vec<NaiveTime>,
    /// Resolved start
    pub start_date_time: Option<NaiveDateTime>,
    /// Resolved end
    pub end_date_time: Option<NaiveDateTime>,
    /// Length in seconds
    pub duration_secs: Option<i64>,
    /// Whole-day event
    pub all_day: bool,
    /// "first", "last", "next" style reference to an event in a list
    pub order_reference: Option<String>,
    /// The user gave details up front
    pub create_has_detail: bool,
    /// What is being re-collected after a declined summary
    pub recreate: Option<RecreateTarget>,
    /// Room accepted by the user
    pub meeting_room: Option<RoomInfo>,
    /// Room asked for by name
    pub meeting_room_name: Option<String>,
    /// Building constraint; `*` means any
    pub building: Option<String>,
    /// Floor constraint; 0 means any
    pub floor_number: Option<i32>,
    /// Declined room offers, keyed by room name and start
    pub ignored_rooms: BTreeSet<String>,
}

fn push_unique<T: PartialEq>(list: &mut Vec<T>, value: T) -> bool {
    if list.contains(&value) {
        false
    } else {
        list.push(value);
        true
    }
}

impl MeetingSlots {
    /// Add the start parts of `value` to the candidate lists
    ///
    /// Returns whether anything new was recorded.
    pub fn push_start(&mut self, value: DateTimeValue) -> bool {
        let mut changed = false;
        if let Some(date) = value.date {
            changed |= push_unique(&mut self.start_date, date);
        }
        if let Some(time) = value.time {
            changed |= push_unique(&mut self.start_time, time);
        }
        changed
    }

    /// Add the end parts of `value` to the candidate lists
    pub fn push_end(&mut self, value: DateTimeValue) -> bool {
        let mut changed = false;
        if let Some(date) = value.date {
            changed |= push_unique(&mut self.end_date, date);
        }
        if let Some(time) = value.time {
            changed |= push_unique(&mut self.end_time, time);
        }
        changed
    }

    /// Last start date candidate that is not in the past
    #[must_use]
    pub fn pick_start_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        if let Some(start) = self.start_date_time {
            return Some(start.date());
        }
        self.start_date.iter().rev().copied().find(|d| *d >= today)
    }

    /// Last start time candidate that lands in the future on `date`
    #[must_use]
    pub fn pick_start_time(&self, date: NaiveDate, now: NaiveDateTime) -> Option<NaiveTime> {
        if let Some(start) = self.start_date_time {
            return Some(start.time());
        }
        self.start_time
            .iter()
            .rev()
            .copied()
            .find(|t| NaiveDateTime::new(date, *t) >= now)
    }

    /// Resolve the start once a valid date and time are known
    pub fn resolve_start(&mut self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        if self.start_date_time.is_some() {
            return self.start_date_time;
        }
        let date = self.pick_start_date(now.date())?;
        let time = if self.all_day {
            NaiveTime::MIN
        } else {
            self.pick_start_time(date, now)?
        };
        let start = NaiveDateTime::new(date, time);
        self.start_date_time = Some(start);
        Some(start)
    }

    /// Resolve the end from the duration, or from end candidates
    ///
    /// An end derived from candidates also fills in the duration.
    pub fn resolve_end(&mut self) -> Option<NaiveDateTime> {
        if self.end_date_time.is_some() {
            return self.end_date_time;
        }
        let start = self.start_date_time?;
        if let Some(secs) = self.duration_secs {
            let end = Duration::try_seconds(secs).and_then(|d| start.checked_add_signed(d))?;
            self.end_date_time = Some(end);
            return Some(end);
        }
        if self.all_day {
            let end = start.checked_add_signed(Duration::days(1))?;
            self.end_date_time = Some(end);
            self.duration_secs = Some(Duration::days(1).num_seconds());
            return Some(end);
        }
        if self.end_date.is_empty() && self.end_time.is_empty() {
            return None;
        }
        let date = self.end_date.last().copied().unwrap_or(start.date());
        let time = self.end_time.last().copied().unwrap_or(start.time());
        let end = NaiveDateTime::new(date, time);
        if end <= start {
            return None;
        }
        self.end_date_time = Some(end);
        self.duration_secs = Some((end - start).num_seconds());
        Some(end)
    }

    /// Key for the room rejection memory
    #[must_use]
    pub fn ignored_room_key(&self, room: &RoomInfo) -> String {
        let start = self
            .start_date_time
            .map(|s| s.format("%Y-%m-%dT%H:%M").to_string())
            .unwrap_or_default();
        format!("{}{}", room.display_name, start)
    }

    /// Forget every date, time and derived value
    pub fn clear_times(&mut self) {
        self.start_date.clear();
        self.start_time.clear();
        self.end_date.clear();
        self.end_time.clear();
        self.start_date_time = None;
        self.end_date_time = None;
        self.duration_secs = None;
        self.all_day = false;
    }

    /// Forget the end and duration but keep the start
    pub fn clear_end_times_and_duration(&mut self) {
        self.end_date.clear();
        self.end_time.clear();
        self.end_date_time = None;
        self.duration_secs = None;
    }

    /// Forget the title
    pub fn clear_title(&mut self) {
        self.title = None;
    }

    /// Forget the body
    pub fn clear_content(&mut self) {
        self.content = None;
    }

    /// Forget the location
    pub fn clear_location(&mut self) {
        self.location = None;
    }

    /// Forget the booked room and its search constraints
    pub fn clear_meeting_room(&mut self) {
        self.meeting_room = None;
        self.meeting_room_name = None;
        self.building = None;
        self.floor_number = None;
    }
}

// ============================================================================
// Rescheduling
// ============================================================================

/// New start and length asked for an existing event
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventUpdate {
    /// New start date candidates, oldest first
    pub new_start_date: Vec<NaiveDate>,
    /// New start time candidates, oldest first
    pub new_start_time: Vec<NaiveTime>,
    /// New length in seconds
    pub duration_secs: Option<i64>,
}

impl EventUpdate {
    /// Add the parts of `value` to the new start candidates
    pub fn push_new_start(&mut self, value: DateTimeValue) -> bool {
        let mut changed = false;
        if let Some(date) = value.date {
            changed |= push_unique(&mut self.new_start_date, date);
        }
        if let Some(time) = value.time {
            changed |= push_unique(&mut self.new_start_time, time);
        }
        changed
    }

    /// Whether anything about the new timing is known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.new_start_date.is_empty() && self.new_start_time.is_empty() && self.duration_secs.is_none()
    }

    /// New start and end for an event currently at `start..end`
    ///
    /// A missing date or time keeps the event's own. The first time candidate
    /// that is not in the past wins; a length-only change keeps the start.
    #[must_use]
    pub fn apply(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Option<(NaiveDateTime, NaiveDateTime)> {
        if self.is_empty() {
            return None;
        }
        let new_start = if self.new_start_date.is_empty() && self.new_start_time.is_empty() {
            start
        } else {
            let date = self.new_start_date.last().copied().unwrap_or(start.date());
            let times = if self.new_start_time.is_empty() {
                vec![start.time()]
            } else {
                self.new_start_time.clone()
            };
            times
                .into_iter()
                .map(|t| NaiveDateTime::new(date, t))
                .find(|at| *at >= now)?
        };
        let length = match self.duration_secs {
            Some(secs) => Duration::try_seconds(secs)?,
            None => end - start,
        };
        let new_end = new_start.checked_add_signed(length)?;
        Some((new_start, new_end))
    }

    /// Forget the new timing
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// Contacts
// ============================================================================

/// Grammatical person of a pronoun
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PronounKind {
    /// my, mine, me, i
    FirstPerson,
    /// his, her, their, its
    ThirdPerson,
}

impl PronounKind {
    /// Classify a pronoun word
    #[must_use]
    pub fn classify(word: &str) -> Option<Self> {
        match word.trim().to_lowercase().as_str() {
            "my" | "mine" | "me" | "i" => Some(Self::FirstPerson),
            "his" | "her" | "their" | "its" => Some(Self::ThirdPerson),
            _ => None,
        }
    }
}

/// A name like "his manager" waiting to be dereferenced
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedEntity {
    /// Whose relation
    pub pronoun: PronounKind,
    /// The relation word, as typed
    pub relationship: String,
}

/// Names still to resolve and the attendees confirmed so far
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactResolution {
    /// Names to resolve, in order
    pub name_list: Vec<String>,
    /// Position of the name being resolved
    pub current_index: usize,
    /// The name being resolved
    pub current_name: Option<String>,
    /// Confirmed attendees
    pub confirmed: Vec<Attendee>,
    /// Relationship placeholders keyed by their literal text
    pub relationships: BTreeMap<String, RelatedEntity>,
}

impl ContactResolution {
    /// Append a name unless it is already listed (case-insensitive)
    pub fn add_name(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty()
            || self
                .name_list
                .iter()
                .any(|n| n.eq_ignore_ascii_case(name))
        {
            return false;
        }
        self.name_list.push(name.to_string());
        true
    }

    /// Add a confirmed attendee unless the address is already present
    pub fn confirm(&mut self, attendee: Attendee) -> bool {
        let address = attendee.address.to_lowercase();
        if self
            .confirmed
            .iter()
            .any(|a| a.address.to_lowercase() == address)
        {
            return false;
        }
        self.confirmed.push(attendee);
        true
    }

    /// Reset the name cursor
    pub fn reset_names(&mut self) {
        self.name_list.clear();
        self.current_index = 0;
        self.current_name = None;
    }

    /// Forget everything about attendees
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// Showing meetings
// ============================================================================

/// What the event search was based on
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchCondition {
    /// Time window
    #[default]
    Time,
    /// Title match
    Title,
    /// Attendee match
    Attendee,
    /// Location match
    Location,
}

/// Pagination over events found
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShowMeetings {
    /// Events per page
    pub page_size: usize,
    /// Current page
    pub show_event_index: usize,
    /// Events found
    pub showing: Vec<CalendarEvent>,
    /// Events selected for reading or acting on
    pub focused: Vec<CalendarEvent>,
    /// How the events were searched
    pub condition: SearchCondition,
}

impl ShowMeetings {
    /// Number of pages for the current results
    #[must_use]
    pub fn page_count(&self) -> usize {
        if self.page_size == 0 {
            return 0;
        }
        self.showing.len().div_ceil(self.page_size)
    }

    /// Events on the current page
    #[must_use]
    pub fn current_page(&self) -> &[CalendarEvent] {
        let start = (self.show_event_index * self.page_size).min(self.showing.len());
        let end = (start + self.page_size).min(self.showing.len());
        &self.showing[start..end]
    }
}

// ============================================================================
// Conversation state
// ============================================================================

/// Everything a conversation remembers between turns
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Intent that started the current task
    pub initial_intent: Option<CalendarIntent>,
    /// Task slots
    pub meeting: MeetingSlots,
    /// Attendee resolution
    pub contacts: ContactResolution,
    /// Event list pagination
    pub showing: ShowMeetings,
    /// Rescheduling of an existing event
    #[serde(default)]
    pub update: EventUpdate,
}

impl ConversationState {
    /// Make sure the event page size is initialised and within bounds
    pub fn ensure_page_size(&mut self, max_display_size: usize) {
        if self.showing.page_size == 0 || self.showing.page_size > max_display_size {
            self.showing.page_size = max_display_size;
        }
    }

    /// Clear everything the current task collected
    pub fn clear(&mut self) {
        let page_size = self.showing.page_size;
        *self = Self::default();
        self.showing.page_size = page_size;
    }

    /// Forget participants
    pub fn clear_participants(&mut self) {
        self.contacts.clear();
    }

    /// Clear the slot a recreate request targets
    pub fn clear_for_recreate(&mut self, target: RecreateTarget) {
        match target {
            RecreateTarget::Subject => self.meeting.clear_title(),
            RecreateTarget::Content => self.meeting.clear_content(),
            RecreateTarget::Time => self.meeting.clear_times(),
            RecreateTarget::Duration => self.meeting.clear_end_times_and_duration(),
            RecreateTarget::Location => self.meeting.clear_location(),
            RecreateTarget::Participants => self.clear_participants(),
            RecreateTarget::MeetingRoom => self.meeting.clear_meeting_room(),
        }
    }
}
