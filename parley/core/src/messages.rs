//! Outgoing Messages
//!
//! Everything the engine says to the user is an [`OutgoingMessage`]: a
//! template id plus a data payload. Rendering is the host's business; the
//! plain English [`Template::fallback_text`] exists so headless hosts (the
//! CLI, tests) can show something readable.
//!
//! # Design Philosophy
//!
//! Flows never build user-facing strings. They pick a [`Template`] and attach
//! the data it needs, which keeps wording out of the dialog logic and lets a
//! real host swap in localized or adaptive-card rendering.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Conversation identifier supplied by the host
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Wrap a host-provided id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Unique identifier for an outgoing message
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("msg_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

/// Response template identifiers
///
/// Closed set: adding a response means adding a variant and its fallback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    // ============================================
    // Main / interruption
    // ============================================
    /// Greeting for an idle conversation
    Welcome,
    /// Help text
    Help,
    /// Acknowledges a cancel
    CancelMessage,
    /// Acknowledges a logout
    LogOut,
    /// No intent could be recognized
    DidntUnderstand,
    /// Intent recognized but not supported
    FeatureNotAvailable,

    // ============================================
    // Errors
    // ============================================
    /// Collaborator refused because of the user's account
    AccountProblem,
    /// Collaborator failed for another reason
    SkillError,
    /// Unexpected failure
    GenericError,
    /// Too many unrecognized answers in a row
    RetryTooMany,

    // ============================================
    // Slot collection
    // ============================================
    /// Ask for the meeting title
    NoTitle,
    /// Ask for the meeting body
    NoContent,
    /// Ask for the meeting location
    NoLocation,
    /// Ask for the start date
    NoStartDate,
    /// Re-ask for the start date
    NoStartDateRetry,
    /// Ask for the start time
    NoStartTime,
    /// Re-ask for the start time
    NoStartTimeRetry,
    /// Ask for the duration
    NoDuration,
    /// Re-ask for the duration
    NoDurationRetry,

    // ============================================
    // Contacts
    // ============================================
    /// Ask who to invite
    NoAttendees,
    /// Ask who else to invite
    AddMoreAttendees,
    /// Lists the names about to be resolved
    BeforeSendingMessage,
    /// First not-found reprompt
    UserNotFound,
    /// Later not-found reprompt
    UserNotFoundAgain,
    /// A name resolved to exactly one address
    PromptOneNameOneAddress,
    /// Choose among several people
    ConfirmMultipleContactName,
    /// Choose among several addresses of one person
    ConfirmMultipleContactEmail,
    /// Paging past the last page
    AlreadyLastPage,
    /// Paging before the first page
    AlreadyFirstPage,
    /// Offer to add more attendees
    AddMoreUserPrompt,

    // ============================================
    // Meeting rooms
    // ============================================
    /// Ask for the building
    NoBuilding,
    /// Building has no rooms
    BuildingNonexistent,
    /// Ask for the floor
    NoFloorNumber,
    /// Floor answer was not a number
    FloorNumberRetry,
    /// Offer one room
    ConfirmMeetingRoomPrompt,
    /// Room declined and remembered
    IgnoreMeetingRoom,
    /// No room is free
    CannotFindMeetingRoom,
    /// All free rooms were declined
    CannotFindOtherMeetingRoom,
    /// Named room does not exist
    MeetingRoomNotFound,
    /// Ask how to change the room search
    RecreateMeetingRoom,
    /// Re-ask how to change the room search
    RecreateMeetingRoomAgain,
    /// Room search ended without a booking
    ConfirmedMeetingRoom,

    // ============================================
    // Create event
    // ============================================
    /// Summary before creating
    ConfirmCreate,
    /// Event created
    EventCreated,
    /// Ask what to change after a declined summary
    GetRecreateInfo,
    /// Re-ask what to change
    GetRecreateInfoRetry,

    // ============================================
    // Show / change events
    // ============================================
    /// Nothing matched the search
    ShowNoMeetingMessage,
    /// A page of events to choose from
    ShowMeetingList,
    /// Details of one event
    ReadEvent,
    /// Ask what to do with the event shown
    AskForAction,
    /// Ask which event to act on
    ChooseEvent,
    /// Confirm deleting an event
    ConfirmDelete,
    /// Confirm declining an event
    ConfirmDecline,
    /// Confirm accepting an event
    ConfirmAccept,
    /// Event deleted
    EventDeleted,
    /// Event declined
    EventDeclined,
    /// Event accepted
    EventAccepted,
    /// Nothing was changed
    ActionCancelled,

    // ============================================
    // Update event
    // ============================================
    /// Only the organizer may change the event
    NotEventOrganizer,
    /// Ask for the new start
    NoNewTime,
    /// Re-ask for the new start
    NoNewTimeRetry,
    /// Confirm the new timing
    ConfirmUpdate,
    /// Event moved
    EventUpdated,
    /// Nothing to release
    NoMeetingRoomToCancel,
    /// Room booked for an existing event
    MeetingRoomAdded,
    /// Room of an existing event swapped
    MeetingRoomChanged,
    /// Room of an existing event released
    MeetingRoomCanceled,

    // ============================================
    // Availability
    // ============================================
    /// Ask whose availability to check
    NoAvailabilityContact,
    /// Both the attendee and the user are free
    AttendeeIsAvailable,
    /// The attendee is free but the user is not
    AttendeeIsAvailableOrganizerIsBusy,
    /// The attendee is busy
    AttendeeIsBusy,
    /// Offer to look for a shared free slot
    AskForNextAvailableTime,
    /// Shared free slot found
    NextBothAvailableTime,
    /// No shared free slot that day
    NoNextBothAvailableTime,
    /// Offer to book a meeting at the time checked
    AskForCreateNewMeeting,

    // ============================================
    // Upcoming events
    // ============================================
    /// Time left before an event
    TimeRemaining,
    /// Confirm joining an online meeting
    ConfirmJoin,
    /// Link to the online meeting
    JoinMeeting,
}

impl Template {
    /// Plain English rendering; `{key}` placeholders are filled from the data
    #[must_use]
    pub fn fallback_text(self) -> &'static str {
        match self {
            Self::Welcome => "Hi! I can create, find and update meetings for you.",
            Self::Help => "You can ask me to book a meeting, find a room, or show what's on your calendar.",
            Self::CancelMessage => "Okay, I've cancelled that.",
            Self::LogOut => "You've been signed out.",
            Self::DidntUnderstand => "Sorry, I didn't understand that.",
            Self::FeatureNotAvailable => "Sorry, I can't do that yet.",
            Self::AccountProblem => "There seems to be a problem with your account. Please check your permissions.",
            Self::SkillError => "Sorry, the calendar service couldn't complete that request.",
            Self::GenericError => "Sorry, something went wrong.",
            Self::RetryTooMany => "Sorry, I'm having trouble understanding. Let's start over.",
            Self::NoTitle => "What's the subject of the meeting?",
            Self::NoContent => "What should the meeting invitation say?",
            Self::NoLocation => "Where will the meeting be held?",
            Self::NoStartDate => "What day does the meeting start?",
            Self::NoStartDateRetry => "Sorry, what date should the meeting be on?",
            Self::NoStartTime => "What time does the meeting start?",
            Self::NoStartTimeRetry => "Sorry, what time should the meeting start?",
            Self::NoDuration => "How long will the meeting be?",
            Self::NoDurationRetry => "Sorry, how long should the meeting be? For example, 30 minutes.",
            Self::NoAttendees => "Who would you like to invite?",
            Self::AddMoreAttendees => "Who else would you like to invite?",
            Self::BeforeSendingMessage => "Okay, I'll look up {names}.",
            Self::UserNotFound => "I couldn't find anyone called {name}. Who did you mean?",
            Self::UserNotFoundAgain => "Still couldn't find {name}.",
            Self::PromptOneNameOneAddress => "Found {name} ({email}).",
            Self::ConfirmMultipleContactName => "Which {name} do you mean?",
            Self::ConfirmMultipleContactEmail => "Which address of {name} should I use?",
            Self::AlreadyLastPage => "That's the last page.",
            Self::AlreadyFirstPage => "That's the first page.",
            Self::AddMoreUserPrompt => "Would you like to invite anyone else?",
            Self::NoBuilding => "Which building should the room be in?",
            Self::BuildingNonexistent => "I couldn't find that building. Which building should the room be in?",
            Self::NoFloorNumber => "Which floor?",
            Self::FloorNumberRetry => "Sorry, which floor number?",
            Self::ConfirmMeetingRoomPrompt => "{room} is free. Shall I book it?",
            Self::IgnoreMeetingRoom => "Okay, I won't suggest {room} again.",
            Self::CannotFindMeetingRoom => "No rooms are free at that time.",
            Self::CannotFindOtherMeetingRoom => "There are no other free rooms at that time.",
            Self::MeetingRoomNotFound => "I couldn't find a room called {room}.",
            Self::RecreateMeetingRoom => "Would you like a different time, building or floor?",
            Self::RecreateMeetingRoomAgain => "Sorry, should I change the time, building, floor or room?",
            Self::ConfirmedMeetingRoom => "Okay, I won't book a room.",
            Self::ConfirmCreate => "I'll create \"{title}\" at {start} for {duration} minutes. Is that right?",
            Self::EventCreated => "Your meeting \"{title}\" has been created.",
            Self::GetRecreateInfo => "What would you like to change?",
            Self::GetRecreateInfoRetry => "Sorry, what should I change: subject, content, time, duration, location, participants or meeting room?",
            Self::ShowNoMeetingMessage => "I couldn't find any meetings.",
            Self::ShowMeetingList => "I found {count} meetings. Which one?",
            Self::ReadEvent => "\"{title}\" from {start} to {end}.",
            Self::AskForAction => "Would you like to accept, decline, or are you done?",
            Self::ChooseEvent => "Which meeting do you mean?",
            Self::ConfirmDelete => "Delete \"{title}\"?",
            Self::ConfirmDecline => "Decline \"{title}\"?",
            Self::ConfirmAccept => "Accept \"{title}\"?",
            Self::EventDeleted => "\"{title}\" has been deleted.",
            Self::EventDeclined => "\"{title}\" has been declined.",
            Self::EventAccepted => "\"{title}\" has been accepted.",
            Self::ActionCancelled => "Okay, I've left it as it is.",
            Self::NotEventOrganizer => "Only the organizer can change \"{title}\".",
            Self::NoNewTime => "When would you like to move it to?",
            Self::NoNewTimeRetry => "Sorry, what time should it start now?",
            Self::ConfirmUpdate => "Move \"{title}\" to {start} until {end}?",
            Self::EventUpdated => "\"{title}\" now starts {start}.",
            Self::NoMeetingRoomToCancel => "\"{title}\" has no room booked.",
            Self::MeetingRoomAdded => "{room} is booked for \"{title}\".",
            Self::MeetingRoomChanged => "\"{title}\" is now in {room}.",
            Self::MeetingRoomCanceled => "{room} has been released from \"{title}\".",
            Self::NoAvailabilityContact => "Whose availability should I check?",
            Self::AttendeeIsAvailable => "{name} is free at {start}, and so are you.",
            Self::AttendeeIsAvailableOrganizerIsBusy => "{name} is free at {start}, but you have another meeting then.",
            Self::AttendeeIsBusy => "{name} is busy at {start}.",
            Self::AskForNextAvailableTime => "Shall I find the next time you and {name} are both free?",
            Self::NextBothAvailableTime => "You and {name} are both free at {start}.",
            Self::NoNextBothAvailableTime => "You and {name} have no free time together later that day.",
            Self::AskForCreateNewMeeting => "Would you like to set up a meeting with {name} at {start}?",
            Self::TimeRemaining => "\"{title}\" starts in {remaining}.",
            Self::ConfirmJoin => "Join \"{title}\" now?",
            Self::JoinMeeting => "Joining \"{title}\": {url}",
        }
    }
}

/// A message for the host to render
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Unique message ID for tracking
    pub id: MessageId,
    /// Which response to render
    pub template: Template,
    /// Template data
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Suggested replies, in display order
    #[serde(default)]
    pub choices: Vec<String>,
    /// Whether this message is a question awaiting an answer
    #[serde(default)]
    pub expects_reply: bool,
}

impl OutgoingMessage {
    /// A message with no data
    #[must_use]
    pub fn new(template: Template) -> Self {
        Self {
            id: MessageId::new(),
            template,
            data: Map::new(),
            choices: Vec::new(),
            expects_reply: false,
        }
    }

    /// Attach one data field
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    /// Attach suggested replies
    #[must_use]
    pub fn with_choices(mut self, choices: Vec<String>) -> Self {
        self.choices = choices;
        self
    }

    /// Mark as a question
    #[must_use]
    pub fn expecting_reply(mut self) -> Self {
        self.expects_reply = true;
        self
    }

    /// Same content under a fresh id, for re-sending a prompt
    #[must_use]
    pub fn resend(&self) -> Self {
        Self {
            id: MessageId::new(),
            ..self.clone()
        }
    }

    /// Fallback rendering with placeholders filled and choices appended
    #[must_use]
    pub fn render(&self) -> String {
        let mut text = self.template.fallback_text().to_string();
        for (key, value) in &self.data {
            let placeholder = format!("{{{key}}}");
            if text.contains(&placeholder) {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                text = text.replace(&placeholder, &rendered);
            }
        }
        if !self.choices.is_empty() {
            for (i, choice) in self.choices.iter().enumerate() {
                text.push_str(&format!("\n  {}. {}", i + 1, choice));
            }
        }
        text
    }
}
