//! Dialog Engine
//!
//! Flows are ordered step sequences. A step runs, looks at the conversation
//! state and its input, and returns a [`StepOutcome`] telling the engine what
//! to do next: advance, ask the user something, start a sub-flow, end with a
//! result, or cancel everything.
//!
//! # Design Philosophy
//!
//! Suspension is explicit. A frame on the [`DialogStack`] is just
//! `(flow, step index, options, pending prompt)`, all serializable, so a
//! conversation can be persisted between any two turns and resumed in a
//! different process. Flows hold no state of their own; everything lives in
//! the frame options or in [`ConversationState`].

mod engine;
pub mod prompt;
mod stack;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub use engine::{DialogEngine, TurnStatus};
pub use prompt::{Choice, FoundChoice, PageMove, PendingPrompt, PromptKind, PromptSpec};
pub use stack::{DialogFrame, DialogStack};

use crate::config::EngineConfig;
use crate::error::DialogError;
use crate::flows::change_status::NewEventStatus;
use crate::flows::update_room::RoomChange;
use crate::messages::{ConversationId, OutgoingMessage};
use crate::recognizer::{DateTimeValue, RecognizedSignals};
use crate::resolver::contacts::{ContactCursor, SelectionCursor};
use crate::resolver::rooms::RoomCursor;
use crate::services::{CandidateIdentity, Services};
use crate::state::ConversationState;

// ============================================================================
// Flow identity
// ============================================================================

/// Identifier of a registered flow
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowId {
    /// Book a meeting
    CreateEvent,
    /// List and read events
    ShowEvents,
    /// Accept, decline or delete an event
    ChangeEventStatus,
    /// Move an event or change its length
    UpdateEvent,
    /// Add, swap or release the room of an event
    UpdateMeetingRoom,
    /// Check whether someone is free
    CheckAvailability,
    /// Time until an upcoming event
    TimeRemaining,
    /// Open the online meeting of an event
    JoinEvent,
    /// Pick one event from the current result list
    ChooseEvent,
    /// Make sure a start date is known
    UpdateStartDate,
    /// Make sure a start time is known
    UpdateStartTime,
    /// Make sure a duration is known
    UpdateDuration,
    /// Collect and resolve attendee names
    FindContact,
    /// Resolve one attendee name
    ResolveName,
    /// Choose among several people
    SelectPerson,
    /// Choose among one person's addresses
    SelectEmail,
    /// Find and offer a meeting room
    FindMeetingRoom,
    /// Ask for the building
    CollectBuilding,
    /// Ask for the floor
    CollectFloor,
    /// Ask how to change the room search
    RecreateMeetingRoom,
    /// Host-registered flow
    Named(String),
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}"),
            other => write!(f, "{other:?}"),
        }
    }
}

// ============================================================================
// Step results and outcomes
// ============================================================================

/// Value passed into a step
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum StepResult {
    /// Nothing
    #[default]
    Empty,
    /// Free text answer, untrimmed
    Text(String),
    /// Yes or no
    Confirmed(bool),
    /// One of the offered choices
    Choice(FoundChoice),
    /// Date/time values from the answer
    DateTimes(Vec<DateTimeValue>),
    /// A number
    Number(i64),
    /// A length of time in seconds
    Duration(i64),
    /// A request for the adjacent page of a choice list
    Page(PageMove),
    /// An identity confirmed by a resolver sub-flow
    Identity(CandidateIdentity),
    /// The sub-flow gave up
    Cancelled,
}

/// What a step asks the engine to do next
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    /// Run the next step of this flow with the given input
    Next(StepResult),
    /// Ask the user and suspend until the next turn
    Prompt(PromptSpec),
    /// Push a sub-flow and run its first step
    Begin {
        /// Flow to start
        flow: FlowId,
        /// Its options
        options: FlowOptions,
    },
    /// End this flow and start another in its place
    Replace {
        /// Flow to start
        flow: FlowId,
        /// Its options
        options: FlowOptions,
    },
    /// Pop this flow and hand the result to the parent
    End(StepResult),
    /// Drop the whole stack
    CancelAll,
}

impl StepOutcome {
    /// Begin a sub-flow in sub-flow mode
    #[must_use]
    pub fn begin_sub(flow: FlowId) -> Self {
        Self::Begin {
            flow,
            options: FlowOptions::sub_flow(),
        }
    }
}

/// Per-frame options and locals
///
/// Locals belong to the frame: they are persisted with the stack and vanish
/// when the frame ends.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowOptions {
    /// Invoked by another task; domain failures only clear this flow's scope
    #[serde(default)]
    pub sub_flow_mode: bool,
    /// Contact resolution cursor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contacts: Option<ContactCursor>,
    /// Paginated candidate list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionCursor>,
    /// Room offer cursor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomCursor>,
    /// Requested status change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NewEventStatus>,
    /// Requested room change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_change: Option<RoomChange>,
    /// The event being chosen is about to be changed
    #[serde(default)]
    pub for_action: bool,
}

impl FlowOptions {
    /// Options for a flow started by another flow
    #[must_use]
    pub fn sub_flow() -> Self {
        Self {
            sub_flow_mode: true,
            ..Self::default()
        }
    }
}

// ============================================================================
// Turn context
// ============================================================================

/// Everything a step may read or write during one turn
pub struct TurnContext<'a> {
    /// Conversation being served
    pub conversation: &'a ConversationId,
    /// Raw user text for this turn
    pub text: &'a str,
    /// NLU output for this turn
    pub signals: &'a RecognizedSignals,
    /// Conversation state
    pub state: &'a mut ConversationState,
    /// Collaborators
    pub services: &'a Services,
    /// Engine tunables
    pub config: &'a EngineConfig,
    /// User-local current time
    pub now: NaiveDateTime,
    outbox: Vec<OutgoingMessage>,
}

impl<'a> TurnContext<'a> {
    /// Context for one turn
    #[must_use]
    pub fn new(
        conversation: &'a ConversationId,
        text: &'a str,
        signals: &'a RecognizedSignals,
        state: &'a mut ConversationState,
        services: &'a Services,
        config: &'a EngineConfig,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            conversation,
            text,
            signals,
            state,
            services,
            config,
            now,
            outbox: Vec::new(),
        }
    }

    /// Queue a message for the user
    pub fn send(&mut self, message: OutgoingMessage) {
        self.outbox.push(message);
    }

    /// Messages queued so far
    #[must_use]
    pub fn sent(&self) -> &[OutgoingMessage] {
        &self.outbox
    }

    /// Take the queued messages
    #[must_use]
    pub fn into_messages(self) -> Vec<OutgoingMessage> {
        self.outbox
    }
}

// ============================================================================
// Flow trait and registry
// ============================================================================

/// A named sequence of steps
#[async_trait]
pub trait Flow: Send + Sync {
    /// Identifier the flow is registered under
    fn id(&self) -> FlowId;

    /// Number of steps; running past the last one ends the flow
    fn step_count(&self) -> usize;

    /// Whether the flow fills a single slot (blocks topic switching)
    fn is_slot_collection(&self) -> bool {
        false
    }

    /// Clear what this flow owns after a domain failure in sub-flow mode
    fn clear_sub_scope(&self, state: &mut ConversationState) {
        state.meeting.clear_times();
        state.meeting.clear_title();
    }

    /// Run step `index`
    async fn step(
        &self,
        index: usize,
        ctx: &mut TurnContext<'_>,
        options: &mut FlowOptions,
        input: StepResult,
    ) -> Result<StepOutcome, DialogError>;
}

/// Table of flows by id
#[derive(Clone, Default)]
pub struct FlowRegistry {
    flows: HashMap<FlowId, Arc<dyn Flow>>,
}

impl FlowRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a flow under its own id, replacing any previous one
    pub fn register(&mut self, flow: Arc<dyn Flow>) {
        self.flows.insert(flow.id(), flow);
    }

    /// Look a flow up
    #[must_use]
    pub fn get(&self, id: &FlowId) -> Option<Arc<dyn Flow>> {
        self.flows.get(id).cloned()
    }

    /// Whether a flow is registered
    #[must_use]
    pub fn contains(&self, id: &FlowId) -> bool {
        self.flows.contains_key(id)
    }

    /// Number of registered flows
    #[must_use]
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

impl fmt::Debug for FlowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowRegistry")
            .field("flows", &self.flows.keys().collect::<Vec<_>>())
            .finish()
    }
}
