//! Parley Core - Turn-Based Calendar Dialog Orchestration
//!
//! This crate runs multi-turn calendar conversations: booking meetings,
//! finding rooms, listing events and accepting or declining them. It knows
//! nothing about chat transports or language understanding. A host feeds it
//! one turn at a time (raw text plus recognized intents and entities) and
//! gets back the messages to show.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Host (CLI, bot)                          │
//! │        raw text + RecognizedSignals (up)   messages (down)        │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────┼──────────────────────────────────┐
//! │                          PARLEY CORE                             │
//! │  ┌────────────────────────────┴───────────────────────────────┐  │
//! │  │                       Orchestrator                          │  │
//! │  │  ┌────────────┐  ┌──────────┐  ┌──────────────────────────┐ │  │
//! │  │  │Interruption│  │ Entity   │  │      Dialog Engine       │ │  │
//! │  │  │   Router   │  │ Digester │  │  (stack of flow frames)  │ │  │
//! │  │  └────────────┘  └──────────┘  └────────────┬─────────────┘ │  │
//! │  └─────────────────────────────────────────────┼───────────────┘  │
//! │            ┌───────────────────────────────────┴──────────┐       │
//! │            │  Flows: tasks, slot collection, resolvers     │       │
//! │            └───────────────────────────────────┬──────────┘       │
//! │  ┌────────────┐                   ┌────────────┴─────────────┐    │
//! │  │ StateStore │                   │ Calendar / Directory /   │    │
//! │  │(memory,file)│                  │ Rooms / Credentials      │    │
//! │  └────────────┘                   └──────────────────────────┘    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Orchestrator`]: Entry point; `on_turn` and `on_reset`
//! - [`DialogEngine`]: Runs flows on a [`DialogStack`]
//! - [`Flow`]: One named step sequence
//! - [`ConversationState`]: Slots collected across turns
//! - [`RecognizedSignals`]: What the NLU produced for a turn
//! - [`OutgoingMessage`]: A templated response
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use parley_core::{
//!     ConversationId, EngineConfig, Fixtures, MemoryStore, Orchestrator, RecognizedSignals,
//!     Services,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let orchestrator = Orchestrator::with_builtin_flows(
//!         Arc::new(MemoryStore::new()),
//!         Services::in_memory(&Fixtures::default()),
//!         EngineConfig::default(),
//!     );
//!
//!     let id = ConversationId::new("demo");
//!     let signals: RecognizedSignals = serde_json::from_str(r#"{
//!         "task": {"intent": "CreateCalendarEntry", "score": 0.93}
//!     }"#).unwrap();
//!     let outcome = orchestrator.on_turn(&id, "book a meeting", &signals).await.unwrap();
//!     for message in outcome.messages {
//!         println!("{}", message.render());
//!     }
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`orchestrator`]: Per-conversation locking, load/process/save
//! - [`dialog`]: Flow trait, registry, stack and engine
//! - [`interrupt`]: Cancel, help, logout and topic switches
//! - [`digest`]: Entities into conversation state
//! - [`resolver`]: Names into attendees, rooms into a booking
//! - [`flows`]: Built-in calendar tasks and slot flows
//! - [`state`]: Conversation state and its clear operations
//! - [`store`]: Persistence of stack and state
//! - [`services`]: Collaborator traits and in-memory implementations
//! - [`recognizer`]: NLU output types
//! - [`messages`]: Outgoing message templates
//! - [`config`]: TOML/env configuration
//! - [`error`]: Error taxonomy

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod dialog;
pub mod digest;
pub mod error;
pub mod flows;
pub mod interrupt;
pub mod messages;
pub mod orchestrator;
pub mod recognizer;
pub mod resolver;
pub mod services;
pub mod state;
pub mod store;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use dialog::{
    DialogEngine, DialogFrame, DialogStack, Flow, FlowId, FlowOptions, FlowRegistry, PromptSpec,
    StepOutcome, StepResult, TurnContext, TurnStatus,
};
pub use error::{DialogError, ErrorClass, OrchestratorError, ServiceError, SkillErrorKind, StoreError};
pub use flows::{builtin_registry, NewEventStatus, RoomChange, Route};
pub use messages::{ConversationId, OutgoingMessage, Template};
pub use orchestrator::{Clock, FixedClock, Orchestrator, SystemClock, TurnOutcome};
pub use recognizer::{
    CalendarIntent, DateTimeValue, Entity, EntityKind, GeneralIntent, RawSpan, RecognizedSignals,
    Resolution,
};
pub use services::{
    CalendarEvent, CalendarService, CandidateIdentity, CredentialStore, DirectoryService, Fixtures,
    RoomService, Services,
};
pub use state::{Attendee, ConversationState, MeetingSlots, RoomInfo};
pub use store::{FileStore, MemoryStore, PersistedConversation, StateStore};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, EngineConfig, ParleyToml,
};
