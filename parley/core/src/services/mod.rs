//! Collaborator Traits
//!
//! The calendar, directory, room and credential backends the flows talk to.
//! Every call is async and may fail with a [`ServiceError`]; the engine never
//! retries a call on its own.
//!
//! # Design Philosophy
//!
//! Flows depend on these traits only. A host wires real Graph/Google clients
//! in; tests and the CLI use the in-memory implementations from [`memory`].

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::messages::ConversationId;
use crate::state::{Attendee, RoomInfo};

pub use memory::{
    BusySlot, Fixtures, InMemoryCalendar, InMemoryCredentials, InMemoryDirectory, InMemoryRooms,
    PersonFixture,
};

/// An event on the user's calendar
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Backend id
    pub id: String,
    /// Title
    pub title: String,
    /// Body
    #[serde(default)]
    pub content: Option<String>,
    /// Start, user-local
    pub start: NaiveDateTime,
    /// End, user-local
    pub end: NaiveDateTime,
    /// Location
    #[serde(default)]
    pub location: Option<String>,
    /// Invitees
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    /// Whether the user organizes the event
    #[serde(default)]
    pub is_organizer: bool,
    /// Whether the user accepted
    #[serde(default)]
    pub is_accepted: bool,
    /// Booked room, also listed among the attendees
    #[serde(default)]
    pub room: Option<RoomInfo>,
    /// Online meeting link
    #[serde(default)]
    pub join_url: Option<String>,
}

/// Request to create an event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Title
    pub title: String,
    /// Body
    pub content: Option<String>,
    /// Start, user-local
    pub start: NaiveDateTime,
    /// End, user-local
    pub end: NaiveDateTime,
    /// Location text
    pub location: Option<String>,
    /// Invitees
    pub attendees: Vec<Attendee>,
    /// Booked room
    pub room: Option<RoomInfo>,
}

/// Where a candidate identity came from, best source first
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IdentitySource {
    /// The signed-in user
    Me,
    /// People the user works with
    WorkWith,
    /// The user's own contacts
    Contacts,
    /// The organizational directory
    Directory,
}

/// A person (or room) a name might refer to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateIdentity {
    /// Name as shown to the user
    pub display_name: String,
    /// Known addresses
    #[serde(default)]
    pub addresses: Vec<String>,
    /// Which source produced it
    pub source: IdentitySource,
}

impl CandidateIdentity {
    /// Create a candidate
    pub fn new(
        display_name: impl Into<String>,
        addresses: Vec<String>,
        source: IdentitySource,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            addresses,
            source,
        }
    }
}

/// Calendar operations
#[async_trait]
pub trait CalendarService: Send + Sync {
    /// Create an event
    async fn create_event(&self, event: NewEvent) -> Result<CalendarEvent, ServiceError>;

    /// Replace an existing event
    async fn update_event(&self, event: CalendarEvent) -> Result<CalendarEvent, ServiceError>;

    /// Delete an event the user organizes
    async fn delete_event(&self, id: &str) -> Result<(), ServiceError>;

    /// Decline an invitation
    async fn decline_event(&self, id: &str) -> Result<(), ServiceError>;

    /// Accept an invitation
    async fn accept_event(&self, id: &str) -> Result<(), ServiceError>;

    /// Events overlapping `[start, end)`
    async fn events_by_time(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<CalendarEvent>, ServiceError>;

    /// Events whose title contains `title`
    async fn events_by_title(&self, title: &str) -> Result<Vec<CalendarEvent>, ServiceError>;

    /// Events with an attendee matching `name`
    async fn events_by_attendee(&self, name: &str) -> Result<Vec<CalendarEvent>, ServiceError>;

    /// Availability of each address for `interval_minutes` from `start`
    ///
    /// One entry per address, `true` meaning free.
    async fn free_busy(
        &self,
        addresses: &[String],
        start: NaiveDateTime,
        interval_minutes: u32,
    ) -> Result<Vec<bool>, ServiceError>;
}

/// People lookups
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// People the user works with matching `query`
    async fn people_work_with(&self, query: &str)
        -> Result<Vec<CandidateIdentity>, ServiceError>;

    /// The user's contacts matching `query`
    async fn contacts(&self, query: &str) -> Result<Vec<CandidateIdentity>, ServiceError>;

    /// Directory users matching `query`
    async fn users(&self, query: &str) -> Result<Vec<CandidateIdentity>, ServiceError>;

    /// The signed-in user
    async fn me(&self) -> Result<CandidateIdentity, ServiceError>;

    /// Manager of `address`, or of the user when `None`
    async fn manager_of(
        &self,
        address: Option<&str>,
    ) -> Result<Option<CandidateIdentity>, ServiceError>;
}

/// Meeting room lookups
#[async_trait]
pub trait RoomService: Send + Sync {
    /// Rooms in `building` (`None` or `*` = any) on `floor` (`None` or 0 = any)
    async fn search_rooms(
        &self,
        building: Option<&str>,
        floor: Option<i32>,
    ) -> Result<Vec<RoomInfo>, ServiceError>;

    /// Rooms whose name matches `name`
    async fn rooms_by_name(&self, name: &str) -> Result<Vec<RoomInfo>, ServiceError>;
}

/// Stored OAuth tokens and the like
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Drop every credential held for the conversation's user
    async fn revoke(&self, conversation: &ConversationId) -> Result<(), ServiceError>;
}

/// The collaborators a flow can reach through its turn context
#[derive(Clone)]
pub struct Services {
    /// Calendar backend
    pub calendar: Arc<dyn CalendarService>,
    /// People backend
    pub directory: Arc<dyn DirectoryService>,
    /// Room backend
    pub rooms: Arc<dyn RoomService>,
    /// Credential backend
    pub credentials: Arc<dyn CredentialStore>,
}

impl Services {
    /// Bundle the four collaborators
    pub fn new(
        calendar: Arc<dyn CalendarService>,
        directory: Arc<dyn DirectoryService>,
        rooms: Arc<dyn RoomService>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            calendar,
            directory,
            rooms,
            credentials,
        }
    }

    /// In-memory collaborators seeded from fixtures
    #[must_use]
    pub fn in_memory(fixtures: &Fixtures) -> Self {
        Self::new(
            Arc::new(InMemoryCalendar::from_fixtures(fixtures)),
            Arc::new(InMemoryDirectory::from_fixtures(fixtures)),
            Arc::new(InMemoryRooms::from_fixtures(fixtures)),
            Arc::new(InMemoryCredentials::new()),
        )
    }

    /// Calendar free/busy with exactly one answer per address
    ///
    /// # Errors
    ///
    /// Returns the calendar's own error, or [`ServiceError::Malformed`] when
    /// the answer count does not match the addresses asked about.
    pub async fn free_busy(
        &self,
        addresses: &[String],
        start: NaiveDateTime,
        interval_minutes: u32,
    ) -> Result<Vec<bool>, ServiceError> {
        let free = self.calendar.free_busy(addresses, start, interval_minutes).await?;
        if free.len() != addresses.len() {
            return Err(ServiceError::Malformed {
                service: "calendar",
                message: format!(
                    "free/busy answered for {} of {} addresses",
                    free.len(),
                    addresses.len()
                ),
            });
        }
        Ok(free)
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
