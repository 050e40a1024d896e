//! In-memory collaborators
//!
//! Fixture-backed implementations of the service traits, used by tests and
//! by the CLI host. Each can be switched into a failing mode to exercise the
//! engine's error boundary.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{
    CalendarEvent, CalendarService, CandidateIdentity, CredentialStore, DirectoryService,
    IdentitySource, NewEvent, RoomService,
};
use crate::error::{ServiceError, SkillErrorKind};
use crate::messages::ConversationId;
use crate::state::RoomInfo;

/// A person in the fixture file
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonFixture {
    /// Display name
    pub name: String,
    /// Addresses
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// A busy interval for one address
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusySlot {
    /// Whose calendar
    pub address: String,
    /// Busy from
    pub start: NaiveDateTime,
    /// Busy until
    pub end: NaiveDateTime,
}

/// Seed data for the in-memory collaborators
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixtures {
    /// The signed-in user
    pub me: Option<PersonFixture>,
    /// People the user works with
    pub work_with: Vec<PersonFixture>,
    /// The user's contacts
    pub contacts: Vec<PersonFixture>,
    /// Directory users
    pub users: Vec<PersonFixture>,
    /// Address to manager address
    pub managers: HashMap<String, String>,
    /// Meeting rooms
    pub rooms: Vec<RoomInfo>,
    /// Existing events
    pub events: Vec<CalendarEvent>,
    /// Busy intervals
    pub busy: Vec<BusySlot>,
}

fn check(failure: &RwLock<Option<ServiceError>>) -> Result<(), ServiceError> {
    match failure.read().as_ref() {
        Some(err) => Err(err.clone()),
        None => Ok(()),
    }
}

// ============================================================================
// Calendar
// ============================================================================

/// Calendar backed by a vector of events
#[derive(Debug, Default)]
pub struct InMemoryCalendar {
    events: RwLock<Vec<CalendarEvent>>,
    busy: RwLock<Vec<BusySlot>>,
    failure: RwLock<Option<ServiceError>>,
}

impl InMemoryCalendar {
    /// Empty calendar
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Calendar seeded from fixtures
    #[must_use]
    pub fn from_fixtures(fixtures: &Fixtures) -> Self {
        Self {
            events: RwLock::new(fixtures.events.clone()),
            busy: RwLock::new(fixtures.busy.clone()),
            failure: RwLock::new(None),
        }
    }

    /// Make every call fail with `err` (or succeed again with `None`)
    pub fn set_failure(&self, err: Option<ServiceError>) {
        *self.failure.write() = err;
    }

    /// Mark `address` busy for an interval
    pub fn mark_busy(&self, address: &str, start: NaiveDateTime, end: NaiveDateTime) {
        self.busy.write().push(BusySlot {
            address: address.to_string(),
            start,
            end,
        });
    }

    /// Snapshot of all events
    #[must_use]
    pub fn events(&self) -> Vec<CalendarEvent> {
        self.events.read().clone()
    }

    fn not_found(id: &str) -> ServiceError {
        ServiceError::Rejected {
            service: "calendar",
            kind: SkillErrorKind::NotFound,
            message: format!("no event {id}"),
        }
    }
}

#[async_trait]
impl CalendarService for InMemoryCalendar {
    async fn create_event(&self, event: NewEvent) -> Result<CalendarEvent, ServiceError> {
        check(&self.failure)?;
        let mut attendees = event.attendees;
        if let Some(ref room) = event.room {
            attendees.push(crate::state::Attendee::new(
                room.display_name.clone(),
                room.email.clone(),
            ));
        }
        let created = CalendarEvent {
            id: uuid::Uuid::new_v4().to_string(),
            title: event.title,
            content: event.content,
            start: event.start,
            end: event.end,
            location: event
                .location
                .or_else(|| event.room.as_ref().map(|r| r.display_name.clone())),
            attendees,
            is_organizer: true,
            is_accepted: true,
            room: event.room,
            join_url: None,
        };
        self.events.write().push(created.clone());
        Ok(created)
    }

    async fn update_event(&self, event: CalendarEvent) -> Result<CalendarEvent, ServiceError> {
        check(&self.failure)?;
        let mut events = self.events.write();
        let slot = events
            .iter_mut()
            .find(|e| e.id == event.id)
            .ok_or_else(|| Self::not_found(&event.id))?;
        *slot = event.clone();
        Ok(event)
    }

    async fn delete_event(&self, id: &str) -> Result<(), ServiceError> {
        check(&self.failure)?;
        let mut events = self.events.write();
        let before = events.len();
        events.retain(|e| e.id != id);
        if events.len() == before {
            return Err(Self::not_found(id));
        }
        Ok(())
    }

    async fn decline_event(&self, id: &str) -> Result<(), ServiceError> {
        check(&self.failure)?;
        let mut events = self.events.write();
        let before = events.len();
        events.retain(|e| e.id != id);
        if events.len() == before {
            return Err(Self::not_found(id));
        }
        Ok(())
    }

    async fn accept_event(&self, id: &str) -> Result<(), ServiceError> {
        check(&self.failure)?;
        let mut events = self.events.write();
        let event = events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| Self::not_found(id))?;
        event.is_accepted = true;
        Ok(())
    }

    async fn events_by_time(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<CalendarEvent>, ServiceError> {
        check(&self.failure)?;
        let mut found: Vec<_> = self
            .events
            .read()
            .iter()
            .filter(|e| e.start < end && e.end > start)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.start);
        Ok(found)
    }

    async fn events_by_title(&self, title: &str) -> Result<Vec<CalendarEvent>, ServiceError> {
        check(&self.failure)?;
        let needle = title.to_lowercase();
        let mut found: Vec<_> = self
            .events
            .read()
            .iter()
            .filter(|e| e.title.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        found.sort_by_key(|e| e.start);
        Ok(found)
    }

    async fn events_by_attendee(&self, name: &str) -> Result<Vec<CalendarEvent>, ServiceError> {
        check(&self.failure)?;
        let needle = name.to_lowercase();
        let mut found: Vec<_> = self
            .events
            .read()
            .iter()
            .filter(|e| {
                e.attendees.iter().any(|a| {
                    a.display_name.to_lowercase().contains(&needle)
                        || a.address.to_lowercase().contains(&needle)
                })
            })
            .cloned()
            .collect();
        found.sort_by_key(|e| e.start);
        Ok(found)
    }

    async fn free_busy(
        &self,
        addresses: &[String],
        start: NaiveDateTime,
        interval_minutes: u32,
    ) -> Result<Vec<bool>, ServiceError> {
        check(&self.failure)?;
        let end = start + Duration::minutes(i64::from(interval_minutes));
        let busy = self.busy.read();
        Ok(addresses
            .iter()
            .map(|address| {
                !busy.iter().any(|slot| {
                    slot.address.eq_ignore_ascii_case(address) && slot.start < end && slot.end > start
                })
            })
            .collect())
    }
}

// ============================================================================
// Directory
// ============================================================================

/// Directory backed by fixture lists
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    me: Option<PersonFixture>,
    work_with: Vec<PersonFixture>,
    contacts: Vec<PersonFixture>,
    users: Vec<PersonFixture>,
    managers: HashMap<String, String>,
    failure: RwLock<Option<ServiceError>>,
}

impl InMemoryDirectory {
    /// Directory seeded from fixtures
    #[must_use]
    pub fn from_fixtures(fixtures: &Fixtures) -> Self {
        Self {
            me: fixtures.me.clone(),
            work_with: fixtures.work_with.clone(),
            contacts: fixtures.contacts.clone(),
            users: fixtures.users.clone(),
            managers: fixtures
                .managers
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
            failure: RwLock::new(None),
        }
    }

    /// Make every call fail with `err` (or succeed again with `None`)
    pub fn set_failure(&self, err: Option<ServiceError>) {
        *self.failure.write() = err;
    }

    fn search(
        list: &[PersonFixture],
        query: &str,
        source: IdentitySource,
    ) -> Vec<CandidateIdentity> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        list.iter()
            .filter(|p| p.name.to_lowercase().contains(&needle))
            .map(|p| CandidateIdentity::new(p.name.clone(), p.addresses.clone(), source))
            .collect()
    }

    fn by_address(&self, address: &str) -> Option<CandidateIdentity> {
        let lists = [
            (&self.work_with, IdentitySource::WorkWith),
            (&self.contacts, IdentitySource::Contacts),
            (&self.users, IdentitySource::Directory),
        ];
        lists.into_iter().find_map(|(list, source)| {
            list.iter()
                .find(|p| p.addresses.iter().any(|a| a.eq_ignore_ascii_case(address)))
                .map(|p| CandidateIdentity::new(p.name.clone(), p.addresses.clone(), source))
        })
    }
}

#[async_trait]
impl DirectoryService for InMemoryDirectory {
    async fn people_work_with(
        &self,
        query: &str,
    ) -> Result<Vec<CandidateIdentity>, ServiceError> {
        check(&self.failure)?;
        Ok(Self::search(&self.work_with, query, IdentitySource::WorkWith))
    }

    async fn contacts(&self, query: &str) -> Result<Vec<CandidateIdentity>, ServiceError> {
        check(&self.failure)?;
        Ok(Self::search(&self.contacts, query, IdentitySource::Contacts))
    }

    async fn users(&self, query: &str) -> Result<Vec<CandidateIdentity>, ServiceError> {
        check(&self.failure)?;
        Ok(Self::search(&self.users, query, IdentitySource::Directory))
    }

    async fn me(&self) -> Result<CandidateIdentity, ServiceError> {
        check(&self.failure)?;
        self.me
            .as_ref()
            .map(|p| CandidateIdentity::new(p.name.clone(), p.addresses.clone(), IdentitySource::Me))
            .ok_or(ServiceError::Rejected {
                service: "directory",
                kind: SkillErrorKind::Unauthorized,
                message: "no signed-in user".to_string(),
            })
    }

    async fn manager_of(
        &self,
        address: Option<&str>,
    ) -> Result<Option<CandidateIdentity>, ServiceError> {
        check(&self.failure)?;
        let subject = match address {
            Some(a) => Some(a.to_lowercase()),
            None => self
                .me
                .as_ref()
                .and_then(|p| p.addresses.first())
                .map(|a| a.to_lowercase()),
        };
        Ok(subject
            .and_then(|s| self.managers.get(&s))
            .and_then(|manager| self.by_address(manager)))
    }
}

// ============================================================================
// Rooms
// ============================================================================

/// Room catalogue backed by a vector
#[derive(Debug, Default)]
pub struct InMemoryRooms {
    rooms: Vec<RoomInfo>,
    failure: RwLock<Option<ServiceError>>,
}

impl InMemoryRooms {
    /// Catalogue seeded from fixtures
    #[must_use]
    pub fn from_fixtures(fixtures: &Fixtures) -> Self {
        Self {
            rooms: fixtures.rooms.clone(),
            failure: RwLock::new(None),
        }
    }

    /// Make every call fail with `err` (or succeed again with `None`)
    pub fn set_failure(&self, err: Option<ServiceError>) {
        *self.failure.write() = err;
    }
}

#[async_trait]
impl RoomService for InMemoryRooms {
    async fn search_rooms(
        &self,
        building: Option<&str>,
        floor: Option<i32>,
    ) -> Result<Vec<RoomInfo>, ServiceError> {
        check(&self.failure)?;
        let building = building.filter(|b| *b != "*");
        let floor = floor.filter(|f| *f != 0);
        Ok(self
            .rooms
            .iter()
            .filter(|r| {
                building.map_or(true, |b| {
                    r.building
                        .as_deref()
                        .is_some_and(|rb| rb.eq_ignore_ascii_case(b))
                })
            })
            .filter(|r| floor.map_or(true, |f| r.floor == Some(f)))
            .cloned()
            .collect())
    }

    async fn rooms_by_name(&self, name: &str) -> Result<Vec<RoomInfo>, ServiceError> {
        check(&self.failure)?;
        let needle = name.trim().to_lowercase();
        Ok(self
            .rooms
            .iter()
            .filter(|r| r.display_name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Records which conversations signed out
#[derive(Debug, Default)]
pub struct InMemoryCredentials {
    revoked: RwLock<Vec<ConversationId>>,
}

impl InMemoryCredentials {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Conversations whose credentials were revoked
    #[must_use]
    pub fn revoked(&self) -> Vec<ConversationId> {
        self.revoked.read().clone()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentials {
    async fn revoke(&self, conversation: &ConversationId) -> Result<(), ServiceError> {
        self.revoked.write().push(conversation.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn person(name: &str, addresses: &[&str]) -> PersonFixture {
        PersonFixture {
            name: name.to_string(),
            addresses: addresses.iter().map(ToString::to_string).collect(),
        }
    }

    fn at(s: &str) -> NaiveDateTime {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_directory_search_and_manager() {
        let fixtures = Fixtures {
            me: Some(person("Pat", &["pat@contoso.com"])),
            users: vec![
                person("Alex Wilber", &["alexw@contoso.com"]),
                person("Megan Bowen", &["meganb@contoso.com"]),
            ],
            managers: HashMap::from([(
                "PAT@contoso.com".to_string(),
                "meganb@contoso.com".to_string(),
            )]),
            ..Fixtures::default()
        };
        let dir = InMemoryDirectory::from_fixtures(&fixtures);

        let found = dir.users("alex").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, IdentitySource::Directory);
        assert!(dir.users("   ").await.unwrap().is_empty());

        let manager = dir.manager_of(None).await.unwrap().unwrap();
        assert_eq!(manager.display_name, "Megan Bowen");
        assert_eq!(dir.me().await.unwrap().source, IdentitySource::Me);
    }

    #[tokio::test]
    async fn test_calendar_free_busy() {
        let cal = InMemoryCalendar::new();
        cal.mark_busy("room1@contoso.com", at("2026-10-17T10:00:00"), at("2026-10-17T11:00:00"));

        let free = cal
            .free_busy(
                &["room1@contoso.com".to_string(), "room2@contoso.com".to_string()],
                at("2026-10-17T10:30:00"),
                30,
            )
            .await
            .unwrap();
        assert_eq!(free, vec![false, true]);

        let later = cal
            .free_busy(&["room1@contoso.com".to_string()], at("2026-10-17T11:00:00"), 30)
            .await
            .unwrap();
        assert_eq!(later, vec![true]);
    }

    #[tokio::test]
    async fn test_calendar_create_and_query() {
        let cal = InMemoryCalendar::new();
        let created = cal
            .create_event(NewEvent {
                title: "Design review".into(),
                content: None,
                start: at("2026-10-17T10:00:00"),
                end: at("2026-10-17T10:30:00"),
                location: None,
                attendees: vec![],
                room: None,
            })
            .await
            .unwrap();

        let by_time = cal
            .events_by_time(at("2026-10-17T00:00:00"), at("2026-10-18T00:00:00"))
            .await
            .unwrap();
        assert_eq!(by_time, vec![created.clone()]);
        assert_eq!(cal.events_by_title("design").await.unwrap().len(), 1);

        cal.delete_event(&created.id).await.unwrap();
        assert!(cal.events().is_empty());
        assert!(cal.delete_event(&created.id).await.is_err());
    }

    #[tokio::test]
    async fn test_failure_mode() {
        let rooms = InMemoryRooms::default();
        rooms.set_failure(Some(ServiceError::Unavailable {
            service: "rooms",
            message: "down".into(),
        }));
        assert!(rooms.search_rooms(None, None).await.is_err());
        rooms.set_failure(None);
        assert!(rooms.search_rooms(None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_room_search_filters() {
        let room = |name: &str, building: &str, floor: i32| RoomInfo {
            display_name: name.to_string(),
            email: format!("{}@contoso.com", name.to_lowercase()),
            building: Some(building.to_string()),
            floor: Some(floor),
        };
        let rooms = InMemoryRooms::from_fixtures(&Fixtures {
            rooms: vec![room("A1", "X", 3), room("A2", "X", 4), room("B1", "Y", 3)],
            ..Fixtures::default()
        });

        assert_eq!(rooms.search_rooms(Some("x"), Some(3)).await.unwrap().len(), 1);
        assert_eq!(rooms.search_rooms(Some("X"), Some(0)).await.unwrap().len(), 2);
        assert_eq!(rooms.search_rooms(Some("*"), None).await.unwrap().len(), 3);
        assert_eq!(rooms.rooms_by_name("b1").await.unwrap().len(), 1);
    }
}
