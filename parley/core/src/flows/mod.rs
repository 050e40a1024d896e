//! Built-in Flows
//!
//! The calendar tasks and the slot sub-flows they share. [`route`] maps a
//! recognized intent to the top-level flow that handles it, and
//! [`builtin_registry`] registers every flow the tasks can begin.
//!
//! # Design Philosophy
//!
//! Tasks never call each other directly. A task begins a sub-flow by id and
//! picks up its result one step later, so any flow can be suspended at a
//! prompt, persisted, and resumed by a different process.

pub mod change_status;
pub mod check_availability;
pub mod create_event;
pub mod join_event;
pub mod show_events;
pub mod slots;
pub mod time_remaining;
pub mod update_event;
pub mod update_room;

use std::sync::Arc;

use crate::dialog::{FlowId, FlowOptions, FlowRegistry};
use crate::recognizer::{CalendarIntent, GeneralIntent};
use crate::resolver::contacts::{FindContact, ResolveName, SelectEmail, SelectPerson};
use crate::resolver::rooms::{CollectBuilding, CollectFloor, FindMeetingRoom, RecreateMeetingRoom};

pub use change_status::{ChangeEventStatus, NewEventStatus};
pub use check_availability::CheckAvailability;
pub use create_event::CreateEvent;
pub use join_event::JoinEvent;
pub use show_events::{ChooseEvent, ShowEvents};
pub use slots::{UpdateDuration, UpdateStartDate, UpdateStartTime};
pub use time_remaining::TimeRemaining;
pub use update_event::UpdateEvent;
pub use update_room::{RoomChange, UpdateMeetingRoom};

/// Where an intent leads
#[derive(Clone, Debug, PartialEq)]
pub enum Route {
    /// Begin this flow
    Flow(FlowId, FlowOptions),
    /// Nothing was recognized
    DidntUnderstand,
    /// Recognized but not supported
    FeatureNotAvailable,
}

/// Top-level flow for a task intent
#[must_use]
pub fn route(intent: CalendarIntent) -> Route {
    use CalendarIntent as I;
    match intent {
        I::CreateCalendarEntry | I::FindMeetingRoom => {
            Route::Flow(FlowId::CreateEvent, FlowOptions::default())
        }
        I::ChangeCalendarEntry => Route::Flow(FlowId::UpdateEvent, FlowOptions::default()),
        I::AddMeetingRoom => room_route(RoomChange::Add),
        I::ChangeMeetingRoom => room_route(RoomChange::Change),
        I::CancelMeetingRoom => room_route(RoomChange::Cancel),
        I::CheckAvailability => Route::Flow(FlowId::CheckAvailability, FlowOptions::default()),
        I::TimeRemaining => Route::Flow(FlowId::TimeRemaining, FlowOptions::default()),
        I::ConnectToMeeting => Route::Flow(FlowId::JoinEvent, FlowOptions::default()),
        I::AcceptEventEntry => status_route(NewEventStatus::Accept),
        I::DeleteCalendarEntry => status_route(NewEventStatus::Cancel),
        I::FindCalendarEntry
        | I::FindCalendarDetail
        | I::FindCalendarWhen
        | I::FindCalendarWhere
        | I::FindCalendarWho
        | I::FindDuration
        | I::ShowNextCalendar
        | I::ShowPreviousCalendar => Route::Flow(FlowId::ShowEvents, FlowOptions::default()),
        I::None => Route::DidntUnderstand,
        I::RejectCalendar => Route::FeatureNotAvailable,
    }
}

/// Top-level flow for an idle turn, falling back to the general paging intents
#[must_use]
pub fn route_idle(task: CalendarIntent, general: GeneralIntent) -> Route {
    match (route(task), general) {
        (Route::DidntUnderstand, GeneralIntent::ShowNext | GeneralIntent::ShowPrevious) => {
            Route::Flow(FlowId::ShowEvents, FlowOptions::default())
        }
        (route, _) => route,
    }
}

fn status_route(status: NewEventStatus) -> Route {
    Route::Flow(
        FlowId::ChangeEventStatus,
        FlowOptions {
            status: Some(status),
            ..FlowOptions::default()
        },
    )
}

fn room_route(change: RoomChange) -> Route {
    Route::Flow(
        FlowId::UpdateMeetingRoom,
        FlowOptions {
            room_change: Some(change),
            ..FlowOptions::default()
        },
    )
}

/// Register every built-in flow
pub fn register_builtin(registry: &mut FlowRegistry) {
    registry.register(Arc::new(CreateEvent));
    registry.register(Arc::new(ShowEvents));
    registry.register(Arc::new(ChooseEvent));
    registry.register(Arc::new(ChangeEventStatus));
    registry.register(Arc::new(UpdateEvent));
    registry.register(Arc::new(UpdateMeetingRoom));
    registry.register(Arc::new(CheckAvailability));
    registry.register(Arc::new(TimeRemaining));
    registry.register(Arc::new(JoinEvent));
    registry.register(Arc::new(UpdateStartDate));
    registry.register(Arc::new(UpdateStartTime));
    registry.register(Arc::new(UpdateDuration));
    registry.register(Arc::new(FindContact));
    registry.register(Arc::new(ResolveName));
    registry.register(Arc::new(SelectPerson));
    registry.register(Arc::new(SelectEmail));
    registry.register(Arc::new(FindMeetingRoom));
    registry.register(Arc::new(CollectBuilding));
    registry.register(Arc::new(CollectFloor));
    registry.register(Arc::new(RecreateMeetingRoom));
}

/// Registry holding only the built-in flows
#[must_use]
pub fn builtin_registry() -> FlowRegistry {
    let mut registry = FlowRegistry::new();
    register_builtin(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_route_table() {
        assert_eq!(
            route(CalendarIntent::FindMeetingRoom),
            Route::Flow(FlowId::CreateEvent, FlowOptions::default())
        );
        assert_eq!(
            route(CalendarIntent::DeleteCalendarEntry),
            status_route(NewEventStatus::Cancel)
        );
        assert!(matches!(
            route(CalendarIntent::FindCalendarWho),
            Route::Flow(FlowId::ShowEvents, _)
        ));
        assert_eq!(route(CalendarIntent::None), Route::DidntUnderstand);
        assert_eq!(
            route(CalendarIntent::CancelMeetingRoom),
            room_route(RoomChange::Cancel)
        );
        assert_eq!(
            route(CalendarIntent::ConnectToMeeting),
            Route::Flow(FlowId::JoinEvent, FlowOptions::default())
        );
        assert_eq!(route(CalendarIntent::RejectCalendar), Route::FeatureNotAvailable);
    }

    #[test]
    fn test_idle_paging_shows_events() {
        assert!(matches!(
            route_idle(CalendarIntent::None, GeneralIntent::ShowNext),
            Route::Flow(FlowId::ShowEvents, _)
        ));
        assert_eq!(
            route_idle(CalendarIntent::None, GeneralIntent::None),
            Route::DidntUnderstand
        );
    }

    #[test]
    fn test_registry_has_every_builtin() {
        let registry = builtin_registry();
        assert_eq!(registry.len(), 20);
        for id in [
            FlowId::CreateEvent,
            FlowId::ResolveName,
            FlowId::RecreateMeetingRoom,
            FlowId::UpdateMeetingRoom,
            FlowId::CheckAvailability,
        ] {
            assert!(registry.contains(&id));
        }
        assert!(!registry.contains(&FlowId::Named("custom".into())));
    }
}
