//! Add, swap or release the room of an existing event
//!
//! The room search runs over the event's own start and length, so the slot
//! flows inside `FindMeetingRoom` end without asking anything.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::show_events::{focus_event, focused_event};
use crate::dialog::{Flow, FlowId, FlowOptions, StepOutcome, StepResult, TurnContext};
use crate::error::DialogError;
use crate::messages::{OutgoingMessage, Template};
use crate::services::CalendarEvent;
use crate::state::{Attendee, ConversationState, RoomInfo};

/// Requested change to an event's room
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomChange {
    /// Book a room
    Add,
    /// Book a different room
    Change,
    /// Release the booked room
    Cancel,
}

/// Find one event and change its room
#[derive(Debug, Default)]
pub struct UpdateMeetingRoom;

/// `event` with `room` in place of whatever room it had
fn with_room(event: CalendarEvent, room: Option<RoomInfo>) -> CalendarEvent {
    let old = event.room.clone();
    let mut attendees: Vec<Attendee> = event.attendees;
    let mut location = event.location;
    if let Some(old) = &old {
        attendees.retain(|a| !a.address.eq_ignore_ascii_case(&old.email));
        if location.as_deref() == Some(old.display_name.as_str()) {
            location = None;
        }
    }
    if let Some(room) = &room {
        attendees.push(Attendee::new(room.display_name.clone(), room.email.clone()));
        location = Some(room.display_name.clone());
    }
    CalendarEvent {
        attendees,
        location,
        room,
        ..event
    }
}

#[async_trait]
impl Flow for UpdateMeetingRoom {
    fn id(&self) -> FlowId {
        FlowId::UpdateMeetingRoom
    }

    fn step_count(&self) -> usize {
        3
    }

    fn clear_sub_scope(&self, state: &mut ConversationState) {
        state.showing.focused.clear();
        state.meeting.clear_meeting_room();
    }

    async fn step(
        &self,
        index: usize,
        ctx: &mut TurnContext<'_>,
        options: &mut FlowOptions,
        input: StepResult,
    ) -> Result<StepOutcome, DialogError> {
        let change = options
            .room_change
            .ok_or_else(|| DialogError::missing("room change"))?;
        match index {
            0 => focus_event(ctx, options.sub_flow_mode, |_, _| true).await,
            1 => {
                let event = focused_event(ctx.state)?;
                if !event.is_organizer {
                    ctx.send(OutgoingMessage::new(Template::NotEventOrganizer).with("title", event.title));
                    ctx.state.clear();
                    return Ok(StepOutcome::End(StepResult::Empty));
                }
                if change == RoomChange::Cancel {
                    if event.room.is_none() {
                        ctx.send(OutgoingMessage::new(Template::NoMeetingRoomToCancel).with("title", event.title));
                        ctx.state.clear();
                        return Ok(StepOutcome::End(StepResult::Empty));
                    }
                    return Ok(StepOutcome::Next(StepResult::Empty));
                }
                let meeting = &mut ctx.state.meeting;
                meeting.clear_times();
                meeting.meeting_room = None;
                meeting.start_date_time = Some(event.start);
                meeting.end_date_time = Some(event.end);
                meeting.duration_secs = Some((event.end - event.start).num_seconds());
                Ok(StepOutcome::begin_sub(FlowId::FindMeetingRoom))
            }
            2 => {
                let event = focused_event(ctx.state)?;
                let old_room = event.room.as_ref().map(|r| r.display_name.clone());
                let room = match change {
                    RoomChange::Cancel => None,
                    RoomChange::Add | RoomChange::Change => {
                        let booked = ctx.state.meeting.meeting_room.clone();
                        if input == StepResult::Cancelled || booked.is_none() {
                            ctx.send(OutgoingMessage::new(Template::ConfirmedMeetingRoom));
                            ctx.state.clear();
                            return Ok(StepOutcome::End(StepResult::Empty));
                        }
                        booked
                    }
                };
                let updated = ctx.services.calendar.update_event(with_room(event, room)).await?;
                tracing::info!(
                    conversation = %ctx.conversation,
                    event = %updated.id,
                    ?change,
                    room = ?updated.room.as_ref().map(|r| &r.display_name),
                    "Event room changed"
                );
                let message = match (&updated.room, old_room) {
                    (None, released) => OutgoingMessage::new(Template::MeetingRoomCanceled)
                        .with("room", released.unwrap_or_default()),
                    (Some(room), None) => {
                        OutgoingMessage::new(Template::MeetingRoomAdded).with("room", room.display_name.as_str())
                    }
                    (Some(room), Some(_)) => {
                        OutgoingMessage::new(Template::MeetingRoomChanged).with("room", room.display_name.as_str())
                    }
                };
                ctx.send(message.with("title", updated.title.as_str()));
                ctx.state.clear();
                Ok(StepOutcome::End(StepResult::Empty))
            }
            _ => Err(DialogError::Fatal(format!("UpdateMeetingRoom has no step {index}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{BusySlot, Fixtures};
    use crate::testing::{at, Harness};
    use pretty_assertions::assert_eq;

    fn room(name: &str, floor: i32) -> RoomInfo {
        RoomInfo {
            display_name: name.to_string(),
            email: format!("{}@rooms.contoso.com", name.to_lowercase()),
            building: Some("X".to_string()),
            floor: Some(floor),
        }
    }

    fn event(id: &str, title: &str, start: &str, booked: Option<RoomInfo>) -> CalendarEvent {
        let start = at(start);
        let mut attendees = vec![Attendee::new("Alex", "alex@contoso.com")];
        if let Some(r) = &booked {
            attendees.push(Attendee::new(r.display_name.clone(), r.email.clone()));
        }
        CalendarEvent {
            id: id.to_string(),
            title: title.to_string(),
            content: None,
            start,
            end: start + chrono::Duration::hours(1),
            location: booked.as_ref().map(|r| r.display_name.clone()),
            attendees,
            is_organizer: true,
            is_accepted: true,
            room: booked,
            join_url: None,
        }
    }

    fn harness(busy: Vec<BusySlot>) -> Harness {
        Harness::new(Fixtures {
            rooms: vec![room("X301", 3), room("X302", 3)],
            events: vec![
                event("a", "Design review", "2026-10-16T14:00:00", None),
                event("b", "Planning", "2026-10-19T10:00:00", Some(room("X301", 3))),
            ],
            busy,
            ..Fixtures::default()
        })
    }

    fn options(change: RoomChange) -> FlowOptions {
        FlowOptions {
            room_change: Some(change),
            ..FlowOptions::default()
        }
    }

    fn stored(h: &Harness, id: &str) -> CalendarEvent {
        h.calendar.events().into_iter().find(|e| e.id == id).unwrap()
    }

    #[tokio::test]
    async fn test_add_room_to_event() {
        let mut h = harness(vec![BusySlot {
            address: "x301@rooms.contoso.com".into(),
            start: at("2026-10-16T13:30:00"),
            end: at("2026-10-16T14:30:00"),
        }]);
        h.state.meeting.title = Some("design".into());
        h.state.meeting.building = Some("X".into());
        h.state.meeting.floor_number = Some(3);

        let sent = h.begin(FlowId::UpdateMeetingRoom, options(RoomChange::Add)).await;
        assert_eq!(Harness::templates(&sent), vec![Template::ConfirmMeetingRoomPrompt]);
        assert_eq!(sent[0].data.get("room").and_then(|v| v.as_str()), Some("X302"));

        let sent = h.reply_text("yes").await;
        assert_eq!(Harness::templates(&sent), vec![Template::MeetingRoomAdded]);
        let updated = stored(&h, "a");
        assert_eq!(updated.room.map(|r| r.display_name), Some("X302".to_string()));
        assert_eq!(updated.location.as_deref(), Some("X302"));
        assert_eq!(updated.attendees.len(), 2);
        assert_eq!(updated.start, at("2026-10-16T14:00:00"));
        assert!(h.stack.is_empty());
    }

    #[tokio::test]
    async fn test_change_room_swaps_attendee() {
        let mut h = harness(vec![]);
        h.state.meeting.title = Some("planning".into());
        h.state.meeting.meeting_room_name = Some("X302".into());

        let sent = h.begin(FlowId::UpdateMeetingRoom, options(RoomChange::Change)).await;
        assert_eq!(Harness::templates(&sent), vec![Template::ConfirmMeetingRoomPrompt]);

        let sent = h.reply_text("yes").await;
        assert_eq!(Harness::templates(&sent), vec![Template::MeetingRoomChanged]);
        let updated = stored(&h, "b");
        let addresses: Vec<&str> = updated.attendees.iter().map(|a| a.address.as_str()).collect();
        assert_eq!(addresses, vec!["alex@contoso.com", "x302@rooms.contoso.com"]);
        assert_eq!(updated.location.as_deref(), Some("X302"));
    }

    #[tokio::test]
    async fn test_cancel_room_releases_it() {
        let mut h = harness(vec![]);
        h.state.meeting.title = Some("planning".into());
        let sent = h.begin(FlowId::UpdateMeetingRoom, options(RoomChange::Cancel)).await;
        assert_eq!(Harness::templates(&sent), vec![Template::MeetingRoomCanceled]);
        assert_eq!(sent[0].data.get("room").and_then(|v| v.as_str()), Some("X301"));

        let updated = stored(&h, "b");
        assert_eq!(updated.room, None);
        assert_eq!(updated.location, None);
        assert_eq!(updated.attendees.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_without_room() {
        let mut h = harness(vec![]);
        h.state.meeting.title = Some("design".into());
        let sent = h.begin(FlowId::UpdateMeetingRoom, options(RoomChange::Cancel)).await;
        assert_eq!(Harness::templates(&sent), vec![Template::NoMeetingRoomToCancel]);
        assert!(h.stack.is_empty());
    }
}
