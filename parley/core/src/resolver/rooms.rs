//! Meeting room flows
//!
//! `FindMeetingRoom` makes sure the time is known, collects building and
//! floor, then offers the first free room the user has not declined. When
//! nothing is left it widens the search on its own (floor first, then
//! building) before asking the user how to change it.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dialog::prompt::{date_times, parse_number};
use crate::dialog::{
    Flow, FlowId, FlowOptions, PromptSpec, StepOutcome, StepResult, TurnContext,
};
use crate::error::DialogError;
use crate::messages::{OutgoingMessage, Template};
use crate::recognizer::{CalendarIntent, EntityKind, Resolution};
use crate::state::{ConversationState, RoomInfo};

/// Building value meaning "any building"
pub const ANY_BUILDING: &str = "*";

const DEFAULT_ROOM_MINUTES: u32 = 30;

static CHANGE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(adjust|change|another|different|other)\b.*\btime\b").unwrap()
});
static CHANGE_ROOM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(adjust|change|another|different|other)\b.*\broom\b").unwrap()
});

/// The room currently on offer
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCursor {
    /// Room waiting for a yes/no
    #[serde(default)]
    pub offered: Option<RoomInfo>,
}

fn is_reject(ctx: &TurnContext<'_>) -> bool {
    ctx.signals.task_intent() == CalendarIntent::RejectCalendar
        && ctx.signals.task_score() > ctx.config.reject_threshold
}

fn floor_from(ctx: &TurnContext<'_>, text: &str) -> Option<i32> {
    let entity = ctx.signals.entities_of(EntityKind::FloorNumber).next()?;
    entity
        .values
        .iter()
        .find_map(|v| match v {
            Resolution::Number { value } => i32::try_from(*value).ok(),
            _ => None,
        })
        .or_else(|| entity.text(text).and_then(parse_number).and_then(|n| i32::try_from(n).ok()))
}

fn sub_options(sub_flow_mode: bool) -> FlowOptions {
    FlowOptions {
        sub_flow_mode,
        ..FlowOptions::default()
    }
}

/// Forget the start so it is asked again, keeping the duration
fn restart_times(state: &mut ConversationState) {
    let duration = state.meeting.duration_secs;
    state.meeting.clear_times();
    state.meeting.duration_secs = duration;
}

// ============================================================================
// FindMeetingRoom
// ============================================================================

/// Find, offer and book a meeting room
#[derive(Debug, Default)]
pub struct FindMeetingRoom;

impl FindMeetingRoom {
    async fn search(
        ctx: &mut TurnContext<'_>,
        options: &mut FlowOptions,
    ) -> Result<StepOutcome, DialogError> {
        let start = ctx
            .state
            .meeting
            .start_date_time
            .ok_or_else(|| DialogError::missing("meeting start"))?;
        let minutes = ctx
            .state
            .meeting
            .duration_secs
            .and_then(|s| u32::try_from(s / 60).ok())
            .filter(|m| *m > 0)
            .unwrap_or(DEFAULT_ROOM_MINUTES);

        let named = ctx.state.meeting.meeting_room_name.clone();
        let rooms = match &named {
            Some(name) => {
                let rooms = ctx.services.rooms.rooms_by_name(name).await?;
                if rooms.is_empty() {
                    tracing::info!(room = %name, "Named room not found");
                    ctx.send(OutgoingMessage::new(Template::MeetingRoomNotFound).with("room", name.as_str()));
                    ctx.state.meeting.meeting_room_name = None;
                    return Ok(StepOutcome::begin_sub(FlowId::RecreateMeetingRoom));
                }
                rooms
            }
            None => {
                let meeting = &ctx.state.meeting;
                ctx.services
                    .rooms
                    .search_rooms(meeting.building.as_deref(), meeting.floor_number)
                    .await?
            }
        };

        let free = if rooms.is_empty() {
            Vec::new()
        } else {
            let addresses: Vec<String> = rooms.iter().map(|r| r.email.clone()).collect();
            ctx.services.free_busy(&addresses, start, minutes).await?
        };
        let available: Vec<RoomInfo> = rooms
            .into_iter()
            .zip(free)
            .filter_map(|(room, is_free)| is_free.then_some(room))
            .collect();
        let offer = available
            .iter()
            .find(|r| {
                let key = ctx.state.meeting.ignored_room_key(r);
                !ctx.state.meeting.ignored_rooms.contains(&key)
            })
            .cloned();

        if let Some(room) = offer {
            tracing::debug!(room = %room.display_name, "Offering room");
            let prompt = OutgoingMessage::new(Template::ConfirmMeetingRoomPrompt)
                .with("room", room.display_name.as_str());
            options.room = Some(RoomCursor { offered: Some(room) });
            return Ok(StepOutcome::Prompt(PromptSpec::confirm(prompt)));
        }

        let template = if available.is_empty() {
            Template::CannotFindMeetingRoom
        } else {
            Template::CannotFindOtherMeetingRoom
        };
        ctx.send(OutgoingMessage::new(template));

        let meeting = &mut ctx.state.meeting;
        if named.is_some() {
            return Ok(StepOutcome::begin_sub(FlowId::RecreateMeetingRoom));
        }
        let again = StepOutcome::Replace {
            flow: FlowId::FindMeetingRoom,
            options: sub_options(options.sub_flow_mode),
        };
        if meeting.floor_number.is_some_and(|f| f != 0) {
            tracing::debug!("Widening room search to any floor");
            meeting.floor_number = Some(0);
            Ok(again)
        } else if meeting.building.as_deref() != Some(ANY_BUILDING) {
            tracing::debug!("Widening room search to any building");
            meeting.building = Some(ANY_BUILDING.to_string());
            meeting.floor_number = Some(0);
            Ok(again)
        } else {
            Ok(StepOutcome::begin_sub(FlowId::RecreateMeetingRoom))
        }
    }
}

#[async_trait]
impl Flow for FindMeetingRoom {
    fn id(&self) -> FlowId {
        FlowId::FindMeetingRoom
    }

    fn step_count(&self) -> usize {
        8
    }

    fn is_slot_collection(&self) -> bool {
        true
    }

    fn clear_sub_scope(&self, state: &mut ConversationState) {
        state.meeting.clear_meeting_room();
    }

    async fn step(
        &self,
        index: usize,
        ctx: &mut TurnContext<'_>,
        options: &mut FlowOptions,
        input: StepResult,
    ) -> Result<StepOutcome, DialogError> {
        let meeting = &ctx.state.meeting;
        match index {
            0 => Ok(StepOutcome::begin_sub(FlowId::UpdateStartDate)),
            1 => Ok(StepOutcome::begin_sub(FlowId::UpdateStartTime)),
            2 => Ok(StepOutcome::begin_sub(FlowId::UpdateDuration)),
            3 => {
                if meeting.meeting_room_name.is_none() && meeting.building.is_none() {
                    Ok(StepOutcome::begin_sub(FlowId::CollectBuilding))
                } else {
                    Ok(StepOutcome::Next(StepResult::Empty))
                }
            }
            4 => {
                let skip = meeting.meeting_room_name.is_some()
                    || meeting.building.as_deref() == Some(ANY_BUILDING)
                    || meeting.floor_number.is_some();
                if skip {
                    Ok(StepOutcome::Next(StepResult::Empty))
                } else {
                    Ok(StepOutcome::begin_sub(FlowId::CollectFloor))
                }
            }
            5 => Self::search(ctx, options).await,
            6 => {
                let offered = options.room.take().and_then(|c| c.offered);
                match (input, offered) {
                    (StepResult::Confirmed(true), Some(room)) => {
                        tracing::info!(conversation = %ctx.conversation, room = %room.display_name, "Room accepted");
                        ctx.state.meeting.meeting_room = Some(room);
                        Ok(StepOutcome::End(StepResult::Empty))
                    }
                    (StepResult::Confirmed(false), Some(room)) => {
                        let key = ctx.state.meeting.ignored_room_key(&room);
                        ctx.state.meeting.ignored_rooms.insert(key);
                        ctx.send(
                            OutgoingMessage::new(Template::IgnoreMeetingRoom)
                                .with("room", room.display_name.as_str()),
                        );
                        Ok(StepOutcome::begin_sub(FlowId::RecreateMeetingRoom))
                    }
                    (StepResult::Cancelled, _) => Ok(StepOutcome::End(StepResult::Cancelled)),
                    _ => Ok(StepOutcome::Replace {
                        flow: FlowId::FindMeetingRoom,
                        options: sub_options(options.sub_flow_mode),
                    }),
                }
            }
            7 => match input {
                StepResult::Cancelled => Ok(StepOutcome::End(StepResult::Cancelled)),
                _ => Ok(StepOutcome::Replace {
                    flow: FlowId::FindMeetingRoom,
                    options: sub_options(options.sub_flow_mode),
                }),
            },
            _ => Err(DialogError::Fatal(format!("FindMeetingRoom has no step {index}"))),
        }
    }
}

// ============================================================================
// CollectBuilding / CollectFloor
// ============================================================================

/// Ask which building the room should be in
#[derive(Debug, Default)]
pub struct CollectBuilding;

#[async_trait]
impl Flow for CollectBuilding {
    fn id(&self) -> FlowId {
        FlowId::CollectBuilding
    }

    fn step_count(&self) -> usize {
        2
    }

    fn is_slot_collection(&self) -> bool {
        true
    }

    fn clear_sub_scope(&self, state: &mut ConversationState) {
        state.meeting.building = None;
    }

    async fn step(
        &self,
        index: usize,
        ctx: &mut TurnContext<'_>,
        _options: &mut FlowOptions,
        input: StepResult,
    ) -> Result<StepOutcome, DialogError> {
        match (index, input) {
            (0, _) => Ok(StepOutcome::Prompt(
                PromptSpec::text(OutgoingMessage::new(Template::NoBuilding))
                    .with_retry(OutgoingMessage::new(Template::BuildingNonexistent)),
            )),
            (1, StepResult::Text(answer)) => {
                if is_reject(ctx) {
                    ctx.state.meeting.building = Some(ANY_BUILDING.to_string());
                    return Ok(StepOutcome::End(StepResult::Empty));
                }
                let building = ctx
                    .signals
                    .first_text(EntityKind::Building, ctx.text)
                    .unwrap_or(answer.as_str())
                    .trim()
                    .to_string();
                let rooms = ctx.services.rooms.search_rooms(Some(building.as_str()), None).await?;
                if rooms.is_empty() {
                    ctx.state.meeting.building = None;
                    return Err(DialogError::Validation(format!("no rooms in {building}")));
                }

                let first_floor = rooms.first().and_then(|r| r.floor);
                if first_floor.is_some() && rooms.iter().all(|r| r.floor == first_floor) {
                    ctx.state.meeting.floor_number = first_floor;
                }
                tracing::debug!(building = %building, rooms = rooms.len(), "Building accepted");
                ctx.state.meeting.building = Some(building);
                Ok(StepOutcome::End(StepResult::Empty))
            }
            (step, other) => Err(DialogError::Fatal(format!(
                "CollectBuilding step {step} got {other:?}"
            ))),
        }
    }
}

/// Ask which floor the room should be on
#[derive(Debug, Default)]
pub struct CollectFloor;

#[async_trait]
impl Flow for CollectFloor {
    fn id(&self) -> FlowId {
        FlowId::CollectFloor
    }

    fn step_count(&self) -> usize {
        2
    }

    fn is_slot_collection(&self) -> bool {
        true
    }

    fn clear_sub_scope(&self, state: &mut ConversationState) {
        state.meeting.floor_number = None;
    }

    async fn step(
        &self,
        index: usize,
        ctx: &mut TurnContext<'_>,
        _options: &mut FlowOptions,
        input: StepResult,
    ) -> Result<StepOutcome, DialogError> {
        match (index, input) {
            (0, _) => Ok(StepOutcome::Prompt(
                PromptSpec::text(OutgoingMessage::new(Template::NoFloorNumber))
                    .with_retry(OutgoingMessage::new(Template::FloorNumberRetry)),
            )),
            (1, StepResult::Text(answer)) => {
                let floor = if is_reject(ctx) {
                    Some(0)
                } else {
                    floor_from(ctx, ctx.text)
                        .or_else(|| parse_number(&answer).and_then(|n| i32::try_from(n).ok()))
                };
                match floor {
                    Some(floor) => {
                        ctx.state.meeting.floor_number = Some(floor);
                        Ok(StepOutcome::End(StepResult::Empty))
                    }
                    None => Err(DialogError::Validation(format!("no floor in {answer:?}"))),
                }
            }
            (step, other) => Err(DialogError::Fatal(format!(
                "CollectFloor step {step} got {other:?}"
            ))),
        }
    }
}

// ============================================================================
// RecreateMeetingRoom
// ============================================================================

/// Ask how to change the room search
#[derive(Debug, Default)]
pub struct RecreateMeetingRoom;

#[async_trait]
impl Flow for RecreateMeetingRoom {
    fn id(&self) -> FlowId {
        FlowId::RecreateMeetingRoom
    }

    fn step_count(&self) -> usize {
        2
    }

    fn is_slot_collection(&self) -> bool {
        true
    }

    fn clear_sub_scope(&self, state: &mut ConversationState) {
        state.meeting.clear_meeting_room();
    }

    async fn step(
        &self,
        index: usize,
        ctx: &mut TurnContext<'_>,
        options: &mut FlowOptions,
        input: StepResult,
    ) -> Result<StepOutcome, DialogError> {
        let answer = match (index, input) {
            (0, _) => {
                return Ok(StepOutcome::Prompt(
                    PromptSpec::text(OutgoingMessage::new(Template::RecreateMeetingRoom))
                        .with_retry(OutgoingMessage::new(Template::RecreateMeetingRoomAgain)),
                ))
            }
            (1, StepResult::Text(answer)) => answer,
            (step, other) => {
                return Err(DialogError::Fatal(format!(
                    "RecreateMeetingRoom step {step} got {other:?}"
                )))
            }
        };

        let times = date_times(ctx.signals);
        if !times.is_empty() {
            restart_times(ctx.state);
            for value in times {
                ctx.state.meeting.push_start(value);
            }
            return Ok(StepOutcome::End(StepResult::Empty));
        }

        if is_reject(ctx) {
            ctx.send(OutgoingMessage::new(Template::ConfirmedMeetingRoom));
            if options.sub_flow_mode {
                self.clear_sub_scope(ctx.state);
            } else {
                ctx.state.clear();
            }
            return Ok(StepOutcome::End(StepResult::Cancelled));
        }

        let mut changed = false;
        if let Some(floor) = floor_from(ctx, ctx.text) {
            ctx.state.meeting.floor_number = Some(floor);
            changed = true;
        }
        if let Some(room) = ctx.signals.first_text(EntityKind::MeetingRoom, ctx.text) {
            ctx.state.meeting.meeting_room_name = Some(room.trim().to_string());
            changed = true;
        }
        if let Some(building) = ctx.signals.first_text(EntityKind::Building, ctx.text) {
            let meeting = &mut ctx.state.meeting;
            meeting.building = Some(building.trim().to_string());
            meeting.floor_number = None;
            meeting.meeting_room_name = None;
            changed = true;
        }
        if changed {
            return Ok(StepOutcome::End(StepResult::Empty));
        }

        if CHANGE_TIME_RE.is_match(&answer) {
            restart_times(ctx.state);
            Ok(StepOutcome::End(StepResult::Empty))
        } else if CHANGE_ROOM_RE.is_match(&answer) {
            ctx.state.meeting.meeting_room_name = None;
            Ok(StepOutcome::End(StepResult::Empty))
        } else {
            Err(DialogError::Validation(format!("no room change in {answer:?}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::{DateTimeValue, Entity, RecognizedSignals};
    use crate::services::memory::BusySlot;
    use crate::services::Fixtures;
    use crate::testing::{at, Harness};
    use chrono::{NaiveDate, NaiveTime};
    use pretty_assertions::assert_eq;

    fn room(name: &str, building: &str, floor: i32) -> RoomInfo {
        RoomInfo {
            display_name: name.to_string(),
            email: format!("{}@rooms.contoso.com", name.to_lowercase()),
            building: Some(building.to_string()),
            floor: Some(floor),
        }
    }

    fn busy(name: &str) -> BusySlot {
        BusySlot {
            address: format!("{}@rooms.contoso.com", name.to_lowercase()),
            start: at("2026-10-17T09:00:00"),
            end: at("2026-10-17T12:00:00"),
        }
    }

    fn fixtures() -> Fixtures {
        Fixtures {
            rooms: vec![
                room("X301", "X", 3),
                room("X302", "X", 3),
                room("X401", "X", 4),
                room("Y101", "Y", 1),
                room("Z501", "Z", 5),
            ],
            busy: vec![busy("X301"), busy("X302")],
            ..Fixtures::default()
        }
    }

    fn harness() -> Harness {
        let mut h = Harness::new(fixtures());
        let meeting = &mut h.state.meeting;
        meeting.push_start(DateTimeValue::at(
            NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        ));
        meeting.duration_secs = Some(1800);
        h
    }

    fn offered(sent: &[OutgoingMessage]) -> Option<String> {
        sent.iter()
            .find(|m| m.template == Template::ConfirmMeetingRoomPrompt)
            .and_then(|m| m.data.get("room"))
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
    }

    #[tokio::test]
    async fn test_busy_floor_widens_search() {
        let mut h = harness();
        h.state.meeting.building = Some("X".into());
        h.state.meeting.floor_number = Some(3);

        let sent = h.begin(FlowId::FindMeetingRoom, FlowOptions::default()).await;
        assert_eq!(
            Harness::templates(&sent),
            vec![Template::CannotFindMeetingRoom, Template::ConfirmMeetingRoomPrompt]
        );
        assert_eq!(offered(&sent).as_deref(), Some("X401"));
        assert_eq!(h.state.meeting.floor_number, Some(0));

        h.reply_text("yes").await;
        assert!(h.stack.is_empty());
        assert_eq!(
            h.state.meeting.meeting_room.as_ref().map(|r| r.display_name.as_str()),
            Some("X401")
        );
    }

    #[tokio::test]
    async fn test_short_free_busy_answer_is_a_service_failure() {
        let mut h = harness();
        h.services.calendar = std::sync::Arc::new(crate::testing::ShortFreeBusy(h.calendar.clone()));
        h.state.meeting.building = Some("X".into());
        h.state.meeting.floor_number = Some(4);

        let sent = h.begin(FlowId::FindMeetingRoom, FlowOptions::default()).await;
        assert_eq!(Harness::templates(&sent), vec![Template::SkillError]);
        assert!(h.stack.is_empty());
        assert_eq!(h.state.meeting.meeting_room, None);
    }

    #[tokio::test]
    async fn test_declined_room_is_not_offered_again() {
        let mut h = harness();
        h.state.meeting.building = Some("X".into());
        h.state.meeting.floor_number = Some(4);
        let sent = h.begin(FlowId::FindMeetingRoom, FlowOptions::default()).await;
        assert_eq!(offered(&sent).as_deref(), Some("X401"));

        let sent = h.reply_text("no").await;
        assert_eq!(
            Harness::templates(&sent),
            vec![Template::IgnoreMeetingRoom, Template::RecreateMeetingRoom]
        );
        assert_eq!(h.state.meeting.ignored_rooms.len(), 1);

        let sent = h.reply_text("another room please").await;
        assert_eq!(
            Harness::templates(&sent),
            vec![
                Template::CannotFindOtherMeetingRoom,
                Template::CannotFindOtherMeetingRoom,
                Template::ConfirmMeetingRoomPrompt,
            ]
        );
        assert_eq!(offered(&sent).as_deref(), Some("Y101"));
        assert_eq!(h.state.meeting.building.as_deref(), Some(ANY_BUILDING));
    }

    #[tokio::test]
    async fn test_building_and_floor_prompts() {
        let mut h = harness();
        let sent = h.begin(FlowId::FindMeetingRoom, FlowOptions::default()).await;
        assert_eq!(Harness::templates(&sent), vec![Template::NoBuilding]);

        let sent = h.reply_text("Q").await;
        assert_eq!(Harness::templates(&sent), vec![Template::BuildingNonexistent]);

        let sent = h.reply_text("X").await;
        assert_eq!(Harness::templates(&sent), vec![Template::NoFloorNumber]);

        let sent = h.reply_text("upstairs").await;
        assert_eq!(Harness::templates(&sent), vec![Template::FloorNumberRetry]);

        let sent = h.reply_text("fourth floor").await;
        assert_eq!(offered(&sent).as_deref(), Some("X401"));
    }

    #[tokio::test]
    async fn test_single_floor_building_skips_floor_prompt() {
        let mut h = harness();
        h.begin(FlowId::FindMeetingRoom, FlowOptions::default()).await;
        let sent = h.reply_text("Z").await;
        assert_eq!(offered(&sent).as_deref(), Some("Z501"));
        assert_eq!(h.state.meeting.floor_number, Some(5));
    }

    #[tokio::test]
    async fn test_reject_building_means_any() {
        let mut h = harness();
        h.begin(FlowId::FindMeetingRoom, FlowOptions::default()).await;
        let signals = RecognizedSignals::task(CalendarIntent::RejectCalendar, 0.95);
        let sent = h.reply("doesn't matter", &signals).await;
        assert_eq!(offered(&sent).as_deref(), Some("X401"));
        assert_eq!(h.state.meeting.building.as_deref(), Some(ANY_BUILDING));
    }

    #[tokio::test]
    async fn test_unknown_named_room() {
        let mut h = harness();
        h.state.meeting.meeting_room_name = Some("Atlantis".into());
        let sent = h.begin(FlowId::FindMeetingRoom, FlowOptions::sub_flow()).await;
        assert_eq!(
            Harness::templates(&sent),
            vec![Template::MeetingRoomNotFound, Template::RecreateMeetingRoom]
        );

        let signals = RecognizedSignals::task(CalendarIntent::None, 0.4)
            .with_entity(Entity::new(EntityKind::Building, 4, 5));
        let sent = h.reply("try Y", &signals).await;
        assert_eq!(Harness::templates(&sent), vec![Template::NoFloorNumber]);
        assert_eq!(h.state.meeting.building.as_deref(), Some("Y"));
    }

    #[tokio::test]
    async fn test_recreate_reject_ends_search() {
        let mut h = harness();
        h.state.meeting.building = Some(ANY_BUILDING.into());
        h.state.meeting.floor_number = Some(0);
        h.state.meeting.meeting_room_name = Some("Atlantis".into());
        h.begin(FlowId::FindMeetingRoom, FlowOptions::sub_flow()).await;

        let sent = h.reply_text("hmm").await;
        assert_eq!(Harness::templates(&sent), vec![Template::RecreateMeetingRoomAgain]);

        let signals = RecognizedSignals::task(CalendarIntent::RejectCalendar, 0.9);
        let sent = h.reply("forget it", &signals).await;
        assert_eq!(Harness::templates(&sent), vec![Template::ConfirmedMeetingRoom]);
        assert!(h.stack.is_empty());
        assert_eq!(h.state.meeting.meeting_room, None);
        assert_eq!(h.state.meeting.building, None);
    }

    #[tokio::test]
    async fn test_recreate_with_new_time() {
        let mut h = harness();
        h.state.meeting.building = Some("X".into());
        h.state.meeting.floor_number = Some(4);
        h.begin(FlowId::FindMeetingRoom, FlowOptions::default()).await;
        h.reply_text("no").await;

        let tomorrow_noon = DateTimeValue::at(
            NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        );
        let signals = RecognizedSignals::task(CalendarIntent::None, 0.3).with_entity(
            Entity::new(EntityKind::DateTime, 0, 14).resolved(Resolution::Point { value: tomorrow_noon }),
        );
        let sent = h.reply("sunday at noon", &signals).await;
        assert_eq!(offered(&sent).as_deref(), Some("X401"));
        assert_eq!(h.state.meeting.start_date_time, Some(at("2026-10-18T12:00:00")));
        assert_eq!(h.state.meeting.duration_secs, Some(1800));
    }
}
