//! Show-events task and the shared event search

use async_trait::async_trait;
use chrono::{Days, NaiveDateTime, NaiveTime};

use crate::dialog::prompt::ordinal_index;
use crate::dialog::{
    Choice, Flow, FlowId, FlowOptions, PromptSpec, StepOutcome, StepResult, TurnContext,
};
use crate::error::DialogError;
use crate::messages::{OutgoingMessage, Template};
use crate::resolver::move_page;
use crate::services::CalendarEvent;
use crate::state::{ConversationState, SearchCondition};

use super::change_status::NewEventStatus;

const EVENT_START_FORMAT: &str = "%a %b %-d %-I:%M %p";
const EVENT_END_FORMAT: &str = "%-I:%M %p";
const LOCATION_WINDOW_DAYS: u64 = 7;

fn end_of_day(at: NaiveDateTime) -> NaiveDateTime {
    at.date()
        .checked_add_days(Days::new(1))
        .map_or(at, |d| d.and_time(NaiveTime::MIN))
}

/// Events matching what the user said, earliest first
///
/// Time beats title, title beats attendee, attendee beats location; with
/// nothing to go on the search covers today.
pub(crate) async fn find_events(ctx: &mut TurnContext<'_>) -> Result<Vec<CalendarEvent>, DialogError> {
    let calendar = &ctx.services.calendar;
    let meeting = &ctx.state.meeting;
    let today = ctx.now.date().and_time(NaiveTime::MIN);

    let (condition, events) = if let Some(date) = meeting.start_date.last() {
        let from = date.and_time(meeting.start_time.last().copied().unwrap_or(NaiveTime::MIN));
        let events = calendar.events_by_time(from, end_of_day(from)).await?;
        (SearchCondition::Time, events)
    } else if let Some(time) = meeting.start_time.last() {
        let from = ctx.now.date().and_time(*time);
        let events = calendar.events_by_time(from, end_of_day(from)).await?;
        (SearchCondition::Time, events)
    } else if let Some(title) = &meeting.title {
        (SearchCondition::Title, calendar.events_by_title(title).await?)
    } else if let Some(name) = ctx.state.contacts.name_list.first() {
        (SearchCondition::Attendee, calendar.events_by_attendee(name).await?)
    } else if let Some(location) = &meeting.location {
        let needle = location.to_lowercase();
        let until = today
            .checked_add_days(Days::new(LOCATION_WINDOW_DAYS))
            .unwrap_or(today);
        let events = calendar
            .events_by_time(ctx.now, until)
            .await?
            .into_iter()
            .filter(|e| {
                e.location
                    .as_deref()
                    .is_some_and(|l| l.to_lowercase().contains(&needle))
            })
            .collect();
        (SearchCondition::Location, events)
    } else {
        (SearchCondition::Time, calendar.events_by_time(today, end_of_day(today)).await?)
    };

    tracing::debug!(conversation = %ctx.conversation, ?condition, found = events.len(), "Event search");
    ctx.state.showing.condition = condition;
    Ok(events)
}

/// Record search results and pick the event to focus on when there is one
///
/// Returns false when the user has to choose.
pub(crate) fn focus_results(state: &mut ConversationState, events: Vec<CalendarEvent>, now: NaiveDateTime) -> bool {
    let picked = state.meeting.order_reference.as_deref().and_then(|reference| {
        if reference.eq_ignore_ascii_case("next") {
            events.iter().position(|e| e.start >= now)
        } else {
            ordinal_index(reference, events.len())
        }
    });
    let showing = &mut state.showing;
    showing.show_event_index = 0;
    showing.focused = match (picked.and_then(|i| events.get(i)), events.as_slice()) {
        (Some(event), _) | (None, [event]) => vec![event.clone()],
        _ => Vec::new(),
    };
    showing.showing = events;
    !showing.focused.is_empty()
}

/// Focus the one event a task acts on, searching when nothing is focused yet
///
/// Events failing `keep` are left out of the search results. Ends the task
/// when nothing matches and asks the user to choose when several do.
pub(crate) async fn focus_event(
    ctx: &mut TurnContext<'_>,
    sub_flow_mode: bool,
    keep: impl Fn(&CalendarEvent, NaiveDateTime) -> bool + Send,
) -> Result<StepOutcome, DialogError> {
    if !ctx.state.showing.focused.is_empty() {
        return Ok(StepOutcome::Next(StepResult::Empty));
    }
    let now = ctx.now;
    let events: Vec<CalendarEvent> = find_events(ctx)
        .await?
        .into_iter()
        .filter(|e| keep(e, now))
        .collect();
    if events.is_empty() {
        ctx.send(OutgoingMessage::new(Template::ShowNoMeetingMessage));
        if !sub_flow_mode {
            ctx.state.clear();
        }
        return Ok(StepOutcome::End(StepResult::Empty));
    }
    if focus_results(ctx.state, events, now) {
        Ok(StepOutcome::Next(StepResult::Empty))
    } else {
        Ok(StepOutcome::Begin {
            flow: FlowId::ChooseEvent,
            options: FlowOptions {
                for_action: true,
                ..FlowOptions::sub_flow()
            },
        })
    }
}

/// The event a task is acting on
pub(crate) fn focused_event(state: &ConversationState) -> Result<CalendarEvent, DialogError> {
    state
        .showing
        .focused
        .first()
        .cloned()
        .ok_or_else(|| DialogError::missing("focused event"))
}

/// Read one event aloud
pub(crate) fn read_event(event: &CalendarEvent) -> OutgoingMessage {
    OutgoingMessage::new(Template::ReadEvent)
        .with("title", event.title.as_str())
        .with("start", event.start.format(EVENT_START_FORMAT).to_string())
        .with("end", event.end.format(EVENT_END_FORMAT).to_string())
}

// ============================================================================
// ShowEvents
// ============================================================================

/// List events and act on one of them
#[derive(Debug, Default)]
pub struct ShowEvents;

#[async_trait]
impl Flow for ShowEvents {
    fn id(&self) -> FlowId {
        FlowId::ShowEvents
    }

    fn step_count(&self) -> usize {
        4
    }

    async fn step(
        &self,
        index: usize,
        ctx: &mut TurnContext<'_>,
        _options: &mut FlowOptions,
        input: StepResult,
    ) -> Result<StepOutcome, DialogError> {
        match index {
            0 => {
                let events = find_events(ctx).await?;
                if events.is_empty() {
                    ctx.send(OutgoingMessage::new(Template::ShowNoMeetingMessage));
                    ctx.state.clear();
                    return Ok(StepOutcome::End(StepResult::Empty));
                }
                if focus_results(ctx.state, events, ctx.now) {
                    Ok(StepOutcome::Next(StepResult::Empty))
                } else {
                    Ok(StepOutcome::begin_sub(FlowId::ChooseEvent))
                }
            }
            1 => {
                let event = ctx
                    .state
                    .showing
                    .focused
                    .first()
                    .ok_or_else(|| DialogError::missing("focused event"))?;
                let message = read_event(event);
                ctx.send(message);
                let choices = vec![
                    Choice::new("accept", vec!["yes".into(), "accept it".into()]),
                    Choice::new(
                        "decline",
                        vec!["delete".into(), "cancel it".into(), "remove".into()],
                    ),
                    Choice::new(
                        "done",
                        vec!["nothing".into(), "no".into(), "that's all".into()],
                    ),
                ];
                Ok(StepOutcome::Prompt(PromptSpec::choice(
                    OutgoingMessage::new(Template::AskForAction),
                    choices,
                    false,
                )))
            }
            2 => {
                let StepResult::Choice(found) = input else {
                    return Err(DialogError::missing("action choice"));
                };
                let status = match found.value.as_str() {
                    "accept" => NewEventStatus::Accept,
                    "decline" => NewEventStatus::Cancel,
                    _ => {
                        ctx.state.clear();
                        return Ok(StepOutcome::End(StepResult::Empty));
                    }
                };
                Ok(StepOutcome::Begin {
                    flow: FlowId::ChangeEventStatus,
                    options: FlowOptions {
                        status: Some(status),
                        ..FlowOptions::sub_flow()
                    },
                })
            }
            3 => {
                ctx.state.clear();
                Ok(StepOutcome::End(StepResult::Empty))
            }
            _ => Err(DialogError::Fatal(format!("ShowEvents has no step {index}"))),
        }
    }
}

// ============================================================================
// ChooseEvent
// ============================================================================

/// Pick one event from the results, a page at a time
#[derive(Debug, Default)]
pub struct ChooseEvent;

#[async_trait]
impl Flow for ChooseEvent {
    fn id(&self) -> FlowId {
        FlowId::ChooseEvent
    }

    fn step_count(&self) -> usize {
        2
    }

    fn is_slot_collection(&self) -> bool {
        true
    }

    fn clear_sub_scope(&self, state: &mut ConversationState) {
        state.showing.focused.clear();
    }

    async fn step(
        &self,
        index: usize,
        ctx: &mut TurnContext<'_>,
        options: &mut FlowOptions,
        input: StepResult,
    ) -> Result<StepOutcome, DialogError> {
        let showing = &mut ctx.state.showing;
        match (index, input) {
            (0, _) => {
                let choices = showing
                    .current_page()
                    .iter()
                    .enumerate()
                    .map(|(i, e)| {
                        Choice::new(
                            format!("{} ({})", e.title, e.start.format(EVENT_START_FORMAT)),
                            vec![(i + 1).to_string(), e.title.clone()],
                        )
                    })
                    .collect();
                let prompt = if options.for_action {
                    OutgoingMessage::new(Template::ChooseEvent)
                } else {
                    OutgoingMessage::new(Template::ShowMeetingList).with("count", showing.showing.len())
                };
                Ok(StepOutcome::Prompt(PromptSpec::choice(prompt, choices, true)))
            }
            (1, StepResult::Page(mv)) => {
                let len = showing.showing.len();
                let page_size = showing.page_size;
                if let Some(message) = move_page(len, &mut showing.show_event_index, page_size, mv) {
                    ctx.send(message);
                }
                Ok(StepOutcome::Replace {
                    flow: FlowId::ChooseEvent,
                    options: options.clone(),
                })
            }
            (1, StepResult::Choice(found)) => {
                let position = showing.show_event_index * showing.page_size + found.index;
                let event = showing
                    .showing
                    .get(position)
                    .cloned()
                    .ok_or_else(|| DialogError::Validation(format!("no event {}", found.value)))?;
                showing.focused = vec![event];
                Ok(StepOutcome::End(StepResult::Empty))
            }
            (step, other) => Err(DialogError::Fatal(format!(
                "ChooseEvent step {step} got {other:?}"
            ))),
        }
    }
}
