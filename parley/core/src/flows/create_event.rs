//! Create-event task
//!
//! Collects title, attendees, start, duration and either a room or a
//! location, then reads a summary back. A declined summary asks what to
//! change, clears that slot and runs the task again from the top; every slot
//! still filled is skipped on the second pass.

use async_trait::async_trait;

use crate::dialog::prompt::is_skip;
use crate::dialog::{
    Choice, Flow, FlowId, FlowOptions, PromptSpec, StepOutcome, StepResult, TurnContext,
};
use crate::error::DialogError;
use crate::messages::{OutgoingMessage, Template};
use crate::recognizer::CalendarIntent;
use crate::resolver::contacts::ContactCursor;
use crate::services::NewEvent;
use crate::state::{ConversationState, RecreateTarget};

const START_FORMAT: &str = "%A, %B %-d at %-I:%M %p";

/// Book a meeting
#[derive(Debug, Default)]
pub struct CreateEvent;

impl CreateEvent {
    fn wants_room(state: &ConversationState) -> bool {
        let meeting = &state.meeting;
        meeting.meeting_room.is_none()
            && (state.initial_intent == Some(CalendarIntent::FindMeetingRoom)
                || meeting.meeting_room_name.is_some()
                || meeting.building.is_some()
                || meeting.recreate == Some(RecreateTarget::MeetingRoom))
    }

    fn wants_location(state: &ConversationState) -> bool {
        let meeting = &state.meeting;
        meeting.location.is_none()
            && match meeting.recreate {
                Some(RecreateTarget::Location) => true,
                None => meeting.meeting_room.is_none(),
                Some(_) => false,
            }
    }

    fn recreate_prompt() -> PromptSpec {
        let choices = RecreateTarget::ALL
            .iter()
            .map(|t| {
                Choice::new(
                    t.label(),
                    t.synonyms().iter().map(ToString::to_string).collect(),
                )
            })
            .collect();
        PromptSpec::choice(OutgoingMessage::new(Template::GetRecreateInfo), choices, false)
            .with_retry(OutgoingMessage::new(Template::GetRecreateInfoRetry))
    }

    async fn create(ctx: &mut TurnContext<'_>) -> Result<StepOutcome, DialogError> {
        let meeting = &ctx.state.meeting;
        let event = NewEvent {
            title: meeting
                .title
                .clone()
                .ok_or_else(|| DialogError::missing("title"))?,
            content: meeting.content.clone(),
            start: meeting
                .start_date_time
                .ok_or_else(|| DialogError::missing("start"))?,
            end: meeting
                .end_date_time
                .ok_or_else(|| DialogError::missing("end"))?,
            location: meeting.location.clone(),
            attendees: ctx.state.contacts.confirmed.clone(),
            room: meeting.meeting_room.clone(),
        };
        let created = ctx.services.calendar.create_event(event).await?;
        tracing::info!(
            conversation = %ctx.conversation,
            event = %created.id,
            attendees = created.attendees.len(),
            "Event created"
        );
        ctx.send(OutgoingMessage::new(Template::EventCreated).with("title", created.title.as_str()));
        ctx.state.clear();
        Ok(StepOutcome::End(StepResult::Empty))
    }
}

#[async_trait]
impl Flow for CreateEvent {
    fn id(&self) -> FlowId {
        FlowId::CreateEvent
    }

    fn step_count(&self) -> usize {
        9
    }

    async fn step(
        &self,
        index: usize,
        ctx: &mut TurnContext<'_>,
        options: &mut FlowOptions,
        input: StepResult,
    ) -> Result<StepOutcome, DialogError> {
        match index {
            0 => {
                let meeting = &ctx.state.meeting;
                if meeting.title.is_none() {
                    Ok(StepOutcome::Prompt(PromptSpec::text(OutgoingMessage::new(
                        Template::NoTitle,
                    ))))
                } else if meeting.recreate == Some(RecreateTarget::Content) && meeting.content.is_none() {
                    Ok(StepOutcome::Prompt(PromptSpec::text(OutgoingMessage::new(
                        Template::NoContent,
                    ))))
                } else {
                    Ok(StepOutcome::Next(StepResult::Empty))
                }
            }
            1 => {
                if let StepResult::Text(answer) = input {
                    let meeting = &mut ctx.state.meeting;
                    let answer = answer.trim().to_string();
                    if meeting.title.is_none() {
                        meeting.title = Some(answer);
                    } else {
                        meeting.content = Some(answer);
                    }
                }
                let needs_contacts = match ctx.state.meeting.recreate {
                    Some(RecreateTarget::Participants) => true,
                    None => ctx.state.contacts.confirmed.is_empty(),
                    Some(_) => false,
                };
                if needs_contacts {
                    Ok(StepOutcome::Begin {
                        flow: FlowId::FindContact,
                        options: FlowOptions {
                            contacts: Some(ContactCursor {
                                prompt_more: true,
                                ..ContactCursor::default()
                            }),
                            ..FlowOptions::sub_flow()
                        },
                    })
                } else {
                    Ok(StepOutcome::Next(StepResult::Empty))
                }
            }
            2 => Ok(StepOutcome::begin_sub(FlowId::UpdateStartDate)),
            3 => Ok(StepOutcome::begin_sub(FlowId::UpdateStartTime)),
            4 => Ok(StepOutcome::begin_sub(FlowId::UpdateDuration)),
            5 => {
                if Self::wants_room(ctx.state) {
                    Ok(StepOutcome::begin_sub(FlowId::FindMeetingRoom))
                } else if Self::wants_location(ctx.state) {
                    Ok(StepOutcome::Prompt(PromptSpec::text(OutgoingMessage::new(
                        Template::NoLocation,
                    ))))
                } else {
                    Ok(StepOutcome::Next(StepResult::Empty))
                }
            }
            6 => {
                if let StepResult::Text(answer) = input {
                    if !is_skip(&answer) {
                        ctx.state.meeting.location = Some(answer.trim().to_string());
                    }
                }
                let now = ctx.now;
                let meeting = &mut ctx.state.meeting;
                let start = meeting
                    .resolve_start(now)
                    .ok_or_else(|| DialogError::missing("start"))?;
                let end = meeting
                    .resolve_end()
                    .ok_or_else(|| DialogError::missing("end"))?;
                let title = meeting.title.clone().unwrap_or_default();
                Ok(StepOutcome::Prompt(PromptSpec::confirm(
                    OutgoingMessage::new(Template::ConfirmCreate)
                        .with("title", title)
                        .with("start", start.format(START_FORMAT).to_string())
                        .with("duration", (end - start).num_minutes()),
                )))
            }
            7 => match input {
                StepResult::Confirmed(true) => Self::create(ctx).await,
                _ => Ok(StepOutcome::Prompt(Self::recreate_prompt())),
            },
            8 => {
                let StepResult::Choice(found) = input else {
                    return Err(DialogError::missing("recreate choice"));
                };
                let target = RecreateTarget::from_label(&found.value)
                    .ok_or_else(|| DialogError::Fatal(format!("unknown recreate target {}", found.value)))?;
                tracing::debug!(conversation = %ctx.conversation, target = target.label(), "Recreating event");
                ctx.state.meeting.recreate = Some(target);
                ctx.state.clear_for_recreate(target);
                Ok(StepOutcome::Replace {
                    flow: FlowId::CreateEvent,
                    options: FlowOptions {
                        sub_flow_mode: options.sub_flow_mode,
                        ..FlowOptions::default()
                    },
                })
            }
            _ => Err(DialogError::Fatal(format!("CreateEvent has no step {index}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::{DateTimeValue, Entity, EntityKind, RecognizedSignals, Resolution};
    use crate::services::Fixtures;
    use crate::state::Attendee;
    use crate::testing::{at, Harness};
    use chrono::{NaiveDate, NaiveTime};
    use pretty_assertions::assert_eq;

    fn when(date: (i32, u32, u32), time: (u32, u32)) -> RecognizedSignals {
        let value = DateTimeValue::at(
            NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            NaiveTime::from_hms_opt(time.0, time.1, 0).unwrap(),
        );
        RecognizedSignals::none().with_entity(
            Entity::new(EntityKind::DateTime, 0, 5).resolved(Resolution::Point { value }),
        )
    }

    #[tokio::test]
    async fn test_create_event_end_to_end() {
        let mut h = Harness::new(Fixtures::default());

        let sent = h.begin(FlowId::CreateEvent, FlowOptions::default()).await;
        assert_eq!(Harness::templates(&sent), vec![Template::NoTitle]);

        let sent = h.reply_text("Roadmap review").await;
        assert_eq!(Harness::templates(&sent), vec![Template::NoAttendees]);

        let sent = h.reply_text("alexw@contoso.com").await;
        assert_eq!(Harness::templates(&sent), vec![Template::AddMoreUserPrompt]);

        let sent = h.reply_text("no").await;
        assert_eq!(Harness::templates(&sent), vec![Template::NoStartDate]);

        let sent = h.reply("friday", &when((2026, 10, 23), (10, 0))).await;
        assert_eq!(Harness::templates(&sent), vec![Template::NoDuration]);

        let sent = h.reply_text("30 minutes").await;
        assert_eq!(Harness::templates(&sent), vec![Template::NoLocation]);

        let sent = h.reply_text("skip").await;
        assert_eq!(Harness::templates(&sent), vec![Template::ConfirmCreate]);
        assert_eq!(sent[0].data.get("duration").and_then(|v| v.as_i64()), Some(30));

        let sent = h.reply_text("yes").await;
        assert_eq!(Harness::templates(&sent), vec![Template::EventCreated]);
        assert!(h.stack.is_empty());

        let events = h.calendar.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Roadmap review");
        assert_eq!(events[0].start, at("2026-10-23T10:00:00"));
        assert_eq!(events[0].end, at("2026-10-23T10:30:00"));
        assert_eq!(events[0].location, None);
        assert_eq!(events[0].attendees, vec![Attendee::new("alexw@contoso.com", "alexw@contoso.com")]);
        assert_eq!(h.state.meeting.title, None);
    }

    #[tokio::test]
    async fn test_declined_summary_recollects_one_slot() {
        let mut h = Harness::new(Fixtures::default());
        let meeting = &mut h.state.meeting;
        meeting.title = Some("Standup".into());
        meeting.location = Some("Cafe".into());
        meeting.start_date_time = Some(at("2026-10-17T09:30:00"));
        meeting.duration_secs = Some(900);
        h.state
            .contacts
            .confirm(Attendee::new("Megan", "meganb@contoso.com"));

        let sent = h.begin(FlowId::CreateEvent, FlowOptions::default()).await;
        assert_eq!(Harness::templates(&sent), vec![Template::ConfirmCreate]);

        let sent = h.reply_text("no").await;
        assert_eq!(Harness::templates(&sent), vec![Template::GetRecreateInfo]);
        assert_eq!(sent[0].choices.len(), RecreateTarget::ALL.len());

        let sent = h.reply_text("the weather").await;
        assert_eq!(Harness::templates(&sent), vec![Template::GetRecreateInfoRetry]);

        let sent = h.reply_text("title").await;
        assert_eq!(Harness::templates(&sent), vec![Template::NoTitle]);

        let sent = h.reply_text("Daily standup").await;
        assert_eq!(Harness::templates(&sent), vec![Template::ConfirmCreate]);
        assert_eq!(
            sent[0].data.get("title").and_then(|v| v.as_str()),
            Some("Daily standup")
        );
        assert_eq!(h.state.meeting.location.as_deref(), Some("Cafe"));
        assert_eq!(h.state.contacts.confirmed.len(), 1);
    }

    #[tokio::test]
    async fn test_calendar_failure_cancels_task() {
        let mut h = Harness::new(Fixtures::default());
        let meeting = &mut h.state.meeting;
        meeting.title = Some("Standup".into());
        meeting.location = Some("Cafe".into());
        meeting.start_date_time = Some(at("2026-10-17T09:30:00"));
        meeting.duration_secs = Some(900);
        h.state
            .contacts
            .confirm(Attendee::new("Megan", "meganb@contoso.com"));
        h.calendar.set_failure(Some(crate::error::ServiceError::Unavailable {
            service: "calendar",
            message: "timeout".into(),
        }));

        h.begin(FlowId::CreateEvent, FlowOptions::default()).await;
        let sent = h.reply_text("yes").await;
        assert_eq!(Harness::templates(&sent), vec![Template::SkillError]);
        assert!(h.stack.is_empty());
        assert_eq!(h.state.meeting.title, None);
    }
}
