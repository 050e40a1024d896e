//! Move an event or change its length
//!
//! The event is found the same way the status changes find theirs. A new
//! date or time replaces only the part the user named; a new length alone
//! keeps the start.

use async_trait::async_trait;

use super::show_events::{focus_event, focused_event};
use crate::dialog::{Flow, FlowId, FlowOptions, PromptSpec, StepOutcome, StepResult, TurnContext};
use crate::error::DialogError;
use crate::messages::{OutgoingMessage, Template};
use crate::services::CalendarEvent;
use crate::state::ConversationState;

const START_FORMAT: &str = "%A, %B %-d at %-I:%M %p";
const END_FORMAT: &str = "%-I:%M %p";

/// Find one event and reschedule it
#[derive(Debug, Default)]
pub struct UpdateEvent;

impl UpdateEvent {
    fn finish(ctx: &mut TurnContext<'_>, options: &FlowOptions) -> StepOutcome {
        if options.sub_flow_mode {
            ctx.state.update.clear();
        } else {
            ctx.state.clear();
        }
        StepOutcome::End(StepResult::Empty)
    }

    fn new_time_prompt() -> StepOutcome {
        StepOutcome::Prompt(
            PromptSpec::date_time(OutgoingMessage::new(Template::NoNewTime))
                .with_retry(OutgoingMessage::new(Template::NoNewTimeRetry)),
        )
    }
}

#[async_trait]
impl Flow for UpdateEvent {
    fn id(&self) -> FlowId {
        FlowId::UpdateEvent
    }

    fn step_count(&self) -> usize {
        4
    }

    fn clear_sub_scope(&self, state: &mut ConversationState) {
        state.showing.focused.clear();
        state.update.clear();
    }

    async fn step(
        &self,
        index: usize,
        ctx: &mut TurnContext<'_>,
        options: &mut FlowOptions,
        input: StepResult,
    ) -> Result<StepOutcome, DialogError> {
        match index {
            0 => focus_event(ctx, options.sub_flow_mode, |_, _| true).await,
            1 => {
                let event = focused_event(ctx.state)?;
                if !event.is_organizer {
                    ctx.send(OutgoingMessage::new(Template::NotEventOrganizer).with("title", event.title));
                    return Ok(Self::finish(ctx, options));
                }
                if ctx.state.update.apply(event.start, event.end, ctx.now).is_some() {
                    return Ok(StepOutcome::Next(StepResult::Empty));
                }
                tracing::debug!(conversation = %ctx.conversation, "New start missing or unusable");
                ctx.state.update.new_start_date.clear();
                ctx.state.update.new_start_time.clear();
                Ok(Self::new_time_prompt())
            }
            2 => {
                let event = focused_event(ctx.state)?;
                if let StepResult::DateTimes(values) = input {
                    for value in values {
                        ctx.state.update.push_new_start(value);
                    }
                }
                let Some((start, end)) = ctx.state.update.apply(event.start, event.end, ctx.now) else {
                    ctx.state.update.new_start_date.clear();
                    ctx.state.update.new_start_time.clear();
                    return Err(DialogError::Validation("new start is in the past".into()));
                };
                Ok(StepOutcome::Prompt(PromptSpec::confirm(
                    OutgoingMessage::new(Template::ConfirmUpdate)
                        .with("title", event.title.as_str())
                        .with("start", start.format(START_FORMAT).to_string())
                        .with("end", end.format(END_FORMAT).to_string()),
                )))
            }
            3 => {
                let event = focused_event(ctx.state)?;
                if input != StepResult::Confirmed(true) {
                    ctx.send(OutgoingMessage::new(Template::ActionCancelled));
                    return Ok(Self::finish(ctx, options));
                }
                let (start, end) = ctx
                    .state
                    .update
                    .apply(event.start, event.end, ctx.now)
                    .ok_or_else(|| DialogError::missing("new start"))?;
                let moved = CalendarEvent { start, end, ..event };
                let updated = ctx.services.calendar.update_event(moved).await?;
                tracing::info!(conversation = %ctx.conversation, event = %updated.id, start = %updated.start, "Event rescheduled");
                ctx.send(
                    OutgoingMessage::new(Template::EventUpdated)
                        .with("title", updated.title.as_str())
                        .with("start", updated.start.format(START_FORMAT).to_string()),
                );
                Ok(Self::finish(ctx, options))
            }
            _ => Err(DialogError::Fatal(format!("UpdateEvent has no step {index}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::{DateTimeValue, Entity, EntityKind, RecognizedSignals, Resolution};
    use crate::services::Fixtures;
    use crate::testing::{at, Harness};
    use chrono::NaiveTime;
    use pretty_assertions::assert_eq;

    fn event(id: &str, title: &str, start: &str, organizer: bool) -> CalendarEvent {
        let start = at(start);
        CalendarEvent {
            id: id.to_string(),
            title: title.to_string(),
            content: None,
            start,
            end: start + chrono::Duration::hours(1),
            location: None,
            attendees: vec![],
            is_organizer: organizer,
            is_accepted: true,
            room: None,
            join_url: None,
        }
    }

    fn harness() -> Harness {
        Harness::new(Fixtures {
            events: vec![
                event("a", "Budget sync", "2026-10-16T13:00:00", true),
                event("b", "Budget planning", "2026-10-20T13:00:00", true),
                event("c", "All hands", "2026-10-21T15:00:00", false),
            ],
            ..Fixtures::default()
        })
    }

    fn time_answer(time: &str) -> RecognizedSignals {
        let value = DateTimeValue::time(time.parse::<NaiveTime>().unwrap());
        RecognizedSignals::none()
            .with_entity(Entity::new(EntityKind::DateTime, 0, 3).resolved(Resolution::Point { value }))
    }

    fn stored(h: &Harness, id: &str) -> CalendarEvent {
        h.calendar.events().into_iter().find(|e| e.id == id).unwrap()
    }

    #[tokio::test]
    async fn test_new_time_from_the_request() {
        let mut h = harness();
        h.state.meeting.title = Some("sync".into());
        h.state.update.new_start_time = vec!["16:00:00".parse().unwrap()];

        let sent = h.begin(FlowId::UpdateEvent, FlowOptions::default()).await;
        assert_eq!(Harness::templates(&sent), vec![Template::ConfirmUpdate]);
        assert_eq!(sent[0].data.get("end").and_then(|v| v.as_str()), Some("5:00 PM"));

        let sent = h.reply_text("yes").await;
        assert_eq!(Harness::templates(&sent), vec![Template::EventUpdated]);
        let moved = stored(&h, "a");
        assert_eq!(moved.start, at("2026-10-16T16:00:00"));
        assert_eq!(moved.end, at("2026-10-16T17:00:00"));
        assert!(h.stack.is_empty());
        assert!(h.state.update.is_empty());
    }

    #[tokio::test]
    async fn test_choose_then_ask_for_time() {
        let mut h = harness();
        h.state.meeting.title = Some("budget".into());
        let sent = h.begin(FlowId::UpdateEvent, FlowOptions::default()).await;
        assert_eq!(Harness::templates(&sent), vec![Template::ChooseEvent]);

        let sent = h.reply_text("Budget planning").await;
        assert_eq!(Harness::templates(&sent), vec![Template::NoNewTime]);

        let sent = h.reply_text("sometime").await;
        assert_eq!(Harness::templates(&sent), vec![Template::NoNewTimeRetry]);

        let sent = h.reply("9am", &time_answer("09:00:00")).await;
        assert_eq!(Harness::templates(&sent), vec![Template::ConfirmUpdate]);

        let sent = h.reply_text("no").await;
        assert_eq!(Harness::templates(&sent), vec![Template::ActionCancelled]);
        assert_eq!(stored(&h, "b").start, at("2026-10-20T13:00:00"));
        assert!(h.stack.is_empty());
    }

    #[tokio::test]
    async fn test_past_new_time_is_asked_again() {
        let mut h = harness();
        h.state.meeting.title = Some("sync".into());
        h.state.update.new_start_time = vec!["08:00:00".parse().unwrap()];

        let sent = h.begin(FlowId::UpdateEvent, FlowOptions::default()).await;
        assert_eq!(Harness::templates(&sent), vec![Template::NoNewTime]);

        let sent = h.reply("7am", &time_answer("07:00:00")).await;
        assert_eq!(Harness::templates(&sent), vec![Template::NoNewTimeRetry]);

        let sent = h.reply("2pm", &time_answer("14:00:00")).await;
        assert_eq!(Harness::templates(&sent), vec![Template::ConfirmUpdate]);
        h.reply_text("yes").await;
        assert_eq!(stored(&h, "a").start, at("2026-10-16T14:00:00"));
    }

    #[tokio::test]
    async fn test_length_only_keeps_start() {
        let mut h = harness();
        h.state.meeting.title = Some("sync".into());
        h.state.update.duration_secs = Some(1800);

        h.begin(FlowId::UpdateEvent, FlowOptions::default()).await;
        h.reply_text("yes").await;
        let updated = stored(&h, "a");
        assert_eq!(updated.start, at("2026-10-16T13:00:00"));
        assert_eq!(updated.end, at("2026-10-16T13:30:00"));
    }

    #[tokio::test]
    async fn test_invitee_cannot_reschedule() {
        let mut h = harness();
        h.state.meeting.title = Some("all hands".into());
        h.state.update.new_start_time = vec!["16:00:00".parse().unwrap()];

        let sent = h.begin(FlowId::UpdateEvent, FlowOptions::default()).await;
        assert_eq!(Harness::templates(&sent), vec![Template::NotEventOrganizer]);
        assert_eq!(stored(&h, "c").start, at("2026-10-21T15:00:00"));
        assert!(h.stack.is_empty());
    }
}
