//! How long until an upcoming event starts

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};

use crate::dialog::{Flow, FlowId, FlowOptions, StepOutcome, StepResult, TurnContext};
use crate::error::DialogError;
use crate::messages::{OutgoingMessage, Template};
use crate::services::CalendarEvent;
use crate::state::MeetingSlots;

const LOOKAHEAD_DAYS: i64 = 7;

/// Tell the user how long until an event starts
#[derive(Debug, Default)]
pub struct TimeRemaining;

fn unit(count: i64, name: &str) -> Option<String> {
    match count {
        0 => None,
        1 => Some(format!("1 {name}")),
        n => Some(format!("{n} {name}s")),
    }
}

/// "1 day 2 hours 5 minutes"
pub(crate) fn describe_remaining(remaining: Duration) -> String {
    let parts: Vec<String> = [
        unit(remaining.num_days(), "day"),
        unit(remaining.num_hours() % 24, "hour"),
        unit(remaining.num_minutes() % 60, "minute"),
    ]
    .into_iter()
    .flatten()
    .collect();
    if parts.is_empty() {
        "less than a minute".to_string()
    } else {
        parts.join(" ")
    }
}

/// Upcoming event the request points at
fn pick<'a>(events: &'a [CalendarEvent], meeting: &MeetingSlots) -> Option<&'a CalendarEvent> {
    let next = meeting
        .order_reference
        .as_deref()
        .is_some_and(|r| r.eq_ignore_ascii_case("next"));
    if next {
        return events.first();
    }
    if let Some(date) = meeting.start_date.last() {
        return events.iter().find(|e| e.start.date() == *date);
    }
    if let Some(time) = meeting.start_time.last() {
        return events.iter().find(|e| e.start.time() == *time);
    }
    if let Some(title) = &meeting.title {
        let needle = title.to_lowercase();
        return events.iter().find(|e| e.title.to_lowercase().contains(&needle));
    }
    events.first()
}

#[async_trait]
impl Flow for TimeRemaining {
    fn id(&self) -> FlowId {
        FlowId::TimeRemaining
    }

    fn step_count(&self) -> usize {
        1
    }

    async fn step(
        &self,
        index: usize,
        ctx: &mut TurnContext<'_>,
        _options: &mut FlowOptions,
        _input: StepResult,
    ) -> Result<StepOutcome, DialogError> {
        if index != 0 {
            return Err(DialogError::Fatal(format!("TimeRemaining has no step {index}")));
        }
        let now: NaiveDateTime = ctx.now;
        let until = now
            .checked_add_signed(Duration::days(LOOKAHEAD_DAYS))
            .unwrap_or(NaiveDateTime::MAX);
        let events: Vec<CalendarEvent> = ctx
            .services
            .calendar
            .events_by_time(now, until)
            .await?
            .into_iter()
            .filter(|e| e.start >= now)
            .collect();
        match pick(&events, &ctx.state.meeting) {
            Some(event) => {
                let remaining = describe_remaining(event.start - now);
                tracing::debug!(conversation = %ctx.conversation, event = %event.id, %remaining, "Time remaining");
                ctx.send(
                    OutgoingMessage::new(Template::TimeRemaining)
                        .with("title", event.title.as_str())
                        .with("remaining", remaining),
                );
            }
            None => ctx.send(OutgoingMessage::new(Template::ShowNoMeetingMessage)),
        }
        ctx.state.clear();
        Ok(StepOutcome::End(StepResult::Empty))
    }
}
