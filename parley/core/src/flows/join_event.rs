//! Join an online meeting

use async_trait::async_trait;

use super::show_events::{focus_event, focused_event};
use crate::dialog::{Flow, FlowId, FlowOptions, PromptSpec, StepOutcome, StepResult, TurnContext};
use crate::error::DialogError;
use crate::messages::{OutgoingMessage, Template};
use crate::state::ConversationState;

/// Find an online event that has not ended and hand out its link
#[derive(Debug, Default)]
pub struct JoinEvent;

#[async_trait]
impl Flow for JoinEvent {
    fn id(&self) -> FlowId {
        FlowId::JoinEvent
    }

    fn step_count(&self) -> usize {
        3
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
        match index {
            0 => focus_event(ctx, options.sub_flow_mode, |e, now| e.join_url.is_some() && e.end > now).await,
            1 => {
                let event = focused_event(ctx.state)?;
                Ok(StepOutcome::Prompt(PromptSpec::confirm(
                    OutgoingMessage::new(Template::ConfirmJoin).with("title", event.title),
                )))
            }
            2 => {
                let event = focused_event(ctx.state)?;
                match (input, event.join_url) {
                    (StepResult::Confirmed(true), Some(url)) => {
                        tracing::info!(conversation = %ctx.conversation, event = %event.id, "Joining meeting");
                        ctx.send(
                            OutgoingMessage::new(Template::JoinMeeting)
                                .with("title", event.title)
                                .with("url", url),
                        );
                    }
                    _ => ctx.send(OutgoingMessage::new(Template::ActionCancelled)),
                }
                ctx.state.clear();
                Ok(StepOutcome::End(StepResult::Empty))
            }
            _ => Err(DialogError::Fatal(format!("JoinEvent has no step {index}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{CalendarEvent, Fixtures};
    use crate::testing::{at, Harness};
    use pretty_assertions::assert_eq;

    fn event(id: &str, title: &str, start: &str, url: Option<&str>) -> CalendarEvent {
        let start = at(start);
        CalendarEvent {
            id: id.to_string(),
            title: title.to_string(),
            content: None,
            start,
            end: start + chrono::Duration::hours(1),
            location: None,
            attendees: vec![],
            is_organizer: false,
            is_accepted: true,
            room: None,
            join_url: url.map(ToString::to_string),
        }
    }

    fn harness() -> Harness {
        Harness::new(Fixtures {
            events: vec![
                event("a", "Standup", "2026-10-16T08:30:00", Some("https://meet.contoso.com/standup")),
                event("b", "Lunch", "2026-10-16T12:00:00", None),
                event("c", "Vendor call", "2026-10-16T15:00:00", Some("https://meet.contoso.com/vendor")),
            ],
            ..Fixtures::default()
        })
    }

    #[tokio::test]
    async fn test_join_running_meeting() {
        let mut h = harness();
        h.state.meeting.title = Some("standup".into());
        let sent = h.begin(FlowId::JoinEvent, FlowOptions::default()).await;
        assert_eq!(Harness::templates(&sent), vec![Template::ConfirmJoin]);

        let sent = h.reply_text("yes").await;
        assert_eq!(Harness::templates(&sent), vec![Template::JoinMeeting]);
        assert_eq!(
            sent[0].data.get("url").and_then(|v| v.as_str()),
            Some("https://meet.contoso.com/standup")
        );
        assert!(h.stack.is_empty());
    }

    #[tokio::test]
    async fn test_events_without_link_are_skipped() {
        let mut h = harness();
        h.state.meeting.title = Some("lunch".into());
        let sent = h.begin(FlowId::JoinEvent, FlowOptions::default()).await;
        assert_eq!(Harness::templates(&sent), vec![Template::ShowNoMeetingMessage]);
        assert!(h.stack.is_empty());
    }

    #[tokio::test]
    async fn test_declined_join() {
        let mut h = harness();
        h.state.meeting.title = Some("vendor".into());
        h.begin(FlowId::JoinEvent, FlowOptions::default()).await;
        let sent = h.reply_text("no").await;
        assert_eq!(Harness::templates(&sent), vec![Template::ActionCancelled]);
    }
}
