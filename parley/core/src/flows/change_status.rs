//! Accept, decline or delete an event

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::show_events::{focus_event, focused_event};
use crate::dialog::{Flow, FlowId, FlowOptions, PromptSpec, StepOutcome, StepResult, TurnContext};
use crate::error::DialogError;
use crate::messages::{OutgoingMessage, Template};
use crate::state::ConversationState;

/// Requested change to an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NewEventStatus {
    /// Accept the invitation
    Accept,
    /// Delete (organizer) or decline (invitee)
    Cancel,
}

/// Find one event and change its status
#[derive(Debug, Default)]
pub struct ChangeEventStatus;

#[async_trait]
impl Flow for ChangeEventStatus {
    fn id(&self) -> FlowId {
        FlowId::ChangeEventStatus
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
        let status = options
            .status
            .ok_or_else(|| DialogError::missing("event status"))?;
        match index {
            0 => focus_event(ctx, options.sub_flow_mode, |_, _| true).await,
            1 => {
                let event = focused_event(ctx.state)?;
                let template = match status {
                    NewEventStatus::Accept => Template::ConfirmAccept,
                    NewEventStatus::Cancel if event.is_organizer => Template::ConfirmDelete,
                    NewEventStatus::Cancel => Template::ConfirmDecline,
                };
                Ok(StepOutcome::Prompt(PromptSpec::confirm(
                    OutgoingMessage::new(template).with("title", event.title.as_str()),
                )))
            }
            2 => {
                let event = focused_event(ctx.state)?;
                if input == StepResult::Confirmed(true) {
                    let calendar = &ctx.services.calendar;
                    let template = match status {
                        NewEventStatus::Accept => {
                            calendar.accept_event(&event.id).await?;
                            Template::EventAccepted
                        }
                        NewEventStatus::Cancel if event.is_organizer => {
                            calendar.delete_event(&event.id).await?;
                            Template::EventDeleted
                        }
                        NewEventStatus::Cancel => {
                            calendar.decline_event(&event.id).await?;
                            Template::EventDeclined
                        }
                    };
                    tracing::info!(conversation = %ctx.conversation, event = %event.id, ?status, "Event status changed");
                    ctx.send(OutgoingMessage::new(template).with("title", event.title.as_str()));
                } else {
                    ctx.send(OutgoingMessage::new(Template::ActionCancelled));
                }
                if !options.sub_flow_mode {
                    ctx.state.clear();
                }
                Ok(StepOutcome::End(StepResult::Empty))
            }
            _ => Err(DialogError::Fatal(format!("ChangeEventStatus has no step {index}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{CalendarEvent, Fixtures};
    use crate::testing::{at, Harness};
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
            is_accepted: false,
            room: None,
            join_url: None,
        }
    }

    fn harness() -> Harness {
        Harness::new(Fixtures {
            events: vec![
                event("a", "Budget sync", "2026-10-16T13:00:00", false),
                event("b", "Budget planning", "2026-10-20T13:00:00", true),
                event("c", "Hiring loop", "2026-10-21T15:00:00", true),
            ],
            ..Fixtures::default()
        })
    }

    fn options(status: NewEventStatus) -> FlowOptions {
        FlowOptions {
            status: Some(status),
            ..FlowOptions::default()
        }
    }

    #[tokio::test]
    async fn test_accept_single_match() {
        let mut h = harness();
        h.state.meeting.title = Some("sync".into());
        let sent = h.begin(FlowId::ChangeEventStatus, options(NewEventStatus::Accept)).await;
        assert_eq!(Harness::templates(&sent), vec![Template::ConfirmAccept]);

        let sent = h.reply_text("yes").await;
        assert_eq!(Harness::templates(&sent), vec![Template::EventAccepted]);
        assert!(h.calendar.events().iter().any(|e| e.id == "a" && e.is_accepted));
        assert_eq!(h.state.meeting.title, None);
    }

    #[tokio::test]
    async fn test_delete_after_choosing() {
        let mut h = harness();
        h.state.meeting.title = Some("budget".into());
        let sent = h.begin(FlowId::ChangeEventStatus, options(NewEventStatus::Cancel)).await;
        assert_eq!(Harness::templates(&sent), vec![Template::ChooseEvent]);
        assert_eq!(sent[0].choices.len(), 2);

        let sent = h.reply_text("Budget planning").await;
        assert_eq!(Harness::templates(&sent), vec![Template::ConfirmDelete]);

        let sent = h.reply_text("no").await;
        assert_eq!(Harness::templates(&sent), vec![Template::ActionCancelled]);
        assert_eq!(h.calendar.events().len(), 3);
        assert!(h.stack.is_empty());
    }

    #[tokio::test]
    async fn test_no_match() {
        let mut h = harness();
        h.state.meeting.title = Some("offsite".into());
        let sent = h.begin(FlowId::ChangeEventStatus, options(NewEventStatus::Cancel)).await;
        assert_eq!(Harness::templates(&sent), vec![Template::ShowNoMeetingMessage]);
        assert!(h.stack.is_empty());
    }
}
