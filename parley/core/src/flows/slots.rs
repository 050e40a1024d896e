//! Date, time and duration slot flows
//!
//! Each one ends immediately when its slot can already be resolved from the
//! candidate lists, so a task can begin all three unconditionally.

use async_trait::async_trait;

use crate::dialog::{Flow, FlowId, FlowOptions, PromptSpec, StepOutcome, StepResult, TurnContext};
use crate::error::DialogError;
use crate::messages::{OutgoingMessage, Template};
use crate::state::ConversationState;

fn unexpected(flow: &str, index: usize, input: &StepResult) -> DialogError {
    DialogError::Fatal(format!("{flow} step {index} got {input:?}"))
}

/// Make sure a start date is known
#[derive(Debug, Default)]
pub struct UpdateStartDate;

#[async_trait]
impl Flow for UpdateStartDate {
    fn id(&self) -> FlowId {
        FlowId::UpdateStartDate
    }

    fn step_count(&self) -> usize {
        2
    }

    fn is_slot_collection(&self) -> bool {
        true
    }

    fn clear_sub_scope(&self, state: &mut ConversationState) {
        state.meeting.clear_times();
    }

    async fn step(
        &self,
        index: usize,
        ctx: &mut TurnContext<'_>,
        _options: &mut FlowOptions,
        input: StepResult,
    ) -> Result<StepOutcome, DialogError> {
        let today = ctx.now.date();
        match (index, input) {
            (0, _) => {
                if ctx.state.meeting.pick_start_date(today).is_some() {
                    return Ok(StepOutcome::End(StepResult::Empty));
                }
                Ok(StepOutcome::Prompt(
                    PromptSpec::date_time(OutgoingMessage::new(Template::NoStartDate))
                        .with_retry(OutgoingMessage::new(Template::NoStartDateRetry)),
                ))
            }
            (1, StepResult::DateTimes(values)) => {
                for value in values {
                    ctx.state.meeting.push_start(value);
                }
                match ctx.state.meeting.pick_start_date(today) {
                    Some(date) => {
                        tracing::debug!(date = %date, "Start date collected");
                        Ok(StepOutcome::End(StepResult::Empty))
                    }
                    None => Err(DialogError::Validation("start date is in the past".into())),
                }
            }
            (index, input) => Err(unexpected("UpdateStartDate", index, &input)),
        }
    }
}

/// Make sure a start time is known and resolve the start
#[derive(Debug, Default)]
pub struct UpdateStartTime;

#[async_trait]
impl Flow for UpdateStartTime {
    fn id(&self) -> FlowId {
        FlowId::UpdateStartTime
    }

    fn step_count(&self) -> usize {
        2
    }

    fn is_slot_collection(&self) -> bool {
        true
    }

    fn clear_sub_scope(&self, state: &mut ConversationState) {
        state.meeting.clear_times();
    }

    async fn step(
        &self,
        index: usize,
        ctx: &mut TurnContext<'_>,
        _options: &mut FlowOptions,
        input: StepResult,
    ) -> Result<StepOutcome, DialogError> {
        match (index, input) {
            (0, _) => {
                if ctx.state.meeting.resolve_start(ctx.now).is_some() {
                    return Ok(StepOutcome::End(StepResult::Empty));
                }
                Ok(StepOutcome::Prompt(
                    PromptSpec::date_time(OutgoingMessage::new(Template::NoStartTime))
                        .with_retry(OutgoingMessage::new(Template::NoStartTimeRetry)),
                ))
            }
            (1, StepResult::DateTimes(values)) => {
                for value in values {
                    ctx.state.meeting.push_start(value);
                }
                match ctx.state.meeting.resolve_start(ctx.now) {
                    Some(start) => {
                        tracing::debug!(start = %start, "Start resolved");
                        Ok(StepOutcome::End(StepResult::Empty))
                    }
                    None => Err(DialogError::Validation("start time is in the past".into())),
                }
            }
            (index, input) => Err(unexpected("UpdateStartTime", index, &input)),
        }
    }
}

/// Make sure the length is known and resolve the end
#[derive(Debug, Default)]
pub struct UpdateDuration;

#[async_trait]
impl Flow for UpdateDuration {
    fn id(&self) -> FlowId {
        FlowId::UpdateDuration
    }

    fn step_count(&self) -> usize {
        2
    }

    fn is_slot_collection(&self) -> bool {
        true
    }

    fn clear_sub_scope(&self, state: &mut ConversationState) {
        state.meeting.clear_end_times_and_duration();
    }

    async fn step(
        &self,
        index: usize,
        ctx: &mut TurnContext<'_>,
        _options: &mut FlowOptions,
        input: StepResult,
    ) -> Result<StepOutcome, DialogError> {
        match (index, input) {
            (0, _) => {
                let meeting = &mut ctx.state.meeting;
                if meeting.duration_secs.is_some() || meeting.resolve_end().is_some() {
                    meeting.resolve_end();
                    return Ok(StepOutcome::End(StepResult::Empty));
                }
                Ok(StepOutcome::Prompt(
                    PromptSpec::duration(OutgoingMessage::new(Template::NoDuration))
                        .with_retry(OutgoingMessage::new(Template::NoDurationRetry)),
                ))
            }
            (1, StepResult::Duration(secs)) => {
                if secs <= 0 {
                    return Err(DialogError::Validation(format!("duration {secs}s")));
                }
                let meeting = &mut ctx.state.meeting;
                meeting.duration_secs = Some(secs);
                meeting.end_date_time = None;
                if meeting.start_date_time.is_some() && meeting.resolve_end().is_none() {
                    meeting.duration_secs = None;
                    return Err(DialogError::Validation(format!("duration {secs}s ends out of range")));
                }
                tracing::debug!(seconds = secs, "Duration collected");
                Ok(StepOutcome::End(StepResult::Empty))
            }
            (index, input) => Err(unexpected("UpdateDuration", index, &input)),
        }
    }
}
