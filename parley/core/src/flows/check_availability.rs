//! Check whether someone is free
//!
//! The contact is resolved through `FindContact` and the time through the
//! start slot flows. When the contact is busy the next half hour both sides
//! have free later that day is offered, and a free slot can turn straight
//! into a new meeting.

use async_trait::async_trait;
use chrono::{Days, Duration, NaiveDateTime, NaiveTime, Timelike};

use crate::dialog::{Flow, FlowId, FlowOptions, PromptSpec, StepOutcome, StepResult, TurnContext};
use crate::error::DialogError;
use crate::messages::{OutgoingMessage, Template};
use crate::resolver::contacts::split_names;
use crate::state::{Attendee, ConversationState};

const SLOT_MINUTES: u32 = 30;
const TIME_FORMAT: &str = "%-I:%M %p";

/// Resolve one contact and look at their free/busy
#[derive(Debug, Default)]
pub struct CheckAvailability;

/// First half-hour boundary at or after `now`
pub(crate) fn next_half_hour(now: NaiveDateTime) -> NaiveDateTime {
    let hour = now.date().and_time(NaiveTime::MIN) + Duration::hours(i64::from(now.hour()));
    let past = now - hour;
    let half = Duration::minutes(i64::from(SLOT_MINUTES));
    if past.is_zero() {
        hour
    } else if past <= half {
        hour + half
    } else {
        hour + half + half
    }
}

impl CheckAvailability {
    fn finish(ctx: &mut TurnContext<'_>) -> StepOutcome {
        ctx.state.clear();
        StepOutcome::End(StepResult::Empty)
    }

    fn attendee(state: &ConversationState) -> Result<Attendee, DialogError> {
        state
            .contacts
            .confirmed
            .first()
            .cloned()
            .ok_or_else(|| DialogError::missing("contact"))
    }

    fn start(state: &ConversationState) -> Result<NaiveDateTime, DialogError> {
        state
            .meeting
            .start_date_time
            .ok_or_else(|| DialogError::missing("availability start"))
    }

    async fn my_address(ctx: &TurnContext<'_>) -> Result<String, DialogError> {
        let me = ctx.services.directory.me().await?;
        me.addresses
            .into_iter()
            .next()
            .ok_or_else(|| DialogError::missing("signed-in address"))
    }

    /// Later half hours on the same day where both addresses are free
    async fn next_shared_slot(
        ctx: &TurnContext<'_>,
        addresses: &[String],
        after: NaiveDateTime,
    ) -> Result<Option<NaiveDateTime>, DialogError> {
        let step = Duration::minutes(i64::from(SLOT_MINUTES));
        let Some(day_end) = after.date().and_time(NaiveTime::MIN).checked_add_days(Days::new(1)) else {
            return Ok(None);
        };
        let mut slot = after + step;
        while slot + step <= day_end {
            let free = ctx.services.free_busy(addresses, slot, SLOT_MINUTES).await?;
            if free.iter().all(|f| *f) {
                return Ok(Some(slot));
            }
            slot += step;
        }
        Ok(None)
    }
}

#[async_trait]
impl Flow for CheckAvailability {
    fn id(&self) -> FlowId {
        FlowId::CheckAvailability
    }

    fn step_count(&self) -> usize {
        7
    }

    fn clear_sub_scope(&self, state: &mut ConversationState) {
        state.contacts.clear();
        state.meeting.clear_times();
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
                let contacts = &ctx.state.contacts;
                if contacts.name_list.is_empty() && contacts.confirmed.is_empty() {
                    Ok(StepOutcome::Prompt(PromptSpec::text(OutgoingMessage::new(
                        Template::NoAvailabilityContact,
                    ))))
                } else {
                    Ok(StepOutcome::Next(StepResult::Empty))
                }
            }
            1 => {
                if let StepResult::Text(answer) = input {
                    for name in split_names(&answer) {
                        ctx.state.contacts.add_name(&name);
                    }
                }
                let contacts = &ctx.state.contacts;
                if !contacts.confirmed.is_empty() {
                    return Ok(StepOutcome::Next(StepResult::Empty));
                }
                if contacts.name_list.is_empty() {
                    return Err(DialogError::Validation("no contact named".into()));
                }
                Ok(StepOutcome::Begin {
                    flow: FlowId::FindContact,
                    options: FlowOptions::sub_flow(),
                })
            }
            2 => {
                if ctx.state.contacts.confirmed.is_empty() {
                    return Ok(Self::finish(ctx));
                }
                let now = ctx.now;
                let meeting = &mut ctx.state.meeting;
                if meeting.start_date_time.is_none() {
                    if meeting.start_date.is_empty() && meeting.start_time.is_empty() {
                        meeting.start_date_time = Some(next_half_hour(now));
                    } else if meeting.start_date.is_empty() {
                        meeting.start_date.push(now.date());
                    }
                }
                Ok(StepOutcome::begin_sub(FlowId::UpdateStartTime))
            }
            3 => {
                let attendee = Self::attendee(ctx.state)?;
                let start = Self::start(ctx.state)?;
                let mine = Self::my_address(ctx).await?;
                let free = ctx
                    .services
                    .free_busy(&[attendee.address.clone(), mine], start, SLOT_MINUTES)
                    .await?;
                let [theirs, ours] = free[..] else {
                    return Err(DialogError::Fatal(format!("free/busy gave {} answers for 2", free.len())));
                };
                tracing::debug!(
                    conversation = %ctx.conversation,
                    attendee = %attendee.address,
                    %start,
                    theirs,
                    ours,
                    "Availability checked"
                );
                let name = attendee.display_name;
                let at = start.format(TIME_FORMAT).to_string();
                if !theirs {
                    ctx.send(
                        OutgoingMessage::new(Template::AttendeeIsBusy)
                            .with("name", name.as_str())
                            .with("start", at),
                    );
                    return Ok(StepOutcome::Prompt(PromptSpec::confirm(
                        OutgoingMessage::new(Template::AskForNextAvailableTime).with("name", name),
                    )));
                }
                if !ours {
                    ctx.send(
                        OutgoingMessage::new(Template::AttendeeIsAvailableOrganizerIsBusy)
                            .with("name", name)
                            .with("start", at),
                    );
                    return Ok(Self::finish(ctx));
                }
                ctx.send(
                    OutgoingMessage::new(Template::AttendeeIsAvailable)
                        .with("name", name)
                        .with("start", at),
                );
                Ok(StepOutcome::Next(StepResult::Empty))
            }
            4 => match input {
                StepResult::Confirmed(true) => {
                    let attendee = Self::attendee(ctx.state)?;
                    let start = Self::start(ctx.state)?;
                    let addresses = [attendee.address.clone(), Self::my_address(ctx).await?];
                    match Self::next_shared_slot(ctx, &addresses, start).await? {
                        Some(slot) => {
                            let meeting = &mut ctx.state.meeting;
                            meeting.start_date_time = Some(slot);
                            meeting.end_date_time = None;
                            ctx.send(
                                OutgoingMessage::new(Template::NextBothAvailableTime)
                                    .with("name", attendee.display_name)
                                    .with("start", slot.format(TIME_FORMAT).to_string()),
                            );
                            Ok(StepOutcome::Next(StepResult::Empty))
                        }
                        None => {
                            ctx.send(
                                OutgoingMessage::new(Template::NoNextBothAvailableTime)
                                    .with("name", attendee.display_name),
                            );
                            Ok(Self::finish(ctx))
                        }
                    }
                }
                StepResult::Confirmed(false) => Ok(Self::finish(ctx)),
                _ => Ok(StepOutcome::Next(StepResult::Empty)),
            },
            5 => {
                let attendee = Self::attendee(ctx.state)?;
                let start = Self::start(ctx.state)?;
                Ok(StepOutcome::Prompt(PromptSpec::confirm(
                    OutgoingMessage::new(Template::AskForCreateNewMeeting)
                        .with("name", attendee.display_name)
                        .with("start", start.format(TIME_FORMAT).to_string()),
                )))
            }
            6 => {
                if input != StepResult::Confirmed(true) {
                    return Ok(Self::finish(ctx));
                }
                tracing::info!(conversation = %ctx.conversation, "Availability check becomes a new meeting");
                Ok(StepOutcome::Replace {
                    flow: FlowId::CreateEvent,
                    options: FlowOptions::default(),
                })
            }
            _ => Err(DialogError::Fatal(format!("CheckAvailability has no step {index}"))),
        }
    }
}
