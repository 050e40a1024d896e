//! Interruption Router
//!
//! Runs once per turn before the active frame is resumed. Global intents
//! (cancel, help, logout) and confident topic switches rewrite the stack
//! instead of being fed to the pending prompt.
//!
//! Detection is pure so it can be tested without collaborators; applying an
//! interruption is async because logout revokes credentials and a topic
//! switch begins a new flow.

use crate::config::EngineConfig;
use crate::dialog::{
    DialogEngine, DialogStack, FlowId, FlowOptions, FlowRegistry, StepResult, TurnContext, TurnStatus,
};
use crate::digest::digest_on_entry;
use crate::flows::{route, Route};
use crate::messages::{OutgoingMessage, Template};
use crate::recognizer::{GeneralIntent, RecognizedSignals};

/// What the router decided for this turn
#[derive(Clone, Debug, PartialEq)]
pub enum Interruption {
    /// Carry on with the active frame
    None,
    /// Abandon the task
    Cancel,
    /// Show help and re-ask
    Help,
    /// Sign out and abandon the task
    Logout,
    /// Drop the task and start another one
    TopicSwitch {
        /// Flow to begin
        flow: FlowId,
        /// Its options
        options: FlowOptions,
    },
}

/// Decide whether this turn interrupts the conversation
#[must_use]
pub fn detect(
    text: &str,
    signals: &RecognizedSignals,
    stack: &DialogStack,
    registry: &FlowRegistry,
    config: &EngineConfig,
) -> Interruption {
    if text.trim().is_empty() {
        return Interruption::None;
    }

    if signals.general_score() > config.general_intent_threshold {
        match signals.general_intent() {
            GeneralIntent::Cancel => return Interruption::Cancel,
            GeneralIntent::Help => return Interruption::Help,
            GeneralIntent::Logout => return Interruption::Logout,
            GeneralIntent::ShowNext | GeneralIntent::ShowPrevious | GeneralIntent::None => {}
        }
    }

    let (Some(top), Some(root)) = (stack.top(), stack.root()) else {
        return Interruption::None;
    };
    let in_slot = registry
        .get(&top.flow_id)
        .is_some_and(|flow| flow.is_slot_collection());
    if in_slot || signals.task_score() <= config.topic_switch_threshold {
        return Interruption::None;
    }
    match route(signals.task_intent()) {
        Route::Flow(flow, options) if flow != root.flow_id => Interruption::TopicSwitch { flow, options },
        _ => Interruption::None,
    }
}

impl Interruption {
    /// Apply the interruption
    ///
    /// Returns `None` when the turn should go on to resume the active frame.
    pub async fn apply(
        self,
        engine: &DialogEngine,
        ctx: &mut TurnContext<'_>,
        stack: &mut DialogStack,
    ) -> Option<TurnStatus> {
        match self {
            Self::None => None,
            Self::Cancel => {
                tracing::info!(conversation = %ctx.conversation, depth = stack.depth(), "Cancelled by user");
                ctx.send(OutgoingMessage::new(Template::CancelMessage));
                ctx.state.clear();
                stack.clear();
                Some(TurnStatus::Cancelled)
            }
            Self::Help => {
                ctx.send(OutgoingMessage::new(Template::Help));
                if engine.reprompt(ctx, stack) {
                    Some(TurnStatus::Waiting)
                } else {
                    Some(TurnStatus::Complete(StepResult::Empty))
                }
            }
            Self::Logout => {
                if let Err(err) = ctx.services.credentials.revoke(ctx.conversation).await {
                    tracing::warn!(conversation = %ctx.conversation, error = %err, "Credential revoke failed");
                    ctx.send(OutgoingMessage::new(Template::SkillError));
                }
                tracing::info!(conversation = %ctx.conversation, "Logged out");
                ctx.send(OutgoingMessage::new(Template::LogOut));
                ctx.state.clear();
                stack.clear();
                Some(TurnStatus::Cancelled)
            }
            Self::TopicSwitch { flow, options } => {
                tracing::info!(
                    conversation = %ctx.conversation,
                    from = ?stack.root().map(|f| &f.flow_id),
                    to = %flow,
                    "Switching topic"
                );
                ctx.state.clear();
                stack.clear();
                let signals = ctx.signals;
                let text = ctx.text;
                digest_on_entry(ctx.state, signals.task_intent(), signals.entities(), text);
                Some(engine.begin(ctx, stack, flow, options).await)
            }
        }
    }
}
