use std::sync::Arc;

use super::{
    DialogFrame, DialogStack, FlowId, FlowOptions, FlowRegistry, PendingPrompt, StepOutcome,
    StepResult, TurnContext,
};
use crate::config::EngineConfig;
use crate::error::{DialogError, ErrorClass};
use crate::messages::{OutgoingMessage, Template};

use super::prompt;

/// Where a turn left the stack
#[derive(Clone, Debug, PartialEq)]
pub enum TurnStatus {
    /// A prompt is pending
    Waiting,
    /// The root flow ended with this result; the stack is empty
    Complete(StepResult),
    /// The stack was cancelled
    Cancelled,
}

/// Runs flows on a [`DialogStack`]
///
/// Every step boundary is wrapped: errors never escape, they are turned into
/// a re-prompt, a message plus a partial unwind, or a message plus a full
/// cancel.
#[derive(Clone, Debug)]
pub struct DialogEngine {
    registry: Arc<FlowRegistry>,
    max_prompt_attempts: u32,
    max_steps_per_turn: usize,
}

impl DialogEngine {
    /// Engine over a registry
    #[must_use]
    pub fn new(registry: Arc<FlowRegistry>, config: &EngineConfig) -> Self {
        Self {
            registry,
            max_prompt_attempts: config.max_prompt_attempts,
            max_steps_per_turn: config.max_steps_per_turn,
        }
    }

    /// Flow table
    #[must_use]
    pub fn registry(&self) -> &FlowRegistry {
        &self.registry
    }

    /// Push `flow` and run until it suspends or the stack empties
    pub async fn begin(
        &self,
        ctx: &mut TurnContext<'_>,
        stack: &mut DialogStack,
        flow: FlowId,
        options: FlowOptions,
    ) -> TurnStatus {
        if !self.registry.contains(&flow) {
            return self.fatal(
                ctx,
                stack,
                &DialogError::Fatal(format!("flow {flow} is not registered")),
            );
        }
        tracing::info!(conversation = %ctx.conversation, flow = %flow, "Began flow");
        stack.push(DialogFrame::new(flow, options));
        self.drive(ctx, stack, StepResult::Empty).await
    }

    /// Feed this turn's answer to the pending prompt and continue
    pub async fn resume(&self, ctx: &mut TurnContext<'_>, stack: &mut DialogStack) -> TurnStatus {
        let Some(frame) = stack.top_mut() else {
            return TurnStatus::Complete(StepResult::Empty);
        };
        let Some(pending) = frame.pending.take() else {
            // A frame without a pending prompt never survives a turn.
            let err = DialogError::Fatal(format!(
                "frame {} step {} has no pending prompt",
                frame.flow_id, frame.step_index
            ));
            return self.fatal(ctx, stack, &err);
        };

        match prompt::recognize(&pending.spec.kind, ctx.text, ctx.signals) {
            Some(answer) => {
                tracing::debug!(
                    conversation = %ctx.conversation,
                    flow = %frame.flow_id,
                    step = pending.step,
                    "Prompt answered"
                );
                frame.step_index = pending.step + 1;
                frame.last_prompt = Some(pending);
                self.drive(ctx, stack, answer).await
            }
            None => self.retry(ctx, stack, pending),
        }
    }

    /// Re-send the pending prompt unchanged; false when nothing is pending
    pub fn reprompt(&self, ctx: &mut TurnContext<'_>, stack: &DialogStack) -> bool {
        match stack.top().and_then(|f| f.pending.as_ref()) {
            Some(pending) => {
                ctx.send(pending.spec.prompt.resend());
                true
            }
            None => false,
        }
    }

    /// Count a failed answer; re-ask or give up
    fn retry(
        &self,
        ctx: &mut TurnContext<'_>,
        stack: &mut DialogStack,
        mut pending: PendingPrompt,
    ) -> TurnStatus {
        pending.attempts += 1;
        let limit = pending.spec.max_attempts.unwrap_or(self.max_prompt_attempts);
        let Some(frame) = stack.top_mut() else {
            return TurnStatus::Complete(StepResult::Empty);
        };
        if pending.attempts >= limit {
            tracing::warn!(
                conversation = %ctx.conversation,
                flow = %frame.flow_id,
                attempts = pending.attempts,
                "Prompt retry limit reached"
            );
            let err = DialogError::RetryExhausted {
                flow: frame.flow_id.clone(),
            };
            return self.fatal(ctx, stack, &err);
        }
        tracing::debug!(
            conversation = %ctx.conversation,
            flow = %frame.flow_id,
            attempts = pending.attempts,
            "Re-asking prompt"
        );
        ctx.send(pending.spec.retry_message());
        frame.step_index = pending.step;
        frame.pending = Some(pending);
        TurnStatus::Waiting
    }

    /// Run steps until a prompt, an empty stack, or the step budget
    async fn drive(
        &self,
        ctx: &mut TurnContext<'_>,
        stack: &mut DialogStack,
        mut input: StepResult,
    ) -> TurnStatus {
        let mut steps = 0usize;
        loop {
            let Some(frame) = stack.top_mut() else {
                return TurnStatus::Complete(input);
            };
            let Some(flow) = self.registry.get(&frame.flow_id) else {
                let err = DialogError::Fatal(format!("flow {} is not registered", frame.flow_id));
                return self.fatal(ctx, stack, &err);
            };

            if frame.step_index >= flow.step_count() {
                tracing::debug!(flow = %frame.flow_id, "Flow ran past its last step");
                stack.pop();
                if let Some(parent) = stack.top_mut() {
                    parent.step_index += 1;
                }
                continue;
            }

            steps += 1;
            if steps > self.max_steps_per_turn {
                let err = DialogError::Fatal(format!(
                    "turn exceeded {} steps in {}",
                    self.max_steps_per_turn, frame.flow_id
                ));
                return self.fatal(ctx, stack, &err);
            }

            let index = frame.step_index;
            tracing::debug!(flow = %frame.flow_id, step = index, "Running step");
            let result = flow.step(index, ctx, &mut frame.options, input).await;
            let last_prompt = frame.last_prompt.take();

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(err) => match self.handle_error(ctx, stack, err, last_prompt) {
                    Some(status) => return status,
                    None => {
                        input = StepResult::Empty;
                        continue;
                    }
                },
            };

            match outcome {
                StepOutcome::Next(result) => {
                    if let Some(frame) = stack.top_mut() {
                        frame.step_index += 1;
                    }
                    input = result;
                }
                StepOutcome::Prompt(spec) => {
                    ctx.send(spec.prompt.resend());
                    if let Some(frame) = stack.top_mut() {
                        frame.pending = Some(PendingPrompt {
                            spec,
                            step: index,
                            attempts: 0,
                        });
                    }
                    return TurnStatus::Waiting;
                }
                StepOutcome::Begin { flow, options } => {
                    if !self.registry.contains(&flow) {
                        let err = DialogError::Fatal(format!("flow {flow} is not registered"));
                        return self.fatal(ctx, stack, &err);
                    }
                    tracing::debug!(conversation = %ctx.conversation, flow = %flow, "Began sub-flow");
                    stack.push(DialogFrame::new(flow, options));
                    input = StepResult::Empty;
                }
                StepOutcome::Replace { flow, options } => {
                    if !self.registry.contains(&flow) {
                        let err = DialogError::Fatal(format!("flow {flow} is not registered"));
                        return self.fatal(ctx, stack, &err);
                    }
                    stack.pop();
                    stack.push(DialogFrame::new(flow, options));
                    input = StepResult::Empty;
                }
                StepOutcome::End(result) => {
                    stack.pop();
                    match stack.top_mut() {
                        Some(parent) => parent.step_index += 1,
                        None => return TurnStatus::Complete(result),
                    }
                    input = result;
                }
                StepOutcome::CancelAll => {
                    stack.clear();
                    return TurnStatus::Cancelled;
                }
            }
        }
    }

    /// Apply the error policy; `None` means keep driving with an empty input
    fn handle_error(
        &self,
        ctx: &mut TurnContext<'_>,
        stack: &mut DialogStack,
        err: DialogError,
        last_prompt: Option<PendingPrompt>,
    ) -> Option<TurnStatus> {
        match err.classify() {
            ErrorClass::Recoverable => match last_prompt {
                Some(pending) => {
                    tracing::warn!(conversation = %ctx.conversation, error = %err, "Answer rejected");
                    Some(self.retry(ctx, stack, pending))
                }
                None => Some(self.fatal(
                    ctx,
                    stack,
                    &DialogError::Fatal(format!("validation outside a prompt answer: {err}")),
                )),
            },
            ErrorClass::Domain => {
                let kind = match &err {
                    DialogError::Skill { kind, .. } => *kind,
                    _ => crate::error::SkillErrorKind::Other,
                };
                tracing::warn!(conversation = %ctx.conversation, error = %err, "Skill failure");
                let template = if kind.is_account_problem() {
                    Template::AccountProblem
                } else {
                    Template::SkillError
                };
                ctx.send(OutgoingMessage::new(template));

                let sub_flow = stack
                    .top()
                    .filter(|f| f.options.sub_flow_mode)
                    .and_then(|f| self.registry.get(&f.flow_id));
                match sub_flow {
                    Some(flow) if stack.depth() > 1 => {
                        flow.clear_sub_scope(ctx.state);
                        stack.pop();
                        if let Some(parent) = stack.top_mut() {
                            parent.step_index += 1;
                        }
                        None
                    }
                    _ => {
                        ctx.state.clear();
                        stack.clear();
                        Some(TurnStatus::Cancelled)
                    }
                }
            }
            ErrorClass::Fatal => Some(self.fatal(ctx, stack, &err)),
        }
    }

    /// Message, clear state, cancel everything
    fn fatal(
        &self,
        ctx: &mut TurnContext<'_>,
        stack: &mut DialogStack,
        err: &DialogError,
    ) -> TurnStatus {
        let template = match err {
            DialogError::RetryExhausted { .. } => Template::RetryTooMany,
            _ => {
                tracing::error!(conversation = %ctx.conversation, error = %err, "Dialog failure");
                Template::GenericError
            }
        };
        ctx.send(OutgoingMessage::new(template));
        ctx.state.clear();
        stack.clear();
        TurnStatus::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::{Flow, PromptSpec};
    use crate::messages::ConversationId;
    use crate::recognizer::RecognizedSignals;
    use crate::services::{Fixtures, Services};
    use crate::state::ConversationState;
    use async_trait::async_trait;
    use chrono::NaiveDateTime;
    use pretty_assertions::assert_eq;

    /// Asks for a title, then ends with it.
    struct AskTitle;

    #[async_trait]
    impl Flow for AskTitle {
        fn id(&self) -> FlowId {
            FlowId::Named("ask_title".into())
        }

        fn step_count(&self) -> usize {
            2
        }

        async fn step(
            &self,
            index: usize,
            ctx: &mut TurnContext<'_>,
            _options: &mut FlowOptions,
            input: StepResult,
        ) -> Result<StepOutcome, DialogError> {
            match (index, input) {
                (0, _) => Ok(StepOutcome::Prompt(PromptSpec::text(OutgoingMessage::new(
                    Template::NoTitle,
                )))),
                (1, StepResult::Text(t)) if t.trim() == "bad" => {
                    Err(DialogError::Validation("bad title".into()))
                }
                (1, StepResult::Text(t)) => {
                    ctx.state.meeting.title = Some(t.clone());
                    Ok(StepOutcome::End(StepResult::Text(t)))
                }
                _ => Err(DialogError::missing("title answer")),
            }
        }
    }

    /// Loops forever without suspending.
    struct Spin;

    #[async_trait]
    impl Flow for Spin {
        fn id(&self) -> FlowId {
            FlowId::Named("spin".into())
        }

        fn step_count(&self) -> usize {
            1
        }

        async fn step(
            &self,
            _index: usize,
            _ctx: &mut TurnContext<'_>,
            _options: &mut FlowOptions,
            _input: StepResult,
        ) -> Result<StepOutcome, DialogError> {
            Ok(StepOutcome::Replace {
                flow: self.id(),
                options: FlowOptions::default(),
            })
        }
    }

    fn engine() -> DialogEngine {
        let mut registry = FlowRegistry::new();
        registry.register(Arc::new(AskTitle));
        registry.register(Arc::new(Spin));
        DialogEngine::new(Arc::new(registry), &EngineConfig::default())
    }

    fn now() -> NaiveDateTime {
        "2026-10-16T09:00:00".parse().unwrap()
    }

    struct Harness {
        id: ConversationId,
        state: ConversationState,
        services: Services,
        config: EngineConfig,
        stack: DialogStack,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                id: ConversationId::new("t"),
                state: ConversationState::default(),
                services: Services::in_memory(&Fixtures::default()),
                config: EngineConfig::default(),
                stack: DialogStack::new(),
            }
        }

        async fn begin(&mut self, engine: &DialogEngine, flow: FlowId) -> (TurnStatus, Vec<Template>) {
            let signals = RecognizedSignals::none();
            let mut ctx = TurnContext::new(
                &self.id, "", &signals, &mut self.state, &self.services, &self.config, now(),
            );
            let status = engine
                .begin(&mut ctx, &mut self.stack, flow, FlowOptions::default())
                .await;
            (status, ctx.into_messages().iter().map(|m| m.template).collect())
        }

        async fn answer(&mut self, engine: &DialogEngine, text: &str) -> (TurnStatus, Vec<Template>) {
            let signals = RecognizedSignals::none();
            let mut ctx = TurnContext::new(
                &self.id, text, &signals, &mut self.state, &self.services, &self.config, now(),
            );
            let status = engine.resume(&mut ctx, &mut self.stack).await;
            (status, ctx.into_messages().iter().map(|m| m.template).collect())
        }
    }

    #[tokio::test]
    async fn test_prompt_suspends_and_resumes() {
        let engine = engine();
        let mut h = Harness::new();

        let (status, sent) = h.begin(&engine, FlowId::Named("ask_title".into())).await;
        assert_eq!(status, TurnStatus::Waiting);
        assert_eq!(sent, vec![Template::NoTitle]);
        assert_eq!(h.stack.depth(), 1);

        let (status, sent) = h.answer(&engine, "Roadmap").await;
        assert_eq!(status, TurnStatus::Complete(StepResult::Text("Roadmap".into())));
        assert!(sent.is_empty());
        assert!(h.stack.is_empty());
        assert_eq!(h.state.meeting.title.as_deref(), Some("Roadmap"));
    }

    #[tokio::test]
    async fn test_unrecognized_answer_retries_then_gives_up() {
        let engine = engine();
        let mut h = Harness::new();
        h.begin(&engine, FlowId::Named("ask_title".into())).await;

        for _ in 0..4 {
            let (status, sent) = h.answer(&engine, "   ").await;
            assert_eq!(status, TurnStatus::Waiting);
            assert_eq!(sent, vec![Template::NoTitle]);
        }
        let (status, sent) = h.answer(&engine, "").await;
        assert_eq!(status, TurnStatus::Cancelled);
        assert_eq!(sent, vec![Template::RetryTooMany]);
        assert!(h.stack.is_empty());
    }

    #[tokio::test]
    async fn test_validation_error_rewinds_to_prompt() {
        let engine = engine();
        let mut h = Harness::new();
        h.begin(&engine, FlowId::Named("ask_title".into())).await;

        let (status, sent) = h.answer(&engine, "bad").await;
        assert_eq!(status, TurnStatus::Waiting);
        assert_eq!(sent, vec![Template::NoTitle]);
        let frame = h.stack.top().unwrap();
        assert_eq!(frame.step_index, 0);
        assert_eq!(frame.pending.as_ref().map(|p| p.attempts), Some(1));

        let (status, _) = h.answer(&engine, "good").await;
        assert_eq!(status, TurnStatus::Complete(StepResult::Text("good".into())));
    }

    #[tokio::test]
    async fn test_runaway_turn_is_fatal() {
        let engine = engine();
        let mut h = Harness::new();
        h.state.meeting.title = Some("keep?".into());

        let (status, sent) = h.begin(&engine, FlowId::Named("spin".into())).await;
        assert_eq!(status, TurnStatus::Cancelled);
        assert_eq!(sent, vec![Template::GenericError]);
        assert!(h.stack.is_empty());
        assert_eq!(h.state.meeting.title, None);
    }

    #[tokio::test]
    async fn test_unknown_flow_is_fatal() {
        let engine = engine();
        let mut h = Harness::new();
        let (status, sent) = h.begin(&engine, FlowId::Named("missing".into())).await;
        assert_eq!(status, TurnStatus::Cancelled);
        assert_eq!(sent, vec![Template::GenericError]);
    }

    #[tokio::test]
    async fn test_resume_on_idle_stack_completes() {
        let engine = engine();
        let mut h = Harness::new();
        let (status, sent) = h.answer(&engine, "hello").await;
        assert_eq!(status, TurnStatus::Complete(StepResult::Empty));
        assert!(sent.is_empty());
    }
}
