//! Orchestrator - The Host Surface
//!
//! One entry point per incoming turn. The orchestrator:
//! - Serializes turns per conversation
//! - Loads and saves the persisted stack and state
//! - Runs the interruption router
//! - Digests entities when a task starts
//! - Routes idle turns to a task, or resumes the suspended one
//!
//! # Design Philosophy
//!
//! The orchestrator is transport-agnostic. It takes raw text plus whatever
//! the NLU produced and hands back messages; how they reach the user is the
//! host's business. Nothing in a conversation lives in memory between turns,
//! so any number of orchestrators can share one [`StateStore`].

use std::sync::Arc;

use chrono::NaiveDateTime;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::config::EngineConfig;
use crate::dialog::{DialogEngine, DialogStack, FlowRegistry, StepResult, TurnContext, TurnStatus};
use crate::digest::{digest_on_entry, digest_relationships};
use crate::error::OrchestratorError;
use crate::flows::{self, route_idle, Route};
use crate::interrupt;
use crate::messages::{ConversationId, OutgoingMessage, Template};
use crate::recognizer::RecognizedSignals;
use crate::services::Services;
use crate::store::{PersistedConversation, StateStore};

/// Source of the user-local current time
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock in the host's local time zone
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// A clock stuck at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// What one turn produced
#[derive(Clone, Debug, PartialEq)]
pub struct TurnOutcome {
    /// Messages for the user, in order
    pub messages: Vec<OutgoingMessage>,
    /// Whether a task is still waiting for an answer
    pub still_active: bool,
}

/// Drives conversations turn by turn
pub struct Orchestrator {
    engine: DialogEngine,
    store: Arc<dyn StateStore>,
    services: Services,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    /// One lock per conversation, held from load to save
    locks: DashMap<ConversationId, Arc<Mutex<()>>>,
}

impl Orchestrator {
    /// Orchestrator over a custom flow registry
    #[must_use]
    pub fn new(
        registry: FlowRegistry,
        store: Arc<dyn StateStore>,
        services: Services,
        config: EngineConfig,
    ) -> Self {
        Self {
            engine: DialogEngine::new(Arc::new(registry), &config),
            store,
            services,
            config,
            clock: Arc::new(SystemClock),
            locks: DashMap::new(),
        }
    }

    /// Orchestrator running the built-in calendar flows
    #[must_use]
    pub fn with_builtin_flows(store: Arc<dyn StateStore>, services: Services, config: EngineConfig) -> Self {
        Self::new(flows::builtin_registry(), store, services, config)
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Engine configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn lock_for(&self, id: &ConversationId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the conversation's lock entry unless another turn holds or waits on it
    fn release(&self, id: &ConversationId) {
        self.locks.remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Process one user turn
    ///
    /// # Errors
    ///
    /// Only store failures escape; everything that goes wrong inside a flow
    /// is turned into a message for the user.
    pub async fn on_turn(
        &self,
        conversation: &ConversationId,
        text: &str,
        signals: &RecognizedSignals,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let lock = self.lock_for(conversation);
        let outcome = {
            let _guard = lock.lock().await;
            self.run_turn(conversation, text, signals).await
        };
        drop(lock);
        self.release(conversation);
        outcome
    }

    async fn run_turn(
        &self,
        conversation: &ConversationId,
        text: &str,
        signals: &RecognizedSignals,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let mut record = self
            .store
            .load(conversation)
            .await?
            .unwrap_or_else(|| PersistedConversation::new(conversation.clone()));
        record.state.ensure_page_size(self.config.max_display_size);
        let mut stack = std::mem::take(&mut record.stack);

        let now = self.clock.now();
        let mut ctx = TurnContext::new(
            conversation,
            text,
            signals,
            &mut record.state,
            &self.services,
            &self.config,
            now,
        );
        let status = self.process(&mut ctx, &mut stack).await;
        let messages = ctx.into_messages();

        tracing::debug!(
            conversation = %conversation,
            ?status,
            depth = stack.depth(),
            sent = messages.len(),
            "Turn processed"
        );
        let still_active = !stack.is_empty();
        record.stack = stack;
        record.touch();
        self.store.save(conversation, &record).await?;

        Ok(TurnOutcome {
            messages,
            still_active,
        })
    }

    /// Forget a conversation entirely
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot delete the record.
    pub async fn on_reset(&self, conversation: &ConversationId) -> Result<(), OrchestratorError> {
        let lock = self.lock_for(conversation);
        let deleted = {
            let _guard = lock.lock().await;
            self.store.delete(conversation).await
        };
        drop(lock);
        self.release(conversation);
        deleted?;
        tracing::info!(conversation = %conversation, "Conversation reset");
        Ok(())
    }

    async fn process(&self, ctx: &mut TurnContext<'_>, stack: &mut DialogStack) -> TurnStatus {
        let interruption = interrupt::detect(
            ctx.text,
            ctx.signals,
            stack,
            self.engine.registry(),
            &self.config,
        );
        if let Some(status) = interruption.apply(&self.engine, ctx, stack).await {
            return status;
        }

        let signals = ctx.signals;
        let text = ctx.text;
        if !stack.is_empty() {
            digest_relationships(ctx.state, signals.entities(), text);
            return self.engine.resume(ctx, stack).await;
        }

        if text.trim().is_empty() {
            ctx.send(OutgoingMessage::new(Template::Welcome));
            return TurnStatus::Complete(StepResult::Empty);
        }

        match route_idle(signals.task_intent(), signals.general_intent()) {
            Route::Flow(flow, options) => {
                digest_on_entry(ctx.state, signals.task_intent(), signals.entities(), text);
                self.engine.begin(ctx, stack, flow, options).await
            }
            Route::DidntUnderstand => {
                tracing::debug!(conversation = %ctx.conversation, "No intent recognized");
                ctx.send(OutgoingMessage::new(Template::DidntUnderstand));
                ctx.state.clear();
                TurnStatus::Complete(StepResult::Empty)
            }
            Route::FeatureNotAvailable => {
                tracing::info!(
                    conversation = %ctx.conversation,
                    intent = ?signals.task_intent(),
                    "Unsupported intent"
                );
                ctx.send(OutgoingMessage::new(Template::FeatureNotAvailable));
                ctx.state.clear();
                TurnStatus::Complete(StepResult::Empty)
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .field("conversations", &self.locks.len())
            .finish_non_exhaustive()
    }
}
