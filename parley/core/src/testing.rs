//! Shared fixture for driving built-in flows in unit tests

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::config::EngineConfig;
use crate::dialog::{DialogEngine, DialogStack, FlowId, FlowOptions, TurnContext, TurnStatus};
use crate::flows;
use crate::error::ServiceError;
use crate::messages::{ConversationId, OutgoingMessage, Template};
use crate::recognizer::RecognizedSignals;
use crate::services::{
    CalendarEvent, CalendarService, Fixtures, InMemoryCalendar, InMemoryCredentials,
    InMemoryDirectory, InMemoryRooms, NewEvent, Services,
};
use crate::state::ConversationState;

pub(crate) fn at(s: &str) -> NaiveDateTime {
    s.parse().unwrap()
}

/// Engine, stack and state for one conversation, with handles on the
/// in-memory collaborators
pub(crate) struct Harness {
    pub engine: DialogEngine,
    pub id: ConversationId,
    pub state: ConversationState,
    pub services: Services,
    pub config: EngineConfig,
    pub stack: DialogStack,
    pub now: NaiveDateTime,
    pub status: Option<TurnStatus>,
    pub calendar: Arc<InMemoryCalendar>,
    pub directory: Arc<InMemoryDirectory>,
    pub rooms: Arc<InMemoryRooms>,
}

impl Harness {
    pub fn new(fixtures: Fixtures) -> Self {
        let config = EngineConfig::default();
        let calendar = Arc::new(InMemoryCalendar::from_fixtures(&fixtures));
        let directory = Arc::new(InMemoryDirectory::from_fixtures(&fixtures));
        let rooms = Arc::new(InMemoryRooms::from_fixtures(&fixtures));
        let services = Services::new(
            calendar.clone(),
            directory.clone(),
            rooms.clone(),
            Arc::new(InMemoryCredentials::new()),
        );
        let mut state = ConversationState::default();
        state.ensure_page_size(config.max_display_size);
        Self {
            engine: DialogEngine::new(Arc::new(flows::builtin_registry()), &config),
            id: ConversationId::new("unit"),
            state,
            services,
            config,
            stack: DialogStack::new(),
            now: at("2026-10-16T09:00:00"),
            status: None,
            calendar,
            directory,
            rooms,
        }
    }

    pub fn templates(sent: &[OutgoingMessage]) -> Vec<Template> {
        sent.iter().map(|m| m.template).collect()
    }

    pub async fn begin(&mut self, flow: FlowId, options: FlowOptions) -> Vec<OutgoingMessage> {
        self.begin_with(flow, options, "", &RecognizedSignals::none()).await
    }

    pub async fn begin_with(
        &mut self,
        flow: FlowId,
        options: FlowOptions,
        text: &str,
        signals: &RecognizedSignals,
    ) -> Vec<OutgoingMessage> {
        let mut ctx = TurnContext::new(
            &self.id,
            text,
            signals,
            &mut self.state,
            &self.services,
            &self.config,
            self.now,
        );
        let status = self.engine.begin(&mut ctx, &mut self.stack, flow, options).await;
        self.status = Some(status);
        ctx.into_messages()
    }

    pub async fn reply(&mut self, text: &str, signals: &RecognizedSignals) -> Vec<OutgoingMessage> {
        let mut ctx = TurnContext::new(
            &self.id,
            text,
            signals,
            &mut self.state,
            &self.services,
            &self.config,
            self.now,
        );
        let status = self.engine.resume(&mut ctx, &mut self.stack).await;
        self.status = Some(status);
        ctx.into_messages()
    }

    pub async fn reply_text(&mut self, text: &str) -> Vec<OutgoingMessage> {
        self.reply(text, &RecognizedSignals::none()).await
    }
}

/// Calendar whose free/busy answer is missing its last entry
pub(crate) struct ShortFreeBusy(pub Arc<InMemoryCalendar>);

#[async_trait]
impl CalendarService for ShortFreeBusy {
    async fn create_event(&self, event: NewEvent) -> Result<CalendarEvent, ServiceError> {
        self.0.create_event(event).await
    }

    async fn update_event(&self, event: CalendarEvent) -> Result<CalendarEvent, ServiceError> {
        self.0.update_event(event).await
    }

    async fn delete_event(&self, id: &str) -> Result<(), ServiceError> {
        self.0.delete_event(id).await
    }

    async fn decline_event(&self, id: &str) -> Result<(), ServiceError> {
        self.0.decline_event(id).await
    }

    async fn accept_event(&self, id: &str) -> Result<(), ServiceError> {
        self.0.accept_event(id).await
    }

    async fn events_by_time(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<CalendarEvent>, ServiceError> {
        self.0.events_by_time(start, end).await
    }

    async fn events_by_title(&self, title: &str) -> Result<Vec<CalendarEvent>, ServiceError> {
        self.0.events_by_title(title).await
    }

    async fn events_by_attendee(&self, name: &str) -> Result<Vec<CalendarEvent>, ServiceError> {
        self.0.events_by_attendee(name).await
    }

    async fn free_busy(
        &self,
        addresses: &[String],
        start: NaiveDateTime,
        interval_minutes: u32,
    ) -> Result<Vec<bool>, ServiceError> {
        let mut free = self.0.free_busy(addresses, start, interval_minutes).await?;
        free.pop();
        Ok(free)
    }
}
