use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::agent_engine::event_bus::{AgentEvent, EventBus};
use crate::agent_engine::loop_control::{CancelFlag, LoopController, RunFlag};
use crate::agent_engine::session::Session;
use crate::agent_engine::state::{LoopOutcome, LoopState};
use crate::agent_engine::tracker::TrackerHandle;
use crate::config::AgentConfig;
use crate::directive::{self, Action};
use crate::errors::{PilotError, PilotResult};
use crate::executor::dispatcher::{DispatchReport, Dispatcher};
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse};
use crate::perception::traits::ScreenCapture;

/// Directive grammar and house rules given to the model on every call.
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("../../prompts/system.md");

/// Drives the observe → decide → act loop and single chat turns.
pub struct AgentEngine {
    dispatcher: Arc<Dispatcher>,
    screen: Arc<dyn ScreenCapture>,
    provider: Arc<dyn LlmProvider>,
    call: CallConfig,
    config: AgentConfig,
    system_prompt: String,
    bus: EventBus,
    cancel: CancelFlag,
    running: RunFlag,
    tracker: Mutex<Option<TrackerHandle>>,
}

impl AgentEngine {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        screen: Arc<dyn ScreenCapture>,
        provider: Arc<dyn LlmProvider>,
        call: CallConfig,
        config: AgentConfig,
    ) -> Self {
        Self {
            dispatcher,
            screen,
            provider,
            call,
            config,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            bus: EventBus::default(),
            cancel: CancelFlag::new(),
            running: RunFlag::default(),
            tracker: Mutex::new(None),
        }
    }

    pub fn with_system_prompt(mut self, prompt: String) -> Self {
        self.system_prompt = prompt;
        self
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = flag;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Raise this to stop a run at its next check point.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_active()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Runs rounds until a terminal directive, a failure, a loop limit or
    /// cancellation. Only a concurrent run is reported as `Err`.
    pub async fn run(&self, instruction: &str, session: &mut Session) -> PilotResult<LoopOutcome> {
        let _guard = self.running.try_acquire()?;
        self.stop_tracking();
        self.cancel.reset();
        tracing::info!(session = %session.id(), instruction, "autonomous run started");

        let outcome = self.rounds(instruction, session).await;

        self.set_state(LoopState::Stopping);
        if let LoopOutcome::Failed { reason } = &outcome {
            tracing::error!(reason = %reason, "autonomous run failed");
            session.push_assistant(format!("Error: {reason}"));
        }
        session.push_note(outcome.status_note());
        self.set_state(LoopState::Idle);
        tracing::info!(?outcome, "autonomous run ended");
        Ok(outcome)
    }

    async fn rounds(&self, instruction: &str, session: &mut Session) -> LoopOutcome {
        let mut limits = LoopController::new(&self.config);
        let mut prompt = instruction.to_string();

        loop {
            if self.cancel.is_cancelled() {
                return LoopOutcome::Cancelled;
            }
            if let Some(reason) = limits.limit_reached() {
                return LoopOutcome::Failed { reason };
            }
            let round = limits.start_round();
            self.set_state(LoopState::Running { round });

            let shot = match self.screen.capture().await {
                Ok(s) => s,
                Err(e) => return LoopOutcome::Failed { reason: format!("screenshot capture failed: {e}") },
            };
            session.push_user(prompt.as_str(), Some(shot.data_uri()));

            let reply = match self.call_model(session).await {
                Ok(r) => r,
                Err(e) => return LoopOutcome::Failed { reason: format!("model call failed: {e}") },
            };
            if self.cancel.is_cancelled() {
                tracing::info!(round, "cancelled while waiting for the model, reply discarded");
                return LoopOutcome::Cancelled;
            }
            note_reasoning(&reply, session);
            session.push_assistant(reply.content.as_str());

            let report = self.dispatcher.dispatch(&reply.content, session).await;
            limits.record_round(&report);
            match report.terminal() {
                Some(Action::Finished) => return LoopOutcome::Finished,
                Some(Action::CallUser) => return LoopOutcome::UserRequested,
                _ => {}
            }
            if !report.handled() {
                tracing::warn!(round, "reply carried no directive");
            }
            prompt = self.config.continuation_prompt.clone();
        }
    }

    /// One non-autonomous exchange. Directives typed by the user run locally
    /// without a model call; anything else is sent to the model once.
    pub async fn chat_turn(
        &self,
        text: &str,
        with_screenshot: bool,
        session: &mut Session,
    ) -> PilotResult<DispatchReport> {
        let _guard = self.running.try_acquire()?;

        if !directive::parse(text).is_empty() {
            session.push_user(text, None);
            return Ok(self.dispatcher.dispatch(text, session).await);
        }

        let image = if with_screenshot {
            match self.screen.capture().await {
                Ok(shot) => Some(shot.data_uri()),
                Err(e) => {
                    tracing::warn!(error = %e, "screenshot for chat turn failed, sending text only");
                    None
                }
            }
        } else {
            None
        };
        session.push_user(text, image);

        match self.call_model(session).await {
            Ok(reply) => {
                note_reasoning(&reply, session);
                session.push_assistant(reply.content.as_str());
                Ok(self.dispatcher.dispatch(&reply.content, session).await)
            }
            Err(e) => {
                tracing::error!(error = %e, "chat turn failed");
                session.push_assistant(format!("Sorry, I could not get a response from the model: {e}"));
                Ok(DispatchReport::default())
            }
        }
    }

    /// System prompt plus the model-facing transcript. An empty reply is an error.
    async fn call_model(&self, session: &Session) -> PilotResult<LlmResponse> {
        let mut messages = Vec::with_capacity(session.messages().len() + 1);
        messages.push(ChatMessage::text("system", self.system_prompt.as_str()));
        messages.extend(session.to_chat_messages(self.config.history_images));

        tracing::info!(provider = self.provider.name(), model = %self.call.model, messages = messages.len(), "calling model");
        let reply = self.provider.chat(messages, &self.call).await?;
        if reply.content.trim().is_empty() {
            return Err(PilotError::LlmProvider("empty response".into()));
        }
        Ok(reply)
    }

    /// Starts the pointer preview. Rejected while a run is active.
    pub fn start_tracking(&self, period: Duration) -> PilotResult<()> {
        if self.running.is_active() {
            return Err(PilotError::AlreadyRunning);
        }
        let handle = TrackerHandle::start(self.dispatcher.driver(), self.bus.clone(), period);
        if let Ok(mut slot) = self.tracker.lock() {
            *slot = Some(handle);
        }
        Ok(())
    }

    pub fn stop_tracking(&self) {
        if let Ok(mut slot) = self.tracker.lock() {
            if let Some(handle) = slot.take() {
                handle.stop();
            }
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker
            .lock()
            .map(|slot| slot.as_ref().is_some_and(TrackerHandle::is_running))
            .unwrap_or(false)
    }

    fn set_state(&self, state: LoopState) {
        tracing::debug!(?state, "loop state");
        self.bus.publish(AgentEvent::StateChanged(state));
    }
}

/// Thinking text from reasoning models is shown to the user as a note. Notes are
/// never sent back to the model.
fn note_reasoning(reply: &LlmResponse, session: &mut Session) {
    let reasoning = reply.reasoning.trim();
    if reasoning.is_empty() {
        return;
    }
    tracing::debug!(reasoning, "model reasoning");
    session.push_note(format!("Reasoning: {reasoning}"));
}
