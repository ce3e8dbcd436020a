//! Scripted collaborators for unit tests.
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::agent_engine::loop_control::CancelFlag;
use crate::directive::{KeyCode, MouseButton, ScrollDirection};
use crate::errors::{PilotError, PilotResult};
use crate::executor::input::InputDriver;
use crate::executor::system::CommandRunner;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse};
use crate::perception::traits::{DisplayInfo, ScreenCapture};
use crate::perception::types::{Resolution, Screenshot, ScreenshotMeta};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Move(i32, i32),
    Click(MouseButton),
    DoubleClick(MouseButton),
    Press(MouseButton),
    Release(MouseButton),
    KeyDown(KeyCode),
    KeyUp(KeyCode),
    Text(String),
    Scroll(ScrollDirection, i32),
}

/// Records successful primitives; can be told to fail one of them.
#[derive(Default)]
pub struct RecordingDriver {
    events: Mutex<Vec<InputEvent>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    fail_op: Option<&'static str>,
    /// 1-based call number that fails; 0 fails every call.
    fail_nth: usize,
    /// Raised after the named primitive has been performed.
    cancel_after: Option<(&'static str, CancelFlag)>,
}

impl RecordingDriver {
    pub fn failing_on(op: &'static str) -> Self {
        Self { fail_op: Some(op), ..Self::default() }
    }

    pub fn failing_on_nth(op: &'static str, nth: usize) -> Self {
        Self { fail_op: Some(op), fail_nth: nth, ..Self::default() }
    }

    pub fn cancelling_after(op: &'static str, flag: CancelFlag) -> Self {
        Self { cancel_after: Some((op, flag)), ..Self::default() }
    }

    pub fn events(&self) -> Vec<InputEvent> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, op: &'static str, event: InputEvent) -> PilotResult<()> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(op).or_insert(0);
            *n += 1;
            *n
        };
        if self.fail_op == Some(op) && (self.fail_nth == 0 || self.fail_nth == n) {
            return Err(PilotError::Input(format!("{op} refused")));
        }
        self.events.lock().unwrap().push(event);
        if let Some((_, flag)) = self.cancel_after.as_ref().filter(|(o, _)| *o == op) {
            flag.cancel();
        }
        Ok(())
    }
}

#[async_trait]
impl InputDriver for RecordingDriver {
    async fn move_to(&self, x: i32, y: i32) -> PilotResult<()> {
        self.record("move_to", InputEvent::Move(x, y))
    }

    async fn click(&self, button: MouseButton) -> PilotResult<()> {
        self.record("click", InputEvent::Click(button))
    }

    async fn double_click(&self, button: MouseButton) -> PilotResult<()> {
        self.record("double_click", InputEvent::DoubleClick(button))
    }

    async fn press_button(&self, button: MouseButton) -> PilotResult<()> {
        self.record("press_button", InputEvent::Press(button))
    }

    async fn release_button(&self, button: MouseButton) -> PilotResult<()> {
        self.record("release_button", InputEvent::Release(button))
    }

    async fn press_key(&self, key: KeyCode) -> PilotResult<()> {
        self.record("press_key", InputEvent::KeyDown(key))
    }

    async fn release_key(&self, key: KeyCode) -> PilotResult<()> {
        self.record("release_key", InputEvent::KeyUp(key))
    }

    async fn type_text(&self, text: &str) -> PilotResult<()> {
        self.record("type_text", InputEvent::Text(text.to_string()))
    }

    async fn scroll(&self, direction: ScrollDirection, amount: i32) -> PilotResult<()> {
        self.record("scroll", InputEvent::Scroll(direction, amount))
    }

    async fn position(&self) -> PilotResult<(i32, i32)> {
        Ok((7, 9))
    }
}

pub struct FixedDisplay {
    resolution: Resolution,
    queries: AtomicUsize,
}

impl FixedDisplay {
    pub fn new(width: u32, height: u32) -> Self {
        Self { resolution: Resolution::new(width, height), queries: AtomicUsize::new(0) }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DisplayInfo for FixedDisplay {
    async fn screen_resolution(&self) -> PilotResult<Resolution> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.resolution)
    }
}

pub struct FailingDisplay;

#[async_trait]
impl DisplayInfo for FailingDisplay {
    async fn screen_resolution(&self) -> PilotResult<Resolution> {
        Err(PilotError::Input("no display".into()))
    }
}

#[derive(Default)]
pub struct RecordingCommands {
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingCommands {
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingCommands {
    async fn run(&self, program: &str, args: &[String]) -> PilotResult<()> {
        self.calls.lock().unwrap().push((program.to_string(), args.to_vec()));
        Ok(())
    }
}

/// Returns a tiny fake screenshot, or fails when `fail` is set.
#[derive(Default)]
pub struct StubScreen {
    pub fail: bool,
    captures: AtomicUsize,
}

impl StubScreen {
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScreenCapture for StubScreen {
    async fn capture(&self) -> PilotResult<Screenshot> {
        let n = self.captures.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PilotError::Perception("capture refused".into()));
        }
        Ok(Screenshot {
            image_base64: format!("c2hvdA{n}"),
            meta: ScreenshotMeta {
                monitor_index: 0,
                resolution: Resolution::new(1000, 800),
                captured_at: chrono::Utc::now(),
            },
        })
    }
}

/// Replies from a queue; an empty queue is a provider failure.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<PilotResult<String>>>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
    /// Raised while the call is in flight.
    cancel_during_call: Option<CancelFlag>,
    /// Attached to every successful reply.
    reasoning: String,
}

impl ScriptedProvider {
    pub fn new<I: IntoIterator<Item = &'static str>>(replies: I) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.to_string())).collect()),
            ..Self::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        let provider = Self::default();
        provider
            .replies
            .lock()
            .unwrap()
            .push_back(Err(PilotError::LlmProvider(message.to_string())));
        provider
    }

    pub fn cancelling(mut self, flag: CancelFlag) -> Self {
        self.cancel_during_call = Some(flag);
        self
    }

    pub fn with_reasoning(mut self, reasoning: &str) -> Self {
        self.reasoning = reasoning.to_string();
        self
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, messages: Vec<ChatMessage>, _cfg: &CallConfig) -> PilotResult<LlmResponse> {
        self.seen.lock().unwrap().push(messages);
        if let Some(flag) = &self.cancel_during_call {
            flag.cancel();
        }
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PilotError::LlmProvider("script exhausted".into())));
        next.map(|content| LlmResponse { content, reasoning: self.reasoning.clone() })
    }
}
