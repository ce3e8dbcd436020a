use serde::Serialize;
use tokio::sync::broadcast;

use crate::agent_engine::session::SessionMessage;
use crate::agent_engine::state::LoopState;
use crate::executor::action::ExecutionOutcome;

/// Everything a host (CLI, UI) may want to render while the agent works.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    StateChanged(LoopState),
    Message(SessionMessage),
    DirectiveExecuted(ExecutionOutcome),
    PointerPosition { x: i32, y: i32 },
}

/// Fan-out of [`AgentEvent`]s. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }

    /// Events published with no subscriber are dropped.
    pub fn publish(&self, event: AgentEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event dropped, no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(AgentEvent::PointerPosition { x: 1, y: 2 });
        match rx.recv().await.unwrap() {
            AgentEvent::PointerPosition { x, y } => assert_eq!((x, y), (1, 2)),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        EventBus::new(4).publish(AgentEvent::StateChanged(LoopState::Idle));
    }
}
