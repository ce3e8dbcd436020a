use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::agent_engine::event_bus::{AgentEvent, EventBus};
use crate::executor::input::InputDriver;

/// Periodically publishes the pointer position. Stopped by dropping or calling
/// [`TrackerHandle::stop`].
pub struct TrackerHandle {
    task: JoinHandle<()>,
}

impl TrackerHandle {
    pub fn start(driver: Arc<dyn InputDriver>, bus: EventBus, period: Duration) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last = None;
            loop {
                ticker.tick().await;
                match driver.position().await {
                    Ok(pos) if last != Some(pos) => {
                        last = Some(pos);
                        bus.publish(AgentEvent::PointerPosition { x: pos.0, y: pos.1 });
                    }
                    Ok(_) => {}
                    Err(e) => tracing::debug!(error = %e, "pointer position unavailable"),
                }
            }
        });
        tracing::debug!(period_ms = period.as_millis() as u64, "pointer tracker started");
        Self { task }
    }

    pub fn stop(self) {
        drop(self);
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for TrackerHandle {
    fn drop(&mut self) {
        self.task.abort();
        tracing::debug!("pointer tracker stopped");
    }
}
