use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::agent_engine::event_bus::AgentEvent;
use crate::agent_engine::session::Session;
use crate::directive::{self, Action, Directive};
use crate::executor::action::{ActionExecutor, ExecutionOutcome};
use crate::executor::input::InputDriver;

/// What one `dispatch` call recognized and how each directive went.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub directives: Vec<Directive>,
    pub outcomes: Vec<ExecutionOutcome>,
}

impl DispatchReport {
    /// At least one directive was recognized.
    pub fn handled(&self) -> bool {
        !self.directives.is_empty()
    }

    /// Every directive completed. An empty batch has not succeeded.
    pub fn all_succeeded(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| o.succeeded)
    }

    /// First terminal directive of the batch, if any.
    pub fn terminal(&self) -> Option<&Action> {
        self.directives.iter().find(|d| d.is_terminal()).map(|d| &d.action)
    }
}

/// Runs every directive found in a piece of text, in order, one batch at a time.
pub struct Dispatcher {
    executor: ActionExecutor,
    batch_delay: Duration,
    device: Mutex<()>,
}

impl Dispatcher {
    pub fn new(executor: ActionExecutor, batch_delay: Duration) -> Self {
        Self { executor, batch_delay, device: Mutex::new(()) }
    }

    pub fn driver(&self) -> Arc<dyn InputDriver> {
        self.executor.driver().clone()
    }

    pub async fn dispatch(&self, text: &str, session: &mut Session) -> DispatchReport {
        let directives = directive::parse(text);
        if directives.is_empty() {
            tracing::debug!("no directives in text");
            return DispatchReport::default();
        }

        let _device = self.device.lock().await;
        tracing::info!(count = directives.len(), "dispatching batch");

        let mut outcomes = Vec::with_capacity(directives.len());
        for (i, d) in directives.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.batch_delay).await;
            }
            let outcome = self.executor.execute(d).await;
            session.push_note(outcome.description.clone());
            session.publish(AgentEvent::DirectiveExecuted(outcome.clone()));
            outcomes.push(outcome);
        }

        let report = DispatchReport { directives, outcomes };
        tracing::info!(
            handled = report.handled(),
            all_succeeded = report.all_succeeded(),
            terminal = report.terminal().map(Action::name),
            "batch finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::session::Role;
    use crate::config::ExecutorConfig;
    use crate::directive::MouseButton;
    use crate::executor::coordinator::Normalizer;
    use crate::perception::types::Resolution;
    use crate::test_support::{FixedDisplay, InputEvent, RecordingCommands, RecordingDriver};

    fn dispatcher(driver: Arc<RecordingDriver>) -> Dispatcher {
        let normalizer = Normalizer::new(Arc::new(FixedDisplay::new(1000, 1000)), Resolution::new(1920, 1080));
        let executor = ActionExecutor::new(
            driver,
            normalizer,
            Arc::new(RecordingCommands::default()),
            ExecutorConfig { drag_steps: 2, wait_ms: 10, ..ExecutorConfig::default() },
        );
        Dispatcher::new(executor, Duration::from_millis(500))
    }

    #[tokio::test(start_paused = true)]
    async fn batch_runs_in_text_order() {
        let driver = Arc::new(RecordingDriver::default());
        let d = dispatcher(driver.clone());
        let mut session = Session::new();

        let started = tokio::time::Instant::now();
        let report = d
            .dispatch("click(10,10)\ntype(content='hi')\nright_single(20,30)", &mut session)
            .await;

        assert!(report.handled());
        assert!(report.all_succeeded());
        assert!(report.terminal().is_none());
        assert_eq!(
            driver.events(),
            vec![
                InputEvent::Move(10, 10),
                InputEvent::Click(MouseButton::Left),
                InputEvent::Text("hi".into()),
                InputEvent::Move(20, 30),
                InputEvent::Click(MouseButton::Right),
            ]
        );
        // Two gaps between three directives.
        assert!(started.elapsed() >= Duration::from_millis(1000));

        let notes: Vec<_> = session.messages().iter().filter(|m| m.role == Role::System).collect();
        assert_eq!(notes.len(), 3);
        assert!(notes[0].content.starts_with("Executed left click"));
    }

    #[tokio::test(start_paused = true)]
    async fn space_and_semicolon_separated_batch() {
        let driver = Arc::new(RecordingDriver::default());
        let d = dispatcher(driver.clone());
        let mut session = Session::new();

        let report = d
            .dispatch("click(1,2) type(content='a');hotkey(key='control+a')", &mut session)
            .await;
        let names: Vec<_> = report.outcomes.iter().map(|o| o.action.as_str()).collect();
        assert_eq!(names, vec!["click", "type", "hotkey"]);
        assert_eq!(report.outcomes.iter().map(|o| o.ordinal).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(report.all_succeeded());
        assert_eq!(driver.events()[2], InputEvent::Text("a".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn text_without_directives_is_not_handled() {
        let driver = Arc::new(RecordingDriver::default());
        let d = dispatcher(driver.clone());
        let mut session = Session::new();

        let report = d.dispatch("I think the button is on the left.", &mut session).await;
        assert!(!report.handled());
        assert!(!report.all_succeeded());
        assert!(driver.events().is_empty());
        assert!(session.messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_does_not_stop_the_batch() {
        let driver = Arc::new(RecordingDriver::failing_on_nth("click", 1));
        let d = dispatcher(driver.clone());
        let mut session = Session::new();

        let report = d.dispatch("click(1,1) click(2,2) finished()", &mut session).await;
        assert!(report.handled());
        assert!(!report.all_succeeded());
        assert_eq!(report.outcomes.len(), 3);
        assert!(!report.outcomes[0].succeeded);
        assert!(report.outcomes[1].succeeded);
        assert_eq!(report.terminal(), Some(&Action::Finished));
    }
}
