use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::{AgentConfig, LoopMode};
use crate::errors::{PilotError, PilotResult};
use crate::executor::dispatcher::DispatchReport;

/// Cooperative stop request, polled by the loop between await points.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Admits one run at a time.
#[derive(Debug, Clone, Default)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn try_acquire(&self) -> PilotResult<RunGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PilotError::AlreadyRunning)?;
        Ok(RunGuard(self.0.clone()))
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases the [`RunFlag`] on drop, whichever way the run ends.
#[derive(Debug)]
pub struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Optional run limits from `[agent]`.
///
/// `max_rounds` applies in every mode. The duration limit only applies in
/// `timed` mode and the failure limit only in `failure_limit` mode.
pub struct LoopController {
    mode: LoopMode,
    max_rounds: Option<u32>,
    max_duration: Option<Duration>,
    max_failures: Option<u32>,
    started: Instant,
    rounds: u32,
    consecutive_failures: u32,
}

impl LoopController {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            mode: config.mode,
            max_rounds: config.max_rounds,
            max_duration: config
                .max_duration_minutes
                .map(|m| Duration::from_secs(u64::from(m) * 60)),
            max_failures: config.max_consecutive_failures,
            started: Instant::now(),
            rounds: 0,
            consecutive_failures: 0,
        }
    }

    pub fn start_round(&mut self) -> u32 {
        self.rounds += 1;
        self.rounds
    }

    /// A handled batch with any failed directive counts as a failed round.
    pub fn record_round(&mut self, report: &DispatchReport) {
        if report.handled() && !report.all_succeeded() {
            self.consecutive_failures += 1;
            tracing::warn!(consecutive = self.consecutive_failures, "round failed");
        } else {
            self.consecutive_failures = 0;
        }
    }

    /// Reason to stop before starting another round.
    pub fn limit_reached(&self) -> Option<String> {
        if let Some(max) = self.max_rounds {
            if self.rounds >= max {
                return Some(format!("loop limit reached: {max} rounds"));
            }
        }
        match self.mode {
            LoopMode::UntilDone => None,
            LoopMode::Timed => self
                .max_duration
                .filter(|max| self.started.elapsed() >= *max)
                .map(|max| format!("loop limit reached: {} minutes elapsed", max.as_secs() / 60)),
            LoopMode::FailureLimit => self
                .max_failures
                .filter(|max| self.consecutive_failures >= *max)
                .map(|max| format!("loop limit reached: {max} consecutive failed rounds")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::parse;
    use crate::executor::action::ExecutionOutcome;

    fn report(succeeded: bool) -> DispatchReport {
        DispatchReport {
            directives: parse("click(1,1)"),
            outcomes: vec![ExecutionOutcome {
                ordinal: 0,
                action: "click".into(),
                handled: true,
                succeeded,
                description: String::new(),
            }],
        }
    }

    #[test]
    fn run_flag_admits_one_holder() {
        let flag = RunFlag::default();
        let guard = flag.try_acquire().unwrap();
        assert!(flag.is_active());
        assert!(matches!(flag.try_acquire(), Err(PilotError::AlreadyRunning)));
        drop(guard);
        assert!(!flag.is_active());
        assert!(flag.try_acquire().is_ok());
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        other.cancel();
        assert!(flag.is_cancelled());
        flag.reset();
        assert!(!other.is_cancelled());
    }

    #[test]
    fn round_limit_applies_in_every_mode() {
        let cfg = AgentConfig { max_rounds: Some(2), ..AgentConfig::default() };
        let mut ctl = LoopController::new(&cfg);
        assert!(ctl.limit_reached().is_none());
        ctl.start_round();
        ctl.start_round();
        assert_eq!(ctl.limit_reached().unwrap(), "loop limit reached: 2 rounds");
    }

    #[test]
    fn failure_limit_counts_consecutive_failed_rounds() {
        let cfg = AgentConfig {
            mode: LoopMode::FailureLimit,
            max_consecutive_failures: Some(2),
            ..AgentConfig::default()
        };
        let mut ctl = LoopController::new(&cfg);
        ctl.record_round(&report(false));
        ctl.record_round(&report(true));
        ctl.record_round(&report(false));
        assert!(ctl.limit_reached().is_none());
        ctl.record_round(&report(false));
        assert!(ctl.limit_reached().unwrap().contains("2 consecutive"));
    }

    #[test]
    fn failures_are_ignored_outside_failure_mode() {
        let cfg = AgentConfig { max_consecutive_failures: Some(1), ..AgentConfig::default() };
        let mut ctl = LoopController::new(&cfg);
        ctl.record_round(&report(false));
        assert!(ctl.limit_reached().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn timed_mode_stops_after_duration() {
        let cfg = AgentConfig {
            mode: LoopMode::Timed,
            max_duration_minutes: Some(1),
            ..AgentConfig::default()
        };
        let ctl = LoopController::new(&cfg);
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(ctl.limit_reached().is_none());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(ctl.limit_reached().unwrap().contains("1 minutes"));
    }
}
