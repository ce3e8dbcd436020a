// Out-of-band OS commands used by a few hotkeys instead of synthetic key events.
use async_trait::async_trait;

use crate::errors::{PilotError, PilotResult};

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> PilotResult<()>;
}

/// Runs commands with `tokio::process`, failing on a non-zero exit.
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> PilotResult<()> {
        tracing::info!(program, ?args, "running system command");
        let status = tokio::process::Command::new(program)
            .args(args)
            .status()
            .await?;
        if !status.success() {
            return Err(PilotError::Executor(format!("{program} exited with {status}")));
        }
        Ok(())
    }
}
