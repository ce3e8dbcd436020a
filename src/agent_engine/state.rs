use serde::Serialize;

/// Lifecycle of the autonomous loop. Every transition is published on the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Running { round: u32 },
    Stopping,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoopOutcome {
    /// The model emitted `finished()`.
    Finished,
    /// The model emitted `call_user()`.
    UserRequested,
    Cancelled,
    Failed { reason: String },
}

impl LoopOutcome {
    /// Final status line appended to the transcript.
    pub fn status_note(&self) -> String {
        match self {
            Self::Finished => "Task completed.".to_string(),
            Self::UserRequested => "The model asked for human help.".to_string(),
            Self::Cancelled => "Stopped by user.".to_string(),
            Self::Failed { reason } => format!("Stopped: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_serialize_tagged() {
        let json = serde_json::to_value(LoopState::Running { round: 3 }).unwrap();
        assert_eq!(json, serde_json::json!({ "state": "running", "round": 3 }));
        let json = serde_json::to_value(LoopOutcome::Failed { reason: "x".into() }).unwrap();
        assert_eq!(json["outcome"], "failed");
    }
}
