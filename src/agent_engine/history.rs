use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent_engine::session::{Role, Session};
use crate::errors::{PilotError, PilotResult};

/// Receives finished transcripts.
pub trait TranscriptSink: Send + Sync {
    fn record(&self, session: &Session) -> PilotResult<()>;
}

/// One JSONL line. Screenshots are not persisted, only whether one was attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ts: i64,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub image: bool,
}

/// Writes each session to `session_<id>.jsonl` under a directory.
pub struct SessionHistory {
    dir: PathBuf,
}

impl SessionHistory {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// `dir` if given, otherwise the platform data directory.
    pub fn from_config(dir: Option<PathBuf>) -> Self {
        Self::new(dir.unwrap_or_else(data_dir_or_cwd))
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("session_{session_id}.jsonl"))
    }
}

impl TranscriptSink for SessionHistory {
    /// Rewrites the whole file so a re-recorded session never duplicates lines.
    fn record(&self, session: &Session) -> PilotResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(session.id());
        let mut file = std::fs::File::create(&path)?;
        for m in session.messages() {
            let entry = HistoryEntry {
                ts: m.ts.timestamp_millis(),
                role: m.role,
                content: m.content.clone(),
                image: m.image.is_some(),
            };
            writeln!(file, "{}", serde_json::to_string(&entry)?)?;
        }
        tracing::debug!(path = %path.display(), entries = session.messages().len(), "history written");
        Ok(())
    }
}

/// Reads a transcript written by [`SessionHistory`].
pub fn load_history(path: &Path) -> PilotResult<Vec<HistoryEntry>> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str::<HistoryEntry>(l).map_err(PilotError::from))
        .collect()
}

/// `<data_local_dir>/deskpilot/sessions`, falling back to the working directory.
fn data_dir_or_cwd() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("deskpilot").join("sessions"))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_line_per_message() {
        let dir = tempfile::tempdir().unwrap();
        let history = SessionHistory::new(dir.path().join("sessions"));

        let mut session = Session::new();
        session.push_user("open the browser", Some("data:image/png;base64,AAAA".into()));
        session.push_assistant("click(start_box='(10,20)')");
        session.push_note("Executed left click at (19, 22)");
        history.record(&session).unwrap();
        // Recording again replaces the file.
        history.record(&session).unwrap();

        let entries = load_history(&history.path_for(session.id())).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].role, Role::User);
        assert!(entries[0].image);
        assert_eq!(entries[1].content, "click(start_box='(10,20)')");
        assert_eq!(entries[2].role, Role::System);

        let raw = std::fs::read_to_string(history.path_for(session.id())).unwrap();
        assert!(!raw.contains("AAAA"));
    }
}
