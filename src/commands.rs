// Handlers behind the CLI subcommands. Each builds what it needs from the config,
// streams agent events to stdout and hands the transcript to the history sink.
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::agent_engine::event_bus::{AgentEvent, EventBus};
use crate::agent_engine::history::{SessionHistory, TranscriptSink};
use crate::agent_engine::loop_control::CancelFlag;
use crate::agent_engine::{LoopOutcome, LoopState, Session};
use crate::config::AppConfig;
use crate::directive;
use crate::errors::PilotResult;
use crate::executor::dispatcher::DispatchReport;
use crate::{build_dispatcher, build_engine};

/// `deskpilot run`: one autonomous run, Ctrl-C cancels it.
pub async fn run_task(config: &AppConfig, instruction: &str) -> PilotResult<LoopOutcome> {
    let bus = EventBus::default();
    let printer = spawn_printer(&bus);
    let engine = build_engine(config, build_dispatcher(config)?, bus.clone())?;
    let mut session = Session::new().with_events(bus.clone());

    let watcher = cancel_on_ctrl_c(engine.cancel_flag());
    let outcome = engine.run(instruction, &mut session).await;
    watcher.abort();

    save_history(config, &session);
    drop((engine, session, bus));
    let _ = printer.await;
    outcome
}

/// `deskpilot exec`: run the directives found in `text`, no model involved.
pub async fn exec_text(config: &AppConfig, text: &str) -> PilotResult<DispatchReport> {
    let bus = EventBus::default();
    let printer = spawn_printer(&bus);
    let dispatcher = build_dispatcher(config)?;
    let mut session = Session::new().with_events(bus.clone());

    let report = dispatcher.dispatch(text, &mut session).await;
    if !report.handled() {
        session.push_note("No directives found.");
    }

    drop((session, bus));
    let _ = printer.await;
    Ok(report)
}

/// `deskpilot parse`: directives in `text` as pretty JSON.
pub fn parse_text(text: &str) -> PilotResult<String> {
    Ok(serde_json::to_string_pretty(&directive::parse(text))?)
}

/// `deskpilot track`: print pointer moves until the time is up or Ctrl-C.
pub async fn track(config: &AppConfig, interval_ms: u64, seconds: Option<u64>) -> PilotResult<()> {
    let bus = EventBus::default();
    let printer = spawn_printer(&bus);
    let engine = build_engine(config, build_dispatcher(config)?, bus.clone())?;

    engine.start_tracking(Duration::from_millis(interval_ms.max(10)))?;
    match seconds {
        Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
        None => tokio::signal::ctrl_c().await?,
    }
    engine.stop_tracking();

    drop((engine, bus));
    let _ = printer.await;
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReplCommand<'a> {
    Empty,
    Quit,
    Clear,
    Auto(&'a str),
    Shot(&'a str),
    Say(&'a str),
}

impl<'a> ReplCommand<'a> {
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        match head {
            "/quit" | "/exit" => Self::Quit,
            "/clear" => Self::Clear,
            "/auto" if !rest.is_empty() => Self::Auto(rest),
            "/shot" if !rest.is_empty() => Self::Shot(rest),
            _ => Self::Say(line),
        }
    }
}

/// `deskpilot chat`: line-oriented session on stdin.
pub async fn chat(config: &AppConfig) -> PilotResult<()> {
    let bus = EventBus::default();
    let printer = spawn_printer(&bus);
    let engine = build_engine(config, build_dispatcher(config)?, bus.clone())?;
    let mut session = Session::new().with_events(bus.clone());

    println!("deskpilot chat. /auto <task> runs autonomously, /shot <text> attaches a screenshot, /clear, /quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match ReplCommand::parse(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Quit => break,
            ReplCommand::Clear => {
                save_history(config, &session);
                session.clear();
            }
            ReplCommand::Auto(task) => {
                let watcher = cancel_on_ctrl_c(engine.cancel_flag());
                if let Err(e) = engine.run(task, &mut session).await {
                    tracing::error!(error = %e, "autonomous run rejected");
                }
                watcher.abort();
            }
            ReplCommand::Shot(text) => {
                if let Err(e) = engine.chat_turn(text, true, &mut session).await {
                    tracing::error!(error = %e, "chat turn rejected");
                }
            }
            ReplCommand::Say(text) => {
                if let Err(e) = engine.chat_turn(text, false, &mut session).await {
                    tracing::error!(error = %e, "chat turn rejected");
                }
            }
        }
    }

    save_history(config, &session);
    drop((engine, session, bus));
    let _ = printer.await;
    Ok(())
}

/// Human-readable line for `event`, or `None` for events not worth printing.
pub fn render_event(event: &AgentEvent) -> Option<String> {
    match event {
        AgentEvent::Message(m) => {
            let shot = if m.image.is_some() { " [screenshot]" } else { "" };
            Some(format!("[{}] {}{shot}", m.role.as_str(), m.content))
        }
        AgentEvent::StateChanged(LoopState::Running { round }) => Some(format!("-- round {round} --")),
        AgentEvent::StateChanged(_) | AgentEvent::DirectiveExecuted(_) => None,
        AgentEvent::PointerPosition { x, y } => Some(format!("pointer ({x}, {y})")),
    }
}

/// Prints events until every sender of `bus` is gone.
fn spawn_printer(bus: &EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(line) = render_event(&event) {
                        println!("{line}");
                    }
                }
                Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn cancel_on_ctrl_c(flag: CancelFlag) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current step");
            flag.cancel();
        }
    })
}

fn save_history(config: &AppConfig, session: &Session) {
    if !config.history.enabled || session.messages().is_empty() {
        return;
    }
    let sink = SessionHistory::from_config(config.history.dir.clone());
    match sink.record(session) {
        Ok(()) => tracing::info!(path = %sink.path_for(session.id()).display(), "transcript saved"),
        Err(e) => tracing::warn!(error = %e, "could not save transcript"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::session::{Role, SessionMessage};

    #[test]
    fn repl_commands() {
        assert_eq!(ReplCommand::parse("   "), ReplCommand::Empty);
        assert_eq!(ReplCommand::parse("/quit"), ReplCommand::Quit);
        assert_eq!(ReplCommand::parse("/clear"), ReplCommand::Clear);
        assert_eq!(ReplCommand::parse("/auto open the calculator "), ReplCommand::Auto("open the calculator"));
        assert_eq!(ReplCommand::parse("/shot what is this?"), ReplCommand::Shot("what is this?"));
        // A bare command with no text is sent as a message.
        assert_eq!(ReplCommand::parse("/auto"), ReplCommand::Say("/auto"));
        assert_eq!(ReplCommand::parse("click(1,2)"), ReplCommand::Say("click(1,2)"));
    }

    #[test]
    fn parse_prints_json_array() {
        let json = parse_text("click(10,20) and then wait()").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["action"]["kind"], "click");
        assert_eq!(items[1]["ordinal"], 1);
        assert_eq!(parse_text("nothing here").unwrap(), "[]");
    }

    #[test]
    fn renders_messages_and_rounds() {
        let msg = SessionMessage {
            role: Role::User,
            content: "open settings".into(),
            image: Some("data:image/png;base64,AA".into()),
            ts: chrono::Utc::now(),
        };
        assert_eq!(
            render_event(&AgentEvent::Message(msg)).unwrap(),
            "[user] open settings [screenshot]"
        );
        assert_eq!(
            render_event(&AgentEvent::StateChanged(LoopState::Running { round: 2 })).unwrap(),
            "-- round 2 --"
        );
        assert!(render_event(&AgentEvent::StateChanged(LoopState::Idle)).is_none());
    }
}
