use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ExecutorConfig;
use crate::directive::{Action, Directive, KeyCode, KeyCombo, Modifier, MouseButton, ScrollDirection};
use crate::errors::{PilotError, PilotResult};
use crate::executor::coordinator::Normalizer;
use crate::executor::input::InputDriver;
use crate::executor::system::CommandRunner;

/// Result of executing one directive.
///
/// `handled` says the directive was recognized and attempted; `succeeded` says
/// the input sequence completed. A failed drag is handled but not succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub ordinal: usize,
    pub action: String,
    pub handled: bool,
    pub succeeded: bool,
    pub description: String,
}

/// Performs one directive at a time against an [`InputDriver`].
pub struct ActionExecutor {
    driver: Arc<dyn InputDriver>,
    normalizer: Normalizer,
    commands: Arc<dyn CommandRunner>,
    config: ExecutorConfig,
}

impl ActionExecutor {
    pub fn new(
        driver: Arc<dyn InputDriver>,
        normalizer: Normalizer,
        commands: Arc<dyn CommandRunner>,
        config: ExecutorConfig,
    ) -> Self {
        Self { driver, normalizer, commands, config }
    }

    pub fn driver(&self) -> &Arc<dyn InputDriver> {
        &self.driver
    }

    /// Never fails: input errors are folded into the outcome.
    pub async fn execute(&self, directive: &Directive) -> ExecutionOutcome {
        let (summary, result) = self.perform(&directive.action).await;
        let (succeeded, description) = match result {
            Ok(()) => {
                tracing::info!(ordinal = directive.ordinal, action = directive.action.name(), %summary, "directive executed");
                (true, format!("Executed {summary}"))
            }
            Err(e) => {
                tracing::warn!(ordinal = directive.ordinal, action = directive.action.name(), error = %e, "directive failed");
                (false, format!("Failed {summary}: {e}"))
            }
        };
        ExecutionOutcome {
            ordinal: directive.ordinal,
            action: directive.action.name().to_string(),
            handled: true,
            succeeded,
            description,
        }
    }

    async fn perform(&self, action: &Action) -> (String, PilotResult<()>) {
        match action {
            Action::Click { at } | Action::DoubleClick { at } | Action::RightClick { at } => {
                let (x, y) = self.normalizer.resolve(*at).await;
                let (label, result) = match action {
                    Action::DoubleClick { .. } => ("left double click", self.double_click(x, y).await),
                    Action::RightClick { .. } => ("right click", self.click(MouseButton::Right, x, y).await),
                    _ => ("left click", self.click(MouseButton::Left, x, y).await),
                };
                (format!("{label} at ({x}, {y})"), result)
            }
            Action::Drag { from, to } => {
                let start = self.normalizer.resolve(*from).await;
                let end = self.normalizer.resolve(*to).await;
                (
                    format!("drag from ({}, {}) to ({}, {})", start.0, start.1, end.0, end.1),
                    self.drag(start, end).await,
                )
            }
            Action::Hotkey { combo } => (format!("hotkey {combo}"), self.hotkey(combo).await),
            Action::TypeText { content } => {
                (format!("text input {content:?}"), self.type_text(content).await)
            }
            Action::Scroll { at, direction } => {
                let (x, y) = self.normalizer.resolve(*at).await;
                (
                    format!("scroll {} at ({x}, {y})", direction.as_str()),
                    self.scroll(x, y, *direction).await,
                )
            }
            Action::Wait => {
                tokio::time::sleep(ms(self.config.wait_ms)).await;
                (format!("wait of {} ms", self.config.wait_ms), Ok(()))
            }
            Action::Finished => ("finish: task reported complete".to_string(), Ok(())),
            Action::CallUser => ("call_user: model asked for human help".to_string(), Ok(())),
        }
    }

    async fn click(&self, button: MouseButton, x: i32, y: i32) -> PilotResult<()> {
        self.driver.move_to(x, y).await?;
        self.driver.click(button).await
    }

    async fn double_click(&self, x: i32, y: i32) -> PilotResult<()> {
        self.driver.move_to(x, y).await?;
        self.driver.double_click(MouseButton::Left).await
    }

    /// Move, press, animate, release. Once the press went through the release is
    /// always attempted, even if the animation failed.
    async fn drag(&self, from: (i32, i32), to: (i32, i32)) -> PilotResult<()> {
        let settle = ms(self.config.drag_settle_ms);

        self.driver.move_to(from.0, from.1).await?;
        tokio::time::sleep(settle).await;
        self.driver.press_button(MouseButton::Left).await?;
        tokio::time::sleep(settle).await;

        let animated = self.smooth_move(from, to).await;
        tokio::time::sleep(settle).await;
        let released = self.driver.release_button(MouseButton::Left).await;
        animated.and(released)
    }

    async fn smooth_move(&self, from: (i32, i32), to: (i32, i32)) -> PilotResult<()> {
        let steps = self.config.drag_steps.max(1);
        let tick = ms(self.config.drag_step_ms);
        for i in 0..=steps {
            let t = f64::from(i) / f64::from(steps);
            let x = lerp(from.0, to.0, t);
            let y = lerp(from.1, to.1, t);
            self.driver.move_to(x, y).await?;
            tokio::time::sleep(tick).await;
        }
        Ok(())
    }

    async fn hotkey(&self, combo: &KeyCombo) -> PilotResult<()> {
        const SCREENSHOT_MODS: [Modifier; 2] = [Modifier::Meta, Modifier::Shift];
        if combo.is(&SCREENSHOT_MODS, "3") {
            return self.os_screenshot(false).await;
        }
        if combo.is(&SCREENSHOT_MODS, "4") {
            return self.os_screenshot(true).await;
        }

        let key = KeyCode::from_name(&combo.key)
            .ok_or_else(|| PilotError::Executor(format!("unknown key '{}'", combo.key)))?;

        let mut held = Vec::with_capacity(combo.modifiers.len());
        let chord = self.chord(&combo.modifiers, key, &mut held).await;

        let mut released = Ok(());
        for m in held.iter().rev() {
            if let Err(e) = self.driver.release_key(KeyCode::Modifier(*m)).await {
                released = Err(e);
            }
        }
        chord.and(released)
    }

    async fn chord(&self, modifiers: &[Modifier], key: KeyCode, held: &mut Vec<Modifier>) -> PilotResult<()> {
        for m in modifiers {
            self.driver.press_key(KeyCode::Modifier(*m)).await?;
            held.push(*m);
        }
        self.driver.press_key(key).await?;
        self.driver.release_key(key).await
    }

    async fn os_screenshot(&self, interactive: bool) -> PilotResult<()> {
        let dir = self
            .config
            .screenshot_dir
            .clone()
            .or_else(dirs::desktop_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        let target = dir.join("screenshot.png").to_string_lossy().into_owned();
        let args = if interactive {
            vec!["-i".to_string(), target]
        } else {
            vec![target]
        };
        self.commands.run("screencapture", &args).await
    }

    /// A trailing newline submits: it is sent as a Return key press.
    async fn type_text(&self, content: &str) -> PilotResult<()> {
        let (text, submit) = match content.strip_suffix('\n') {
            Some(rest) => (rest, true),
            None => (content, false),
        };
        if !text.is_empty() {
            self.driver.type_text(text).await?;
        }
        if submit {
            self.driver.press_key(KeyCode::Return).await?;
            self.driver.release_key(KeyCode::Return).await?;
        }
        Ok(())
    }

    async fn scroll(&self, x: i32, y: i32, direction: ScrollDirection) -> PilotResult<()> {
        self.driver.move_to(x, y).await?;
        tokio::time::sleep(ms(self.config.scroll_settle_ms)).await;

        let repeats = self.config.scroll_repeats.max(1);
        for r in 0..repeats {
            self.smooth_scroll(direction).await?;
            if r + 1 < repeats {
                tokio::time::sleep(ms(self.config.scroll_repeat_gap_ms)).await;
            }
        }
        Ok(())
    }

    async fn smooth_scroll(&self, direction: ScrollDirection) -> PilotResult<()> {
        let steps = self.config.scroll_steps.max(1);
        let per_step = (f64::from(self.config.scroll_total) / f64::from(steps)).round().max(1.0) as i32;
        let tick = ms(self.config.scroll_step_ms);
        for _ in 0..steps {
            self.driver.scroll(direction, per_step).await?;
            tokio::time::sleep(tick).await;
        }
        Ok(())
    }
}

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn lerp(a: i32, b: i32, t: f64) -> i32 {
    (f64::from(a) + f64::from(b - a) * t).round() as i32
}
