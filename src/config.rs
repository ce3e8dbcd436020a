use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{PilotError, PilotResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub active_provider: String,
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. If a role is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub roles: RolesConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "local".to_string(),
            ProviderEntry {
                display_name: "Local UI-TARS".to_string(),
                api_base: "http://localhost:8001/v1/chat/completions".to_string(),
                model: "ui-tars".to_string(),
                temperature: 0.0,
                api_key: None,
            },
        );
        Self {
            active_provider: "local".to_string(),
            providers,
            roles: RolesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    pub api_base: String,
    /// Default model for this provider (used when no role override exists).
    pub model: String,
    #[serde(default)]
    pub temperature: f64,
    /// Optional API key stored in config.toml (env var DESKPILOT_<ID>_API_KEY wins).
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Screenshot-reading model that emits the directives.
    pub vision: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    /// Model name sent to the API.
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    /// Overrides the provider-level temperature for this role.
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Only the most recent N screenshots are sent back to the model. `None` sends all.
    #[serde(default)]
    pub history_images: Option<usize>,
    #[serde(default = "default_continuation_prompt")]
    pub continuation_prompt: String,
    /// Replaces the built-in system prompt when set.
    #[serde(default)]
    pub system_prompt_file: Option<PathBuf>,
    #[serde(default)]
    pub mode: LoopMode,
    #[serde(default)]
    pub max_rounds: Option<u32>,
    #[serde(default)]
    pub max_duration_minutes: Option<u32>,
    #[serde(default)]
    pub max_consecutive_failures: Option<u32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            history_images: None,
            continuation_prompt: default_continuation_prompt(),
            system_prompt_file: None,
            mode: LoopMode::default(),
            max_rounds: None,
            max_duration_minutes: None,
            max_consecutive_failures: None,
        }
    }
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_continuation_prompt() -> String {
    "The action has been completed. Here is the updated screenshot. Continue with the next step of the task.".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    #[default]
    UntilDone,
    Timed,
    FailureLimit,
}

/// Input pacing. Values are tunable, the ordering they separate is not.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub drag_settle_ms: u64,
    pub drag_steps: u32,
    pub drag_step_ms: u64,
    pub scroll_settle_ms: u64,
    /// Total scroll distance of one repetition, in wheel notches.
    pub scroll_total: u32,
    pub scroll_steps: u32,
    pub scroll_step_ms: u64,
    pub scroll_repeats: u32,
    pub scroll_repeat_gap_ms: u64,
    pub wait_ms: u64,
    /// Pause between directives of one batch.
    pub batch_delay_ms: u64,
    /// Target directory of the screenshot hotkeys. Defaults to the desktop.
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            drag_settle_ms: 100,
            drag_steps: 20,
            drag_step_ms: 10,
            scroll_settle_ms: 200,
            scroll_total: 10,
            scroll_steps: 10,
            scroll_step_ms: 20,
            scroll_repeats: 2,
            scroll_repeat_gap_ms: 30,
            wait_ms: 5000,
            batch_delay_ms: 500,
            screenshot_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Used when the resolution query fails.
    pub fallback_width: u32,
    pub fallback_height: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            fallback_width: 1920,
            fallback_height: 1080,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
}

fn resolve_config_path() -> PilotResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(PilotError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

/// Loads `path` if given, otherwise searches the default locations.
pub fn load_config(path: Option<&Path>) -> PilotResult<AppConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => resolve_config_path()?,
    };
    let content = std::fs::read_to_string(&path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
    Ok(config)
}

/// Like [`load_config`], but a config file that cannot be found is not an error
/// when no explicit path was given: defaults are used instead.
pub fn load_config_or_default(path: Option<&Path>) -> PilotResult<AppConfig> {
    if path.is_some() {
        return load_config(path);
    }
    match resolve_config_path() {
        Ok(found) => load_config(Some(&found)),
        Err(e) => {
            tracing::warn!(error = %e, "using default configuration");
            Ok(AppConfig::default())
        }
    }
}

pub fn save_config(config: &AppConfig, path: &Path) -> PilotResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
