pub mod agent_engine;
pub mod commands;
pub mod config;
pub mod directive;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod perception;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;
use std::time::Duration;

use crate::agent_engine::event_bus::EventBus;
use crate::agent_engine::AgentEngine;
use crate::config::AppConfig;
use crate::errors::PilotResult;
use crate::executor::action::ActionExecutor;
use crate::executor::coordinator::Normalizer;
use crate::executor::dispatcher::Dispatcher;
use crate::executor::input::EnigoDriver;
use crate::executor::system::ProcessRunner;
use crate::llm::registry::ProviderRegistry;
use crate::perception::screenshot::XcapScreen;
use crate::perception::types::Resolution;

/// Logs go to stderr so stdout stays usable for transcripts and JSON.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();
}

/// Input thread, normalizer and executor wired into a dispatcher.
pub fn build_dispatcher(config: &AppConfig) -> PilotResult<Arc<Dispatcher>> {
    let driver = Arc::new(EnigoDriver::spawn()?);
    let fallback = Resolution::new(config.display.fallback_width, config.display.fallback_height);
    let normalizer = Normalizer::new(driver.clone(), fallback);
    let executor = ActionExecutor::new(driver, normalizer, Arc::new(ProcessRunner), config.executor.clone());
    Ok(Arc::new(Dispatcher::new(
        executor,
        Duration::from_millis(config.executor.batch_delay_ms),
    )))
}

/// Full engine on top of `dispatcher`, talking to the vision-role provider.
pub fn build_engine(config: &AppConfig, dispatcher: Arc<Dispatcher>, bus: EventBus) -> PilotResult<AgentEngine> {
    let registry = ProviderRegistry::from_config(&config.llm);
    tracing::debug!(providers = ?registry.list_names(), "provider registry ready");
    let (provider, call) = registry.vision_call_config(config.agent.max_tokens)?;

    let mut engine = AgentEngine::new(
        dispatcher,
        Arc::new(XcapScreen::default()),
        provider,
        call,
        config.agent.clone(),
    )
    .with_event_bus(bus);

    if let Some(path) = &config.agent.system_prompt_file {
        let prompt = std::fs::read_to_string(path)?;
        tracing::info!(path = %path.display(), "custom system prompt loaded");
        engine = engine.with_system_prompt(prompt);
    }
    Ok(engine)
}
