use std::collections::HashMap;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::errors::{PilotError, PilotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

/// Registry of all available LLM providers, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    active: String,
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    pub fn new(active: String) -> Self {
        Self {
            providers: HashMap::new(),
            active,
            llm_config: LlmConfig::default(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get_active(&self) -> PilotResult<Arc<dyn LlmProvider>> {
        self.providers
            .get(&self.active)
            .cloned()
            .ok_or_else(|| PilotError::Config(format!("Active provider '{}' not found in registry", self.active)))
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Provider and call configuration for the vision role.
    ///
    /// Resolution order:
    /// 1. `[llm.roles.vision]` in config.toml
    /// 2. Fallback: active provider with its default model / temperature, no streaming
    pub fn vision_call_config(&self, max_tokens: u32) -> PilotResult<(Arc<dyn LlmProvider>, CallConfig)> {
        if let Some(entry) = &self.llm_config.roles.vision {
            let provider = self.providers.get(&entry.provider).cloned().ok_or_else(|| {
                PilotError::Config(format!("Role 'vision' references unknown provider '{}'", entry.provider))
            })?;
            let temperature = entry.temperature.unwrap_or_else(|| {
                self.llm_config
                    .providers
                    .get(&entry.provider)
                    .map(|p| p.temperature)
                    .unwrap_or(0.0)
            });
            tracing::debug!(
                provider = %entry.provider,
                model = %entry.model,
                stream = entry.stream,
                temperature,
                "resolved vision role config"
            );
            return Ok((
                provider,
                CallConfig { model: entry.model.clone(), stream: entry.stream, temperature, max_tokens },
            ));
        }

        let provider = self.get_active()?;
        let (model, temperature) = self
            .llm_config
            .providers
            .get(&self.active)
            .map(|p| (p.model.clone(), p.temperature))
            .unwrap_or_else(|| (String::new(), 0.0));
        tracing::debug!(provider = %self.active, model = %model, "vision role not configured, using active provider");
        Ok((provider, CallConfig { model, stream: false, temperature, max_tokens }))
    }

    /// Build a registry from the loaded config.
    /// API keys are read from environment variables named `DESKPILOT_<ID>_API_KEY`.
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut registry = Self {
            providers: HashMap::new(),
            active: config.active_provider.clone(),
            llm_config: config.clone(),
        };
        for (id, entry) in &config.providers {
            let api_key = std::env::var(format!("DESKPILOT_{}_API_KEY", id.to_uppercase()))
                .unwrap_or_else(|_| entry.api_key.clone().unwrap_or_default());
            let provider = OpenAiCompatibleProvider::new(id.clone(), entry.api_base.clone(), api_key);
            registry.register(Arc::new(provider));
        }
        registry
    }
}
