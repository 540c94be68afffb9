//! Provider configuration and factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use learnpath_core::config::SessionConfig;
use learnpath_core::gateway::{GenerationSettings, ModelGateway};
use learnpath_core::traits::{LlmProvider, SearchProvider};

use crate::gemini::GeminiProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;
use crate::tavily::TavilySearch;

/// Configuration for a single LLM provider.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Gemini {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::Gemini {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Gemini")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
        }
    }
}

/// Configuration for a web search backend.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SearchConfig {
    Tavily {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchConfig::Tavily {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Tavily")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// Top-level learnpath configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnpathConfig {
    /// LLM provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Search backend configurations keyed by name.
    #[serde(default)]
    pub search: HashMap<String, SearchConfig>,
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_search_provider")]
    pub search_provider: String,
    /// Resources kept per plan module.
    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_search_provider() -> String {
    "tavily".to_string()
}
fn default_max_search_results() -> usize {
    3
}

impl Default for LearnpathConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            search: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            search_provider: default_search_provider(),
            max_search_results: default_max_search_results(),
            session: SessionConfig::default(),
        }
    }
}

impl LearnpathConfig {
    /// Generation parameters, optionally overriding the model.
    pub fn generation_settings(&self, model: Option<&str>) -> GenerationSettings {
        GenerationSettings {
            model: model.unwrap_or(&self.default_model).to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            max_search_results: self.max_search_results,
        }
    }

    /// Check the values that can be checked without contacting any provider.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!("temperature must be between 0.0 and 2.0");
        }
        if self.max_tokens == 0 {
            anyhow::bail!("max_tokens must be at least 1");
        }
        if self.max_search_results == 0 {
            anyhow::bail!("max_search_results must be at least 1");
        }
        self.session
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid [session]: {e}"))?;
        Ok(())
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
/// Expand `${VAR}` references in a single pass. Substituted values are
/// copied verbatim and never expanded again.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + end];
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

fn resolve_opt(s: &Option<String>) -> Option<String> {
    s.as_deref().map(resolve_env_vars)
}

fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::Gemini { api_key, base_url } => ProviderConfig::Gemini {
            api_key: resolve_env_vars(api_key),
            base_url: resolve_opt(base_url),
        },
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: resolve_opt(base_url),
            org_id: resolve_opt(org_id),
        },
        ProviderConfig::Ollama { base_url } => ProviderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
        },
    }
}

fn resolve_search_config(config: &SearchConfig) -> SearchConfig {
    match config {
        SearchConfig::Tavily { api_key, base_url } => SearchConfig::Tavily {
            api_key: resolve_env_vars(api_key),
            base_url: resolve_opt(base_url),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `learnpath.toml` in the current directory
/// 2. `~/.config/learnpath/config.toml`
///
/// Environment variable overrides: `LEARNPATH_GEMINI_KEY`,
/// `LEARNPATH_OPENAI_KEY`, `LEARNPATH_TAVILY_KEY`.
pub fn load_config() -> Result<LearnpathConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<LearnpathConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("learnpath.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => LearnpathConfig::default(),
    };

    apply_env_overrides(&mut config);

    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();
    config.search = config
        .search
        .iter()
        .map(|(k, v)| (k.clone(), resolve_search_config(v)))
        .collect();

    Ok(config)
}

/// Parse a TOML document into a config without touching the environment.
pub fn parse_config(content: &str) -> Result<LearnpathConfig> {
    Ok(toml::from_str::<LearnpathConfig>(content)?)
}

fn apply_env_overrides(config: &mut LearnpathConfig) {
    if let Ok(key) = std::env::var("LEARNPATH_GEMINI_KEY") {
        let entry = config
            .providers
            .entry("gemini".into())
            .or_insert(ProviderConfig::Gemini {
                api_key: String::new(),
                base_url: None,
            });
        if let ProviderConfig::Gemini { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Ok(key) = std::env::var("LEARNPATH_OPENAI_KEY") {
        let entry = config
            .providers
            .entry("openai".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                org_id: None,
            });
        if let ProviderConfig::OpenAI { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Ok(key) = std::env::var("LEARNPATH_TAVILY_KEY") {
        let entry = config
            .search
            .entry("tavily".into())
            .or_insert(SearchConfig::Tavily {
                api_key: String::new(),
                base_url: None,
            });
        let SearchConfig::Tavily { api_key, .. } = entry;
        *api_key = key;
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("learnpath"))
}

/// Create an LLM provider instance from its configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match config {
        ProviderConfig::Gemini { api_key, base_url } => {
            require_key("gemini", api_key)?;
            Arc::new(GeminiProvider::new(api_key, base_url.clone())?)
        }
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => {
            require_key("openai", api_key)?;
            Arc::new(OpenAiProvider::new(
                api_key,
                base_url.clone(),
                org_id.clone(),
            )?)
        }
        ProviderConfig::Ollama { base_url } => Arc::new(OllamaProvider::new(base_url)?),
    };
    Ok(provider)
}

/// Create a search backend instance from its configuration.
pub fn create_search(config: &SearchConfig) -> Result<Arc<dyn SearchProvider>> {
    match config {
        SearchConfig::Tavily { api_key, base_url } => {
            require_key("tavily", api_key)?;
            Ok(Arc::new(TavilySearch::new(api_key, base_url.clone())?))
        }
    }
}

fn require_key(name: &str, api_key: &str) -> Result<()> {
    if api_key.trim().is_empty() {
        anyhow::bail!("no API key configured for '{name}'");
    }
    Ok(())
}

/// Build a gateway from the configured default (or overridden) provider and model.
pub fn build_gateway(
    config: &LearnpathConfig,
    provider: Option<&str>,
    model: Option<&str>,
) -> Result<ModelGateway> {
    let provider_name = provider.unwrap_or(&config.default_provider);
    let provider_config = config
        .providers
        .get(provider_name)
        .with_context(|| format!("provider '{provider_name}' not found in config"))?;
    let llm = create_provider(provider_config)
        .with_context(|| format!("failed to create provider '{provider_name}'"))?;

    let search_config = config
        .search
        .get(&config.search_provider)
        .with_context(|| {
            format!(
                "search provider '{}' not found in config",
                config.search_provider
            )
        })?;
    let search = create_search(search_config)
        .with_context(|| format!("failed to create search '{}'", config.search_provider))?;

    tracing::debug!(
        provider = provider_name,
        search = %config.search_provider,
        "gateway configured"
    );
    Ok(ModelGateway::new(
        llm,
        search,
        config.generation_settings(model),
    ))
}
