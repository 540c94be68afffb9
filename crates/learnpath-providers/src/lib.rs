//! learnpath-providers — LLM and web search integrations.
//!
//! Implements the `LlmProvider` trait for Gemini, OpenAI, and Ollama and the
//! `SearchProvider` trait for Tavily, plus the config layer that wires one
//! of each into a `ModelGateway`.

pub mod config;
pub mod error;
pub mod gemini;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod tavily;

pub use config::{
    build_gateway, create_provider, create_search, load_config, load_config_from,
    LearnpathConfig, ProviderConfig, SearchConfig,
};
pub use error::ProviderError;
