//! Gateway to the external LLM and search collaborators.
//!
//! The gateway performs exactly one network call per method invocation and
//! never retries. Retry decisions belong to the caller.

use std::fmt;
use std::sync::Arc;

use tracing::instrument;

use crate::error::ProviderError;
use crate::prompt::TUTOR_SYSTEM_PROMPT;
use crate::schema::Resource;
use crate::traits::{CompletionRequest, LlmProvider, SearchProvider};

/// Generation parameters fixed for the lifetime of a gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Upper bound on resources kept per search.
    pub max_search_results: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            max_search_results: 3,
        }
    }
}

/// Cheap to clone; every clone shares the same provider instances.
#[derive(Clone)]
pub struct ModelGateway {
    llm: Arc<dyn LlmProvider>,
    search: Arc<dyn SearchProvider>,
    settings: GenerationSettings,
}

impl fmt::Debug for ModelGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelGateway")
            .field("llm", &self.llm.name())
            .field("search", &self.search.name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl ModelGateway {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        search: Arc<dyn SearchProvider>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            llm,
            search,
            settings,
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Send `prompt` to the LLM and return its raw text.
    #[instrument(skip(self, prompt), fields(provider = %self.llm.name(), model = %self.settings.model))]
    pub async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = CompletionRequest {
            model: self.settings.model.clone(),
            prompt: prompt.to_string(),
            system_prompt: Some(TUTOR_SYSTEM_PROMPT.to_string()),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            json_mode: true,
        };

        let response = self.llm.complete(&request).await?;
        tracing::debug!(
            latency_ms = response.latency_ms,
            completion_tokens = response.token_usage.completion_tokens,
            chars = response.content.len(),
            "completion received"
        );

        if response.content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(response.content)
    }

    /// Search the web for `query`, keeping at most `max_search_results` usable links.
    #[instrument(skip(self), fields(provider = %self.search.name()))]
    pub async fn search(&self, query: &str) -> Result<Vec<Resource>, ProviderError> {
        let results = self
            .search
            .search(query, self.settings.max_search_results)
            .await?;

        let resources: Vec<Resource> = results
            .into_iter()
            .filter(|r| !r.title.trim().is_empty() && !r.url.trim().is_empty())
            .take(self.settings.max_search_results)
            .collect();
        tracing::debug!(count = resources.len(), "search results");
        Ok(resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedLlm, ScriptedSearch};

    fn gateway(llm: ScriptedLlm, search: ScriptedSearch) -> ModelGateway {
        ModelGateway::new(Arc::new(llm), Arc::new(search), GenerationSettings::default())
    }

    #[tokio::test]
    async fn complete_returns_raw_text() {
        let gw = gateway(ScriptedLlm::new(["{\"ok\": true}"]), ScriptedSearch::empty());
        assert_eq!(gw.complete("hi").await.unwrap(), "{\"ok\": true}");
    }

    #[tokio::test]
    async fn blank_completion_is_empty_response() {
        let gw = gateway(ScriptedLlm::new(["   \n"]), ScriptedSearch::empty());
        let err = gw.complete("hi").await.unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn search_drops_unusable_and_truncates() {
        let search = ScriptedSearch::with_results(vec![
            Resource {
                title: "".into(),
                url: "https://a".into(),
            },
            Resource {
                title: "One".into(),
                url: "https://one".into(),
            },
            Resource {
                title: "Two".into(),
                url: "https://two".into(),
            },
            Resource {
                title: "Three".into(),
                url: "https://three".into(),
            },
            Resource {
                title: "Four".into(),
                url: "https://four".into(),
            },
        ]);
        let gw = gateway(ScriptedLlm::new(Vec::<String>::new()), search);
        let resources = gw.search("python").await.unwrap();
        assert_eq!(resources.len(), 3);
        assert_eq!(resources[0].title, "One");
    }
}
