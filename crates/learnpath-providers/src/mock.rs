//! Mock providers for testing sessions without real API calls.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use learnpath_core::error::ProviderError;
use learnpath_core::schema::Resource;
use learnpath_core::traits::{
    CompletionRequest, CompletionResponse, LlmProvider, ModelInfo, SearchProvider, TokenUsage,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A mock LLM provider.
///
/// Queued replies are consumed first, in order. After that the first rule
/// whose key appears in the prompt answers, and otherwise the default.
pub struct MockProvider {
    /// Prompt substring → response, checked in insertion order.
    rules: Vec<(String, String)>,
    queue: Mutex<VecDeque<Result<String, ProviderError>>>,
    default_response: String,
    call_count: AtomicU32,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    /// Create a mock with the given prompt→response rules.
    pub fn new<I, K, V>(rules: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            rules: rules
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            queue: Mutex::new(VecDeque::new()),
            default_response: "{}".to_string(),
            call_count: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn with_fixed_response(response: &str) -> Self {
        Self::new(Vec::<(String, String)>::new()).with_default(response)
    }

    /// Replace the fallback response.
    pub fn with_default(mut self, response: &str) -> Self {
        self.default_response = response.to_string();
        self
    }

    /// Queue a reply ahead of the rules.
    pub fn enqueue(&self, response: impl Into<String>) {
        lock(&self.queue).push_back(Ok(response.into()));
    }

    /// Queue a failure ahead of the rules.
    pub fn enqueue_error(&self, err: ProviderError) {
        lock(&self.queue).push_back(Err(err));
    }

    /// Number of calls made to this provider.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// The last request made to this provider.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        lock(&self.requests).last().cloned()
    }

    /// Every request seen so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        lock(&self.requests).push(request.clone());

        let queued = lock(&self.queue).pop_front();
        let content = match queued {
            Some(reply) => reply?,
            None => self
                .rules
                .iter()
                .find(|(key, _)| request.prompt.contains(key.as_str()))
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| self.default_response.clone()),
        };

        let prompt_tokens = (request.prompt.len() / 4) as u32; // Rough estimate
        let completion_tokens = (content.len() / 4) as u32;

        Ok(CompletionResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
        }]
    }
}

/// A mock search provider with per-query results.
pub struct MockSearch {
    results: HashMap<String, Vec<Resource>>,
    default_results: Vec<Resource>,
    failure: Option<ProviderError>,
    call_count: AtomicU32,
    queries: Mutex<Vec<String>>,
}

impl MockSearch {
    /// Search that finds nothing.
    pub fn empty() -> Self {
        Self {
            results: HashMap::new(),
            default_results: Vec::new(),
            failure: None,
            call_count: AtomicU32::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Search that returns `results` for every query.
    pub fn with_results(results: Vec<Resource>) -> Self {
        Self {
            default_results: results,
            ..Self::empty()
        }
    }

    /// Search whose every call fails with `err`.
    pub fn failing(err: ProviderError) -> Self {
        Self {
            failure: Some(err),
            ..Self::empty()
        }
    }

    /// Return `results` when the query is exactly `query`.
    pub fn on_query(mut self, query: &str, results: Vec<Resource>) -> Self {
        self.results.insert(query.to_string(), results);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<Resource>, ProviderError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        lock(&self.queries).push(query.to_string());

        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let found = self.results.get(query).unwrap_or(&self.default_results);
        Ok(found.iter().take(max_results).cloned().collect())
    }
}
