//! Scripted collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::gateway::{GenerationSettings, ModelGateway};
use crate::schema::Resource;
use crate::traits::{
    CompletionRequest, CompletionResponse, LlmProvider, ModelInfo, SearchProvider, TokenUsage,
};

/// Replies with queued answers in order, then with the fallback if any.
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: ProviderError) -> Self {
        Self {
            script: Mutex::new(VecDeque::from([Err(err)])),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn always(response: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(response.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, response: impl Into<String>) {
        self.script.lock().unwrap().push_back(Ok(response.into()));
    }

    pub fn push_err(&self, err: ProviderError) {
        self.script.lock().unwrap().push_back(Err(err));
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let next = self.script.lock().unwrap().pop_front();
        let content = match next {
            Some(result) => result?,
            None => self.fallback.clone().ok_or(ProviderError::EmptyResponse)?,
        };
        Ok(CompletionResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage::default(),
            latency_ms: 0,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        Vec::new()
    }
}

/// Returns the same outcome for every query.
pub struct ScriptedSearch {
    outcome: Result<Vec<Resource>, ProviderError>,
    calls: AtomicU32,
}

impl ScriptedSearch {
    pub fn empty() -> Self {
        Self::with_results(Vec::new())
    }

    pub fn with_results(results: Vec<Resource>) -> Self {
        Self {
            outcome: Ok(results),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(err: ProviderError) -> Self {
        Self {
            outcome: Err(err),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn search(&self, _query: &str, _max: usize) -> Result<Vec<Resource>, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.outcome.clone()
    }
}

pub fn gateway_with(llm: Arc<ScriptedLlm>, search: Arc<ScriptedSearch>) -> ModelGateway {
    ModelGateway::new(llm, search, GenerationSettings::default())
}

/// A valid quiz answer with `n` items, all with correct index 0.
pub fn quiz_json(n: usize, tag: &str) -> String {
    let items: Vec<serde_json::Value> = (0..n)
        .map(|i| {
            serde_json::json!({
                "question": format!("{tag} question {i}?"),
                "options": ["right", "wrong one", "wrong two", "wrong three"],
                "correct_index": 0,
                "explanation": "the first option is right"
            })
        })
        .collect();
    serde_json::json!({ "items": items }).to_string()
}

pub fn evaluation_json(level: &str) -> String {
    serde_json::json!({"level": level, "feedback": "Solid fundamentals."}).to_string()
}

pub fn plan_json(n: usize) -> String {
    let modules: Vec<serde_json::Value> = (0..n)
        .map(|i| {
            serde_json::json!({
                "title": format!("Module {}", i + 1),
                "description": format!("Concepts for step {}.", i + 1),
                "search_query": format!("learn step {}", i + 1)
            })
        })
        .collect();
    serde_json::json!({ "modules": modules }).to_string()
}
