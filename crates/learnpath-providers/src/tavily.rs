//! Tavily web search provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use learnpath_core::schema::Resource;
use learnpath_core::traits::SearchProvider;

use crate::error::{check_status, http_client, parse_error, send_error, ProviderError};

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Tavily search API client.
pub struct TavilySearch {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl TavilySearch {
    pub fn new(api_key: &str, base_url: Option<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: http_client(DEFAULT_TIMEOUT_SECS)?,
        })
    }
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'static str,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
}

#[async_trait]
impl SearchProvider for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    #[instrument(skip(self))]
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<Resource>, ProviderError> {
        let body = TavilyRequest {
            query,
            max_results,
            search_depth: "basic",
        };

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, DEFAULT_TIMEOUT_SECS))?;
        let response = check_status(response, "search endpoint").await?;
        let api_response: TavilyResponse = response.json().await.map_err(parse_error)?;

        Ok(api_response
            .results
            .into_iter()
            .map(|r| Resource {
                title: r.title.trim().to_string(),
                url: r.url.trim().to_string(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn returns_results_in_order() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("Authorization", "Bearer tvly-test"))
            .and(body_partial_json(serde_json::json!({
                "query": "python list comprehension tutorial",
                "max_results": 3
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": "python list comprehension tutorial",
                "results": [
                    {"title": "List Comprehensions", "url": "https://docs.python.org/3/tutorial/datastructures.html", "content": "...", "score": 0.98},
                    {"title": "Real Python", "url": "https://realpython.com/list-comprehension-python/", "content": "...", "score": 0.91}
                ]
            })))
            .mount(&server)
            .await;

        let search = TavilySearch::new("tvly-test", Some(server.uri())).unwrap();
        let results = search
            .search("python list comprehension tutorial", 3)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "List Comprehensions");
        assert!(results[1].url.starts_with("https://realpython.com"));
    }

    #[tokio::test]
    async fn empty_results_are_ok() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})))
            .mount(&server)
            .await;

        let search = TavilySearch::new("tvly-test", Some(server.uri())).unwrap();
        assert!(search.search("obscure", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unauthorized() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "detail": {"error": "Unauthorized: missing or invalid API key."}
            })))
            .mount(&server)
            .await;

        let search = TavilySearch::new("bad", Some(server.uri())).unwrap();
        let err = search.search("rust", 3).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }
}
