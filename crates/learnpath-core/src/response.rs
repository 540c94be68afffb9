//! Response parsing with bounded corrective retries.
//!
//! A model answer goes through JSON extraction and then the target
//! [`Contract`]. When that fails, the original prompt is re-sent with the
//! list of violations appended, up to `max_retries` times:
//!
//! ```text
//! Attempt -> Validate -> Success
//!               |
//!               +--> Reprompt -> Attempt   (while retries remain)
//!               +--> Fail                  (bound exhausted)
//! ```
//!
//! Provider errors are not retried here; they propagate on the spot.

use serde_json::Value;

use crate::error::TutorError;
use crate::gateway::ModelGateway;
use crate::prompt;
use crate::schema::{Contract, Violation, ViolationKind};

/// Default number of corrective reprompts.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseParser {
    max_retries: u32,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

enum Step<T> {
    Attempt { prompt: String },
    Validate { raw: String },
    Reprompt { violations: Vec<Violation> },
    Success(T),
    Fail { violations: Vec<Violation> },
}

impl ResponseParser {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Send `instruction` and return a validated `T`.
    ///
    /// Issues at most `max_retries + 1` completions.
    pub async fn request<T: Contract>(
        &self,
        gateway: &ModelGateway,
        instruction: &str,
        shape: &T::Shape,
    ) -> Result<T, TutorError> {
        let schema = T::describe(shape);
        let mut attempts = 0u32;
        let mut step = Step::Attempt {
            prompt: instruction.to_string(),
        };

        loop {
            step = match step {
                Step::Attempt { prompt } => {
                    attempts += 1;
                    let raw = gateway.complete(&prompt).await?;
                    Step::Validate { raw }
                }
                Step::Validate { raw } => match validate::<T>(&raw, shape) {
                    Ok(value) => Step::Success(value),
                    Err(violations) if attempts <= self.max_retries => {
                        Step::Reprompt { violations }
                    }
                    Err(violations) => Step::Fail { violations },
                },
                Step::Reprompt { violations } => {
                    tracing::warn!(
                        contract = T::NAME,
                        attempt = attempts,
                        violations = violations.len(),
                        "malformed model response, reprompting"
                    );
                    Step::Attempt {
                        prompt: prompt::corrective(instruction, &violations, &schema),
                    }
                }
                Step::Success(value) => {
                    tracing::debug!(contract = T::NAME, attempts, "response validated");
                    return Ok(value);
                }
                Step::Fail { violations } => {
                    tracing::error!(contract = T::NAME, attempts, "giving up on malformed response");
                    return Err(TutorError::SchemaViolation {
                        contract: T::NAME,
                        attempts,
                        violations,
                    });
                }
            };
        }
    }
}

/// Extract and validate a single raw answer.
pub fn validate<T: Contract>(raw: &str, shape: &T::Shape) -> Result<T, Vec<Violation>> {
    let value = extract_json(raw).map_err(|reason| {
        vec![Violation::new("$", ViolationKind::NotJson { reason })]
    })?;
    T::from_value(&value, shape)
}

/// Pull a JSON document out of a model answer.
///
/// Tries, in order:
/// - ```` ```json ```` fenced blocks
/// - generic ```` ``` ```` fenced blocks
/// - the whole answer
/// - the outermost `{...}` and `[...]` spans
/// - the longest document that parses from any `{` or `[` onwards
pub fn extract_json(response: &str) -> Result<Value, String> {
    let (json_blocks, generic_blocks) = fenced_blocks(response);

    let mut candidates: Vec<&str> = json_blocks
        .iter()
        .chain(generic_blocks.iter())
        .map(String::as_str)
        .collect();
    candidates.push(response.trim());
    candidates.extend(outermost_spans(response));

    let mut first_error = None;
    for candidate in candidates {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => {
                first_error.get_or_insert_with(|| e.to_string());
            }
        }
    }
    if let Some(value) = longest_embedded_document(response) {
        return Ok(value);
    }
    Err(first_error.unwrap_or_else(|| "empty response".to_string()))
}

fn fenced_blocks(response: &str) -> (Vec<String>, Vec<String>) {
    let mut json_blocks = Vec::new();
    let mut generic_blocks = Vec::new();
    let mut in_block = false;
    let mut is_json_block = false;
    let mut is_generic_block = false;
    let mut current_block = String::new();

    for line in response.lines() {
        let trimmed = line.trim();

        if !in_block && trimmed.starts_with("```") {
            in_block = true;
            let lang = trimmed.trim_start_matches('`').trim().to_lowercase();
            is_json_block = lang == "json" || lang == "json5";
            is_generic_block = lang.is_empty();
            current_block.clear();
            continue;
        }

        if in_block && trimmed == "```" {
            in_block = false;
            if is_json_block {
                json_blocks.push(current_block.clone());
            } else if is_generic_block {
                generic_blocks.push(current_block.clone());
            }
            current_block.clear();
            continue;
        }

        if in_block {
            if !current_block.is_empty() {
                current_block.push('\n');
            }
            current_block.push_str(line);
        }
    }

    // Truncated (unclosed) block
    if in_block && !current_block.is_empty() {
        if is_json_block {
            json_blocks.push(current_block);
        } else if is_generic_block {
            generic_blocks.push(current_block);
        }
    }

    (json_blocks, generic_blocks)
}

fn outermost_spans(response: &str) -> Vec<&str> {
    let mut spans: Vec<(usize, &str)> = [('{', '}'), ('[', ']')]
        .into_iter()
        .filter_map(|(open, close)| {
            let start = response.find(open)?;
            let end = response.rfind(close)?;
            (end > start).then(|| (start, &response[start..=end]))
        })
        .collect();
    spans.sort_by_key(|(start, _)| *start);
    spans.into_iter().map(|(_, span)| span).collect()
}

/// Parse the first JSON value starting at every `{` or `[`, ignoring
/// whatever follows it, and keep the longest container found.
fn longest_embedded_document(response: &str) -> Option<Value> {
    let mut best: Option<(usize, Value)> = None;
    for (start, _) in response.match_indices(['{', '[']) {
        let mut stream = serde_json::Deserializer::from_str(&response[start..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            let len = stream.byte_offset();
            if best.as_ref().map_or(true, |(best_len, _)| len > *best_len) {
                best = Some((len, value));
            }
        }
    }
    best.map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::error::ProviderError;
    use crate::schema::{Quiz, QuizShape};
    use crate::test_support::{gateway_with, quiz_json, ScriptedLlm, ScriptedSearch};

    #[test]
    fn extract_plain_json() {
        let value = extract_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn extract_prefers_json_fence() {
        let input = "Sure!\n```\n{\"a\": 0}\n```\n```json\n{\"a\": 2}\n```\n";
        assert_eq!(extract_json(input).unwrap()["a"], 2);
    }

    #[test]
    fn extract_from_prose() {
        let input = "Here is your quiz: {\"items\": []} Good luck!";
        assert!(extract_json(input).unwrap()["items"].is_array());
    }

    #[test]
    fn extract_ignores_brackets_in_prose() {
        let input = format!("Here is your quiz [3 items]: {} Good luck!", quiz_json(3, "t"));
        let quiz = validate::<Quiz>(&input, &QuizShape::with_items(3)).unwrap();
        assert_eq!(quiz.len(), 3);

        let input = format!("[1] see notes. {}", quiz_json(2, "t"));
        assert!(validate::<Quiz>(&input, &QuizShape::with_items(2)).is_ok());
    }

    #[test]
    fn extract_skips_braces_before_the_document() {
        let input = r#"Use {curly} braces. {"a": 1} and then {more} text"#;
        assert_eq!(extract_json(input).unwrap()["a"], 1);
    }

    #[test]
    fn extract_truncated_fence() {
        let input = "```json\n{\"a\": 3}";
        assert_eq!(extract_json(input).unwrap()["a"], 3);
    }

    #[test]
    fn extract_failure_reports_reason() {
        assert!(extract_json("no json here").is_err());
        let errs = validate::<Quiz>("nope", &QuizShape::with_items(1)).unwrap_err();
        assert!(matches!(errs[0].kind, ViolationKind::NotJson { .. }));
    }

    #[tokio::test]
    async fn first_valid_answer_wins() {
        let llm = Arc::new(ScriptedLlm::new([quiz_json(5, "t")]));
        let gw = gateway_with(llm.clone(), Arc::new(ScriptedSearch::empty()));
        let quiz: Quiz = ResponseParser::default()
            .request(&gw, "make a quiz", &QuizShape::with_items(5))
            .await
            .unwrap();
        assert_eq!(quiz.len(), 5);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn reprompts_with_violations_then_succeeds() {
        let llm = Arc::new(ScriptedLlm::new([
            "not json at all".to_string(),
            quiz_json(3, "t"),
        ]));
        let gw = gateway_with(llm.clone(), Arc::new(ScriptedSearch::empty()));
        let quiz: Quiz = ResponseParser::new(2)
            .request(&gw, "make a quiz", &QuizShape::with_items(3))
            .await
            .unwrap();
        assert_eq!(quiz.len(), 3);

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].starts_with("make a quiz"));
        assert!(prompts[1].contains("previous attempt was malformed"));
        assert!(prompts[1].contains("not valid JSON"));
    }

    #[tokio::test]
    async fn retry_bound_is_respected() {
        let llm = Arc::new(ScriptedLlm::always("{\"items\": []}"));
        let gw = gateway_with(llm.clone(), Arc::new(ScriptedSearch::empty()));
        let err = ResponseParser::new(2)
            .request::<Quiz>(&gw, "make a quiz", &QuizShape::with_items(3))
            .await
            .unwrap_err();

        match err {
            TutorError::SchemaViolation {
                contract, attempts, ..
            } => {
                assert_eq!(contract, "quiz");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected schema violation, got {other:?}"),
        }
        assert_eq!(llm.calls(), 3);
    }

    #[tokio::test]
    async fn zero_retries_means_single_call() {
        let llm = Arc::new(ScriptedLlm::always("garbage"));
        let gw = gateway_with(llm.clone(), Arc::new(ScriptedSearch::empty()));
        let result = ResponseParser::new(0)
            .request::<Quiz>(&gw, "q", &QuizShape::with_items(1))
            .await;
        assert!(result.is_err());
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn provider_errors_are_not_retried() {
        let llm = Arc::new(ScriptedLlm::failing(ProviderError::Timeout(30)));
        let gw = gateway_with(llm.clone(), Arc::new(ScriptedSearch::empty()));
        let err = ResponseParser::new(2)
            .request::<Quiz>(&gw, "q", &QuizShape::with_items(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::Provider(ProviderError::Timeout(30))));
        assert_eq!(llm.calls(), 1);
    }
}
