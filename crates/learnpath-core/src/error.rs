//! Error types.
//!
//! `ProviderError` lives here rather than in `learnpath-providers` so the
//! session flow can classify failures as retryable without string matching.

use thiserror::Error;

use crate::schema::Violation;
use crate::session::Stage;

/// Errors that can occur when interacting with an LLM or search provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The provider answered successfully but with no usable content.
    #[error("provider returned an empty response")]
    EmptyResponse,
}

impl ProviderError {
    /// Returns `true` if repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_)
            | ProviderError::NetworkError(_)
            | ProviderError::EmptyResponse => true,
            ProviderError::ApiError { status, .. } => *status == 0 || *status >= 500,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_) => false,
        }
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// Invalid user actions. These block the transition entirely.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserInputError {
    #[error("topic must not be empty")]
    EmptyTopic,

    #[error("expected {expected} answers, got {got}")]
    AnswerCountMismatch { expected: usize, got: usize },

    #[error("answer {answer} for question {question} is out of range (0..{options})")]
    AnswerOutOfRange {
        question: usize,
        answer: usize,
        options: usize,
    },

    #[error("module {index} does not exist (plan has {len} modules)")]
    ModuleOutOfRange { index: usize, len: usize },

    #[error("cannot {action} while {stage}")]
    WrongStage { action: &'static str, stage: Stage },
}

/// Top-level error for every tutor operation.
#[derive(Debug, Clone, Error)]
pub enum TutorError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Model output did not match the contract after the retry bound.
    #[error("{contract} response still malformed after {attempts} attempts: {}", summarize(.violations))]
    SchemaViolation {
        contract: &'static str,
        attempts: u32,
        violations: Vec<Violation>,
    },

    #[error(transparent)]
    UserInput(#[from] UserInputError),
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl TutorError {
    /// Whether the user can repeat the same action and expect it may work.
    pub fn is_retryable(&self) -> bool {
        match self {
            TutorError::Provider(e) => e.is_retryable(),
            TutorError::SchemaViolation { .. } => true,
            TutorError::UserInput(_) => false,
        }
    }

    /// A message suitable for showing to the learner.
    pub fn user_message(&self) -> String {
        match self {
            TutorError::Provider(ProviderError::AuthenticationFailed(_)) => {
                "The tutor could not authenticate with its model provider. Check your API key."
                    .to_string()
            }
            TutorError::Provider(ProviderError::ModelNotFound(model)) => {
                format!("The configured model '{model}' is not available.")
            }
            TutorError::Provider(ProviderError::RateLimited { retry_after_ms }) => format!(
                "The tutor is busy right now. Please try again in {}s.",
                retry_after_ms.div_ceil(1000)
            ),
            TutorError::Provider(_) | TutorError::SchemaViolation { .. } => {
                "The tutor had trouble, please try again.".to_string()
            }
            TutorError::UserInput(e) => e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ViolationKind;

    #[test]
    fn retryable_classification() {
        assert!(ProviderError::Timeout(30).is_retryable());
        assert!(ProviderError::RateLimited { retry_after_ms: 10 }.is_retryable());
        assert!(ProviderError::EmptyResponse.is_retryable());
        assert!(ProviderError::ApiError {
            status: 503,
            message: "overloaded".into()
        }
        .is_retryable());
        assert!(!ProviderError::ApiError {
            status: 400,
            message: "bad request".into()
        }
        .is_retryable());
        assert!(!ProviderError::AuthenticationFailed("nope".into()).is_retryable());
    }

    #[test]
    fn schema_violation_is_retryable_with_friendly_message() {
        let err = TutorError::SchemaViolation {
            contract: "quiz",
            attempts: 3,
            violations: vec![Violation::new("items", ViolationKind::MissingField)],
        };
        assert!(err.is_retryable());
        assert!(err.user_message().contains("try again"));
        assert!(err.to_string().contains("items: missing field"));
    }

    #[test]
    fn user_input_is_not_retryable() {
        let err: TutorError = UserInputError::EmptyTopic.into();
        assert!(!err.is_retryable());
        assert_eq!(err.user_message(), "topic must not be empty");
    }

    #[test]
    fn rate_limit_message_rounds_up_seconds() {
        let err: TutorError = ProviderError::RateLimited {
            retry_after_ms: 1500,
        }
        .into();
        assert!(err.user_message().contains("2s"));
    }
}
