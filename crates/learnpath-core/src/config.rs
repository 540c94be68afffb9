//! Session tuning knobs: quiz lengths, plan size, retry bound, level policy.

use serde::{Deserialize, Serialize};

use crate::schema::{Level, QuizScore};

/// Configuration shared by every session created from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Items in the diagnostic quiz.
    pub diagnostic_items: usize,
    /// Items in each module check quiz.
    pub module_quiz_items: usize,
    /// Modules requested for a learning plan.
    pub plan_modules: usize,
    /// Corrective reprompts allowed after the first malformed answer.
    pub max_retries: u32,
    /// How the final level is decided.
    pub level_policy: LevelPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            diagnostic_items: 5,
            module_quiz_items: 3,
            plan_modules: 3,
            max_retries: 2,
            level_policy: LevelPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> Result<(), String> {
        if self.diagnostic_items == 0 {
            return Err("diagnostic_items must be at least 1".into());
        }
        if self.module_quiz_items == 0 {
            return Err("module_quiz_items must be at least 1".into());
        }
        if self.plan_modules == 0 {
            return Err("plan_modules must be at least 1".into());
        }
        if let LevelPolicy::Thresholds {
            intermediate_at,
            advanced_at,
        } = self.level_policy
        {
            if !(0.0..=1.0).contains(&intermediate_at) || !(0.0..=1.0).contains(&advanced_at) {
                return Err("level thresholds must be between 0.0 and 1.0".into());
            }
            if intermediate_at > advanced_at {
                return Err("intermediate_at must not exceed advanced_at".into());
            }
        }
        Ok(())
    }
}

/// Maps a diagnostic result to a [`Level`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum LevelPolicy {
    /// Level follows the fraction of correct answers.
    Thresholds {
        #[serde(default = "default_intermediate_at")]
        intermediate_at: f64,
        #[serde(default = "default_advanced_at")]
        advanced_at: f64,
    },
    /// Level is whatever the model assessed.
    Model,
}

fn default_intermediate_at() -> f64 {
    0.4
}

fn default_advanced_at() -> f64 {
    0.8
}

impl Default for LevelPolicy {
    fn default() -> Self {
        LevelPolicy::Thresholds {
            intermediate_at: default_intermediate_at(),
            advanced_at: default_advanced_at(),
        }
    }
}

impl LevelPolicy {
    pub fn resolve(&self, model_level: Level, score: QuizScore) -> Level {
        match *self {
            LevelPolicy::Model => model_level,
            LevelPolicy::Thresholds {
                intermediate_at,
                advanced_at,
            } => {
                let ratio = score.ratio();
                if ratio >= advanced_at {
                    Level::Advanced
                } else if ratio >= intermediate_at {
                    Level::Intermediate
                } else {
                    Level::Beginner
                }
            }
        }
    }
}
