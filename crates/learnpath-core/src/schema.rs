//! Schema contracts for everything the model is asked to produce.
//!
//! Model output is never trusted directly. Raw JSON goes through
//! [`Contract::from_value`], which either yields the typed object or the
//! full list of [`Violation`]s found. Those violations feed the corrective
//! reprompt in [`crate::response`].

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::UserInputError;

/// Number of options every quiz item carries.
pub const OPTIONS_PER_ITEM: usize = 4;

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// The subject a learner wants to study. Trimmed and never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(raw: &str) -> Result<Self, UserInputError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(UserInputError::EmptyTopic);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Quiz
// ---------------------------------------------------------------------------

/// A single multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizItem {
    pub question: String,
    /// Exactly [`OPTIONS_PER_ITEM`] distinct, non-empty options.
    pub options: Vec<String>,
    pub correct_index: usize,
    /// Optional explanation shown after grading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl QuizItem {
    pub fn correct_option(&self) -> &str {
        &self.options[self.correct_index]
    }

    pub fn is_correct(&self, answer: usize) -> bool {
        answer == self.correct_index
    }
}

/// An ordered, fixed-length list of quiz items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    pub items: Vec<QuizItem>,
}

impl Quiz {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Check that `answers` lines up with this quiz.
    pub fn check_answers(&self, answers: &[usize]) -> Result<(), UserInputError> {
        if answers.len() != self.items.len() {
            return Err(UserInputError::AnswerCountMismatch {
                expected: self.items.len(),
                got: answers.len(),
            });
        }
        for (question, (item, &answer)) in self.items.iter().zip(answers).enumerate() {
            if answer >= item.options.len() {
                return Err(UserInputError::AnswerOutOfRange {
                    question,
                    answer,
                    options: item.options.len(),
                });
            }
        }
        Ok(())
    }

    /// Grade a full answer sheet.
    pub fn grade(&self, answers: &[usize]) -> Result<QuizScore, UserInputError> {
        self.check_answers(answers)?;
        let correct = self
            .items
            .iter()
            .zip(answers)
            .filter(|(item, &answer)| item.is_correct(answer))
            .count();
        Ok(QuizScore {
            correct,
            total: self.items.len(),
        })
    }
}

/// Shape parameters for a quiz contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizShape {
    pub items: usize,
    pub options: usize,
    /// Questions that must not appear again, compared case-insensitively.
    pub exclude: Vec<String>,
}

impl QuizShape {
    pub fn with_items(items: usize) -> Self {
        Self {
            items,
            options: OPTIONS_PER_ITEM,
            exclude: Vec::new(),
        }
    }

    /// Forbid every question in `asked`.
    pub fn excluding(mut self, asked: &[String]) -> Self {
        self.exclude.extend(asked.iter().cloned());
        self
    }
}

fn question_key(question: &str) -> String {
    question.trim().to_lowercase()
}

/// Result of grading a quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizScore {
    pub correct: usize,
    pub total: usize,
}

impl QuizScore {
    /// Fraction of correct answers, `0.0` for an empty quiz.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

impl fmt::Display for QuizScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.correct, self.total)
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Assessed knowledge level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Beginner, Level::Intermediate, Level::Advanced];
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Beginner => write!(f, "Beginner"),
            Level::Intermediate => write!(f, "Intermediate"),
            Level::Advanced => write!(f, "Advanced"),
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(Level::Beginner),
            "intermediate" => Ok(Level::Intermediate),
            "advanced" => Ok(Level::Advanced),
            other => Err(format!("unknown level: {other}")),
        }
    }
}

/// What the model returns for the evaluate stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationDraft {
    pub level: Level,
    pub feedback: String,
}

/// The final assessment of a diagnostic quiz. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub level: Level,
    pub feedback: String,
    pub score: QuizScore,
}

// ---------------------------------------------------------------------------
// Learning plan
// ---------------------------------------------------------------------------

/// A link found by the search collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub title: String,
    pub url: String,
}

/// One module as proposed by the model, before resources are attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDraft {
    pub title: String,
    pub description: String,
    pub search_query: String,
}

/// What the model returns for the plan stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDraft {
    pub modules: Vec<ModuleDraft>,
}

/// Shape parameters for a plan contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanShape {
    pub min_modules: usize,
    pub max_modules: usize,
}

impl PlanShape {
    pub fn exactly(modules: usize) -> Self {
        Self {
            min_modules: modules,
            max_modules: modules,
        }
    }
}

/// A unit of a learning plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanModule {
    pub title: String,
    pub description: String,
    pub search_query: String,
    /// Empty unless a search call succeeded for this module.
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl From<ModuleDraft> for PlanModule {
    fn from(draft: ModuleDraft) -> Self {
        Self {
            title: draft.title,
            description: draft.description,
            search_query: draft.search_query,
            resources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningPlan {
    pub modules: Vec<PlanModule>,
}

impl LearningPlan {
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn module(&self, index: usize) -> Result<&PlanModule, UserInputError> {
        self.modules
            .get(index)
            .ok_or(UserInputError::ModuleOutOfRange {
                index,
                len: self.modules.len(),
            })
    }
}

// ---------------------------------------------------------------------------
// Violations
// ---------------------------------------------------------------------------

/// A single broken constraint, located by a JSON-path-like string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub path: String,
    pub kind: ViolationKind,
}

impl Violation {
    pub fn new(path: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    /// The response contained no JSON document at all.
    NotJson { reason: String },
    MissingField,
    WrongType { expected: String },
    OutOfRange { value: i64, min: i64, max: i64 },
    WrongLength { expected: String, actual: usize },
    Empty,
    Duplicate { value: String },
    UnknownVariant { value: String, expected: String },
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::NotJson { reason } => write!(f, "not valid JSON ({reason})"),
            ViolationKind::MissingField => write!(f, "missing field"),
            ViolationKind::WrongType { expected } => write!(f, "expected {expected}"),
            ViolationKind::OutOfRange { value, min, max } => {
                write!(f, "{value} is out of range [{min}, {max}]")
            }
            ViolationKind::WrongLength { expected, actual } => {
                write!(f, "expected {expected} entries, got {actual}")
            }
            ViolationKind::Empty => write!(f, "must not be empty"),
            ViolationKind::Duplicate { value } => write!(f, "duplicate value '{value}'"),
            ViolationKind::UnknownVariant { value, expected } => {
                write!(f, "'{value}' is not one of {expected}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Contract trait
// ---------------------------------------------------------------------------

/// A model output shape that can be described to the model and validated.
pub trait Contract: Sized {
    /// Cardinality parameters (item counts and the like).
    type Shape;

    /// Short name used in logs and errors.
    const NAME: &'static str;

    /// The JSON layout the model must answer with, as prompt text.
    fn describe(shape: &Self::Shape) -> String;

    /// Validate a decoded JSON value.
    fn from_value(value: &Value, shape: &Self::Shape) -> Result<Self, Vec<Violation>>;
}

impl Contract for Quiz {
    type Shape = QuizShape;
    const NAME: &'static str = "quiz";

    fn describe(shape: &QuizShape) -> String {
        format!(
            r#"{{"items": [{{"question": string, "options": [{} distinct non-empty strings], "correct_index": integer 0-{}, "explanation": string}}]}} with exactly {} entries in "items""#,
            shape.options,
            shape.options.saturating_sub(1),
            shape.items
        )
    }

    fn from_value(value: &Value, shape: &QuizShape) -> Result<Self, Vec<Violation>> {
        let mut v = Validator::default();

        // A bare array is accepted as the item list.
        let items = match value {
            Value::Array(items) => Some(items),
            Value::Object(obj) => v.array(obj, "", "items"),
            _ => {
                v.push("$", wrong_type("object"));
                None
            }
        };
        let Some(items) = items else {
            return Err(v.finish());
        };

        if items.len() != shape.items {
            v.push(
                "items",
                ViolationKind::WrongLength {
                    expected: shape.items.to_string(),
                    actual: items.len(),
                },
            );
        }

        let parsed: Vec<(usize, QuizItem)> = items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| {
                v.quiz_item(item, &format!("items[{i}]"), shape)
                    .map(|parsed| (i, parsed))
            })
            .collect();

        let excluded: HashSet<String> = shape.exclude.iter().map(|q| question_key(q)).collect();
        let mut seen = HashSet::new();
        for (i, item) in &parsed {
            let key = question_key(&item.question);
            if excluded.contains(&key) || !seen.insert(key) {
                v.push(
                    &format!("items[{i}].question"),
                    ViolationKind::Duplicate {
                        value: item.question.clone(),
                    },
                );
            }
        }
        let parsed: Vec<QuizItem> = parsed.into_iter().map(|(_, item)| item).collect();

        if v.is_clean() {
            Ok(Quiz { items: parsed })
        } else {
            Err(v.finish())
        }
    }
}

impl Contract for EvaluationDraft {
    type Shape = ();
    const NAME: &'static str = "evaluation";

    fn describe(_: &()) -> String {
        r#"{"level": one of "Beginner" | "Intermediate" | "Advanced", "feedback": string}"#
            .to_string()
    }

    fn from_value(value: &Value, _: &()) -> Result<Self, Vec<Violation>> {
        let mut v = Validator::default();
        let Some(obj) = v.object(value, "$") else {
            return Err(v.finish());
        };

        let level = v.string(obj, "", "level").and_then(|raw| {
            raw.parse::<Level>()
                .map_err(|_| {
                    v.push(
                        "level",
                        ViolationKind::UnknownVariant {
                            value: raw.clone(),
                            expected: "Beginner, Intermediate, Advanced".into(),
                        },
                    )
                })
                .ok()
        });
        let feedback = v.string(obj, "", "feedback");

        match (level, feedback) {
            (Some(level), Some(feedback)) if v.is_clean() => Ok(EvaluationDraft { level, feedback }),
            _ => Err(v.finish()),
        }
    }
}

impl Contract for PlanDraft {
    type Shape = PlanShape;
    const NAME: &'static str = "plan";

    fn describe(shape: &PlanShape) -> String {
        let count = if shape.min_modules == shape.max_modules {
            format!("exactly {}", shape.min_modules)
        } else {
            format!("{} to {}", shape.min_modules, shape.max_modules)
        };
        format!(
            r#"{{"modules": [{{"title": string, "description": one-sentence string, "search_query": string}}]}} with {count} entries in "modules""#
        )
    }

    fn from_value(value: &Value, shape: &PlanShape) -> Result<Self, Vec<Violation>> {
        let mut v = Validator::default();
        let Some(obj) = v.object(value, "$") else {
            return Err(v.finish());
        };
        let Some(modules) = v.array(obj, "", "modules") else {
            return Err(v.finish());
        };

        let min = shape.min_modules.max(1);
        if modules.len() < min || modules.len() > shape.max_modules.max(min) {
            v.push(
                "modules",
                ViolationKind::WrongLength {
                    expected: if min == shape.max_modules {
                        min.to_string()
                    } else {
                        format!("{min}..={}", shape.max_modules)
                    },
                    actual: modules.len(),
                },
            );
        }

        let mut drafts = Vec::with_capacity(modules.len());
        for (i, module) in modules.iter().enumerate() {
            let path = format!("modules[{i}]");
            let Some(m) = v.object(module, &path) else {
                continue;
            };
            let title = v.string(m, &path, "title");
            let description = v.string(m, &path, "description");
            // Missing queries fall back to the title; a present but broken one is reported.
            let search_query = if m.contains_key("search_query") {
                v.string(m, &path, "search_query")
            } else {
                title.clone()
            };
            if let (Some(title), Some(description), Some(search_query)) =
                (title, description, search_query)
            {
                drafts.push(ModuleDraft {
                    title,
                    description,
                    search_query,
                });
            }
        }

        if v.is_clean() {
            Ok(PlanDraft { modules: drafts })
        } else {
            Err(v.finish())
        }
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn wrong_type(expected: &str) -> ViolationKind {
    ViolationKind::WrongType {
        expected: expected.to_string(),
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

#[derive(Default)]
struct Validator {
    violations: Vec<Violation>,
}

impl Validator {
    fn push(&mut self, path: &str, kind: ViolationKind) {
        self.violations.push(Violation::new(path, kind));
    }

    fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    fn finish(self) -> Vec<Violation> {
        self.violations
    }

    fn object<'a>(&mut self, value: &'a Value, path: &str) -> Option<&'a Map<String, Value>> {
        match value.as_object() {
            Some(obj) => Some(obj),
            None => {
                self.push(path, wrong_type("object"));
                None
            }
        }
    }

    fn field<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        path: &str,
        key: &str,
    ) -> Option<&'a Value> {
        match obj.get(key) {
            Some(Value::Null) | None => {
                self.push(&join(path, key), ViolationKind::MissingField);
                None
            }
            Some(value) => Some(value),
        }
    }

    fn string(&mut self, obj: &Map<String, Value>, path: &str, key: &str) -> Option<String> {
        let value = self.field(obj, path, key)?;
        let Some(s) = value.as_str() else {
            self.push(&join(path, key), wrong_type("string"));
            return None;
        };
        let s = s.trim();
        if s.is_empty() {
            self.push(&join(path, key), ViolationKind::Empty);
            return None;
        }
        Some(s.to_string())
    }

    fn array<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        path: &str,
        key: &str,
    ) -> Option<&'a Vec<Value>> {
        let value = self.field(obj, path, key)?;
        match value.as_array() {
            Some(items) => Some(items),
            None => {
                self.push(&join(path, key), wrong_type("array"));
                None
            }
        }
    }

    /// Integers, integral floats and numeric strings are all accepted.
    fn index(&mut self, obj: &Map<String, Value>, path: &str, key: &str, len: usize) -> Option<usize> {
        let value = self.field(obj, path, key)?;
        let raw = match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        let Some(raw) = raw else {
            self.push(&join(path, key), wrong_type("integer"));
            return None;
        };
        let max = len as i64 - 1;
        if raw < 0 || raw > max {
            self.push(
                &join(path, key),
                ViolationKind::OutOfRange {
                    value: raw,
                    min: 0,
                    max,
                },
            );
            return None;
        }
        Some(raw as usize)
    }

    fn quiz_item(&mut self, value: &Value, path: &str, shape: &QuizShape) -> Option<QuizItem> {
        let obj = self.object(value, path)?;
        let question = self.string(obj, path, "question");

        let options = self.array(obj, path, "options").and_then(|raw| {
            let options_path = join(path, "options");
            if raw.len() != shape.options {
                self.push(
                    &options_path,
                    ViolationKind::WrongLength {
                        expected: shape.options.to_string(),
                        actual: raw.len(),
                    },
                );
            }
            let mut seen = HashSet::new();
            let mut options = Vec::with_capacity(raw.len());
            for (i, option) in raw.iter().enumerate() {
                let option_path = format!("{options_path}[{i}]");
                match option.as_str().map(str::trim) {
                    None => self.push(&option_path, wrong_type("string")),
                    Some("") => self.push(&option_path, ViolationKind::Empty),
                    Some(text) => {
                        if !seen.insert(text.to_lowercase()) {
                            self.push(
                                &option_path,
                                ViolationKind::Duplicate {
                                    value: text.to_string(),
                                },
                            );
                        }
                        options.push(text.to_string());
                    }
                }
            }
            (options.len() == raw.len()).then_some(options)
        });

        let correct_index = self.index(obj, path, "correct_index", shape.options);

        let explanation = match obj.get("explanation") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(_) => {
                self.push(&join(path, "explanation"), wrong_type("string"));
                None
            }
        };

        Some(QuizItem {
            question: question?,
            options: options?,
            correct_index: correct_index?,
            explanation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(question: &str, correct: i64) -> Value {
        json!({
            "question": question,
            "options": ["alpha", "beta", "gamma", "delta"],
            "correct_index": correct,
        })
    }

    fn has(violations: &[Violation], path: &str) -> bool {
        violations.iter().any(|v| v.path == path)
    }

    #[test]
    fn topic_is_trimmed_and_non_empty() {
        assert_eq!(Topic::new("  Python basics ").unwrap().as_str(), "Python basics");
        assert_eq!(Topic::new("   ").unwrap_err(), UserInputError::EmptyTopic);
    }

    #[test]
    fn valid_quiz_passes() {
        let value = json!({"items": [item("q1", 0), item("q2", 3), item("q3", 1)]});
        let quiz = Quiz::from_value(&value, &QuizShape::with_items(3)).unwrap();
        assert_eq!(quiz.len(), 3);
        assert_eq!(quiz.items[1].correct_option(), "delta");
    }

    #[test]
    fn bare_array_and_numeric_strings_are_coerced() {
        let value = json!([{
            "question": "q",
            "options": ["a", "b", "c", "d"],
            "correct_index": "2",
            "explanation": "because"
        }]);
        let quiz = Quiz::from_value(&value, &QuizShape::with_items(1)).unwrap();
        assert_eq!(quiz.items[0].correct_index, 2);
        assert_eq!(quiz.items[0].explanation.as_deref(), Some("because"));
    }

    #[test]
    fn wrong_item_count_is_reported() {
        let value = json!({"items": [item("q1", 0)]});
        let errs = Quiz::from_value(&value, &QuizShape::with_items(5)).unwrap_err();
        assert!(matches!(
            errs[0].kind,
            ViolationKind::WrongLength { actual: 1, .. }
        ));
    }

    #[test]
    fn out_of_range_index_and_duplicates_are_reported() {
        let value = json!({"items": [
            item("q1", 4),
            {"question": "q2", "options": ["x", "X", "y", "z"], "correct_index": 0},
        ]});
        let errs = Quiz::from_value(&value, &QuizShape::with_items(2)).unwrap_err();
        assert!(has(&errs, "items[0].correct_index"));
        assert!(has(&errs, "items[1].options[1]"));
    }

    #[test]
    fn repeated_questions_are_rejected() {
        let value = json!({"items": [item("What is a tuple?", 0), item(" what is a TUPLE? ", 1)]});
        let errs = Quiz::from_value(&value, &QuizShape::with_items(2)).unwrap_err();
        assert!(!has(&errs, "items[0].question"));
        assert!(has(&errs, "items[1].question"));
        assert!(matches!(errs[0].kind, ViolationKind::Duplicate { .. }));
    }

    #[test]
    fn previously_asked_questions_are_rejected() {
        let asked = vec!["What is a tuple?".to_string()];
        let shape = QuizShape::with_items(2).excluding(&asked);

        let stale = json!({"items": [item("what is a tuple?", 0), item("What is a list?", 1)]});
        let errs = Quiz::from_value(&stale, &shape).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].path, "items[0].question");

        let fresh = json!({"items": [item("What is a set?", 0), item("What is a list?", 1)]});
        assert!(Quiz::from_value(&fresh, &shape).is_ok());
    }

    #[test]
    fn missing_fields_and_wrong_types_are_all_collected() {
        let value = json!({"items": [{"options": "abcd", "correct_index": true}]});
        let errs = Quiz::from_value(&value, &QuizShape::with_items(1)).unwrap_err();
        assert!(has(&errs, "items[0].question"));
        assert!(has(&errs, "items[0].options"));
        assert!(has(&errs, "items[0].correct_index"));
    }

    #[test]
    fn wrong_option_count_is_reported() {
        let value = json!({"items": [{"question": "q", "options": ["a", "b"], "correct_index": 0}]});
        let errs = Quiz::from_value(&value, &QuizShape::with_items(1)).unwrap_err();
        assert!(has(&errs, "items[0].options"));
    }

    #[test]
    fn evaluation_level_is_case_insensitive() {
        let value = json!({"level": "advanced", "feedback": "Great work"});
        let draft = EvaluationDraft::from_value(&value, &()).unwrap();
        assert_eq!(draft.level, Level::Advanced);
    }

    #[test]
    fn evaluation_rejects_unknown_level() {
        let value = json!({"level": "Expert", "feedback": "ok"});
        let errs = EvaluationDraft::from_value(&value, &()).unwrap_err();
        assert!(matches!(errs[0].kind, ViolationKind::UnknownVariant { .. }));
    }

    #[test]
    fn plan_defaults_missing_query_to_title() {
        let value = json!({"modules": [
            {"title": "Core Intuition", "description": "Why it works."}
        ]});
        let plan = PlanDraft::from_value(&value, &PlanShape::exactly(1)).unwrap();
        assert_eq!(plan.modules[0].search_query, "Core Intuition");
    }

    #[test]
    fn plan_requires_at_least_one_module() {
        let value = json!({"modules": []});
        let shape = PlanShape {
            min_modules: 0,
            max_modules: 5,
        };
        let errs = PlanDraft::from_value(&value, &shape).unwrap_err();
        assert!(has(&errs, "modules"));
    }

    #[test]
    fn grading_checks_answer_sheet() {
        let value = json!({"items": [item("q1", 0), item("q2", 1)]});
        let quiz = Quiz::from_value(&value, &QuizShape::with_items(2)).unwrap();

        assert_eq!(quiz.grade(&[0, 1]).unwrap().correct, 2);
        assert_eq!(quiz.grade(&[0, 2]).unwrap().ratio(), 0.5);
        assert_eq!(
            quiz.grade(&[0]).unwrap_err(),
            UserInputError::AnswerCountMismatch {
                expected: 2,
                got: 1
            }
        );
        assert!(matches!(
            quiz.grade(&[0, 7]).unwrap_err(),
            UserInputError::AnswerOutOfRange { question: 1, .. }
        ));
    }

    #[test]
    fn describe_mentions_cardinality() {
        let text = Quiz::describe(&QuizShape::with_items(5));
        assert!(text.contains("exactly 5"));
        assert!(text.contains("correct_index"));
        assert!(PlanDraft::describe(&PlanShape::exactly(3)).contains("exactly 3"));
    }
}
