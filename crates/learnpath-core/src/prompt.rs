//! Prompt builders for every workflow stage.
//!
//! All functions are pure. Each prompt ends with the exact JSON layout from
//! the matching [`Contract`], so a well-behaved model answer is parseable.

use std::fmt::Write as _;

use crate::error::UserInputError;
use crate::schema::{
    Contract, EvaluationDraft, Level, PlanDraft, PlanModule, PlanShape, Quiz, QuizShape, Topic,
    Violation,
};

/// System prompt sent with every request.
pub const TUTOR_SYSTEM_PROMPT: &str = "You are a friendly, expert AI tutor. You write accurate, \
unambiguous learning material. Respond ONLY with a single JSON document matching the requested \
layout. Do not include explanations or markdown outside the JSON.";

/// Letter label for an option index (0 -> 'A').
pub fn option_label(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

fn json_instruction(out: &mut String, schema: &str) {
    let _ = write!(
        out,
        "\n\nRespond with JSON only, using exactly this layout:\n{schema}"
    );
}

/// Diagnostic quiz for a fresh topic, questions ranging from easy to hard.
pub fn diagnostic_quiz(topic: &Topic, shape: &QuizShape) -> String {
    let mut prompt = format!(
        "Generate a {}-question multiple-choice diagnostic quiz for the topic '{topic}'. \
         Order the questions from easy to hard so the answers reveal the learner's prior \
         knowledge. Each question has {} options and exactly one correct answer.",
        shape.items, shape.options
    );
    json_instruction(&mut prompt, &Quiz::describe(shape));
    prompt
}

/// Ask the model to assess a submitted diagnostic quiz.
///
/// Fails if `answers` does not line up with `quiz`.
pub fn evaluate(topic: &Topic, quiz: &Quiz, answers: &[usize]) -> Result<String, UserInputError> {
    quiz.check_answers(answers)?;

    let mut prompt = format!(
        "Evaluate a learner's answers to a diagnostic quiz on '{topic}'.\n\nQuiz and answers:\n"
    );
    for (i, (item, &answer)) in quiz.items.iter().zip(answers).enumerate() {
        let _ = writeln!(prompt, "{}. {}", i + 1, item.question);
        for (j, option) in item.options.iter().enumerate() {
            let _ = writeln!(prompt, "   {}) {option}", option_label(j));
        }
        let verdict = if item.is_correct(answer) {
            "correct"
        } else {
            "incorrect"
        };
        let _ = writeln!(
            prompt,
            "   Learner answered {} ({verdict}; correct is {}).",
            option_label(answer),
            option_label(item.correct_index)
        );
    }
    prompt.push_str(
        "\nGive brief, constructive feedback that names the concepts the learner has and has \
         not mastered. Then determine the overall knowledge level as exactly one of: \
         Beginner, Intermediate, Advanced.",
    );
    json_instruction(&mut prompt, &EvaluationDraft::describe(&()));
    Ok(prompt)
}

/// Ask for a step-by-step learning plan tailored to `level`.
pub fn build_plan(topic: &Topic, level: Level, shape: &PlanShape) -> String {
    let count = if shape.min_modules == shape.max_modules {
        shape.min_modules.to_string()
    } else {
        format!("{} to {}", shape.min_modules, shape.max_modules)
    };
    let mut prompt = format!(
        "Design a personalized, step-by-step learning plan.\nTopic: {topic}\n\
         Learner's assessed level: {level}\n\n\
         Create {count} concise modules. For each module give a clear title, a one-sentence \
         description of the key concepts, and a simple, effective web search query for \
         finding learning resources on it."
    );
    json_instruction(&mut prompt, &PlanDraft::describe(shape));
    prompt
}

/// Check-your-understanding quiz for one plan module.
///
/// `asked` lists questions already used for this module; the model is told
/// not to repeat them.
pub fn module_quiz(
    topic: &Topic,
    module: &PlanModule,
    level: Level,
    shape: &QuizShape,
    asked: &[String],
) -> String {
    let mut prompt = format!(
        "Write a {}-question multiple-choice quiz that checks understanding of one module of \
         a learning plan on '{topic}' for a {level} learner.\n\
         Module: {}\nDescription: {}\n\
         Each question has {} options and exactly one correct answer. Include a one-sentence \
         explanation of the correct answer.",
        shape.items, module.title, module.description, shape.options
    );
    if !asked.is_empty() {
        prompt.push_str("\n\nDo not reuse any of these earlier questions:\n");
        for question in asked {
            let _ = writeln!(prompt, "- {question}");
        }
    }
    json_instruction(&mut prompt, &Quiz::describe(shape));
    prompt
}

/// Re-issue `original` after a malformed answer.
pub fn corrective(original: &str, violations: &[Violation], schema: &str) -> String {
    let mut prompt = String::from(original);
    prompt.push_str("\n\nYour previous attempt was malformed:\n");
    for violation in violations {
        let _ = writeln!(prompt, "- {violation}");
    }
    let _ = write!(
        prompt,
        "Reformat strictly as {schema}\nReturn the JSON document and nothing else."
    );
    prompt
}
