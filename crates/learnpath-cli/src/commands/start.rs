//! The `learnpath start` command: an interactive tutoring session.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use learnpath_core::error::TutorError;
use learnpath_core::prompt::option_label;
use learnpath_core::schema::{Evaluation, LearningPlan, Quiz, QuizScore};
use learnpath_core::session::{Stage, TutorSession};
use learnpath_providers::config::{build_gateway, load_config_from};

pub async fn execute(
    topic: Option<String>,
    config_path: Option<PathBuf>,
    provider: Option<String>,
    model: Option<String>,
    json: bool,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    config.validate()?;
    let gateway = build_gateway(&config, provider.as_deref(), model.as_deref())?;
    let session = TutorSession::new(gateway, config.session.clone());
    tracing::debug!(session = %session.id(), "session started");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut console = Console::new(stdin.lock(), stdout.lock(), json);
    console.run(session, topic).await
}

enum Next {
    Continue,
    Quit,
}

/// Line-oriented front end over any reader and writer.
///
/// In JSON mode prompts and tables are suppressed and a session snapshot is
/// printed after every successful transition.
pub struct Console<R, W> {
    input: R,
    out: W,
    json: bool,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, out: W, json: bool) -> Self {
        Self { input, out, json }
    }

    pub async fn run(&mut self, mut session: TutorSession, topic: Option<String>) -> Result<()> {
        let mut topic = topic;
        loop {
            let next = match session.stage() {
                Stage::AwaitingTopic => self.topic_step(&mut session, topic.take()).await?,
                Stage::AwaitingAnswers => self.diagnostic_step(&mut session).await?,
                Stage::Evaluated => self.plan_retry_step(&mut session).await?,
                Stage::PlanReady => self.plan_step(&mut session).await?,
                Stage::ModuleQuizActive { .. } => self.module_answer_step(&mut session)?,
                Stage::Done => Next::Quit,
            };
            if let Next::Quit = next {
                session.end();
                self.say("Goodbye.")?;
                return Ok(());
            }
        }
    }

    async fn topic_step(
        &mut self,
        session: &mut TutorSession,
        preset: Option<String>,
    ) -> Result<Next> {
        let line = match preset {
            Some(topic) => topic,
            None => match self.ask("What would you like to learn? ")? {
                Some(line) => line,
                None => return Ok(Next::Quit),
            },
        };
        if line.eq_ignore_ascii_case("quit") {
            return Ok(Next::Quit);
        }

        self.say("Preparing a short diagnostic quiz...")?;
        match session.submit_topic(&line).await.cloned() {
            Ok(quiz) => {
                self.show_quiz("Diagnostic quiz", &quiz)?;
                self.snapshot(session)?;
            }
            Err(e) => self.report(&e)?,
        }
        Ok(Next::Continue)
    }

    async fn diagnostic_step(&mut self, session: &mut TutorSession) -> Result<Next> {
        let Some(line) = self.ask("Your answers, one letter per question (e.g. A C B D A): ")?
        else {
            return Ok(Next::Quit);
        };
        match line.to_ascii_lowercase().as_str() {
            "quit" => return Ok(Next::Quit),
            "new" => {
                session.new_topic()?;
                return Ok(Next::Continue);
            }
            _ => {}
        }
        let answers = match parse_answers(&line) {
            Ok(answers) => answers,
            Err(msg) => {
                self.say(&msg)?;
                return Ok(Next::Continue);
            }
        };

        self.say("Assessing your answers and building a learning plan...")?;
        let result = session.complete_assessment(&answers).await.cloned();
        if let Some(evaluation) = session.state().evaluation.clone() {
            self.show_evaluation(&evaluation)?;
        }
        match result {
            Ok(plan) => {
                self.show_plan(&plan)?;
                self.snapshot(session)?;
            }
            Err(e) => {
                if session.stage() == Stage::Evaluated {
                    self.snapshot(session)?;
                }
                self.report(&e)?;
            }
        }
        Ok(Next::Continue)
    }

    async fn plan_retry_step(&mut self, session: &mut TutorSession) -> Result<Next> {
        let Some(line) = self.ask("Press Enter to retry building your plan, or type 'quit': ")?
        else {
            return Ok(Next::Quit);
        };
        if line.eq_ignore_ascii_case("quit") {
            return Ok(Next::Quit);
        }

        match session.build_plan().await.cloned() {
            Ok(plan) => {
                self.show_plan(&plan)?;
                self.snapshot(session)?;
            }
            Err(e) => self.report(&e)?,
        }
        Ok(Next::Continue)
    }

    async fn plan_step(&mut self, session: &mut TutorSession) -> Result<Next> {
        let Some(line) =
            self.ask("Module number to test yourself, 'plan', 'new' for a new topic, or 'quit': ")?
        else {
            return Ok(Next::Quit);
        };
        match line.to_ascii_lowercase().as_str() {
            "quit" => return Ok(Next::Quit),
            "new" => {
                session.new_topic()?;
                self.snapshot(session)?;
                return Ok(Next::Continue);
            }
            "plan" => {
                if let Some(plan) = session.state().plan.clone() {
                    self.show_plan(&plan)?;
                }
                return Ok(Next::Continue);
            }
            _ => {}
        }

        let Some(index) = line.parse::<usize>().ok().and_then(|n| n.checked_sub(1)) else {
            self.say("Please enter a module number from the plan.")?;
            return Ok(Next::Continue);
        };
        match session.request_module_quiz(index).await.cloned() {
            Ok(quiz) => {
                self.show_quiz(&format!("Module {} check", index + 1), &quiz)?;
                self.snapshot(session)?;
            }
            Err(e) => self.report(&e)?,
        }
        Ok(Next::Continue)
    }

    fn module_answer_step(&mut self, session: &mut TutorSession) -> Result<Next> {
        let Stage::ModuleQuizActive { module } = session.stage() else {
            return Ok(Next::Continue);
        };
        let Some(line) = self.ask("Your answers (or 'skip'): ")? else {
            return Ok(Next::Quit);
        };
        match line.to_ascii_lowercase().as_str() {
            "quit" => return Ok(Next::Quit),
            "skip" => {
                session.cancel_module_quiz()?;
                return Ok(Next::Continue);
            }
            _ => {}
        }
        let answers = match parse_answers(&line) {
            Ok(answers) => answers,
            Err(msg) => {
                self.say(&msg)?;
                return Ok(Next::Continue);
            }
        };

        let quiz = session.state().module_quiz.clone();
        match session.submit_module_answers(&answers) {
            Ok(score) => {
                if let Some(quiz) = quiz {
                    self.show_review(module, &quiz, &answers, score)?;
                }
                self.snapshot(session)?;
            }
            Err(e) => self.report(&e)?,
        }
        Ok(Next::Continue)
    }

    fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        if !self.json {
            write!(self.out, "{prompt}")?;
            self.out.flush()?;
        }
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn say(&mut self, text: &str) -> Result<()> {
        if !self.json {
            writeln!(self.out, "{text}")?;
        }
        Ok(())
    }

    fn report(&mut self, err: &TutorError) -> Result<()> {
        tracing::debug!(error = %err, "step failed");
        if self.json {
            let line = serde_json::json!({ "error": err.user_message() });
            writeln!(self.out, "{line}")?;
        } else {
            writeln!(self.out, "{}", err.user_message())?;
        }
        Ok(())
    }

    fn snapshot(&mut self, session: &TutorSession) -> Result<()> {
        if self.json {
            writeln!(self.out, "{}", serde_json::to_string(&session.snapshot())?)?;
        }
        Ok(())
    }

    fn show_quiz(&mut self, title: &str, quiz: &Quiz) -> Result<()> {
        if self.json {
            return Ok(());
        }
        let mut table = Table::new();
        table.set_header(vec!["#", "Question", "Options"]);
        for (i, item) in quiz.items.iter().enumerate() {
            let options = item
                .options
                .iter()
                .enumerate()
                .map(|(j, option)| format!("{}) {option}", option_label(j)))
                .collect::<Vec<_>>()
                .join("\n");
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(&item.question),
                Cell::new(options),
            ]);
        }
        writeln!(self.out, "\n{title}\n{table}")?;
        Ok(())
    }

    fn show_evaluation(&mut self, evaluation: &Evaluation) -> Result<()> {
        self.say(&format!(
            "\nLevel: {} (score {})\n{}",
            evaluation.level, evaluation.score, evaluation.feedback
        ))
    }

    fn show_plan(&mut self, plan: &LearningPlan) -> Result<()> {
        if self.json {
            return Ok(());
        }
        let mut table = Table::new();
        table.set_header(vec!["#", "Module", "What you'll learn", "Resources"]);
        for (i, module) in plan.modules.iter().enumerate() {
            let resources = if module.resources.is_empty() {
                "no resources found".to_string()
            } else {
                module
                    .resources
                    .iter()
                    .map(|r| format!("{}\n  {}", r.title, r.url))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(&module.title),
                Cell::new(&module.description),
                Cell::new(resources),
            ]);
        }
        writeln!(self.out, "\nYour learning plan\n{table}")?;
        Ok(())
    }

    fn show_review(
        &mut self,
        module: usize,
        quiz: &Quiz,
        answers: &[usize],
        score: QuizScore,
    ) -> Result<()> {
        if self.json {
            return Ok(());
        }
        writeln!(self.out, "\nModule {} score: {score}", module + 1)?;
        for (i, (item, &answer)) in quiz.items.iter().zip(answers).enumerate() {
            let verdict = if item.is_correct(answer) {
                "correct".to_string()
            } else {
                format!("incorrect, answer {}", option_label(item.correct_index))
            };
            match &item.explanation {
                Some(why) => writeln!(self.out, "  {}. {verdict}: {why}", i + 1)?,
                None => writeln!(self.out, "  {}. {verdict}", i + 1)?,
            }
        }
        Ok(())
    }
}

/// Parse answer letters (`A`, `b`, ...) separated by spaces, commas, or nothing.
fn parse_answers(line: &str) -> Result<Vec<usize>, String> {
    line.chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .map(|c| {
            if c.is_ascii_alphabetic() {
                Ok((c.to_ascii_uppercase() as u8 - b'A') as usize)
            } else {
                Err(format!("'{c}' is not an answer letter. Use letters like A, B, C, D."))
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .and_then(|answers| {
            if answers.is_empty() {
                Err("Please enter one letter per question.".to_string())
            } else {
                Ok(answers)
            }
        })
}
