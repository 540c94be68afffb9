//! The per-learner workflow state machine.
//!
//! ```text
//! AwaitingTopic -> AwaitingAnswers -> Evaluated -> PlanReady <-> ModuleQuizActive
//!                                                      |
//!                                   any (except Done) -+-> Done
//! ```
//!
//! Every transition is all-or-nothing: new values are computed first and
//! committed only once every call has succeeded, so a failed action leaves
//! the session exactly as it was and can simply be repeated.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::{TutorError, UserInputError};
use crate::gateway::ModelGateway;
use crate::prompt;
use crate::response::ResponseParser;
use crate::schema::{
    Evaluation, EvaluationDraft, LearningPlan, PlanDraft, PlanModule, PlanShape, Quiz, QuizScore,
    QuizShape, Topic,
};

/// Where a session is in the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    AwaitingTopic,
    AwaitingAnswers,
    Evaluated,
    PlanReady,
    ModuleQuizActive { module: usize },
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::AwaitingTopic => write!(f, "awaiting a topic"),
            Stage::AwaitingAnswers => write!(f, "awaiting quiz answers"),
            Stage::Evaluated => write!(f, "evaluated"),
            Stage::PlanReady => write!(f, "plan ready"),
            Stage::ModuleQuizActive { module } => write!(f, "quizzing module {}", module + 1),
            Stage::Done => write!(f, "done"),
        }
    }
}

/// Everything a session has accumulated so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub topic: Option<Topic>,
    pub quiz: Option<Quiz>,
    pub answers: Option<Vec<usize>>,
    pub evaluation: Option<Evaluation>,
    pub plan: Option<LearningPlan>,
    /// The module quiz currently being answered.
    pub module_quiz: Option<Quiz>,
    /// Questions already issued per module index.
    pub asked: BTreeMap<usize, Vec<String>>,
    /// Latest score per module index.
    pub module_scores: BTreeMap<usize, QuizScore>,
}

/// Serializable view of a session for front ends.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot<'a> {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub stage: Stage,
    pub state: &'a SessionState,
}

/// One learner's session.
#[derive(Debug)]
pub struct TutorSession {
    id: Uuid,
    created_at: DateTime<Utc>,
    stage: Stage,
    state: SessionState,
    gateway: ModelGateway,
    parser: ResponseParser,
    config: SessionConfig,
}

impl TutorSession {
    pub fn new(gateway: ModelGateway, config: SessionConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            stage: Stage::AwaitingTopic,
            state: SessionState::default(),
            gateway,
            parser: ResponseParser::new(config.max_retries),
            config,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn snapshot(&self) -> SessionSnapshot<'_> {
        SessionSnapshot {
            id: self.id,
            created_at: self.created_at,
            stage: self.stage,
            state: &self.state,
        }
    }

    fn require(&self, action: &'static str, expected: Stage) -> Result<(), UserInputError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(self.wrong_stage(action))
        }
    }

    fn wrong_stage(&self, action: &'static str) -> UserInputError {
        UserInputError::WrongStage {
            action,
            stage: self.stage,
        }
    }

    /// `AwaitingTopic -> AwaitingAnswers`: generate the diagnostic quiz.
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn submit_topic(&mut self, topic: &str) -> Result<&Quiz, TutorError> {
        self.require("submit a topic", Stage::AwaitingTopic)?;
        let topic = Topic::new(topic)?;

        let shape = QuizShape::with_items(self.config.diagnostic_items);
        let instruction = prompt::diagnostic_quiz(&topic, &shape);
        let quiz: Quiz = self
            .parser
            .request(&self.gateway, &instruction, &shape)
            .await?;

        tracing::info!(topic = %topic, items = quiz.len(), "diagnostic quiz ready");
        self.state.topic = Some(topic);
        self.stage = Stage::AwaitingAnswers;
        Ok(self.state.quiz.insert(quiz))
    }

    /// `AwaitingAnswers -> Evaluated`: grade and assess the diagnostic quiz.
    ///
    /// `answers[i]` is the chosen option index for question `i`.
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn submit_answers(&mut self, answers: &[usize]) -> Result<&Evaluation, TutorError> {
        self.require("submit answers", Stage::AwaitingAnswers)?;
        let (Some(topic), Some(quiz)) = (&self.state.topic, &self.state.quiz) else {
            return Err(self.wrong_stage("submit answers").into());
        };

        let score = quiz.grade(answers)?;
        let instruction = prompt::evaluate(topic, quiz, answers)?;
        let draft: EvaluationDraft = self
            .parser
            .request(&self.gateway, &instruction, &())
            .await?;

        let level = self.config.level_policy.resolve(draft.level, score);
        tracing::info!(%score, model_level = %draft.level, %level, "diagnostic evaluated");

        self.state.answers = Some(answers.to_vec());
        self.stage = Stage::Evaluated;
        Ok(self.state.evaluation.insert(Evaluation {
            level,
            feedback: draft.feedback,
            score,
        }))
    }

    /// `Evaluated -> PlanReady`: build the plan and attach search resources.
    ///
    /// A failed search leaves that module without resources; it never fails
    /// the transition.
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn build_plan(&mut self) -> Result<&LearningPlan, TutorError> {
        self.require("build a plan", Stage::Evaluated)?;
        let (Some(topic), Some(evaluation)) = (&self.state.topic, &self.state.evaluation) else {
            return Err(self.wrong_stage("build a plan").into());
        };

        let shape = PlanShape::exactly(self.config.plan_modules);
        let instruction = prompt::build_plan(topic, evaluation.level, &shape);
        let draft: PlanDraft = self
            .parser
            .request(&self.gateway, &instruction, &shape)
            .await?;

        let mut modules = Vec::with_capacity(draft.modules.len());
        for module in draft.modules {
            let mut module = PlanModule::from(module);
            match self.gateway.search(&module.search_query).await {
                Ok(resources) => module.resources = resources,
                Err(e) => {
                    tracing::warn!(module = %module.title, "search failed, no resources: {e}");
                }
            }
            modules.push(module);
        }

        tracing::info!(modules = modules.len(), "learning plan ready");
        self.stage = Stage::PlanReady;
        Ok(self.state.plan.insert(LearningPlan { modules }))
    }

    /// Submit the diagnostic answers and take the automatic edge to `PlanReady`.
    ///
    /// If plan building fails the session stays `Evaluated`; call
    /// [`TutorSession::build_plan`] to retry.
    pub async fn complete_assessment(
        &mut self,
        answers: &[usize],
    ) -> Result<&LearningPlan, TutorError> {
        self.submit_answers(answers).await?;
        self.build_plan().await
    }

    /// `PlanReady -> ModuleQuizActive`: generate a fresh quiz for one module.
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn request_module_quiz(&mut self, module: usize) -> Result<&Quiz, TutorError> {
        self.require("start a module quiz", Stage::PlanReady)?;
        let (Some(topic), Some(evaluation), Some(plan)) = (
            &self.state.topic,
            &self.state.evaluation,
            &self.state.plan,
        ) else {
            return Err(self.wrong_stage("start a module quiz").into());
        };
        let plan_module = plan.module(module)?;

        let asked = self
            .state
            .asked
            .get(&module)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let shape = QuizShape::with_items(self.config.module_quiz_items).excluding(asked);
        let instruction = prompt::module_quiz(topic, plan_module, evaluation.level, &shape, asked);
        let quiz: Quiz = self
            .parser
            .request(&self.gateway, &instruction, &shape)
            .await?;

        tracing::info!(module, items = quiz.len(), "module quiz ready");
        self.state
            .asked
            .entry(module)
            .or_default()
            .extend(quiz.items.iter().map(|item| item.question.clone()));
        self.stage = Stage::ModuleQuizActive { module };
        Ok(self.state.module_quiz.insert(quiz))
    }

    /// `ModuleQuizActive -> PlanReady`: grade and record the module score.
    #[instrument(skip(self), fields(session = %self.id))]
    pub fn submit_module_answers(&mut self, answers: &[usize]) -> Result<QuizScore, TutorError> {
        let Stage::ModuleQuizActive { module } = self.stage else {
            return Err(self.wrong_stage("submit module answers").into());
        };
        let Some(quiz) = &self.state.module_quiz else {
            return Err(self.wrong_stage("submit module answers").into());
        };

        let score = quiz.grade(answers)?;
        tracing::info!(module, %score, "module quiz graded");
        self.state.module_scores.insert(module, score);
        self.state.module_quiz = None;
        self.stage = Stage::PlanReady;
        Ok(score)
    }

    /// Leave an active module quiz without scoring it.
    pub fn cancel_module_quiz(&mut self) -> Result<(), TutorError> {
        if !matches!(self.stage, Stage::ModuleQuizActive { .. }) {
            return Err(self.wrong_stage("cancel a module quiz").into());
        }
        self.state.module_quiz = None;
        self.stage = Stage::PlanReady;
        Ok(())
    }

    /// Throw away everything and start over with a new topic.
    pub fn new_topic(&mut self) -> Result<(), TutorError> {
        if self.stage == Stage::Done {
            return Err(self.wrong_stage("start a new topic").into());
        }
        tracing::info!(session = %self.id, "starting over");
        self.state = SessionState::default();
        self.stage = Stage::AwaitingTopic;
        Ok(())
    }

    /// End the session. Its state is discarded.
    pub fn end(&mut self) {
        if self.stage != Stage::Done {
            tracing::info!(session = %self.id, "session ended");
        }
        self.state = SessionState::default();
        self.stage = Stage::Done;
    }
}
