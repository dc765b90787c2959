//! Where exercises come from and who scores them.
//!
//! Guests get a [`LocalService`] that generates exercises on the spot and
//! scores them with the shared scoring engine. Signed-in users talk to the
//! REST backend through [`RemoteService`](remote::RemoteService).

pub mod local;
#[cfg(feature = "remote")]
pub mod remote;
pub mod session;
pub mod wire;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::ServiceError;
use crate::exercise::{Difficulty, ExerciseKind, ExerciseSpec, UserAnswer};
use crate::scoring::ValidationResult;

pub use local::LocalService;
#[cfg(feature = "remote")]
pub use remote::RemoteService;
pub use session::{SessionContext, User};

/// Outcome of one answered exercise, reported after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub category: String,
    pub difficulty: Difficulty,
    pub is_correct: bool,
    pub accuracy: f64,
    /// Points earned; the backend calls this `score`.
    #[serde(rename = "score")]
    pub points_earned: u32,
}

impl Submission {
    pub fn new(exercise: &ExerciseSpec, result: &ValidationResult) -> Self {
        Submission {
            category: exercise.kind.category().to_string(),
            difficulty: exercise.difficulty,
            is_correct: result.is_correct,
            accuracy: result.accuracy,
            points_earned: if result.is_correct { exercise.points } else { 0 },
        }
    }
}

/// Running totals of a practice session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreTotals {
    pub score: u32,
    pub question_count: u32,
    pub correct_count: u32,
}

impl ScoreTotals {
    pub fn record(&mut self, is_correct: bool, points: u32) {
        self.question_count += 1;
        if is_correct {
            self.correct_count += 1;
            self.score += points;
        }
    }
}

/// Source of exercises and verdicts.
#[allow(async_fn_in_trait)]
pub trait ExerciseService {
    async fn fetch_exercise(
        &self,
        kind: ExerciseKind,
        difficulty: Difficulty,
    ) -> Result<ExerciseSpec, ServiceError>;

    async fn validate(
        &self,
        exercise: &ExerciseSpec,
        answer: &UserAnswer,
    ) -> Result<ValidationResult, ServiceError>;

    /// Record a finished exercise. Returns updated totals when the service
    /// keeps them.
    async fn submit(&self, submission: &Submission) -> Result<Option<ScoreTotals>, ServiceError>;
}

/// The service matching a session: local for guests, remote otherwise.
#[derive(Debug)]
pub enum AnyService {
    Local(LocalService),
    #[cfg(feature = "remote")]
    Remote(RemoteService),
}

impl AnyService {
    pub fn for_session(session: &SessionContext, config: &Config) -> Result<Self, ServiceError> {
        if session.is_guest() {
            return Ok(AnyService::Local(LocalService::new(config.seed)));
        }
        #[cfg(feature = "remote")]
        {
            Ok(AnyService::Remote(RemoteService::new(config, session)?))
        }
        #[cfg(not(feature = "remote"))]
        {
            tracing::warn!("built without the remote client, practicing locally");
            Ok(AnyService::Local(LocalService::new(config.seed)))
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, AnyService::Local(_))
    }
}

impl ExerciseService for AnyService {
    async fn fetch_exercise(
        &self,
        kind: ExerciseKind,
        difficulty: Difficulty,
    ) -> Result<ExerciseSpec, ServiceError> {
        match self {
            AnyService::Local(s) => s.fetch_exercise(kind, difficulty).await,
            #[cfg(feature = "remote")]
            AnyService::Remote(s) => s.fetch_exercise(kind, difficulty).await,
        }
    }

    async fn validate(
        &self,
        exercise: &ExerciseSpec,
        answer: &UserAnswer,
    ) -> Result<ValidationResult, ServiceError> {
        match self {
            AnyService::Local(s) => s.validate(exercise, answer).await,
            #[cfg(feature = "remote")]
            AnyService::Remote(s) => s.validate(exercise, answer).await,
        }
    }

    async fn submit(&self, submission: &Submission) -> Result<Option<ScoreTotals>, ServiceError> {
        match self {
            AnyService::Local(s) => s.submit(submission).await,
            #[cfg(feature = "remote")]
            AnyService::Remote(s) => s.submit(submission).await,
        }
    }
}
