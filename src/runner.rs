//! Exercise runner: one screen's worth of state for any exercise kind.
//!
//! The runner owns the current [`ExerciseSpec`], the learner's draft answer,
//! the verdict once accepted, and a [`PlaybackSession`]. What differs per
//! kind lives in the kind's [`ExerciseProfile`](crate::profile::ExerciseProfile).

use std::sync::Arc;

use crate::error::RunnerError;
use crate::exercise::{Difficulty, ExerciseKind, ExerciseSpec, UserAnswer};
use crate::pitch::{normalize_label, note_to_frequency};
use crate::playback::{AudioSink, PlaybackOutcome, PlaybackPlan, PlaybackSession};
use crate::scoring::ValidationResult;
use crate::service::{ExerciseService, ScoreTotals, Submission};

/// Slider position before the learner touches it.
fn initial_scalar(kind: ExerciseKind) -> f64 {
    match kind {
        ExerciseKind::Equalizing => 1000.0,
        _ => 0.0,
    }
}

/// Answer being edited.
#[derive(Debug, Clone, PartialEq)]
enum Draft {
    Choice(Option<usize>),
    Scalar(f64),
    Notes(Vec<String>),
}

impl Draft {
    fn for_kind(kind: ExerciseKind) -> Self {
        match kind {
            ExerciseKind::Note => Draft::Choice(None),
            ExerciseKind::Panning | ExerciseKind::Volume | ExerciseKind::Equalizing => {
                Draft::Scalar(initial_scalar(kind))
            }
            ExerciseKind::IntervalSequence | ExerciseKind::HarmonyChord => Draft::Notes(Vec::new()),
        }
    }
}

fn wrong_input() -> RunnerError {
    RunnerError::IncompleteAnswer("This exercise takes a different kind of answer.".into())
}

pub struct ExerciseRunner<S: ExerciseService, K: AudioSink + 'static> {
    service: S,
    sink: Arc<K>,
    playback: PlaybackSession,
    kind: ExerciseKind,
    difficulty: Difficulty,
    exercise: Option<ExerciseSpec>,
    draft: Draft,
    verdict: Option<ValidationResult>,
    totals: ScoreTotals,
}

impl<S: ExerciseService, K: AudioSink + 'static> ExerciseRunner<S, K> {
    pub fn new(service: S, sink: Arc<K>, kind: ExerciseKind, difficulty: Difficulty) -> Self {
        let playback = PlaybackSession::new(sink.clone());
        ExerciseRunner {
            service,
            sink,
            playback,
            kind,
            difficulty,
            exercise: None,
            draft: Draft::for_kind(kind),
            verdict: None,
            totals: ScoreTotals::default(),
        }
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn kind(&self) -> ExerciseKind {
        self.kind
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn exercise(&self) -> Option<&ExerciseSpec> {
        self.exercise.as_ref()
    }

    /// Verdict of the current exercise once accepted.
    pub fn verdict(&self) -> Option<&ValidationResult> {
        self.verdict.as_ref()
    }

    pub fn is_answered(&self) -> bool {
        self.verdict.is_some()
    }

    pub fn totals(&self) -> ScoreTotals {
        self.totals
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn sink(&self) -> &Arc<K> {
        &self.sink
    }

    pub fn playback(&self) -> &PlaybackSession {
        &self.playback
    }

    /// Status line for the playback state.
    pub fn status_text(&self) -> String {
        self.kind.profile().status_text(&self.playback.status())
    }

    pub fn selected_index(&self) -> Option<usize> {
        match self.draft {
            Draft::Choice(i) => i,
            _ => None,
        }
    }

    pub fn scalar(&self) -> Option<f64> {
        match self.draft {
            Draft::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn selected_notes(&self) -> &[String] {
        match &self.draft {
            Draft::Notes(notes) => notes,
            _ => &[],
        }
    }

    // ── Loading ────────────────────────────────────────────────────────

    /// Fetch a new exercise. On failure the previous state is left as it was.
    pub async fn load(&mut self, kind: ExerciseKind, difficulty: Difficulty) -> Result<&ExerciseSpec, RunnerError> {
        self.playback.stop_all();
        let spec = self
            .service
            .fetch_exercise(kind, difficulty)
            .await
            .map_err(|e| {
                tracing::warn!(%kind, %difficulty, error = %e, "failed to load exercise");
                RunnerError::LoadFailed(e)
            })?;
        tracing::debug!(id = %spec.id, %kind, %difficulty, "exercise loaded");

        self.kind = kind;
        self.difficulty = difficulty;
        self.draft = Draft::for_kind(kind);
        self.verdict = None;
        Ok(self.exercise.insert(spec))
    }

    /// Another exercise of the same kind and difficulty.
    pub async fn next(&mut self) -> Result<&ExerciseSpec, RunnerError> {
        self.load(self.kind, self.difficulty).await
    }

    // ── Listening ──────────────────────────────────────────────────────

    /// Play the exercise. Audio failures degrade to silence.
    pub async fn listen(&self) -> Result<PlaybackOutcome, RunnerError> {
        let spec = self.exercise.as_ref().ok_or(RunnerError::NoExercise)?;
        let plan = spec.kind.profile().plan(spec);
        Ok(self.play(plan.map_err(|e| e.to_string())).await)
    }

    /// Play what the right answer sounds like. Only after answering.
    pub async fn replay_correct_answer(&self) -> Result<PlaybackOutcome, RunnerError> {
        let spec = self.exercise.as_ref().ok_or(RunnerError::NoExercise)?;
        if !self.is_answered() {
            return Err(RunnerError::IncompleteAnswer(
                "Answer the exercise before hearing the solution.".into(),
            ));
        }
        let plan = spec.kind.profile().answer_plan(spec);
        Ok(self.play(plan.map_err(|e| e.to_string())).await)
    }

    async fn play(&self, plan: Result<PlaybackPlan, String>) -> PlaybackOutcome {
        let result = match plan {
            Ok(plan) => self.playback.play(&plan).await.map_err(|e| e.to_string()),
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|error| {
            tracing::warn!(%error, "playback failed");
            PlaybackOutcome::Unavailable
        })
    }

    /// Short tone for a tapped key.
    pub fn preview_key(&self, label: &str) -> Result<PlaybackOutcome, RunnerError> {
        let frequency = self.key_frequency(label)?;
        Ok(self.playback.preview_key(frequency).unwrap_or_else(|error| {
            tracing::warn!(%error, label, "key preview failed");
            PlaybackOutcome::Unavailable
        }))
    }

    pub fn stop_all(&self) {
        self.playback.stop_all();
    }

    fn key_frequency(&self, label: &str) -> Result<f64, RunnerError> {
        self.exercise
            .as_ref()
            .and_then(|spec| spec.key_frequency(label))
            .or_else(|| note_to_frequency(label))
            .ok_or_else(|| RunnerError::UnknownNote(label.to_string()))
    }

    // ── Answer Editing ─────────────────────────────────────────────────

    fn editable(&mut self) -> Result<&mut Draft, RunnerError> {
        if self.exercise.is_none() {
            return Err(RunnerError::NoExercise);
        }
        if self.verdict.is_some() {
            return Err(RunnerError::AlreadyAnswered);
        }
        Ok(&mut self.draft)
    }

    pub fn select_index(&mut self, index: usize) -> Result<(), RunnerError> {
        let options = self.exercise.as_ref().map_or(0, |s| s.note_options().len());
        match self.editable()? {
            Draft::Choice(choice) => {
                if index >= options {
                    return Err(RunnerError::IncompleteAnswer(format!(
                        "Pick one of the {options} options."
                    )));
                }
                *choice = Some(index);
                Ok(())
            }
            _ => Err(wrong_input()),
        }
    }

    /// Move the slider. Pan positions are clamped to [-1, 1].
    pub fn set_scalar(&mut self, value: f64) -> Result<(), RunnerError> {
        let kind = self.kind;
        match self.editable()? {
            Draft::Scalar(v) => {
                if !value.is_finite() {
                    return Err(RunnerError::IncompleteAnswer("Enter a number.".into()));
                }
                *v = if kind == ExerciseKind::Panning {
                    value.clamp(-1.0, 1.0)
                } else {
                    value
                };
                Ok(())
            }
            _ => Err(wrong_input()),
        }
    }

    /// Select or deselect a chord note. Returns whether it is now selected.
    pub fn toggle_note(&mut self, label: &str) -> Result<bool, RunnerError> {
        if self.kind != ExerciseKind::HarmonyChord {
            return Err(wrong_input());
        }
        self.key_frequency(label)?;
        let label = normalize_label(label);
        let selected = match self.editable()? {
            Draft::Notes(notes) => match notes.iter().position(|n| *n == label) {
                Some(i) => {
                    notes.remove(i);
                    false
                }
                None => {
                    notes.push(label.clone());
                    true
                }
            },
            _ => return Err(wrong_input()),
        };
        self.preview_key(&label)?;
        Ok(selected)
    }

    /// Append a note to the sequence. Returns `false` when the sequence is
    /// already as long as the exercise's.
    pub fn push_note(&mut self, label: &str) -> Result<bool, RunnerError> {
        if self.kind != ExerciseKind::IntervalSequence {
            return Err(wrong_input());
        }
        self.key_frequency(label)?;
        let label = normalize_label(label);
        let wanted = self.expected_notes();
        match self.editable()? {
            Draft::Notes(notes) if notes.len() >= wanted => return Ok(false),
            Draft::Notes(notes) => notes.push(label.clone()),
            _ => return Err(wrong_input()),
        }
        self.preview_key(&label)?;
        Ok(true)
    }

    pub fn clear_selection(&mut self) -> Result<(), RunnerError> {
        let reset = initial_scalar(self.kind);
        match self.editable()? {
            Draft::Notes(notes) => notes.clear(),
            Draft::Choice(choice) => *choice = None,
            Draft::Scalar(v) => *v = reset,
        }
        Ok(())
    }

    fn expected_notes(&self) -> usize {
        self.exercise
            .as_ref()
            .and_then(|s| s.correct_answer.notes())
            .map_or(0, <[String]>::len)
    }

    fn answer(&self) -> Result<UserAnswer, RunnerError> {
        match &self.draft {
            Draft::Choice(Some(i)) => Ok(UserAnswer::Index(*i)),
            Draft::Choice(None) => Err(RunnerError::IncompleteAnswer("Pick a note first.".into())),
            Draft::Scalar(v) => Ok(UserAnswer::Scalar(*v)),
            Draft::Notes(notes) if notes.is_empty() => {
                Err(RunnerError::IncompleteAnswer("Select at least one note.".into()))
            }
            Draft::Notes(notes) => {
                let wanted = self.expected_notes();
                if self.kind == ExerciseKind::IntervalSequence && notes.len() != wanted {
                    return Err(RunnerError::IncompleteAnswer(format!(
                        "Enter all {wanted} notes of the sequence."
                    )));
                }
                Ok(UserAnswer::Notes(notes.clone()))
            }
        }
    }

    // ── Submitting ─────────────────────────────────────────────────────

    /// Validate the draft. On failure the draft stays for a retry.
    pub async fn submit(&mut self) -> Result<&ValidationResult, RunnerError> {
        let spec = self.exercise.as_ref().ok_or(RunnerError::NoExercise)?;
        if self.verdict.is_some() {
            return Err(RunnerError::AlreadyAnswered);
        }
        let answer = self.answer()?;

        let result = self.service.validate(spec, &answer).await.map_err(|e| {
            tracing::warn!(id = %spec.id, error = %e, "validation failed");
            RunnerError::ValidationFailed(e)
        })?;
        tracing::info!(
            id = %spec.id,
            kind = %spec.kind,
            correct = result.is_correct,
            accuracy = result.accuracy,
            "answer validated"
        );

        self.totals.record(result.is_correct, spec.points);
        let submission = Submission::new(spec, &result);
        match self.service.submit(&submission).await {
            Ok(Some(service_totals)) => tracing::debug!(?service_totals, "submission recorded"),
            Ok(None) => tracing::debug!("submission recorded"),
            Err(error) => tracing::warn!(%error, "could not record submission"),
        }

        Ok(self.verdict.insert(result))
    }
}

impl<S: ExerciseService, K: AudioSink + 'static> Drop for ExerciseRunner<S, K> {
    fn drop(&mut self) {
        self.playback.stop_all();
    }
}

impl<S: ExerciseService, K: AudioSink + 'static> std::fmt::Debug for ExerciseRunner<S, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExerciseRunner")
            .field("kind", &self.kind)
            .field("difficulty", &self.difficulty)
            .field("exercise", &self.exercise.as_ref().map(|s| &s.id))
            .field("draft", &self.draft)
            .field("answered", &self.is_answered())
            .field("totals", &self.totals)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::error::ServiceError;
    use crate::exercise::CorrectAnswer;
    use crate::playback::{CaptureSink, PlaybackStatus};
    use crate::service::LocalService;

    const SR: u32 = 8000;

    /// Local service whose calls can be made to fail.
    #[derive(Debug)]
    struct Flaky {
        inner: LocalService,
        fail_fetch: AtomicBool,
        fail_validate: AtomicBool,
        fail_submit: AtomicBool,
    }

    impl Flaky {
        fn new() -> Self {
            Flaky {
                inner: LocalService::new(Some(11)),
                fail_fetch: AtomicBool::new(false),
                fail_validate: AtomicBool::new(false),
                fail_submit: AtomicBool::new(false),
            }
        }

        fn outage() -> ServiceError {
            ServiceError::Status {
                status: 503,
                message: "down".into(),
            }
        }
    }

    impl ExerciseService for Flaky {
        async fn fetch_exercise(
            &self,
            kind: ExerciseKind,
            difficulty: Difficulty,
        ) -> Result<ExerciseSpec, ServiceError> {
            if self.fail_fetch.load(Ordering::SeqCst) {
                return Err(Self::outage());
            }
            self.inner.fetch_exercise(kind, difficulty).await
        }

        async fn validate(
            &self,
            exercise: &ExerciseSpec,
            answer: &UserAnswer,
        ) -> Result<ValidationResult, ServiceError> {
            if self.fail_validate.load(Ordering::SeqCst) {
                return Err(Self::outage());
            }
            self.inner.validate(exercise, answer).await
        }

        async fn submit(&self, submission: &Submission) -> Result<Option<ScoreTotals>, ServiceError> {
            if self.fail_submit.load(Ordering::SeqCst) {
                return Err(Self::outage());
            }
            self.inner.submit(submission).await
        }
    }

    async fn runner(kind: ExerciseKind) -> ExerciseRunner<Flaky, CaptureSink> {
        let mut runner = ExerciseRunner::new(Flaky::new(), Arc::new(CaptureSink::new(SR)), kind, Difficulty::Easy);
        runner.load(kind, Difficulty::Easy).await.unwrap();
        runner
    }

    fn correct_scalar(runner: &ExerciseRunner<Flaky, CaptureSink>) -> f64 {
        runner.exercise().unwrap().correct_answer.scalar().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn listening_plays_both_volume_notes() {
        let runner = runner(ExerciseKind::Volume).await;
        assert_eq!(runner.status_text(), "Click Play to hear both notes");

        let outcome = runner.listen().await.unwrap();
        assert_eq!(outcome, PlaybackOutcome::Completed);
        assert_eq!(runner.sink().voices().len(), 2);
        assert_eq!(runner.playback().status(), PlaybackStatus::Finished);
        assert_eq!(runner.status_text(), "Finished - Make your guess!");
    }

    #[tokio::test]
    async fn correct_answer_scores_once() {
        let mut runner = runner(ExerciseKind::Panning).await;
        assert_eq!(runner.scalar(), Some(0.0));
        let answer = correct_scalar(&runner);
        runner.set_scalar(answer).unwrap();

        let verdict = runner.submit().await.unwrap();
        assert!(verdict.is_correct);
        assert!(!verdict.message.is_empty());
        let points = runner.exercise().unwrap().points;
        assert_eq!(
            runner.totals(),
            ScoreTotals {
                score: points,
                question_count: 1,
                correct_count: 1
            }
        );
        assert_eq!(runner.service().inner.totals().question_count, 1);

        assert!(matches!(runner.submit().await, Err(RunnerError::AlreadyAnswered)));
        assert!(matches!(runner.set_scalar(0.0), Err(RunnerError::AlreadyAnswered)));
        assert_eq!(runner.totals().question_count, 1);
    }

    #[tokio::test]
    async fn failed_validation_keeps_the_draft() {
        let mut runner = runner(ExerciseKind::Equalizing).await;
        assert_eq!(runner.scalar(), Some(1000.0));
        runner.set_scalar(1500.0).unwrap();
        runner.service().fail_validate.store(true, Ordering::SeqCst);

        let err = runner.submit().await.unwrap_err();
        assert_eq!(err.to_string(), "Error validating answer. Please try again.");
        assert!(!runner.is_answered());
        assert_eq!(runner.scalar(), Some(1500.0));
        assert_eq!(runner.totals().question_count, 0);

        runner.service().fail_validate.store(false, Ordering::SeqCst);
        runner.submit().await.unwrap();
        assert_eq!(runner.totals().question_count, 1);
    }

    #[tokio::test]
    async fn failed_submission_is_not_an_error() {
        let mut runner = runner(ExerciseKind::Volume).await;
        runner.service().fail_submit.store(true, Ordering::SeqCst);
        let answer = correct_scalar(&runner);
        runner.set_scalar(answer).unwrap();
        assert!(runner.submit().await.unwrap().is_correct);
        assert_eq!(runner.totals().correct_count, 1);
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_exercise() {
        let mut runner = runner(ExerciseKind::Note).await;
        let id = runner.exercise().unwrap().id.clone();
        runner.service().fail_fetch.store(true, Ordering::SeqCst);

        let err = runner.next().await.unwrap_err();
        assert!(matches!(err, RunnerError::LoadFailed(_)));
        assert_eq!(err.to_string(), "Failed to load exercise. Please try again.");
        assert_eq!(runner.exercise().unwrap().id, id);

        runner.service().fail_fetch.store(false, Ordering::SeqCst);
        let next = runner.next().await.unwrap().id.clone();
        assert_ne!(next, id);
    }

    #[tokio::test]
    async fn nothing_works_before_loading() {
        let mut runner = ExerciseRunner::new(
            Flaky::new(),
            Arc::new(CaptureSink::new(SR)),
            ExerciseKind::Note,
            Difficulty::Easy,
        );
        assert!(matches!(runner.listen().await, Err(RunnerError::NoExercise)));
        assert!(matches!(runner.select_index(0), Err(RunnerError::NoExercise)));
        assert!(matches!(runner.submit().await, Err(RunnerError::NoExercise)));
    }

    #[tokio::test]
    async fn note_choice_needs_a_valid_selection() {
        let mut runner = runner(ExerciseKind::Note).await;
        assert!(matches!(runner.submit().await, Err(RunnerError::IncompleteAnswer(_))));
        assert!(runner.select_index(99).is_err());
        assert!(matches!(runner.set_scalar(1.0), Err(RunnerError::IncompleteAnswer(_))));

        let correct = match &runner.exercise().unwrap().correct_answer {
            CorrectAnswer::NoteChoice { index, .. } => *index,
            other => panic!("unexpected answer {other:?}"),
        };
        runner.select_index(correct).unwrap();
        assert_eq!(runner.selected_index(), Some(correct));
        assert!(runner.submit().await.unwrap().is_correct);
    }

    #[tokio::test(start_paused = true)]
    async fn sequence_entry_stops_at_its_length() {
        let mut runner = runner(ExerciseKind::IntervalSequence).await;
        let correct: Vec<String> = runner.exercise().unwrap().correct_answer.notes().unwrap().to_vec();
        assert_eq!(correct.len(), 2);

        runner.push_note(&correct[0]).unwrap();
        assert!(matches!(runner.submit().await, Err(RunnerError::IncompleteAnswer(_))));
        runner.clear_selection().unwrap();
        assert!(runner.selected_notes().is_empty());

        for note in &correct {
            assert!(runner.push_note(note).unwrap());
        }
        assert!(!runner.push_note(&correct[0]).unwrap());
        assert_eq!(runner.selected_notes(), correct.as_slice());
        assert!(matches!(runner.toggle_note("C4"), Err(RunnerError::IncompleteAnswer(_))));
        assert!(matches!(runner.push_note("H9"), Err(RunnerError::UnknownNote(_))));

        assert!(runner.submit().await.unwrap().is_correct);
        let outcome = runner.replay_correct_answer().await.unwrap();
        assert_eq!(outcome, PlaybackOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn chord_notes_toggle() {
        let mut runner = runner(ExerciseKind::HarmonyChord).await;
        assert!(runner.replay_correct_answer().await.is_err());

        assert!(runner.toggle_note("Db4").unwrap());
        assert_eq!(runner.selected_notes(), ["C#4".to_string()]);
        assert!(!runner.toggle_note("C#4").unwrap());
        assert!(runner.selected_notes().is_empty());
        assert_eq!(runner.sink().voices().len(), 2);

        let correct: Vec<String> = runner.exercise().unwrap().correct_answer.notes().unwrap().to_vec();
        for note in correct.iter().rev() {
            runner.toggle_note(note).unwrap();
        }
        assert!(runner.submit().await.unwrap().is_correct);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_runner_silences_it() {
        let runner = runner(ExerciseKind::Note).await;
        let sink = runner.sink().clone();
        assert_eq!(runner.preview_key("A4").unwrap(), PlaybackOutcome::Completed);
        assert_eq!(sink.audible_count(), 1);
        drop(runner);
        assert_eq!(sink.audible_count(), 0);
    }
}
