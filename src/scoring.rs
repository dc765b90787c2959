//! Correctness verdicts and accuracy for every exercise kind.
//!
//! Everything here is pure. Guest mode scores with these functions directly
//! and the remote client uses them to cross-check server verdicts, so a
//! learner gets the same verdict whichever path scored the answer.
//!
//! | rule | kinds | correct when | accuracy |
//! |---|---|---|---|
//! | scalar tolerance | panning, volume, equalizing | `|u - c| <= tol` | `(1 - |u - c| / 2tol) * 100`, clamped |
//! | exact index | note | `u == c` | 100 or 0 |
//! | ordered sequence | intervals | every position matches | matching positions / total |
//! | unordered set | harmonies | same set, no extras | matched / total |

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::InvalidExerciseSpec;
use crate::exercise::{CorrectAnswer, ExerciseKind, UserAnswer};
use crate::pitch::normalize_label;

/// Largest accuracy difference at which two results still agree.
pub const ACCURACY_EPSILON: f64 = 1e-6;

/// How a user answer is compared with the correct one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComparisonRule {
    ScalarTolerance,
    ExactIndex,
    OrderedSequence,
    UnorderedSet,
}

/// Verdict for one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_correct: bool,
    /// Closeness in [0, 100].
    pub accuracy: f64,
    /// Learner-facing explanation, filled in by the exercise profile.
    #[serde(default)]
    pub message: String,
    pub detail: ValidationDetail,
}

/// Kind-specific explanation of a verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ValidationDetail {
    Scalar {
        user_value: f64,
        correct_value: f64,
        difference: f64,
        tolerance: f64,
        acceptance_min: f64,
        acceptance_max: f64,
    },
    Index {
        selected_index: usize,
        correct_index: usize,
    },
    Sequence {
        correct_count: usize,
        total_notes: usize,
        user_sequence: Vec<String>,
        correct_sequence: Vec<String>,
    },
    Set {
        matched_notes: Vec<String>,
        missed_notes: Vec<String>,
        extra_notes: Vec<String>,
        total_notes: usize,
    },
}

impl ValidationResult {
    fn new(is_correct: bool, accuracy: f64, detail: ValidationDetail) -> Self {
        ValidationResult {
            is_correct,
            accuracy,
            message: String::new(),
            detail,
        }
    }
}

/// A scalar kind must carry a positive, finite tolerance.
pub fn require_tolerance(
    kind: ExerciseKind,
    tolerance: Option<f64>,
) -> Result<f64, InvalidExerciseSpec> {
    let t = tolerance.ok_or(InvalidExerciseSpec::MissingTolerance { kind })?;
    check_tolerance(t)?;
    Ok(t)
}

fn check_tolerance(tolerance: f64) -> Result<(), InvalidExerciseSpec> {
    if tolerance.is_finite() && tolerance > 0.0 {
        Ok(())
    } else {
        Err(InvalidExerciseSpec::Tolerance { value: tolerance })
    }
}

/// Tolerance-band comparison.
///
/// Accuracy is 100 for an exact match and falls linearly to 0 at twice the
/// tolerance; anything further away stays at 0.
pub fn score_scalar(
    user: f64,
    correct: f64,
    tolerance: f64,
) -> Result<ValidationResult, InvalidExerciseSpec> {
    check_tolerance(tolerance)?;
    if !user.is_finite() {
        return Err(InvalidExerciseSpec::NonFinite { field: "userAnswer" });
    }
    if !correct.is_finite() {
        return Err(InvalidExerciseSpec::NonFinite {
            field: "correctAnswer",
        });
    }

    let difference = (user - correct).abs();
    let accuracy = ((1.0 - difference / (2.0 * tolerance)) * 100.0).clamp(0.0, 100.0);

    Ok(ValidationResult::new(
        difference <= tolerance,
        accuracy,
        ValidationDetail::Scalar {
            user_value: user,
            correct_value: correct,
            difference,
            tolerance,
            acceptance_min: correct - tolerance,
            acceptance_max: correct + tolerance,
        },
    ))
}

/// Multiple-choice comparison: all or nothing.
pub fn score_index(selected: usize, correct: usize) -> ValidationResult {
    let is_correct = selected == correct;
    ValidationResult::new(
        is_correct,
        if is_correct { 100.0 } else { 0.0 },
        ValidationDetail::Index {
            selected_index: selected,
            correct_index: correct,
        },
    )
}

/// Position-by-position comparison. Partial credit is reported in
/// `accuracy`, but only a complete, exact sequence is correct.
pub fn score_sequence(
    user: &[String],
    correct: &[String],
) -> Result<ValidationResult, InvalidExerciseSpec> {
    if correct.is_empty() {
        return Err(InvalidExerciseSpec::EmptyAnswer {
            kind: ExerciseKind::IntervalSequence,
        });
    }

    let user_sequence: Vec<String> = user.iter().map(|n| normalize_label(n)).collect();
    let correct_sequence: Vec<String> = correct.iter().map(|n| normalize_label(n)).collect();

    let total_notes = correct_sequence.len();
    let correct_count = user_sequence
        .iter()
        .zip(&correct_sequence)
        .filter(|(u, c)| u == c)
        .count();
    let accuracy = correct_count as f64 / total_notes as f64 * 100.0;
    let is_correct = correct_count == total_notes && user_sequence.len() == total_notes;

    Ok(ValidationResult::new(
        is_correct,
        accuracy,
        ValidationDetail::Sequence {
            correct_count,
            total_notes,
            user_sequence,
            correct_sequence,
        },
    ))
}

/// Set comparison. Every chord note must be picked and nothing else.
/// Repeated picks count once.
pub fn score_set(
    user: &[String],
    correct: &[String],
) -> Result<ValidationResult, InvalidExerciseSpec> {
    let correct_notes = dedup_labels(correct);
    if correct_notes.is_empty() {
        return Err(InvalidExerciseSpec::EmptyAnswer {
            kind: ExerciseKind::HarmonyChord,
        });
    }
    let user_notes = dedup_labels(user);

    let picked: HashSet<&str> = user_notes.iter().map(String::as_str).collect();
    let wanted: HashSet<&str> = correct_notes.iter().map(String::as_str).collect();

    let (matched_notes, missed_notes): (Vec<String>, Vec<String>) = correct_notes
        .iter()
        .cloned()
        .partition(|n| picked.contains(n.as_str()));
    let extra_notes: Vec<String> = user_notes
        .iter()
        .filter(|n| !wanted.contains(n.as_str()))
        .cloned()
        .collect();

    let total_notes = correct_notes.len();
    let accuracy = matched_notes.len() as f64 / total_notes as f64 * 100.0;
    let is_correct = missed_notes.is_empty() && extra_notes.is_empty();

    Ok(ValidationResult::new(
        is_correct,
        accuracy,
        ValidationDetail::Set {
            matched_notes,
            missed_notes,
            extra_notes,
            total_notes,
        },
    ))
}

/// Normalized labels with duplicates dropped, first occurrence wins.
fn dedup_labels(labels: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    labels
        .iter()
        .map(|l| normalize_label(l))
        .filter(|l| seen.insert(l.clone()))
        .collect()
}

/// Score `answer` against `correct` with the rule for `kind`.
///
/// This is the `(userAnswer, correctAnswer, tolerance)` entry point shared by
/// guest-mode validation and the remote cross-check. The message is left
/// empty; [`ExerciseProfile::verdict`](crate::profile::ExerciseProfile::verdict)
/// fills it in.
pub fn score(
    kind: ExerciseKind,
    answer: &UserAnswer,
    correct: &CorrectAnswer,
    tolerance: Option<f64>,
) -> Result<ValidationResult, InvalidExerciseSpec> {
    if !correct.matches_kind(kind) {
        return Err(InvalidExerciseSpec::ShapeMismatch {
            kind,
            found: correct.shape_name(),
        });
    }
    let mismatch = || InvalidExerciseSpec::ShapeMismatch {
        kind,
        found: answer.shape_name(),
    };

    match (kind.rule(), answer, correct) {
        (ComparisonRule::ScalarTolerance, UserAnswer::Scalar(user), _) => {
            let tolerance = require_tolerance(kind, tolerance)?;
            let correct_value = correct.scalar().ok_or_else(mismatch)?;
            score_scalar(*user, correct_value, tolerance)
        }
        (ComparisonRule::ExactIndex, UserAnswer::Index(i), CorrectAnswer::NoteChoice { index, options }) => {
            if options.is_empty() {
                return Err(InvalidExerciseSpec::EmptyAnswer { kind });
            }
            Ok(score_index(*i, *index))
        }
        (ComparisonRule::OrderedSequence, UserAnswer::Notes(user), CorrectAnswer::Sequence(c)) => {
            score_sequence(user, c)
        }
        (ComparisonRule::UnorderedSet, UserAnswer::Notes(user), CorrectAnswer::Chord(c)) => {
            score_set(user, c)
        }
        _ => Err(mismatch()),
    }
}

/// Whether two verdicts for the same inputs agree: same correctness and
/// accuracy within [`ACCURACY_EPSILON`].
pub fn agrees(a: &ValidationResult, b: &ValidationResult) -> bool {
    a.is_correct == b.is_correct && (a.accuracy - b.accuracy).abs() <= ACCURACY_EPSILON
}
