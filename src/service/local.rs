//! Guest mode: exercises generated on the device and scored locally.

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::{ExerciseService, ScoreTotals, Submission};
use crate::dsp::{EqBand, Waveform};
use crate::error::ServiceError;
use crate::exercise::{
    CorrectAnswer, Difficulty, ExerciseKind, ExerciseSpec, SignalSpec, UserAnswer,
};
use crate::pitch::{keyboard, midi_to_frequency, midi_to_note};
use crate::profile::ExerciseProfile;
use crate::scoring::ValidationResult;

const WHITE_KEYS: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Chord shapes as semitones above the root.
const MINOR_THIRD: &[i32] = &[0, 3];
const MAJOR_THIRD: &[i32] = &[0, 4];
const FOURTH: &[i32] = &[0, 5];
const FIFTH: &[i32] = &[0, 7];
const OCTAVE: &[i32] = &[0, 12];
const MAJOR: &[i32] = &[0, 4, 7];
const MINOR: &[i32] = &[0, 3, 7];
const DIMINISHED: &[i32] = &[0, 3, 6];
const AUGMENTED: &[i32] = &[0, 4, 8];
const SUS4: &[i32] = &[0, 5, 7];
const MAJOR_7: &[i32] = &[0, 4, 7, 11];
const MINOR_7: &[i32] = &[0, 3, 7, 10];
const DOMINANT_7: &[i32] = &[0, 4, 7, 10];
/// Two octaves from middle C; every generated chord fits.
const CHORD_KEYS: (i32, i32) = (60, 83);

/// Knobs that change with difficulty.
struct Level {
    /// MIDI notes the generator may pick.
    pool: Vec<i32>,
    /// Keyboard range offered for note entry.
    keys: (i32, i32),
    note_options: usize,
    /// Notes to replay in an interval exercise.
    sequence_len: usize,
    points: RangeInclusive<u32>,
}

impl Level {
    fn for_difficulty(difficulty: Difficulty) -> Self {
        let white = |low: i32, high: i32| -> Vec<i32> {
            (low..=high)
                .filter(|m| WHITE_KEYS.contains(&m.rem_euclid(12)))
                .collect()
        };
        match difficulty {
            Difficulty::Easy => Level {
                pool: white(60, 71),
                keys: (60, 71),
                note_options: 4,
                sequence_len: 2,
                points: 10..=15,
            },
            Difficulty::Medium => Level {
                pool: (60..=71).collect(),
                keys: (60, 71),
                note_options: 6,
                sequence_len: 3,
                points: 20..=25,
            },
            Difficulty::Hard => Level {
                pool: (48..=83).collect(),
                keys: (48, 83),
                note_options: 8,
                sequence_len: 5,
                points: 35..=40,
            },
        }
    }
}

/// Local exercise generator and scorer.
#[derive(Debug)]
pub struct LocalService {
    rng: Mutex<StdRng>,
    totals: Mutex<ScoreTotals>,
    next_id: AtomicU64,
}

impl LocalService {
    /// A fixed `seed` makes the exercise stream reproducible.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        LocalService {
            rng: Mutex::new(rng),
            totals: Mutex::default(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn totals(&self) -> ScoreTotals {
        *lock(&self.totals)
    }

    /// Build a fresh exercise of `kind`.
    pub fn generate(&self, kind: ExerciseKind, difficulty: Difficulty) -> ExerciseSpec {
        let mut rng = lock(&self.rng);
        let level = Level::for_difficulty(difficulty);
        let profile = kind.profile();
        let id = format!(
            "local-{}-{}",
            kind.category(),
            self.next_id.fetch_add(1, Ordering::Relaxed)
        );

        let round = match kind {
            ExerciseKind::Note => note_round(&mut rng, &level),
            ExerciseKind::Panning => panning_round(&mut rng, difficulty),
            ExerciseKind::Volume => volume_round(&mut rng, difficulty),
            ExerciseKind::Equalizing => equalizing_round(&mut rng, difficulty),
            ExerciseKind::IntervalSequence => interval_round(&mut rng, &level),
            ExerciseKind::HarmonyChord => harmony_round(&mut rng, difficulty),
        };
        let points = rng.gen_range(level.points.clone());

        ExerciseSpec {
            id,
            kind,
            difficulty,
            question: round.question,
            signal: SignalSpec {
                waveform: profile.waveform.unwrap_or(round.waveform),
                frequencies: round.frequencies,
                duration: profile.tone_secs,
                peak_gain: profile.peak_gain.unwrap_or(round.peak_gain),
                gain_offset_db: round.gain_offset_db,
                pan: round.pan,
                eq: round.eq,
            },
            correct_answer: round.answer,
            tolerance: round.tolerance,
            points,
            keyboard: round
                .keys
                .map(|(low, high)| keyboard(low, high))
                .unwrap_or_default(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Rounds ─────────────────────────────────────────────────────────────

/// Kind-specific part of a generated exercise.
struct Round {
    question: String,
    waveform: Waveform,
    frequencies: Vec<f64>,
    peak_gain: f64,
    gain_offset_db: f64,
    pan: Option<f64>,
    eq: Option<EqBand>,
    answer: CorrectAnswer,
    tolerance: Option<f64>,
    /// MIDI range of the keyboard offered for note entry.
    keys: Option<(i32, i32)>,
}

impl Round {
    fn new(question: &str, frequencies: Vec<f64>, answer: CorrectAnswer) -> Self {
        Round {
            question: question.to_string(),
            waveform: Waveform::Sine,
            frequencies,
            peak_gain: crate::dsp::chain::DEFAULT_PEAK_GAIN,
            gain_offset_db: 0.0,
            pan: None,
            eq: None,
            answer,
            tolerance: None,
            keys: None,
        }
    }
}

fn pick<T: Copy>(rng: &mut StdRng, items: &[T]) -> T {
    items[rng.gen_range(0..items.len())]
}

fn note_round(rng: &mut StdRng, level: &Level) -> Round {
    let correct = pick(rng, &level.pool);
    let mut options: Vec<i32> = level
        .pool
        .iter()
        .copied()
        .filter(|&m| m != correct)
        .collect::<Vec<_>>()
        .choose_multiple(rng, level.note_options - 1)
        .copied()
        .collect();
    options.push(correct);
    options.shuffle(rng);
    let index = options.iter().position(|&m| m == correct).unwrap_or(0);

    Round::new(
        "Which note is this?",
        vec![midi_to_frequency(correct)],
        CorrectAnswer::NoteChoice {
            index,
            options: options.into_iter().map(midi_to_note).collect(),
        },
    )
}

fn panning_round(rng: &mut StdRng, difficulty: Difficulty) -> Round {
    let (steps, tolerance) = match difficulty {
        // L, C, R
        Difficulty::Easy => (1, 0.25),
        // L, L/2, C, R/2, R
        Difficulty::Medium => (2, 0.15),
        Difficulty::Hard => (20, 0.1),
    };
    let pan = rng.gen_range(-steps..=steps) as f64 / steps as f64;
    let frequency = pick(rng, &[220.0, 330.0, 440.0, 660.0]);

    let mut round = Round::new(
        "Where is the sound positioned?",
        vec![frequency],
        CorrectAnswer::Pan(pan),
    );
    round.waveform = pick(rng, &Waveform::ALL);
    round.pan = Some(pan);
    round.tolerance = Some(tolerance);
    round
}

fn volume_round(rng: &mut StdRng, difficulty: Difficulty) -> Round {
    let (range, tolerance) = match difficulty {
        Difficulty::Easy => (6.0..=20.0, 4.0),
        Difficulty::Medium => (3.0..=12.0, 2.5),
        Difficulty::Hard => (1.0..=8.0, 1.5),
    };
    // Half-dB steps.
    let magnitude = (rng.gen_range(range) * 2.0f64).round() / 2.0;
    let db = if rng.gen_bool(0.5) { magnitude } else { -magnitude };
    let midi = 60 + pick(rng, &WHITE_KEYS);

    let mut round = Round::new(
        "How much louder or quieter is the second note?",
        vec![midi_to_frequency(midi)],
        CorrectAnswer::GainOffsetDb(db),
    );
    // The louder note stays below full scale.
    round.peak_gain = (0.9 / 10f64.powf(db.max(0.0) / 20.0)).min(0.2);
    round.gain_offset_db = db;
    round.tolerance = Some(tolerance);
    round
}

fn equalizing_round(rng: &mut StdRng, difficulty: Difficulty) -> Round {
    let (center, gains, q, tolerance) = match difficulty {
        Difficulty::Easy => (pick(rng, &[250.0, 1000.0, 4000.0]), 6.0..=12.0, 1.0, 200.0),
        Difficulty::Medium => (
            pick(rng, &[125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0]),
            3.0..=8.0,
            1.4,
            150.0,
        ),
        Difficulty::Hard => {
            // Log-uniform over 100 Hz to 8 kHz, to the nearest 10 Hz.
            let f = 10f64.powf(rng.gen_range(2.0..8000f64.log10()));
            ((f / 10.0).round() * 10.0, 1.0..=5.0, 2.0, 100.0)
        }
    };
    let gain_db = rng.gen_range::<f64, _>(gains).round();
    let boost = difficulty == Difficulty::Easy || rng.gen_bool(0.5);
    let gain_db = if boost { gain_db } else { -gain_db };

    let mut round = Round::new(
        "Which frequency was boosted or cut?",
        vec![110.0],
        CorrectAnswer::Frequency(center),
    );
    round.waveform = Waveform::Sawtooth;
    round.eq = Some(EqBand {
        frequency: center,
        q,
        gain_db,
    });
    round.tolerance = Some(tolerance);
    round
}

fn interval_round(rng: &mut StdRng, level: &Level) -> Round {
    let mut notes: Vec<i32> = Vec::with_capacity(level.sequence_len);
    while notes.len() < level.sequence_len {
        let next = pick(rng, &level.pool);
        if notes.last() != Some(&next) {
            notes.push(next);
        }
    }

    let mut round = Round::new(
        "Play the notes back in the order you heard them.",
        notes.iter().map(|&m| midi_to_frequency(m)).collect(),
        CorrectAnswer::Sequence(notes.into_iter().map(midi_to_note).collect()),
    );
    round.keys = Some(level.keys);
    round
}

fn harmony_round(rng: &mut StdRng, difficulty: Difficulty) -> Round {
    let shapes: &[&[i32]] = match difficulty {
        Difficulty::Easy => &[MINOR_THIRD, MAJOR_THIRD, FOURTH, FIFTH, OCTAVE],
        Difficulty::Medium => &[MAJOR, MINOR, DIMINISHED, AUGMENTED, SUS4],
        Difficulty::Hard => &[MAJOR_7, MINOR_7, DOMINANT_7],
    };
    let root = 60 + pick(rng, &WHITE_KEYS[..5]);
    let shape = pick(rng, shapes);
    let notes: Vec<i32> = shape.iter().map(|i| root + i).collect();

    let mut round = Round::new(
        "Which notes make up this chord?",
        notes.iter().map(|&m| midi_to_frequency(m)).collect(),
        CorrectAnswer::Chord(notes.into_iter().map(midi_to_note).collect()),
    );
    round.keys = Some(CHORD_KEYS);
    round
}

impl ExerciseService for LocalService {
    async fn fetch_exercise(
        &self,
        kind: ExerciseKind,
        difficulty: Difficulty,
    ) -> Result<ExerciseSpec, ServiceError> {
        let spec = self.generate(kind, difficulty);
        spec.check()?;
        tracing::debug!(id = %spec.id, %kind, %difficulty, "generated guest exercise");
        Ok(spec)
    }

    async fn validate(
        &self,
        exercise: &ExerciseSpec,
        answer: &UserAnswer,
    ) -> Result<ValidationResult, ServiceError> {
        let profile: &ExerciseProfile = exercise.kind.profile();
        Ok(profile.verdict(exercise, answer)?)
    }

    async fn submit(&self, submission: &Submission) -> Result<Option<ScoreTotals>, ServiceError> {
        let mut totals = lock(&self.totals);
        totals.record(submission.is_correct, submission.points_earned);
        Ok(Some(*totals))
    }
}
