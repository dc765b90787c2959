//! Exercise data model.
//!
//! An [`ExerciseSpec`] is an immutable description of one exercise round,
//! produced by the remote service or by the guest-mode generator. The
//! shape of [`CorrectAnswer`] always matches the [`ExerciseKind`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dsp::{EqBand, ToneSpec, Waveform};
use crate::error::InvalidExerciseSpec;
use crate::pitch::PianoKey;
use crate::scoring::ComparisonRule;

// ── Difficulty ──────────────────────────────────────────────

/// Controls tolerance and complexity of generated exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// Lenient parse used for route/query input: anything unknown is `Easy`.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        match raw.map(str::parse::<Difficulty>) {
            Some(Ok(d)) => d,
            Some(Err(_)) | None => {
                tracing::debug!(?raw, "no usable difficulty, defaulting to easy");
                Difficulty::Easy
            }
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty '{other}'")),
        }
    }
}

// ── Exercise Kind ───────────────────────────────────────────

/// The six exercise variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExerciseKind {
    Note,
    Panning,
    Volume,
    Equalizing,
    IntervalSequence,
    HarmonyChord,
}

impl ExerciseKind {
    pub const ALL: [ExerciseKind; 6] = [
        ExerciseKind::Note,
        ExerciseKind::Panning,
        ExerciseKind::Volume,
        ExerciseKind::Equalizing,
        ExerciseKind::IntervalSequence,
        ExerciseKind::HarmonyChord,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExerciseKind::Note => "note",
            ExerciseKind::Panning => "panning",
            ExerciseKind::Volume => "volume",
            ExerciseKind::Equalizing => "equalizing",
            ExerciseKind::IntervalSequence => "interval-sequence",
            ExerciseKind::HarmonyChord => "harmony-chord",
        }
    }

    /// Category name used by the remote service and leaderboards.
    pub fn category(&self) -> &'static str {
        match self {
            ExerciseKind::Note => "guess-note",
            ExerciseKind::Panning => "panning",
            ExerciseKind::Volume => "volumes",
            ExerciseKind::Equalizing => "equalizing",
            ExerciseKind::IntervalSequence => "intervals",
            ExerciseKind::HarmonyChord => "harmonies",
        }
    }

    /// How answers of this kind are compared.
    pub fn rule(&self) -> ComparisonRule {
        match self {
            ExerciseKind::Note => ComparisonRule::ExactIndex,
            ExerciseKind::Panning | ExerciseKind::Volume | ExerciseKind::Equalizing => {
                ComparisonRule::ScalarTolerance
            }
            ExerciseKind::IntervalSequence => ComparisonRule::OrderedSequence,
            ExerciseKind::HarmonyChord => ComparisonRule::UnorderedSet,
        }
    }
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExerciseKind {
    type Err = String;

    /// Accepts both the kind name and the service category name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ExerciseKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s || k.category() == s)
            .ok_or_else(|| format!("unknown exercise kind '{s}'"))
    }
}

// ── Signal ──────────────────────────────────────────────────

/// Parameters needed to synthesize the exercise audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalSpec {
    pub waveform: Waveform,
    /// One entry for single-tone kinds; the notes of a sequence or chord otherwise.
    pub frequencies: Vec<f64>,
    /// Seconds per tone.
    pub duration: f64,
    pub peak_gain: f64,
    /// Level of the comparison tone relative to the reference (volume).
    #[serde(default)]
    pub gain_offset_db: f64,
    /// Stereo position (panning).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pan: Option<f64>,
    /// Peaking band on the comparison tone (equalizing).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<EqBand>,
}

impl SignalSpec {
    /// Dry tone at `frequency` with this signal's waveform, length and level.
    pub fn tone(&self, frequency: f64) -> ToneSpec {
        ToneSpec::new(self.waveform, frequency, self.duration).with_peak_gain(self.peak_gain)
    }

    /// The first (often only) frequency.
    pub fn base_frequency(&self) -> Option<f64> {
        self.frequencies.first().copied()
    }

    pub fn check(&self) -> Result<(), InvalidExerciseSpec> {
        if self.frequencies.is_empty() {
            return Err(InvalidExerciseSpec::Signal("no frequencies to play".into()));
        }
        if !self.gain_offset_db.is_finite() {
            return Err(InvalidExerciseSpec::NonFinite {
                field: "gainOffsetDb",
            });
        }
        for &f in &self.frequencies {
            let mut tone = self.tone(f);
            tone.pan = self.pan;
            tone.eq = self.eq;
            tone.check()
                .map_err(|e| InvalidExerciseSpec::Signal(e.to_string()))?;
        }
        Ok(())
    }
}

// ── Answers ─────────────────────────────────────────────────

/// The correct answer, shaped by the exercise kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum CorrectAnswer {
    /// Index into the offered note labels.
    NoteChoice { index: usize, options: Vec<String> },
    /// Pan position in [-1, 1].
    Pan(f64),
    /// dB offset of the second tone.
    GainOffsetDb(f64),
    /// EQ center frequency in Hz.
    Frequency(f64),
    /// Ordered note labels.
    Sequence(Vec<String>),
    /// Unordered note labels.
    Chord(Vec<String>),
}

impl CorrectAnswer {
    pub fn shape_name(&self) -> &'static str {
        match self {
            CorrectAnswer::NoteChoice { .. } => "note-choice",
            CorrectAnswer::Pan(_) => "pan",
            CorrectAnswer::GainOffsetDb(_) => "gain-offset",
            CorrectAnswer::Frequency(_) => "frequency",
            CorrectAnswer::Sequence(_) => "sequence",
            CorrectAnswer::Chord(_) => "chord",
        }
    }

    pub fn matches_kind(&self, kind: ExerciseKind) -> bool {
        matches!(
            (kind, self),
            (ExerciseKind::Note, CorrectAnswer::NoteChoice { .. })
                | (ExerciseKind::Panning, CorrectAnswer::Pan(_))
                | (ExerciseKind::Volume, CorrectAnswer::GainOffsetDb(_))
                | (ExerciseKind::Equalizing, CorrectAnswer::Frequency(_))
                | (ExerciseKind::IntervalSequence, CorrectAnswer::Sequence(_))
                | (ExerciseKind::HarmonyChord, CorrectAnswer::Chord(_))
        )
    }

    /// The value of scalar answers.
    pub fn scalar(&self) -> Option<f64> {
        match self {
            CorrectAnswer::Pan(v) | CorrectAnswer::GainOffsetDb(v) | CorrectAnswer::Frequency(v) => {
                Some(*v)
            }
            _ => None,
        }
    }

    /// Note labels of sequence and chord answers.
    pub fn notes(&self) -> Option<&[String]> {
        match self {
            CorrectAnswer::Sequence(n) | CorrectAnswer::Chord(n) => Some(n),
            _ => None,
        }
    }
}

/// What the learner submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum UserAnswer {
    Index(usize),
    Scalar(f64),
    Notes(Vec<String>),
}

impl UserAnswer {
    pub fn shape_name(&self) -> &'static str {
        match self {
            UserAnswer::Index(_) => "index",
            UserAnswer::Scalar(_) => "scalar",
            UserAnswer::Notes(_) => "notes",
        }
    }
}

// ── Exercise Spec ───────────────────────────────────────────

/// One exercise instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseSpec {
    /// Opaque, unique per instance.
    pub id: String,
    pub kind: ExerciseKind,
    pub difficulty: Difficulty,
    /// Prompt shown to the learner.
    #[serde(default)]
    pub question: String,
    pub signal: SignalSpec,
    pub correct_answer: CorrectAnswer,
    /// Absolute band in the answer's unit; only scalar kinds have one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    pub points: u32,
    /// Keys offered for note-picking kinds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyboard: Vec<PianoKey>,
}

impl ExerciseSpec {
    /// Verify the invariants that make the spec playable and scorable.
    pub fn check(&self) -> Result<(), InvalidExerciseSpec> {
        if !self.correct_answer.matches_kind(self.kind) {
            return Err(InvalidExerciseSpec::ShapeMismatch {
                kind: self.kind,
                found: self.correct_answer.shape_name(),
            });
        }

        if let Some(t) = self.tolerance {
            if !t.is_finite() || t < 0.0 {
                return Err(InvalidExerciseSpec::Tolerance { value: t });
            }
        }

        match &self.correct_answer {
            CorrectAnswer::NoteChoice { index, options } => {
                if options.is_empty() {
                    return Err(InvalidExerciseSpec::EmptyAnswer { kind: self.kind });
                }
                if *index >= options.len() {
                    return Err(InvalidExerciseSpec::IndexOutOfRange {
                        index: *index,
                        options: options.len(),
                    });
                }
            }
            CorrectAnswer::Sequence(notes) | CorrectAnswer::Chord(notes) => {
                if notes.is_empty() {
                    return Err(InvalidExerciseSpec::EmptyAnswer { kind: self.kind });
                }
            }
            CorrectAnswer::Pan(v) | CorrectAnswer::GainOffsetDb(v) | CorrectAnswer::Frequency(v) => {
                if !v.is_finite() {
                    return Err(InvalidExerciseSpec::NonFinite {
                        field: "correctAnswer",
                    });
                }
                crate::scoring::require_tolerance(self.kind, self.tolerance)?;
            }
        }

        if let CorrectAnswer::Pan(v) = self.correct_answer {
            if !(-1.0..=1.0).contains(&v) {
                return Err(InvalidExerciseSpec::Payload(format!(
                    "pan answer {v} is outside [-1, 1]"
                )));
            }
        }

        self.signal.check()
    }

    /// Note labels the learner picks from, in order.
    pub fn note_options(&self) -> Vec<String> {
        match &self.correct_answer {
            CorrectAnswer::NoteChoice { options, .. } => options.clone(),
            _ => self.keyboard.iter().map(|k| k.label.clone()).collect(),
        }
    }

    /// Frequency of a keyboard label, if offered.
    pub fn key_frequency(&self, label: &str) -> Option<f64> {
        let wanted = crate::pitch::normalize_label(label);
        self.keyboard
            .iter()
            .find(|k| k.label == wanted)
            .map(|k| k.frequency)
    }
}
