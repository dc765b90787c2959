//! JSON shapes of the REST backend and their mapping onto [`ExerciseSpec`].
//!
//! Every exercise category has its own payload. Decoding is strict about
//! the fields the exercise needs and lenient about display extras; anything
//! unusable becomes [`InvalidExerciseSpec`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::dsp::{EqBand, Waveform};
use crate::error::InvalidExerciseSpec;
use crate::exercise::{
    CorrectAnswer, Difficulty, ExerciseKind, ExerciseSpec, SignalSpec, UserAnswer,
};
use crate::pitch::{PianoKey, frequency_to_note, normalize_label};

/// Exercise ids arrive as strings or numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(i64),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            WireId::Text(s) => s,
            WireId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Common {
    id: WireId,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    question: String,
    #[serde(default = "default_points")]
    points: u32,
}

fn default_points() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoteDto {
    #[serde(default)]
    name: String,
    frequency: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptionDto {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SoundDto {
    #[serde(rename = "type")]
    waveform: String,
    frequency: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PianoNoteDto {
    note: String,
    frequency: f64,
    #[serde(default)]
    is_black: bool,
}

impl From<PianoNoteDto> for PianoKey {
    fn from(dto: PianoNoteDto) -> Self {
        PianoKey {
            label: normalize_label(&dto.note),
            frequency: dto.frequency,
            is_black: dto.is_black,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GuessNoteDto {
    correct_note: NoteDto,
    options: Vec<OptionDto>,
    correct_answer_index: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PanningDto {
    sound: SoundDto,
    correct_pan_value: f64,
    tolerance: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeDto {
    note: NoteDto,
    reference_gain: f64,
    volume_difference: f64,
    tolerance: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EqualizingDto {
    sound: SoundDto,
    target_frequency: f64,
    eq_gain_db: f64,
    #[serde(default = "default_true")]
    is_boost: bool,
    q_factor: f64,
    tolerance: f64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntervalsDto {
    sequence: Vec<PianoNoteDto>,
    #[serde(default)]
    piano_notes: Vec<PianoNoteDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HarmoniesDto {
    chord: Vec<PianoNoteDto>,
    #[serde(default)]
    piano_notes: Vec<PianoNoteDto>,
}

fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, InvalidExerciseSpec> {
    T::deserialize(value).map_err(|e| InvalidExerciseSpec::Payload(e.to_string()))
}

fn waveform(name: &str) -> Result<Waveform, InvalidExerciseSpec> {
    name.parse()
        .map_err(|_| InvalidExerciseSpec::Payload(format!("unknown sound type '{name}'")))
}

/// Map a fetched exercise payload of `kind` into a checked [`ExerciseSpec`].
pub fn exercise_from_json(kind: ExerciseKind, value: &Value) -> Result<ExerciseSpec, InvalidExerciseSpec> {
    let common: Common = decode(value)?;
    let profile = kind.profile();
    let mut signal = SignalSpec {
        waveform: profile.waveform.unwrap_or_default(),
        frequencies: Vec::new(),
        duration: profile.tone_secs,
        peak_gain: profile.peak_gain.unwrap_or(crate::dsp::chain::DEFAULT_PEAK_GAIN),
        gain_offset_db: 0.0,
        pan: None,
        eq: None,
    };
    let mut tolerance = None;
    let mut keyboard = Vec::new();

    let correct_answer = match kind {
        ExerciseKind::Note => {
            let dto: GuessNoteDto = decode(value)?;
            signal.frequencies = vec![dto.correct_note.frequency];
            let options: Vec<String> = dto.options.into_iter().map(|o| normalize_label(&o.name)).collect();
            let named = match dto.correct_note.name.as_str() {
                "" => frequency_to_note(dto.correct_note.frequency),
                name => normalize_label(name),
            };
            if let Some(listed) = options.get(dto.correct_answer_index) {
                if *listed != named {
                    return Err(InvalidExerciseSpec::Payload(format!(
                        "correct note {named} is not option {}",
                        dto.correct_answer_index
                    )));
                }
            }
            CorrectAnswer::NoteChoice {
                index: dto.correct_answer_index,
                options,
            }
        }
        ExerciseKind::Panning => {
            let dto: PanningDto = decode(value)?;
            signal.waveform = waveform(&dto.sound.waveform)?;
            signal.frequencies = vec![dto.sound.frequency];
            signal.pan = Some(dto.correct_pan_value);
            tolerance = Some(dto.tolerance);
            CorrectAnswer::Pan(dto.correct_pan_value)
        }
        ExerciseKind::Volume => {
            let dto: VolumeDto = decode(value)?;
            signal.frequencies = vec![dto.note.frequency];
            signal.peak_gain = dto.reference_gain;
            signal.gain_offset_db = dto.volume_difference;
            tolerance = Some(dto.tolerance);
            CorrectAnswer::GainOffsetDb(dto.volume_difference)
        }
        ExerciseKind::Equalizing => {
            let dto: EqualizingDto = decode(value)?;
            signal.waveform = waveform(&dto.sound.waveform)?;
            signal.frequencies = vec![dto.sound.frequency];
            let magnitude = dto.eq_gain_db.abs();
            signal.eq = Some(EqBand {
                frequency: dto.target_frequency,
                q: dto.q_factor,
                gain_db: if dto.is_boost { magnitude } else { -magnitude },
            });
            tolerance = Some(dto.tolerance);
            CorrectAnswer::Frequency(dto.target_frequency)
        }
        ExerciseKind::IntervalSequence => {
            let dto: IntervalsDto = decode(value)?;
            signal.frequencies = dto.sequence.iter().map(|n| n.frequency).collect();
            let notes = dto.sequence.iter().map(|n| normalize_label(&n.note)).collect();
            keyboard = dto.piano_notes.into_iter().map(PianoKey::from).collect();
            CorrectAnswer::Sequence(notes)
        }
        ExerciseKind::HarmonyChord => {
            let dto: HarmoniesDto = decode(value)?;
            signal.frequencies = dto.chord.iter().map(|n| n.frequency).collect();
            let notes = dto.chord.iter().map(|n| normalize_label(&n.note)).collect();
            keyboard = dto.piano_notes.into_iter().map(PianoKey::from).collect();
            CorrectAnswer::Chord(notes)
        }
    };

    let spec = ExerciseSpec {
        id: common.id.into_string(),
        kind,
        difficulty: Difficulty::parse_or_default(common.difficulty.as_deref()),
        question: common.question,
        signal,
        correct_answer,
        tolerance,
        points: common.points,
        keyboard,
    };
    spec.check()?;
    Ok(spec)
}

/// Request body of `POST /exercise/<category>/validate`.
pub fn validate_body(spec: &ExerciseSpec, answer: &UserAnswer) -> Result<Value, InvalidExerciseSpec> {
    let mismatch = || InvalidExerciseSpec::ShapeMismatch {
        kind: spec.kind,
        found: answer.shape_name(),
    };
    let body = match (&spec.correct_answer, answer) {
        (CorrectAnswer::NoteChoice { index, .. }, UserAnswer::Index(selected)) => json!({
            "exerciseId": spec.id,
            "selectedAnswerIndex": selected,
            "correctAnswerIndex": index,
        }),
        (CorrectAnswer::Pan(correct), UserAnswer::Scalar(user)) => json!({
            "exerciseId": spec.id,
            "userPanValue": user,
            "correctPanValue": correct,
            "tolerance": spec.tolerance,
        }),
        (CorrectAnswer::GainOffsetDb(correct), UserAnswer::Scalar(user)) => json!({
            "exerciseId": spec.id,
            "userAnswer": user,
            "correctAnswer": correct,
            "tolerance": spec.tolerance,
        }),
        (CorrectAnswer::Frequency(correct), UserAnswer::Scalar(user)) => json!({
            "exerciseId": spec.id,
            "userFrequency": user,
            "correctFrequency": correct,
            "tolerance": spec.tolerance,
        }),
        (CorrectAnswer::Sequence(correct), UserAnswer::Notes(user)) => json!({
            "exerciseId": spec.id,
            "userSequence": user,
            "correctSequence": correct,
        }),
        (CorrectAnswer::Chord(correct), UserAnswer::Notes(user)) => json!({
            "exerciseId": spec.id,
            "userNotes": user,
            "correctNotes": correct,
        }),
        _ => return Err(mismatch()),
    };
    Ok(body)
}

/// Verdict returned by a validate endpoint. Only the shared fields are
/// read; the rest is display detail.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResponse {
    pub is_correct: bool,
    #[serde(default)]
    pub message: String,
    /// Missing for note exercises.
    #[serde(default)]
    pub accuracy: Option<f64>,
}

impl ValidationResponse {
    pub fn accuracy(&self) -> f64 {
        self.accuracy
            .unwrap_or(if self.is_correct { 100.0 } else { 0.0 })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(default)]
    pub message: String,
    pub token: String,
    pub user: crate::service::User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// One leaderboard row. The leaderboard endpoints answer in snake_case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub total_score: u64,
    /// Fraction in [0, 1].
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub longest_streak: u32,
    #[serde(default)]
    pub exercise_type: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

impl LeaderboardEntry {
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardPosition {
    pub rank: Option<u32>,
}

/// Which leaderboard a position query is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderboardScope {
    Global,
    Exercise {
        kind: ExerciseKind,
        difficulty: Option<Difficulty>,
    },
}
