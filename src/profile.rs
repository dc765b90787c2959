//! Exercise profiles: one declarative entry per [`ExerciseKind`].
//!
//! A profile says how an exercise sounds (waveform, tone length, level, gap
//! between phases), how its answer is compared, and what the learner reads
//! along the way. The generic runner needs nothing else to drive a kind.
//!
//! | kind | waveform | tone | peak | gap | phases |
//! |---|---|---|---|---|---|
//! | note | sine | 1.5 s | 0.3 | – | single tone |
//! | panning | per exercise | 2.0 s | 0.3 | – | single panned tone |
//! | volume | sine | 1.0 s | per exercise | 2000 ms | reference, offset |
//! | equalizing | per exercise | 1.5 s | 0.3 | 2000 ms | dry, EQ'd |
//! | interval-sequence | sine | 0.5 s | 0.3 | 500 ms | one tone per note |
//! | harmony-chord | sine | 2.0 s | 0.2 | – | one chord |

use std::time::Duration;

use crate::dsp::{ToneSpec, Waveform};
use crate::error::InvalidExerciseSpec;
use crate::exercise::{CorrectAnswer, ExerciseKind, ExerciseSpec, UserAnswer};
use crate::pitch::{normalize_label, note_to_frequency};
use crate::playback::{PAIR_GAP, Phase, PlaybackPlan, PlaybackStatus, SEQUENCE_GAP};
use crate::scoring::{self, ComparisonRule, ValidationDetail, ValidationResult};

/// Sound, rule and copy of one exercise kind.
#[derive(Debug)]
pub struct ExerciseProfile {
    pub kind: ExerciseKind,
    pub title: &'static str,
    pub instructions: &'static str,
    /// Label of the play button.
    pub play_label: &'static str,
    /// Fixed waveform, or `None` when each exercise picks its own.
    pub waveform: Option<Waveform>,
    pub tone_secs: f64,
    /// Fixed envelope peak, or `None` when each exercise picks its own.
    pub peak_gain: Option<f64>,
    /// Silence between phases.
    pub gap: Duration,
    pub ready_text: &'static str,
    pub pause_text: &'static str,
    pub finished_text: &'static str,
}

static PROFILES: [ExerciseProfile; 6] = [
    ExerciseProfile {
        kind: ExerciseKind::Note,
        title: "Guess the Note",
        instructions: "Listen to the note and pick its name.",
        play_label: "Play Note",
        waveform: Some(Waveform::Sine),
        tone_secs: 1.5,
        peak_gain: Some(0.3),
        gap: Duration::ZERO,
        ready_text: "Click Play to hear the note",
        pause_text: "",
        finished_text: "Finished - Pick the note you heard!",
    },
    ExerciseProfile {
        kind: ExerciseKind::Panning,
        title: "Panning Exercise",
        instructions: "Listen to the sound and move the slider to where it sits between left and right.",
        play_label: "Play Sound",
        waveform: None,
        tone_secs: 2.0,
        peak_gain: Some(0.3),
        gap: Duration::ZERO,
        ready_text: "Click Play to hear the sound",
        pause_text: "",
        finished_text: "Finished - Place the sound on the slider!",
    },
    ExerciseProfile {
        kind: ExerciseKind::Volume,
        title: "Volume Exercise",
        instructions: "Listen to both notes and estimate how much louder or quieter the second one is.",
        play_label: "Play Both Notes",
        waveform: Some(Waveform::Sine),
        tone_secs: 1.0,
        peak_gain: None,
        gap: PAIR_GAP,
        ready_text: "Click Play to hear both notes",
        pause_text: "Pause (listening)...",
        finished_text: "Finished - Make your guess!",
    },
    ExerciseProfile {
        kind: ExerciseKind::Equalizing,
        title: "Equalizing Exercise",
        instructions: "Compare the original and the EQ'd sound and find the boosted or cut frequency.",
        play_label: "Compare Sounds",
        waveform: None,
        tone_secs: 1.5,
        peak_gain: Some(0.3),
        gap: PAIR_GAP,
        ready_text: "Click Play to compare original vs EQ'd sound",
        pause_text: "Pause (comparing)...",
        finished_text: "Finished - Adjust the slider to match the affected frequency!",
    },
    ExerciseProfile {
        kind: ExerciseKind::IntervalSequence,
        title: "Intervals Exercise",
        instructions: "Listen to the sequence and play it back on the keyboard in the same order.",
        play_label: "Play Sequence",
        waveform: Some(Waveform::Sine),
        tone_secs: 0.5,
        peak_gain: Some(0.3),
        gap: SEQUENCE_GAP,
        ready_text: "Click Play to hear the sequence",
        pause_text: "Next note...",
        finished_text: "Finished - Enter the notes in order!",
    },
    ExerciseProfile {
        kind: ExerciseKind::HarmonyChord,
        title: "Harmonies Exercise",
        instructions: "Listen to the chord and pick every note in it.",
        play_label: "Play Chord",
        waveform: Some(Waveform::Sine),
        tone_secs: 2.0,
        peak_gain: Some(0.2),
        gap: Duration::ZERO,
        ready_text: "Click Play to hear the chord",
        pause_text: "",
        finished_text: "Finished - Pick every note in the chord!",
    },
];

impl ExerciseKind {
    pub fn profile(&self) -> &'static ExerciseProfile {
        let index = match self {
            ExerciseKind::Note => 0,
            ExerciseKind::Panning => 1,
            ExerciseKind::Volume => 2,
            ExerciseKind::Equalizing => 3,
            ExerciseKind::IntervalSequence => 4,
            ExerciseKind::HarmonyChord => 5,
        };
        &PROFILES[index]
    }
}

impl ExerciseProfile {
    pub fn rule(&self) -> ComparisonRule {
        self.kind.rule()
    }

    // ── Sound ──────────────────────────────────────────────────────────

    /// The phases that present `spec` to the learner.
    pub fn plan(&self, spec: &ExerciseSpec) -> Result<PlaybackPlan, InvalidExerciseSpec> {
        let signal = &spec.signal;
        let base = signal
            .base_frequency()
            .ok_or_else(|| InvalidExerciseSpec::Signal("no frequencies to play".into()))?;

        let plan = match self.kind {
            ExerciseKind::Note => {
                PlaybackPlan::single(Phase::tone("Playing note...", signal.tone(base)))
            }
            ExerciseKind::Panning => {
                let pan = signal
                    .pan
                    .or_else(|| spec.correct_answer.scalar())
                    .ok_or_else(|| InvalidExerciseSpec::Signal("panning exercise has no pan".into()))?;
                PlaybackPlan::single(Phase::tone(
                    "Playing sound...",
                    signal.tone(base).with_pan(pan),
                ))
            }
            ExerciseKind::Volume => PlaybackPlan::new(
                vec![
                    Phase::tone("Playing first note...", signal.tone(base)),
                    Phase::tone(
                        "Playing second note...",
                        signal.tone(base).with_gain_db(signal.gain_offset_db),
                    ),
                ],
                self.gap,
            ),
            ExerciseKind::Equalizing => {
                let eq = signal.eq.ok_or_else(|| {
                    InvalidExerciseSpec::Signal("equalizing exercise has no EQ band".into())
                })?;
                PlaybackPlan::new(
                    vec![
                        Phase::tone("Playing original sound...", signal.tone(base)),
                        Phase::tone("Playing EQ'd sound...", signal.tone(base).with_eq(eq)),
                    ],
                    self.gap,
                )
            }
            ExerciseKind::IntervalSequence => {
                let n = signal.frequencies.len();
                let phases = signal
                    .frequencies
                    .iter()
                    .enumerate()
                    .map(|(i, &f)| Phase::tone(format!("Playing note {} of {n}...", i + 1), signal.tone(f)))
                    .collect();
                PlaybackPlan::new(phases, self.gap)
            }
            ExerciseKind::HarmonyChord => PlaybackPlan::single(Phase::chord(
                "Playing chord...",
                signal.frequencies.iter().map(|&f| signal.tone(f)).collect(),
            )),
        };
        Ok(plan)
    }

    /// What "play correct answer" plays once the exercise is answered.
    ///
    /// Note-picking kinds play the answer labels themselves; the others
    /// replay the exercise.
    pub fn answer_plan(&self, spec: &ExerciseSpec) -> Result<PlaybackPlan, InvalidExerciseSpec> {
        let tones_for = |labels: &[String]| -> Result<Vec<ToneSpec>, InvalidExerciseSpec> {
            labels
                .iter()
                .map(|label| {
                    note_to_frequency(label)
                        .map(|f| spec.signal.tone(f))
                        .ok_or_else(|| InvalidExerciseSpec::Payload(format!("unknown note '{label}'")))
                })
                .collect()
        };

        match &spec.correct_answer {
            CorrectAnswer::Sequence(labels) => {
                let phases = labels
                    .iter()
                    .zip(tones_for(labels)?)
                    .map(|(label, tone)| Phase::tone(format!("Playing {}...", normalize_label(label)), tone))
                    .collect();
                Ok(PlaybackPlan::new(phases, self.gap))
            }
            CorrectAnswer::Chord(labels) => Ok(PlaybackPlan::single(Phase::chord(
                format!("Playing {}...", labels.join(", ")),
                tones_for(labels)?,
            ))),
            _ => self.plan(spec),
        }
    }

    // ── Copy ───────────────────────────────────────────────────────────

    /// Status line for the current playback state.
    pub fn status_text(&self, status: &PlaybackStatus) -> String {
        match status {
            PlaybackStatus::Ready => self.ready_text.to_string(),
            PlaybackStatus::Running { label, .. } => label.clone(),
            PlaybackStatus::PausedBetween { .. } => self.pause_text.to_string(),
            PlaybackStatus::Finished => self.finished_text.to_string(),
        }
    }

    /// Score `answer` and attach the learner-facing message.
    pub fn verdict(
        &self,
        spec: &ExerciseSpec,
        answer: &UserAnswer,
    ) -> Result<ValidationResult, InvalidExerciseSpec> {
        let mut result = scoring::score(self.kind, answer, &spec.correct_answer, spec.tolerance)?;
        result.message = self.message(spec, &result);
        Ok(result)
    }

    /// Explain a verdict in words.
    pub fn message(&self, spec: &ExerciseSpec, result: &ValidationResult) -> String {
        let ok = result.is_correct;
        match (&spec.correct_answer, &result.detail) {
            (CorrectAnswer::NoteChoice { options, .. }, ValidationDetail::Index {
                selected_index,
                correct_index,
            }) => {
                let correct = options.get(*correct_index).map_or("?", String::as_str);
                if ok {
                    format!("Correct! The note was {correct}.")
                } else {
                    let picked = options.get(*selected_index).map_or("nothing", String::as_str);
                    format!("Not quite. The note was {correct}. You picked {picked}.")
                }
            }
            (CorrectAnswer::Pan(_), ValidationDetail::Scalar {
                user_value,
                correct_value,
                ..
            }) => {
                if ok {
                    format!("Correct! The sound was positioned {}.", format_pan(*correct_value))
                } else {
                    format!(
                        "Not quite right. The correct position was {}. You guessed {}.",
                        format_pan(*correct_value),
                        format_pan(*user_value)
                    )
                }
            }
            (CorrectAnswer::GainOffsetDb(_), ValidationDetail::Scalar {
                user_value,
                correct_value,
                ..
            }) => {
                let change = if *correct_value > 0.0 {
                    "louder"
                } else if *correct_value < 0.0 {
                    "quieter"
                } else {
                    "the same volume"
                };
                let heard = format!("The second note was {} {change}.", format_db(*correct_value));
                if ok {
                    format!("Correct! {heard}")
                } else {
                    format!("Not quite right. {heard} You guessed {}.", format_db(*user_value))
                }
            }
            (CorrectAnswer::Frequency(_), ValidationDetail::Scalar {
                user_value,
                correct_value,
                acceptance_min,
                acceptance_max,
                ..
            }) => {
                if ok {
                    format!("Correct! The EQ was centered at {}.", format_hz(*correct_value))
                } else {
                    format!(
                        "Not quite right. The EQ was centered at {} (accepted {} to {}). You guessed {}.",
                        format_hz(*correct_value),
                        format_hz(*acceptance_min),
                        format_hz(*acceptance_max),
                        format_hz(*user_value)
                    )
                }
            }
            (_, ValidationDetail::Sequence {
                correct_count,
                total_notes,
                correct_sequence,
                ..
            }) => {
                if ok {
                    format!("Perfect! You got all {total_notes} notes in the right order.")
                } else {
                    format!(
                        "You got {correct_count} of {total_notes} notes in the right position. The sequence was {}.",
                        correct_sequence.join(", ")
                    )
                }
            }
            (CorrectAnswer::Chord(chord), ValidationDetail::Set {
                matched_notes,
                extra_notes,
                total_notes,
                ..
            }) => {
                let chord: Vec<String> = chord.iter().map(|n| normalize_label(n)).collect();
                if ok {
                    format!("Perfect! The chord was {}.", chord.join(", "))
                } else {
                    let mut msg = format!(
                        "You found {} of {total_notes} notes. The chord was {}.",
                        matched_notes.len(),
                        chord.join(", ")
                    );
                    if !extra_notes.is_empty() {
                        msg.push_str(&format!(" Not in the chord: {}.", extra_notes.join(", ")));
                    }
                    msg
                }
            }
            _ if ok => "Correct!".to_string(),
            _ => "Not quite right.".to_string(),
        }
    }
}

/// `-0.5` → `"50% L"`, within ±5% → `"Center"`.
pub fn format_pan(value: f64) -> String {
    let percent = (value * 100.0).round() as i64;
    if percent < -5 {
        format!("{}% L", percent.abs())
    } else if percent > 5 {
        format!("{percent}% R")
    } else {
        "Center".to_string()
    }
}

/// Signed dB with one decimal at most: `+3 dB`, `-1.5 dB`, `0 dB`.
pub fn format_db(value: f64) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    if rounded > 0.0 {
        format!("+{rounded} dB")
    } else if rounded < 0.0 {
        format!("{rounded} dB")
    } else {
        "0 dB".to_string()
    }
}

pub fn format_hz(value: f64) -> String {
    if value >= 1000.0 {
        format!("{:.1} kHz", value / 1000.0)
    } else {
        format!("{value:.0} Hz")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::EqBand;
    use crate::exercise::tests::panning_spec;
    use crate::exercise::SignalSpec;

    fn spec_for(kind: ExerciseKind, signal: SignalSpec, answer: CorrectAnswer, tol: Option<f64>) -> ExerciseSpec {
        ExerciseSpec {
            kind,
            signal,
            correct_answer: answer,
            tolerance: tol,
            ..panning_spec()
        }
    }

    fn signal(frequencies: Vec<f64>, duration: f64, peak_gain: f64) -> SignalSpec {
        SignalSpec {
            waveform: Waveform::Sine,
            frequencies,
            duration,
            peak_gain,
            gain_offset_db: 0.0,
            pan: None,
            eq: None,
        }
    }

    fn labels(notes: &[&str]) -> Vec<String> {
        notes.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn every_kind_has_its_own_profile() {
        for kind in ExerciseKind::ALL {
            assert_eq!(kind.profile().kind, kind);
            assert_eq!(kind.profile().rule(), kind.rule());
        }
        assert_eq!(ExerciseKind::Volume.profile().gap, Duration::from_millis(2000));
        assert_eq!(ExerciseKind::IntervalSequence.profile().gap, Duration::from_millis(500));
        assert_eq!(ExerciseKind::HarmonyChord.profile().peak_gain, Some(0.2));
    }

    #[test]
    fn panning_plays_one_panned_tone() {
        let spec = panning_spec();
        let plan = ExerciseKind::Panning.profile().plan(&spec).unwrap();
        assert_eq!(plan.phases.len(), 1);
        let tone = &plan.phases[0].tones()[0];
        assert_eq!(tone.pan, Some(-0.5));
        assert_eq!(tone.waveform, Waveform::Sawtooth);
        assert_eq!(tone.length(), Duration::from_secs(2));
    }

    #[test]
    fn volume_second_tone_is_offset() {
        let mut sig = signal(vec![440.0], 1.0, 0.5);
        sig.gain_offset_db = 6.0;
        let spec = spec_for(ExerciseKind::Volume, sig, CorrectAnswer::GainOffsetDb(6.0), Some(2.0));
        let plan = ExerciseKind::Volume.profile().plan(&spec).unwrap();

        assert_eq!(plan.gap, PAIR_GAP);
        let first = plan.phases[0].tones()[0].peak_gain;
        let second = plan.phases[1].tones()[0].peak_gain;
        assert_eq!(first, 0.5);
        assert!((second / first - 10f64.powf(6.0 / 20.0)).abs() < 1e-12);
        assert_eq!(plan.length(), Duration::from_millis(4000));
    }

    #[test]
    fn equalizing_needs_a_band() {
        let mut sig = signal(vec![440.0], 1.5, 0.3);
        let spec = spec_for(ExerciseKind::Equalizing, sig.clone(), CorrectAnswer::Frequency(1000.0), Some(200.0));
        assert!(ExerciseKind::Equalizing.profile().plan(&spec).is_err());

        sig.eq = Some(EqBand {
            frequency: 1000.0,
            q: 1.0,
            gain_db: 9.0,
        });
        let spec = spec_for(ExerciseKind::Equalizing, sig, CorrectAnswer::Frequency(1000.0), Some(200.0));
        let plan = ExerciseKind::Equalizing.profile().plan(&spec).unwrap();
        assert!(plan.phases[0].tones()[0].eq.is_none());
        assert!(plan.phases[1].tones()[0].eq.is_some());
    }

    #[test]
    fn intervals_play_one_phase_per_note_and_harmonies_one_chord() {
        let freqs = vec![261.63, 329.63, 392.0];
        let seq = spec_for(
            ExerciseKind::IntervalSequence,
            signal(freqs.clone(), 0.5, 0.3),
            CorrectAnswer::Sequence(labels(&["C4", "E4", "G4"])),
            None,
        );
        let plan = ExerciseKind::IntervalSequence.profile().plan(&seq).unwrap();
        assert_eq!(plan.phases.len(), 3);
        assert_eq!(plan.phases[2].label(), "Playing note 3 of 3...");
        assert_eq!(plan.gap, SEQUENCE_GAP);

        let chord = spec_for(
            ExerciseKind::HarmonyChord,
            signal(freqs, 2.0, 0.2),
            CorrectAnswer::Chord(labels(&["C4", "E4", "G4"])),
            None,
        );
        let plan = ExerciseKind::HarmonyChord.profile().plan(&chord).unwrap();
        assert_eq!(plan.phases.len(), 1);
        assert_eq!(plan.phases[0].tones().len(), 3);
    }

    #[test]
    fn answer_plan_plays_labels() {
        let chord = spec_for(
            ExerciseKind::HarmonyChord,
            signal(vec![100.0], 2.0, 0.2),
            CorrectAnswer::Chord(labels(&["A4", "C#5"])),
            None,
        );
        let plan = ExerciseKind::HarmonyChord.profile().answer_plan(&chord).unwrap();
        let tones = plan.phases[0].tones();
        assert!((tones[0].frequency - 440.0).abs() < 1e-9);
        assert_eq!(tones.len(), 2);
    }

    #[test]
    fn status_text_follows_playback() {
        let profile = ExerciseKind::Volume.profile();
        assert_eq!(profile.status_text(&PlaybackStatus::Ready), "Click Play to hear both notes");
        assert_eq!(
            profile.status_text(&PlaybackStatus::PausedBetween { next: 1 }),
            "Pause (listening)..."
        );
        assert_eq!(
            profile.status_text(&PlaybackStatus::Running {
                phase: 1,
                of: 2,
                label: "Playing second note...".into()
            }),
            "Playing second note..."
        );
        assert_eq!(profile.status_text(&PlaybackStatus::Finished), "Finished - Make your guess!");
    }

    #[test]
    fn volume_messages() {
        let spec = spec_for(
            ExerciseKind::Volume,
            signal(vec![440.0], 1.0, 0.5),
            CorrectAnswer::GainOffsetDb(3.0),
            Some(2.0),
        );
        let profile = ExerciseKind::Volume.profile();
        let right = profile.verdict(&spec, &UserAnswer::Scalar(4.0)).unwrap();
        assert_eq!(right.message, "Correct! The second note was +3 dB louder.");
        let wrong = profile.verdict(&spec, &UserAnswer::Scalar(-6.0)).unwrap();
        assert_eq!(
            wrong.message,
            "Not quite right. The second note was +3 dB louder. You guessed -6 dB."
        );
    }

    #[test]
    fn panning_messages() {
        let profile = ExerciseKind::Panning.profile();
        let wrong = profile.verdict(&panning_spec(), &UserAnswer::Scalar(0.02)).unwrap();
        assert_eq!(
            wrong.message,
            "Not quite right. The correct position was 50% L. You guessed Center."
        );
    }

    #[test]
    fn chord_message_lists_extras() {
        let spec = spec_for(
            ExerciseKind::HarmonyChord,
            signal(vec![261.63], 2.0, 0.2),
            CorrectAnswer::Chord(labels(&["C4", "E4", "G4"])),
            None,
        );
        let r = ExerciseKind::HarmonyChord
            .profile()
            .verdict(&spec, &UserAnswer::Notes(labels(&["C4", "E4", "G4", "B4"])))
            .unwrap();
        assert!(!r.is_correct);
        assert_eq!(
            r.message,
            "You found 3 of 3 notes. The chord was C4, E4, G4. Not in the chord: B4."
        );
    }

    #[test]
    fn formatting_helpers() {
        assert_eq!(format_pan(0.75), "75% R");
        assert_eq!(format_pan(-0.04), "Center");
        assert_eq!(format_db(-1.5), "-1.5 dB");
        assert_eq!(format_db(-0.0), "0 dB");
        assert_eq!(format_hz(440.0), "440 Hz");
        assert_eq!(format_hz(2500.0), "2.5 kHz");
    }
}
