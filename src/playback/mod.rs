//! Timed, cancellable presentation of exercise audio.
//!
//! A [`PlaybackPlan`] is an ordered list of [`Phase`]s separated by a fixed
//! gap. A [`PlaybackSession`] plays plans on an [`AudioSink`], one at a time,
//! and publishes a cosmetic [`PlaybackStatus`] for status text.

#[cfg(feature = "device")]
pub mod device;
pub mod session;
pub mod sink;

use std::time::Duration;

use serde::Serialize;

use crate::dsp::{AudioBuffer, Mixer, ToneSpec, render_tone};
use crate::error::AudioError;

pub use session::PlaybackSession;
pub use sink::{AudioSink, CaptureSink, CapturedVoice, EndBehavior, EndedSignal, SilentSink};

/// How long past a tone's stop time the engine waits for the sink's
/// "ended" notification before moving on without it.
pub const END_FALLBACK_MARGIN: Duration = Duration::from_millis(100);
/// Silence between a reference tone and its comparison.
pub const PAIR_GAP: Duration = Duration::from_millis(2000);
/// Silence between the notes of a rapid sequence.
pub const SEQUENCE_GAP: Duration = Duration::from_millis(500);
/// Length of the tone played when a piano key is tapped.
pub const KEY_PREVIEW_SECS: f64 = 0.3;

/// One timed segment of a playback.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    /// A single tone.
    Tone { label: String, tone: ToneSpec },
    /// Several tones started together.
    Chord { label: String, tones: Vec<ToneSpec> },
}

impl Phase {
    pub fn tone(label: impl Into<String>, tone: ToneSpec) -> Self {
        Phase::Tone {
            label: label.into(),
            tone,
        }
    }

    pub fn chord(label: impl Into<String>, tones: Vec<ToneSpec>) -> Self {
        Phase::Chord {
            label: label.into(),
            tones,
        }
    }

    /// Status text while this phase sounds.
    pub fn label(&self) -> &str {
        match self {
            Phase::Tone { label, .. } | Phase::Chord { label, .. } => label,
        }
    }

    pub fn tones(&self) -> &[ToneSpec] {
        match self {
            Phase::Tone { tone, .. } => std::slice::from_ref(tone),
            Phase::Chord { tones, .. } => tones,
        }
    }

    /// Time until the longest tone stops.
    pub fn length(&self) -> Duration {
        self.tones()
            .iter()
            .map(ToneSpec::length)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    /// Render every tone of the phase, mixed from a common start.
    pub fn render(&self, sample_rate: u32) -> Result<AudioBuffer, AudioError> {
        if self.tones().is_empty() {
            return Err(AudioError::InvalidSignal(format!(
                "phase '{}' has no tones",
                self.label()
            )));
        }
        let mut mixer = Mixer::new();
        for tone in self.tones() {
            mixer.add(&render_tone(tone, sample_rate)?);
        }
        Ok(mixer.output(sample_rate))
    }
}

/// Ordered phases with a fixed silence between consecutive entries.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackPlan {
    pub phases: Vec<Phase>,
    pub gap: Duration,
}

impl PlaybackPlan {
    pub fn new(phases: Vec<Phase>, gap: Duration) -> Self {
        PlaybackPlan { phases, gap }
    }

    /// A plan with a single phase (no gap needed).
    pub fn single(phase: Phase) -> Self {
        PlaybackPlan {
            phases: vec![phase],
            gap: Duration::ZERO,
        }
    }

    /// Wall-clock length: all phases plus the gaps between them.
    pub fn length(&self) -> Duration {
        let sounding: Duration = self.phases.iter().map(Phase::length).sum();
        let gaps = self.gap * self.phases.len().saturating_sub(1) as u32;
        sounding + gaps
    }

    /// Render the whole plan offline, gaps included, to one buffer.
    pub fn render(&self, sample_rate: u32) -> Result<AudioBuffer, AudioError> {
        let gap_frames = (self.gap.as_secs_f64() * sample_rate as f64).round() as usize;
        let mut out = AudioBuffer {
            sample_rate,
            samples: Vec::new(),
        };
        for (i, phase) in self.phases.iter().enumerate() {
            if i > 0 {
                out.append(&AudioBuffer::silence(sample_rate, gap_frames));
            }
            out.append(&phase.render(sample_rate)?);
        }
        Ok(out)
    }
}

/// How a playback request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackOutcome {
    /// Every phase played to the end.
    Completed,
    /// Another playback was already running; nothing was played.
    Ignored,
    /// `stop_all` cut the playback short.
    Stopped,
    /// No audio output; resolved immediately without sound.
    Unavailable,
}

/// Cosmetic playback status for UI text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum PlaybackStatus {
    Ready,
    Running { phase: usize, of: usize, label: String },
    PausedBetween { next: usize },
    Finished,
}

impl PlaybackStatus {
    /// Whether a new playback may start.
    pub fn is_idle(&self) -> bool {
        matches!(self, PlaybackStatus::Ready | PlaybackStatus::Finished)
    }
}
