//! Signal chain: oscillator → optional peaking EQ → gain envelope → optional panner.
//!
//! One chain produces one audible tone. Chains are built from a [`ToneSpec`]
//! and rendered to an [`AudioBuffer`] before they are handed to a sink.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::envelope::{ToneEnvelope, db_to_linear};
use super::filter::PeakingFilter;
use super::mixer::AudioBuffer;
use super::oscillator::{Oscillator, Waveform};
use super::panner::StereoPanner;
use crate::error::AudioError;

/// Default peak gain of an exercise tone.
pub const DEFAULT_PEAK_GAIN: f64 = 0.3;

/// A peaking EQ band applied to the comparison tone of equalizing exercises.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EqBand {
    /// Center frequency in Hz.
    pub frequency: f64,
    pub q: f64,
    /// Boost (positive) or cut (negative) in dB.
    pub gain_db: f64,
}

/// Everything needed to synthesize one tone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToneSpec {
    pub waveform: Waveform,
    /// Oscillator frequency in Hz.
    pub frequency: f64,
    /// Seconds from start to stop.
    pub duration: f64,
    /// Linear gain at the top of the attack.
    pub peak_gain: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pan: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<EqBand>,
}

impl ToneSpec {
    pub fn new(waveform: Waveform, frequency: f64, duration: f64) -> Self {
        ToneSpec {
            waveform,
            frequency,
            duration,
            peak_gain: DEFAULT_PEAK_GAIN,
            pan: None,
            eq: None,
        }
    }

    /// A plain sine tone at the default level.
    pub fn sine(frequency: f64, duration: f64) -> Self {
        ToneSpec::new(Waveform::Sine, frequency, duration)
    }

    pub fn with_peak_gain(mut self, peak_gain: f64) -> Self {
        self.peak_gain = peak_gain;
        self
    }

    /// Scale the peak by a decibel offset.
    pub fn with_gain_db(mut self, db: f64) -> Self {
        self.peak_gain *= db_to_linear(db);
        self
    }

    pub fn with_pan(mut self, pan: f64) -> Self {
        self.pan = Some(pan);
        self
    }

    pub fn with_eq(mut self, eq: EqBand) -> Self {
        self.eq = Some(eq);
        self
    }

    pub fn length(&self) -> Duration {
        Duration::from_secs_f64(self.duration.max(0.0))
    }

    /// Reject parameters no audio graph would accept.
    pub fn check(&self) -> Result<(), AudioError> {
        if !(self.frequency.is_finite() && self.frequency > 0.0) {
            return Err(AudioError::InvalidSignal(format!(
                "frequency must be > 0, got {}",
                self.frequency
            )));
        }
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(AudioError::InvalidSignal(format!(
                "duration must be > 0, got {}",
                self.duration
            )));
        }
        if !(self.peak_gain.is_finite() && self.peak_gain > 0.0) {
            return Err(AudioError::InvalidSignal(format!(
                "peak gain must be > 0, got {}",
                self.peak_gain
            )));
        }
        if let Some(pan) = self.pan {
            if !(-1.0..=1.0).contains(&pan) {
                return Err(AudioError::InvalidSignal(format!(
                    "pan must be within [-1, 1], got {pan}"
                )));
            }
        }
        if let Some(eq) = &self.eq {
            if !(eq.frequency.is_finite() && eq.frequency > 0.0) {
                return Err(AudioError::InvalidSignal(format!(
                    "EQ frequency must be > 0, got {}",
                    eq.frequency
                )));
            }
            if !(eq.q.is_finite() && eq.q > 0.0) || !eq.gain_db.is_finite() {
                return Err(AudioError::InvalidSignal(format!(
                    "EQ band needs a positive Q and finite gain, got Q={} gain={}dB",
                    eq.q, eq.gain_db
                )));
            }
        }
        Ok(())
    }
}

/// A built chain, ready to render.
#[derive(Debug, Clone)]
pub struct SignalChain {
    oscillator: Oscillator,
    filter: Option<PeakingFilter>,
    envelope: ToneEnvelope,
    panner: Option<StereoPanner>,
    sample_rate: u32,
}

impl SignalChain {
    /// Build the chain for `tone`. The EQ and panner stages are only
    /// inserted when the tone asks for them.
    pub fn build(tone: &ToneSpec, sample_rate: u32) -> Result<Self, AudioError> {
        tone.check()?;
        if sample_rate == 0 {
            return Err(AudioError::InvalidSignal("sample rate must be > 0".into()));
        }
        let sr = sample_rate as f64;
        Ok(SignalChain {
            oscillator: Oscillator::new(tone.waveform, tone.frequency, sr),
            filter: tone
                .eq
                .map(|eq| PeakingFilter::new(eq.frequency, eq.q, eq.gain_db, sr)),
            envelope: ToneEnvelope::new(tone.peak_gain, tone.duration, sr),
            panner: tone.pan.map(StereoPanner::new),
            sample_rate,
        })
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    pub fn has_panner(&self) -> bool {
        self.panner.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.envelope.is_finished()
    }

    /// Generate the next (left, right) frame.
    pub fn next_frame(&mut self) -> (f64, f64) {
        let mut s = self.oscillator.next_sample();
        if let Some(filter) = self.filter.as_mut() {
            s = filter.process(s);
        }
        s *= self.envelope.next_sample();
        match &self.panner {
            Some(panner) => panner.process(s),
            // Mono into a stereo destination is copied to both channels.
            None => (s, s),
        }
    }

    /// Render the whole tone, start to stop.
    pub fn render(mut self) -> AudioBuffer {
        let frames = self.envelope.len_samples();
        let mut samples = Vec::with_capacity(frames * 2);
        for _ in 0..frames {
            let (l, r) = self.next_frame();
            samples.push(l as f32);
            samples.push(r as f32);
        }
        AudioBuffer {
            sample_rate: self.sample_rate,
            samples,
        }
    }
}

/// Build and render a single tone.
pub fn render_tone(tone: &ToneSpec, sample_rate: u32) -> Result<AudioBuffer, AudioError> {
    Ok(SignalChain::build(tone, sample_rate)?.render())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::analysis::{detect_pitch, rms};

    const SR: u32 = 22050;

    #[test]
    fn plain_tone_has_no_optional_stages() {
        let chain = SignalChain::build(&ToneSpec::sine(440.0, 1.0), SR).unwrap();
        assert!(!chain.has_filter());
        assert!(!chain.has_panner());

        let chain = SignalChain::build(
            &ToneSpec::sine(440.0, 1.0).with_pan(0.5).with_eq(EqBand {
                frequency: 1000.0,
                q: 1.0,
                gain_db: 6.0,
            }),
            SR,
        )
        .unwrap();
        assert!(chain.has_filter());
        assert!(chain.has_panner());
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(SignalChain::build(&ToneSpec::sine(0.0, 1.0), SR).is_err());
        assert!(SignalChain::build(&ToneSpec::sine(440.0, 0.0), SR).is_err());
        assert!(SignalChain::build(&ToneSpec::sine(440.0, 1.0).with_pan(1.5), SR).is_err());
        assert!(SignalChain::build(&ToneSpec::sine(f64::NAN, 1.0), SR).is_err());
        assert!(SignalChain::build(&ToneSpec::sine(440.0, 1.0), 0).is_err());
    }

    #[test]
    fn renders_exact_length_and_pitch() {
        let buf = render_tone(&ToneSpec::sine(440.0, 0.5), SR).unwrap();
        assert_eq!(buf.frames(), (0.5 * SR as f64) as usize);

        let left: Vec<f64> = buf.left().iter().map(|&s| s as f64).collect();
        let est = detect_pitch(&left[1000..5000], SR, None, None);
        assert!((est.frequency - 440.0).abs() < 5.0, "got {}", est.frequency);
    }

    #[test]
    fn starts_and_ends_quietly() {
        let buf = render_tone(&ToneSpec::new(Waveform::Square, 220.0, 1.0), SR).unwrap();
        assert_eq!(buf.samples[0], 0.0);
        let tail = &buf.samples[buf.samples.len() - 200..];
        assert!(tail.iter().all(|s| s.abs() <= 0.0102), "tail must sit at the decay floor");
    }

    #[test]
    fn gain_offset_scales_level() {
        let quiet = render_tone(&ToneSpec::sine(440.0, 1.0), SR).unwrap();
        let loud = render_tone(&ToneSpec::sine(440.0, 1.0).with_gain_db(6.0), SR).unwrap();
        // Compare during the attack; the decay floor is absolute.
        let attack = 1000;
        let ratio = rms(&loud.left()[..attack]) / rms(&quiet.left()[..attack]);
        assert!((ratio - db_to_linear(6.0)).abs() < 1e-3, "ratio {ratio}");
    }

    #[test]
    fn panned_tone_leans_to_one_side() {
        let buf = render_tone(&ToneSpec::sine(440.0, 0.5).with_pan(-0.8), SR).unwrap();
        assert!(rms(&buf.left()) > 3.0 * rms(&buf.right()));
    }

    #[test]
    fn unpanned_tone_is_centered() {
        let buf = render_tone(&ToneSpec::sine(440.0, 0.5), SR).unwrap();
        assert_eq!(buf.left(), buf.right());
    }

    #[test]
    fn eq_boost_raises_level_at_center() {
        let dry = render_tone(&ToneSpec::sine(1000.0, 1.0), SR).unwrap();
        let boosted = render_tone(
            &ToneSpec::sine(1000.0, 1.0).with_eq(EqBand {
                frequency: 1000.0,
                q: 1.4,
                gain_db: 9.0,
            }),
            SR,
        )
        .unwrap();
        let ratio = rms(&boosted.left()) / rms(&dry.left());
        assert!(ratio > 2.0, "9 dB boost at center gave ratio {ratio}");
    }
}
