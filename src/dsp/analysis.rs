//! Signal analysis — pitch, level and stereo balance of rendered audio.
//!
//! Used to describe rendered exercises (`eartrainer render`) and to check
//! that synthesized tones carry what the exercise claims.

use serde::Serialize;

use super::mixer::AudioBuffer;
use crate::pitch::frequency_to_note;

/// Result of pitch detection on a buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct PitchEstimate {
    /// Estimated fundamental frequency in Hz.
    pub frequency: f64,
    /// Confidence in [0, 1], higher is better.
    pub confidence: f64,
}

impl PitchEstimate {
    fn none() -> Self {
        PitchEstimate {
            frequency: 0.0,
            confidence: 0.0,
        }
    }

    pub fn is_pitched(&self) -> bool {
        self.frequency > 0.0 && self.confidence >= 0.5
    }
}

/// Detect the fundamental frequency of a mono buffer (simplified YIN).
///
/// `min_freq` defaults to 50 Hz, `max_freq` to 2000 Hz.
pub fn detect_pitch(
    samples: &[f64],
    sample_rate: u32,
    min_freq: Option<f64>,
    max_freq: Option<f64>,
) -> PitchEstimate {
    let sr = sample_rate as f64;
    let min_lag = (sr / max_freq.unwrap_or(2000.0)).ceil() as usize;
    let max_lag = (sr / min_freq.unwrap_or(50.0)).floor() as usize;

    if samples.is_empty() || samples.len() < max_lag * 2 || min_lag == 0 {
        return PitchEstimate::none();
    }

    let window = max_lag.min(samples.len() / 2);

    // Difference function
    let mut diff = vec![0.0f64; window + 1];
    for (tau, d) in diff.iter_mut().enumerate().skip(1) {
        *d = (0..window)
            .map(|j| {
                let x = samples[j] - samples[j + tau];
                x * x
            })
            .sum();
    }

    // Cumulative mean normalized difference
    let mut cmnd = vec![1.0f64; window + 1];
    let mut running = 0.0;
    for tau in 1..=window {
        running += diff[tau];
        if running > 0.0 {
            cmnd[tau] = diff[tau] * tau as f64 / running;
        }
    }

    let upper = window.min(max_lag);
    let mut best_tau = 0usize;
    let mut best_val = 1.0f64;
    for tau in min_lag..=upper {
        if cmnd[tau] < 0.15 {
            let mut t = tau;
            while t < upper && cmnd[t + 1] < cmnd[t] {
                t += 1;
            }
            best_tau = t;
            best_val = cmnd[t];
            break;
        }
    }
    if best_tau == 0 {
        for tau in min_lag..=upper {
            if cmnd[tau] < best_val {
                best_val = cmnd[tau];
                best_tau = tau;
            }
        }
    }
    if best_tau == 0 {
        return PitchEstimate::none();
    }

    // Parabolic interpolation
    let tau = if best_tau < window {
        let (a, b, c) = (cmnd[best_tau - 1], cmnd[best_tau], cmnd[best_tau + 1]);
        let denom = a - 2.0 * b + c;
        if denom.abs() > 1e-12 {
            best_tau as f64 + 0.5 * (a - c) / denom
        } else {
            best_tau as f64
        }
    } else {
        best_tau as f64
    };

    PitchEstimate {
        frequency: sr / tau,
        confidence: 1.0 - best_val,
    }
}

/// Root-mean-square level.
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt()
}

/// Estimate the pan position of a buffer from its channel levels, inverting
/// the equal-power law. Silence reads as center.
pub fn estimate_pan(buffer: &AudioBuffer) -> f64 {
    let l = rms(&buffer.left());
    let r = rms(&buffer.right());
    if l + r <= f64::EPSILON {
        return 0.0;
    }
    let angle = r.atan2(l); // 0 = left, π/2 = right
    (angle / std::f64::consts::FRAC_PI_2) * 2.0 - 1.0
}

/// Summary of a rendered buffer.
#[derive(Debug, Clone, Serialize)]
pub struct SignalReport {
    pub duration_secs: f64,
    pub peak: f64,
    pub rms_db: f64,
    pub pan: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_hz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nearest_note: Option<String>,
}

/// Describe a buffer: length, level, balance and (if pitched) its pitch.
pub fn analyze(buffer: &AudioBuffer) -> SignalReport {
    let peak = buffer
        .samples
        .iter()
        .fold(0.0f64, |m, &s| m.max((s as f64).abs()));
    let level = rms(&buffer.samples);
    let mono: Vec<f64> = buffer
        .left()
        .iter()
        .zip(buffer.right())
        .map(|(&l, r)| (l as f64 + r as f64) / 2.0)
        .collect();
    // Skip the attack so the estimator sees a steady waveform.
    let start = (buffer.sample_rate as usize / 10).min(mono.len());
    let end = (start + buffer.sample_rate as usize / 4).min(mono.len());
    let estimate = detect_pitch(&mono[start..end], buffer.sample_rate, None, None);
    let pitch_hz = estimate.is_pitched().then_some(estimate.frequency);

    SignalReport {
        duration_secs: buffer.duration().as_secs_f64(),
        peak,
        rms_db: if level > 0.0 { 20.0 * level.log10() } else { f64::NEG_INFINITY },
        pan: estimate_pan(buffer),
        nearest_note: pitch_hz.map(frequency_to_note),
        pitch_hz,
    }
}
