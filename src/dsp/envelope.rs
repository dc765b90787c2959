//! Attack/decay gain envelope for exercise tones.
//!
//! Reproduces the WebAudio automation every exercise tone uses:
//! `setValueAtTime(0, t0)`, `linearRampToValueAtTime(peak, t0 + 50ms)`,
//! `exponentialRampToValueAtTime(0.01, t0 + duration - 50ms)`, then the
//! oscillator is stopped at `t0 + duration`.

/// Linear attack length in seconds.
pub const ATTACK_SECS: f64 = 0.05;
/// Level the exponential decay lands on before the natural stop.
pub const DECAY_FLOOR: f64 = 0.01;
/// How long before the stop the decay reaches the floor.
pub const DECAY_LEAD_SECS: f64 = 0.05;

/// Envelope stages.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Attack,
    Decay,
    Floor,
    Stopped,
}

/// Fixed-shape envelope: linear ramp to `peak`, exponential decay to
/// [`DECAY_FLOOR`], hold, hard stop at `duration`.
#[derive(Debug, Clone)]
pub struct ToneEnvelope {
    /// Peak linear gain reached at the end of the attack.
    pub peak: f64,
    /// Total tone length in seconds.
    pub duration: f64,
    attack_end: f64,
    decay_end: f64,
    sample_rate: f64,
    counter: usize,
}

impl ToneEnvelope {
    pub fn new(peak: f64, duration: f64, sample_rate: f64) -> Self {
        let attack_end = ATTACK_SECS.min(duration);
        let decay_end = (duration - DECAY_LEAD_SECS).max(attack_end);
        ToneEnvelope {
            peak,
            duration,
            attack_end,
            decay_end,
            sample_rate,
            counter: 0,
        }
    }

    /// Total number of samples until the stop.
    pub fn len_samples(&self) -> usize {
        (self.duration * self.sample_rate).round() as usize
    }

    fn stage_at(&self, t: f64) -> Stage {
        if t >= self.duration {
            Stage::Stopped
        } else if t < self.attack_end {
            Stage::Attack
        } else if t < self.decay_end {
            Stage::Decay
        } else {
            Stage::Floor
        }
    }

    /// Gain at `t` seconds after the tone starts.
    pub fn gain_at(&self, t: f64) -> f64 {
        match self.stage_at(t) {
            Stage::Attack => self.peak * (t / self.attack_end),
            Stage::Decay => {
                // v(t) = v0 * (v1 / v0)^((t - t0) / (t1 - t0))
                let span = self.decay_end - self.attack_end;
                let progress = (t - self.attack_end) / span;
                self.peak * (DECAY_FLOOR / self.peak).powf(progress)
            }
            Stage::Floor => {
                if self.decay_end > self.attack_end {
                    DECAY_FLOOR
                } else {
                    // Tone too short for a decay: the attack never finished.
                    self.peak
                }
            }
            Stage::Stopped => 0.0,
        }
    }

    /// Generate the next envelope sample.
    pub fn next_sample(&mut self) -> f64 {
        let t = self.counter as f64 / self.sample_rate;
        self.counter += 1;
        self.gain_at(t)
    }

    /// Returns true once the stop time has passed.
    pub fn is_finished(&self) -> bool {
        self.counter >= self.len_samples()
    }
}

/// Convert a decibel offset to a linear gain multiplier (`10^(dB/20)`).
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert a linear gain multiplier to decibels.
pub fn linear_to_db(gain: f64) -> f64 {
    20.0 * gain.log10()
}
