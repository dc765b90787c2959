//! Mixer — sums rendered tones into one stereo buffer with master gain.

use std::time::Duration;

/// Interleaved stereo f32 audio at a fixed sample rate.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    /// Interleaved L/R frames.
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    pub fn silence(sample_rate: u32, frames: usize) -> Self {
        AudioBuffer {
            sample_rate,
            samples: vec![0.0; frames * 2],
        }
    }

    /// Number of stereo frames.
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Left channel as a separate vector.
    pub fn left(&self) -> Vec<f32> {
        self.samples.iter().step_by(2).copied().collect()
    }

    /// Right channel as a separate vector.
    pub fn right(&self) -> Vec<f32> {
        self.samples.iter().skip(1).step_by(2).copied().collect()
    }

    /// Append another buffer (same sample rate) after this one.
    pub fn append(&mut self, other: &AudioBuffer) {
        self.samples.extend_from_slice(&other.samples);
    }
}

/// A summing mixer that lines up several stereo sources from frame 0.
#[derive(Debug, Clone)]
pub struct Mixer {
    pub master_gain: f64,
    buffer: Vec<f64>,
}

impl Default for Mixer {
    fn default() -> Self {
        Mixer::new()
    }
}

impl Mixer {
    pub fn new() -> Self {
        Mixer {
            master_gain: 1.0,
            buffer: Vec::new(),
        }
    }

    /// Add a source; the mix grows to the longest source.
    pub fn add(&mut self, source: &AudioBuffer) {
        if self.buffer.len() < source.samples.len() {
            self.buffer.resize(source.samples.len(), 0.0);
        }
        for (acc, &s) in self.buffer.iter_mut().zip(&source.samples) {
            *acc += s as f64;
        }
    }

    /// Mixed output with master gain applied and hard-limited to [-1, 1],
    /// which is what an audio destination does with out-of-range samples.
    pub fn output(&self, sample_rate: u32) -> AudioBuffer {
        AudioBuffer {
            sample_rate,
            samples: self
                .buffer
                .iter()
                .map(|&s| (s * self.master_gain).clamp(-1.0, 1.0) as f32)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
