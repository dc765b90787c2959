//! Peaking biquad — matches WebAudio `BiquadFilterNode` with `type = "peaking"`.

use std::f64::consts::PI;

/// A peaking EQ band (2nd order IIR).
///
/// Direct Form II Transposed, coefficients from the Audio EQ Cookbook
/// (Robert Bristow-Johnson), which is what WebAudio specifies.
#[derive(Debug, Clone)]
pub struct PeakingFilter {
    pub frequency: f64,
    pub q: f64,
    pub gain_db: f64,

    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    z1: f64,
    z2: f64,

    sample_rate: f64,
}

impl PeakingFilter {
    pub fn new(frequency: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let mut f = PeakingFilter {
            frequency,
            q,
            gain_db,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
        };
        f.update_coefficients();
        f
    }

    /// Recompute coefficients from the current parameters.
    pub fn update_coefficients(&mut self) {
        // Keep the center below Nyquist so w0 stays in (0, π).
        let nyquist = self.sample_rate / 2.0;
        let freq = self.frequency.clamp(1.0, nyquist * 0.999);
        let q = self.q.max(1e-4);

        let w0 = 2.0 * PI * freq / self.sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);
        let a_lin = 10.0_f64.powf(self.gain_db / 40.0);

        let b0 = 1.0 + alpha * a_lin;
        let b1 = -2.0 * cos_w0;
        let b2 = 1.0 - alpha * a_lin;
        let a0 = 1.0 + alpha / a_lin;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha / a_lin;

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    /// Process a single sample through the filter.
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }
}
