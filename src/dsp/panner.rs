//! Equal-power stereo panner, as WebAudio's `StereoPannerNode` applies it to a mono input.

use std::f64::consts::FRAC_PI_2;

/// Positions a mono signal in the stereo field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoPanner {
    /// -1 = hard left, 0 = center, 1 = hard right.
    pub pan: f64,
    left_gain: f64,
    right_gain: f64,
}

impl StereoPanner {
    /// `pan` is clamped to [-1, 1].
    pub fn new(pan: f64) -> Self {
        let pan = pan.clamp(-1.0, 1.0);
        let x = (pan + 1.0) / 2.0;
        StereoPanner {
            pan,
            left_gain: (x * FRAC_PI_2).cos(),
            right_gain: (x * FRAC_PI_2).sin(),
        }
    }

    /// Split one mono sample into (left, right).
    pub fn process(&self, input: f64) -> (f64, f64) {
        (input * self.left_gain, input * self.right_gain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_left_and_right() {
        let (l, r) = StereoPanner::new(-1.0).process(1.0);
        assert!((l - 1.0).abs() < 1e-12 && r.abs() < 1e-12);

        let (l, r) = StereoPanner::new(1.0).process(1.0);
        assert!(l.abs() < 1e-12 && (r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn center_is_equal_power() {
        let (l, r) = StereoPanner::new(0.0).process(1.0);
        assert!((l - r).abs() < 1e-12);
        assert!((l * l + r * r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_is_clamped() {
        assert_eq!(StereoPanner::new(3.0), StereoPanner::new(1.0));
        assert_eq!(StereoPanner::new(-7.5).pan, -1.0);
    }
}
