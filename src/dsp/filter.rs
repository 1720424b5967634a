//! # Anti-Aliasing Filter (4-Pole Cascaded One-Pole Lowpass)
//!
//! When the tape runs slower than unity speed, every input sample is
//! stretched across more than one buffer cell on the way in and squeezed
//! back into one cell per tick on the way out. That is a downward
//! resampling by the speed factor, and anything above the new Nyquist
//! frequency folds back as aliasing. The cure is to lowpass the input
//! before it reaches the tape, with a corner that tracks the speed.
//!
//! ## One Stage
//!
//! Each stage is the classic RC smoothing filter (an exponential moving
//! average):
//!
//! ```text
//! y[n] = alpha * x[n] + (1 - alpha) * y[n-1]
//!
//! fc    = cutoff * sample_rate / 2      (cutoff is normalized to Nyquist)
//! RC    = 1 / (2π * fc)
//! dt    = 1 / sample_rate
//! alpha = dt / (RC + dt)
//! ```
//!
//! - `alpha → 1` → output follows input (no filtering)
//! - `alpha → 0` → output holds its last value (total attenuation)
//!
//! ## Four Stages
//!
//! Four identical stages in series give a 24 dB/octave slope. Each stage
//! keeps its own memory; the output of stage `i` is the input of stage
//! `i + 1`.

use std::f32::consts::PI;

/// Number of cascaded one-pole stages.
pub const POLES: usize = 4;

/// A 4-pole lowpass built from identical one-pole stages.
///
/// The coefficient is recomputed on every call because the cutoff follows
/// the playback speed, which may be modulated at audio rate by the speed
/// CV input.
#[derive(Debug, Clone, Default)]
pub struct AntiAliasFilter {
    /// Previous output of each stage. Zero at construction.
    state: [f32; POLES],
}

impl AntiAliasFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter one sample.
    ///
    /// # Arguments
    /// * `input` - The raw input sample.
    /// * `sample_rate` - Host sample rate in Hz.
    /// * `cutoff` - Corner frequency normalized to Nyquist. The delay
    ///   engine passes `min(playback_speed, 1.0)`, so at unity speed and
    ///   above the filter is as open as it gets.
    pub fn process(&mut self, input: f32, sample_rate: f32, cutoff: f32) -> f32 {
        let alpha = smoothing_coefficient(sample_rate, cutoff);

        let mut x = input;
        for stage in &mut self.state {
            *stage = alpha * x + (1.0 - alpha) * *stage;
            x = *stage;
        }

        self.state[POLES - 1]
    }

    /// Zero all stage memories.
    pub fn reset(&mut self) {
        self.state = [0.0; POLES];
    }
}

/// The one-pole coefficient `alpha = dt / (RC + dt)` for a cutoff
/// normalized to Nyquist.
///
/// A non-positive or non-finite corner yields `0.0`, which makes every
/// stage hold its last value instead of dividing by zero.
pub fn smoothing_coefficient(sample_rate: f32, cutoff: f32) -> f32 {
    let fc = cutoff * sample_rate * 0.5;
    if !(fc > 0.0 && fc.is_finite()) {
        return 0.0;
    }

    let rc = 1.0 / (2.0 * PI * fc);
    let dt = 1.0 / sample_rate;
    dt / (rc + dt)
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// At full cutoff, alpha = 1 / (1 + 1/π) regardless of sample rate.
    #[test]
    fn test_full_cutoff_coefficient() {
        let expected = PI / (1.0 + PI);
        for sample_rate in [44100.0, 48000.0, 96000.0] {
            let alpha = smoothing_coefficient(sample_rate, 1.0);
            assert!(
                (alpha - expected).abs() < 1e-5,
                "Expected {expected} at {sample_rate} Hz, got {alpha}"
            );
        }
    }

    /// Lower speed means lower cutoff means a smaller coefficient.
    #[test]
    fn test_coefficient_shrinks_with_cutoff() {
        let fast = smoothing_coefficient(48000.0, 1.0);
        let half = smoothing_coefficient(48000.0, 0.5);
        let slow = smoothing_coefficient(48000.0, 0.1);
        assert!(fast > half && half > slow, "{fast} > {half} > {slow} should hold");
        assert!(slow > 0.0, "Minimum speed must still pass some signal");
    }

    #[test]
    fn test_degenerate_cutoff_holds_state() {
        assert_eq!(smoothing_coefficient(48000.0, 0.0), 0.0);
        assert_eq!(smoothing_coefficient(0.0, 1.0), 0.0);
        assert_eq!(smoothing_coefficient(48000.0, f32::NAN), 0.0);

        let mut filter = AntiAliasFilter::new();
        let output = filter.process(1.0, 48000.0, 0.0);
        assert_eq!(output, 0.0, "A closed filter should not admit new input");
    }

    /// The first output of an impulse is alpha^4: each stage passes
    /// `alpha` of what it receives.
    #[test]
    fn test_impulse_first_sample_is_alpha_to_the_fourth() {
        let mut filter = AntiAliasFilter::new();
        let alpha = smoothing_coefficient(48000.0, 1.0);

        let output = filter.process(1.0, 48000.0, 1.0);
        assert!(
            (output - alpha.powi(4)).abs() < 1e-6,
            "Expected {}, got {output}",
            alpha.powi(4)
        );
    }

    #[test]
    fn test_dc_passes_through() {
        let mut filter = AntiAliasFilter::new();

        let mut output = 0.0;
        for _ in 0..20000 {
            output = filter.process(1.0, 48000.0, 0.1);
        }

        assert!(
            (output - 1.0).abs() < 1e-3,
            "DC should pass a lowpass, got {output}"
        );
    }

    /// A Nyquist-rate square wave should be attenuated far more at the
    /// minimum speed than at unity.
    #[test]
    fn test_slow_speed_attenuates_nyquist() {
        let peak = |cutoff: f32| {
            let mut filter = AntiAliasFilter::new();
            let mut max_output = 0.0_f32;
            for i in 0..2000 {
                let input = if i % 2 == 0 { 1.0 } else { -1.0 };
                let output = filter.process(input, 48000.0, cutoff);
                if i > 1000 {
                    max_output = max_output.max(output.abs());
                }
            }
            max_output
        };

        let open = peak(1.0);
        let closed = peak(0.1);
        assert!(closed < 0.01, "Expected heavy attenuation, got {closed}");
        assert!(open > closed * 10.0, "Unity speed should be much brighter");
    }

    #[test]
    fn test_reset_clears_state() {
        let mut filter = AntiAliasFilter::new();
        filter.process(1.0, 48000.0, 0.5);
        assert!(filter.state.iter().all(|s| *s != 0.0));

        filter.reset();
        assert!(filter.state.iter().all(|s| *s == 0.0));
    }
}
