//! # Plugin Parameters
//!
//! The knobs the host shows for the tape delay, plus the persisted tape
//! length.
//!
//! - **Playback Speed**, **Feedback** and **Speed Input CV** are ordinary
//!   smoothed float parameters.
//! - **Insert Return** switches the aux return input into the feedback
//!   path. Plugin APIs do not tell a plugin whether an aux input is
//!   patched, so "connected" is an explicit switch here.
//! - **Tape Length** is the preset menu. Picking an entry stores its
//!   length in the persisted `delay_time_ms` field and asks the audio
//!   thread to rebuild the tape. The persisted field is the source of
//!   truth: a project can hold a length that is not on the menu.
//!
//! Parameter IDs (`#[id = "..."]`) are what hosts store in presets. Never
//! change them once published.

use std::sync::Arc;

use nih_plug::prelude::*;

use crate::engine::{MAX_SPEED, MIN_SPEED};
use crate::state::PersistedDelayTime;

/// The tape length presets offered in the menu.
#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapeLength {
    #[id = "30ms"]
    #[name = "30 ms"]
    Ms30,
    #[id = "100ms"]
    #[name = "100 ms"]
    Ms100,
    #[id = "300ms"]
    #[name = "300 ms"]
    Ms300,
    #[id = "1s"]
    #[name = "1 sec"]
    Sec1,
}

impl TapeLength {
    pub const ALL: [TapeLength; 4] = [Self::Ms30, Self::Ms100, Self::Ms300, Self::Sec1];

    /// The longest preset. `initialize()` reserves this much tape so
    /// menu changes never allocate on the audio thread.
    pub const LONGEST_MS: f32 = 1000.0;

    pub fn millis(self) -> f32 {
        match self {
            Self::Ms30 => 30.0,
            Self::Ms100 => 100.0,
            Self::Ms300 => 300.0,
            Self::Sec1 => 1000.0,
        }
    }

    /// Whether this entry should carry the checkmark for the live length.
    pub fn is_selected(self, delay_time_ms: f32) -> bool {
        self.millis() == delay_time_ms
    }

    /// The menu entry matching a length exactly, if any.
    pub fn from_millis(delay_time_ms: f32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.is_selected(delay_time_ms))
    }
}

#[derive(Params)]
pub struct TapeDelayParams {
    /// Tape speed multiplier. Below 1.0 the tape stretches (pitch down),
    /// above 1.0 it compresses (pitch up). Smoothed so knob moves sound
    /// like a motor changing speed rather than a splice.
    #[id = "speed"]
    pub speed: FloatParam,

    /// How much of the tape readback (or the insert return) is recorded
    /// again.
    #[id = "fdbk"]
    pub feedback: FloatParam,

    /// Attenuator for the speed CV input.
    #[id = "speedcv"]
    pub speed_cv: FloatParam,

    /// Route the aux return input into the feedback path and output.
    #[id = "return"]
    pub insert_return: BoolParam,

    /// The tape length menu.
    #[id = "length"]
    pub tape_length: EnumParam<TapeLength>,

    /// The live tape length. Persisted as a single number.
    #[persist = "delay_time_ms"]
    pub delay_time: PersistedDelayTime,
}

impl Default for TapeDelayParams {
    fn default() -> Self {
        let delay_time = PersistedDelayTime::default();

        Self {
            speed: FloatParam::new(
                "Playback Speed",
                1.0,
                FloatRange::Linear {
                    min: MIN_SPEED,
                    max: MAX_SPEED,
                },
            )
            .with_unit("x")
            .with_smoother(SmoothingStyle::Linear(20.0))
            .with_value_to_string(formatters::v2s_f32_rounded(2)),

            feedback: FloatParam::new("Feedback", 0.7, FloatRange::Linear { min: 0.0, max: 1.0 })
                .with_unit("%")
                .with_smoother(SmoothingStyle::Linear(20.0))
                .with_value_to_string(formatters::v2s_f32_percentage(1))
                .with_string_to_value(formatters::s2v_f32_percentage()),

            speed_cv: FloatParam::new(
                "Speed Input CV",
                1.0,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_unit("%")
            .with_smoother(SmoothingStyle::Linear(20.0))
            .with_value_to_string(formatters::v2s_f32_percentage(1))
            .with_string_to_value(formatters::s2v_f32_percentage()),

            insert_return: BoolParam::new("Insert Return", false),

            // Menu picks may come from automation on the audio thread, so
            // the callback only touches atomics.
            tape_length: EnumParam::new("Tape Length", TapeLength::Ms100)
                .non_automatable()
                .with_callback(Arc::new({
                    let delay_time = delay_time.clone();
                    move |preset: TapeLength| delay_time.store(preset.millis())
                })),

            delay_time,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_lengths() {
        let lengths: Vec<f32> = TapeLength::ALL.iter().map(|p| p.millis()).collect();
        assert_eq!(lengths, vec![30.0, 100.0, 300.0, 1000.0]);
        assert_eq!(
            TapeLength::ALL.iter().map(|p| p.millis()).fold(0.0, f32::max),
            TapeLength::LONGEST_MS
        );
    }

    /// Exactly one entry is checked for a menu length, none for an
    /// off-menu length restored from a project.
    #[test]
    fn test_selection_is_exact_match() {
        for preset in TapeLength::ALL {
            let checked: Vec<_> = TapeLength::ALL
                .into_iter()
                .filter(|p| p.is_selected(preset.millis()))
                .collect();
            assert_eq!(checked, vec![preset]);
        }

        assert_eq!(TapeLength::from_millis(250.0), None);
        assert_eq!(TapeLength::from_millis(300.0), Some(TapeLength::Ms300));
    }

    #[test]
    fn test_defaults() {
        let params = TapeDelayParams::default();
        assert_eq!(params.speed.value(), 1.0);
        assert!((params.feedback.value() - 0.7).abs() < 1e-6);
        assert_eq!(params.speed_cv.value(), 1.0);
        assert!(!params.insert_return.value());
        assert_eq!(params.tape_length.value(), TapeLength::Ms100);
        assert_eq!(params.delay_time.get(), 100.0);
        assert_eq!(params.delay_time.take_pending(), None);
    }

    /// Clones of the persisted handle (the menu callback holds one) all
    /// see the same length.
    #[test]
    fn test_shared_length_handle() {
        let params = TapeDelayParams::default();
        let menu_handle = params.delay_time.clone();

        menu_handle.store(TapeLength::Ms300.millis());
        assert_eq!(params.delay_time.get(), 300.0);
        assert!(TapeLength::Ms300.is_selected(params.delay_time.get()));
        assert_eq!(params.delay_time.take_pending(), Some(300.0));
    }
}
