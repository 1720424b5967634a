//! # Fake Tape Delay: An AU/VST3/CLAP Tape Echo
//!
//! A tape-style delay built with [nih-plug](https://github.com/robbert-vdh/nih-plug).
//! A loop of "tape" is recorded at a variable speed and played back a
//! fixed distance ahead of the record head, so turning the speed knob
//! bends the pitch of the echoes the way a real tape machine does when
//! its motor drifts.
//!
//! ## Signal Flow
//!
//! ```text
//!                                                ┌──────────────► Insert Send (aux out)
//!                                                │
//! Input ──► [4-pole LP] ──►(+)──► [Tape Loop] ──►┴──(Insert Return?)──┬──► Output
//!           cutoff =        ▲      written at                         │
//!           min(speed, 1)   │      `speed` cells/sample               │
//!                           └─────────────── × feedback ◄─────────────┘
//!
//! Speed CV (aux in) ──► speed = knob + CV × amount / 10, clamped to 0.1..2.0
//! ```
//!
//! ## Ports
//!
//! - Main in/out: mono sound input and delay output.
//! - Aux in 1, "Insert Return": replaces the tape readback in the feedback
//!   path and the output when the Insert Return switch is on.
//! - Aux in 2, "Speed CV": volts added to the speed knob.
//! - Aux out 1, "Insert Send": the tape readback before the return.

pub mod dsp;
pub mod engine;
mod params;
mod state;

use std::num::NonZeroU32;
use std::sync::Arc;

use engine::{AudioProcessor, EngineContext, TapeDelayEngine, TickInputs, TickParams};
use nih_plug::prelude::*;
use params::{TapeDelayParams, TapeLength};

/// Aux input carrying the insert return.
const RETURN_PORT: usize = 0;
/// Aux input carrying the speed CV.
const SPEED_CV_PORT: usize = 1;
/// Aux output carrying the insert send.
const SEND_PORT: usize = 0;

/// The main plugin struct.
///
/// Parameters are shared with the host through an `Arc`; the engine
/// (tape loop and filter) is owned by the audio thread and only touched
/// from `initialize()`, `reset()` and `process()`, which the host never
/// runs concurrently.
struct FakeTapeDelay {
    params: Arc<TapeDelayParams>,

    /// Also holds the host sample rate, set in `initialize()`.
    engine: TapeDelayEngine,
}

impl Default for FakeTapeDelay {
    fn default() -> Self {
        // 44100 Hz is a placeholder until the host calls initialize().
        let context = EngineContext {
            sample_rate: 44100.0,
        };

        Self {
            params: Arc::new(TapeDelayParams::default()),
            engine: TapeDelayEngine::new(
                engine::DEFAULT_DELAY_TIME_MS,
                engine::DEFAULT_DELAY_TIME_MS,
                context,
            ),
        }
    }
}

impl Plugin for FakeTapeDelay {
    const NAME: &'static str = "Fake Tape Delay";
    const VENDOR: &'static str = "Loveless Audio";
    const URL: &'static str = "";
    const EMAIL: &'static str = "steve.loveless@gmail.com";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // One mono layout: the tape is a single voice. The two aux inputs and
    // the aux output form the insert point and the speed CV.
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[AudioIOLayout {
        main_input_channels: NonZeroU32::new(1),
        main_output_channels: NonZeroU32::new(1),
        aux_input_ports: &[new_nonzero_u32(1), new_nonzero_u32(1)],
        aux_output_ports: &[new_nonzero_u32(1)],
        names: PortNames {
            layout: Some("Mono"),
            main_input: Some("Sound Input"),
            main_output: Some("Delay Output"),
            aux_inputs: &["Insert Return", "Speed CV"],
            aux_outputs: &["Insert Send"],
        },
    }];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;
    const SAMPLE_ACCURATE_AUTOMATION: bool = true;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    /// Called on load, on every sample-rate change, and after the host
    /// restores a preset or project. This is the only place the tape is
    /// allocated.
    ///
    /// Capacity for the longest menu entry is reserved up front so that
    /// picking a different length later only re-zeroes the tape on the
    /// audio thread.
    fn initialize(
        &mut self,
        _audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        let sample_rate = buffer_config.sample_rate;
        if !(sample_rate > 0.0) {
            nih_error!("Refusing sample rate {sample_rate} Hz");
            return false;
        }

        // A pending rebuild (menu pick or restored state) is folded into
        // this one.
        let delay_time_ms = self
            .params
            .delay_time
            .take_pending()
            .unwrap_or_else(|| self.params.delay_time.get());

        self.engine.prepare(
            delay_time_ms,
            TapeLength::LONGEST_MS,
            EngineContext { sample_rate },
        );

        match TapeLength::from_millis(delay_time_ms) {
            Some(preset) => nih_log!(
                "Tape length {preset:?} = {} samples at {sample_rate} Hz",
                self.engine.delay_samples()
            ),
            None => nih_log!(
                "Custom tape length {delay_time_ms} ms = {} samples at {sample_rate} Hz",
                self.engine.delay_samples()
            ),
        }

        true
    }

    /// Called when playback stops or the plugin is bypassed. Wipes the
    /// tape so old echoes don't replay on the next start.
    fn reset(&mut self) {
        self.engine.reset();
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        // A new tape length from the menu or a state restore. The engine
        // re-zeroes within the capacity reserved in initialize().
        if let Some(delay_time_ms) = self.params.delay_time.take_pending() {
            self.engine.set_delay_time(delay_time_ms);
        }

        let return_engaged = self.params.insert_return.value();
        let sample_rate = self.engine.context().sample_rate;

        for (sample_idx, mut channel_samples) in buffer.iter_samples().enumerate() {
            let params = TickParams {
                playback_speed: self.params.speed.smoothed.next(),
                feedback: self.params.feedback.smoothed.next(),
                speed_cv_amount: self.params.speed_cv.smoothed.next(),
            };

            let Some(sample) = channel_samples.get_mut(0) else {
                continue;
            };

            // The speed CV port always exists in our layout; an unrouted
            // port delivers silence, which leaves the speed knob as is.
            let inputs = TickInputs {
                input: *sample,
                speed_cv: aux_sample(aux.inputs, SPEED_CV_PORT, sample_idx),
                insert_return: if return_engaged {
                    aux_sample(aux.inputs, RETURN_PORT, sample_idx)
                } else {
                    None
                },
                sample_rate,
            };

            let outputs = self.engine.process(&inputs, &params);

            *sample = outputs.out;
            if let Some(send) = aux
                .outputs
                .get_mut(SEND_PORT)
                .and_then(|port| port.as_slice().first_mut())
                .and_then(|channel| channel.get_mut(sample_idx))
            {
                *send = outputs.send;
            }
        }

        // With the return engaged the feedback loop runs through the
        // outside world, so we can't predict when it falls silent.
        if return_engaged {
            return ProcessStatus::KeepAlive;
        }

        match tail_samples(
            self.engine.delay_samples().get(),
            self.params.speed.value(),
            self.params.feedback.value(),
        ) {
            Some(samples) => ProcessStatus::Tail(samples),
            None => ProcessStatus::KeepAlive,
        }
    }
}

/// One sample of the first channel of an aux input, if the port exists.
fn aux_sample(ports: &[Buffer], port: usize, sample_idx: usize) -> Option<f32> {
    ports
        .get(port)?
        .as_slice_immutable()
        .first()?
        .get(sample_idx)
        .copied()
}

/// How long the echoes take to decay to -60 dB, in samples. `None` when
/// they never do (feedback at 100%).
///
/// At speed `s` a sample needs `(len - 50 + 1) / s` ticks to travel
/// from the record head to the playback head (taken modulo `len` for
/// loops shorter than the offset), and each lap multiplies it by
/// `feedback`. Solving `feedback^N = 0.001` gives the lap count
/// `N = -3 / log10(feedback)`.
fn tail_samples(delay_samples: usize, speed: f32, feedback: f32) -> Option<u32> {
    let len = delay_samples.max(1) as i64;
    let offset = dsp::delay_line::FIXED_OFFSET as i64;
    let lap_ticks = match (len - offset + 1).rem_euclid(len) {
        0 => len,
        ticks => ticks,
    };
    let lap = (lap_ticks as f32 / speed.clamp(engine::MIN_SPEED, engine::MAX_SPEED)).ceil();

    if feedback >= 1.0 {
        None
    } else if feedback > 0.001 {
        let repeats = -3.0 / feedback.log10(); // log10(0.001) = -3
        Some(((repeats + 1.0) * lap).min(u32::MAX as f32) as u32)
    } else {
        // With no feedback, one lap for the single echo.
        Some(lap as u32)
    }
}

impl ClapPlugin for FakeTapeDelay {
    const CLAP_ID: &'static str = "com.loveless-audio.fake-tape-delay";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("A tape-style delay with variable tape speed and a send/return insert");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Mono,
        ClapFeature::Delay,
    ];
}

impl Vst3Plugin for FakeTapeDelay {
    const VST3_CLASS_ID: [u8; 16] = *b"LvlssFakeTapeDly";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Delay];
}

nih_export_clap!(FakeTapeDelay);
nih_export_vst3!(FakeTapeDelay);

// Wrap the CLAP plugin into AUv2 format for Logic Pro.
clap_wrapper::export_auv2!();

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_without_feedback_is_one_lap() {
        assert_eq!(tail_samples(4800, 1.0, 0.0), Some(4751));
        assert_eq!(tail_samples(4800, 0.5, 0.0), Some(9502));
    }

    #[test]
    fn test_tail_grows_with_feedback() {
        let short = tail_samples(4800, 1.0, 0.3).unwrap();
        let long = tail_samples(4800, 1.0, 0.9).unwrap();
        assert!(long > short, "{long} should exceed {short}");

        // -3 / log10(0.1) = 3 repeats plus the first echo.
        let tail = tail_samples(4800, 1.0, 0.1).unwrap();
        assert!((18994..=19014).contains(&tail), "Expected ~19004, got {tail}");
    }

    #[test]
    fn test_full_feedback_never_ends() {
        assert_eq!(tail_samples(4800, 1.0, 1.0), None);
    }

    /// A loop shorter than the read offset still yields a positive lap.
    #[test]
    fn test_tail_for_tiny_loop() {
        assert_eq!(tail_samples(10, 2.0, 0.0), Some(1));
        assert_eq!(tail_samples(10, 1.0, 0.0), Some(1));
        assert_eq!(tail_samples(49, 1.0, 0.0), Some(49));
        assert_eq!(tail_samples(1, 1.0, 0.0), Some(1));
    }

    /// With no feedback the tail ends exactly when the single echo
    /// reaches the output.
    #[test]
    fn test_tail_matches_echo_arrival() {
        let sample_rate = 48000.0;
        let mut engine = TapeDelayEngine::new(100.0, 100.0, EngineContext { sample_rate });
        let params = TickParams {
            feedback: 0.0,
            ..TickParams::default()
        };

        let arrival = (0..10_000u32).find(|&n| {
            let inputs = TickInputs {
                input: if n == 0 { 1.0 } else { 0.0 },
                sample_rate,
                ..TickInputs::default()
            };
            engine.process(&inputs, &params).out != 0.0
        });

        assert_eq!(arrival, Some(4751));
        assert_eq!(tail_samples(engine.delay_samples().get(), 1.0, 0.0), arrival);
    }

    #[test]
    fn test_plugin_defaults() {
        let plugin = FakeTapeDelay::default();
        assert_eq!(plugin.engine.delay_samples().get(), 4410);
        assert_eq!(plugin.params.delay_time.get(), 100.0);
        assert_eq!(plugin.engine.context().sample_rate, 44100.0);
    }
}
