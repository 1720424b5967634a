//! # Tape Delay Engine
//!
//! Ties the anti-aliasing filter and the tape loop together into a
//! per-sample processor that knows nothing about the plugin host. The
//! host layer in `lib.rs` gathers one sample from each port, calls
//! [`AudioProcessor::process`], and scatters the two outputs back.
//!
//! ```text
//!                                 ┌───────────────► send
//!                                 │
//! input ─► [4-pole LP] ─►(+)─► [tape loop] ─► read ─┬─(return?)─► out
//!           cutoff =      ▲                          │
//!           min(speed,1)  └──────── × feedback ◄─────┘
//! ```

use std::num::NonZeroUsize;

use crate::dsp::delay_line::TapeDelayLine;
use crate::dsp::filter::AntiAliasFilter;

/// Slowest tape speed. Also the floor of the anti-aliasing cutoff.
pub const MIN_SPEED: f32 = 0.1;
/// Fastest tape speed.
pub const MAX_SPEED: f32 = 2.0;

/// Tape length used when nothing else has been configured.
pub const DEFAULT_DELAY_TIME_MS: f32 = 100.0;
/// Shortest accepted tape length.
pub const MIN_DELAY_TIME_MS: f32 = 1.0;
/// Longest accepted tape length. Persisted state can ask for any value,
/// the menu never goes past one second.
pub const MAX_DELAY_TIME_MS: f32 = 60_000.0;

/// Speed CV scaling: 10 V of CV at full attenuation adds 1.0 to the speed.
const SPEED_CV_VOLTS_PER_UNIT: f32 = 10.0;

/// Host facts the engine needs when (re)building the tape loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineContext {
    pub sample_rate: f32,
}

/// One sample from each input port.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickInputs {
    /// Sound input. An unpatched input reads as 0.
    pub input: f32,
    /// Speed CV in volts, `None` when unpatched.
    pub speed_cv: Option<f32>,
    /// Insert return, `None` when unpatched. When present it replaces the
    /// tape readback in both the feedback path and the output.
    pub insert_return: Option<f32>,
    /// Current host sample rate in Hz.
    pub sample_rate: f32,
}

/// Parameter values for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickParams {
    pub playback_speed: f32,
    pub feedback: f32,
    pub speed_cv_amount: f32,
}

impl Default for TickParams {
    fn default() -> Self {
        Self {
            playback_speed: 1.0,
            feedback: 0.7,
            speed_cv_amount: 1.0,
        }
    }
}

/// One sample for each output port.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickOutputs {
    /// Final delayed signal: the insert return if patched, otherwise the
    /// tape readback.
    pub out: f32,
    /// Tape readback before the insert return.
    pub send: f32,
}

/// A sample-by-sample audio processor.
///
/// Implementations must not allocate, lock or block: `process` runs on
/// the audio thread once per sample.
pub trait AudioProcessor {
    fn process(&mut self, inputs: &TickInputs, params: &TickParams) -> TickOutputs;
}

/// The tape delay: anti-aliasing filter, tape loop and feedback path.
#[derive(Debug, Clone)]
pub struct TapeDelayEngine {
    filter: AntiAliasFilter,
    tape: TapeDelayLine,
    /// The tape length as requested, before clamping.
    delay_time_ms: f32,
    context: EngineContext,
}

impl TapeDelayEngine {
    /// Build an engine with a `delay_time_ms` tape, with enough capacity
    /// reserved to switch to any length up to `max(delay_time_ms,
    /// reserve_ms)` later without allocating.
    pub fn new(delay_time_ms: f32, reserve_ms: f32, context: EngineContext) -> Self {
        let len = delay_samples(delay_time_ms, context.sample_rate);
        let capacity = delay_samples(reserve_ms, context.sample_rate).max(len);

        Self {
            filter: AntiAliasFilter::new(),
            tape: TapeDelayLine::new(len, capacity),
            delay_time_ms,
            context,
        }
    }

    /// Rebuild for a new host configuration. Allocates if the new sample
    /// rate or tape length needs more room than is reserved, so this
    /// belongs in `initialize()`, never in the audio callback.
    pub fn prepare(&mut self, delay_time_ms: f32, reserve_ms: f32, context: EngineContext) {
        let len = delay_samples(delay_time_ms, context.sample_rate);
        let capacity = delay_samples(reserve_ms, context.sample_rate).max(len);

        self.context = context;
        self.tape.reserve(capacity);
        self.set_delay_time(delay_time_ms);
        self.filter.reset();
    }

    /// Change the tape length. The tape is wiped and the record head
    /// rewinds to 0, even when the length is unchanged.
    ///
    /// Does not allocate: lengths beyond the reserved capacity are
    /// clamped to it.
    pub fn set_delay_time(&mut self, delay_time_ms: f32) {
        self.delay_time_ms = delay_time_ms;
        self.tape
            .set_len(delay_samples(delay_time_ms, self.context.sample_rate));
    }

    /// The tape length as last requested.
    pub fn delay_time_ms(&self) -> f32 {
        self.delay_time_ms
    }

    /// The tape length in cells.
    pub fn delay_samples(&self) -> NonZeroUsize {
        self.tape.len()
    }

    pub fn context(&self) -> EngineContext {
        self.context
    }

    pub fn tape(&self) -> &TapeDelayLine {
        &self.tape
    }

    /// Wipe the tape and the filter memories.
    pub fn reset(&mut self) {
        self.tape.clear();
        self.filter.reset();
    }
}

impl AudioProcessor for TapeDelayEngine {
    fn process(&mut self, inputs: &TickInputs, params: &TickParams) -> TickOutputs {
        let playback_speed = effective_speed(params, inputs.speed_cv);

        let input = self
            .filter
            .process(inputs.input, inputs.sample_rate, playback_speed.min(1.0));

        let send = self.tape.read();
        let delayed = inputs.insert_return.unwrap_or(send);

        let mix = input + params.feedback * delayed;
        self.tape.write(mix, playback_speed);

        TickOutputs { out: delayed, send }
    }
}

/// Tape speed after applying the speed CV. Unpatched CV leaves the knob
/// value as is.
pub fn effective_speed(params: &TickParams, speed_cv: Option<f32>) -> f32 {
    let speed = match speed_cv {
        Some(volts) => {
            params.playback_speed + volts * params.speed_cv_amount / SPEED_CV_VOLTS_PER_UNIT
        }
        None => params.playback_speed,
    };

    // NaN CV falls back to the slowest speed rather than poisoning `tp`.
    if speed.is_nan() {
        MIN_SPEED
    } else {
        speed.clamp(MIN_SPEED, MAX_SPEED)
    }
}

/// Number of tape cells for a tape length at a sample rate.
///
/// The length is clamped to `[MIN_DELAY_TIME_MS, MAX_DELAY_TIME_MS]`
/// (non-finite values fall back to the default) and the result is at
/// least one cell.
pub fn delay_samples(delay_time_ms: f32, sample_rate: f32) -> NonZeroUsize {
    let delay_time_ms = if delay_time_ms.is_finite() {
        delay_time_ms.clamp(MIN_DELAY_TIME_MS, MAX_DELAY_TIME_MS)
    } else {
        DEFAULT_DELAY_TIME_MS
    };
    let sample_rate = if sample_rate.is_finite() {
        sample_rate.max(0.0)
    } else {
        0.0
    };

    let samples = (delay_time_ms / 1000.0 * sample_rate) as usize;
    NonZeroUsize::new(samples).unwrap_or(NonZeroUsize::MIN)
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
