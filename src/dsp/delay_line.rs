//! # Tape Delay Line (Variable-Speed Ring Buffer)
//!
//! A fixed-length loop of "tape" with a record head that moves at a
//! variable speed and a playback head that rides a fixed distance ahead
//! of it.
//!
//! ## Heads
//!
//! The record head position `tp` is continuous, not an integer index.
//! Every tick it moves forward by `playback_speed` cells:
//!
//! - speed 1.0 → one cell per tick, the tape plays back at pitch
//! - speed 0.5 → half a cell per tick, every other tick writes nothing
//! - speed 2.0 → two cells per tick, each tick writes two cells
//!
//! The playback head sits [`FIXED_OFFSET`] cells ahead of the record head
//! (which, on a loop, is `len - FIXED_OFFSET` cells behind it). Because
//! the playback head is tied to the record head, changing speed changes
//! how much time is stored between the two heads, and therefore the pitch
//! of what comes back out. That is the tape-speed effect.
//!
//! ## Write Span
//!
//! When the record head crosses one or more integer cell boundaries in a
//! tick, each crossed cell gets a value interpolated between the previous
//! tick's mix and this tick's mix, at the point in time where the head
//! crossed it:
//!
//! ```text
//! for ip in floor(tp)+1 ..= floor(tp + speed):
//!     p = (ip - tp) / speed          (0..1, fraction of this tick)
//!     buffer[ip % len] = last_mix * (1 - p) + mix * p
//! ```
//!
//! This is what keeps a sped-up or slowed-down tape from sounding
//! stair-stepped.

use std::num::NonZeroUsize;

/// Distance in cells between the record head and the playback head.
pub const FIXED_OFFSET: f32 = 50.0;

/// The tape loop.
///
/// The buffer is allocated once with a fixed capacity. Changing the tape
/// length afterwards only re-zeroes the buffer within that capacity, so
/// it is safe to do from the audio thread.
#[derive(Debug, Clone)]
pub struct TapeDelayLine {
    /// The tape. `buffer.len()` is the current loop length in cells and
    /// is never zero.
    buffer: Vec<f32>,

    /// Record head position in `[0, len)`. Kept in `f64` so a 0.1 cell
    /// step still moves it at the far end of a minute-long tape.
    tp: f64,

    /// The mix value written on the previous tick, used as the left
    /// endpoint of this tick's write span.
    last_mix: f32,
}

impl TapeDelayLine {
    /// Create a loop of `len` cells with room to grow to `capacity`
    /// cells later without allocating.
    pub fn new(len: NonZeroUsize, capacity: NonZeroUsize) -> Self {
        let mut buffer = Vec::with_capacity(capacity.get().max(len.get()));
        buffer.resize(len.get(), 0.0);

        Self {
            buffer,
            tp: 0.0,
            last_mix: 0.0,
        }
    }

    /// Current loop length in cells.
    pub fn len(&self) -> NonZeroUsize {
        // `new()` and `set_len()` never leave the buffer empty.
        NonZeroUsize::new(self.buffer.len()).unwrap_or(NonZeroUsize::MIN)
    }

    /// The longest loop this delay line can switch to without allocating.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Record head position.
    pub fn write_position(&self) -> f64 {
        self.tp
    }

    /// Grow the reserved capacity. Allocates, so only call this from
    /// `initialize()` or another non-realtime context.
    pub fn reserve(&mut self, capacity: NonZeroUsize) {
        let additional = capacity.get().saturating_sub(self.buffer.len());
        self.buffer.reserve(additional);
    }

    /// Switch to a loop of `len` cells: the tape is wiped to silence and
    /// the record head returns to 0.
    ///
    /// Lengths beyond the reserved capacity are clamped to it so this
    /// never allocates. Returns the length actually applied.
    pub fn set_len(&mut self, len: NonZeroUsize) -> NonZeroUsize {
        let len = NonZeroUsize::new(len.get().min(self.buffer.capacity()))
            .unwrap_or(NonZeroUsize::MIN);

        self.buffer.clear();
        self.buffer.resize(len.get(), 0.0);
        self.tp = 0.0;

        len
    }

    /// Wipe the tape, rewind the record head and forget the last mix.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.tp = 0.0;
        self.last_mix = 0.0;
    }

    /// Read the playback head: [`FIXED_OFFSET`] cells ahead of the record
    /// head, linearly interpolated between the two neighboring cells.
    pub fn read(&self) -> f32 {
        let len = self.buffer.len();
        let rp = (self.tp + FIXED_OFFSET as f64).rem_euclid(len as f64);

        // `rem_euclid` can round up to exactly `len` for values just
        // below a multiple of it.
        let irp = (rp as usize).min(len - 1);
        let irp1 = (irp + 1) % len;
        let frac = (rp - irp as f64) as f32;

        (1.0 - frac) * self.buffer[irp] + frac * self.buffer[irp1]
    }

    /// Advance the record head by `speed` cells, writing `mix` into every
    /// cell it crosses (see the module docs for the interpolation).
    ///
    /// `speed` must be positive; the engine clamps it to `[0.1, 2.0]`.
    pub fn write(&mut self, mix: f32, speed: f32) {
        let len = self.buffer.len();
        let speed = speed as f64;
        let new_tp = self.tp + speed;

        let itp = self.tp as usize;
        let new_itp = new_tp as usize;
        for ip in (itp + 1)..=new_itp {
            let p = ((ip as f64 - self.tp) / speed) as f32;
            self.buffer[ip % len] = self.last_mix * (1.0 - p) + mix * p;
        }

        self.last_mix = mix;
        self.tp = new_tp.rem_euclid(len as f64);
        if self.tp >= len as f64 {
            self.tp = 0.0;
        }
    }

    #[cfg(test)]
    fn cells(&self) -> &[f32] {
        &self.buffer
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
