//! # DSP Primitives
//!
//! The two building blocks of the tape delay:
//!
//! - **`delay_line`**: the tape loop. A ring buffer written by a record
//!   head that moves at a variable, fractional speed and read by a
//!   playback head a fixed distance ahead of it.
//!
//! - **`filter`**: a 4-pole lowpass that keeps a slowed-down tape from
//!   aliasing by tracking the playback speed with its cutoff.

pub mod delay_line;
pub mod filter;
