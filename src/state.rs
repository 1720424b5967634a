//! # Persisted Tape Length
//!
//! The tape length is not an automatable parameter: changing it wipes the
//! tape. It is stored alongside the parameters as one persisted field,
//! `delay_time_ms`, and can be set from three places:
//!
//! - the "Tape Length" menu parameter (any thread, via its callback),
//! - a restored preset or project (main thread, via [`PersistentField`]),
//! - `initialize()` (reads it).
//!
//! None of these may touch the tape itself, which belongs to the audio
//! thread. Instead they store the new length and raise a flag; the audio
//! thread picks the flag up at the start of the next block and rebuilds
//! the tape there.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use atomic_float::AtomicF32;
use nih_plug::params::persist::PersistentField;
use nih_plug::prelude::*;
use serde_json::Value;

use crate::engine::DEFAULT_DELAY_TIME_MS;

/// The tape length in milliseconds plus a "needs rebuilding" flag.
///
/// Clones share the same length and flag, so the menu callback can hold
/// one while the parameter struct holds another.
#[derive(Debug, Clone)]
pub struct PersistedDelayTime {
    delay_time_ms: Arc<AtomicF32>,
    recompute_pending: Arc<AtomicBool>,
}

impl Default for PersistedDelayTime {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY_TIME_MS)
    }
}

impl PersistedDelayTime {
    pub fn new(delay_time_ms: f32) -> Self {
        Self {
            delay_time_ms: Arc::new(AtomicF32::new(delay_time_ms)),
            recompute_pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The current tape length.
    pub fn get(&self) -> f32 {
        self.delay_time_ms.load(Ordering::Relaxed)
    }

    /// Store a new tape length and ask the audio thread to rebuild the
    /// tape. Rebuilds even if the length is unchanged.
    pub fn store(&self, delay_time_ms: f32) {
        self.delay_time_ms.store(delay_time_ms, Ordering::Relaxed);
        self.recompute_pending.store(true, Ordering::Release);
    }

    /// Consume the rebuild request. Returns the length to rebuild with,
    /// or `None` if nothing changed since the last call.
    pub fn take_pending(&self) -> Option<f32> {
        self.recompute_pending
            .swap(false, Ordering::AcqRel)
            .then(|| self.get())
    }

    /// The persisted representation: a single JSON number.
    pub fn to_json(&self) -> Value {
        serde_json::Number::from_f64(self.get() as f64)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }

    /// Apply a persisted value. Anything that is not a number is treated
    /// as if the field were missing: the current length is kept and no
    /// rebuild is requested.
    pub fn apply_json(&self, value: &Value) -> bool {
        match value.as_f64() {
            Some(delay_time_ms) => {
                self.store(delay_time_ms as f32);
                true
            }
            None => {
                nih_warn!(
                    "Ignoring persisted delay_time_ms {value}, keeping {} ms",
                    self.get()
                );
                false
            }
        }
    }
}

impl<'a> PersistentField<'a, Value> for PersistedDelayTime {
    fn set(&self, new_value: Value) {
        self.apply_json(&new_value);
    }

    fn map<F, R>(&self, f: F) -> R
    where
        F: Fn(&Value) -> R,
    {
        f(&self.to_json())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
