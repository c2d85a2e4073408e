//! Values confined to a configured `[min, max]` range.
//!
//! Writes outside the range are corrected to the nearest bound, never
//! rejected. Every write reports what happened through [`Clamp`] so that
//! callers and tests can observe corrections, and corrections are logged.

use std::fmt;
use tracing::{debug, warn};

/// Outcome of writing a value into a [`BoundedValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clamp {
    /// The value was inside the range and stored as given.
    InRange,
    /// The value was below `min`; `min` was stored.
    RaisedToMin,
    /// The value was above `max`; `max` was stored.
    LoweredToMax,
    /// The value was unordered (NaN); `min` was stored.
    Replaced,
}

impl Clamp {
    /// Whether the stored value differs from the requested one.
    pub fn corrected(self) -> bool {
        self != Self::InRange
    }
}

/// A named value with an inclusive `[min, max]` invariant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundedValue<T> {
    name: &'static str,
    value: T,
    min: T,
    max: T,
}

/// The listen timeout, in seconds.
pub type TimeoutPolicy = BoundedValue<f64>;

impl<T> BoundedValue<T>
where
    T: PartialOrd + Copy + fmt::Display,
{
    /// Create a bounded value, clamping `initial` into range.
    ///
    /// `min` must not exceed `max`; configuration validation guarantees this
    /// for values loaded from disk. If it does, the bounds are swapped.
    pub fn new(name: &'static str, initial: T, min: T, max: T) -> Self {
        let (min, max) = if min > max { (max, min) } else { (min, max) };
        let mut bounded = Self {
            name,
            value: min,
            min,
            max,
        };
        bounded.set(initial);
        bounded
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.value
    }

    /// Lower bound.
    pub fn min(&self) -> T {
        self.min
    }

    /// Upper bound.
    pub fn max(&self) -> T {
        self.max
    }

    /// Compute the stored form of `value` without writing it.
    pub fn clamp(&self, value: T) -> (T, Clamp) {
        match value.partial_cmp(&value) {
            None => (self.min, Clamp::Replaced),
            Some(_) if value < self.min => (self.min, Clamp::RaisedToMin),
            Some(_) if value > self.max => (self.max, Clamp::LoweredToMax),
            Some(_) => (value, Clamp::InRange),
        }
    }

    /// Clamp `value` into range and store it.
    pub fn set(&mut self, value: T) -> Clamp {
        let old = self.value;
        let (stored, outcome) = self.clamp(value);
        log_correction(self.name, value, stored, outcome);
        self.value = stored;
        debug!(setting = self.name, "{} updated: {old} -> {stored}", self.name);
        outcome
    }
}

/// Emit the warning for a corrected write.
pub(crate) fn log_correction<T: fmt::Display>(name: &str, requested: T, stored: T, outcome: Clamp) {
    match outcome {
        Clamp::InRange => {}
        Clamp::RaisedToMin => {
            warn!(setting = name, "{name} {requested} below minimum, clamped to {stored}");
        }
        Clamp::LoweredToMax => {
            warn!(setting = name, "{name} {requested} above maximum, clamped to {stored}");
        }
        Clamp::Replaced => {
            warn!(setting = name, "{name} {requested} is not a number, replaced with {stored}");
        }
    }
}
