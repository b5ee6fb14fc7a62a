//! Adaptive threshold backoff.
//!
//! Starts at the default threshold and lowers it by a fixed step until at
//! least one score qualifies or the floor is reached. The first attempt uses
//! the default exactly as configured. Later thresholds are derived from the
//! default each time (not accumulated) and rounded to four decimals, so
//! repeated steps never drift below the floor.

use serde::Serialize;

use crate::semantic::{DEFAULT_MIN_THRESHOLD, DEFAULT_THRESHOLD, DEFAULT_THRESHOLD_STEP};

/// Decimal places kept when stepping the threshold.
const THRESHOLD_PRECISION: f32 = 10_000.0;

/// Parameters of the backoff search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdPolicy {
    /// Starting (most selective) threshold
    pub default: f32,
    /// Lowest threshold the search may reach
    pub floor: f32,
    /// Decrement applied per retry
    pub step: f32,
}

/// Where the backoff search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdOutcome {
    pub threshold: f32,
    /// True only if `threshold` ended below the default
    pub reduced: bool,
    /// Number of thresholds tried
    pub attempts: usize,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            default: DEFAULT_THRESHOLD,
            floor: DEFAULT_MIN_THRESHOLD,
            step: DEFAULT_THRESHOLD_STEP,
        }
    }
}

impl ThresholdPolicy {
    pub fn new(default: f32, floor: f32, step: f32) -> Self {
        Self {
            default,
            floor,
            step,
        }
    }

    /// Outcome reported when no search ran (e.g. blank query).
    pub fn untouched(&self) -> ThresholdOutcome {
        ThresholdOutcome {
            threshold: self.default,
            reduced: false,
            attempts: 0,
        }
    }

    /// Upper bound on attempts: `ceil((default - floor) / step) + 1`.
    pub fn max_attempts(&self) -> usize {
        if self.step <= 0.0 || self.default <= self.floor {
            return 1;
        }
        ((self.default - self.floor) / self.step).ceil() as usize + 1
    }

    /// The sequence of thresholds the search tries, in order.
    ///
    /// Non-increasing, ends at the floor.
    pub fn thresholds(&self) -> impl Iterator<Item = f32> {
        let policy = *self;
        let mut attempt = 0usize;
        let mut done = false;

        std::iter::from_fn(move || {
            if done {
                return None;
            }

            let threshold = if attempt == 0 {
                if policy.step <= 0.0 || policy.default <= policy.floor + f32::EPSILON {
                    done = true;
                }
                policy.default
            } else {
                let stepped = round_threshold(policy.default - attempt as f32 * policy.step);
                if stepped <= policy.floor + f32::EPSILON {
                    done = true;
                    policy.floor
                } else {
                    stepped
                }
            };

            attempt += 1;
            Some(threshold)
        })
    }

    /// Find the most selective threshold that admits at least one score.
    pub fn resolve<I>(&self, scores: I) -> ThresholdOutcome
    where
        I: IntoIterator<Item = f32>,
    {
        let best = scores
            .into_iter()
            .filter(|s| !s.is_nan())
            .fold(f32::NEG_INFINITY, f32::max);

        let mut attempts = 0;
        let mut last = self.default;
        for threshold in self.thresholds() {
            attempts += 1;
            last = threshold;
            if best >= threshold {
                return ThresholdOutcome {
                    threshold,
                    reduced: threshold < self.default,
                    attempts,
                };
            }
        }

        log::debug!(
            "no score reached the floor threshold {} after {} attempts",
            last,
            attempts
        );

        ThresholdOutcome {
            threshold: last,
            reduced: true,
            attempts,
        }
    }
}

fn round_threshold(value: f32) -> f32 {
    (value * THRESHOLD_PRECISION).round() / THRESHOLD_PRECISION
}
