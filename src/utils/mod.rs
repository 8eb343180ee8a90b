//! Shared helpers used across the support layer.

pub mod convert;
pub mod pattern;
pub mod serde;

pub use convert::{convert_value, json_type_name};
pub use pattern::{matches_any, matches_glob, matches_pattern, split_globs};

use crate::constants::defaults;
use std::time::Duration;

/// Raise a zero period to the minimum tick; tokio interval timers reject zero
pub fn tick_period(period: Duration) -> Duration {
    period.max(Duration::from_millis(defaults::MIN_TICK_PERIOD_MS))
}
