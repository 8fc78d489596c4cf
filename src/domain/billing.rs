//! Billable duration and cost for a closing session

use chrono::{DateTime, Utc};
use serde::Serialize;

const MS_PER_HOUR: i64 = 3_600_000;

/// Charge for one closed session
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bill {
    pub duration_hours: u64,
    pub cost: f64,
}

/// Compute the bill for a session.
///
/// Every started hour is billed, with a one hour minimum (also when the
/// exit timestamp is not after the entry). The cost is not rounded.
pub fn bill(entry_time: DateTime<Utc>, exit_time: DateTime<Utc>, hourly_rate: f64) -> Bill {
    let elapsed_ms = (exit_time - entry_time).num_milliseconds();
    let started_hours = if elapsed_ms <= 0 {
        0
    } else {
        (elapsed_ms + MS_PER_HOUR - 1) / MS_PER_HOUR
    };
    let duration_hours = started_hours.max(1) as u64;

    Bill { duration_hours, cost: duration_hours as f64 * hourly_rate }
}
