//! Hourly rate cell with an operator edit/commit toggle
//!
//! The rate is read when a session closes, so a change made while vehicles
//! are parked applies to all of them. Accepted input takes effect as soon as
//! it is typed; `commit` only leaves edit mode.

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, PartialEq)]
pub enum RateError {
    #[error("rate is not in edit mode")]
    NotEditing,
    #[error("invalid rate input {0:?}")]
    InvalidInput(String),
}

#[derive(Debug, Clone)]
pub struct RateConfig {
    hourly_rate: f64,
    editing: bool,
}

impl RateConfig {
    pub fn new(hourly_rate: f64) -> Self {
        Self { hourly_rate, editing: false }
    }

    #[inline]
    pub fn hourly_rate(&self) -> f64 {
        self.hourly_rate
    }

    #[inline]
    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn begin_edit(&mut self) {
        self.editing = true;
        info!(hourly_rate = %self.hourly_rate, "rate_edit_started");
    }

    /// Parse operator input and make it the rate in effect.
    ///
    /// Range is unconstrained; only non-numeric and non-finite input is refused,
    /// in which case the previous rate stays in effect.
    pub fn apply_input(&mut self, input: &str) -> Result<f64, RateError> {
        if !self.editing {
            return Err(RateError::NotEditing);
        }
        let value = parse_rate(input).ok_or_else(|| {
            warn!(input = %input, hourly_rate = %self.hourly_rate, "rate_input_rejected");
            RateError::InvalidInput(input.to_string())
        })?;
        self.hourly_rate = value;
        Ok(value)
    }

    /// Leave edit mode. Returns the rate now in effect.
    pub fn commit(&mut self) -> f64 {
        if self.editing {
            self.editing = false;
            info!(hourly_rate = %self.hourly_rate, "rate_committed");
        }
        self.hourly_rate
    }
}

impl Default for RateConfig {
    fn default() -> Self {
        Self::new(10.0)
    }
}

fn parse_rate(input: &str) -> Option<f64> {
    input.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
