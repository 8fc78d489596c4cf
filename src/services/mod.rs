//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `plate` - Plate normalization and the acceptance policy
//! - `registry` - Active sessions keyed by plate
//! - `ledger` - Closed sessions, newest first
//! - `rate` - Hourly rate with its edit mode
//! - `state` - Registry, ledger and rate behind a single writer
//! - `scanner` - Scan pipeline and in-flight admission

pub mod ledger;
pub mod plate;
pub mod rate;
pub mod registry;
pub mod scanner;
pub mod state;

// Re-export commonly used types
pub use ledger::HistoryLedger;
pub use rate::{RateConfig, RateError};
pub use registry::SessionRegistry;
pub use scanner::{ScanError, ScanPipeline, ScanReport, ScanStatus, SharedState};
pub use state::{ParkingState, Transition};
