//! Domain models - core parking types and billing
//!
//! - `PlateId` - canonical plate identifier, key of an active session
//! - `ActiveSession` / `HistoryRecord` - open and closed parking intervals
//! - `Recognition` / `CapturedImage` - recognition engine input and output
//! - `billing` - billable hours and cost for a closing session

pub mod billing;
pub mod types;

pub use billing::{bill, Bill};
pub use types::{ActiveSession, CapturedImage, HistoryRecord, PlateId, Recognition, SessionStatus};
