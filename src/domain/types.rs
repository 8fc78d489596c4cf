//! Shared types for the parking console

use bytes::Bytes;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Canonical plate identifier: uppercase ASCII letters and digits only.
///
/// Construct through `services::plate::normalize` (or `PlateId::new` for
/// values that are already canonical, e.g. seeded data).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlateId(String);

impl PlateId {
    pub fn new(canonical: impl Into<String>) -> Self {
        Self(canonical.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for PlateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.0)
    }
}

/// Format a timestamp as local `HH:MM` for the console
pub fn clock_label(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%H:%M").to_string()
}

/// An open parking interval for a plate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveSession {
    pub plate: PlateId,
    pub entry_time: DateTime<Utc>,
}

impl ActiveSession {
    pub fn new(plate: PlateId, entry_time: DateTime<Utc>) -> Self {
        Self { plate, entry_time }
    }

    pub fn entry_label(&self) -> String {
        clock_label(self.entry_time)
    }
}

/// Status of a closed session. Only exits reach the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Exited,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Exited => "Exited",
        }
    }
}

/// A completed session with its computed charge.
///
/// Fields are private so a record cannot be altered once the ledger holds it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    plate: PlateId,
    entry_time: DateTime<Utc>,
    exit_time: DateTime<Utc>,
    duration_hours: u64,
    cost: f64,
    status: SessionStatus,
}

impl HistoryRecord {
    /// Close a session at `exit_time` with an already computed bill
    pub fn closed(
        session: ActiveSession,
        exit_time: DateTime<Utc>,
        bill: crate::domain::billing::Bill,
    ) -> Self {
        Self {
            plate: session.plate,
            entry_time: session.entry_time,
            exit_time,
            duration_hours: bill.duration_hours,
            cost: bill.cost,
            status: SessionStatus::Exited,
        }
    }

    pub fn plate(&self) -> &PlateId {
        &self.plate
    }

    pub fn duration_hours(&self) -> u64 {
        self.duration_hours
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Local `HH:MM` the vehicle entered
    pub fn entry_label(&self) -> String {
        clock_label(self.entry_time)
    }

    /// Local `HH:MM` the vehicle left
    pub fn exit_label(&self) -> String {
        clock_label(self.exit_time)
    }

    /// e.g. `"3h"`
    pub fn duration_label(&self) -> String {
        format!("{}h", self.duration_hours)
    }

    /// e.g. `"$30"`, or `"$12.5"` for fractional rates
    pub fn cost_label(&self, currency: &str) -> String {
        format!("{}{}", currency, self.cost)
    }
}

/// Output of the recognition engine
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Recognition {
    pub text: String,
    /// Engine certainty, 0..=100
    pub confidence: f64,
}

/// A still frame handed over by the capture device
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub data: Bytes,
    pub captured_at: DateTime<Utc>,
}

impl CapturedImage {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into(), captured_at: Utc::now() }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::Bill;
    use chrono::TimeZone;

    #[test]
    fn test_history_record_labels() {
        let entry = Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap();
        let exit = Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap();
        let session = ActiveSession::new(PlateId::new("TN22AX1111"), entry);
        let record = HistoryRecord::closed(session, exit, Bill { duration_hours: 2, cost: 20.0 });

        assert_eq!(record.duration_label(), "2h");
        assert_eq!(record.cost_label("$"), "$20");
        assert_eq!(record.status().as_str(), "Exited");
        assert_eq!(record.plate().as_str(), "TN22AX1111");
    }

    #[test]
    fn test_history_record_time_labels() {
        let entry = Utc.with_ymd_and_hms(2025, 1, 6, 10, 5, 0).unwrap();
        let exit = Utc.with_ymd_and_hms(2025, 1, 6, 12, 40, 0).unwrap();
        let session = ActiveSession::new(PlateId::new("WB02ZZ3333"), entry);
        let record = HistoryRecord::closed(session, exit, Bill { duration_hours: 3, cost: 30.0 });

        assert_eq!(record.entry_label(), entry.with_timezone(&Local).format("%H:%M").to_string());
        assert_eq!(record.exit_label(), exit.with_timezone(&Local).format("%H:%M").to_string());
        assert_eq!(record.entry_label().len(), 5);
        assert_ne!(record.entry_label(), record.exit_label());
    }

    #[test]
    fn test_fractional_cost_label() {
        let t = Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap();
        let session = ActiveSession::new(PlateId::new("AB12"), t);
        let record = HistoryRecord::closed(session, t, Bill { duration_hours: 1, cost: 12.5 });
        assert_eq!(record.cost_label("€"), "€12.5");
    }

    #[test]
    fn test_history_record_serializes_status() {
        let t = Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap();
        let session = ActiveSession::new(PlateId::new("AB12"), t);
        let record = HistoryRecord::closed(session, t, Bill { duration_hours: 1, cost: 10.0 });

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["plate"], "AB12");
        assert_eq!(json["status"], "Exited");
        assert_eq!(json["duration_hours"], 1);
    }
}
