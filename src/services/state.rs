//! Application state owned by the scan pipeline
//!
//! Bundles the session registry, history ledger and rate so their single
//! writer and lifetime are explicit. Nothing here is persisted.

use crate::domain::billing::{bill, Bill};
use crate::domain::types::{ActiveSession, HistoryRecord, PlateId};
use crate::services::ledger::HistoryLedger;
use crate::services::rate::RateConfig;
use crate::services::registry::{RegistryTransition, SessionRegistry};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

/// What a gated plate did to the state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Entry { session: ActiveSession },
    Exit { record: HistoryRecord },
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Entry { .. } => "entry",
            Transition::Exit { .. } => "exit",
        }
    }
}

#[derive(Debug, Default)]
pub struct ParkingState {
    registry: SessionRegistry,
    ledger: HistoryLedger,
    rate: RateConfig,
}

impl ParkingState {
    pub fn new(hourly_rate: f64) -> Self {
        Self {
            registry: SessionRegistry::new(),
            ledger: HistoryLedger::new(),
            rate: RateConfig::new(hourly_rate),
        }
    }

    /// Feed a gated plate: enter if unparked, otherwise bill at the current rate and exit
    pub fn apply(&mut self, plate: PlateId, now: DateTime<Utc>) -> Transition {
        match self.registry.toggle(plate, now) {
            RegistryTransition::Entered(session) => {
                info!(
                    plate = %session.plate,
                    entry_time = %session.entry_time,
                    active = %self.registry.len(),
                    "session_entry"
                );
                Transition::Entry { session }
            }
            RegistryTransition::Released(session) => {
                let hourly_rate = self.rate.hourly_rate();
                let charge = bill(session.entry_time, now, hourly_rate);
                let record = HistoryRecord::closed(session, now, charge);
                info!(
                    plate = %record.plate(),
                    duration_hours = %record.duration_hours(),
                    hourly_rate = %hourly_rate,
                    cost = %record.cost(),
                    active = %self.registry.len(),
                    "session_exit"
                );
                self.ledger.append(record.clone());
                Transition::Exit { record }
            }
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    pub fn rate(&self) -> &RateConfig {
        &self.rate
    }

    pub fn rate_mut(&mut self) -> &mut RateConfig {
        &mut self.rate
    }

    /// Load the demonstration data the console shows on a fresh start:
    /// three parked vehicles and two past payments.
    pub fn seed_demo_data(&mut self, now: DateTime<Utc>) {
        for (plate, ago) in [
            ("KA01AB1234", Duration::hours(1)),
            ("DL8CNB5678", Duration::hours(2)),
            ("MH12PQ9999", Duration::minutes(30)),
        ] {
            self.registry.restore(ActiveSession::new(PlateId::new(plate), now - ago));
        }

        // appended oldest first so TN22AX1111 ends up at the head
        let past = [
            ("WB02ZZ3333", Duration::minutes(390), Duration::minutes(330), 1, 10.0),
            ("TN22AX1111", Duration::hours(5), Duration::hours(3), 2, 20.0),
        ];
        for (plate, entered_ago, exited_ago, duration_hours, cost) in past {
            let session = ActiveSession::new(PlateId::new(plate), now - entered_ago);
            self.ledger.append(HistoryRecord::closed(
                session,
                now - exited_ago,
                Bill { duration_hours, cost },
            ));
        }

        info!(
            active = %self.registry.len(),
            history = %self.ledger.len(),
            "demo_data_seeded"
        );
    }
}
