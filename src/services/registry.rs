//! Active session registry - decides entry vs exit for a plate
//!
//! A plate is either Unparked (absent) or Parked (one `ActiveSession`).
//! Presence of the plate means the reading is an exit, absence an entry.

use crate::domain::types::{ActiveSession, PlateId};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;

/// Outcome of feeding a plate to the registry
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryTransition {
    /// Unparked -> Parked, the new session
    Entered(ActiveSession),
    /// Parked -> Unparked, the session that was removed
    Released(ActiveSession),
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: FxHashMap<PlateId, ActiveSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for an unparked plate, or remove the open session of a parked one
    pub fn toggle(&mut self, plate: PlateId, now: DateTime<Utc>) -> RegistryTransition {
        match self.sessions.remove(&plate) {
            Some(session) => RegistryTransition::Released(session),
            None => {
                let session = ActiveSession::new(plate.clone(), now);
                self.sessions.insert(plate, session.clone());
                RegistryTransition::Entered(session)
            }
        }
    }

    /// Insert a session with a known entry time; an existing session for the plate is kept
    pub(crate) fn restore(&mut self, session: ActiveSession) {
        self.sessions.entry(session.plate.clone()).or_insert(session);
    }

    pub fn get(&self, plate: &PlateId) -> Option<&ActiveSession> {
        self.sessions.get(plate)
    }

    pub fn is_parked(&self, plate: &PlateId) -> bool {
        self.sessions.contains_key(plate)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Open sessions ordered by entry time, oldest first
    pub fn sessions(&self) -> Vec<&ActiveSession> {
        let mut sessions: Vec<_> = self.sessions.values().collect();
        sessions.sort_by(|a, b| a.entry_time.cmp(&b.entry_time).then(a.plate.cmp(&b.plate)));
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_first_reading_enters() {
        let mut registry = SessionRegistry::new();
        let plate = PlateId::new("KA01AB1234");

        let transition = registry.toggle(plate.clone(), t0());

        assert_eq!(transition, RegistryTransition::Entered(ActiveSession::new(plate.clone(), t0())));
        assert!(registry.is_parked(&plate));
        assert_eq!(registry.get(&plate).map(|s| s.entry_time), Some(t0()));
    }

    #[test]
    fn test_second_reading_releases() {
        let mut registry = SessionRegistry::new();
        let plate = PlateId::new("KA01AB1234");
        registry.toggle(plate.clone(), t0());

        let transition = registry.toggle(plate.clone(), t0() + Duration::hours(1));

        match transition {
            RegistryTransition::Released(session) => assert_eq!(session.entry_time, t0()),
            other => panic!("expected release, got {other:?}"),
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_third_reading_enters_again() {
        let mut registry = SessionRegistry::new();
        let plate = PlateId::new("AB12");
        registry.toggle(plate.clone(), t0());
        registry.toggle(plate.clone(), t0() + Duration::minutes(10));
        let transition = registry.toggle(plate.clone(), t0() + Duration::minutes(20));

        assert!(matches!(transition, RegistryTransition::Entered(_)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&plate).map(|s| s.entry_time), Some(t0() + Duration::minutes(20)));
    }

    #[test]
    fn test_plates_are_independent() {
        let mut registry = SessionRegistry::new();
        registry.toggle(PlateId::new("AAAA1"), t0());
        registry.toggle(PlateId::new("BBBB2"), t0() + Duration::minutes(1));
        assert_eq!(registry.len(), 2);

        registry.toggle(PlateId::new("AAAA1"), t0() + Duration::minutes(2));
        assert_eq!(registry.len(), 1);
        assert!(registry.is_parked(&PlateId::new("BBBB2")));
    }

    #[test]
    fn test_restore_keeps_existing_session() {
        let mut registry = SessionRegistry::new();
        let plate = PlateId::new("AB12");
        registry.toggle(plate.clone(), t0());
        registry.restore(ActiveSession::new(plate.clone(), t0() - Duration::hours(3)));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&plate).map(|s| s.entry_time), Some(t0()));
    }

    #[test]
    fn test_sessions_sorted_by_entry() {
        let mut registry = SessionRegistry::new();
        registry.toggle(PlateId::new("LATE1"), t0() + Duration::hours(1));
        registry.toggle(PlateId::new("EARLY1"), t0());

        let plates: Vec<_> = registry.sessions().iter().map(|s| s.plate.to_string()).collect();
        assert_eq!(plates, vec!["EARLY1", "LATE1"]);
    }
}
