//! Scan pipeline: frame -> recognition -> plate -> entry/exit
//!
//! The pipeline coordinates:
//! - Admission (at most one recognition in flight, enforced by `ScanPermit`)
//! - Recognition through a `PlateRecognizer`
//! - Normalization and the acceptance policy (fallback plate on failure)
//! - Entry/exit decision, billing and ledger append on `ParkingState`
//!
//! Because admission is exclusive, state transitions happen strictly in
//! the order recognitions complete.


use crate::domain::types::{CapturedImage, PlateId};
use crate::infra::metrics::Metrics;
use crate::io::ocr::PlateRecognizer;
use crate::services::plate::{gate, normalize};
use crate::services::state::{ParkingState, Transition};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shared handle on the application state
pub type SharedState = Arc<Mutex<ParkingState>>;

#[derive(Debug, Error, PartialEq)]
pub enum ScanError {
    #[error("a scan is already in progress")]
    Busy,
}

/// Console status badge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Ready,
    Scanning,
    Success,
}

/// Outcome of one scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub scan_id: String,
    pub plate: PlateId,
    pub used_fallback: bool,
    /// Engine confidence, `None` when recognition failed
    pub confidence: Option<f64>,
    pub transition: Transition,
}

/// Exclusive right to run a recognition; releases the busy flag on drop
#[derive(Debug)]
pub struct ScanPermit<'a> {
    busy: &'a AtomicBool,
}

impl Drop for ScanPermit<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Time since the frame was captured
fn frame_age_ms(image: &CapturedImage) -> i64 {
    (Utc::now() - image.captured_at).num_milliseconds()
}

pub struct ScanPipeline {
    recognizer: Arc<dyn PlateRecognizer>,
    state: SharedState,
    metrics: Arc<Metrics>,
    language: String,
    busy: AtomicBool,
    /// Plate of the last completed scan
    last_plate: Mutex<Option<PlateId>>,
}

impl ScanPipeline {
    pub fn new(
        recognizer: Arc<dyn PlateRecognizer>,
        state: SharedState,
        metrics: Arc<Metrics>,
        language: &str,
    ) -> Self {
        Self {
            recognizer,
            state,
            metrics,
            language: language.to_string(),
            busy: AtomicBool::new(false),
            last_plate: Mutex::new(None),
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    #[inline]
    pub fn is_scanning(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn status(&self) -> ScanStatus {
        if self.is_scanning() {
            ScanStatus::Scanning
        } else if self.last_plate.lock().is_some() {
            ScanStatus::Success
        } else {
            ScanStatus::Ready
        }
    }

    /// Plate of the most recent completed scan
    pub fn last_plate(&self) -> Option<PlateId> {
        self.last_plate.lock().clone()
    }

    /// Admit a new recognition, or refuse if one is still in flight
    pub fn try_admit(&self) -> Result<ScanPermit<'_>, ScanError> {
        match self.busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => Ok(ScanPermit { busy: &self.busy }),
            Err(_) => {
                self.metrics.record_busy_rejection();
                warn!("scan_rejected_busy");
                Err(ScanError::Busy)
            }
        }
    }

    /// Scan a frame, applying the transition at the wall-clock completion time
    pub async fn scan(&self, image: CapturedImage) -> Result<ScanReport, ScanError> {
        let permit = self.try_admit()?;
        let (plate, used_fallback, confidence) = self.recognize_plate(&image).await;
        Ok(self.complete(permit, plate, used_fallback, confidence, Utc::now()))
    }

    /// Scan a frame, applying the transition at `now`
    pub async fn scan_at(
        &self,
        image: CapturedImage,
        now: DateTime<Utc>,
    ) -> Result<ScanReport, ScanError> {
        let permit = self.try_admit()?;
        let (plate, used_fallback, confidence) = self.recognize_plate(&image).await;
        Ok(self.complete(permit, plate, used_fallback, confidence, now))
    }

    /// Run recognition and the acceptance policy. Never fails: engine errors
    /// and weak readings both resolve to the fallback plate.
    async fn recognize_plate(&self, image: &CapturedImage) -> (PlateId, bool, Option<f64>) {
        let start = Instant::now();
        let result = self.recognizer.recognize(image, &self.language).await;
        let latency_ms = start.elapsed().as_millis() as u64;
        self.metrics.record_recognition(latency_ms, result.is_err());

        let (verdict, raw_text, confidence) = match result {
            Ok(recognition) => {
                let normalized = normalize(&recognition.text);
                debug!(
                    raw = %recognition.text.trim(),
                    normalized = %normalized,
                    confidence = %recognition.confidence,
                    latency_ms = %latency_ms,
                    frame_age_ms = %frame_age_ms(image),
                    "recognition_complete"
                );
                (
                    gate(normalized, recognition.confidence, false),
                    Some(recognition.text),
                    Some(recognition.confidence),
                )
            }
            Err(e) => {
                warn!(
                    error = %e,
                    latency_ms = %latency_ms,
                    frame_age_ms = %frame_age_ms(image),
                    "recognition_failed"
                );
                (gate(PlateId::new(""), 0.0, true), None, None)
            }
        };

        if verdict.used_fallback {
            self.metrics.record_fallback();
            warn!(
                plate = %verdict.plate,
                raw = ?raw_text.as_deref().map(str::trim),
                confidence = ?confidence,
                "scan_fallback"
            );
        }

        (verdict.plate, verdict.used_fallback, confidence)
    }

    fn complete(
        &self,
        permit: ScanPermit<'_>,
        plate: PlateId,
        used_fallback: bool,
        confidence: Option<f64>,
        now: DateTime<Utc>,
    ) -> ScanReport {
        let transition = self.state.lock().apply(plate.clone(), now);
        match transition {
            Transition::Entry { .. } => self.metrics.record_entry(),
            Transition::Exit { .. } => self.metrics.record_exit(),
        }
        *self.last_plate.lock() = Some(plate.clone());

        let scan_id = Uuid::now_v7().to_string();
        info!(
            scan_id = %scan_id,
            plate = %plate,
            used_fallback = %used_fallback,
            transition = %transition.as_str(),
            "scan_complete"
        );

        // state is updated before the next scan can be admitted
        drop(permit);

        ScanReport { scan_id, plate, used_fallback, confidence, transition }
    }
}
