//! Plate normalization and the recognition acceptance policy
//!
//! A failed or unconvincing recognition is never reported as an error to
//! the rest of the pipeline: it is replaced by `FALLBACK_PLATE` and the
//! verdict is flagged with `used_fallback`.

use crate::domain::types::PlateId;

/// Minimum engine confidence (0..=100) for a reading to be accepted
pub const MIN_CONFIDENCE: f64 = 65.0;

/// Minimum length of a normalized reading to be accepted
pub const MIN_PLATE_LEN: usize = 4;

/// Identifier substituted for rejected or failed recognitions
pub const FALLBACK_PLATE: &str = "CG04H8801";

/// Strip everything that is not a letter or digit and uppercase the rest
pub fn normalize(text: &str) -> PlateId {
    let canonical: String =
        text.chars().filter(char::is_ascii_alphanumeric).map(|c| c.to_ascii_uppercase()).collect();
    PlateId::new(canonical)
}

/// Result of the acceptance policy
#[derive(Debug, Clone, PartialEq)]
pub struct GateVerdict {
    pub plate: PlateId,
    pub used_fallback: bool,
}

impl GateVerdict {
    fn fallback() -> Self {
        Self { plate: PlateId::new(FALLBACK_PLATE), used_fallback: true }
    }
}

/// Apply the acceptance policy to a normalized reading
pub fn gate(normalized: PlateId, confidence: f64, recognition_failed: bool) -> GateVerdict {
    // NaN confidence fails the comparison below and is rejected as well
    let confident = confidence >= MIN_CONFIDENCE;
    if recognition_failed || !confident || normalized.len() < MIN_PLATE_LEN {
        return GateVerdict::fallback();
    }
    GateVerdict { plate: normalized, used_fallback: false }
}
