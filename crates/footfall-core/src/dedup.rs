//! Server-side duplicate resolution.
//!
//! Decides whether a submitted detection is the same physical person as a
//! detection already stored within the trailing dedup window. Two match
//! procedures, dispatched on the descriptor variant: embedding distance for
//! vector descriptors, bounding-box overlap plus attribute agreement for
//! geometric ones. The geometric path tolerates detector jitter for a
//! person standing in roughly the same spot, at the cost of being less
//! precise for two different people standing close together.

use chrono::{DateTime, Utc};

use crate::types::{euclidean_distance, Descriptor, Gender};

#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Euclidean distance below which two embeddings are the same person.
    pub match_threshold: f32,
    /// IoU above which two normalized boxes are the same person.
    pub iou_threshold: f32,
    /// Maximum |stored age − candidate age| for a geometric match.
    pub age_tolerance: u32,
    /// Trailing window within which stored detections suppress new ones.
    pub window_hours: i64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.6,
            iou_threshold: 0.5,
            age_tolerance: 3,
            window_hours: 12,
        }
    }
}

/// A stored detection from the recent window, with its descriptor parsed.
#[derive(Debug, Clone)]
pub struct StoredFace {
    pub id: i64,
    pub age: u32,
    pub gender: Gender,
    pub descriptor: Descriptor,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of duplicate resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    New,
    /// Same person as a stored row; carries the original sighting so the
    /// caller can report "seen N minutes ago".
    Duplicate { id: i64, last_seen: DateTime<Utc> },
}

#[derive(Debug, Clone, Default)]
pub struct DedupResolver {
    config: DedupConfig,
}

impl DedupResolver {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Compare a candidate against recent stored detections.
    ///
    /// `recent` must already be restricted to the dedup window, newest
    /// first; the first match in scan order wins. Vector candidates are
    /// compared against every stored equal-length vector with no
    /// age/gender pre-filter; geometric candidates only against rows with
    /// equal gender and age within tolerance.
    pub fn resolve(
        &self,
        age: u32,
        gender: Gender,
        descriptor: &Descriptor,
        recent: &[StoredFace],
    ) -> Resolution {
        match descriptor {
            Descriptor::Vector(candidate) => self.resolve_vector(candidate, recent),
            Descriptor::Geometry { bounding_box, .. } => {
                self.resolve_geometry(age, gender, bounding_box, recent)
            }
        }
    }

    fn resolve_vector(&self, candidate: &[f32], recent: &[StoredFace]) -> Resolution {
        for row in recent {
            let Descriptor::Vector(stored) = &row.descriptor else {
                continue;
            };
            // Unequal-length vectors are incomparable, never a match.
            let Some(distance) = euclidean_distance(candidate, stored) else {
                continue;
            };
            if distance < self.config.match_threshold {
                tracing::debug!(id = row.id, distance, "vector descriptor matched stored detection");
                return Resolution::Duplicate { id: row.id, last_seen: row.timestamp };
            }
        }
        Resolution::New
    }

    fn resolve_geometry(
        &self,
        age: u32,
        gender: Gender,
        bounding_box: &crate::types::NormBox,
        recent: &[StoredFace],
    ) -> Resolution {
        for row in recent {
            if row.gender != gender || row.age.abs_diff(age) > self.config.age_tolerance {
                continue;
            }
            let Descriptor::Geometry { bounding_box: stored_box, .. } = &row.descriptor else {
                continue;
            };
            let iou = bounding_box.iou(stored_box);
            if iou > self.config.iou_threshold {
                tracing::debug!(id = row.id, iou, "bounding box matched stored detection");
                return Resolution::Duplicate { id: row.id, last_seen: row.timestamp };
            }
        }
        Resolution::New
    }
}
