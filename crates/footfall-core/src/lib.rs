//! footfall-core — Visitor detection stabilization and deduplication.
//!
//! The kiosk-side pipeline turns noisy per-frame age/gender estimates into
//! one locked estimate per visitor ([`quality`] → [`aggregator`] →
//! [`gate`]); the server-side resolver decides whether a submitted
//! detection repeats a recently stored one ([`dedup`]). The face analysis
//! model itself is an external oracle — this crate only consumes its
//! observations.

pub mod aggregator;
pub mod dedup;
pub mod gate;
pub mod quality;
pub mod types;
pub mod wire;

pub use aggregator::{Estimate, EstimatorConfig, TrackAggregator, TrackConfig, TrackState};
pub use dedup::{DedupConfig, DedupResolver, Resolution, StoredFace};
pub use gate::{GateConfig, IdentityGate};
pub use quality::QualityConfig;
pub use types::{
    age_range_for, euclidean_distance, BoundingBox, Descriptor, Gender, Landmarks, NormBox,
    RawObservation,
};
pub use wire::{StatsReport, Submission, SubmissionOutcome};
