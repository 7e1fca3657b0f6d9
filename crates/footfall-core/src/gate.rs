//! Client-local emission gate.
//!
//! A locked estimate is recomputed every frame while the person lingers in
//! view; without a gate the same visitor would be submitted dozens of times
//! per second. The gate suppresses re-emission with a short cooldown and,
//! when an embedding is available, a descriptor-distance check against the
//! last emitted person. Long-window deduplication is the server's job.

use std::time::{Duration, Instant};

use crate::types::euclidean_distance;

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Minimum interval between emissions.
    pub cooldown: Duration,
    /// Euclidean distance below which a descriptor is "the same person".
    pub new_person_threshold: f32,
}

impl GateConfig {
    pub fn kiosk() -> Self {
        Self { cooldown: Duration::from_secs(2), new_person_threshold: 0.6 }
    }

    pub fn standard() -> Self {
        Self { cooldown: Duration::from_secs(3), new_person_threshold: 0.6 }
    }
}

/// Short-window suppression of repeat emissions for the same person.
#[derive(Debug)]
pub struct IdentityGate {
    config: GateConfig,
    last_descriptor: Option<Vec<f32>>,
    last_emit: Option<Instant>,
}

impl IdentityGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config, last_descriptor: None, last_emit: None }
    }

    /// Decide whether a locked estimate may be emitted now.
    ///
    /// Emits iff the cooldown has elapsed since the last emission AND the
    /// candidate looks like a new person: no prior emission, or the
    /// descriptor distance reaches the new-person threshold. Candidates
    /// without a vector descriptor (cloud mode) are gated by the cooldown
    /// alone — identity resolution is deferred to the server.
    ///
    /// On a positive decision the gate records the descriptor and time.
    pub fn check(&mut self, descriptor: Option<&[f32]>, now: Instant) -> bool {
        if let Some(last) = self.last_emit {
            if now.duration_since(last) < self.config.cooldown {
                return false;
            }
        }

        if let (Some(candidate), Some(previous)) = (descriptor, self.last_descriptor.as_deref()) {
            // Unequal-length descriptors are incomparable; treat as a new person.
            if let Some(distance) = euclidean_distance(candidate, previous) {
                if distance < self.config.new_person_threshold {
                    tracing::trace!(distance, "gate: same person within cooldown window");
                    return false;
                }
            }
        }

        self.last_descriptor = descriptor.map(|d| d.to_vec());
        self.last_emit = Some(now);
        true
    }

    /// Forget the last emission (detection toggled off).
    pub fn reset(&mut self) {
        self.last_descriptor = None;
        self.last_emit = None;
    }
}
