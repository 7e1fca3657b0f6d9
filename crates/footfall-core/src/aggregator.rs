//! Temporal aggregation of per-frame observations into one stable estimate.
//!
//! A track is the continuous observation of what is believed to be one
//! physical face, bounded by no-face timeouts. Per-frame age/gender output
//! from detection models is noisy — expression, pose and lighting swing the
//! age by a decade frame to frame. The aggregator keeps a bounded rolling
//! buffer of accepted observations, strips outliers, computes a
//! quality-weighted estimate, and freezes ("locks") it once enough samples
//! have accumulated. After the lock, later frames cannot move the estimate
//! for the life of the track.
//!
//! All state is owned by [`TrackAggregator`] and time is an injected
//! [`Instant`], so the state machine is driven entirely by its caller.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::types::{age_range_for, Gender, RawObservation};

/// Track lifecycle parameters.
#[derive(Debug, Clone)]
pub struct TrackConfig {
    /// Rolling buffer capacity; oldest samples are evicted FIFO.
    pub buffer_capacity: usize,
    /// Minimum filtered samples before any estimate is produced.
    pub min_samples: usize,
    /// Filtered samples required to lock the estimate.
    pub lock_threshold: usize,
    /// No qualifying face for this long ends the track.
    pub no_face_timeout: Duration,
}

impl TrackConfig {
    pub fn kiosk() -> Self {
        Self {
            buffer_capacity: 30,
            min_samples: 3,
            lock_threshold: 5,
            no_face_timeout: Duration::from_secs(3),
        }
    }

    pub fn standard() -> Self {
        Self {
            buffer_capacity: 30,
            min_samples: 3,
            lock_threshold: 15,
            no_face_timeout: Duration::from_secs(5),
        }
    }
}

/// Tunable parameters of the age/gender estimator.
///
/// Defaults match the high-accuracy entrance profile; deployments tune
/// these rather than patch constants.
#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    /// IQR fence multiplier for the first outlier pass.
    pub outlier_iqr_k: f32,
    /// Fraction trimmed from each end for the trimmed mean.
    pub trim_fraction: f32,
    /// MAD multiplier for the second outlier pass.
    pub mad_multiplier: f32,
    /// Absolute floor (years) for the MAD rejection band.
    pub min_mad_margin: f32,
    /// Minimum samples an outlier pass must retain before falling back.
    pub min_filtered: usize,
    /// Weight of the plain median in the final blend (rest is weighted mean).
    pub median_blend: f32,
    /// Exponent on the detector score in the sample weight.
    pub score_exp: f32,
    /// Exponent on the gender confidence in the sample weight.
    pub confidence_exp: f32,
    /// Exponent on the landmark quality in the sample weight.
    pub landmark_exp: f32,
    /// Face size (px) at which the size factor saturates at 1.0.
    pub size_norm: f32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            outlier_iqr_k: 1.5,
            trim_fraction: 0.15,
            mad_multiplier: 2.5,
            min_mad_margin: 3.0,
            min_filtered: 5,
            median_blend: 0.3,
            score_exp: 2.0,
            confidence_exp: 1.5,
            landmark_exp: 2.0,
            size_norm: 200.0,
        }
    }
}

/// Observable phase of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// No buffered samples.
    Empty,
    /// Too few samples for any estimate.
    Filling,
    /// Provisional estimates, not yet locked.
    Analyzing,
    /// Estimate frozen for the remainder of the track.
    Locked,
}

#[derive(Debug, Clone, Copy)]
struct LockedEstimate {
    age: u32,
    gender: Gender,
}

/// Aggregated estimate for the current track.
#[derive(Debug, Clone)]
pub struct Estimate {
    pub age: u32,
    pub gender: Gender,
    /// Mean gender confidence over the filtered buffer.
    pub confidence: f32,
    /// Confidence-scaled display band.
    pub age_range: (u32, u32),
    /// Newest buffered embedding, if any sample carried one.
    pub descriptor: Option<Vec<f32>>,
    pub locked: bool,
}

/// Per-track rolling buffer, estimator and lock.
#[derive(Debug)]
pub struct TrackAggregator {
    track: TrackConfig,
    estimator: EstimatorConfig,
    buffer: VecDeque<RawObservation>,
    locked: Option<LockedEstimate>,
    last_face_seen: Option<Instant>,
}

impl TrackAggregator {
    pub fn new(track: TrackConfig, estimator: EstimatorConfig) -> Self {
        let capacity = track.buffer_capacity;
        Self {
            track,
            estimator,
            buffer: VecDeque::with_capacity(capacity),
            locked: None,
            last_face_seen: None,
        }
    }

    /// Push one quality-accepted observation. Evicts the oldest sample
    /// when the buffer is full.
    pub fn observe(&mut self, obs: RawObservation, now: Instant) {
        if self.buffer.len() == self.track.buffer_capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(obs);
        self.last_face_seen = Some(now);
    }

    /// Report a frame with no qualifying face. Ends the track once the
    /// no-face timeout elapses; the next face starts fresh.
    pub fn note_no_face(&mut self, now: Instant) {
        if let Some(seen) = self.last_face_seen {
            if now.duration_since(seen) > self.track.no_face_timeout {
                tracing::debug!(
                    samples = self.buffer.len(),
                    was_locked = self.locked.is_some(),
                    "no-face timeout, resetting track"
                );
                self.reset();
            }
        }
    }

    /// Clear all track state (detection toggled off, or person emitted).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.locked = None;
        self.last_face_seen = None;
    }

    pub fn state(&self) -> TrackState {
        if self.locked.is_some() {
            TrackState::Locked
        } else if self.buffer.is_empty() {
            TrackState::Empty
        } else if self.buffer.len() < self.track.min_samples {
            TrackState::Filling
        } else {
            TrackState::Analyzing
        }
    }

    pub fn sample_count(&self) -> usize {
        self.buffer.len()
    }

    /// Current aggregated estimate, or `None` while the buffer is filling.
    ///
    /// While unlocked this recomputes the outlier-filtered weighted
    /// estimate; once the filtered set reaches the lock threshold the
    /// (age, gender) pair is frozen and returned verbatim thereafter.
    pub fn estimate(&mut self) -> Option<Estimate> {
        if self.buffer.len() < self.track.min_samples {
            return None;
        }

        let samples: Vec<&RawObservation> = self.buffer.iter().collect();
        let filtered = self.remove_outliers(&samples);
        if filtered.len() < self.track.min_samples {
            return None;
        }

        let confidence =
            filtered.iter().map(|o| o.gender_confidence).sum::<f32>() / filtered.len() as f32;

        let (age, gender) = match self.locked {
            Some(lock) => (lock.age, lock.gender),
            None => {
                let age = self.blended_age(&filtered).round().max(1.0) as u32;
                let gender = dominant_gender(&filtered);
                if filtered.len() >= self.track.lock_threshold {
                    self.locked = Some(LockedEstimate { age, gender });
                    tracing::debug!(age, %gender, samples = filtered.len(), "estimate locked");
                }
                (age, gender)
            }
        };

        let descriptor = self
            .buffer
            .iter()
            .rev()
            .find_map(|o| o.descriptor.as_ref().filter(|d| !d.is_empty()).cloned());

        Some(Estimate {
            age,
            gender,
            confidence,
            age_range: age_range_for(age, confidence),
            descriptor,
            locked: self.locked.is_some(),
        })
    }

    /// Two-stage outlier removal over the age dimension.
    ///
    /// Stage 1: IQR fence. Stage 2: trimmed-mean / MAD band. Each stage
    /// falls back to its input when it would retain fewer than
    /// `min_filtered` samples, so a ≥5-sample buffer never filters to
    /// empty.
    fn remove_outliers<'a>(&self, samples: &[&'a RawObservation]) -> Vec<&'a RawObservation> {
        if samples.len() < 10 {
            return samples.to_vec();
        }
        let cfg = &self.estimator;

        let mut ages: Vec<f32> = samples.iter().map(|o| o.age).collect();
        ages.sort_by(|a, b| a.total_cmp(b));
        let q1 = ages[ages.len() / 4];
        let q3 = ages[ages.len() * 3 / 4];
        let iqr = q3 - q1;
        let lower = q1 - cfg.outlier_iqr_k * iqr;
        let upper = q3 + cfg.outlier_iqr_k * iqr;

        let fenced: Vec<&RawObservation> = samples
            .iter()
            .copied()
            .filter(|o| o.age >= lower && o.age <= upper)
            .collect();
        if fenced.len() < cfg.min_filtered {
            return samples.to_vec();
        }

        let mut fenced_ages: Vec<f32> = fenced.iter().map(|o| o.age).collect();
        fenced_ages.sort_by(|a, b| a.total_cmp(b));
        // An over-tuned trim fraction (≥ 0.5) must not empty the core slice.
        let trim = ((fenced_ages.len() as f32 * cfg.trim_fraction).floor() as usize)
            .min((fenced_ages.len() - 1) / 2);
        let core = &fenced_ages[trim..fenced_ages.len() - trim];
        let trimmed_mean = core.iter().sum::<f32>() / core.len() as f32;

        let mut deviations: Vec<f32> =
            fenced_ages.iter().map(|a| (a - trimmed_mean).abs()).collect();
        deviations.sort_by(|a, b| a.total_cmp(b));
        let mad = deviations[deviations.len() / 2];
        let band = (cfg.mad_multiplier * mad).max(cfg.min_mad_margin);

        let robust: Vec<&RawObservation> = fenced
            .iter()
            .copied()
            .filter(|o| (o.age - trimmed_mean).abs() <= band)
            .collect();
        if robust.len() >= cfg.min_filtered {
            robust
        } else {
            fenced
        }
    }

    /// Quality- and recency-weighted mean age, blended with the plain
    /// median to resist a skewed weight distribution.
    fn blended_age(&self, samples: &[&RawObservation]) -> f32 {
        let cfg = &self.estimator;
        if samples.len() < 3 {
            return samples.iter().map(|o| o.age).sum::<f32>() / samples.len() as f32;
        }

        let mut weighted_sum = 0.0f32;
        let mut total_weight = 0.0f32;
        for (i, obs) in samples.iter().enumerate() {
            let recency = (i + 1) as f32 / samples.len() as f32;
            let quality = obs.detection_score.powf(cfg.score_exp)
                * obs.gender_confidence.powf(cfg.confidence_exp)
                * obs.landmark_quality.powf(cfg.landmark_exp)
                * (1.0 - obs.face_angle / 90.0).max(0.0)
                * (obs.bounding_box.min_side() / cfg.size_norm).min(1.0);
            let weight = recency * quality;
            weighted_sum += obs.age * weight;
            total_weight += weight;
        }

        let median = median_age(samples);
        if total_weight <= f32::EPSILON {
            // All weights degenerate (e.g. every face at 90°); the median
            // is still well defined.
            return median;
        }
        let weighted = weighted_sum / total_weight;
        weighted * (1.0 - cfg.median_blend) + median * cfg.median_blend
    }
}

fn median_age(samples: &[&RawObservation]) -> f32 {
    let mut ages: Vec<f32> = samples.iter().map(|o| o.age).collect();
    ages.sort_by(|a, b| a.total_cmp(b));
    let mid = ages.len() / 2;
    if ages.len() % 2 == 0 {
        (ages[mid - 1] + ages[mid]) / 2.0
    } else {
        ages[mid]
    }
}

/// Gender with the largest accumulated `gender_confidence × detection_score`.
/// Ties break toward the label seen first in buffer order (deterministic).
fn dominant_gender(samples: &[&RawObservation]) -> Gender {
    let mut scores: Vec<(Gender, f32)> = Vec::with_capacity(2);
    for obs in samples {
        let contribution = obs.gender_confidence * obs.detection_score;
        match scores.iter_mut().find(|(g, _)| *g == obs.gender) {
            Some((_, s)) => *s += contribution,
            None => scores.push((obs.gender, contribution)),
        }
    }
    scores
        .iter()
        .fold(None::<(Gender, f32)>, |best, &(g, s)| match best {
            Some((_, bs)) if bs >= s => best,
            _ => Some((g, s)),
        })
        .map(|(g, _)| g)
        .unwrap_or(Gender::Unknown)
}
