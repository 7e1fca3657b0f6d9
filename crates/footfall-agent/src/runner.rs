//! Pipeline runner: one oracle call per tick, observations through the
//! quality filter, the track aggregator and the identity gate, emitting at
//! most one submission per tick.

use std::time::Instant;

use footfall_core::{
    BoundingBox, Descriptor, EstimatorConfig, GateConfig, IdentityGate, NormBox, QualityConfig,
    RawObservation, Submission, TrackAggregator, TrackConfig,
};
use tracing::{debug, info};

use crate::oracle::{FaceOracle, OracleError};

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub quality: QualityConfig,
    pub track: TrackConfig,
    pub estimator: EstimatorConfig,
    pub gate: GateConfig,
    /// Frame dimensions in pixels, for normalizing geometry payloads.
    pub frame_width: f32,
    pub frame_height: f32,
}

impl RunnerConfig {
    pub fn kiosk() -> Self {
        Self {
            quality: QualityConfig::kiosk(),
            track: TrackConfig::kiosk(),
            estimator: EstimatorConfig::default(),
            gate: GateConfig::kiosk(),
            frame_width: 640.0,
            frame_height: 480.0,
        }
    }

    pub fn standard() -> Self {
        Self {
            quality: QualityConfig::standard(),
            track: TrackConfig::standard(),
            estimator: EstimatorConfig::default(),
            gate: GateConfig::standard(),
            frame_width: 640.0,
            frame_height: 480.0,
        }
    }
}

pub struct PipelineRunner {
    config: RunnerConfig,
    aggregator: TrackAggregator,
    gate: IdentityGate,
    /// Stamps each oracle call; results carrying an older stamp arrive
    /// after a stop/reset and are discarded.
    generation: u64,
    /// Last quality-accepted box, source of the geometry payload.
    last_box: Option<BoundingBox>,
}

impl PipelineRunner {
    pub fn new(config: RunnerConfig) -> Self {
        let aggregator = TrackAggregator::new(config.track.clone(), config.estimator.clone());
        let gate = IdentityGate::new(config.gate.clone());
        Self { config, aggregator, gate, generation: 0, last_box: None }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Abandon the current track. Any oracle result still in flight is
    /// stamped with the old generation and will be ignored.
    pub fn stop(&mut self) {
        self.generation += 1;
        self.aggregator.reset();
        self.gate.reset();
        self.last_box = None;
    }

    /// Run one tick: ask the oracle for the current frame's observations
    /// and feed them through the pipeline.
    pub async fn tick<O: FaceOracle>(
        &mut self,
        oracle: &mut O,
    ) -> Result<Option<Submission>, OracleError> {
        let generation = self.generation;
        let observations = oracle.analyze().await?;
        Ok(self.ingest(generation, &observations, Instant::now()))
    }

    /// Feed one frame's observations into the pipeline.
    ///
    /// Split out of [`tick`](Self::tick) so tests can drive the pipeline
    /// with explicit timestamps and generation stamps.
    pub fn ingest(
        &mut self,
        generation: u64,
        observations: &[RawObservation],
        now: Instant,
    ) -> Option<Submission> {
        if generation != self.generation {
            debug!(stale = generation, current = self.generation, "discarding stale oracle result");
            return None;
        }

        if observations.is_empty() {
            self.aggregator.note_no_face(now);
            return None;
        }

        for obs in observations {
            if self.config.quality.accepts(obs) {
                self.last_box = Some(obs.bounding_box);
                self.aggregator.observe(obs.clone(), now);
            } else {
                debug!(
                    size = obs.bounding_box.min_side(),
                    score = obs.detection_score,
                    "observation below quality floor"
                );
            }
        }

        let estimate = self.aggregator.estimate()?;
        if !estimate.locked {
            return None;
        }
        if !self.gate.check(estimate.descriptor.as_deref(), now) {
            return None;
        }

        let descriptor = match &estimate.descriptor {
            Some(vector) => Descriptor::Vector(vector.clone()),
            None => Descriptor::Geometry {
                bounding_box: self.normalize(self.last_box?),
                gender: estimate.gender,
                age_range_low: estimate.age_range.0,
                age_range_high: estimate.age_range.1,
                confidence: estimate.confidence,
            },
        };
        // With an embedding the gate alone separates people, so the track
        // restarts clean for the next visitor. The geometric track keeps
        // its buffer and relies on the no-face timeout.
        if matches!(descriptor, Descriptor::Vector(_)) {
            self.aggregator.reset();
        }

        info!(
            age = estimate.age,
            gender = %estimate.gender,
            confidence = estimate.confidence,
            "emitting locked detection"
        );
        Some(Submission {
            age: estimate.age,
            gender: estimate.gender,
            confidence: estimate.confidence,
            descriptor: serde_json::to_value(&descriptor).ok(),
        })
    }

    fn normalize(&self, bbox: BoundingBox) -> NormBox {
        NormBox {
            left: (bbox.x / self.config.frame_width).clamp(0.0, 1.0),
            top: (bbox.y / self.config.frame_height).clamp(0.0, 1.0),
            width: (bbox.width / self.config.frame_width).clamp(0.0, 1.0),
            height: (bbox.height / self.config.frame_height).clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use footfall_core::Gender;

    fn observation(age: f32, descriptor: Option<Vec<f32>>) -> RawObservation {
        RawObservation {
            bounding_box: BoundingBox { x: 160.0, y: 120.0, width: 160.0, height: 192.0 },
            detection_score: 0.9,
            age,
            gender: Gender::Male,
            gender_confidence: 0.9,
            landmark_quality: 0.8,
            face_angle: 10.0,
            descriptor,
        }
    }

    fn runner() -> PipelineRunner {
        PipelineRunner::new(RunnerConfig::kiosk())
    }

    /// Drive identical frames until an emission or the frame budget runs out.
    fn drive(
        runner: &mut PipelineRunner,
        descriptor: Option<Vec<f32>>,
        start: Instant,
        frames: usize,
    ) -> Option<Submission> {
        let generation = runner.generation();
        for i in 0..frames {
            let now = start + Duration::from_millis(200 * i as u64);
            let frame = vec![observation(30.0, descriptor.clone())];
            if let Some(sub) = runner.ingest(generation, &frame, now) {
                return Some(sub);
            }
        }
        None
    }

    #[test]
    fn test_locked_track_emits_geometry_submission() {
        let mut runner = runner();
        let sub = drive(&mut runner, None, Instant::now(), 10).expect("should lock and emit");
        assert_eq!(sub.age, 30);
        assert_eq!(sub.gender, Gender::Male);

        let descriptor = sub.descriptor.expect("geometry payload");
        let bbox = &descriptor["boundingBox"];
        // 160/640 and 120/480 under the default frame dimensions.
        assert!((bbox["left"].as_f64().unwrap() - 0.25).abs() < 1e-6);
        assert!((bbox["top"].as_f64().unwrap() - 0.25).abs() < 1e-6);
        assert_eq!(descriptor["gender"], "male");
        assert!(descriptor["ageRangeLow"].as_u64().unwrap() <= 30);
        assert!(descriptor["ageRangeHigh"].as_u64().unwrap() >= 30);
    }

    #[test]
    fn test_vector_emission_resets_track_for_next_person() {
        let mut runner = runner();
        let vector = vec![0.25f32; 128];
        let sub =
            drive(&mut runner, Some(vector.clone()), Instant::now(), 10).expect("should emit");
        assert!(sub.descriptor.unwrap().is_array());
        // The track restarted: nothing buffered for the next visitor.
        assert_eq!(runner.aggregator.sample_count(), 0);
    }

    #[test]
    fn test_gate_blocks_immediate_reemission_of_same_person() {
        let mut runner = runner();
        let vector = vec![0.25f32; 128];
        let start = Instant::now();
        drive(&mut runner, Some(vector.clone()), start, 10).expect("first emission");

        // Same person keeps standing there; the track relocks but the
        // gate holds both on cooldown and on descriptor distance.
        let again = drive(&mut runner, Some(vector), start + Duration::from_secs(60), 10);
        assert!(again.is_none());
    }

    #[test]
    fn test_stale_generation_is_discarded_after_stop() {
        let mut runner = runner();
        let generation = runner.generation();
        let now = Instant::now();
        runner.ingest(generation, &[observation(30.0, None)], now);
        assert_eq!(runner.aggregator.sample_count(), 1);

        runner.stop();

        // An oracle result that was in flight across the stop.
        let emitted =
            runner.ingest(generation, &[observation(30.0, None)], now + Duration::from_millis(200));
        assert!(emitted.is_none());
        assert_eq!(runner.aggregator.sample_count(), 0);
    }

    #[test]
    fn test_low_quality_frames_never_reach_the_track() {
        let mut runner = runner();
        let mut obs = observation(30.0, None);
        obs.bounding_box.width = 20.0; // below the kiosk size floor
        obs.bounding_box.height = 20.0;
        runner.ingest(runner.generation(), &[obs], Instant::now());
        assert_eq!(runner.aggregator.sample_count(), 0);
    }

    #[tokio::test]
    async fn test_tick_propagates_exhausted() {
        let mut runner = runner();
        let mut oracle = crate::replay::ReplayOracle::from_text("[]\n").unwrap();
        assert!(runner.tick(&mut oracle).await.unwrap().is_none());
        assert!(matches!(runner.tick(&mut oracle).await, Err(OracleError::Exhausted)));
    }
}
