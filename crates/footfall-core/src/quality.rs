//! Pre-aggregation quality gate.
//!
//! Rejects observations that are too small, too uncertain, implausibly
//! aged, or too far off-frontal before they can pollute the rolling
//! buffer. Rejected observations are discarded, never buffered.

use crate::types::{BoundingBox, Landmarks, RawObservation};

/// Acceptance thresholds for raw observations.
#[derive(Debug, Clone)]
pub struct QualityConfig {
    /// Minimum of box width and height, pixels.
    pub min_face_size: f32,
    pub min_detection_score: f32,
    pub min_age: f32,
    pub max_age: f32,
    pub min_landmark_quality: f32,
    /// Maximum head pose deviation from frontal, degrees.
    pub max_face_angle: f32,
}

impl QualityConfig {
    /// Walk-through kiosk: people pause briefly, so admit smaller and
    /// more angled faces.
    pub fn kiosk() -> Self {
        Self {
            min_face_size: 60.0,
            min_detection_score: 0.4,
            min_age: 1.0,
            max_age: 120.0,
            min_landmark_quality: 0.35,
            max_face_angle: 45.0,
        }
    }

    /// Attended desk placement: stricter thresholds for best accuracy.
    pub fn standard() -> Self {
        Self {
            min_face_size: 80.0,
            min_detection_score: 0.5,
            min_age: 1.0,
            max_age: 120.0,
            min_landmark_quality: 0.45,
            max_face_angle: 30.0,
        }
    }

    /// Accept/reject decision for one raw observation. No side effects.
    pub fn accepts(&self, obs: &RawObservation) -> bool {
        obs.bounding_box.min_side() >= self.min_face_size
            && obs.detection_score >= self.min_detection_score
            && obs.age >= self.min_age
            && obs.age <= self.max_age
            && obs.landmark_quality >= self.min_landmark_quality
            && obs.face_angle <= self.max_face_angle
    }
}

fn eye_distance(landmarks: &Landmarks) -> f32 {
    let (lx, ly) = landmarks.left_eye();
    let (rx, ry) = landmarks.right_eye();
    ((rx - lx).powi(2) + (ry - ly).powi(2)).sqrt()
}

/// Landmark-derived frontality/quality score in [0.2, 1.0].
///
/// Blends nose symmetry between the eyes, eye-line tilt, and eye spacing
/// normalized by face width. Returns the mid-range default when the eye
/// geometry is degenerate.
pub fn landmark_quality(landmarks: &Landmarks, face: &BoundingBox) -> f32 {
    let (lx, ly) = landmarks.left_eye();
    let (rx, ry) = landmarks.right_eye();
    let (nx, _ny) = landmarks.nose();

    let eye_dist = eye_distance(landmarks);
    if eye_dist <= f32::EPSILON || face.width <= 0.0 {
        return crate::types::default_landmark_quality();
    }

    // Nose centered between the eyes when frontal.
    let symmetry = 1.0 - ((lx + rx - 2.0 * nx).abs() / eye_dist).min(1.0);

    // Level eye line; 15% of eye distance tolerated before scoring zero.
    let tilt = 1.0 - ((ly - ry).abs() / (eye_dist * 0.15)).min(1.0);

    // Plausible inter-ocular spacing relative to face width.
    let spacing = eye_dist / face.width;
    let proportion = if (0.25..=0.45).contains(&spacing) { 1.0 } else { 0.7 };

    let score = symmetry * 0.4 + tilt * 0.35 + proportion * 0.25;
    score.clamp(0.2, 1.0)
}

/// Head pose deviation from frontal, in degrees.
///
/// Max of a yaw proxy (nose offset from the eye midpoint) and a pitch/roll
/// proxy (eye-line tilt), both normalized by eye distance.
pub fn face_angle(landmarks: &Landmarks) -> f32 {
    let (lx, ly) = landmarks.left_eye();
    let (rx, ry) = landmarks.right_eye();
    let (nx, _ny) = landmarks.nose();

    let eye_dist = eye_distance(landmarks);
    if eye_dist <= f32::EPSILON {
        return 90.0;
    }

    let eye_mid_x = (lx + rx) / 2.0;
    let yaw = (nx - eye_mid_x).abs().atan2(eye_dist).to_degrees();
    let pitch = (ly - ry).abs().atan2(eye_dist).to_degrees();

    yaw.max(pitch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Gender;

    fn obs(face_size: f32, score: f32, age: f32, lq: f32, angle: f32) -> RawObservation {
        RawObservation {
            bounding_box: BoundingBox { x: 0.0, y: 0.0, width: face_size, height: face_size },
            detection_score: score,
            age,
            gender: Gender::Male,
            gender_confidence: 0.8,
            landmark_quality: lq,
            face_angle: angle,
            descriptor: None,
        }
    }

    /// Frontal face: eyes level and symmetric around the nose.
    fn frontal_landmarks() -> Landmarks {
        Landmarks {
            points: [
                (40.0, 40.0),
                (80.0, 40.0),
                (60.0, 60.0),
                (45.0, 80.0),
                (75.0, 80.0),
            ],
        }
    }

    #[test]
    fn test_accepts_good_observation() {
        let cfg = QualityConfig::standard();
        assert!(cfg.accepts(&obs(100.0, 0.9, 30.0, 0.8, 10.0)));
    }

    #[test]
    fn test_rejects_small_face() {
        let cfg = QualityConfig::standard();
        assert!(!cfg.accepts(&obs(79.0, 0.9, 30.0, 0.8, 10.0)));
    }

    #[test]
    fn test_rejects_low_score() {
        let cfg = QualityConfig::standard();
        assert!(!cfg.accepts(&obs(100.0, 0.49, 30.0, 0.8, 10.0)));
    }

    #[test]
    fn test_rejects_implausible_age() {
        let cfg = QualityConfig::standard();
        assert!(!cfg.accepts(&obs(100.0, 0.9, 0.5, 0.8, 10.0)));
        assert!(!cfg.accepts(&obs(100.0, 0.9, 121.0, 0.8, 10.0)));
    }

    #[test]
    fn test_rejects_poor_landmarks_and_angle() {
        let cfg = QualityConfig::standard();
        assert!(!cfg.accepts(&obs(100.0, 0.9, 30.0, 0.44, 10.0)));
        assert!(!cfg.accepts(&obs(100.0, 0.9, 30.0, 0.8, 30.1)));
    }

    #[test]
    fn test_kiosk_mode_is_more_permissive() {
        let borderline = obs(65.0, 0.45, 30.0, 0.4, 40.0);
        assert!(QualityConfig::kiosk().accepts(&borderline));
        assert!(!QualityConfig::standard().accepts(&borderline));
    }

    #[test]
    fn test_frontal_face_scores_high_quality() {
        let face = BoundingBox { x: 20.0, y: 20.0, width: 120.0, height: 140.0 };
        let q = landmark_quality(&frontal_landmarks(), &face);
        assert!(q > 0.9, "frontal quality {q}");
    }

    #[test]
    fn test_tilted_eyes_lower_quality() {
        let face = BoundingBox { x: 20.0, y: 20.0, width: 120.0, height: 140.0 };
        let mut lm = frontal_landmarks();
        lm.points[1].1 = 55.0; // right eye drops 15px
        assert!(landmark_quality(&lm, &face) < landmark_quality(&frontal_landmarks(), &face));
    }

    #[test]
    fn test_frontal_face_angle_near_zero() {
        assert!(face_angle(&frontal_landmarks()) < 1.0);
    }

    #[test]
    fn test_turned_head_increases_angle() {
        let mut lm = frontal_landmarks();
        lm.points[2].0 = 45.0; // nose shifted toward the left eye
        assert!(face_angle(&lm) > 15.0);
    }

    #[test]
    fn test_degenerate_landmarks_fail_safe() {
        let lm = Landmarks { points: [(10.0, 10.0); 5] };
        assert_eq!(face_angle(&lm), 90.0);
        let face = BoundingBox { x: 0.0, y: 0.0, width: 100.0, height: 100.0 };
        assert_eq!(landmark_quality(&lm, &face), 0.5);
    }
}
