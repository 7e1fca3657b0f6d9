use serde::{Deserialize, Serialize};

/// Gender label attached to an observation or a stored detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[serde(alias = "Male")]
    Male,
    #[serde(alias = "Female")]
    Female,
    #[serde(alias = "Unknown")]
    Unknown,
}

impl std::str::FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "unknown" => Ok(Gender::Unknown),
            other => Err(format!("unrecognized gender label: {other}")),
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gender::Male => write!(f, "male"),
            Gender::Female => write!(f, "female"),
            Gender::Unknown => write!(f, "unknown"),
        }
    }
}

/// Bounding box of a detected face in pixel coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn min_side(&self) -> f32 {
        self.width.min(self.height)
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// Bounding box in fractional frame coordinates (0..1), as cloud detectors
/// report them. Used for the geometric same-person heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl NormBox {
    /// Intersection-over-Union of two axis-aligned boxes.
    ///
    /// Returns 0.0 when the boxes do not overlap or either has
    /// non-positive area.
    pub fn iou(&self, other: &NormBox) -> f32 {
        if self.width <= 0.0 || self.height <= 0.0 || other.width <= 0.0 || other.height <= 0.0 {
            return 0.0;
        }

        let x1 = self.left.max(other.left);
        let y1 = self.top.max(other.top);
        let x2 = (self.left + self.width).min(other.left + other.width);
        let y2 = (self.top + self.height).min(other.top + other.height);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.width * self.height + other.width * other.height - intersection;
        intersection / union
    }
}

/// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Landmarks {
    pub points: [(f32, f32); 5],
}

impl Landmarks {
    pub fn left_eye(&self) -> (f32, f32) {
        self.points[0]
    }

    pub fn right_eye(&self) -> (f32, f32) {
        self.points[1]
    }

    pub fn nose(&self) -> (f32, f32) {
        self.points[2]
    }
}

/// One raw face observation from the detection oracle, for one frame.
///
/// `landmark_quality` and `face_angle` are derived from landmarks at
/// observation time (see [`crate::quality`]); they default to mid-range
/// values when the oracle returns no landmarks (cloud mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawObservation {
    pub bounding_box: BoundingBox,
    /// Detector confidence in [0, 1].
    pub detection_score: f32,
    pub age: f32,
    pub gender: Gender,
    /// Gender classifier confidence in [0, 1].
    pub gender_confidence: f32,
    #[serde(default = "default_landmark_quality")]
    pub landmark_quality: f32,
    #[serde(default = "default_face_angle")]
    pub face_angle: f32,
    /// 128-d embedding in local-model mode, absent in cloud mode.
    #[serde(default)]
    pub descriptor: Option<Vec<f32>>,
}

pub(crate) fn default_landmark_quality() -> f32 {
    0.5
}

pub(crate) fn default_face_angle() -> f32 {
    15.0
}

/// Re-identification payload carried by an emitted detection.
///
/// Local-model detections carry an embedding vector; cloud detections carry
/// a geometric attribute bundle. The wire shape is either a bare JSON array
/// of numbers or an object, hence the untagged representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Descriptor {
    Vector(Vec<f32>),
    Geometry {
        #[serde(rename = "boundingBox")]
        bounding_box: NormBox,
        gender: Gender,
        #[serde(rename = "ageRangeLow")]
        age_range_low: u32,
        #[serde(rename = "ageRangeHigh")]
        age_range_high: u32,
        confidence: f32,
    },
}

/// Euclidean distance between two descriptor vectors.
///
/// Returns `None` for vectors of unequal length — such a pair is not
/// comparable and must never count as a match.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let sum: f32 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
    Some(sum.sqrt())
}

pub const MIN_AGE: u32 = 1;
pub const MAX_AGE: u32 = 120;

/// Confidence-scaled display band around a point age estimate.
///
/// Higher confidence yields a narrower band, clamped to [1, 120].
pub fn age_range_for(age: u32, confidence: f32) -> (u32, u32) {
    let margin = if confidence >= 0.85 {
        2
    } else if confidence >= 0.75 {
        3
    } else if confidence >= 0.65 {
        4
    } else {
        5
    };
    (age.saturating_sub(margin).max(MIN_AGE), (age + margin).min(MAX_AGE))
}
