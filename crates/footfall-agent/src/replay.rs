//! Replay oracle: pre-recorded observation frames from a JSON-lines file.
//!
//! One line per frame, each line a JSON array of raw observations (an
//! empty array is a no-face frame). Used on bench rigs and in tests where
//! no camera or model is attached.

use std::collections::VecDeque;
use std::path::Path;

use footfall_core::RawObservation;

use crate::oracle::{FaceOracle, OracleError};

#[derive(Debug)]
pub struct ReplayOracle {
    frames: VecDeque<Vec<RawObservation>>,
}

impl ReplayOracle {
    pub fn open(path: &Path) -> Result<Self, OracleError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_text(&text)
    }

    /// Parse frames from in-memory JSON-lines text. Blank lines are
    /// skipped; any unparseable line fails the whole load.
    pub fn from_text(text: &str) -> Result<Self, OracleError> {
        let mut frames = VecDeque::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let frame: Vec<RawObservation> = serde_json::from_str(line)
                .map_err(|e| OracleError::Malformed(format!("line {}: {e}", lineno + 1)))?;
            frames.push_back(frame);
        }
        Ok(Self { frames })
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FaceOracle for ReplayOracle {
    async fn analyze(&mut self) -> Result<Vec<RawObservation>, OracleError> {
        self.frames.pop_front().ok_or(OracleError::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use footfall_core::Gender;

    const FRAME: &str = r#"[{"bounding_box":{"x":100.0,"y":80.0,"width":120.0,"height":150.0},"detection_score":0.9,"age":31.5,"gender":"female","gender_confidence":0.88}]"#;

    #[tokio::test]
    async fn test_replay_yields_frames_then_exhausted() {
        let text = format!("{FRAME}\n\n[]\n");
        let mut oracle = ReplayOracle::from_text(&text).unwrap();
        assert_eq!(oracle.remaining(), 2);

        let first = oracle.analyze().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].gender, Gender::Female);
        // Landmark fields absent on the wire fall back to mid-range.
        assert!((first[0].landmark_quality - 0.5).abs() < 1e-6);
        assert!((first[0].face_angle - 15.0).abs() < 1e-6);

        assert!(oracle.analyze().await.unwrap().is_empty());
        assert!(matches!(oracle.analyze().await, Err(OracleError::Exhausted)));
    }

    #[tokio::test]
    async fn test_malformed_line_rejected_with_line_number() {
        let text = format!("{FRAME}\nnot json\n");
        match ReplayOracle::from_text(&text) {
            Err(OracleError::Malformed(msg)) => assert!(msg.starts_with("line 2:")),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }
}
