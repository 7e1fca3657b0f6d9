//! Payloads crossing the agent/daemon boundary.
//!
//! Serialized as JSON on both sides of the IPC surface, so the field
//! names here are wire contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Gender;

/// A detection submitted by a kiosk agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub age: u32,
    pub gender: Gender,
    pub confidence: f32,
    /// Vector (JSON number array) or geometry (object) payload. Kept as
    /// raw JSON so a non-duplicate row can store it verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<serde_json::Value>,
}

/// Outcome of a submission, reported back to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    /// Row id of the stored detection (new row, or the matched original).
    pub id: i64,
    pub duplicate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the matched person was originally seen; lets the caller
    /// render "detected N minutes ago".
    #[serde(
        default,
        rename = "lastDetected",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_detected: Option<DateTime<Utc>>,
}

/// Aggregate counters over all stored detections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    pub total: i64,
    pub male: i64,
    pub female: i64,
    #[serde(rename = "averageAge")]
    pub average_age: i64,
}
