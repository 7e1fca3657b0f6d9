use std::sync::Arc;

use footfall_core::Submission;
use zbus::interface;

use crate::service::{DetectionService, ServiceError};

/// D-Bus interface for the Footfall detection daemon.
///
/// Bus name: org.footfall.Footfall1
/// Object path: /org/footfall/Footfall1
///
/// Methods exchange JSON strings: structured payloads stay
/// transport-agnostic and the agent reuses the same serde types.
pub struct FootfallInterface {
    service: Arc<DetectionService>,
}

impl FootfallInterface {
    pub fn new(service: Arc<DetectionService>) -> Self {
        Self { service }
    }
}

fn to_fdo(err: ServiceError) -> zbus::fdo::Error {
    match err {
        ServiceError::InvalidDescriptor(msg) => zbus::fdo::Error::InvalidArgs(msg),
        ServiceError::Store(e) => zbus::fdo::Error::Failed(e.to_string()),
    }
}

fn encode<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[interface(name = "org.footfall.Footfall1")]
impl FootfallInterface {
    /// Submit one detection. Returns `{id, duplicate, message?, lastDetected?}`.
    async fn submit(&self, detection: &str) -> zbus::fdo::Result<String> {
        let request: Submission = serde_json::from_str(detection)
            .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("malformed submission: {e}")))?;
        tracing::debug!(age = request.age, gender = %request.gender, "submit requested");
        let response = self.service.submit(request).await.map_err(to_fdo)?;
        encode(&response)
    }

    /// Aggregate counters: `{total, male, female, averageAge}`.
    async fn stats(&self) -> zbus::fdo::Result<String> {
        let stats = self.service.stats().await.map_err(to_fdo)?;
        encode(&stats)
    }

    /// Most recent detections, newest first. `limit = 0` means the
    /// configured maximum.
    async fn recent(&self, limit: u32) -> zbus::fdo::Result<String> {
        let limit = if limit == 0 { None } else { Some(limit) };
        let rows = self.service.recent(limit).await.map_err(to_fdo)?;
        encode(&rows)
    }

    /// Delete all stored detections. Returns `{deleted, message}`.
    async fn clear(&self) -> zbus::fdo::Result<String> {
        let deleted = self.service.clear().await.map_err(to_fdo)?;
        encode(&serde_json::json!({
            "deleted": deleted,
            "message": "All detections cleared",
        }))
    }

    /// Daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let total = self.service.count().await.map_err(to_fdo)?;
        encode(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "detections": total,
        }))
    }
}
