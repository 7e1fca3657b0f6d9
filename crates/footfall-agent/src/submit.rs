//! Submission transport to the footfalld daemon.

use anyhow::{Context, Result};
use footfall_core::{Submission, SubmissionOutcome};
use tracing::{debug, info};

// `#[zbus::proxy]` generates `FootfallProxy` (async) from this trait.
#[zbus::proxy(
    interface = "org.footfall.Footfall1",
    default_service = "org.footfall.Footfall1",
    default_path = "/org/footfall/Footfall1"
)]
pub trait Footfall {
    async fn submit(&self, detection: &str) -> zbus::Result<String>;
    async fn stats(&self) -> zbus::Result<String>;
    async fn recent(&self, limit: u32) -> zbus::Result<String>;
    async fn clear(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

/// Where gate-approved detections go.
pub trait DetectionSink {
    async fn submit(&mut self, submission: &Submission) -> Result<SubmissionOutcome>;
}

/// Sink backed by the daemon's D-Bus interface on the session bus.
pub struct DbusSink {
    proxy: FootfallProxy<'static>,
}

impl DbusSink {
    pub async fn connect() -> Result<Self> {
        let conn = zbus::Connection::session()
            .await
            .context("connecting to the session bus")?;
        let proxy = FootfallProxy::new(&conn)
            .await
            .context("building org.footfall.Footfall1 proxy")?;
        Ok(Self { proxy })
    }
}

impl DetectionSink for DbusSink {
    async fn submit(&mut self, submission: &Submission) -> Result<SubmissionOutcome> {
        let payload = serde_json::to_string(submission)?;
        debug!(%payload, "submitting detection");
        let response = self
            .proxy
            .submit(&payload)
            .await
            .context("calling Footfall1.Submit")?;
        let outcome: SubmissionOutcome =
            serde_json::from_str(&response).context("parsing submission outcome")?;
        Ok(outcome)
    }
}

/// Log a submission outcome. A duplicate is a normal result, not a fault.
pub fn log_outcome(outcome: &SubmissionOutcome) {
    if outcome.duplicate {
        let ago = outcome
            .last_detected
            .map(|t| (chrono::Utc::now() - t).num_minutes())
            .unwrap_or(0);
        info!(id = outcome.id, minutes_ago = ago, "duplicate: person seen {ago} minutes ago");
    } else {
        info!(id = outcome.id, "detection recorded");
    }
}
