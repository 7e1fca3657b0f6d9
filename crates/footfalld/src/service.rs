//! Submission pipeline: validate → scan the dedup window → resolve → store.

use chrono::Utc;
use footfall_core::{
    DedupResolver, Descriptor, Resolution, StatsReport, StoredFace, Submission, SubmissionOutcome,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::store::{AttributeFilter, DetectionRow, DetectionStore, NewDetection, StoreError};

#[derive(Error, Debug)]
pub enum ServiceError {
    /// 4xx-equivalent: the submission carried no usable descriptor.
    /// Nothing is stored.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),
    /// Transient storage failure, surfaced to the caller; the service does
    /// not retry.
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
}

pub struct DetectionService {
    store: DetectionStore,
    resolver: DedupResolver,
    recent_limit: u32,
}

impl DetectionService {
    pub fn new(store: DetectionStore, resolver: DedupResolver, recent_limit: u32) -> Self {
        Self { store, resolver, recent_limit }
    }

    /// Process one submitted detection.
    ///
    /// Known consistency gap: the window scan and the insert are not
    /// atomic, so two near-simultaneous submissions for the same person
    /// can both see "no duplicate" and both insert. Accepted — the store
    /// is advisory analytics, not a ledger.
    pub async fn submit(&self, req: Submission) -> Result<SubmissionOutcome, ServiceError> {
        let (descriptor, descriptor_json) = parse_descriptor(req.descriptor.as_ref())?;

        let cutoff = Utc::now() - chrono::Duration::hours(self.resolver.config().window_hours);
        // The attribute pre-filter only applies to the geometric path;
        // vector descriptors are compared against the whole window.
        let filter = match &descriptor {
            Descriptor::Vector(_) => None,
            Descriptor::Geometry { .. } => Some(AttributeFilter {
                gender: req.gender,
                age: req.age,
                tolerance: self.resolver.config().age_tolerance,
            }),
        };
        let rows = self.store.recent_since(cutoff, filter).await?;
        let recent = parse_stored(&rows);

        match self.resolver.resolve(req.age, req.gender, &descriptor, &recent) {
            Resolution::Duplicate { id, last_seen } => {
                info!(id, %last_seen, "duplicate detection suppressed");
                Ok(SubmissionOutcome {
                    id,
                    duplicate: true,
                    message: Some("Same person detected recently".to_string()),
                    last_detected: Some(last_seen),
                })
            }
            Resolution::New => {
                let id = self
                    .store
                    .insert(NewDetection {
                        age: req.age,
                        gender: req.gender,
                        confidence: req.confidence,
                        descriptor_json,
                    })
                    .await?;
                info!(id, age = req.age, gender = %req.gender, "detection stored");
                Ok(SubmissionOutcome { id, duplicate: false, message: None, last_detected: None })
            }
        }
    }

    pub async fn stats(&self) -> Result<StatsReport, ServiceError> {
        Ok(self.store.stats().await?)
    }

    pub async fn recent(&self, limit: Option<u32>) -> Result<Vec<DetectionRow>, ServiceError> {
        let limit = limit.unwrap_or(self.recent_limit).min(self.recent_limit);
        Ok(self.store.recent(limit).await?)
    }

    pub async fn clear(&self) -> Result<usize, ServiceError> {
        let deleted = self.store.clear_all().await?;
        info!(deleted, "all detections cleared");
        Ok(deleted)
    }

    pub async fn count(&self) -> Result<i64, ServiceError> {
        Ok(self.store.count().await?)
    }
}

/// Validate the submitted descriptor and fix its serialized form.
fn parse_descriptor(
    raw: Option<&serde_json::Value>,
) -> Result<(Descriptor, String), ServiceError> {
    let value = match raw {
        None | Some(serde_json::Value::Null) => {
            return Err(ServiceError::InvalidDescriptor("descriptor is required".to_string()))
        }
        Some(v) => v,
    };

    let descriptor: Descriptor = serde_json::from_value(value.clone())
        .map_err(|e| ServiceError::InvalidDescriptor(format!("unrecognized payload shape: {e}")))?;

    match &descriptor {
        Descriptor::Vector(v) if v.is_empty() => {
            return Err(ServiceError::InvalidDescriptor("empty descriptor vector".to_string()))
        }
        Descriptor::Geometry { bounding_box, .. }
            if bounding_box.width <= 0.0 || bounding_box.height <= 0.0 =>
        {
            return Err(ServiceError::InvalidDescriptor(
                "bounding box has non-positive area".to_string(),
            ))
        }
        _ => {}
    }

    // Serialized verbatim as submitted.
    let json = serde_json::to_string(value)
        .map_err(|e| ServiceError::InvalidDescriptor(e.to_string()))?;
    Ok((descriptor, json))
}

/// Parse stored rows for the resolver, skipping rows whose descriptor
/// column is absent or no longer parseable.
fn parse_stored(rows: &[DetectionRow]) -> Vec<StoredFace> {
    rows.iter()
        .filter_map(|row| {
            let raw = row.face_descriptor.as_deref()?;
            match serde_json::from_str::<Descriptor>(raw) {
                Ok(descriptor) => Some(StoredFace {
                    id: row.id,
                    age: row.age,
                    gender: row.gender,
                    descriptor,
                    timestamp: row.timestamp,
                }),
                Err(e) => {
                    warn!(id = row.id, error = %e, "skipping row with unparseable descriptor");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use footfall_core::{DedupConfig, Gender};
    use serde_json::json;

    async fn service() -> DetectionService {
        let store = DetectionStore::open_in_memory().await.unwrap();
        DetectionService::new(store, DedupResolver::new(DedupConfig::default()), 1000)
    }

    fn vector_request(fill: f32) -> Submission {
        Submission {
            age: 30,
            gender: Gender::Male,
            confidence: 0.9,
            descriptor: Some(json!(vec![fill; 128])),
        }
    }

    fn geometry_request(age: u32, left: f64) -> Submission {
        Submission {
            age,
            gender: Gender::Male,
            confidence: 0.95,
            descriptor: Some(json!({
                "boundingBox": {"left": left, "top": 0.1, "width": 0.2, "height": 0.2},
                "gender": "male",
                "ageRangeLow": age - 3,
                "ageRangeHigh": age + 3,
                "confidence": 0.95
            })),
        }
    }

    #[tokio::test]
    async fn test_resubmission_is_idempotent_duplicate() {
        let svc = service().await;
        let first = svc.submit(vector_request(0.5)).await.unwrap();
        assert!(!first.duplicate);

        let second = svc.submit(vector_request(0.5)).await.unwrap();
        assert!(second.duplicate);
        assert_eq!(second.id, first.id);
        assert!(second.last_detected.is_some());
        assert_eq!(svc.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_distant_vector_inserts_new_row() {
        let svc = service().await;
        svc.submit(vector_request(0.5)).await.unwrap();

        // Per-dimension shift putting the distance at ~0.9, over threshold.
        let shift = 0.9 / (128.0f32).sqrt();
        let far = svc.submit(vector_request(0.5 + shift)).await.unwrap();
        assert!(!far.duplicate);
        assert_eq!(svc.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_geometry_overlap_reports_duplicate_with_original_id() {
        let svc = service().await;
        let a = svc.submit(geometry_request(30, 0.10)).await.unwrap();

        // Five minutes later, nearly the same spot, age off by one.
        let b = svc.submit(geometry_request(31, 0.11)).await.unwrap();
        assert!(b.duplicate);
        assert_eq!(b.id, a.id);
    }

    #[tokio::test]
    async fn test_geometry_far_corner_is_new() {
        let svc = service().await;
        svc.submit(geometry_request(30, 0.10)).await.unwrap();
        let far = svc.submit(geometry_request(30, 0.78)).await.unwrap();
        assert!(!far.duplicate);
        assert_eq!(svc.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_null_descriptor_rejected_nothing_stored() {
        let svc = service().await;
        let req = Submission {
            age: 30,
            gender: Gender::Male,
            confidence: 0.9,
            descriptor: None,
        };
        let err = svc.submit(req).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidDescriptor(_)));

        let req = Submission {
            age: 30,
            gender: Gender::Male,
            confidence: 0.9,
            descriptor: Some(serde_json::Value::Null),
        };
        assert!(matches!(
            svc.submit(req).await.unwrap_err(),
            ServiceError::InvalidDescriptor(_)
        ));
        assert_eq!(svc.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_descriptor_rejected() {
        let svc = service().await;
        let req = Submission {
            age: 30,
            gender: Gender::Male,
            confidence: 0.9,
            descriptor: Some(json!({"unexpected": "shape"})),
        };
        assert!(matches!(
            svc.submit(req).await.unwrap_err(),
            ServiceError::InvalidDescriptor(_)
        ));

        let req = Submission {
            age: 30,
            gender: Gender::Male,
            confidence: 0.9,
            descriptor: Some(json!([])),
        };
        assert!(matches!(
            svc.submit(req).await.unwrap_err(),
            ServiceError::InvalidDescriptor(_)
        ));
        assert_eq!(svc.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_degenerate_bounding_box_rejected() {
        let svc = service().await;
        let req = Submission {
            age: 30,
            gender: Gender::Male,
            confidence: 0.9,
            descriptor: Some(json!({
                "boundingBox": {"left": 0.1, "top": 0.1, "width": 0.0, "height": 0.2},
                "gender": "male",
                "ageRangeLow": 27,
                "ageRangeHigh": 33,
                "confidence": 0.95
            })),
        };
        assert!(matches!(
            svc.submit(req).await.unwrap_err(),
            ServiceError::InvalidDescriptor(_)
        ));
    }

    #[tokio::test]
    async fn test_stats_reflect_submissions() {
        let svc = service().await;
        svc.submit(vector_request(0.5)).await.unwrap();
        let shift = 2.0 / (128.0f32).sqrt();
        let mut req = vector_request(0.5 + shift);
        req.gender = Gender::Female;
        req.age = 40;
        svc.submit(req).await.unwrap();

        let stats = svc.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.male, 1);
        assert_eq!(stats.female, 1);
        assert_eq!(stats.average_age, 35);
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let svc = service().await;
        svc.submit(vector_request(0.5)).await.unwrap();
        assert_eq!(svc.clear().await.unwrap(), 1);
        assert_eq!(svc.count().await.unwrap(), 0);

        // With the window empty, the same person is new again.
        let again = svc.submit(vector_request(0.5)).await.unwrap();
        assert!(!again.duplicate);
    }
}
