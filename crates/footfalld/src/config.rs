use std::path::PathBuf;

use footfall_core::DedupConfig;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Trailing dedup window in hours.
    pub dedup_window_hours: i64,
    /// Euclidean distance threshold for a vector-descriptor duplicate.
    pub match_threshold: f32,
    /// IoU threshold for a geometric duplicate.
    pub iou_threshold: f32,
    /// Age tolerance (years) for the geometric pre-filter.
    pub age_tolerance: u32,
    /// Maximum rows returned by the recent-detections listing.
    pub recent_limit: u32,
}

impl Config {
    /// Load configuration from `FOOTFALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("footfall");

        let db_path = std::env::var("FOOTFALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("detections.db"));

        Self {
            db_path,
            dedup_window_hours: env_i64("FOOTFALL_DEDUP_WINDOW_HOURS", 12),
            match_threshold: env_f32("FOOTFALL_MATCH_THRESHOLD", 0.6),
            iou_threshold: env_f32("FOOTFALL_IOU_THRESHOLD", 0.5),
            age_tolerance: env_u32("FOOTFALL_AGE_TOLERANCE", 3),
            recent_limit: env_u32("FOOTFALL_RECENT_LIMIT", 1000),
        }
    }

    pub fn dedup(&self) -> DedupConfig {
        DedupConfig {
            match_threshold: self.match_threshold,
            iou_threshold: self.iou_threshold,
            age_tolerance: self.age_tolerance,
            window_hours: self.dedup_window_hours,
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
