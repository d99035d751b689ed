//! Dataset freshness: how old the sponsor data is and where that age was
//! measured from (pipeline manifest, else file mtime).

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::models::{DatasetFreshness, FreshnessSource};
use crate::utils::time::{parse_iso, to_iso, utc_now};

const STALE_AFTER_DAYS: u32 = 30;

fn manifest_run_time(path: &Path) -> Option<DateTime<Utc>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: serde_json::Value = serde_json::from_str(&raw).ok()?;
    parse_iso(parsed.get("run_at_utc")?.as_str()?)
}

fn file_mtime(path: &Path) -> Option<DateTime<Utc>> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

/// Report freshness for the dataset at `dataset_path`, preferring the
/// pipeline manifest's `run_at_utc` over the file's mtime.
pub fn dataset_freshness(dataset_path: &Path, manifest_path: &Path) -> DatasetFreshness {
    let now = utc_now();
    let manifest_time = manifest_run_time(manifest_path);
    let dataset_exists = dataset_path.exists();
    let file_time = if dataset_exists {
        file_mtime(dataset_path)
    } else {
        None
    };

    let (ref_time, source) = match (manifest_time, file_time) {
        (Some(t), _) => (Some(t), FreshnessSource::Manifest),
        (None, Some(t)) => (Some(t), FreshnessSource::FilesystemMtime),
        (None, None) => (None, FreshnessSource::Unknown),
    };

    let (age_seconds, days_since_refresh, is_stale) = match ref_time {
        Some(t) => {
            let seconds = (now - t).num_milliseconds().max(0) as f64 / 1000.0;
            let days = seconds / 86_400.0;
            (Some(seconds), Some(days), days >= STALE_AFTER_DAYS as f64)
        }
        None => (None, None, true),
    };

    DatasetFreshness {
        dataset_exists,
        dataset_path: dataset_path.display().to_string(),
        manifest_path: manifest_path.display().to_string(),
        manifest_run_at_utc: manifest_time.map(to_iso),
        dataset_last_updated_at_utc: ref_time.map(to_iso),
        days_since_refresh,
        age_seconds,
        stale_after_days: STALE_AFTER_DAYS,
        is_stale,
        source,
        manifest_output_matches_dataset: false,
    }
}
