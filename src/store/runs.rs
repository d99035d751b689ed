//! Durable run store: a mutex-guarded JSON document of run records with TTL
//! and capacity pruning.
//!
//! Every read-modify-write goes through [`RunStore::with_lock`]; pruning and
//! cap enforcement are not atomic on their own, so the whole document is
//! guarded by one mutex for the duration of the critical section.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::json::{load_document, save_document, StoreError};
use crate::models::SearchRun;
use crate::utils::time::{parse_iso, utc_now, utc_now_iso};

/// On-disk shape: `{"runs": { run_id → Run }}`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RunDocument {
    #[serde(default)]
    pub runs: HashMap<String, SearchRun>,
}

pub struct RunStore {
    path: PathBuf,
    max_runs: usize,
    lock: Mutex<()>,
}

impl RunStore {
    pub fn new(path: PathBuf, max_runs: usize) -> Self {
        Self {
            path,
            max_runs,
            lock: Mutex::new(()),
        }
    }

    /// Run `f` against the pruned document under the store mutex. With
    /// `write`, the (re-pruned) document is persisted after `f` succeeds.
    pub async fn with_lock<T>(
        &self,
        write: bool,
        f: impl FnOnce(&mut RunDocument) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = self.lock.lock().await;
        let mut document: RunDocument = load_document(&self.path);
        prune_runs(&mut document, self.max_runs);
        let out = f(&mut document)?;
        if write {
            prune_runs(&mut document, self.max_runs);
            save_document(&self.path, &document)?;
        }
        Ok(out)
    }

    /// Insert a freshly-created run.
    pub async fn insert_run(&self, run: SearchRun) -> Result<(), StoreError> {
        self.with_lock(true, |document| {
            document.runs.insert(run.run_id.clone(), run);
            Ok(())
        })
        .await
    }

    /// Mutate one run and bump its `updated_at_utc`.
    pub async fn update_run<T>(
        &self,
        run_id: &str,
        mutator: impl FnOnce(&mut SearchRun) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.with_lock(true, |document| {
            let run = document
                .runs
                .get_mut(run_id)
                .ok_or_else(|| StoreError::UnknownRun(run_id.to_string()))?;
            let out = mutator(run)?;
            run.updated_at_utc = utc_now_iso();
            Ok(out)
        })
        .await
    }

    /// Snapshot one run by ID.
    pub async fn load_run(&self, run_id: &str) -> Result<SearchRun, StoreError> {
        self.with_lock(false, |document| {
            document
                .runs
                .get(run_id)
                .cloned()
                .ok_or_else(|| StoreError::UnknownRun(run_id.to_string()))
        })
        .await
    }

    /// Snapshot one run, verifying the caller owns it.
    pub async fn load_run_for_user(
        &self,
        run_id: &str,
        user_id: &str,
    ) -> Result<SearchRun, StoreError> {
        let run = self.load_run(run_id).await?;
        if run.query.user_id != user_id {
            return Err(StoreError::RunNotOwned);
        }
        Ok(run)
    }

    /// Read the durable cancel bit for a run. Missing runs read as
    /// not-cancelled.
    pub async fn cancel_requested(&self, run_id: &str) -> bool {
        self.with_lock(false, |document| {
            Ok(document
                .runs
                .get(run_id)
                .map(|run| run.cancel_requested)
                .unwrap_or(false))
        })
        .await
        .unwrap_or(false)
    }
}

fn prune_runs(document: &mut RunDocument, max_runs: usize) {
    let now = utc_now();
    document
        .runs
        .retain(|_, run| !is_expired(&run.expires_at_utc, now));

    if max_runs > 0 && document.runs.len() > max_runs {
        let keep = most_recent_ids(
            document
                .runs
                .iter()
                .map(|(id, run)| (id.clone(), run.updated_at_utc.clone(), run.created_at_utc.clone())),
            max_runs,
        );
        document.runs.retain(|id, _| keep.contains(id));
    }
}

pub(super) fn is_expired(expires_at: &str, now: DateTime<Utc>) -> bool {
    match parse_iso(expires_at) {
        Some(expires) => expires <= now,
        None => false,
    }
}

/// IDs of the `max` most recent records by updated time (falling back to
/// created time), ties broken by ascending ID.
pub(super) fn most_recent_ids(
    records: impl Iterator<Item = (String, String, String)>,
    max: usize,
) -> std::collections::HashSet<String> {
    let mut pairs: Vec<(String, DateTime<Utc>)> = records
        .map(|(id, updated, created)| {
            let time = parse_iso(&updated)
                .or_else(|| parse_iso(&created))
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            (id, time)
        })
        .collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    pairs.into_iter().take(max).map(|(id, _)| id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RunStatus, SearchMode, SearchQuery, Strictness};
    use crate::utils::time::future_iso;

    fn sample_run(run_id: &str, expires_at: &str, updated_at: &str) -> SearchRun {
        SearchRun {
            run_id: run_id.to_string(),
            status: RunStatus::Pending,
            created_at_utc: updated_at.to_string(),
            updated_at_utc: updated_at.to_string(),
            completed_at_utc: None,
            expires_at_utc: expires_at.to_string(),
            cancel_requested: false,
            attempt_count: 0,
            current_scan_target: 10,
            search_session_id: None,
            latest_response: None,
            latest_stats: None,
            error: None,
            next_event_id: 0,
            events: Vec::new(),
            query: SearchQuery {
                user_id: "u1".into(),
                search_mode: SearchMode::General,
                location: "Sydney".into(),
                job_title: "Engineer".into(),
                hours_old: 336,
                dataset_path: String::new(),
                site: "linkedin".into(),
                results_wanted: 10,
                max_returned: 10,
                offset: 0,
                require_description_signal: false,
                strictness_mode: Strictness::Strict,
                refresh_session: false,
                scan_multiplier: 8,
                max_scan_results: 1200,
            },
        }
    }

    fn store(dir: &tempfile::TempDir, max_runs: usize) -> RunStore {
        RunStore::new(dir.path().join("search_runs.json"), max_runs)
    }

    #[tokio::test]
    async fn test_insert_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 10);
        store
            .insert_run(sample_run("r1", &future_iso(60), "2026-01-01T00:00:00Z"))
            .await
            .unwrap();
        let run = store.load_run("r1").await.unwrap();
        assert_eq!(run.run_id, "r1");
        assert!(matches!(
            store.load_run("missing").await,
            Err(StoreError::UnknownRun(_))
        ));
    }

    #[tokio::test]
    async fn test_ownership_check() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 10);
        store
            .insert_run(sample_run("r1", &future_iso(60), "2026-01-01T00:00:00Z"))
            .await
            .unwrap();
        assert!(store.load_run_for_user("r1", "u1").await.is_ok());
        assert!(matches!(
            store.load_run_for_user("r1", "someone-else").await,
            Err(StoreError::RunNotOwned)
        ));
    }

    #[tokio::test]
    async fn test_expired_runs_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 10);
        store
            .insert_run(sample_run("stale", "2020-01-01T00:00:00Z", "2020-01-01T00:00:00Z"))
            .await
            .unwrap();
        store
            .insert_run(sample_run("fresh", &future_iso(60), "2026-01-01T00:00:00Z"))
            .await
            .unwrap();
        let ids = store
            .with_lock(false, |document| {
                Ok(document.runs.keys().cloned().collect::<Vec<_>>())
            })
            .await
            .unwrap();
        assert_eq!(ids, vec!["fresh".to_string()]);
    }

    #[tokio::test]
    async fn test_capacity_keeps_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 2);
        for (id, updated) in [
            ("old", "2026-01-01T00:00:00Z"),
            ("mid", "2026-01-02T00:00:00Z"),
            ("new", "2026-01-03T00:00:00Z"),
        ] {
            store
                .insert_run(sample_run(id, &future_iso(600), updated))
                .await
                .unwrap();
        }
        let mut ids = store
            .with_lock(false, |document| {
                Ok(document.runs.keys().cloned().collect::<Vec<_>>())
            })
            .await
            .unwrap();
        ids.sort();
        assert_eq!(ids, vec!["mid".to_string(), "new".to_string()]);
    }

    #[tokio::test]
    async fn test_update_run_bumps_updated_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 10);
        store
            .insert_run(sample_run("r1", &future_iso(60), "2026-01-01T00:00:00Z"))
            .await
            .unwrap();
        store
            .update_run("r1", |run| {
                run.status = RunStatus::Running;
                Ok(())
            })
            .await
            .unwrap();
        let run = store.load_run("r1").await.unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_ne!(run.updated_at_utc, "2026-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_cancel_bit_reads() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 10);
        assert!(!store.cancel_requested("missing").await);
        store
            .insert_run(sample_run("r1", &future_iso(60), "2026-01-01T00:00:00Z"))
            .await
            .unwrap();
        store
            .update_run("r1", |run| {
                run.cancel_requested = true;
                Ok(())
            })
            .await
            .unwrap();
        assert!(store.cancel_requested("r1").await);
    }
}
