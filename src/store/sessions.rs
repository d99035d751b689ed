//! Durable session store: TTL pruning, a global cap, and a per-user cap.
//!
//! Sessions are written once and replaced whole; `accepted_jobs` is never
//! mutated in place.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::json::{load_document, save_document, StoreError};
use super::runs::{is_expired, most_recent_ids};
use crate::models::SearchSession;
use crate::utils::time::utc_now;

/// On-disk shape: `{"sessions": { session_id → Session }}`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SessionDocument {
    #[serde(default)]
    pub sessions: HashMap<String, SearchSession>,
}

pub struct SessionStore {
    path: PathBuf,
    max_sessions: usize,
    max_sessions_per_user: usize,
    lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(path: PathBuf, max_sessions: usize, max_sessions_per_user: usize) -> Self {
        Self {
            path,
            max_sessions,
            max_sessions_per_user,
            lock: Mutex::new(()),
        }
    }

    pub async fn with_lock<T>(
        &self,
        write: bool,
        f: impl FnOnce(&mut SessionDocument) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = self.lock.lock().await;
        let mut document: SessionDocument = load_document(&self.path);
        prune_sessions(&mut document, self.max_sessions);
        let out = f(&mut document)?;
        if write {
            prune_sessions(&mut document, self.max_sessions);
            save_document(&self.path, &document)?;
        }
        Ok(out)
    }

    /// Persist a new session and enforce the owner's per-user cap.
    pub async fn insert_session(
        &self,
        session_id: &str,
        session: SearchSession,
    ) -> Result<(), StoreError> {
        let user_id = session.query.user_id.clone();
        let cap = self.max_sessions_per_user;
        self.with_lock(true, move |document| {
            document.sessions.insert(session_id.to_string(), session);
            enforce_user_limit(document, &user_id, cap);
            Ok(())
        })
        .await
    }

    /// Snapshot one session, verifying the caller owns it.
    pub async fn load_session_for_user(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<SearchSession, StoreError> {
        self.with_lock(false, |document| {
            let session = document
                .sessions
                .get(session_id)
                .ok_or_else(|| StoreError::UnknownSession(session_id.to_string()))?;
            if session.query.user_id != user_id {
                return Err(StoreError::SessionNotOwned);
            }
            Ok(session.clone())
        })
        .await
    }
}

fn prune_sessions(document: &mut SessionDocument, max_sessions: usize) {
    let now = utc_now();
    document
        .sessions
        .retain(|_, session| !is_expired(&session.expires_at_utc, now));

    if max_sessions > 0 && document.sessions.len() > max_sessions {
        let keep = most_recent_ids(
            document.sessions.iter().map(|(id, session)| {
                (
                    id.clone(),
                    session.updated_at_utc.clone(),
                    session.created_at_utc.clone(),
                )
            }),
            max_sessions,
        );
        document.sessions.retain(|id, _| keep.contains(id));
    }
}

fn enforce_user_limit(document: &mut SessionDocument, user_id: &str, max_per_user: usize) {
    if max_per_user == 0 {
        return;
    }
    let user_sessions: Vec<(String, String, String)> = document
        .sessions
        .iter()
        .filter(|(_, session)| session.query.user_id == user_id)
        .map(|(id, session)| {
            (
                id.clone(),
                session.updated_at_utc.clone(),
                session.created_at_utc.clone(),
            )
        })
        .collect();
    if user_sessions.len() <= max_per_user {
        return;
    }
    let keep = most_recent_ids(user_sessions.iter().cloned(), max_per_user);
    document
        .sessions
        .retain(|id, session| session.query.user_id != user_id || keep.contains(id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::models::{SessionQuery, Strictness};
    use crate::utils::time::future_iso;

    fn sample_session(user_id: &str, stamp: &str) -> SearchSession {
        SearchSession {
            created_at_utc: stamp.to_string(),
            updated_at_utc: stamp.to_string(),
            expires_at_utc: future_iso(600),
            query: SessionQuery {
                user_id: user_id.to_string(),
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
                preferred_visa_types: Vec::new(),
            },
            accepted_jobs: Vec::new(),
            result_id_index: BTreeMap::new(),
            accepted_jobs_total: 0,
            latest_scan_target: 0,
            scan_exhausted: false,
        }
    }

    fn store(dir: &tempfile::TempDir, max_sessions: usize, per_user: usize) -> SessionStore {
        SessionStore::new(dir.path().join("search_sessions.json"), max_sessions, per_user)
    }

    #[tokio::test]
    async fn test_insert_and_ownership() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 10, 5);
        store
            .insert_session("s1", sample_session("u1", "2026-01-01T00:00:00Z"))
            .await
            .unwrap();
        assert!(store.load_session_for_user("s1", "u1").await.is_ok());
        assert!(matches!(
            store.load_session_for_user("s1", "u2").await,
            Err(StoreError::SessionNotOwned)
        ));
        assert!(matches!(
            store.load_session_for_user("nope", "u1").await,
            Err(StoreError::UnknownSession(_))
        ));
    }

    #[tokio::test]
    async fn test_per_user_cap() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 100, 2);
        for (id, stamp) in [
            ("a", "2026-01-01T00:00:00Z"),
            ("b", "2026-01-02T00:00:00Z"),
            ("c", "2026-01-03T00:00:00Z"),
        ] {
            store
                .insert_session(id, sample_session("u1", stamp))
                .await
                .unwrap();
        }
        // Another user's sessions are untouched by u1's cap.
        store
            .insert_session("other", sample_session("u2", "2026-01-01T00:00:00Z"))
            .await
            .unwrap();

        let mut ids = store
            .with_lock(false, |document| {
                Ok(document.sessions.keys().cloned().collect::<Vec<_>>())
            })
            .await
            .unwrap();
        ids.sort();
        assert_eq!(ids, vec!["b", "c", "other"]);
    }

    #[tokio::test]
    async fn test_global_cap() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 2, 10);
        for (id, stamp) in [
            ("a", "2026-01-01T00:00:00Z"),
            ("b", "2026-01-02T00:00:00Z"),
            ("c", "2026-01-03T00:00:00Z"),
        ] {
            store
                .insert_session(id, sample_session("u1", stamp))
                .await
                .unwrap();
        }
        let mut ids = store
            .with_lock(false, |document| {
                Ok(document.sessions.keys().cloned().collect::<Vec<_>>())
            })
            .await
            .unwrap();
        ids.sort();
        assert_eq!(ids, vec!["b", "c"]);
    }
}
