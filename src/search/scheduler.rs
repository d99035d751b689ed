//! Scheduler: accepts search starts, spawns background executors, and
//! answers status / results / cancel calls from the stores.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use super::executor;
use super::pagination::{rebuild_response_page, slice_accepted_jobs};
use crate::config::{
    Settings, DEFAULT_HOURS_OLD, DEFAULT_MAX_RETURNED, DEFAULT_MAX_SCAN_RESULTS,
    DEFAULT_RESULTS_WANTED, DEFAULT_SCAN_MULTIPLIER,
};
use crate::dataset::dataset_path_or_default;
use crate::models::{
    EventPhase, Pagination, RunEvent, RunStatus, SearchMode, SearchQuery, SearchResponse,
    SearchRun, SearchStats, SearchToolNames, Strictness,
};
use crate::site::{normalize_site, new_site_client, SiteClient, SiteError};
use crate::store::{RunStore, SessionStore, StoreError};
use crate::user::preferences::PrefsError;
use crate::utils::ids::new_opaque_id;
use crate::utils::time::{future_iso, utc_now_iso};

/// Default page target for general-mode searches; visa mode scans much
/// deeper by default because acceptance is rarer.
const DEFAULT_GENERAL_RESULTS_WANTED: usize = 5;

#[derive(Debug, Error)]
pub enum ToolError {
    /// Input validation failure; surfaced synchronously, no run created.
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Site(#[from] SiteError),
    #[error(transparent)]
    Prefs(#[from] PrefsError),
}

/// The tool names a client polls for a given search mode.
pub fn tool_names(mode: SearchMode) -> SearchToolNames {
    match mode {
        SearchMode::Visa => SearchToolNames {
            start: "start_visa_job_search".into(),
            status: "get_visa_job_search_status".into(),
            results: "get_visa_job_search_results".into(),
            cancel: "cancel_visa_job_search".into(),
        },
        SearchMode::General => SearchToolNames {
            start: "start_job_search".into(),
            status: "get_job_search_status".into(),
            results: "get_job_search_results".into(),
            cancel: "cancel_job_search".into(),
        },
    }
}

pub fn long_guidance(mode: SearchMode) -> String {
    let names = tool_names(mode);
    format!(
        "Use {} then poll {}; fetch pages with {}.",
        names.start, names.status, names.results
    )
}

#[derive(Debug, Serialize)]
pub struct StartReply {
    pub run_id: String,
    pub status: RunStatus,
    pub user_id: String,
    pub search_mode: SearchMode,
    pub created_at_utc: String,
    pub expires_at_utc: String,
    pub next_cursor: u64,
    pub search_runs_path: String,
    pub poll_tool: String,
    pub results_tool: String,
    pub cancel_tool: String,
}

#[derive(Debug, Serialize)]
pub struct StatusReply {
    pub run_id: String,
    pub user_id: String,
    pub status: RunStatus,
    pub is_terminal: bool,
    pub cancel_requested: bool,
    pub attempt_count: u32,
    pub created_at_utc: String,
    pub updated_at_utc: String,
    pub completed_at_utc: Option<String>,
    pub expires_at_utc: String,
    pub search_session_id: Option<String>,
    pub current_scan_target: usize,
    pub error: Option<String>,
    pub events: Vec<RunEvent>,
    pub cursor: u64,
    pub next_cursor: u64,
    pub has_more_events: bool,
    pub latest_stats: Option<SearchStats>,
    pub latest_pagination: Option<Pagination>,
    pub latest_returned_jobs: usize,
    pub can_fetch_results: bool,
    pub search_runs_path: String,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub attempt_count: u32,
    pub search_runs_path: String,
}

#[derive(Debug, Serialize)]
pub struct ResultsReply {
    pub run: RunSummary,
    #[serde(flatten)]
    pub response: SearchResponse,
}

#[derive(Debug, Serialize)]
pub struct CancelReply {
    pub run_id: String,
    pub user_id: String,
    pub status: RunStatus,
    pub cancel_requested: bool,
    pub search_runs_path: String,
}

/// Process-wide runtime behind every search tool: settings, the two durable
/// stores, the in-memory cancel-flag registry, and (in tests) a site-client
/// override.
pub struct SearchRuntime {
    pub(crate) settings: Settings,
    pub(crate) runs: RunStore,
    pub(crate) sessions: SessionStore,
    active: StdMutex<HashMap<String, Arc<AtomicBool>>>,
    site_override: Option<Arc<dyn SiteClient>>,
}

impl SearchRuntime {
    pub fn new(settings: Settings) -> Arc<Self> {
        let runs = RunStore::new(settings.search_runs_path.clone(), settings.max_runs);
        let sessions = SessionStore::new(
            settings.search_sessions_path.clone(),
            settings.max_sessions,
            settings.max_sessions_per_user,
        );
        Arc::new(Self {
            settings,
            runs,
            sessions,
            active: StdMutex::new(HashMap::new()),
            site_override: None,
        })
    }

    /// Test constructor: route all site traffic through `client`.
    pub fn with_site_client(settings: Settings, client: Arc<dyn SiteClient>) -> Arc<Self> {
        let runs = RunStore::new(settings.search_runs_path.clone(), settings.max_runs);
        let sessions = SessionStore::new(
            settings.search_sessions_path.clone(),
            settings.max_sessions,
            settings.max_sessions_per_user,
        );
        Arc::new(Self {
            settings,
            runs,
            sessions,
            active: StdMutex::new(HashMap::new()),
            site_override: Some(client),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn site_client(&self, site: &str) -> Result<Arc<dyn SiteClient>, SiteError> {
        if let Some(client) = &self.site_override {
            return Ok(client.clone());
        }
        new_site_client(site, &self.settings)
    }

    fn runs_path(&self) -> String {
        self.settings.search_runs_path.display().to_string()
    }

    /// Get-or-insert the in-memory cancel flag for a run. The same `Arc` is
    /// returned across calls so the scheduler and executor share one bit.
    pub(crate) fn register_cancel_flag(&self, run_id: &str) -> Arc<AtomicBool> {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        active
            .entry(run_id.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    pub(crate) fn clear_cancel_flag(&self, run_id: &str) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(run_id);
        }
    }

    fn flip_cancel_flag(&self, run_id: &str) {
        if let Ok(active) = self.active.lock() {
            if let Some(flag) = active.get(run_id) {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Start a background search. Validation failures return synchronously;
    /// everything downstream surfaces through the run record.
    pub async fn start_search(
        self: &Arc<Self>,
        mode: SearchMode,
        args: &Map<String, Value>,
    ) -> Result<StartReply, ToolError> {
        let location = get_string(args, "location");
        let job_title = get_string(args, "job_title");
        let user_id = get_string(args, "user_id");
        if location.is_empty() {
            return Err(ToolError::Invalid("location is required".into()));
        }
        if job_title.is_empty() {
            return Err(ToolError::Invalid("job_title is required".into()));
        }
        if user_id.is_empty() {
            return Err(ToolError::Invalid("user_id is required".into()));
        }

        let site = normalize_site(&get_string(args, "site"))
            .map_err(|err| ToolError::Invalid(err.to_string()))?;

        let strictness_raw = get_string(args, "strictness_mode");
        let strictness = Strictness::parse(&strictness_raw).ok_or_else(|| {
            ToolError::Invalid("strictness_mode must be one of [balanced strict]".into())
        })?;

        let default_results_wanted = match mode {
            SearchMode::Visa => DEFAULT_RESULTS_WANTED,
            SearchMode::General => DEFAULT_GENERAL_RESULTS_WANTED,
        };
        let results_wanted = match get_optional_usize(args, "results_wanted")? {
            Some(parsed) if parsed < 1 => {
                return Err(ToolError::Invalid("results_wanted must be >= 1".into()))
            }
            Some(parsed) => parsed,
            None => default_results_wanted,
        };
        let max_returned = match get_optional_usize(args, "max_returned")? {
            Some(parsed) if parsed < 1 => {
                return Err(ToolError::Invalid("max_returned must be >= 1".into()))
            }
            Some(parsed) => parsed,
            None => DEFAULT_MAX_RETURNED,
        };
        let offset = get_optional_usize(args, "offset")?.unwrap_or(0);
        let hours_old = match get_optional_usize(args, "hours_old")? {
            Some(parsed) => parsed.max(1) as u32,
            None => DEFAULT_HOURS_OLD,
        };
        let require_description_signal =
            get_optional_bool(args, "require_description_signal")?.unwrap_or(false);
        let refresh_session = get_optional_bool(args, "refresh_session")?.unwrap_or(false);
        let scan_multiplier = match get_optional_usize(args, "scan_multiplier")? {
            Some(parsed) if parsed < 1 => {
                return Err(ToolError::Invalid("scan_multiplier must be >= 1".into()))
            }
            Some(parsed) => parsed,
            None => DEFAULT_SCAN_MULTIPLIER,
        };
        let max_scan_results = match get_optional_usize(args, "max_scan_results")? {
            Some(parsed) => parsed.max(results_wanted),
            None => DEFAULT_MAX_SCAN_RESULTS.max(results_wanted),
        };
        let dataset_path =
            dataset_path_or_default(&get_string(args, "dataset_path"), &self.settings)
                .display()
                .to_string();

        let run_id = new_opaque_id();
        let created_at = utc_now_iso();
        let expires_at = future_iso(self.settings.run_ttl_seconds);
        let query = SearchQuery {
            user_id: user_id.clone(),
            search_mode: mode,
            location,
            job_title,
            hours_old,
            dataset_path,
            site,
            results_wanted,
            max_returned,
            offset,
            require_description_signal,
            strictness_mode: strictness,
            refresh_session,
            scan_multiplier,
            max_scan_results,
        };
        let mut run = SearchRun {
            run_id: run_id.clone(),
            status: RunStatus::Pending,
            created_at_utc: created_at.clone(),
            updated_at_utc: created_at.clone(),
            completed_at_utc: None,
            expires_at_utc: expires_at.clone(),
            cancel_requested: false,
            attempt_count: 0,
            current_scan_target: results_wanted.max(offset + max_returned),
            search_session_id: None,
            latest_response: None,
            latest_stats: None,
            error: None,
            next_event_id: 0,
            events: Vec::new(),
            query,
        };
        run.append_event(EventPhase::Started, "Background search started.", 0.0, None);
        let next_cursor = run.next_event_id;

        self.runs.insert_run(run).await?;
        self.register_cancel_flag(&run_id);

        let runtime = self.clone();
        let spawn_run_id = run_id.clone();
        tokio::spawn(async move {
            executor::execute_search_run(runtime, spawn_run_id).await;
        });
        info!(run_id = %run_id, mode = mode.as_str(), "background search started");

        let names = tool_names(mode);
        Ok(StartReply {
            run_id,
            status: RunStatus::Pending,
            user_id,
            search_mode: mode,
            created_at_utc: created_at,
            expires_at_utc: expires_at,
            next_cursor,
            search_runs_path: self.runs_path(),
            poll_tool: names.status,
            results_tool: names.results,
            cancel_tool: names.cancel,
        })
    }

    /// Poll a run. Read-only and idempotent.
    pub async fn search_status(
        &self,
        args: &Map<String, Value>,
    ) -> Result<StatusReply, ToolError> {
        let user_id = require_string(args, "user_id")?;
        let run_id = require_string(args, "run_id")?;
        let cursor = get_optional_usize(args, "cursor")?.unwrap_or(0) as u64;

        let run = self.runs.load_run_for_user(&run_id, &user_id).await?;
        let total_events = run.events.len() as u64;
        let safe_cursor = cursor.min(total_events);
        let events = run.events[safe_cursor as usize..].to_vec();

        let latest_pagination = run
            .latest_response
            .as_ref()
            .map(|response| response.pagination.clone());
        let latest_returned_jobs = run
            .latest_response
            .as_ref()
            .map(|response| response.stats.returned_jobs)
            .unwrap_or(0);

        Ok(StatusReply {
            run_id,
            user_id,
            status: run.status,
            is_terminal: run.status.is_terminal(),
            cancel_requested: run.cancel_requested,
            attempt_count: run.attempt_count,
            created_at_utc: run.created_at_utc,
            updated_at_utc: run.updated_at_utc,
            completed_at_utc: run.completed_at_utc,
            expires_at_utc: run.expires_at_utc,
            search_session_id: run.search_session_id,
            current_scan_target: run.current_scan_target,
            error: run.error,
            events,
            cursor: safe_cursor,
            next_cursor: total_events,
            has_more_events: false,
            latest_stats: run.latest_stats,
            latest_pagination,
            latest_returned_jobs,
            can_fetch_results: run.latest_response.is_some(),
            search_runs_path: self.runs_path(),
        })
    }

    /// Fetch results for a run, optionally re-sliced at a different window.
    pub async fn search_results(
        &self,
        mode: SearchMode,
        args: &Map<String, Value>,
    ) -> Result<ResultsReply, ToolError> {
        let user_id = require_string(args, "user_id")?;
        let run_id = require_string(args, "run_id")?;

        let run = self.runs.load_run_for_user(&run_id, &user_id).await?;
        let Some(latest_response) = run.latest_response else {
            return Err(ToolError::Invalid(format!(
                "no result snapshot yet; poll {} until results are available",
                tool_names(mode).status
            )));
        };

        let default_offset = run.query.offset;
        let default_max = run.query.max_returned.max(1);
        let requested_offset = get_optional_usize(args, "offset")?.unwrap_or(default_offset);
        let requested_max = match get_optional_usize(args, "max_returned")? {
            Some(parsed) if parsed < 1 => {
                return Err(ToolError::Invalid("max_returned must be >= 1".into()))
            }
            Some(parsed) => parsed,
            None => default_max,
        };

        let response = if requested_offset == default_offset && requested_max == default_max {
            latest_response
        } else {
            let session_id = run.search_session_id.clone().ok_or_else(|| {
                ToolError::Invalid("search_session_id is unavailable for this run".into())
            })?;
            let session = self
                .sessions
                .load_session_for_user(&session_id, &user_id)
                .await?;
            let (page, pagination) = slice_accepted_jobs(
                &session.accepted_jobs,
                requested_offset,
                requested_max,
                session.latest_scan_target,
                DEFAULT_MAX_SCAN_RESULTS.max(run.query.max_scan_results),
                session.scan_exhausted,
            );
            rebuild_response_page(&latest_response, page, pagination)
        };

        Ok(ResultsReply {
            run: RunSummary {
                run_id,
                status: run.status,
                attempt_count: run.attempt_count,
                search_runs_path: self.runs_path(),
            },
            response,
        })
    }

    /// Request cancellation. Terminal runs are left untouched; otherwise the
    /// executor observes the flag at its next checkpoint.
    pub async fn cancel_search(&self, args: &Map<String, Value>) -> Result<CancelReply, ToolError> {
        let user_id = require_string(args, "user_id")?;
        let run_id = require_string(args, "run_id")?;

        let (status, cancel_requested) = self
            .runs
            .with_lock(true, |document| {
                let run = document
                    .runs
                    .get_mut(&run_id)
                    .ok_or_else(|| StoreError::UnknownRun(run_id.clone()))?;
                if run.query.user_id != user_id {
                    return Err(StoreError::RunNotOwned);
                }
                if run.status.is_terminal() {
                    return Ok((run.status, false));
                }
                run.cancel_requested = true;
                run.status = RunStatus::Cancelling;
                run.append_event(
                    EventPhase::Cancelling,
                    "Cancellation requested. The run will stop after the current chunk.",
                    -1.0,
                    None,
                );
                run.updated_at_utc = utc_now_iso();
                Ok((RunStatus::Cancelling, true))
            })
            .await?;

        if cancel_requested {
            self.flip_cancel_flag(&run_id);
            info!(run_id = %run_id, "cancellation requested");
        }

        Ok(CancelReply {
            run_id,
            user_id,
            status,
            cancel_requested,
            search_runs_path: self.runs_path(),
        })
    }
}

pub(crate) fn get_string(args: &Map<String, Value>, key: &str) -> String {
    match args.get(key) {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string().trim_matches('"').trim().to_string(),
    }
}

fn require_string(args: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    let value = get_string(args, key);
    if value.is_empty() {
        return Err(ToolError::Invalid(format!("{key} is required")));
    }
    Ok(value)
}

pub(crate) fn get_optional_usize(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<usize>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => {
            let as_i64 = number
                .as_i64()
                .or_else(|| number.as_f64().map(|f| f as i64))
                .ok_or_else(|| {
                    ToolError::Invalid(format!("{key} must be an integer when provided"))
                })?;
            if as_i64 < 0 {
                return Err(ToolError::Invalid(format!("{key} must be >= 0")));
            }
            Ok(Some(as_i64 as usize))
        }
        Some(Value::String(text)) => text
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ToolError::Invalid(format!("{key} must be an integer when provided"))),
        Some(_) => Err(ToolError::Invalid(format!(
            "{key} must be an integer when provided"
        ))),
    }
}

pub(crate) fn get_optional_bool(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<bool>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(flag)) => Ok(Some(*flag)),
        Some(Value::String(text)) => text
            .trim()
            .parse::<bool>()
            .map(Some)
            .map_err(|_| ToolError::Invalid(format!("{key} must be a boolean when provided"))),
        Some(_) => Err(ToolError::Invalid(format!(
            "{key} must be a boolean when provided"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_names_per_mode() {
        let visa = tool_names(SearchMode::Visa);
        assert_eq!(visa.start, "start_visa_job_search");
        let general = tool_names(SearchMode::General);
        assert_eq!(general.cancel, "cancel_job_search");
    }

    #[test]
    fn test_get_optional_usize_coercions() {
        let mut args = Map::new();
        args.insert("n".into(), Value::from(7));
        args.insert("s".into(), Value::from("12"));
        args.insert("bad".into(), Value::from("nope"));
        assert_eq!(get_optional_usize(&args, "n").unwrap(), Some(7));
        assert_eq!(get_optional_usize(&args, "s").unwrap(), Some(12));
        assert_eq!(get_optional_usize(&args, "missing").unwrap(), None);
        assert!(get_optional_usize(&args, "bad").is_err());
    }

    #[test]
    fn test_get_string_trims() {
        let mut args = Map::new();
        args.insert("a".into(), Value::from("  text  "));
        assert_eq!(get_string(&args, "a"), "text");
        assert_eq!(get_string(&args, "missing"), "");
    }
}
