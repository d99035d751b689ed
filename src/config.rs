//! Runtime settings for the search server.
//!
//! Every knob is resolved once from the environment via
//! [`Settings::from_env`]; components receive a `Settings` (or values derived
//! from it) instead of reading the environment themselves, so tests can point
//! the stores at temp directories without mutating process state.

use std::path::PathBuf;
use std::time::Duration;

use crate::site::rate_limit::RateLimitConfig;

/// Default number of accepted jobs a search aims for.
pub const DEFAULT_RESULTS_WANTED: usize = 300;
/// Default listing-age window in hours (14 days).
pub const DEFAULT_HOURS_OLD: u32 = 336;
/// Default page size for returned jobs.
pub const DEFAULT_MAX_RETURNED: usize = 10;
/// Default multiplier from accepted-jobs target to raw scan target.
pub const DEFAULT_SCAN_MULTIPLIER: usize = 8;
/// Default hard cap on raw listings scanned in one run.
pub const DEFAULT_MAX_SCAN_RESULTS: usize = 1200;
/// Upstream pagination offset cap; LinkedIn stops serving past this.
pub const MAX_UPSTREAM_START: usize = 1000;

const DEFAULT_RUN_TTL_SECONDS: i64 = 21_600;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 21_600;
const DEFAULT_MAX_RUNS: usize = 500;
const DEFAULT_MAX_SESSIONS: usize = 200;
const DEFAULT_MAX_SESSIONS_PER_USER: usize = 20;
const DEFAULT_RETRY_WINDOW_SECONDS: u64 = 180;
const DEFAULT_INITIAL_BACKOFF_SECONDS: u64 = 2;
const DEFAULT_MAX_BACKOFF_SECONDS: u64 = 30;
const DEFAULT_LINKEDIN_TIMEOUT_SECONDS: u64 = 12;
const DEFAULT_MAX_DESCRIPTION_FETCHES: usize = 25;
const DEFAULT_DESCRIPTION_BUDGET_SECONDS: u64 = 60;

const DEFAULT_DATASET_PATH: &str = "data/companies.csv";
const DEFAULT_MANIFEST_PATH: &str = "data/pipeline/last_run.json";
const DEFAULT_USER_PREFS_PATH: &str = "data/config/user_preferences.json";
const DEFAULT_IGNORED_JOBS_PATH: &str = "data/config/ignored_jobs.json";
const DEFAULT_IGNORED_COMPANIES_PATH: &str = "data/config/ignored_companies.json";
const DEFAULT_SEARCH_RUNS_PATH: &str = "data/config/search_runs.json";
const DEFAULT_SEARCH_SESSIONS_PATH: &str = "data/config/search_sessions.json";

/// Resolved configuration for one server process.
#[derive(Debug, Clone)]
pub struct Settings {
    /// TTL for run records before the store prunes them.
    pub run_ttl_seconds: i64,
    /// TTL for result sessions before the store prunes them.
    pub session_ttl_seconds: i64,
    /// Global cap on stored runs.
    pub max_runs: usize,
    /// Global cap on stored sessions.
    pub max_sessions: usize,
    /// Per-user cap on stored sessions.
    pub max_sessions_per_user: usize,
    /// Backoff policy for upstream throttle responses.
    pub rate_limit: RateLimitConfig,
    /// Per-request HTTP timeout for the LinkedIn adapter.
    pub linkedin_timeout: Duration,
    /// Per-run cap on job-details fetches.
    pub max_description_fetches: usize,
    /// Per-run wall-clock budget for job-details fetches.
    pub description_budget: Duration,
    /// Default sponsor dataset location.
    pub dataset_path: PathBuf,
    /// Pipeline manifest consulted for dataset freshness.
    pub manifest_path: PathBuf,
    pub user_prefs_path: PathBuf,
    pub ignored_jobs_path: PathBuf,
    pub ignored_companies_path: PathBuf,
    pub search_runs_path: PathBuf,
    pub search_sessions_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            run_ttl_seconds: DEFAULT_RUN_TTL_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            max_runs: DEFAULT_MAX_RUNS,
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_sessions_per_user: DEFAULT_MAX_SESSIONS_PER_USER,
            rate_limit: RateLimitConfig::default(),
            linkedin_timeout: Duration::from_secs(DEFAULT_LINKEDIN_TIMEOUT_SECONDS),
            max_description_fetches: DEFAULT_MAX_DESCRIPTION_FETCHES,
            description_budget: Duration::from_secs(DEFAULT_DESCRIPTION_BUDGET_SECONDS),
            dataset_path: PathBuf::from(DEFAULT_DATASET_PATH),
            manifest_path: PathBuf::from(DEFAULT_MANIFEST_PATH),
            user_prefs_path: PathBuf::from(DEFAULT_USER_PREFS_PATH),
            ignored_jobs_path: PathBuf::from(DEFAULT_IGNORED_JOBS_PATH),
            ignored_companies_path: PathBuf::from(DEFAULT_IGNORED_COMPANIES_PATH),
            search_runs_path: PathBuf::from(DEFAULT_SEARCH_RUNS_PATH),
            search_sessions_path: PathBuf::from(DEFAULT_SEARCH_SESSIONS_PATH),
        }
    }
}

impl Settings {
    /// Snapshot the environment into a settings value.
    pub fn from_env() -> Self {
        Self {
            run_ttl_seconds: env_i64("VISA_SEARCH_RUN_TTL_SECONDS", DEFAULT_RUN_TTL_SECONDS),
            session_ttl_seconds: env_i64(
                "VISA_SEARCH_SESSION_TTL_SECONDS",
                DEFAULT_SESSION_TTL_SECONDS,
            ),
            max_runs: env_usize("VISA_MAX_SEARCH_RUNS", DEFAULT_MAX_RUNS),
            max_sessions: env_usize("VISA_MAX_SEARCH_SESSIONS", DEFAULT_MAX_SESSIONS),
            max_sessions_per_user: env_usize(
                "VISA_MAX_SEARCH_SESSIONS_PER_USER",
                DEFAULT_MAX_SESSIONS_PER_USER,
            ),
            rate_limit: RateLimitConfig {
                retry_window: Duration::from_secs(env_u64(
                    "VISA_RATE_LIMIT_RETRY_WINDOW_SECONDS",
                    DEFAULT_RETRY_WINDOW_SECONDS,
                )),
                initial_backoff: Duration::from_secs(env_u64(
                    "VISA_RATE_LIMIT_INITIAL_BACKOFF_SECONDS",
                    DEFAULT_INITIAL_BACKOFF_SECONDS,
                )),
                max_backoff: Duration::from_secs(env_u64(
                    "VISA_RATE_LIMIT_MAX_BACKOFF_SECONDS",
                    DEFAULT_MAX_BACKOFF_SECONDS,
                )),
            },
            linkedin_timeout: Duration::from_secs(env_u64(
                "VISA_LINKEDIN_TIMEOUT_SECONDS",
                DEFAULT_LINKEDIN_TIMEOUT_SECONDS,
            )),
            max_description_fetches: env_usize(
                "VISA_MAX_DESCRIPTION_FETCHES",
                DEFAULT_MAX_DESCRIPTION_FETCHES,
            ),
            description_budget: Duration::from_secs(env_u64(
                "VISA_DESCRIPTION_BUDGET_SECONDS",
                DEFAULT_DESCRIPTION_BUDGET_SECONDS,
            )),
            dataset_path: env_path("VISA_COMPANY_DATASET_PATH", DEFAULT_DATASET_PATH),
            manifest_path: env_path("VISA_DOL_MANIFEST_PATH", DEFAULT_MANIFEST_PATH),
            user_prefs_path: env_path("VISA_USER_PREFS_PATH", DEFAULT_USER_PREFS_PATH),
            ignored_jobs_path: env_path("VISA_IGNORED_JOBS_PATH", DEFAULT_IGNORED_JOBS_PATH),
            ignored_companies_path: env_path(
                "VISA_IGNORED_COMPANIES_PATH",
                DEFAULT_IGNORED_COMPANIES_PATH,
            ),
            search_runs_path: env_path("VISA_SEARCH_RUNS_PATH", DEFAULT_SEARCH_RUNS_PATH),
            search_sessions_path: env_path(
                "VISA_SEARCH_SESSION_PATH",
                DEFAULT_SEARCH_SESSIONS_PATH,
            ),
        }
    }
}

fn env_i64(name: &str, fallback: i64) -> i64 {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(fallback)
}

fn env_u64(name: &str, fallback: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(fallback)
}

fn env_usize(name: &str, fallback: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(fallback)
}

fn env_path(name: &str, fallback: &str) -> PathBuf {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value.trim()),
        _ => PathBuf::from(fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_knobs() {
        let settings = Settings::default();
        assert_eq!(settings.run_ttl_seconds, 21_600);
        assert_eq!(settings.max_runs, 500);
        assert_eq!(settings.max_sessions_per_user, 20);
        assert_eq!(settings.rate_limit.retry_window, Duration::from_secs(180));
        assert_eq!(settings.linkedin_timeout, Duration::from_secs(12));
    }
}
