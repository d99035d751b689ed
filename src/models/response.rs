//! The response snapshot a completed run stores and the results tool emits.

use serde::{Deserialize, Serialize};

use super::job::AcceptedJob;
use super::run::{SearchMode, Strictness};
use super::visa::VisaType;

/// Overall outcome of a completed search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOutcome {
    Completed,
    CompletedNoResults,
}

/// Pointer to the session backing a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub expires_at_utc: String,
    pub accepted_jobs_total: usize,
}

/// How far the scrape got relative to its budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub scan_exhausted: bool,
    pub requested_scan_target: usize,
    pub max_scan_results: usize,
}

/// Status block of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseStatus {
    pub outcome: SearchOutcome,
    pub message: String,
    pub site: String,
    pub strictness_mode: Strictness,
    pub search_mode: SearchMode,
    pub visa_filtering: bool,
    pub desired_visa_types: Vec<VisaType>,
    pub search_session: SessionSummary,
    pub scan_outcome: ScanOutcome,
}

/// Execution counters attached to a response and mirrored onto the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    pub raw_jobs_scanned: usize,
    pub accepted_jobs: usize,
    pub returned_jobs: usize,
    pub company_matches: usize,
    pub description_signal_matches: usize,
    pub description_fetches: usize,
    pub description_fetch_skipped: usize,
    pub description_fetch_limit: usize,
    pub description_budget_hit: bool,
    pub ignored_jobs_skipped: usize,
    pub ignored_companies_skipped: usize,
    pub dataset_rows: usize,
    pub visa_filtering_enabled: bool,
}

/// Tool names a client should use to drive a background search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchToolNames {
    pub start: String,
    pub status: String,
    pub results: String,
    pub cancel: String,
}

/// Guidance block pointing the caller at the pollable tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guidance {
    pub long_search_guidance: String,
    pub background_search_tools: SearchToolNames,
}

/// Page window over a session's accepted jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: usize,
    pub page_size: usize,
    pub returned_jobs: usize,
    pub next_offset: Option<usize>,
    pub has_next_page: bool,
    pub accepted_jobs_total: usize,
    pub accepted_jobs_needed_for_page: usize,
    pub requested_scan_target: usize,
    pub max_scan_results: usize,
    pub scan_exhausted: bool,
}

/// Freshness report for the sponsor dataset backing a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetFreshness {
    pub dataset_exists: bool,
    pub dataset_path: String,
    pub manifest_path: String,
    pub manifest_run_at_utc: Option<String>,
    pub dataset_last_updated_at_utc: Option<String>,
    pub days_since_refresh: Option<f64>,
    pub age_seconds: Option<f64>,
    pub stale_after_days: u32,
    pub is_stale: bool,
    pub source: FreshnessSource,
    pub manifest_output_matches_dataset: bool,
}

/// Where the freshness reference time came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessSource {
    Manifest,
    FilesystemMtime,
    Unknown,
}

/// Actionable follow-ups attached to a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecoverySuggestion {
    /// The page came back empty; suggest adjacent titles to retry with.
    RelatedTitles {
        job_title: String,
        suggested_titles: Vec<String>,
    },
    /// The description-fetch budget ran out before every candidate was probed.
    DescriptionProbeBudgetReached {
        message: String,
        description_fetch_limit: usize,
    },
    /// The sponsor dataset could not be loaded for this run.
    DatasetUnavailable { message: String },
}

/// The full response snapshot for one completed search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub status: ResponseStatus,
    pub stats: SearchStats,
    pub guidance: Guidance,
    pub dataset_freshness: DatasetFreshness,
    pub pagination: Pagination,
    pub recovery_suggestions: Vec<RecoverySuggestion>,
    pub jobs: Vec<AcceptedJob>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_suggestion_tagging() {
        let suggestion = RecoverySuggestion::DatasetUnavailable {
            message: "Company dataset was unavailable.".into(),
        };
        let raw = serde_json::to_value(&suggestion).unwrap();
        assert_eq!(raw["type"], "dataset_unavailable");
    }

    #[test]
    fn test_outcome_serde() {
        assert_eq!(
            serde_json::to_string(&SearchOutcome::CompletedNoResults).unwrap(),
            "\"completed_no_results\""
        );
    }
}
