//! Run records: the durable state machine behind one asynchronous search.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::response::{SearchResponse, SearchStats};
use crate::utils::time::utc_now_iso;

/// Which acceptance pipeline a search runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Visa-sponsorship filtering against the user's preferred visa types.
    Visa,
    /// Title-relevance filtering only.
    General,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Visa => "visa",
            SearchMode::General => "general",
        }
    }
}

/// Acceptance-predicate knob. `Balanced` currently evaluates identically to
/// `Strict`; the case split is kept so the knob stays wire-compatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    Strict,
    Balanced,
}

impl Strictness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strictness::Strict => "strict",
            Strictness::Balanced => "balanced",
        }
    }

    pub fn parse(value: &str) -> Option<Strictness> {
        match value.trim().to_lowercase().as_str() {
            "" | "strict" => Some(Strictness::Strict),
            "balanced" => Some(Strictness::Balanced),
            _ => None,
        }
    }
}

/// Lifecycle state of a run. Terminal states are sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Cancelling,
    Cancelled,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// Progress phases recorded in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPhase {
    Started,
    Running,
    Dataset,
    Scrape,
    Filter,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
}

/// One append-only progress record inside a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub event_id: u64,
    pub at_utc: String,
    pub phase: EventPhase,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Map<String, Value>>,
}

/// The immutable snapshot of request parameters frozen into a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub user_id: String,
    pub search_mode: SearchMode,
    pub location: String,
    pub job_title: String,
    pub hours_old: u32,
    pub dataset_path: String,
    pub site: String,
    pub results_wanted: usize,
    pub max_returned: usize,
    pub offset: usize,
    pub require_description_signal: bool,
    pub strictness_mode: Strictness,
    pub refresh_session: bool,
    pub scan_multiplier: usize,
    pub max_scan_results: usize,
}

/// An asynchronous search attempt and its durable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRun {
    pub run_id: String,
    pub status: RunStatus,
    pub created_at_utc: String,
    pub updated_at_utc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_utc: Option<String>,
    pub expires_at_utc: String,
    pub cancel_requested: bool,
    pub attempt_count: u32,
    /// `max(results_wanted, offset + max_returned)` at submission time.
    pub current_scan_target: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_response: Option<SearchResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_stats: Option<SearchStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub next_event_id: u64,
    pub events: Vec<RunEvent>,
    pub query: SearchQuery,
}

impl SearchRun {
    /// Append a progress event. Negative progress means "no percentage";
    /// values above 100 are clamped.
    pub fn append_event(
        &mut self,
        phase: EventPhase,
        detail: &str,
        progress_percent: f64,
        payload: Option<Map<String, Value>>,
    ) {
        let progress = if progress_percent >= 0.0 {
            Some(progress_percent.min(100.0))
        } else {
            None
        };
        let event = RunEvent {
            event_id: self.next_event_id,
            at_utc: utc_now_iso(),
            phase,
            detail: detail.to_string(),
            progress_percent: progress,
            payload: payload.filter(|bag| !bag.is_empty()),
        };
        self.events.push(event);
        self.next_event_id += 1;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_query() -> SearchQuery {
        SearchQuery {
            user_id: "u1".into(),
            search_mode: SearchMode::Visa,
            location: "Sydney".into(),
            job_title: "Software Engineer".into(),
            hours_old: 336,
            dataset_path: "data/companies.csv".into(),
            site: "linkedin".into(),
            results_wanted: 300,
            max_returned: 10,
            offset: 0,
            require_description_signal: false,
            strictness_mode: Strictness::Strict,
            refresh_session: false,
            scan_multiplier: 8,
            max_scan_results: 1200,
        }
    }

    fn sample_run() -> SearchRun {
        SearchRun {
            run_id: "r1".into(),
            status: RunStatus::Pending,
            created_at_utc: "2026-01-01T00:00:00Z".into(),
            updated_at_utc: "2026-01-01T00:00:00Z".into(),
            completed_at_utc: None,
            expires_at_utc: "2026-01-01T06:00:00Z".into(),
            cancel_requested: false,
            attempt_count: 0,
            current_scan_target: 300,
            search_session_id: None,
            latest_response: None,
            latest_stats: None,
            error: None,
            next_event_id: 0,
            events: Vec::new(),
            query: sample_query(),
        }
    }

    #[test]
    fn test_event_ids_are_dense_from_zero() {
        let mut run = sample_run();
        run.append_event(EventPhase::Started, "Background search started.", 0.0, None);
        run.append_event(EventPhase::Running, "Background search is running.", 2.0, None);
        run.append_event(EventPhase::Cancelling, "Cancellation requested.", -1.0, None);
        let ids: Vec<u64> = run.events.iter().map(|e| e.event_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(run.next_event_id, run.events.len() as u64);
        assert!(run.events[2].progress_percent.is_none());
    }

    #[test]
    fn test_progress_clamped_to_hundred() {
        let mut run = sample_run();
        run.append_event(EventPhase::Scrape, "overshoot", 120.0, None);
        assert_eq!(run.events[0].progress_percent, Some(100.0));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Cancelling.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
    }

    #[test]
    fn test_run_serde_round_trip() {
        let mut run = sample_run();
        run.append_event(EventPhase::Started, "Background search started.", 0.0, None);
        let raw = serde_json::to_string(&run).unwrap();
        let back: SearchRun = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, run);
    }
}
