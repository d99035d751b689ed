//! Result sessions: the immutable, paginable output of a completed run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::job::{AcceptedJob, EmployerContact, MatchStrength};
use super::run::Strictness;
use super::visa::{VisaCounts, VisaType};

/// The query parameters echoed into a session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionQuery {
    pub user_id: String,
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
    pub preferred_visa_types: Vec<VisaType>,
}

/// Reduced projection of an accepted job, keyed by its result alias so
/// clients can refer to a result without repeating its URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultIndexEntry {
    pub result_id: String,
    pub job_url: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub site: String,
    pub employer_contacts: Vec<EmployerContact>,
    pub visa_counts: VisaCounts,
    pub visas_sponsored: Vec<String>,
    pub visa_match_strength: MatchStrength,
    pub eligibility_reasons: Vec<String>,
    pub confidence_score: f64,
    pub confidence_model_version: String,
}

impl ResultIndexEntry {
    pub fn from_job(job: &AcceptedJob) -> Self {
        Self {
            result_id: job.result_id.clone(),
            job_url: job.job_url.clone(),
            title: job.title.clone(),
            company: job.company.clone(),
            location: job.location.clone(),
            site: job.site.clone(),
            employer_contacts: job.employer_contacts.clone(),
            visa_counts: job.visa_counts,
            visas_sponsored: job.visas_sponsored.clone(),
            visa_match_strength: job.visa_match_strength,
            eligibility_reasons: job.eligibility_reasons.clone(),
            confidence_score: job.confidence_score,
            confidence_model_version: job.confidence_model_version.clone(),
        }
    }
}

/// The immutable paginable result of a completed run. Created once by the
/// executor; read-only thereafter; pruned by TTL and per-user cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSession {
    pub created_at_utc: String,
    pub updated_at_utc: String,
    pub expires_at_utc: String,
    pub query: SessionQuery,
    pub accepted_jobs: Vec<AcceptedJob>,
    pub result_id_index: BTreeMap<String, ResultIndexEntry>,
    pub accepted_jobs_total: usize,
    pub latest_scan_target: usize,
    pub scan_exhausted: bool,
}
