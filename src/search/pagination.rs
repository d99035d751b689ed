//! Re-slicing a session's accepted jobs into response pages.

use crate::config::DEFAULT_MAX_RETURNED;
use crate::models::{AcceptedJob, Pagination, SearchResponse};

/// Slice `accepted` at `(offset, max_returned)` and describe the window.
/// Offsets beyond the end yield an empty page with no next offset.
pub fn slice_accepted_jobs(
    accepted: &[AcceptedJob],
    offset: usize,
    max_returned: usize,
    raw_scan_target: usize,
    max_scan_results: usize,
    scan_exhausted: bool,
) -> (Vec<AcceptedJob>, Pagination) {
    let page_size = if max_returned < 1 {
        DEFAULT_MAX_RETURNED
    } else {
        max_returned
    };
    let total = accepted.len();
    let safe_offset = offset.min(total);
    let end = (safe_offset + page_size).min(total);
    let page: Vec<AcceptedJob> = accepted[safe_offset..end].to_vec();
    let has_next_page = end < total;

    let pagination = Pagination {
        offset: safe_offset,
        page_size,
        returned_jobs: page.len(),
        next_offset: has_next_page.then_some(end),
        has_next_page,
        accepted_jobs_total: total,
        accepted_jobs_needed_for_page: safe_offset + page_size,
        requested_scan_target: raw_scan_target,
        max_scan_results,
        scan_exhausted,
    };
    (page, pagination)
}

/// Rebuild a stored response around a freshly-sliced page. The session data
/// itself is never touched.
pub fn rebuild_response_page(
    base: &SearchResponse,
    page: Vec<AcceptedJob>,
    pagination: Pagination,
) -> SearchResponse {
    let mut out = base.clone();
    out.stats.returned_jobs = page.len();
    out.jobs = page;
    out.pagination = pagination;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchStrength, VisaCounts};

    fn job(n: usize) -> AcceptedJob {
        AcceptedJob {
            result_id: format!("s:{n}"),
            job_url: format!("https://example.com/jobs/{n}"),
            title: "Engineer".into(),
            company: "Acme".into(),
            location: "Sydney".into(),
            site: "linkedin".into(),
            date_posted: None,
            description_fetched: false,
            description: None,
            description_excerpt: String::new(),
            salary_text: None,
            salary_currency: None,
            salary_interval: None,
            salary_min_amount: None,
            salary_max_amount: None,
            salary_source: None,
            job_type: None,
            job_level: None,
            company_industry: None,
            job_function: None,
            job_url_direct: None,
            is_remote: None,
            employer_contacts: Vec::new(),
            visa_counts: VisaCounts::default(),
            visas_sponsored: Vec::new(),
            visa_match_strength: MatchStrength::NotRequested,
            eligibility_reasons: Vec::new(),
            confidence_score: 0.5,
            confidence_model_version: "v1.1.0-rules-rs".into(),
            agent_guidance: String::new(),
        }
    }

    #[test]
    fn test_middle_page() {
        let jobs: Vec<AcceptedJob> = (1..=25).map(job).collect();
        let (page, pagination) = slice_accepted_jobs(&jobs, 10, 10, 200, 1200, false);
        assert_eq!(page.len(), 10);
        assert_eq!(page[0].result_id, "s:11");
        assert_eq!(pagination.next_offset, Some(20));
        assert!(pagination.has_next_page);
        assert_eq!(pagination.accepted_jobs_total, 25);
    }

    #[test]
    fn test_final_partial_page() {
        let jobs: Vec<AcceptedJob> = (1..=25).map(job).collect();
        let (page, pagination) = slice_accepted_jobs(&jobs, 20, 10, 200, 1200, false);
        assert_eq!(page.len(), 5);
        assert_eq!(pagination.next_offset, None);
        assert!(!pagination.has_next_page);
    }

    #[test]
    fn test_offset_beyond_total() {
        let jobs: Vec<AcceptedJob> = (1..=3).map(job).collect();
        let (page, pagination) = slice_accepted_jobs(&jobs, 50, 10, 24, 1200, true);
        assert!(page.is_empty());
        assert_eq!(pagination.offset, 3);
        assert_eq!(pagination.next_offset, None);
        assert!(!pagination.has_next_page);
        assert!(pagination.scan_exhausted);
    }

    #[test]
    fn test_same_window_is_deterministic() {
        let jobs: Vec<AcceptedJob> = (1..=25).map(job).collect();
        let first = slice_accepted_jobs(&jobs, 5, 10, 200, 1200, false);
        let second = slice_accepted_jobs(&jobs, 5, 10, 200, 1200, false);
        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
    }
}
