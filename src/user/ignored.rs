//! Ignored-jobs and ignored-companies lists.
//!
//! The search pipeline consumes these as skip sets; the write side is the
//! minimal add-entry path the ignore tools need.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::store::{load_document, save_document, StoreError};
use crate::utils::text::normalize_company_name;
use crate::utils::time::utc_now_iso;

#[derive(Debug, Default, Serialize, Deserialize)]
struct IgnoredJobsDocument {
    #[serde(default)]
    users: HashMap<String, IgnoredJobsEntry>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IgnoredJobsEntry {
    #[serde(default)]
    jobs: Vec<IgnoredJob>,
}

/// One ignored job URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoredJob {
    pub id: u64,
    pub job_url: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub source: String,
    pub ignored_at_utc: String,
    pub updated_at_utc: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IgnoredCompaniesDocument {
    #[serde(default)]
    users: HashMap<String, IgnoredCompaniesEntry>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IgnoredCompaniesEntry {
    #[serde(default)]
    companies: Vec<IgnoredCompany>,
}

/// One ignored employer, keyed by its normalized name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoredCompany {
    pub id: u64,
    pub company_name: String,
    pub normalized_company: String,
    #[serde(default)]
    pub reason: String,
    pub ignored_at_utc: String,
    pub updated_at_utc: String,
}

/// Lowercased, trimmed URLs the user never wants to see again.
pub fn ignored_job_urls(path: &Path, user_id: &str) -> HashSet<String> {
    let document: IgnoredJobsDocument = load_document(path);
    document
        .users
        .get(user_id)
        .map(|entry| {
            entry
                .jobs
                .iter()
                .map(|job| job.job_url.trim().to_lowercase())
                .filter(|url| !url.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Normalized company names the user never wants to see again.
pub fn ignored_company_keys(path: &Path, user_id: &str) -> HashSet<String> {
    let document: IgnoredCompaniesDocument = load_document(path);
    document
        .users
        .get(user_id)
        .map(|entry| {
            entry
                .companies
                .iter()
                .map(|company| company.normalized_company.clone())
                .filter(|name| !name.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Record a job URL as ignored. Re-ignoring an already-listed URL refreshes
/// its timestamp rather than duplicating the entry.
pub fn add_ignored_job(
    path: &Path,
    user_id: &str,
    job_url: &str,
    reason: &str,
) -> Result<IgnoredJob, StoreError> {
    let now = utc_now_iso();
    let mut document: IgnoredJobsDocument = load_document(path);
    let entry = document.users.entry(user_id.to_string()).or_default();

    let key = job_url.trim().to_lowercase();
    if let Some(existing) = entry
        .jobs
        .iter_mut()
        .find(|job| job.job_url.trim().to_lowercase() == key)
    {
        existing.updated_at_utc = now;
        if !reason.trim().is_empty() {
            existing.reason = reason.trim().to_string();
        }
        let out = existing.clone();
        save_document(path, &document)?;
        return Ok(out);
    }

    let next_id = entry.jobs.iter().map(|job| job.id).max().unwrap_or(0) + 1;
    let job = IgnoredJob {
        id: next_id,
        job_url: job_url.trim().to_string(),
        reason: reason.trim().to_string(),
        source: "tool".to_string(),
        ignored_at_utc: now.clone(),
        updated_at_utc: now,
    };
    entry.jobs.push(job.clone());
    save_document(path, &document)?;
    Ok(job)
}

/// Record an employer as ignored by normalized name.
pub fn add_ignored_company(
    path: &Path,
    user_id: &str,
    company_name: &str,
    reason: &str,
) -> Result<Option<IgnoredCompany>, StoreError> {
    let normalized = normalize_company_name(company_name);
    if normalized.is_empty() {
        return Ok(None);
    }
    let now = utc_now_iso();
    let mut document: IgnoredCompaniesDocument = load_document(path);
    let entry = document.users.entry(user_id.to_string()).or_default();

    if let Some(existing) = entry
        .companies
        .iter_mut()
        .find(|company| company.normalized_company == normalized)
    {
        existing.updated_at_utc = now;
        if !reason.trim().is_empty() {
            existing.reason = reason.trim().to_string();
        }
        let out = existing.clone();
        save_document(path, &document)?;
        return Ok(Some(out));
    }

    let next_id = entry.companies.iter().map(|c| c.id).max().unwrap_or(0) + 1;
    let company = IgnoredCompany {
        id: next_id,
        company_name: company_name.trim().to_string(),
        normalized_company: normalized,
        reason: reason.trim().to_string(),
        ignored_at_utc: now.clone(),
        updated_at_utc: now,
    };
    entry.companies.push(company.clone());
    save_document(path, &document)?;
    Ok(Some(company))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignored_job_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ignored_jobs.json");
        add_ignored_job(&path, "u1", " https://Example.com/jobs/1 ", "spam").unwrap();
        let urls = ignored_job_urls(&path, "u1");
        assert!(urls.contains("https://example.com/jobs/1"));
        assert!(ignored_job_urls(&path, "u2").is_empty());
    }

    #[test]
    fn test_reignoring_does_not_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ignored_jobs.json");
        let first = add_ignored_job(&path, "u1", "https://example.com/jobs/1", "").unwrap();
        let second = add_ignored_job(&path, "u1", "https://EXAMPLE.com/jobs/1", "dup").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(ignored_job_urls(&path, "u1").len(), 1);
    }

    #[test]
    fn test_ignored_company_normalizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ignored_companies.json");
        let company = add_ignored_company(&path, "u1", "Acme Inc", "")
            .unwrap()
            .unwrap();
        assert_eq!(company.normalized_company, "acme");
        assert!(ignored_company_keys(&path, "u1").contains("acme"));
    }

    #[test]
    fn test_blank_company_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ignored_companies.json");
        assert!(add_ignored_company(&path, "u1", "N/A", "").unwrap().is_none());
    }
}
